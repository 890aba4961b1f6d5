//! Fortune reading routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{AppState, Source};
use crate::error::{MorduError, MorduResult};
use crate::models::validate::{validate_birthdate, validate_name};
use crate::models::{page_bounds, PaginatedResponse, Reading, ReadingInput, ReadingSummary, Topic};
use crate::remote::RecordKind;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub source: Source,
}

#[derive(Debug, Deserialize)]
pub struct SubjectQuery {
    pub name: String,
    pub birthdate: String,
    pub topic: Topic,
}

#[derive(Debug, Serialize)]
pub struct CreatedReading {
    pub id: String,
    pub prediction: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub fortunes: Vec<ReadingSummary>,
    pub pagination: Pagination,
    pub source: Source,
}

impl ReadingsResponse {
    fn new(page: PaginatedResponse<Reading>, source: Source) -> Self {
        Self {
            pagination: Pagination {
                page: page.page,
                limit: page.limit,
                total: page.total,
                pages: page.total_pages,
            },
            fortunes: page.items.into_iter().map(ReadingSummary::from).collect(),
            source,
        }
    }
}

pub fn fortune_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/fortune",
            get(list_readings)
                .post(create_reading)
                .delete(delete_by_subject),
        )
        .route(
            "/fortune/{id}",
            get(get_reading).put(update_reading).delete(delete_reading),
        )
}

/// Store a new reading locally. A repeated `clientRef` returns the reading
/// already stored for it instead of creating a second one.
async fn create_reading(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ReadingInput>,
) -> MorduResult<(StatusCode, Json<CreatedReading>)> {
    input.validate()?;
    let readings = state.engine.readings();

    if let Some(client_ref) = input.client_ref.as_deref() {
        if let Some(existing) = readings.find_by_client_ref(client_ref).await {
            info!("Reading for client ref {} already stored as {}", client_ref, existing.id);
            return Ok((
                StatusCode::OK,
                Json(CreatedReading {
                    id: existing.id,
                    prediction: existing.prediction,
                    created_at: existing.created_at,
                }),
            ));
        }
    }

    let prediction = state
        .oracle
        .predict(&input.subject.normalized(), input.text.trim())
        .await;
    // A retry with the same client ref may have been stored while predicting
    let (saved, created) = readings
        .append_unique(Reading::new(&input, prediction))
        .await?;
    let status = if created {
        info!("New reading {} created for {}", saved.id, saved.name);
        StatusCode::CREATED
    } else {
        info!("Concurrent create for reading {} answered with the stored one", saved.id);
        StatusCode::OK
    };

    Ok((
        status,
        Json(CreatedReading {
            id: saved.id,
            prediction: saved.prediction,
            created_at: saved.created_at,
        }),
    ))
}

async fn list_readings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> MorduResult<Json<ReadingsResponse>> {
    let (page, limit) = page_bounds(query.page, query.limit);
    let engine = &state.engine;

    let use_remote = match query.source {
        Source::Local => false,
        Source::Remote => true,
        Source::Auto => engine.is_connected().await,
    };

    if use_remote {
        match engine.remote().list_readings(page, limit).await {
            Ok(result) => return Ok(Json(ReadingsResponse::new(result, Source::Remote))),
            Err(e) if query.source == Source::Auto && e.is_connectivity() => {
                warn!("Remote listing failed, serving local readings: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    let result = engine.readings().page(page, limit).await;
    Ok(Json(ReadingsResponse::new(result, Source::Local)))
}

async fn get_reading(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> MorduResult<Json<ReadingSummary>> {
    if let Some(reading) = state.engine.readings().get(&id).await {
        return Ok(Json(reading.into()));
    }
    if state.engine.is_connected().await {
        if let Some(reading) = state.engine.remote().get_reading(&id).await? {
            return Ok(Json(reading.into()));
        }
    }
    Err(MorduError::NotFound(format!("reading {}", id)))
}

/// Replace the subject and question of a reading and regenerate its prediction
async fn update_reading(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<ReadingInput>,
) -> MorduResult<Json<ReadingSummary>> {
    input.validate()?;
    let engine = &state.engine;
    let prediction = state
        .oracle
        .predict(&input.subject.normalized(), input.text.trim())
        .await;

    if engine.readings().get(&id).await.is_some() {
        let updated = engine
            .readings()
            .update(&id, |r| {
                r.apply(&input, prediction);
                Ok(())
            })
            .await?;
        engine.forward_update(RecordKind::Reading, &id).await;
        info!("Reading {} updated", id);
        return Ok(Json(updated.into()));
    }

    if engine.is_connected().await {
        if let Some(mut reading) = engine.remote().get_reading(&id).await? {
            reading.apply(&input, prediction);
            engine.remote().replace_reading(&reading).await?;
            info!("Remote reading {} updated", id);
            return Ok(Json(reading.into()));
        }
    }
    Err(MorduError::NotFound(format!("reading {}", id)))
}

async fn delete_reading(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> MorduResult<Json<serde_json::Value>> {
    let engine = &state.engine;
    let local = match engine.readings().remove(&id).await {
        Ok(_) => true,
        Err(MorduError::NotFound(_)) => false,
        Err(e) => return Err(e),
    };

    let remote = if local {
        engine.forward_delete(RecordKind::Reading, &id).await;
        false
    } else if engine.is_connected().await {
        engine.remote().delete(RecordKind::Reading, &id).await?
    } else {
        false
    };

    if !local && !remote {
        return Err(MorduError::NotFound(format!("reading {}", id)));
    }
    info!("Reading {} deleted", id);
    Ok(Json(serde_json::json!({ "success": true, "id": id })))
}

/// Delete every reading for one name / birthdate / topic
async fn delete_by_subject(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubjectQuery>,
) -> MorduResult<Json<serde_json::Value>> {
    validate_name(&query.name)?;
    validate_birthdate(&query.birthdate)?;
    let name = query.name.trim();
    let birthdate = query.birthdate.trim();
    let engine = &state.engine;

    let deleted = engine
        .delete_readings_by_subject(name, birthdate, query.topic)
        .await?;

    info!(
        "Deleted readings for {} / {} / {}: {} local, {:?} remote",
        name,
        birthdate,
        query.topic.as_str(),
        deleted.local,
        deleted.remote
    );
    Ok(Json(serde_json::json!({
        "success": true,
        "deleted": { "local": deleted.local, "remote": deleted.remote },
        "remotePending": deleted.remote.is_none(),
    })))
}
