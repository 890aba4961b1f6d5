//! Chat routes: one-shot predictions and persisted chat sessions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{AppState, Source};
use crate::error::{MorduError, MorduResult};
use crate::models::validate::validate_message;
use crate::models::{
    page_bounds, page_offset, ChatMessage, ChatSession, PaginatedResponse, Role, Subject,
};
use crate::oracle::PromptMessage;
use crate::remote::RecordKind;
use crate::store::LocalRecord;

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub message: String,
    #[serde(rename = "userInfo")]
    pub user_info: Subject,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub message: Option<String>,
    #[serde(rename = "userInfo")]
    pub user_info: Option<Subject>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
    /// Without it the message is stored and no reply is generated
    #[serde(rename = "userInfo")]
    pub user_info: Option<Subject>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub source: Source,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub chats: PaginatedResponse<ChatSession>,
    pub source: Source,
}

#[derive(Debug, Serialize)]
pub struct MessageAdded {
    pub chat: ChatSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ChatMessage>,
}

pub fn chat_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(predict))
        .route("/chats", post(create_session))
        .route("/chats/user/{user_id}", get(list_sessions))
        .route("/chats/{id}", get(get_session).delete(delete_session))
        .route("/chats/{id}/messages", post(add_message))
        .route(
            "/chats/{id}/messages/{index}",
            put(edit_message).delete(delete_message),
        )
}

/// Turn a session's messages into provider prompt turns
fn prompt_history(messages: &[ChatMessage]) -> Vec<PromptMessage> {
    messages
        .iter()
        .map(|m| PromptMessage::from_role(m.role, m.content.clone()))
        .collect()
}

/// Prediction without persistence
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictionRequest>,
) -> MorduResult<Json<PredictionResponse>> {
    validate_message(&req.message)?;
    req.user_info.validate()?;
    let prediction = state
        .oracle
        .predict(&req.user_info.normalized(), req.message.trim())
        .await;
    Ok(Json(PredictionResponse { prediction }))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> MorduResult<(StatusCode, Json<ChatSession>)> {
    let mut session = ChatSession::new(&req.user_id)?;

    if let Some(message) = req.message.as_deref() {
        session.push_message(Role::User, message.trim())?;
        if let Some(subject) = &req.user_info {
            subject.validate()?;
            let reply = state
                .oracle
                .converse(&subject.normalized(), &prompt_history(&session.messages))
                .await;
            session.push_message(Role::Assistant, &reply)?;
        }
    }

    let saved = state.engine.sessions().append(session).await?;
    info!("Chat {} created for user {}", saved.id, saved.user_id);
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<SessionListQuery>,
) -> MorduResult<Json<SessionsResponse>> {
    let (page, limit) = page_bounds(query.page, query.limit);
    let engine = &state.engine;

    let use_remote = match query.source {
        Source::Local => false,
        Source::Remote => true,
        Source::Auto => engine.is_connected().await,
    };
    if use_remote {
        match engine.remote().list_sessions(&user_id, page, limit).await {
            Ok(chats) => {
                return Ok(Json(SessionsResponse {
                    chats,
                    source: Source::Remote,
                }))
            }
            Err(e) if query.source == Source::Auto && e.is_connectivity() => {
                warn!("Remote chat listing failed, serving local chats: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    let all = engine.sessions().list(|s| s.user_id == user_id).await;
    let total = all.len() as u64;
    let skip = usize::try_from(page_offset(page, limit)).unwrap_or(usize::MAX);
    let items = all.into_iter().skip(skip).take(limit as usize).collect();
    Ok(Json(SessionsResponse {
        chats: PaginatedResponse::new(items, total, page, limit),
        source: Source::Local,
    }))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> MorduResult<Json<ChatSession>> {
    if let Some(session) = state.engine.sessions().get(&id).await {
        return Ok(Json(session));
    }
    if state.engine.is_connected().await {
        if let Some(session) = state.engine.remote().get_session(&id).await? {
            return Ok(Json(session));
        }
    }
    Err(MorduError::NotFound(format!("chat {}", id)))
}

/// Apply `patch` to the local copy of a session and forward the result, or
/// to the remote copy when the session only exists there
async fn mutate_session<F>(state: &AppState, id: &str, patch: F) -> MorduResult<ChatSession>
where
    F: Fn(&mut ChatSession) -> MorduResult<()>,
{
    let engine = &state.engine;
    if engine.sessions().get(id).await.is_some() {
        let updated = engine.sessions().update(id, &patch).await?;
        engine.forward_update(RecordKind::Session, id).await;
        return Ok(updated);
    }

    if engine.is_connected().await {
        if let Some(mut session) = engine.remote().get_session(id).await? {
            patch(&mut session)?;
            session.touch(chrono::Utc::now());
            engine.remote().replace_session(&session).await?;
            return Ok(session);
        }
    }
    Err(MorduError::NotFound(format!("chat {}", id)))
}

/// Append a user message and, when the subject is known, the oracle's reply
async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> MorduResult<Json<MessageAdded>> {
    validate_message(&req.message)?;
    let message = req.message.trim().to_string();

    let reply = match &req.user_info {
        Some(subject) => {
            subject.validate()?;
            let Json(current) = get_session(State(state.clone()), Path(id.clone())).await?;
            let mut turns = prompt_history(&current.messages);
            turns.push(PromptMessage::user(message.clone()));
            Some(state.oracle.converse(&subject.normalized(), &turns).await)
        }
        None => None,
    };

    let chat = mutate_session(&state, &id, |session| {
        session.push_message(Role::User, &message)?;
        if let Some(reply) = &reply {
            session.push_message(Role::Assistant, reply)?;
        }
        Ok(())
    })
    .await?;

    let reply = reply.and_then(|_| chat.messages.last().cloned());
    Ok(Json(MessageAdded { chat, reply }))
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
    Json(req): Json<EditRequest>,
) -> MorduResult<Json<ChatSession>> {
    let chat = mutate_session(&state, &id, |session| {
        session.edit_message(index, req.content.trim())?;
        Ok(())
    })
    .await?;
    info!("Message {} of chat {} edited", index, id);
    Ok(Json(chat))
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> MorduResult<Json<ChatSession>> {
    let chat = mutate_session(&state, &id, |session| {
        session.delete_message(index)?;
        Ok(())
    })
    .await?;
    info!("Message {} of chat {} deleted", index, id);
    Ok(Json(chat))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> MorduResult<Json<serde_json::Value>> {
    let engine = &state.engine;
    let local = match engine.sessions().remove(&id).await {
        Ok(_) => true,
        Err(MorduError::NotFound(_)) => false,
        Err(e) => return Err(e),
    };

    let remote = if local {
        engine.forward_delete(RecordKind::Session, &id).await;
        false
    } else if engine.is_connected().await {
        engine.remote().delete(RecordKind::Session, &id).await?
    } else {
        false
    };

    if !local && !remote {
        return Err(MorduError::NotFound(format!("chat {}", id)));
    }
    info!("Chat {} deleted", id);
    Ok(Json(serde_json::json!({ "success": true, "id": id })))
}
