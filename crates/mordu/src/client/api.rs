//! HTTP client for the mordu server API

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{MorduError, MorduResult};
use crate::models::{ReadingInput, ReadingSummary, Subject};

/// Per-request timeout for client calls
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedReading {
    pub id: String,
    pub prediction: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct PredictionBody {
    prediction: String,
}

#[derive(Debug, Deserialize)]
struct ReadingsBody {
    fortunes: Vec<ReadingSummary>,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://localhost:3000`
    pub fn new(base_url: impl Into<String>) -> MorduResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| MorduError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Liveness probe. True only when the server answers with status `OK`.
    pub async fn health(&self) -> MorduResult<bool> {
        let response = check(self.http.get(self.url("/health")).send().await?).await?;
        let body: HealthBody = response.json().await?;
        Ok(body.status == "OK")
    }

    pub async fn create_reading(&self, input: &ReadingInput) -> MorduResult<CreatedReading> {
        let response = self.http.post(self.url("/fortune")).json(input).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Prediction only; nothing is stored server side
    pub async fn chat_prediction(&self, subject: &Subject, message: &str) -> MorduResult<String> {
        let response = self
            .http
            .post(self.url("/chat"))
            .json(&serde_json::json!({ "message": message, "userInfo": subject }))
            .send()
            .await?;
        let body: PredictionBody = check(response).await?.json().await?;
        Ok(body.prediction)
    }

    pub async fn list_readings(&self, page: u64, limit: u64) -> MorduResult<Vec<ReadingSummary>> {
        let response = self
            .http
            .get(self.url("/fortune"))
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await?;
        let body: ReadingsBody = check(response).await?.json().await?;
        Ok(body.fortunes)
    }
}

/// Map non-success statuses onto the error kinds callers branch on
async fn check(response: reqwest::Response) -> MorduResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::BAD_REQUEST => MorduError::Validation(body),
        StatusCode::NOT_FOUND => MorduError::NotFound(body),
        s if s.is_server_error() => {
            MorduError::Connectivity(format!("server returned {}: {}", s, body))
        }
        s => MorduError::Internal(format!("unexpected status {}: {}", s, body)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sex, Topic};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input() -> ReadingInput {
        ReadingInput {
            subject: Subject {
                name: "A".into(),
                birthdate: "01/02/1990".into(),
                sex: Sex::Male,
                topic: Topic::Career,
            },
            text: "promotion?".into(),
            client_ref: Some("local-1".into()),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "OK" })))
            .mount(&server)
            .await;

        let api = ApiClient::new(format!("{}/", server.uri())).unwrap();
        assert!(api.health().await.unwrap());
    }

    #[tokio::test]
    async fn test_create_reading_sends_client_ref() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fortune"))
            .and(body_partial_json(json!({ "clientRef": "local-1", "topic": "career" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "srv-1",
                "prediction": "yes",
                "createdAt": "2025-01-01T00:00:00Z",
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let created = api.create_reading(&input()).await.unwrap();
        assert_eq!(created.id, "srv-1");
        assert_eq!(created.prediction, "yes");
    }

    #[tokio::test]
    async fn test_server_error_is_connectivity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let err = api.create_reading(&input()).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connectivity() {
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        assert!(api.health().await.unwrap_err().is_connectivity());
    }

    #[tokio::test]
    async fn test_list_readings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fortune"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fortunes": [{
                    "id": "srv-1",
                    "name": "A",
                    "birthdate": "01/02/1990",
                    "sex": "male",
                    "topic": "career",
                    "text": "q",
                    "prediction": "p",
                    "created_at": "2025-01-01T00:00:00Z",
                }],
                "pagination": { "page": 1, "limit": 20, "total": 1, "pages": 1 },
                "source": "remote",
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let readings = api.list_readings(1, 20).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].topic, Topic::Career);
    }
}
