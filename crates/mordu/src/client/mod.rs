//! Client side of mordu: API client, offline queue and history view
//!
//! [`Client`] never loses what the user typed. A reading the server cannot
//! store right now is queued under a `local-` id and shown as pending until
//! the flusher creates it on the server.

pub mod api;
pub mod flush;
pub mod history;
pub mod queue;

pub use api::{ApiClient, CreatedReading};
pub use flush::{FlushReport, QueueFlusher};
pub use history::{reconcile, EntrySource, HistoryCache, HistoryEntry};
pub use queue::{is_pending_id, new_pending_id, OfflineQueue, PendingReading, PENDING_PREFIX};

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::MorduResult;
use crate::models::Subject;

/// Shown when neither the server nor the prediction endpoint answered
pub const OFFLINE_PREDICTION: &str = "เชื่อมต่อเซิร์ฟเวอร์ไม่ได้ ลองใหม่ภายหลัง";

/// Notice attached to a submit that was only saved on this device
pub const OFFLINE_NOTICE: &str = "Saved on this device; it will be uploaded when the server is reachable";

/// How many server readings one history load fetches
const HISTORY_PAGE_SIZE: u64 = 100;

/// Per-user directory for the queue and history cache
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mordu")
}

/// Result of [`Client::submit`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    /// Server id, or the pending id when queued
    pub id: String,
    pub prediction: String,
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

pub struct Client {
    api: ApiClient,
    queue: OfflineQueue,
    cache: HistoryCache,
    /// Serializes submits and flushes so a queue entry is never sent twice at once
    sequencer: Mutex<()>,
}

impl Client {
    pub async fn open(base_url: &str, data_dir: impl AsRef<Path>) -> MorduResult<Self> {
        let data_dir = data_dir.as_ref();
        Ok(Self {
            api: ApiClient::new(base_url)?,
            queue: OfflineQueue::open(data_dir).await?,
            cache: HistoryCache::open(data_dir).await?,
            sequencer: Mutex::new(()),
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    /// Ask for a reading. Falls back to a prediction-only call and then to a
    /// fixed message; whenever no server id comes back the reading is queued.
    pub async fn submit(&self, subject: Subject, question: &str) -> MorduResult<SubmitOutcome> {
        let _turn = self.sequencer.lock().await;
        let subject = subject.normalized();
        let question = question.trim();
        let mut pending = PendingReading::new(subject, question, "");
        let input = pending.to_input();
        input.validate()?;

        match self.api.create_reading(&input).await {
            Ok(created) => {
                self.cache.set_active(Some(created.id.clone())).await?;
                info!("Reading stored on server as {}", created.id);
                return Ok(SubmitOutcome {
                    id: created.id,
                    prediction: created.prediction,
                    pending: false,
                    notice: None,
                });
            }
            Err(e) if e.is_connectivity() => {
                warn!("Could not store reading on server: {}", e)
            }
            // Rejected by the server: queueing would only repeat the rejection
            Err(e) => return Err(e),
        }

        pending.prediction = match self
            .api
            .chat_prediction(&pending.subject, question)
            .await
        {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!("Prediction endpoint unavailable: {}", e);
                OFFLINE_PREDICTION.to_string()
            }
        };

        let outcome = SubmitOutcome {
            id: pending.id.clone(),
            prediction: pending.prediction.clone(),
            pending: true,
            notice: Some(OFFLINE_NOTICE.to_string()),
        };
        self.queue.enqueue(pending).await?;
        self.cache.set_active(Some(outcome.id.clone())).await?;
        info!("Reading queued as {}", outcome.id);
        Ok(outcome)
    }

    /// Load the history view: server readings, then queued ones, then the
    /// cached view, reconciled and written back to the cache
    pub async fn history(&self) -> MorduResult<Vec<HistoryEntry>> {
        let _turn = self.sequencer.lock().await;

        let remote: Vec<HistoryEntry> = match self.api.list_readings(1, HISTORY_PAGE_SIZE).await {
            Ok(readings) => readings.into_iter().map(HistoryEntry::from).collect(),
            Err(e) => {
                warn!("Server history unavailable, using cached view: {}", e);
                Vec::new()
            }
        };
        let pending: Vec<HistoryEntry> = self.queue.list().await.iter().map(HistoryEntry::from).collect();
        let cached = self.cache.entries().await;

        let view = reconcile(&remote, &pending, &cached);
        self.cache.store(view.clone()).await?;
        Ok(view)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::models::{Sex, Subject, Topic};
    use serde_json::json;

    pub fn subject(name: &str) -> Subject {
        Subject {
            name: name.into(),
            birthdate: "05/06/1991".into(),
            sex: Sex::Female,
            topic: Topic::Career,
        }
    }

    pub fn reading_json(id: &str, minute: u32) -> serde_json::Value {
        json!({
            "id": id,
            "name": "A",
            "birthdate": "05/06/1991",
            "sex": "female",
            "topic": "career",
            "text": "q",
            "prediction": "p",
            "created_at": format!("2025-01-01T12:{:02}:00Z", minute),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{reading_json, subject};
    use super::*;
    use crate::error::MorduError;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_submit_online() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fortune"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "srv-1",
                "prediction": "go for it",
                "createdAt": "2025-01-01T00:00:00Z",
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = Client::open(&server.uri(), dir.path()).await.unwrap();
        let outcome = client.submit(subject("A"), " new job? ").await.unwrap();

        assert!(!outcome.pending);
        assert_eq!(outcome.id, "srv-1");
        assert!(client.queue().is_empty().await);
        assert_eq!(client.cache().active().await.as_deref(), Some("srv-1"));
    }

    #[tokio::test]
    async fn test_submit_falls_back_to_prediction_and_queues() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fortune"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "prediction": "maybe" })),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = Client::open(&server.uri(), dir.path()).await.unwrap();
        let outcome = client.submit(subject("A"), "new job?").await.unwrap();

        assert!(outcome.pending);
        assert!(is_pending_id(&outcome.id));
        assert_eq!(outcome.prediction, "maybe");
        assert!(outcome.notice.is_some());

        let queued = client.queue().find(&outcome.id).await.unwrap();
        assert_eq!(queued.text, "new job?");
        assert_eq!(queued.prediction, "maybe");
    }

    #[tokio::test]
    async fn test_submit_with_server_down_keeps_user_data() {
        let dir = TempDir::new().unwrap();
        let client = Client::open("http://127.0.0.1:9", dir.path()).await.unwrap();
        let outcome = client.submit(subject("A"), "anything").await.unwrap();

        assert!(outcome.pending);
        assert_eq!(outcome.prediction, OFFLINE_PREDICTION);
        assert_eq!(client.queue().len().await, 1);
        assert_eq!(client.cache().active().await, Some(outcome.id));
    }

    #[tokio::test]
    async fn test_invalid_submit_is_not_queued() {
        let dir = TempDir::new().unwrap();
        let client = Client::open("http://127.0.0.1:9", dir.path()).await.unwrap();
        let mut bad = subject("A");
        bad.birthdate = "1991-06-05".into();

        let err = client.submit(bad, "anything").await.unwrap_err();
        assert!(matches!(err, MorduError::Validation(_)));
        assert!(client.queue().is_empty().await);
        assert!(client.cache().active().await.is_none());
    }

    #[tokio::test]
    async fn test_server_rejection_is_surfaced_not_queued() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fortune"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "text is required",
                "code": "VALIDATION_ERROR",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prediction": "x" })))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = Client::open(&server.uri(), dir.path()).await.unwrap();
        let err = client.submit(subject("A"), "new job?").await.unwrap_err();

        assert!(matches!(err, MorduError::Validation(_)));
        assert!(client.queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_history_merges_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fortune"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fortunes": [reading_json("srv-1", 1)],
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = Client::open(&server.uri(), dir.path()).await.unwrap();
        client
            .queue()
            .enqueue(PendingReading::new(subject("B"), "q", "offline"))
            .await
            .unwrap();

        let view = client.history().await.unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].source, EntrySource::Pending);
        assert_eq!(view[1].id, "srv-1");

        // second load with the server gone still shows both from the cache
        drop(server);
        let again = client.history().await.unwrap();
        let ids: Vec<&str> = again.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![view[0].id.as_str(), "srv-1"]);
    }
}
