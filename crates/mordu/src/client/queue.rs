//! Client offline queue
//!
//! Readings the client could not store on the server, held newest first in
//! `pending.json` under the client data directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::MorduResult;
use crate::models::{ReadingInput, Subject};
use crate::store::{read_collection, write_atomic};

/// Reserved prefix of ids minted by the client
pub const PENDING_PREFIX: &str = "local-";

const QUEUE_FILE: &str = "pending.json";

pub fn new_pending_id() -> String {
    format!("{}{}", PENDING_PREFIX, Uuid::new_v4())
}

pub fn is_pending_id(id: &str) -> bool {
    id.starts_with(PENDING_PREFIX)
}

/// A reading waiting to be created on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReading {
    pub id: String,
    #[serde(rename = "userInfo")]
    pub subject: Subject,
    pub text: String,
    /// What the user was shown while offline
    pub prediction: String,
    pub created_at: DateTime<Utc>,
}

impl PendingReading {
    pub fn new(subject: Subject, text: impl Into<String>, prediction: impl Into<String>) -> Self {
        Self {
            id: new_pending_id(),
            subject,
            text: text.into(),
            prediction: prediction.into(),
            created_at: Utc::now(),
        }
    }

    /// Create request carrying the pending id as `clientRef`
    pub fn to_input(&self) -> ReadingInput {
        ReadingInput {
            subject: self.subject.clone(),
            text: self.text.clone(),
            client_ref: Some(self.id.clone()),
        }
    }
}

pub struct OfflineQueue {
    path: PathBuf,
    entries: Mutex<Vec<PendingReading>>,
}

impl OfflineQueue {
    /// Open the queue under `dir`. An unreadable queue file is corruption.
    pub async fn open(dir: impl AsRef<Path>) -> MorduResult<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(QUEUE_FILE);
        let entries = read_collection(&path).await?.unwrap_or_default();
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    async fn persist(&self, entries: &[PendingReading]) -> MorduResult<()> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.path, &bytes).await
    }

    /// Add an entry at the front
    pub async fn enqueue(&self, entry: PendingReading) -> MorduResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(0, entry);
        if let Err(e) = self.persist(&entries).await {
            entries.remove(0);
            return Err(e);
        }
        debug!("Queued pending reading {}", entries[0].id);
        Ok(())
    }

    /// Entries in queue order, newest first
    pub async fn list(&self) -> Vec<PendingReading> {
        self.entries.lock().await.clone()
    }

    pub async fn find(&self, id: &str) -> Option<PendingReading> {
        self.entries.lock().await.iter().find(|e| e.id == id).cloned()
    }

    /// Remove an entry; returns it when present
    pub async fn remove_by_id(&self, id: &str) -> MorduResult<Option<PendingReading>> {
        let mut entries = self.entries.lock().await;
        let Some(index) = entries.iter().position(|e| e.id == id) else {
            return Ok(None);
        };
        let removed = entries.remove(index);
        if let Err(e) = self.persist(&entries).await {
            entries.insert(index, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
