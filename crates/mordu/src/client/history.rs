//! History view reconciliation
//!
//! The client's history list merges three inputs: readings confirmed by the
//! server, readings still in the offline queue, and the view cached from the
//! previous load. [`reconcile`] is pure; [`HistoryCache`] persists its last
//! output together with the active reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::queue::PendingReading;
use crate::error::MorduResult;
use crate::models::{ReadingSummary, Topic};
use crate::store::{read_json, write_atomic};

const CACHE_FILE: &str = "history.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Remote,
    Pending,
    Cached,
}

/// One row of the history view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub source: EntrySource,
    pub name: String,
    pub topic: Topic,
    pub question: String,
    pub prediction: String,
    pub last_activity: DateTime<Utc>,
}

impl HistoryEntry {
    /// Topic label shown in lists
    pub fn title(&self) -> &'static str {
        self.topic.display_name()
    }
}

impl From<ReadingSummary> for HistoryEntry {
    fn from(r: ReadingSummary) -> Self {
        Self {
            id: r.id,
            source: EntrySource::Remote,
            name: r.name,
            topic: r.topic,
            question: r.text,
            prediction: r.prediction,
            last_activity: r.created_at,
        }
    }
}

impl From<&PendingReading> for HistoryEntry {
    fn from(p: &PendingReading) -> Self {
        Self {
            id: p.id.clone(),
            source: EntrySource::Pending,
            name: p.subject.name.clone(),
            topic: p.subject.topic,
            question: p.text.clone(),
            prediction: p.prediction.clone(),
            last_activity: p.created_at,
        }
    }
}

/// Merge remote, pending and cached entries into one list.
///
/// The first occurrence of an id wins, looking at `remote`, then `pending`,
/// then `cached`. The result is ordered by last activity, newest first, with
/// ties broken by id so equal inputs always give the same order.
pub fn reconcile(
    remote: &[HistoryEntry],
    pending: &[HistoryEntry],
    cached: &[HistoryEntry],
) -> Vec<HistoryEntry> {
    let mut seen = HashSet::new();
    let mut merged: Vec<HistoryEntry> = remote
        .iter()
        .chain(pending)
        .chain(cached)
        .filter(|entry| seen.insert(entry.id.clone()))
        .cloned()
        .collect();

    merged.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CachedView {
    #[serde(default)]
    entries: Vec<HistoryEntry>,
    #[serde(default)]
    active: Option<String>,
}

/// Last reconciled view and the id of the entry the user is on
pub struct HistoryCache {
    path: PathBuf,
    view: Mutex<CachedView>,
}

impl HistoryCache {
    pub async fn open(dir: impl AsRef<Path>) -> MorduResult<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(CACHE_FILE);
        let view = read_json(&path).await?.unwrap_or_default();
        Ok(Self {
            path,
            view: Mutex::new(view),
        })
    }

    async fn persist(&self, view: &CachedView) -> MorduResult<()> {
        let bytes = serde_json::to_vec_pretty(view)?;
        write_atomic(&self.path, &bytes).await
    }

    /// Cached entries, marked as coming from the cache
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.view
            .lock()
            .await
            .entries
            .iter()
            .cloned()
            .map(|mut e| {
                e.source = EntrySource::Cached;
                e
            })
            .collect()
    }

    pub async fn store(&self, entries: Vec<HistoryEntry>) -> MorduResult<()> {
        let mut view = self.view.lock().await;
        let previous = std::mem::replace(&mut view.entries, entries);
        if let Err(e) = self.persist(&view).await {
            view.entries = previous;
            return Err(e);
        }
        Ok(())
    }

    pub async fn active(&self) -> Option<String> {
        self.view.lock().await.active.clone()
    }

    pub async fn set_active(&self, id: Option<String>) -> MorduResult<()> {
        let mut view = self.view.lock().await;
        let previous = std::mem::replace(&mut view.active, id);
        if let Err(e) = self.persist(&view).await {
            view.active = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Drop a pending id from the cached view once the server assigned
    /// `server_id`, moving the active reference along with it
    pub async fn retire(&self, pending_id: &str, server_id: &str) -> MorduResult<()> {
        self.drop_pending(pending_id, Some(server_id)).await
    }

    /// Drop a pending id the server will never accept; clears the active
    /// reference when it pointed there
    pub async fn forget(&self, pending_id: &str) -> MorduResult<()> {
        self.drop_pending(pending_id, None).await
    }

    async fn drop_pending(&self, pending_id: &str, replacement: Option<&str>) -> MorduResult<()> {
        let mut view = self.view.lock().await;
        let present = view.entries.iter().any(|e| e.id == pending_id);
        let was_active = view.active.as_deref() == Some(pending_id);
        if !present && !was_active {
            return Ok(());
        }

        let previous_entries = view.entries.clone();
        let previous_active = view.active.clone();
        view.entries.retain(|e| e.id != pending_id);
        if was_active {
            view.active = replacement.map(str::to_string);
        }
        if let Err(e) = self.persist(&view).await {
            view.entries = previous_entries;
            view.active = previous_active;
            return Err(e);
        }
        debug!("Dropped pending id {} (replaced by {:?})", pending_id, replacement);
        Ok(())
    }
}
