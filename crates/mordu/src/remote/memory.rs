//! In-memory remote store for tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{RecordKind, RemoteCounts, RemoteStore};
use crate::error::{MorduError, MorduResult};
use crate::models::{page_offset, ChatSession, PaginatedResponse, Reading, Topic};

/// Enforces the unique origin-reference like the real index does. Can be
/// switched unreachable, slowed down, or told to go down after N pushes.
#[derive(Default)]
pub(crate) struct MemoryRemote {
    unreachable: AtomicBool,
    hide_origins: AtomicBool,
    latency_ms: AtomicUsize,
    fail_after_pushes: Mutex<Option<usize>>,
    failing_ids: Mutex<HashSet<String>>,
    pub readings: Mutex<Vec<Reading>>,
    pub sessions: Mutex<Vec<ChatSession>>,
    pub connect_calls: AtomicUsize,
    pub push_calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Make `has_origin` / `local_ids` report nothing, as if another writer
    /// inserted between the check and the push
    pub fn hide_origins(&self, hide: bool) {
        self.hide_origins.store(hide, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn go_down_after_pushes(&self, n: usize) {
        *self.fail_after_pushes.lock().unwrap() = Some(n);
    }

    pub fn fail_id(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    /// Back online with no injected failures
    pub fn recover(&self) {
        *self.fail_after_pushes.lock().unwrap() = None;
        self.failing_ids.lock().unwrap().clear();
        self.set_reachable(true);
    }

    pub fn reading_ids(&self) -> Vec<String> {
        self.readings
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    async fn gate(&self) -> MorduResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency as u64)).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MorduError::Connectivity("remote unreachable".into()));
        }
        Ok(())
    }

    async fn gate_push(&self, id: &str) -> MorduResult<()> {
        self.gate().await?;
        let pushes = self.push_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_after_pushes.lock().unwrap() {
            if pushes >= limit {
                self.set_reachable(false);
                return Err(MorduError::Connectivity("connection reset".into()));
            }
        }
        if self.failing_ids.lock().unwrap().contains(id) {
            return Err(MorduError::Database("document failed validation".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn connect(&self) -> MorduResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await
    }

    async fn local_ids(&self, kind: RecordKind) -> MorduResult<HashSet<String>> {
        self.gate().await?;
        if self.hide_origins.load(Ordering::SeqCst) {
            return Ok(HashSet::new());
        }
        Ok(match kind {
            RecordKind::Reading => self.reading_ids().into_iter().collect(),
            RecordKind::Session => self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.id.clone())
                .collect(),
        })
    }

    async fn has_origin(&self, kind: RecordKind, local_id: &str) -> MorduResult<bool> {
        Ok(self.local_ids(kind).await?.contains(local_id))
    }

    async fn push_reading(&self, reading: &Reading) -> MorduResult<()> {
        self.gate_push(&reading.id).await?;
        let mut readings = self.readings.lock().unwrap();
        if readings.iter().any(|r| r.id == reading.id) {
            return Err(MorduError::Duplicate(reading.id.clone()));
        }
        readings.push(reading.clone());
        Ok(())
    }

    async fn push_session(&self, session: &ChatSession) -> MorduResult<()> {
        self.gate_push(&session.id).await?;
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.iter().any(|s| s.id == session.id) {
            return Err(MorduError::Duplicate(session.id.clone()));
        }
        sessions.push(session.clone());
        Ok(())
    }

    async fn replace_reading(&self, reading: &Reading) -> MorduResult<bool> {
        self.gate().await?;
        let mut readings = self.readings.lock().unwrap();
        match readings.iter_mut().find(|r| r.id == reading.id) {
            Some(existing) => {
                *existing = reading.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_session(&self, session: &ChatSession) -> MorduResult<bool> {
        self.gate().await?;
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> MorduResult<bool> {
        self.gate().await?;
        let removed = match kind {
            RecordKind::Reading => {
                let mut readings = self.readings.lock().unwrap();
                let before = readings.len();
                readings.retain(|r| r.id != id);
                before != readings.len()
            }
            RecordKind::Session => {
                let mut sessions = self.sessions.lock().unwrap();
                let before = sessions.len();
                sessions.retain(|s| s.id != id);
                before != sessions.len()
            }
        };
        Ok(removed)
    }

    async fn delete_readings_by_subject(
        &self,
        name: &str,
        birthdate: &str,
        topic: Topic,
    ) -> MorduResult<u64> {
        self.gate().await?;
        let mut readings = self.readings.lock().unwrap();
        let before = readings.len();
        readings.retain(|r| !r.matches_subject(name, birthdate, topic));
        Ok((before - readings.len()) as u64)
    }

    async fn list_readings(&self, page: u64, limit: u64) -> MorduResult<PaginatedResponse<Reading>> {
        self.gate().await?;
        let mut items = self.readings.lock().unwrap().clone();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = items.len() as u64;
        let skip = usize::try_from(page_offset(page, limit)).unwrap_or(usize::MAX);
        let items = items.into_iter().skip(skip).take(limit as usize).collect();
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    async fn get_reading(&self, id: &str) -> MorduResult<Option<Reading>> {
        self.gate().await?;
        Ok(self
            .readings
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
    ) -> MorduResult<PaginatedResponse<ChatSession>> {
        self.gate().await?;
        let mut items: Vec<ChatSession> = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let total = items.len() as u64;
        let skip = usize::try_from(page_offset(page, limit)).unwrap_or(usize::MAX);
        let items = items.into_iter().skip(skip).take(limit as usize).collect();
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    async fn get_session(&self, id: &str) -> MorduResult<Option<ChatSession>> {
        self.gate().await?;
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn counts(&self) -> MorduResult<RemoteCounts> {
        self.gate().await?;
        Ok(RemoteCounts {
            fortunes: self.readings.lock().unwrap().len() as u64,
            chats: self.sessions.lock().unwrap().len() as u64,
        })
    }
}
