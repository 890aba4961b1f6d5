//! Local-to-remote synchronization engine

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::status::{CollectionReport, ConnectionState, SyncOutcome, SyncResults, SyncStatus};
use crate::config::SyncConfig;
use crate::error::{MorduError, MorduResult};
use crate::models::{ChatSession, Reading, Topic};
use crate::remote::{RecordKind, RemoteCounts, RemoteStore};
use crate::store::{LocalRecord, LocalStore};

/// A local record the engine knows how to copy to the remote store
#[async_trait]
pub trait SyncRecord: LocalRecord {
    const KIND: RecordKind;

    async fn push_to(&self, remote: &dyn RemoteStore) -> MorduResult<()>;

    async fn replace_in(&self, remote: &dyn RemoteStore) -> MorduResult<bool>;
}

#[async_trait]
impl SyncRecord for Reading {
    const KIND: RecordKind = RecordKind::Reading;

    async fn push_to(&self, remote: &dyn RemoteStore) -> MorduResult<()> {
        remote.push_reading(self).await
    }

    async fn replace_in(&self, remote: &dyn RemoteStore) -> MorduResult<bool> {
        remote.replace_reading(self).await
    }
}

#[async_trait]
impl SyncRecord for ChatSession {
    const KIND: RecordKind = RecordKind::Session;

    async fn push_to(&self, remote: &dyn RemoteStore) -> MorduResult<()> {
        remote.push_session(self).await
    }

    async fn replace_in(&self, remote: &dyn RemoteStore) -> MorduResult<bool> {
        remote.replace_session(self).await
    }
}

#[derive(Debug, Default)]
struct Link {
    state: ConnectionState,
    attempts: u32,
}

/// A local change waiting to be applied to the remote store
#[derive(Debug)]
enum Forward {
    Update(RecordKind, String),
    Delete(RecordKind, String),
    DeleteSubject {
        name: String,
        birthdate: String,
        topic: Topic,
        ids: Vec<String>,
    },
}

/// Outcome of deleting readings by subject
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectDeletion {
    pub local: usize,
    /// Remote documents deleted, or `None` when the remote delete was queued
    /// behind a running cycle or an unreachable store
    pub remote: Option<u64>,
}

enum Pushed {
    Inserted,
    AlreadyPresent,
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Pushes local records that the remote store has not confirmed yet.
///
/// Cycles never overlap: the periodic supervisor skips a tick while another
/// cycle holds the cycle lock, and a manual sync waits for it.
pub struct SyncEngine {
    readings: Arc<LocalStore<Reading>>,
    sessions: Arc<LocalStore<ChatSession>>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    link: Mutex<Link>,
    /// Origin-references known to be stored remotely, loaded on (re)connect
    confirmed: Mutex<HashMap<RecordKind, HashSet<String>>>,
    cycle_lock: Mutex<()>,
    /// Updates and deletes deferred while a cycle held the lock or the
    /// remote was unreachable
    forwards: Mutex<Vec<Forward>>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl SyncEngine {
    pub fn new(
        readings: Arc<LocalStore<Reading>>,
        sessions: Arc<LocalStore<ChatSession>>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            readings,
            sessions,
            remote,
            config,
            link: Mutex::new(Link::default()),
            confirmed: Mutex::new(HashMap::new()),
            cycle_lock: Mutex::new(()),
            forwards: Mutex::new(Vec::new()),
            supervisor: Mutex::new(None),
        }
    }

    pub fn readings(&self) -> &Arc<LocalStore<Reading>> {
        &self.readings
    }

    pub fn sessions(&self) -> &Arc<LocalStore<ChatSession>> {
        &self.sessions
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one cycle now, waiting for any cycle already in flight
    pub async fn manual_sync(&self) -> SyncOutcome {
        let _cycle = self.cycle_lock.lock().await;
        self.run_cycle().await
    }

    pub async fn status(&self) -> SyncStatus {
        let link = self.link.lock().await;
        SyncStatus {
            is_connected: link.state == ConnectionState::Connected,
            mongo_state: link.state.code(),
            state: link.state,
            sync_active: self.is_active().await,
            connection_attempts: link.attempts,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.state == ConnectionState::Connected
    }

    /// Whether the periodic supervisor is running
    pub async fn is_active(&self) -> bool {
        self.supervisor
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Start periodic cycles: the first after the configured initial delay,
    /// then one every `interval` measured from the end of the previous cycle.
    pub async fn start(self: &Arc<Self>, interval: Duration) {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            warn!("Periodic sync already running");
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = Arc::clone(self);
        let initial_delay = self.config.initial_delay();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            loop {
                engine.scheduled_cycle().await;
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Periodic sync stopped");
        });

        *supervisor = Some(Supervisor { cancel, handle });
        info!("Periodic sync started (every {:?})", interval);
    }

    /// Cancel the periodic timer. A cycle already running finishes.
    pub async fn stop(&self) {
        if let Some(supervisor) = self.supervisor.lock().await.take() {
            supervisor.cancel.cancel();
            info!("Stopping periodic sync");
        }
    }

    /// Stop and wait for the supervisor, including any in-flight cycle
    pub async fn shutdown(&self) {
        let supervisor = self.supervisor.lock().await.take();
        if let Some(supervisor) = supervisor {
            supervisor.cancel.cancel();
            if let Err(e) = supervisor.handle.await {
                warn!("Sync supervisor ended abnormally: {}", e);
            }
        }
    }

    /// Document counts in the remote store
    pub async fn remote_counts(&self) -> MorduResult<RemoteCounts> {
        if !self.is_connected().await {
            return Err(MorduError::Connectivity(
                SyncOutcome::UNAVAILABLE_REASON.to_string(),
            ));
        }
        let result = self.remote.counts().await;
        if let Err(e) = &result {
            if e.is_connectivity() {
                self.mark_disconnected(e).await;
            }
        }
        result
    }

    /// Forward a local update of a record already stored remotely (last
    /// write wins). Records not confirmed yet reach the remote with the next
    /// push instead.
    pub async fn forward_update(&self, kind: RecordKind, id: &str) {
        self.forward(Forward::Update(kind, id.to_string())).await;
    }

    /// Forward a local delete
    pub async fn forward_delete(&self, kind: RecordKind, id: &str) {
        self.forward(Forward::Delete(kind, id.to_string())).await;
    }

    /// Delete every local reading for one name / birthdate / topic and
    /// forward the same delete to the remote store
    pub async fn delete_readings_by_subject(
        &self,
        name: &str,
        birthdate: &str,
        topic: Topic,
    ) -> MorduResult<SubjectDeletion> {
        let removed = self
            .readings
            .remove_where(|r| r.matches_subject(name, birthdate, topic))
            .await?;
        let ids: Vec<String> = removed.into_iter().map(|r| r.id).collect();
        let local = ids.len();
        let remote = self
            .forward(Forward::DeleteSubject {
                name: name.to_string(),
                birthdate: birthdate.to_string(),
                topic,
                ids,
            })
            .await;
        Ok(SubjectDeletion { local, remote })
    }

    /// Apply `op` now when no cycle is running, otherwise queue it for the
    /// end of the running cycle. Never waits for a cycle. Returns the number
    /// of remote documents affected when applied now.
    async fn forward(&self, op: Forward) -> Option<u64> {
        if let Ok(_cycle) = self.cycle_lock.try_lock() {
            self.drain_forwards().await;
            let applied = self.apply_forward(&op).await;
            if applied.is_none() {
                self.forwards.lock().await.push(op);
            }
            return applied;
        }

        debug!("Sync cycle in flight, deferring {:?}", op);
        self.forwards.lock().await.push(op);
        // The cycle may have finished between the two attempts
        if let Ok(_cycle) = self.cycle_lock.try_lock() {
            self.drain_forwards().await;
        }
        None
    }

    /// Apply queued forwards in order. The caller holds the cycle lock.
    /// Stops at the first one that cannot reach the remote store.
    async fn drain_forwards(&self) {
        let queued = std::mem::take(&mut *self.forwards.lock().await);
        let mut rest = queued.into_iter();
        while let Some(op) = rest.next() {
            if self.apply_forward(&op).await.is_none() {
                let mut forwards = self.forwards.lock().await;
                let newer = std::mem::take(&mut *forwards);
                forwards.push(op);
                forwards.extend(rest);
                forwards.extend(newer);
                return;
            }
        }
    }

    /// `None` when the remote store is not reachable and `op` stays queued
    async fn apply_forward(&self, op: &Forward) -> Option<u64> {
        if !self.is_connected().await {
            return None;
        }
        let result = match op {
            Forward::Update(kind, id) => self.replace_remote(*kind, id).await,
            Forward::Delete(kind, id) => {
                let removed = self.remote.delete(*kind, id).await;
                if removed.is_ok() {
                    self.unconfirm(*kind, id).await;
                }
                removed.map(u64::from)
            }
            Forward::DeleteSubject {
                name,
                birthdate,
                topic,
                ids,
            } => {
                let removed = self
                    .remote
                    .delete_readings_by_subject(name, birthdate, *topic)
                    .await;
                if removed.is_ok() {
                    for id in ids {
                        self.unconfirm(RecordKind::Reading, id).await;
                    }
                }
                removed
            }
        };

        match result {
            Ok(affected) => {
                debug!("Forwarded {:?} ({} remote)", op, affected);
                Some(affected)
            }
            Err(e) if e.is_connectivity() => {
                self.mark_disconnected(&e).await;
                None
            }
            Err(e) => {
                warn!("Failed to forward {:?}: {}", op, e);
                Some(0)
            }
        }
    }

    async fn replace_remote(&self, kind: RecordKind, id: &str) -> MorduResult<u64> {
        if !self.is_confirmed(kind, id).await {
            return Ok(0);
        }
        let replaced = match kind {
            RecordKind::Reading => match self.readings.get(id).await {
                Some(reading) => reading.replace_in(self.remote.as_ref()).await?,
                None => false,
            },
            RecordKind::Session => match self.sessions.get(id).await {
                Some(session) => session.replace_in(self.remote.as_ref()).await?,
                None => false,
            },
        };
        Ok(u64::from(replaced))
    }

    async fn scheduled_cycle(&self) {
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            debug!("Sync cycle still running, skipping tick");
            return;
        };
        let outcome = self.run_cycle().await;
        if let Some(results) = outcome.results {
            let pushed = results.fortunes.synced + results.chats.synced;
            let failed = results.fortunes.failed + results.chats.failed;
            if pushed > 0 || failed > 0 {
                info!("Sync cycle finished: {} pushed, {} failed", pushed, failed);
            }
        }
    }

    async fn run_cycle(&self) -> SyncOutcome {
        if !self.ensure_connected().await {
            return SyncOutcome::unavailable();
        }

        // Taken before any push: a connection lost mid-cycle clears the live index
        let known = self.confirmed.lock().await.clone();
        let mut aborted = false;
        let fortunes = self
            .push_collection(&self.readings, &known, &mut aborted)
            .await;
        let chats = self
            .push_collection(&self.sessions, &known, &mut aborted)
            .await;
        self.drain_forwards().await;

        debug!(
            "Sync cycle: fortunes {}/{} chats {}/{} (synced/failed)",
            fortunes.synced, fortunes.failed, chats.synced, chats.failed
        );
        SyncOutcome::completed(SyncResults { fortunes, chats })
    }

    async fn ensure_connected(&self) -> bool {
        {
            let mut link = self.link.lock().await;
            if link.state == ConnectionState::Connected {
                return true;
            }
            link.state = ConnectionState::Connecting;
        }

        let result = match self.remote.connect().await {
            Ok(()) => self.load_confirmed().await,
            Err(e) => Err(e),
        };

        let mut link = self.link.lock().await;
        match result {
            Ok(()) => {
                link.state = ConnectionState::Connected;
                link.attempts = 0;
                info!("Remote store connected");
                true
            }
            Err(e) => {
                let max = self.config.max_connection_attempts.max(1);
                link.state = ConnectionState::Disconnected;
                link.attempts += 1;
                warn!(
                    "Remote store connection attempt {}/{} failed: {}",
                    link.attempts, max, e
                );
                if link.attempts >= max {
                    error!(
                        "Remote store unreachable after {} attempts, resetting counter",
                        max
                    );
                    link.attempts = 0;
                }
                false
            }
        }
    }

    async fn load_confirmed(&self) -> MorduResult<()> {
        let mut loaded = HashMap::new();
        for kind in [RecordKind::Reading, RecordKind::Session] {
            loaded.insert(kind, self.remote.local_ids(kind).await?);
        }
        *self.confirmed.lock().await = loaded;
        Ok(())
    }

    async fn mark_disconnected(&self, err: &MorduError) {
        let mut link = self.link.lock().await;
        if link.state != ConnectionState::Disconnected {
            warn!("Lost remote store connection: {}", err);
        }
        link.state = ConnectionState::Disconnected;
        self.confirmed.lock().await.clear();
    }

    async fn is_confirmed(&self, kind: RecordKind, id: &str) -> bool {
        self.confirmed
            .lock()
            .await
            .get(&kind)
            .is_some_and(|ids| ids.contains(id))
    }

    async fn confirm(&self, kind: RecordKind, id: &str) {
        self.confirmed
            .lock()
            .await
            .entry(kind)
            .or_default()
            .insert(id.to_string());
    }

    async fn unconfirm(&self, kind: RecordKind, id: &str) {
        if let Some(ids) = self.confirmed.lock().await.get_mut(&kind) {
            ids.remove(id);
        }
    }

    /// Push every unconfirmed record of one collection in storage order.
    /// After a connectivity failure the unconfirmed rest are counted failed
    /// without being attempted.
    async fn push_collection<T: SyncRecord>(
        &self,
        store: &LocalStore<T>,
        known: &HashMap<RecordKind, HashSet<String>>,
        aborted: &mut bool,
    ) -> CollectionReport {
        let mut report = CollectionReport::default();
        let known = known.get(&T::KIND);

        for record in store.snapshot().await {
            if known.is_some_and(|ids| ids.contains(record.id())) {
                continue;
            }
            if *aborted {
                report.failed += 1;
                continue;
            }
            match self.push_one(&record).await {
                Ok(Pushed::Inserted) => report.synced += 1,
                Ok(Pushed::AlreadyPresent) => {}
                Err(e) if e.is_connectivity() => {
                    self.mark_disconnected(&e).await;
                    *aborted = true;
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Failed to sync {} {}: {}", T::COLLECTION, record.id(), e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn push_one<T: SyncRecord>(&self, record: &T) -> MorduResult<Pushed> {
        let id = record.id();
        if self.remote.has_origin(T::KIND, id).await? {
            self.confirm(T::KIND, id).await;
            return Ok(Pushed::AlreadyPresent);
        }

        match record.push_to(self.remote.as_ref()).await {
            Ok(()) => {
                self.confirm(T::KIND, id).await;
                Ok(Pushed::Inserted)
            }
            Err(e) if e.is_duplicate() => {
                debug!("{} {} already stored remotely", T::COLLECTION, id);
                self.confirm(T::KIND, id).await;
                Ok(Pushed::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }
}
