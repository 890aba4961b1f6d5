//! Remote authoritative store
//!
//! [`RemoteStore`] is the seam the sync engine and the HTTP routes depend on.
//! [`MongoRemote`] is the production implementation.

mod mongo;

#[cfg(test)]
pub(crate) mod memory;

pub use mongo::MongoRemote;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;

use crate::db::collections;
use crate::error::MorduResult;
use crate::models::{ChatSession, PaginatedResponse, Reading, Topic};

/// Which collection a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Reading,
    Session,
}

impl RecordKind {
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Reading => collections::FORTUNES,
            RecordKind::Session => collections::CHATS,
        }
    }
}

/// Document counts per remote collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoteCounts {
    pub fortunes: u64,
    pub chats: u64,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Establish the connection, or verify an existing one
    async fn connect(&self) -> MorduResult<()>;

    /// Every origin-reference stored in the collection
    async fn local_ids(&self, kind: RecordKind) -> MorduResult<HashSet<String>>;

    async fn has_origin(&self, kind: RecordKind, local_id: &str) -> MorduResult<bool>;

    /// Insert a remote copy of a local reading keyed by its id.
    /// Fails with `Duplicate` when the origin-reference is already stored.
    async fn push_reading(&self, reading: &Reading) -> MorduResult<()>;

    async fn push_session(&self, session: &ChatSession) -> MorduResult<()>;

    async fn replace_reading(&self, reading: &Reading) -> MorduResult<bool>;

    async fn replace_session(&self, session: &ChatSession) -> MorduResult<bool>;

    async fn delete(&self, kind: RecordKind, id: &str) -> MorduResult<bool>;

    async fn delete_readings_by_subject(
        &self,
        name: &str,
        birthdate: &str,
        topic: Topic,
    ) -> MorduResult<u64>;

    async fn list_readings(&self, page: u64, limit: u64) -> MorduResult<PaginatedResponse<Reading>>;

    async fn get_reading(&self, id: &str) -> MorduResult<Option<Reading>>;

    async fn list_sessions(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
    ) -> MorduResult<PaginatedResponse<ChatSession>>;

    async fn get_session(&self, id: &str) -> MorduResult<Option<ChatSession>>;

    async fn counts(&self) -> MorduResult<RemoteCounts>;
}
