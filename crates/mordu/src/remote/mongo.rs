use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::info;

use super::{RecordKind, RemoteCounts, RemoteStore};
use crate::config::SyncConfig;
use crate::db::MongoDb;
use crate::error::{MorduError, MorduResult};
use crate::models::{ChatDoc, ChatSession, PaginatedResponse, Reading, ReadingDoc, Topic};
use crate::services::{ChatService, ReadingService};

/// MongoDB-backed remote store. The client is created lazily on the first
/// successful `connect` and reused afterwards; every call is bounded by the
/// configured operation timeout.
pub struct MongoRemote {
    uri: String,
    db_name: String,
    config: SyncConfig,
    db: RwLock<Option<MongoDb>>,
}

impl MongoRemote {
    pub fn new(uri: impl Into<String>, db_name: impl Into<String>, config: SyncConfig) -> Self {
        Self {
            uri: uri.into(),
            db_name: db_name.into(),
            config,
            db: RwLock::new(None),
        }
    }

    async fn handle(&self) -> MorduResult<MongoDb> {
        self.db
            .read()
            .await
            .clone()
            .ok_or_else(|| MorduError::Connectivity("MongoDB not available".to_string()))
    }

    async fn bounded<T>(&self, fut: impl Future<Output = MorduResult<T>>) -> MorduResult<T> {
        tokio::time::timeout(self.config.operation_timeout(), fut).await?
    }

    async fn readings(&self) -> MorduResult<ReadingService> {
        Ok(ReadingService::new(self.handle().await?))
    }

    async fn chats(&self) -> MorduResult<ChatService> {
        Ok(ChatService::new(self.handle().await?))
    }
}

#[async_trait]
impl RemoteStore for MongoRemote {
    async fn connect(&self) -> MorduResult<()> {
        let existing = self.db.read().await.clone();
        if let Some(db) = existing {
            return self.bounded(db.ping()).await;
        }

        let db = self
            .bounded(MongoDb::connect(&self.uri, &self.db_name, &self.config))
            .await?;
        *self.db.write().await = Some(db);
        info!("Remote store ready: {}", self.db_name);
        Ok(())
    }

    async fn local_ids(&self, kind: RecordKind) -> MorduResult<HashSet<String>> {
        match kind {
            RecordKind::Reading => self.bounded(self.readings().await?.local_ids()).await,
            RecordKind::Session => self.bounded(self.chats().await?.local_ids()).await,
        }
    }

    async fn has_origin(&self, kind: RecordKind, local_id: &str) -> MorduResult<bool> {
        match kind {
            RecordKind::Reading => {
                self.bounded(self.readings().await?.has_local_id(local_id))
                    .await
            }
            RecordKind::Session => self.bounded(self.chats().await?.has_local_id(local_id)).await,
        }
    }

    async fn push_reading(&self, reading: &Reading) -> MorduResult<()> {
        let doc = ReadingDoc::from_local(reading);
        self.bounded(self.readings().await?.create(&doc)).await?;
        Ok(())
    }

    async fn push_session(&self, session: &ChatSession) -> MorduResult<()> {
        let doc = ChatDoc::from_local(session);
        self.bounded(self.chats().await?.create(&doc)).await?;
        Ok(())
    }

    async fn replace_reading(&self, reading: &Reading) -> MorduResult<bool> {
        self.bounded(self.readings().await?.replace(reading)).await
    }

    async fn replace_session(&self, session: &ChatSession) -> MorduResult<bool> {
        self.bounded(self.chats().await?.replace(session)).await
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> MorduResult<bool> {
        match kind {
            RecordKind::Reading => self.bounded(self.readings().await?.delete(id)).await,
            RecordKind::Session => self.bounded(self.chats().await?.delete(id)).await,
        }
    }

    async fn delete_readings_by_subject(
        &self,
        name: &str,
        birthdate: &str,
        topic: Topic,
    ) -> MorduResult<u64> {
        self.bounded(
            self.readings()
                .await?
                .delete_by_subject(name, birthdate, topic),
        )
        .await
    }

    async fn list_readings(&self, page: u64, limit: u64) -> MorduResult<PaginatedResponse<Reading>> {
        self.bounded(self.readings().await?.list(page, limit)).await
    }

    async fn get_reading(&self, id: &str) -> MorduResult<Option<Reading>> {
        self.bounded(self.readings().await?.get(id)).await
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
    ) -> MorduResult<PaginatedResponse<ChatSession>> {
        self.bounded(self.chats().await?.list_by_user(user_id, page, limit))
            .await
    }

    async fn get_session(&self, id: &str) -> MorduResult<Option<ChatSession>> {
        self.bounded(self.chats().await?.get(id)).await
    }

    async fn counts(&self) -> MorduResult<RemoteCounts> {
        let fortunes = self.bounded(self.readings().await?.count()).await?;
        let chats = self.bounded(self.chats().await?.count()).await?;
        Ok(RemoteCounts { fortunes, chats })
    }
}
