//! Chat session service for MongoDB

use futures::TryStreamExt;
use mongodb::bson::{self, doc};
use mongodb::options::FindOptions;
use std::collections::HashSet;

use super::{origin_exists, origin_ids, public_id_filter};
use crate::db::{collections, MongoDb};
use crate::error::MorduResult;
use crate::models::mongo::MessageDoc;
use crate::models::{page_offset, ChatDoc, ChatSession, PaginatedResponse};

pub struct ChatService {
    db: MongoDb,
}

impl ChatService {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }

    fn coll(&self) -> mongodb::Collection<ChatDoc> {
        self.db.collection::<ChatDoc>(collections::CHATS)
    }

    pub async fn create(&self, doc: &ChatDoc) -> MorduResult<String> {
        let result = self.coll().insert_one(doc, None).await?;
        let id = result
            .inserted_id
            .as_object_id()
            .map(|oid| oid.to_hex())
            .unwrap_or_default();
        Ok(id)
    }

    pub async fn has_local_id(&self, local_id: &str) -> MorduResult<bool> {
        origin_exists(&self.db, collections::CHATS, local_id).await
    }

    pub async fn local_ids(&self) -> MorduResult<HashSet<String>> {
        origin_ids(&self.db, collections::CHATS).await
    }

    /// Sessions of one user, most recently updated first
    pub async fn list_by_user(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
    ) -> MorduResult<PaginatedResponse<ChatSession>> {
        let skip = page_offset(page, limit);
        let coll = self.coll();
        let filter = doc! { "user_id": user_id };
        let total = coll.count_documents(filter.clone(), None).await?;

        let options = FindOptions::builder()
            .sort(doc! { "updated_at": -1 })
            .skip(skip)
            .limit(limit as i64)
            .build();

        let cursor = coll.find(filter, options).await?;
        let docs: Vec<ChatDoc> = cursor.try_collect().await?;
        let items = docs.into_iter().map(ChatSession::from).collect();

        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    pub async fn get(&self, id: &str) -> MorduResult<Option<ChatSession>> {
        let doc = self.coll().find_one(public_id_filter(id), None).await?;
        Ok(doc.map(ChatSession::from))
    }

    /// Overwrite the message list of a session (last write wins)
    pub async fn replace(&self, session: &ChatSession) -> MorduResult<bool> {
        let messages: Vec<MessageDoc> = session.messages.iter().map(MessageDoc::from).collect();
        let result = self
            .coll()
            .update_one(
                public_id_filter(&session.id),
                doc! {
                    "$set": {
                        "messages": bson::to_bson(&messages)?,
                        "updated_at": bson::DateTime::from_chrono(session.updated_at),
                    }
                },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn delete(&self, id: &str) -> MorduResult<bool> {
        let result = self.coll().delete_one(public_id_filter(id), None).await?;
        Ok(result.deleted_count > 0)
    }

    pub async fn count(&self) -> MorduResult<u64> {
        Ok(self.coll().count_documents(doc! {}, None).await?)
    }
}
