//! Reading service for MongoDB

use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use std::collections::HashSet;

use super::{origin_exists, origin_ids, public_id_filter};
use crate::db::{collections, MongoDb};
use crate::error::MorduResult;
use crate::models::{page_offset, PaginatedResponse, Reading, ReadingDoc, Topic};

pub struct ReadingService {
    db: MongoDb,
}

impl ReadingService {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }

    fn coll(&self) -> mongodb::Collection<ReadingDoc> {
        self.db.collection::<ReadingDoc>(collections::FORTUNES)
    }

    /// Insert a reading document; returns the ObjectId hex
    pub async fn create(&self, doc: &ReadingDoc) -> MorduResult<String> {
        let result = self.coll().insert_one(doc, None).await?;
        let id = result
            .inserted_id
            .as_object_id()
            .map(|oid| oid.to_hex())
            .unwrap_or_default();
        Ok(id)
    }

    pub async fn has_local_id(&self, local_id: &str) -> MorduResult<bool> {
        origin_exists(&self.db, collections::FORTUNES, local_id).await
    }

    pub async fn local_ids(&self) -> MorduResult<HashSet<String>> {
        origin_ids(&self.db, collections::FORTUNES).await
    }

    /// Readings sorted by creation time, newest first
    pub async fn list(&self, page: u64, limit: u64) -> MorduResult<PaginatedResponse<Reading>> {
        let skip = page_offset(page, limit);
        let coll = self.coll();
        let total = coll.count_documents(doc! {}, None).await?;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(skip)
            .limit(limit as i64)
            .build();

        let cursor = coll.find(doc! {}, options).await?;
        let docs: Vec<ReadingDoc> = cursor.try_collect().await?;
        let items = docs.into_iter().map(Reading::from).collect();

        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    pub async fn get(&self, id: &str) -> MorduResult<Option<Reading>> {
        let doc = self.coll().find_one(public_id_filter(id), None).await?;
        Ok(doc.map(Reading::from))
    }

    /// Overwrite the editable fields of a reading (last write wins)
    pub async fn replace(&self, reading: &Reading) -> MorduResult<bool> {
        let result = self
            .coll()
            .update_one(
                public_id_filter(&reading.id),
                doc! {
                    "$set": {
                        "name": &reading.name,
                        "birthdate": &reading.birthdate,
                        "sex": reading.sex.as_str(),
                        "topic": reading.topic.as_str(),
                        "text": &reading.text,
                        "prediction": &reading.prediction,
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

    /// Delete every reading for a name / birthdate / topic combination
    pub async fn delete_by_subject(
        &self,
        name: &str,
        birthdate: &str,
        topic: Topic,
    ) -> MorduResult<u64> {
        let result = self
            .coll()
            .delete_many(
                doc! { "name": name, "birthdate": birthdate, "topic": topic.as_str() },
                None,
            )
            .await?;
        Ok(result.deleted_count)
    }

    pub async fn count(&self) -> MorduResult<u64> {
        Ok(self.coll().count_documents(doc! {}, None).await?)
    }
}
