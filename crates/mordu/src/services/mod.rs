//! MongoDB services for readings and chat sessions

pub mod chat_service;
pub mod reading_service;

pub use chat_service::ChatService;
pub use reading_service::ReadingService;

use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::FindOptions;
use std::collections::HashSet;

use crate::db::MongoDb;
use crate::error::MorduResult;

/// Filter addressing a document by its public id: the origin-reference for
/// pushed records, or the ObjectId hex for documents created remotely.
pub(crate) fn public_id_filter(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { "$or": [ { "_id": oid }, { "local_id": id } ] },
        Err(_) => doc! { "local_id": id },
    }
}

/// All origin-references stored in `collection`
pub(crate) async fn origin_ids(db: &MongoDb, collection: &str) -> MorduResult<HashSet<String>> {
    let coll = db.collection::<Document>(collection);
    let options = FindOptions::builder()
        .projection(doc! { "local_id": 1, "_id": 0 })
        .build();
    let cursor = coll
        .find(doc! { "local_id": { "$exists": true } }, options)
        .await?;
    let docs: Vec<Document> = cursor.try_collect().await?;

    Ok(docs
        .iter()
        .filter_map(|d| d.get_str("local_id").ok())
        .map(str::to_string)
        .collect())
}

pub(crate) async fn origin_exists(db: &MongoDb, collection: &str, local_id: &str) -> MorduResult<bool> {
    let coll = db.collection::<Document>(collection);
    let count = coll
        .count_documents(doc! { "local_id": local_id }, None)
        .await?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_id_filter_for_local_id() {
        let filter = public_id_filter("1700000000000abcdefghi");
        assert_eq!(filter.get_str("local_id").unwrap(), "1700000000000abcdefghi");
    }

    #[test]
    fn test_public_id_filter_for_object_id() {
        let oid = ObjectId::new();
        let filter = public_id_filter(&oid.to_hex());
        let branches = filter.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
    }
}
