//! MongoDB document shapes for readings and chat sessions
//!
//! The `local_id` field carries the origin-reference of a record pushed from
//! the local store; it is unique among documents that have one.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::chat::{ChatMessage, ChatSession, EditSnapshot, Role};
use super::reading::{Reading, Sex, Topic};

/// Fortune reading document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
    pub name: String,
    pub birthdate: String,
    pub sex: Sex,
    pub topic: Topic,
    pub text: String,
    #[serde(default)]
    pub prediction: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ReadingDoc {
    /// Remote copy of a local reading, keyed by its local id
    pub fn from_local(reading: &Reading) -> Self {
        Self {
            id: None,
            local_id: Some(reading.id.clone()),
            client_ref: reading.client_ref.clone(),
            name: reading.name.clone(),
            birthdate: reading.birthdate.clone(),
            sex: reading.sex,
            topic: reading.topic,
            text: reading.text.clone(),
            prediction: reading.prediction.clone(),
            created_at: reading.created_at,
        }
    }
}

impl From<ReadingDoc> for Reading {
    fn from(doc: ReadingDoc) -> Self {
        Self {
            id: public_id(doc.local_id, doc.id),
            name: doc.name,
            birthdate: doc.birthdate,
            sex: doc.sex,
            topic: doc.topic,
            text: doc.text,
            prediction: doc.prediction,
            created_at: doc.created_at,
            client_ref: doc.client_ref,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditDoc {
    pub content: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDoc {
    pub content: String,
    pub role: Role,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub edit_history: Vec<EditDoc>,
}

/// Chat session document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<MessageDoc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ChatDoc {
    pub fn from_local(session: &ChatSession) -> Self {
        Self {
            id: None,
            local_id: Some(session.id.clone()),
            user_id: session.user_id.clone(),
            messages: session.messages.iter().map(MessageDoc::from).collect(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

impl From<&ChatMessage> for MessageDoc {
    fn from(m: &ChatMessage) -> Self {
        Self {
            content: m.content.clone(),
            role: m.role,
            timestamp: m.timestamp,
            edited: m.edited,
            edit_history: m
                .edit_history
                .iter()
                .map(|s| EditDoc {
                    content: s.content.clone(),
                    timestamp: s.timestamp,
                })
                .collect(),
        }
    }
}

impl From<MessageDoc> for ChatMessage {
    fn from(m: MessageDoc) -> Self {
        Self {
            content: m.content,
            role: m.role,
            timestamp: m.timestamp,
            edited: m.edited,
            edit_history: m
                .edit_history
                .into_iter()
                .map(|s| EditSnapshot {
                    content: s.content,
                    timestamp: s.timestamp,
                })
                .collect(),
        }
    }
}

impl From<ChatDoc> for ChatSession {
    fn from(doc: ChatDoc) -> Self {
        Self {
            id: public_id(doc.local_id, doc.id),
            user_id: doc.user_id,
            messages: doc.messages.into_iter().map(ChatMessage::from).collect(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

/// Records pushed from the local store keep their local id; documents created
/// directly in MongoDB are addressed by their ObjectId.
fn public_id(local_id: Option<String>, oid: Option<ObjectId>) -> String {
    local_id
        .filter(|id| !id.is_empty())
        .or_else(|| oid.map(|o| o.to_hex()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;

    fn reading() -> Reading {
        Reading {
            id: "1700000000000abc".into(),
            name: "Malee".into(),
            birthdate: "02/03/1991".into(),
            sex: Sex::Female,
            topic: Topic::Love,
            text: "q".into(),
            prediction: "p".into(),
            created_at: Utc::now(),
            client_ref: Some("local-42".into()),
        }
    }

    #[test]
    fn test_public_id_prefers_local_id() {
        let mut doc = ReadingDoc::from_local(&reading());
        doc.id = Some(ObjectId::new());
        let back = Reading::from(doc);
        assert_eq!(back.id, "1700000000000abc");
        assert_eq!(back.client_ref.as_deref(), Some("local-42"));
    }

    #[test]
    fn test_public_id_falls_back_to_object_id() {
        let oid = ObjectId::new();
        let mut doc = ReadingDoc::from_local(&reading());
        doc.local_id = None;
        doc.id = Some(oid);
        assert_eq!(Reading::from(doc).id, oid.to_hex());
    }

    #[test]
    fn test_reading_doc_bson_shape() {
        let doc = bson::to_document(&ReadingDoc::from_local(&reading())).unwrap();
        assert!(doc.get("_id").is_none());
        assert_eq!(doc.get_str("local_id").unwrap(), "1700000000000abc");
        assert_eq!(doc.get_str("topic").unwrap(), "love");
        assert!(doc.get_datetime("created_at").is_ok());
    }

    #[test]
    fn test_chat_doc_keeps_edit_history() {
        let mut session = ChatSession::new("u1").unwrap();
        session.id = "s1".into();
        session.push_message(Role::User, "hello").unwrap();
        session.edit_message(0, "hello there").unwrap();

        let doc = ChatDoc::from_local(&session);
        let back = ChatSession::from(doc);
        assert_eq!(back.id, "s1");
        assert_eq!(back.messages[0].edit_history[0].content, "hello");
        assert!(back.messages[0].edited);
    }
}
