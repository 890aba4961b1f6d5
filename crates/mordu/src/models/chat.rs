//! Chat session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validate::{validate_message, validate_user_id};
use crate::error::{MorduError, MorduResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Content a message held before an edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditSnapshot {
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
    #[serde(rename = "editHistory", default)]
    pub edit_history: Vec<EditSnapshot>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role,
            timestamp: Utc::now(),
            edited: false,
            edit_history: Vec::new(),
        }
    }
}

/// Ordered conversation belonging to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Build an unsaved session; the store assigns `id` and timestamps
    pub fn new(user_id: &str) -> MorduResult<Self> {
        validate_user_id(user_id)?;
        let now = Utc::now();
        Ok(Self {
            id: String::new(),
            user_id: user_id.trim().to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn push_message(&mut self, role: Role, content: &str) -> MorduResult<()> {
        validate_message(content)?;
        self.messages.push(ChatMessage::new(role, content));
        Ok(())
    }

    /// Replace the content of message `index`, keeping the previous content
    /// in its edit history. Other messages are untouched.
    pub fn edit_message(&mut self, index: usize, content: &str) -> MorduResult<&ChatMessage> {
        validate_message(content)?;
        if index >= self.messages.len() {
            return Err(MorduError::NotFound(format!(
                "message {} in chat {}",
                index, self.id
            )));
        }
        let message = &mut self.messages[index];

        let now = Utc::now();
        let previous = std::mem::replace(&mut message.content, content.to_string());
        message.edit_history.push(EditSnapshot {
            content: previous,
            timestamp: message.timestamp,
        });
        message.edited = true;
        message.timestamp = now;
        Ok(message)
    }

    /// Remove exactly one message, preserving the order of the rest
    pub fn delete_message(&mut self, index: usize) -> MorduResult<ChatMessage> {
        if index >= self.messages.len() {
            return Err(MorduError::NotFound(format!(
                "message {} in chat {}",
                index, self.id
            )));
        }
        Ok(self.messages.remove(index))
    }

    pub fn last_message_time(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map(|m| m.timestamp)
            .unwrap_or(self.updated_at)
    }
}
