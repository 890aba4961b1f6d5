use chrono::{DateTime, Utc};

use super::LocalRecord;
use crate::models::{ChatSession, Reading};

impl LocalRecord for Reading {
    const COLLECTION: &'static str = "fortunes";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
    }

    fn last_activity(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn client_ref(&self) -> Option<&str> {
        self.client_ref.as_deref()
    }
}

impl LocalRecord for ChatSession {
    const COLLECTION: &'static str = "chats";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
