//! Fortune reading model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validate::{validate_birthdate, validate_name, validate_text};
use crate::error::MorduResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Other => "other",
        }
    }
}

/// Concern topic of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Overall,
    Career,
    Finance,
    Love,
    Health,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Overall => "overall",
            Topic::Career => "career",
            Topic::Finance => "finance",
            Topic::Love => "love",
            Topic::Health => "health",
        }
    }

    /// Label shown in history views
    pub fn display_name(&self) -> &'static str {
        match self {
            Topic::Overall => "ภาพรวม",
            Topic::Career => "การงาน",
            Topic::Finance => "การเงิน",
            Topic::Love => "ความรัก",
            Topic::Health => "สุขภาพ",
        }
    }
}

/// Who a reading is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub birthdate: String,
    pub sex: Sex,
    pub topic: Topic,
}

impl Subject {
    pub fn validate(&self) -> MorduResult<()> {
        validate_name(&self.name)?;
        validate_birthdate(&self.birthdate)?;
        Ok(())
    }

    /// Trimmed copy for storage
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            birthdate: self.birthdate.trim().to_string(),
            sex: self.sex,
            topic: self.topic,
        }
    }
}

/// Request body for creating or replacing a reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingInput {
    #[serde(flatten)]
    pub subject: Subject,
    pub text: String,
    /// Origin-reference minted by an offline client
    #[serde(rename = "clientRef", default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl ReadingInput {
    pub fn validate(&self) -> MorduResult<()> {
        self.subject.validate()?;
        validate_text(&self.text)?;
        Ok(())
    }
}

/// A fortune reading as held by the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub birthdate: String,
    pub sex: Sex,
    pub topic: Topic,
    pub text: String,
    #[serde(default)]
    pub prediction: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "clientRef", default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl Reading {
    /// Build an unsaved reading; the store assigns `id` and `created_at`
    pub fn new(input: &ReadingInput, prediction: String) -> Self {
        let subject = input.subject.normalized();
        Self {
            id: String::new(),
            name: subject.name,
            birthdate: subject.birthdate,
            sex: subject.sex,
            topic: subject.topic,
            text: input.text.trim().to_string(),
            prediction,
            created_at: Utc::now(),
            client_ref: input.client_ref.clone(),
        }
    }

    pub fn subject(&self) -> Subject {
        Subject {
            name: self.name.clone(),
            birthdate: self.birthdate.clone(),
            sex: self.sex,
            topic: self.topic,
        }
    }

    /// Replace the user-editable fields, keeping identity and creation time
    pub fn apply(&mut self, input: &ReadingInput, prediction: String) {
        let subject = input.subject.normalized();
        self.name = subject.name;
        self.birthdate = subject.birthdate;
        self.sex = subject.sex;
        self.topic = subject.topic;
        self.text = input.text.trim().to_string();
        self.prediction = prediction;
    }

    pub fn matches_subject(&self, name: &str, birthdate: &str, topic: Topic) -> bool {
        self.name == name && self.birthdate == birthdate && self.topic == topic
    }
}

/// Reading summary for API responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadingSummary {
    pub id: String,
    pub name: String,
    pub birthdate: String,
    pub sex: Sex,
    pub topic: Topic,
    pub text: String,
    pub prediction: String,
    pub created_at: DateTime<Utc>,
}

impl From<Reading> for ReadingSummary {
    fn from(r: Reading) -> Self {
        Self {
            id: r.id,
            name: r.name,
            birthdate: r.birthdate,
            sex: r.sex,
            topic: r.topic,
            text: r.text,
            prediction: r.prediction,
            created_at: r.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ReadingInput {
        serde_json::from_value(serde_json::json!({
            "name": "  Somchai ",
            "birthdate": "01/02/1990",
            "sex": "male",
            "topic": "career",
            "text": " will I get promoted? ",
        }))
        .unwrap()
    }

    #[test]
    fn test_input_flattens_subject() {
        let input = input();
        assert_eq!(input.subject.topic, Topic::Career);
        assert!(input.client_ref.is_none());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_unknown_topic_rejected() {
        let parsed: Result<ReadingInput, _> = serde_json::from_value(serde_json::json!({
            "name": "A",
            "birthdate": "01/02/1990",
            "sex": "male",
            "topic": "lottery",
            "text": "x",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_new_trims_fields() {
        let reading = Reading::new(&input(), "soon".into());
        assert_eq!(reading.name, "Somchai");
        assert_eq!(reading.text, "will I get promoted?");
        assert!(reading.id.is_empty());
        assert!(reading.matches_subject("Somchai", "01/02/1990", Topic::Career));
    }

    #[test]
    fn test_topic_display_name() {
        assert_eq!(Topic::Love.display_name(), "ความรัก");
        assert_eq!(Topic::Overall.as_str(), "overall");
    }
}
