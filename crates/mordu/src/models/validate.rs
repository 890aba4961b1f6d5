//! Field validation shared by the local and remote write paths

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{MorduError, MorduResult};

const MAX_NAME_CHARS: usize = 100;
const MAX_TEXT_CHARS: usize = 2000;
const MAX_MESSAGE_CHARS: usize = 10_000;

static BIRTHDATE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("birthdate pattern"));

pub fn validate_name(name: &str) -> MorduResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MorduError::Validation("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(MorduError::Validation(format!(
            "name must be {} characters or less",
            MAX_NAME_CHARS
        )));
    }
    Ok(())
}

/// Birthdates are `DD/MM/YYYY`
pub fn validate_birthdate(birthdate: &str) -> MorduResult<()> {
    if !BIRTHDATE_FORMAT.is_match(birthdate.trim()) {
        return Err(MorduError::Validation(
            "birthdate must use the DD/MM/YYYY format".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_text(text: &str) -> MorduResult<()> {
    let text = text.trim();
    if text.is_empty() {
        return Err(MorduError::Validation("text is required".to_string()));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(MorduError::Validation(format!(
            "text must be {} characters or less",
            MAX_TEXT_CHARS
        )));
    }
    Ok(())
}

pub fn validate_message(content: &str) -> MorduResult<()> {
    if content.trim().is_empty() {
        return Err(MorduError::Validation(
            "message content is required".to_string(),
        ));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(MorduError::Validation(format!(
            "message must be {} characters or less",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}

pub fn validate_user_id(user_id: &str) -> MorduResult<()> {
    if user_id.trim().is_empty() {
        return Err(MorduError::Validation("userId is required".to_string()));
    }
    Ok(())
}
