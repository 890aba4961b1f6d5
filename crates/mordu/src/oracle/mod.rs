//! Fortune completion provider
//!
//! The provider itself sits behind [`CompletionProvider`]. [`Oracle`] builds
//! the persona prompt from the reading subject and never fails: any provider
//! error is replaced with a fixed fallback text.

mod typhoon;

pub use typhoon::TyphoonClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::MorduResult;
use crate::models::{Role, Subject};

/// Shown when the provider is unreachable or errors
pub const FALLBACK_PREDICTION: &str = "เซิร์ฟเวอร์พลังงานจักรวาลล่ม ติดต่อไม่ได้ ลองใหม่อีกที";

/// Shown when no API key is configured
pub const MISSING_KEY_PREDICTION: &str =
    "ไม่พบ API Key สำหรับการเชื่อมต่อ AI กรุณาตรวจสอบการตั้งค่า";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn from_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: match role {
                Role::User => "user",
                Role::Assistant => "assistant",
            }
            .to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, messages: &[PromptMessage]) -> MorduResult<String>;
}

/// Completion provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.opentyphoon.ai/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "typhoon-v2.1-12b-instruct".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    256
}

fn default_top_p() -> f32 {
    0.8
}

fn default_repetition_penalty() -> f32 {
    1.1
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// System prompt for the fortune-teller persona
pub fn persona_prompt(subject: &Subject) -> String {
    format!(
        "คุณคือ \"อาจารย์คม\" หมอดูสายตรงที่อ่านดวงตามความเป็นจริงโดยใช้หลักโหราศาสตร์ และ ดวงชะตา \
สไตล์การพูดของคุณคือ ตรงไปตรงมา ขวานผ่าซาก เพื่อกระตุ้นให้คนฟังยอมรับความจริง \
ใช้ข้อมูลวันเกิดและคำถามของผู้ใช้เพื่อชี้ให้เห็นความจริง จุดอ่อนที่อาจมองข้าม และทางออกที่ต้องลงมือทำจริง \
ตอบสั้นๆ 4-5 ประโยคแต่ได้ใจความ\n\
---\n\
ข้อมูลผู้ใช้:\n\
- ชื่อ: {}\n\
- วันเกิด: {}\n\
- เพศ: {}\n\
- หัวข้อที่กังวล: {}\n\
---",
        subject.name,
        subject.birthdate,
        subject.sex.as_str(),
        subject.topic.as_str()
    )
}

/// Prediction front end over an optional provider
#[derive(Clone)]
pub struct Oracle {
    provider: Option<Arc<dyn CompletionProvider>>,
}

impl Oracle {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// An oracle with no provider configured
    pub fn unconfigured() -> Self {
        Self { provider: None }
    }

    /// Build from config and an optional API key
    pub fn from_config(config: OracleConfig, api_key: Option<String>) -> MorduResult<Self> {
        match api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(Self::new(Arc::new(TyphoonClient::new(config, key)?))),
            None => {
                warn!("No completion API key configured; predictions use a fixed notice");
                Ok(Self::unconfigured())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Predict for a single question
    pub async fn predict(&self, subject: &Subject, question: &str) -> String {
        self.converse(subject, &[PromptMessage::user(question)]).await
    }

    /// Predict with prior conversation turns
    pub async fn converse(&self, subject: &Subject, messages: &[PromptMessage]) -> String {
        let Some(provider) = &self.provider else {
            return MISSING_KEY_PREDICTION.to_string();
        };
        match provider.complete(&persona_prompt(subject), messages).await {
            Ok(text) => text,
            Err(e) => {
                error!("Completion provider failed: {}", e);
                FALLBACK_PREDICTION.to_string()
            }
        }
    }
}
