//! Data models

pub mod chat;
pub mod common;
pub mod mongo;
pub mod reading;
pub mod validate;

pub use chat::{ChatMessage, ChatSession, EditSnapshot, Role};
pub use common::{page_bounds, page_offset, PaginatedResponse};
pub use mongo::{ChatDoc, ReadingDoc};
pub use reading::{Reading, ReadingInput, ReadingSummary, Sex, Subject, Topic};
