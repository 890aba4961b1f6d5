//! Sync module - local to remote synchronization

pub mod engine;
pub mod status;

pub use engine::{SubjectDeletion, SyncEngine, SyncRecord};
pub use status::{CollectionReport, ConnectionState, SyncOutcome, SyncResults, SyncStatus};
