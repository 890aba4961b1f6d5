//! mordu record synchronization
//!
//! Fortune readings and chat sessions are written to a local JSON store that
//! always accepts writes, then pushed to MongoDB whenever it is reachable.
//!
//! # Features
//! - Local durable store (one JSON file per collection, atomic replace)
//! - Remote MongoDB store with a unique origin-reference index
//! - Periodic, non-overlapping sync engine with connection backoff
//! - Offline client queue, flusher and history reconciliation
//! - Axum routes for readings, chats, sync and health

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod oracle;
pub mod remote;
pub mod routes;
pub mod services;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use db::MongoDb;
pub use error::{MorduError, MorduResult};
