//! HTTP API routes

pub mod chat;
pub mod fortune;
pub mod sync;

use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::oracle::Oracle;
use crate::sync::SyncEngine;

/// Shared state for the API handlers
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub oracle: Oracle,
    /// Reported by the health endpoint
    pub environment: String,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>, oracle: Oracle, environment: impl Into<String>) -> Self {
        Self {
            engine,
            oracle,
            environment: environment.into(),
        }
    }
}

/// Which store a list endpoint reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Remote when connected, otherwise local
    #[default]
    Auto,
    Local,
    Remote,
}

/// All API routes, relative to the `/api` prefix
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(fortune::fortune_routes())
        .merge(chat::chat_routes())
        .merge(sync::sync_routes())
}

/// Mount the API under `/api`
pub fn configure(state: Arc<AppState>) -> Router {
    Router::new().nest("/api", api_routes()).with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::SyncConfig;
    use crate::oracle::testing::ScriptedProvider;
    use crate::remote::memory::MemoryRemote;
    use crate::store::LocalStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub struct TestApp {
        pub _dir: TempDir,
        pub remote: Arc<MemoryRemote>,
        pub state: Arc<AppState>,
    }

    impl TestApp {
        pub async fn new() -> Self {
            Self::with_provider(ScriptedProvider::answering("the stars agree")).await
        }

        pub async fn with_provider(provider: ScriptedProvider) -> Self {
            let dir = TempDir::new().unwrap();
            let readings = Arc::new(LocalStore::open(dir.path()).await.unwrap());
            let sessions = Arc::new(LocalStore::open(dir.path()).await.unwrap());
            let remote = Arc::new(MemoryRemote::new());
            let engine = Arc::new(SyncEngine::new(
                readings,
                sessions,
                remote.clone(),
                SyncConfig::default(),
            ));
            let oracle = Oracle::new(Arc::new(provider));
            let state = Arc::new(AppState::new(engine, oracle, "test"));
            Self {
                _dir: dir,
                remote,
                state,
            }
        }

        pub async fn call(
            &self,
            method: &str,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = configure(self.state.clone())
                .oneshot(request)
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }
}
