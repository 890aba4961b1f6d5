//! Sync engine state and reports

use serde::Serialize;

/// Connection state of the engine toward the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Numeric form reported as `mongoState`: 0 disconnected, 1 connected, 2 connecting
    pub fn code(&self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Connecting => 2,
        }
    }
}

/// Snapshot returned by `status()`
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    #[serde(rename = "isConnected")]
    pub is_connected: bool,
    #[serde(rename = "mongoState")]
    pub mongo_state: u8,
    pub state: ConnectionState,
    #[serde(rename = "syncActive")]
    pub sync_active: bool,
    #[serde(rename = "connectionAttempts")]
    pub connection_attempts: u32,
}

/// Per-collection push counts for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub synced: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncResults {
    pub fortunes: CollectionReport,
    pub chats: CollectionReport,
}

/// Result of one sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<SyncResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SyncOutcome {
    pub const UNAVAILABLE_REASON: &'static str = "store unavailable";

    pub fn completed(results: SyncResults) -> Self {
        Self {
            success: true,
            results: Some(results),
            reason: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            success: false,
            results: None,
            reason: Some(Self::UNAVAILABLE_REASON.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_shape() {
        let ok = serde_json::to_value(SyncOutcome::completed(SyncResults::default())).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["results"]["fortunes"]["synced"], 0);
        assert!(ok.get("reason").is_none());

        let down = serde_json::to_value(SyncOutcome::unavailable()).unwrap();
        assert_eq!(down["success"], false);
        assert_eq!(down["reason"], "store unavailable");
        assert!(down.get("results").is_none());
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(ConnectionState::Disconnected.code(), 0);
        assert_eq!(ConnectionState::Connected.code(), 1);
        assert_eq!(ConnectionState::Connecting.code(), 2);
    }
}
