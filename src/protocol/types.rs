//! Shared measurement types
//!
//! These types are produced by the protocol adapters and consumed by the
//! checker and the report renderer.

use serde::Serialize;

use super::Protocol;

/// Which node a query was issued against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Public,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Public => write!(f, "public"),
        }
    }
}

/// Tri-state syncing flag as reported by a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFlag {
    Syncing,
    NotSyncing,
    /// Node exposes no flag, or returned null
    Unknown,
}

impl SyncFlag {
    pub fn from_bool(syncing: bool) -> Self {
        if syncing {
            SyncFlag::Syncing
        } else {
            SyncFlag::NotSyncing
        }
    }

    /// Only an explicit `Syncing` counts; `Unknown` never forces a verdict
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncFlag::Syncing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncFlag::Syncing => "true",
            SyncFlag::NotSyncing => "false",
            SyncFlag::Unknown => "unknown",
        }
    }
}

/// Normalized view of one node's head
///
/// `reference` is the block hash, state root or checkpoint digest at
/// `position`. It is `None` when the node did not return one, which is never
/// the same thing as an empty string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainMeasurement {
    pub side: Side,
    pub protocol: Protocol,
    pub position: u64,
    pub reference: Option<String>,
    pub syncing: SyncFlag,
    /// Beacon `is_optimistic`; advisory only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimistic: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_flag_only_explicit_true_is_syncing() {
        assert!(SyncFlag::Syncing.is_syncing());
        assert!(!SyncFlag::NotSyncing.is_syncing());
        assert!(!SyncFlag::Unknown.is_syncing());
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Local.to_string(), "local");
        assert_eq!(Side::Public.to_string(), "public");
    }
}
