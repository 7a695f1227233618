//! Verdict decision and exit code mapping
//!
//! Exit codes use the coarse taxonomy: 0 in sync, 1 syncing, 2 for
//! divergence and every error class.

use serde::Serialize;

use super::lag::LagResult;
use crate::error::{Error, EXIT_ERROR};
use crate::protocol::{Side, SyncFlag};

/// Outcome of one run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    InSync,
    Syncing,
    /// Both nodes report different references at the same position
    Diverged,
    TransportError(Side),
    ParseError(Side),
    ToolingError,
    ConfigError,
}

impl Verdict {
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::InSync => 0,
            Verdict::Syncing => 1,
            _ => EXIT_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::InSync => "IN SYNC",
            Verdict::Syncing => "SYNCING",
            Verdict::Diverged => "DIVERGED",
            Verdict::TransportError(Side::Local) => "LOCAL RPC ERROR",
            Verdict::TransportError(Side::Public) => "PUBLIC RPC ERROR",
            Verdict::ParseError(_) => "PARSE ERROR",
            Verdict::ToolingError => "TOOLING ERROR",
            Verdict::ConfigError => "CONFIG ERROR",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&Error> for Verdict {
    fn from(err: &Error) -> Self {
        match err {
            Error::ConfigError(_) => Verdict::ConfigError,
            Error::ToolingError(_) => Verdict::ToolingError,
            Error::TransportError { side, .. } => Verdict::TransportError(*side),
            Error::ParseError { side, .. } => Verdict::ParseError(*side),
            Error::Diverged { .. } => Verdict::Diverged,
            // Output failed after the comparison
            Error::SerializationError(_) => Verdict::ConfigError,
        }
    }
}

/// References compared at one position
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferenceCheck {
    pub position: u64,
    pub local: Option<String>,
    pub public: Option<String>,
    /// Public reference was taken from the head measurement instead of a second query
    pub reused_public: bool,
}

impl ReferenceCheck {
    /// Only two present, different values count; an absent side never diverges
    pub fn diverged(&self) -> bool {
        matches!((&self.local, &self.public), (Some(l), Some(p)) if l != p)
    }

    pub fn status(&self) -> &'static str {
        match (&self.local, &self.public) {
            (Some(l), Some(p)) if l == p => "match",
            (Some(_), Some(_)) => "MISMATCH",
            _ => "unverified",
        }
    }
}

/// Decide the verdict from the computed lag, the local syncing flag and the
/// reference comparison. A node ahead of the public one is never syncing on
/// that basis alone.
pub fn decide(
    lag: &LagResult,
    local_syncing: SyncFlag,
    block_lag: u64,
    references: &ReferenceCheck,
) -> Verdict {
    if references.diverged() {
        return Verdict::Diverged;
    }

    let threshold = i64::try_from(block_lag).unwrap_or(i64::MAX);
    if local_syncing.is_syncing() || lag.raw_lag > threshold {
        return Verdict::Syncing;
    }

    Verdict::InSync
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(local: Option<&str>, public: Option<&str>) -> ReferenceCheck {
        ReferenceCheck {
            position: 1000,
            local: local.map(str::to_string),
            public: public.map(str::to_string),
            reused_public: true,
        }
    }

    #[test]
    fn test_in_sync() {
        let lag = LagResult::compute(1000, 1000);
        let verdict = decide(&lag, SyncFlag::NotSyncing, 2, &refs(Some("0xaa"), Some("0xaa")));
        assert_eq!(verdict, Verdict::InSync);
        assert_eq!(verdict.exit_code(), 0);
    }

    #[test]
    fn test_lag_over_threshold_is_syncing() {
        let lag = LagResult::compute(900, 1000);
        let verdict = decide(&lag, SyncFlag::NotSyncing, 2, &refs(None, None));
        assert_eq!(verdict, Verdict::Syncing);
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn test_lag_at_threshold_is_in_sync() {
        let lag = LagResult::compute(998, 1000);
        let verdict = decide(&lag, SyncFlag::NotSyncing, 2, &refs(None, None));
        assert_eq!(verdict, Verdict::InSync);
    }

    #[test]
    fn test_self_reported_syncing_overrides() {
        let lag = LagResult::compute(1000, 1000);
        let verdict = decide(&lag, SyncFlag::Syncing, 2, &refs(Some("0xaa"), Some("0xaa")));
        assert_eq!(verdict, Verdict::Syncing);
    }

    #[test]
    fn test_unknown_flag_does_not_force_syncing() {
        let lag = LagResult::compute(1000, 1000);
        let verdict = decide(&lag, SyncFlag::Unknown, 2, &refs(None, None));
        assert_eq!(verdict, Verdict::InSync);
    }

    #[test]
    fn test_local_ahead_alone_is_in_sync() {
        let lag = LagResult::compute(1002, 1000);
        let verdict = decide(&lag, SyncFlag::NotSyncing, 2, &refs(Some("A"), None));
        assert_eq!(verdict, Verdict::InSync);
    }

    #[test]
    fn test_mismatch_is_diverged_and_takes_precedence() {
        let lag = LagResult::compute(900, 1000);
        let verdict = decide(&lag, SyncFlag::Syncing, 2, &refs(Some("0xaa"), Some("0xbb")));
        assert_eq!(verdict, Verdict::Diverged);
        assert_eq!(verdict.exit_code(), 2);
    }

    #[test]
    fn test_absent_references_never_diverge() {
        assert!(!refs(None, None).diverged());
        assert!(!refs(Some("0xaa"), None).diverged());
        assert!(!refs(None, Some("0xaa")).diverged());
        assert_eq!(refs(None, Some("0xaa")).status(), "unverified");
        assert_eq!(refs(Some("0xaa"), Some("0xbb")).status(), "MISMATCH");
    }

    #[test]
    fn test_error_verdicts_exit_two() {
        let err = Error::transport(Side::Public, "connection refused");
        let verdict = Verdict::from(&err);
        assert_eq!(verdict, Verdict::TransportError(Side::Public));
        assert_eq!(verdict.exit_code(), 2);
        assert_eq!(Verdict::from(&Error::ToolingError("x".to_string())).exit_code(), 2);
        assert_eq!(Verdict::from(&Error::ConfigError("x".to_string())).exit_code(), 2);
    }
}
