//! Signed lag between the public and local heads

use std::cmp::Ordering;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LagDirection {
    LocalBehind,
    LocalAhead,
    InSync,
}

impl LagDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LagDirection::LocalBehind => "local behind",
            LagDirection::LocalAhead => "local ahead",
            LagDirection::InSync => "local in sync",
        }
    }
}

/// `raw_lag = public - local`; `magnitude` is always its absolute value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LagResult {
    pub raw_lag: i64,
    pub magnitude: u64,
    pub direction: LagDirection,
}

impl LagResult {
    pub fn compute(local: u64, public: u64) -> Self {
        let magnitude = public.abs_diff(local);
        let (raw_lag, direction) = match public.cmp(&local) {
            Ordering::Greater => (
                i64::try_from(magnitude).unwrap_or(i64::MAX),
                LagDirection::LocalBehind,
            ),
            Ordering::Less => (
                i64::try_from(magnitude).map(|m| -m).unwrap_or(i64::MIN),
                LagDirection::LocalAhead,
            ),
            Ordering::Equal => (0, LagDirection::InSync),
        };

        Self {
            raw_lag,
            magnitude,
            direction,
        }
    }

    pub fn is_behind(&self) -> bool {
        self.raw_lag > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_behind() {
        let lag = LagResult::compute(900, 1000);
        assert_eq!(lag.raw_lag, 100);
        assert_eq!(lag.magnitude, 100);
        assert_eq!(lag.direction, LagDirection::LocalBehind);
        assert!(lag.is_behind());
    }

    #[test]
    fn test_local_ahead() {
        let lag = LagResult::compute(1002, 1000);
        assert_eq!(lag.raw_lag, -2);
        assert_eq!(lag.magnitude, 2);
        assert_eq!(lag.direction, LagDirection::LocalAhead);
        assert_eq!(lag.direction.as_str(), "local ahead");
        assert!(!lag.is_behind());
    }

    #[test]
    fn test_equal_heads() {
        let lag = LagResult::compute(1000, 1000);
        assert_eq!(lag.raw_lag, 0);
        assert_eq!(lag.magnitude, 0);
        assert_eq!(lag.direction.as_str(), "local in sync");
    }

    #[test]
    fn test_magnitude_matches_sign() {
        for (local, public) in [(0, 0), (5, 3), (3, 5), (0, u64::MAX), (u64::MAX, 0)] {
            let lag = LagResult::compute(local, public);
            assert_eq!(lag.magnitude, public.abs_diff(local));
            match lag.direction {
                LagDirection::LocalBehind => assert!(lag.raw_lag > 0),
                LagDirection::LocalAhead => assert!(lag.raw_lag < 0),
                LagDirection::InSync => assert_eq!(lag.raw_lag, 0),
            }
        }
    }
}
