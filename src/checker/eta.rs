//! Catch-up ETA estimation from a local progress sample

use serde::Serialize;

/// Floor for the effective catch-up rate
pub const MIN_EFFECTIVE_RATE: f64 = 0.01;

/// Local progress over one sampling window
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EtaSample {
    pub start: u64,
    pub end: u64,
    pub window_secs: u64,
    pub blocks_advanced: i64,
    /// Positions per second, `None` without forward progress
    pub rate: Option<f64>,
    /// `rate` minus the public chain's growth, floored at [`MIN_EFFECTIVE_RATE`]
    pub effective_rate: Option<f64>,
    /// Public head minus the sampled local head
    pub remaining: u64,
    pub eta_secs: Option<u64>,
}

impl EtaSample {
    pub fn compute(
        start: u64,
        end: u64,
        public_position: u64,
        window_secs: u64,
        growth_rate: f64,
    ) -> Self {
        let blocks_advanced = i64::try_from(i128::from(end) - i128::from(start)).unwrap_or(0);
        let remaining = public_position.saturating_sub(end);

        let (rate, effective_rate, eta_secs) = if blocks_advanced > 0 && window_secs > 0 {
            let rate = blocks_advanced as f64 / window_secs as f64;
            let effective = (rate - growth_rate).max(MIN_EFFECTIVE_RATE);
            let eta = (remaining as f64 / effective).ceil().max(1.0) as u64;
            (Some(rate), Some(effective), Some(eta))
        } else {
            (None, None, None)
        };

        Self {
            start,
            end,
            window_secs,
            blocks_advanced,
            rate,
            effective_rate,
            remaining,
            eta_secs,
        }
    }

    pub fn eta_display(&self) -> String {
        self.eta_secs
            .map(format_duration)
            .unwrap_or_else(|| "n/a".to_string())
    }
}

/// Format seconds using the largest sensible units
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3_600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3_600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(3_599), "59m 59s");
        assert_eq!(format_duration(3_600), "1h 0m");
        assert_eq!(format_duration(86_399), "23h 59m");
        assert_eq!(format_duration(86_400), "1d 0h");
        assert_eq!(format_duration(200_000), "2d 7h");
    }

    #[test]
    fn test_eta_from_progress() {
        // 50 blocks in 10s = 5/s, minus 0.08/s growth
        let sample = EtaSample::compute(900, 950, 1000, 10, 0.08);
        assert_eq!(sample.blocks_advanced, 50);
        assert_eq!(sample.rate, Some(5.0));
        assert_eq!(sample.remaining, 50);
        // 50 / 4.92 = 10.16
        assert_eq!(sample.eta_secs, Some(11));
        assert_eq!(sample.eta_display(), "11s");
    }

    #[test]
    fn test_slow_progress_uses_rate_floor() {
        // 0.05/s is slower than the public chain grows
        let sample = EtaSample::compute(900, 901, 1000, 20, 0.08);
        assert_eq!(sample.effective_rate, Some(MIN_EFFECTIVE_RATE));
        assert_eq!(sample.eta_secs, Some(9_900));
        assert_eq!(sample.eta_display(), "2h 45m");
    }

    #[test]
    fn test_no_progress_is_not_available() {
        let sample = EtaSample::compute(900, 900, 1000, 10, 0.08);
        assert_eq!(sample.eta_secs, None);
        assert_eq!(sample.eta_display(), "n/a");

        let sample = EtaSample::compute(900, 890, 1000, 10, 0.08);
        assert_eq!(sample.blocks_advanced, -10);
        assert_eq!(sample.eta_secs, None);
    }

    #[test]
    fn test_eta_is_positive_once_caught_up() {
        let sample = EtaSample::compute(900, 1005, 1000, 10, 0.08);
        assert_eq!(sample.remaining, 0);
        assert_eq!(sample.eta_secs, Some(1));
    }
}
