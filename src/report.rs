//! Report rendering
//!
//! Text output follows a fixed order: tools, syncing flag, head comparison,
//! ETA, reference comparison, verdict. JSON and YAML serialize the whole
//! [`CheckReport`].

use std::fmt::Write;

use crate::checker::CheckReport;
use crate::error::Result;

/// Longest reference shown untruncated in text output
const REFERENCE_WIDTH: usize = 18;

/// Render a report as `text`, `json` or `yaml`; unknown formats fall back to text
pub fn render(report: &CheckReport, output: &str) -> Result<String> {
    match output {
        "json" => Ok(serde_json::to_string_pretty(report)?),
        "yaml" => Ok(serde_yaml::to_string(report)?),
        _ => Ok(render_text(report)),
    }
}

/// Shorten a hash for display, `n/a` when absent
pub fn short_reference(reference: Option<&str>) -> String {
    match reference {
        Some(r) if r.chars().count() > REFERENCE_WIDTH => {
            format!("{}...", r.chars().take(REFERENCE_WIDTH).collect::<String>())
        }
        Some(r) => r.to_string(),
        None => "n/a".to_string(),
    }
}

pub fn render_text(report: &CheckReport) -> String {
    let protocol = report.protocol;
    let unit = protocol.position_label();
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "Protocol:        {}", protocol);
    let _ = writeln!(out, "Local endpoint:  {}", report.local_endpoint);
    let _ = writeln!(out, "Public endpoint: {}", report.public_endpoint);
    let _ = writeln!(out, "HTTP client:     {}", report.tools.summary());

    let syncing = if report.syncing_derived {
        format!("{} (derived from lag)", report.local_syncing.as_str())
    } else {
        report.local_syncing.as_str().to_string()
    };
    let _ = writeln!(out, "Local syncing:   {}", syncing);
    if let Some(optimistic) = report.local.optimistic {
        let _ = writeln!(out, "Optimistic:      {} (advisory)", optimistic);
    }

    let _ = writeln!(
        out,
        "Head {}:{}local {} | public {}",
        unit,
        padding(unit),
        report.local.position,
        report.public.position
    );
    let _ = writeln!(
        out,
        "Lag:             {} {}(s), {} (threshold {})",
        report.lag.magnitude,
        unit,
        report.lag.direction.as_str(),
        report.block_lag
    );

    let eta = match &report.eta {
        Some(sample) => match sample.rate {
            Some(rate) => format!(
                "{} ({} {}(s) in {}s, {:.2}/s)",
                sample.eta_display(),
                sample.blocks_advanced,
                unit,
                sample.window_secs,
                rate
            ),
            None => format!("n/a (no progress in {}s)", sample.window_secs),
        },
        None => "n/a".to_string(),
    };
    let _ = writeln!(out, "ETA:             {}", eta);

    let refs = &report.references;
    let _ = writeln!(
        out,
        "{} @{}: local {} | public {} ({})",
        capitalize(protocol.reference_label()),
        refs.position,
        short_reference(refs.local.as_deref()),
        short_reference(refs.public.as_deref()),
        refs.status()
    );

    let _ = writeln!(out, "Verdict:         {}", report.verdict);
    out
}

fn padding(unit: &str) -> String {
    // Align with the 17-column label block
    " ".repeat(17usize.saturating_sub(6 + unit.len()).max(1))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
