//! Console output for the expiry-audit CLI.
//!
//! Run header, backend listing and the final summary. Per-domain verdicts
//! are logged through `tracing`; this module only prints what a person
//! reads at the start and end of a run. Uses only the `console` crate.

use console::{pad_str, style, Alignment};
use expiry_audit_lib::{BackendRegistry, PoolReport, RunConfig};
use serde::Serialize;
use std::time::Duration;

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(domain_count: usize, config: &RunConfig) {
    println!(
        "{} {} {}",
        style("expiry-audit").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!("- auditing {} domain{}", domain_count, plural(domain_count))).dim(),
    );

    let mut meta_parts = vec![
        format!("Backend: {}", config.backend_id),
        format!("Processes: {}", config.process_count),
        format!("Threads/process: {}", config.max_threads_per_process),
        format!("Timeout: {}s", config.timeout.as_secs()),
    ];
    if config.strict {
        meta_parts.push("Strict".to_string());
    }

    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Backends ─────────────────────────────────────────────────────────────────

pub fn print_backends(registry: &BackendRegistry) {
    println!("{}", style("Available backends:").bold());
    for backend in registry.iter() {
        println!(
            "  {}  {}  {}",
            style(pad_str(&backend.id, 14, Alignment::Left, None)).green(),
            style(pad_str(&backend.mode().to_string(), 6, Alignment::Left, None)).dim(),
            backend.metadata.help,
        );
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(report: &PoolReport, duration: Duration) {
    let summary = &report.summary;
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} domain{} in {:.1}s  {}  {}  {}  {}  {}  {}",
        style(summary.total).bold(),
        plural(summary.total),
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} expired", summary.expired)).red(),
        style("|").dim(),
        style(format!("{} live", summary.not_expired)).green(),
        style("|").dim(),
        style(format!("{} failed", summary.failed)).yellow(),
    );

    if !report.is_clean() {
        println!(
            "  {} {}",
            style("Some worker processes did not finish:").yellow(),
            format_failed_shards(&report.failed_shards, 5),
        );
    }
}

/// One entry per shard that did not finish.
#[derive(Debug, Serialize)]
pub struct FailedShard<'a> {
    pub shard: usize,
    pub reason: &'a str,
}

/// Shape of `--json` output.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub total: usize,
    pub expired: usize,
    pub not_expired: usize,
    pub failed: usize,
    pub failed_shards: Vec<FailedShard<'a>>,
}

pub fn json_report(report: &PoolReport) -> JsonReport<'_> {
    JsonReport {
        total: report.summary.total,
        expired: report.summary.expired,
        not_expired: report.summary.not_expired,
        failed: report.summary.failed,
        failed_shards: report
            .failed_shards
            .iter()
            .map(|(shard, reason)| FailedShard {
                shard: *shard,
                reason: reason.as_str(),
            })
            .collect(),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// `#index (reason)` entries, truncated after `max_show`.
fn format_failed_shards(failed: &[(usize, String)], max_show: usize) -> String {
    let shown: Vec<String> = failed
        .iter()
        .take(max_show)
        .map(|(index, reason)| format!("#{} ({})", index, reason))
        .collect();

    if failed.len() <= max_show {
        shown.join(", ")
    } else {
        format!("{}, ... and {} more", shown.join(", "), failed.len() - max_show)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
