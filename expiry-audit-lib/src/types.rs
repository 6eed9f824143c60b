//! Core data types for expiry auditing.
//!
//! This module defines the values that flow through one audit run: the raw
//! backend answer, the parsed WHOIS data, the per-domain verdict, the run
//! summary and the run configuration.

use crate::error::{DateParseError, QueryError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Protocol-level success code for a backend answer.
pub const CODE_OK: u16 = 200;

/// What a query backend hands back for one domain.
///
/// `code == 200` means the exchange succeeded; anything else is a
/// backend-reported failure and `raw` carries the explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub code: u16,
    pub raw: String,
}

impl RawResult {
    pub fn ok<R: Into<String>>(raw: R) -> Self {
        Self {
            code: CODE_OK,
            raw: raw.into(),
        }
    }

    pub fn failed<R: Into<String>>(code: u16, raw: R) -> Self {
        Self {
            code,
            raw: raw.into(),
        }
    }
}

/// Registration phase derived from a WHOIS body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Registered,
    Redemption,
    Unregistered,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Registered => write!(f, "registered"),
            Phase::Redemption => write!(f, "redemption"),
            Phase::Unregistered => write!(f, "unregistered"),
        }
    }
}

/// Registration status: a flag plus the phase it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainStatus {
    pub is_registered: bool,
    pub phase: Phase,
}

impl DomainStatus {
    pub fn from_phase(phase: Phase) -> Self {
        Self {
            is_registered: phase != Phase::Unregistered,
            phase,
        }
    }
}

/// Structured view over one registry response.
#[derive(Debug, Clone)]
pub struct ParsedWhoisData {
    /// Left blank by the parser, filled in by the dispatcher
    pub domain: String,
    pub status: DomainStatus,
    pub raw: String,
    /// Only meaningful when `status.phase == Phase::Registered`
    pub expiry_date: Result<DateTime<Utc>, DateParseError>,
}

/// Why a domain landed in the expired bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryReason {
    Unregistered,
    Redemption,
    Lapsed(DateTime<Utc>),
}

/// Why a registered domain counts as live.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveReason {
    Dated(DateTime<Utc>),
    /// The registry does not publish expiry dates for this suffix
    Undated,
}

/// Why a domain landed in the error bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    InvalidInput(String),
    Query(QueryError),
    Date(DateParseError),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InvalidInput(reason) => write!(f, "{}", reason),
            FailureReason::Query(err) => write!(f, "{}", err),
            FailureReason::Date(err) => write!(f, "{}", err),
        }
    }
}

/// Terminal classification of one domain. Every input line gets exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Expired(ExpiryReason),
    NotExpired(LiveReason),
    Failed(FailureReason),
}

impl Verdict {
    pub fn is_expired(&self) -> bool {
        matches!(self, Verdict::Expired(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Verdict::Failed(_))
    }
}

/// A domain paired with its verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainOutcome {
    pub domain: String,
    pub verdict: Verdict,
}

/// Counters for one run or one shard. Serialized as JSON by worker processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub expired: usize,
    pub not_expired: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, verdict: &Verdict) {
        self.total += 1;
        match verdict {
            Verdict::Expired(_) => self.expired += 1,
            Verdict::NotExpired(_) => self.not_expired += 1,
            Verdict::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.total += other.total;
        self.expired += other.expired;
        self.not_expired += other.not_expired;
        self.failed += other.failed;
    }
}

/// How a backend wants to be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Blocking; runs on the blocking thread pool
    Sync,
    /// Cooperative; awaited on the runtime
    Async,
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Sync => write!(f, "sync"),
            BackendMode::Async => write!(f, "async"),
        }
    }
}

/// Admission control for in-flight domains within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Bounded(usize),
    Unbounded,
}

impl Concurrency {
    /// Create a bounded limit; zero is raised to one.
    pub fn bounded(limit: usize) -> Self {
        Concurrency::Bounded(limit.max(1))
    }

    /// `min(32, cpus + 4)`, the usual sizing for I/O-bound thread pools.
    pub fn host_default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Concurrency::Bounded((cpus + 4).min(32))
    }

    /// Permit count, or `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Concurrency::Bounded(n) => Some(*n),
            Concurrency::Unbounded => None,
        }
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::host_default()
    }
}

impl std::fmt::Display for Concurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Concurrency::Bounded(n) => write!(f, "{}", n),
            Concurrency::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Default id of the backend used when none is selected.
pub const DEFAULT_BACKEND_ID: &str = "async_query";

/// Suffixes whose registry answers with a bare numeric code and no dates.
pub const NUMERIC_CODE_SUFFIXES: [&str; 2] = ["li", "ch"];

/// Resolved settings for one audit run.
///
/// Built once (CLI > env > config files > defaults) and read-only afterwards.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Domain list, one per line
    pub input_path: PathBuf,

    /// Appended with expired, redemption and unregistered domains
    pub output_path: Option<PathBuf>,

    /// Appended with domains whose query or parse failed
    pub error_path: Option<PathBuf>,

    /// Number of OS-level shard workers, at least 1
    pub process_count: usize,

    /// In-flight domains per process
    pub max_threads_per_process: Concurrency,

    /// Registered backend to query with
    pub backend_id: String,

    /// Per I/O operation timeout. Backends are built before the `Auditor`,
    /// so it reaches them through `BackendSettings::for_run`.
    pub timeout: Duration,

    /// Force date evaluation for every registered result
    pub strict: bool,

    /// Suffixes known to omit expiry dates; skipped when not strict
    pub date_optional_suffixes: Vec<String>,

    /// Suffixes exempt from date evaluation even in strict mode
    pub strict_exempt_suffixes: Vec<String>,

    /// Suppress non-error console output
    pub quiet: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("input.txt"),
            output_path: None,
            error_path: None,
            process_count: 1,
            max_threads_per_process: Concurrency::host_default(),
            backend_id: DEFAULT_BACKEND_ID.to_string(),
            timeout: Duration::from_secs(15),
            strict: false,
            date_optional_suffixes: NUMERIC_CODE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            strict_exempt_suffixes: NUMERIC_CODE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            quiet: false,
        }
    }
}

impl RunConfig {
    pub fn with_input<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.input_path = path.into();
        self
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_error<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.error_path = Some(path.into());
        self
    }

    /// Set the number of shard workers; zero is raised to one.
    pub fn with_processes(mut self, count: usize) -> Self {
        self.process_count = count.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.max_threads_per_process = concurrency;
        self
    }

    pub fn with_backend<S: Into<String>>(mut self, id: S) -> Self {
        self.backend_id = id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Whether a registered result for `suffix` may skip date evaluation.
    pub fn skips_date_check(&self, suffix: &str) -> bool {
        let list = if self.strict {
            &self.strict_exempt_suffixes
        } else {
            &self.date_optional_suffixes
        };
        list.iter().any(|s| s.eq_ignore_ascii_case(suffix))
    }
}
