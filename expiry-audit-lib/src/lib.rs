//! # Expiry Audit Library
//!
//! A batch engine that decides, for each domain in a list, whether it is
//! unregistered, in its redemption period, or past its expiry date, by
//! querying the authoritative WHOIS server of its registry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use expiry_audit_lib::{Auditor, BackendRegistry, BackendSettings, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = BackendRegistry::with_builtins(&BackendSettings::default());
//!     let config = RunConfig::default()
//!         .with_input("domains.txt")
//!         .with_output("expired.txt")
//!         .with_error("errors.txt");
//!
//!     let auditor = Arc::new(Auditor::new(config, &registry)?);
//!     let report = auditor.run().await?;
//!     println!("{} expired of {}", report.summary.expired, report.summary.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Pluggable backends**: blocking and async query backends behind one registry
//! - **Heuristic parsing**: registration phase and expiry date from heterogeneous registries
//! - **Bounded concurrency**: per-process task limits plus independent shards
//! - **Typed failures**: every domain ends with exactly one verdict

pub use backends::{
    AsyncQuery, BackendImpl, BackendMetadata, BackendRegistry, BackendSettings, QueryBackend, SyncQuery,
};
pub use concurrent::{partition, ConcurrentProcessor, PoolReport, ShardExecutor, ShardReport, TaskShardExecutor};
pub use config::{load_env_config, parse_timeout, ConfigManager, EnvConfig, FileConfig};
pub use dates::{is_expired, is_expired_at, parse_datetime};
pub use dispatcher::Dispatcher;
pub use domain::{normalize_domain, Domain, PublicSuffixExtractor, SuffixExtractor};
pub use error::{AuditError, DateParseError, ProtocolError, QueryError};
pub use orchestrator::{read_domain_lines, Auditor, OutputSink};
pub use parser::{is_rate_limited, ResponseParser};
pub use protocols::{ServerDirectory, ServerEndpoint};
pub use types::{
    BackendMode, Concurrency, DomainOutcome, DomainStatus, ExpiryReason, FailureReason, LiveReason,
    ParsedWhoisData, Phase, RawResult, RunConfig, RunSummary, Verdict, DEFAULT_BACKEND_ID,
};

pub mod backends;
pub mod config;
pub mod dates;
pub mod error;
pub mod parser;
pub mod protocols;

mod concurrent;
mod dispatcher;
mod domain;
mod orchestrator;
mod types;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, AuditError>;

/// Library version and enabled backends, for `--version` style output.
pub fn info() -> String {
    let mut enabled = Vec::new();
    if cfg!(feature = "async-backend") {
        enabled.push(backends::ASYNC_QUERY_ID);
    }
    if cfg!(feature = "sync-backend") {
        enabled.push(backends::SYNC_QUERY_ID);
    }
    format!(
        "expiry-audit-lib {} (backends: {})",
        env!("CARGO_PKG_VERSION"),
        enabled.join(", ")
    )
}
