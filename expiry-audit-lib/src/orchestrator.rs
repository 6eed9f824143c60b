//! Run orchestration.
//!
//! Every input line goes through `normalize -> dispatch -> classify` and
//! ends with exactly one verdict. Expired domains are appended to the
//! output file, failures to the error file. Per-domain problems never stop
//! the batch; only configuration and input errors do.

use crate::backends::BackendRegistry;
use crate::concurrent::{partition, ConcurrentProcessor, PoolReport, ShardExecutor, TaskShardExecutor};
use crate::dates::is_expired_at;
use crate::dispatcher::Dispatcher;
use crate::domain::{normalize_domain, Domain, PublicSuffixExtractor, SuffixExtractor};
use crate::error::{AuditError, QueryError};
use crate::parser::ResponseParser;
use crate::types::{
    DomainOutcome, ExpiryReason, FailureReason, LiveReason, ParsedWhoisData, Phase, RunConfig, RunSummary,
    Verdict,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument, warn};

/// Read a domain list: one entry per line, blank lines and `#` comments skipped.
pub async fn read_domain_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>, AuditError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AuditError::file_error(path.to_string_lossy(), format!("Cannot read input: {}", e)))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Append-only destinations for classified domains.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    output: Option<PathBuf>,
    error: Option<PathBuf>,
}

impl OutputSink {
    pub fn new(output: Option<PathBuf>, error: Option<PathBuf>) -> Self {
        Self { output, error }
    }

    /// Record `outcome` in the file its verdict belongs to, if configured.
    pub async fn record(&self, outcome: &DomainOutcome) {
        let target = match outcome.verdict {
            Verdict::Expired(_) => self.output.as_deref(),
            Verdict::Failed(_) => self.error.as_deref(),
            Verdict::NotExpired(_) => None,
        };
        if let Some(path) = target {
            if let Err(e) = append_line(path, &outcome.domain).await {
                error!(path = %path.display(), domain = %outcome.domain, "append failed: {}", e);
            }
        }
    }
}

/// Open, write one line, close. Each line is a single `write_all` on an
/// `O_APPEND` handle so concurrent writers never interleave within a line.
async fn append_line(path: &Path, domain: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{}\n", domain).as_bytes()).await?;
    file.flush().await
}

/// Drives one audit run.
pub struct Auditor {
    config: RunConfig,
    dispatcher: Dispatcher,
    extractor: Arc<dyn SuffixExtractor>,
    processor: ConcurrentProcessor,
    sink: OutputSink,
}

impl Auditor {
    /// Validate the run parameters and bind the backend.
    ///
    /// Fails before touching the input when the backend id is unknown or
    /// the parameters are out of range.
    pub fn new(config: RunConfig, registry: &BackendRegistry) -> Result<Self, AuditError> {
        if config.process_count == 0 {
            return Err(AuditError::config("process count must be at least 1"));
        }
        let dispatcher = Dispatcher::new(registry, &config.backend_id)?;

        Ok(Self {
            processor: ConcurrentProcessor::new(config.max_threads_per_process),
            sink: OutputSink::new(config.output_path.clone(), config.error_path.clone()),
            dispatcher,
            extractor: Arc::new(PublicSuffixExtractor),
            config,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SuffixExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.dispatcher = self.dispatcher.with_parser(parser);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Decide the verdict for a dispatched domain as of `now`.
    pub fn classify(
        &self,
        domain: &Domain,
        result: Result<ParsedWhoisData, QueryError>,
        now: DateTime<Utc>,
    ) -> Verdict {
        let parsed = match result {
            Ok(parsed) => parsed,
            Err(e) => return Verdict::Failed(FailureReason::Query(e)),
        };

        match parsed.status.phase {
            Phase::Unregistered => Verdict::Expired(ExpiryReason::Unregistered),
            Phase::Redemption => Verdict::Expired(ExpiryReason::Redemption),
            Phase::Registered => {
                if self.config.skips_date_check(domain.tld()) || self.config.skips_date_check(&domain.suffix) {
                    return Verdict::NotExpired(LiveReason::Undated);
                }
                match parsed.expiry_date {
                    Ok(ts) if is_expired_at(ts, now) => Verdict::Expired(ExpiryReason::Lapsed(ts)),
                    Ok(ts) => Verdict::NotExpired(LiveReason::Dated(ts)),
                    Err(e) => Verdict::Failed(FailureReason::Date(e)),
                }
            }
        }
    }

    /// Run one input line through the full pipeline and record the result.
    #[instrument(skip(self), fields(backend = %self.dispatcher.backend_id()))]
    pub async fn audit_domain(&self, line: &str) -> DomainOutcome {
        let outcome = match normalize_domain(line, self.extractor.as_ref()) {
            Err(e) => DomainOutcome {
                domain: line.trim().to_string(),
                verdict: Verdict::Failed(FailureReason::InvalidInput(e.to_string())),
            },
            Ok(domain) => {
                let name = domain.name();
                let result = self.dispatcher.call_backend(&name).await;
                DomainOutcome {
                    verdict: self.classify(&domain, result, Utc::now()),
                    domain: name,
                }
            }
        };

        log_outcome(&outcome);
        self.sink.record(&outcome).await;
        outcome
    }

    /// Audit `lines` in this process, bounded by the per-process limit.
    pub async fn audit_lines(&self, lines: Vec<String>) -> RunSummary {
        let outcomes = self
            .processor
            .run(lines, |line| async move { self.audit_domain(&line).await })
            .await;

        let mut summary = RunSummary::default();
        for outcome in &outcomes {
            summary.record(&outcome.verdict);
        }
        summary
    }

    /// Read the configured input and audit it.
    ///
    /// With more than one process configured, the input is partitioned
    /// and the shards run as independent tasks.
    pub async fn run(self: &Arc<Self>) -> Result<PoolReport, AuditError> {
        let lines = read_domain_lines(&self.config.input_path).await?;
        info!(domains = lines.len(), processes = self.config.process_count, "starting audit");

        if self.config.process_count <= 1 {
            return Ok(PoolReport::single(self.audit_lines(lines).await));
        }

        let auditor = Arc::clone(self);
        let executor = TaskShardExecutor::new(move |_, shard| {
            let auditor = Arc::clone(&auditor);
            async move { Ok(auditor.audit_lines(shard).await) }
        });
        Ok(self.run_sharded(lines, &executor).await)
    }

    /// Partition `lines` and hand the shards to `executor`.
    pub async fn run_sharded(&self, lines: Vec<String>, executor: &dyn ShardExecutor) -> PoolReport {
        let shards: Vec<Vec<String>> = partition(lines, self.config.process_count)
            .into_iter()
            .filter(|shard| !shard.is_empty())
            .collect();
        let report = PoolReport::from_reports(executor.execute(shards).await);
        if !report.is_clean() {
            warn!(failed = report.failed_shards.len(), "some shards did not finish");
        }
        report
    }
}

fn log_outcome(outcome: &DomainOutcome) {
    let domain = outcome.domain.as_str();
    match &outcome.verdict {
        Verdict::Expired(ExpiryReason::Unregistered) => info!(domain, "expired: not registered"),
        Verdict::Expired(ExpiryReason::Redemption) => info!(domain, "expired: in redemption period"),
        Verdict::Expired(ExpiryReason::Lapsed(ts)) => info!(domain, expiry = %ts, "expired"),
        Verdict::NotExpired(LiveReason::Dated(ts)) => info!(domain, expiry = %ts, "not expired"),
        Verdict::NotExpired(LiveReason::Undated) => info!(domain, "registered, no expiry published"),
        Verdict::Failed(reason) => warn!(domain, %reason, "failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendMetadata, QueryBackend};
    use crate::error::{DateParseError, DATE_NOT_FOUND};
    use crate::types::{Concurrency, DomainStatus, RawResult};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn stub_registry() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(QueryBackend::sync(
            "stub",
            BackendMetadata::default(),
            |domain: &str| match domain {
                "live.com" => RawResult::ok("Domain Name: LIVE.COM\nRegistry Expiry Date: 2999-01-01T00:00:00Z\n"),
                "old.com" => RawResult::ok("Domain Name: OLD.COM\nRegistry Expiry Date: 2001-01-01T00:00:00Z\n"),
                "free.com" => RawResult::ok("No match for \"FREE.COM\".\n"),
                "example.ch" => RawResult::ok("0\n"),
                _ => RawResult::failed(503, "connection reset"),
            },
        ));
        registry
    }

    fn auditor(config: RunConfig) -> Auditor {
        Auditor::new(config.with_backend("stub"), &stub_registry()).unwrap()
    }

    fn parsed(phase: Phase, expiry: Result<DateTime<Utc>, DateParseError>) -> ParsedWhoisData {
        ParsedWhoisData {
            domain: String::new(),
            status: DomainStatus::from_phase(phase),
            raw: String::new(),
            expiry_date: expiry,
        }
    }

    fn domain(label: &str, suffix: &str) -> Domain {
        Domain {
            label: label.to_string(),
            suffix: suffix.to_string(),
        }
    }

    #[test]
    fn test_unknown_backend_fails_up_front() {
        let err = match Auditor::new(RunConfig::default().with_backend("nope"), &stub_registry()) {
            Ok(_) => panic!("unknown backend accepted"),
            Err(e) => e,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("stub"));
    }

    #[test]
    fn test_classify_phases() {
        let a = auditor(RunConfig::default());
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let future = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let com = domain("x", "com");

        assert_eq!(
            a.classify(&com, Ok(parsed(Phase::Unregistered, Err(DateParseError::not_found("")))), now),
            Verdict::Expired(ExpiryReason::Unregistered)
        );
        assert_eq!(
            a.classify(&com, Ok(parsed(Phase::Redemption, Ok(future))), now),
            Verdict::Expired(ExpiryReason::Redemption)
        );
        assert_eq!(
            a.classify(&com, Ok(parsed(Phase::Registered, Ok(past))), now),
            Verdict::Expired(ExpiryReason::Lapsed(past))
        );
        assert_eq!(
            a.classify(&com, Ok(parsed(Phase::Registered, Ok(future))), now),
            Verdict::NotExpired(LiveReason::Dated(future))
        );
        assert!(a
            .classify(&com, Ok(parsed(Phase::Registered, Err(DateParseError::not_found("body")))), now)
            .is_failed());
        assert!(a
            .classify(&com, Err(QueryError::backend("x.com", "reset", 503)), now)
            .is_failed());
    }

    #[test]
    fn test_strict_mode_and_exemptions() {
        let now = Utc::now();
        let undated = || Ok(parsed(Phase::Registered, Err(DateParseError::not_found("0\n"))));

        let relaxed = auditor(RunConfig::default());
        assert_eq!(
            relaxed.classify(&domain("example", "ch"), undated(), now),
            Verdict::NotExpired(LiveReason::Undated)
        );

        let mut config = RunConfig::default().with_strict(true);
        config.strict_exempt_suffixes = vec!["li".to_string()];
        let strict = auditor(config);
        match strict.classify(&domain("example", "ch"), undated(), now) {
            Verdict::Failed(FailureReason::Date(e)) => assert_eq!(e.message, DATE_NOT_FOUND),
            other => panic!("unexpected verdict {:?}", other),
        }
        assert_eq!(
            strict.classify(&domain("example", "li"), undated(), now),
            Verdict::NotExpired(LiveReason::Undated)
        );
    }

    #[tokio::test]
    async fn test_audit_lines_routes_outputs() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("expired.txt");
        let err = dir.path().join("errors.txt");

        let a = auditor(
            RunConfig::default()
                .with_output(&out)
                .with_error(&err)
                .with_concurrency(Concurrency::bounded(2)),
        );
        let lines = ["https://www.live.com/", "old.com", "free.com", "down.com", "example.ch", "not a domain"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let summary = a.audit_lines(lines).await;
        assert_eq!(
            summary,
            RunSummary {
                total: 6,
                expired: 2,
                not_expired: 2,
                failed: 2
            }
        );

        let mut expired: Vec<_> = std::fs::read_to_string(&out).unwrap().lines().map(String::from).collect();
        expired.sort();
        assert_eq!(expired, vec!["free.com", "old.com"]);

        let mut failed: Vec<_> = std::fs::read_to_string(&err).unwrap().lines().map(String::from).collect();
        failed.sort();
        assert_eq!(failed, vec!["down.com", "not a domain"]);
    }

    #[tokio::test]
    async fn test_read_domain_lines_skips_blanks_and_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "# header\nexample.com\n\n   \n  example.org  \r\n#example.net\n").unwrap();

        let lines = read_domain_lines(&path).await.unwrap();
        assert_eq!(lines, vec!["example.com", "example.org"]);

        let missing = read_domain_lines(dir.path().join("missing.txt")).await.unwrap_err();
        assert!(missing.is_fatal());
    }

    #[tokio::test]
    async fn test_run_with_shards_matches_single_process() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.txt");
        std::fs::write(&input, "live.com\nold.com\nfree.com\ndown.com\nexample.ch\n").unwrap();

        let single = Arc::new(auditor(RunConfig::default().with_input(&input)));
        let sharded = Arc::new(auditor(RunConfig::default().with_input(&input).with_processes(3)));

        let a = single.run().await.unwrap();
        let b = sharded.run().await.unwrap();
        assert!(a.is_clean() && b.is_clean());
        assert_eq!(a.summary, b.summary);
        assert_eq!(b.summary.total, 5);
    }
}
