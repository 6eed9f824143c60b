// expiry-audit-lib/tests/integration.rs

//! Integration tests for expiry-audit-lib exports and end-to-end runs

use expiry_audit_lib::{
    AsyncQuery, Auditor, BackendMetadata, BackendRegistry, BackendSettings, Concurrency,
    ExpiryReason, QueryBackend, RawResult, read_domain_lines, RunConfig, RunSummary, ServerDirectory, Verdict,
};
use chrono::{TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers from a map, 503 for anything else.
struct MapBackend {
    answers: HashMap<&'static str, RawResult>,
}

impl AsyncQuery for MapBackend {
    fn query<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, RawResult> {
        async move {
            self.answers
                .get(domain)
                .cloned()
                .unwrap_or_else(|| RawResult::failed(503, "rate limited"))
        }
        .boxed()
    }
}

fn map_registry() -> BackendRegistry {
    let mut answers = HashMap::new();
    answers.insert(
        "example.com",
        RawResult::ok("Domain Name: EXAMPLE.COM\nRegistry Expiry Date: 2000-01-01T00:00:00Z\n"),
    );
    answers.insert(
        "example.org",
        RawResult::ok("Domain Name: EXAMPLE.ORG\nRegistry Expiry Date: 2999-01-01T00:00:00Z\n"),
    );

    let mut registry = BackendRegistry::new();
    registry.register(QueryBackend::asynchronous(
        "map",
        BackendMetadata::default(),
        MapBackend { answers },
    ));
    registry
}

fn read_sorted(path: &Path) -> Vec<String> {
    let mut lines: Vec<String> = fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect();
    lines.sort();
    lines
}

/// A WHOIS server on loopback that answers by domain and closes.
async fn fake_whois(answers: HashMap<&'static str, &'static str>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let answers = Arc::new(answers);

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let answers = Arc::clone(&answers);
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let query = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                let body = answers.get(query.as_str()).copied().unwrap_or("No match for domain.\n");
                let _ = socket.write_all(body.as_bytes()).await;
            });
        }
    });
    port
}

fn loopback_settings(suffix: &str, port: u16) -> BackendSettings {
    let mut overrides = HashMap::new();
    overrides.insert(suffix.to_string(), format!("127.0.0.1:{}", port));
    BackendSettings {
        timeout: Duration::from_secs(5),
        servers: ServerDirectory::with_overrides(overrides),
    }
}

#[tokio::test]
async fn test_lapsed_domain_lands_in_output_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("expired.txt");
    let err = dir.path().join("errors.txt");

    let config = RunConfig::default()
        .with_backend("map")
        .with_output(&out)
        .with_error(&err);
    let auditor = Auditor::new(config, &map_registry()).unwrap();

    let outcome = auditor.audit_domain("HTTPS://Example.COM/path").await;
    assert_eq!(outcome.domain, "example.com");
    match outcome.verdict {
        Verdict::Expired(ExpiryReason::Lapsed(ts)) => {
            assert_eq!(ts, Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
        }
        other => panic!("unexpected verdict {:?}", other),
    }

    assert_eq!(read_sorted(&out), vec!["example.com"]);
    assert!(!err.exists());
}

#[tokio::test]
async fn test_backend_failure_lands_in_error_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("expired.txt");
    let err = dir.path().join("errors.txt");

    let config = RunConfig::default()
        .with_backend("map")
        .with_output(&out)
        .with_error(&err);
    let auditor = Auditor::new(config, &map_registry()).unwrap();

    let outcome = auditor.audit_domain("throttled.net").await;
    assert!(outcome.verdict.is_failed());

    assert_eq!(read_sorted(&err), vec!["throttled.net"]);
    assert!(!out.exists());
}

#[test]
fn test_unknown_backend_is_rejected_before_input_io() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("never-created.txt");

    let config = RunConfig::default().with_backend("nope").with_input(&missing);
    let err = match Auditor::new(config, &map_registry()) {
        Ok(_) => panic!("unknown backend accepted"),
        Err(e) => e,
    };
    assert!(err.is_fatal());
    assert!(err.to_string().contains("map"));
    assert!(!missing.exists());

    let read = tokio_test::block_on(read_domain_lines(&missing));
    assert!(read.unwrap_err().is_fatal());
}

#[tokio::test]
async fn test_full_run_from_input_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("domains.txt");
    let out = dir.path().join("expired.txt");
    let err = dir.path().join("errors.txt");
    fs::write(
        &input,
        "# audit list\nexample.com\nwww.example.org\n\nthrottled.net\nnot-a-domain\n",
    )
    .unwrap();

    let config = RunConfig::default()
        .with_backend("map")
        .with_input(&input)
        .with_output(&out)
        .with_error(&err)
        .with_processes(2)
        .with_concurrency(Concurrency::bounded(2));
    let auditor = Arc::new(Auditor::new(config, &map_registry()).unwrap());

    let report = auditor.run().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(
        report.summary,
        RunSummary {
            total: 4,
            expired: 1,
            not_expired: 1,
            failed: 2,
        }
    );
    assert_eq!(read_sorted(&out), vec!["example.com"]);
    assert_eq!(read_sorted(&err), vec!["not-a-domain", "throttled.net"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_builtin_backends_against_loopback_whois() {
    let mut answers = HashMap::new();
    answers.insert(
        "live.com",
        "Domain Name: LIVE.COM\nRegistry Expiry Date: 2999-01-01T00:00:00Z\n",
    );
    answers.insert(
        "old.com",
        "Domain Name: OLD.COM\nRegistrar Registration Expiration Date: 2001-05-04T00:00:00Z\n",
    );
    answers.insert(
        "pending.com",
        "Domain Name: PENDING.COM\nDomain Status: redemptionPeriod https://icann.org/epp#redemptionPeriod\n",
    );
    answers.insert("busy.com", "Queried interval is too short.\n");
    let port = fake_whois(answers).await;
    let registry = BackendRegistry::with_builtins(&loopback_settings("com", port));

    for backend in ["async_query", "sync_query"] {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("expired.txt");
        let err = dir.path().join("errors.txt");

        let config = RunConfig::default()
            .with_backend(backend)
            .with_output(&out)
            .with_error(&err);
        let auditor = Auditor::new(config, &registry).unwrap();

        let lines = ["live.com", "old.com", "pending.com", "free.com", "busy.com"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let summary = auditor.audit_lines(lines).await;

        assert_eq!(
            summary,
            RunSummary {
                total: 5,
                expired: 3,
                not_expired: 1,
                failed: 1,
            },
            "backend {}",
            backend
        );
        assert_eq!(read_sorted(&out), vec!["free.com", "old.com", "pending.com"], "backend {}", backend);
        assert_eq!(read_sorted(&err), vec!["busy.com"], "backend {}", backend);
    }
}

#[tokio::test]
async fn test_numeric_registry_answers() {
    // .ch and .li registries answer 0 (registered) or 1 (free) and publish no dates.
    let mut registry = BackendRegistry::new();
    registry.register(QueryBackend::sync(
        "numeric",
        BackendMetadata::default(),
        |domain: &str| match domain {
            "taken.ch" | "taken.li" => RawResult::ok("0\n"),
            _ => RawResult::ok("1\n"),
        },
    ));

    let relaxed = Auditor::new(RunConfig::default().with_backend("numeric"), &registry).unwrap();
    let summary = relaxed
        .audit_lines(vec!["taken.ch".into(), "vacant.ch".into(), "taken.li".into()])
        .await;
    assert_eq!(
        summary,
        RunSummary {
            total: 3,
            expired: 1,
            not_expired: 2,
            failed: 0,
        }
    );

    let mut strict_config = RunConfig::default().with_backend("numeric").with_strict(true);
    strict_config.strict_exempt_suffixes = vec!["li".to_string()];
    let strict = Auditor::new(strict_config, &registry).unwrap();
    assert!(strict.audit_domain("taken.ch").await.verdict.is_failed());
    assert!(!strict.audit_domain("taken.li").await.verdict.is_failed());
}

#[test]
fn test_library_info() {
    let info = expiry_audit_lib::info();
    assert!(info.contains(env!("CARGO_PKG_VERSION")));
}
