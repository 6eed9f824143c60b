//! Process-level worker pool.
//!
//! Each shard is written to a file in a private temp directory and handed
//! to a fresh copy of this binary running the hidden `worker` subcommand.
//! The child's stdout carries its JSON summary; stderr is shared with the
//! parent so worker logs stay visible.

use expiry_audit_lib::{RunSummary, ShardExecutor, ShardReport};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Runs every shard in its own child process.
#[derive(Debug, Clone)]
pub struct ProcessShardExecutor {
    program: PathBuf,
    forwarded: Vec<String>,
}

impl ProcessShardExecutor {
    pub fn new(program: PathBuf, forwarded: Vec<String>) -> Self {
        Self { program, forwarded }
    }

    /// Re-execute the running binary.
    pub fn current(forwarded: Vec<String>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, forwarded))
    }

    async fn run_shard(&self, dir: &Path, index: usize, shard: Vec<String>) -> Result<RunSummary, String> {
        let path = dir.join(format!("shard-{}.txt", index));
        let mut body = shard.join("\n");
        body.push('\n');
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| format!("cannot write shard file {}: {}", path.display(), e))?;

        info!(shard = index, domains = shard.len(), "starting worker process");
        let output = Command::new(&self.program)
            .args(&self.forwarded)
            .arg("worker")
            .arg("--shard")
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("cannot start worker: {}", e))?;

        if !output.status.success() {
            return Err(format!("worker exited with {}", output.status));
        }
        let summary = parse_summary(&output.stdout)?;
        debug!(shard = index, ?summary, "worker finished");
        Ok(summary)
    }
}

/// Read the summary from the last non-empty line a worker printed.
pub(crate) fn parse_summary(stdout: &[u8]) -> Result<RunSummary, String> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| "worker printed no summary".to_string())?;
    serde_json::from_str(line).map_err(|e| format!("unreadable worker summary: {}", e))
}

impl ShardExecutor for ProcessShardExecutor {
    fn execute<'a>(&'a self, shards: Vec<Vec<String>>) -> BoxFuture<'a, Vec<ShardReport>> {
        async move {
            let dir = match TempDir::new() {
                Ok(dir) => dir,
                Err(e) => {
                    let reason = format!("cannot create shard directory: {}", e);
                    error!(%reason, "worker pool not started");
                    return (0..shards.len())
                        .map(|index| ShardReport {
                            index,
                            result: Err(reason.clone()),
                        })
                        .collect();
                }
            };

            let dir_path = dir.path();
            let runs = shards.into_iter().enumerate().map(move |(index, shard)| async move {
                let result = self.run_shard(dir_path, index, shard).await;
                if let Err(reason) = &result {
                    error!(shard = index, %reason, "worker failed");
                }
                ShardReport { index, result }
            });
            let reports = join_all(runs).await;

            drop(dir);
            reports
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summary_takes_last_line() {
        let stdout = b"\n{\"total\":3,\"expired\":1,\"not_expired\":1,\"failed\":1}\n\n";
        let summary = parse_summary(stdout).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                total: 3,
                expired: 1,
                not_expired: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_parse_summary_errors() {
        assert!(parse_summary(b"").unwrap_err().contains("no summary"));
        assert!(parse_summary(b"not json\n").unwrap_err().contains("unreadable"));
    }

    #[test]
    fn test_missing_program_fails_every_shard() {
        let executor = ProcessShardExecutor::new(PathBuf::from("/nonexistent/expiry-audit"), Vec::new());
        let reports = tokio_test::block_on(
            executor.execute(vec![vec!["a.com".to_string()], vec!["b.com".to_string()]]),
        );

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].index, 0);
        assert_eq!(reports[1].index, 1);
        for report in &reports {
            assert!(report.result.as_ref().unwrap_err().contains("cannot start worker"));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_worker_is_a_failure() {
        let executor = ProcessShardExecutor::new(PathBuf::from("true"), Vec::new());
        let reports = executor.execute(vec![vec!["a.com".to_string()]]).await;
        assert!(reports[0].result.as_ref().unwrap_err().contains("no summary"));
    }
}
