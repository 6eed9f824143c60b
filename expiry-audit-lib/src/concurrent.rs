//! Scheduling primitives.
//!
//! Two levels of parallelism: a bounded runner for per-domain tasks inside
//! one process, and shard executors that run disjoint slices of the input
//! independently of each other.

use crate::error::AuditError;
use crate::types::{Concurrency, RunSummary};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Runs futures with at most N in flight.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrentProcessor {
    concurrency: Concurrency,
}

impl ConcurrentProcessor {
    pub fn new(concurrency: Concurrency) -> Self {
        Self { concurrency }
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Map every item through `task`, collecting outputs in completion order.
    pub async fn run<I, F, Fut, T>(&self, items: I, task: F) -> Vec<T>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        let limit = self.concurrency.limit().unwrap_or(usize::MAX);
        stream::iter(items).map(task).buffer_unordered(limit).collect().await
    }
}

/// Split `lines` into `n` contiguous shards.
///
/// Every shard gets `len / n` lines and the first `len % n` shards one
/// more. `n == 0` is treated as 1. Shards may be empty when `n > len`.
pub fn partition<T>(lines: Vec<T>, n: usize) -> Vec<Vec<T>> {
    let n = n.max(1);
    let base = lines.len() / n;
    let extra = lines.len() % n;

    let mut shards = Vec::with_capacity(n);
    let mut iter = lines.into_iter();
    for i in 0..n {
        let size = base + usize::from(i < extra);
        shards.push(iter.by_ref().take(size).collect());
    }
    shards
}

/// What became of one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardReport {
    pub index: usize,
    pub result: Result<RunSummary, String>,
}

/// Merged view over all shards of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolReport {
    pub summary: RunSummary,
    pub failed_shards: Vec<(usize, String)>,
}

impl PoolReport {
    pub fn from_reports(reports: Vec<ShardReport>) -> Self {
        let mut pool = Self::default();
        for report in reports {
            match report.result {
                Ok(summary) => pool.summary.merge(&summary),
                Err(reason) => pool.failed_shards.push((report.index, reason)),
            }
        }
        pool.failed_shards.sort_by_key(|(index, _)| *index);
        pool
    }

    pub fn single(summary: RunSummary) -> Self {
        Self {
            summary,
            failed_shards: Vec::new(),
        }
    }

    /// True when every shard finished.
    pub fn is_clean(&self) -> bool {
        self.failed_shards.is_empty()
    }
}

/// Runs a set of shards. A failing shard must not affect its siblings.
pub trait ShardExecutor: Send + Sync {
    fn execute<'a>(&'a self, shards: Vec<Vec<String>>) -> BoxFuture<'a, Vec<ShardReport>>;
}

type ShardFn = dyn Fn(usize, Vec<String>) -> BoxFuture<'static, Result<RunSummary, AuditError>> + Send + Sync;

/// Runs each shard as its own tokio task in the current process.
pub struct TaskShardExecutor {
    run_shard: Arc<ShardFn>,
}

impl TaskShardExecutor {
    pub fn new<F, Fut>(run_shard: F) -> Self
    where
        F: Fn(usize, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RunSummary, AuditError>> + Send + 'static,
    {
        Self {
            run_shard: Arc::new(move |index: usize, shard: Vec<String>| run_shard(index, shard).boxed()),
        }
    }
}

impl ShardExecutor for TaskShardExecutor {
    fn execute<'a>(&'a self, shards: Vec<Vec<String>>) -> BoxFuture<'a, Vec<ShardReport>> {
        async move {
            let handles: Vec<_> = shards
                .into_iter()
                .enumerate()
                .map(|(index, shard)| {
                    info!(shard = index, domains = shard.len(), "starting shard");
                    (index, tokio::spawn((self.run_shard)(index, shard)))
                })
                .collect();

            let mut reports = Vec::with_capacity(handles.len());
            for (index, handle) in handles {
                let result = match handle.await {
                    Ok(Ok(summary)) => Ok(summary),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(format!("shard task aborted: {}", e)),
                };
                if let Err(reason) = &result {
                    error!(shard = index, %reason, "shard failed");
                }
                reports.push(ShardReport { index, result });
            }
            reports
        }
        .boxed()
    }
}
