//! Query backends and their registry.
//!
//! A backend turns a domain into a `RawResult`. Blocking backends implement
//! [`SyncQuery`] and are driven on the blocking thread pool; cooperative
//! ones implement [`AsyncQuery`] and are awaited on the runtime. Backends
//! are compiled in, registered once at startup, and never change afterwards.

use crate::error::{AuditError, ProtocolError};
use crate::parser::{is_rate_limited, numeric_code};
use crate::protocols::{ServerDirectory, ServerEndpoint};
use crate::types::{BackendMode, RawResult, RunConfig};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "async-backend")]
pub mod async_query;
#[cfg(feature = "sync-backend")]
pub mod sync_query;

pub const ASYNC_QUERY_ID: &str = "async_query";
pub const SYNC_QUERY_ID: &str = "sync_query";

/// Code reported for transient failures: transport errors, throttling,
/// negative numeric-registry answers.
pub const CODE_UNAVAILABLE: u16 = 503;

/// Code reported when the backend itself cannot service the domain.
pub const CODE_INTERNAL: u16 = 500;

/// A backend that blocks the calling thread.
pub trait SyncQuery: Send + Sync {
    fn query(&self, domain: &str) -> RawResult;
}

impl<F> SyncQuery for F
where
    F: Fn(&str) -> RawResult + Send + Sync,
{
    fn query(&self, domain: &str) -> RawResult {
        self(domain)
    }
}

/// A backend that yields to the runtime while waiting on I/O.
pub trait AsyncQuery: Send + Sync {
    fn query<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, RawResult>;
}

#[derive(Clone)]
pub enum BackendImpl {
    Sync(Arc<dyn SyncQuery>),
    Async(Arc<dyn AsyncQuery>),
}

impl std::fmt::Debug for BackendImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendImpl::Sync(_) => write!(f, "Sync(..)"),
            BackendImpl::Async(_) => write!(f, "Async(..)"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendMetadata {
    pub author: String,
    pub help: String,
}

/// A registered backend: id, descriptive metadata, and the implementation.
#[derive(Debug, Clone)]
pub struct QueryBackend {
    pub id: String,
    pub metadata: BackendMetadata,
    pub implementation: BackendImpl,
}

impl QueryBackend {
    pub fn sync<I, Q>(id: I, metadata: BackendMetadata, backend: Q) -> Self
    where
        I: Into<String>,
        Q: SyncQuery + 'static,
    {
        Self {
            id: id.into(),
            metadata,
            implementation: BackendImpl::Sync(Arc::new(backend)),
        }
    }

    pub fn asynchronous<I, Q>(id: I, metadata: BackendMetadata, backend: Q) -> Self
    where
        I: Into<String>,
        Q: AsyncQuery + 'static,
    {
        Self {
            id: id.into(),
            metadata,
            implementation: BackendImpl::Async(Arc::new(backend)),
        }
    }

    pub fn mode(&self) -> BackendMode {
        match self.implementation {
            BackendImpl::Sync(_) => BackendMode::Sync,
            BackendImpl::Async(_) => BackendMode::Async,
        }
    }
}

/// Settings shared by the built-in WHOIS backends.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub timeout: Duration,
    pub servers: ServerDirectory,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            timeout: crate::protocols::whois::DEFAULT_TIMEOUT,
            servers: ServerDirectory::new(),
        }
    }
}

impl BackendSettings {
    /// Settings carrying the run's per-operation timeout.
    pub fn for_run(config: &RunConfig, servers: ServerDirectory) -> Self {
        Self {
            timeout: config.timeout,
            servers,
        }
    }
}

/// Id to backend lookup table.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, QueryBackend>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the compiled-in WHOIS backends.
    #[allow(unused_mut, unused_variables)]
    pub fn with_builtins(settings: &BackendSettings) -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "async-backend")]
        registry.register(async_query::backend(settings));
        #[cfg(feature = "sync-backend")]
        registry.register(sync_query::backend(settings));
        registry
    }

    /// Add a backend, replacing any previous one with the same id.
    pub fn register(&mut self, backend: QueryBackend) {
        self.backends.insert(backend.id.clone(), backend);
    }

    pub fn get(&self, id: &str) -> Result<&QueryBackend, AuditError> {
        self.backends.get(id).ok_or_else(|| {
            AuditError::config(format!(
                "unknown backend id '{}' (available: {})",
                id,
                self.ids().join(", ")
            ))
        })
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryBackend> {
        self.backends.values()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Map a WHOIS exchange to the code convention shared by all backends.
pub(crate) fn to_raw_result(endpoint: &ServerEndpoint, outcome: Result<String, ProtocolError>) -> RawResult {
    let body = match outcome {
        Ok(body) => body,
        Err(e) => return RawResult::failed(CODE_UNAVAILABLE, e.to_string()),
    };

    if endpoint.is_numeric_registry() {
        return match numeric_code(&body) {
            Some(0) | Some(1) => RawResult::ok(body),
            Some(-1) => RawResult::failed(CODE_UNAVAILABLE, format!("invalid enquiry: {}", body.trim())),
            Some(-95) => RawResult::failed(CODE_UNAVAILABLE, format!("access restricted: {}", body.trim())),
            Some(-99) => RawResult::failed(CODE_UNAVAILABLE, format!("temporary server error: {}", body.trim())),
            _ => RawResult::failed(CODE_UNAVAILABLE, format!("unexpected registry answer: {}", body.trim())),
        };
    }

    if is_rate_limited(&body) {
        return RawResult::failed(CODE_UNAVAILABLE, body);
    }

    RawResult::ok(body)
}

/// Result for a domain no server is known for.
pub(crate) fn no_server(err: AuditError) -> RawResult {
    RawResult::failed(CODE_INTERNAL, err.to_string())
}
