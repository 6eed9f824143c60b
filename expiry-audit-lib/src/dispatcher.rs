//! Backend dispatch.
//!
//! Resolves the selected backend once, then for every domain invokes it in
//! the mode it declares and turns the raw answer into either parsed WHOIS
//! data or a typed `QueryError`. Panics inside a backend are contained
//! here and never reach the caller.

use crate::backends::{BackendImpl, BackendRegistry, QueryBackend, CODE_UNAVAILABLE};
use crate::error::{AuditError, QueryError};
use crate::parser::{is_rate_limited, ResponseParser};
use crate::types::{BackendMode, ParsedWhoisData, RawResult, CODE_OK};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

pub const EMPTY_RESULT: &str = "Empty query result";

#[derive(Debug, Clone)]
pub struct Dispatcher {
    backend: QueryBackend,
    parser: ResponseParser,
}

impl Dispatcher {
    /// Bind to the backend registered under `id`.
    ///
    /// An unknown id is a configuration error, raised here so that it
    /// surfaces before any domain is processed.
    pub fn new(registry: &BackendRegistry, id: &str) -> Result<Self, AuditError> {
        let backend = registry.get(id)?.clone();
        Ok(Self {
            backend,
            parser: ResponseParser::default(),
        })
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn backend_id(&self) -> &str {
        &self.backend.id
    }

    pub fn mode(&self) -> BackendMode {
        self.backend.mode()
    }

    /// Query `domain` and parse the answer.
    pub async fn call_backend(&self, domain: &str) -> Result<ParsedWhoisData, QueryError> {
        let raw = self.invoke(domain).await?;

        if raw.code != CODE_OK {
            warn!(domain, code = raw.code, "backend reported failure");
            return Err(QueryError::backend(domain, raw.raw, raw.code));
        }
        if raw.raw.trim().is_empty() {
            warn!(domain, "backend returned an empty body");
            return Err(QueryError::backend(domain, EMPTY_RESULT, CODE_OK));
        }
        if is_rate_limited(&raw.raw) {
            warn!(domain, "registry rate limit hit");
            return Err(QueryError::backend(domain, raw.raw, CODE_UNAVAILABLE));
        }

        let parsed = self.parser.parse_for(domain, &raw.raw);
        debug!(domain, phase = %parsed.status.phase, "parsed response");
        Ok(parsed)
    }

    async fn invoke(&self, domain: &str) -> Result<RawResult, QueryError> {
        match &self.backend.implementation {
            BackendImpl::Sync(query) => {
                let query = Arc::clone(query);
                let owned = domain.to_string();
                tokio::task::spawn_blocking(move || query.query(&owned))
                    .await
                    .map_err(|e| {
                        let cause = if e.is_panic() {
                            panic_message(e.into_panic())
                        } else {
                            e.to_string()
                        };
                        warn!(domain, %cause, "sync backend failed");
                        QueryError::exception(domain, cause)
                    })
            }
            BackendImpl::Async(query) => AssertUnwindSafe(query.query(domain))
                .catch_unwind()
                .await
                .map_err(|payload| {
                    let cause = panic_message(payload);
                    warn!(domain, %cause, "async backend failed");
                    QueryError::exception(domain, cause)
                }),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "backend panicked".to_string()
    }
}
