//! Error handling for expiry auditing.
//!
//! `AuditError` covers run-level failures (bad configuration, unreadable
//! files, unresolvable servers). The per-domain taxonomy lives beside it:
//! transport failures are `ProtocolError`, backend or invocation failures
//! are `QueryError`, and missing or malformed expiry fields are
//! `DateParseError`. Per-domain errors never abort a batch.

use std::fmt;
use std::time::Duration;

/// Main error type for run-level operations.
#[derive(Debug, Clone)]
pub enum AuditError {
    /// Invalid run parameters. Always fatal, reported before any domain is processed.
    ConfigError { message: String },

    /// Input could not be normalized into a registrable domain
    InvalidDomain { domain: String, reason: String },

    /// No WHOIS server is known for any suffix of the domain
    ServerNotFound { domain: String },

    /// Transport failure talking to a WHOIS server
    Protocol(ProtocolError),

    /// File I/O errors on input, output or shard files
    FileError { path: String, message: String },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl AuditError {
    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new invalid domain error.
    pub fn invalid_domain<D: Into<String>, R: Into<String>>(domain: D, reason: R) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    /// Create a new server-not-found error.
    pub fn server_not_found<D: Into<String>>(domain: D) -> Self {
        Self::ServerNotFound {
            domain: domain.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error must stop the run instead of a single domain.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigError { .. } | Self::FileError { .. })
    }
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message } => write!(f, "Configuration error: {}", message),
            Self::InvalidDomain { domain, reason } => {
                write!(f, "Invalid domain '{}': {}", domain, reason)
            }
            Self::ServerNotFound { domain } => {
                write!(f, "No WHOIS server known for '{}'", domain)
            }
            Self::Protocol(err) => write!(f, "{}", err),
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for AuditError {}

impl From<ProtocolError> for AuditError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

/// Transport-level failure of a single WHOIS exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Connection refused, reset, DNS failure, or an undecodable response
    Socket { server: String, message: String },

    /// An individual connect, write or read took longer than allowed
    Timeout {
        server: String,
        operation: &'static str,
        duration: Duration,
    },
}

impl ProtocolError {
    pub fn socket<S: Into<String>, M: Into<String>>(server: S, message: M) -> Self {
        Self::Socket {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(server: S, operation: &'static str, duration: Duration) -> Self {
        Self::Timeout {
            server: server.into(),
            operation,
            duration,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket { server, message } => {
                write!(f, "Socket error talking to {}: {}", server, message)
            }
            Self::Timeout {
                server,
                operation,
                duration,
            } => write!(f, "Timeout after {:?} during {} on {}", duration, operation, server),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Failure to obtain a usable WHOIS body for one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The backend answered, but with a non-success code, an empty body,
    /// or a rate-limit message
    Backend {
        domain: String,
        message: String,
        code: u16,
    },

    /// The backend panicked or its task could not be joined
    Exception { domain: String, cause: String },
}

impl QueryError {
    pub fn backend<D: Into<String>, M: Into<String>>(domain: D, message: M, code: u16) -> Self {
        Self::Backend {
            domain: domain.into(),
            message: message.into(),
            code,
        }
    }

    pub fn exception<D: Into<String>, C: Into<String>>(domain: D, cause: C) -> Self {
        Self::Exception {
            domain: domain.into(),
            cause: cause.into(),
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            Self::Backend { domain, .. } | Self::Exception { domain, .. } => domain,
        }
    }

    /// Whether a later pass might succeed (rate limits, transient server errors).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { code: 500..=599, .. })
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend {
                domain,
                message,
                code,
            } => write!(f, "Backend error for '{}' (code {}): {}", domain, code, message.trim()),
            Self::Exception { domain, cause } => {
                write!(f, "Backend raised while querying '{}': {}", domain, cause)
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// The expiry field was missing or could not be read as a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct DateParseError {
    pub message: String,
    /// The input verbatim: the date text, or the whole body when no label matched
    pub raw: String,
    pub cause: String,
}

pub const DATE_NOT_FOUND: &str = "Date not found";
pub const DATE_PARSE_FAILED: &str = "Error Parsing Date";
pub const DATE_NOT_EVALUATED: &str = "Not evaluated";

impl DateParseError {
    pub fn new<M: Into<String>, R: Into<String>, C: Into<String>>(message: M, raw: R, cause: C) -> Self {
        Self {
            message: message.into(),
            raw: raw.into(),
            cause: cause.into(),
        }
    }

    pub fn not_found<R: Into<String>>(raw: R) -> Self {
        Self::new(DATE_NOT_FOUND, raw, "no expiry label in response")
    }

    pub fn is_not_found(&self) -> bool {
        self.message == DATE_NOT_FOUND
    }
}

impl fmt::Display for DateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_not_found() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} '{}': {}", self.message, self.raw, self.cause)
        }
    }
}

impl std::error::Error for DateParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(AuditError::config("unknown backend").is_fatal());
        assert!(!AuditError::server_not_found("example.invalid").is_fatal());
    }

    #[test]
    fn test_query_error_display_and_retry() {
        let err = QueryError::backend("example.com", "rate limited\r\n", 503);
        assert_eq!(
            err.to_string(),
            "Backend error for 'example.com' (code 503): rate limited"
        );
        assert!(err.is_retryable());
        assert_eq!(err.domain(), "example.com");

        let err = QueryError::exception("example.com", "boom");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_date_not_found_keeps_body() {
        let err = DateParseError::not_found("Domain Name: X\n");
        assert!(err.is_not_found());
        assert_eq!(err.raw, "Domain Name: X\n");
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: AuditError =
            ProtocolError::timeout("whois.example", "read", Duration::from_secs(1)).into();
        assert!(matches!(err, AuditError::Protocol(ProtocolError::Timeout { .. })));
    }
}
