//! Domain normalization.
//!
//! Input lines may be bare hosts, URLs, or subdomains. Before any network
//! call they are reduced to the registrable domain (second level plus
//! public suffix), lower-cased and converted to ASCII.

use crate::error::AuditError;
use public_suffix::{EffectiveTLDProvider, DEFAULT_PROVIDER};
use std::fmt;
use tracing::debug;

lazy_static::lazy_static! {
    static ref URL_SCHEME: regex::Regex =
        regex::Regex::new(r"^[a-z][a-z0-9+.\-]*://").expect("valid scheme regex");
}

/// A registrable domain: `label` is the second-level part, `suffix` the
/// public suffix (`co.uk`, `com`, `ch`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain {
    pub label: String,
    pub suffix: String,
}

impl Domain {
    /// Full name, `label.suffix`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.label, self.suffix)
    }

    /// Rightmost label of the suffix.
    pub fn tld(&self) -> &str {
        self.suffix.rsplit('.').next().unwrap_or(&self.suffix)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.label, self.suffix)
    }
}

/// Splits an ASCII host into its registrable domain.
pub trait SuffixExtractor: Send + Sync {
    fn registrable(&self, host: &str) -> Result<Domain, AuditError>;
}

/// Extractor backed by the bundled public suffix list.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicSuffixExtractor;

impl SuffixExtractor for PublicSuffixExtractor {
    fn registrable(&self, host: &str) -> Result<Domain, AuditError> {
        let etld1 = DEFAULT_PROVIDER
            .effective_tld_plus_one(host)
            .map_err(|e| AuditError::invalid_domain(host, format!("no registrable domain: {:?}", e)))?;

        match etld1.split_once('.') {
            Some((label, suffix)) if !label.is_empty() && !suffix.is_empty() => Ok(Domain {
                label: label.to_string(),
                suffix: suffix.to_string(),
            }),
            _ => Err(AuditError::invalid_domain(host, "missing public suffix")),
        }
    }
}

/// Strip scheme, credentials, port, path and trailing dot from one input line.
fn clean_host(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let without_scheme = URL_SCHEME.replace(&lowered, "");
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or(host);
    let host = host.split(':').next().unwrap_or(host);
    host.trim_end_matches('.').to_string()
}

/// Normalize one input line into a registrable domain.
///
/// ```
/// use expiry_audit_lib::{normalize_domain, PublicSuffixExtractor};
///
/// let domain = normalize_domain("https://www.Example.co.uk/path", &PublicSuffixExtractor).unwrap();
/// assert_eq!(domain.name(), "example.co.uk");
/// assert_eq!(domain.suffix, "co.uk");
/// ```
pub fn normalize_domain(input: &str, extractor: &dyn SuffixExtractor) -> Result<Domain, AuditError> {
    let host = clean_host(input);
    if host.is_empty() {
        return Err(AuditError::invalid_domain(input.trim(), "empty host"));
    }
    if !host.contains('.') {
        return Err(AuditError::invalid_domain(input.trim(), "no suffix"));
    }

    let ascii = idna::domain_to_ascii_cow(host.as_bytes(), idna::AsciiDenyList::URL)
        .map_err(|e| AuditError::invalid_domain(input.trim(), format!("IDNA conversion failed: {:?}", e)))?;

    let valid = ascii
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid || ascii.split('.').any(|l| l.is_empty() || l.len() > 63) {
        return Err(AuditError::invalid_domain(input.trim(), "invalid characters or labels"));
    }

    let domain = extractor.registrable(ascii.as_ref())?;
    debug!(input = %input.trim(), domain = %domain, "normalized");
    Ok(domain)
}
