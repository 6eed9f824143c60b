//! Heuristic WHOIS response parser.
//!
//! Registry operators format their answers differently. The parser looks
//! for a handful of markers, in priority order, to decide the registration
//! phase, and only reads the expiry date of registered domains.

use crate::dates::parse_datetime;
use crate::error::{DateParseError, DATE_NOT_EVALUATED};
use crate::types::{DomainStatus, ParsedWhoisData, Phase, NUMERIC_CODE_SUFFIXES};

const REDEMPTION_MARKERS: &[&str] = &["Domain Status: redemptionPeriod", "status: redemptionPeriod"];

const REGISTRATION_MARKERS: &[&str] = &["Domain Name:", "domain:", "Domain name:"];

/// Labels preceding an expiry date, in lookup order.
const EXPIRY_LABELS: &[&str] = &[
    "Registrar Registration Expiration Date:",
    "Expiration Time:",
    "Registry Expiry Date:",
    "Expiry date:",
    "Expiry Date:",
    "Expiration Date:",
    "paid-till:",
];

/// Lower-case substrings registries use to signal throttling.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "access is too fast",
    "interval is too short",
    "interval too short",
    "rate limit exceeded",
    "too many requests",
    "quota exceeded",
];

/// Whether a response body is a throttling notice rather than data.
pub fn is_rate_limited(raw: &str) -> bool {
    let lowered = raw.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lowered.contains(m))
}

/// First non-empty line, if it is a bare integer.
pub fn numeric_code(raw: &str) -> Option<i32> {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<i32>().ok())
}

/// Response parser with a configurable set of numeric-code suffixes.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    numeric_suffixes: Vec<String>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            numeric_suffixes: NUMERIC_CODE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_numeric_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.numeric_suffixes = suffixes;
        self
    }

    fn uses_numeric_codes(&self, domain: &str) -> bool {
        let tld = domain.trim_end_matches('.').rsplit('.').next().unwrap_or_default();
        self.numeric_suffixes.iter().any(|s| s.eq_ignore_ascii_case(tld))
    }

    /// Parse a body without knowing the domain. `domain` is left blank.
    pub fn parse(&self, raw: &str) -> ParsedWhoisData {
        self.build(String::new(), raw, self.textual_phase(raw))
    }

    /// Parse a body for `domain`, reading numeric status codes when the
    /// domain's registry answers that way.
    pub fn parse_for(&self, domain: &str, raw: &str) -> ParsedWhoisData {
        let phase = match self.uses_numeric_codes(domain).then(|| numeric_code(raw)).flatten() {
            Some(0) => Phase::Registered,
            Some(1) => Phase::Unregistered,
            _ => self.textual_phase(raw),
        };
        self.build(domain.to_string(), raw, phase)
    }

    fn textual_phase(&self, raw: &str) -> Phase {
        if REDEMPTION_MARKERS.iter().any(|m| raw.contains(m)) {
            Phase::Redemption
        } else if REGISTRATION_MARKERS.iter().any(|m| raw.contains(m)) {
            Phase::Registered
        } else {
            Phase::Unregistered
        }
    }

    fn build(&self, domain: String, raw: &str, phase: Phase) -> ParsedWhoisData {
        let expiry_date = match phase {
            Phase::Registered => extract_expiry(raw),
            _ => Err(DateParseError::new(
                DATE_NOT_EVALUATED,
                "",
                format!("domain is {}", phase),
            )),
        };

        ParsedWhoisData {
            domain,
            status: DomainStatus::from_phase(phase),
            raw: raw.to_string(),
            expiry_date,
        }
    }
}

fn extract_expiry(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, DateParseError> {
    for line in raw.lines() {
        for label in EXPIRY_LABELS {
            if let Some(pos) = line.find(label) {
                let value = line[pos + label.len()..].trim();
                if !value.is_empty() {
                    return parse_datetime(value);
                }
            }
        }
    }
    Err(DateParseError::not_found(raw))
}

/// Parse with the default parser.
pub fn parse(raw: &str) -> ParsedWhoisData {
    ResponseParser::default().parse(raw)
}

/// Parse for `domain` with the default parser.
pub fn parse_for(domain: &str, raw: &str) -> ParsedWhoisData {
    ResponseParser::default().parse_for(domain, raw)
}
