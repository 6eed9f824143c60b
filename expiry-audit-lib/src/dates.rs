//! Expiry timestamp parsing and evaluation.
//!
//! Registries print expiry dates in many shapes. Everything is normalized
//! to UTC: naive values are taken as UTC, values with an offset are
//! converted.

use crate::error::{DateParseError, DATE_PARSE_FAILED};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

lazy_static::lazy_static! {
    /// Timezone names some registries append instead of an offset.
    static ref TRAILING_ZONE: regex::Regex =
        regex::Regex::new(r"(?i)\s*\(?\b(?:utc|gmt)\)?$").expect("valid zone regex");

    /// Ordinal day suffixes in long-form dates ("1st", "22nd").
    static ref ORDINAL_DAY: regex::Regex =
        regex::Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)\b").expect("valid ordinal regex");
}

/// Formats carrying an explicit offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// Date-time formats without an offset.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%B %d, %Y, %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
    "%b %d, %Y %H:%M:%S",
    "%a %b %d %H:%M:%S %Y",
];

/// Date-only formats; midnight UTC is assumed.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%b %d %Y",
];

/// Parse an expiry date string into a UTC timestamp.
///
/// On failure the error keeps `text` verbatim in `raw`.
///
/// ```
/// use expiry_audit_lib::parse_datetime;
///
/// let ts = parse_datetime("2010-05-20T15:45:30+0530").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2010-05-20T10:15:30+00:00");
/// ```
pub fn parse_datetime(text: &str) -> Result<DateTime<Utc>, DateParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DateParseError::new(DATE_PARSE_FAILED, text, "empty date string"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let cleaned = ORDINAL_DAY.replace_all(trimmed, "$1");
    let zone_stripped = TRAILING_ZONE.replace(&cleaned, "");
    let had_zone_name = zone_stripped.len() != cleaned.len();
    let candidate = zone_stripped.trim();

    if !had_zone_name {
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Ok(dt.with_timezone(&Utc));
            }
        }
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(candidate, fmt) {
            return Ok(dt.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(candidate, fmt) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt.and_utc());
            }
        }
    }

    Err(DateParseError::new(
        DATE_PARSE_FAILED,
        text,
        format!("'{}' matches no known date format", candidate),
    ))
}

/// Whether `expiry` lies strictly before the current UTC time.
pub fn is_expired(expiry: DateTime<Utc>) -> bool {
    is_expired_at(expiry, Utc::now())
}

/// Whether `expiry` lies strictly before `now`.
pub fn is_expired_at(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry < now
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn fields(text: &str) -> (i32, u32, u32, u32, u32, u32) {
        let dt = parse_datetime(text).unwrap_or_else(|e| panic!("{}: {}", text, e));
        (dt.year(), dt.month(), dt.day(), dt.hour(), dt.minute(), dt.second())
    }

    #[test]
    fn test_iso_variants() {
        assert_eq!(fields("2033-12-23T07:59:05Z"), (2033, 12, 23, 7, 59, 5));
        assert_eq!(fields("2028-09-13T07:00:00+0000"), (2028, 9, 13, 7, 0, 0));
        assert_eq!(fields("2025-01-01T00:00:00.0Z"), (2025, 1, 1, 0, 0, 0));
        assert_eq!(fields("2024-08-06T06:05:17.862263Z"), (2024, 8, 6, 6, 5, 17));
        assert_eq!(fields("0001-01-01T00:00:00Z"), (1, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_offsets_are_converted_to_utc() {
        assert_eq!(fields("2010-05-20T15:45:30+0530"), (2010, 5, 20, 10, 15, 30));
        assert_eq!(fields("1999-12-31T23:59:59-0800"), (2000, 1, 1, 7, 59, 59));
        assert_eq!(fields("2021-03-15T13:45:00-0500"), (2021, 3, 15, 18, 45, 0));
        assert_eq!(fields("2025-11-09 22:31:20+00:00"), (2025, 11, 9, 22, 31, 20));
    }

    #[test]
    fn test_space_separated_and_regional_formats() {
        assert_eq!(fields("2025-01-01 00:00:00"), (2025, 1, 1, 0, 0, 0));
        assert_eq!(fields("12-Feb-2026"), (2026, 2, 12, 0, 0, 0));
        assert_eq!(fields("2021/03/15 13:45:00"), (2021, 3, 15, 13, 45, 0));
        assert_eq!(fields("15-03-2021 13:45:00"), (2021, 3, 15, 13, 45, 0));
        assert_eq!(fields("2021.03.15 13:45:00"), (2021, 3, 15, 13, 45, 0));
        assert_eq!(fields("2026-02-12 00:00:00 UTC"), (2026, 2, 12, 0, 0, 0));
        assert_eq!(fields("2020-02-29T12:00:00Z"), (2020, 2, 29, 12, 0, 0));
    }

    #[test]
    fn test_long_form_dates() {
        assert_eq!(fields("March 15, 2021, 13:45:00"), (2021, 3, 15, 13, 45, 0));
        assert_eq!(fields("15 March 2021"), (2021, 3, 15, 0, 0, 0));
        assert_eq!(fields("March 1st, 2021"), (2021, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_invalid_strings_keep_raw() {
        for raw in [
            "Invalid Date String",
            "2028-09-13T07!00:00+0000",
            "2025-S",
            "2010-05-99",
            "1999-12-31T23:59:99-0800",
            "2025-88-09 22:31:20+00:00",
            "",
        ] {
            let err = parse_datetime(raw).expect_err(raw);
            assert_eq!(err.message, DATE_PARSE_FAILED);
            assert_eq!(err.raw, raw);
            assert!(!err.cause.is_empty());
        }
    }

    #[test]
    fn test_is_expired_against_fixed_now() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let future = Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap();

        assert!(is_expired_at(past, now));
        assert!(!is_expired_at(future, now));
        assert!(!is_expired_at(now, now));
        assert!(is_expired(past));
        assert!(!is_expired(future));
    }

    #[test]
    fn test_same_instant_in_different_offsets() {
        let a = parse_datetime("2000-01-01T00:00:00-0500").unwrap();
        let b = parse_datetime("2000-01-01T05:00:00Z").unwrap();
        let c = parse_datetime("2000-01-01 10:30:00+05:30").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);

        let now = Utc.with_ymd_and_hms(2000, 1, 1, 5, 0, 0).unwrap();
        assert_eq!(is_expired_at(a, now), is_expired_at(b, now));
        assert_eq!(is_expired_at(b, now), is_expired_at(c, now));
    }
}
