//! RFC 5322 header parsing: folding, the identity headers, and date parsing.

use chrono::{DateTime, NaiveDateTime};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::model::address::{domain_of, sender_of};
use crate::model::message::IdentityTuple;
use crate::model::timestamp::Timestamp;

/// Offset-aware formats tried after RFC 2822 / RFC 3339.
const ZONED_FORMATS: [&str; 5] = [
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%z",
];

/// Offset-free formats; a match yields a naive [`Timestamp`].
const NAIVE_FORMATS: [&str; 7] = [
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// The headers that identify a message, as raw (unfolded) values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityHeaders {
    pub from: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
}

impl IdentityHeaders {
    /// Pull `From`, `Date` and `Subject` out of raw header bytes.
    pub fn parse(raw_headers: &[u8]) -> Self {
        let text = decode_header_bytes(raw_headers);
        let headers = unfold_headers(&text);
        Self {
            from: get_header(&headers, "from"),
            date: get_header(&headers, "date"),
            subject: get_header(&headers, "subject"),
        }
    }

    /// Derive the identity tuple and sender domain.
    ///
    /// Fails with [`SyncError::DateParse`] when the date is missing or
    /// unparseable, and [`SyncError::MissingDomain`] when the sender has no `@`.
    pub fn identity(&self) -> Result<(IdentityTuple, String)> {
        let sender = sender_of(self.from.as_deref().unwrap_or_default());
        let domain = domain_of(&sender)
            .ok_or_else(|| SyncError::MissingDomain(sender.clone()))?
            .to_string();

        let date_raw = self.date.as_deref().unwrap_or_default();
        let timestamp =
            parse_date(date_raw).ok_or_else(|| SyncError::DateParse(date_raw.to_string()))?;

        let identity = IdentityTuple {
            sender,
            timestamp,
            subject: self.subject.clone().unwrap_or_default(),
        };
        Ok((identity, domain))
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: drop the line break before each continuation line
/// (starting with space or tab) and keep its whitespace.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs. Only the blanks
/// right after the colon are removed from a value.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push_str(line);
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..]
                .trim_start_matches([' ', '\t'])
                .to_string();
            result.push((name, value));
        }
    }

    result
}

/// Get the first value for a header name (case-insensitive).
fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Parse an email date string in the common real-world formats.
///
/// Dates with an offset (numeric or a well-known zone name) give an
/// offset-aware [`Timestamp`]; dates without one give a naive timestamp.
pub fn parse_date(date_str: &str) -> Option<Timestamp> {
    let trimmed = strip_comment(date_str.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(Timestamp::zoned(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(Timestamp::zoned(dt));
    }

    let no_dow = strip_day_of_week(trimmed);
    let normalized = normalize_imap_date(&no_dow);
    let candidates = [
        no_dow.clone(),
        normalized.clone(),
        replace_named_tz(&no_dow),
        replace_named_tz(&normalized),
    ];

    for candidate in &candidates {
        for fmt in &ZONED_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(Timestamp::zoned(dt));
            }
        }
    }

    for candidate in &candidates[..2] {
        for fmt in &NAIVE_FORMATS {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(Timestamp::naive(ndt));
            }
        }
    }

    if let Some(ts) = mail_parser_date(trimmed) {
        debug!(date = trimmed, "Date parsed by mail-parser fallback");
        return Some(ts);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<Timestamp> {
    use mail_parser::MessageParser;

    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt).ok().map(Timestamp::zoned)
}

/// Drop a trailing RFC 5322 comment such as `(UTC)` or `(PST)`.
fn strip_comment(s: &str) -> &str {
    if s.ends_with(')') {
        if let Some(open) = s.rfind('(') {
            return s[..open].trim_end();
        }
    }
    s
}

/// Normalize IMAP-style dates: `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    if !s.contains('-') {
        return s.to_string();
    }

    let months = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    for month in months {
        for pattern in [
            format!("-{}-", month.to_uppercase()),
            format!("-{}-", month.to_lowercase()),
            format!("-{month}-"),
        ] {
            if s.contains(&pattern) {
                return s.replacen(&pattern, &format!(" {month} "), 1);
            }
        }
    }

    s.to_string()
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in days {
        if let Some(rest) = s.strip_prefix(day) {
            if rest.starts_with(',') || rest.starts_with(' ') {
                return rest.trim_start_matches(',').trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("CEST", "+0200"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in tzs {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: This is a long\n\tsubject line\nFrom: user@example.com\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "subject");
        assert_eq!(headers[0].1, "This is a long\tsubject line");
    }

    #[test]
    fn test_folded_subject_kept_verbatim() {
        let raw = b"From: a@b.com\nDate: 2021-01-02T03:04:05\nSubject: Your\n\t  order  \n";
        let (identity, _) = IdentityHeaders::parse(raw).identity().unwrap();
        assert_eq!(identity.subject, "Your\t  order  ");

        let single = b"From: a@b.com\nDate: 2021-01-02T03:04:05\nSubject: Your order\n";
        let (other, _) = IdentityHeaders::parse(single).identity().unwrap();
        assert_ne!(identity, other);
    }

    #[test]
    fn test_identity_headers_parse() {
        let raw = b"From: Shop <orders@shop.example>\nDate: Sat, 02 Jan 2021 03:04:05 +0000\nSubject: Your order\n";
        let headers = IdentityHeaders::parse(raw);
        assert_eq!(headers.from.as_deref(), Some("Shop <orders@shop.example>"));
        assert_eq!(headers.subject.as_deref(), Some("Your order"));

        let (identity, domain) = headers.identity().unwrap();
        assert_eq!(identity.sender, "orders@shop.example");
        assert_eq!(identity.subject, "Your order");
        assert_eq!(identity.timestamp.to_iso(), "2021-01-02T03:04:05+00:00");
        assert_eq!(domain, "shop.example");
    }

    #[test]
    fn test_identity_missing_subject_is_empty() {
        let raw = b"From: a@b.com\nDate: 2021-01-02T03:04:05\n";
        let (identity, _) = IdentityHeaders::parse(raw).identity().unwrap();
        assert_eq!(identity.subject, "");
    }

    #[test]
    fn test_identity_bad_date() {
        let raw = b"From: a@b.com\nDate: not a date\nSubject: x\n";
        let err = IdentityHeaders::parse(raw).identity().unwrap_err();
        assert!(matches!(err, SyncError::DateParse(ref d) if d == "not a date"));
    }

    #[test]
    fn test_identity_missing_date() {
        let raw = b"From: a@b.com\nSubject: x\n";
        let err = IdentityHeaders::parse(raw).identity().unwrap_err();
        assert!(matches!(err, SyncError::DateParse(_)));
    }

    #[test]
    fn test_identity_sender_without_domain() {
        let raw = b"From: Postmaster <postmaster>\nDate: 2021-01-02T03:04:05\n";
        let err = IdentityHeaders::parse(raw).identity().unwrap_err();
        assert!(matches!(err, SyncError::MissingDomain(ref s) if s == "postmaster"));
    }

    #[test]
    fn test_latin1_header_bytes() {
        let raw = b"Subject: Caf\xe9\n";
        let headers = IdentityHeaders::parse(raw);
        assert_eq!(headers.subject.as_deref(), Some("Café"));
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let ts = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!(ts.to_iso(), "2024-01-04T10:00:00+00:00");
    }

    #[test]
    fn test_parse_date_with_comment() {
        let ts = parse_date("Thu, 04 Jan 2024 10:00:00 +0000 (UTC)").unwrap();
        assert_eq!(ts.to_iso(), "2024-01-04T10:00:00+00:00");
    }

    #[test]
    fn test_parse_date_named_tz() {
        let ts = parse_date("Thu, 04 Jan 2024 10:00:00 EST").unwrap();
        assert_eq!(ts.to_iso(), "2024-01-04T10:00:00-05:00");
    }

    #[test]
    fn test_parse_date_cet() {
        let ts = parse_date("Thu, 04 Jan 2024 10:00:00 CET").unwrap();
        assert_eq!(ts.to_iso(), "2024-01-04T10:00:00+01:00");
    }

    #[test]
    fn test_parse_date_without_offset_is_naive() {
        let ts = parse_date("Sat, 02 Jan 2021 03:04:05").unwrap();
        assert!(!ts.has_offset());
        assert_eq!(ts.to_iso(), "2021-01-02T03:04:05");

        let ts = parse_date("2021-01-02T03:04:05").unwrap();
        assert!(!ts.has_offset());
        assert_eq!(ts.to_iso(), "2021-01-02T03:04:05");
    }

    #[test]
    fn test_parse_date_iso8601_zulu() {
        let ts = parse_date("2024-01-04T10:00:00Z").unwrap();
        assert!(ts.has_offset());
    }

    #[test]
    fn test_parse_date_imap_style() {
        let ts = parse_date("16-JUL-2025 03:01:03").unwrap();
        assert_eq!(ts.to_iso(), "2025-07-16T03:01:03");
    }

    #[test]
    fn test_parse_date_empty() {
        assert!(parse_date("").is_none());
        assert!(parse_date("   ").is_none());
    }

    #[test]
    fn test_normalize_imap_date() {
        assert_eq!(
            normalize_imap_date("10-MAR-2025 06:00:42"),
            "10 Mar 2025 06:00:42"
        );
        assert_eq!(
            normalize_imap_date("04 Jan 2024 10:00:00"),
            "04 Jan 2024 10:00:00"
        );
    }

    #[test]
    fn test_strip_day_of_week() {
        assert_eq!(strip_day_of_week("Thu, 04 Jan 2024"), "04 Jan 2024");
        assert_eq!(strip_day_of_week("Thu 04 Jan 2024"), "04 Jan 2024");
        assert_eq!(strip_day_of_week("04 Jan 2024"), "04 Jan 2024");
    }
}
