//! Message timestamps that remember whether the source carried a UTC offset.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};

/// A parsed message date.
///
/// `Date:` headers in the wild come both with and without a UTC offset.
/// The distinction is kept because it shows up in the ISO form used as the
/// stored key and in dump filenames.
///
/// Ordering compares the instant first (UTC for offset-aware values, the wall
/// clock for naive ones), then the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    instant: NaiveDateTime,
    offset_secs: Option<i32>,
}

impl Timestamp {
    /// A timestamp with no offset information.
    pub fn naive(local: NaiveDateTime) -> Self {
        Self {
            instant: local,
            offset_secs: None,
        }
    }

    /// A timestamp with a known UTC offset.
    pub fn zoned(dt: DateTime<FixedOffset>) -> Self {
        Self {
            instant: dt.naive_utc(),
            offset_secs: Some(dt.offset().local_minus_utc()),
        }
    }

    /// Whether the original date carried an offset.
    pub fn has_offset(&self) -> bool {
        self.offset_secs.is_some()
    }

    /// Wall-clock time as written in the original header.
    pub fn local(&self) -> NaiveDateTime {
        match self.offset_secs {
            Some(secs) => self.instant + TimeDelta::seconds(i64::from(secs)),
            None => self.instant,
        }
    }

    /// ISO-8601 with second precision: `2021-01-02T03:04:05`, plus `+HH:MM`
    /// when the date had an offset.
    pub fn to_iso(&self) -> String {
        let mut out = self.local().format("%Y-%m-%dT%H:%M:%S").to_string();
        if let Some(secs) = self.offset_secs {
            let sign = if secs < 0 { '-' } else { '+' };
            let abs = secs.unsigned_abs();
            out.push_str(&format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60));
        }
        out
    }

    /// Parse the ISO form produced by [`Timestamp::to_iso`] (as kept in the store).
    ///
    /// Fractional seconds are accepted and kept.
    pub fn parse_iso(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Self::zoned(dt));
        }
        if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%:z") {
            return Some(Self::zoned(dt));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(Self::naive)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso())
    }
}
