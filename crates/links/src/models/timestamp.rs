//! Server timestamp ordering
//!
//! The remote reports timestamps as `YYYY-MM-DD HH:MM:SS[.ffffff]` strings.

use std::cmp::Ordering;

use chrono::NaiveDateTime;

/// Reported by the remote when it holds no records
pub const EPOCH: &str = "1970-01-01 00:00:00";

const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn parse(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), FORMAT).ok()
}

/// Format with microsecond precision, the way the remote does
pub fn format(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Compare two timestamps, falling back to byte order for unparseable input
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// The later of two timestamps
pub fn later<'a>(a: &'a str, b: &'a str) -> &'a str {
    if compare(b, a) == Ordering::Greater { b } else { a }
}
