//! Timestamp helpers
//!
//! All timestamps are stored as UTC text in `YYYY-MM-DD HH:MM:SS` form, the
//! same shape SQLite's `CURRENT_TIMESTAMP` produces, so string comparison
//! orders them correctly.

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub fn now_ts() -> String {
    format_ts(now())
}

pub fn today() -> NaiveDate {
    now().date()
}

pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Timestamp `days` days before now
pub fn days_ago(days: i64) -> String {
    format_ts(now() - Duration::days(days))
}

/// Date `days` days after today (negative for the past)
pub fn date_offset(days: i64) -> String {
    format_date(today() + Duration::days(days))
}

/// Parse a stored timestamp or bare date
pub fn parse_ts(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_ts(s).map(|ts| ts.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert!(parse_ts("2026-02-28 10:30:00").is_some());
        assert!(parse_ts("2026-02-28T10:30:00").is_some());
        assert_eq!(parse_ts("2026-03-05 11:00"), parse_ts("2026-03-05 11:00:00"));
        assert_eq!(
            parse_date("2026-02-28"),
            NaiveDate::from_ymd_opt(2026, 2, 28)
        );
        assert!(parse_ts("yesterday").is_none());
    }

    #[test]
    fn test_days_ago_orders_before_now() {
        assert!(days_ago(3) < now_ts());
        assert!(date_offset(-1) < date_offset(1));
    }
}
