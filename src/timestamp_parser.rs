use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Handles parsing timestamps and calendar arguments used by the store and CLI
pub struct TimestampParser;

impl TimestampParser {
    /// Parse an event timestamp into a DateTime<Utc>
    /// Handles RFC 3339 (with Z or offset), naive ISO 8601 and the store's `YYYY-MM-DD HH:MM:SS` form
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let timestamp = timestamp_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
            return Ok(dt.with_timezone(&Utc));
        }

        // Naive forms are assumed to be UTC
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, format) {
                return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
            }
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    /// Parse a `YYYY-MM-DD` day argument
    pub fn parse_day(day_str: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(day_str.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date format: {}. Use YYYY-MM-DD", day_str))
    }

    /// Parse a `YYYY-MM` month argument into the first day of that month
    pub fn parse_month(month_str: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&format!("{}-01", month_str.trim()), "%Y-%m-%d")
            .with_context(|| format!("Invalid month format: {}. Use YYYY-MM", month_str))
    }
}
