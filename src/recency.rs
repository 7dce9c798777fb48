//! Sold-date recency window.
//!
//! Dates are stored in the data-entry format `M/D/YYYY` (for example
//! `6/21/2024`). Comparison is by calendar day on naive local dates.

use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

use crate::errors::AppError;
use crate::models::RangeToken;

fn entry_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("entry date pattern is valid")
    })
}

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("iso date pattern is valid")
    })
}

/// Parses a stored `M/D/YYYY` date. Anything else is a `ParseError`.
pub fn parse_entry_date(raw: &str) -> Result<NaiveDate, AppError> {
    let trimmed = raw.trim();
    let caps = entry_date_pattern()
        .captures(trimmed)
        .ok_or_else(|| AppError::ParseError(format!("'{}' is not a M/D/YYYY date", raw)))?;

    let month: u32 = caps[1].parse().unwrap_or(0);
    let day: u32 = caps[2].parse().unwrap_or(0);
    let year: i32 = caps[3].parse().unwrap_or(0);

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| AppError::ParseError(format!("'{}' is not a calendar date", raw)))
}

/// Parses a date on the create path, where clients may also send ISO dates
/// (`2024-06-21` or a full ISO timestamp).
pub fn parse_input_date(raw: &str) -> Result<NaiveDate, AppError> {
    let trimmed = raw.trim();
    if let Some(caps) = iso_date_pattern().captures(trimmed) {
        let year: i32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let day: u32 = caps[3].parse().unwrap_or(0);
        return NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| AppError::ParseError(format!("'{}' is not a calendar date", raw)));
    }
    parse_entry_date(trimmed)
}

/// Formats a date the way it was typed at data entry: no zero padding.
pub fn format_entry_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

/// Decides whether a home's sold date falls inside a lookback window.
#[derive(Debug, Clone, Copy)]
pub struct RecencyFilter {
    cutoff: Option<NaiveDate>,
}

impl RecencyFilter {
    /// Builds the filter for `range` as seen on `today`.
    pub fn new(range: RangeToken, today: NaiveDate) -> Self {
        let cutoff = range.lookback_months().map(|months| {
            today
                .checked_sub_months(Months::new(months))
                .unwrap_or(NaiveDate::MIN)
        });
        Self { cutoff }
    }

    /// Earliest sold date still inside the window, `None` when unbounded.
    pub fn cutoff(&self) -> Option<NaiveDate> {
        self.cutoff
    }

    /// Missing or unparsable dates are excluded under a bounded window.
    pub fn includes(&self, sold_date: Option<&str>) -> bool {
        let Some(cutoff) = self.cutoff else {
            return true;
        };

        let Some(raw) = sold_date else {
            return false;
        };

        match parse_entry_date(raw) {
            Ok(sold) => sold >= cutoff,
            Err(e) => {
                tracing::debug!("Excluding record from recency window: {}", e);
                false
            }
        }
    }
}
