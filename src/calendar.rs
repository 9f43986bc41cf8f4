//! Calendar helpers
//!
//! Every series in the engine is keyed by UTC calendar day. A [`DateRange`] names an
//! inclusive span of days `from..=to`, which on the instant axis is the half-open
//! interval `[from 00:00, to + 1 day 00:00)`.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

/// Midnight UTC at the start of `day`
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

pub fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

pub fn last_of_month(day: NaiveDate) -> NaiveDate {
    first_of_month(day)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(day)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> EngineResult<Self> {
        if to < from {
            return Err(EngineError::Query(format!(
                "range end {} is before range start {}",
                to, from
            )));
        }
        Ok(Self { from, to })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    /// Past year up to `today`, starting on the first of the month a year ago
    pub fn past_year(today: NaiveDate) -> Self {
        let from = today
            .checked_sub_months(Months::new(12))
            .map(first_of_month)
            .unwrap_or(today);
        Self { from, to: today }
    }

    /// From the first of last month up to `today`
    pub fn since_last_month(today: NaiveDate) -> Self {
        let from = today
            .checked_sub_months(Months::new(1))
            .map(first_of_month)
            .unwrap_or(today);
        Self { from, to: today }
    }

    pub fn start(&self) -> DateTime<Utc> {
        day_start(self.from)
    }

    pub fn end_exclusive(&self) -> DateTime<Utc> {
        day_start(self.to) + Duration::days(1)
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        day >= self.from && day <= self.to
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start() && ts < self.end_exclusive()
    }

    /// Whether the instant interval `[opened, closed]` touches this range
    pub fn overlaps(&self, opened: DateTime<Utc>, closed: Option<DateTime<Utc>>) -> bool {
        opened < self.end_exclusive() && closed.map_or(true, |c| c >= self.start())
    }

    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        (from <= to).then_some(DateRange { from, to })
    }

    pub fn len_days(&self) -> usize {
        ((self.to - self.from).num_days() + 1) as usize
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |day| *day <= to)
    }

    /// Calendar months touched by this range, each clipped to the range
    pub fn months(&self) -> Vec<DateRange> {
        let mut months = Vec::new();
        let mut month = first_of_month(self.from);

        while month <= self.to {
            let span = DateRange {
                from: month,
                to: last_of_month(month),
            };
            if let Some(clipped) = span.intersect(self) {
                months.push(clipped);
            }
            match month.checked_add_months(Months::new(1)) {
                Some(next) => month = next,
                None => break,
            }
        }

        months
    }

    /// Consecutive seven-day blocks starting at `from`, the last one clipped to `to`
    pub fn weeks(&self) -> Vec<DateRange> {
        let mut weeks = Vec::new();
        let mut start = self.from;

        while start <= self.to {
            let end = (start + Duration::days(6)).min(self.to);
            weeks.push(DateRange {
                from: start,
                to: end,
            });
            start += Duration::days(7);
        }

        weeks
    }
}
