//! Monthly report: one range summary per seven-day block of each month (`W1`..`W5`,
//! counted from the 1st) plus a footer summarising the whole month.

use crate::aggregator::{RangeSummary, SeriesQuery};
use crate::calendar::{first_of_month, DateRange};
use crate::config::RulesConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::Entity;
use crate::store::EntityStore;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub label: String,
    pub summary: RangeSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReport {
    /// `YYYY-MM`
    pub month: String,
    pub weeks: Vec<ReportRow>,
    pub total: RangeSummary,
}

fn created_within(entities: &[Entity], range: &DateRange) -> Vec<Entity> {
    entities
        .iter()
        .filter(|entity| range.contains(entity.created))
        .cloned()
        .collect()
}

/// Build one report per month touched by the query range.
///
/// The store is queried once for the whole range; weeks and months are partitioned in
/// memory. Weeks are always counted from the 1st, even when the range starts later in
/// the month, and are clipped to the range.
pub fn build_report<S: EntityStore + ?Sized>(
    store: &S,
    rules: &RulesConfig,
    query: &SeriesQuery,
) -> EngineResult<Vec<MonthlyReport>> {
    let entities = store
        .list_created_in_range(&query.filter, &query.range)
        .map_err(|e| match e {
            EngineError::Query(_) => e,
            other => EngineError::Query(other.to_string()),
        })?;
    let threshold = rules.first_response_threshold_days;

    let mut reports = Vec::new();
    for month in query.range.months() {
        let in_month = created_within(&entities, &month);
        let from_first = DateRange {
            from: first_of_month(month.from),
            to: month.to,
        };

        let weeks = from_first
            .weeks()
            .into_iter()
            .enumerate()
            .filter_map(|(i, week)| {
                let week = week.intersect(&month)?;
                Some(ReportRow {
                    label: format!("W{}", i + 1),
                    summary: RangeSummary::from_entities(
                        week,
                        &created_within(&in_month, &week),
                        threshold,
                    ),
                })
            })
            .collect();

        reports.push(MonthlyReport {
            month: month.from.format("%Y-%m").to_string(),
            weeks,
            total: RangeSummary::from_entities(month, &in_month, threshold),
        });
    }

    debug!(
        months = reports.len(),
        entities = entities.len(),
        "Monthly report built"
    );

    Ok(reports)
}
