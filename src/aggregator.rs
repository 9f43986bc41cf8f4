//! Aggregator
//!
//! Merges per-entity results into calendar-aligned series. Every series is keyed by day,
//! covers every day of the requested range exactly once (zero-filled), and iterates in
//! chronological order.
//!
//! Per-entity replay runs in parallel; the per-entity results are then folded into the
//! day map by a single serial reducer, so no counter is ever shared between threads.
//!
//! Available series:
//!
//! - [`DailyStateSeries`] - entities per [`DayState`] per day, with a trailing average
//! - [`RepoStateSeries`] - the same, per repository, plus additive totals
//! - [`IssueTypeSeries`] - open issues per day by label category
//! - [`AuthorGroupSeries`] - open entities per day by author group
//! - [`OpenedSeries`] - entities created per day by current outcome, plus running totals
//! - [`RangeSummary`] - counts and metric averages over entities created in a range

use crate::calendar::DateRange;
use crate::config::{AuthorsConfig, RulesConfig};
use crate::error::{EngineError, EngineResult, EntityIssue};
use crate::models::{DayState, Entity, EntityKind, IssueType};
use crate::parallel::map_in_parallel;
use crate::replay::{alive_window, StateReconstructor};
use crate::store::{EntityFilter, EntityStore};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Label substrings per issue type, in priority order
const ISSUE_CLASSIFICATION: &[(IssueType, &[&str])] = &[
    (IssueType::Question, &["question"]),
    (IssueType::Bug, &["crash", "bug"]),
    (
        IssueType::Enhancement,
        &["new-resource", "new-datasource", "enhancement", "documentation"],
    ),
];

/// First matching category wins; the number of matching labels is irrelevant
pub fn classify_issue(labels: &[String]) -> IssueType {
    ISSUE_CLASSIFICATION
        .iter()
        .find(|(_, patterns)| {
            patterns
                .iter()
                .any(|pattern| labels.iter().any(|label| label.contains(pattern)))
        })
        .map(|(issue_type, _)| *issue_type)
        .unwrap_or(IssueType::Other)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayCounts {
    pub total: u32,
    pub open: u32,
    pub waiting: u32,
    pub waiting_over: u32,
    pub blocked: u32,
    pub approved: u32,
    /// Trailing mean of the open headcount
    pub trend: f64,
}

impl DayCounts {
    pub fn record(&mut self, state: DayState) {
        self.total += 1;
        match state {
            DayState::Open => self.open += 1,
            DayState::Waiting => self.waiting += 1,
            DayState::WaitingOverThreshold => self.waiting_over += 1,
            DayState::Blocked => self.blocked += 1,
            DayState::Approved => self.approved += 1,
        }
    }

    /// Entities still needing attention: everything except approved
    pub fn headcount(&self) -> u32 {
        self.open + self.blocked + self.waiting + self.waiting_over
    }

    /// Add another day's counters; the trend is recomputed separately
    pub fn absorb(&mut self, other: &DayCounts) {
        self.total += other.total;
        self.open += other.open;
        self.waiting += other.waiting;
        self.waiting_over += other.waiting_over;
        self.blocked += other.blocked;
        self.approved += other.approved;
    }
}

/// Fill `trend` with the mean headcount over the trailing `min(window, i + 1)` days
pub fn apply_trailing_average(days: &mut BTreeMap<NaiveDate, DayCounts>, window: usize) {
    let window = window.max(1);
    let headcounts: Vec<u32> = days.values().map(DayCounts::headcount).collect();

    for (i, counts) in days.values_mut().enumerate() {
        let span = window.min(i + 1);
        let sum: u32 = headcounts[i + 1 - span..=i].iter().sum();
        counts.trend = f64::from(sum) / span as f64;
    }
}

fn zero_filled<T: Default>(range: &DateRange) -> BTreeMap<NaiveDate, T> {
    range.days().map(|day| (day, T::default())).collect()
}

fn as_query_error(err: EngineError) -> EngineError {
    match err {
        EngineError::Query(_) => err,
        other => EngineError::Query(other.to_string()),
    }
}

fn flagged_in(entities: &[Entity]) -> Vec<EntityIssue> {
    entities
        .iter()
        .filter_map(|entity| {
            entity
                .lifetime()
                .inconsistency
                .map(|err| EntityIssue::new(entity.key(), &err))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStateSeries {
    pub range: DateRange,
    pub days: BTreeMap<NaiveDate, DayCounts>,
    pub flagged: Vec<EntityIssue>,
    pub skipped: Vec<EntityIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoStateSeries {
    pub range: DateRange,
    pub repos: Vec<String>,
    pub days: BTreeMap<NaiveDate, BTreeMap<String, DayCounts>>,
    /// Sum over all repositories per day
    pub totals: BTreeMap<NaiveDate, DayCounts>,
    pub flagged: Vec<EntityIssue>,
    pub skipped: Vec<EntityIssue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueTypeCounts {
    pub total: u32,
    pub question: u32,
    pub bug: u32,
    pub enhancement: u32,
    pub other: u32,
}

impl IssueTypeCounts {
    pub fn record(&mut self, issue_type: IssueType) {
        self.total += 1;
        match issue_type {
            IssueType::Question => self.question += 1,
            IssueType::Bug => self.bug += 1,
            IssueType::Enhancement => self.enhancement += 1,
            IssueType::Other => self.other += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueTypeSeries {
    pub range: DateRange,
    pub days: BTreeMap<NaiveDate, IssueTypeCounts>,
    pub flagged: Vec<EntityIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthorGroupCounts {
    pub total: u32,
    pub groups: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorGroupSeries {
    pub range: DateRange,
    pub groups: Vec<String>,
    pub days: BTreeMap<NaiveDate, AuthorGroupCounts>,
    pub flagged: Vec<EntityIssue>,
}

/// Current outcome of an entity, as used by the opened series and summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Merged,
    Closed,
    Open,
}

impl Outcome {
    /// Inconsistent close data counts as open
    pub fn of(entity: &Entity) -> Self {
        if entity.merged {
            Outcome::Merged
        } else if entity.lifetime().closed.is_some() {
            Outcome::Closed
        } else {
            Outcome::Open
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub total: u32,
    pub merged: u32,
    /// Closed without being merged
    pub closed: u32,
    pub open: u32,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Merged => self.merged += 1,
            Outcome::Closed => self.closed += 1,
            Outcome::Open => self.open += 1,
        }
    }

    pub fn absorb(&mut self, other: &OutcomeCounts) {
        self.total += other.total;
        self.merged += other.merged;
        self.closed += other.closed;
        self.open += other.open;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenedSeries {
    pub range: DateRange,
    /// Entities created on each day, by current outcome
    pub daily: BTreeMap<NaiveDate, OutcomeCounts>,
    /// Running totals of `daily` from the start of the range
    pub cumulative: BTreeMap<NaiveDate, OutcomeCounts>,
    pub flagged: Vec<EntityIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSummary {
    pub range: DateRange,
    pub total: usize,
    pub open: usize,
    /// Closed without being merged
    pub closed: usize,
    pub merged: usize,
    pub days_open_avg: Option<f64>,
    pub days_waiting_avg: Option<f64>,
    pub days_to_first_avg: Option<f64>,
    /// Entities slower to first response than the configured threshold
    pub days_to_first_over: usize,
    pub flagged: Vec<EntityIssue>,
}

impl RangeSummary {
    /// Summarise entities already known to be created within `range`
    pub fn from_entities(range: DateRange, entities: &[Entity], threshold_days: u32) -> Self {
        let mut outcomes = OutcomeCounts::default();
        let (mut open_sum, mut waiting_sum, mut first_sum) = (0.0, 0.0, 0.0);
        let mut with_metrics = 0usize;
        let mut days_to_first_over = 0;

        for entity in entities {
            outcomes.record(Outcome::of(entity));

            if let Some(metrics) = entity.metrics {
                with_metrics += 1;
                open_sum += metrics.days_open;
                waiting_sum += metrics.days_waiting;
                first_sum += metrics.days_to_first;
                if metrics.days_to_first > f64::from(threshold_days) {
                    days_to_first_over += 1;
                }
            }
        }

        let average = |sum: f64| (with_metrics > 0).then(|| sum / with_metrics as f64);

        Self {
            range,
            total: outcomes.total as usize,
            open: outcomes.open as usize,
            closed: outcomes.closed as usize,
            merged: outcomes.merged as usize,
            days_open_avg: average(open_sum),
            days_waiting_avg: average(waiting_sum),
            days_to_first_avg: average(first_sum),
            days_to_first_over,
            flagged: flagged_in(entities),
        }
    }
}

/// A reporting request: a day range plus an entity filter
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesQuery {
    pub range: DateRange,
    pub filter: EntityFilter,
}

impl SeriesQuery {
    pub fn new(range: DateRange, filter: EntityFilter) -> Self {
        Self { range, filter }
    }
}

pub struct Aggregator<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    rules: &'a RulesConfig,
    now: DateTime<Utc>,
}

impl<'a, S: EntityStore + ?Sized> Aggregator<'a, S> {
    pub fn new(store: &'a S, rules: &'a RulesConfig) -> Self {
        Self {
            store,
            rules,
            now: Utc::now(),
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    fn open_entities(&self, query: &SeriesQuery) -> EngineResult<Vec<Entity>> {
        self.store
            .list_open_in_range(&query.filter, &query.range)
            .map_err(as_query_error)
    }

    fn created_entities(&self, query: &SeriesQuery) -> EngineResult<Vec<Entity>> {
        self.store
            .list_created_in_range(&query.filter, &query.range)
            .map_err(as_query_error)
    }

    /// Entities per day state for every day in range
    pub fn daily_state_series(&self, query: &SeriesQuery) -> EngineResult<DailyStateSeries> {
        let entities = self.open_entities(query)?;
        let reconstructor = StateReconstructor::new(self.store, self.rules).with_now(self.now);

        let timelines = map_in_parallel(&entities, |entity| {
            (entity.key(), reconstructor.replay(entity, &query.range))
        });

        let mut days: BTreeMap<NaiveDate, DayCounts> = zero_filled(&query.range);
        let mut flagged = Vec::new();
        let mut skipped = Vec::new();

        for (key, result) in timelines {
            match result {
                Ok(timeline) => {
                    for (day, state) in &timeline.days {
                        if let Some(counts) = days.get_mut(day) {
                            counts.record(*state);
                        }
                    }
                    flagged.extend(timeline.flagged);
                }
                Err(err) => {
                    warn!(entity = %key, error = %err, "Skipping entity in daily series");
                    skipped.push(EntityIssue::new(key, &err));
                }
            }
        }

        apply_trailing_average(&mut days, self.rules.trend_window_days);

        debug!(
            entities = entities.len(),
            days = days.len(),
            skipped = skipped.len(),
            "Daily state series built"
        );

        Ok(DailyStateSeries {
            range: query.range,
            days,
            flagged,
            skipped,
        })
    }

    /// Daily state series per repository, merged into one day → repo → counters map
    pub fn repo_state_series(&self, query: &SeriesQuery) -> EngineResult<RepoStateSeries> {
        let repos: Vec<String> = if query.filter.repos.is_empty() {
            self.store
                .list_entities(&query.filter)
                .map_err(as_query_error)?
                .into_iter()
                .map(|entity| entity.repo)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            query.filter.repos.iter().cloned().collect()
        };

        let mut days: BTreeMap<NaiveDate, BTreeMap<String, DayCounts>> = zero_filled(&query.range);
        let mut totals: BTreeMap<NaiveDate, DayCounts> = zero_filled(&query.range);
        let mut flagged = Vec::new();
        let mut skipped = Vec::new();

        for repo in &repos {
            let per_repo = self.daily_state_series(&SeriesQuery {
                range: query.range,
                filter: query.filter.for_repo(repo),
            })?;

            for (day, counts) in per_repo.days {
                if let Some(total) = totals.get_mut(&day) {
                    total.absorb(&counts);
                }
                days.entry(day).or_default().insert(repo.clone(), counts);
            }
            flagged.extend(per_repo.flagged);
            skipped.extend(per_repo.skipped);
        }

        apply_trailing_average(&mut totals, self.rules.trend_window_days);

        Ok(RepoStateSeries {
            range: query.range,
            repos,
            days,
            totals,
            flagged,
            skipped,
        })
    }

    /// Open issues per day by label category
    pub fn issue_type_series(&self, query: &SeriesQuery) -> EngineResult<IssueTypeSeries> {
        let query = SeriesQuery {
            range: query.range,
            filter: query.filter.clone().kind(EntityKind::Issue),
        };
        let entities = self.open_entities(&query)?;

        let mut days: BTreeMap<NaiveDate, IssueTypeCounts> = zero_filled(&query.range);
        for entity in &entities {
            let issue_type = classify_issue(&entity.labels);
            if let Some(window) = alive_window(entity, &query.range, self.now) {
                for day in window.days() {
                    if let Some(counts) = days.get_mut(&day) {
                        counts.record(issue_type);
                    }
                }
            }
        }

        Ok(IssueTypeSeries {
            range: query.range,
            days,
            flagged: flagged_in(&entities),
        })
    }

    /// Open entities per day by author group
    pub fn author_group_series(
        &self,
        query: &SeriesQuery,
        authors: &AuthorsConfig,
    ) -> EngineResult<AuthorGroupSeries> {
        let entities = self.open_entities(query)?;
        let groups = authors.group_names();

        let empty = AuthorGroupCounts {
            total: 0,
            groups: groups.iter().map(|g| (g.clone(), 0)).collect(),
        };
        let mut days: BTreeMap<NaiveDate, AuthorGroupCounts> = query
            .range
            .days()
            .map(|day| (day, empty.clone()))
            .collect();

        for entity in &entities {
            let group = authors.group_of(&entity.author);
            if let Some(window) = alive_window(entity, &query.range, self.now) {
                for day in window.days() {
                    if let Some(counts) = days.get_mut(&day) {
                        counts.total += 1;
                        *counts.groups.entry(group.to_string()).or_insert(0) += 1;
                    }
                }
            }
        }

        Ok(AuthorGroupSeries {
            range: query.range,
            groups,
            days,
            flagged: flagged_in(&entities),
        })
    }

    /// Entities created per day by current outcome, with running totals
    pub fn opened_series(&self, query: &SeriesQuery) -> EngineResult<OpenedSeries> {
        let entities = self.created_entities(query)?;

        let mut daily: BTreeMap<NaiveDate, OutcomeCounts> = zero_filled(&query.range);
        for entity in &entities {
            if let Some(counts) = daily.get_mut(&entity.created.date_naive()) {
                counts.record(Outcome::of(entity));
            }
        }

        let mut running = OutcomeCounts::default();
        let cumulative = daily
            .iter()
            .map(|(day, counts)| {
                running.absorb(counts);
                (*day, running)
            })
            .collect();

        Ok(OpenedSeries {
            range: query.range,
            daily,
            cumulative,
            flagged: flagged_in(&entities),
        })
    }

    /// Counts and metric averages over entities created in range
    pub fn range_summary(&self, query: &SeriesQuery) -> EngineResult<RangeSummary> {
        let entities = self.created_entities(query)?;
        Ok(RangeSummary::from_entities(
            query.range,
            &entities,
            self.rules.first_response_threshold_days,
        ))
    }
}
