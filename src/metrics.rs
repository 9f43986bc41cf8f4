//! Metric Calculator
//!
//! Three scalar durations, in days, derived from one entity's event log:
//!
//! - **days open**: time spent open, summed over close/reopen cycles
//! - **days waiting**: time spent carrying the waiting label
//! - **days to first**: time from creation to the first maintainer reaction
//!   (blocked milestone, waiting label, review or merge)
//!
//! Each is an independent single pass over the ordered events. Results are floored to
//! two decimals before being written back through the store, so recomputing an
//! unchanged entity yields identical values.

use crate::config::RulesConfig;
use crate::error::{EngineResult, EntityIssue};
use crate::models::{DerivedMetrics, Entity, EntityKey, Event, EventKind};
use crate::parallel::map_in_parallel;
use crate::store::{EntityFilter, EntityStore};
use crate::timeline::EventLog;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Floor to two decimals
pub fn truncate_days(days: f64) -> f64 {
    (days * 100.0).floor() / 100.0
}

fn to_days(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

fn non_negative(duration: Duration) -> Duration {
    duration.max(Duration::zero())
}

/// Sums the lengths of anchor..terminator spans
#[derive(Debug, Clone, Copy)]
struct Interval {
    anchor: Option<DateTime<Utc>>,
    total: Duration,
}

impl Interval {
    fn idle() -> Self {
        Self {
            anchor: None,
            total: Duration::zero(),
        }
    }

    fn started(at: DateTime<Utc>) -> Self {
        Self {
            anchor: Some(at),
            total: Duration::zero(),
        }
    }

    /// Start a span at `at`; the most recent start wins
    fn open(&mut self, at: DateTime<Utc>) {
        self.anchor = Some(at);
    }

    fn close(&mut self, at: DateTime<Utc>) {
        if let Some(anchor) = self.anchor.take() {
            self.total = self.total + non_negative(at - anchor);
        }
    }

    /// Close any running span at `end` and return the accumulated total
    fn finish(mut self, end: DateTime<Utc>) -> Duration {
        self.close(end);
        self.total
    }
}

fn days_open(created: DateTime<Utc>, events: &[Event], end: DateTime<Utc>) -> Duration {
    let mut interval = Interval::started(created);

    for event in events {
        match event.kind {
            EventKind::Closed => interval.close(event.timestamp),
            EventKind::Reopened => interval.open(event.timestamp),
            EventKind::Merged => {
                interval.close(event.timestamp);
                return interval.total;
            }
            _ => {}
        }
    }

    interval.finish(end)
}

fn days_waiting(
    created: DateTime<Utc>,
    events: &[Event],
    end: DateTime<Utc>,
    rules: &RulesConfig,
) -> Duration {
    let mut interval = Interval::idle();
    let mut ever_labeled = false;

    for event in events {
        if event.is_label(&EventKind::Labeled, &rules.waiting_label) {
            ever_labeled = true;
            interval.open(event.timestamp);
        } else if event.is_label(&EventKind::Unlabeled, &rules.waiting_label) {
            interval.close(event.timestamp);
        }
    }

    if ever_labeled {
        interval.finish(end)
    } else {
        non_negative(end - created)
    }
}

fn days_to_first(
    created: DateTime<Utc>,
    events: &[Event],
    end: DateTime<Utc>,
    rules: &RulesConfig,
) -> Duration {
    let first = events.iter().find(|event| {
        event.is_milestone(&rules.blocked_milestone)
            || event.is_label(&EventKind::Labeled, &rules.waiting_label)
            || matches!(event.kind, EventKind::Reviewed | EventKind::Merged)
    });

    match first {
        Some(event) => non_negative(event.timestamp - created),
        None => non_negative(end - created),
    }
}

/// Metrics for one entity plus any data problem noticed while computing them
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsOutcome {
    pub key: EntityKey,
    pub metrics: DerivedMetrics,
    pub flagged: Option<EntityIssue>,
}

/// Pure computation of the derived durations
pub fn calculate(
    entity: &Entity,
    log: &EventLog,
    rules: &RulesConfig,
    now: DateTime<Utc>,
) -> MetricsOutcome {
    let lifetime = entity.lifetime();
    let end = lifetime.end(now);
    let events = log.events();

    let metrics = DerivedMetrics {
        days_open: truncate_days(to_days(days_open(lifetime.opened, events, end))),
        days_waiting: truncate_days(to_days(days_waiting(lifetime.opened, events, end, rules))),
        days_to_first: truncate_days(to_days(days_to_first(lifetime.opened, events, end, rules))),
    };

    MetricsOutcome {
        key: entity.key(),
        metrics,
        flagged: lifetime
            .inconsistency
            .as_ref()
            .map(|err| EntityIssue::new(entity.key(), err)),
    }
}

/// Result of a batch computation
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub computed: usize,
    pub skipped: Vec<EntityIssue>,
    pub flagged: Vec<EntityIssue>,
}

pub struct MetricCalculator<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    rules: &'a RulesConfig,
    now: DateTime<Utc>,
}

impl<'a, S: EntityStore + ?Sized> MetricCalculator<'a, S> {
    pub fn new(store: &'a S, rules: &'a RulesConfig) -> Self {
        Self {
            store,
            rules,
            now: Utc::now(),
        }
    }

    /// Pin "now" for open entities
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Compute one entity's metrics and persist them
    pub fn compute_and_update(&self, key: &EntityKey) -> EngineResult<MetricsOutcome> {
        let entity = self.store.get_entity(key)?;
        let records = self.store.get_events(key)?;
        let log = EventLog::from_records(key.clone(), records);

        let outcome = calculate(&entity, &log, self.rules, self.now);
        if let Some(issue) = &outcome.flagged {
            warn!(entity = %key, reason = %issue.reason, "Inconsistent entity treated as open");
        }

        self.store.upsert_derived_metrics(key, outcome.metrics)?;

        debug!(
            entity = %key,
            events = log.len(),
            days_open = outcome.metrics.days_open,
            days_waiting = outcome.metrics.days_waiting,
            days_to_first = outcome.metrics.days_to_first,
            "Metrics computed"
        );

        Ok(outcome)
    }

    /// Compute metrics for every matching entity, continuing past failures
    pub fn compute_all(&self, filter: &EntityFilter) -> EngineResult<BatchReport> {
        let keys: Vec<EntityKey> = self
            .store
            .list_entities(filter)?
            .iter()
            .map(Entity::key)
            .collect();

        let results = map_in_parallel(&keys, |key| (key.clone(), self.compute_and_update(key)));

        let mut report = BatchReport::default();
        for (key, result) in results {
            match result {
                Ok(outcome) => {
                    report.computed += 1;
                    report.flagged.extend(outcome.flagged);
                }
                Err(err) => {
                    warn!(entity = %key, error = %err, "Skipping entity");
                    report.skipped.push(EntityIssue::new(key, &err));
                }
            }
        }

        info!(
            computed = report.computed,
            skipped = report.skipped.len(),
            flagged = report.flagged.len(),
            "Metric batch complete"
        );

        Ok(report)
    }
}
