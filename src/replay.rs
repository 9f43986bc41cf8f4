//! State Reconstructor
//!
//! Replays an entity's events day by day through a small state machine and labels every
//! calendar day it was alive with a [`DayState`].
//!
//! The machine has four states: open, waiting, blocked and approved. Waiting is split
//! only when a day is emitted, into `waiting` and `waiting-over-threshold`, depending on
//! how many consecutive days the entity has been waiting.
//!
//! Replay always starts on the entity's real open day, so the state on the first day of
//! a query window reflects everything that happened before it. Only days inside the
//! window are emitted.

use crate::calendar::DateRange;
use crate::config::RulesConfig;
use crate::error::{EngineResult, EntityIssue};
use crate::models::{DayState, Entity, EntityKey, Event, EventKind};
use crate::store::EntityStore;
use crate::timeline::EventLog;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};

const APPROVED_REVIEW: &str = "approved";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Open,
    Waiting,
    Blocked,
    Approved,
}

/// Next state after applying one event
pub fn transition(state: ReplayState, event: &Event, rules: &RulesConfig) -> ReplayState {
    match event.kind {
        EventKind::Milestoned if event.is_milestone(&rules.blocked_milestone) => {
            ReplayState::Blocked
        }
        EventKind::Milestoned if state == ReplayState::Blocked => ReplayState::Waiting,
        EventKind::Labeled if event.is_label(&EventKind::Labeled, &rules.waiting_label) => {
            ReplayState::Open
        }
        EventKind::Unlabeled if event.is_label(&EventKind::Unlabeled, &rules.waiting_label) => {
            ReplayState::Waiting
        }
        EventKind::Reviewed
            if rules.approve_on_review
                && event
                    .review_state
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(APPROVED_REVIEW)) =>
        {
            ReplayState::Approved
        }
        _ => state,
    }
}

/// Current machine state plus the day the current waiting streak began
#[derive(Debug, Clone, Copy)]
struct Cursor {
    state: ReplayState,
    waiting_since: Option<NaiveDate>,
}

impl Cursor {
    fn new() -> Self {
        Self {
            state: ReplayState::Open,
            waiting_since: None,
        }
    }

    /// Apply an event on the replay day `day`
    fn apply(&mut self, event: &Event, day: NaiveDate, rules: &RulesConfig) {
        let next = transition(self.state, event, rules);
        if next != self.state {
            self.waiting_since = (next == ReplayState::Waiting).then_some(day);
        }
        self.state = next;
    }

    fn day_state(&self, day: NaiveDate, threshold_days: u32) -> DayState {
        match self.state {
            ReplayState::Open => DayState::Open,
            ReplayState::Blocked => DayState::Blocked,
            ReplayState::Approved => DayState::Approved,
            ReplayState::Waiting => {
                let since = self.waiting_since.unwrap_or(day);
                let streak = (day - since).num_days() + 1;
                if streak > i64::from(threshold_days) {
                    DayState::WaitingOverThreshold
                } else {
                    DayState::Waiting
                }
            }
        }
    }
}

/// Days within `range` on which the entity was alive, if any
pub fn alive_window(entity: &Entity, range: &DateRange, now: DateTime<Utc>) -> Option<DateRange> {
    let lifetime = entity.lifetime();
    let alive = DateRange {
        from: lifetime.opened.date_naive(),
        to: lifetime.end(now).date_naive(),
    };
    if alive.to < alive.from {
        return None;
    }
    alive.intersect(range)
}

/// Per-day states of one entity inside a query window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityTimeline {
    pub key: EntityKey,
    pub author: String,
    pub days: Vec<(NaiveDate, DayState)>,
    pub flagged: Option<EntityIssue>,
}

/// Replay one entity's ordered events over its lifetime, emitting days inside `range`
pub fn reconstruct(
    entity: &Entity,
    log: &EventLog,
    range: &DateRange,
    rules: &RulesConfig,
    now: DateTime<Utc>,
) -> EntityTimeline {
    let lifetime = entity.lifetime();
    let open_day = lifetime.opened.date_naive();
    let last_day = lifetime.end(now).date_naive().min(range.to);

    let mut cursor = Cursor::new();
    let mut pending = log.events().iter().peekable();
    let mut days = Vec::new();

    let mut day = open_day;
    while day <= last_day {
        while let Some(event) = pending.next_if(|e| e.timestamp.date_naive() <= day) {
            cursor.apply(event, day, rules);
        }

        if day >= range.from {
            days.push((day, cursor.day_state(day, rules.waiting_threshold_days)));
        }

        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    EntityTimeline {
        key: entity.key(),
        author: entity.author.clone(),
        days,
        flagged: lifetime
            .inconsistency
            .as_ref()
            .map(|err| EntityIssue::new(entity.key(), err)),
    }
}

/// Store-backed replay
pub struct StateReconstructor<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    rules: &'a RulesConfig,
    now: DateTime<Utc>,
}

impl<'a, S: EntityStore + ?Sized> StateReconstructor<'a, S> {
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

    /// Replay an already-loaded entity; only its events are fetched
    pub fn replay(&self, entity: &Entity, range: &DateRange) -> EngineResult<EntityTimeline> {
        let key = entity.key();
        let records = self.store.get_events(&key)?;
        let log = EventLog::from_records(key, records);

        let timeline = reconstruct(entity, &log, range, self.rules, self.now);
        if let Some(issue) = &timeline.flagged {
            warn!(entity = %timeline.key, reason = %issue.reason, "Inconsistent entity treated as open");
        }

        debug!(
            entity = %timeline.key,
            events = log.len(),
            days = timeline.days.len(),
            "Entity replayed"
        );

        Ok(timeline)
    }

    pub fn replay_key(&self, key: &EntityKey, range: &DateRange) -> EngineResult<EntityTimeline> {
        let entity = self.store.get_entity(key)?;
        self.replay(&entity, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, LifecycleState};
    use chrono::TimeZone;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, m, d).unwrap()
    }

    fn at(m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, m, d, h, 0, 0).unwrap()
    }

    fn entity(created: DateTime<Utc>, closed: Option<DateTime<Utc>>) -> Entity {
        Entity {
            repo: "acme/widgets".to_string(),
            number: 5,
            kind: EntityKind::PullRequest,
            title: String::new(),
            author: "alice".to_string(),
            state: if closed.is_some() {
                LifecycleState::Closed
            } else {
                LifecycleState::Open
            },
            milestone: None,
            labels: vec![],
            merged: false,
            merger: None,
            created,
            closed,
            metrics: None,
        }
    }

    fn log(events: Vec<Event>) -> EventLog {
        EventLog::new(EntityKey::new("acme/widgets", 5), events)
    }

    fn states(timeline: &EntityTimeline) -> Vec<DayState> {
        timeline.days.iter().map(|(_, s)| *s).collect()
    }

    #[test]
    fn test_transitions() {
        let rules = RulesConfig::default();
        let blocked = Event::new(at(1, 1, 0), EventKind::Milestoned).with_milestone("Blocked");
        let ready = Event::new(at(1, 1, 0), EventKind::Milestoned).with_milestone("Ready");
        let label = Event::new(at(1, 1, 0), EventKind::Labeled).with_label("waiting-response");
        let unlabel = Event::new(at(1, 1, 0), EventKind::Unlabeled).with_label("waiting-response");

        assert_eq!(transition(ReplayState::Open, &blocked, &rules), ReplayState::Blocked);
        assert_eq!(transition(ReplayState::Blocked, &ready, &rules), ReplayState::Waiting);
        assert_eq!(transition(ReplayState::Open, &ready, &rules), ReplayState::Open);
        assert_eq!(transition(ReplayState::Waiting, &label, &rules), ReplayState::Open);
        assert_eq!(transition(ReplayState::Open, &unlabel, &rules), ReplayState::Waiting);

        let demilestone = Event::new(at(1, 1, 0), EventKind::Demilestoned).with_milestone("Blocked");
        assert_eq!(transition(ReplayState::Blocked, &demilestone, &rules), ReplayState::Blocked);
    }

    #[test]
    fn test_approval_is_opt_in() {
        let review = Event::new(at(1, 1, 0), EventKind::Reviewed).with_review_state("APPROVED");
        let rules = RulesConfig::default();
        assert_eq!(transition(ReplayState::Open, &review, &rules), ReplayState::Open);

        let rules = RulesConfig {
            approve_on_review: true,
            ..RulesConfig::default()
        };
        assert_eq!(transition(ReplayState::Open, &review, &rules), ReplayState::Approved);
    }

    #[test]
    fn test_short_lived_counted_on_its_day() {
        let rules = RulesConfig::default();
        let e = entity(at(1, 1, 9), Some(at(1, 1, 17)));
        let range = DateRange::new(day(1, 1), day(1, 5)).unwrap();
        let timeline = reconstruct(&e, &log(vec![]), &range, &rules, at(6, 1, 0));
        assert_eq!(timeline.days, vec![(day(1, 1), DayState::Open)]);
    }

    #[test]
    fn test_no_gaps_and_window_clipping() {
        let rules = RulesConfig::default();
        let e = entity(at(1, 1, 0), None);
        let range = DateRange::new(day(1, 10), day(1, 20)).unwrap();
        let timeline = reconstruct(&e, &log(vec![]), &range, &rules, at(1, 15, 12));
        let days: Vec<_> = timeline.days.iter().map(|(d, _)| *d).collect();
        assert_eq!(days, range.days().take(6).collect::<Vec<_>>());
    }

    #[test]
    fn test_state_carries_into_window() {
        let rules = RulesConfig::default();
        let e = entity(at(1, 1, 0), None);
        let events = vec![Event::new(at(1, 2, 10), EventKind::Milestoned).with_milestone("Blocked")];
        let range = DateRange::new(day(1, 10), day(1, 11)).unwrap();
        let timeline = reconstruct(&e, &log(events), &range, &rules, at(3, 1, 0));
        assert_eq!(states(&timeline), vec![DayState::Blocked, DayState::Blocked]);
    }

    #[test]
    fn test_waiting_streak_crosses_threshold() {
        let rules = RulesConfig::default();
        let e = entity(at(1, 1, 0), None);
        let events =
            vec![Event::new(at(1, 1, 12), EventKind::Unlabeled).with_label("waiting-response")];
        let range = DateRange::new(day(1, 14), day(1, 16)).unwrap();
        let timeline = reconstruct(&e, &log(events), &range, &rules, at(3, 1, 0));
        assert_eq!(
            states(&timeline),
            vec![
                DayState::Waiting,
                DayState::WaitingOverThreshold,
                DayState::WaitingOverThreshold
            ]
        );
    }

    #[test]
    fn test_streak_resets_on_leaving_waiting() {
        let rules = RulesConfig::default();
        let e = entity(at(1, 1, 0), None);
        let events = vec![
            Event::new(at(1, 1, 1), EventKind::Unlabeled).with_label("waiting-response"),
            Event::new(at(1, 20, 1), EventKind::Labeled).with_label("waiting-response"),
            Event::new(at(1, 21, 1), EventKind::Unlabeled).with_label("waiting-response"),
        ];
        let range = DateRange::new(day(1, 19), day(1, 22)).unwrap();
        let timeline = reconstruct(&e, &log(events), &range, &rules, at(3, 1, 0));
        assert_eq!(
            states(&timeline),
            vec![
                DayState::WaitingOverThreshold,
                DayState::Open,
                DayState::Waiting,
                DayState::Waiting
            ]
        );
    }
}
