//! Core Data Models
//!
//! This module defines the data structures shared by every stage of the analytics engine,
//! from the raw records handed over by the store to the per-day states produced by replay.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`Entity`] and [`EventRecord`] - as delivered by the store collaborator
//! 2. **Validated Events**: [`Event`] - timestamp parsed, kind resolved into [`EventKind`]
//! 3. **Derived Scalars**: [`DerivedMetrics`] - written back onto the entity by the metric calculator
//! 4. **Derived Days**: [`DayState`] - one label per entity per calendar day, never persisted
//!
//! ## Core Types
//!
//! - [`EntityKey`] - `(repository, number)` identity of a pull request or issue
//! - [`Entity`] - the tracked pull request / issue with its lifecycle attributes
//! - [`Lifetime`] - normalised open/close interval, with inconsistent data folded to "still open"
//! - [`Event`] - a single timestamped state change recorded against an entity
//!
//! All public types support serde so they can be snapshotted and emitted as JSON.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub repo: String,
    pub number: u64,
}

impl EntityKey {
    pub fn new(repo: impl Into<String>, number: u64) -> Self {
        Self {
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    PullRequest,
    Issue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Open,
    Closed,
}

/// Durations in days computed from an entity's event log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub days_open: f64,
    pub days_waiting: f64,
    pub days_to_first: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub repo: String,
    pub number: u64,
    pub kind: EntityKind,
    #[serde(default)]
    pub title: String,
    pub author: String,
    pub state: LifecycleState,
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub merger: Option<String>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub closed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: Option<DerivedMetrics>,
}

/// The span an entity is considered alive for.
///
/// `closed` is `None` while the entity is open, and also when the stored close data
/// is unusable; in that case `inconsistency` says why and callers treat the entity as
/// still open.
#[derive(Debug, Clone, PartialEq)]
pub struct Lifetime {
    pub opened: DateTime<Utc>,
    pub closed: Option<DateTime<Utc>>,
    pub inconsistency: Option<EngineError>,
}

impl Lifetime {
    /// Close timestamp, or `now` for entities that are (treated as) open
    pub fn end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.closed.unwrap_or(now)
    }
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.repo.clone(), self.number)
    }

    pub fn is_open(&self) -> bool {
        self.state == LifecycleState::Open
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn lifetime(&self) -> Lifetime {
        let mut lifetime = Lifetime {
            opened: self.created,
            closed: None,
            inconsistency: None,
        };

        if self.state == LifecycleState::Open {
            return lifetime;
        }

        match self.closed {
            Some(closed) if closed >= self.created => lifetime.closed = Some(closed),
            Some(closed) => {
                lifetime.inconsistency = Some(EngineError::InconsistentEntity {
                    entity: self.key(),
                    reason: format!(
                        "closed at {} before created at {}",
                        closed.to_rfc3339(),
                        self.created.to_rfc3339()
                    ),
                });
            }
            None => {
                lifetime.inconsistency = Some(EngineError::InconsistentEntity {
                    entity: self.key(),
                    reason: "closed state without a close timestamp".to_string(),
                });
            }
        }

        lifetime
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Labeled,
    Unlabeled,
    Milestoned,
    Demilestoned,
    Closed,
    Reopened,
    Merged,
    Reviewed,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Labeled => "labeled",
            EventKind::Unlabeled => "unlabeled",
            EventKind::Milestoned => "milestoned",
            EventKind::Demilestoned => "demilestoned",
            EventKind::Closed => "closed",
            EventKind::Reopened => "reopened",
            EventKind::Merged => "merged",
            EventKind::Reviewed => "reviewed",
            EventKind::Other(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "labeled" => EventKind::Labeled,
            "unlabeled" => EventKind::Unlabeled,
            "milestoned" => EventKind::Milestoned,
            "demilestoned" => EventKind::Demilestoned,
            "closed" => EventKind::Closed,
            "reopened" => EventKind::Reopened,
            "merged" => EventKind::Merged,
            "reviewed" => EventKind::Reviewed,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event record exactly as delivered by the store, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl EventRecord {
    pub fn new(timestamp: &str, event: &str) -> Self {
        Self {
            timestamp: Some(timestamp.to_string()),
            event: Some(event.to_string()),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_milestone(mut self, milestone: &str) -> Self {
        self.milestone = Some(milestone.to_string());
        self
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub actor: String,
    pub label: Option<String>,
    pub milestone: Option<String>,
    pub review_state: Option<String>,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            timestamp,
            kind,
            actor: String::new(),
            label: None,
            milestone: None,
            review_state: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_milestone(mut self, milestone: &str) -> Self {
        self.milestone = Some(milestone.to_string());
        self
    }

    pub fn with_review_state(mut self, state: &str) -> Self {
        self.review_state = Some(state.to_string());
        self
    }

    pub fn is_label(&self, kind: &EventKind, label: &str) -> bool {
        &self.kind == kind && self.label.as_deref() == Some(label)
    }

    pub fn is_milestone(&self, milestone: &str) -> bool {
        self.kind == EventKind::Milestoned && self.milestone.as_deref() == Some(milestone)
    }
}

/// State an entity occupied on one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DayState {
    Open,
    Waiting,
    WaitingOverThreshold,
    Blocked,
    Approved,
}

impl DayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayState::Open => "open",
            DayState::Waiting => "waiting",
            DayState::WaitingOverThreshold => "waiting-over-threshold",
            DayState::Blocked => "blocked",
            DayState::Approved => "approved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Question,
    Bug,
    Enhancement,
    Other,
}
