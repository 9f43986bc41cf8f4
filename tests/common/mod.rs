#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use repo_stats::calendar::DateRange;
use repo_stats::models::{Entity, EntityKey, EntityKind, EventRecord, LifecycleState};
use repo_stats::store::MemoryStore;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn range(from: NaiveDate, to: NaiveDate) -> DateRange {
    DateRange::new(from, to).unwrap()
}

/// Fixed "now" used across tests so open entities have a stable end
pub fn now() -> DateTime<Utc> {
    at(2022, 6, 1, 0)
}

/// Builder for test entities
pub struct EntityBuilder {
    entity: Entity,
}

impl EntityBuilder {
    pub fn pr(repo: &str, number: u64, created: DateTime<Utc>) -> Self {
        Self {
            entity: Entity {
                repo: repo.to_string(),
                number,
                kind: EntityKind::PullRequest,
                title: format!("Change #{}", number),
                author: "alice".to_string(),
                state: LifecycleState::Open,
                milestone: None,
                labels: vec![],
                merged: false,
                merger: None,
                created,
                closed: None,
                metrics: None,
            },
        }
    }

    pub fn issue(repo: &str, number: u64, created: DateTime<Utc>) -> Self {
        let mut builder = Self::pr(repo, number, created);
        builder.entity.kind = EntityKind::Issue;
        builder
    }

    pub fn author(mut self, author: &str) -> Self {
        self.entity.author = author.to_string();
        self
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.entity.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn closed(mut self, closed: DateTime<Utc>) -> Self {
        self.entity.state = LifecycleState::Closed;
        self.entity.closed = Some(closed);
        self
    }

    pub fn merged(mut self, at: DateTime<Utc>) -> Self {
        self.entity.merged = true;
        self.entity.merger = Some("maintainer".to_string());
        self.closed(at)
    }

    pub fn build(self) -> Entity {
        self.entity
    }
}

pub fn record(ts: DateTime<Utc>, event: &str) -> EventRecord {
    EventRecord::new(&ts.to_rfc3339(), event)
}

/// Insert an entity together with its events
pub fn seed(store: &MemoryStore, entity: Entity, events: Vec<EventRecord>) -> EntityKey {
    let key = entity.key();
    store.insert_entity(entity);
    if !events.is_empty() {
        store.push_events(&key, events);
    }
    key
}
