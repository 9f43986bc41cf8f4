//! Event Log
//!
//! Turns the raw [`EventRecord`]s delivered by the store into an ordered, validated
//! sequence of [`Event`]s for one entity. Records without a usable timestamp or kind
//! are dropped with a warning; they never fail the entity.
//!
//! Ordering is by timestamp only. The sort is stable, so events sharing a timestamp
//! keep the order the store delivered them in.

use crate::error::{EngineError, EngineResult};
use crate::models::{EntityKey, Event, EventKind, EventRecord};
use crate::timestamp_parser::TimestampParser;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct EventLog {
    key: EntityKey,
    events: Vec<Event>,
    dropped: usize,
}

impl EventLog {
    /// Build a log from already-validated events
    pub fn new(key: EntityKey, mut events: Vec<Event>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self {
            key,
            events,
            dropped: 0,
        }
    }

    /// Validate and order raw records, dropping malformed ones
    pub fn from_records(key: EntityKey, records: Vec<EventRecord>) -> Self {
        let mut events = Vec::with_capacity(records.len());
        let mut dropped = 0;

        for (index, record) in records.into_iter().enumerate() {
            match validate_record(&key, index, record) {
                Ok(event) => events.push(event),
                Err(err) => {
                    dropped += 1;
                    warn!(entity = %key, error = %err, "Dropping malformed event from replay");
                }
            }
        }

        let mut log = Self::new(key, events);
        log.dropped = dropped;

        debug!(
            entity = %log.key,
            events = log.events.len(),
            dropped = log.dropped,
            "Event log loaded"
        );

        log
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of records rejected as malformed
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

fn validate_record(key: &EntityKey, index: usize, record: EventRecord) -> EngineResult<Event> {
    let malformed = |reason: String| EngineError::MalformedEvent {
        entity: key.clone(),
        index,
        reason,
    };

    let raw_ts = record
        .timestamp
        .as_deref()
        .filter(|ts| !ts.trim().is_empty())
        .ok_or_else(|| malformed("missing timestamp".to_string()))?;
    let timestamp = TimestampParser::parse(raw_ts).map_err(|e| malformed(e.to_string()))?;

    let kind = record
        .event
        .as_deref()
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .map(EventKind::from)
        .ok_or_else(|| malformed("missing event kind".to_string()))?;

    Ok(Event {
        timestamp,
        kind,
        actor: record.actor.unwrap_or_default(),
        label: record.label.filter(|l| !l.is_empty()),
        milestone: record.milestone.filter(|m| !m.is_empty()),
        review_state: record.state.filter(|s| !s.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> EntityKey {
        EntityKey::new("acme/widgets", 3)
    }

    #[test]
    fn test_orders_by_timestamp() {
        let log = EventLog::from_records(
            key(),
            vec![
                EventRecord::new("2022-01-03T00:00:00Z", "closed"),
                EventRecord::new("2022-01-01T00:00:00Z", "labeled").with_label("bug"),
            ],
        );
        let kinds: Vec<_> = log.events().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds, vec![EventKind::Labeled, EventKind::Closed]);
    }

    #[test]
    fn test_equal_timestamps_keep_delivery_order() {
        let log = EventLog::from_records(
            key(),
            vec![
                EventRecord::new("2022-01-02T10:00:00Z", "unlabeled").with_label("waiting-response"),
                EventRecord::new("2022-01-01T00:00:00Z", "reviewed"),
                EventRecord::new("2022-01-02T10:00:00Z", "labeled").with_label("waiting-response"),
            ],
        );
        let kinds: Vec<_> = log.events().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Reviewed, EventKind::Unlabeled, EventKind::Labeled]
        );
    }

    #[test]
    fn test_malformed_records_dropped() {
        let log = EventLog::from_records(
            key(),
            vec![
                EventRecord {
                    event: Some("closed".to_string()),
                    ..Default::default()
                },
                EventRecord::new("not a date", "closed"),
                EventRecord::new("2022-01-01T00:00:00Z", "  "),
                EventRecord::new("2022-01-01T00:00:00Z", "merged"),
            ],
        );
        assert_eq!(log.len(), 1);
        assert_eq!(log.dropped(), 3);
        assert_eq!(log.events()[0].kind, EventKind::Merged);
    }

    #[test]
    fn test_empty_payload_fields_are_none() {
        let mut record = EventRecord::new("2022-01-01T00:00:00Z", "milestoned");
        record.label = Some(String::new());
        record.milestone = Some("Blocked".to_string());
        let event = validate_record(&key(), 0, record).unwrap();
        assert_eq!(event.label, None);
        assert!(event.is_milestone("Blocked"));
    }
}
