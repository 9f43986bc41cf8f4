//! Entity Store
//!
//! The engine never talks to the hosting platform or a database directly. Everything it
//! reads and writes goes through [`EntityStore`], a queryable repository of entities and
//! their raw event records.
//!
//! [`MemoryStore`] is the bundled implementation. It keeps everything in concurrent maps
//! so per-entity work can run in parallel, and can be loaded from and saved to a JSON
//! snapshot file.

use crate::calendar::DateRange;
use crate::error::{EngineError, EngineResult};
use crate::models::{DerivedMetrics, Entity, EntityKey, EntityKind, EventRecord};
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Narrows a listing to a subset of entities. Empty sets mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub kind: Option<EntityKind>,
    pub repos: BTreeSet<String>,
    pub authors: BTreeSet<String>,
    /// Entity must carry at least one of these labels
    pub labels: BTreeSet<String>,
}

impl EntityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn repos<I, S>(mut self, repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.repos.extend(repos.into_iter().map(Into::into));
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors.extend(authors.into_iter().map(Into::into));
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Same filter restricted to a single repository
    pub fn for_repo(&self, repo: &str) -> Self {
        let mut filter = self.clone();
        filter.repos = BTreeSet::from([repo.to_string()]);
        filter
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if self.kind.is_some_and(|kind| kind != entity.kind) {
            return false;
        }
        if !self.repos.is_empty() && !self.repos.contains(&entity.repo) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&entity.author) {
            return false;
        }
        if !self.labels.is_empty() && !entity.labels.iter().any(|l| self.labels.contains(l)) {
            return false;
        }
        true
    }
}

/// Queryable repository of entities and their events
pub trait EntityStore: Send + Sync {
    fn get_entity(&self, key: &EntityKey) -> EngineResult<Entity>;

    /// Raw event records for one entity, in delivery order
    fn get_events(&self, key: &EntityKey) -> EngineResult<Vec<EventRecord>>;

    /// Every entity matching the filter, ordered by key
    fn list_entities(&self, filter: &EntityFilter) -> EngineResult<Vec<Entity>>;

    fn upsert_derived_metrics(&self, key: &EntityKey, metrics: DerivedMetrics)
        -> EngineResult<()>;

    /// Entities whose open interval intersects the range.
    ///
    /// Entities with unusable close data count as still open.
    fn list_open_in_range(
        &self,
        filter: &EntityFilter,
        range: &DateRange,
    ) -> EngineResult<Vec<Entity>> {
        let entities = self.list_entities(filter)?;
        Ok(entities
            .into_iter()
            .filter(|entity| {
                let lifetime = entity.lifetime();
                range.overlaps(lifetime.opened, lifetime.closed)
            })
            .collect())
    }

    fn list_created_in_range(
        &self,
        filter: &EntityFilter,
        range: &DateRange,
    ) -> EngineResult<Vec<Entity>> {
        let entities = self.list_entities(filter)?;
        Ok(entities
            .into_iter()
            .filter(|entity| range.contains(entity.created))
            .collect())
    }

    /// Persist pending writes, if the store has a backing file
    fn flush(&self) -> EngineResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEvent {
    repo: String,
    number: u64,
    #[serde(flatten)]
    record: EventRecord,
}

/// On-disk layout of a [`MemoryStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    events: Vec<SnapshotEvent>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: DashMap<EntityKey, Entity>,
    events: DashMap<EntityKey, Vec<EventRecord>>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity
    pub fn insert_entity(&self, entity: Entity) {
        self.entities.insert(entity.key(), entity);
    }

    /// Append event records to an entity's log
    pub fn push_events(&self, key: &EntityKey, records: impl IntoIterator<Item = EventRecord>) {
        self.events.entry(key.clone()).or_default().extend(records);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Load a snapshot written by [`MemoryStore::save_to_file`] or by an external fetcher.
    ///
    /// Flushes go back to the same file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read store file: {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store file: {}", path.display()))?;

        let mut store = Self::new();
        for entity in snapshot.entities {
            store.insert_entity(entity);
        }
        for event in snapshot.events {
            store.push_events(&EntityKey::new(event.repo, event.number), [event.record]);
        }
        store.path = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            entities = store.entities.len(),
            "Loaded entity store"
        );

        Ok(store)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let mut entities: Vec<Entity> = self.entities.iter().map(|e| e.value().clone()).collect();
        entities.sort_by_key(Entity::key);

        let mut keys: Vec<EntityKey> = self.events.iter().map(|e| e.key().clone()).collect();
        keys.sort();

        let mut events = Vec::new();
        for key in keys {
            if let Some(records) = self.events.get(&key) {
                events.extend(records.iter().map(|record| SnapshotEvent {
                    repo: key.repo.clone(),
                    number: key.number,
                    record: record.clone(),
                }));
            }
        }

        let snapshot = Snapshot { entities, events };
        let content =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize store")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write store file: {}", path.display()))?;

        debug!(path = %path.display(), "Entity store saved");
        Ok(())
    }
}

impl EntityStore for MemoryStore {
    fn get_entity(&self, key: &EntityKey) -> EngineResult<Entity> {
        self.entities
            .get(key)
            .map(|entity| entity.value().clone())
            .ok_or_else(|| EngineError::not_found(key))
    }

    fn get_events(&self, key: &EntityKey) -> EngineResult<Vec<EventRecord>> {
        if let Some(records) = self.events.get(key) {
            return Ok(records.value().clone());
        }
        // A known entity without events has an empty log
        if self.entities.contains_key(key) {
            Ok(Vec::new())
        } else {
            Err(EngineError::not_found(key))
        }
    }

    fn list_entities(&self, filter: &EntityFilter) -> EngineResult<Vec<Entity>> {
        let mut entities: Vec<Entity> = self
            .entities
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        entities.sort_by(|a, b| (&a.repo, a.number).cmp(&(&b.repo, b.number)));
        Ok(entities)
    }

    fn upsert_derived_metrics(
        &self,
        key: &EntityKey,
        metrics: DerivedMetrics,
    ) -> EngineResult<()> {
        let mut entity = self
            .entities
            .get_mut(key)
            .ok_or_else(|| {
                EngineError::Store(format!("cannot write metrics for missing entity {}", key))
            })?;
        entity.metrics = Some(metrics);
        Ok(())
    }

    fn flush(&self) -> EngineResult<()> {
        match &self.path {
            Some(path) => self
                .save_to_file(path)
                .map_err(|e| EngineError::Store(format!("{:#}", e))),
            None => Ok(()),
        }
    }
}
