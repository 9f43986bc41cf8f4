use serde::Serialize;
use thiserror::Error;

use crate::models::EntityKey;

/// Errors raised by the analytics engine and its store collaborator.
///
/// None of these are fatal to a reporting run: batch operations log the
/// failing entity and carry on with the rest.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Entity or its event log is absent from the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// A single event record is missing its timestamp or kind
    #[error("Malformed event for {entity} (record {index}): {reason}")]
    MalformedEvent {
        entity: EntityKey,
        index: usize,
        reason: String,
    },

    /// Reading from or writing to the store failed
    #[error("Store error: {0}")]
    Store(String),

    /// Entity timestamps violate ordering (e.g. closed before created)
    #[error("Inconsistent entity {entity}: {reason}")]
    InconsistentEntity { entity: EntityKey, reason: String },

    /// A range query against the store failed
    #[error("Query error: {0}")]
    Query(String),
}

impl EngineError {
    pub fn not_found(key: &EntityKey) -> Self {
        EngineError::NotFound(key.to_string())
    }

    /// Short machine-friendly name, used in logs and batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::MalformedEvent { .. } => "malformed_event",
            EngineError::Store(_) => "store_error",
            EngineError::InconsistentEntity { .. } => "inconsistent_entity",
            EngineError::Query(_) => "query_error",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// An entity that was skipped or flagged during a run, as reported in output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityIssue {
    pub entity: EntityKey,
    pub kind: &'static str,
    pub reason: String,
}

impl EntityIssue {
    pub fn new(entity: EntityKey, error: &EngineError) -> Self {
        Self {
            entity,
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}
