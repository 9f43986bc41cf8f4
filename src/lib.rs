//! Repo Stats Library
//!
//! Event-timeline analytics for pull requests and issues. Given the ordered event
//! history of each entity, the library derives per-entity duration metrics and
//! reconstructs, day by day, which state every entity was in, then aggregates those days
//! into calendar-aligned series for reporting and charting.
//!
//! ## Core Features
//!
//! - **Duration metrics**: days open, days waiting and days to first response, computed
//!   by single-pass reduction and written back to the store
//! - **Day-by-day replay**: an explicit state machine labels every day an entity was
//!   alive as open, waiting, waiting over threshold, blocked or approved
//! - **Series**: daily state counts with a trailing average, per-repository breakdowns,
//!   issue types, author groups, opened-per-day and range summaries
//! - **Parallel**: per-entity work fans out over rayon (`parallel` feature)
//!
//! ## Architecture Overview
//!
//! - [`models`] - Entities, events, day states
//! - [`timeline`] - Validated, ordered event log per entity
//! - [`metrics`] - Metric calculator
//! - [`replay`] - State reconstructor
//! - [`aggregator`] - Series and summaries
//! - [`report`] - Monthly report of weekly summaries
//! - [`store`] - Store trait and in-memory snapshot store
//! - [`calendar`] - Inclusive UTC day ranges
//! - [`analyzer`] - Command orchestration for the binary
//! - [`display`] - Terminal, JSON and CSV output
//! - [`config`] - Configuration with file and environment support
//! - [`logging`] - Structured logging with JSON and pretty formats
//!
//! ## Main Entry Point
//!
//! ```rust
//! use repo_stats::aggregator::{Aggregator, SeriesQuery};
//! use repo_stats::calendar::DateRange;
//! use repo_stats::config::RulesConfig;
//! use repo_stats::store::{EntityFilter, MemoryStore};
//! use chrono::NaiveDate;
//!
//! # fn example() -> Result<(), repo_stats::EngineError> {
//! let store = MemoryStore::new();
//! let rules = RulesConfig::default();
//! let range = DateRange::new(
//!     NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2022, 1, 31).unwrap(),
//! )?;
//!
//! let series = Aggregator::new(&store, &rules)
//!     .daily_state_series(&SeriesQuery::new(range, EntityFilter::new()))?;
//! assert_eq!(series.days.len(), 31);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod aggregator;
pub mod analyzer;
pub mod calendar;
pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod parallel;
pub mod replay;
pub mod report;
pub mod store;
pub mod timeline;
pub mod timestamp_parser;

pub use analyzer::RepoStatsAnalyzer;
pub use error::{EngineError, EngineResult};
pub use models::*;
