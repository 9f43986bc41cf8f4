//! Command Orchestration
//!
//! [`RepoStatsAnalyzer`] is the entry point the binary uses. It owns the store, the
//! loaded configuration and the display manager, and runs one [`Command`] at a time:
//!
//! 1. **Resolve**: turn the command-line date arguments into a [`DateRange`]
//! 2. **Compute**: hand the store, rules and range to the engine
//! 3. **Output**: print a table or JSON, and optionally write CSV files
//!
//! ## Commands
//!
//! - **compute**: derive and persist per-entity metrics
//! - **open**: pull requests open per day by state (optionally per repository)
//! - **issues**: issues open per day by type
//! - **authors**: pull requests open per day by author group
//! - **opened**: pull requests opened per day by current status
//! - **summary**: range summary over pull requests created in range
//! - **report**: monthly report of weekly summaries
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use repo_stats::analyzer::{Command, ProcessOptions, RepoStatsAnalyzer};
//! use repo_stats::calendar::DateRange;
//! use repo_stats::config::Config;
//! use repo_stats::store::{EntityFilter, MemoryStore};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let store = MemoryStore::load_from_file(Path::new("repo-stats.json"))?;
//! let analyzer = RepoStatsAnalyzer::new(store, Config::default());
//!
//! let today = chrono::Utc::now().date_naive();
//! let options = ProcessOptions {
//!     range: DateRange::past_year(today),
//!     filter: EntityFilter::new().repos(["acme/widgets"]),
//!     json_output: true,
//!     csv_output: false,
//! };
//!
//! analyzer.run_command(&Command::Summary, &options)?;
//! # Ok(())
//! # }
//! ```

use crate::aggregator::{Aggregator, SeriesQuery};
use crate::calendar::{last_of_month, DateRange};
use crate::config::Config;
use crate::display::{write_csv, CsvExport, DisplayManager};
use crate::logging::run_span;
use crate::metrics::MetricCalculator;
use crate::models::EntityKind;
use crate::report::build_report;
use crate::store::{EntityFilter, EntityStore};
use crate::timestamp_parser::TimestampParser;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Compute,
    Open { by_repo: bool },
    Issues,
    Authors,
    Opened,
    Summary,
    Report,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Compute => "compute",
            Command::Open { .. } => "open",
            Command::Issues => "issues",
            Command::Authors => "authors",
            Command::Opened => "opened",
            Command::Summary => "summary",
            Command::Report => "report",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub range: DateRange,
    pub filter: EntityFilter,
    pub json_output: bool,
    pub csv_output: bool,
}

/// Range for the series commands: `--from`/`--to` days, defaulting to the past year
/// starting on the 1st of the month
pub fn resolve_series_range(
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange> {
    let from = match from {
        Some(day) => TimestampParser::parse_day(day)?,
        None => DateRange::past_year(today).from,
    };
    let to = match to {
        Some(day) => TimestampParser::parse_day(day)?,
        None => today,
    };
    Ok(DateRange::new(from, to)?)
}

/// Range for the report command: whole months, defaulting to the start of last month,
/// never extending past today
pub fn resolve_report_range(
    from_month: Option<&str>,
    to_month: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange> {
    let from = match from_month {
        Some(month) => TimestampParser::parse_month(month)?,
        None => DateRange::since_last_month(today).from,
    };
    let to = match to_month {
        Some(month) => last_of_month(TimestampParser::parse_month(month)?).min(today),
        None => today,
    };
    Ok(DateRange::new(from, to)?)
}

pub struct RepoStatsAnalyzer<S: EntityStore> {
    store: S,
    config: Config,
    display: DisplayManager,
    now: DateTime<Utc>,
}

impl<S: EntityStore> RepoStatsAnalyzer<S> {
    pub fn new(store: S, config: Config) -> Self {
        let display = DisplayManager::new(config.output.json_pretty);
        Self {
            store,
            config,
            display,
            now: Utc::now(),
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn aggregator(&self) -> Aggregator<'_, S> {
        Aggregator::new(&self.store, &self.config.rules).with_now(self.now)
    }

    fn pr_query(&self, options: &ProcessOptions) -> SeriesQuery {
        SeriesQuery::new(
            options.range,
            options.filter.clone().kind(EntityKind::PullRequest),
        )
    }

    fn export(&self, options: &ProcessOptions, series: &dyn CsvExport) -> Result<()> {
        if options.csv_output {
            let path = write_csv(&self.config.output.directory, series)?;
            if !options.json_output {
                println!("Wrote {}", path.display());
            }
        }
        Ok(())
    }

    pub fn run_command(&self, command: &Command, options: &ProcessOptions) -> Result<()> {
        let span = run_span(command.name());
        let _entered = span.enter();

        info!(
            from = %options.range.from,
            to = %options.range.to,
            repos = options.filter.repos.len(),
            authors = options.filter.authors.len(),
            "Running command"
        );

        match command {
            Command::Compute => {
                let report = MetricCalculator::new(&self.store, &self.config.rules)
                    .with_now(self.now)
                    .compute_all(&options.filter)
                    .context("Failed to compute derived metrics")?;
                self.store
                    .flush()
                    .context("Failed to persist derived metrics")?;

                if options.json_output {
                    self.display.print_json(&report)?;
                } else {
                    self.display.display_batch(&report);
                }
            }
            Command::Open { by_repo: false } => {
                let series = self
                    .aggregator()
                    .daily_state_series(&self.pr_query(options))
                    .context("Failed to build daily state series")?;
                self.export(options, &series)?;
                if options.json_output {
                    self.display.print_json(&series)?;
                } else {
                    self.display.display_daily_states(&series);
                }
            }
            Command::Open { by_repo: true } => {
                let series = self
                    .aggregator()
                    .repo_state_series(&self.pr_query(options))
                    .context("Failed to build per-repository series")?;
                self.export(options, &series)?;
                if options.json_output {
                    self.display.print_json(&series)?;
                } else {
                    self.display.display_repo_states(&series);
                }
            }
            Command::Issues => {
                let query = SeriesQuery::new(options.range, options.filter.clone());
                let series = self
                    .aggregator()
                    .issue_type_series(&query)
                    .context("Failed to build issue type series")?;
                self.export(options, &series)?;
                if options.json_output {
                    self.display.print_json(&series)?;
                } else {
                    self.display.display_issue_types(&series);
                }
            }
            Command::Authors => {
                let series = self
                    .aggregator()
                    .author_group_series(&self.pr_query(options), &self.config.authors)
                    .context("Failed to build author group series")?;
                self.export(options, &series)?;
                if options.json_output {
                    self.display.print_json(&series)?;
                } else {
                    self.display.display_author_groups(&series);
                }
            }
            Command::Opened => {
                let series = self
                    .aggregator()
                    .opened_series(&self.pr_query(options))
                    .context("Failed to build opened series")?;
                self.export(options, &series)?;
                if options.json_output {
                    self.display.print_json(&series)?;
                } else {
                    self.display.display_opened(&series);
                }
            }
            Command::Summary => {
                let summary = self
                    .aggregator()
                    .range_summary(&self.pr_query(options))
                    .context("Failed to build range summary")?;
                if options.json_output {
                    self.display.print_json(&summary)?;
                } else {
                    self.display.display_summary(&summary);
                }
            }
            Command::Report => {
                let reports = build_report(&self.store, &self.config.rules, &self.pr_query(options))
                    .context("Failed to build monthly report")?;
                if options.json_output {
                    self.display.print_json(&reports)?;
                } else {
                    self.display.display_report(&reports);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_series_range_defaults() {
        let range = resolve_series_range(None, None, day(2022, 6, 17)).unwrap();
        assert_eq!(range.from, day(2021, 6, 1));
        assert_eq!(range.to, day(2022, 6, 17));
    }

    #[test]
    fn test_series_range_rejects_reversed() {
        assert!(resolve_series_range(Some("2022-02-01"), Some("2022-01-01"), day(2022, 6, 1)).is_err());
        assert!(resolve_series_range(Some("yesterday"), None, day(2022, 6, 1)).is_err());
    }

    #[test]
    fn test_report_range() {
        let today = day(2022, 6, 17);
        let range = resolve_report_range(None, None, today).unwrap();
        assert_eq!(range.from, day(2022, 5, 1));
        assert_eq!(range.to, today);

        let range = resolve_report_range(Some("2022-01"), Some("2022-02"), today).unwrap();
        assert_eq!(range.to, day(2022, 2, 28));

        let range = resolve_report_range(Some("2022-01"), Some("2022-09"), today).unwrap();
        assert_eq!(range.to, today);
    }
}
