//! Output Formatting and Display Management
//!
//! Renders engine results for people and for other tools:
//!
//! - **Terminal**: coloured tables, one row per day (or week for the monthly report)
//! - **JSON**: the serialized result structs, for scripting
//! - **CSV**: one file per series in the output directory, with the same file names
//!   the chart tooling expects (`daily-prs-open.csv`, `daily-issues-open.csv`, ...)
//!
//! Entities that were skipped or flagged during a run are listed after the table so
//! data problems never disappear silently.

use crate::aggregator::{
    AuthorGroupSeries, DailyStateSeries, IssueTypeSeries, OpenedSeries, RangeSummary,
    RepoStateSeries,
};
use crate::error::EntityIssue;
use crate::metrics::BatchReport;
use crate::report::MonthlyReport;
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// A series that can be written as a CSV table
pub trait CsvExport {
    fn file_name(&self) -> &'static str;
    fn header(&self) -> Vec<String>;
    fn rows(&self) -> Vec<Vec<String>>;
}

fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write `series` into `dir`, creating the directory if needed
pub fn write_csv(dir: &Path, series: &dyn CsvExport) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(series.file_name());

    let mut file = fs::File::create(&path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    for row in std::iter::once(series.header()).chain(series.rows()) {
        let line: Vec<String> = row.iter().map(|v| csv_field(v)).collect();
        writeln!(file, "{}", line.join(","))
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    info!(path = %path.display(), "CSV written");
    Ok(path)
}

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn fmt_avg(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

impl CsvExport for DailyStateSeries {
    fn file_name(&self) -> &'static str {
        "daily-prs-open.csv"
    }

    fn header(&self) -> Vec<String> {
        header(&[
            "date",
            "total",
            "open",
            "blocked",
            "waiting",
            "waiting-over",
            "approved",
            "7 day trend",
        ])
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.days
            .iter()
            .map(|(day, c)| {
                vec![
                    day.to_string(),
                    c.total.to_string(),
                    c.open.to_string(),
                    c.blocked.to_string(),
                    c.waiting.to_string(),
                    c.waiting_over.to_string(),
                    c.approved.to_string(),
                    format!("{:.2}", c.trend),
                ]
            })
            .collect()
    }
}

impl CsvExport for RepoStateSeries {
    fn file_name(&self) -> &'static str {
        "daily-prs-open-by-repo.csv"
    }

    fn header(&self) -> Vec<String> {
        let mut names = vec!["date".to_string()];
        names.extend(self.repos.iter().cloned());
        names.push("total".to_string());
        names
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.days
            .iter()
            .map(|(day, by_repo)| {
                let mut row = vec![day.to_string()];
                row.extend(self.repos.iter().map(|repo| {
                    by_repo
                        .get(repo)
                        .map_or(0, |c| c.total)
                        .to_string()
                }));
                row.push(self.totals.get(day).map_or(0, |c| c.total).to_string());
                row
            })
            .collect()
    }
}

impl CsvExport for IssueTypeSeries {
    fn file_name(&self) -> &'static str {
        "daily-issues-open.csv"
    }

    fn header(&self) -> Vec<String> {
        header(&["date", "total", "other", "bug", "enhancement", "question"])
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.days
            .iter()
            .map(|(day, c)| {
                vec![
                    day.to_string(),
                    c.total.to_string(),
                    c.other.to_string(),
                    c.bug.to_string(),
                    c.enhancement.to_string(),
                    c.question.to_string(),
                ]
            })
            .collect()
    }
}

impl CsvExport for AuthorGroupSeries {
    fn file_name(&self) -> &'static str {
        "daily-prs-open-by-author.csv"
    }

    fn header(&self) -> Vec<String> {
        let mut names = vec!["date".to_string(), "total".to_string()];
        names.extend(self.groups.iter().cloned());
        names
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.days
            .iter()
            .map(|(day, c)| {
                let mut row = vec![day.to_string(), c.total.to_string()];
                row.extend(
                    self.groups
                        .iter()
                        .map(|g| c.groups.get(g).copied().unwrap_or(0).to_string()),
                );
                row
            })
            .collect()
    }
}

impl CsvExport for OpenedSeries {
    fn file_name(&self) -> &'static str {
        "daily-prs-opened.csv"
    }

    fn header(&self) -> Vec<String> {
        header(&[
            "date",
            "total",
            "merged",
            "closed",
            "open",
            "cumulative total",
            "cumulative merged",
            "cumulative closed",
            "cumulative open",
        ])
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.daily
            .iter()
            .map(|(day, c)| {
                let cum = self.cumulative.get(day).copied().unwrap_or_default();
                vec![
                    day.to_string(),
                    c.total.to_string(),
                    c.merged.to_string(),
                    c.closed.to_string(),
                    c.open.to_string(),
                    cum.total.to_string(),
                    cum.merged.to_string(),
                    cum.closed.to_string(),
                    cum.open.to_string(),
                ]
            })
            .collect()
    }
}

pub struct DisplayManager {
    json_pretty: bool,
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DisplayManager {
    pub fn new(json_pretty: bool) -> Self {
        Self { json_pretty }
    }

    /// Print any serializable result as JSON on stdout
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let json = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .context("Failed to serialize output to JSON")?;
        println!("{}", json);
        Ok(())
    }

    fn banner(&self, title: &str) {
        println!("\n{}", "=".repeat(80).bright_cyan());
        println!("{}", title.bright_white().bold());
        println!("{}", "=".repeat(80).bright_cyan());
    }

    fn issues(&self, heading: &str, issues: &[EntityIssue]) {
        if issues.is_empty() {
            return;
        }
        println!(
            "\n{} {} ({}):",
            "⚠".bright_yellow(),
            heading.bright_yellow(),
            issues.len()
        );
        for issue in issues {
            println!(
                "   {} {}",
                issue.entity.to_string().bright_white(),
                issue.reason.dimmed()
            );
        }
    }

    pub fn display_batch(&self, report: &BatchReport) {
        self.banner("Derived metrics");
        println!(
            "\n{} {} computed • {} skipped • {} flagged",
            "📊".bright_yellow(),
            report.computed.to_string().bright_white().bold(),
            report.skipped.len().to_string().bright_white(),
            report.flagged.len().to_string().bright_white()
        );
        self.issues("Skipped", &report.skipped);
        self.issues("Flagged as inconsistent", &report.flagged);
    }

    pub fn display_daily_states(&self, series: &DailyStateSeries) {
        self.banner(&format!(
            "Open daily by state ({} to {})",
            series.range.from, series.range.to
        ));
        println!(
            "{:<12} {:>7} {:>7} {:>8} {:>8} {:>9} {:>9} {:>8}",
            "date", "total", "open", "blocked", "waiting", "wait>thr", "approved", "trend"
        );
        for (day, c) in &series.days {
            println!(
                "{:<12} {:>7} {:>7} {:>8} {:>8} {:>9} {:>9} {:>8}",
                day.to_string().bright_white(),
                c.total.to_string().bold(),
                c.open,
                c.blocked.to_string().red(),
                c.waiting.to_string().yellow(),
                c.waiting_over.to_string().bright_red(),
                c.approved.to_string().green(),
                format!("{:.2}", c.trend).bright_cyan()
            );
        }
        self.issues("Skipped", &series.skipped);
        self.issues("Flagged as inconsistent", &series.flagged);
    }

    pub fn display_repo_states(&self, series: &RepoStateSeries) {
        self.banner(&format!(
            "Open daily by repository ({} to {})",
            series.range.from, series.range.to
        ));
        for (day, by_repo) in &series.days {
            let total = series.totals.get(day).copied().unwrap_or_default();
            println!(
                "{} {} ({} trend)",
                "📅".bright_blue(),
                day.to_string().bright_white().bold(),
                format!("{:.2}", total.trend).bright_cyan()
            );
            for (repo, c) in by_repo {
                println!(
                    "   {}: {} open • {} waiting • {} blocked",
                    repo.bright_cyan(),
                    c.total.to_string().bright_white(),
                    (c.waiting + c.waiting_over).to_string().yellow(),
                    c.blocked.to_string().red()
                );
            }
        }
        self.issues("Skipped", &series.skipped);
        self.issues("Flagged as inconsistent", &series.flagged);
    }

    pub fn display_issue_types(&self, series: &IssueTypeSeries) {
        self.banner(&format!(
            "Issues open daily by type ({} to {})",
            series.range.from, series.range.to
        ));
        println!(
            "{:<12} {:>7} {:>9} {:>7} {:>12} {:>7}",
            "date", "total", "question", "bug", "enhancement", "other"
        );
        for (day, c) in &series.days {
            println!(
                "{:<12} {:>7} {:>9} {:>7} {:>12} {:>7}",
                day.to_string().bright_white(),
                c.total.to_string().bold(),
                c.question.to_string().bright_cyan(),
                c.bug.to_string().red(),
                c.enhancement.to_string().green(),
                c.other
            );
        }
        self.issues("Flagged as inconsistent", &series.flagged);
    }

    pub fn display_author_groups(&self, series: &AuthorGroupSeries) {
        self.banner(&format!(
            "Open daily by author group ({} to {})",
            series.range.from, series.range.to
        ));
        for (day, c) in &series.days {
            let breakdown: Vec<String> = series
                .groups
                .iter()
                .map(|g| format!("{} {}", g, c.groups.get(g).copied().unwrap_or(0)))
                .collect();
            println!(
                "{:<12} {:>6}   {}",
                day.to_string().bright_white(),
                c.total.to_string().bold(),
                breakdown.join(" • ").dimmed()
            );
        }
        self.issues("Flagged as inconsistent", &series.flagged);
    }

    pub fn display_opened(&self, series: &OpenedSeries) {
        self.banner(&format!(
            "Opened daily by current status ({} to {})",
            series.range.from, series.range.to
        ));
        println!(
            "{:<12} {:>7} {:>7} {:>7} {:>7} {:>11}",
            "date", "total", "merged", "closed", "open", "cumulative"
        );
        for (day, c) in &series.daily {
            let cum = series.cumulative.get(day).map_or(0, |c| c.total);
            println!(
                "{:<12} {:>7} {:>7} {:>7} {:>7} {:>11}",
                day.to_string().bright_white(),
                c.total.to_string().bold(),
                c.merged.to_string().green(),
                c.closed.to_string().red(),
                c.open,
                cum.to_string().bright_cyan()
            );
        }
        self.issues("Flagged as inconsistent", &series.flagged);
    }

    fn summary_row(&self, label: &str, s: &RangeSummary) {
        println!(
            "{:<6} {:>7} {:>7} {:>7} {:>7} {:>10} {:>10} {:>10} {:>10}",
            label,
            s.total,
            s.open,
            s.closed,
            s.merged,
            fmt_avg(s.days_open_avg),
            fmt_avg(s.days_waiting_avg),
            fmt_avg(s.days_to_first_avg),
            s.days_to_first_over
        );
    }

    fn summary_header(&self, first: &str) {
        println!(
            "{:<6} {:>7} {:>7} {:>7} {:>7} {:>10} {:>10} {:>10} {:>10}",
            first.bright_cyan(),
            "Opened",
            "Open",
            "Closed",
            "Merged",
            "Days Open",
            "Days Wait",
            "Days First",
            "First Over"
        );
    }

    pub fn display_summary(&self, summary: &RangeSummary) {
        self.banner(&format!(
            "Summary ({} to {})",
            summary.range.from, summary.range.to
        ));
        self.summary_header("");
        self.summary_row("ALL", summary);
        self.issues("Flagged as inconsistent", &summary.flagged);
    }

    pub fn display_report(&self, reports: &[MonthlyReport]) {
        self.banner("Monthly report");
        for report in reports {
            println!();
            self.summary_header(&report.month);
            for row in &report.weeks {
                self.summary_row(&row.label, &row.summary);
            }
            println!("{}", "-".repeat(80).dimmed());
            self.summary_row("SUM", &report.total);
            self.issues("Flagged as inconsistent", &report.total.flagged);
        }
    }
}
