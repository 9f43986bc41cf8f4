//! Configuration
//!
//! Provides configuration management with:
//! - Runtime defaults
//! - Config file loading (optional, TOML)
//! - Environment variable overrides
//! - Validation
//!
//! The loaded [`Config`] is passed explicitly into the analyzer; the engine itself only
//! ever sees the [`RulesConfig`] and [`AuthorsConfig`] sections.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,

    /// Labels, milestones and thresholds that drive the metrics and replay
    pub rules: RulesConfig,

    /// Author grouping for the per-author series
    pub authors: AuthorsConfig,

    pub output: OutputConfig,

    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Label that marks an entity as waiting on its author
    pub waiting_label: String,
    /// Milestone that marks an entity as blocked
    pub blocked_milestone: String,
    /// Waiting streaks longer than this many days are reported separately
    pub waiting_threshold_days: u32,
    /// Entities slower than this to first response are counted in summaries
    pub first_response_threshold_days: u32,
    pub trend_window_days: usize,
    /// Move reviewed-and-approved entities into the approved bucket
    pub approve_on_review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorsConfig {
    pub default_group: String,
    /// Group name to member logins
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
    /// Where CSV series files are written
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub store_file: PathBuf,
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            waiting_label: "waiting-response".to_string(),
            blocked_milestone: "Blocked".to_string(),
            waiting_threshold_days: 14,
            first_response_threshold_days: 14,
            trend_window_days: 7,
            approve_on_review: false,
        }
    }
}

impl Default for AuthorsConfig {
    fn default() -> Self {
        Self {
            default_group: "community".to_string(),
            groups: BTreeMap::new(),
        }
    }
}

impl AuthorsConfig {
    /// Group an author belongs to, falling back to the default group
    pub fn group_of(&self, author: &str) -> &str {
        self.groups
            .iter()
            .find(|(_, members)| members.contains(author))
            .map(|(group, _)| group.as_str())
            .unwrap_or(&self.default_group)
    }

    /// All group names, configured ones first, default group last
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .keys()
            .filter(|name| **name != self.default_group)
            .cloned()
            .collect();
        names.push(self.default_group.clone());
        names
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_pretty: true,
            directory: PathBuf::from("graphs"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            store_file: PathBuf::from("repo-stats.json"),
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            rules: RulesConfig::default(),
            authors: AuthorsConfig::default(),
            output: OutputConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, file and environment
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            Some(PathBuf::from("repo-stats.toml")),
            Some(PathBuf::from(".repo-stats.toml")),
            dirs::config_dir().map(|d| d.join("repo-stats").join("config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("REPO_STATS_WAITING_LABEL") {
            self.rules.waiting_label = val;
        }
        if let Ok(val) = env::var("REPO_STATS_BLOCKED_MILESTONE") {
            self.rules.blocked_milestone = val;
        }
        if let Ok(val) = env::var("REPO_STATS_WAITING_THRESHOLD") {
            self.rules.waiting_threshold_days = val
                .parse()
                .context("Invalid REPO_STATS_WAITING_THRESHOLD")?;
        }

        if let Ok(val) = env::var("REPO_STATS_STORE") {
            self.paths.store_file = PathBuf::from(val);
        }
        if let Ok(val) = env::var("REPO_STATS_OUTPUT_DIR") {
            self.output.directory = PathBuf::from(val);
        }
        if let Ok(val) = env::var("REPO_STATS_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rules.waiting_label.trim().is_empty() {
            anyhow::bail!("Waiting label must not be empty");
        }

        if self.rules.blocked_milestone.trim().is_empty() {
            anyhow::bail!("Blocked milestone must not be empty");
        }

        if self.rules.waiting_threshold_days == 0 {
            anyhow::bail!("Waiting threshold must be greater than 0 days");
        }

        if self.rules.first_response_threshold_days == 0 {
            anyhow::bail!("First response threshold must be greater than 0 days");
        }

        if !(1..=31).contains(&self.rules.trend_window_days) {
            anyhow::bail!(
                "Trend window must be between 1 and 31 days, got {}",
                self.rules.trend_window_days
            );
        }

        if self.authors.default_group.trim().is_empty() {
            anyhow::bail!("Default author group must not be empty");
        }

        if !matches!(self.logging.output.as_str(), "console" | "file" | "both") {
            anyhow::bail!(
                "Log output must be one of console, file or both, got {}",
                self.logging.output
            );
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}
