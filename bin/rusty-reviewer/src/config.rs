//! # Settings
//!
//! Layered configuration: optional `reviewer.toml`, then `REVIEWER__*`
//! environment variables (after `.env` has been loaded by the caller).

use config::{Config, ConfigBuilder, Environment, File};
use rr_core::{Level, Thresholds};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Forum name as used in listing calls
    pub forum: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Pages swept by `run --once`; empty means the first page only
    #[serde(default)]
    pub pages: Vec<u32>,
    /// SQLite url; review state stays in memory when absent
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_blacklist")]
    pub blacklist_threshold: i32,
    #[serde(default = "default_whitelist")]
    pub whitelist_threshold: i32,
    #[serde(default = "default_window")]
    pub fan_out_window: usize,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// One keyword rule as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub level: Level,
    pub keywords: Vec<String>,
    /// Flag names, e.g. `["DELETE", "PARENT"]`
    #[serde(default = "default_op")]
    pub op: Vec<String>,
    #[serde(default)]
    pub ban_days: u32,
    #[serde(default)]
    pub note: String,
    /// Authors at or above this forum level are left alone
    #[serde(default)]
    pub min_user_level: Option<u32>,
}

fn default_interval() -> u64 {
    90
}

fn default_blacklist() -> i32 {
    Thresholds::default().blacklist
}

fn default_whitelist() -> i32 {
    Thresholds::default().whitelist
}

fn default_window() -> usize {
    rr_review::DEFAULT_FAN_OUT_WINDOW
}

fn default_op() -> Vec<String> {
    vec!["DELETE".to_owned()]
}

impl Settings {
    /// Reads `<name>.toml` (if present) and the environment.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        Self::build(Config::builder().add_source(File::with_name(name).required(false)))
    }

    pub(crate) fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> anyhow::Result<Self> {
        let settings = builder
            .add_source(
                Environment::with_prefix("REVIEWER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pages"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            blacklist: self.blacklist_threshold,
            whitelist: self.whitelist_threshold,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> Settings {
        Settings::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml))).unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_keys() {
        let settings = parse(r#"forum = "rust""#);
        assert_eq!(settings.interval(), Duration::from_secs(90));
        assert_eq!(settings.thresholds(), Thresholds::default());
        assert_eq!(settings.fan_out_window, 50);
        assert!(settings.pages.is_empty());
        assert!(settings.database_url.is_none());
    }

    #[test]
    fn test_rules_parse() {
        let settings = parse(
            r#"
            forum = "rust"
            pages = [4, 3, 2, 1]

            [[rules]]
            level = "comment"
            keywords = ["buy now"]
            op = ["DELETE", "PARENT"]
            ban_days = 1
            note = "ad"
            "#,
        );
        assert_eq!(settings.pages, vec![4, 3, 2, 1]);
        let rule = &settings.rules[0];
        assert_eq!(rule.level, Level::Comment);
        assert_eq!(rule.op, vec!["DELETE", "PARENT"]);
        assert_eq!(rule.min_user_level, None);
    }

    #[test]
    fn test_example_file_parses() {
        let settings = parse(include_str!("../reviewer.example.toml"));
        assert_eq!(settings.rules.len(), 3);
        assert_eq!(settings.rules[1].min_user_level, Some(7));
        assert!(settings.snapshot_path.is_some());
    }

    #[test]
    fn test_missing_forum_is_an_error() {
        let result = Settings::build(Config::builder().add_source(File::from_str("", FileFormat::Toml)));
        assert!(result.is_err());
    }
}
