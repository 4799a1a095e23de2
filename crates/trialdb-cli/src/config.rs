//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$TRIALDB_CONFIG` environment variable
//! 2. `~/.config/trialdb/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use trialdb_core::{ConflictPolicy, ParserConfig};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub parser: ParserConfig,
}

/// Database storage settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path. Default: platform-specific data dir.
    pub path: Option<String>,
}

/// Batch ingestion settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory scanned for `*.log` files.
    pub log_dir: String,
    /// Only files whose name starts with this prefix are ingested.
    pub pattern: String,
    pub policy: ConflictPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            pattern: String::new(),
            policy: ConflictPolicy::Ignore,
        }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("TRIALDB_CONFIG") {
        return Some(PathBuf::from(p));
    }

    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("trialdb")
            .join("config.toml")
    })
}

/// Show the active config path (for `trialdb config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.store.path.is_none());
        assert_eq!(config.ingest.log_dir, "logs");
        assert_eq!(config.ingest.policy, ConflictPolicy::Ignore);
        assert_eq!(config.parser.outcome_marker, "APP: pmpd");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[ingest]
policy = "merge"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ingest.policy, ConflictPolicy::Merge);
        // Other fields should be defaults
        assert_eq!(config.ingest.log_dir, "logs");
        assert_eq!(config.parser.outcome_marker, "APP: pmpd");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[store]
path = "/tmp/rslts.db"

[ingest]
log_dir = "/data/campaign-3/logs"
pattern = "2_"
policy = "replace"

[parser]
outcome_marker = "RESULT:"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.path.as_deref(), Some("/tmp/rslts.db"));
        assert_eq!(config.ingest.pattern, "2_");
        assert_eq!(config.ingest.policy, ConflictPolicy::Replace);
        assert_eq!(config.parser.outcome_marker, "RESULT:");
    }

    #[test]
    fn test_reject_unknown_policy() {
        let toml_str = r#"
[ingest]
policy = "overwrite"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }
}
