//! Configuration loading and parsing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
///
/// Every section is optional; command line flags override what is set here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// State-change logs (JSON lines), merged by time
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Name shown for the trace root; defaults to the first file's stem
    pub trace_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    pub start: Option<i64>,
    pub end: Option<i64>,
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    /// Entity ids to report on; empty selects every entity
    #[serde(default)]
    pub selected: Vec<i64>,
    /// Add the selection breakdown to the statistics tree
    #[serde(default)]
    pub filtered: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            resolution: default_resolution(),
            selected: Vec::new(),
            filtered: false,
        }
    }
}

fn default_resolution() -> usize {
    100
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Write the report here instead of stdout
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatisticsConfig {
    /// How long views wait for the input to finish loading
    #[serde(default = "default_timeout")]
    pub wait_timeout_ms: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    10_000
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.query.resolution == 0 {
        anyhow::bail!("Invalid config {:?}: query.resolution must be at least 1", path);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            files = ["exchange.jsonl"]

            [query]
            start = 100
            end = 500
            selected = [3, 4]

            [output]
            format = "json"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.files.len(), 1);
        assert_eq!(config.query.start, Some(100));
        assert_eq!(config.query.resolution, 100);
        assert_eq!(config.query.selected, vec![3, 4]);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.statistics.wait_timeout_ms, 10_000);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.input.files.is_empty());
        assert_eq!(config.output.format, OutputFormat::Txt);
        assert!(!config.query.filtered);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[statistics]\nwait_timeout_ms = 250").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.statistics.wait_timeout_ms, 250);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[query]\nresolution = 0").unwrap();
        assert!(load_config(bad.path()).is_err());
        assert!(load_config(Path::new("/nonexistent/config.toml")).is_err());
    }
}
