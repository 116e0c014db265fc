use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use config::{Config, Environment, File};
use derive_more::Display;
use directories::ProjectDirs;
use eyre::{Result, anyhow};
use serde::Deserialize;

use crate::correlate::AlignmentPolicy;
use crate::sampler::SamplerConfig;
use crate::table::TraceFormat;

const CONFIG_FILE: &str = "config.toml";
const LOCAL_DIR: &str = ".mempeak";
const DEFAULT_CONFIG: &str = include_str!("../../default_config.toml");

pub static PROJECT_DIR: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("org", "mempeak", "mempeak"));

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MempeakConfig {
    pub trace: TraceConfig,
    pub intervals: IntervalsConfig,
    pub sampler: SamplerConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceConfig {
    pub path: Utf8PathBuf,
    pub format: TraceFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntervalsConfig {
    pub path: Utf8PathBuf,
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    #[display("text")]
    Text,
    #[display("json")]
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReportConfig {
    /// `-` writes to stdout
    pub output: String,
    pub format: ReportFormat,
    pub alignment: AlignmentPolicy,
}

impl MempeakConfig {
    /// Load the embedded defaults, then the user config, local `.mempeak`
    /// directories and finally `MEMPEAK_*` environment variables.
    pub fn new(force_default_config: bool) -> Result<Self> {
        let local_dirs = if force_default_config {
            vec![]
        } else {
            find_local_configs()
        };
        Self::layered(force_default_config, &local_dirs)
    }

    fn layered(force_default_config: bool, local_dirs: &[PathBuf]) -> Result<Self> {
        let config = Config::builder().add_source(File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ));

        let config = if force_default_config {
            config
        } else {
            let config = match &*PROJECT_DIR {
                Some(proj_dirs) => config.add_source(
                    File::from(proj_dirs.config_dir().join(CONFIG_FILE)).required(false),
                ),
                None => config,
            };

            // Most top-level first so that closer directories win
            local_dirs
                .iter()
                .fold(config, |c, p| {
                    c.add_source(File::from(p.join(CONFIG_FILE)).required(false))
                })
                .add_source(
                    Environment::with_prefix("mempeak")
                        .prefix_separator("_")
                        .separator("__")
                        .try_parsing(true),
                )
        };

        config
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow!("Failed to parse config {e}"))
    }

    pub fn new_from_toml(config: &str) -> Result<Self> {
        Ok(toml::from_str(config)?)
    }
}

/// Paths named `item` in `start` and its ancestors, stopping at `end`.
/// The closest match comes first.
pub fn search_upward(
    start: impl AsRef<Path>,
    end: impl AsRef<Path>,
    item: impl AsRef<Path>,
) -> Vec<PathBuf> {
    start
        .as_ref()
        .ancestors()
        .take_while(|p| p.starts_with(end.as_ref()))
        .map(|p| p.join(&item))
        .filter(|p| p.try_exists().is_ok_and(std::convert::identity))
        .collect()
}

/// `.mempeak` directories from the working directory up to the root, most
/// top-level first. Empty if the working directory is unavailable.
fn find_local_configs() -> Vec<PathBuf> {
    match std::env::current_dir() {
        Ok(dir) => search_upward(dir, "/", LOCAL_DIR)
            .into_iter()
            .filter(|p| p.is_dir())
            .rev()
            .collect(),
        Err(_) => vec![],
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn embedded_defaults_match_code_defaults() {
        let config = MempeakConfig::new_from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.trace.format, TraceFormat::default());
        assert_eq!(config.sampler, SamplerConfig::default());
        assert_eq!(config.trace.path, "Profiling.csv");
        assert_eq!(config.intervals.path, "Profiling-Time.txt");
        assert_eq!(config.report.output, "Profiling-Stats.txt");
        assert_eq!(config.report.format, ReportFormat::Text);
        assert_eq!(config.report.alignment, AlignmentPolicy::Skip);
    }

    #[test]
    fn forced_defaults_load() {
        let config = MempeakConfig::new(true).unwrap();
        assert_eq!(config, MempeakConfig::new_from_toml(DEFAULT_CONFIG).unwrap());
    }

    #[test]
    fn closer_local_config_wins() {
        let root = tempfile::tempdir().unwrap();
        let outer = root.path().join(LOCAL_DIR);
        let inner_dir = root.path().join("project");
        let inner = inner_dir.join(LOCAL_DIR);
        fs::create_dir_all(&outer).unwrap();
        fs::create_dir_all(&inner).unwrap();
        fs::write(
            outer.join(CONFIG_FILE),
            "[report]\nalignment = \"abort\"\nformat = \"json\"\n",
        )
        .unwrap();
        fs::write(inner.join(CONFIG_FILE), "[report]\nformat = \"text\"\n").unwrap();

        let found: Vec<PathBuf> = search_upward(&inner_dir, root.path(), LOCAL_DIR)
            .into_iter()
            .rev()
            .collect();
        assert_eq!(found, vec![outer.clone(), inner.clone()]);

        let config = MempeakConfig::layered(false, &found).unwrap();
        assert_eq!(config.report.alignment, AlignmentPolicy::Abort);
        assert_eq!(config.report.format, ReportFormat::Text);
        assert_eq!(config.sampler.program, "nvidia-smi");
    }

    #[test]
    fn search_stops_at_end() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join(LOCAL_DIR)).unwrap();
        let nested = root.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        assert!(search_upward(&nested, root.path().join("a"), LOCAL_DIR).is_empty());
        assert_eq!(search_upward(&nested, root.path(), LOCAL_DIR).len(), 1);
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let broken = DEFAULT_CONFIG.replace("alignment = \"skip\"", "alignment = \"sometimes\"");
        assert!(MempeakConfig::new_from_toml(&broken).is_err());
    }
}
