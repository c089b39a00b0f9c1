//! Profiler configuration
//!
//! Values are read once when the engine is built and never change afterwards.
//! Sources, in order: an explicit TOML file, the file named by
//! `JOULER_CONFIG`, built-in defaults.

use crate::error::{ProfilerError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a TOML config file
pub const CONFIG_ENV_VAR: &str = "JOULER_CONFIG";

/// Base file used when a file strategy is selected without a path
pub const DEFAULT_DUMP_PATH: &str = "jouler.txt";

/// Where finalized thread reports go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputStrategy {
    #[default]
    Console,
    File,
    FileAndConsole,
    None,
}

impl OutputStrategy {
    pub fn writes_console(self) -> bool {
        matches!(self, OutputStrategy::Console | OutputStrategy::FileAndConsole)
    }

    pub fn writes_file(self) -> bool {
        matches!(self, OutputStrategy::File | OutputStrategy::FileAndConsole)
    }
}

/// Encoding of per-thread report files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }
}

/// Configuration for the power attribution engine
///
/// # Example
/// ```
/// use jouler::config::ProfilerConfig;
///
/// let config = ProfilerConfig::default();
/// assert_eq!(config.sampling_interval_ms, 10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Sleep between sampler iterations
    ///
    /// Default: 10 ms
    pub sampling_interval_ms: u64,

    /// Nominal CPU power in watts, scaled by each thread's CPU share
    ///
    /// Default: 10.0
    pub power_rating_watts: f64,

    pub output: OutputStrategy,

    /// Base path for per-thread report files, named `<stem>-<tid>.<ext>`
    pub dump_path: Option<PathBuf>,

    pub format: ReportFormat,

    /// Regex patterns of method identities skipped by scoped guards
    pub exclude: Vec<String>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 10,
            power_rating_watts: 10.0,
            output: OutputStrategy::Console,
            dump_path: None,
            format: ReportFormat::Text,
            exclude: Vec::new(),
        }
    }
}

impl ProfilerConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sampling_interval_ms == 0 {
            return Err("sampling_interval_ms must be > 0".to_string());
        }

        if !self.power_rating_watts.is_finite() || self.power_rating_watts < 0.0 {
            return Err(format!(
                "power_rating_watts must be finite and non-negative, got {}",
                self.power_rating_watts
            ));
        }

        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    /// Base path for report files, falling back to [`DEFAULT_DUMP_PATH`]
    pub fn dump_path_or_default(&self) -> PathBuf {
        self.dump_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DUMP_PATH))
    }

    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate().map_err(ProfilerError::Config)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load from `explicit`, else from `JOULER_CONFIG`, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            tracing::debug!(path = %path.display(), "loading config");
            return Self::from_file(path);
        }

        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => {
                let path = PathBuf::from(path);
                tracing::debug!(path = %path.display(), "loading config from {}", CONFIG_ENV_VAR);
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}
