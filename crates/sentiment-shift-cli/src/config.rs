//! CLI configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sentiment_shift::MonitorConfig;

use crate::error::{CliError, CliResult};

/// Defaults for the `export` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExportDefaults {
    /// User to export when `--user` is not given.
    pub user: Option<String>,
    /// Inclusive start date, `YYYY-MM-DD`.
    pub from: Option<String>,
    /// Inclusive end date, `YYYY-MM-DD`.
    pub to: Option<String>,
}

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CliConfig {
    /// Engine settings used by `replay`.
    pub monitor: MonitorConfig,
    pub export: ExportDefaults,
}

impl CliConfig {
    /// Load configuration from file. A missing file yields the defaults.
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let config_path = match path {
            Some(p) => Some(PathBuf::from(p)),
            None => Self::default_config_path(),
        };

        match config_path {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> CliResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: CliConfig = toml::from_str(&contents)?;
        config
            .monitor
            .validate()
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// `<config dir>/sentiment-shift/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sentiment-shift").join("config.toml"))
    }
}
