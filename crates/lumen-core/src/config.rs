//! Session configuration file support.
//!
//! Configuration precedence:
//! 1. CLI arguments (applied by the caller through [`Config::merge`])
//! 2. Environment variables (`LUMEN_WORKSPACE`, `LUMEN_REPORTS_DIR`)
//! 3. Local config file (`./.lumenrc`)
//! 4. Global config file (`~/.lumen/config.toml`)
//! 5. Defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const WORKSPACE_ENV: &str = "LUMEN_WORKSPACE";
pub const REPORTS_DIR_ENV: &str = "LUMEN_REPORTS_DIR";

/// How a directory fingerprint is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Hash names and full file bytes.
    #[default]
    Contents,
    /// Hash names, sizes and modification times only.
    Metadata,
}

/// External metrics viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_program")]
    pub program: String,

    /// Arguments placed before the log root.
    #[serde(default = "default_dashboard_args")]
    pub args: Vec<String>,
}

fn default_dashboard_program() -> String {
    "tensorboard".to_string()
}

fn default_dashboard_args() -> Vec<String> {
    vec!["--logdir".to_string()]
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { program: default_dashboard_program(), args: default_dashboard_args() }
    }
}

/// Values as read from one config file; every field is optional so files can be layered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    #[serde(default)]
    pub reports_dir: Option<PathBuf>,

    #[serde(default)]
    pub default_pipeline: Option<String>,

    #[serde(default)]
    pub default_run_name: Option<String>,

    #[serde(default)]
    pub fingerprint: Option<FingerprintMode>,

    #[serde(default)]
    pub dashboard: Option<DashboardConfig>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub workspace: PathBuf,
    reports_dir: Option<PathBuf>,
    pub default_pipeline: String,
    pub default_run_name: String,
    pub fingerprint: FingerprintMode,
    pub dashboard: DashboardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            reports_dir: None,
            default_pipeline: lumen_training::classification::PIPELINE_ID.to_string(),
            default_run_name: "Experiment 1".to_string(),
            fingerprint: FingerprintMode::Contents,
            dashboard: DashboardConfig::default(),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl ConfigFile {
    /// Load a layer from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Layer read from `LUMEN_WORKSPACE` / `LUMEN_REPORTS_DIR`.
    pub fn from_env() -> Self {
        Self {
            workspace: std::env::var_os(WORKSPACE_ENV).map(PathBuf::from),
            reports_dir: std::env::var_os(REPORTS_DIR_ENV).map(PathBuf::from),
            ..Self::default()
        }
    }
}

impl Config {
    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".lumen").join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".lumenrc")
    }

    /// Discover and load configuration files, then the environment.
    ///
    /// A missing file is skipped; a file that exists but does not parse is an error.
    pub fn discover_and_load() -> ConfigResult<Self> {
        let mut config = Self::default();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            match ConfigFile::load_from_file(&path) {
                Ok(layer) => {
                    tracing::debug!(path = %path.display(), "loaded config layer");
                    config.merge(&layer);
                }
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        config.merge(&ConfigFile::from_env());
        Ok(config)
    }

    /// Values from `layer` override values in `self` if they are Some.
    pub fn merge(&mut self, layer: &ConfigFile) {
        if let Some(ref workspace) = layer.workspace {
            self.workspace.clone_from(workspace);
        }
        if let Some(ref reports_dir) = layer.reports_dir {
            self.reports_dir = Some(reports_dir.clone());
        }
        if let Some(ref pipeline) = layer.default_pipeline {
            self.default_pipeline.clone_from(pipeline);
        }
        if let Some(ref run_name) = layer.default_run_name {
            self.default_run_name.clone_from(run_name);
        }
        if let Some(mode) = layer.fingerprint {
            self.fingerprint = mode;
        }
        if let Some(ref dashboard) = layer.dashboard {
            self.dashboard = dashboard.clone();
        }
    }

    /// Where reports are written: configured dir, else the user's download dir,
    /// else `<workspace>/reports`.
    pub fn reports_dir(&self) -> PathBuf {
        self.reports_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| self.workspace.join("reports"))
    }

    /// Set an explicit reports directory.
    pub fn set_reports_dir(&mut self, dir: PathBuf) {
        self.reports_dir = Some(dir);
    }
}
