//! Settings for the external control protocol

use anyhow::{ensure, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// External control settings.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControlConfig {
    /// Poll commands and publish status at all
    pub enable_api_control: bool,
    pub base_dir: PathBuf,
    pub status_file_name: String,
    /// Command inbox directory, relative to `base_dir`
    pub commands_dir: String,
    /// Seconds between periodic status writes
    pub status_update_interval: f32,
    /// Seconds between command polls
    pub command_check_interval: f32,
    /// Also write one snapshot file per light
    pub write_light_files: bool,
    pub chaos_min_interval: f32,
    pub chaos_max_interval: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enable_api_control: true,
            base_dir: Self::default_base_dir(),
            status_file_name: "traffic_system_status.json".to_string(),
            commands_dir: "commands".to_string(),
            status_update_interval: 0.5,
            command_check_interval: 0.1,
            write_light_files: true,
            chaos_min_interval: 0.5,
            chaos_max_interval: 2.0,
        }
    }
}

impl ControlConfig {
    #[cfg(windows)]
    pub fn default_base_dir() -> PathBuf {
        PathBuf::from("C:/temp/traffic-system")
    }

    #[cfg(not(windows))]
    pub fn default_base_dir() -> PathBuf {
        PathBuf::from("/tmp/traffic-system")
    }

    /// Default settings rooted at `base_dir`
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Read settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.status_update_interval >= 0.0,
            "statusUpdateInterval must not be negative"
        );
        ensure!(
            self.command_check_interval >= 0.0,
            "commandCheckInterval must not be negative"
        );
        ensure!(
            self.chaos_min_interval > 0.0 && self.chaos_min_interval <= self.chaos_max_interval,
            "chaos interval must satisfy 0 < chaosMinInterval <= chaosMaxInterval"
        );
        ensure!(!self.status_file_name.is_empty(), "statusFileName must not be empty");
        Ok(())
    }

    pub fn status_path(&self) -> PathBuf {
        self.base_dir.join(&self.status_file_name)
    }

    pub fn commands_path(&self) -> PathBuf {
        self.base_dir.join(&self.commands_dir)
    }
}

/// Directories of the protocol, known to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPaths {
    pub base_dir: PathBuf,
    pub status_file: PathBuf,
    pub commands_dir: PathBuf,
}

impl ApiPaths {
    /// Create the base and command directories
    pub fn prepare(config: &ControlConfig) -> Result<Self> {
        ensure!(
            !config.base_dir.as_os_str().is_empty(),
            "Base directory is empty"
        );
        let paths = Self {
            base_dir: config.base_dir.clone(),
            status_file: config.status_path(),
            commands_dir: config.commands_path(),
        };
        fs::create_dir_all(&paths.base_dir)
            .with_context(|| format!("Failed to create {}", paths.base_dir.display()))?;
        fs::create_dir_all(&paths.commands_dir)
            .with_context(|| format!("Failed to create {}", paths.commands_dir.display()))?;
        info!(
            "API paths: status={}, commands={}",
            paths.status_file.display(),
            paths.commands_dir.display()
        );
        Ok(paths)
    }

    pub fn command_file(&self, id: &str) -> PathBuf {
        self.commands_dir.join(format!("{}{}", id, COMMAND_FILE_SUFFIX))
    }

    pub fn watermark_file(&self, id: &str) -> PathBuf {
        self.commands_dir.join(format!("{}{}", id, WATERMARK_FILE_SUFFIX))
    }

    /// Per-light snapshot file. Ids already start with `light_`.
    pub fn light_file(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", id))
    }
}

pub const COMMAND_FILE_SUFFIX: &str = "_command.json";
pub const WATERMARK_FILE_SUFFIX: &str = "_last_timestamp.txt";
