//! Status files read by the external controller
//!
//! `traffic_system_status.json` holds every light; `<id>.json` holds a single
//! light. Both are replaced atomically, so a reader never sees a partial file.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::atomic::write_atomic;
use super::config::ApiPaths;
use crate::simulation::{ControlMode, LightId, Position, Status, TrafficLight};

/// Published state of one light
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightSnapshot {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub control_mode: ControlMode,
    pub position: Position,
    /// Intersection name, or `"none"`
    pub intersection: String,
    pub green_duration: f32,
    pub time_since_green: f32,
    pub turn_left_anytime: bool,
    pub manual_override: bool,
    pub manual_status: Status,
}

impl LightSnapshot {
    pub fn capture(id: &LightId, light: &TrafficLight, intersection_name: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: light.name.clone(),
            status: light.status(),
            control_mode: light.control_mode(),
            position: light.position(),
            intersection: intersection_name.unwrap_or("none").to_string(),
            green_duration: light.green_duration,
            time_since_green: light.time_since_green(),
            turn_left_anytime: light.turn_left_anytime,
            manual_override: light.manual_override(),
            manual_status: light.manual_status(),
        }
    }
}

/// Published state of the whole system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub lights: Vec<LightSnapshot>,
    pub total_lights: usize,
    /// Local wall-clock time of the write
    pub timestamp: String,
    pub system_active: bool,
    /// Increases with every write in this process
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct StatusPublisher {
    paths: ApiPaths,
    write_light_files: bool,
    sequence: u64,
}

impl StatusPublisher {
    pub fn new(paths: &ApiPaths, write_light_files: bool) -> Self {
        Self {
            paths: paths.clone(),
            write_light_files,
            sequence: 0,
        }
    }

    pub fn status_file(&self) -> &Path {
        &self.paths.status_file
    }

    /// Number of system snapshots written so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn writes_light_files(&self) -> bool {
        self.write_light_files
    }

    pub fn light_file(&self, id: &str) -> PathBuf {
        self.paths.light_file(id)
    }

    /// Write the system snapshot
    pub fn publish_system(
        &mut self,
        lights: Vec<LightSnapshot>,
        system_active: bool,
    ) -> Result<()> {
        self.sequence += 1;
        let snapshot = SystemSnapshot {
            total_lights: lights.len(),
            lights,
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            system_active,
            sequence: self.sequence,
        };
        let json =
            serde_json::to_vec_pretty(&snapshot).context("Failed to serialize system status")?;
        write_atomic(&self.paths.status_file, &json).context("Failed to write system status")
    }

    /// Write one light's snapshot, if per-light files are enabled
    pub fn publish_light(&self, light: &LightSnapshot) -> Result<()> {
        if !self.write_light_files {
            return Ok(());
        }
        let json = serde_json::to_vec_pretty(light)
            .with_context(|| format!("Failed to serialize status of {}", light.id))?;
        write_atomic(&self.light_file(&light.id), &json)
            .with_context(|| format!("Failed to write status of {}", light.id))
    }

    /// Delete the snapshot file of a light that left the scene
    pub fn remove_light(&self, id: &str) -> Result<()> {
        let path = self.light_file(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}
