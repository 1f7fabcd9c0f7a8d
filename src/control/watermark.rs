//! Per-inbox record of the newest applied command timestamp

use anyhow::{Context, Result};
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::atomic::write_atomic;
use super::config::WATERMARK_FILE_SUFFIX;

/// Watermarks live in `<commands>/<id>_last_timestamp.txt` as plain integer text.
///
/// They are also cached in memory. The effective watermark is the larger of the
/// two, so a failed write cannot make a command apply twice in one session.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    dir: PathBuf,
    cache: HashMap<String, i64>,
}

impl WatermarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    pub fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", id, WATERMARK_FILE_SUFFIX))
    }

    /// Newest applied timestamp for `id`, if any
    pub fn get(&self, id: &str) -> Option<i64> {
        let cached = self.cache.get(id).copied();
        let persisted = self.read_persisted(id);
        match (cached, persisted) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether a command with `timestamp` was already applied (or superseded)
    pub fn is_applied(&self, id: &str, timestamp: i64) -> bool {
        self.get(id).is_some_and(|watermark| timestamp <= watermark)
    }

    /// Move the watermark forward to `timestamp`. Older timestamps are ignored.
    pub fn advance(&mut self, id: &str, timestamp: i64) -> Result<()> {
        if self.is_applied(id, timestamp) {
            return Ok(());
        }
        self.cache.insert(id.to_string(), timestamp);
        let path = self.path(id);
        write_atomic(&path, timestamp.to_string().as_bytes())
            .with_context(|| format!("Failed to persist watermark for {}", id))
    }

    fn read_persisted(&self, id: &str) -> Option<i64> {
        let path = self.path(id);
        match fs::read_to_string(&path) {
            Ok(text) => match text.trim().parse::<i64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring unreadable watermark {}: {:?}", path.display(), text);
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read watermark {}: {}", path.display(), e);
                None
            }
        }
    }
}
