//! Command inboxes shared with the external controller
//!
//! Every light has an inbox `<commands>/<id>_command.json`, and the whole
//! system has one more under the reserved id `manager`. The controller
//! overwrites an inbox file whenever it wants something done; polling the same
//! file again is harmless because the watermark check drops anything at or
//! below the newest applied timestamp.

use log::{error, warn};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::command::{Command, CommandFile, LightCommand, ManagerCommand};
use super::config::COMMAND_FILE_SUFFIX;
use super::watermark::WatermarkStore;
use crate::simulation::{LightId, LightKey, RegistryMap, MANAGER_ID};

/// Who a command is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Light { key: LightKey, id: LightId },
    Manager,
}

/// A command that passed every check and still has to be applied
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    /// Inbox the command came from
    pub inbox: String,
    pub target: Target,
    pub command: Command,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct CommandChannel {
    commands_dir: PathBuf,
    watermarks: WatermarkStore,
    // Content hash of the last malformed payload reported per inbox
    reported_malformed: HashMap<String, u64>,
    // Timestamp of the last unknown-id command reported per inbox
    reported_unknown: HashMap<String, i64>,
}

impl CommandChannel {
    pub fn new(commands_dir: impl Into<PathBuf>) -> Self {
        let commands_dir = commands_dir.into();
        Self {
            watermarks: WatermarkStore::new(commands_dir.clone()),
            commands_dir,
            reported_malformed: HashMap::new(),
            reported_unknown: HashMap::new(),
        }
    }

    pub fn commands_dir(&self) -> &Path {
        &self.commands_dir
    }

    pub fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    /// Inbox ids that currently have a command file, sorted
    pub fn inboxes(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.commands_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Failed to check API commands in {}: {}",
                    self.commands_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut inboxes: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .filter_map(|name| name.strip_suffix(COMMAND_FILE_SUFFIX).map(str::to_string))
            .filter(|inbox| !inbox.is_empty())
            .collect();
        inboxes.sort();
        inboxes
    }

    /// Read every inbox and return the commands that still need applying
    pub fn poll(&mut self, registry: &RegistryMap) -> Vec<PendingCommand> {
        self.inboxes()
            .into_iter()
            .filter_map(|inbox| self.poll_inbox(&inbox, registry))
            .collect()
    }

    /// Read one inbox.
    ///
    /// Returns `None` when there is nothing new to apply. Malformed files and
    /// unknown ids are reported once and left for the controller to replace.
    pub fn poll_inbox(&mut self, inbox: &str, registry: &RegistryMap) -> Option<PendingCommand> {
        let path = self
            .commands_dir
            .join(format!("{}{}", inbox, COMMAND_FILE_SUFFIX));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read command file {}: {}", path.display(), e);
                return None;
            }
        };
        if text.trim().is_empty() {
            return None;
        }

        let file = match CommandFile::from_json(&text) {
            Ok(file) => {
                self.reported_malformed.remove(inbox);
                file
            }
            Err(e) => {
                let digest = content_hash(&text);
                if self.reported_malformed.insert(inbox.to_string(), digest) != Some(digest) {
                    warn!("Discarding malformed command file {}: {}", path.display(), e);
                }
                return None;
            }
        };

        if self.watermarks.is_applied(inbox, file.timestamp) {
            return None;
        }

        let target = if inbox == MANAGER_ID {
            Target::Manager
        } else if let Some(key) = registry.lookup(inbox) {
            Target::Light {
                key,
                id: LightId::new(inbox),
            }
        } else {
            if self.reported_unknown.insert(inbox.to_string(), file.timestamp)
                != Some(file.timestamp)
            {
                warn!("Unknown light id in command: {}", inbox);
            }
            return None;
        };

        let parsed = match target {
            Target::Manager => ManagerCommand::parse(&file).map(Command::Manager),
            Target::Light { .. } => LightCommand::parse(&file).map(Command::Light),
        };

        match parsed {
            Ok(command) => Some(PendingCommand {
                inbox: inbox.to_string(),
                target,
                command,
                timestamp: file.timestamp,
            }),
            Err(e) => {
                warn!(
                    "Discarding command {} for {}: {}",
                    file.timestamp, inbox, e
                );
                self.record(inbox, file.timestamp);
                None
            }
        }
    }

    /// Mark a command as applied. Call only after it was dispatched.
    pub fn acknowledge(&mut self, pending: &PendingCommand) {
        self.record(&pending.inbox, pending.timestamp);
    }

    fn record(&mut self, inbox: &str, timestamp: i64) {
        if let Err(e) = self.watermarks.advance(inbox, timestamp) {
            error!("{:#}", e);
        }
    }
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
