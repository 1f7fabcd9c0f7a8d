//! Commands sent by the external controller
//!
//! [`CommandFile`] is exactly what sits in a `*_command.json` file. It is
//! turned into a typed [`Command`] before anything is applied, so a command
//! that fails to parse is never partially applied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::simulation::{ControlMode, ParseEnumError, Status};

/// On-disk command payload. Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandFile {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub duration: f32,
    /// Strictly increasing per writer; the only ordering key
    pub timestamp: i64,
}

impl CommandFile {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetStatus,
    SetMode,
    SetDuration,
    SetManualStatus,
    ChaosMode,
    AllRed,
    RestoreAll,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SetStatus => "set_status",
            Action::SetMode => "set_mode",
            Action::SetDuration => "set_duration",
            Action::SetManualStatus => "set_manual_status",
            Action::ChaosMode => "chaos_mode",
            Action::AllRed => "all_red",
            Action::RestoreAll => "restore_all",
        }
    }

    /// Actions understood by the `manager` inbox rather than a light's
    pub fn is_manager_action(&self) -> bool {
        matches!(self, Action::ChaosMode | Action::AllRed | Action::RestoreAll)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "set_status" => Ok(Action::SetStatus),
            "set_mode" => Ok(Action::SetMode),
            "set_duration" => Ok(Action::SetDuration),
            "set_manual_status" => Ok(Action::SetManualStatus),
            "chaos_mode" => Ok(Action::ChaosMode),
            "all_red" => Ok(Action::AllRed),
            "restore_all" => Ok(Action::RestoreAll),
            _ => Err(CommandError::UnknownAction(s.to_string())),
        }
    }
}

/// Why a command was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("action {0} needs a {1} field")]
    MissingField(Action, &'static str),
    #[error(transparent)]
    InvalidValue(#[from] ParseEnumError),
    #[error("invalid duration {0} for {1}")]
    InvalidDuration(f32, Action),
    #[error("action {0} is not valid for {1}")]
    WrongTarget(Action, &'static str),
}

/// A command addressed to a single light
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightCommand {
    /// Take the light under API control and show `Status`
    SetStatus(Status),
    SetMode(ControlMode),
    /// New green duration, in seconds
    SetDuration(f32),
    SetManualStatus(Status),
}

/// A command addressed to the whole system
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManagerCommand {
    /// Start chaos for `duration` seconds; zero or less cancels a running one
    ChaosMode { duration: f32 },
    AllRed,
    RestoreAll,
}

impl LightCommand {
    pub fn parse(file: &CommandFile) -> Result<Self, CommandError> {
        let action: Action = file.action.parse()?;
        match action {
            Action::SetStatus => Ok(LightCommand::SetStatus(required_status(file, action)?)),
            Action::SetManualStatus => {
                Ok(LightCommand::SetManualStatus(required_status(file, action)?))
            }
            Action::SetMode => {
                let mode = file
                    .mode
                    .as_deref()
                    .ok_or(CommandError::MissingField(action, "mode"))?;
                Ok(LightCommand::SetMode(mode.parse()?))
            }
            Action::SetDuration => {
                if file.duration.is_finite() && file.duration > 0.0 {
                    Ok(LightCommand::SetDuration(file.duration))
                } else {
                    Err(CommandError::InvalidDuration(file.duration, action))
                }
            }
            other => Err(CommandError::WrongTarget(other, "a light")),
        }
    }
}

impl ManagerCommand {
    pub fn parse(file: &CommandFile) -> Result<Self, CommandError> {
        let action: Action = file.action.parse()?;
        match action {
            Action::ChaosMode => {
                if file.duration.is_nan() {
                    return Err(CommandError::InvalidDuration(file.duration, action));
                }
                Ok(ManagerCommand::ChaosMode {
                    duration: file.duration,
                })
            }
            Action::AllRed => Ok(ManagerCommand::AllRed),
            Action::RestoreAll => Ok(ManagerCommand::RestoreAll),
            other => Err(CommandError::WrongTarget(other, "the manager")),
        }
    }
}

fn required_status(file: &CommandFile, action: Action) -> Result<Status, CommandError> {
    let status = file
        .status
        .as_deref()
        .ok_or(CommandError::MissingField(action, "status"))?;
    Ok(status.parse()?)
}

/// A parsed command together with its target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Light(LightCommand),
    Manager(ManagerCommand),
}
