//! Core types for the traffic-light control system
//!
//! These are standalone types that don't depend on any scene or renderer.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A unique identifier for scene entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimId(pub usize);

/// A wrapper type for intersection IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntersectionId(pub SimId);

/// Scene-internal handle of a traffic light.
///
/// Keys are handed out in creation order, which is also the registry's scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightKey(pub SimId);

/// The textual identifier the registry assigns to a light.
///
/// This is the name external controllers use in command file names and status output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LightId(String);

impl LightId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for LightId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A 3D position in the scene
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Error returned when a free-form status or mode string does not name a variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Lower-cases and unifies separators so `API_CONTROLLED`, `api-controlled`
/// and `Api Controlled` all compare equal.
fn normalize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Displayed phase of a traffic light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Green,
    Yellow,
    Red,
}

impl Status {
    /// Every phase, in the order chaos mode samples from
    pub const ALL: [Status; 3] = [Status::Red, Status::Yellow, Status::Green];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Green => "green",
            Status::Yellow => "yellow",
            Status::Red => "red",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "green" => Ok(Status::Green),
            "yellow" => Ok(Status::Yellow),
            "red" => Ok(Status::Red),
            _ => Err(ParseEnumError {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// Who is allowed to change a light's displayed status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Driven by the intersection's own phase cycle
    Automatic,
    /// Frozen unless an operator has set a manual override
    Manual,
    /// Driven by the external controller
    ApiControlled,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::Automatic => "automatic",
            ControlMode::Manual => "manual",
            ControlMode::ApiControlled => "api_controlled",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "automatic" => Ok(ControlMode::Automatic),
            "manual" => Ok(ControlMode::Manual),
            "api_controlled" => Ok(ControlMode::ApiControlled),
            _ => Err(ParseEnumError {
                kind: "control mode",
                value: s.to_string(),
            }),
        }
    }
}

/// The six lamp indicators of a light head
///
/// Exactly one of the main lamps is lit. The turn arrows only change when a
/// transition asks for them, so they keep showing the last arrow phase otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lamps {
    pub red: bool,
    pub yellow: bool,
    pub green: bool,
    pub red_arrow: bool,
    pub yellow_arrow: bool,
    pub green_arrow: bool,
}

impl Lamps {
    /// Lamps of a freshly placed light: its main lamp and the red arrow
    pub fn initial(status: Status) -> Self {
        let mut lamps = Self {
            red_arrow: true,
            ..Self::default()
        };
        lamps.light_main(status);
        lamps
    }

    /// Lamps after switching to `status`
    pub fn switched(mut self, status: Status, use_turn_arrows: bool) -> Self {
        self.light_main(status);
        if use_turn_arrows {
            self.red_arrow = status == Status::Red;
            self.yellow_arrow = status == Status::Yellow;
            self.green_arrow = status == Status::Green;
        }
        self
    }

    fn light_main(&mut self, status: Status) {
        self.red = status == Status::Red;
        self.yellow = status == Status::Yellow;
        self.green = status == Status::Green;
    }

    /// The status shown by the main lamps, if exactly one is lit
    pub fn main_status(&self) -> Option<Status> {
        match (self.red, self.yellow, self.green) {
            (true, false, false) => Some(Status::Red),
            (false, true, false) => Some(Status::Yellow),
            (false, false, true) => Some(Status::Green),
            _ => None,
        }
    }

    /// The status shown by the turn arrows, if exactly one is lit
    pub fn arrow_status(&self) -> Option<Status> {
        match (self.red_arrow, self.yellow_arrow, self.green_arrow) {
            (true, false, false) => Some(Status::Red),
            (false, true, false) => Some(Status::Yellow),
            (false, false, true) => Some(Status::Green),
            _ => None,
        }
    }
}

/// Time a light shows yellow before the automatic cycle moves on, in seconds
pub const YELLOW_DURATION: f32 = 2.0;

/// Default green phase length, in seconds
pub const DEFAULT_GREEN_DURATION: f32 = 5.0;
