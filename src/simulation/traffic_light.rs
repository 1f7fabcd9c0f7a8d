//! Per-light state machine
//!
//! A light's displayed status is only ever written by [`TrafficLight::set_status`].
//! The control mode decides whether that write is allowed.

use log::debug;

use super::intersection::Intersection;
use super::scene::SceneHooks;
use super::types::{
    ControlMode, IntersectionId, Lamps, LightKey, Position, Status, DEFAULT_GREEN_DURATION,
};

/// A single traffic light controlling one approach
#[derive(Debug, Clone)]
pub struct TrafficLight {
    pub key: LightKey,
    pub name: String,
    status: Status,
    control_mode: ControlMode,
    manual_override: bool,
    manual_status: Status,
    /// Target green phase length consulted by the automatic cycle
    pub green_duration: f32,
    time_since_green: f32,
    /// Vehicles may turn across traffic here without waiting for an arrow
    pub turn_left_anytime: bool,
    position: Position,
    intersection: Option<IntersectionId>,
    lamps: Lamps,
    mesh_visible: bool,
}

impl TrafficLight {
    pub fn new(
        key: LightKey,
        name: impl Into<String>,
        position: Position,
        intersection: Option<IntersectionId>,
    ) -> Self {
        let status = Status::Green;
        Self {
            key,
            name: name.into(),
            status,
            control_mode: ControlMode::Automatic,
            manual_override: false,
            manual_status: Status::Red,
            green_duration: DEFAULT_GREEN_DURATION,
            time_since_green: 0.0,
            turn_left_anytime: false,
            position,
            intersection,
            lamps: Lamps::initial(status),
            mesh_visible: true,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn manual_override(&self) -> bool {
        self.manual_override
    }

    pub fn manual_status(&self) -> Status {
        self.manual_status
    }

    pub fn time_since_green(&self) -> f32 {
        self.time_since_green
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn intersection(&self) -> Option<IntersectionId> {
        self.intersection
    }

    pub fn lamps(&self) -> &Lamps {
        &self.lamps
    }

    pub fn is_mesh_visible(&self) -> bool {
        self.mesh_visible
    }

    /// Whether a status change would currently be applied.
    ///
    /// Manual mode without an override freezes the light.
    pub fn accepts_status_changes(&self) -> bool {
        match self.control_mode {
            ControlMode::Automatic | ControlMode::ApiControlled => true,
            ControlMode::Manual => self.manual_override,
        }
    }

    /// Switch the displayed status.
    ///
    /// Returns `false` without touching anything when the control mode forbids it.
    pub fn set_status(
        &mut self,
        status: Status,
        use_turn_arrows: bool,
        hooks: &mut dyn SceneHooks,
    ) -> bool {
        if !self.accepts_status_changes() {
            debug!(
                "Ignoring status {} for {}: {} mode without override",
                status, self.name, self.control_mode
            );
            return false;
        }

        debug!(
            "Traffic light change: {} {} -> {} (arrows: {}, mode: {})",
            self.name, self.status, status, use_turn_arrows, self.control_mode
        );

        self.status = status;
        if status != Status::Green {
            self.time_since_green = 0.0;
        }
        self.lamps = self.lamps.switched(status, use_turn_arrows);
        hooks.activate_visual(self.key, &self.lamps);
        true
    }

    /// Change who controls the light. Always allowed.
    ///
    /// Entering manual mode with an override already set shows the manual status at once.
    pub fn set_control_mode(&mut self, mode: ControlMode, hooks: &mut dyn SceneHooks) {
        if mode != self.control_mode {
            debug!("Control mode: {} {} -> {}", self.name, self.control_mode, mode);
        }
        self.control_mode = mode;
        if mode == ControlMode::Manual && self.manual_override {
            self.set_status(self.manual_status, false, hooks);
        }
    }

    /// Set the operator's status and arm the manual override.
    ///
    /// Returns whether the status was applied right away (only in manual mode).
    pub fn set_manual_status(&mut self, status: Status, hooks: &mut dyn SceneHooks) -> bool {
        self.manual_status = status;
        self.manual_override = true;
        if self.control_mode == ControlMode::Manual {
            self.set_status(status, false, hooks)
        } else {
            false
        }
    }

    /// Advance the green timer
    pub fn update(&mut self, delta_secs: f32) {
        if self.status == Status::Green {
            self.time_since_green += delta_secs;
        } else {
            self.time_since_green = 0.0;
        }
    }

    /// Hide the light head when it is out of view
    pub fn update_culling(&mut self, hooks: &mut dyn SceneHooks) {
        let visible = hooks.is_within_view_distance(&self.position);
        if visible != self.mesh_visible {
            self.mesh_visible = visible;
            hooks.set_mesh_visible(self.key, visible);
        }
    }

    pub fn ignore_can_fit_across_intersection_check(
        &self,
        intersection: Option<&Intersection>,
    ) -> bool {
        match intersection {
            Some(intersection) if Some(intersection.id) == self.intersection => {
                intersection.ignore_can_fit_across_intersection_check
            }
            _ => false,
        }
    }
}
