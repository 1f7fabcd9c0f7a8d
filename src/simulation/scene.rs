//! Seams to the parts of the scene this crate does not own
//!
//! Rendering, culling and vehicles live elsewhere. The control system only
//! talks to them through these traits.

use std::collections::HashMap;

use super::types::{Lamps, LightId, LightKey, Position};

/// Scene-side hooks the control system drives
pub trait SceneHooks {
    /// Show the given lamp set on a light head
    fn activate_visual(&mut self, light: LightKey, lamps: &Lamps);

    /// Whether a position is close enough to the camera to be drawn
    fn is_within_view_distance(&self, _position: &Position) -> bool {
        true
    }

    /// Show or hide the mesh of a light head
    fn set_mesh_visible(&mut self, _light: LightKey, _visible: bool) {}
}

/// A vehicle arriving at a light's trigger volume
pub trait Vehicle {
    /// Whether the vehicle's next manoeuvre crosses oncoming traffic
    fn is_turning_across_traffic(&self) -> bool;

    /// Tell the vehicle which light it is now waiting on
    fn assign_traffic_light(&mut self, light: &LightId);

    /// Name used in log output
    fn name(&self) -> &str {
        "vehicle"
    }
}

/// Scene used when running without a renderer
///
/// Remembers the last lamp set and mesh visibility of every light so the
/// headless runner and tests can inspect what would have been drawn.
#[derive(Debug, Clone)]
pub struct HeadlessScene {
    /// Camera position; `None` means everything is in view
    pub camera: Option<Position>,
    /// Distance beyond which light heads are culled
    pub cull_distance: f32,
    lamps: HashMap<LightKey, Lamps>,
    hidden: HashMap<LightKey, bool>,
    activations: usize,
}

impl Default for HeadlessScene {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self {
            camera: None,
            cull_distance: 200.0,
            lamps: HashMap::new(),
            hidden: HashMap::new(),
            activations: 0,
        }
    }

    /// Last lamp set sent to a light, if any
    pub fn lamps(&self, light: LightKey) -> Option<&Lamps> {
        self.lamps.get(&light)
    }

    /// Whether the mesh of a light is currently shown
    pub fn is_mesh_visible(&self, light: LightKey) -> bool {
        !self.hidden.get(&light).copied().unwrap_or(false)
    }

    /// Total number of visual activations so far
    pub fn activations(&self) -> usize {
        self.activations
    }
}

impl SceneHooks for HeadlessScene {
    fn activate_visual(&mut self, light: LightKey, lamps: &Lamps) {
        self.lamps.insert(light, *lamps);
        self.activations += 1;
    }

    fn is_within_view_distance(&self, position: &Position) -> bool {
        match &self.camera {
            Some(camera) => camera.distance(position) <= self.cull_distance,
            None => true,
        }
    }

    fn set_mesh_visible(&mut self, light: LightKey, visible: bool) {
        self.hidden.insert(light, !visible);
    }
}
