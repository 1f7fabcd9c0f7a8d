//! Scene-side model of the traffic-light control system
//!
//! Lights, intersections, the id registry and the [`TrafficSystem`] context
//! that advances them. Nothing here depends on a renderer; the scene is only
//! reached through the traits in [`scene`].

mod arbiter;
mod intersection;
mod registry;
pub mod scene;
mod traffic_light;
mod types;
mod world;

pub use arbiter::PriorityArbiter;
pub use intersection::{Intersection, Phase, PhaseCycle};
pub use registry::{generate_light_id, sanitize_component, Registry, RegistryMap, MANAGER_ID};
pub use scene::{HeadlessScene, SceneHooks, Vehicle};
pub use traffic_light::TrafficLight;
pub use types::{
    ControlMode, IntersectionId, Lamps, LightId, LightKey, ParseEnumError, Position, SimId,
    Status, DEFAULT_GREEN_DURATION, YELLOW_DURATION,
};
pub use world::TrafficSystem;
