//! Intersection logic for the traffic-light control system
//!
//! An intersection groups the lights of its approaches, owns their turning
//! priority queue and runs the automatic phase cycle for them.

use super::arbiter::PriorityArbiter;
use super::types::{IntersectionId, LightKey, Position, Status, YELLOW_DURATION};

/// Where the automatic cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started yet; the first step picks an approach
    Idle,
    Green,
    Yellow,
}

/// Automatic sequencing of an intersection's approaches.
///
/// One approach is green at a time. After its green duration it shows yellow
/// for [`YELLOW_DURATION`], then the next approach gets green. A light waiting
/// in the priority queue goes next, with its turn arrows lit.
#[derive(Debug, Clone)]
pub struct PhaseCycle {
    phase: Phase,
    current: usize,
    timer: f32,
    arrows: bool,
}

impl Default for PhaseCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseCycle {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            current: 0,
            timer: 0.0,
            arrows: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Advance the cycle by `delta_secs`
    pub fn step(
        &mut self,
        delta_secs: f32,
        order: &[LightKey],
        green_duration: impl Fn(LightKey) -> f32,
        eligible: impl Fn(LightKey) -> bool,
        arbiter: &mut PriorityArbiter,
    ) {
        if order.is_empty() {
            self.phase = Phase::Idle;
            return;
        }
        if self.current >= order.len() {
            self.current = 0;
        }

        match self.phase {
            Phase::Idle => {
                match Self::take_priority(order, &eligible, arbiter) {
                    Some(index) => {
                        self.current = index;
                        self.arrows = true;
                    }
                    None => {
                        self.current = 0;
                        self.arrows = false;
                    }
                }
                self.phase = Phase::Green;
                self.timer = 0.0;
            }
            Phase::Green => {
                self.timer += delta_secs;
                if self.timer >= green_duration(order[self.current]) {
                    self.phase = Phase::Yellow;
                    self.timer = 0.0;
                }
            }
            Phase::Yellow => {
                self.timer += delta_secs;
                if self.timer >= YELLOW_DURATION {
                    self.advance(order, &eligible, arbiter);
                }
            }
        }
    }

    fn advance(
        &mut self,
        order: &[LightKey],
        eligible: &impl Fn(LightKey) -> bool,
        arbiter: &mut PriorityArbiter,
    ) {
        match Self::take_priority(order, eligible, arbiter) {
            Some(index) => {
                self.current = index;
                self.arrows = true;
            }
            None => {
                self.current = (self.current + 1) % order.len();
                self.arrows = false;
            }
        }
        self.phase = Phase::Green;
        self.timer = 0.0;
    }

    // Queue entries for lights that are not part of this cycle are dropped.
    // Requests of lights that cannot follow the cycle right now stay queued.
    fn take_priority(
        order: &[LightKey],
        eligible: &impl Fn(LightKey) -> bool,
        arbiter: &mut PriorityArbiter,
    ) -> Option<usize> {
        let foreign: Vec<LightKey> = arbiter.iter().filter(|key| !order.contains(key)).collect();
        for light in foreign {
            arbiter.remove(light);
        }

        let light = arbiter.iter().find(|key| eligible(*key))?;
        arbiter.remove(light);
        order.iter().position(|key| *key == light)
    }

    /// Status and arrow use the cycle wants `light` to show, or `None` before the
    /// cycle has started or for lights outside it
    pub fn expected(&self, order: &[LightKey], light: LightKey) -> Option<(Status, bool)> {
        if self.phase == Phase::Idle || !order.contains(&light) {
            return None;
        }
        let current = *order.get(self.current)?;
        if current != light {
            return Some((Status::Red, true));
        }
        match self.phase {
            Phase::Green => Some((Status::Green, self.arrows)),
            Phase::Yellow => Some((Status::Yellow, self.arrows)),
            Phase::Idle => None,
        }
    }
}

/// An intersection in the scene
#[derive(Debug, Clone)]
pub struct Intersection {
    pub id: IntersectionId,
    pub name: String,
    pub position: Position,
    /// Vehicles skip the "fits across the intersection" check here
    pub ignore_can_fit_across_intersection_check: bool,
    /// Approach lights, in phase order
    pub lights: Vec<LightKey>,
    pub arbiter: PriorityArbiter,
    pub cycle: PhaseCycle,
}

impl Intersection {
    pub fn new(id: IntersectionId, name: impl Into<String>, position: Position) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            ignore_can_fit_across_intersection_check: false,
            lights: Vec::new(),
            arbiter: PriorityArbiter::new(),
            cycle: PhaseCycle::new(),
        }
    }

    pub fn add_light(&mut self, light: LightKey) {
        if !self.lights.contains(&light) {
            self.lights.push(light);
        }
    }

    /// Forget a light, including any pending priority request
    pub fn remove_light(&mut self, light: LightKey) {
        self.lights.retain(|key| *key != light);
        self.arbiter.remove(light);
    }

    /// Advance the automatic cycle.
    ///
    /// `eligible` tells whether a light currently follows the cycle; only those
    /// can be granted a pending priority request.
    pub fn update_cycle(
        &mut self,
        delta_secs: f32,
        green_duration: impl Fn(LightKey) -> f32,
        eligible: impl Fn(LightKey) -> bool,
    ) {
        self.cycle.step(
            delta_secs,
            &self.lights,
            green_duration,
            eligible,
            &mut self.arbiter,
        );
    }

    /// Status the automatic cycle wants `light` to show
    pub fn expected_status(&self, light: LightKey) -> Option<(Status, bool)> {
        self.cycle.expected(&self.lights, light)
    }
}
