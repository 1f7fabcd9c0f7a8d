//! Turning priority for vehicles crossing oncoming traffic
//!
//! Each intersection keeps a FIFO of lights whose waiting vehicle needs to turn
//! across traffic. The automatic cycle grants the next green to the head of it.

use std::collections::VecDeque;

use super::scene::Vehicle;
use super::traffic_light::TrafficLight;
use super::types::LightKey;

#[derive(Debug, Clone, Default)]
pub struct PriorityArbiter {
    queue: VecDeque<LightKey>,
}

impl PriorityArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `light` if its vehicle turns across traffic and the light has no
    /// free turn. A light already in the queue keeps its place.
    ///
    /// Returns whether the light was appended.
    pub fn request_priority(&mut self, light: &TrafficLight, vehicle: &dyn Vehicle) -> bool {
        if !vehicle.is_turning_across_traffic() || light.turn_left_anytime {
            return false;
        }
        self.push(light.key)
    }

    /// Append a light unless it is already queued
    pub fn push(&mut self, light: LightKey) -> bool {
        if self.queue.contains(&light) {
            return false;
        }
        self.queue.push_back(light);
        true
    }

    pub fn peek(&self) -> Option<LightKey> {
        self.queue.front().copied()
    }

    pub fn pop_front(&mut self) -> Option<LightKey> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn contains(&self, light: LightKey) -> bool {
        self.queue.contains(&light)
    }

    /// Drop a light from the queue wherever it is
    pub fn remove(&mut self, light: LightKey) -> bool {
        match self.queue.iter().position(|queued| *queued == light) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = LightKey> + '_ {
        self.queue.iter().copied()
    }
}
