//! Fault-injection run that flips lights to random statuses
//!
//! A [`ChaosOverride`] is a plain value stepped by the tick loop. It never
//! touches lights itself: it says which statuses to force, and the owner
//! restores every affected light to automatic control once the run is taken
//! out of it, whether it expired or was cancelled.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::ops::Range;

use crate::simulation::{LightKey, Status};

/// What the tick loop should do after a step
#[derive(Debug, Clone, PartialEq)]
pub enum ChaosStep {
    /// Force every listed light to API control and the given status
    Burst(Vec<(LightKey, Status)>),
    /// Nothing to do this tick
    Waiting,
    /// The run is over; restore its lights
    Expired,
}

#[derive(Debug, Clone)]
pub struct ChaosOverride {
    lights: Vec<LightKey>,
    duration: f32,
    elapsed: f32,
    until_next_burst: f32,
    interval: Range<f32>,
    bursts: u32,
    rng: StdRng,
}

impl ChaosOverride {
    /// Plan a run over `lights` lasting `duration` seconds.
    ///
    /// Bursts come every `interval` seconds, drawn uniformly. The first one is
    /// due immediately.
    pub fn new(
        lights: Vec<LightKey>,
        duration: f32,
        interval: Range<f32>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            lights,
            duration,
            elapsed: 0.0,
            until_next_burst: 0.0,
            interval,
            bursts: 0,
            rng,
        }
    }

    pub fn lights(&self) -> &[LightKey] {
        &self.lights
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn bursts(&self) -> u32 {
        self.bursts
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Random statuses for every light, and schedule the next burst
    pub fn burst(&mut self) -> Vec<(LightKey, Status)> {
        self.bursts += 1;
        self.until_next_burst = self.next_interval();
        let lights = self.lights.clone();
        lights
            .into_iter()
            .map(|light| {
                let status = *Status::ALL.choose(&mut self.rng).unwrap_or(&Status::Red);
                (light, status)
            })
            .collect()
    }

    /// Advance the run by `delta_secs`
    pub fn step(&mut self, delta_secs: f32) -> ChaosStep {
        if self.is_expired() {
            return ChaosStep::Expired;
        }
        if self.bursts == 0 {
            return ChaosStep::Burst(self.burst());
        }

        self.elapsed += delta_secs;
        if self.is_expired() {
            return ChaosStep::Expired;
        }

        self.until_next_burst -= delta_secs;
        if self.until_next_burst <= 0.0 {
            ChaosStep::Burst(self.burst())
        } else {
            ChaosStep::Waiting
        }
    }

    fn next_interval(&mut self) -> f32 {
        if self.interval.start < self.interval.end {
            self.rng.random_range(self.interval.clone())
        } else {
            self.interval.start
        }
    }
}
