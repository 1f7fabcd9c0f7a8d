//! The traffic-light control system that ties everything together
//!
//! [`TrafficSystem`] is the context object every component is reached
//! through: it owns the lights, intersections, registry, external control
//! channel and any running chaos override, and advances them all in `tick`.

use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::intersection::Intersection;
use super::registry::Registry;
use super::scene::{HeadlessScene, SceneHooks, Vehicle};
use super::traffic_light::TrafficLight;
use super::types::{
    ControlMode, IntersectionId, LightId, LightKey, Position, SimId, Status,
    DEFAULT_GREEN_DURATION,
};
use crate::control::{
    ApiPaths, ChaosOverride, ChaosStep, Command, CommandChannel, ControlConfig, LightCommand,
    LightSnapshot, ManagerCommand, PendingCommand, StatusPublisher, Target,
};

/// File side of the external control protocol
struct ExternalControl {
    channel: CommandChannel,
    publisher: StatusPublisher,
}

/// The traffic-light control system
pub struct TrafficSystem<H: SceneHooks = HeadlessScene> {
    lights: BTreeMap<LightKey, TrafficLight>,
    intersections: BTreeMap<IntersectionId, Intersection>,
    registry: Registry,
    config: ControlConfig,
    /// `None` when external control is off or could not be set up
    control: Option<ExternalControl>,
    chaos: Option<ChaosOverride>,
    hooks: H,

    /// Next ID to assign
    next_id: usize,

    /// Simulation time
    time: f32,
    last_status_update: f32,
    last_command_check: f32,

    /// Optional seed for reproducible chaos runs
    seed: Option<u64>,
    chaos_runs: u64,
    started: bool,
    shut_down: bool,
}

impl TrafficSystem<HeadlessScene> {
    pub fn new(config: ControlConfig) -> Self {
        Self::with_hooks(config, HeadlessScene::new())
    }

    /// Create a system whose chaos runs are reproducible
    pub fn new_with_seed(config: ControlConfig, seed: u64) -> Self {
        let mut system = Self::new(config);
        system.seed = Some(seed);
        system
    }
}

impl<H: SceneHooks> TrafficSystem<H> {
    /// Create a system driving the given scene hooks.
    ///
    /// If the protocol directories cannot be created, external control is
    /// disabled for the session and everything else keeps working.
    pub fn with_hooks(config: ControlConfig, hooks: H) -> Self {
        let control = if !config.enable_api_control {
            info!("API control: disabled");
            None
        } else {
            match config.validate().and_then(|_| ApiPaths::prepare(&config)) {
                Ok(paths) => Some(ExternalControl {
                    channel: CommandChannel::new(paths.commands_dir.clone()),
                    publisher: StatusPublisher::new(&paths, config.write_light_files),
                }),
                Err(e) => {
                    error!("Failed to set up API control, disabling it: {:#}", e);
                    None
                }
            }
        };

        Self {
            lights: BTreeMap::new(),
            intersections: BTreeMap::new(),
            registry: Registry::default(),
            config,
            control,
            chaos: None,
            hooks,
            next_id: 0,
            time: 0.0,
            last_status_update: 0.0,
            last_command_check: 0.0,
            seed: None,
            chaos_runs: 0,
            started: false,
            shut_down: false,
        }
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add an intersection to the scene
    pub fn add_intersection(
        &mut self,
        name: impl Into<String>,
        position: Position,
    ) -> IntersectionId {
        let id = IntersectionId(self.next_sim_id());
        self.intersections
            .insert(id, Intersection::new(id, name, position));
        id
    }

    /// Add a light, optionally as an approach of `intersection`.
    ///
    /// The light gets an external id on the next [`start`](Self::start) or
    /// [`refresh_lights`](Self::refresh_lights).
    pub fn add_light(
        &mut self,
        name: impl Into<String>,
        position: Position,
        intersection: Option<IntersectionId>,
    ) -> LightKey {
        let key = LightKey(self.next_sim_id());
        let intersection = intersection.filter(|id| self.intersections.contains_key(id));
        if let Some(intersection) = intersection.and_then(|id| self.intersections.get_mut(&id)) {
            intersection.add_light(key);
        }
        let light = TrafficLight::new(key, name, position, intersection);
        self.hooks.activate_visual(key, light.lamps());
        self.lights.insert(key, light);
        key
    }

    /// Remove a light from the scene and the registry, then publish.
    ///
    /// Its per-light status file is deleted; its id is never handed out again.
    pub fn remove_light(&mut self, key: LightKey) -> Option<TrafficLight> {
        let light = self.lights.remove(&key)?;
        let id = self.registry.id_of(key).cloned();
        if let Some(intersection) = light
            .intersection()
            .and_then(|id| self.intersections.get_mut(&id))
        {
            intersection.remove_light(key);
        }
        self.registry.refresh(&self.lights, &self.intersections);

        if let (Some(control), Some(id)) = (self.control.as_ref(), id.as_ref()) {
            if let Err(e) = control.publisher.remove_light(id.as_str()) {
                error!("{:#}", e);
            }
        }
        if self.started {
            self.publish_status();
        }
        Some(light)
    }

    /// Discover lights and write the first status snapshot.
    ///
    /// Calling it again only refreshes, so ids stay with their lights.
    pub fn start(&mut self) {
        if self.started {
            self.refresh_lights();
            return;
        }
        self.started = true;
        self.registry.refresh(&self.lights, &self.intersections);
        info!(
            "Traffic system initialized: {} traffic lights, API control {}",
            self.registry.len(),
            if self.control.is_some() { "enabled" } else { "disabled" }
        );
        self.publish_status();
    }

    /// Re-run discovery, then publish
    pub fn refresh_lights(&mut self) {
        self.registry.refresh(&self.lights, &self.intersections);
        self.publish_status();
    }

    pub fn light(&self, key: LightKey) -> Option<&TrafficLight> {
        self.lights.get(&key)
    }

    /// Rename a light. The registry id does not change.
    pub fn rename_light(&mut self, key: LightKey, name: impl Into<String>) -> bool {
        let name = name.into();
        self.update_setup(key, |light| light.name = name)
    }

    /// Let vehicles at this light turn across traffic without priority
    pub fn set_turn_left_anytime(&mut self, key: LightKey, anytime: bool) -> bool {
        self.update_setup(key, |light| light.turn_left_anytime = anytime)
    }

    // Apply a setup change and publish it once the system runs.
    fn update_setup(&mut self, key: LightKey, change: impl FnOnce(&mut TrafficLight)) -> bool {
        let Some(light) = self.lights.get_mut(&key) else {
            return false;
        };
        change(light);
        if self.started {
            self.publish_changes(&[key]);
        }
        true
    }

    pub fn light_by_id(&self, id: &str) -> Option<&TrafficLight> {
        self.registry.lookup(id).and_then(|key| self.lights.get(&key))
    }

    pub fn lights(&self) -> impl Iterator<Item = &TrafficLight> {
        self.lights.values()
    }

    pub fn intersection(&self, id: IntersectionId) -> Option<&Intersection> {
        self.intersections.get(&id)
    }

    pub fn intersection_mut(&mut self, id: IntersectionId) -> Option<&mut Intersection> {
        self.intersections.get_mut(&id)
    }

    pub fn intersections(&self) -> impl Iterator<Item = &Intersection> {
        self.intersections.values()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn id_of(&self, key: LightKey) -> Option<&LightId> {
        self.registry.id_of(key)
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn is_api_enabled(&self) -> bool {
        self.control.is_some()
    }

    pub fn chaos(&self) -> Option<&ChaosOverride> {
        self.chaos.as_ref()
    }

    /// Number of system status snapshots written so far
    pub fn status_sequence(&self) -> u64 {
        self.control
            .as_ref()
            .map(|control| control.publisher.sequence())
            .unwrap_or(0)
    }

    // ---- Transitions -------------------------------------------------

    /// Change a light's status and publish it.
    ///
    /// Returns `false` if the light is unknown or its mode forbids the change.
    pub fn set_status(&mut self, key: LightKey, status: Status, use_turn_arrows: bool) -> bool {
        let applied = self.apply_status(key, status, use_turn_arrows);
        if applied {
            self.publish_changes(&[key]);
        }
        applied
    }

    /// Change who controls a light and publish it
    pub fn set_control_mode(&mut self, key: LightKey, mode: ControlMode) -> bool {
        let applied = self.apply_control_mode(key, mode);
        if applied {
            self.publish_changes(&[key]);
        }
        applied
    }

    /// Set the operator status of a light and arm its manual override
    pub fn set_manual_status(&mut self, key: LightKey, status: Status) -> bool {
        let Some(light) = self.lights.get_mut(&key) else {
            return false;
        };
        light.set_manual_status(status, &mut self.hooks);
        self.publish_changes(&[key]);
        true
    }

    pub fn set_green_duration(&mut self, key: LightKey, duration: f32) -> bool {
        if !(duration.is_finite() && duration > 0.0) {
            return false;
        }
        self.update_setup(key, |light| light.green_duration = duration)
    }

    /// Force every light to API control and red
    pub fn set_all_red(&mut self) {
        self.cancel_chaos();
        let keys = self.registry.snapshot().keys();
        for key in &keys {
            self.apply_control_mode(*key, ControlMode::ApiControlled);
            self.apply_status(*key, Status::Red, false);
        }
        info!("All {} lights set to red", keys.len());
        self.publish_changes(&keys);
    }

    /// Hand every light back to the automatic cycle
    pub fn restore_all(&mut self) {
        self.cancel_chaos();
        let keys = self.registry.snapshot().keys();
        for key in &keys {
            self.apply_control_mode(*key, ControlMode::Automatic);
        }
        info!("All {} lights restored to automatic", keys.len());
        self.publish_changes(&keys);
    }

    fn apply_status(&mut self, key: LightKey, status: Status, use_turn_arrows: bool) -> bool {
        match self.lights.get_mut(&key) {
            Some(light) => light.set_status(status, use_turn_arrows, &mut self.hooks),
            None => false,
        }
    }

    fn apply_control_mode(&mut self, key: LightKey, mode: ControlMode) -> bool {
        match self.lights.get_mut(&key) {
            Some(light) => {
                light.set_control_mode(mode, &mut self.hooks);
                true
            }
            None => false,
        }
    }

    // ---- Chaos -------------------------------------------------------

    /// Flip `lights` to random statuses for `duration` seconds.
    ///
    /// A run already in progress is cancelled (and its lights restored) first.
    /// A duration of zero or less only cancels.
    pub fn start_chaos(&mut self, lights: Vec<LightKey>, duration: f32) {
        self.cancel_chaos();
        if !(duration > 0.0) {
            return;
        }

        let seed = self.seed.map(|seed| seed.wrapping_add(self.chaos_runs));
        self.chaos_runs += 1;
        let interval = self.config.chaos_min_interval..self.config.chaos_max_interval;
        let mut chaos = ChaosOverride::new(lights, duration, interval, seed);
        info!(
            "Chaos mode started: {:.1}s affecting {} lights",
            duration,
            chaos.lights().len()
        );
        let first = chaos.step(0.0);
        self.chaos = Some(chaos);
        self.handle_chaos_step(first);
    }

    /// Chaos over every registered light
    pub fn start_chaos_all(&mut self, duration: f32) {
        let keys = self.registry.snapshot().keys();
        self.start_chaos(keys, duration);
    }

    /// Stop a running chaos run and restore its lights.
    ///
    /// Returns whether a run was active.
    pub fn cancel_chaos(&mut self) -> bool {
        self.finish_chaos("cancelled")
    }

    fn update_chaos(&mut self, delta_secs: f32) {
        let step = match self.chaos.as_mut() {
            Some(chaos) => chaos.step(delta_secs),
            None => return,
        };
        self.handle_chaos_step(step);
    }

    fn handle_chaos_step(&mut self, step: ChaosStep) {
        match step {
            ChaosStep::Burst(assignments) => {
                let mut touched = Vec::with_capacity(assignments.len());
                for (key, status) in assignments {
                    if self.apply_control_mode(key, ControlMode::ApiControlled) {
                        self.apply_status(key, status, false);
                        touched.push(key);
                    }
                }
                self.publish_changes(&touched);
            }
            ChaosStep::Waiting => {}
            ChaosStep::Expired => {
                self.finish_chaos("expired");
            }
        }
    }

    // Taking the run out of `self.chaos` is what makes restoration happen once.
    fn finish_chaos(&mut self, reason: &str) -> bool {
        let Some(chaos) = self.chaos.take() else {
            return false;
        };
        let keys = chaos.lights().to_vec();
        for key in &keys {
            self.apply_control_mode(*key, ControlMode::Automatic);
        }
        info!(
            "Chaos mode {} after {:.1}s and {} bursts: restored {} lights to automatic",
            reason,
            chaos.elapsed(),
            chaos.bursts(),
            keys.len()
        );
        self.publish_changes(&keys);
        true
    }

    // ---- Vehicles ----------------------------------------------------

    /// A vehicle reached the trigger of light `key`.
    ///
    /// The vehicle is told which light it waits on, and the light joins its
    /// intersection's priority queue if the vehicle turns across traffic.
    /// Returns whether the light was queued.
    pub fn vehicle_entered(&mut self, key: LightKey, vehicle: &mut dyn Vehicle) -> bool {
        let Some(light) = self.lights.get(&key) else {
            warn!("Vehicle {} hit unknown light {:?}", vehicle.name(), key);
            return false;
        };
        let id = self
            .registry
            .id_of(key)
            .cloned()
            .unwrap_or_else(|| LightId::new(light.name.clone()));
        debug!(
            "Vehicle hit light: {} hit {} - light status: {}",
            vehicle.name(),
            id,
            light.status()
        );
        vehicle.assign_traffic_light(&id);

        let Some(intersection) = light
            .intersection()
            .and_then(|intersection| self.intersections.get_mut(&intersection))
        else {
            if vehicle.is_turning_across_traffic() && !light.turn_left_anytime {
                warn!("Light {} has no intersection to queue turning priority at", id);
            }
            return false;
        };

        let queued = intersection.arbiter.request_priority(light, &*vehicle);
        if queued {
            debug!(
                "Priority vehicle: {} turning into incoming traffic at {}, queue length {}",
                vehicle.name(),
                intersection.name,
                intersection.arbiter.len()
            );
        }
        queued
    }

    // ---- Tick --------------------------------------------------------

    /// Advance everything by `delta_secs`
    pub fn tick(&mut self, delta_secs: f32) {
        if !self.started {
            self.start();
        }
        self.time += delta_secs;

        for light in self.lights.values_mut() {
            light.update(delta_secs);
        }

        self.update_chaos(delta_secs);
        self.update_intersections(delta_secs);
        self.update_culling();

        if self.control.is_some() {
            if self.time - self.last_status_update >= self.config.status_update_interval {
                self.publish_status();
                self.last_status_update = self.time;
            }
            if self.time - self.last_command_check >= self.config.command_check_interval {
                self.poll_commands();
                self.last_command_check = self.time;
            }
        }
    }

    fn update_intersections(&mut self, delta_secs: f32) {
        let green_durations: HashMap<LightKey, f32> = self
            .lights
            .iter()
            .map(|(key, light)| (*key, light.green_duration))
            .collect();
        let automatic: HashSet<LightKey> = self
            .lights
            .iter()
            .filter(|(_, light)| light.control_mode() == ControlMode::Automatic)
            .map(|(key, _)| *key)
            .collect();

        let mut changes = Vec::new();
        for intersection in self.intersections.values_mut() {
            intersection.update_cycle(
                delta_secs,
                |key| {
                    green_durations
                        .get(&key)
                        .copied()
                        .unwrap_or(DEFAULT_GREEN_DURATION)
                },
                |key| automatic.contains(&key),
            );

            for key in &intersection.lights {
                let (Some(light), Some((status, arrows))) =
                    (self.lights.get(key), intersection.expected_status(*key))
                else {
                    continue;
                };
                let stale = light.status() != status
                    || (arrows && light.lamps().arrow_status() != Some(status));
                if light.control_mode() == ControlMode::Automatic && stale {
                    changes.push((*key, status, arrows));
                }
            }
        }

        let mut touched = Vec::with_capacity(changes.len());
        for (key, status, arrows) in changes {
            if self.apply_status(key, status, arrows) {
                touched.push(key);
            }
        }
        if !touched.is_empty() {
            self.publish_changes(&touched);
        }
    }

    fn update_culling(&mut self) {
        for light in self.lights.values_mut() {
            light.update_culling(&mut self.hooks);
        }
    }

    // ---- External control --------------------------------------------

    /// Apply every new command waiting in the inboxes
    pub fn poll_commands(&mut self) {
        let registry = self.registry.snapshot();
        let pending = match self.control.as_mut() {
            Some(control) => control.channel.poll(&registry),
            None => return,
        };

        for command in pending {
            self.dispatch(&command);
            if let Some(control) = self.control.as_mut() {
                control.channel.acknowledge(&command);
            }
        }
    }

    fn dispatch(&mut self, pending: &PendingCommand) {
        match (&pending.target, pending.command) {
            (Target::Light { key, id }, Command::Light(command)) => {
                let key = *key;
                if !self.lights.contains_key(&key) {
                    warn!("Light {} disappeared before its command could be applied", id);
                    return;
                }
                match command {
                    LightCommand::SetStatus(status) => {
                        self.apply_control_mode(key, ControlMode::ApiControlled);
                        self.apply_status(key, status, false);
                        self.publish_changes(&[key]);
                    }
                    LightCommand::SetMode(mode) => {
                        self.set_control_mode(key, mode);
                    }
                    LightCommand::SetDuration(duration) => {
                        self.set_green_duration(key, duration);
                    }
                    LightCommand::SetManualStatus(status) => {
                        self.set_manual_status(key, status);
                    }
                }
                info!(
                    "API command processed: {} {:?} (timestamp {})",
                    id, command, pending.timestamp
                );
            }
            (Target::Manager, Command::Manager(command)) => {
                match command {
                    ManagerCommand::ChaosMode { duration } => {
                        if duration > 0.0 {
                            self.start_chaos_all(duration);
                        } else if !self.cancel_chaos() {
                            debug!("Ignoring chaos_mode with duration {}", duration);
                        }
                    }
                    ManagerCommand::AllRed => self.set_all_red(),
                    ManagerCommand::RestoreAll => self.restore_all(),
                }
                info!(
                    "API manager command processed: {:?} (timestamp {})",
                    command, pending.timestamp
                );
            }
            (target, command) => {
                warn!("Command {:?} does not fit target {:?}", command, target);
            }
        }
    }

    // ---- Status ------------------------------------------------------

    fn light_snapshot(&self, id: &LightId, key: LightKey) -> Option<LightSnapshot> {
        let light = self.lights.get(&key)?;
        let intersection_name = light
            .intersection()
            .and_then(|id| self.intersections.get(&id))
            .map(|intersection| intersection.name.as_str());
        Some(LightSnapshot::capture(id, light, intersection_name))
    }

    /// Snapshots of every registered light, in registry order
    pub fn snapshots(&self) -> Vec<LightSnapshot> {
        self.registry
            .snapshot()
            .iter()
            .filter_map(|(id, key)| self.light_snapshot(id, key))
            .collect()
    }

    /// Write the system status and every light file
    pub fn publish_status(&mut self) {
        let keys = self.registry.snapshot().keys();
        self.publish_changes(&keys);
    }

    // Writes the system snapshot, plus the light files of `changed`.
    fn publish_changes(&mut self, changed: &[LightKey]) {
        if self.control.is_none() {
            return;
        }
        let lights = self.snapshots();
        let changed_ids: Vec<&str> = changed
            .iter()
            .filter_map(|key| self.registry.id_of(*key))
            .map(LightId::as_str)
            .collect();
        let system_active = !self.shut_down;
        let Some(control) = self.control.as_mut() else {
            return;
        };

        if control.publisher.writes_light_files() {
            for snapshot in lights
                .iter()
                .filter(|snapshot| changed_ids.contains(&snapshot.id.as_str()))
            {
                if let Err(e) = control.publisher.publish_light(snapshot) {
                    error!("{:#}", e);
                }
            }
        }

        if let Err(e) = control.publisher.publish_system(lights, system_active) {
            error!("{:#}", e);
        }
    }

    /// Stop chaos and write a final snapshot marked inactive
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.cancel_chaos();
        self.shut_down = true;
        if self.started {
            self.publish_status();
        }
        info!("Traffic system shut down");
    }

    // ---- Reporting ---------------------------------------------------

    /// Print a summary of the system state
    pub fn print_summary(&self) {
        println!("=== Traffic Light Summary ===");
        println!("Time: {:.2}s", self.time);
        println!(
            "Lights: {}, Intersections: {}, API control: {}",
            self.lights.len(),
            self.intersections.len(),
            if self.is_api_enabled() { "enabled" } else { "disabled" }
        );
        if let Some(chaos) = &self.chaos {
            println!(
                "Chaos: {:.1}/{:.1}s, {} bursts",
                chaos.elapsed(),
                chaos.duration(),
                chaos.bursts()
            );
        }

        println!("--- Intersections ---");
        for intersection in self.intersections.values() {
            let queue: Vec<String> = intersection
                .arbiter
                .iter()
                .map(|key| self.label(key))
                .collect();
            println!(
                "  {}: {} approaches, phase={:?}, priority queue=[{}]",
                intersection.name,
                intersection.lights.len(),
                intersection.cycle.phase(),
                queue.join(", ")
            );
        }

        println!("--- Lights ---");
        for light in self.lights.values() {
            println!(
                "  {:<24} {:<6} mode={:<14} green={:.1}s since_green={:.1}s{}",
                self.label(light.key),
                light.status(),
                light.control_mode(),
                light.green_duration,
                light.time_since_green(),
                if light.manual_override() { " (manual override)" } else { "" }
            );
        }
    }

    fn label(&self, key: LightKey) -> String {
        match self.registry.id_of(key) {
            Some(id) => id.to_string(),
            None => self
                .lights
                .get(&key)
                .map(|light| light.name.clone())
                .unwrap_or_else(|| format!("{:?}", key)),
        }
    }

    /// A small scene: two named intersections and two free-standing lights
    pub fn build_demo_scene(&mut self) {
        let main_st = self.add_intersection("Main St", Position::new(0.0, 0.0, 0.0));
        for (name, x, z) in [
            ("Main St North", 0.0, 8.0),
            ("Main St East", 8.0, 0.0),
            ("Main St South", 0.0, -8.0),
            ("Main St West", -8.0, 0.0),
        ] {
            self.add_light(name, Position::new(x, 3.0, z), Some(main_st));
        }

        let oak_ave = self.add_intersection("Oak Ave", Position::new(60.0, 0.0, 0.0));
        let mut t_end = None;
        for (name, x, z) in [
            ("Oak Ave East", 68.0, 0.0),
            ("Oak Ave West", 52.0, 0.0),
            ("Oak Ave South", 60.0, -8.0),
        ] {
            t_end = Some(self.add_light(name, Position::new(x, 3.0, z), Some(oak_ave)));
        }
        // The end of the T can always turn.
        if let Some(light) = t_end.and_then(|key| self.lights.get_mut(&key)) {
            light.turn_left_anytime = true;
        }
        if let Some(intersection) = self.intersections.get_mut(&oak_ave) {
            intersection.ignore_can_fit_across_intersection_check = true;
        }

        self.add_light("Crosswalk", Position::new(-25.4, 3.0, -40.6), None);
        let ramp = self.add_light("Ramp Meter", Position::new(30.0, 3.0, -12.0), None);
        if let Some(light) = self.lights.get_mut(&ramp) {
            light.green_duration = 3.0;
        }
    }
}

impl<H: SceneHooks> Drop for TrafficSystem<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
