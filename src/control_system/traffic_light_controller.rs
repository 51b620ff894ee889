use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::SimConfig;
use crate::geometry::Direction;
use crate::shared_data::lock;
use crate::simulation_engine::intersections::{Intersection, IntersectionId};
use crate::simulation_engine::traffic_light::{LightState, TrafficLight};
use crate::simulation_engine::vehicles::CarId;

/// Signal phase of an intersection. Exactly one opposing pair is non-red in every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    GreenNs,
    YellowNs,
    GreenEw,
    YellowEw,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::GreenNs => Phase::YellowNs,
            Phase::YellowNs => Phase::GreenEw,
            Phase::GreenEw => Phase::YellowEw,
            Phase::YellowEw => Phase::GreenNs,
        }
    }

    pub fn is_green(self) -> bool {
        matches!(self, Phase::GreenNs | Phase::GreenEw)
    }

    /// True when the NORTH/SOUTH pair is the one holding green or yellow.
    pub fn serves_vertical(self) -> bool {
        matches!(self, Phase::GreenNs | Phase::YellowNs)
    }

    pub fn light_for(self, direction: Direction) -> LightState {
        if direction.is_vertical() != self.serves_vertical() {
            LightState::Red
        } else if self.is_green() {
            LightState::Green
        } else {
            LightState::Yellow
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::GreenNs => "GREEN_NS",
            Phase::YellowNs => "YELLOW_NS",
            Phase::GreenEw => "GREEN_EW",
            Phase::YellowEw => "YELLOW_EW",
        };
        f.write_str(name)
    }
}

/// Adaptive green timing plus the fixed yellow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalTiming {
    pub base_green: Duration,
    pub min_green: Duration,
    pub max_green: Duration,
    pub per_car_increment: Duration,
    pub yellow: Duration,
}

impl Default for SignalTiming {
    fn default() -> Self {
        SimConfig::default().signal_timing()
    }
}

impl SignalTiming {
    /// `clamp(base + waiting * per_car, min, max)`. Never panics, even if min > max.
    pub fn green_for(&self, waiting: usize) -> Duration {
        let cars = u32::try_from(waiting).unwrap_or(u32::MAX);
        let extended = self
            .base_green
            .saturating_add(self.per_car_increment.saturating_mul(cars));
        extended.max(self.min_green).min(self.max_green)
    }
}

/// Owns the four signal faces of one intersection and their phase machine.
#[derive(Debug, Clone)]
pub struct IntersectionController {
    pub intersection: Intersection,
    lights: Vec<TrafficLight>,
    waiting: HashMap<Direction, usize>,
    seen: HashMap<Direction, HashSet<CarId>>,
    phase: Phase,
    phase_started: Instant,
    phase_duration: Duration,
    next_green: Duration,
    timing: SignalTiming,
}

impl IntersectionController {
    /// Starts in GREEN_NS with the base green duration.
    pub fn new(
        intersection: Intersection,
        timing: SignalTiming,
        light_offset: f64,
        road_width: f64,
        now: Instant,
    ) -> Self {
        let lights = Direction::ALL
            .iter()
            .map(|&d| TrafficLight::new(&intersection, d, light_offset, road_width))
            .collect();
        let mut controller = Self {
            intersection,
            lights,
            waiting: HashMap::new(),
            seen: HashMap::new(),
            phase: Phase::GreenNs,
            phase_started: now,
            phase_duration: timing.base_green,
            next_green: timing.base_green,
            timing,
        };
        controller.enter_phase(Phase::GreenNs, now);
        controller
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_duration(&self) -> Duration {
        self.phase_duration
    }

    pub fn time_in_phase(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.phase_started)
    }

    pub fn timing(&self) -> &SignalTiming {
        &self.timing
    }

    pub fn lights(&self) -> &[TrafficLight] {
        &self.lights
    }

    pub fn light_state(&self, direction: Direction) -> LightState {
        self.lights
            .iter()
            .find(|l| l.direction == direction)
            .map(|l| l.state)
            .unwrap_or_else(|| self.phase.light_for(direction))
    }

    pub fn waiting_count(&self, direction: Direction) -> usize {
        self.waiting.get(&direction).copied().unwrap_or(0)
    }

    /// Combined waiting count of the NORTH/SOUTH pair (`vertical`) or the EAST/WEST pair.
    pub fn pair_waiting(&self, vertical: bool) -> usize {
        Direction::ALL
            .iter()
            .filter(|d| d.is_vertical() == vertical)
            .map(|&d| self.waiting_count(d))
            .sum()
    }

    pub fn compute_green_duration(&self, waiting: usize) -> Duration {
        self.timing.green_for(waiting)
    }

    /// Advances the phase machine. Returns true when the phase changed.
    pub fn update(&mut self, now: Instant) -> bool {
        if self.time_in_phase(now) < self.phase_duration {
            return false;
        }
        let next = self.phase.next();
        self.enter_phase(next, now);
        true
    }

    /// Counts `car` as waiting at `direction`'s red light. A car is counted once per red phase.
    pub fn add_waiting_car(&mut self, direction: Direction, car: CarId) -> bool {
        if self.light_state(direction) != LightState::Red {
            return false;
        }
        if !self.seen.entry(direction).or_default().insert(car) {
            return false;
        }
        *self.waiting.entry(direction).or_insert(0) += 1;
        true
    }

    pub fn car_passed(&mut self, direction: Direction) {
        if let Some(count) = self.waiting.get_mut(&direction) {
            *count = count.saturating_sub(1);
        }
    }

    /// Jumps straight to `phase`, keeping one pair red. Used by operators.
    pub fn force_phase(&mut self, phase: Phase, now: Instant) {
        if phase.is_green() {
            self.next_green = self.timing.green_for(self.pair_waiting(phase.serves_vertical()));
        }
        info!(
            "intersection {}: phase forced from {} to {}",
            self.intersection.id, self.phase, phase
        );
        self.enter_phase(phase, now);
    }

    /// Back to GREEN_NS with the base duration and empty counters.
    pub fn reset(&mut self, now: Instant) {
        self.waiting.clear();
        self.seen.clear();
        self.next_green = self.timing.base_green;
        self.enter_phase(Phase::GreenNs, now);
    }

    fn clear_pair(&mut self, vertical: bool) {
        for d in Direction::ALL.iter().filter(|d| d.is_vertical() == vertical) {
            self.waiting.remove(d);
            self.seen.remove(d);
        }
    }

    fn enter_phase(&mut self, phase: Phase, now: Instant) {
        let vertical = phase.serves_vertical();
        // Counters of the pair that now moves are stale either way.
        self.clear_pair(vertical);
        if phase.is_green() {
            self.phase_duration = self.next_green;
        } else {
            self.next_green = self.timing.green_for(self.pair_waiting(!vertical));
            self.phase_duration = self.timing.yellow;
        }
        if phase != self.phase {
            debug!(
                "intersection {}: {} -> {} for {:?}",
                self.intersection.id, self.phase, phase, self.phase_duration
            );
        }
        self.phase = phase;
        self.phase_started = now;
        for light in &mut self.lights {
            light.state = phase.light_for(light.direction);
        }
    }
}

/// Read/write access to signal state as seen by a car.
pub trait SignalBoard {
    /// `None` when the intersection has no controller.
    fn light_state(&self, intersection: IntersectionId, direction: Direction) -> Option<LightState>;
    fn add_waiting_car(&self, intersection: IntersectionId, direction: Direction, car: CarId);
    fn car_passed(&self, intersection: IntersectionId, direction: Direction);
}

pub struct TrafficLightController {
    pub controllers: HashMap<IntersectionId, IntersectionController>,
}

impl TrafficLightController {
    // One controller per intersection, all starting in GREEN_NS.
    pub fn initialize(intersections: &[Intersection], config: &SimConfig, now: Instant) -> Self {
        let timing = config.signal_timing();
        let controllers = intersections
            .iter()
            .map(|i| {
                let controller = IntersectionController::new(
                    i.clone(),
                    timing,
                    config.traffic_light.offset,
                    config.map.road_width,
                    now,
                );
                (i.id, controller)
            })
            .collect();
        Self { controllers }
    }

    pub fn get(&self, id: IntersectionId) -> Option<&IntersectionController> {
        self.controllers.get(&id)
    }

    // Calls update() on all individual intersection controllers.
    pub fn update_all(&mut self, now: Instant) {
        for controller in self.controllers.values_mut() {
            controller.update(now);
        }
    }

    pub fn force_phase(&mut self, id: IntersectionId, phase: Phase, now: Instant) -> bool {
        match self.controllers.get_mut(&id) {
            Some(ctrl) => {
                ctrl.force_phase(phase, now);
                true
            }
            None => {
                warn!("force_phase: intersection {id} not found");
                false
            }
        }
    }

    pub fn reset_all(&mut self, now: Instant) {
        for controller in self.controllers.values_mut() {
            controller.reset(now);
        }
    }

    // Periodically updates every controller until `stop` is raised.
    // This function is intended to be spawned as an async task.
    pub async fn run_update_loop(
        controller: Arc<Mutex<Self>>,
        stop: Arc<AtomicBool>,
        period: Duration,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if stop.load(Ordering::Acquire) {
                break;
            }
            lock(&controller).update_all(Instant::now());
        }
        debug!("traffic light update loop stopped");
    }
}

impl SignalBoard for Mutex<TrafficLightController> {
    fn light_state(&self, intersection: IntersectionId, direction: Direction) -> Option<LightState> {
        lock(self).get(intersection).map(|c| c.light_state(direction))
    }

    fn add_waiting_car(&self, intersection: IntersectionId, direction: Direction, car: CarId) {
        if let Some(ctrl) = lock(self).controllers.get_mut(&intersection) {
            ctrl.add_waiting_car(direction, car);
        }
    }

    fn car_passed(&self, intersection: IntersectionId, direction: Direction) {
        if let Some(ctrl) = lock(self).controllers.get_mut(&intersection) {
            ctrl.car_passed(direction);
        }
    }
}
