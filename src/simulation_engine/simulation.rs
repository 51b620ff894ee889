// simulation.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::SimConfig;
use crate::control_system::traffic_light_controller::TrafficLightController;
use crate::geometry::{Direction, Position, Vector};
use crate::shared_data::{current_timestamp, lock, IntersectionSnapshot, TrafficSnapshot};
use crate::simulation_engine::grid::{RoadNetwork, SpawnPoint};
use crate::simulation_engine::movement::DriveEnv;
use crate::simulation_engine::roster::{CarSlot, Roster};
use crate::simulation_engine::vehicles::{Car, CarId, CarUpdateResult};

/// State shared by every car task.
#[derive(Clone)]
struct DriveContext {
    config: Arc<SimConfig>,
    network: Arc<RoadNetwork>,
    controller: Arc<Mutex<TrafficLightController>>,
    roster: Arc<Roster>,
}

impl DriveContext {
    /// Ticks one car against the latest neighbour snapshots and publishes its new state.
    fn tick(&self, slot: &CarSlot, now: Instant) -> CarUpdateResult {
        let center = slot.snapshot().position;
        let neighbors =
            self.roster
                .neighbors_of(slot.id, center, self.config.car_detection_radius());
        let env = DriveEnv {
            config: &self.config,
            network: &self.network,
            signals: self.controller.as_ref(),
            neighbors: &neighbors,
        };
        let mut car = slot.car();
        let result = car.advance(&env, now);
        slot.publish(car.snapshot());
        result
    }
}

/// Runs one car until it leaves the world, is cancelled, or the simulation stops.
async fn drive(slot: Arc<CarSlot>, ctx: DriveContext, stop: Arc<AtomicBool>) {
    let mut ticker = interval(ctx.config.car_tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if stop.load(Ordering::Acquire) || slot.is_cancelled() {
            break;
        }
        if ctx.tick(&slot, Instant::now()) == CarUpdateResult::Exited {
            ctx.roster.remove(slot.id);
            info!("{} left the map", slot.id);
            break;
        }
    }
}

/// Owns the road network, the signal controllers and the cars.
///
/// Cars run either as one tokio task each (after [Simulation::start]) or all
/// together on the caller's thread through [Simulation::step].
pub struct Simulation {
    config: Arc<SimConfig>,
    network: Arc<RoadNetwork>,
    controller: Arc<Mutex<TrafficLightController>>,
    roster: Arc<Roster>,
    car_tasks: HashMap<CarId, JoinHandle<()>>,
    light_task: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    next_id: u64,
    rng: StdRng,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self> {
        let network = RoadNetwork::from_config(&config)?;
        Ok(Self::with_network(config, network))
    }

    pub fn with_network(config: SimConfig, network: RoadNetwork) -> Self {
        let controller =
            TrafficLightController::initialize(&network.intersections, &config, Instant::now());
        let rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            config: Arc::new(config),
            network: Arc::new(network),
            controller: Arc::new(Mutex::new(controller)),
            roster: Arc::new(Roster::new()),
            car_tasks: HashMap::new(),
            light_task: None,
            stop: Arc::new(AtomicBool::new(false)),
            next_id: 1,
            rng,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn controller(&self) -> Arc<Mutex<TrafficLightController>> {
        Arc::clone(&self.controller)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn car_count(&self) -> usize {
        self.roster.len()
    }

    pub fn is_running(&self) -> bool {
        self.light_task.is_some()
    }

    fn context(&self) -> DriveContext {
        DriveContext {
            config: Arc::clone(&self.config),
            network: Arc::clone(&self.network),
            controller: Arc::clone(&self.controller),
            roster: Arc::clone(&self.roster),
        }
    }

    fn spawn_task(&mut self, slot: Arc<CarSlot>) {
        let id = slot.id;
        let handle = tokio::spawn(drive(slot, self.context(), Arc::clone(&self.stop)));
        self.car_tasks.insert(id, handle);
    }

    /// Adds a car at `position` heading `direction` at the configured speed.
    /// If the simulation is running the car starts driving immediately.
    pub fn spawn_car(&mut self, position: Position, direction: Direction) -> CarId {
        let id = CarId(self.next_id);
        self.next_id += 1;
        let road = self
            .network
            .road_through(position, direction)
            .map(|r| r.id);
        let car = Car::new(
            id,
            position,
            direction,
            road,
            self.config.simulation.car_speed,
            self.config.car.size,
            self.rng.random(),
            Instant::now(),
        );
        let slot = Arc::new(CarSlot::new(car));
        self.roster.insert(Arc::clone(&slot));
        if self.is_running() {
            self.spawn_task(slot);
        }
        info!("spawned {id} at ({:.1}, {:.1}) heading {direction}", position.x, position.y);
        id
    }

    pub fn spawn_at(&mut self, point: SpawnPoint) -> CarId {
        self.spawn_car(point.position, point.direction)
    }

    /// Removes a car and waits for its task, if any, to finish.
    pub async fn remove_car(&mut self, id: CarId) -> bool {
        let slot = self.roster.remove(id);
        if let Some(slot) = &slot {
            slot.cancel();
        }
        if let Some(handle) = self.car_tasks.remove(&id) {
            if let Err(e) = handle.await {
                warn!("task of {id} ended abnormally: {e}");
            }
        }
        if slot.is_some() {
            info!("removed {id}");
        }
        slot.is_some()
    }

    /// How many cars the map should carry.
    pub fn target_population(&self) -> usize {
        (self.network.roads.len() * self.config.simulation.cars_per_road)
            .min(self.config.simulation.max_cars)
    }

    /// Places `carsPerRoad` cars on every road, alternating between its two
    /// ends and spaced out along the lane, up to `maxCars`.
    pub fn populate(&mut self) -> usize {
        let spacing = self.config.min_car_distance() * 3.0;
        let per_road = self.config.simulation.cars_per_road;
        let points = self.network.spawn_points();
        let mut spawned = 0;
        for road_points in points.chunks(2) {
            for k in 0..per_road {
                if self.roster.len() >= self.config.simulation.max_cars {
                    return spawned;
                }
                let Some(point) = road_points.get(k % road_points.len()) else {
                    continue;
                };
                let position = point.position + point.direction.unit() * (spacing * (k / 2) as f64);
                self.spawn_car(position, point.direction);
                spawned += 1;
            }
        }
        spawned
    }

    /// Replaces cars that have left, at free spawn points.
    pub fn top_up(&mut self) -> usize {
        self.car_tasks.retain(|_, h| !h.is_finished());
        let target = self.target_population();
        let current = self.roster.len();
        if current >= target {
            return 0;
        }
        let clearance = self.config.min_car_distance() * 2.0;
        let free: Vec<SpawnPoint> = self
            .network
            .spawn_points()
            .into_iter()
            .filter(|p| !self.roster.is_occupied(p.position, clearance))
            .collect();
        let mut spawned = 0;
        let mut candidates = free;
        while spawned < target - current {
            let Some(&point) = candidates.choose(&mut self.rng) else {
                break;
            };
            candidates.retain(|p| p.position != point.position);
            self.spawn_at(point);
            spawned += 1;
        }
        if spawned > 0 {
            debug!("topped up {spawned} cars, {} on the map", self.roster.len());
        }
        spawned
    }

    /// Starts the light controller task and one task per car.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.stop = Arc::new(AtomicBool::new(false));
        self.light_task = Some(tokio::spawn(TrafficLightController::run_update_loop(
            Arc::clone(&self.controller),
            Arc::clone(&self.stop),
            self.config.light_tick(),
        )));
        let slots = self.roster.current();
        for slot in slots.iter() {
            self.spawn_task(Arc::clone(slot));
        }
        info!("simulation started with {} cars", slots.len());
    }

    /// Signals every loop to stop and waits until all of them have.
    pub async fn stop(&mut self) {
        if !self.is_running() && self.car_tasks.is_empty() {
            return;
        }
        self.stop.store(true, Ordering::Release);
        let mut handles: Vec<JoinHandle<()>> = self.car_tasks.drain().map(|(_, h)| h).collect();
        handles.extend(self.light_task.take());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("simulation task ended abnormally: {e}");
            }
        }
        info!("simulation stopped");
    }

    /// Stops everything, removes all cars and puts every light back to GREEN_NS.
    pub async fn reset(&mut self) {
        self.stop().await;
        let removed = self.roster.clear();
        for slot in &removed {
            slot.cancel();
        }
        lock(&self.controller).reset_all(Instant::now());
        info!("simulation reset, {} cars removed", removed.len());
    }

    /// Ticks the controllers and then every car once, in roster order, on the
    /// calling thread. Returns the cars that left the map.
    pub fn step(&mut self, now: Instant) -> Vec<CarId> {
        if self.is_running() {
            warn!("step ignored while the simulation is running");
            return Vec::new();
        }
        lock(&self.controller).update_all(now);
        let ctx = self.context();
        let mut exited = Vec::new();
        for slot in self.roster.current().iter() {
            if ctx.tick(slot, now) == CarUpdateResult::Exited {
                exited.push(slot.id);
            }
        }
        for id in &exited {
            self.roster.remove(*id);
            debug!("{id} left the map");
        }
        exited
    }

    /// Applies an out-of-band position correction to one car.
    pub fn apply_external_correction(&self, id: CarId, delta: Vector, damping: f64, now: Instant) -> bool {
        let Some(slot) = self.roster.get(id) else {
            return false;
        };
        let mut car = slot.car();
        let applied = car.apply_external_correction(delta, damping, now);
        if applied {
            slot.publish(car.snapshot());
        }
        applied
    }

    /// A consistent-enough frame for rendering or recording.
    pub fn snapshot(&self) -> TrafficSnapshot {
        let mut intersections: Vec<IntersectionSnapshot> = lock(&self.controller)
            .controllers
            .values()
            .map(IntersectionSnapshot::from)
            .collect();
        intersections.sort_by_key(|i| i.id);
        TrafficSnapshot {
            timestamp: current_timestamp(),
            cars: self.roster.snapshots(),
            intersections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::traffic_light_controller::Phase;
    use std::time::Duration;

    fn config() -> SimConfig {
        SimConfig::from_json(r#"{ "simulation": { "seed": 17 } }"#).unwrap()
    }

    #[test]
    fn populate_respects_per_road_and_cap() {
        let mut sim = Simulation::new(config()).unwrap();
        let spawned = sim.populate();
        assert_eq!(spawned, sim.network().roads.len() * 2);
        assert_eq!(sim.car_count(), spawned);

        let capped = SimConfig::from_json(r#"{ "simulation": { "maxCars": 3 } }"#).unwrap();
        let mut sim = Simulation::new(capped).unwrap();
        assert_eq!(sim.populate(), 3);
        assert_eq!(sim.target_population(), 3);
    }

    #[test]
    fn step_moves_every_car_and_removes_leavers() {
        let mut sim = Simulation::new(config()).unwrap();
        let inside = sim.spawn_car(Position::new(100.0, 310.0), Direction::East);
        let leaving = sim.spawn_car(Position::new(1209.0, 310.0), Direction::East);
        let now = Instant::now() + Duration::from_millis(100);
        let exited = sim.step(now);
        assert_eq!(exited, vec![leaving]);
        assert_eq!(sim.car_count(), 1);
        let snap = sim.snapshot();
        assert_eq!(snap.cars[0].id, inside);
        assert!((snap.cars[0].position.x - 102.0).abs() < 1e-9);
        assert_eq!(snap.intersections.len(), sim.network().intersections.len());
    }

    #[test]
    fn external_correction_is_published() {
        let sim_config = config();
        let mut sim = Simulation::new(sim_config).unwrap();
        let id = sim.spawn_car(Position::new(100.0, 310.0), Direction::East);
        let now = Instant::now();
        assert!(sim.apply_external_correction(id, Vector::new(0.0, 4.0), 0.5, now));
        assert!(!sim.apply_external_correction(id, Vector::new(0.0, 4.0), 0.5, now));
        assert!((sim.snapshot().cars[0].position.y - 312.0).abs() < 1e-9);
        assert!(!sim.apply_external_correction(CarId(999), Vector::new(1.0, 0.0), 1.0, now));
    }

    #[test]
    fn top_up_refills_free_spawn_points() {
        let mut sim = Simulation::new(config()).unwrap();
        let target = sim.target_population();
        let added = sim.top_up();
        assert!(added > 0 && added <= target);
        assert!(sim.car_count() <= target);
    }

    #[tokio::test(start_paused = true)]
    async fn start_stop_reset() {
        let mut sim = Simulation::new(config()).unwrap();
        sim.spawn_car(Position::new(100.0, 310.0), Direction::East);
        sim.start();
        assert!(sim.is_running());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let x = sim.snapshot().cars[0].position.x;
        assert!(x > 110.0, "car only reached {x}");

        // Stepping is refused while tasks own the cars.
        assert!(sim.step(Instant::now()).is_empty());

        sim.stop().await;
        assert!(!sim.is_running());
        let frozen = sim.snapshot().cars[0].position.x;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sim.snapshot().cars[0].position.x, frozen);

        sim.start();
        let late = sim.spawn_car(Position::new(100.0, 510.0), Direction::East);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(sim.remove_car(late).await);
        assert!(!sim.remove_car(late).await);

        let first = sim.network().intersections[0].id;
        lock(&sim.controller()).force_phase(first, Phase::GreenEw, Instant::now());
        sim.reset().await;
        assert_eq!(sim.car_count(), 0);
        assert!(!sim.is_running());
        assert_eq!(
            lock(&sim.controller()).get(first).unwrap().phase(),
            Phase::GreenNs
        );
    }
}
