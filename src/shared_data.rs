// src/shared_data.rs

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::control_system::traffic_light_controller::{IntersectionController, Phase};
use crate::geometry::{Direction, Position};
use crate::simulation_engine::intersections::IntersectionId;
use crate::simulation_engine::traffic_light::LightState;
use crate::simulation_engine::vehicles::CarSnapshot;

/// One signal face as a renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSnapshot {
    pub direction: Direction,
    pub state: LightState,
    pub position: Position,
}

/// Read-only view of an intersection and its controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionSnapshot {
    pub id: IntersectionId,
    pub center: Position,
    pub radius: f64,
    pub phase: Phase,
    pub lights: Vec<LightSnapshot>,
    /// Waiting counts in NORTH, SOUTH, EAST, WEST order.
    pub waiting: [usize; 4],
}

impl From<&IntersectionController> for IntersectionSnapshot {
    fn from(ctrl: &IntersectionController) -> Self {
        Self {
            id: ctrl.intersection.id,
            center: ctrl.intersection.center,
            radius: ctrl.intersection.radius,
            phase: ctrl.phase(),
            lights: ctrl
                .lights()
                .iter()
                .map(|l| LightSnapshot {
                    direction: l.direction,
                    state: l.state,
                    position: l.position,
                })
                .collect(),
            waiting: Direction::ALL.map(|d| ctrl.waiting_count(d)),
        }
    }
}

impl IntersectionSnapshot {
    pub fn total_waiting(&self) -> usize {
        self.waiting.iter().sum()
    }
}

/// A complete frame of the simulation (cars + intersections, timestamp)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficSnapshot {
    pub timestamp: u64,
    pub cars: Vec<CarSnapshot>,
    pub intersections: Vec<IntersectionSnapshot>,
}

impl TrafficSnapshot {
    /// Cars currently inside `id`'s radius.
    pub fn cars_inside(&self, id: IntersectionId) -> usize {
        self.cars
            .iter()
            .filter(|c| c.current_intersection == Some(id))
            .count()
    }
}

/// Milliseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
