use std::fmt;
use std::time::Duration;

use log::trace;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::geometry::{Direction, Position, Vector};
use crate::global_variables::EXTERNAL_CORRECTION_INTERVAL_MS;
use crate::simulation_engine::intersections::IntersectionId;
use crate::simulation_engine::roads::RoadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CarId(pub u64);

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "car#{}", self.0)
    }
}

/// What a car is doing this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrivingState {
    Cruising,
    /// Just left an intersection; ignores lights until the cooldown ends.
    Cooldown,
    /// An intersection is within detection range ahead.
    Approaching,
    /// Entered an intersection; the crossing path is planned this tick.
    PlanningTurn,
    FollowingPath,
    StuckRecovery,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarUpdateResult {
    Continue,
    /// Left the world; the car should be removed.
    Exited,
}

/// The part of a car other cars and renderers may read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarSnapshot {
    pub id: CarId,
    pub position: Position,
    pub direction: Direction,
    pub speed: f64,
    pub size: f64,
    pub road: Option<RoadId>,
    pub current_intersection: Option<IntersectionId>,
    pub state: DrivingState,
}

/// A vehicle agent. Only its own tick moves it, apart from
/// [Car::apply_external_correction].
#[derive(Debug, Clone)]
pub struct Car {
    pub(crate) id: CarId,
    pub(crate) position: Position,
    /// Current speed in world units per tick.
    pub(crate) speed: f64,
    /// Cruising speed on open road.
    pub(crate) nominal_speed: f64,
    pub(crate) direction: Direction,
    pub(crate) size: f64,
    pub(crate) state: DrivingState,
    pub(crate) road: Option<RoadId>,
    /// Set while the car is crossing this intersection.
    pub(crate) current_intersection: Option<IntersectionId>,
    /// Heading adopted once the crossing path is complete.
    pub(crate) target_direction: Option<Direction>,
    pub(crate) path: Vec<Position>,
    pub(crate) path_index: usize,
    pub(crate) entered_at: Option<Instant>,
    pub(crate) cooldown_until: Option<Instant>,
    pub(crate) last_exited: Option<IntersectionId>,
    /// Red light the car is registered as waiting at.
    pub(crate) waiting_at: Option<IntersectionId>,
    /// True when a leader limited this tick's travel.
    pub(crate) following: bool,
    pub(crate) stuck_anchor: Position,
    pub(crate) stuck_since: Instant,
    pub(crate) last_correction: Option<Instant>,
    pub(crate) rng: StdRng,
}

impl Car {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CarId,
        position: Position,
        direction: Direction,
        road: Option<RoadId>,
        speed: f64,
        size: f64,
        seed: u64,
        now: Instant,
    ) -> Self {
        Self {
            id,
            position,
            speed,
            nominal_speed: speed,
            direction,
            size,
            state: DrivingState::Cruising,
            road,
            current_intersection: None,
            target_direction: None,
            path: Vec::new(),
            path_index: 0,
            entered_at: None,
            cooldown_until: None,
            last_exited: None,
            waiting_at: None,
            following: false,
            stuck_anchor: position,
            stuck_since: now,
            last_correction: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn id(&self) -> CarId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn state(&self) -> DrivingState {
        self.state
    }

    pub fn road(&self) -> Option<RoadId> {
        self.road
    }

    pub fn current_intersection(&self) -> Option<IntersectionId> {
        self.current_intersection
    }

    pub fn target_direction(&self) -> Option<Direction> {
        self.target_direction
    }

    pub fn path(&self) -> &[Position] {
        &self.path
    }

    pub fn waiting_at(&self) -> Option<IntersectionId> {
        self.waiting_at
    }

    /// How long the car has been inside its current intersection.
    pub fn time_in_intersection(&self, now: Instant) -> Option<Duration> {
        self.entered_at.map(|t| now.saturating_duration_since(t))
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Offset from the road centre line to this car's lane, derived from its heading.
    pub fn lane_offset(&self, road_width: f64) -> Vector {
        self.direction.lane_offset(road_width)
    }

    /// Nudges the car from outside its own tick, e.g. to resolve an overlap a
    /// renderer detected. `damping` in `[0, 1]` scales `delta`. Applied at most
    /// once per correction interval; returns whether it was applied.
    pub fn apply_external_correction(&mut self, delta: Vector, damping: f64, now: Instant) -> bool {
        let interval = Duration::from_millis(EXTERNAL_CORRECTION_INTERVAL_MS);
        if self
            .last_correction
            .is_some_and(|t| now.saturating_duration_since(t) < interval)
        {
            return false;
        }
        let damping = if damping.is_finite() { damping.clamp(0.0, 1.0) } else { 0.0 };
        self.position += delta * damping;
        self.last_correction = Some(now);
        trace!("{} corrected by {:?}", self.id, delta * damping);
        true
    }

    pub fn snapshot(&self) -> CarSnapshot {
        CarSnapshot {
            id: self.id,
            position: self.position,
            direction: self.direction,
            speed: self.speed,
            size: self.size,
            road: self.road,
            current_intersection: self.current_intersection,
            state: self.state,
        }
    }
}
