use log::{debug, trace, warn};
use rand::Rng;
use tokio::time::Instant;

use crate::config::SimConfig;
use crate::control_system::traffic_light_controller::SignalBoard;
use crate::geometry::{self, Vector, EPSILON};
use crate::global_variables::{
    CONTACT_SPEED_FACTOR, LANE_PULL_FACTOR, SAFETY_SPEED_FLOOR, SPEED_RECOVERY_RATE,
    STUCK_PERTURBATION,
};
use crate::simulation_engine::grid::RoadNetwork;
use crate::simulation_engine::intersections::{Intersection, IntersectionId};
use crate::simulation_engine::roads::Road;
use crate::simulation_engine::route_generation::{choose_target_direction, plan_path};
use crate::simulation_engine::traffic_light::LightState;
use crate::simulation_engine::vehicles::{Car, CarSnapshot, CarUpdateResult, DrivingState};

/// Everything a car reads during its tick.
pub struct DriveEnv<'a> {
    pub config: &'a SimConfig,
    pub network: &'a RoadNetwork,
    pub signals: &'a dyn SignalBoard,
    /// Possibly stale snapshots of nearby cars. May include the car itself.
    pub neighbors: &'a [CarSnapshot],
}

impl Car {
    /// Runs one tick of the driving state machine.
    ///
    /// Never fails: geometry surprises and timeouts are resolved locally by
    /// forcing the car out of the intersection or nudging it.
    pub fn advance(&mut self, env: &DriveEnv, now: Instant) -> CarUpdateResult {
        let travel = self.apply_proximity(env);

        if let Some(id) = self.current_intersection {
            self.drive_through_intersection(id, env, now, travel);
        } else if self.in_cooldown(now) {
            self.state = DrivingState::Cooldown;
            self.move_straight(travel);
            self.pull_toward_lane(env);
            self.detect_entry(env, now);
        } else {
            self.drive_on_road(env, now, travel);
        }

        self.check_stuck(env, now);

        if env.network.is_outside(self.position, self.size) {
            CarUpdateResult::Exited
        } else {
            CarUpdateResult::Continue
        }
    }

    /// Speed the car would like to hold right now.
    fn cruise_speed(&self, config: &SimConfig) -> f64 {
        if self.current_intersection.is_some() {
            config.turning_speed()
        } else {
            self.nominal_speed
        }
    }

    /// Gap to the closest car ahead in the same lane, centre to centre.
    ///
    /// Two cars on the same spot are ordered by id: the lower id leads.
    pub(crate) fn leader_gap(&self, env: &DriveEnv) -> Option<f64> {
        let road = self.road?;
        let radius = env.config.car_detection_radius();
        let lane_half_width = env.config.map.road_width / 2.0;
        env.neighbors
            .iter()
            .filter(|n| n.id != self.id && n.road == Some(road) && n.direction == self.direction)
            .filter(|n| geometry::lateral_gap(self.position, n.position, self.direction) < lane_half_width)
            .filter(|n| geometry::distance(self.position, n.position) <= radius)
            .filter_map(|n| {
                let gap = geometry::longitudinal_gap(self.position, n.position, self.direction);
                let leads = geometry::is_ahead(n.position, self.position, self.direction)
                    || (gap.abs() <= EPSILON && n.id < self.id);
                leads.then_some(gap.max(0.0))
            })
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Adjusts speed for the leader ahead and returns how far the car may travel this tick.
    fn apply_proximity(&mut self, env: &DriveEnv) -> f64 {
        let cruise = self.cruise_speed(env.config);
        let contact = self.size;
        let safety = env.config.min_car_distance().max(contact + EPSILON);

        // Travel is capped so the centre-to-centre gap never closes below one car length.
        match self.leader_gap(env) {
            Some(gap) if gap <= contact => {
                self.following = true;
                self.speed = cruise * CONTACT_SPEED_FACTOR;
                0.0
            }
            Some(gap) if gap < safety => {
                self.following = true;
                let factor = SAFETY_SPEED_FLOOR
                    + (1.0 - SAFETY_SPEED_FLOOR) * (gap - contact) / (safety - contact);
                self.speed = cruise * factor;
                self.speed.min(gap - contact)
            }
            _ => {
                self.following = false;
                if self.speed < cruise {
                    self.speed = (self.speed + cruise * SPEED_RECOVERY_RATE).min(cruise);
                } else {
                    self.speed = cruise;
                }
                self.speed
            }
        }
    }

    fn move_straight(&mut self, travel: f64) {
        self.position += self.direction.unit() * travel;
    }

    /// Drifts the car towards its lane centre on the road it is driving along.
    fn pull_toward_lane(&mut self, env: &DriveEnv) {
        if self.road.is_none() {
            self.road = env
                .network
                .road_through(self.position, self.direction)
                .map(|r| r.id);
        }
        let Some(lane) = self
            .road
            .and_then(|id| env.network.road(id))
            .and_then(|r| r.lane_center(self.direction))
        else {
            return;
        };
        if self.direction.is_vertical() {
            self.position.x += (lane - self.position.x) * LANE_PULL_FACTOR;
        } else {
            self.position.y += (lane - self.position.y) * LANE_PULL_FACTOR;
        }
    }

    fn snap_to_lane(&mut self, road: &Road) {
        if let Some(lane) = road.lane_center(self.direction) {
            if self.direction.is_vertical() {
                self.position.x = lane;
            } else {
                self.position.y = lane;
            }
        }
    }

    /// Nearest intersection ahead within light detection range, in this car's corridor.
    fn intersection_ahead<'n>(&self, env: &DriveEnv<'n>) -> Option<&'n Intersection> {
        let detection = env.config.traffic_light.detection_radius;
        let half_width = env.config.map.road_width / 2.0;
        env.network
            .intersections
            .iter()
            .filter(|i| Some(i.id) != self.last_exited)
            .filter_map(|i| {
                let gap = geometry::longitudinal_gap(self.position, i.center, self.direction);
                let lateral = geometry::lateral_gap(self.position, i.center, self.direction);
                (gap > EPSILON && gap <= detection && lateral <= half_width).then_some((gap, i))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, i)| i)
    }

    fn drive_on_road(&mut self, env: &DriveEnv, now: Instant, travel: f64) {
        let ahead = self.intersection_ahead(env);
        if let Some(intersection) = ahead {
            let light = env.signals.light_state(intersection.id, self.direction);
            if light == Some(LightState::Red) && !intersection.contains(self.position) {
                self.speed = 0.0;
                self.state = DrivingState::Approaching;
                if self.waiting_at != Some(intersection.id) {
                    env.signals
                        .add_waiting_car(intersection.id, self.direction, self.id);
                    self.waiting_at = Some(intersection.id);
                    trace!("{} waiting at red {}", self.id, intersection.id);
                }
                return;
            }
        }
        self.release_waiting(env);
        self.state = if ahead.is_some() {
            DrivingState::Approaching
        } else {
            DrivingState::Cruising
        };
        self.move_straight(travel);
        self.pull_toward_lane(env);
        self.detect_entry(env, now);
    }

    fn release_waiting(&mut self, env: &DriveEnv) {
        if let Some(id) = self.waiting_at.take() {
            env.signals.car_passed(id, self.direction);
        }
    }

    /// Starts a crossing if the car has just rolled into an intersection.
    fn detect_entry(&mut self, env: &DriveEnv, now: Instant) {
        if let Some(last) = self.last_exited {
            let still_inside = env
                .network
                .intersection(last)
                .is_some_and(|i| i.contains(self.position));
            if !still_inside {
                self.last_exited = None;
            }
        }
        let Some(intersection) = env.network.intersection_at(self.position) else {
            return;
        };
        if Some(intersection.id) == self.last_exited {
            return;
        }
        self.release_waiting(env);
        self.current_intersection = Some(intersection.id);
        self.entered_at = Some(now);
        self.target_direction = None;
        self.path.clear();
        self.path_index = 0;
        self.state = DrivingState::PlanningTurn;
        trace!("{} entered {}", self.id, intersection.id);
    }

    fn drive_through_intersection(
        &mut self,
        id: IntersectionId,
        env: &DriveEnv,
        now: Instant,
        travel: f64,
    ) {
        let Some(intersection) = env.network.intersection(id) else {
            warn!("{} is inside unknown intersection {}, releasing it", self.id, id);
            self.current_intersection = None;
            self.entered_at = None;
            self.target_direction = None;
            self.path.clear();
            self.state = DrivingState::Cruising;
            return;
        };

        if self
            .time_in_intersection(now)
            .is_some_and(|t| t >= env.config.intersection_timeout())
        {
            warn!(
                "{} exceeded the occupancy ceiling in {}, forcing it out",
                self.id, id
            );
            self.emergency_exit(intersection, env, now);
            return;
        }

        if self.path.is_empty() {
            let exits = env.network.exits_from(intersection);
            let target = choose_target_direction(
                &mut self.rng,
                self.direction,
                env.config.car.straight_probability,
                &exits,
            );
            self.path = plan_path(self.position, self.direction, target, intersection, env.config);
            self.path_index = 0;
            self.target_direction = Some(target);
            self.speed = env.config.turning_speed();
            self.state = DrivingState::PlanningTurn;
            debug!(
                "{} crossing {} from {} to {} over {} waypoints",
                self.id,
                id,
                self.direction,
                target,
                self.path.len()
            );
            return;
        }

        self.state = DrivingState::FollowingPath;
        self.follow_path(travel);
        if self.path_index >= self.path.len() {
            self.complete_crossing(intersection, env, now);
        }
    }

    /// Walks the path with `budget` travel, landing exactly on each waypoint it reaches.
    fn follow_path(&mut self, budget: f64) {
        let mut remaining = budget;
        while self.path_index < self.path.len() {
            let waypoint = self.path[self.path_index];
            let dist = geometry::distance(self.position, waypoint);
            if dist <= remaining + EPSILON {
                self.position = waypoint;
                remaining -= dist;
                self.path_index += 1;
            } else {
                if remaining > EPSILON {
                    self.position += (waypoint - self.position) * (remaining / dist);
                }
                break;
            }
        }
    }

    fn complete_crossing(&mut self, intersection: &Intersection, env: &DriveEnv, now: Instant) {
        let target = self.target_direction.take().unwrap_or(self.direction);
        let Some(road) = env.network.find_road(intersection, target) else {
            warn!(
                "{} found no road leaving {} towards {}",
                self.id, intersection.id, target
            );
            self.target_direction = Some(target);
            self.emergency_exit(intersection, env, now);
            return;
        };
        self.direction = target;
        self.road = Some(road.id);
        self.snap_to_lane(road);
        self.leave_intersection(intersection.id, env, now);
        self.state = DrivingState::Cruising;
        trace!("{} left {} heading {}", self.id, intersection.id, target);
    }

    /// Puts the car just outside `intersection` on its target heading's lane.
    fn emergency_exit(&mut self, intersection: &Intersection, env: &DriveEnv, now: Instant) {
        let target = self.target_direction.take().unwrap_or(self.direction);
        let road_width = env.config.map.road_width;
        self.direction = target;
        self.position = intersection.center
            + target.unit() * (intersection.radius + self.size)
            + target.lane_offset(road_width);
        self.road = env.network.find_road(intersection, target).map(|r| r.id);
        self.speed = self.nominal_speed;
        self.leave_intersection(intersection.id, env, now);
        self.state = DrivingState::Cruising;
    }

    fn leave_intersection(&mut self, id: IntersectionId, env: &DriveEnv, now: Instant) {
        self.current_intersection = None;
        self.entered_at = None;
        self.path.clear();
        self.path_index = 0;
        self.last_exited = Some(id);
        self.cooldown_until = Some(now + env.config.cooldown());
        self.stuck_anchor = self.position;
        self.stuck_since = now;
    }

    /// Nudges a car that has barely moved over the stuck window. Cars held by a
    /// red light or by a leader are not stuck.
    pub(crate) fn check_stuck(&mut self, env: &DriveEnv, now: Instant) {
        if now.saturating_duration_since(self.stuck_since) < env.config.stuck_window() {
            return;
        }
        let moved = geometry::distance(self.stuck_anchor, self.position);
        let held = self.waiting_at.is_some() || self.following;
        if moved < env.config.signal.stuck_threshold && !held {
            let jitter = Vector::new(
                self.rng.random_range(-STUCK_PERTURBATION..=STUCK_PERTURBATION),
                self.rng.random_range(-STUCK_PERTURBATION..=STUCK_PERTURBATION),
            );
            self.position += jitter;
            self.speed = self.cruise_speed(env.config);
            self.state = DrivingState::StuckRecovery;
            debug!(
                "{} moved {:.2} in {:?}, perturbing by {:?}",
                self.id,
                moved,
                env.config.stuck_window(),
                jitter
            );
        }
        self.stuck_anchor = self.position;
        self.stuck_since = now;
    }
}
