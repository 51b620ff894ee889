use anyhow::{Context, Result};
use log::debug;

use crate::config::SimConfig;
use crate::geometry::{Direction, Position};
use crate::simulation_engine::intersections::{create_intersections, Intersection, IntersectionId};
use crate::simulation_engine::roads::{create_roads_from_intersections, Road, RoadId};

/// Where a new car enters the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub position: Position,
    pub direction: Direction,
    pub road: RoadId,
}

/// The static road network: roads, intersections and the world bounds.
/// Shared read-only by every car once built.
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    /// Stores all roads, horizontal ones first.
    pub roads: Vec<Road>,
    pub intersections: Vec<Intersection>,
    pub width: f64,
    pub height: f64,
}

impl RoadNetwork {
    pub fn new(roads: Vec<Road>, intersections: Vec<Intersection>, width: f64, height: f64) -> Self {
        Self {
            roads,
            intersections,
            width,
            height,
        }
    }

    /// Builds intersections from the configured positions and one road per row and column.
    pub fn from_config(config: &SimConfig) -> Result<Self> {
        let intersections = create_intersections(config);
        let roads = create_roads_from_intersections(
            &intersections,
            config.application.window_width,
            config.application.window_height,
            config.map.road_width,
        )
        .context("failed to build roads from the configured intersections")?;
        debug!(
            "road network: {} roads, {} intersections",
            roads.len(),
            intersections.len()
        );
        Ok(Self::new(
            roads,
            intersections,
            config.application.window_width,
            config.application.window_height,
        ))
    }

    pub fn road(&self, id: RoadId) -> Option<&Road> {
        self.roads.iter().find(|r| r.id == id)
    }

    pub fn intersection(&self, id: IntersectionId) -> Option<&Intersection> {
        self.intersections.iter().find(|i| i.id == id)
    }

    /// The intersection whose radius contains `pos`, if any.
    pub fn intersection_at(&self, pos: Position) -> Option<&Intersection> {
        self.intersections.iter().find(|i| i.contains(pos))
    }

    /// The road that leaves `intersection` carrying traffic in `direction`.
    pub fn find_road(&self, intersection: &Intersection, direction: Direction) -> Option<&Road> {
        self.road_through(intersection.center, direction)
    }

    /// A road carrying `direction` whose surface covers `pos`.
    pub fn road_through(&self, pos: Position, direction: Direction) -> Option<&Road> {
        self.roads
            .iter()
            .find(|r| r.carries(direction) && r.passes_through(pos, r.width / 2.0))
    }

    /// Directions in which some road leaves `intersection`.
    pub fn exits_from(&self, intersection: &Intersection) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|&d| self.find_road(intersection, d).is_some())
            .collect()
    }

    /// True when `pos` lies more than `margin` beyond the world bounds.
    pub fn is_outside(&self, pos: Position, margin: f64) -> bool {
        pos.x < -margin || pos.y < -margin || pos.x > self.width + margin || pos.y > self.height + margin
    }

    /// Two entry points per road, one at each end, heading inwards on the right-hand lane.
    pub fn spawn_points(&self) -> Vec<SpawnPoint> {
        let mut points = Vec::with_capacity(self.roads.len() * 2);
        for road in &self.roads {
            let (low, high, forward, backward) = if road.is_horizontal() {
                (
                    road.start.x.min(road.end.x),
                    road.start.x.max(road.end.x),
                    Direction::East,
                    Direction::West,
                )
            } else {
                (
                    road.start.y.min(road.end.y),
                    road.start.y.max(road.end.y),
                    Direction::South,
                    Direction::North,
                )
            };
            for (along, direction) in [(low, forward), (high, backward)] {
                let lane = road.axis_coord() + direction.lane_offset_scalar(road.width);
                let position = if road.is_horizontal() {
                    Position::new(along, lane)
                } else {
                    Position::new(lane, along)
                };
                points.push(SpawnPoint {
                    position,
                    direction,
                    road: road.id,
                });
            }
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn network() -> RoadNetwork {
        RoadNetwork::from_config(&SimConfig::default()).unwrap()
    }

    #[test]
    fn every_default_intersection_has_four_exits() {
        let net = network();
        for i in &net.intersections {
            assert_eq!(net.exits_from(i).len(), 4, "intersection {}", i.id);
        }
    }

    #[test]
    fn find_road_matches_orientation() {
        let net = network();
        let i = &net.intersections[0];
        let east = net.find_road(i, Direction::East).unwrap();
        assert!(east.is_horizontal());
        assert_approx_eq!(east.axis_coord(), i.center.y);
        let north = net.find_road(i, Direction::North).unwrap();
        assert!(north.is_vertical());
        assert_approx_eq!(north.axis_coord(), i.center.x);
    }

    #[test]
    fn bounds_respect_margin() {
        let net = network();
        assert!(!net.is_outside(Position::new(-5.0, 100.0), 10.0));
        assert!(net.is_outside(Position::new(-11.0, 100.0), 10.0));
        assert!(net.is_outside(Position::new(600.0, 811.0), 10.0));
    }

    #[test]
    fn spawn_points_head_into_the_world() {
        let net = network();
        let points = net.spawn_points();
        assert_eq!(points.len(), net.roads.len() * 2);
        for p in points {
            let next = p.position + p.direction.unit() * 10.0;
            assert!(!net.is_outside(next, 0.0), "{:?}", p);
            let road = net.road(p.road).unwrap();
            assert!(road.carries(p.direction));
        }
    }
}
