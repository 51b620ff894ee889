use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SimConfig;
use crate::geometry::{self, Direction, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntersectionId(pub u32);

impl fmt::Display for IntersectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Geometry of a signalised crossing. Signal state lives in its controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    /// Unique identifier for the intersection.
    pub id: IntersectionId,
    pub center: Position,
    /// Cars within this distance of the centre are inside the crossing.
    pub radius: f64,
}

impl Intersection {
    pub fn new(id: IntersectionId, center: Position, radius: f64) -> Self {
        Self { id, center, radius }
    }

    pub fn contains(&self, pos: Position) -> bool {
        geometry::within_radius(pos, self.center, self.radius)
    }

    /// Point on the crossing's edge on the `side` it is reached from or left towards,
    /// shifted onto the lane of `lane_direction`.
    pub fn edge_point(&self, side: Direction, lane_direction: Direction, road_width: f64) -> Position {
        self.center + side.unit() * self.radius + lane_direction.lane_offset(road_width)
    }
}

/// Builds one intersection per configured position, ids in configuration order.
pub fn create_intersections(config: &SimConfig) -> Vec<Intersection> {
    config
        .intersection_positions()
        .into_iter()
        .enumerate()
        .map(|(i, center)| {
            Intersection::new(IntersectionId(i as u32), center, config.map.intersection_radius)
        })
        .collect()
}
