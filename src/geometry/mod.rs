//! Planar geometry shared by roads, intersections and vehicles.
//!
//! World coordinates follow screen conventions: x grows towards the east
//! and y grows towards the south, so NORTH is the negative y axis.

use cgmath::prelude::*;
use cgmath::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod bezier;

pub use bezier::CubicBezier;

/// A point in world coordinates.
pub type Position = Point2<f64>;

/// A displacement in world coordinates.
pub type Vector = Vector2<f64>;

/// Tolerance used for approximate geometric comparisons.
pub const EPSILON: f64 = 1e-6;

/// Heading of a vehicle, or the approach a traffic light governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// Unit vector pointing along the heading.
    pub fn unit(self) -> Vector {
        match self {
            Direction::North => Vector::new(0.0, -1.0),
            Direction::South => Vector::new(0.0, 1.0),
            Direction::East => Vector::new(1.0, 0.0),
            Direction::West => Vector::new(-1.0, 0.0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    /// The two headings reachable by a left or right turn.
    pub fn perpendiculars(self) -> [Direction; 2] {
        if self.is_vertical() {
            [Direction::East, Direction::West]
        } else {
            [Direction::North, Direction::South]
        }
    }

    /// True for NORTH and SOUTH, which travel along vertical roads.
    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }

    /// Unit vector pointing to the right-hand side of the heading.
    pub fn right_normal(self) -> Vector {
        let u = self.unit();
        Vector::new(-u.y, u.x)
    }

    /// Displacement from a road's centre line to the centre of the lane
    /// used by traffic with this heading (right-hand driving).
    ///
    /// NORTH sits east of the centre line, SOUTH west, EAST south and WEST north.
    pub fn lane_offset(self, road_width: f64) -> Vector {
        self.right_normal() * (road_width / 4.0)
    }

    /// Signed lane offset measured along the axis perpendicular to travel
    /// (x for vertical headings, y for horizontal ones).
    pub fn lane_offset_scalar(self, road_width: f64) -> f64 {
        let offset = self.lane_offset(road_width);
        if self.is_vertical() {
            offset.x
        } else {
            offset.y
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "NORTH",
            Direction::South => "SOUTH",
            Direction::East => "EAST",
            Direction::West => "WEST",
        };
        f.write_str(name)
    }
}

/// Euclidean distance between two positions.
pub fn distance(a: Position, b: Position) -> f64 {
    a.distance(b)
}

/// Approximate positional equality within [EPSILON].
pub fn approx_eq(a: Position, b: Position) -> bool {
    a.distance2(b) < EPSILON * EPSILON
}

/// Signed distance from `from` to `target` measured along `direction`.
pub fn longitudinal_gap(from: Position, target: Position, direction: Direction) -> f64 {
    (target - from).dot(direction.unit())
}

/// Unsigned distance from `from` to `target` measured across `direction`.
pub fn lateral_gap(from: Position, target: Position, direction: Direction) -> f64 {
    (target - from).dot(direction.right_normal()).abs()
}

/// Whether `target` lies strictly ahead of `from` for a vehicle heading in `direction`.
pub fn is_ahead(target: Position, from: Position, direction: Direction) -> bool {
    longitudinal_gap(from, target, direction) > EPSILON
}

/// Whether `pos` lies within `radius` of `center` (boundary inclusive).
pub fn within_radius(pos: Position, center: Position, radius: f64) -> bool {
    pos.distance2(center) <= radius * radius + EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn opposite_is_an_involution() {
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_ne!(dir.opposite(), dir);
        }
    }

    #[test]
    fn perpendiculars_never_contain_reverse_or_self() {
        for dir in Direction::ALL {
            let perps = dir.perpendiculars();
            assert!(!perps.contains(&dir));
            assert!(!perps.contains(&dir.opposite()));
            assert_ne!(perps[0], perps[1]);
        }
    }

    #[test]
    fn lane_offsets_follow_right_hand_driving() {
        let width = 40.0;
        assert_approx_eq!(Direction::North.lane_offset(width).x, 10.0);
        assert_approx_eq!(Direction::South.lane_offset(width).x, -10.0);
        assert_approx_eq!(Direction::East.lane_offset(width).y, 10.0);
        assert_approx_eq!(Direction::West.lane_offset(width).y, -10.0);
        assert_approx_eq!(Direction::East.lane_offset_scalar(width), 10.0);
        assert_approx_eq!(Direction::North.lane_offset_scalar(width), 10.0);
    }

    #[test]
    fn ahead_depends_on_heading() {
        let a = Position::new(10.0, 10.0);
        let b = Position::new(20.0, 10.0);
        assert!(is_ahead(b, a, Direction::East));
        assert!(!is_ahead(b, a, Direction::West));
        assert!(!is_ahead(a, a, Direction::East));
        let up = Position::new(10.0, 0.0);
        assert!(is_ahead(up, a, Direction::North));
        assert!(!is_ahead(up, a, Direction::South));
    }

    #[test]
    fn radius_check_is_inclusive() {
        let center = Position::new(400.0, 300.0);
        assert!(within_radius(Position::new(430.0, 300.0), center, 30.0));
        assert!(!within_radius(Position::new(430.5, 300.0), center, 30.0));
        assert_approx_eq!(distance(Position::new(0.0, 0.0), Position::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn gaps_split_along_and_across_heading() {
        let from = Position::new(0.0, 0.0);
        let to = Position::new(5.0, -3.0);
        assert_approx_eq!(longitudinal_gap(from, to, Direction::East), 5.0);
        assert_approx_eq!(lateral_gap(from, to, Direction::East), 3.0);
        assert_approx_eq!(longitudinal_gap(from, to, Direction::North), 3.0);
    }
}
