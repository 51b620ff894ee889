use serde::{Deserialize, Serialize};

use crate::geometry::{Direction, Position};
use crate::simulation_engine::intersections::Intersection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightState {
    Green,
    Yellow,
    Red,
}

/// One signal face of an intersection, governing traffic that travels in `direction`.
/// Only the owning controller changes `state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLight {
    pub direction: Direction,
    pub state: LightState,
    /// Where the face is drawn.
    pub position: Position,
}

impl TrafficLight {
    /// Places the face `offset` from the centre on the side that `direction` traffic
    /// approaches from, over the lane it governs.
    pub fn new(intersection: &Intersection, direction: Direction, offset: f64, road_width: f64) -> Self {
        let position = intersection.center - direction.unit() * offset
            + direction.lane_offset(road_width);
        Self {
            direction,
            state: LightState::Red,
            position,
        }
    }

    pub fn is_red(&self) -> bool {
        self.state == LightState::Red
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::intersections::IntersectionId;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn faces_sit_on_the_approach_side() {
        let i = Intersection::new(IntersectionId(0), Position::new(400.0, 300.0), 30.0);
        let east = TrafficLight::new(&i, Direction::East, 25.0, 40.0);
        assert_approx_eq!(east.position.x, 375.0);
        assert_approx_eq!(east.position.y, 310.0);
        let north = TrafficLight::new(&i, Direction::North, 25.0, 40.0);
        assert_approx_eq!(north.position.x, 410.0);
        assert_approx_eq!(north.position.y, 325.0);
        assert!(north.is_red());
    }
}
