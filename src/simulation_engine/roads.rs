use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::{Direction, Position, EPSILON};
use crate::simulation_engine::intersections::Intersection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoadId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned road segment. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Road {
    pub id: RoadId,
    pub start: Position,
    pub end: Position,
    pub width: f64,
}

impl Road {
    /// Builds a road, rejecting diagonal or zero-length segments.
    pub fn new(id: RoadId, x1: f64, y1: f64, x2: f64, y2: f64, width: f64) -> Result<Self> {
        let same_x = (x1 - x2).abs() < EPSILON;
        let same_y = (y1 - y2).abs() < EPSILON;
        if same_x && same_y {
            bail!("road {:?} has zero length at ({x1}, {y1})", id);
        }
        if !same_x && !same_y {
            bail!("road {:?} from ({x1}, {y1}) to ({x2}, {y2}) is not axis-aligned", id);
        }
        if !(width.is_finite() && width > 0.0) {
            bail!("road {:?} has invalid width {width}", id);
        }
        Ok(Self {
            id,
            start: Position::new(x1, y1),
            end: Position::new(x2, y2),
            width,
        })
    }

    pub fn orientation(&self) -> Orientation {
        if (self.start.y - self.end.y).abs() < EPSILON {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.orientation() == Orientation::Horizontal
    }

    pub fn is_vertical(&self) -> bool {
        self.orientation() == Orientation::Vertical
    }

    /// The fixed coordinate of the centre line: y for horizontal roads, x for vertical ones.
    pub fn axis_coord(&self) -> f64 {
        match self.orientation() {
            Orientation::Horizontal => self.start.y,
            Orientation::Vertical => self.start.x,
        }
    }

    /// Whether traffic heading in `direction` drives along this road.
    pub fn carries(&self, direction: Direction) -> bool {
        direction.is_vertical() == self.is_vertical()
    }

    /// Centre-line coordinate of the lane used by `direction`, if this road carries it.
    pub fn lane_center(&self, direction: Direction) -> Option<f64> {
        self.carries(direction)
            .then(|| self.axis_coord() + direction.lane_offset_scalar(self.width))
    }

    /// Whether the road's centre line passes through `pos` within `tolerance` across the road.
    pub fn passes_through(&self, pos: Position, tolerance: f64) -> bool {
        let (lo, hi, along, across) = match self.orientation() {
            Orientation::Horizontal => (
                self.start.x.min(self.end.x),
                self.start.x.max(self.end.x),
                pos.x,
                (pos.y - self.start.y).abs(),
            ),
            Orientation::Vertical => (
                self.start.y.min(self.end.y),
                self.start.y.max(self.end.y),
                pos.y,
                (pos.x - self.start.x).abs(),
            ),
        };
        across <= tolerance && along >= lo - tolerance && along <= hi + tolerance
    }
}

/// One horizontal road per distinct intersection y and one vertical road per
/// distinct x, each spanning the whole world.
pub fn create_roads_from_intersections(
    intersections: &[Intersection],
    world_width: f64,
    world_height: f64,
    road_width: f64,
) -> Result<Vec<Road>> {
    // f64 is not Ord; dedupe on coordinates rounded to 1/1000.
    let ys: BTreeSet<i64> = intersections
        .iter()
        .map(|i| (i.center.y * 1000.0).round() as i64)
        .collect();
    let xs: BTreeSet<i64> = intersections
        .iter()
        .map(|i| (i.center.x * 1000.0).round() as i64)
        .collect();

    let mut roads = Vec::with_capacity(xs.len() + ys.len());
    let mut next_id = 0;
    for y in ys {
        let y = y as f64 / 1000.0;
        roads.push(Road::new(RoadId(next_id), 0.0, y, world_width, y, road_width)?);
        next_id += 1;
    }
    for x in xs {
        let x = x as f64 / 1000.0;
        roads.push(Road::new(RoadId(next_id), x, 0.0, x, world_height, road_width)?);
        next_id += 1;
    }
    Ok(roads)
}
