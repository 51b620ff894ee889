use super::Position;
use cgmath::prelude::*;

/// A cubic bezier curve
#[derive(Copy, Clone, Debug)]
pub struct CubicBezier {
    points: [Position; 4],
}

impl CubicBezier {
    pub const fn new(points: [Position; 4]) -> Self {
        Self { points }
    }

    /// Evaluates `B(t) = (1-t)³P0 + 3(1-t)²tP1 + 3(1-t)t²P2 + t³P3`.
    pub fn sample(&self, t: f64) -> Position {
        let t1 = 1.0 - t;
        Position::from_vec(
            t1 * t1 * t1 * self.points[0].to_vec()
                + 3.0 * t1 * t1 * t * self.points[1].to_vec()
                + 3.0 * t1 * t * t * self.points[2].to_vec()
                + t * t * t * self.points[3].to_vec(),
        )
    }

    /// Samples `count` points at evenly spaced `t` in `(0, 1]`; the last one is the end point.
    pub fn sample_points(&self, count: usize) -> Vec<Position> {
        (1..=count)
            .map(|i| self.sample(i as f64 / count as f64))
            .collect()
    }
}
