// route_generation.rs
//
// Picks where a car goes at an intersection and lays out the waypoints it
// follows across it. Straight crossings are a short padded line, turns are a
// sampled cubic bezier from the car's position to the exit edge.

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::config::SimConfig;
use crate::geometry::{CubicBezier, Direction, Position};
use crate::global_variables::{BEZIER_CONTROL_FRACTION, STRAIGHT_PATH_PADDING};
use crate::simulation_engine::intersections::Intersection;

/// Chooses the heading a car leaves an intersection with.
///
/// Goes straight with probability `straight_probability`, otherwise picks one of
/// the two perpendicular headings uniformly. Headings missing from `available`
/// are skipped (an empty slice allows all of them). Never returns the reverse
/// of `current`; when nothing else is allowed the car keeps its heading.
pub fn choose_target_direction<R: Rng + ?Sized>(
    rng: &mut R,
    current: Direction,
    straight_probability: f64,
    available: &[Direction],
) -> Direction {
    let allowed = |d: Direction| available.is_empty() || available.contains(&d);
    let turns: Vec<Direction> = current
        .perpendiculars()
        .into_iter()
        .filter(|&d| allowed(d))
        .collect();

    let p = if straight_probability.is_finite() {
        straight_probability.clamp(0.0, 1.0)
    } else {
        0.5
    };
    if turns.is_empty() || (allowed(current) && rng.random_bool(p)) {
        return current;
    }
    match turns.choose(rng) {
        Some(&d) => d,
        None => current,
    }
}

/// Waypoints across `intersection` for a car at `position` heading `direction`
/// and leaving towards `target`. The last waypoint is the exit point on the
/// intersection edge, on `target`'s lane.
pub fn plan_path(
    position: Position,
    direction: Direction,
    target: Direction,
    intersection: &Intersection,
    config: &SimConfig,
) -> Vec<Position> {
    let road_width = config.map.road_width;
    let exit = intersection.edge_point(target, target, road_width);

    if target == direction {
        let segments = STRAIGHT_PATH_PADDING + 1;
        let mut path = Vec::with_capacity(segments + 1);
        path.push(position);
        for i in 1..segments {
            let t = i as f64 / segments as f64;
            path.push(position + (exit - position) * t);
        }
        path.push(exit);
        return path;
    }

    // The curve starts where the car already is, so its first step is forward.
    let reach = BEZIER_CONTROL_FRACTION * intersection.radius;
    let curve = CubicBezier::new([
        position,
        position + direction.unit() * reach,
        exit - target.unit() * reach,
        exit,
    ]);
    let mut path = curve.sample_points(config.car.turning_path_points.max(1));
    path.pop();
    path.push(exit);
    path
}
