use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use traffic_agents::config::SimConfig;
use traffic_agents::geometry::Direction;
use traffic_agents::shared_data::TrafficSnapshot;
use traffic_agents::simulation_engine::simulation::Simulation;
use traffic_agents::simulation_engine::traffic_light::LightState;
use traffic_agents::simulation_engine::vehicles::CarId;

const TICK: Duration = Duration::from_millis(100);

fn busy_config() -> SimConfig {
    SimConfig::from_json(
        r#"{
            "simulation": { "seed": 99, "carsPerRoad": 4, "maxCars": 24 }
        }"#,
    )
    .unwrap()
}

fn assert_one_pair_active(snapshot: &TrafficSnapshot) {
    for i in &snapshot.intersections {
        let active = |vertical: bool| {
            i.lights
                .iter()
                .filter(|l| l.direction.is_vertical() == vertical)
                .any(|l| l.state != LightState::Red)
        };
        assert!(
            active(true) ^ active(false),
            "intersection {} in {} has both or neither pair active",
            i.id,
            i.phase
        );
    }
}

#[test]
fn long_run_keeps_core_invariants() {
    let mut sim = Simulation::new(busy_config()).unwrap();
    sim.populate();
    let ceiling_ticks =
        (sim.config().intersection_timeout().as_millis() / TICK.as_millis()) as u32 + 2;

    let mut now = Instant::now();
    let mut inside_for: HashMap<CarId, u32> = HashMap::new();
    let mut headings: HashMap<CarId, Direction> = HashMap::new();
    let mut crossings = 0;

    for step in 0..3000 {
        now += TICK;
        sim.step(now);
        if step % 10 == 0 {
            sim.top_up();
        }
        let snapshot = sim.snapshot();
        assert_one_pair_active(&snapshot);
        assert!(snapshot.cars.len() <= sim.config().simulation.max_cars);

        for car in &snapshot.cars {
            if let Some(previous) = headings.insert(car.id, car.direction) {
                assert_ne!(
                    car.direction,
                    previous.opposite(),
                    "{} reversed from {previous}",
                    car.id
                );
            }
            if car.current_intersection.is_some() {
                let ticks = inside_for.entry(car.id).or_insert(0);
                *ticks += 1;
                assert!(
                    *ticks <= ceiling_ticks,
                    "{} spent {} ticks inside an intersection",
                    car.id,
                    ticks
                );
            } else if inside_for.remove(&car.id).is_some() {
                crossings += 1;
            }
        }
    }
    assert!(crossings > 0, "no car ever crossed an intersection");
}
