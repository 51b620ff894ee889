// benches/bench_advance_vehicle.rs
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use traffic_agents::config::SimConfig;
use traffic_agents::control_system::traffic_light_controller::TrafficLightController;
use traffic_agents::geometry::{Direction, Position};
use traffic_agents::simulation_engine::grid::RoadNetwork;
use traffic_agents::simulation_engine::movement::DriveEnv;
use traffic_agents::simulation_engine::vehicles::{Car, CarId, CarSnapshot};

// A column of eastbound cars 15 units apart on the y = 300 road.
fn queue(network: &RoadNetwork, len: usize, now: Instant) -> Vec<Car> {
    let road = network.road_through(Position::new(100.0, 310.0), Direction::East);
    (0..len)
        .map(|i| {
            Car::new(
                CarId(i as u64),
                Position::new(20.0 + 15.0 * i as f64, 310.0),
                Direction::East,
                road.map(|r| r.id),
                2.0,
                10.0,
                i as u64,
                now,
            )
        })
        .collect()
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("advance");
    group.measurement_time(Duration::from_secs(5));

    let config = SimConfig::default();
    let network = RoadNetwork::from_config(&config).expect("default network");
    let start = Instant::now();
    let signals = Mutex::new(TrafficLightController::initialize(
        &network.intersections,
        &config,
        start,
    ));

    for &neighbors in [0usize, 10, 50].iter() {
        group.bench_function(format!("neighbors_{}", neighbors), |b| {
            let cars = queue(&network, neighbors + 1, start);
            let snapshots: Vec<CarSnapshot> = cars.iter().map(Car::snapshot).collect();
            let mut car = cars[0].clone();
            let mut now = start;
            b.iter(|| {
                now += Duration::from_millis(100);
                let env = DriveEnv {
                    config: &config,
                    network: &network,
                    signals: &signals,
                    neighbors: &snapshots,
                };
                black_box(car.advance(&env, now));
                if car.position().x > 300.0 {
                    car = cars[0].clone();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_advance);
criterion_main!(benches);
