// simulation_main.rs
//
// Headless driver: loads the map, fills it with cars, runs the car and light
// tasks, and samples the intersections into a CSV log once per second.
//
// usage: simulation_main [config.json] [seconds]
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use traffic_agents::config::SimConfig;
use traffic_agents::global_variables::{DEFAULT_CONFIG_PATH, TRAFFIC_LOG_CSV};
use traffic_agents::monitoring::traffic_monitoring_system::TrafficRecorder;
use traffic_agents::simulation_engine::simulation::Simulation;

const DEFAULT_RUN_SECONDS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let seconds = match args.next() {
        Some(s) => s
            .parse::<u64>()
            .with_context(|| format!("run length must be whole seconds, got {s:?}"))?,
        None => DEFAULT_RUN_SECONDS,
    };

    let config = SimConfig::load_or_default(&config_path);
    let mut simulation = Simulation::new(config)?;
    let recorder = TrafficRecorder::new(TRAFFIC_LOG_CSV);

    let placed = simulation.populate();
    info!(
        "{} intersections, {} roads, {} cars placed",
        simulation.network().intersections.len(),
        simulation.network().roads.len(),
        placed
    );

    simulation.start();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for _ in 0..=seconds {
        ticker.tick().await;
        recorder.record_or_warn(&simulation.snapshot());
        simulation.top_up();
    }
    simulation.stop().await;

    let snapshot = simulation.snapshot();
    for i in &snapshot.intersections {
        info!(
            "intersection {}: {} with {} waiting",
            i.id,
            i.phase,
            i.total_waiting()
        );
    }
    info!(
        "finished with {} cars, samples in {}",
        snapshot.cars.len(),
        recorder.path().display()
    );
    Ok(())
}
