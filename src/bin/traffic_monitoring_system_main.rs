// Prints a summary of a traffic sample log written by simulation_main.
//
// usage: traffic_monitoring_system_main [samples.csv]
use std::env;

use anyhow::Result;
use traffic_agents::global_variables::TRAFFIC_LOG_CSV;
use traffic_agents::monitoring::traffic_monitoring_system::generate_report;

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| TRAFFIC_LOG_CSV.to_string());
    println!("Generating Report from {path}...");
    let report = generate_report(&path)?;
    print!("{report}");
    Ok(())
}
