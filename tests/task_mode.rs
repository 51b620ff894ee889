use std::time::Duration;

use traffic_agents::config::SimConfig;
use traffic_agents::simulation_engine::simulation::Simulation;
use traffic_agents::simulation_engine::traffic_light::LightState;

#[tokio::test(start_paused = true)]
async fn tasks_drive_cars_until_stopped() {
    let config = SimConfig::from_json(r#"{ "simulation": { "seed": 3 } }"#).unwrap();
    let mut sim = Simulation::new(config).unwrap();
    let placed = sim.populate();
    assert!(placed > 0);
    let before = sim.snapshot();

    sim.start();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = sim.snapshot();
        for i in &snapshot.intersections {
            let ns = i
                .lights
                .iter()
                .any(|l| l.direction.is_vertical() && l.state != LightState::Red);
            let ew = i
                .lights
                .iter()
                .any(|l| !l.direction.is_vertical() && l.state != LightState::Red);
            assert!(ns ^ ew);
        }
        sim.top_up();
        assert!(sim.car_count() <= sim.config().simulation.max_cars);
    }
    sim.stop().await;

    let after = sim.snapshot();
    let moved = before
        .cars
        .iter()
        .filter(|b| {
            after
                .cars
                .iter()
                .find(|a| a.id == b.id)
                .map_or(true, |a| a.position != b.position)
        })
        .count();
    assert!(moved > 0, "no car moved while the tasks were running");

    sim.reset().await;
    assert_eq!(sim.car_count(), 0);
    assert!(sim.snapshot().intersections.iter().all(|i| i.total_waiting() == 0));
}
