//! JSON configuration for the simulation.
//!
//! Every field has a default, so a partial file (or no file at all) still
//! yields a usable configuration. Out-of-range values are replaced by their
//! default in [SimConfig::sanitized].

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::control_system::traffic_light_controller::SignalTiming;
use crate::global_variables::{
    COOLDOWN_DURATION_MS, INTERSECTION_TIMEOUT_MS, STUCK_DISPLACEMENT_THRESHOLD, STUCK_WINDOW_MS,
};
use crate::geometry::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SimConfig {
    pub application: ApplicationConfig,
    pub car: CarConfig,
    pub traffic_light: TrafficLightConfig,
    pub map: MapConfig,
    pub simulation: SimulationConfig,
    pub signal: SignalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationConfig {
    pub window_width: f64,
    pub window_height: f64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            window_width: 1200.0,
            window_height: 800.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CarConfig {
    pub size: f64,
    /// Bumper-to-bumper distance below which a follower slows down.
    /// `None` means two car lengths.
    pub min_distance: Option<f64>,
    pub turning_path_points: usize,
    pub turning_speed_factor: f64,
    pub straight_probability: f64,
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            size: 10.0,
            min_distance: None,
            turning_path_points: 30,
            turning_speed_factor: 0.8,
            straight_probability: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrafficLightConfig {
    pub size: f64,
    pub offset: f64,
    pub detection_radius: f64,
}

impl Default for TrafficLightConfig {
    fn default() -> Self {
        Self {
            size: 15.0,
            offset: 25.0,
            detection_radius: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    pub x: f64,
    pub y: f64,
}

impl From<PointConfig> for Position {
    fn from(p: PointConfig) -> Self {
        Position::new(p.x, p.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapConfig {
    pub intersections: Vec<PointConfig>,
    pub road_width: f64,
    pub intersection_radius: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            intersections: vec![
                PointConfig { x: 400.0, y: 300.0 },
                PointConfig { x: 800.0, y: 300.0 },
                PointConfig { x: 400.0, y: 500.0 },
                PointConfig { x: 800.0, y: 500.0 },
            ],
            road_width: 40.0,
            intersection_radius: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationConfig {
    /// Milliseconds between controller ticks.
    pub traffic_light_update_interval: u64,
    /// Milliseconds between car ticks.
    pub car_update_interval: u64,
    pub car_speed: f64,
    pub cars_per_road: usize,
    pub max_cars: usize,
    /// Seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            traffic_light_update_interval: 100,
            car_update_interval: 100,
            car_speed: 2.0,
            cars_per_road: 2,
            max_cars: 50,
            seed: None,
        }
    }
}

/// Adaptive signal timing and vehicle timeouts, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalConfig {
    pub base_green_ms: u64,
    pub min_green_ms: u64,
    pub max_green_ms: u64,
    pub per_car_increment_ms: u64,
    pub yellow_ms: u64,
    pub intersection_timeout_ms: u64,
    pub cooldown_ms: u64,
    pub stuck_window_ms: u64,
    pub stuck_threshold: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            base_green_ms: 5000,
            min_green_ms: 3000,
            max_green_ms: 12000,
            per_car_increment_ms: 1000,
            yellow_ms: 2000,
            intersection_timeout_ms: INTERSECTION_TIMEOUT_MS,
            cooldown_ms: COOLDOWN_DURATION_MS,
            stuck_window_ms: STUCK_WINDOW_MS,
            stuck_threshold: STUCK_DISPLACEMENT_THRESHOLD,
        }
    }
}

fn positive_or(value: &mut f64, default: f64, name: &str) {
    if !(value.is_finite() && *value > 0.0) {
        warn!("config: {name} = {value} is invalid, using {default}");
        *value = default;
    }
}

fn nonzero_or<T>(value: &mut T, default: T, name: &str)
where
    T: PartialEq + Default + Copy + std::fmt::Display,
{
    if *value == T::default() {
        warn!("config: {name} must be non-zero, using {default}");
        *value = default;
    }
}

impl SimConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SimConfig =
            serde_json::from_str(text).context("malformed simulation configuration")?;
        Ok(config.sanitized())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in config file {}", path.display()))
    }

    /// Loads `path`, falling back to the built-in defaults when it is missing or malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => {
                info!("loaded configuration from {}", path.as_ref().display());
                config
            }
            Err(e) => {
                warn!("{e:#}; using default configuration");
                Self::default()
            }
        }
    }

    /// Returns a copy where every out-of-range value is replaced by its default.
    pub fn sanitized(mut self) -> Self {
        let app = ApplicationConfig::default();
        positive_or(&mut self.application.window_width, app.window_width, "application.windowWidth");
        positive_or(&mut self.application.window_height, app.window_height, "application.windowHeight");

        let car = CarConfig::default();
        positive_or(&mut self.car.size, car.size, "car.size");
        if let Some(d) = self.car.min_distance {
            if !(d.is_finite() && d > self.car.size) {
                warn!("config: car.minDistance = {d} must exceed the car size, using two car lengths");
                self.car.min_distance = None;
            }
        }
        nonzero_or(&mut self.car.turning_path_points, car.turning_path_points, "car.turningPathPoints");
        positive_or(&mut self.car.turning_speed_factor, car.turning_speed_factor, "car.turningSpeedFactor");
        if !(0.0..=1.0).contains(&self.car.straight_probability) {
            warn!(
                "config: car.straightProbability = {} is outside [0, 1], using {}",
                self.car.straight_probability, car.straight_probability
            );
            self.car.straight_probability = car.straight_probability;
        }

        let light = TrafficLightConfig::default();
        positive_or(&mut self.traffic_light.size, light.size, "trafficLight.size");
        positive_or(&mut self.traffic_light.offset, light.offset, "trafficLight.offset");
        positive_or(&mut self.traffic_light.detection_radius, light.detection_radius, "trafficLight.detectionRadius");

        let map = MapConfig::default();
        positive_or(&mut self.map.road_width, map.road_width, "map.roadWidth");
        positive_or(&mut self.map.intersection_radius, map.intersection_radius, "map.intersectionRadius");
        if self.map.intersections.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            warn!("config: map.intersections contains non-finite coordinates, dropping them");
            self.map.intersections.retain(|p| p.x.is_finite() && p.y.is_finite());
        }

        let sim = SimulationConfig::default();
        nonzero_or(&mut self.simulation.traffic_light_update_interval, sim.traffic_light_update_interval, "simulation.trafficLightUpdateInterval");
        nonzero_or(&mut self.simulation.car_update_interval, sim.car_update_interval, "simulation.carUpdateInterval");
        positive_or(&mut self.simulation.car_speed, sim.car_speed, "simulation.carSpeed");

        let signal = SignalConfig::default();
        nonzero_or(&mut self.signal.min_green_ms, signal.min_green_ms, "signal.minGreenMs");
        nonzero_or(&mut self.signal.yellow_ms, signal.yellow_ms, "signal.yellowMs");
        if self.signal.max_green_ms < self.signal.min_green_ms {
            warn!(
                "config: signal.maxGreenMs = {} is below minGreenMs, using {}",
                self.signal.max_green_ms,
                self.signal.min_green_ms.max(signal.max_green_ms)
            );
            self.signal.max_green_ms = self.signal.min_green_ms.max(signal.max_green_ms);
        }
        nonzero_or(&mut self.signal.intersection_timeout_ms, signal.intersection_timeout_ms, "signal.intersectionTimeoutMs");
        nonzero_or(&mut self.signal.stuck_window_ms, signal.stuck_window_ms, "signal.stuckWindowMs");
        positive_or(&mut self.signal.stuck_threshold, signal.stuck_threshold, "signal.stuckThreshold");
        self
    }

    pub fn min_car_distance(&self) -> f64 {
        self.car.min_distance.unwrap_or(self.car.size * 2.0)
    }

    pub fn turning_speed(&self) -> f64 {
        self.simulation.car_speed * self.car.turning_speed_factor
    }

    /// Radius within which cars look for traffic ahead of them.
    pub fn car_detection_radius(&self) -> f64 {
        self.traffic_light.detection_radius * 2.0
    }

    pub fn car_tick(&self) -> Duration {
        Duration::from_millis(self.simulation.car_update_interval)
    }

    pub fn light_tick(&self) -> Duration {
        Duration::from_millis(self.simulation.traffic_light_update_interval)
    }

    pub fn intersection_timeout(&self) -> Duration {
        Duration::from_millis(self.signal.intersection_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.signal.cooldown_ms)
    }

    pub fn stuck_window(&self) -> Duration {
        Duration::from_millis(self.signal.stuck_window_ms)
    }

    pub fn signal_timing(&self) -> SignalTiming {
        SignalTiming {
            base_green: Duration::from_millis(self.signal.base_green_ms),
            min_green: Duration::from_millis(self.signal.min_green_ms),
            max_green: Duration::from_millis(self.signal.max_green_ms),
            per_car_increment: Duration::from_millis(self.signal.per_car_increment_ms),
            yellow: Duration::from_millis(self.signal.yellow_ms),
        }
    }

    pub fn intersection_positions(&self) -> Vec<Position> {
        self.map.intersections.iter().copied().map(Position::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SimConfig::from_json("{}").unwrap();
        assert_eq!(config, SimConfig::default());
        assert_approx_eq!(config.min_car_distance(), 20.0);
        assert_approx_eq!(config.turning_speed(), 1.6);
        assert_approx_eq!(config.car_detection_radius(), 100.0);
        assert_eq!(config.car_tick(), Duration::from_millis(100));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = SimConfig::from_json(
            r#"{
                "application": { "windowWidth": 800 },
                "map": { "intersections": [ { "x": 400, "y": 300 } ], "roadWidth": 50 },
                "simulation": { "carSpeed": 3.5 }
            }"#,
        )
        .unwrap();
        assert_approx_eq!(config.application.window_width, 800.0);
        assert_approx_eq!(config.application.window_height, 800.0);
        assert_eq!(config.intersection_positions(), vec![Position::new(400.0, 300.0)]);
        assert_approx_eq!(config.map.road_width, 50.0);
        assert_approx_eq!(config.map.intersection_radius, 30.0);
        assert_approx_eq!(config.simulation.car_speed, 3.5);
        assert_eq!(config.simulation.max_cars, 50);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = SimConfig::from_json(
            r#"{
                "car": { "size": -4, "straightProbability": 1.5, "turningPathPoints": 0 },
                "simulation": { "carSpeed": 0, "carUpdateInterval": 0 },
                "signal": { "minGreenMs": 4000, "maxGreenMs": 1000 }
            }"#,
        )
        .unwrap();
        assert_approx_eq!(config.car.size, 10.0);
        assert_approx_eq!(config.car.straight_probability, 0.5);
        assert_eq!(config.car.turning_path_points, 30);
        assert_approx_eq!(config.simulation.car_speed, 2.0);
        assert_eq!(config.simulation.car_update_interval, 100);
        assert!(config.signal.max_green_ms >= config.signal.min_green_ms);
    }

    #[test]
    fn malformed_json_is_an_error_but_load_or_default_recovers() {
        assert!(SimConfig::from_json("{ not json").is_err());
        let config = SimConfig::load_or_default("does/not/exist.json");
        assert_eq!(config, SimConfig::default());
    }
}
