// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default-map.json";

// Monitoring output
pub const TRAFFIC_LOG_CSV: &str = "traffic_samples.csv";

// Vehicle timing (milliseconds)
pub const COOLDOWN_DURATION_MS: u64 = 2000;
pub const INTERSECTION_TIMEOUT_MS: u64 = 5000;
pub const STUCK_WINDOW_MS: u64 = 3000;
pub const EXTERNAL_CORRECTION_INTERVAL_MS: u64 = 500;

// Vehicle motion tuning
pub const STUCK_DISPLACEMENT_THRESHOLD: f64 = 2.0;
pub const STUCK_PERTURBATION: f64 = 1.0;
pub const CONTACT_SPEED_FACTOR: f64 = 0.05;
pub const SAFETY_SPEED_FLOOR: f64 = 0.3;
pub const SPEED_RECOVERY_RATE: f64 = 0.1;
pub const LANE_PULL_FACTOR: f64 = 0.25;
pub const BEZIER_CONTROL_FRACTION: f64 = 0.5;
pub const STRAIGHT_PATH_PADDING: usize = 4;
