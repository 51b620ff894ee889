use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::shared_data::TrafficSnapshot;

/// One CSV row: the state of one intersection at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSampleRecord {
    pub timestamp: u64,
    pub intersection: u32,
    pub phase: String,
    pub waiting_north: usize,
    pub waiting_south: usize,
    pub waiting_east: usize,
    pub waiting_west: usize,
    /// Cars currently crossing this intersection.
    pub cars_inside: usize,
    /// Cars on the whole map.
    pub cars_total: usize,
}

impl TrafficSampleRecord {
    pub fn total_waiting(&self) -> usize {
        self.waiting_north + self.waiting_south + self.waiting_east + self.waiting_west
    }
}

/// Generic helper to append records to a CSV file, writing the header only for a new file.
fn log_to_csv<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let file_exists = path.exists();
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Appends per-intersection samples of the running simulation to a CSV log.
#[derive(Debug, Clone)]
pub struct TrafficRecorder {
    path: PathBuf,
}

impl TrafficRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one row per intersection in `snapshot`. Returns the number of rows.
    pub fn record(&self, snapshot: &TrafficSnapshot) -> Result<usize> {
        let rows: Vec<TrafficSampleRecord> = snapshot
            .intersections
            .iter()
            .map(|i| TrafficSampleRecord {
                timestamp: snapshot.timestamp,
                intersection: i.id.0,
                phase: i.phase.to_string(),
                waiting_north: i.waiting[0],
                waiting_south: i.waiting[1],
                waiting_east: i.waiting[2],
                waiting_west: i.waiting[3],
                cars_inside: snapshot.cars_inside(i.id),
                cars_total: snapshot.cars.len(),
            })
            .collect();
        log_to_csv(&self.path, &rows)
            .with_context(|| format!("failed to record traffic samples to {}", self.path.display()))?;
        debug!("recorded {} samples to {}", rows.len(), self.path.display());
        Ok(rows.len())
    }

    /// Like [TrafficRecorder::record] but only logs failures.
    pub fn record_or_warn(&self, snapshot: &TrafficSnapshot) {
        if let Err(e) = self.record(snapshot) {
            warn!("{e:#}");
        }
    }
}

pub fn read_samples(path: impl AsRef<Path>) -> Result<Vec<TrafficSampleRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut samples = Vec::new();
    for result in rdr.deserialize() {
        let record: TrafficSampleRecord =
            result.with_context(|| format!("malformed row in {}", path.display()))?;
        samples.push(record);
    }
    Ok(samples)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionSummary {
    pub intersection: u32,
    pub samples: usize,
    pub mean_waiting: f64,
    pub max_waiting: usize,
    pub max_inside: usize,
    /// How many samples fell in each phase.
    pub phases: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrafficReport {
    pub samples: usize,
    pub first_timestamp: Option<u64>,
    pub last_timestamp: Option<u64>,
    pub peak_cars: usize,
    pub intersections: Vec<IntersectionSummary>,
}

impl TrafficReport {
    pub fn from_samples(samples: &[TrafficSampleRecord]) -> Self {
        let mut grouped: BTreeMap<u32, Vec<&TrafficSampleRecord>> = BTreeMap::new();
        for s in samples {
            grouped.entry(s.intersection).or_default().push(s);
        }
        let intersections = grouped
            .into_iter()
            .map(|(intersection, rows)| {
                let total: usize = rows.iter().map(|r| r.total_waiting()).sum();
                let mut phases = BTreeMap::new();
                for r in &rows {
                    *phases.entry(r.phase.clone()).or_insert(0) += 1;
                }
                IntersectionSummary {
                    intersection,
                    samples: rows.len(),
                    mean_waiting: total as f64 / rows.len() as f64,
                    max_waiting: rows.iter().map(|r| r.total_waiting()).max().unwrap_or(0),
                    max_inside: rows.iter().map(|r| r.cars_inside).max().unwrap_or(0),
                    phases,
                }
            })
            .collect();
        Self {
            samples: samples.len(),
            first_timestamp: samples.iter().map(|s| s.timestamp).min(),
            last_timestamp: samples.iter().map(|s| s.timestamp).max(),
            peak_cars: samples.iter().map(|s| s.cars_total).max().unwrap_or(0),
            intersections,
        }
    }
}

impl fmt::Display for TrafficReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Report Summary:")?;
        writeln!(f, "Samples: {}", self.samples)?;
        if let (Some(first), Some(last)) = (self.first_timestamp, self.last_timestamp) {
            writeln!(f, "Span: {:.1} s", (last - first) as f64 / 1000.0)?;
        }
        writeln!(f, "Peak cars on map: {}", self.peak_cars)?;
        for s in &self.intersections {
            writeln!(
                f,
                "Intersection I{}: {} samples, mean waiting {:.2}, max waiting {}, max inside {}",
                s.intersection, s.samples, s.mean_waiting, s.max_waiting, s.max_inside
            )?;
            for (phase, count) in &s.phases {
                writeln!(f, "  {phase}: {count}")?;
            }
        }
        Ok(())
    }
}

/// Summarises the CSV log at `path`.
pub fn generate_report(path: impl AsRef<Path>) -> Result<TrafficReport> {
    let samples = read_samples(path)?;
    Ok(TrafficReport::from_samples(&samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::traffic_light_controller::Phase;
    use crate::geometry::{Direction, Position};
    use crate::shared_data::IntersectionSnapshot;
    use crate::simulation_engine::intersections::IntersectionId;
    use crate::simulation_engine::vehicles::{CarId, CarSnapshot, DrivingState};

    fn temp_csv(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "traffic_agents_{}_{}.csv",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn snapshot(timestamp: u64, waiting: [usize; 4], phase: Phase) -> TrafficSnapshot {
        TrafficSnapshot {
            timestamp,
            cars: vec![CarSnapshot {
                id: CarId(1),
                position: Position::new(400.0, 300.0),
                direction: Direction::East,
                speed: 1.6,
                size: 10.0,
                road: None,
                current_intersection: Some(IntersectionId(0)),
                state: DrivingState::FollowingPath,
            }],
            intersections: vec![IntersectionSnapshot {
                id: IntersectionId(0),
                center: Position::new(400.0, 300.0),
                radius: 30.0,
                phase,
                lights: Vec::new(),
                waiting,
            }],
        }
    }

    #[test]
    fn records_append_and_summarise() {
        let path = temp_csv("append");
        let recorder = TrafficRecorder::new(&path);
        assert_eq!(recorder.record(&snapshot(1000, [0, 0, 2, 1], Phase::GreenNs)).unwrap(), 1);
        assert_eq!(recorder.record(&snapshot(3000, [1, 0, 0, 0], Phase::GreenEw)).unwrap(), 1);

        let samples = read_samples(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].phase, "GREEN_NS");
        assert_eq!(samples[0].cars_inside, 1);

        let report = generate_report(&path).unwrap();
        assert_eq!(report.samples, 2);
        assert_eq!(report.peak_cars, 1);
        let s = &report.intersections[0];
        assert_eq!(s.max_waiting, 3);
        assert!((s.mean_waiting - 2.0).abs() < 1e-9);
        assert_eq!(s.phases.get("GREEN_EW"), Some(&1));
        assert!(report.to_string().contains("Span: 2.0 s"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_log_is_an_error() {
        let path = temp_csv("missing");
        assert!(generate_report(&path).is_err());
    }
}
