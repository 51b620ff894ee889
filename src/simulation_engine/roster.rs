//! The shared list of cars.
//!
//! The list itself is copy-on-write: readers grab an `Arc` of the current
//! vector and iterate it without holding any lock, while spawn, removal and
//! reset build a new vector and swap it in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::geometry::{self, Position};
use crate::shared_data::lock;
use crate::simulation_engine::vehicles::{Car, CarId, CarSnapshot};

/// One car plus the snapshot its neighbours read.
#[derive(Debug)]
pub struct CarSlot {
    pub id: CarId,
    car: Mutex<Car>,
    published: RwLock<CarSnapshot>,
    cancelled: AtomicBool,
}

impl CarSlot {
    pub fn new(car: Car) -> Self {
        let snapshot = car.snapshot();
        Self {
            id: car.id(),
            car: Mutex::new(car),
            published: RwLock::new(snapshot),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Exclusive access to the car. Only its own tick and external corrections take this.
    pub fn car(&self) -> MutexGuard<'_, Car> {
        lock(&self.car)
    }

    pub fn publish(&self, snapshot: CarSnapshot) {
        *self.published.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Last published state; may lag the car by one tick.
    pub fn snapshot(&self) -> CarSnapshot {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
pub struct Roster {
    slots: RwLock<Arc<Vec<Arc<CarSlot>>>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current list. Later mutations do not affect the returned vector.
    pub fn current(&self) -> Arc<Vec<Arc<CarSlot>>> {
        Arc::clone(&self.slots.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap<F>(&self, edit: F)
    where
        F: FnOnce(&mut Vec<Arc<CarSlot>>),
    {
        let mut guard = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
    }

    pub fn insert(&self, slot: Arc<CarSlot>) {
        self.swap(|slots| slots.push(slot));
    }

    pub fn remove(&self, id: CarId) -> Option<Arc<CarSlot>> {
        let mut removed = None;
        self.swap(|slots| {
            if let Some(pos) = slots.iter().position(|s| s.id == id) {
                removed = Some(slots.remove(pos));
            }
        });
        removed
    }

    /// Empties the roster, returning what was in it.
    pub fn clear(&self) -> Vec<Arc<CarSlot>> {
        let mut guard = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let old = std::mem::take(&mut *guard);
        Vec::clone(&old)
    }

    pub fn get(&self, id: CarId) -> Option<Arc<CarSlot>> {
        self.current().iter().find(|s| s.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    pub fn snapshots(&self) -> Vec<CarSnapshot> {
        self.current().iter().map(|s| s.snapshot()).collect()
    }

    /// Published snapshots of other cars within `radius` of `center`.
    pub fn neighbors_of(&self, id: CarId, center: Position, radius: f64) -> Vec<CarSnapshot> {
        self.current()
            .iter()
            .filter(|s| s.id != id)
            .map(|s| s.snapshot())
            .filter(|s| geometry::distance(s.position, center) <= radius)
            .collect()
    }

    /// Whether any car is within `radius` of `pos`.
    pub fn is_occupied(&self, pos: Position, radius: f64) -> bool {
        self.current()
            .iter()
            .any(|s| geometry::distance(s.snapshot().position, pos) < radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Direction;
    use tokio::time::Instant;

    fn slot(id: u64, x: f64) -> Arc<CarSlot> {
        Arc::new(CarSlot::new(Car::new(
            CarId(id),
            Position::new(x, 310.0),
            Direction::East,
            None,
            2.0,
            10.0,
            id,
            Instant::now(),
        )))
    }

    #[test]
    fn readers_keep_their_snapshot_across_mutation() {
        let roster = Roster::new();
        roster.insert(slot(1, 0.0));
        let before = roster.current();
        roster.insert(slot(2, 50.0));
        assert_eq!(before.len(), 1);
        assert_eq!(roster.len(), 2);
        assert!(roster.remove(CarId(1)).is_some());
        assert!(roster.remove(CarId(1)).is_none());
        assert_eq!(before.len(), 1);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn neighbors_exclude_self_and_far_cars() {
        let roster = Roster::new();
        roster.insert(slot(1, 0.0));
        roster.insert(slot(2, 30.0));
        roster.insert(slot(3, 500.0));
        let near = roster.neighbors_of(CarId(1), Position::new(0.0, 310.0), 100.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].id, CarId(2));
        assert!(roster.is_occupied(Position::new(25.0, 310.0), 10.0));
    }

    #[test]
    fn clear_returns_everything() {
        let roster = Roster::new();
        roster.insert(slot(1, 0.0));
        roster.insert(slot(2, 30.0));
        let old = roster.clear();
        assert_eq!(old.len(), 2);
        assert!(roster.is_empty());
    }

    #[test]
    fn published_snapshot_lags_until_publish() {
        let s = slot(4, 0.0);
        s.car().position.x = 12.0;
        assert_eq!(s.snapshot().position.x, 0.0);
        let snap = s.car().snapshot();
        s.publish(snap);
        assert_eq!(s.snapshot().position.x, 12.0);
    }
}
