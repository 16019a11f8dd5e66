use super::types::{HistoricalPoint, MetricsSnapshot};
use crate::clock::Clock;
use crate::table::Table;
use chrono::{DateTime, Utc};
use log::trace;
use std::collections::VecDeque;
use std::sync::Arc;

/// Fixed-capacity, insertion-ordered history of metrics samples.
///
/// Appending to a full buffer drops the oldest point. There is no other way to mutate it.
pub struct MetricsHistory {
    points: Table<VecDeque<HistoricalPoint>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl MetricsHistory {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            points: Table::new("metrics_history", VecDeque::with_capacity(capacity)),
            capacity,
            clock,
        }
    }

    pub fn add_point(&self, snapshot: MetricsSnapshot) -> HistoricalPoint {
        let point = HistoricalPoint::new(self.clock.now(), snapshot);
        let mut points = self.points.lock();
        points.push_back(point);
        while points.len() > self.capacity {
            points.pop_front();
        }
        trace!("Metrics point added ({} stored)", points.len());
        point
    }

    /// All stored points, oldest first.
    pub fn points(&self) -> Vec<HistoricalPoint> {
        self.points.lock().iter().copied().collect()
    }

    pub fn since(&self, from: DateTime<Utc>) -> Vec<HistoricalPoint> {
        self.points
            .lock()
            .iter()
            .filter(|p| p.timestamp >= from)
            .copied()
            .collect()
    }

    pub fn latest(&self) -> Option<HistoricalPoint> {
        self.points.lock().back().copied()
    }

    pub fn len(&self) -> usize {
        self.points.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
