use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample of server health, as produced by a metrics tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu: f64,
    pub memory: f64,
    pub tps: f64,
    pub network_in: u64,
    pub network_out: u64,
    pub players: usize,
}

/// A timestamped snapshot stored in the history buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub memory: f64,
    pub tps: f64,
    pub network_in: u64,
    pub network_out: u64,
    pub players: usize,
}

impl HistoricalPoint {
    pub fn new(timestamp: DateTime<Utc>, snapshot: MetricsSnapshot) -> Self {
        Self {
            timestamp,
            cpu: snapshot.cpu,
            memory: snapshot.memory,
            tps: snapshot.tps,
            network_in: snapshot.network_in,
            network_out: snapshot.network_out,
            players: snapshot.players,
        }
    }
}
