//! Network-side protection: live connection tracking and IP reputation.

pub mod connection_tracker;
pub mod reputation;
pub mod types;

pub use connection_tracker::ConnectionTracker;
pub use reputation::ReputationStore;
pub use types::{
    BanReason, BannedIp, Connection, NetworkStats, Protocol, SuspicionEntry, TrafficDelta,
    TrafficTotals,
};
