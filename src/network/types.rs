use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    TCP,
    UDP,
}

/// A live transport connection, identified by its remote (ip, port).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub addr: SocketAddr,
    pub protocol: Protocol,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub player: Option<String>,
}

impl Connection {
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }
}

/// Traffic observed on a connection since the previous update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficDelta {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
}

/// Running totals across every connection ever tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficTotals {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
}

impl TrafficTotals {
    pub fn add(&mut self, delta: &TrafficDelta) {
        self.bytes_in = self.bytes_in.saturating_add(delta.bytes_in);
        self.bytes_out = self.bytes_out.saturating_add(delta.bytes_out);
        self.packets_in = self.packets_in.saturating_add(delta.packets_in);
        self.packets_out = self.packets_out.saturating_add(delta.packets_out);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStats {
    pub totals: TrafficTotals,
    pub active_connections: usize,
    /// Highest number of simultaneous connections seen; never decreases.
    pub peak_connections: usize,
    pub banned_ips: usize,
    pub suspicious_ips: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanReason {
    /// Banned by an operator.
    Manual,
    /// Promoted after repeated suspicious activity.
    Suspicious,
}

/// A persistent network ban, lifted only by an explicit unban.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedIp {
    pub ip: IpAddr,
    pub banned_at: DateTime<Utc>,
    pub reason: BanReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspicionEntry {
    pub ip: IpAddr,
    pub count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
