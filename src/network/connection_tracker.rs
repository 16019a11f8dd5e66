//! # Connection Tracker Module
//!
//! Keeps the table of live transport connections, their traffic counters and the global
//! running totals. Connections are keyed by remote `(ip, port)`, so several connections from
//! the same address stay distinct.
//!
//! ```text
//! ┌─────────────────┐    ┌───────────────────┐    ┌─────────────────┐
//! │ Transport       │───▶│ ConnectionTracker │───▶│ ReputationStore │
//! │ open/update/    │    │                   │    │ (suspicion,     │
//! │ close events    │    │ - traffic totals  │    │  bans)          │
//! └─────────────────┘    │ - idle eviction   │    └─────────────────┘
//!                        │ - peak connections│
//!                        └───────────────────┘
//! ```
//!
//! Idle connections are only evicted by [`ConnectionTracker::sweep`]; reading the table never
//! removes anything.

use super::reputation::ReputationStore;
use super::types::{
    BanReason, Connection, NetworkStats, Protocol, TrafficDelta, TrafficTotals,
};
use crate::clock::Clock;
use crate::configuration::types::ConnectionSettings;
use crate::engine::types::SuspicionOutcome;
use crate::error_handling::types::EngineError;
use crate::table::Table;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

#[derive(Debug, Default)]
struct TrackerState {
    connections: HashMap<SocketAddr, Connection>,
    totals: TrafficTotals,
    peak: usize,
}

pub struct ConnectionTracker {
    state: Table<TrackerState>,
    reputation: Arc<ReputationStore>,
    settings: ConnectionSettings,
    clock: Arc<dyn Clock>,
}

impl ConnectionTracker {
    pub fn new(
        settings: ConnectionSettings,
        reputation: Arc<ReputationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Table::new("connections", TrackerState::default()),
            reputation,
            settings,
            clock,
        }
    }

    pub fn reputation(&self) -> &ReputationStore {
        &self.reputation
    }

    /// Registers a new connection with zeroed counters. Returns `None` for a banned address.
    ///
    /// Opening an address that is already tracked replaces the previous entry. The ban list is
    /// checked again once the entry is in place: a ban landing between the first check and
    /// the insert finds nothing to evict, so the opener removes its own entry instead.
    pub fn open(
        &self,
        addr: SocketAddr,
        protocol: Protocol,
        player: Option<String>,
    ) -> Option<Connection> {
        if self.reputation.is_banned(addr.ip()) {
            debug!("Connection from banned address {} refused", addr);
            return None;
        }

        let now = self.clock.now();
        let connection = Connection {
            addr,
            protocol,
            bytes_in: 0,
            bytes_out: 0,
            packets_in: 0,
            packets_out: 0,
            connected_at: now,
            last_activity: now,
            player,
        };

        let mut state = self.state.lock();

        if !state.connections.contains_key(&addr)
            && state.connections.len() >= self.settings.max_connections
        {
            if let Some(oldest) = state
                .connections
                .values()
                .min_by_key(|c| c.last_activity)
                .map(|c| c.addr)
            {
                warn!("Connection table full, dropping least active {}", oldest);
                state.connections.remove(&oldest);
            }
        }

        if state.connections.insert(addr, connection.clone()).is_some() {
            debug!("Connection {} reopened, previous entry replaced", addr);
        }
        state.peak = state.peak.max(state.connections.len());
        drop(state);

        if self.reputation.is_banned(addr.ip()) {
            self.state.lock().connections.remove(&addr);
            debug!("Address {} was banned while connecting, connection dropped", addr);
            return None;
        }

        debug!("Connection opened: {} ({:?})", addr, protocol);
        Some(connection)
    }

    /// Adds `delta` to the connection and to the global totals, refreshing its activity.
    pub fn update(&self, addr: SocketAddr, delta: TrafficDelta) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let Some(connection) = state.connections.get_mut(&addr) else {
            return false;
        };
        connection.bytes_in = connection.bytes_in.saturating_add(delta.bytes_in);
        connection.bytes_out = connection.bytes_out.saturating_add(delta.bytes_out);
        connection.packets_in = connection.packets_in.saturating_add(delta.packets_in);
        connection.packets_out = connection.packets_out.saturating_add(delta.packets_out);
        connection.last_activity = now;

        state.totals.add(&delta);
        true
    }

    pub fn close(&self, addr: SocketAddr) -> bool {
        let removed = self.state.lock().connections.remove(&addr).is_some();
        if removed {
            debug!("Connection closed: {}", addr);
        }
        removed
    }

    /// Closes every connection coming from `ip`.
    pub fn close_ip(&self, ip: IpAddr) -> usize {
        let mut state = self.state.lock();
        let before = state.connections.len();
        state.connections.retain(|addr, _| addr.ip() != ip);
        let removed = before - state.connections.len();
        if removed > 0 {
            info!("Evicted {} connection(s) from {}", removed, ip);
        }
        removed
    }

    pub fn attach_player(&self, addr: SocketAddr, player: &str) -> bool {
        match self.state.lock().connections.get_mut(&addr) {
            Some(connection) => {
                connection.player = Some(player.to_string());
                true
            }
            None => false,
        }
    }

    /// Closes the connections of `player`. Returns `false` for an unknown player.
    pub fn kick_player(&self, player: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.connections.len();
        state
            .connections
            .retain(|_, c| c.player.as_deref() != Some(player));
        let kicked = before != state.connections.len();
        if kicked {
            info!("Kicked player {}", player);
        }
        kicked
    }

    /// Bans `ip` and evicts its connections. Returns the number of evicted connections.
    pub fn ban(&self, ip: IpAddr, reason: BanReason) -> usize {
        self.reputation.ban(ip, reason);
        self.close_ip(ip)
    }

    /// Flags `ip` as suspicious; the event that crosses the threshold bans the address and
    /// evicts its connections.
    pub fn mark_suspicious(&self, ip: IpAddr) -> SuspicionOutcome {
        let mut outcome = self.reputation.record_suspicion(ip);
        if outcome.newly_banned {
            outcome.evicted = self.close_ip(ip);
        }
        outcome
    }

    /// Evicts connections idle for longer than the idle timeout.
    pub fn sweep(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let idle_timeout = self.settings.idle_timeout();
        let mut state = self.state.lock_for_sweep()?;
        let before = state.connections.len();
        state
            .connections
            .retain(|_, c| now - c.last_activity <= idle_timeout);
        let removed = before - state.connections.len();
        if removed > 0 {
            debug!("Connection sweep evicted {} idle connection(s)", removed);
        }
        Ok(removed)
    }

    pub fn connection(&self, addr: SocketAddr) -> Option<Connection> {
        self.state.lock().connections.get(&addr).cloned()
    }

    /// Live connections, oldest first.
    pub fn connections(&self) -> Vec<Connection> {
        let mut list: Vec<Connection> = self.state.lock().connections.values().cloned().collect();
        list.sort_by_key(|c| c.connected_at);
        list
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn player_count(&self) -> usize {
        self.state
            .lock()
            .connections
            .values()
            .filter(|c| c.player.is_some())
            .count()
    }

    pub fn totals(&self) -> TrafficTotals {
        self.state.lock().totals
    }

    pub fn stats(&self) -> NetworkStats {
        let (totals, active_connections, peak_connections) = {
            let state = self.state.lock();
            (state.totals, state.connections.len(), state.peak)
        };
        NetworkStats {
            totals,
            active_connections,
            peak_connections,
            banned_ips: self.reputation.banned_count(),
            suspicious_ips: self.reputation.suspicious_count(),
        }
    }
}
