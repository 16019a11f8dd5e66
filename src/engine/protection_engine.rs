use super::types::{AuthOutcome, Status, SuspicionOutcome, SweepReport};
use crate::auth::LoginGuard;
use crate::clock::{Clock, SystemClock};
use crate::configuration::config::Config;
use crate::error_handling::types::{EngineError, SessionError};
use crate::monitoring::{HistoricalPoint, MetricsHistory, MetricsSnapshot};
use crate::network::{
    BanReason, ConnectionTracker, Protocol, ReputationStore, TrafficDelta, TrafficTotals,
};
use crate::session_management::SessionManager;
use crate::table::Table;
use log::{debug, error, info};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use uuid::Uuid;

/// The protective state engine.
///
/// One instance is built per process and shared by reference (usually behind an `Arc`) with
/// the transport layer, the janitor and the dashboard. Each table lives in exactly one
/// component; the engine only sequences calls between them and never holds two table locks
/// at the same time.
pub struct Engine {
    clock: Arc<dyn Clock>,
    sessions: SessionManager,
    login_guard: LoginGuard,
    reputation: Arc<ReputationStore>,
    connections: ConnectionTracker,
    metrics: MetricsHistory,
    sampled_totals: Table<TrafficTotals>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let sessions = SessionManager::new(config.sessions.clone(), clock.clone());
        Self::with_session_manager(config, clock, sessions)
    }

    /// Builds an engine around an already configured session manager, e.g. one with a custom
    /// id source.
    pub fn with_session_manager(
        config: Config,
        clock: Arc<dyn Clock>,
        sessions: SessionManager,
    ) -> Self {
        let reputation = Arc::new(ReputationStore::new(
            config.reputation.clone(),
            clock.clone(),
        ));
        let connections = ConnectionTracker::new(
            config.connections.clone(),
            reputation.clone(),
            clock.clone(),
        );

        info!("Engine initialized");
        Self {
            login_guard: LoginGuard::new(config.login.clone(), clock.clone()),
            metrics: MetricsHistory::new(config.metrics.capacity, clock.clone()),
            sampled_totals: Table::new("sampled_totals", TrafficTotals::default()),
            sessions,
            reputation,
            connections,
            clock,
        }
    }

    fn is_gated(&self, ip: IpAddr) -> bool {
        self.reputation.is_banned(ip) || self.login_guard.is_blocked(ip)
    }

    /// Records a login attempt. A banned or already blocked address is refused without being
    /// recorded, so hammering during a block does not extend it.
    pub fn on_login_attempt(&self, ip: IpAddr, success: bool) -> Status {
        if self.is_gated(ip) {
            debug!("Login attempt from gated address {} refused", ip);
            return Status::Blocked;
        }
        self.login_guard.record_attempt(ip, success)
    }

    /// Opens a session for a user whose credentials were accepted.
    ///
    /// The successful attempt is recorded in the login guard; callers do not report it again
    /// through [`Engine::on_login_attempt`].
    pub fn on_auth_success(
        &self,
        user_id: &str,
        username: &str,
        ip: IpAddr,
        user_agent: &str,
    ) -> Result<AuthOutcome, SessionError> {
        if self.is_gated(ip) {
            info!("Authentication of {} from gated address {} refused", username, ip);
            return Ok(AuthOutcome::Blocked);
        }
        self.login_guard.record_attempt(ip, true);
        let session = self.sessions.create(user_id, username, ip, user_agent)?;
        Ok(AuthOutcome::Granted(session))
    }

    /// Validates a session token as presented by a client.
    pub fn validate_session(&self, token: &str) -> Status {
        match Uuid::parse_str(token) {
            Ok(id) => self.sessions.check(&id),
            Err(_) => Status::NotFound,
        }
    }

    pub fn terminate_session(&self, token: &str) -> Status {
        match Uuid::parse_str(token) {
            Ok(id) if self.sessions.terminate(&id) => Status::Ok,
            _ => Status::NotFound,
        }
    }

    /// Ends every session of a user, e.g. after a ban or a credential change.
    pub fn terminate_user_sessions(&self, user_id: &str) -> usize {
        self.sessions.terminate_all_for_user(user_id)
    }

    pub fn on_connection_open(
        &self,
        addr: SocketAddr,
        protocol: Protocol,
        player: Option<String>,
    ) -> Status {
        match self.connections.open(addr, protocol, player) {
            Some(_) => Status::Ok,
            None => Status::Blocked,
        }
    }

    pub fn on_connection_activity(&self, addr: SocketAddr, delta: TrafficDelta) -> Status {
        if self.connections.update(addr, delta) {
            Status::Ok
        } else {
            Status::NotFound
        }
    }

    pub fn on_connection_close(&self, addr: SocketAddr) -> Status {
        if self.connections.close(addr) {
            Status::Ok
        } else {
            Status::NotFound
        }
    }

    pub fn kick_player(&self, player: &str) -> Status {
        if self.connections.kick_player(player) {
            Status::Ok
        } else {
            Status::NotFound
        }
    }

    pub fn mark_suspicious(&self, ip: IpAddr) -> SuspicionOutcome {
        self.connections.mark_suspicious(ip)
    }

    /// Bans `ip` and evicts its connections. Returns the number of evicted connections.
    pub fn ban_ip(&self, ip: IpAddr) -> usize {
        self.connections.ban(ip, BanReason::Manual)
    }

    pub fn unban_ip(&self, ip: IpAddr) -> bool {
        self.reputation.unban(ip)
    }

    pub fn unblock_ip(&self, ip: IpAddr) -> bool {
        self.login_guard.unblock(ip)
    }

    pub fn on_metrics_tick(&self, snapshot: MetricsSnapshot) -> HistoricalPoint {
        self.metrics.add_point(snapshot)
    }

    /// Builds a snapshot from the engine's own view: network traffic since the previous
    /// sample and the number of connected players. The game server process is stubbed, so
    /// cpu, memory and tps are reported as zero.
    pub fn sample_metrics(&self) -> MetricsSnapshot {
        let totals = self.connections.totals();
        let previous = {
            let mut sampled = self.sampled_totals.lock();
            std::mem::replace(&mut *sampled, totals)
        };
        MetricsSnapshot {
            network_in: totals.bytes_in.saturating_sub(previous.bytes_in),
            network_out: totals.bytes_out.saturating_sub(previous.bytes_out),
            players: self.connections.player_count(),
            ..Default::default()
        }
    }

    /// Runs one sweep over every table with a time-to-live.
    ///
    /// A table whose sweep fails is logged and left for the next pass.
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            sessions: logged("sessions", self.sessions.sweep()),
            login: logged("login", self.login_guard.sweep()),
            connections: logged("connections", self.connections.sweep()),
        };
        if report.total() > 0 {
            debug!("Sweep removed {} entries: {:?}", report.total(), report);
        }
        report
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn login_guard(&self) -> &LoginGuard {
        &self.login_guard
    }

    pub fn reputation(&self) -> &ReputationStore {
        &self.reputation
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    pub fn metrics(&self) -> &MetricsHistory {
        &self.metrics
    }
}

fn logged(component: &str, result: Result<usize, EngineError>) -> Option<usize> {
    match result {
        Ok(removed) => Some(removed),
        Err(e) => {
            error!("Skipping {} sweep: {}", component, e);
            None
        }
    }
}
