//! Brute-force login protection.
//!
//! Every attempt is appended to a shared log which is pruned to the sliding window on each
//! write. When an address accumulates `max_failures` failed attempts inside the window it is
//! blocked for `block_secs`. A block that is still running is never renewed, so an attacker
//! who keeps hammering during the block is released on schedule; a block that has run out but
//! was not swept yet is simply replaced.

use super::types::{BlockedIp, LoginAttempt};
use crate::clock::Clock;
use crate::configuration::types::LoginSettings;
use crate::engine::types::Status;
use crate::error_handling::types::EngineError;
use crate::table::Table;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

pub struct LoginGuard {
    attempts: Table<VecDeque<LoginAttempt>>,
    blocks: Table<HashMap<IpAddr, BlockedIp>>,
    settings: LoginSettings,
    clock: Arc<dyn Clock>,
}

impl LoginGuard {
    pub fn new(settings: LoginSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: Table::new("login_attempts", VecDeque::new()),
            blocks: Table::new("login_blocks", HashMap::new()),
            settings,
            clock,
        }
    }

    /// Records an attempt and blocks the address once it crosses the failure threshold.
    ///
    /// Returns `Status::Blocked` if the address is blocked after this attempt.
    pub fn record_attempt(&self, ip: IpAddr, success: bool) -> Status {
        let now = self.clock.now();
        let cutoff = now - self.settings.window();

        let failures = {
            let mut attempts = self.attempts.lock();
            attempts.push_back(LoginAttempt {
                ip,
                timestamp: now,
                success,
            });
            attempts.retain(|a| a.timestamp > cutoff);
            while attempts.len() > self.settings.max_attempts {
                attempts.pop_front();
            }

            if success {
                0
            } else {
                count_failures(&attempts, ip, cutoff)
            }
        };

        if !success {
            debug!("Failed login from {} ({} in window)", ip, failures);
        }

        if failures >= self.settings.max_failures && self.block_at(ip, now) {
            warn!(
                "Blocking {} for {}s after {} failed login attempts",
                ip, self.settings.block_secs, failures
            );
        }

        if self.is_blocked(ip) {
            Status::Blocked
        } else {
            Status::Ok
        }
    }

    /// Blocks `ip` for the configured duration, unless a block is already running.
    pub fn block(&self, ip: IpAddr) -> bool {
        let blocked = self.block_at(ip, self.clock.now());
        if blocked {
            info!("Blocked {} for {}s", ip, self.settings.block_secs);
        }
        blocked
    }

    fn block_at(&self, ip: IpAddr, now: DateTime<Utc>) -> bool {
        let mut blocks = self.blocks.lock();

        if blocks.get(&ip).is_some_and(|b| b.is_active_at(now)) {
            return false;
        }

        if !blocks.contains_key(&ip) && blocks.len() >= self.settings.max_blocks {
            if let Some(oldest) = blocks
                .values()
                .min_by_key(|b| b.expires_at)
                .map(|b| b.ip)
            {
                warn!("Block table full, dropping block of {}", oldest);
                blocks.remove(&oldest);
            }
        }

        blocks.insert(
            ip,
            BlockedIp {
                ip,
                blocked_at: now,
                expires_at: now + self.settings.block_duration(),
            },
        );
        true
    }

    /// Whether `ip` is currently blocked. An expired entry is removed on the way.
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        let now = self.clock.now();
        let mut blocks = self.blocks.lock();

        match blocks.get(&ip) {
            Some(block) if block.is_active_at(now) => true,
            Some(_) => {
                debug!("Login block of {} expired", ip);
                blocks.remove(&ip);
                false
            }
            None => false,
        }
    }

    pub fn unblock(&self, ip: IpAddr) -> bool {
        let removed = self.blocks.lock().remove(&ip).is_some();
        if removed {
            info!("Unblocked {}", ip);
        }
        removed
    }

    /// Failed attempts of `ip` inside the current window.
    pub fn failed_attempts(&self, ip: IpAddr) -> usize {
        let cutoff = self.clock.now() - self.settings.window();
        count_failures(&self.attempts.lock(), ip, cutoff)
    }

    /// Attempts not older than `within`, newest first.
    pub fn recent_attempts(&self, within: Duration) -> Vec<LoginAttempt> {
        let cutoff = self.clock.now() - within;
        let mut recent: Vec<LoginAttempt> = self
            .attempts
            .lock()
            .iter()
            .filter(|a| a.timestamp > cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent
    }

    /// Blocks still running, soonest expiry first.
    pub fn blocked_ips(&self) -> Vec<BlockedIp> {
        let now = self.clock.now();
        let mut blocked: Vec<BlockedIp> = self
            .blocks
            .lock()
            .values()
            .filter(|b| b.is_active_at(now))
            .cloned()
            .collect();
        blocked.sort_by_key(|b| b.expires_at);
        blocked
    }

    /// Drops attempts outside the window and blocks that ran out.
    pub fn sweep(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let cutoff = now - self.settings.window();

        let pruned = {
            let mut attempts = self.attempts.lock_for_sweep()?;
            let before = attempts.len();
            attempts.retain(|a| a.timestamp > cutoff);
            before - attempts.len()
        };

        let expired = {
            let mut blocks = self.blocks.lock_for_sweep()?;
            let before = blocks.len();
            blocks.retain(|_, b| b.is_active_at(now));
            before - blocks.len()
        };

        if pruned + expired > 0 {
            debug!(
                "Login sweep pruned {} attempt(s) and {} expired block(s)",
                pruned, expired
            );
        }
        Ok(pruned + expired)
    }
}

fn count_failures(attempts: &VecDeque<LoginAttempt>, ip: IpAddr, cutoff: DateTime<Utc>) -> usize {
    attempts
        .iter()
        .filter(|a| a.ip == ip && !a.success && a.timestamp > cutoff)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn guard() -> (Arc<ManualClock>, LoginGuard) {
        let clock = Arc::new(ManualClock::default());
        let guard = LoginGuard::new(LoginSettings::default(), clock.clone());
        (clock, guard)
    }

    fn attacker() -> IpAddr {
        "198.51.100.7".parse().unwrap()
    }

    fn fail_times(guard: &LoginGuard, ip: IpAddr, n: usize) -> Status {
        let mut status = Status::Ok;
        for _ in 0..n {
            status = guard.record_attempt(ip, false);
        }
        status
    }

    #[test]
    fn test_five_failures_block_for_fifteen_minutes() {
        let (clock, guard) = guard();

        assert_eq!(fail_times(&guard, attacker(), 4), Status::Ok);
        assert!(!guard.is_blocked(attacker()));
        assert_eq!(guard.record_attempt(attacker(), false), Status::Blocked);
        assert!(guard.is_blocked(attacker()));

        clock.advance(Duration::minutes(14));
        assert!(guard.is_blocked(attacker()));
        clock.advance(Duration::minutes(1));
        assert!(!guard.is_blocked(attacker()));
        assert!(guard.blocked_ips().is_empty());
    }

    #[test]
    fn test_attempts_outside_window_do_not_count() {
        let (clock, guard) = guard();

        fail_times(&guard, attacker(), 4);
        clock.advance(Duration::minutes(6));

        assert_eq!(guard.record_attempt(attacker(), false), Status::Ok);
        assert!(!guard.is_blocked(attacker()));
        assert_eq!(guard.failed_attempts(attacker()), 1);
    }

    #[test]
    fn test_attempt_exactly_window_old_is_dropped() {
        let (clock, guard) = guard();
        guard.record_attempt(attacker(), false);

        clock.advance(Duration::minutes(5) - Duration::seconds(1));
        assert_eq!(guard.failed_attempts(attacker()), 1);

        clock.advance(Duration::seconds(1));
        assert_eq!(guard.failed_attempts(attacker()), 0);
        assert_eq!(guard.sweep().unwrap(), 1);
    }

    #[test]
    fn test_block_is_not_renewed_during_block() {
        let (clock, guard) = guard();

        fail_times(&guard, attacker(), 5);
        let first = guard.blocked_ips()[0].clone();

        clock.advance(Duration::minutes(10));
        fail_times(&guard, attacker(), 5);
        assert_eq!(guard.blocked_ips()[0].expires_at, first.expires_at);

        clock.advance(Duration::minutes(5));
        assert!(!guard.is_blocked(attacker()));
    }

    #[test]
    fn test_expired_block_is_replaced_by_new_one() {
        let (clock, guard) = guard();

        fail_times(&guard, attacker(), 5);
        clock.advance(Duration::minutes(16));
        assert_eq!(fail_times(&guard, attacker(), 5), Status::Blocked);

        let block = &guard.blocked_ips()[0];
        assert_eq!(block.blocked_at, clock.now());
        assert_eq!(block.expires_at, clock.now() + Duration::minutes(15));
    }

    #[test]
    fn test_successes_do_not_count_as_failures() {
        let (_, guard) = guard();

        for _ in 0..10 {
            assert_eq!(guard.record_attempt(attacker(), true), Status::Ok);
        }
        assert_eq!(guard.failed_attempts(attacker()), 0);
    }

    #[test]
    fn test_failures_are_counted_per_address() {
        let (_, guard) = guard();
        let other: IpAddr = "198.51.100.8".parse().unwrap();

        fail_times(&guard, attacker(), 3);
        fail_times(&guard, other, 3);

        assert!(!guard.is_blocked(attacker()));
        assert!(!guard.is_blocked(other));
        assert_eq!(guard.failed_attempts(attacker()), 3);
    }

    #[test]
    fn test_unblock_clears_block() {
        let (_, guard) = guard();

        fail_times(&guard, attacker(), 5);
        assert!(guard.unblock(attacker()));
        assert!(!guard.is_blocked(attacker()));
        assert!(!guard.unblock(attacker()));
    }

    #[test]
    fn test_recent_attempts_newest_first() {
        let (clock, guard) = guard();
        let other: IpAddr = "192.0.2.1".parse().unwrap();

        guard.record_attempt(attacker(), false);
        clock.advance(Duration::seconds(10));
        guard.record_attempt(other, true);

        let recent = guard.recent_attempts(Duration::hours(24));
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].ip, other);
        assert!(recent[0].success);
        assert_eq!(recent[1].ip, attacker());
    }

    #[test]
    fn test_sweep_prunes_attempts_and_blocks() {
        let (clock, guard) = guard();

        fail_times(&guard, attacker(), 5);
        clock.advance(Duration::minutes(20));

        assert_eq!(guard.sweep().unwrap(), 6);
        assert!(guard.recent_attempts(Duration::hours(24)).is_empty());
        assert!(!guard.is_blocked(attacker()));
    }

    #[test]
    fn test_attempt_log_is_capped() {
        let clock = Arc::new(ManualClock::default());
        let settings = LoginSettings {
            max_attempts: 3,
            ..Default::default()
        };
        let guard = LoginGuard::new(settings, clock);

        for _ in 0..10 {
            guard.record_attempt(attacker(), true);
        }

        assert_eq!(guard.recent_attempts(Duration::hours(1)).len(), 3);
    }

    #[test]
    fn test_block_table_is_capped() {
        let clock = Arc::new(ManualClock::default());
        let settings = LoginSettings {
            max_blocks: 2,
            ..Default::default()
        };
        let guard = LoginGuard::new(settings, clock.clone());
        let ips: Vec<IpAddr> = (1..=3)
            .map(|i| format!("192.0.2.{}", i).parse().unwrap())
            .collect();

        for ip in &ips {
            assert!(guard.block(*ip));
            clock.advance(Duration::seconds(1));
        }

        assert_eq!(guard.blocked_ips().len(), 2);
        assert!(!guard.is_blocked(ips[0]));
        assert!(guard.is_blocked(ips[2]));
    }
}
