//! IP reputation: the persistent ban list and per-address suspicion counters.
//!
//! Unbanning an address leaves its suspicion counter alone, so a pardoned address that
//! misbehaves once more is banned again right away. Counters only go back to zero through
//! [`ReputationStore::reset_suspicion`].

use super::types::{BanReason, BannedIp, SuspicionEntry};
use crate::clock::Clock;
use crate::configuration::types::ReputationSettings;
use crate::engine::types::SuspicionOutcome;
use crate::table::Table;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

pub struct ReputationStore {
    banned: Table<HashMap<IpAddr, BannedIp>>,
    suspicion: Table<HashMap<IpAddr, SuspicionEntry>>,
    settings: ReputationSettings,
    clock: Arc<dyn Clock>,
}

impl ReputationStore {
    pub fn new(settings: ReputationSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            banned: Table::new("banned_ips", HashMap::new()),
            suspicion: Table::new("suspicion", HashMap::new()),
            settings,
            clock,
        }
    }

    /// Adds `ip` to the ban list. Returns `false` if it was already banned.
    ///
    /// This only records the ban; evicting the address's live connections is the
    /// connection tracker's job (see `ConnectionTracker::ban`).
    pub fn ban(&self, ip: IpAddr, reason: BanReason) -> bool {
        let now = self.clock.now();
        let mut banned = self.banned.lock();

        if banned.contains_key(&ip) {
            return false;
        }

        if banned.len() >= self.settings.max_banned {
            if let Some(oldest) = banned
                .values()
                .min_by_key(|b| b.banned_at)
                .map(|b| b.ip)
            {
                warn!("Ban list full, lifting oldest ban of {}", oldest);
                banned.remove(&oldest);
            }
        }

        banned.insert(
            ip,
            BannedIp {
                ip,
                banned_at: now,
                reason,
            },
        );
        warn!("Banned {} ({:?})", ip, reason);
        true
    }

    pub fn unban(&self, ip: IpAddr) -> bool {
        let removed = self.banned.lock().remove(&ip).is_some();
        if removed {
            info!("Unbanned {}", ip);
        }
        removed
    }

    pub fn is_banned(&self, ip: IpAddr) -> bool {
        self.banned.lock().contains_key(&ip)
    }

    /// Counts one suspicious event for `ip` and bans it once the threshold is reached.
    pub fn record_suspicion(&self, ip: IpAddr) -> SuspicionOutcome {
        let now = self.clock.now();

        let count = {
            let mut suspicion = self.suspicion.lock();

            if !suspicion.contains_key(&ip) && suspicion.len() >= self.settings.max_suspicious {
                if let Some(oldest) = suspicion
                    .values()
                    .min_by_key(|s| s.first_seen)
                    .map(|s| s.ip)
                {
                    warn!("Suspicion table full, forgetting {}", oldest);
                    suspicion.remove(&oldest);
                }
            }

            let entry = suspicion.entry(ip).or_insert(SuspicionEntry {
                ip,
                count: 0,
                first_seen: now,
                last_seen: now,
            });
            entry.count = entry.count.saturating_add(1);
            entry.last_seen = now;
            entry.count
        };

        debug!("Suspicious activity from {} (count {})", ip, count);

        let newly_banned =
            count >= self.settings.suspicion_threshold && self.ban(ip, BanReason::Suspicious);

        SuspicionOutcome {
            count,
            newly_banned,
            evicted: 0,
        }
    }

    pub fn suspicion_count(&self, ip: IpAddr) -> u32 {
        self.suspicion.lock().get(&ip).map(|s| s.count).unwrap_or(0)
    }

    pub fn reset_suspicion(&self, ip: IpAddr) -> bool {
        let removed = self.suspicion.lock().remove(&ip).is_some();
        if removed {
            info!("Suspicion counter of {} reset", ip);
        }
        removed
    }

    /// Current bans, oldest first.
    pub fn banned_ips(&self) -> Vec<BannedIp> {
        let mut list: Vec<BannedIp> = self.banned.lock().values().cloned().collect();
        list.sort_by_key(|b| b.banned_at);
        list
    }

    /// Suspicion counters, highest count first.
    pub fn suspicious_ips(&self) -> Vec<SuspicionEntry> {
        let mut list: Vec<SuspicionEntry> = self.suspicion.lock().values().cloned().collect();
        list.sort_by(|a, b| b.count.cmp(&a.count).then(a.first_seen.cmp(&b.first_seen)));
        list
    }

    pub fn banned_count(&self) -> usize {
        self.banned.lock().len()
    }

    pub fn suspicious_count(&self) -> usize {
        self.suspicion.lock().len()
    }
}
