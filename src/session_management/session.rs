use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// An authenticated user session.
///
/// `expires_at` is fixed at creation; only `last_active` moves, on successful validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub username: String,
    pub ip: IpAddr,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session is still usable at `now`: before its absolute expiry and not idle
    /// for longer than `idle_timeout`.
    pub fn is_live_at(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now <= self.expires_at && now - self.last_active <= idle_timeout
    }
}
