use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub ip: IpAddr,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// A temporary authentication block produced by repeated failed logins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedIp {
    pub ip: IpAddr,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BlockedIp {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
