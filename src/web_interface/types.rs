use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::monitoring::HistoricalPoint;
use crate::network::NetworkStats;
use crate::session_management::Session;

/// API error payload
#[derive(Debug, Serialize, PartialEq)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A session as shown on the dashboard. Only a prefix of the id is exposed, so the listing
/// cannot be used to hijack a session.
#[derive(Debug, Serialize, PartialEq)]
pub struct SessionResponse {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub ip: IpAddr,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: mask_session_id(&session.id.to_string()),
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            ip: session.ip,
            user_agent: session.user_agent.clone(),
            created_at: session.created_at,
            last_active: session.last_active,
            expires_at: session.expires_at,
        }
    }
}

/// Keeps the first eight characters of a session id.
pub fn mask_session_id(id: &str) -> String {
    let prefix: String = id.chars().take(8).collect();
    format!("{}-****", prefix)
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StatsResponse {
    pub network: NetworkStats,
    pub active_sessions: usize,
    pub blocked_ips: usize,
    pub players: usize,
    pub latest_metrics: Option<HistoricalPoint>,
}

/// Result of an unban or unblock request.
#[derive(Debug, Serialize, PartialEq)]
pub struct ActionResponse {
    pub ip: IpAddr,
    pub removed: bool,
}

/// Query string of `GET /history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only points from the last `minutes` minutes; the whole buffer when absent.
    pub minutes: Option<u32>,
}
