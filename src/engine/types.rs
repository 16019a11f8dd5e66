//! Result types shared by the engine entry points.

use crate::session_management::Session;
use serde::Serialize;

/// Outcome of a business-rule check.
///
/// These are expected, per-request answers the caller branches on; operational failures are
/// reported through the error types instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Ok,
    Blocked,
    Expired,
    NotFound,
}

/// Outcome of an authentication that passed credential checks.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Granted(Session),
    Blocked,
}

/// Result of flagging an address as suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuspicionOutcome {
    /// Suspicion count after this event.
    pub count: u32,
    /// True only for the event that promoted the address to the ban list.
    pub newly_banned: bool,
    /// Connections evicted as a consequence of the ban.
    pub evicted: usize,
}

/// Entries removed by one sweep pass, per table.
///
/// `None` marks a table whose sweep failed and was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sessions: Option<usize>,
    pub login: Option<usize>,
    pub connections: Option<usize>,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.sessions.unwrap_or(0) + self.login.unwrap_or(0) + self.connections.unwrap_or(0)
    }
}
