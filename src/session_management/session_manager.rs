use crate::clock::Clock;
use crate::configuration::types::SessionSettings;
use crate::engine::types::Status;
use crate::error_handling::types::{EngineError, SessionError};
use crate::session_management::session::Session;
use crate::table::Table;
use log::{debug, info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Number of fresh ids drawn before giving up on finding an unused one.
const ID_ATTEMPTS: usize = 4;

/// Source of session identifiers.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> Result<Uuid, SessionError>;
}

/// Random v4 identifiers drawn from the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngIds;

impl IdSource for OsRngIds {
    fn next_id(&self) -> Result<Uuid, SessionError> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SessionError::IdGenerationFailed(e.to_string()))?;
        Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

/// The structure related to session management
///
/// Sessions are created after a successful authentication and handed back to the caller, who
/// presents the id on later requests. Validation is check-and-touch: a live session gets its
/// `last_active` refreshed, a dead one is removed on the spot.
///
/// # Fields Overview
///
/// - `sessions`: the session table, keyed by id
/// - `settings`: lifetime, idle timeout and size cap
/// - `clock`: time source for every expiry decision
/// - `ids`: generator for unguessable identifiers
pub struct SessionManager {
    sessions: Table<HashMap<Uuid, Session>>,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdSource>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self::with_id_source(settings, clock, Box::new(OsRngIds))
    }

    pub fn with_id_source(
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
        ids: Box<dyn IdSource>,
    ) -> Self {
        Self {
            sessions: Table::new("sessions", HashMap::new()),
            settings,
            clock,
            ids,
        }
    }

    pub fn create(
        &self,
        user_id: &str,
        username: &str,
        ip: IpAddr,
        user_agent: &str,
    ) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock();

        let id = self.unused_id(&sessions)?;

        if sessions.len() >= self.settings.max_sessions {
            if let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.last_active)
                .map(|s| s.id)
            {
                warn!(
                    "Session table full ({} entries), evicting least recently active session",
                    sessions.len()
                );
                sessions.remove(&oldest);
            }
        }

        let session = Session {
            id,
            user_id: user_id.to_string(),
            username: username.to_string(),
            ip,
            user_agent: user_agent.to_string(),
            created_at: now,
            last_active: now,
            expires_at: now + self.settings.lifetime(),
        };
        sessions.insert(id, session.clone());

        info!("Session created for user {} from {}", username, ip);
        Ok(session)
    }

    fn unused_id(&self, sessions: &HashMap<Uuid, Session>) -> Result<Uuid, SessionError> {
        for _ in 0..ID_ATTEMPTS {
            let id = self.ids.next_id()?;
            if !sessions.contains_key(&id) {
                return Ok(id);
            }
            warn!("Generated session id collides with a live session, drawing again");
        }
        Err(SessionError::IdGenerationFailed(
            "no unused session id could be drawn".to_string(),
        ))
    }

    /// Checks a session and refreshes its activity when it is still live.
    ///
    /// Returns `Status::Expired` for a session past its absolute expiry or idle for longer
    /// than the idle timeout; such a session is removed.
    pub fn check(&self, id: &Uuid) -> Status {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock();

        let Some(session) = sessions.get_mut(id) else {
            return Status::NotFound;
        };

        if !session.is_live_at(now, self.settings.idle_timeout()) {
            debug!("Session {} of user {} expired", id, session.user_id);
            sessions.remove(id);
            return Status::Expired;
        }

        session.last_active = now;
        Status::Ok
    }

    pub fn validate(&self, id: &Uuid) -> bool {
        self.check(id) == Status::Ok
    }

    pub fn terminate(&self, id: &Uuid) -> bool {
        let removed = self.sessions.lock().remove(id).is_some();
        if removed {
            debug!("Session {} terminated", id);
        }
        removed
    }

    pub fn terminate_all_for_user(&self, user_id: &str) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        let removed = before - sessions.len();
        info!("Terminated {} session(s) of user {}", removed, user_id);
        removed
    }

    /// Live sessions of `user_id`, oldest first. Does not refresh activity.
    pub fn list_active_for_user(&self, user_id: &str) -> Vec<Session> {
        let now = self.clock.now();
        let idle_timeout = self.settings.idle_timeout();
        let mut list: Vec<Session> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.user_id == user_id && s.is_live_at(now, idle_timeout))
            .cloned()
            .collect();
        list.sort_by_key(|s| s.created_at);
        list
    }

    /// Removes every session that is expired or idle, whether or not anyone asks for it again.
    pub fn sweep(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let idle_timeout = self.settings.idle_timeout();
        let mut sessions = self.sessions.lock_for_sweep()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live_at(now, idle_timeout));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Session sweep removed {} session(s)", removed);
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
