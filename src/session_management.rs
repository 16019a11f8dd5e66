//! Session management core module.
//!
//! This module provides the session record and the manager that creates, validates and
//! expires sessions.

/// Submodule for session data structures.
pub mod session;
/// Submodule for session manager implementation.
pub mod session_manager;

pub use session::Session;
pub use session_manager::{IdSource, OsRngIds, SessionManager};
