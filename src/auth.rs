//! Authentication-side protection: the login brute-force guard and its records.

pub mod login_guard;
pub mod types;

pub use login_guard::LoginGuard;
pub use types::{BlockedIp, LoginAttempt};
