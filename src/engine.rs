//! Engine subsystem.
//!
//! [`Engine`] owns the session manager, the login guard, the reputation store, the connection
//! tracker and the metrics history, and exposes the calls the transport and auth layers make
//! into them. [`Janitor`] drives the periodic sweeps and metrics samples.
//!
//! Example:
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use warden::configuration::Config;
//! use warden::engine::{Engine, Janitor, Status};
//!
//! # async fn run() {
//! let engine = Arc::new(Engine::new(Config::default()));
//! let janitor = Janitor::spawn(engine.clone(), Duration::from_secs(60), Duration::from_secs(1))
//!     .unwrap();
//!
//! let ip = "203.0.113.45".parse().unwrap();
//! assert_eq!(engine.on_login_attempt(ip, false), Status::Ok);
//!
//! janitor.shutdown().await.unwrap();
//! # }
//! ```

pub mod janitor;
pub mod protection_engine;
#[cfg(test)]
pub mod tests;
pub mod types;

pub use janitor::Janitor;
pub use protection_engine::Engine;
pub use types::{AuthOutcome, Status, SuspicionOutcome, SweepReport};
