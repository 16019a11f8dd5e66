pub mod auth;
pub mod clock;
pub mod configuration;
pub mod controller;
pub mod engine;
pub mod error_handling;
pub mod monitoring;
pub mod network;
pub mod session_management;
pub mod table;
pub mod web_interface;

pub use engine::{Engine, Janitor, Status};
