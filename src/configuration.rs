pub mod config;
pub mod types;

pub use config::Config;
pub use types::{
    ConnectionSettings, JanitorSettings, LoginSettings, MetricsSettings, ReputationSettings,
    SessionSettings, WebSettings,
};
