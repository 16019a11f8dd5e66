// Error handling module root
pub mod types;

pub use types::*;
