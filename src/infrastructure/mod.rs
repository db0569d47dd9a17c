pub mod adapters;
pub mod config;

pub use adapters::*;
pub use config::AppConfig;
