//! Withdrawal Settings Library
//!
//! Per-brand withdrawal limit and validation configuration: local rule
//! checks, dirty tracking, and independent saves against the admin API.

pub mod cli;
pub mod config;
pub mod error;
pub mod limits;
pub mod service;
pub mod settings;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use service::ConfigService;
pub use settings::SettingsController;
