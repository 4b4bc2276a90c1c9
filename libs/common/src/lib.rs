//! Basic library shared by the lifecycle crates
//!
//! Provides the ambient pieces every binary and library needs:
//! - logging initialisation (console + optional rolling file)
//! - layered configuration loading (defaults, YAML file, environment)
//! - the common error type

pub mod config_loader;
pub mod error;
pub mod logging;

pub use config_loader::{load_layered, load_layered_from_env};
pub use error::{Error, Result};
pub use logging::LogConfig;
