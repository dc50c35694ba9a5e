//! Runtime settings for the lattice chunk pipeline.
//!
//! Settings persist as `config.ron`, missing fields fall back to defaults,
//! and command-line flags override whatever was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, Config, DebugConfig, StreamingSettings, WorldConfig, default_config_dir};
pub use error::ConfigError;
