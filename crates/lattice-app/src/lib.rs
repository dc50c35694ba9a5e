//! Headless driver for the lattice chunk pipeline.
//!
//! Opens a world, streams chunks around a moving viewpoint and shuts down
//! cleanly, saving every dirty chunk.

pub mod driver;
pub mod platform;

pub use driver::{Driver, DriverError, DriverOptions, SessionSummary, streaming_config};
pub use platform::{PlatformDirs, PlatformError};
