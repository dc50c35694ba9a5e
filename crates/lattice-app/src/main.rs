//! The `lattice` binary.

use clap::Parser;
use lattice_app::{Driver, DriverOptions, PlatformDirs};
use lattice_config::{CliArgs, Config};
use tracing::{error, info};

fn main() {
    let args = CliArgs::parse();

    let dirs = match PlatformDirs::resolve() {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to resolve platform directories: {e}");
            std::process::exit(1);
        }
    };
    let dirs = match args.config.clone() {
        Some(config_dir) => dirs.with_config_dir(config_dir),
        None => dirs,
    };

    let config = Config::load_or_create(&dirs.config_dir).and_then(|mut config| {
        config.apply_cli_overrides(&args);
        config.validate()?;
        Ok(config)
    });
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration in {}: {e}", dirs.config_dir.display());
            std::process::exit(1);
        }
    };

    let log_file = lattice_log::init_logging(Some(dirs.log_dir.as_path()), cfg!(debug_assertions), Some(&config))
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize logging: {e}");
            None
        });
    if let Some(path) = log_file {
        info!("logging to {}", path.display());
    }

    let mut options = DriverOptions::default();
    if let Some(frames) = args.frames {
        options.frames = frames;
    }

    match Driver::open(&config) {
        Ok(driver) => {
            let summary = driver.run(&options);
            info!(
                meshes = summary.meshes_uploaded,
                saved = summary.chunks_saved + summary.shutdown.flushed,
                "lattice exited"
            );
        }
        Err(e) => {
            error!(error = %e, "failed to open world");
            std::process::exit(1);
        }
    }
}
