//! Structured logging for the lattice crates.
//!
//! Console output through `tracing-subscriber`, plus a JSON log file in debug
//! builds. `log` records (from `lattice-config`) are bridged into the same
//! subscriber.

use std::fs::File;
use std::path::{Path, PathBuf};

use lattice_config::Config;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE: &str = "lattice.log";

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info";

/// The filter directive taken from `config`, or [`DEFAULT_FILTER`].
pub fn filter_directive(config: Option<&Config>) -> String {
    config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

fn json_file_layer<S>(file: File) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime())
        .json()
}

/// Installs the global subscriber.
///
/// - `RUST_LOG` wins over `config.debug.log_level`, which wins over "info".
/// - Console lines carry the uptime, target and thread name, so each
///   pipeline worker is identifiable.
/// - With `debug_build` set, a `log_dir` given and `config.debug.log_to_file`
///   on, JSON records also go to `log_dir/lattice.log`.
///
/// Returns the log file path when file logging is active. Fails if a global
/// subscriber is already installed.
pub fn init_logging(
    log_dir: Option<&Path>,
    debug_build: bool,
    config: Option<&Config>,
) -> Result<Option<PathBuf>, TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let to_file = debug_build && config.is_none_or(|c| c.debug.log_to_file);
    if to_file
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
    {
        let path = log_dir.join(LOG_FILE);
        if let Ok(file) = File::create(&path) {
            subscriber.with(json_file_layer(file)).try_init()?;
            return Ok(Some(path));
        }
    }

    subscriber.try_init()?;
    Ok(None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
