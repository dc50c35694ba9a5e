//! OS directory resolution for the driver.
//!
//! The config directory matches [`lattice_config::default_config_dir`], so a
//! `config.ron` written by either side is found by the other.

use std::io;
use std::path::{Path, PathBuf};

/// Errors that can occur during platform operations.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("could not determine OS configuration directory")]
    NoConfigDir,
    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where the driver keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDirs {
    /// `config.ron`.
    pub config_dir: PathBuf,
    /// Default parent of the saves directory.
    pub data_dir: PathBuf,
    /// JSON log files from debug builds.
    pub log_dir: PathBuf,
}

const APP_NAME: &str = "lattice";

impl PlatformDirs {
    /// Resolve platform-specific directories without creating them on disk.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NoConfigDir`] if the OS does not expose a
    /// configuration directory.
    pub fn resolve() -> Result<Self, PlatformError> {
        let config_dir = dirs::config_dir().ok_or(PlatformError::NoConfigDir)?.join(APP_NAME);
        let data_dir = dirs::data_dir()
            .map(|d| d.join(APP_NAME))
            .unwrap_or_else(|| config_dir.clone());
        Ok(Self {
            log_dir: data_dir.join("logs"),
            config_dir,
            data_dir,
        })
    }

    /// Resolve directories rooted under a custom base path.
    pub fn resolve_with_root(root: &Path) -> Self {
        let app_dir = root.join(APP_NAME);
        Self {
            config_dir: app_dir.join("config"),
            data_dir: app_dir.join("data"),
            log_dir: app_dir.join("logs"),
        }
    }

    /// Uses `config_dir` in place of the resolved one, e.g. from `--config`.
    pub fn with_config_dir(mut self, config_dir: PathBuf) -> Self {
        self.config_dir = config_dir;
        self
    }

    /// Create all directories on disk.
    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_root() {
        let root = Path::new("/tmp/lattice-test-root");
        let dirs = PlatformDirs::resolve_with_root(root);
        assert_eq!(dirs.config_dir, root.join("lattice/config"));
        assert_eq!(dirs.data_dir, root.join("lattice/data"));
        assert_eq!(dirs.log_dir, root.join("lattice/logs"));
    }

    #[test]
    fn test_directory_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = PlatformDirs::resolve_with_root(tmp.path());
        dirs.create_dirs().unwrap();
        assert!(dirs.config_dir.is_dir());
        assert!(dirs.data_dir.is_dir());
        assert!(dirs.log_dir.is_dir());
    }

    #[test]
    fn test_config_dir_override() {
        let dirs = PlatformDirs::resolve_with_root(Path::new("/a")).with_config_dir(PathBuf::from("/b"));
        assert_eq!(dirs.config_dir, PathBuf::from("/b"));
        assert_eq!(dirs.data_dir, PathBuf::from("/a/lattice/data"));
    }

    #[test]
    fn test_resolved_config_dir_matches_config_crate() {
        if let Ok(dirs) = PlatformDirs::resolve() {
            assert_eq!(dirs.config_dir, lattice_config::default_config_dir());
        }
    }
}
