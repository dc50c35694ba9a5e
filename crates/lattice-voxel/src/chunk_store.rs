//! On-disk chunk persistence: one `chunk_{x}_{y}_{z}.bin` file per chunk.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::atomic_write::write_atomic;
use crate::chunk::VoxelChunkData;
use crate::chunk_serial::ChunkSerError;
use crate::coords::ChunkCoord;

/// Errors from the chunk file store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure (after retries, for writes).
    #[error("chunk file I/O failed for {coord}: {source}")]
    Io {
        coord: ChunkCoord,
        #[source]
        source: io::Error,
    },
    /// The file exists but does not decode.
    #[error("chunk file for {coord} is corrupt: {source}")]
    Corrupt {
        coord: ChunkCoord,
        #[source]
        source: ChunkSerError,
    },
    /// The file decodes but records a different coordinate.
    #[error("chunk file for {expected} holds chunk {found}")]
    CoordMismatch {
        expected: ChunkCoord,
        found: ChunkCoord,
    },
}

impl StoreError {
    /// Corruption is recoverable by regenerating; I/O failure is not.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. } | StoreError::CoordMismatch { .. })
    }
}

/// Reads and writes persisted chunks inside one world directory.
#[derive(Debug, Clone)]
pub struct ChunkFileStore {
    dir: PathBuf,
}

impl ChunkFileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `coord`.
    pub fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.dir
            .join(format!("chunk_{}_{}_{}.bin", coord.x, coord.y, coord.z))
    }

    pub fn exists(&self, coord: ChunkCoord) -> bool {
        self.chunk_path(coord).is_file()
    }

    /// Loads a persisted chunk.
    ///
    /// Returns `Ok(None)` when no file exists.
    pub fn load(&self, coord: ChunkCoord) -> Result<Option<VoxelChunkData>, StoreError> {
        let bytes = match std::fs::read(self.chunk_path(coord)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { coord, source }),
        };
        let chunk = VoxelChunkData::deserialize(&bytes)
            .map_err(|source| StoreError::Corrupt { coord, source })?;
        if chunk.coord() != coord {
            return Err(StoreError::CoordMismatch {
                expected: coord,
                found: chunk.coord(),
            });
        }
        Ok(Some(chunk))
    }

    /// Persists `chunk` atomically. Flags on `chunk` are not touched.
    pub fn save(&self, chunk: &VoxelChunkData) -> Result<(), StoreError> {
        let coord = chunk.coord();
        let bytes = chunk
            .serialize()
            .map_err(|source| StoreError::Corrupt { coord, source })?;
        write_atomic(&self.chunk_path(coord), &bytes)
            .map_err(|source| StoreError::Io { coord, source })
    }

    /// Last write time of the chunk file, if it exists.
    pub fn modified(&self, coord: ChunkCoord) -> Option<SystemTime> {
        std::fs::metadata(self.chunk_path(coord))
            .and_then(|m| m.modified())
            .ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
