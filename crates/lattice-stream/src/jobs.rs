//! Job and result records passed between the main thread and the workers.

use std::any::Any;
use std::time::Duration;

use lattice_mesh::{ChunkMesh, MeshMode};
use lattice_voxel::{ChunkCoord, ChunkSource, StoreError, VoxelChunkData, WorldError};
use thiserror::Error;

/// Scheduling priority. More negative is more urgent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Priorities at or below this are tier 0: served from the urgent lane
    /// and meshed in fast mode.
    pub const TIER0_THRESHOLD: i32 = -1_000_000;
    /// Chunks the player is interacting with right now.
    pub const INTERACTION: Priority = Priority(Self::TIER0_THRESHOLD);
    /// Background work with no distance information.
    pub const NORMAL: Priority = Priority(0);

    /// Nearer chunks get more urgent (smaller) priorities, never reaching tier 0.
    pub fn from_distance_sq(dist_sq: u64) -> Self {
        Priority(dist_sq.min(i32::MAX as u64) as i32)
    }

    pub fn is_tier0(self) -> bool {
        self.0 <= Self::TIER0_THRESHOLD
    }

    pub fn mesh_mode(self) -> MeshMode {
        if self.is_tier0() {
            MeshMode::Fast
        } else {
            MeshMode::Full
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadJob {
    pub coord: ChunkCoord,
    pub priority: Priority,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshJob {
    pub coord: ChunkCoord,
    pub priority: Priority,
    pub mode: MeshMode,
    /// Identifies this job among every mesh job the service has issued, so a
    /// result that outlives its chunk's eviction is recognised as stale.
    pub ticket: u64,
}

#[derive(Clone, Debug)]
pub struct SaveJob {
    pub coord: ChunkCoord,
    /// Snapshot for a chunk that has already left the world map. When `None`
    /// the worker snapshots the loaded chunk itself.
    pub evicted: Option<VoxelChunkData>,
}

/// Why a job produced no output.
#[derive(Debug, Error)]
pub enum JobError {
    /// Loading or generating the chunk failed.
    #[error(transparent)]
    World(#[from] WorldError),
    /// Writing the chunk file failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The chunk left the world before the job ran.
    #[error("chunk {0} is not loaded")]
    NotLoaded(ChunkCoord),
    /// The job panicked; carries the panic message.
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        JobError::Panicked(msg)
    }
}

#[derive(Debug)]
pub struct LoadResult {
    pub coord: ChunkCoord,
    pub priority: Priority,
    pub outcome: Result<ChunkSource, JobError>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct MeshResult {
    pub coord: ChunkCoord,
    pub priority: Priority,
    pub mode: MeshMode,
    /// Copied from [`MeshJob::ticket`].
    pub ticket: u64,
    /// Chunk mesh version the mesh was built from.
    pub mesh_version: u64,
    pub outcome: Result<ChunkMesh, JobError>,
    pub from_cache: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct SaveResult {
    pub coord: ChunkCoord,
    /// `Ok(false)` when there was nothing to write.
    pub outcome: Result<bool, JobError>,
    /// An evicted snapshot whose write failed, handed back so it is not lost.
    pub retained: Option<VoxelChunkData>,
    /// Whether the job carried an evicted snapshot.
    pub evicted: bool,
}

/// A mesh ready for the renderer.
#[derive(Debug)]
pub struct ReadyMesh {
    pub coord: ChunkCoord,
    pub mode: MeshMode,
    pub mesh: ChunkMesh,
    /// Empty stand-in after repeated meshing failures.
    pub placeholder: bool,
    pub from_cache: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
