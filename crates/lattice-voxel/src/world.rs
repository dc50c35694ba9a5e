//! The authoritative set of loaded chunks.
//!
//! [`VoxelWorld`] guards its chunk map with a single lock. Disk reads, disk
//! writes and terrain generation always happen outside that lock; only the
//! final map insert/remove holds it.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::chunk::{MESH_DIRTY, SAVE_DIRTY, VoxelChunkData};
use crate::chunk_store::{ChunkFileStore, StoreError};
use crate::coords::{ChunkCoord, seam_neighbors, world_to_chunk_local};
use crate::registry::BlockId;
use crate::world_meta::WorldMeta;

/// Produces the initial contents of a chunk that has never been persisted.
///
/// Implementations must be pure: the same coordinate always yields the same
/// blocks, and calls may run concurrently on many threads.
pub trait ChunkGenerator: Send + Sync {
    fn generate(&self, coord: ChunkCoord) -> VoxelChunkData;
}

impl<F> ChunkGenerator for F
where
    F: Fn(ChunkCoord) -> VoxelChunkData + Send + Sync,
{
    fn generate(&self, coord: ChunkCoord) -> VoxelChunkData {
        self(coord)
    }
}

/// Where [`VoxelWorld::get_or_create_chunk`] found the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSource {
    Memory,
    Disk,
    Generated,
}

/// Errors surfaced by world mutation and loading.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// World-space block position outside the configured bounds.
    #[error("block ({0}, {1}, {2}) is outside the world")]
    BlockOutOfBounds(i32, i32, i32),
    /// Chunk coordinate outside the configured bounds.
    #[error("chunk {0} is outside the world")]
    ChunkOutOfBounds(ChunkCoord),
    /// The chunk was unloaded between creation and the write.
    #[error("chunk {0} was unloaded during the edit")]
    Evicted(ChunkCoord),
    /// The chunk file could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// In-memory chunk map plus the tiers behind it (disk, generator).
pub struct VoxelWorld {
    meta: WorldMeta,
    chunks: RwLock<FxHashMap<ChunkCoord, VoxelChunkData>>,
    store: Option<ChunkFileStore>,
    generator: Arc<dyn ChunkGenerator>,
}

impl VoxelWorld {
    /// Creates an empty world. Without a `store`, chunks are never read from
    /// or written to disk.
    pub fn new(
        meta: WorldMeta,
        store: Option<ChunkFileStore>,
        generator: Arc<dyn ChunkGenerator>,
    ) -> Self {
        Self {
            meta,
            chunks: RwLock::new(FxHashMap::default()),
            store,
            generator,
        }
    }

    /// Seed and bounds this world was created with.
    pub fn meta(&self) -> &WorldMeta {
        &self.meta
    }

    /// The chunk file store, if this world persists to disk.
    pub fn store(&self) -> Option<&ChunkFileStore> {
        self.store.as_ref()
    }

    fn read_map(&self) -> RwLockReadGuard<'_, FxHashMap<ChunkCoord, VoxelChunkData>> {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, FxHashMap<ChunkCoord, VoxelChunkData>> {
        self.chunks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with shared access to the whole chunk map.
    ///
    /// Keep `f` short: it blocks writers for its duration.
    pub fn read<R>(&self, f: impl FnOnce(&FxHashMap<ChunkCoord, VoxelChunkData>) -> R) -> R {
        f(&self.read_map())
    }

    /// Runs `f` on one loaded chunk.
    pub fn with_chunk<R>(&self, coord: ChunkCoord, f: impl FnOnce(&VoxelChunkData) -> R) -> Option<R> {
        self.read_map().get(&coord).map(f)
    }

    /// Whether `coord` is in memory. Never loads.
    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.read_map().contains_key(&coord)
    }

    pub fn loaded_count(&self) -> usize {
        self.read_map().len()
    }

    pub fn loaded_coords(&self) -> Vec<ChunkCoord> {
        self.read_map().keys().copied().collect()
    }

    /// Block at a world position.
    ///
    /// Returns air outside the world or when the chunk is not loaded. Never
    /// loads or generates.
    pub fn get_block(&self, wx: i32, wy: i32, wz: i32) -> BlockId {
        if !self.meta.contains_block(wx, wy, wz) {
            return BlockId::AIR;
        }
        let (coord, local) = world_to_chunk_local(wx, wy, wz);
        self.read_map()
            .get(&coord)
            .map_or(BlockId::AIR, |chunk| chunk.get(local.x, local.y, local.z))
    }

    /// Writes a block, loading or generating its chunk first if needed.
    ///
    /// Marks the chunk dirty and invalidates the mesh of every loaded
    /// neighbor sharing a face seam with the edited block. Returns the chunks
    /// whose meshes are now stale (the edited chunk first). Writing the
    /// block already present changes nothing and returns an empty list.
    pub fn set_block(&self, wx: i32, wy: i32, wz: i32, block: BlockId) -> Result<Vec<ChunkCoord>, WorldError> {
        if !self.meta.contains_block(wx, wy, wz) {
            return Err(WorldError::BlockOutOfBounds(wx, wy, wz));
        }
        let (coord, local) = world_to_chunk_local(wx, wy, wz);
        self.get_or_create_chunk(coord)?;

        let mut map = self.write_map();
        let Some(chunk) = map.get_mut(&coord) else {
            return Err(WorldError::Evicted(coord));
        };
        if chunk.get(local.x, local.y, local.z) == block {
            return Ok(Vec::new());
        }
        chunk.set(local.x, local.y, local.z, block);

        let mut affected = vec![coord];
        for neighbor in seam_neighbors(coord, local) {
            if let Some(n) = map.get_mut(&neighbor) {
                n.invalidate_mesh();
                affected.push(neighbor);
            }
        }
        tracing::trace!(?coord, ?block, neighbors = affected.len() - 1, "block edited");
        Ok(affected)
    }

    /// Ensures `coord` is loaded: memory, then disk, then the generator.
    ///
    /// Disk-loaded chunks start mesh-dirty. Generated chunks start mesh- and
    /// save-dirty. A corrupt file is logged and treated as absent. Inserting a
    /// chunk with any solid block invalidates the mesh of each loaded face
    /// neighbor, whose boundary faces were built against missing data.
    pub fn get_or_create_chunk(&self, coord: ChunkCoord) -> Result<ChunkSource, WorldError> {
        if !self.meta.contains_chunk(coord) {
            return Err(WorldError::ChunkOutOfBounds(coord));
        }
        if self.is_loaded(coord) {
            return Ok(ChunkSource::Memory);
        }

        let from_disk = match self.store.as_ref().map(|s| s.load(coord)) {
            Some(Ok(found)) => found,
            Some(Err(e)) if e.is_corruption() => {
                tracing::warn!(?coord, "ignoring unreadable chunk file: {e}");
                None
            }
            Some(Err(e)) => return Err(e.into()),
            None => None,
        };

        let (mut chunk, source) = match from_disk {
            Some(chunk) => (chunk, ChunkSource::Disk),
            None => {
                let start = Instant::now();
                let chunk = self.generator.generate(coord);
                tracing::debug!(
                    ?coord,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "generated chunk"
                );
                (chunk, ChunkSource::Generated)
            }
        };
        chunk.mark_dirty(match source {
            ChunkSource::Generated => MESH_DIRTY | SAVE_DIRTY,
            _ => MESH_DIRTY,
        });

        let mut map = self.write_map();
        if map.contains_key(&coord) {
            // Another thread won the race; its copy may already carry edits.
            return Ok(ChunkSource::Memory);
        }
        if !chunk.is_empty() {
            for neighbor in coord.face_neighbors() {
                if let Some(n) = map.get_mut(&neighbor) {
                    n.invalidate_mesh();
                }
            }
        }
        map.insert(coord, chunk);
        Ok(source)
    }

    /// Inserts or replaces a chunk directly.
    pub fn insert_chunk(&self, chunk: VoxelChunkData) {
        self.write_map().insert(chunk.coord(), chunk);
    }

    /// Clone of a loaded chunk.
    pub fn chunk_snapshot(&self, coord: ChunkCoord) -> Option<VoxelChunkData> {
        self.read_map().get(&coord).cloned()
    }

    /// Loaded chunks with unsaved changes.
    pub fn dirty_for_save(&self) -> Vec<ChunkCoord> {
        self.read_map()
            .values()
            .filter(|c| c.needs_save())
            .map(|c| c.coord())
            .collect()
    }

    /// Clears the save flag if the chunk is still at `version`.
    ///
    /// Returns `false` when the chunk changed (or unloaded) since the
    /// snapshot was taken, in which case it stays save-dirty.
    pub fn mark_saved(&self, coord: ChunkCoord, version: u64) -> bool {
        self.clear_if_version(coord, SAVE_DIRTY, |c| c.version() == version)
    }

    /// Clears the mesh flag if the chunk is still at `mesh_version`.
    ///
    /// Seam edits and neighbor loads bump the mesh version without touching
    /// the blocks, so a mesh built before them fails here.
    pub fn mark_meshed(&self, coord: ChunkCoord, mesh_version: u64) -> bool {
        self.clear_if_version(coord, MESH_DIRTY, |c| c.mesh_version() == mesh_version)
    }

    fn clear_if_version(&self, coord: ChunkCoord, flag: u8, current: impl FnOnce(&VoxelChunkData) -> bool) -> bool {
        let mut map = self.write_map();
        match map.get_mut(&coord) {
            Some(chunk) if current(chunk) => {
                chunk.clear_dirty(flag);
                true
            }
            _ => false,
        }
    }

    /// Writes a loaded chunk to disk now, on the calling thread.
    ///
    /// Returns `Ok(false)` if the chunk is not loaded, not dirty, or there is
    /// no store.
    pub fn save_chunk_now(&self, coord: ChunkCoord) -> Result<bool, WorldError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(false);
        };
        let snapshot = match self.with_chunk(coord, |c| c.needs_save().then(|| c.clone())) {
            Some(Some(snapshot)) => snapshot,
            _ => return Ok(false),
        };
        store.save(&snapshot)?;
        self.mark_saved(coord, snapshot.version());
        Ok(true)
    }

    /// Removes every chunk not in `keep`.
    ///
    /// Dirty chunks are handed to `save` after the lock is released. Returns
    /// the coordinates removed.
    pub fn unload_chunks(
        &self,
        keep: &FxHashSet<ChunkCoord>,
        mut save: impl FnMut(VoxelChunkData),
    ) -> Vec<ChunkCoord> {
        let mut removed = Vec::new();
        let mut pending_save = Vec::new();
        {
            let mut map = self.write_map();
            let doomed: Vec<ChunkCoord> = map.keys().filter(|c| !keep.contains(c)).copied().collect();
            for coord in doomed {
                if let Some(chunk) = map.remove(&coord) {
                    if chunk.needs_save() {
                        pending_save.push(chunk);
                    }
                    removed.push(coord);
                }
            }
        }
        if !removed.is_empty() {
            tracing::debug!(
                unloaded = removed.len(),
                dirty = pending_save.len(),
                "unloaded chunks"
            );
        }
        for chunk in pending_save {
            save(chunk);
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
