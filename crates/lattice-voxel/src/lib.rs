//! Voxel chunk storage, persistence, and the authoritative chunk map.

pub mod atomic_write;
pub mod chunk;
pub mod chunk_serial;
pub mod chunk_store;
pub mod coords;
pub mod registry;
pub mod rle;
pub mod world;
pub mod world_meta;

pub use chunk::{MESH_DIRTY, SAVE_DIRTY, VoxelChunkData};
pub use chunk_serial::ChunkSerError;
pub use chunk_store::{ChunkFileStore, StoreError};
pub use coords::{
    CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, CHUNK_VOLUME, ChunkCoord, LocalPos,
    world_to_chunk_local,
};
pub use registry::{BlockDef, BlockId, BlockRegistry, RegistryError, Transparency};
pub use world::{ChunkGenerator, ChunkSource, VoxelWorld, WorldError};
pub use world_meta::{GameMode, WorldMeta, WorldMetaError};
