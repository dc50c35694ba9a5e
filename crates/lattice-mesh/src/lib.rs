//! Chunk meshing: face ownership, greedy merging, custom models and the mesh cache.

pub mod atlas;
pub mod chunk_mesh;
pub mod custom_model;
pub mod face_direction;
pub mod greedy;
pub mod mesh_cache;
pub mod neighborhood;
pub mod visibility;

pub use atlas::{BlockTiles, GridAtlas, TextureAtlas};
pub use chunk_mesh::{Aabb, ChunkMesh, MeshLayer, MeshVertex, QuadInfo, VERTICES_PER_QUAD};
pub use custom_model::{CustomModels, ModelFragment};
pub use face_direction::FaceDirection;
pub use greedy::{GreedyMesher, MeshMode};
pub use mesh_cache::{MeshCache, MeshCacheError, decode_mesh, encode_mesh};
pub use neighborhood::{ChunkBoundarySlice, ChunkNeighborhood, extract_boundary_slice};
pub use visibility::{FaceOwner, face_owner};
