//! Non-cube block geometry appended after the greedy sweep.

use lattice_voxel::{BlockId, BlockRegistry};
use rustc_hash::FxHashMap;

use crate::atlas::TextureAtlas;
use crate::chunk_mesh::MeshVertex;
use crate::face_direction::FaceDirection;

/// Precomputed triangles for one block, in block-local `[0, 1]` space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelFragment {
    pub vertices: Vec<MeshVertex>,
}

impl ModelFragment {
    /// Two vertical quads crossing diagonally through the block, each drawn
    /// from both sides. Used for plants.
    pub fn cross(uvs: [[f32; 2]; 4]) -> Self {
        let diagonals = [
            ([0.0, 0.0, 0.0], [1.0, 0.0, 1.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let mut vertices = Vec::with_capacity(24);
        for (a, b) in diagonals {
            let corners = [
                [a[0], 0.0, a[2]],
                [b[0], 0.0, b[2]],
                [b[0], 1.0, b[2]],
                [a[0], 1.0, a[2]],
            ];
            for order in [[0, 1, 2, 0, 2, 3], [0, 2, 1, 0, 3, 2]] {
                vertices.extend(order.iter().map(|&i| MeshVertex {
                    position: corners[i],
                    uv: uvs[i],
                }));
            }
        }
        Self { vertices }
    }
}

/// Geometry for every block flagged as having a custom model.
#[derive(Clone, Debug, Default)]
pub struct CustomModels {
    models: FxHashMap<BlockId, ModelFragment>,
}

impl CustomModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Models for the built-in block set: the flower is a textured cross.
    pub fn with_defaults(atlas: &dyn TextureAtlas) -> Self {
        let mut models = Self::new();
        models.register(
            BlockId::FLOWER,
            ModelFragment::cross(atlas.face_uv_rect(BlockId::FLOWER, FaceDirection::PosZ)),
        );
        models
    }

    pub fn register(&mut self, block: BlockId, fragment: ModelFragment) {
        self.models.insert(block, fragment);
    }

    pub fn get(&self, block: BlockId) -> Option<&ModelFragment> {
        self.models.get(&block)
    }

    /// Custom-model blocks in `registry` that have no geometry here.
    pub fn missing(&self, registry: &BlockRegistry) -> Vec<BlockId> {
        (0..registry.len())
            .map(|i| BlockId(i as u8))
            .filter(|&id| registry.has_custom_model(id) && !self.models.contains_key(&id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
