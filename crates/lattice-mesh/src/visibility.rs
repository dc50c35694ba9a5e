//! Face ownership between two adjacent blocks.
//!
//! Every boundary between two cells produces at most one face, owned by one
//! of the two blocks. Blocks with custom models take no part in this and
//! count as empty space.

use lattice_voxel::{BlockId, BlockRegistry, Transparency};

use crate::chunk_mesh::MeshLayer;

/// Which side of a boundary owns the face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceOwner {
    /// The block at the lower coordinate; its face points along +axis.
    Low,
    /// The block at the higher coordinate; its face points along −axis.
    High,
}

/// How a block participates in the greedy sweep.
pub fn surface_class(registry: &BlockRegistry, block: BlockId) -> Transparency {
    if block.is_air() || registry.has_custom_model(block) {
        return Transparency::Empty;
    }
    registry.transparency(block)
}

/// Render pass for faces of a block.
pub fn layer_for(registry: &BlockRegistry, block: BlockId) -> MeshLayer {
    match registry.transparency(block) {
        Transparency::Water => MeshLayer::Water,
        Transparency::Transparent | Transparency::Empty => MeshLayer::Transparent,
        Transparency::Opaque => MeshLayer::Opaque,
    }
}

/// Decides which of `low` and `high` (adjacent along one axis) owns their
/// shared face, or `None` if no face is drawn.
///
/// - identical IDs never draw a face
/// - a block next to empty space always draws its face
/// - opaque against anything see-through: the see-through side draws it
/// - water against another see-through block: the non-water side draws it
/// - any other pair of see-through blocks: the lower side draws it
pub fn face_owner(registry: &BlockRegistry, low: BlockId, high: BlockId) -> Option<FaceOwner> {
    use Transparency::{Empty, Opaque, Transparent, Water};

    if low == high {
        return None;
    }
    match (surface_class(registry, low), surface_class(registry, high)) {
        (Empty, Empty) | (Opaque, Opaque) => None,
        (_, Empty) => Some(FaceOwner::Low),
        (Empty, _) => Some(FaceOwner::High),
        (Opaque, _) => Some(FaceOwner::High),
        (_, Opaque) => Some(FaceOwner::Low),
        (Water, Transparent) => Some(FaceOwner::High),
        (Transparent, Water) => Some(FaceOwner::Low),
        (Transparent, Transparent) | (Water, Water) => Some(FaceOwner::Low),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
