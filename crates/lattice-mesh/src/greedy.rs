//! Greedy meshing: merges coplanar faces of the same block and orientation
//! into larger rectangular quads.
//!
//! For each axis the sweep visits every boundary plane of the chunk,
//! including the two planes shared with neighbors. A 2D mask records which
//! block owns the face at each cell of the plane (see
//! [`crate::visibility::face_owner`]). Faces owned by a neighbor block are
//! left to the neighbor's own mesh, so each seam face is emitted exactly once.

use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use lattice_voxel::{BlockId, BlockRegistry, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, VoxelChunkData};

use crate::atlas::{GridAtlas, TextureAtlas};
use crate::chunk_mesh::{ChunkMesh, QuadInfo};
use crate::custom_model::CustomModels;
use crate::face_direction::FaceDirection;
use crate::neighborhood::ChunkNeighborhood;
use crate::visibility::{FaceOwner, face_owner, layer_for};

const DIMS: [usize; 3] = [CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z];

/// Whether faces are merged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MeshMode {
    /// One quad per visible face. Lowest latency.
    Fast,
    /// Greedy rectangle merging. Fewest triangles.
    #[default]
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MaskCell {
    block: BlockId,
    direction: FaceDirection,
}

/// Builds [`ChunkMesh`]es. Holds only shared, read-only lookup tables, so
/// clones can run on any number of threads.
#[derive(Clone)]
pub struct GreedyMesher {
    registry: Arc<BlockRegistry>,
    atlas: Arc<dyn TextureAtlas>,
    models: Arc<CustomModels>,
}

impl GreedyMesher {
    pub fn new(
        registry: Arc<BlockRegistry>,
        atlas: Arc<dyn TextureAtlas>,
        models: Arc<CustomModels>,
    ) -> Self {
        Self {
            registry,
            atlas,
            models,
        }
    }

    /// Default blocks, grid atlas and models.
    pub fn with_defaults() -> Self {
        let atlas = GridAtlas::with_defaults();
        let models = CustomModels::with_defaults(&atlas);
        Self::new(
            Arc::new(BlockRegistry::with_defaults()),
            Arc::new(atlas),
            Arc::new(models),
        )
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Meshes the centre of a captured neighborhood.
    pub fn build(&self, hood: &ChunkNeighborhood, mode: MeshMode) -> ChunkMesh {
        self.build_with(hood.center(), &|x, y, z| hood.get(x, y, z), mode)
    }

    /// Meshes `chunk`. `neighbor` is asked for local positions one block
    /// outside the chunk.
    pub fn build_with(
        &self,
        chunk: &VoxelChunkData,
        neighbor: &dyn Fn(i32, i32, i32) -> BlockId,
        mode: MeshMode,
    ) -> ChunkMesh {
        let start = Instant::now();
        let coord = chunk.coord();
        let origin = coord.origin().map(|c| c as f32);
        let mut mesh = ChunkMesh::new(coord);

        let block_at = |p: [i32; 3]| {
            let inside = (0..3).all(|a| p[a] >= 0 && (p[a] as usize) < DIMS[a]);
            if inside {
                chunk.get(p[0] as usize, p[1] as usize, p[2] as usize)
            } else {
                neighbor(p[0], p[1], p[2])
            }
        };

        for axis in 0..3 {
            let (_, u_axis, v_axis) = FaceDirection::from_axis(axis, true).sweep_axes();
            let (us, vs) = (DIMS[u_axis], DIMS[v_axis]);
            let mut mask: Vec<Option<MaskCell>> = vec![None; us * vs];

            for plane in 0..=DIMS[axis] {
                for v in 0..vs {
                    for u in 0..us {
                        let mut p = [0i32; 3];
                        p[axis] = plane as i32;
                        p[u_axis] = u as i32;
                        p[v_axis] = v as i32;
                        let high = block_at(p);
                        p[axis] -= 1;
                        let low = block_at(p);

                        mask[v * us + u] = match face_owner(&self.registry, low, high) {
                            Some(FaceOwner::Low) if plane > 0 => Some(MaskCell {
                                block: low,
                                direction: FaceDirection::from_axis(axis, true),
                            }),
                            Some(FaceOwner::High) if plane < DIMS[axis] => Some(MaskCell {
                                block: high,
                                direction: FaceDirection::from_axis(axis, false),
                            }),
                            _ => None,
                        };
                    }
                }

                for v in 0..vs {
                    let mut u = 0;
                    while u < us {
                        let Some(cell) = mask[v * us + u] else {
                            u += 1;
                            continue;
                        };

                        let (w, h) = match mode {
                            MeshMode::Fast => (1, 1),
                            MeshMode::Full => {
                                let mut w = 1;
                                while u + w < us && mask[v * us + u + w] == Some(cell) {
                                    w += 1;
                                }
                                let mut h = 1;
                                'grow: while v + h < vs {
                                    for du in 0..w {
                                        if mask[(v + h) * us + u + du] != Some(cell) {
                                            break 'grow;
                                        }
                                    }
                                    h += 1;
                                }
                                (w, h)
                            }
                        };

                        for dv in 0..h {
                            for du in 0..w {
                                mask[(v + dv) * us + u + du] = None;
                            }
                        }

                        self.emit_quad(&mut mesh, origin, cell, axis, plane, (u, v), (w, h));
                        u += w;
                    }
                }
            }
        }

        self.append_custom_models(&mut mesh, chunk, origin);

        tracing::trace!(
            coord = ?coord,
            ?mode,
            quads = mesh.quad_count(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "meshed chunk"
        );
        mesh
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_quad(
        &self,
        mesh: &mut ChunkMesh,
        origin: [f32; 3],
        cell: MaskCell,
        axis: usize,
        plane: usize,
        (u, v): (usize, usize),
        (w, h): (usize, usize),
    ) {
        let (_, u_axis, v_axis) = cell.direction.sweep_axes();
        let corner = |cu: usize, cv: usize| {
            let mut p = [0.0f32; 3];
            p[axis] = origin[axis] + plane as f32;
            p[u_axis] = origin[u_axis] + cu as f32;
            p[v_axis] = origin[v_axis] + cv as f32;
            Vec3::from_array(p)
        };
        let corners = [corner(u, v), corner(u + w, v), corner(u + w, v + h), corner(u, v + h)];

        // Corners wind around u × v, which is +Z for Z faces and the negative
        // axis for X and Y faces.
        let uv_normal_positive = axis == 2;
        let flip = uv_normal_positive != cell.direction.is_positive();

        let layer = layer_for(&self.registry, cell.block);
        let uvs = self.atlas.face_uv_rect(cell.block, cell.direction);
        mesh.push_quad(layer, corners, uvs, flip);
        mesh.quads.push(QuadInfo {
            direction: cell.direction,
            layer,
            width: w as u8,
            height: h as u8,
        });
    }

    fn append_custom_models(&self, mesh: &mut ChunkMesh, chunk: &VoxelChunkData, origin: [f32; 3]) {
        if chunk.is_empty() {
            return;
        }
        for x in 0..CHUNK_SIZE_X {
            for y in 0..CHUNK_SIZE_Y {
                for z in 0..CHUNK_SIZE_Z {
                    let block = chunk.get(x, y, z);
                    if block.is_air() || !self.registry.has_custom_model(block) {
                        continue;
                    }
                    let Some(fragment) = self.models.get(block) else {
                        tracing::trace!(?block, "custom-model block has no geometry");
                        continue;
                    };
                    let offset = Vec3::from_array(origin) + Vec3::new(x as f32, y as f32, z as f32);
                    mesh.push_fragment(layer_for(&self.registry, block), &fragment.vertices, offset);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_mesh::{MeshLayer, VERTICES_PER_QUAD};
    use lattice_voxel::{CHUNK_VOLUME, ChunkCoord};

    fn filled(coord: ChunkCoord, block: BlockId) -> VoxelChunkData {
        VoxelChunkData::from_blocks(coord, vec![block.0; CHUNK_VOLUME]).expect("full buffer")
    }

    fn air() -> impl Fn(i32, i32, i32) -> BlockId {
        |_, _, _| BlockId::AIR
    }

    #[test]
    fn test_empty_chunk_has_no_faces() {
        let mesher = GreedyMesher::with_defaults();
        let mesh = mesher.build_with(&VoxelChunkData::new(ChunkCoord::new(0, 0, 0)), &air(), MeshMode::Full);
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_enclosed_cube_has_no_faces() {
        let mesher = GreedyMesher::with_defaults();
        let chunk = filled(ChunkCoord::new(0, 0, 0), BlockId::STONE);
        let stone = |_: i32, _: i32, _: i32| BlockId::STONE;
        for mode in [MeshMode::Fast, MeshMode::Full] {
            let mesh = mesher.build_with(&chunk, &stone, mode);
            assert_eq!(mesh.vertex_count(), 0, "{mode:?} mesh of buried chunk");
        }
    }

    #[test]
    fn test_solid_cube_only_shows_shell() {
        let mesher = GreedyMesher::with_defaults();
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        for x in 4..7 {
            for y in 4..7 {
                for z in 4..7 {
                    chunk.set_raw(x, y, z, BlockId::STONE);
                }
            }
        }
        let full = mesher.build_with(&chunk, &air(), MeshMode::Full);
        assert_eq!(full.quad_count(), 6, "one merged quad per cube side");
        let fast = mesher.build_with(&chunk, &air(), MeshMode::Fast);
        assert_eq!(fast.quad_count(), 6 * 9, "centre block contributes nothing");
    }

    #[test]
    fn test_plane_merges_in_full_mode_only() {
        let mesher = GreedyMesher::with_defaults();
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        for x in 2..7 {
            for z in 3..10 {
                chunk.set_raw(x, 3, z, BlockId::STONE);
            }
        }
        let full = mesher.build_with(&chunk, &air(), MeshMode::Full);
        assert_eq!(full.count_quads_for_direction(FaceDirection::PosY), 1);
        assert_eq!(full.count_quads_for_direction(FaceDirection::NegY), 1);

        let fast = mesher.build_with(&chunk, &air(), MeshMode::Fast);
        assert_eq!(fast.count_quads_for_direction(FaceDirection::PosY), 5 * 7);
        assert_eq!(fast.opaque.len(), fast.quad_count() * VERTICES_PER_QUAD);
    }

    #[test]
    fn test_checkerboard_does_not_merge_different_blocks() {
        let mesher = GreedyMesher::with_defaults();
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        for x in 0..4 {
            for z in 0..4 {
                let b = if (x + z) % 2 == 0 { BlockId::STONE } else { BlockId::DIRT };
                chunk.set_raw(x, 0, z, b);
            }
        }
        let mesh = mesher.build_with(&chunk, &air(), MeshMode::Full);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), 16);
    }

    #[test]
    fn test_faces_point_outward_in_world_space() {
        let mesher = GreedyMesher::with_defaults();
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(2, 0, -1));
        chunk.set_raw(0, 0, 0, BlockId::STONE);
        let mesh = mesher.build_with(&chunk, &air(), MeshMode::Full);

        assert_eq!(mesh.quad_count(), 6);
        assert_eq!(mesh.bounds.min, Vec3::new(32.0, 0.0, -16.0));
        assert_eq!(mesh.bounds.max, Vec3::new(33.0, 1.0, -15.0));

        let centre = Vec3::new(32.5, 0.5, -15.5);
        for (i, quad) in mesh.quads.iter().enumerate() {
            let tri = &mesh.opaque[i * VERTICES_PER_QUAD..i * VERTICES_PER_QUAD + 3];
            let p = |k: usize| Vec3::from_array(tri[k].position);
            let normal = (p(1) - p(0)).cross(p(2) - p(0));
            let expected = Vec3::from_array(quad.direction.normal());
            assert!(normal.dot(expected) > 0.0, "{:?} face wound inward", quad.direction);
            assert!((p(0) - centre).dot(expected) > 0.0, "{:?} face on wrong side", quad.direction);
        }
    }

    #[test]
    fn test_layers_are_partitioned() {
        let mesher = GreedyMesher::with_defaults();
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        chunk.set_raw(1, 1, 1, BlockId::STONE);
        chunk.set_raw(5, 1, 1, BlockId::GLASS);
        chunk.set_raw(9, 1, 1, BlockId::WATER);
        let mesh = mesher.build_with(&chunk, &air(), MeshMode::Full);
        for layer in MeshLayer::ALL {
            assert_eq!(mesh.layer(layer).len(), 6 * VERTICES_PER_QUAD, "{layer:?}");
        }
    }

    #[test]
    fn test_water_on_sand_owns_the_boundary() {
        let mesher = GreedyMesher::with_defaults();
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        chunk.set_raw(3, 3, 3, BlockId::SAND);
        chunk.set_raw(3, 4, 3, BlockId::WATER);
        let mesh = mesher.build_with(&chunk, &air(), MeshMode::Full);
        // Sand loses its top, water keeps its bottom.
        assert_eq!(mesh.opaque.len(), 5 * VERTICES_PER_QUAD);
        assert_eq!(mesh.water.len(), 6 * VERTICES_PER_QUAD);
    }

    #[test]
    fn test_custom_models_skip_greedy_sweep() {
        let mesher = GreedyMesher::with_defaults();
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        chunk.set_raw(3, 3, 3, BlockId::GRASS);
        chunk.set_raw(3, 4, 3, BlockId::FLOWER);
        let mesh = mesher.build_with(&chunk, &air(), MeshMode::Full);
        assert_eq!(mesh.opaque.len(), 6 * VERTICES_PER_QUAD, "grass keeps its top face");
        assert_eq!(mesh.transparent.len(), 24, "flower cross fragment");
        assert_eq!(mesh.quad_count(), 6);
        assert!(mesh.transparent.iter().all(|v| v.position[1] >= 4.0 && v.position[1] <= 5.0));
    }

    /// Counts unmerged faces lying on world plane `x = 16` between chunks
    /// (0,0,0) and (1,0,0), by direction.
    fn seam_faces(mesher: &GreedyMesher, west: &VoxelChunkData, east: &VoxelChunkData) -> (usize, usize) {
        let mut hw = ChunkNeighborhood::isolated(west.clone());
        hw.set_neighbor(FaceDirection::PosX, east);
        let mut he = ChunkNeighborhood::isolated(east.clone());
        he.set_neighbor(FaceDirection::NegX, west);

        let on_seam = |mesh: &ChunkMesh, dir: FaceDirection| {
            mesh.quads
                .iter()
                .enumerate()
                .filter(|(i, q)| {
                    let list = mesh.layer(q.layer);
                    let before = mesh.quads[..*i].iter().filter(|p| p.layer == q.layer).count();
                    q.direction == dir && list[before * VERTICES_PER_QUAD].position[0] == 16.0
                })
                .count()
        };
        let mw = mesher.build(&hw, MeshMode::Fast);
        let me = mesher.build(&he, MeshMode::Fast);
        (
            on_seam(&mw, FaceDirection::PosX) + on_seam(&me, FaceDirection::PosX),
            on_seam(&mw, FaceDirection::NegX) + on_seam(&me, FaceDirection::NegX),
        )
    }

    #[test]
    fn test_seam_faces_emitted_exactly_once() {
        let mesher = GreedyMesher::with_defaults();
        let mut west = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        for y in 0..16 {
            for z in 0..16 {
                west.set_raw(15, y, z, BlockId::STONE);
            }
        }
        let mut east = VoxelChunkData::new(ChunkCoord::new(1, 0, 0));
        assert_eq!(seam_faces(&mesher, &west, &east), (256, 0));

        // An opaque block on the far side hides one seam face.
        east.set_raw(0, 5, 5, BlockId::STONE);
        assert_eq!(seam_faces(&mesher, &west, &east), (255, 0));

        // A transparent block there owns that cell's face instead.
        east.set_raw(0, 5, 5, BlockId::GLASS);
        assert_eq!(seam_faces(&mesher, &west, &east), (255, 1));

        // Glass keeps the face once the west block is gone.
        west.set_raw(15, 5, 5, BlockId::AIR);
        assert_eq!(seam_faces(&mesher, &west, &east), (255, 1));
    }

    #[test]
    fn test_build_is_pure() {
        let mesher = GreedyMesher::with_defaults();
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(0, 1, 0));
        chunk.set_raw(4, 4, 4, BlockId::LOG);
        chunk.set_raw(4, 5, 4, BlockId::LEAVES);
        let hood = ChunkNeighborhood::isolated(chunk);
        assert_eq!(mesher.build(&hood, MeshMode::Full), mesher.build(&hood, MeshMode::Full));
    }
}
