//! Chunk mesh data: three vertex lists plus a world-space bounding box.

use glam::Vec3;
use lattice_voxel::ChunkCoord;

use crate::face_direction::FaceDirection;

/// A single mesh vertex. Positions are in world space.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    /// Atlas texture coordinates.
    pub uv: [f32; 2],
}

/// Vertices emitted per quad (two triangles, unindexed).
pub const VERTICES_PER_QUAD: usize = 6;

/// Which render pass a face belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshLayer {
    Opaque,
    Transparent,
    Water,
}

impl MeshLayer {
    pub const ALL: [MeshLayer; 3] = [Self::Opaque, Self::Transparent, Self::Water];
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Zero-sized box at `p`.
    pub fn point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Metadata for one emitted quad, kept for statistics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadInfo {
    pub direction: FaceDirection,
    pub layer: MeshLayer,
    /// Merged extent along the face's u and v axes.
    pub width: u8,
    pub height: u8,
}

/// The mesh output of a chunk meshing pass.
///
/// Derived data only: always reproducible from the chunk, its neighbors and
/// the atlas layout.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkMesh {
    pub coord: ChunkCoord,
    pub opaque: Vec<MeshVertex>,
    pub transparent: Vec<MeshVertex>,
    pub water: Vec<MeshVertex>,
    /// Bounds of every emitted vertex. A zero-sized box at the chunk origin
    /// when the mesh is empty.
    pub bounds: Aabb,
    /// One entry per greedy quad. Custom-model fragments are not listed and
    /// this is not persisted by the mesh cache.
    pub quads: Vec<QuadInfo>,
}

impl ChunkMesh {
    /// Creates an empty mesh for `coord`.
    pub fn new(coord: ChunkCoord) -> Self {
        let [x, y, z] = coord.origin();
        Self {
            coord,
            opaque: Vec::new(),
            transparent: Vec::new(),
            water: Vec::new(),
            bounds: Aabb::point(Vec3::new(x as f32, y as f32, z as f32)),
            quads: Vec::new(),
        }
    }

    /// Empty stand-in for a chunk that repeatedly failed to mesh.
    pub fn placeholder(coord: ChunkCoord) -> Self {
        Self::new(coord)
    }

    pub fn layer(&self, layer: MeshLayer) -> &[MeshVertex] {
        match layer {
            MeshLayer::Opaque => &self.opaque,
            MeshLayer::Transparent => &self.transparent,
            MeshLayer::Water => &self.water,
        }
    }

    fn layer_mut(&mut self, layer: MeshLayer) -> &mut Vec<MeshVertex> {
        match layer {
            MeshLayer::Opaque => &mut self.opaque,
            MeshLayer::Transparent => &mut self.transparent,
            MeshLayer::Water => &mut self.water,
        }
    }

    /// Raw bytes of one vertex list, ready for a GPU upload.
    pub fn layer_bytes(&self, layer: MeshLayer) -> &[u8] {
        bytemuck::cast_slice(self.layer(layer))
    }

    pub fn vertex_count(&self) -> usize {
        self.opaque.len() + self.transparent.len() + self.water.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    /// Greedy quads emitted for `direction`.
    pub fn count_quads_for_direction(&self, direction: FaceDirection) -> usize {
        self.quads.iter().filter(|q| q.direction == direction).count()
    }

    pub fn quad_count(&self) -> usize {
        self.quads.len()
    }

    /// Appends one quad as two triangles.
    ///
    /// `corners` go around the quad in order; `uvs[i]` belongs to
    /// `corners[i]`. When `flip` is set the triangles are wound the other way.
    pub fn push_quad(&mut self, layer: MeshLayer, corners: [Vec3; 4], uvs: [[f32; 2]; 4], flip: bool) {
        const FORWARD: [usize; 6] = [0, 1, 2, 0, 2, 3];
        const REVERSED: [usize; 6] = [0, 2, 1, 0, 3, 2];
        let order = if flip { REVERSED } else { FORWARD };

        if self.is_empty() {
            self.bounds = Aabb::point(corners[0]);
        }
        for c in corners {
            self.bounds.grow(c);
        }
        let list = self.layer_mut(layer);
        list.extend(order.iter().map(|&i| MeshVertex {
            position: corners[i].to_array(),
            uv: uvs[i],
        }));
    }

    /// Appends prebuilt vertices translated by `offset`.
    pub fn push_fragment(&mut self, layer: MeshLayer, vertices: &[MeshVertex], offset: Vec3) {
        if vertices.is_empty() {
            return;
        }
        if self.is_empty() {
            self.bounds = Aabb::point(Vec3::from_array(vertices[0].position) + offset);
        }
        for v in vertices {
            self.bounds.grow(Vec3::from_array(v.position) + offset);
        }
        let list = self.layer_mut(layer);
        list.extend(vertices.iter().map(|v| MeshVertex {
            position: (Vec3::from_array(v.position) + offset).to_array(),
            uv: v.uv,
        }));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
