//! On-disk cache of finished chunk meshes.
//!
//! # Format (version 1)
//!
//! ```text
//! magic "LMSH" (4) | version u8 | coord i32 x3 | bounds min f32 x3 | bounds max f32 x3
//! | opaque_count u32 | transparent_count u32 | water_count u32
//! | vertices: (position f32 x3, uv f32 x2) per vertex, opaque then transparent then water
//! ```
//!
//! All integers and floats are little-endian. A cache file is only trusted
//! if it was written no earlier than the chunk file it was built from.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glam::Vec3;
use lattice_voxel::ChunkCoord;
use lattice_voxel::atomic_write::write_atomic;
use thiserror::Error;

use crate::chunk_mesh::{Aabb, ChunkMesh, MeshVertex};

const MAGIC: &[u8; 4] = b"LMSH";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 12 + 24 + 12;
const VERTEX_LEN: usize = 20;

/// Errors reading or writing a mesh cache file.
#[derive(Debug, Error)]
pub enum MeshCacheError {
    #[error("invalid magic bytes: expected LMSH")]
    InvalidMagic,
    #[error("unsupported mesh cache version {0}")]
    UnsupportedVersion(u8),
    #[error("truncated mesh cache: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("vertex data length mismatch: header implies {expected} bytes, found {actual}")]
    VertexCountMismatch { expected: usize, actual: usize },
    #[error("mesh cache for {found} stored under {expected}")]
    CoordMismatch { expected: ChunkCoord, found: ChunkCoord },
    #[error("mesh cache I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MeshCacheError {
    /// Whether the file exists but cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Serializes `mesh` into the cache format.
pub fn encode_mesh(mesh: &ChunkMesh) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + mesh.vertex_count() * VERTEX_LEN);
    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);
    for c in [mesh.coord.x, mesh.coord.y, mesh.coord.z] {
        buf.extend_from_slice(&c.to_le_bytes());
    }
    for f in mesh.bounds.min.to_array().into_iter().chain(mesh.bounds.max.to_array()) {
        buf.extend_from_slice(&f.to_le_bytes());
    }
    let lists = [&mesh.opaque, &mesh.transparent, &mesh.water];
    for list in lists {
        buf.extend_from_slice(&(list.len() as u32).to_le_bytes());
    }
    for list in lists {
        for v in list.iter() {
            for f in v.position.into_iter().chain(v.uv) {
                buf.extend_from_slice(&f.to_le_bytes());
            }
        }
    }
    buf
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn vec3(&mut self) -> Vec3 {
        Vec3::new(self.f32(), self.f32(), self.f32())
    }
}

/// Parses a cache file produced by [`encode_mesh`].
pub fn decode_mesh(data: &[u8]) -> Result<ChunkMesh, MeshCacheError> {
    if data.len() < HEADER_LEN {
        return Err(MeshCacheError::Truncated {
            expected: HEADER_LEN,
            actual: data.len(),
        });
    }
    if &data[0..4] != MAGIC {
        return Err(MeshCacheError::InvalidMagic);
    }
    if data[4] != FORMAT_VERSION {
        return Err(MeshCacheError::UnsupportedVersion(data[4]));
    }

    let mut r = Reader { data, pos: 5 };
    let coord = ChunkCoord::new(r.i32(), r.i32(), r.i32());
    let bounds = Aabb::new(r.vec3(), r.vec3());
    let counts = [r.u32() as usize, r.u32() as usize, r.u32() as usize];

    let expected = counts
        .iter()
        .try_fold(0usize, |acc, &n| acc.checked_add(n.checked_mul(VERTEX_LEN)?))
        .unwrap_or(usize::MAX);
    let actual = data.len() - HEADER_LEN;
    if expected != actual {
        return Err(MeshCacheError::VertexCountMismatch { expected, actual });
    }

    let mut read_list = |count: usize| -> Vec<MeshVertex> {
        (0..count)
            .map(|_| MeshVertex {
                position: [r.f32(), r.f32(), r.f32()],
                uv: [r.f32(), r.f32()],
            })
            .collect()
    };
    let opaque = read_list(counts[0]);
    let transparent = read_list(counts[1]);
    let water = read_list(counts[2]);

    Ok(ChunkMesh {
        coord,
        opaque,
        transparent,
        water,
        bounds,
        quads: Vec::new(),
    })
}

/// Mesh cache directory, one `chunk_{x}_{y}_{z}.meshbin` file per chunk.
#[derive(Clone, Debug)]
pub struct MeshCache {
    dir: PathBuf,
}

impl MeshCache {
    /// Opens (creating if needed) the cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, coord: ChunkCoord) -> PathBuf {
        self.dir
            .join(format!("chunk_{}_{}_{}.meshbin", coord.x, coord.y, coord.z))
    }

    /// Writes `mesh` through a temp file and rename.
    pub fn store(&self, mesh: &ChunkMesh) -> Result<(), MeshCacheError> {
        write_atomic(&self.path(mesh.coord), &encode_mesh(mesh))?;
        Ok(())
    }

    /// Reads the cached mesh for `coord` without any staleness check.
    pub fn load(&self, coord: ChunkCoord) -> Result<Option<ChunkMesh>, MeshCacheError> {
        let bytes = match fs::read(self.path(coord)) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mesh = decode_mesh(&bytes)?;
        if mesh.coord != coord {
            return Err(MeshCacheError::CoordMismatch {
                expected: coord,
                found: mesh.coord,
            });
        }
        Ok(Some(mesh))
    }

    /// Returns the cached mesh if it is at least as new as the chunk file.
    ///
    /// `source_modified` is the chunk file's write time, or `None` if the
    /// chunk has never been saved (generated terrain is reproducible from
    /// the seed). Stale, missing or unreadable entries are all misses; an
    /// unreadable entry is also deleted so the next build replaces it.
    pub fn try_load_fresh(&self, coord: ChunkCoord, source_modified: Option<SystemTime>) -> Option<ChunkMesh> {
        let path = self.path(coord);
        let cache_modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        if let Some(source) = source_modified {
            if cache_modified < source {
                tracing::debug!(coord = ?coord, "mesh cache stale");
                return None;
            }
        }
        match self.load(coord) {
            Ok(mesh) => mesh,
            Err(e) => {
                tracing::warn!(coord = ?coord, error = %e, "discarding unreadable mesh cache");
                if let Err(e) = self.remove(coord) {
                    tracing::warn!(coord = ?coord, error = %e, "could not delete mesh cache entry");
                }
                None
            }
        }
    }

    /// Deletes the cache entry for `coord`, if any.
    pub fn remove(&self, coord: ChunkCoord) -> io::Result<()> {
        match fs::remove_file(self.path(coord)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
