//! Binary serialization and deserialization for [`VoxelChunkData`].
//!
//! The LVCK format stores a deduplicated palette of the block IDs present in
//! the chunk, followed by a Deflate-compressed run-length stream of palette
//! indices.
//!
//! ## Binary Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Magic bytes `"LVCK"` |
//! | 4 | 1 | Format version (`u8`, currently 1) |
//! | 5 | 3 | Dimensions X, Y, Z (`u8` each) |
//! | 8 | 12 | Chunk coordinate X, Y, Z (`i32` little-endian each) |
//! | 20 | 2 | Palette length N (`u16` little-endian, 0..=256) |
//! | 22 | N | Palette entries (block IDs) |
//! | 22+N | 4 | Compressed stream length C (`u32` little-endian) |
//! | 26+N | C | Deflate stream of RLE runs (`value: u8`, `count: u16 LE`) |
//!
//! An all-air chunk has N = 0 and C = 0.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::chunk::VoxelChunkData;
use crate::coords::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z, CHUNK_VOLUME, ChunkCoord};
use crate::rle::{self, RUN_BYTES, RleError};

/// Magic bytes identifying the LVCK format.
const MAGIC: [u8; 4] = *b"LVCK";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 22;

/// Errors that can occur during chunk (de)serialization.
#[derive(Debug, thiserror::Error)]
pub enum ChunkSerError {
    /// The data does not start with the expected magic bytes.
    #[error("invalid magic bytes")]
    InvalidMagic,
    /// The format version is not supported by this build.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),
    /// The data is shorter than expected.
    #[error("data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count received.
        actual: usize,
    },
    /// The stored chunk dimensions differ from this build's fixed size.
    #[error("chunk dimensions {0}x{1}x{2} do not match")]
    DimensionMismatch(u8, u8, u8),
    /// Palette holds more than 256 entries.
    #[error("palette length {0} exceeds 256")]
    PaletteTooLarge(usize),
    /// A run refers to a palette slot that does not exist.
    #[error("palette index {index} out of range (palette has {len} entries)")]
    InvalidPaletteIndex {
        /// Offending index.
        index: u8,
        /// Palette length.
        len: usize,
    },
    /// A non-empty palette with no block data, or vice versa.
    #[error("palette and block stream disagree")]
    InconsistentPayload,
    /// Decompressed stream is larger than any valid chunk.
    #[error("decompressed stream exceeds {0} bytes")]
    Oversized(usize),
    /// The run stream does not reconstruct the chunk volume.
    #[error(transparent)]
    Rle(#[from] RleError),
    /// Deflate failure.
    #[error("deflate stream error: {0}")]
    Deflate(#[from] std::io::Error),
}

impl VoxelChunkData {
    /// Serializes this chunk to a byte vector in the LVCK binary format.
    pub fn serialize(&self) -> Result<Vec<u8>, ChunkSerError> {
        let (palette, indices) = build_palette(self.blocks());

        let mut buf = Vec::with_capacity(HEADER_LEN + palette.len() + 4 + 64);
        buf.extend_from_slice(&MAGIC);
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&[CHUNK_SIZE_X as u8, CHUNK_SIZE_Y as u8, CHUNK_SIZE_Z as u8]);
        let coord = self.coord();
        for v in [coord.x, coord.y, coord.z] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&(palette.len() as u16).to_le_bytes());
        buf.extend_from_slice(&palette);

        if palette.is_empty() {
            buf.extend_from_slice(&0u32.to_le_bytes());
            return Ok(buf);
        }

        let runs = rle::rle_encode(&indices);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&rle::rle_to_bytes(&runs))?;
        let compressed = encoder.finish()?;

        buf.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        buf.extend_from_slice(&compressed);
        Ok(buf)
    }

    /// Deserializes a chunk from a byte slice in the LVCK binary format.
    ///
    /// The returned chunk has no dirty flags set.
    pub fn deserialize(data: &[u8]) -> Result<Self, ChunkSerError> {
        if data.len() < 4 || data[0..4] != MAGIC {
            return Err(ChunkSerError::InvalidMagic);
        }
        if data.len() < 5 {
            return Err(ChunkSerError::Truncated {
                expected: 5,
                actual: data.len(),
            });
        }
        let version = data[4];
        if version != FORMAT_VERSION {
            return Err(ChunkSerError::UnsupportedVersion(version));
        }
        if data.len() < HEADER_LEN {
            return Err(ChunkSerError::Truncated {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        let (dx, dy, dz) = (data[5], data[6], data[7]);
        if (dx as usize, dy as usize, dz as usize) != (CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z) {
            return Err(ChunkSerError::DimensionMismatch(dx, dy, dz));
        }
        let coord = ChunkCoord::new(read_i32(data, 8), read_i32(data, 12), read_i32(data, 16));

        let palette_len = u16::from_le_bytes([data[20], data[21]]) as usize;
        if palette_len > 256 {
            return Err(ChunkSerError::PaletteTooLarge(palette_len));
        }
        let palette_end = HEADER_LEN + palette_len;
        if data.len() < palette_end + 4 {
            return Err(ChunkSerError::Truncated {
                expected: palette_end + 4,
                actual: data.len(),
            });
        }
        let palette = &data[HEADER_LEN..palette_end];
        let compressed_len = u32::from_le_bytes([
            data[palette_end],
            data[palette_end + 1],
            data[palette_end + 2],
            data[palette_end + 3],
        ]) as usize;
        let stream_start = palette_end + 4;
        let stream_end = stream_start + compressed_len;
        if data.len() < stream_end {
            return Err(ChunkSerError::Truncated {
                expected: stream_end,
                actual: data.len(),
            });
        }

        match (palette_len, compressed_len) {
            (0, 0) => return Ok(VoxelChunkData::new(coord)),
            (0, _) | (_, 0) => return Err(ChunkSerError::InconsistentPayload),
            _ => {}
        }

        // A valid stream never needs more than one run per block.
        let limit = CHUNK_VOLUME * RUN_BYTES;
        let mut raw = Vec::new();
        DeflateDecoder::new(&data[stream_start..stream_end])
            .take(limit as u64 + 1)
            .read_to_end(&mut raw)?;
        if raw.len() > limit {
            return Err(ChunkSerError::Oversized(limit));
        }

        let runs = rle::rle_from_bytes(&raw)?;
        let indices = rle::rle_decode(&runs, CHUNK_VOLUME)?;

        let mut blocks = Vec::with_capacity(CHUNK_VOLUME);
        for index in indices {
            let id = palette
                .get(index as usize)
                .ok_or(ChunkSerError::InvalidPaletteIndex {
                    index,
                    len: palette_len,
                })?;
            blocks.push(*id);
        }

        VoxelChunkData::from_blocks(coord, blocks).ok_or(ChunkSerError::InconsistentPayload)
    }
}

/// Deduplicates block IDs in first-seen order and maps every block to its
/// palette index. An all-air chunk yields an empty palette.
fn build_palette(blocks: &[u8]) -> (Vec<u8>, Vec<u8>) {
    if blocks.iter().all(|&b| b == 0) {
        return (Vec::new(), Vec::new());
    }
    let mut slot: [Option<u8>; 256] = [None; 256];
    let mut palette = Vec::new();
    let mut indices = Vec::with_capacity(blocks.len());
    for &block in blocks {
        let index = match slot[block as usize] {
            Some(i) => i,
            None => {
                // At most 256 distinct byte values, so the index fits in u8.
                let i = palette.len() as u8;
                palette.push(block);
                slot[block as usize] = Some(i);
                i
            }
        };
        indices.push(index);
    }
    (palette, indices)
}

fn read_i32(data: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BlockId;

    fn layered_chunk() -> VoxelChunkData {
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(-4, 1, 9));
        for x in 0..16 {
            for z in 0..16 {
                for y in 0..6 {
                    chunk.set_raw(x, y, z, BlockId::STONE);
                }
                chunk.set_raw(x, 6, z, BlockId::DIRT);
                chunk.set_raw(x, 7, z, BlockId::GRASS);
            }
        }
        chunk
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let chunk = layered_chunk();
        let bytes = chunk.serialize().expect("serialize");
        let restored = VoxelChunkData::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored.blocks(), chunk.blocks());
        assert_eq!(restored.coord(), ChunkCoord::new(-4, 1, 9));
        assert!(!restored.is_dirty(), "loaded chunk should start clean");
    }

    #[test]
    fn test_all_air_has_empty_palette() {
        let chunk = VoxelChunkData::new(ChunkCoord::new(0, 0, 0));
        let bytes = chunk.serialize().expect("serialize");
        assert_eq!(bytes.len(), HEADER_LEN + 4, "no palette and no stream");
        assert_eq!(&bytes[20..22], &[0, 0]);
        let restored = VoxelChunkData::deserialize(&bytes).expect("deserialize");
        assert!(restored.is_empty());
    }

    #[test]
    fn test_256_distinct_materials_roundtrip() {
        let mut chunk = VoxelChunkData::new(ChunkCoord::new(3, 0, 3));
        for i in 0..CHUNK_VOLUME {
            let x = i / 256;
            let y = (i / 16) % 16;
            let z = i % 16;
            chunk.set_raw(x, y, z, BlockId((i % 256) as u8));
        }
        let bytes = chunk.serialize().expect("serialize");
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 256);
        let restored = VoxelChunkData::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored.blocks(), chunk.blocks());
    }

    #[test]
    fn test_version_and_dimensions_present() {
        let bytes = layered_chunk().serialize().expect("serialize");
        assert_eq!(&bytes[0..4], b"LVCK");
        assert_eq!(bytes[4], FORMAT_VERSION);
        assert_eq!(&bytes[5..8], &[16, 16, 16]);
    }

    #[test]
    fn test_corrupted_data_returns_error() {
        let result = VoxelChunkData::deserialize(&[0xFF, 0xFF]);
        assert!(matches!(result, Err(ChunkSerError::InvalidMagic)), "got {result:?}");

        let mut bytes = layered_chunk().serialize().expect("serialize");
        bytes[4] = 99;
        let result = VoxelChunkData::deserialize(&bytes);
        assert!(
            matches!(result, Err(ChunkSerError::UnsupportedVersion(99))),
            "got {result:?}"
        );

        let bytes = layered_chunk().serialize().expect("serialize");
        let result = VoxelChunkData::deserialize(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(ChunkSerError::Truncated { .. })), "got {result:?}");

        let mut bytes = layered_chunk().serialize().expect("serialize");
        bytes[6] = 32;
        let result = VoxelChunkData::deserialize(&bytes);
        assert!(
            matches!(result, Err(ChunkSerError::DimensionMismatch(16, 32, 16))),
            "got {result:?}"
        );
    }

    #[test]
    fn test_short_run_stream_is_corruption() {
        // Hand-build a stream that only covers half the volume.
        let runs = rle::rle_encode(&vec![0u8; CHUNK_VOLUME / 2]);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&rle::rle_to_bytes(&runs)).expect("write");
        let compressed = encoder.finish().expect("finish");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&[16, 16, 16]);
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(BlockId::STONE.0);
        bytes.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&compressed);

        let result = VoxelChunkData::deserialize(&bytes);
        assert!(
            matches!(result, Err(ChunkSerError::Rle(RleError::LengthMismatch { .. }))),
            "got {result:?}"
        );
    }

    #[test]
    fn test_palette_index_out_of_range() {
        let runs = rle::rle_encode(&vec![3u8; CHUNK_VOLUME]);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&rle::rle_to_bytes(&runs)).expect("write");
        let compressed = encoder.finish().expect("finish");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&[16, 16, 16]);
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(BlockId::STONE.0);
        bytes.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&compressed);

        let result = VoxelChunkData::deserialize(&bytes);
        assert!(
            matches!(result, Err(ChunkSerError::InvalidPaletteIndex { index: 3, len: 1 })),
            "got {result:?}"
        );
    }
}
