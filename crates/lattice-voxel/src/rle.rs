//! Run-length encoding for palette index arrays.
//!
//! Runs of identical palette indices collapse into `(value, count)` pairs.
//! On the wire each run is 3 bytes: `value: u8` then `count: u16 LE`.

/// A single RLE run: `count` consecutive occurrences of `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RleRun {
    /// The palette index value.
    pub value: u8,
    /// Number of consecutive identical values (1..=65535).
    pub count: u16,
}

/// Bytes per encoded run.
pub const RUN_BYTES: usize = 3;

/// Errors that can occur during RLE decoding.
#[derive(Debug, thiserror::Error)]
pub enum RleError {
    /// Decoded length does not match expected length.
    #[error("RLE length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Expected number of elements.
        expected: usize,
        /// Actual number of decoded elements.
        actual: usize,
    },
    /// The byte stream is not a whole number of runs.
    #[error("RLE stream has {0} trailing bytes")]
    TrailingBytes(usize),
    /// A run with a zero count.
    #[error("RLE run with zero length")]
    ZeroRun,
}

/// Encodes a slice of palette indices into RLE runs.
///
/// Runs are capped at `u16::MAX` length. An empty input produces an empty output.
pub fn rle_encode(indices: &[u8]) -> Vec<RleRun> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < indices.len() {
        let value = indices[i];
        let mut count: u16 = 1;
        loop {
            let idx = i + (count as usize);
            if idx >= indices.len() || indices[idx] != value || count == u16::MAX {
                break;
            }
            count += 1;
        }
        runs.push(RleRun { value, count });
        i += count as usize;
    }
    runs
}

/// Decodes RLE runs back into a flat index array.
///
/// Stops early and reports a mismatch as soon as the output would exceed
/// `expected_len`, so a corrupt stream cannot allocate unbounded memory.
pub fn rle_decode(runs: &[RleRun], expected_len: usize) -> Result<Vec<u8>, RleError> {
    let mut result = Vec::with_capacity(expected_len);
    let mut total = 0usize;
    for run in runs {
        if run.count == 0 {
            return Err(RleError::ZeroRun);
        }
        total += run.count as usize;
        if total > expected_len {
            return Err(RleError::LengthMismatch {
                expected: expected_len,
                actual: total,
            });
        }
        result.extend(std::iter::repeat_n(run.value, run.count as usize));
    }
    if result.len() != expected_len {
        return Err(RleError::LengthMismatch {
            expected: expected_len,
            actual: result.len(),
        });
    }
    Ok(result)
}

/// Encodes RLE runs to bytes.
pub fn rle_to_bytes(runs: &[RleRun]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(runs.len() * RUN_BYTES);
    for run in runs {
        buf.push(run.value);
        buf.extend_from_slice(&run.count.to_le_bytes());
    }
    buf
}

/// Decodes RLE runs from bytes.
pub fn rle_from_bytes(data: &[u8]) -> Result<Vec<RleRun>, RleError> {
    let trailing = data.len() % RUN_BYTES;
    if trailing != 0 {
        return Err(RleError::TrailingBytes(trailing));
    }
    Ok(data
        .chunks_exact(RUN_BYTES)
        .map(|c| RleRun {
            value: c[0],
            count: u16::from_le_bytes([c[1], c[2]]),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_chunk_single_run() {
        let indices = vec![0u8; 4096];
        let runs = rle_encode(&indices);
        assert_eq!(runs, vec![RleRun { value: 0, count: 4096 }]);
    }

    #[test]
    fn test_long_run_splits_at_u16_max() {
        let indices = vec![7u8; 70_000];
        let runs = rle_encode(&indices);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].count, u16::MAX);
        assert_eq!(runs[1].count as usize, 70_000 - u16::MAX as usize);
    }

    #[test]
    fn test_rle_roundtrip_terrain_layers() {
        let mut indices = Vec::with_capacity(4096);
        indices.extend(std::iter::repeat_n(0u8, 2048));
        indices.extend(std::iter::repeat_n(1u8, 256));
        indices.extend(std::iter::repeat_n(2u8, 256));
        indices.extend(std::iter::repeat_n(3u8, 1536));

        let runs = rle_encode(&indices);
        assert_eq!(runs.len(), 4);
        let decoded = rle_decode(&runs, 4096).expect("decode failed");
        assert_eq!(decoded, indices);
    }

    #[test]
    fn test_rle_bytes_roundtrip() {
        let runs = vec![RleRun { value: 0, count: 100 }, RleRun { value: 3, count: 200 }];
        let bytes = rle_to_bytes(&runs);
        assert_eq!(bytes.len(), 6);
        let decoded = rle_from_bytes(&bytes).expect("whole runs");
        assert_eq!(decoded, runs);
    }

    #[test]
    fn test_decode_length_mismatch() {
        let runs = vec![RleRun { value: 0, count: 10 }];
        let result = rle_decode(&runs, 20);
        assert!(matches!(
            result,
            Err(RleError::LengthMismatch {
                expected: 20,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_decode_overflow_detected_early() {
        let runs = vec![RleRun { value: 0, count: 10 }, RleRun { value: 1, count: 10 }];
        let result = rle_decode(&runs, 15);
        assert!(matches!(result, Err(RleError::LengthMismatch { expected: 15, .. })));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert!(matches!(rle_from_bytes(&[1, 2, 0, 9]), Err(RleError::TrailingBytes(1))));
    }

    #[test]
    fn test_zero_run_rejected() {
        let runs = vec![RleRun { value: 0, count: 0 }];
        assert!(matches!(rle_decode(&runs, 0), Err(RleError::ZeroRun)));
    }
}
