//! Seed derivation and per-world anchor placement.
//!
//! Each noise field gets its own sub-seed derived from the world seed and a
//! fixed salt, so fields are decorrelated while staying fully determined by
//! the world seed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Salts for the independent noise fields.
pub mod salt {
    pub const CONTINENTAL: u64 = 1;
    pub const TEMPERATURE: u64 = 2;
    pub const MOISTURE: u64 = 3;
    pub const DESERT_MEDIUM: u64 = 4;
    pub const DESERT_SMALL: u64 = 5;
    pub const OCEAN_MEDIUM: u64 = 6;
    pub const DETAIL: u64 = 7;
    pub const DUNES: u64 = 8;
    pub const POOLS: u64 = 9;
    pub const CAVE_A: u64 = 10;
    pub const CAVE_B: u64 = 11;
    pub const TREE_CELLS: u64 = 12;
    pub const TREE_CLUSTERS: u64 = 13;
    pub const ANCHORS: u64 = 14;
}

/// Derive a sub-seed for one generation layer.
///
/// Uses SipHash (via std's `DefaultHasher`) to combine the world seed with
/// the salt into a well-distributed u64.
pub fn derive_seed(world_seed: u64, salt: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    world_seed.hash(&mut hasher);
    salt.hash(&mut hasher);
    hasher.finish()
}

/// Fixed per-world points that pull nearby climate toward a biome.
///
/// Every world gets at least one ocean basin and one desert, regardless of
/// what the noise fields would produce on their own.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldAnchors {
    /// Ocean basin centre `(x, z)` in blocks.
    pub ocean: (f64, f64),
    /// Desert centre `(x, z)` in blocks.
    pub desert: (f64, f64),
}

/// Placement attempts before falling back to opposite corners.
const ANCHOR_ATTEMPTS: u32 = 64;

impl WorldAnchors {
    /// Minimum anchor separation as a fraction of the larger world extent.
    pub const MIN_SEPARATION: f64 = 0.35;

    /// Places both anchors inside the central 70% of the world, at least
    /// `MIN_SEPARATION * max(width, depth)` apart.
    pub fn place(world_seed: u64, width: u32, depth: u32) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(world_seed, salt::ANCHORS));
        let (w, d) = (width as f64, depth as f64);
        let min_sep = Self::MIN_SEPARATION * w.max(d);

        let point = |rng: &mut ChaCha8Rng| {
            (
                rng.random_range(0.15..0.85) * w,
                rng.random_range(0.15..0.85) * d,
            )
        };

        for _ in 0..ANCHOR_ATTEMPTS {
            let ocean = point(&mut rng);
            let desert = point(&mut rng);
            if distance(ocean, desert) >= min_sep {
                return Self { ocean, desert };
            }
        }

        // Diagonal corners of the central region always satisfy the spacing.
        Self {
            ocean: (0.15 * w, 0.15 * d),
            desert: (0.85 * w, 0.85 * d),
        }
    }
}

pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
