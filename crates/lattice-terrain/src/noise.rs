//! Hash-based value noise.
//!
//! Every lattice point gets a pseudo-random value from an integer hash of its
//! coordinates and a seed; samples between lattice points are interpolated
//! with the `3t² - 2t³` smoothstep. There is no RNG state, so any sample can
//! be computed independently on any thread.

/// Deterministic 64-bit hash of a lattice point.
#[inline]
pub fn hash3(x: i32, y: i32, z: i32, seed: u64) -> u64 {
    let mut h = seed
        ^ (x as i64 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (y as i64 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ (z as i64 as u64).wrapping_mul(0x1656_67B1_9E37_79F9);
    h = (h ^ (h >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h = (h ^ (h >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^ (h >> 31)
}

/// [`hash3`] mapped to `[0, 1)`.
#[inline]
pub fn hash_unit(x: i32, y: i32, z: i32, seed: u64) -> f64 {
    (hash3(x, y, z, seed) >> 11) as f64 / (1u64 << 53) as f64
}

/// Smoothstep easing `3t² - 2t³` for `t` in `[0, 1]`.
#[inline]
pub fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

/// Smoothstep of `v` remapped from `[edge0, edge1]`, clamped to `[0, 1]`.
///
/// `edge0 > edge1` gives a falling ramp.
#[inline]
pub fn smooth_range(edge0: f64, edge1: f64, v: f64) -> f64 {
    smoothstep(((v - edge0) / (edge1 - edge0)).clamp(0.0, 1.0))
}

#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Configuration for multi-octave fractal value noise.
#[derive(Clone, Copy, Debug)]
pub struct FbmParams {
    /// Number of octaves to composite.
    pub octaves: u32,
    /// Frequency of the first octave, in cycles per block.
    pub frequency: f64,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
}

impl Default for FbmParams {
    fn default() -> Self {
        Self {
            octaves: 4,
            frequency: 1.0 / 128.0,
            lacunarity: 2.0,
            persistence: 0.5,
        }
    }
}

/// A seeded value-noise field with outputs in `[0, 1]`.
#[derive(Clone, Copy, Debug)]
pub struct ValueNoise {
    seed: u64,
}

impl ValueNoise {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Bilinear value noise at `(x, z)` in lattice units.
    pub fn sample_2d(&self, x: f64, z: f64) -> f64 {
        let (x0, z0) = (x.floor(), z.floor());
        let (ix, iz) = (x0 as i32, z0 as i32);
        let tx = smoothstep(x - x0);
        let tz = smoothstep(z - z0);

        let v00 = hash_unit(ix, 0, iz, self.seed);
        let v10 = hash_unit(ix + 1, 0, iz, self.seed);
        let v01 = hash_unit(ix, 0, iz + 1, self.seed);
        let v11 = hash_unit(ix + 1, 0, iz + 1, self.seed);

        lerp(lerp(v00, v10, tx), lerp(v01, v11, tx), tz)
    }

    /// Trilinear value noise at `(x, y, z)` in lattice units.
    pub fn sample_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        let (x0, y0, z0) = (x.floor(), y.floor(), z.floor());
        let (ix, iy, iz) = (x0 as i32, y0 as i32, z0 as i32);
        let tx = smoothstep(x - x0);
        let ty = smoothstep(y - y0);
        let tz = smoothstep(z - z0);

        let corner = |dx: i32, dy: i32, dz: i32| hash_unit(ix + dx, iy + dy, iz + dz, self.seed);
        let x00 = lerp(corner(0, 0, 0), corner(1, 0, 0), tx);
        let x10 = lerp(corner(0, 1, 0), corner(1, 1, 0), tx);
        let x01 = lerp(corner(0, 0, 1), corner(1, 0, 1), tx);
        let x11 = lerp(corner(0, 1, 1), corner(1, 1, 1), tx);

        lerp(lerp(x00, x10, ty), lerp(x01, x11, ty), tz)
    }

    /// Octave noise for octave `i`, decorrelated from the others.
    fn octave(&self, i: u32) -> ValueNoise {
        ValueNoise::new(self.seed.wrapping_add((i as u64).wrapping_mul(0x632B_E59B_D9B4_E019)))
    }

    /// Fractal noise over world block coordinates, normalized to `[0, 1]`.
    pub fn fbm_2d(&self, x: f64, z: f64, params: &FbmParams) -> f64 {
        let mut total = 0.0;
        let mut frequency = params.frequency;
        let mut amplitude = 1.0;
        let mut max_amplitude = 0.0;

        for i in 0..params.octaves {
            total += self.octave(i).sample_2d(x * frequency, z * frequency) * amplitude;
            max_amplitude += amplitude;
            frequency *= params.lacunarity;
            amplitude *= params.persistence;
        }

        if max_amplitude == 0.0 {
            return 0.5;
        }
        total / max_amplitude
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
