//! Seed-locked lattice noise.
//!
//! Every function here is pure: integer mixing for the lattice hash, `f64`
//! interpolation on top. Identical inputs give bit-identical outputs on every
//! platform, and there is no hidden state, so callers may sample from any
//! number of threads.

pub const DEFAULT_OCTAVES: u32 = 4;

/// Odd seed stride between fbm octaves.
const OCTAVE_SEED_STRIDE: u32 = 0x9E37_79B9;

const HASH_X_PRIME: u32 = 0x27D4_EB2D;
const HASH_Y_PRIME: u32 = 0x1656_67B1;
const HASH_SEED_PRIME: u32 = 0x85EB_CA77;

/// Deterministic lattice hash in `[0, 1)`.
#[inline]
pub fn hash(x: i32, y: i32, seed: u32) -> f64 {
    let mut h = (x as u32).wrapping_mul(HASH_X_PRIME)
        ^ (y as u32).wrapping_mul(HASH_Y_PRIME).rotate_left(13)
        ^ seed.wrapping_mul(HASH_SEED_PRIME).rotate_left(7);
    // murmur3 finalizer
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 16;

    // Top 24 bits keep the result strictly below 1.0.
    f64::from(h >> 8) / f64::from(1_u32 << 24)
}

#[inline]
fn smoothstep_unit(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn lattice_index(coord: f64) -> (i32, f64) {
    let floor = coord.floor();
    // Wrap far-away lattice cells into i32 instead of saturating.
    let index = (floor as i64) as i32;
    (index, coord - floor)
}

/// Smoothly interpolated lattice noise in `[0, 1]`.
pub fn value_noise(x: f64, y: f64, seed: u32) -> f64 {
    if !x.is_finite() || !y.is_finite() {
        return 0.0;
    }

    let (ix, fx) = lattice_index(x);
    let (iy, fy) = lattice_index(y);
    let sx = smoothstep_unit(fx);
    let sy = smoothstep_unit(fy);

    let ix1 = ix.wrapping_add(1);
    let iy1 = iy.wrapping_add(1);
    let v00 = hash(ix, iy, seed);
    let v10 = hash(ix1, iy, seed);
    let v01 = hash(ix, iy1, seed);
    let v11 = hash(ix1, iy1, seed);

    let top = v00 + (v10 - v00) * sx;
    let bottom = v01 + (v11 - v01) * sx;
    top + (bottom - top) * sy
}

/// Fractal sum of [`value_noise`], normalized back to `[0, 1]`.
///
/// Each octave doubles frequency, halves amplitude and uses its own derived
/// seed so octaves do not line up. `octaves == 0` behaves like one octave.
pub fn fbm(x: f64, y: f64, octaves: u32, seed: u32) -> f64 {
    let octaves = octaves.max(1);
    let mut sum = 0.0;
    let mut total_amplitude = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;

    for octave in 0..octaves {
        let octave_seed = seed.wrapping_add(octave.wrapping_mul(OCTAVE_SEED_STRIDE));
        sum += amplitude * value_noise(x * frequency, y * frequency, octave_seed);
        total_amplitude += amplitude;
        amplitude *= 0.5;
        frequency *= 2.0;
    }

    (sum / total_amplitude).clamp(0.0, 1.0)
}
