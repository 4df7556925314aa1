//! Random direction sampling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use verb_math::Vec3;

/// Uniformly distributed unit vector.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let z: f32 = rng.gen_range(-1.0..=1.0);
    let theta: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * theta.cos(), r * theta.sin(), z)
}

/// `count` uniform directions from a seeded generator.
pub fn random_directions(count: usize, seed: u64) -> Vec<Vec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| random_unit_vector(&mut rng)).collect()
}

/// Cosine-weighted direction in the hemisphere around `normal`.
pub fn lambert_direction<R: Rng + ?Sized>(normal: Vec3, rng: &mut R) -> Vec3 {
    let d = normal + random_unit_vector(rng);
    if d.length_squared() < 1e-8 {
        normal
    } else {
        d.normalize()
    }
}

/// Independent generator for one ray at one bounce.
///
/// Results don't depend on how rays are split between worker threads.
pub fn lane_rng(seed: u64, ray: usize, depth: usize) -> StdRng {
    let lane = (ray as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((depth as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F));
    StdRng::seed_from_u64(seed ^ lane)
}
