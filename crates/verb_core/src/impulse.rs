use serde::{Deserialize, Serialize};
use verb_math::Vec3;

use crate::bands::Bands;

/// One arrival at the receiver: a time and a per-band volume.
///
/// `position` is where the contribution comes from (the image source for
/// specular arrivals, the last hit point for diffuse ones).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Impulse {
    pub volume: Bands,
    pub position: Vec3,
    pub time: f32,
}

impl Impulse {
    pub fn new(volume: Bands, position: Vec3, time: f32) -> Self {
        Self {
            volume,
            position,
            time,
        }
    }

    /// Finite, non-negative time and volume.
    pub fn is_valid(&self) -> bool {
        self.time.is_finite()
            && self.time >= 0.0
            && self.volume.is_finite()
            && self.volume.iter().all(|v| *v >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_validity() {
        assert!(Impulse::new(Bands::splat(0.5), Vec3::ZERO, 0.01).is_valid());
        assert!(!Impulse::new(Bands::splat(0.5), Vec3::ZERO, -0.01).is_valid());
        assert!(!Impulse::new(Bands::splat(-0.5), Vec3::ZERO, 0.01).is_valid());
        assert!(!Impulse::new(Bands::splat(f32::NAN), Vec3::ZERO, 0.01).is_valid());
    }
}
