//! Fixed-size per-frequency-band values.

use std::ops::{Add, AddAssign, Index, IndexMut, Mul, MulAssign, Sub};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Number of frequency bands simulated by the geometric engines.
pub const BANDS: usize = 8;

/// Octave band centre frequencies in Hz.
pub const BAND_CENTRES: [f32; BANDS] = [62.5, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];

/// One value per frequency band (absorption, scattering, energy...).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Bands(pub [f32; BANDS]);

impl Bands {
    pub const ZERO: Bands = Bands([0.0; BANDS]);
    pub const ONE: Bands = Bands([1.0; BANDS]);

    /// Same value in every band.
    pub const fn splat(v: f32) -> Self {
        Bands([v; BANDS])
    }

    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Bands(self.0.map(f))
    }

    pub fn zip_map(self, other: Bands, f: impl Fn(f32, f32) -> f32) -> Self {
        let mut out = [0.0; BANDS];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(other.0.iter())) {
            *o = f(*a, *b);
        }
        Bands(out)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f32> {
        self.0.iter()
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }

    pub fn mean(&self) -> f32 {
        self.sum() / BANDS as f32
    }

    pub fn max_element(&self) -> f32 {
        self.0.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// True when every band is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Per-band energy reflection coefficient `1 - absorption`.
    pub fn reflectance_from_absorption(absorption: Bands) -> Bands {
        absorption.map(|a| 1.0 - a)
    }
}

impl Index<usize> for Bands {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        &self.0[i]
    }
}

impl IndexMut<usize> for Bands {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.0[i]
    }
}

impl Add for Bands {
    type Output = Bands;

    fn add(self, rhs: Bands) -> Bands {
        self.zip_map(rhs, |a, b| a + b)
    }
}

impl AddAssign for Bands {
    fn add_assign(&mut self, rhs: Bands) {
        *self = *self + rhs;
    }
}

impl Sub for Bands {
    type Output = Bands;

    fn sub(self, rhs: Bands) -> Bands {
        self.zip_map(rhs, |a, b| a - b)
    }
}

impl Mul for Bands {
    type Output = Bands;

    fn mul(self, rhs: Bands) -> Bands {
        self.zip_map(rhs, |a, b| a * b)
    }
}

impl Mul<f32> for Bands {
    type Output = Bands;

    fn mul(self, rhs: f32) -> Bands {
        self.map(|a| a * rhs)
    }
}

impl MulAssign for Bands {
    fn mul_assign(&mut self, rhs: Bands) {
        *self = *self * rhs;
    }
}

impl MulAssign<f32> for Bands {
    fn mul_assign(&mut self, rhs: f32) {
        *self = *self * rhs;
    }
}
