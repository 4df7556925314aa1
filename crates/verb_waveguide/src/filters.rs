//! IIR boundary filters.
//!
//! Each surface gets one canonical filter built from three peaking biquads
//! that shape its per-band reflectance. The boundary update needs the
//! surface impedance rather than the reflectance, so the convolved
//! reflectance filter `R = b/a` is converted to `(a + b) / (a - b)`.

use std::f64::consts::{PI, SQRT_2};

use bytemuck::{Pod, Zeroable};
use verb_core::{Surface, BAND_CENTRES};

use crate::{WaveguideError, WaveguideResult};

pub const BIQUAD_ORDER: usize = 2;
pub const BIQUAD_SECTIONS: usize = 3;
pub const CANONICAL_ORDER: usize = BIQUAD_ORDER * BIQUAD_SECTIONS;

/// Quality factor of the shaping biquads (one octave).
const PEAK_Q: f64 = SQRT_2;

/// Pressure reflectance is kept strictly inside (0, 1).
const MIN_REFLECTANCE: f64 = 1e-4;
const MAX_REFLECTANCE: f64 = 1.0 - 1e-6;

/// Delay line of a canonical filter.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct FilterMemory {
    pub array: [f64; CANONICAL_ORDER],
}

/// Canonical-order IIR coefficients, normalized so that `a[0] == 1`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FilterCoefficients {
    pub b: [f64; CANONICAL_ORDER + 1],
    pub a: [f64; CANONICAL_ORDER + 1],
}

impl Default for FilterCoefficients {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

impl FilterCoefficients {
    /// Frequency-independent gain.
    pub fn constant(gain: f64) -> Self {
        let mut b = [0.0; CANONICAL_ORDER + 1];
        let mut a = [0.0; CANONICAL_ORDER + 1];
        b[0] = gain;
        a[0] = 1.0;
        Self { b, a }
    }

    pub fn is_valid(&self) -> bool {
        self.b.iter().chain(self.a.iter()).all(|c| c.is_finite())
            && self.a[0] != 0.0
            && self.b[0] != 0.0
    }

    /// Divide every coefficient by `a[0]`.
    pub fn normalized(&self) -> Self {
        let norm = self.a[0];
        Self {
            b: self.b.map(|c| c / norm),
            a: self.a.map(|c| c / norm),
        }
    }

    /// Impedance filter `(a + b) / (a - b)` for a reflectance filter `b / a`.
    pub fn to_impedance(&self) -> Self {
        let mut b = [0.0; CANONICAL_ORDER + 1];
        let mut a = [0.0; CANONICAL_ORDER + 1];
        for i in 0..=CANONICAL_ORDER {
            b[i] = self.a[i] + self.b[i];
            a[i] = self.a[i] - self.b[i];
        }
        Self { b, a }.normalized()
    }

    /// `a[0] / b[0]`, the instantaneous admittance seen by the boundary update.
    pub fn beta(&self) -> f64 {
        self.a[0] / self.b[0]
    }

    /// Magnitude response at `frequency`.
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (num_re, num_im) = evaluate(&self.b, w);
        let (den_re, den_im) = evaluate(&self.a, w);
        num_re.hypot(num_im) / den_re.hypot(den_im)
    }
}

/// `sum(c[k] * e^(-j k w))` as (re, im).
fn evaluate(coefficients: &[f64], w: f64) -> (f64, f64) {
    coefficients
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(re, im), (k, coefficient)| {
            let (sin, cos) = (k as f64 * w).sin_cos();
            (re + coefficient * cos, im - coefficient * sin)
        })
}

/// One second-order section, normalized so that `a[0] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; BIQUAD_ORDER + 1],
    pub a: [f64; BIQUAD_ORDER + 1],
}

impl Biquad {
    pub const IDENTITY: Biquad = Biquad {
        b: [1.0, 0.0, 0.0],
        a: [1.0, 0.0, 0.0],
    };

    /// RBJ peaking equalizer with `gain_db` at `centre` Hz.
    pub fn peak(centre: f64, gain_db: f64, q: f64, sample_rate: f64) -> Self {
        let amp = 10f64.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * centre / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha / amp;
        Self {
            b: [
                (1.0 + alpha * amp) / a0,
                -2.0 * cos / a0,
                (1.0 - alpha * amp) / a0,
            ],
            a: [1.0, -2.0 * cos / a0, (1.0 - alpha / amp) / a0],
        }
    }
}

fn multiply(lhs: &[f64], rhs: &[f64], out: &mut [f64]) {
    out.iter_mut().for_each(|o| *o = 0.0);
    for (i, l) in lhs.iter().enumerate() {
        for (j, r) in rhs.iter().enumerate() {
            out[i + j] += l * r;
        }
    }
}

/// Multiply three biquads into one canonical filter.
pub fn convolve(sections: &[Biquad; BIQUAD_SECTIONS]) -> FilterCoefficients {
    let mut b = vec![1.0];
    let mut a = vec![1.0];
    for section in sections {
        let mut next_b = vec![0.0; b.len() + BIQUAD_ORDER];
        let mut next_a = vec![0.0; a.len() + BIQUAD_ORDER];
        multiply(&b, &section.b, &mut next_b);
        multiply(&a, &section.a, &mut next_a);
        b = next_b;
        a = next_a;
    }

    let mut out = FilterCoefficients::constant(1.0);
    out.b.copy_from_slice(&b);
    out.a.copy_from_slice(&a);
    out
}

/// Advance a transposed direct-form II filter by one sample.
pub fn filter_step(input: f64, memory: &mut FilterMemory, c: &FilterCoefficients) -> f64 {
    let m = &mut memory.array;
    let output = input * c.b[0] + m[0];
    for i in 0..CANONICAL_ORDER - 1 {
        m[i] = input * c.b[i + 1] - c.a[i + 1] * output + m[i + 1];
    }
    m[CANONICAL_ORDER - 1] = input * c.b[CANONICAL_ORDER] - c.a[CANONICAL_ORDER] * output;
    output
}

/// Per-band pressure reflectance `sqrt(1 - absorption)`, kept inside (0, 1).
pub fn pressure_reflectance(surface: &Surface) -> [f64; verb_core::BANDS] {
    surface
        .absorption
        .0
        .map(|a| (1.0 - a as f64).max(0.0).sqrt().clamp(MIN_REFLECTANCE, MAX_REFLECTANCE))
}

/// Reflectance filter for `surface` on a mesh running at `sample_rate`.
///
/// Bands centred below `cutoff` (up to three) shape the response around
/// their mean reflectance. Bands the mesh can't resolve are ignored.
pub fn reflectance_filter(
    surface: &Surface,
    sample_rate: f64,
    cutoff: f64,
) -> WaveguideResult<FilterCoefficients> {
    if !(sample_rate > 0.0 && sample_rate.is_finite()) {
        return Err(WaveguideError::InvalidFilter(format!(
            "sample rate {sample_rate} must be positive"
        )));
    }
    if !(cutoff > 0.0 && cutoff <= sample_rate * 0.5) {
        return Err(WaveguideError::InvalidFilter(format!(
            "cutoff {cutoff} must lie in (0, {}]",
            sample_rate * 0.5
        )));
    }
    if surface
        .absorption
        .iter()
        .any(|a| !a.is_finite() || !(0.0..=1.0).contains(a))
    {
        return Err(WaveguideError::InvalidFilter(format!(
            "absorption {:?} must be finite and in [0, 1]",
            surface.absorption.0
        )));
    }

    let reflectance = pressure_reflectance(surface);
    let mut usable: Vec<usize> = (0..BAND_CENTRES.len())
        .filter(|&i| (BAND_CENTRES[i] as f64) < cutoff)
        .take(BIQUAD_SECTIONS)
        .collect();
    if usable.is_empty() {
        usable.push(0);
    }
    let mean = usable.iter().map(|&i| reflectance[i]).sum::<f64>() / usable.len() as f64;

    let mut sections = [Biquad::IDENTITY; BIQUAD_SECTIONS];
    for (section, &band) in sections.iter_mut().zip(&usable) {
        let gain_db = 20.0 * (reflectance[band] / mean).log10();
        if gain_db.abs() > 1e-9 {
            *section = Biquad::peak(BAND_CENTRES[band] as f64, gain_db, PEAK_Q, sample_rate);
        }
    }

    let mut filter = convolve(&sections);
    filter.b.iter_mut().for_each(|c| *c *= mean);
    Ok(filter)
}

/// Impedance filter for one surface, ready for the boundary update.
pub fn boundary_coefficients(
    surface: &Surface,
    sample_rate: f64,
    cutoff: f64,
) -> WaveguideResult<FilterCoefficients> {
    let impedance = reflectance_filter(surface, sample_rate, cutoff)?.to_impedance();
    if !impedance.is_valid() {
        return Err(WaveguideError::InvalidFilter(format!(
            "impedance filter is degenerate: {impedance:?}"
        )));
    }
    Ok(impedance)
}

/// Impedance filters for a whole surface table, indexed like the table.
pub fn surface_coefficients(
    surfaces: &[Surface],
    sample_rate: f64,
    cutoff: f64,
) -> WaveguideResult<Vec<FilterCoefficients>> {
    surfaces
        .iter()
        .map(|s| boundary_coefficients(s, sample_rate, cutoff))
        .collect()
}
