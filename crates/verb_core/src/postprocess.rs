//! Turning impulse lists into sampled multi-band signals.
//!
//! Contributions are always summed as intensities and converted to
//! pressure once per bin. Pressures of incoherent arrivals do not add.

use crate::bands::BANDS;
use crate::config::OutputOptions;
use crate::impulse::Impulse;

/// Longest impulse response that will be allocated, seconds.
pub const MAX_TIME: f32 = 20.0;

/// Sign-preserving conversion from intensity to pressure.
pub fn intensity_to_pressure(intensity: f32, acoustic_impedance: f32) -> f32 {
    (intensity.abs() * acoustic_impedance).sqrt().copysign(intensity)
}

/// Inverse of [`intensity_to_pressure`].
pub fn pressure_to_intensity(pressure: f32, acoustic_impedance: f32) -> f32 {
    pressure * pressure.abs() / acoustic_impedance
}

/// Latest impulse time, capped at [`MAX_TIME`].
pub fn max_time(impulses: &[Impulse]) -> f32 {
    impulses
        .iter()
        .map(|i| i.time)
        .filter(|t| t.is_finite())
        .fold(0.0, f32::max)
        .min(MAX_TIME)
}

/// Bin impulses into one intensity signal per band.
///
/// Each impulse lands in sample `round(time * sample_rate)`. Impulses past
/// [`MAX_TIME`] or with non-finite values are dropped.
pub fn bin_intensities(impulses: &[Impulse], sample_rate: f32) -> Vec<Vec<f32>> {
    if impulses.is_empty() {
        return vec![Vec::new(); BANDS];
    }

    let len = (max_time(impulses) * sample_rate).round() as usize + 1;
    let mut bins = vec![vec![0.0f32; len]; BANDS];

    for impulse in impulses {
        if !impulse.time.is_finite() || impulse.time > MAX_TIME || impulse.time < 0.0 {
            continue;
        }
        if !impulse.volume.is_finite() {
            continue;
        }
        let index = (impulse.time * sample_rate).round() as usize;
        if index >= len {
            continue;
        }
        for (band, signal) in bins.iter_mut().enumerate() {
            signal[index] += impulse.volume[band];
        }
    }

    bins
}

/// Bin impulses by arrival time and convert every bin to pressure.
///
/// Returns `BANDS` signals of equal length (all empty for no input).
pub fn flatten_impulses(
    impulses: &[Impulse],
    sample_rate: f32,
    acoustic_impedance: f32,
) -> Vec<Vec<f32>> {
    let mut bins = bin_intensities(impulses, sample_rate);
    for signal in &mut bins {
        for sample in signal.iter_mut() {
            *sample = intensity_to_pressure(*sample, acoustic_impedance);
        }
    }
    bins
}

/// Sum per-band signals into a single signal.
pub fn mixdown(bands: &[Vec<f32>]) -> Vec<f32> {
    let len = bands.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = vec![0.0; len];
    for signal in bands {
        for (o, s) in out.iter_mut().zip(signal) {
            *o += s;
        }
    }
    out
}

/// Largest absolute sample value.
pub fn max_magnitude(signal: &[f32]) -> f32 {
    signal.iter().fold(0.0, |m, s| m.max(s.abs()))
}

/// Scale `signal` so its peak magnitude is one. Silent signals are left alone.
///
/// Returns the factor applied.
pub fn normalize(signal: &mut [f32]) -> f32 {
    let peak = max_magnitude(signal);
    if peak == 0.0 || !peak.is_finite() {
        return 1.0;
    }
    let factor = 1.0 / peak;
    for s in signal.iter_mut() {
        *s *= factor;
    }
    factor
}

/// Earliest non-zero arrival time over several impulse lists, zero if none.
pub fn find_predelay(lists: &[&[Impulse]]) -> f32 {
    let min = lists
        .iter()
        .flat_map(|l| l.iter())
        .map(|i| i.time)
        .filter(|t| t.is_finite() && *t > 0.0)
        .fold(f32::INFINITY, f32::min);
    if min.is_finite() {
        min
    } else {
        0.0
    }
}

/// Subtract `predelay` from every impulse time, clamping at zero.
pub fn fix_predelay(impulses: &mut [Impulse], predelay: f32) {
    for impulse in impulses {
        impulse.time = (impulse.time - predelay).max(0.0);
    }
}

impl OutputOptions {
    /// Produce the final mono signal from an impulse list.
    ///
    /// Direct-sound removal happens when the impulses are selected, before
    /// they reach this point.
    pub fn apply(
        &self,
        impulses: &[Impulse],
        sample_rate: f32,
        acoustic_impedance: f32,
    ) -> Vec<f32> {
        let mut impulses = impulses.to_vec();
        if self.trim_predelay {
            let predelay = find_predelay(&[impulses.as_slice()]);
            log::debug!("Trimming {predelay:.4}s predelay");
            fix_predelay(&mut impulses, predelay);
        }

        let mut signal = mixdown(&flatten_impulses(&impulses, sample_rate, acoustic_impedance));
        for s in signal.iter_mut() {
            *s *= self.volume_scale;
        }
        if self.normalize {
            normalize(&mut signal);
        }
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::Bands;
    use verb_math::Vec3;

    const Z: f32 = 400.0;

    fn impulse(volume: f32, time: f32) -> Impulse {
        Impulse::new(Bands::splat(volume), Vec3::ZERO, time)
    }

    #[test]
    fn test_pressure_intensity_conversion() {
        for i in [0.0, 0.25, 1.0, -0.5, 3.0] {
            let p = intensity_to_pressure(i, Z);
            assert_eq!(p.signum(), if i < 0.0 { -1.0 } else { 1.0 });
            assert!((pressure_to_intensity(p, Z) - i).abs() < 1e-5);
        }
        assert_eq!(intensity_to_pressure(1.0, Z), 20.0);
    }

    #[test]
    fn test_flatten_empty() {
        let out = flatten_impulses(&[], 44100.0, Z);
        assert_eq!(out.len(), BANDS);
        assert!(out.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_flatten_sums_intensity_before_conversion() {
        let sr = 1000.0;
        let (e1, e2) = (0.01, 0.04);
        let merged = flatten_impulses(&[impulse(e1, 0.5), impulse(e2, 0.5004)], sr, Z);
        let single = flatten_impulses(&[impulse(e1 + e2, 0.5)], sr, Z);

        assert_eq!(merged[0].len(), 501);
        assert!((merged[3][500] - single[3][500]).abs() < 1e-5);

        let pressure_sum = intensity_to_pressure(e1, Z) + intensity_to_pressure(e2, Z);
        assert!((merged[3][500] - pressure_sum).abs() > 0.1);
    }

    #[test]
    fn test_flatten_caps_at_max_time() {
        let early = impulse(1.0, 0.01);
        assert_eq!(max_time(&[early, impulse(1.0, 0.5)]), 0.5);
        assert_eq!(max_time(&[early, impulse(1.0, 30.0)]), MAX_TIME);

        // A late arrival stretches the output to the cap but isn't binned
        let out = flatten_impulses(&[early, impulse(1.0, 30.0)], 100.0, Z);
        assert_eq!(out[0].len(), 2001);
        assert!(out[0][1] > 0.0);
        assert!(out[0][2..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_predelay() {
        let a = vec![impulse(1.0, 0.0), impulse(1.0, 0.3)];
        let b = vec![impulse(1.0, 0.2), impulse(1.0, 0.5)];
        let predelay = find_predelay(&[&a[..], &b[..]]);
        assert_eq!(predelay, 0.2);

        let mut b = b;
        fix_predelay(&mut b, predelay);
        assert_eq!(b[0].time, 0.0);
        assert!((b[1].time - 0.3).abs() < 1e-6);

        let mut a = a;
        fix_predelay(&mut a, predelay);
        assert_eq!(a[0].time, 0.0);
        assert_eq!(find_predelay(&[]), 0.0);
    }

    #[test]
    fn test_mixdown_and_normalize() {
        let mut mixed = mixdown(&[vec![1.0, 2.0], vec![0.5, -6.0, 1.0]]);
        assert_eq!(mixed, vec![1.5, -4.0, 1.0]);

        let factor = normalize(&mut mixed);
        assert_eq!(factor, 0.25);
        assert_eq!(max_magnitude(&mixed), 1.0);

        let mut silent = vec![0.0; 4];
        assert_eq!(normalize(&mut silent), 1.0);
    }

    #[test]
    fn test_output_options_apply() {
        let impulses = [impulse(0.01, 0.1), impulse(0.01, 0.2)];
        let options = OutputOptions {
            trim_predelay: true,
            normalize: true,
            ..Default::default()
        };
        let signal = options.apply(&impulses, 100.0, Z);
        assert_eq!(signal.len(), 11);
        assert!((signal[0] - 1.0).abs() < 1e-6);
        assert!((signal[10] - 1.0).abs() < 1e-6);
    }
}
