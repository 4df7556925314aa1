//! Directional receivers for waveguide output.

use verb_math::Vec3;

use crate::waveguide::StepResult;

/// First-order polar pattern.
///
/// `shape` blends between omnidirectional (0), cardioid (0.5) and
/// figure-of-eight (1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Microphone {
    pub pointing: Vec3,
    pub shape: f32,
}

impl Default for Microphone {
    fn default() -> Self {
        Self::omnidirectional()
    }
}

impl Microphone {
    pub fn new(pointing: Vec3, shape: f32) -> Self {
        Self {
            pointing: pointing.normalize_or_zero(),
            shape: shape.clamp(0.0, 1.0),
        }
    }

    pub fn omnidirectional() -> Self {
        Self::new(Vec3::Z, 0.0)
    }

    pub fn cardioid(pointing: Vec3) -> Self {
        Self::new(pointing, 0.5)
    }

    pub fn bidirectional(pointing: Vec3) -> Self {
        Self::new(pointing, 1.0)
    }

    /// Gain for sound arriving from `direction` (pointing from the
    /// microphone toward where the sound came from).
    pub fn attenuation(&self, direction: Vec3) -> f32 {
        let cos = match direction.try_normalize() {
            Some(d) => d.dot(self.pointing),
            None => 0.0,
        };
        (1.0 - self.shape) + self.shape * cos
    }

    /// Pressure of one step weighted by the direction its energy came from.
    ///
    /// Intensity points along the energy flow, away from the source, so
    /// the arrival direction is its negation.
    pub fn process_step(&self, step: &StepResult) -> f32 {
        step.pressure * self.attenuation(-step.intensity)
    }

    pub fn process(&self, steps: &[StepResult]) -> Vec<f32> {
        steps.iter().map(|s| self.process_step(s)).collect()
    }
}
