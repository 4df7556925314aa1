//! Spatial excitation shapes for the waveguide initial pressure field.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};
use verb_math::Vec3;

/// Pressure falloff around an excitation centre.
///
/// Distances are measured in lattice spacings, so the same function
/// describes the same shape at any mesh resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PowerFunction {
    /// Unit value at the centre node only.
    Basic,
    /// `power / d`, with the centre set to `power`.
    Inverse { power: f32 },
    /// `power / d^2`, with the centre set to `power`.
    InverseSquare { power: f32 },
    /// Normalized 3D gaussian.
    Gaussian { standard_deviation: f32 },
}

impl Default for PowerFunction {
    fn default() -> Self {
        PowerFunction::Basic
    }
}

impl PowerFunction {
    /// Gaussian blob with the conventional width of two lattice spacings.
    pub fn gaussian() -> Self {
        PowerFunction::Gaussian {
            standard_deviation: 2.0,
        }
    }

    /// Value at distance `d` (lattice spacings) from the centre.
    pub fn at_distance(&self, d: f32) -> f32 {
        let d = d.abs();
        match *self {
            PowerFunction::Basic => {
                if d < 1e-3 {
                    1.0
                } else {
                    0.0
                }
            }
            PowerFunction::Inverse { power } => {
                if d < 1.0 {
                    power
                } else {
                    power / d
                }
            }
            PowerFunction::InverseSquare { power } => {
                if d < 1.0 {
                    power
                } else {
                    power / (d * d)
                }
            }
            PowerFunction::Gaussian { standard_deviation } => {
                gaussian(d, standard_deviation)
            }
        }
    }

    /// Value at `position` for an excitation centred on `centre`, on a
    /// lattice with the given `spacing`.
    pub fn evaluate(&self, position: Vec3, centre: Vec3, spacing: f32) -> f32 {
        self.at_distance(position.distance(centre) / spacing)
    }

    /// True when the function only touches the centre node.
    pub fn is_point(&self) -> bool {
        matches!(self, PowerFunction::Basic)
    }
}

fn gaussian(d: f32, sdev: f32) -> f32 {
    (-(d * d) / (2.0 * sdev * sdev)).exp() / (sdev.powi(3) * (2.0 * PI).powf(1.5))
}
