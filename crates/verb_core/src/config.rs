//! Simulation configuration.
//!
//! Every struct deserializes from JSON with defaults filled in for missing
//! fields, so a config file only has to name what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use verb_math::Vec3;

use crate::{ACOUSTIC_IMPEDANCE, SPEED_OF_SOUND};

/// Errors raised while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Parameters shared by every simulation method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    pub source: Vec3,
    pub receiver: Vec3,
    /// Metres per second
    pub speed_of_sound: f32,
    /// Characteristic impedance of the medium
    pub acoustic_impedance: f32,
    /// Sample rate of flattened outputs, Hz
    pub output_sample_rate: f32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            source: Vec3::ZERO,
            receiver: Vec3::ZERO,
            speed_of_sound: SPEED_OF_SOUND,
            acoustic_impedance: ACOUSTIC_IMPEDANCE,
            output_sample_rate: 44100.0,
        }
    }
}

impl SimulationParameters {
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.source.is_finite() {
            return Err(invalid("source", "position must be finite"));
        }
        if !self.receiver.is_finite() {
            return Err(invalid("receiver", "position must be finite"));
        }
        if !(self.speed_of_sound > 0.0) {
            return Err(invalid("speed_of_sound", "must be positive"));
        }
        if !(self.acoustic_impedance > 0.0) {
            return Err(invalid("acoustic_impedance", "must be positive"));
        }
        if !(self.output_sample_rate > 0.0) {
            return Err(invalid("output_sample_rate", "must be positive"));
        }
        Ok(())
    }
}

/// Geometric (ray-based) method settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaytracerParameters {
    pub rays: usize,
    /// Maximum number of reflections per ray
    pub max_depth: usize,
    /// Radius of the spherical receiver used by the diffuse estimator, m
    pub receiver_radius: f32,
    /// Voxel grid has `2^voxel_depth` cells per axis
    pub voxel_depth: u32,
    pub seed: u64,
}

impl Default for RaytracerParameters {
    fn default() -> Self {
        Self {
            rays: 10_000,
            max_depth: 8,
            receiver_radius: 0.1,
            voxel_depth: 5,
            seed: 0,
        }
    }
}

impl RaytracerParameters {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.rays == 0 {
            return Err(invalid("rays", "at least one ray is required"));
        }
        if self.max_depth == 0 {
            return Err(invalid("max_depth", "at least one reflection is required"));
        }
        if !(self.receiver_radius > 0.0) {
            return Err(invalid("receiver_radius", "must be positive"));
        }
        if self.voxel_depth > 10 {
            return Err(invalid("voxel_depth", "must be at most 10"));
        }
        Ok(())
    }
}

/// Waveguide method settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveguideParameters {
    /// Highest frequency the mesh should resolve, Hz
    pub cutoff: f32,
    /// Fraction of the mesh's valid bandwidth that is trusted, 0-1
    pub usable_portion: f32,
}

impl Default for WaveguideParameters {
    fn default() -> Self {
        Self {
            cutoff: 500.0,
            usable_portion: 0.6,
        }
    }
}

impl WaveguideParameters {
    /// Mesh sampling rate needed for the configured cutoff.
    pub fn sampling_frequency(&self) -> f32 {
        compute_sampling_frequency(self.cutoff, self.usable_portion)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.cutoff > 0.0) {
            return Err(invalid("cutoff", "must be positive"));
        }
        if !(self.usable_portion > 0.0 && self.usable_portion <= 1.0) {
            return Err(invalid("usable_portion", "must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Highest trusted frequency of a mesh running at `sample_rate`.
///
/// The rectilinear mesh is only valid up to a quarter of its sampling rate.
pub fn compute_cutoff_frequency(sample_rate: f32, usable_portion: f32) -> f32 {
    sample_rate * 0.25 * usable_portion
}

/// Mesh sampling rate whose trusted band reaches `cutoff`.
pub fn compute_sampling_frequency(cutoff: f32, usable_portion: f32) -> f32 {
    cutoff / (0.25 * usable_portion)
}

/// Post-run adjustments applied to flattened output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Shift arrivals so the earliest one lands at time zero
    pub trim_predelay: bool,
    /// Drop the direct source-to-receiver arrival
    pub remove_direct: bool,
    pub volume_scale: f32,
    /// Scale the mixed output to a peak magnitude of one
    pub normalize: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            trim_predelay: false,
            remove_direct: false,
            volume_scale: 1.0,
            normalize: false,
        }
    }
}

/// Everything needed to set up a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub simulation: SimulationParameters,
    pub raytracer: RaytracerParameters,
    pub waveguide: WaveguideParameters,
    pub output: OutputOptions,
}

impl SimulationConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.simulation.validate()?;
        self.raytracer.validate()?;
        self.waveguide.validate()?;
        if !self.output.volume_scale.is_finite() {
            return Err(invalid("volume_scale", "must be finite"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.speed_of_sound, 340.0);
        assert_eq!(config.simulation.acoustic_impedance, 400.0);
        assert_eq!(config.raytracer.voxel_depth, 5);
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{
            "simulation": { "source": [1.0, 2.0, 1.0], "receiver": [2.0, 1.0, 5.0] },
            "raytracer": { "rays": 500, "max_depth": 4 }
        }"#;
        let config = SimulationConfig::from_json(json).unwrap();
        assert_eq!(config.simulation.source, Vec3::new(1.0, 2.0, 1.0));
        assert_eq!(config.raytracer.rays, 500);
        assert_eq!(config.raytracer.receiver_radius, 0.1);
        assert_eq!(config.waveguide, WaveguideParameters::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SimulationConfig::from_json(r#"{ "raytracer": { "rays": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "rays", .. }));

        let err = SimulationConfig::from_json(r#"{ "waveguide": { "usable_portion": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "usable_portion", .. }));

        let err = SimulationConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = SimulationConfig::default();
        config.output.trim_predelay = true;
        let json = config.to_json().unwrap();
        assert_eq!(SimulationConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_sampling_frequency_helpers() {
        let fs = compute_sampling_frequency(500.0, 0.5);
        assert_eq!(fs, 4000.0);
        assert_eq!(compute_cutoff_frequency(fs, 0.5), 500.0);

        let params = WaveguideParameters {
            cutoff: 1000.0,
            usable_portion: 0.5,
        };
        assert_eq!(params.sampling_frequency(), 8000.0);
    }
}
