//! verb core - shared data model for the acoustics engines.
//!
//! This crate provides:
//!
//! - **Scene data**: `SceneData`, `Triangle`, `Surface` and per-band `Bands`
//! - **Compute context**: the thread-pool "device" and its tagged buffers
//! - **Impulses and postprocessing**: flattening, predelay, unit conversion
//! - **Configuration**: serde-backed simulation parameters
//! - **Progress**: cancellation flag, step callbacks and run outcomes
//!
//! # Example
//!
//! ```ignore
//! use verb_core::{Bands, SceneData, Surface};
//! use verb_math::{Aabb, Vec3};
//!
//! let room = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 3.0, 6.0));
//! let surface = Surface::uniform(0.1, 0.05);
//! let scene = SceneData::from_box(&room, surface);
//! println!("{} triangles", scene.triangles().len());
//! ```

pub mod bands;
pub mod compute;
pub mod config;
pub mod impulse;
pub mod postprocess;
pub mod power_function;
pub mod progress;
pub mod scene;

// Re-export commonly used types
pub use bands::{Bands, BANDS, BAND_CENTRES};
pub use compute::{ComputeContext, ComputeError, DeviceBuffer};
pub use config::{
    ConfigError, OutputOptions, RaytracerParameters, SimulationConfig, SimulationParameters,
    WaveguideParameters,
};
pub use impulse::Impulse;
pub use power_function::PowerFunction;
pub use progress::{Completion, Outcome, Progress};
pub use scene::{Intersection, SceneData, SceneError, SceneResult, Surface, Triangle};

/// Speed of sound in air at room temperature, m/s.
pub const SPEED_OF_SOUND: f32 = 340.0;

/// Characteristic acoustic impedance of air, kg/(m^2 s).
pub const ACOUSTIC_IMPEDANCE: f32 = 400.0;

/// Ambient air density, kg/m^3.
pub const AMBIENT_DENSITY: f32 = 1.225;
