//! verb waveguide - rectilinear digital waveguide mesh (FDTD).
//!
//! This crate provides:
//!
//! - **Mesh**: lattice construction over a voxelised scene with per-node
//!   boundary classification
//! - **Filters**: multiband IIR boundary filters designed from surface
//!   absorption
//! - **Solver**: parallel pressure stepping with frequency-dependent
//!   boundaries and receiver velocity
//! - **Microphone**: first-order polar patterns applied to the output
//!
//! # Example
//!
//! ```ignore
//! use verb_waveguide::{run, Excitation, Mesh};
//!
//! let mesh = Mesh::for_scene(&voxels, &simulation, &params)?;
//! let outcome = run(&ctx, &mesh, source, receiver, Excitation::impulse(), 4000, &flag, |_| {
//!     ControlFlow::Continue(())
//! })?;
//! ```

pub mod filters;
pub mod mesh;
pub mod microphone;
pub mod waveguide;

use thiserror::Error;
use verb_core::{ComputeError, ConfigError};
use verb_math::{UVec3, Vec3};

pub use filters::{FilterCoefficients, FilterMemory};
pub use mesh::{BoundaryData, Mesh, MeshDescriptor, Node};
pub use microphone::Microphone;
pub use waveguide::{run, simulate, Excitation, StepResult, Waveguide};

/// Errors raised while setting up or running the waveguide.
#[derive(Error, Debug)]
pub enum WaveguideError {
    #[error("scene has no triangles")]
    EmptyScene,

    #[error("scene bounds are degenerate or not finite")]
    DegenerateBounds,

    #[error("invalid sampling parameters: {0}")]
    InvalidSampling(String),

    #[error("mesh of {dimensions} nodes exceeds the limit of {limit}")]
    MeshTooLarge { dimensions: UVec3, limit: u64 },

    #[error("invalid boundary filter: {0}")]
    InvalidFilter(String),

    #[error("{what} at {position} is not inside the mesh")]
    NotInside { what: &'static str, position: Vec3 },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("compute error: {0}")]
    Compute(#[from] ComputeError),
}

/// Result type for waveguide operations.
pub type WaveguideResult<T> = Result<T, WaveguideError>;
