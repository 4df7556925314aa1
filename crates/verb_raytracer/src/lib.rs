//! verb raytracer - geometric acoustics over a voxelised scene.
//!
//! This crate provides:
//!
//! - **Voxel index**: uniform-grid acceleration for ray queries, inside tests
//!   and closest-triangle lookups
//! - **Tracer**: batched, depth-major stochastic ray tracing
//! - **Image source**: exact specular paths reconstructed from traced rays
//! - **Stochastic finder**: diffuse-rain energy estimation
//!
//! # Example
//!
//! ```ignore
//! use verb_core::{ComputeContext, SceneData, SimulationParameters, Surface};
//! use verb_raytracer::{run_to_completion, VoxelisedScene};
//!
//! let voxels = VoxelisedScene::from_scene(scene, 5);
//! let results = run_to_completion(&ctx, &voxels, &simulation, &params)?;
//! ```

pub mod image_source;
pub mod random;
pub mod raytracer;
pub mod reflection;
pub mod scene_buffers;
pub mod stochastic;
pub mod tracer;
pub mod voxel;

use thiserror::Error;
use verb_core::{ComputeError, ConfigError};

pub use raytracer::{run, run_to_completion, Results, Selection};
pub use reflection::Reflection;
pub use scene_buffers::SceneBuffers;
pub use stochastic::StochasticFinder;
pub use tracer::{trace, Tracer};
pub use voxel::VoxelisedScene;

/// Errors that stop a ray-tracing run before it starts or while dispatching.
#[derive(Error, Debug)]
pub enum RaytracerError {
    #[error("scene has no triangles")]
    EmptyScene,

    #[error("scene bounds are degenerate or not finite")]
    DegenerateBounds,

    #[error("at least one ray is required")]
    NoRays,

    #[error("max depth must be at least 1")]
    ZeroDepth,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("compute error: {0}")]
    Compute(#[from] ComputeError),
}

/// Result type for ray-tracing runs.
pub type RaytracerResult<T> = Result<T, RaytracerError>;
