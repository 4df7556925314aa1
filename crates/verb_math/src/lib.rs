// Re-export glam for convenience
pub use glam::*;

// Geometry primitives shared by the ray tracer and the waveguide
mod aabb;
mod range;
mod ray;
mod triangle;

pub use aabb::{Aabb, Axis};
pub use range::{min_max, Range, RangeValue};
pub use ray::Ray;
pub use triangle::TriangleVerts;
