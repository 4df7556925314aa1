//! Specular arrivals from traced paths.
//!
//! Traced rays are reduced to triangle-id sequences, deduplicated in a
//! [`PathTree`], and each visible sequence is checked exactly by mirroring
//! the source across the triangles and unfolding the path from the
//! receiver.

pub mod finder;
pub mod tree;

pub use finder::{direct_impulse, find, find_reflected, validate_path, ImagePath};
pub use tree::{PathBuilder, PathElement, PathTree};
