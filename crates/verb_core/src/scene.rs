//! Triangulated scene geometry and per-surface acoustic properties.
//!
//! A [`SceneData`] is validated once on construction and is read-only for
//! the lifetime of a simulation run.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use verb_math::{min_max, Aabb, Ray, TriangleVerts, Vec3};

use crate::bands::Bands;

/// Errors raised while validating scene geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("triangle {triangle} references vertex {vertex}, but there are {count} vertices")]
    InvalidVertexIndex {
        triangle: usize,
        vertex: u32,
        count: usize,
    },

    #[error("triangle {triangle} references surface {surface}, but there are {count} surfaces")]
    InvalidSurfaceIndex {
        triangle: usize,
        surface: u32,
        count: usize,
    },

    #[error("vertex {0} has a non-finite coordinate")]
    NonFiniteVertex(usize),
}

/// Result type for scene construction.
pub type SceneResult<T> = Result<T, SceneError>;

/// Frequency-dependent acoustic properties of one material.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Surface {
    /// Energy absorption coefficient per band, 0-1
    pub absorption: Bands,

    /// Scattering coefficient per band, 0 (specular) to 1 (lambertian)
    pub scattering: Bands,
}

impl Surface {
    pub fn new(absorption: Bands, scattering: Bands) -> Self {
        Self {
            absorption,
            scattering,
        }
    }

    /// Same absorption and scattering in every band.
    pub fn uniform(absorption: f32, scattering: f32) -> Self {
        Self::new(Bands::splat(absorption), Bands::splat(scattering))
    }

    /// Per-band energy reflection `1 - absorption`.
    pub fn reflectance(&self) -> Bands {
        Bands::reflectance_from_absorption(self.absorption)
    }
}

/// Three vertex indices and the index of the surface the triangle is made of.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Triangle {
    pub vertices: [u32; 3],
    pub surface: u32,
}

impl Triangle {
    pub fn new(vertices: [u32; 3], surface: u32) -> Self {
        Self { vertices, surface }
    }
}

/// Nearest hit found by a scene query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub triangle: u32,
    pub distance: f32,
}

/// Immutable triangle soup with a surface table.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneData {
    vertices: Vec<Vec3>,
    triangles: Vec<Triangle>,
    surfaces: Vec<Surface>,
}

impl SceneData {
    /// Validate and build a scene.
    ///
    /// A scene without triangles is allowed here; the engines that need
    /// geometry reject it when a run is set up.
    pub fn new(
        vertices: Vec<Vec3>,
        triangles: Vec<Triangle>,
        surfaces: Vec<Surface>,
    ) -> SceneResult<Self> {
        if let Some(i) = vertices.iter().position(|v| !v.is_finite()) {
            return Err(SceneError::NonFiniteVertex(i));
        }

        for (i, tri) in triangles.iter().enumerate() {
            for &v in &tri.vertices {
                if v as usize >= vertices.len() {
                    return Err(SceneError::InvalidVertexIndex {
                        triangle: i,
                        vertex: v,
                        count: vertices.len(),
                    });
                }
            }
            if tri.surface as usize >= surfaces.len() {
                return Err(SceneError::InvalidSurfaceIndex {
                    triangle: i,
                    surface: tri.surface,
                    count: surfaces.len(),
                });
            }
        }

        Ok(Self {
            vertices,
            triangles,
            surfaces,
        })
    }

    /// Closed rectangular room made of twelve triangles, all sharing one surface.
    pub fn from_box(aabb: &Aabb, surface: Surface) -> Self {
        let (lo, hi) = (aabb.min(), aabb.max());
        let vertices = vec![
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ];

        // Two triangles per face, wound to face into the room
        let faces: [[u32; 4]; 6] = [
            [0, 1, 3, 2], // -z
            [4, 6, 7, 5], // +z
            [0, 4, 5, 1], // -y
            [2, 3, 7, 6], // +y
            [0, 2, 6, 4], // -x
            [1, 5, 7, 3], // +x
        ];
        let triangles = faces
            .iter()
            .flat_map(|f| {
                [
                    Triangle::new([f[0], f[1], f[2]], 0),
                    Triangle::new([f[0], f[2], f[3]], 0),
                ]
            })
            .collect();

        Self {
            vertices,
            triangles,
            surfaces: vec![surface],
        }
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Corner positions of triangle `index`.
    pub fn triangle_verts(&self, index: usize) -> TriangleVerts {
        let [a, b, c] = self.triangles[index].vertices;
        TriangleVerts::new(
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        )
    }

    /// Surface of triangle `index`.
    pub fn surface_of(&self, index: usize) -> &Surface {
        &self.surfaces[self.triangles[index].surface as usize]
    }

    /// Bounds of every vertex referenced by a triangle.
    pub fn aabb(&self) -> Option<Aabb> {
        min_max(
            self.triangles
                .iter()
                .flat_map(|t| t.vertices)
                .map(|v| self.vertices[v as usize]),
        )
    }

    /// Brute-force nearest hit over every triangle, skipping `exclude`.
    pub fn intersect_all(&self, ray: &Ray, exclude: Option<u32>) -> Option<Intersection> {
        let mut best: Option<Intersection> = None;
        for i in 0..self.triangles.len() {
            if exclude == Some(i as u32) {
                continue;
            }
            if let Some(t) = self.triangle_verts(i).intersect(ray, 0.0) {
                if best.map_or(true, |b| t < b.distance) {
                    best = Some(Intersection {
                        triangle: i as u32,
                        distance: t,
                    });
                }
            }
        }
        best
    }
}
