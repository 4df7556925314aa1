//! Triangle geometry for ray casting and mirror-image construction.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use crate::{Aabb, Ray, Vec3};

/// Determinant threshold below which a ray is treated as parallel.
const PARALLEL_EPSILON: f32 = 1e-10;

/// The three corner positions of one scene triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleVerts {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

impl TriangleVerts {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unit face normal (right-handed winding). Zero for degenerate triangles.
    pub fn normal(&self) -> Vec3 {
        (self.v1 - self.v0).cross(self.v2 - self.v0).normalize_or_zero()
    }

    pub fn area(&self) -> f32 {
        (self.v1 - self.v0).cross(self.v2 - self.v0).length() * 0.5
    }

    /// Tight bounding box of the three corners.
    pub fn aabb(&self) -> Aabb {
        Aabb::new(
            self.v0.min(self.v1).min(self.v2),
            self.v0.max(self.v1).max(self.v2),
        )
    }

    /// Distance along `ray` to the triangle, if the hit lies beyond `t_min`.
    ///
    /// Both faces are hit; the tests on `u` and `v` are inclusive so that a
    /// ray through a shared edge hits at least one of the two triangles.
    pub fn intersect(&self, ray: &Ray, t_min: f32) -> Option<f32> {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle
        if a.abs() < PARALLEL_EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(h);

        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);

        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        (t > t_min).then_some(t)
    }

    /// Mirror image of `point` across the plane of the triangle.
    pub fn mirror(&self, point: Vec3) -> Vec3 {
        let n = self.normal();
        point - n * (2.0 * (point - self.v0).dot(n))
    }

    /// Specular reflection of `direction` about the triangle normal.
    pub fn reflect(&self, direction: Vec3) -> Vec3 {
        let n = self.normal();
        direction - n * (2.0 * direction.dot(n))
    }

    /// Closest point on the triangle to `p`.
    ///
    /// Region-based walk over vertices, edges and face (Ericson, Real-Time
    /// Collision Detection 5.1.5).
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        let (a, b, c) = (self.v0, self.v1, self.v2);
        let ab = b - a;
        let ac = c - a;

        let ap = p - a;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }

        let bp = p - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return a + ab * v;
        }

        let cp = p - c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return a + ac * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        a + ab * v + ac * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy_triangle() -> TriangleVerts {
        // Triangle in XY plane at z=-1
        TriangleVerts::new(
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(0.0, 1.0, -1.0),
        )
    }

    #[test]
    fn test_triangle_hit() {
        let tri = xy_triangle();
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let t = tri.intersect(&ray, 0.0).unwrap();
        assert!((t - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_triangle_hit_back_face() {
        let tri = xy_triangle();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -3.0), Vec3::Z);
        let t = tri.intersect(&ray, 0.0).unwrap();
        assert!((t - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_triangle_miss() {
        let tri = xy_triangle();

        // Ray pointing away
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(tri.intersect(&ray, 0.0).is_none());

        // Ray passing beside the triangle
        let ray = Ray::new(Vec3::new(5.0, 0.0, 0.0), -Vec3::Z);
        assert!(tri.intersect(&ray, 0.0).is_none());
    }

    #[test]
    fn test_normal_and_mirror() {
        let tri = xy_triangle();
        assert!((tri.normal() - Vec3::Z).length() < 1e-6);

        let image = tri.mirror(Vec3::new(0.3, 0.2, 1.0));
        assert!((image - Vec3::new(0.3, 0.2, -3.0)).length() < 1e-6);
    }

    #[test]
    fn test_reflect() {
        let tri = xy_triangle();
        let d = Vec3::new(1.0, 0.0, -1.0).normalize();
        let r = tri.reflect(d);
        assert!((r - Vec3::new(1.0, 0.0, 1.0).normalize()).length() < 1e-6);
    }

    #[test]
    fn test_closest_point_regions() {
        let tri = TriangleVerts::new(Vec3::ZERO, Vec3::X, Vec3::Y);

        // Above the face
        let p = tri.closest_point(Vec3::new(0.25, 0.25, 3.0));
        assert!((p - Vec3::new(0.25, 0.25, 0.0)).length() < 1e-6);

        // Beyond a vertex
        let p = tri.closest_point(Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(p, Vec3::ZERO);

        // Beyond the hypotenuse
        let p = tri.closest_point(Vec3::new(1.0, 1.0, 0.0));
        assert!((p - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_aabb() {
        let bbox = xy_triangle().aabb();
        assert_eq!(bbox.min(), Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(bbox.max(), Vec3::new(1.0, 1.0, -1.0));
    }
}
