use crate::{Range, Ray, Vec3};

/// Axis-aligned bounding box, a [`Range`] over [`Vec3`].
///
/// Used for the scene bounds, voxel cells and waveguide mesh extents.
pub type Aabb = Range<Vec3>;

/// One of the three coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl Range<Vec3> {
    /// Slab test of a ray against this box within `[t_min, t_max]`.
    ///
    /// Returns the entry and exit distances of the overlap, or `None` when
    /// the ray misses.
    pub fn intersect_ray(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<(f32, f32)> {
        let mut t0 = t_min;
        let mut t1 = t_max;

        for axis in 0..3 {
            let inv = 1.0 / ray.direction[axis];
            let mut near = (self.min()[axis] - ray.origin[axis]) * inv;
            let mut far = (self.max()[axis] - ray.origin[axis]) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut near, &mut far);
            }
            // f32::max/min drop NaN from a 0 * inf slab, leaving the interval as is
            t0 = near.max(t0);
            t1 = far.min(t1);
            if t1 < t0 {
                return None;
            }
        }

        Some((t0, t1))
    }

    /// True when `p` lies inside or on the boundary of the box.
    pub fn contains(&self, p: Vec3) -> bool {
        self.min().cmple(p).all() && p.cmple(self.max()).all()
    }

    /// True when the two boxes share any point (touching counts).
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min().cmple(other.max()).all() && other.min().cmple(self.max()).all()
    }

    /// Reflect `p` about the centre plane of the box perpendicular to `axis`.
    ///
    /// Combined with a whole-box translation this enumerates the image
    /// sources of a shoebox room.
    pub fn mirror_inside(&self, p: Vec3, axis: Axis) -> Vec3 {
        let i = axis.index();
        let mut ret = p;
        ret[i] = self.min()[i] + self.max()[i] - p[i];
        ret
    }

    /// Returns the axis with the longest extent.
    pub fn longest_axis(&self) -> Axis {
        let d = self.dimensions();
        if d.x > d.y && d.x > d.z {
            Axis::X
        } else if d.y > d.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    /// True when every bound is finite.
    pub fn is_finite(&self) -> bool {
        self.min().is_finite() && self.max().is_finite()
    }

    /// True when the box is not finite or is flat along some axis.
    pub fn is_degenerate(&self) -> bool {
        !self.is_finite() || self.dimensions().min_element() <= 0.0
    }

    /// Expand thin dimensions so the box has a non-zero extent on every axis.
    pub fn padded_to_minimum(&self, delta: f32) -> Aabb {
        let d = self.dimensions();
        let pad = Vec3::select(d.cmplt(Vec3::splat(delta)), Vec3::splat(delta * 0.5), Vec3::ZERO);
        self.padded(pad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    #[test]
    fn test_aabb_hit() {
        let aabb = unit_box();

        // Ray pointing at center
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let (t0, t1) = aabb.intersect_ray(&ray, 0.0, 100.0).unwrap();
        assert!((t0 - 4.0).abs() < 1e-6);
        assert!((t1 - 6.0).abs() < 1e-6);

        // Ray pointing away
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), -Vec3::Z);
        assert!(aabb.intersect_ray(&ray, 0.0, 100.0).is_none());

        // Ray missing the box
        let ray = Ray::new(Vec3::new(10.0, 0.0, 0.0), Vec3::Z);
        assert!(aabb.intersect_ray(&ray, 0.0, 100.0).is_none());
    }

    #[test]
    fn test_aabb_hit_from_inside() {
        let aabb = unit_box();
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let (t0, t1) = aabb.intersect_ray(&ray, 0.0, f32::INFINITY).unwrap();
        assert_eq!(t0, 0.0);
        assert!((t1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_aabb_contains_and_overlaps() {
        let a = unit_box();
        assert!(a.contains(Vec3::ONE));
        assert!(!a.contains(Vec3::splat(1.1)));

        let b = Aabb::new(Vec3::splat(1.0), Vec3::splat(2.0));
        let c = Aabb::new(Vec3::splat(1.5), Vec3::splat(2.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_mirror_inside() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 3.0, 6.0));
        let p = Vec3::new(1.0, 2.0, 1.0);
        assert_eq!(aabb.mirror_inside(p, Axis::X), Vec3::new(3.0, 2.0, 1.0));
        assert_eq!(aabb.mirror_inside(p, Axis::Y), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(aabb.mirror_inside(p, Axis::Z), Vec3::new(1.0, 2.0, 5.0));
    }

    #[test]
    fn test_aabb_longest_axis() {
        let aabb_x = Aabb::new(Vec3::ZERO, Vec3::new(10.0, 1.0, 1.0));
        assert_eq!(aabb_x.longest_axis(), Axis::X);

        let aabb_y = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 10.0, 1.0));
        assert_eq!(aabb_y.longest_axis(), Axis::Y);

        let aabb_z = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 10.0));
        assert_eq!(aabb_z.longest_axis(), Axis::Z);
    }

    #[test]
    fn test_is_degenerate() {
        assert!(!Aabb::new(Vec3::ZERO, Vec3::ONE).is_degenerate());
        assert!(Aabb::new(Vec3::ONE, Vec3::ONE).is_degenerate());
        assert!(Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)).is_degenerate());
        assert!(Aabb::new(Vec3::ZERO, Vec3::splat(f32::INFINITY)).is_degenerate());
    }

    #[test]
    fn test_padded_to_minimum() {
        let flat = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));
        let padded = flat.padded_to_minimum(0.001);
        assert_eq!(padded.min().x, 0.0);
        assert!(padded.dimensions().z > 0.0);
    }
}
