//! Uniform voxel grid over a triangle scene.
//!
//! The grid has `2^depth` cells per axis. Every triangle is registered in
//! each cell its (slightly padded) bounding box overlaps, so a cell list can
//! hold false positives but never misses a triangle that passes through the
//! cell. Cell lists are stored flattened: `offsets[c]..offsets[c + 1]` is the
//! range of `indices` belonging to cell `c`.

use verb_core::{Intersection, SceneData};
use verb_math::{Aabb, IVec3, Ray, UVec3, Vec3};

/// Relative padding applied to the scene bounds and to triangle boxes.
const PAD_FRACTION: f32 = 1e-4;

/// Hits closer together than this along a ray count as the same crossing.
const CROSSING_EPSILON: f32 = 1e-5;

/// Fixed off-axis direction for the parity test, chosen to avoid grazing
/// axis-aligned geometry.
const PARITY_DIRECTION: Vec3 = Vec3::new(0.2718, 0.5772, 0.7071);

/// One cell reached during traversal.
#[derive(Debug, Clone, Copy)]
pub struct CellVisit<'a> {
    /// Triangles registered in the cell
    pub triangles: &'a [u32],
    /// Distance along the ray at which the cell is entered
    pub entry: f32,
    /// Distance along the ray at which the cell is left
    pub exit: f32,
}

/// A scene with its voxel acceleration grid.
#[derive(Debug, Clone)]
pub struct VoxelisedScene {
    scene: SceneData,
    aabb: Aabb,
    side: u32,
    cell_size: Vec3,
    offsets: Vec<u32>,
    indices: Vec<u32>,
}

impl VoxelisedScene {
    /// Build a grid with `2^depth` cells per axis over `aabb`.
    ///
    /// `aabb` is padded a little so geometry on its faces lands inside.
    pub fn new(scene: SceneData, depth: u32, aabb: Aabb) -> Self {
        let side = 1u32 << depth.min(10);
        let pad = aabb.dimensions().max_element().max(1.0) * PAD_FRACTION;
        let aabb = aabb.padded_to_minimum(pad).padded_by(pad);
        let cell_size = aabb.dimensions() / side as f32;

        let cells = (side as usize).pow(3);
        let mut counts = vec![0u32; cells + 1];
        let ranges: Vec<(UVec3, UVec3)> = (0..scene.triangles().len())
            .map(|i| {
                let bounds = scene.triangle_verts(i).aabb().padded_by(pad);
                (
                    cell_coord(&aabb, cell_size, side, bounds.min()),
                    cell_coord(&aabb, cell_size, side, bounds.max()),
                )
            })
            .collect();

        for (lo, hi) in &ranges {
            for_each_cell(*lo, *hi, |c| counts[cell_index(side, c) + 1] += 1);
        }
        for i in 1..counts.len() {
            counts[i] += counts[i - 1];
        }

        let offsets = counts;
        let mut cursor = offsets.clone();
        let mut indices = vec![0u32; offsets[cells] as usize];
        for (tri, (lo, hi)) in ranges.iter().enumerate() {
            for_each_cell(*lo, *hi, |c| {
                let slot = &mut cursor[cell_index(side, c)];
                indices[*slot as usize] = tri as u32;
                *slot += 1;
            });
        }

        log::info!(
            "Voxelised {} triangles into {}^3 cells ({} references)",
            scene.triangles().len(),
            side,
            indices.len()
        );

        Self {
            scene,
            aabb,
            side,
            cell_size,
            offsets,
            indices,
        }
    }

    /// Build a grid over the scene's own bounds.
    ///
    /// A scene without triangles gets a unit box with every cell empty.
    pub fn from_scene(scene: SceneData, depth: u32) -> Self {
        let aabb = scene
            .aabb()
            .unwrap_or_else(|| Aabb::new(Vec3::ZERO, Vec3::ONE));
        Self::new(scene, depth, aabb)
    }

    pub fn scene(&self) -> &SceneData {
        &self.scene
    }

    /// Padded bounds covered by the grid.
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Cells per axis.
    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    /// Triangles registered in the cell at `coord`.
    pub fn cell_triangles(&self, coord: UVec3) -> &[u32] {
        let i = cell_index(self.side, coord);
        &self.indices[self.offsets[i] as usize..self.offsets[i + 1] as usize]
    }

    /// Bounds of the cell at `coord`.
    pub fn cell_aabb(&self, coord: UVec3) -> Aabb {
        let min = self.aabb.min() + coord.as_vec3() * self.cell_size;
        Aabb::new(min, min + self.cell_size)
    }

    /// Cell containing `p`, clamped to the grid.
    pub fn cell_of(&self, p: Vec3) -> UVec3 {
        cell_coord(&self.aabb, self.cell_size, self.side, p)
    }

    /// Walk the cells pierced by `ray` in order of distance.
    ///
    /// The visitor returns `true` to stop the walk.
    pub fn traverse(&self, ray: &Ray, mut visitor: impl FnMut(CellVisit<'_>) -> bool) {
        if !ray.is_valid() {
            return;
        }
        let Some((t0, t1)) = self.aabb.intersect_ray(ray, 0.0, f32::INFINITY) else {
            return;
        };

        let mut cell = self.cell_of(ray.at(t0)).as_ivec3();
        let mut step = [0i32; 3];
        let mut t_max = [f32::INFINITY; 3];
        let mut t_delta = [f32::INFINITY; 3];

        for axis in 0..3 {
            let d = ray.direction[axis];
            if d > 0.0 {
                step[axis] = 1;
                let boundary = self.aabb.min()[axis] + (cell[axis] + 1) as f32 * self.cell_size[axis];
                t_max[axis] = (boundary - ray.origin[axis]) / d;
                t_delta[axis] = self.cell_size[axis] / d;
            } else if d < 0.0 {
                step[axis] = -1;
                let boundary = self.aabb.min()[axis] + cell[axis] as f32 * self.cell_size[axis];
                t_max[axis] = (boundary - ray.origin[axis]) / d;
                t_delta[axis] = -self.cell_size[axis] / d;
            }
        }

        let side = self.side as i32;
        let mut entry = t0;
        loop {
            let axis = if t_max[0] < t_max[1] {
                if t_max[0] < t_max[2] {
                    0
                } else {
                    2
                }
            } else if t_max[1] < t_max[2] {
                1
            } else {
                2
            };
            let exit = t_max[axis].min(t1);

            let visit = CellVisit {
                triangles: self.cell_triangles(cell.as_uvec3()),
                entry,
                exit,
            };
            if visitor(visit) {
                return;
            }

            if t_max[axis] > t1 {
                return;
            }
            cell[axis] += step[axis];
            if cell[axis] < 0 || cell[axis] >= side {
                return;
            }
            entry = t_max[axis];
            t_max[axis] += t_delta[axis];
        }
    }

    /// Nearest triangle hit by `ray`.
    pub fn intersects(&self, ray: &Ray) -> Option<Intersection> {
        self.intersects_excluding(ray, None)
    }

    /// Nearest triangle hit by `ray`, ignoring `exclude`.
    ///
    /// Agrees with [`SceneData::intersect_all`]; ties go to the lower index.
    pub fn intersects_excluding(&self, ray: &Ray, exclude: Option<u32>) -> Option<Intersection> {
        let mut best: Option<Intersection> = None;
        self.traverse(ray, |cell| {
            for &tri in cell.triangles {
                if exclude == Some(tri) {
                    continue;
                }
                if let Some(t) = self.scene.triangle_verts(tri as usize).intersect(ray, 0.0) {
                    let closer = match best {
                        None => true,
                        Some(b) => t < b.distance || (t == b.distance && tri < b.triangle),
                    };
                    if closer {
                        best = Some(Intersection {
                            triangle: tri,
                            distance: t,
                        });
                    }
                }
            }
            // A later cell can't hold anything nearer than a hit inside this one
            best.is_some_and(|b| b.distance <= cell.exit)
        });
        best
    }

    /// Parity test: is `p` enclosed by the scene geometry?
    ///
    /// Casts one ray and counts distinct crossings.
    pub fn inside(&self, p: Vec3) -> bool {
        if !self.aabb.contains(p) {
            return false;
        }

        let ray = Ray::new(p, PARITY_DIRECTION);
        let mut hits: Vec<(f32, u32)> = Vec::new();
        self.traverse(&ray, |cell| {
            for &tri in cell.triangles {
                if hits.iter().any(|(_, seen)| *seen == tri) {
                    continue;
                }
                if let Some(t) = self.scene.triangle_verts(tri as usize).intersect(&ray, 0.0) {
                    hits.push((t, tri));
                }
            }
            false
        });

        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut crossings = 0usize;
        let mut last = f32::NEG_INFINITY;
        for (t, _) in hits {
            if t - last > CROSSING_EPSILON {
                crossings += 1;
            }
            last = t;
        }
        crossings % 2 == 1
    }

    /// Triangle nearest to `p`.
    ///
    /// Searches growing shells of cells around `p`, then widens the search
    /// to every cell that could still hold something nearer. Points outside
    /// the grid fall back to a full scan.
    pub fn closest_triangle(&self, p: Vec3) -> Option<u32> {
        if self.scene.is_empty() {
            return None;
        }
        if !self.aabb.contains(p) {
            return self.closest_full_scan(p);
        }

        let centre = self.cell_of(p).as_ivec3();
        let mut best: Option<(f32, u32)> = None;

        let mut radius = 0i32;
        while radius < self.side as i32 {
            self.visit_shell(centre, radius, |tris| consider(&self.scene, p, tris, &mut best));
            if let Some((d2, _)) = best {
                let reach = (d2.sqrt() / self.cell_size.min_element()).ceil() as i32 + 1;
                for r in radius + 1..=reach.min(self.side as i32) {
                    self.visit_shell(centre, r, |tris| consider(&self.scene, p, tris, &mut best));
                }
                return best.map(|(_, tri)| tri);
            }
            radius += 1;
        }

        self.closest_full_scan(p)
    }

    fn closest_full_scan(&self, p: Vec3) -> Option<u32> {
        let all: Vec<u32> = (0..self.scene.triangles().len() as u32).collect();
        let mut best = None;
        consider(&self.scene, p, &all, &mut best);
        best.map(|(_, tri)| tri)
    }

    /// Visit every in-grid cell whose Chebyshev distance from `centre` is `radius`.
    fn visit_shell(&self, centre: IVec3, radius: i32, mut f: impl FnMut(&[u32])) {
        let side = self.side as i32;
        for dz in -radius..=radius {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs().max(dy.abs()).max(dz.abs()) != radius {
                        continue;
                    }
                    let c = centre + IVec3::new(dx, dy, dz);
                    if c.cmplt(IVec3::ZERO).any() || c.cmpge(IVec3::splat(side)).any() {
                        continue;
                    }
                    f(self.cell_triangles(c.as_uvec3()));
                }
            }
        }
    }
}

fn consider(scene: &SceneData, p: Vec3, triangles: &[u32], best: &mut Option<(f32, u32)>) {
    for &tri in triangles {
        let d2 = scene
            .triangle_verts(tri as usize)
            .closest_point(p)
            .distance_squared(p);
        let closer = match *best {
            None => true,
            Some((b, bt)) => d2 < b || (d2 == b && tri < bt),
        };
        if closer {
            *best = Some((d2, tri));
        }
    }
}

fn cell_coord(aabb: &Aabb, cell_size: Vec3, side: u32, p: Vec3) -> UVec3 {
    let rel = ((p - aabb.min()) / cell_size).floor();
    rel.clamp(Vec3::ZERO, Vec3::splat((side - 1) as f32)).as_uvec3()
}

#[inline]
fn cell_index(side: u32, c: UVec3) -> usize {
    let side = side as usize;
    (c.z as usize * side + c.y as usize) * side + c.x as usize
}

fn for_each_cell(lo: UVec3, hi: UVec3, mut f: impl FnMut(UVec3)) {
    for z in lo.z..=hi.z {
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                f(UVec3::new(x, y, z));
            }
        }
    }
}
