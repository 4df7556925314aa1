//! Geometric ray tracer.
//!
//! Rays are advanced depth by depth: every call to [`Tracer::step`] is one
//! parallel dispatch that moves each live ray through one more bounce and
//! writes one [`Reflection`] per ray.

use rayon::prelude::*;
use verb_core::compute::ComputeResult;
use verb_core::ComputeContext;
use verb_math::{Ray, Vec3};

use crate::random::{lambert_direction, lane_rng};
use crate::reflection::Reflection;
use crate::voxel::VoxelisedScene;

/// Distance a reflected ray is lifted off the surface it left.
const SURFACE_OFFSET: f32 = 1e-4;

#[derive(Debug, Clone, Copy)]
struct RayState {
    ray: Ray,
    last_triangle: Option<u32>,
    alive: bool,
}

/// Bounces a batch of rays through a voxelised scene.
pub struct Tracer<'a> {
    voxels: &'a VoxelisedScene,
    receiver: Vec3,
    seed: u64,
    depth: usize,
    rays: Vec<RayState>,
}

impl<'a> Tracer<'a> {
    /// Start one ray per direction at `source`.
    ///
    /// Directions that aren't finite produce rays that are terminated at
    /// the first step.
    pub fn new(
        voxels: &'a VoxelisedScene,
        source: Vec3,
        receiver: Vec3,
        directions: &[Vec3],
        seed: u64,
    ) -> Self {
        let rays = directions
            .iter()
            .map(|&d| {
                let ray = Ray::new(source, d);
                RayState {
                    ray,
                    last_triangle: None,
                    alive: ray.is_valid(),
                }
            })
            .collect();

        Self {
            voxels,
            receiver,
            seed,
            depth: 0,
            rays,
        }
    }

    pub fn ray_count(&self) -> usize {
        self.rays.len()
    }

    /// Number of steps taken so far.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True while at least one ray can still bounce.
    pub fn any_alive(&self) -> bool {
        self.rays.iter().any(|r| r.alive)
    }

    /// Advance every ray by one bounce.
    ///
    /// Returns one record per ray, in ray order.
    pub fn step(&mut self, ctx: &ComputeContext) -> ComputeResult<Vec<Reflection>> {
        let mut output = ctx.zeroed::<Reflection>("reflections", self.rays.len())?;
        let voxels = self.voxels;
        let receiver = self.receiver;
        let seed = self.seed;
        let depth = self.depth;

        ctx.dispatch("raytrace", || {
            self.rays
                .par_iter_mut()
                .zip(output.as_mut_slice().par_iter_mut())
                .enumerate()
                .for_each(|(index, (state, out))| {
                    *out = bounce(voxels, receiver, seed, index, depth, state);
                });
        })?;

        let malformed = self
            .rays
            .iter()
            .filter(|r| r.alive && !r.ray.is_valid())
            .count();
        if malformed > 0 {
            log::warn!("Terminating {malformed} rays with non-finite directions at depth {depth}");
        }
        for state in &mut self.rays {
            if state.alive && !state.ray.is_valid() {
                state.alive = false;
            }
        }

        self.depth += 1;
        Ok(output.into_vec())
    }
}

/// One bounce of one ray.
fn bounce(
    voxels: &VoxelisedScene,
    receiver: Vec3,
    seed: u64,
    index: usize,
    depth: usize,
    state: &mut RayState,
) -> Reflection {
    if !state.alive {
        return Reflection::terminated();
    }

    let Some(hit) = voxels.intersects_excluding(&state.ray, state.last_triangle) else {
        state.alive = false;
        return Reflection::terminated();
    };

    let scene = voxels.scene();
    let tri = scene.triangle_verts(hit.triangle as usize);
    let incoming = state.ray.direction;
    let position = state.ray.at(hit.distance);

    // Normal on the side the ray arrived from
    let mut normal = tri.normal();
    if normal.dot(incoming) > 0.0 {
        normal = -normal;
    }

    let scattering = scene.surface_of(hit.triangle as usize).scattering.mean();
    let specular = tri.reflect(incoming);
    let direction = if scattering > 0.0 {
        let mut rng = lane_rng(seed, index, depth);
        let diffuse = lambert_direction(normal, &mut rng);
        (specular * (1.0 - scattering) + diffuse * scattering).normalize_or_zero()
    } else {
        specular
    };

    let origin = position + normal * SURFACE_OFFSET;
    let receiver_visible = is_visible(voxels, origin, normal, receiver, hit.triangle);

    state.ray = Ray {
        origin,
        direction: if direction == Vec3::ZERO {
            Vec3::NAN
        } else {
            direction
        },
    };
    state.last_triangle = Some(hit.triangle);

    Reflection::hit(position, direction, hit.triangle, receiver_visible)
}

/// Line of sight from a point just off a surface to the receiver.
fn is_visible(
    voxels: &VoxelisedScene,
    origin: Vec3,
    normal: Vec3,
    receiver: Vec3,
    triangle: u32,
) -> bool {
    let to_receiver = receiver - origin;
    if normal.dot(to_receiver) <= 0.0 {
        return false;
    }
    let distance = to_receiver.length();
    let ray = Ray::new(origin, to_receiver);
    voxels
        .intersects_excluding(&ray, Some(triangle))
        .map_or(true, |h| h.distance >= distance)
}

/// Trace `directions` from `source` for up to `max_depth` bounces.
///
/// Returns, for each ray, its hit records in order. A ray's list ends
/// where it left the scene or was terminated.
pub fn trace(
    ctx: &ComputeContext,
    voxels: &VoxelisedScene,
    source: Vec3,
    receiver: Vec3,
    directions: &[Vec3],
    max_depth: usize,
    seed: u64,
) -> ComputeResult<Vec<Vec<Reflection>>> {
    let mut tracer = Tracer::new(voxels, source, receiver, directions, seed);
    let mut paths = vec![Vec::new(); directions.len()];
    let mut finished = vec![false; directions.len()];

    for _ in 0..max_depth {
        let batch = tracer.step(ctx)?;
        for ((path, done), reflection) in paths.iter_mut().zip(&mut finished).zip(batch) {
            if *done {
                continue;
            }
            if reflection.keep_going() {
                path.push(reflection);
            } else {
                *done = true;
            }
        }
        if !tracer.any_alive() {
            break;
        }
    }

    Ok(paths)
}
