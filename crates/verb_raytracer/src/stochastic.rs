//! Diffuse-rain energy estimator.
//!
//! Every ray carries a per-band intensity. At each bounce the surface
//! absorbs part of it; if the receiver is visible from the hit point a
//! share of the scattered energy is "rained" straight at the receiver,
//! and a ray whose incoming segment passes through the receiver sphere
//! deposits its energy as a specular arrival.

use std::f32::consts::PI;

use rayon::prelude::*;
use verb_core::compute::ComputeResult;
use verb_core::{Bands, ComputeContext, Impulse};
use verb_math::Vec3;

use crate::reflection::Reflection;
use crate::scene_buffers::SceneBuffers;

/// Starting per-ray intensity.
///
/// Scaled so that the rays expected to pass through a receiver sphere of
/// radius `receiver_radius` together carry the direct-sound intensity
/// `1 / (4 pi dist^2)`.
pub fn starting_intensity(source: Vec3, receiver: Vec3, receiver_radius: f32, rays: usize) -> f32 {
    let dist = source.distance(receiver).max(receiver_radius);
    let cos_y = receiver_cos_angle(receiver_radius, dist);
    2.0 / (4.0 * PI * rays as f32 * dist * dist * (1.0 - cos_y))
}

/// Cosine of the half-angle subtended by the receiver sphere at `dist`.
fn receiver_cos_angle(receiver_radius: f32, dist: f32) -> f32 {
    let sin_y = receiver_radius / receiver_radius.max(dist);
    (1.0 - sin_y * sin_y).max(0.0).sqrt()
}

#[derive(Debug, Clone, Copy)]
struct RayEnergy {
    volume: Bands,
    position: Vec3,
    distance: f32,
    bounces: usize,
    alive: bool,
}

/// Arrivals produced by one ray at one bounce.
#[derive(Debug, Clone, Copy, Default)]
struct Contribution {
    specular: Option<Impulse>,
    diffuse: Option<Impulse>,
}

/// Per-ray state for the diffuse estimator, fed one depth batch at a time.
pub struct StochasticFinder {
    receiver: Vec3,
    receiver_radius: f32,
    speed_of_sound: f32,
    rays: Vec<RayEnergy>,
    specular: Vec<Impulse>,
    diffuse: Vec<Impulse>,
    skipped: usize,
}

impl StochasticFinder {
    pub fn new(
        source: Vec3,
        receiver: Vec3,
        receiver_radius: f32,
        rays: usize,
        speed_of_sound: f32,
    ) -> Self {
        let volume = Bands::splat(starting_intensity(source, receiver, receiver_radius, rays));
        let state = RayEnergy {
            volume,
            position: source,
            distance: 0.0,
            bounces: 0,
            alive: true,
        };

        Self {
            receiver,
            receiver_radius,
            speed_of_sound,
            rays: vec![state; rays],
            specular: Vec::new(),
            diffuse: Vec::new(),
            skipped: 0,
        }
    }

    /// Consume one batch of reflections, one per ray.
    pub fn process(
        &mut self,
        ctx: &ComputeContext,
        reflections: &[Reflection],
        buffers: &SceneBuffers,
    ) -> ComputeResult<()> {
        let receiver = self.receiver;
        let radius = self.receiver_radius;
        let speed = self.speed_of_sound;
        let before = self.rays.iter().filter(|r| !r.alive).count();
        let rays = &mut self.rays;

        let contributions: Vec<Contribution> = ctx.dispatch("stochastic", || {
            rays.par_iter_mut()
                .zip(reflections.par_iter())
                .map(|(state, reflection)| {
                    step_ray(state, reflection, buffers, receiver, radius, speed)
                })
                .collect()
        })?;

        for c in contributions {
            self.specular.extend(c.specular);
            self.diffuse.extend(c.diffuse);
        }
        self.skipped += self.rays.iter().filter(|r| !r.alive).count() - before;
        Ok(())
    }

    /// Rays dropped so far because they left the scene or were malformed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Energy that passed through the receiver sphere.
    pub fn specular(&self) -> &[Impulse] {
        &self.specular
    }

    /// Energy scattered toward the receiver from surfaces.
    pub fn diffuse(&self) -> &[Impulse] {
        &self.diffuse
    }

    /// All arrivals, receiver-sphere hits first.
    pub fn into_impulses(self) -> Vec<Impulse> {
        let mut out = self.specular;
        out.extend(self.diffuse);
        out
    }
}

fn step_ray(
    state: &mut RayEnergy,
    reflection: &Reflection,
    buffers: &SceneBuffers,
    receiver: Vec3,
    radius: f32,
    speed: f32,
) -> Contribution {
    let mut out = Contribution::default();
    if !state.alive {
        return out;
    }
    if !reflection.keep_going() {
        state.alive = false;
        return out;
    }

    let (Some(tri), Some(surface)) = (
        buffers.triangle_verts(reflection.triangle),
        buffers.surface(reflection.triangle),
    ) else {
        state.alive = false;
        return out;
    };

    let segment = reflection.position - state.position;
    let length = segment.length();
    if !reflection.position.is_finite() || !(length > 0.0) || !length.is_finite() {
        state.alive = false;
        return out;
    }

    // Incoming segment through the receiver sphere. The first segment is
    // the direct sound, which the image-source finder already covers.
    if state.bounces > 0 {
        let dir = segment / length;
        let along = (receiver - state.position).dot(dir).clamp(0.0, length);
        let closest = state.position + dir * along;
        if closest.distance(receiver) < radius {
            out.specular = Some(Impulse::new(
                state.volume,
                closest,
                (state.distance + along) / speed,
            ));
        }
    }

    state.volume *= surface.reflectance();
    state.distance += length;
    state.position = reflection.position;
    state.bounces += 1;

    // Rain is an estimate only, the ray keeps its scattered energy
    if reflection.receiver_visible() {
        let to_receiver = receiver - reflection.position;
        let dist = to_receiver.length();
        if dist > 0.0 {
            let cos_theta = tri.normal().dot(to_receiver / dist).abs();
            let cos_y = receiver_cos_angle(radius, dist);
            let rain = state.volume * surface.scattering * ((1.0 - cos_y) * 2.0 * cos_theta);
            if rain.is_finite() {
                out.diffuse = Some(Impulse::new(
                    rain,
                    reflection.position,
                    (state.distance + dist) / speed,
                ));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use verb_core::{SceneData, Surface};
    use verb_math::Aabb;

    fn buffers(ctx: &ComputeContext, absorption: f32, scattering: f32) -> SceneBuffers {
        let scene = SceneData::from_box(
            &Aabb::new(Vec3::ZERO, Vec3::new(4.0, 3.0, 6.0)),
            Surface::uniform(absorption, scattering),
        );
        SceneBuffers::upload(ctx, &scene).unwrap()
    }

    #[test]
    fn test_starting_intensity_normalization() {
        let source = Vec3::ZERO;
        let receiver = Vec3::new(3.0, 0.0, 0.0);
        let r = 0.5;
        let rays = 1000;
        let i = starting_intensity(source, receiver, r, rays);

        // Rays expected through the sphere times their intensity gives 1/(4 pi d^2)
        let cos_y = receiver_cos_angle(r, 3.0);
        let hitting = rays as f32 * (1.0 - cos_y) / 2.0;
        assert!((hitting * i - 1.0 / (4.0 * PI * 9.0)).abs() < 1e-6);

        // Source inside the receiver sphere stays finite
        assert!(starting_intensity(source, source, r, rays).is_finite());
    }

    #[test]
    fn test_diffuse_rain_and_absorption() {
        let ctx = ComputeContext::with_threads(1).unwrap();
        let buffers = buffers(&ctx, 0.5, 0.2);
        let source = Vec3::new(1.0, 1.2, 3.0);
        let receiver = Vec3::new(2.0, 1.2, 3.0);
        let mut finder = StochasticFinder::new(source, receiver, 0.1, 1, 340.0);
        let start = finder.rays[0].volume[0];

        // Hit the -x wall (triangle 9) head on, receiver visible
        let hit = Reflection::hit(Vec3::new(0.0, 1.2, 3.0), Vec3::X, 9, true);
        finder.process(&ctx, &[hit], &buffers).unwrap();

        assert!(finder.specular().is_empty());
        assert_eq!(finder.diffuse().len(), 1);
        let rain = finder.diffuse()[0];
        assert!((rain.time - 3.0 / 340.0).abs() < 1e-6);

        let cos_y = receiver_cos_angle(0.1, 2.0);
        let expected = start * 0.5 * 0.2 * (1.0 - cos_y) * 2.0;
        assert!((rain.volume[0] - expected).abs() < expected * 1e-4);

        // Only absorption reduces the ray, not the rain
        let remaining = finder.rays[0].volume[0];
        assert!((remaining - start * 0.5).abs() < start * 1e-6);
    }

    #[test]
    fn test_receiver_sphere_arrival() {
        let ctx = ComputeContext::with_threads(1).unwrap();
        let buffers = buffers(&ctx, 0.0, 0.0);
        let source = Vec3::new(1.0, 1.2, 3.0);
        let receiver = Vec3::new(2.0, 1.2, 3.0);
        let mut finder = StochasticFinder::new(source, receiver, 0.1, 1, 340.0);

        // Bounce off -x, then travel through the receiver to the +x wall
        let first = Reflection::hit(Vec3::new(0.0, 1.2, 3.0), Vec3::X, 9, false);
        let second = Reflection::hit(Vec3::new(4.0, 1.2, 3.0), -Vec3::X, 10, false);
        finder.process(&ctx, &[first], &buffers).unwrap();
        finder.process(&ctx, &[second], &buffers).unwrap();

        assert_eq!(finder.specular().len(), 1);
        let arrival = finder.specular()[0];
        assert!((arrival.time - 3.0 / 340.0).abs() < 1e-6);
        assert!(finder.diffuse().is_empty());
    }

    #[test]
    fn test_malformed_rays_are_skipped() {
        let ctx = ComputeContext::with_threads(2).unwrap();
        let buffers = buffers(&ctx, 0.1, 0.5);
        let source = Vec3::new(1.0, 1.0, 1.0);
        let receiver = Vec3::new(2.0, 2.0, 2.0);
        let mut finder = StochasticFinder::new(source, receiver, 0.1, 4, 340.0);

        let batch = [
            Reflection::hit(Vec3::NAN, Vec3::X, 0, true),
            Reflection::hit(source, Vec3::X, 0, true),
            Reflection::hit(Vec3::new(0.0, 1.0, 1.0), Vec3::X, 999, true),
            Reflection::hit(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, 0, true),
        ];
        finder.process(&ctx, &batch, &buffers).unwrap();
        assert_eq!(finder.skipped(), 3);
        assert_eq!(finder.diffuse().len(), 1);

        // Skipped rays stay skipped
        let next = [Reflection::hit(Vec3::new(0.0, 1.0, 1.0), Vec3::X, 8, true); 4];
        finder.process(&ctx, &next, &buffers).unwrap();
        assert_eq!(finder.diffuse().len(), 2);
        assert!(finder.into_impulses().iter().all(Impulse::is_valid));
    }
}
