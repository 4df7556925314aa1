//! Running the geometric engines end to end.
//!
//! One run traces the rays depth by depth. Each depth batch goes straight
//! to the path builder (for image sources) and the diffuse estimator, then
//! is dropped, so memory stays proportional to the ray count.

use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;

use verb_core::progress::Progress;
use verb_core::{
    ComputeContext, Impulse, OutputOptions, Outcome, RaytracerParameters, SimulationParameters,
};

use crate::image_source::{self, PathBuilder};
use crate::random::random_directions;
use crate::scene_buffers::SceneBuffers;
use crate::stochastic::StochasticFinder;
use crate::tracer::Tracer;
use crate::voxel::VoxelisedScene;
use crate::{RaytracerError, RaytracerResult};

/// Impulses found by a run, grouped by method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Results {
    pub direct: Option<Impulse>,
    pub image_source: Vec<Impulse>,
    pub diffuse: Vec<Impulse>,
}

/// Which groups of [`Results`] to combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub direct: bool,
    pub image_source: bool,
    pub diffuse: bool,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            direct: true,
            image_source: true,
            diffuse: true,
        }
    }
}

impl From<&OutputOptions> for Selection {
    fn from(options: &OutputOptions) -> Self {
        Self {
            direct: !options.remove_direct,
            ..Self::default()
        }
    }
}

impl Results {
    /// Selected impulses in one list.
    pub fn impulses(&self, selection: Selection) -> Vec<Impulse> {
        let mut out = Vec::new();
        if selection.direct {
            out.extend(self.direct);
        }
        if selection.image_source {
            out.extend_from_slice(&self.image_source);
        }
        if selection.diffuse {
            out.extend_from_slice(&self.diffuse);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.direct.iter().count() + self.image_source.len() + self.diffuse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_setup(
    voxels: &VoxelisedScene,
    simulation: &SimulationParameters,
    params: &RaytracerParameters,
) -> RaytracerResult<()> {
    // The voxel grid is padded, so check the geometry itself
    match voxels.scene().aabb() {
        None => return Err(RaytracerError::EmptyScene),
        Some(bounds) if bounds.is_degenerate() => return Err(RaytracerError::DegenerateBounds),
        Some(_) => {}
    }
    if params.rays == 0 {
        return Err(RaytracerError::NoRays);
    }
    if params.max_depth == 0 {
        return Err(RaytracerError::ZeroDepth);
    }
    simulation.validate()?;
    params.validate()?;
    Ok(())
}

/// Trace rays and collect direct, image-source and diffuse arrivals.
///
/// `callback` is called once per completed depth with indices 0, 1, 2...
/// Returning `Break`, or clearing `keep_going`, stops the run after the
/// current depth; the impulses found so far come back with
/// [`verb_core::Completion::Cancelled`].
pub fn run<F>(
    ctx: &ComputeContext,
    voxels: &VoxelisedScene,
    simulation: &SimulationParameters,
    params: &RaytracerParameters,
    keep_going: &AtomicBool,
    callback: F,
) -> RaytracerResult<Outcome<Results>>
where
    F: FnMut(usize) -> ControlFlow<()>,
{
    check_setup(voxels, simulation, params)?;

    let source = simulation.source;
    let receiver = simulation.receiver;
    let speed = simulation.speed_of_sound;

    log::info!(
        "Raytracing {} rays to depth {} ({} triangles)",
        params.rays,
        params.max_depth,
        voxels.scene().triangles().len()
    );

    let buffers = SceneBuffers::upload(ctx, voxels.scene())?;
    let directions = random_directions(params.rays, params.seed);
    let mut tracer = Tracer::new(voxels, source, receiver, &directions, params.seed);
    let mut paths = PathBuilder::new(params.rays);
    let mut stochastic =
        StochasticFinder::new(source, receiver, params.receiver_radius, params.rays, speed);
    let mut progress = Progress::new(keep_going, callback);

    let mut finished = true;
    for depth in 0..params.max_depth {
        if !progress.should_continue() {
            finished = false;
            break;
        }

        let batch = tracer.step(ctx)?;
        paths.push(&batch);
        stochastic.process(ctx, &batch, &buffers)?;
        log::debug!("Depth {depth} traced");

        let more = progress.step();
        if !more && depth + 1 < params.max_depth {
            finished = false;
            break;
        }
    }

    if stochastic.skipped() < params.rays {
        log::debug!("{} rays still bouncing at max depth", params.rays - stochastic.skipped());
    }

    let tree = paths.build_tree();
    let direct = image_source::direct_impulse(voxels, source, receiver, speed);
    let image_source = ctx.dispatch("image_source", || {
        image_source::find_reflected(&tree, voxels, source, receiver, speed)
    })?;
    let diffuse = stochastic.into_impulses();

    log::info!(
        "Found {} image-source and {} diffuse impulses",
        image_source.len(),
        diffuse.len()
    );

    Ok(progress.finish(
        Results {
            direct,
            image_source,
            diffuse,
        },
        finished,
    ))
}

/// [`run`] without cancellation or progress reporting.
pub fn run_to_completion(
    ctx: &ComputeContext,
    voxels: &VoxelisedScene,
    simulation: &SimulationParameters,
    params: &RaytracerParameters,
) -> RaytracerResult<Results> {
    let keep_going = AtomicBool::new(true);
    let outcome = run(ctx, voxels, simulation, params, &keep_going, |_| {
        ControlFlow::Continue(())
    })?;
    Ok(outcome.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use verb_core::{Completion, SceneData, Surface, Triangle};
    use verb_math::{Aabb, Vec3};

    fn room(absorption: f32, scattering: f32) -> VoxelisedScene {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 3.0, 6.0));
        VoxelisedScene::from_scene(
            SceneData::from_box(&aabb, Surface::uniform(absorption, scattering)),
            4,
        )
    }

    fn simulation(source: Vec3, receiver: Vec3) -> SimulationParameters {
        SimulationParameters {
            source,
            receiver,
            ..Default::default()
        }
    }

    fn params(rays: usize, max_depth: usize) -> RaytracerParameters {
        RaytracerParameters {
            rays,
            max_depth,
            receiver_radius: 0.2,
            seed: 17,
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_indices_have_no_gaps() {
        let voxels = room(0.1, 0.1);
        let ctx = ComputeContext::with_threads(2).unwrap();
        let centre = Vec3::new(2.0, 1.5, 3.0);
        let keep_going = AtomicBool::new(true);
        let mut seen = Vec::new();

        let outcome = run(
            &ctx,
            &voxels,
            &simulation(centre, centre),
            &params(500, 6),
            &keep_going,
            |i| {
                seen.push(i);
                ControlFlow::Continue(())
            },
        )
        .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(seen, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_image_source_times_match_closed_form() {
        let voxels = room(0.1, 0.0);
        let ctx = ComputeContext::new().unwrap();
        let source = Vec3::new(1.0, 2.0, 1.0);
        let receiver = Vec3::new(2.0, 1.0, 5.0);
        let results = run_to_completion(&ctx, &voxels, &simulation(source, receiver), &params(20_000, 3))
            .unwrap();

        let direct = results.direct.unwrap();
        assert!((direct.time - source.distance(receiver) / 340.0).abs() < 1e-6);

        // First-order images across each wall
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 3.0, 6.0));
        let first_order: Vec<f32> = verb_math::Axis::ALL
            .iter()
            .flat_map(|&axis| {
                let i = axis.index();
                let mut low = source;
                low[i] = aabb.min()[i] * 2.0 - source[i];
                let mut high = source;
                high[i] = aabb.max()[i] * 2.0 - source[i];
                [low, high]
            })
            .map(|image| image.distance(receiver) / 340.0)
            .collect();

        for t in first_order {
            assert!(
                results.image_source.iter().any(|i| (i.time - t).abs() < 1e-3),
                "missing first-order arrival at {t}"
            );
        }
        assert!(results.image_source.iter().all(Impulse::is_valid));
    }

    #[test]
    fn test_diffuse_energy_present() {
        let voxels = room(0.2, 0.5);
        let ctx = ComputeContext::with_threads(2).unwrap();
        let results = run_to_completion(
            &ctx,
            &voxels,
            &simulation(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 2.0, 4.0)),
            &params(2000, 4),
        )
        .unwrap();

        assert!(!results.diffuse.is_empty());
        assert!(results.diffuse.iter().all(Impulse::is_valid));

        let only_diffuse = results.impulses(Selection {
            direct: false,
            image_source: false,
            diffuse: true,
        });
        assert_eq!(only_diffuse.len(), results.diffuse.len());

        let options = OutputOptions {
            remove_direct: true,
            ..Default::default()
        };
        let selected = results.impulses(Selection::from(&options));
        assert_eq!(selected.len(), results.len() - 1);
    }

    #[test]
    fn test_cancel_returns_partial_results() {
        let voxels = room(0.1, 0.1);
        let ctx = ComputeContext::with_threads(2).unwrap();
        let keep_going = AtomicBool::new(true);

        let outcome = run(
            &ctx,
            &voxels,
            &simulation(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 2.0, 4.0)),
            &params(500, 8),
            &keep_going,
            |i| {
                if i == 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )
        .unwrap();

        assert_eq!(outcome.completion, Completion::Cancelled { steps_done: 2 });
        assert!(outcome.value.direct.is_some());
        assert!(!outcome.value.image_source.is_empty());

        keep_going.store(false, Ordering::Relaxed);
        let outcome = run(
            &ctx,
            &voxels,
            &simulation(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 2.0, 4.0)),
            &params(500, 8),
            &keep_going,
            |_| ControlFlow::Continue(()),
        )
        .unwrap();
        assert_eq!(outcome.completion, Completion::Cancelled { steps_done: 0 });
    }

    #[test]
    fn test_setup_errors() {
        let ctx = ComputeContext::with_threads(1).unwrap();
        let empty = VoxelisedScene::from_scene(SceneData::new(vec![], vec![], vec![]).unwrap(), 2);
        let sim = simulation(Vec3::ONE, Vec3::ONE);

        let err = run_to_completion(&ctx, &empty, &sim, &params(10, 2)).unwrap_err();
        assert!(matches!(err, RaytracerError::EmptyScene));

        // One triangle has no volume even though the voxel grid is padded
        let plane = SceneData::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Triangle::new([0, 1, 2], 0)],
            vec![Surface::uniform(0.1, 0.1)],
        )
        .unwrap();
        let flat = VoxelisedScene::from_scene(plane, 2);
        assert!(flat.aabb().dimensions().min_element() > 0.0);
        let err = run_to_completion(&ctx, &flat, &sim, &params(10, 2)).unwrap_err();
        assert!(matches!(err, RaytracerError::DegenerateBounds));

        let voxels = room(0.1, 0.1);
        let err = run_to_completion(&ctx, &voxels, &sim, &params(0, 2)).unwrap_err();
        assert!(matches!(err, RaytracerError::NoRays));

        let err = run_to_completion(&ctx, &voxels, &sim, &params(10, 0)).unwrap_err();
        assert!(matches!(err, RaytracerError::ZeroDepth));
    }
}
