//! Example: Geometric impulse response of a shoebox room.
//!
//! Run with: cargo run --example shoebox -p verb_raytracer -- [config.json]

use std::env;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use verb_core::postprocess::max_time;
use verb_core::{ComputeContext, SceneData, SimulationConfig, Surface};
use verb_math::{Aabb, Vec3};
use verb_raytracer::{run, Selection, VoxelisedScene};

fn main() -> Result<()> {
    env_logger::init();

    let mut config = match env::args().nth(1) {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };
    if config.simulation.source == config.simulation.receiver {
        config.simulation.source = Vec3::new(1.0, 1.5, 1.0);
        config.simulation.receiver = Vec3::new(3.0, 1.2, 4.5);
    }

    let room = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 3.0, 6.0));
    let scene = SceneData::from_box(&room, Surface::uniform(0.15, 0.1));
    let voxels = VoxelisedScene::from_scene(scene, config.raytracer.voxel_depth);
    let ctx = ComputeContext::new()?;

    println!(
        "Room {:?}, source {:?}, receiver {:?}",
        room.dimensions(),
        config.simulation.source,
        config.simulation.receiver
    );

    let keep_going = AtomicBool::new(true);
    let outcome = run(
        &ctx,
        &voxels,
        &config.simulation,
        &config.raytracer,
        &keep_going,
        |depth| {
            println!("  depth {depth} done");
            ControlFlow::Continue(())
        },
    )?;

    let results = outcome.value;
    println!("\n=== Results ===");
    println!("Direct: {:?}", results.direct.map(|d| d.time));
    println!("Image-source impulses: {}", results.image_source.len());
    println!("Diffuse impulses: {}", results.diffuse.len());

    let impulses = results.impulses(Selection::from(&config.output));
    let rate = config.simulation.output_sample_rate;
    let signal = config
        .output
        .apply(&impulses, rate, config.simulation.acoustic_impedance);
    println!(
        "Output: {} samples ({:.2}s, last arrival {:.3}s)",
        signal.len(),
        signal.len() as f32 / rate,
        max_time(&impulses)
    );

    Ok(())
}
