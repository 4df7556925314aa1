//! Example: Low-frequency impulse response of a shoebox room.
//!
//! Run with: cargo run --example shoebox_waveguide -p verb_waveguide -- [config.json]

use std::env;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use verb_core::{ComputeContext, SceneData, SimulationConfig, Surface};
use verb_math::{Aabb, Vec3};
use verb_raytracer::VoxelisedScene;
use verb_waveguide::{run, Excitation, Mesh, Microphone};

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

    let mesh = Mesh::for_scene(&voxels, &config.simulation, &config.waveguide)?;
    println!(
        "Mesh {:?} at {:.0} Hz, spacing {:.3}m",
        mesh.descriptor().dimensions,
        mesh.sample_rate(),
        mesh.spacing()
    );

    let steps = (mesh.sample_rate() * 0.5) as usize;
    let keep_going = AtomicBool::new(true);
    let outcome = run(
        &ctx,
        &mesh,
        config.simulation.source,
        config.simulation.receiver,
        Excitation::impulse(),
        steps,
        &keep_going,
        |step| {
            if step % 500 == 0 {
                println!("  step {step}/{steps}");
            }
            ControlFlow::Continue(())
        },
    )?;

    let mic = Microphone::cardioid(config.simulation.source - config.simulation.receiver);
    let signal = mic.process(&outcome.value);
    let peak = signal.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    println!("\n=== Results ===");
    println!("Samples: {}", signal.len());
    println!("Peak cardioid output: {peak:.5}");

    Ok(())
}
