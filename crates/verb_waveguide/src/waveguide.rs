//! Time stepping of the rectilinear mesh.
//!
//! Each step runs two dispatches: every node's next pressure is computed
//! from the current and previous fields, then the boundary filters are fed
//! the new values. The three pressure buffers are then rotated.

use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;

use rayon::prelude::*;
use verb_core::compute::ComputeResult;
use verb_core::progress::Progress;
use verb_core::{
    ComputeContext, ComputeError, DeviceBuffer, Outcome, PowerFunction, SimulationParameters,
    WaveguideParameters, AMBIENT_DENSITY,
};
use verb_math::Vec3;
use verb_raytracer::VoxelisedScene;

use crate::filters::{filter_step, FilterCoefficients};
use crate::mesh::{boundary_ports, BoundaryData, Mesh, Node, DIRECTIONS, NO_BOUNDARY, PORTS};
use crate::{WaveguideError, WaveguideResult};

/// Courant number of the rectilinear scheme, `1 / sqrt(3)`.
pub const COURANT: f64 = 0.577_350_269_189_625_8;

/// What the receiver node saw in one step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepResult {
    pub pressure: f32,
    pub velocity: Vec3,
    /// Acoustic intensity `pressure * velocity`
    pub intensity: Vec3,
}

/// How the source drives the mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Excitation {
    /// Initial pressure field around the source
    pub initial: Option<PowerFunction>,
    /// Samples added to the source node, one per step
    pub signal: Vec<f32>,
}

impl Excitation {
    /// Unit pressure at the source node only.
    pub fn impulse() -> Self {
        Self {
            initial: Some(PowerFunction::Basic),
            signal: Vec::new(),
        }
    }

    /// Soft source fed with `signal`.
    pub fn signal(signal: Vec<f32>) -> Self {
        Self {
            initial: None,
            signal,
        }
    }
}

/// Next pressure of a node with no boundary directions.
///
/// `current` is indexed by the node's ports; missing ports contribute
/// nothing.
pub fn interior_update(current: &[f32], previous: f32, ports: &[i32; PORTS]) -> f32 {
    let sum: f32 = ports
        .iter()
        .filter(|&&p| p >= 0)
        .map(|&p| current[p as usize])
        .sum();
    sum / (PORTS / 2) as f32 - previous
}

fn neighbour_pressure(node: &Node, port: usize, current: &[f32]) -> f64 {
    node.neighbour(port).map_or(0.0, |n| current[n] as f64)
}

/// Next pressure of a face, edge or corner node.
///
/// `data` holds one record per boundary direction, in port order.
fn boundary_update(
    node: &Node,
    pressure: f32,
    previous: f32,
    current: &[f32],
    data: &[BoundaryData],
    coefficients: &[FilterCoefficients],
) -> f64 {
    let l2 = COURANT * COURANT;
    let mut constrained = [false; 3];
    let mut inner = 0.0;
    let mut beta = 0.0;
    let mut filtered = 0.0;

    for (record, port) in data.iter().zip(boundary_ports(node.boundary_type)) {
        constrained[port / 2] = true;
        inner += 2.0 * neighbour_pressure(node, port ^ 1, current);
        let c = &coefficients[record.coefficient_index as usize];
        beta += c.a[0] / c.b[0];
        filtered += record.memory.array[0] / c.b[0];
    }

    let tangential: f64 = (0..PORTS)
        .filter(|port| !constrained[port / 2])
        .map(|port| neighbour_pressure(node, port, current))
        .sum();

    let p = pressure as f64;
    let prev = previous as f64;
    let numerator = l2 * (inner + tangential)
        + 2.0 * (1.0 - 3.0 * l2) * p
        + l2 * filtered
        + (COURANT * beta - 1.0) * prev;
    numerator / (1.0 + COURANT * beta)
}

/// Feed one boundary node's filters with the freshly computed pressure.
fn update_filters(
    node: &Node,
    previous: f32,
    next: f32,
    current: &[f32],
    data: &mut [BoundaryData],
    coefficients: &[FilterCoefficients],
) {
    for (record, port) in data.iter_mut().zip(boundary_ports(node.boundary_type)) {
        let c = &coefficients[record.coefficient_index as usize];
        let inner = neighbour_pressure(node, port ^ 1, current);
        let ghost = inner
            + c.a[0] * (previous as f64 - next as f64) / (c.b[0] * COURANT)
            + record.memory.array[0] / c.b[0];
        filter_step(inner - ghost, &mut record.memory, c);
    }
}

/// Boundary records for a node, or `None` if it has none.
fn records<'a>(
    node: &Node,
    boundaries: &'a [DeviceBuffer<BoundaryData>; 3],
) -> Option<&'a [BoundaryData]> {
    let count = node.boundary_count();
    if node.boundary_index == NO_BOUNDARY || !(1..=3).contains(&count) {
        return None;
    }
    let start = node.boundary_index as usize * count;
    boundaries[count - 1].as_slice().get(start..start + count)
}

/// Solver state for one run over a [`Mesh`].
pub struct Waveguide<'a> {
    mesh: &'a Mesh,
    previous: DeviceBuffer<f32>,
    current: DeviceBuffer<f32>,
    next: DeviceBuffer<f32>,
    boundaries: [DeviceBuffer<BoundaryData>; 3],
    coefficients: DeviceBuffer<FilterCoefficients>,
    source: usize,
    receiver: usize,
    signal: Vec<f32>,
    velocity: Vec3,
    steps: usize,
}

impl<'a> Waveguide<'a> {
    /// Upload the mesh state and apply the initial excitation.
    pub fn new(
        ctx: &ComputeContext,
        mesh: &'a Mesh,
        source: Vec3,
        receiver: Vec3,
        excitation: Excitation,
    ) -> WaveguideResult<Self> {
        let source_node = mesh
            .inside_node_near(source)
            .ok_or(WaveguideError::NotInside {
                what: "source",
                position: source,
            })?;
        let receiver_node = mesh
            .inside_node_near(receiver)
            .ok_or(WaveguideError::NotInside {
                what: "receiver",
                position: receiver,
            })?;

        check_coefficients(mesh)?;

        let len = mesh.nodes().len();
        let mut current = ctx.zeroed::<f32>("current", len)?;
        if let Some(function) = excitation.initial {
            let centre = mesh.nodes()[source_node].position;
            let spacing = mesh.spacing();
            let field: Vec<f32> = mesh
                .nodes()
                .par_iter()
                .map(|n| {
                    if n.is_inside() {
                        function.evaluate(n.position, centre, spacing)
                    } else {
                        0.0
                    }
                })
                .collect();
            current.write(&field)?;
        }

        Ok(Self {
            mesh,
            previous: ctx.zeroed("previous", len)?,
            current,
            next: ctx.zeroed("next", len)?,
            boundaries: [
                ctx.upload("boundary_1", mesh.boundary_data(1))?,
                ctx.upload("boundary_2", mesh.boundary_data(2))?,
                ctx.upload("boundary_3", mesh.boundary_data(3))?,
            ],
            coefficients: ctx.upload("coefficients", mesh.coefficients())?,
            source: source_node,
            receiver: receiver_node,
            signal: excitation.signal,
            velocity: Vec3::ZERO,
            steps: 0,
        })
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Current pressure field.
    pub fn pressure(&self) -> &[f32] {
        self.current.as_slice()
    }

    pub fn receiver_node(&self) -> usize {
        self.receiver
    }

    pub fn source_node(&self) -> usize {
        self.source
    }

    /// Advance the whole mesh by one sample.
    pub fn step(&mut self, ctx: &ComputeContext) -> ComputeResult<StepResult> {
        let mesh = self.mesh;
        let nodes = mesh.nodes();
        let current = self.current.as_slice();
        let previous = self.previous.as_slice();
        let boundaries = &self.boundaries;
        let coefficients = self.coefficients.as_slice();
        let next = self.next.as_mut_slice();

        ctx.dispatch("waveguide_pressure", || {
            next.par_iter_mut().enumerate().for_each(|(i, out)| {
                let node = &nodes[i];
                *out = if !node.is_inside() {
                    0.0
                } else if !node.is_boundary() {
                    interior_update(current, previous[i], &node.ports)
                } else {
                    match records(node, boundaries) {
                        Some(data) => boundary_update(
                            node,
                            current[i],
                            previous[i],
                            current,
                            data,
                            coefficients,
                        ) as f32,
                        // Opposing walls
                        None => 0.0,
                    }
                };
            })
        })?;

        if let Some(&s) = self.signal.get(self.steps) {
            next[self.source] += s;
        }

        let next = self.next.as_slice();
        let boundaries = &mut self.boundaries;
        ctx.dispatch("waveguide_filters", || {
            for (slot, buffer) in boundaries.iter_mut().enumerate() {
                let count = slot + 1;
                let owners = mesh.boundary_nodes(count);
                buffer
                    .as_mut_slice()
                    .par_chunks_mut(count)
                    .zip(owners.par_iter())
                    .for_each(|(data, &owner)| {
                        let i = owner as usize;
                        update_filters(
                            &nodes[i],
                            previous[i],
                            next[i],
                            current,
                            data,
                            coefficients,
                        );
                    });
            }
        })?;

        std::mem::swap(&mut self.previous, &mut self.current);
        std::mem::swap(&mut self.current, &mut self.next);
        self.steps += 1;

        Ok(self.read_receiver())
    }

    /// Pressure at the receiver plus particle velocity integrated from the
    /// local pressure gradient.
    fn read_receiver(&mut self) -> StepResult {
        let field = self.current.as_slice();
        let node = &self.mesh.nodes()[self.receiver];
        let pressure = field[self.receiver];
        let spacing = self.mesh.spacing();

        let mut gradient = Vec3::ZERO;
        for (port, direction) in DIRECTIONS.iter().enumerate() {
            if let Some(n) = node.neighbour(port) {
                let difference = (field[n] - pressure) / spacing;
                gradient += direction.as_vec3() * 0.5 * difference;
            }
        }

        let period = 1.0 / self.mesh.sample_rate();
        self.velocity += gradient / -AMBIENT_DENSITY * period;

        StepResult {
            pressure,
            velocity: self.velocity,
            intensity: self.velocity * pressure,
        }
    }
}

/// Every filter must be usable and every record must name one.
fn check_coefficients(mesh: &Mesh) -> WaveguideResult<()> {
    let table = mesh.coefficients();
    if let Some(bad) = table.iter().position(|c| !c.is_valid()) {
        return Err(ComputeError::KernelBuild {
            kernel: "waveguide".to_string(),
            reason: format!("filter {bad} has invalid coefficients"),
        }
        .into());
    }
    for count in 1..=3 {
        if let Some(record) = mesh
            .boundary_data(count)
            .iter()
            .find(|r| r.coefficient_index as usize >= table.len())
        {
            return Err(ComputeError::KernelBuild {
                kernel: "waveguide".to_string(),
                reason: format!(
                    "coefficient index {} out of range for {} filters",
                    record.coefficient_index,
                    table.len()
                ),
            }
            .into());
        }
    }
    Ok(())
}

/// Run the mesh for `steps` samples and record the receiver.
///
/// `callback` is called after every step with indices 0, 1, 2...
/// Returning `Break`, or clearing `keep_going`, stops the run; the samples
/// recorded so far come back with [`verb_core::Completion::Cancelled`].
#[allow(clippy::too_many_arguments)]
pub fn run<F>(
    ctx: &ComputeContext,
    mesh: &Mesh,
    source: Vec3,
    receiver: Vec3,
    excitation: Excitation,
    steps: usize,
    keep_going: &AtomicBool,
    callback: F,
) -> WaveguideResult<Outcome<Vec<StepResult>>>
where
    F: FnMut(usize) -> ControlFlow<()>,
{
    let mut waveguide = Waveguide::new(ctx, mesh, source, receiver, excitation)?;
    log::info!(
        "Running waveguide: {} steps at {:.0} Hz over {} nodes",
        steps,
        mesh.sample_rate(),
        mesh.nodes().len()
    );

    let mut progress = Progress::new(keep_going, callback);
    let mut results = Vec::with_capacity(steps);
    let mut finished = true;
    for i in 0..steps {
        if !progress.should_continue() {
            finished = false;
            break;
        }
        results.push(waveguide.step(ctx)?);
        if !progress.step() && i + 1 < steps {
            finished = false;
            break;
        }
    }

    log::debug!("Waveguide finished after {} steps", waveguide.steps());
    Ok(progress.finish(results, finished))
}

/// Build a mesh for the scene and run it from the configured source to
/// the configured receiver.
#[allow(clippy::too_many_arguments)]
pub fn simulate<F>(
    ctx: &ComputeContext,
    voxels: &VoxelisedScene,
    simulation: &SimulationParameters,
    params: &WaveguideParameters,
    excitation: Excitation,
    steps: usize,
    keep_going: &AtomicBool,
    callback: F,
) -> WaveguideResult<Outcome<Vec<StepResult>>>
where
    F: FnMut(usize) -> ControlFlow<()>,
{
    let mesh = Mesh::for_scene(voxels, simulation, params)?;
    run(
        ctx,
        &mesh,
        simulation.source,
        simulation.receiver,
        excitation,
        steps,
        keep_going,
        callback,
    )
}
