//! Rectilinear mesh construction.
//!
//! Nodes sit on a regular lattice centred on the scene. Each node knows its
//! six neighbours (`-x, +x, -y, +y, -z, +z`), whether it is inside the
//! scene, and for inside nodes next to the geometry, which directions lead
//! out of the scene.

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;
use verb_core::{SimulationParameters, WaveguideParameters};
use verb_math::{IVec3, UVec3, Vec3};
use verb_raytracer::VoxelisedScene;

use crate::filters::{surface_coefficients, FilterCoefficients, FilterMemory};
use crate::{WaveguideError, WaveguideResult};

pub const PORTS: usize = 6;

/// Port value for a missing or outside neighbour.
pub const NO_NEIGHBOUR: i32 = -1;

/// `boundary_index` of nodes that have no boundary record.
pub const NO_BOUNDARY: u32 = u32::MAX;

/// Largest mesh that will be allocated.
pub const MAX_NODES: u64 = 1 << 27;

/// Lattice step of each port.
pub const DIRECTIONS: [IVec3; PORTS] = [
    IVec3::NEG_X,
    IVec3::X,
    IVec3::NEG_Y,
    IVec3::Y,
    IVec3::NEG_Z,
    IVec3::Z,
];

/// Bit set in `boundary_type` when `port` leads out of the scene.
pub const fn boundary_bit(port: usize) -> u32 {
    1 << port
}

/// Ports flagged in a boundary bitmask, in port order.
pub fn boundary_ports(boundary_type: u32) -> impl Iterator<Item = usize> {
    (0..PORTS).filter(move |&p| boundary_type & boundary_bit(p) != 0)
}

/// True when some axis is blocked in both directions.
pub fn has_opposing_faces(boundary_type: u32) -> bool {
    boundary_type & (boundary_type >> 1) & 0b01_0101 != 0
}

/// Lattice spacing for a mesh sampled at `sample_rate`, `c * sqrt(3) / fs`.
pub fn spacing_for(speed_of_sound: f32, sample_rate: f32) -> f32 {
    speed_of_sound * 3f32.sqrt() / sample_rate
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Node {
    /// Index of each neighbour, or [`NO_NEIGHBOUR`]
    pub ports: [i32; PORTS],
    pub position: Vec3,
    pub inside: u32,
    /// One [`boundary_bit`] per port that leads outside
    pub boundary_type: u32,
    /// Record index in the boundary array matching the number of set bits
    pub boundary_index: u32,
}

impl Node {
    pub fn is_inside(&self) -> bool {
        self.inside != 0
    }

    pub fn is_boundary(&self) -> bool {
        self.boundary_type != 0
    }

    /// Number of boundary directions.
    pub fn boundary_count(&self) -> usize {
        self.boundary_type.count_ones() as usize
    }

    pub fn neighbour(&self, port: usize) -> Option<usize> {
        let p = self.ports[port];
        (p != NO_NEIGHBOUR).then_some(p as usize)
    }
}

/// Filter state for one boundary direction of one node.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct BoundaryData {
    pub memory: FilterMemory,
    /// Index into the mesh's filter coefficient table
    pub coefficient_index: u32,
    padding: u32,
}

impl BoundaryData {
    pub fn new(coefficient_index: u32) -> Self {
        Self {
            memory: FilterMemory::default(),
            coefficient_index,
            padding: 0,
        }
    }
}

/// Shape and placement of the lattice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDescriptor {
    pub min_corner: Vec3,
    pub dimensions: UVec3,
    pub spacing: f32,
}

impl MeshDescriptor {
    /// Lattice covering `aabb` plus one spacing on each side, with a node
    /// on the box centre.
    pub fn new(aabb: &verb_math::Aabb, spacing: f32) -> Self {
        let padded = aabb.padded_by(spacing);
        let half_steps = (padded.dimensions() / (2.0 * spacing)).ceil();
        let dimensions = (half_steps * 2.0 + 1.0).as_uvec3();
        Self {
            min_corner: padded.centre() - half_steps * spacing,
            dimensions,
            spacing,
        }
    }

    /// Total node count without overflow, or `None` if it doesn't fit.
    pub fn node_count(&self) -> Option<u64> {
        (self.dimensions.x as u64)
            .checked_mul(self.dimensions.y as u64)?
            .checked_mul(self.dimensions.z as u64)
    }

    pub fn index(&self, locator: UVec3) -> usize {
        let d = self.dimensions;
        locator.x as usize + d.x as usize * (locator.y as usize + d.y as usize * locator.z as usize)
    }

    pub fn locator(&self, index: usize) -> UVec3 {
        let d = self.dimensions;
        let x = index % d.x as usize;
        let rest = index / d.x as usize;
        UVec3::new(x as u32, (rest % d.y as usize) as u32, (rest / d.y as usize) as u32)
    }

    pub fn position(&self, locator: UVec3) -> Vec3 {
        self.min_corner + locator.as_vec3() * self.spacing
    }

    /// Locator of the node nearest to `p`, clamped to the lattice.
    pub fn closest_locator(&self, p: Vec3) -> UVec3 {
        let max = (self.dimensions.as_ivec3() - 1).max(IVec3::ZERO);
        ((p - self.min_corner) / self.spacing)
            .round()
            .as_ivec3()
            .clamp(IVec3::ZERO, max)
            .as_uvec3()
    }

    pub fn neighbour(&self, locator: UVec3, port: usize) -> Option<UVec3> {
        let n = locator.as_ivec3() + DIRECTIONS[port];
        let on_lattice = n.cmpge(IVec3::ZERO).all() && n.cmplt(self.dimensions.as_ivec3()).all();
        on_lattice.then(|| n.as_uvec3())
    }
}

/// A classified lattice with boundary records ready for the solver.
#[derive(Debug, Clone)]
pub struct Mesh {
    descriptor: MeshDescriptor,
    sample_rate: f32,
    nodes: Vec<Node>,
    boundary_nodes: [Vec<u32>; 3],
    boundary_data: [Vec<BoundaryData>; 3],
    coefficients: Vec<FilterCoefficients>,
    inconsistent: usize,
}

impl Mesh {
    /// Build the mesh for a run described by `simulation` and `params`,
    /// designing one boundary filter per scene surface.
    pub fn for_scene(
        voxels: &VoxelisedScene,
        simulation: &SimulationParameters,
        params: &WaveguideParameters,
    ) -> WaveguideResult<Self> {
        simulation.validate()?;
        params.validate()?;
        let sample_rate = params.sampling_frequency();
        let coefficients = surface_coefficients(
            voxels.scene().surfaces(),
            sample_rate as f64,
            params.cutoff as f64,
        )?;
        Self::build(voxels, sample_rate, simulation.speed_of_sound, coefficients)
    }

    /// Lay a lattice over `voxels` and classify every node.
    ///
    /// `coefficients` holds one impedance filter per scene surface.
    pub fn build(
        voxels: &VoxelisedScene,
        sample_rate: f32,
        speed_of_sound: f32,
        coefficients: Vec<FilterCoefficients>,
    ) -> WaveguideResult<Self> {
        let scene = voxels.scene();
        match scene.aabb() {
            None => return Err(WaveguideError::EmptyScene),
            Some(bounds) if bounds.is_degenerate() => return Err(WaveguideError::DegenerateBounds),
            Some(_) => {}
        }
        if !(sample_rate > 0.0 && sample_rate.is_finite()) || !(speed_of_sound > 0.0) {
            return Err(WaveguideError::InvalidSampling(format!(
                "sample rate {sample_rate} and speed of sound {speed_of_sound} must be positive"
            )));
        }
        if coefficients.len() != scene.surfaces().len() {
            return Err(WaveguideError::InvalidFilter(format!(
                "{} filters for {} surfaces",
                coefficients.len(),
                scene.surfaces().len()
            )));
        }

        let spacing = spacing_for(speed_of_sound, sample_rate);
        let descriptor = MeshDescriptor::new(voxels.aabb(), spacing);
        let count = descriptor
            .node_count()
            .filter(|&n| n <= MAX_NODES)
            .ok_or(WaveguideError::MeshTooLarge {
                dimensions: descriptor.dimensions,
                limit: MAX_NODES,
            })? as usize;

        log::info!(
            "Building waveguide mesh: {:?} nodes, spacing {:.4}m",
            descriptor.dimensions,
            spacing
        );

        let nodes = classify(voxels, &descriptor, count);
        let mut mesh = Self {
            descriptor,
            sample_rate,
            nodes,
            boundary_nodes: Default::default(),
            boundary_data: Default::default(),
            coefficients,
            inconsistent: 0,
        };
        mesh.assign_boundaries(voxels);

        log::info!(
            "Mesh built: {} inside, boundaries {}/{}/{} (face/edge/corner)",
            mesh.inside_count(),
            mesh.boundary_nodes[0].len(),
            mesh.boundary_nodes[1].len(),
            mesh.boundary_nodes[2].len()
        );
        if mesh.inconsistent > 0 {
            log::warn!(
                "{} boundary nodes have opposing walls and will be held at zero",
                mesh.inconsistent
            );
        }
        Ok(mesh)
    }

    /// Give every consistent boundary node a record in the array matching
    /// its boundary count, with the surface of the nearest triangle in each
    /// outward direction.
    fn assign_boundaries(&mut self, voxels: &VoxelisedScene) {
        let scene = voxels.scene();
        let half = self.descriptor.spacing * 0.5;

        let candidates: Vec<(usize, Vec<u32>)> = self
            .nodes
            .par_iter()
            .enumerate()
            .filter(|(_, node)| node.is_boundary() && !has_opposing_faces(node.boundary_type))
            .map(|(i, node)| {
                let surfaces = boundary_ports(node.boundary_type)
                    .map(|port| {
                        let probe = node.position + DIRECTIONS[port].as_vec3() * half;
                        voxels
                            .closest_triangle(probe)
                            .map_or(0, |tri| scene.triangles()[tri as usize].surface)
                    })
                    .collect();
                (i, surfaces)
            })
            .collect();

        for (i, surfaces) in candidates {
            let slot = surfaces.len() - 1;
            let node = &mut self.nodes[i];
            node.boundary_index = self.boundary_nodes[slot].len() as u32;
            self.boundary_nodes[slot].push(i as u32);
            self.boundary_data[slot].extend(surfaces.into_iter().map(BoundaryData::new));
        }

        self.inconsistent = self
            .nodes
            .iter()
            .filter(|n| n.is_boundary() && has_opposing_faces(n.boundary_type))
            .count();
    }

    pub fn descriptor(&self) -> &MeshDescriptor {
        &self.descriptor
    }

    pub fn spacing(&self) -> f32 {
        self.descriptor.spacing
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn inside_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_inside()).count()
    }

    /// Indices of nodes with `boundaries` (1 to 3) outward directions.
    pub fn boundary_nodes(&self, boundaries: usize) -> &[u32] {
        &self.boundary_nodes[boundaries - 1]
    }

    /// Initial records for nodes with `boundaries` outward directions,
    /// `boundaries` consecutive entries per node.
    pub fn boundary_data(&self, boundaries: usize) -> &[BoundaryData] {
        &self.boundary_data[boundaries - 1]
    }

    pub fn coefficients(&self) -> &[FilterCoefficients] {
        &self.coefficients
    }

    /// Boundary nodes with walls on both sides of some axis.
    pub fn inconsistent_count(&self) -> usize {
        self.inconsistent
    }

    /// Index of the inside node nearest to `p`, if the nearest node is inside.
    pub fn inside_node_near(&self, p: Vec3) -> Option<usize> {
        let index = self.descriptor.index(self.descriptor.closest_locator(p));
        self.nodes[index].is_inside().then_some(index)
    }
}

/// Positions, inside flags, ports and boundary masks for every node.
fn classify(voxels: &VoxelisedScene, descriptor: &MeshDescriptor, count: usize) -> Vec<Node> {
    let raw: Vec<Node> = (0..count)
        .into_par_iter()
        .map(|i| {
            let locator = descriptor.locator(i);
            let position = descriptor.position(locator);
            let mut ports = [NO_NEIGHBOUR; PORTS];
            for (port, slot) in ports.iter_mut().enumerate() {
                if let Some(n) = descriptor.neighbour(locator, port) {
                    *slot = descriptor.index(n) as i32;
                }
            }
            Node {
                ports,
                position,
                inside: voxels.inside(position) as u32,
                boundary_type: 0,
                boundary_index: NO_BOUNDARY,
            }
        })
        .collect();

    raw.par_iter()
        .map(|node| {
            let mut out = *node;
            if !node.is_inside() {
                out.ports = [NO_NEIGHBOUR; PORTS];
                return out;
            }
            for port in 0..PORTS {
                let open = node.neighbour(port).is_some_and(|n| raw[n].is_inside());
                if !open {
                    out.ports[port] = NO_NEIGHBOUR;
                    out.boundary_type |= boundary_bit(port);
                }
            }
            out
        })
        .collect()
}
