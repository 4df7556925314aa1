use verb_core::compute::ComputeResult;
use verb_core::{ComputeContext, DeviceBuffer, SceneData, Surface, Triangle};
use verb_math::{TriangleVerts, Vec3};

/// Scene geometry copied onto the compute device.
pub struct SceneBuffers {
    vertices: DeviceBuffer<Vec3>,
    triangles: DeviceBuffer<Triangle>,
    surfaces: DeviceBuffer<Surface>,
}

impl SceneBuffers {
    pub fn upload(ctx: &ComputeContext, scene: &SceneData) -> ComputeResult<Self> {
        Ok(Self {
            vertices: ctx.upload("vertices", scene.vertices())?,
            triangles: ctx.upload("triangles", scene.triangles())?,
            surfaces: ctx.upload("surfaces", scene.surfaces())?,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, index: u32) -> Option<&Triangle> {
        self.triangles.as_slice().get(index as usize)
    }

    /// Corners of triangle `index`, `None` when the index is out of range.
    pub fn triangle_verts(&self, index: u32) -> Option<TriangleVerts> {
        let tri = self.triangle(index)?;
        let v = self.vertices.as_slice();
        Some(TriangleVerts::new(
            v[tri.vertices[0] as usize],
            v[tri.vertices[1] as usize],
            v[tri.vertices[2] as usize],
        ))
    }

    /// Surface of triangle `index`, `None` when the index is out of range.
    pub fn surface(&self, index: u32) -> Option<&Surface> {
        let tri = self.triangle(index)?;
        self.surfaces.as_slice().get(tri.surface as usize)
    }
}
