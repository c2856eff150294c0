//! Mesh and vertex definitions

use bytemuck::{Pod, Zeroable};

use super::{BufferId, GpuDevice, GpuError, VertexLayout};

/// Vertex with position and UV coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }
}

/// Clip-space positions of one triangle that covers the whole viewport
pub const FULLSCREEN_TRIANGLE: [f32; 6] = [-1.0, -1.0, 3.0, -1.0, -1.0, 3.0];

/// Vertex data uploaded to the GPU
#[derive(Debug)]
pub struct Mesh {
    buffer: BufferId,
    layout: VertexLayout,
    vertex_count: usize,
}

impl Mesh {
    /// Upload a triangle list
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be created
    pub fn from_vertices(gpu: &mut dyn GpuDevice, vertices: &[Vertex]) -> Result<Self, GpuError> {
        let data: &[f32] = bytemuck::cast_slice(vertices);
        let buffer = gpu.create_vertex_buffer(VertexLayout::Position3Uv, data)?;
        Ok(Self {
            buffer,
            layout: VertexLayout::Position3Uv,
            vertex_count: vertices.len(),
        })
    }

    /// Unit quad centred on the origin in the XY plane
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be created
    pub fn quad(gpu: &mut dyn GpuDevice) -> Result<Self, GpuError> {
        let vertices = [
            Vertex::new([-0.5, -0.5, 0.0], [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0], [1.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.0], [1.0, 0.0]),
            Vertex::new([-0.5, -0.5, 0.0], [0.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.0], [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.0], [0.0, 0.0]),
        ];
        Self::from_vertices(gpu, &vertices)
    }

    /// Position-only oversized triangle for full-screen passes
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be created
    pub fn fullscreen_triangle(gpu: &mut dyn GpuDevice) -> Result<Self, GpuError> {
        let buffer = gpu.create_vertex_buffer(VertexLayout::Position2, &FULLSCREEN_TRIANGLE)?;
        Ok(Self {
            buffer,
            layout: VertexLayout::Position2,
            vertex_count: 3,
        })
    }

    #[must_use]
    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    #[must_use]
    #[inline]
    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    #[must_use]
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn draw(&self, gpu: &mut dyn GpuDevice) {
        gpu.draw(self.buffer);
    }

    pub fn release(&self, gpu: &mut dyn GpuDevice) {
        gpu.destroy_vertex_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{GpuCommand, HeadlessDevice};

    #[test]
    fn test_quad_uploads_six_vertices() {
        let mut gpu = HeadlessDevice::new();
        let quad = Mesh::quad(&mut gpu).unwrap();
        assert_eq!(quad.vertex_count(), 6);
        assert_eq!(
            gpu.commands(),
            &[GpuCommand::CreateVertexBuffer {
                id: quad.buffer(),
                layout: VertexLayout::Position3Uv,
                vertices: 6
            }]
        );
    }

    #[test]
    fn test_fullscreen_triangle_covers_ndc() {
        // Every corner of the [-1, 1] square lies inside the triangle
        let [ax, ay, bx, by, cx, cy] = FULLSCREEN_TRIANGLE;
        let edge = |px: f32, py: f32, qx: f32, qy: f32, x: f32, y: f32| {
            (qx - px) * (y - py) - (qy - py) * (x - px)
        };
        for (x, y) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            assert!(edge(ax, ay, bx, by, x, y) >= 0.0);
            assert!(edge(bx, by, cx, cy, x, y) >= 0.0);
            assert!(edge(cx, cy, ax, ay, x, y) >= 0.0);
        }
    }
}
