//! Per-pass draw submission handed to components

use super::{GpuDevice, Mesh, Shader};
use crate::core::ALL_LAYERS;
use crate::math::Matrix4;

/// Draw context for one geometry pass.
///
/// The scene calls [`RenderFrame::begin_entity`] before handing the frame to
/// an entity's components, so `model()` is that entity's world matrix and
/// `is_visible()` tests its layer against the pass's mask.
pub struct RenderFrame<'a> {
    gpu: &'a mut dyn GpuDevice,
    shader: &'a Shader,
    quad: &'a Mesh,
    view_projection: Matrix4,
    layer_mask: u32,
    model: Matrix4,
    entity_layer: u32,
    draw_calls: u32,
}

impl<'a> RenderFrame<'a> {
    pub fn new(
        gpu: &'a mut dyn GpuDevice,
        shader: &'a Shader,
        quad: &'a Mesh,
        view_projection: Matrix4,
        layer_mask: u32,
    ) -> Self {
        Self {
            gpu,
            shader,
            quad,
            view_projection,
            layer_mask,
            model: Matrix4::IDENTITY,
            entity_layer: ALL_LAYERS,
            draw_calls: 0,
        }
    }

    /// Switch to the next entity
    pub fn begin_entity(&mut self, world: Matrix4, layer: u32) {
        self.model = world;
        self.entity_layer = layer;
    }

    /// World matrix of the current entity
    #[must_use]
    #[inline]
    pub fn model(&self) -> Matrix4 {
        self.model
    }

    #[must_use]
    #[inline]
    pub fn view_projection(&self) -> Matrix4 {
        self.view_projection
    }

    #[must_use]
    #[inline]
    pub fn layer_mask(&self) -> u32 {
        self.layer_mask
    }

    /// Whether the current entity's layer passes the pass's mask
    #[must_use]
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.layer_mask & self.entity_layer != 0
    }

    /// Draw the unit quad with a model matrix and flat colour
    pub fn draw_quad(&mut self, model: &Matrix4, color: [f32; 4]) {
        let quad = self.quad;
        self.draw_mesh(quad, model, color);
    }

    pub fn draw_mesh(&mut self, mesh: &Mesh, model: &Matrix4, color: [f32; 4]) {
        self.shader.set_mat4(self.gpu, "u_Model", model);
        self.shader.set_vec4(self.gpu, "u_Color", color);
        mesh.draw(self.gpu);
        self.draw_calls += 1;
    }

    /// Draws submitted through this frame
    #[must_use]
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    /// Raw device access for custom draws
    pub fn gpu(&mut self) -> &mut dyn GpuDevice {
        self.gpu
    }
}
