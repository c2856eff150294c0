//! Full-screen post-processing pass

use std::any::Any;

use super::{
    GpuDevice, GpuError, Mesh, PassContext, PassCore, PassDescription, RenderPass, Shader,
};

/// Samples its input textures through a fragment shader over one
/// full-screen triangle.
///
/// `params` is uploaded as `u_Params`; what it means is up to the shader.
#[derive(Debug)]
pub struct PostProcessingPass {
    core: PassCore,
    triangle: Mesh,
    params: [f32; 4],
}

impl PostProcessingPass {
    pub const KIND: &'static str = "postprocess";

    /// A pass with `inputs` texture slots (at least one)
    ///
    /// # Errors
    ///
    /// Returns an error if the framebuffer or triangle cannot be created
    pub fn new(
        gpu: &mut dyn GpuDevice,
        name: impl Into<String>,
        shader: Shader,
        inputs: usize,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let core = PassCore::new(gpu, name, shader, inputs.max(1), width, height)?;
        let triangle = Mesh::fullscreen_triangle(gpu)?;
        Ok(Self {
            core,
            triangle,
            params: [0.0; 4],
        })
    }

    #[must_use]
    pub fn with_params(mut self, params: [f32; 4]) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn params(&self) -> [f32; 4] {
        self.params
    }

    pub fn set_params(&mut self, params: [f32; 4]) {
        self.params = params;
    }
}

impl RenderPass for PostProcessingPass {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) {
        let shader = self.core.shader();
        shader.set_vec4(ctx.gpu, "u_Params", self.params);
        shader.set_float(ctx.gpu, "u_Time", ctx.time);
        self.triangle.draw(ctx.gpu);
    }

    fn describe(&self) -> PassDescription {
        PassDescription {
            params: self.params.to_vec(),
            ..PassDescription::from_core(Self::KIND, &self.core)
        }
    }

    fn release(&self, gpu: &mut dyn GpuDevice) {
        self.triangle.release(gpu);
        self.core.release(gpu);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IdAllocator;
    use crate::renderer::{
        Camera, DrawState, GpuCommand, HeadlessDevice, ShaderLibrary, VertexLayout,
    };
    use crate::scene::Scene;

    #[test]
    fn test_draws_single_fullscreen_triangle() {
        let mut gpu = HeadlessDevice::new();
        let shaders = ShaderLibrary::with_builtins(&mut gpu).unwrap();
        let mut pass =
            PostProcessingPass::new(&mut gpu, "vignette", shaders.get("vignette").unwrap(), 1, 8, 8)
                .unwrap()
                .with_params([0.5, 0.3, 0.0, 0.0]);
        assert!(gpu.commands().contains(&GpuCommand::CreateVertexBuffer {
            id: pass.triangle.buffer(),
            layout: VertexLayout::Position2,
            vertices: 3
        }));
        gpu.take_commands();

        let camera = Camera::new();
        let scene = Scene::new("Empty", &mut IdAllocator::new());
        pass.core_mut().set_input_texture(0, 5);
        let mut ctx = PassContext {
            gpu: &mut gpu,
            camera: &camera,
            scene: &scene,
            time: 2.0,
        };
        pass.execute(&mut ctx).unwrap();

        let draws: Vec<_> = gpu
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw { .. }))
            .collect();
        assert_eq!(draws.len(), 1);
        assert!(gpu.commands().contains(&GpuCommand::BindTexture {
            unit: 0,
            texture: 5
        }));
        assert_eq!(pass.describe().params, vec![0.5, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn test_blends_and_depth_tests_like_every_pass() {
        let mut gpu = HeadlessDevice::new();
        let shaders = ShaderLibrary::with_builtins(&mut gpu).unwrap();
        let mut pass =
            PostProcessingPass::new(&mut gpu, "composite", shaders.get("composite").unwrap(), 2, 8, 8)
                .unwrap();
        assert_eq!(pass.core().draw_state(), DrawState::default());
        assert!(pass.core().draw_state().blend);
        assert!(pass.core().draw_state().depth_test);

        gpu.take_commands();
        pass.core_mut().bind_and_prepare(&mut gpu).unwrap();
        assert!(gpu
            .commands()
            .contains(&GpuCommand::DrawState(DrawState::default())));
    }

    #[test]
    fn test_at_least_one_input() {
        let mut gpu = HeadlessDevice::new();
        let shaders = ShaderLibrary::with_builtins(&mut gpu).unwrap();
        let pass =
            PostProcessingPass::new(&mut gpu, "blit", shaders.get("blit").unwrap(), 0, 8, 8).unwrap();
        assert_eq!(pass.core().input_count(), 1);
    }
}
