//! Scene geometry pass

use std::any::Any;

use super::{
    DrawState, GpuDevice, GpuError, Mesh, PassContext, PassCore, PassDescription, RenderFrame,
    RenderPass, Shader,
};

/// Draws the scene's components into the pass framebuffer.
///
/// Depth writes are off so translucent sprites blend over each other in
/// traversal order. Entities whose layer is not in the pass's mask are
/// skipped by their components.
#[derive(Debug)]
pub struct GeometryPass {
    core: PassCore,
    quad: Mesh,
    /// Also run the scene's debug draws
    debug: bool,
}

impl GeometryPass {
    pub const KIND: &'static str = "geometry";

    /// # Errors
    ///
    /// Returns an error if the framebuffer or quad mesh cannot be created
    pub fn new(
        gpu: &mut dyn GpuDevice,
        name: impl Into<String>,
        shader: Shader,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let mut core = PassCore::new(gpu, name, shader, 0, width, height)?;
        core.set_draw_state(DrawState {
            blend: true,
            depth_test: true,
            depth_write: false,
        });
        let quad = Mesh::quad(gpu)?;
        Ok(Self {
            core,
            quad,
            debug: false,
        })
    }

    #[must_use]
    pub fn with_layer_mask(mut self, mask: u32) -> Self {
        self.core.set_layer_mask(mask);
        self
    }

    #[must_use]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.core.set_clear_color(color);
        self
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }
}

impl RenderPass for GeometryPass {
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
        let view_projection = ctx.camera.view_projection_matrix();
        shader.set_mat4(ctx.gpu, "u_ViewProjection", &view_projection);
        shader.set_float(ctx.gpu, "u_Time", ctx.time);

        ctx.scene.update_matrices();
        let mut frame = RenderFrame::new(
            ctx.gpu,
            shader,
            &self.quad,
            view_projection,
            self.core.layer_mask(),
        );
        ctx.scene.render(&mut frame);
        if self.debug {
            ctx.scene.debug_render(&mut frame);
        }
    }

    fn describe(&self) -> PassDescription {
        PassDescription {
            debug: self.debug,
            ..PassDescription::from_core(Self::KIND, &self.core)
        }
    }

    fn release(&self, gpu: &mut dyn GpuDevice) {
        self.quad.release(gpu);
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
    use crate::math::Vector3;
    use crate::renderer::{Camera, GpuCommand, HeadlessDevice, ShaderLibrary, UniformValue};
    use crate::scene::{Scene, SpriteRenderer};

    fn colors(commands: &[GpuCommand]) -> Vec<[f32; 4]> {
        commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::SetUniform {
                    name,
                    value: UniformValue::Vec4(color),
                } if name == "u_Color" => Some(*color),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_layer_mask_filters_entities() {
        let mut gpu = HeadlessDevice::new();
        let shaders = ShaderLibrary::with_builtins(&mut gpu).unwrap();
        let mut ids = IdAllocator::new();
        let mut scene = Scene::new("Test", &mut ids);

        let red = [1.0, 0.0, 0.0, 1.0];
        let blue = [0.0, 0.0, 1.0, 1.0];
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        scene.add_component(a, SpriteRenderer::new(red)).unwrap();
        let b = scene.spawn(&mut ids, "B", scene.root()).unwrap();
        scene.object_mut(b).unwrap().set_layer(0b10);
        scene.add_component(b, SpriteRenderer::new(blue)).unwrap();

        let mut pass = GeometryPass::new(&mut gpu, "main", shaders.get("sprite").unwrap(), 16, 16)
            .unwrap()
            .with_layer_mask(0b10);
        gpu.take_commands();

        let camera = Camera::orthographic(10.0);
        let mut ctx = PassContext {
            gpu: &mut gpu,
            camera: &camera,
            scene: &scene,
            time: 0.0,
        };
        pass.execute(&mut ctx).unwrap();

        assert_eq!(colors(gpu.commands()), vec![blue]);
        assert_eq!(gpu.draw_targets(), vec![pass.core().framebuffer().id()]);
    }

    #[test]
    fn test_sprite_model_uses_world_matrix() {
        let mut gpu = HeadlessDevice::new();
        let shaders = ShaderLibrary::with_builtins(&mut gpu).unwrap();
        let mut ids = IdAllocator::new();
        let mut scene = Scene::new("Test", &mut ids);

        let parent = scene.spawn(&mut ids, "Parent", scene.root()).unwrap();
        scene.set_local_position(parent, Vector3::new(1.0, 0.0, 0.0)).unwrap();
        let child = scene.spawn(&mut ids, "Child", parent).unwrap();
        scene.set_local_position(child, Vector3::new(0.0, 1.0, 0.0)).unwrap();
        scene
            .add_component(child, SpriteRenderer::default().with_size(2.0, 2.0))
            .unwrap();

        let mut pass =
            GeometryPass::new(&mut gpu, "main", shaders.get("sprite").unwrap(), 16, 16).unwrap();
        let camera = Camera::orthographic(10.0);
        let mut ctx = PassContext {
            gpu: &mut gpu,
            camera: &camera,
            scene: &scene,
            time: 0.0,
        };
        pass.execute(&mut ctx).unwrap();

        let model = gpu
            .commands()
            .iter()
            .find_map(|c| match c {
                GpuCommand::SetUniform {
                    name,
                    value: UniformValue::Mat4(m),
                } if name == "u_Model" => Some(*m),
                _ => None,
            })
            .unwrap();
        assert!(model.translation().abs_diff_eq(Vector3::new(1.0, 1.0, 0.0), 1e-5));
        assert_eq!(model.get(0, 0), 2.0);
    }

    #[test]
    fn test_depth_write_disabled_and_debug_draws() {
        let mut gpu = HeadlessDevice::new();
        let shaders = ShaderLibrary::with_builtins(&mut gpu).unwrap();
        let mut ids = IdAllocator::new();
        let mut scene = Scene::new("Test", &mut ids);
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        scene.add_component(a, SpriteRenderer::default()).unwrap();

        let mut pass =
            GeometryPass::new(&mut gpu, "main", shaders.get("sprite").unwrap(), 16, 16).unwrap();
        pass.set_debug(true);
        assert!(!pass.core().draw_state().depth_write);

        let camera = Camera::new();
        let mut ctx = PassContext {
            gpu: &mut gpu,
            camera: &camera,
            scene: &scene,
            time: 0.0,
        };
        pass.execute(&mut ctx).unwrap();
        assert_eq!(gpu.draw_targets().len(), 2);
        assert!(pass.describe().debug);
    }
}
