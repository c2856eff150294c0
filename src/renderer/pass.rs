//! Render pass contract
//!
//! Every pass owns one [`Framebuffer`] and shares one [`Shader`]. A frame of
//! a pass runs `bind_and_prepare`, the pass-specific draw, then unbind:
//!
//! ```text
//! Constructed -> Prepared -> Rendered -> Unbound -> (next frame) Prepared ...
//! ```
//!
//! Input slots are single-use: `bind_and_prepare` consumes them and resets
//! them to [`UNSET_TEXTURE`], so a producer must feed the pass again every
//! frame.

use std::any::Any;

use super::{
    Camera, DrawState, Framebuffer, GpuDevice, GpuError, MAX_TEXTURE_UNITS, PassDescription,
    Shader, TextureHandle, UNSET_TEXTURE,
};
use crate::core::ALL_LAYERS;
use crate::scene::Scene;

/// Where a pass is within its per-frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Constructed,
    Prepared,
    Rendered,
    Unbound,
}

/// State shared by every render pass
#[derive(Debug)]
pub struct PassCore {
    name: String,
    framebuffer: Framebuffer,
    shader: Shader,
    /// Fixed capacity, set at construction
    inputs: Box<[TextureHandle]>,
    layer_mask: u32,
    clear_color: [f32; 4],
    draw_state: DrawState,
    state: PassState,
}

impl PassCore {
    /// Create the pass framebuffer and input slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the framebuffer is incomplete or more inputs are
    /// requested than there are texture units
    pub fn new(
        gpu: &mut dyn GpuDevice,
        name: impl Into<String>,
        shader: Shader,
        input_count: usize,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let name = name.into();
        if input_count > MAX_TEXTURE_UNITS as usize {
            return Err(GpuError::Backend(format!(
                "pass '{name}' requests {input_count} inputs, at most {MAX_TEXTURE_UNITS} are supported"
            )));
        }

        let framebuffer = Framebuffer::new(gpu, width, height)?;
        Ok(Self {
            name,
            framebuffer,
            shader,
            inputs: vec![UNSET_TEXTURE; input_count].into_boxed_slice(),
            layer_mask: ALL_LAYERS,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            draw_state: DrawState::default(),
            state: PassState::Constructed,
        })
    }

    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    #[inline]
    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    /// Swap the shader; takes effect next frame
    pub fn set_shader(&mut self, shader: Shader) {
        self.shader = shader;
    }

    #[must_use]
    #[inline]
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Colour texture this pass renders into
    #[must_use]
    #[inline]
    pub fn output_texture(&self) -> TextureHandle {
        self.framebuffer.color_texture()
    }

    /// Number of input slots
    #[must_use]
    #[inline]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Feed a texture into an input slot for the next execution.
    /// Out-of-range slots are ignored.
    pub fn set_input_texture(&mut self, slot: usize, texture: TextureHandle) {
        match self.inputs.get_mut(slot) {
            Some(input) => *input = texture,
            None => log::warn!(
                "Pass '{}' has {} input slots, ignoring slot {slot}",
                self.name,
                self.inputs.len()
            ),
        }
    }

    /// Current slot value; unset or out of range reads as [`UNSET_TEXTURE`]
    #[must_use]
    pub fn input_texture(&self, slot: usize) -> TextureHandle {
        self.inputs.get(slot).copied().unwrap_or(UNSET_TEXTURE)
    }

    #[must_use]
    #[inline]
    pub fn layer_mask(&self) -> u32 {
        self.layer_mask
    }

    pub fn set_layer_mask(&mut self, mask: u32) {
        self.layer_mask = mask;
    }

    #[must_use]
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    #[must_use]
    pub fn draw_state(&self) -> DrawState {
        self.draw_state
    }

    pub fn set_draw_state(&mut self, state: DrawState) {
        self.draw_state = state;
    }

    #[must_use]
    #[inline]
    pub fn state(&self) -> PassState {
        self.state
    }

    /// Bind the framebuffer, clear it, set fixed-function state, activate the
    /// shader, upload `u_Resolution` and bind every set input slot `i` to
    /// texture unit `i` (sampler uniform `u_Texture{i}`). Unset slots unbind
    /// their unit. The slots are then reset to unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the framebuffer cannot be bound
    pub fn bind_and_prepare(&mut self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        self.framebuffer.bind(gpu)?;
        gpu.clear(self.clear_color);
        gpu.set_draw_state(self.draw_state);

        self.shader.bind(gpu);
        self.shader.set_vec2(
            gpu,
            "u_Resolution",
            [
                self.framebuffer.width() as f32,
                self.framebuffer.height() as f32,
            ],
        );

        for (unit, texture) in self.inputs.iter_mut().enumerate() {
            if *texture == UNSET_TEXTURE {
                gpu.bind_texture(unit as u32, UNSET_TEXTURE);
                continue;
            }
            gpu.bind_texture(unit as u32, *texture);
            self.shader
                .set_int(gpu, &format!("u_Texture{unit}"), unit as i32);
            *texture = UNSET_TEXTURE;
        }

        self.state = PassState::Prepared;
        Ok(())
    }

    pub(crate) fn mark_rendered(&mut self) {
        self.state = PassState::Rendered;
    }

    /// Restore the default target
    pub fn unbind(&mut self, gpu: &mut dyn GpuDevice) {
        self.framebuffer.unbind(gpu);
        self.state = PassState::Unbound;
    }

    /// Recreate the framebuffer at a new size
    ///
    /// # Errors
    ///
    /// Returns an error if the new framebuffer is incomplete
    pub fn resize(&mut self, gpu: &mut dyn GpuDevice, width: u32, height: u32) -> Result<(), GpuError> {
        self.framebuffer.resize(gpu, width, height)
    }

    pub fn release(&self, gpu: &mut dyn GpuDevice) {
        self.framebuffer.release(gpu);
    }
}

/// Everything a pass may read while drawing
pub struct PassContext<'a> {
    pub gpu: &'a mut dyn GpuDevice,
    pub camera: &'a Camera,
    pub scene: &'a Scene,
    /// Seconds since start
    pub time: f32,
}

/// One offscreen rendering stage of a [`RenderGraph`](super::RenderGraph)
pub trait RenderPass: 'static {
    /// Registry kind, e.g. `"geometry"`
    fn kind(&self) -> &'static str;

    fn core(&self) -> &PassCore;

    fn core_mut(&mut self) -> &mut PassCore;

    /// Pass-specific draws, issued between prepare and unbind
    fn render(&mut self, ctx: &mut PassContext<'_>);

    /// Export this pass's configuration
    fn describe(&self) -> PassDescription {
        PassDescription::from_core(self.kind(), self.core())
    }

    /// Free every GPU resource the pass owns
    fn release(&self, gpu: &mut dyn GpuDevice) {
        self.core().release(gpu);
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    #[inline]
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Run one frame of the pass
    ///
    /// # Errors
    ///
    /// Returns an error if the pass framebuffer cannot be bound
    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), GpuError> {
        self.core_mut().bind_and_prepare(ctx.gpu)?;
        self.render(ctx);
        self.core_mut().mark_rendered();
        self.core_mut().unbind(ctx.gpu);
        Ok(())
    }
}
