//! Graphics backend seam
//!
//! The render core talks to the GPU only through [`GpuDevice`], a small
//! bind-oriented command surface. [`HeadlessDevice`](super::HeadlessDevice)
//! implements it in memory; [`WgpuDevice`](super::WgpuDevice) on wgpu.

use serde::{Deserialize, Serialize};

use super::GpuError;
use crate::math::{Matrix4, Vector3};

/// GPU texture handle. `0` is never a live texture.
pub type TextureHandle = u32;

/// The "unset" texture handle
pub const UNSET_TEXTURE: TextureHandle = 0;

/// Number of texture units a shader may sample from
pub const MAX_TEXTURE_UNITS: u32 = 4;

macro_rules! gpu_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            #[must_use]
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_id!(
    /// Offscreen render target
    FramebufferId
);
gpu_id!(
    /// Compiled shader program
    ShaderId
);
gpu_id!(
    /// Vertex buffer
    BufferId
);

/// Resources created for one framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferTargets {
    pub id: FramebufferId,
    pub color: TextureHandle,
    pub depth: TextureHandle,
    pub width: u32,
    pub height: u32,
}

/// Vertex formats understood by the built-in shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexLayout {
    /// `vec2` clip-space position
    Position2,
    /// `vec3` position followed by `vec2` uv
    Position3Uv,
}

impl VertexLayout {
    /// Floats per vertex
    #[must_use]
    pub const fn stride(self) -> usize {
        match self {
            Self::Position2 => 2,
            Self::Position3Uv => 5,
        }
    }
}

/// Fixed-function state for subsequent draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawState {
    /// Standard alpha-over blending
    pub blend: bool,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            blend: true,
            depth_test: true,
            depth_write: true,
        }
    }
}

/// Value for a named shader uniform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    Mat4(Matrix4),
    Vec2([f32; 2]),
    Vec3(Vector3),
    Vec4([f32; 4]),
    Int(i32),
    Float(f32),
    Bool(bool),
}

/// Shader program source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub label: String,
    /// WGSL with `vs_main` and `fs_main` entry points
    pub code: String,
}

impl ShaderSource {
    pub fn new(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
        }
    }
}

/// Immediate-mode GPU command surface.
///
/// All calls happen on the thread that owns the device. Draw calls target
/// the currently bound framebuffer.
pub trait GpuDevice {
    /// Create a colour + depth render target.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::IncompleteFramebuffer`] if the attachments cannot
    /// be created at this size
    fn create_framebuffer(&mut self, width: u32, height: u32)
    -> Result<FramebufferTargets, GpuError>;

    fn destroy_framebuffer(&mut self, id: FramebufferId);

    /// Route subsequent draws into `id`
    ///
    /// # Errors
    ///
    /// Returns an error if the framebuffer does not exist
    fn bind_framebuffer(&mut self, id: FramebufferId) -> Result<(), GpuError>;

    /// Restore the default target
    fn unbind_framebuffer(&mut self);

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Clear colour and depth of the bound framebuffer
    fn clear(&mut self, color: [f32; 4]);

    fn set_draw_state(&mut self, state: DrawState);

    /// # Errors
    ///
    /// Returns [`GpuError::ShaderCompile`] if the source is rejected
    fn create_shader(&mut self, source: &ShaderSource) -> Result<ShaderId, GpuError>;

    fn use_shader(&mut self, id: ShaderId);

    /// Set a named uniform on the shader in use
    fn set_uniform(&mut self, name: &str, value: UniformValue);

    /// Bind a texture to a sampler unit; [`UNSET_TEXTURE`] unbinds
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    /// # Errors
    ///
    /// Returns an error if the buffer cannot be allocated
    fn create_vertex_buffer(
        &mut self,
        layout: VertexLayout,
        data: &[f32],
    ) -> Result<BufferId, GpuError>;

    fn destroy_vertex_buffer(&mut self, id: BufferId);

    /// Draw every vertex in `buffer` as a triangle list
    fn draw(&mut self, buffer: BufferId);

    /// Read back the colour attachment as tightly packed RGBA8 rows,
    /// top row first
    ///
    /// # Errors
    ///
    /// Returns an error if the framebuffer does not exist or readback fails
    fn read_pixels(&mut self, id: FramebufferId) -> Result<Vec<u8>, GpuError>;
}
