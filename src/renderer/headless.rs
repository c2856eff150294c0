//! In-memory GPU device
//!
//! Allocates handles, validates usage and records every command so tests can
//! assert on exactly what the render core submitted.

use rustc_hash::FxHashMap;

use super::{
    BufferId, DrawState, FramebufferId, FramebufferTargets, GpuDevice, GpuError, ShaderId,
    ShaderSource, TextureHandle, UniformValue, VertexLayout,
};

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateFramebuffer {
        id: FramebufferId,
        width: u32,
        height: u32,
    },
    DestroyFramebuffer(FramebufferId),
    BindFramebuffer(FramebufferId),
    UnbindFramebuffer,
    Viewport {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Clear([f32; 4]),
    DrawState(DrawState),
    CreateShader {
        id: ShaderId,
        label: String,
    },
    UseShader(ShaderId),
    SetUniform {
        name: String,
        value: UniformValue,
    },
    BindTexture {
        unit: u32,
        texture: TextureHandle,
    },
    CreateVertexBuffer {
        id: BufferId,
        layout: VertexLayout,
        vertices: usize,
    },
    DestroyVertexBuffer(BufferId),
    Draw {
        buffer: BufferId,
        /// Framebuffer the draw landed in, if any
        target: Option<FramebufferId>,
        vertices: usize,
    },
    ReadPixels(FramebufferId),
}

#[derive(Debug, Clone)]
struct FramebufferRecord {
    targets: FramebufferTargets,
    clear_color: [f32; 4],
}

/// A [`GpuDevice`] with no GPU behind it
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_handle: u32,
    framebuffers: FxHashMap<FramebufferId, FramebufferRecord>,
    shaders: FxHashMap<ShaderId, String>,
    buffers: FxHashMap<BufferId, (VertexLayout, usize)>,
    bound: Option<FramebufferId>,
    fail_next_framebuffer: bool,
    muted: bool,
    commands: Vec<GpuCommand>,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop or resume recording commands. Validation still runs while
    /// muted, so long offline runs keep constant memory.
    pub fn set_recording(&mut self, recording: bool) {
        self.muted = !recording;
        if self.muted {
            self.commands.clear();
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        !self.muted
    }

    fn record(&mut self, command: GpuCommand) {
        if !self.muted {
            self.commands.push(command);
        }
    }

    fn allocate(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Make the next framebuffer creation report incomplete
    pub fn fail_next_framebuffer(&mut self) {
        self.fail_next_framebuffer = true;
    }

    /// Commands recorded since the last [`HeadlessDevice::take_commands`]
    #[must_use]
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    #[must_use]
    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound
    }

    #[must_use]
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Framebuffers that received draws, in submission order
    #[must_use]
    pub fn draw_targets(&self) -> Vec<FramebufferId> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::Draw { target, .. } => *target,
                _ => None,
            })
            .collect()
    }

    /// Shader label for a compiled id
    #[must_use]
    pub fn shader_label(&self, id: ShaderId) -> Option<&str> {
        self.shaders.get(&id).map(String::as_str)
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<FramebufferTargets, GpuError> {
        if width == 0 || height == 0 || std::mem::take(&mut self.fail_next_framebuffer) {
            return Err(GpuError::IncompleteFramebuffer { width, height });
        }

        let targets = FramebufferTargets {
            id: FramebufferId(self.allocate()),
            color: self.allocate(),
            depth: self.allocate(),
            width,
            height,
        };
        self.framebuffers.insert(
            targets.id,
            FramebufferRecord {
                targets,
                clear_color: [0.0; 4],
            },
        );
        self.record(GpuCommand::CreateFramebuffer {
            id: targets.id,
            width,
            height,
        });
        Ok(targets)
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        if self.framebuffers.remove(&id).is_none() {
            log::warn!("Destroying unknown framebuffer {}", id.raw());
            return;
        }
        if self.bound == Some(id) {
            self.bound = None;
        }
        self.record(GpuCommand::DestroyFramebuffer(id));
    }

    fn bind_framebuffer(&mut self, id: FramebufferId) -> Result<(), GpuError> {
        if !self.framebuffers.contains_key(&id) {
            return Err(GpuError::UnknownFramebuffer(id.raw()));
        }
        self.bound = Some(id);
        self.record(GpuCommand::BindFramebuffer(id));
        Ok(())
    }

    fn unbind_framebuffer(&mut self) {
        self.bound = None;
        self.record(GpuCommand::UnbindFramebuffer);
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.record(GpuCommand::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn clear(&mut self, color: [f32; 4]) {
        if let Some(record) = self.bound.and_then(|id| self.framebuffers.get_mut(&id)) {
            record.clear_color = color;
        }
        self.record(GpuCommand::Clear(color));
    }

    fn set_draw_state(&mut self, state: DrawState) {
        self.record(GpuCommand::DrawState(state));
    }

    fn create_shader(&mut self, source: &ShaderSource) -> Result<ShaderId, GpuError> {
        for entry in ["vs_main", "fs_main"] {
            if !source.code.contains(entry) {
                return Err(GpuError::ShaderCompile {
                    label: source.label.clone(),
                    reason: format!("missing entry point `{entry}`"),
                });
            }
        }

        let id = ShaderId(self.allocate());
        self.shaders.insert(id, source.label.clone());
        self.record(GpuCommand::CreateShader {
            id,
            label: source.label.clone(),
        });
        Ok(id)
    }

    fn use_shader(&mut self, id: ShaderId) {
        if !self.shaders.contains_key(&id) {
            log::warn!("Using unknown shader {}", id.raw());
        }
        self.record(GpuCommand::UseShader(id));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.record(GpuCommand::SetUniform {
            name: name.to_string(),
            value,
        });
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.record(GpuCommand::BindTexture { unit, texture });
    }

    fn create_vertex_buffer(
        &mut self,
        layout: VertexLayout,
        data: &[f32],
    ) -> Result<BufferId, GpuError> {
        let stride = layout.stride();
        if data.len() % stride != 0 {
            return Err(GpuError::Backend(format!(
                "vertex data length {} is not a multiple of stride {stride}",
                data.len()
            )));
        }

        let id = BufferId(self.allocate());
        let vertices = data.len() / stride;
        self.buffers.insert(id, (layout, vertices));
        self.record(GpuCommand::CreateVertexBuffer {
            id,
            layout,
            vertices,
        });
        Ok(id)
    }

    fn destroy_vertex_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id).is_some() {
            self.record(GpuCommand::DestroyVertexBuffer(id));
        }
    }

    fn draw(&mut self, buffer: BufferId) {
        let Some(&(_, vertices)) = self.buffers.get(&buffer) else {
            log::warn!("Drawing unknown vertex buffer {}", buffer.raw());
            return;
        };
        self.record(GpuCommand::Draw {
            buffer,
            target: self.bound,
            vertices,
        });
    }

    fn read_pixels(&mut self, id: FramebufferId) -> Result<Vec<u8>, GpuError> {
        let record = self
            .framebuffers
            .get(&id)
            .ok_or(GpuError::UnknownFramebuffer(id.raw()))?;

        let pixel = record
            .clear_color
            .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8);
        let count = (record.targets.width * record.targets.height) as usize;
        let pixels = pixel.repeat(count);

        self.record(GpuCommand::ReadPixels(id));
        Ok(pixels)
    }
}
