//! wgpu implementation of [`GpuDevice`]
//!
//! The command surface is bind-oriented while wgpu records explicit render
//! passes, so draws are collected per bound framebuffer and submitted as one
//! render pass when the framebuffer is unbound, rebound or read back.
//!
//! Every shader shares one bind group layout:
//!
//! | binding | resource                          |
//! |---------|-----------------------------------|
//! | 0       | `Globals` uniform block           |
//! | 1..=4   | `t_texture0` .. `t_texture3`      |
//! | 5       | `s_linear` filtering sampler      |
//!
//! Texture unit `n` is always binding `n + 1`.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use rustc_hash::{FxHashMap, FxHashSet};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    BufferId, DrawState, FULLSCREEN_TRIANGLE, FramebufferId, FramebufferTargets, GpuDevice,
    GpuError, MAX_TEXTURE_UNITS, ShaderId, ShaderSource, TextureHandle, UNSET_TEXTURE,
    UniformValue, VertexLayout, builtin,
};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Uniform block shared by every built-in shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Globals {
    view_projection: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    color: [f32; 4],
    params: [f32; 4],
    resolution: [f32; 2],
    time: f32,
    flags: u32,
}

impl Default for Globals {
    fn default() -> Self {
        let identity = glam::Mat4::IDENTITY.to_cols_array_2d();
        Self {
            view_projection: identity,
            model: identity,
            color: [1.0; 4],
            ..Self::zeroed()
        }
    }
}

impl Globals {
    /// Store a named uniform. Returns false for names with no slot.
    fn set(&mut self, name: &str, value: UniformValue) -> bool {
        match (name, value) {
            ("u_ViewProjection", UniformValue::Mat4(m)) => self.view_projection = m.to_cols_array_2d(),
            ("u_Model", UniformValue::Mat4(m)) => self.model = m.to_cols_array_2d(),
            ("u_Color", UniformValue::Vec4(c)) => self.color = c,
            ("u_Color", UniformValue::Vec3(c)) => self.color = [c.x, c.y, c.z, 1.0],
            ("u_Params", UniformValue::Vec4(p)) => self.params = p,
            ("u_Resolution", UniformValue::Vec2(r)) => self.resolution = r,
            ("u_Time", UniformValue::Float(t)) => self.time = t,
            ("u_Flags", UniformValue::Int(f)) => self.flags = f as u32,
            ("u_Flags", UniformValue::Bool(b)) => self.flags = u32::from(b),
            (param, UniformValue::Float(v)) if param.starts_with("u_Param") => {
                match param["u_Param".len()..].parse::<usize>() {
                    Ok(i) if i < 4 => self.params[i] = v,
                    _ => return false,
                }
            }
            // Units map to fixed bindings
            (texture, UniformValue::Int(_)) if texture.starts_with("u_Texture") => {}
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: ShaderId,
    layout: VertexLayout,
    state: DrawState,
    format: wgpu::TextureFormat,
    depth: bool,
}

struct GpuFramebuffer {
    targets: FramebufferTargets,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    layout: VertexLayout,
    vertices: u32,
}

struct RecordedDraw {
    pipeline: PipelineKey,
    bind_group: wgpu::BindGroup,
    buffer: BufferId,
    vertices: u32,
    viewport: [u32; 4],
}

/// Draws waiting to be submitted into one framebuffer
struct OpenPass {
    target: FramebufferId,
    clear: Option<wgpu::Color>,
    draws: Vec<RecordedDraw>,
}

/// A [`GpuDevice`] backed by wgpu, presenting to a window surface
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    placeholder_view: wgpu::TextureView,
    present_pipeline: wgpu::RenderPipeline,
    present_triangle: wgpu::Buffer,

    next_handle: u32,
    framebuffers: FxHashMap<FramebufferId, GpuFramebuffer>,
    color_textures: FxHashMap<TextureHandle, FramebufferId>,
    shaders: FxHashMap<ShaderId, wgpu::ShaderModule>,
    buffers: FxHashMap<BufferId, GpuBuffer>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,

    bound: Option<FramebufferId>,
    viewport: [u32; 4],
    draw_state: DrawState,
    current_shader: Option<ShaderId>,
    /// Uniform values are per program
    globals: FxHashMap<ShaderId, Globals>,
    textures: [TextureHandle; MAX_TEXTURE_UNITS as usize],
    open_pass: Option<OpenPass>,
    warned_uniforms: FxHashSet<String>,
}

impl WgpuDevice {
    /// Create the device and configure the window surface
    ///
    /// # Errors
    ///
    /// Returns an error if no surface, adapter or device is available
    pub fn new(window: Arc<Window>, vsync: bool) -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    async fn new_async(window: Arc<Window>, vsync: bool) -> Result<Self, GpuError> {
        let size = window.inner_size();
        let size = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| GpuError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Framegraph Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| GpuError::Backend(e.to_string()))?;

        // Offscreen targets are linear RGBA8, so present to a linear surface
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| GpuError::Surface("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.0,
            height: size.1,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let bind_group_layout = create_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Globals Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // Unbound units sample opaque black
        let placeholder = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("Placeholder Texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: COLOR_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[0, 0, 0, 255],
        );
        let placeholder_view = placeholder.create_view(&wgpu::TextureViewDescriptor::default());

        let blit = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Present Shader"),
            source: wgpu::ShaderSource::Wgsl(builtin::BLIT.into()),
        });
        let present_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &blit,
            VertexLayout::Position2,
            DrawState {
                blend: false,
                depth_test: false,
                depth_write: false,
            },
            surface_format,
            false,
        );
        let present_triangle = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Present Triangle"),
            contents: bytemuck::cast_slice(&FULLSCREEN_TRIANGLE),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            bind_group_layout,
            pipeline_layout,
            sampler,
            placeholder_view,
            present_pipeline,
            present_triangle,
            next_handle: 0,
            framebuffers: FxHashMap::default(),
            color_textures: FxHashMap::default(),
            shaders: FxHashMap::default(),
            buffers: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            bound: None,
            viewport: [0, 0, size.0, size.1],
            draw_state: DrawState::default(),
            current_shader: None,
            globals: FxHashMap::default(),
            textures: [UNSET_TEXTURE; MAX_TEXTURE_UNITS as usize],
            open_pass: None,
            warned_uniforms: FxHashSet::default(),
        })
    }

    /// Surface size in pixels
    #[must_use]
    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigure the surface after a window resize. Zero sizes are ignored.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            log::debug!("Surface resized to {}x{}", width, height);
        }
    }

    /// Blit `texture` to the window and present it
    ///
    /// # Errors
    ///
    /// Returns an error if the surface cannot provide a frame
    pub fn present(&mut self, texture: TextureHandle) -> Result<(), GpuError> {
        self.flush();

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timed out, skipping frame");
                return Ok(());
            }
            Err(e) => return Err(GpuError::Surface(e.to_string())),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut textures = [UNSET_TEXTURE; MAX_TEXTURE_UNITS as usize];
        textures[0] = texture;
        let bind_group = self.create_bind_group(&Globals::default(), textures, None);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Present Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.present_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.present_triangle.slice(..));
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn allocate(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    /// View for a sampled texture unit. Unknown handles, depth handles and
    /// the current render target read as the placeholder.
    fn texture_view(&self, texture: TextureHandle, target: Option<FramebufferId>) -> &wgpu::TextureView {
        if texture == UNSET_TEXTURE {
            return &self.placeholder_view;
        }
        match self.color_textures.get(&texture) {
            Some(&id) if Some(id) == target => {
                log::warn!("Texture {} is also the render target, sampling black", texture);
                &self.placeholder_view
            }
            Some(id) => self
                .framebuffers
                .get(id)
                .map_or(&self.placeholder_view, |fb| &fb.color_view),
            None => {
                log::debug!("Texture {} is not a colour target", texture);
                &self.placeholder_view
            }
        }
    }

    fn create_bind_group(
        &self,
        globals: &Globals,
        textures: [TextureHandle; MAX_TEXTURE_UNITS as usize],
        target: Option<FramebufferId>,
    ) -> wgpu::BindGroup {
        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Globals Buffer"),
                contents: bytemuck::bytes_of(globals),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let views = textures.map(|texture| self.texture_view(texture, target));

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Globals Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(views[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(views[1]),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(views[2]),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(views[3]),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<(), GpuError> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let module = self
            .shaders
            .get(&key.shader)
            .ok_or(GpuError::UnknownShader(key.shader.raw()))?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = create_pipeline(
            &self.device,
            &self.pipeline_layout,
            module,
            key.layout,
            key.state,
            key.format,
            key.depth,
        );
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::Backend(error.to_string()));
        }
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    fn open_pass(&mut self, target: FramebufferId) -> &mut OpenPass {
        if self.open_pass.as_ref().is_some_and(|pass| pass.target != target) {
            self.flush();
        }
        self.open_pass.get_or_insert_with(|| OpenPass {
            target,
            clear: None,
            draws: Vec::new(),
        })
    }

    /// Submit the recorded draws of the open pass
    fn flush(&mut self) {
        let Some(pass) = self.open_pass.take() else {
            return;
        };
        if pass.clear.is_none() && pass.draws.is_empty() {
            return;
        }
        let Some(fb) = self.framebuffers.get(&pass.target) else {
            return;
        };

        let (color_load, depth_load) = match pass.clear {
            Some(color) => (wgpu::LoadOp::Clear(color), wgpu::LoadOp::Clear(1.0)),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Framebuffer Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Framebuffer Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &fb.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &fb.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let (width, height) = (fb.targets.width, fb.targets.height);
            for draw in &pass.draws {
                let (Some(pipeline), Some(buffer)) = (
                    self.pipelines.get(&draw.pipeline),
                    self.buffers.get(&draw.buffer),
                ) else {
                    continue;
                };
                let [x, y, w, h] = draw.viewport;
                let x = x.min(width - 1);
                let y = y.min(height - 1);
                let w = w.clamp(1, width - x);
                let h = h.clamp(1, height - y);

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &draw.bind_group, &[]);
                render_pass.set_vertex_buffer(0, buffer.buffer.slice(..));
                render_pass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
                render_pass.draw(0..draw.vertices, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GpuDevice for WgpuDevice {
    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<FramebufferTargets, GpuError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(GpuError::IncompleteFramebuffer { width, height });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Framebuffer Color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Framebuffer Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("Framebuffer {}x{} incomplete: {}", width, height, error);
            return Err(GpuError::IncompleteFramebuffer { width, height });
        }

        let targets = FramebufferTargets {
            id: FramebufferId(self.allocate()),
            color: self.allocate(),
            depth: self.allocate(),
            width,
            height,
        };
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        self.color_textures.insert(targets.color, targets.id);
        self.framebuffers.insert(
            targets.id,
            GpuFramebuffer {
                targets,
                color,
                color_view,
                depth_view,
            },
        );
        log::debug!("Created framebuffer {} ({}x{})", targets.id.raw(), width, height);
        Ok(targets)
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        if self.open_pass.as_ref().is_some_and(|pass| pass.target == id) {
            self.open_pass = None;
        }
        if self.bound == Some(id) {
            self.bound = None;
        }
        match self.framebuffers.remove(&id) {
            Some(fb) => {
                self.color_textures.remove(&fb.targets.color);
            }
            None => log::warn!("Destroying unknown framebuffer {}", id.raw()),
        }
    }

    fn bind_framebuffer(&mut self, id: FramebufferId) -> Result<(), GpuError> {
        if !self.framebuffers.contains_key(&id) {
            return Err(GpuError::UnknownFramebuffer(id.raw()));
        }
        self.open_pass(id);
        self.bound = Some(id);
        self.textures = [UNSET_TEXTURE; MAX_TEXTURE_UNITS as usize];
        Ok(())
    }

    fn unbind_framebuffer(&mut self) {
        self.flush();
        self.bound = None;
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = [x, y, width, height];
    }

    fn clear(&mut self, color: [f32; 4]) {
        let Some(target) = self.bound else {
            log::warn!("Clear with no framebuffer bound");
            return;
        };
        let [r, g, b, a] = color.map(f64::from);
        let pass = self.open_pass(target);
        // Earlier draws would be overwritten anyway
        pass.draws.clear();
        pass.clear = Some(wgpu::Color { r, g, b, a });
    }

    fn set_draw_state(&mut self, state: DrawState) {
        self.draw_state = state;
    }

    fn create_shader(&mut self, source: &ShaderSource) -> Result<ShaderId, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.label),
                source: wgpu::ShaderSource::Wgsl(source.code.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::ShaderCompile {
                label: source.label.clone(),
                reason: error.to_string(),
            });
        }

        let id = ShaderId(self.allocate());
        self.shaders.insert(id, module);
        self.globals.insert(id, Globals::default());
        log::debug!("Compiled shader '{}' as {}", source.label, id.raw());
        Ok(id)
    }

    fn use_shader(&mut self, id: ShaderId) {
        if !self.shaders.contains_key(&id) {
            log::warn!("Using unknown shader {}", id.raw());
            return;
        }
        self.current_shader = Some(id);
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        let Some(globals) = self
            .current_shader
            .and_then(|shader| self.globals.get_mut(&shader))
        else {
            log::warn!("Uniform '{}' set with no shader in use", name);
            return;
        };
        if !globals.set(name, value) && self.warned_uniforms.insert(name.to_string()) {
            log::warn!("Uniform '{}' ({:?}) has no slot in the globals block", name, value);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        match self.textures.get_mut(unit as usize) {
            Some(slot) => *slot = texture,
            None => log::warn!("Texture unit {} out of range", unit),
        }
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

        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                layout,
                vertices: (data.len() / stride) as u32,
            },
        );
        Ok(id)
    }

    fn destroy_vertex_buffer(&mut self, id: BufferId) {
        self.buffers.remove(&id);
    }

    fn draw(&mut self, buffer: BufferId) {
        let Some(target) = self.bound else {
            log::warn!("Draw with no framebuffer bound");
            return;
        };
        let Some(shader) = self.current_shader else {
            log::warn!("Draw with no shader in use");
            return;
        };
        let Some((layout, vertices)) = self.buffers.get(&buffer).map(|b| (b.layout, b.vertices))
        else {
            log::warn!("Drawing unknown vertex buffer {}", buffer.raw());
            return;
        };
        if vertices == 0 {
            return;
        }

        let key = PipelineKey {
            shader,
            layout,
            state: self.draw_state,
            format: COLOR_FORMAT,
            depth: true,
        };
        if let Err(e) = self.ensure_pipeline(key) {
            log::error!("Pipeline creation failed: {}", e);
            return;
        }

        let globals = self.globals.get(&shader).copied().unwrap_or_default();
        let bind_group = self.create_bind_group(&globals, self.textures, Some(target));
        let viewport = self.viewport;
        self.open_pass(target).draws.push(RecordedDraw {
            pipeline: key,
            bind_group,
            buffer,
            vertices,
            viewport,
        });
    }

    fn read_pixels(&mut self, id: FramebufferId) -> Result<Vec<u8>, GpuError> {
        if self.open_pass.as_ref().is_some_and(|pass| pass.target == id) {
            self.flush();
        }
        let fb = self
            .framebuffers
            .get(&id)
            .ok_or(GpuError::UnknownFramebuffer(id.raw()))?;
        let (width, height) = (fb.targets.width, fb.targets.height);

        let row_bytes = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = row_bytes.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: u64::from(padded_row_bytes) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &fb.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| GpuError::Backend(e.to_string()))?
            .map_err(|e| GpuError::Backend(e.to_string()))?;

        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_row_bytes as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        readback.unmap();
        Ok(pixels)
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Globals Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            texture(1),
            texture(2),
            texture(3),
            texture(4),
            wgpu::BindGroupLayoutEntry {
                binding: 5,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn vertex_buffer_layout(layout: VertexLayout) -> wgpu::VertexBufferLayout<'static> {
    const POSITION2: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
    const POSITION3_UV: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    let attributes: &'static [wgpu::VertexAttribute] = match layout {
        VertexLayout::Position2 => &POSITION2,
        VertexLayout::Position3Uv => &POSITION3_UV,
    };
    wgpu::VertexBufferLayout {
        array_stride: (layout.stride() * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    vertex_layout: VertexLayout,
    state: DrawState,
    format: wgpu::TextureFormat,
    depth: bool,
) -> wgpu::RenderPipeline {
    let blend = if state.blend {
        wgpu::BlendState::ALPHA_BLENDING
    } else {
        wgpu::BlendState::REPLACE
    };
    let depth_stencil = depth.then(|| wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: state.depth_write,
        depth_compare: if state.depth_test {
            wgpu::CompareFunction::LessEqual
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Framegraph Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[vertex_buffer_layout(vertex_layout)],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            // Sprites may be mirrored by negative scale
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
