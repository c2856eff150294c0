//! Rendering module
//!
//! A render graph of offscreen passes on top of a small GPU command seam.
//! Passes render into their own framebuffers; the graph wires each pass's
//! output texture into the input slots of its consumers and runs the passes
//! in dependency order.

mod camera;
mod description;
mod device;
mod error;
mod frame;
mod framebuffer;
mod geometry;
mod graph;
mod headless;
mod mesh;
mod pass;
mod postprocess;
mod shader;
mod wgpu_backend;

pub use camera::{Camera, Projection};
pub use description::{
    Connection, PassBuildContext, PassDescription, PassRegistry, RenderGraphDescription,
};
pub use device::{
    BufferId, DrawState, FramebufferId, FramebufferTargets, GpuDevice, MAX_TEXTURE_UNITS,
    ShaderId, ShaderSource, TextureHandle, UNSET_TEXTURE, UniformValue, VertexLayout,
};
pub use error::{GpuError, RenderError};
pub use frame::RenderFrame;
pub use framebuffer::Framebuffer;
pub use geometry::GeometryPass;
pub use graph::RenderGraph;
pub use headless::{GpuCommand, HeadlessDevice};
pub use mesh::{FULLSCREEN_TRIANGLE, Mesh, Vertex};
pub use pass::{PassContext, PassCore, PassState, RenderPass};
pub use postprocess::PostProcessingPass;
pub use shader::{Shader, ShaderLibrary, builtin, postprocess_source};
pub use wgpu_backend::WgpuDevice;
