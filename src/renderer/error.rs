//! Renderer error types

/// Failures reported by a [`GpuDevice`](super::GpuDevice)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    #[error("framebuffer {width}x{height} is incomplete")]
    IncompleteFramebuffer { width: u32, height: u32 },
    #[error("shader `{label}` failed to compile: {reason}")]
    ShaderCompile { label: String, reason: String },
    #[error("unknown shader {0}")]
    UnknownShader(u32),
    #[error("unknown framebuffer {0}")]
    UnknownFramebuffer(u32),
    #[error("unknown vertex buffer {0}")]
    UnknownBuffer(u32),
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("surface error: {0}")]
    Surface(String),
    #[error("GPU backend error: {0}")]
    Backend(String),
}

/// Render graph configuration and execution errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unknown render pass `{0}`")]
    UnknownPass(String),
    #[error("connecting `{from}` to `{to}` would create a cycle")]
    CycleDetected { from: String, to: String },
    #[error("pass `{pass}` has {capacity} input slots, slot {slot} is out of range")]
    InvalidInputSlot {
        pass: String,
        slot: usize,
        capacity: usize,
    },
    #[error("no final pass set")]
    NoFinalPass,
    #[error("unknown pass kind `{0}`")]
    UnknownPassKind(String),
    #[error("unknown shader `{0}`")]
    UnknownShader(String),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid graph description: {0}")]
    Description(String),
}
