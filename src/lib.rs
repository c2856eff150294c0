//! A scene-graph and render-graph core built in Rust
//!
//! This crate provides:
//! - A hierarchical scene of entities with cached world transforms and
//!   behaviour components
//! - A render graph of offscreen passes wired output-to-input and executed
//!   in dependency order
//! - A small GPU command seam with a wgpu backend and a headless backend
//! - A winit runner that drives the scene and presents the final pass

pub mod core;
pub mod math;
pub mod renderer;
pub mod scene;

// Re-exports for convenience
pub use glam;
pub use wgpu;
pub use winit;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::{
        Engine, EngineConfig, EngineContext, EngineError, Game, LayerRegistry, Time,
    };
    pub use crate::math::{Matrix4, Vector3};
    pub use crate::renderer::{
        Camera, GeometryPass, GpuDevice, PostProcessingPass, RenderGraph, RenderGraphDescription,
        RenderPass,
    };
    pub use crate::scene::{Component, ComponentContext, EntityId, Scene, Spinner, SpriteRenderer};
}
