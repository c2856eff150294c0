//! Core engine module
//!
//! Configuration, timing, layers, the shared [`EngineContext`] and the
//! windowed [`Engine`] runner.

mod config;
mod context;
mod engine;
mod layers;
mod time;

pub use config::{ConfigError, EngineConfig};
pub use context::{EngineContext, IdAllocator};
pub use engine::{Engine, EngineError, Game};
pub use layers::{ALL_LAYERS, DEFAULT_LAYER, DEFAULT_LAYER_NAME, LayerRegistry};
pub use time::Time;
