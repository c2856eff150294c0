//! Scene graph: entities, hierarchical transforms and components

mod arena;
mod component;
mod components;
mod entity;
mod error;
mod persist;
#[allow(clippy::module_inception)]
mod scene;
mod transform;

pub use arena::{Arena, ArenaId};
pub use component::{
    Component, ComponentContext, ComponentRegistry, Property, PropertyError, PropertyValue,
};
pub use components::{Spinner, SpriteRenderer};
pub use entity::{GameObject, ObjectId};
pub use error::SceneError;
pub use persist::{ComponentData, EntityData, SCENE_FORMAT_VERSION, SceneData};
pub use scene::Scene;
pub use transform::Transform;

/// Generational handle to an entity in a [`Scene`]
pub type EntityId = ArenaId;
