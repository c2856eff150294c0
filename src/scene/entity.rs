//! Scene entities

use super::component::ComponentSlot;
use super::{Component, EntityId, Transform};
use crate::core::DEFAULT_LAYER;

/// Numeric object id handed out by the engine's id allocator
pub type ObjectId = u64;

/// A named scene node owning one [`Transform`] and a list of components.
///
/// Components run in insertion order.
pub struct GameObject {
    id: ObjectId,
    name: String,
    /// Single-bit layer mask
    layer: u32,
    transform: Transform,
    pub(crate) components: Vec<ComponentSlot>,
}

impl GameObject {
    pub(crate) fn new(entity: EntityId, id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            layer: DEFAULT_LAYER,
            transform: Transform::new(entity),
            components: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Layer bit used for render pass filtering
    #[must_use]
    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn set_layer(&mut self, layer: u32) {
        self.layer = layer;
    }

    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub(crate) fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Attached components in call order
    pub fn components(&self) -> impl Iterator<Item = &dyn Component> {
        self.components.iter().map(|slot| slot.component.as_ref())
    }

    /// First component of type `T`
    #[must_use]
    pub fn get_component<T: Component>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|slot| slot.component.as_any().downcast_ref::<T>())
    }

    pub fn get_component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|slot| slot.component.as_any_mut().downcast_mut::<T>())
    }
}

impl std::fmt::Debug for GameObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let components: Vec<&str> = self.components().map(|c| c.type_name()).collect();
        f.debug_struct("GameObject")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layer", &self.layer)
            .field("transform", &self.transform)
            .field("components", &components)
            .finish()
    }
}
