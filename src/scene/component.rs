//! Component behaviour model
//!
//! Components are polymorphic behaviour units owned by exactly one entity.
//! Every lifecycle callback is optional. Editable state is declared
//! explicitly through [`Component::properties`] and
//! [`Component::set_property`] so tooling and scene loading never need
//! runtime reflection.

use std::any::Any;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{EntityId, Scene, Transform};
use crate::math::Vector3;
use crate::renderer::RenderFrame;

// ============================================================================
// Properties
// ============================================================================

/// A serializable property value.
///
/// Only primitives and vectors are stored inline. References to other
/// objects are stored as a location path string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    String(String),
    Vec2([f32; 2]),
    Vec3(Vector3),
    Vec4([f32; 4]),
    Reference(String),
}

impl PropertyValue {
    /// Numeric value, accepting ints as floats
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vec3(&self) -> Option<Vector3> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vec4(&self) -> Option<[f32; 4]> {
        match self {
            Self::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Reference(s) => Some(s),
            _ => None,
        }
    }
}

/// A named editable field of a component
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: &'static str,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: &'static str, value: PropertyValue) -> Self {
        Self { name, value }
    }
}

/// Errors raised when applying a property to a component
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    #[error("component `{component}` has no property `{property}`")]
    Unknown {
        component: &'static str,
        property: String,
    },
    #[error("property `{property}` expects a {expected} value")]
    TypeMismatch {
        property: String,
        expected: &'static str,
    },
}

// ============================================================================
// Component trait
// ============================================================================

/// Behaviour attached to an entity.
pub trait Component: 'static {
    /// Registry name of this component type
    fn type_name(&self) -> &'static str;

    /// Called once when the component is attached, before any update
    fn start(&mut self, _ctx: &mut ComponentContext<'_>) {}

    fn update(&mut self, _ctx: &mut ComponentContext<'_>, _dt: f32) {}

    fn fixed_update(&mut self, _ctx: &mut ComponentContext<'_>, _step: f32) {}

    /// Submit draws for the owning entity. The frame carries the pass layer
    /// mask so the component can skip itself.
    fn render(&self, _frame: &mut RenderFrame<'_>) {}

    fn debug_render(&self, _frame: &mut RenderFrame<'_>) {}

    /// Called once before the owning entity is freed
    fn on_destroy(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Editable fields, in display order
    fn properties(&self) -> Vec<Property> {
        Vec::new()
    }

    /// Apply one editable field
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown or the value has the wrong type
    fn set_property(&mut self, name: &str, _value: &PropertyValue) -> Result<(), PropertyError> {
        Err(PropertyError::Unknown {
            component: self.type_name(),
            property: name.to_string(),
        })
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A component together with its owner back-reference.
///
/// The owner is fixed at attach time.
pub(crate) struct ComponentSlot {
    pub(crate) owner: EntityId,
    pub(crate) component: Box<dyn Component>,
}

/// Access to the scene from inside a component callback.
///
/// While a callback runs, the owning entity's component list is detached from
/// the scene; components added to the entity during the callback are kept.
pub struct ComponentContext<'a> {
    scene: &'a mut Scene,
    entity: EntityId,
}

impl<'a> ComponentContext<'a> {
    pub(crate) fn new(scene: &'a mut Scene, entity: EntityId) -> Self {
        Self { scene, entity }
    }

    /// The entity owning the running component
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &*self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut *self.scene
    }

    /// Transform of the owning entity
    #[must_use]
    pub fn transform(&self) -> Option<&Transform> {
        self.scene.transform(self.entity)
    }
}

// ============================================================================
// Registry
// ============================================================================

type ComponentFactory = Box<dyn Fn() -> Box<dyn Component>>;

/// Maps component type names to constructors.
///
/// Populated explicitly at startup; scene loading resolves persisted
/// component type names through it.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: FxHashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the engine's built-in components
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_default::<super::SpriteRenderer>(super::SpriteRenderer::TYPE_NAME);
        registry.register_default::<super::Spinner>(super::Spinner::TYPE_NAME);
        registry
    }

    /// Register a factory. Re-registering a name replaces the factory.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Component> + 'static,
    ) {
        let name = name.into();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            log::debug!("Replaced component factory `{name}`");
        }
    }

    /// Register a component type constructed through `Default`
    pub fn register_default<C: Component + Default>(&mut self, name: impl Into<String>) {
        self.register(name, || Box::new(C::default()));
    }

    /// Construct a component by type name
    #[must_use]
    pub fn create(&self, name: &str) -> Option<Box<dyn Component>> {
        self.factories.get(name).map(|factory| factory())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
