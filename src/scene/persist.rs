//! Persisted scene layout
//!
//! A scene is stored as a tree of [`EntityData`] rooted at the scene root.
//! Component state is a flat property bag; references to other entities are
//! stored as location paths such as `Root/Player/Weapon`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ComponentRegistry, EntityId, ObjectId, PropertyValue, Scene, SceneError};
use crate::core::{IdAllocator, LayerRegistry};
use crate::math::Vector3;

/// Current persisted layout version
pub const SCENE_FORMAT_VERSION: u32 = 1;

/// A serializable scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    pub name: String,
    pub version: u32,
    pub root: EntityData,
}

/// One entity and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub id: ObjectId,
    pub name: String,
    /// Layer name, resolved through the [`LayerRegistry`] on load
    #[serde(default = "default_layer_name")]
    pub layer: String,
    #[serde(default)]
    pub position: Vector3,
    #[serde(default)]
    pub rotation: Vector3,
    #[serde(default = "default_scale")]
    pub scale: Vector3,
    #[serde(default)]
    pub components: Vec<ComponentData>,
    #[serde(default)]
    pub children: Vec<EntityData>,
}

fn default_layer_name() -> String {
    crate::core::DEFAULT_LAYER_NAME.to_string()
}

fn default_scale() -> Vector3 {
    Vector3::ONE
}

/// A component type name plus its properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentData {
    pub type_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl SceneData {
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_ron_string(&self) -> Result<String, SceneError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SceneError::Serialize(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns an error if the text is not a valid scene
    pub fn from_ron_str(content: &str) -> Result<Self, SceneError> {
        ron::from_str(content).map_err(|e| SceneError::Deserialize(e.to_string()))
    }

    /// Save scene to a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails
    pub fn save_ron(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let ron_string = self.to_ron_string()?;
        fs::write(path, ron_string).map_err(|e| SceneError::Io(e.to_string()))?;
        log::info!("Scene '{}' saved to RON", self.name);
        Ok(())
    }

    /// Load scene from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if file reading or deserialization fails
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let content = fs::read_to_string(path).map_err(|e| SceneError::Io(e.to_string()))?;
        let scene = Self::from_ron_str(&content)?;
        log::info!("Scene '{}' loaded from RON", scene.name);
        Ok(scene)
    }

    /// Save scene to a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let json_string =
            serde_json::to_string_pretty(self).map_err(|e| SceneError::Serialize(e.to_string()))?;
        fs::write(path, json_string).map_err(|e| SceneError::Io(e.to_string()))?;
        log::info!("Scene '{}' saved to JSON", self.name);
        Ok(())
    }

    /// Load scene from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if file reading or deserialization fails
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let content = fs::read_to_string(path).map_err(|e| SceneError::Io(e.to_string()))?;
        let scene: Self =
            serde_json::from_str(&content).map_err(|e| SceneError::Deserialize(e.to_string()))?;
        log::info!("Scene '{}' loaded from JSON", scene.name);
        Ok(scene)
    }

    /// Total number of entities, root included
    #[must_use]
    pub fn entity_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![&self.root];
        while let Some(entity) = stack.pop() {
            count += 1;
            stack.extend(entity.children.iter());
        }
        count
    }
}

impl Scene {
    /// Snapshot the hierarchy reachable from the root.
    ///
    /// Detached entities are not persisted.
    #[must_use]
    pub fn to_data(&self, layers: &LayerRegistry) -> SceneData {
        SceneData {
            name: self.name().to_string(),
            version: SCENE_FORMAT_VERSION,
            root: self.entity_data(self.root(), layers),
        }
    }

    fn entity_data(&self, entity: EntityId, layers: &LayerRegistry) -> EntityData {
        let Some(object) = self.object(entity) else {
            return EntityData {
                id: 0,
                name: String::new(),
                layer: default_layer_name(),
                position: Vector3::ZERO,
                rotation: Vector3::ZERO,
                scale: Vector3::ONE,
                components: Vec::new(),
                children: Vec::new(),
            };
        };
        let transform = object.transform();

        let components = object
            .components()
            .map(|component| ComponentData {
                type_name: component.type_name().to_string(),
                properties: component
                    .properties()
                    .into_iter()
                    .map(|p| (p.name.to_string(), p.value))
                    .collect(),
            })
            .collect();

        EntityData {
            id: object.id(),
            name: object.name().to_string(),
            layer: layers
                .name_of(object.layer())
                .unwrap_or(crate::core::DEFAULT_LAYER_NAME)
                .to_string(),
            position: transform.position(),
            rotation: transform.rotation(),
            scale: transform.scale(),
            components,
            children: transform
                .children()
                .iter()
                .map(|&child| self.entity_data(child, layers))
                .collect(),
        }
    }

    /// Rebuild a scene from persisted data.
    ///
    /// Unknown component types and properties that fail to apply are logged
    /// and skipped; the rest of the scene still loads. The id allocator is
    /// advanced past every loaded id.
    #[must_use]
    pub fn from_data(
        data: &SceneData,
        ids: &mut IdAllocator,
        layers: &LayerRegistry,
        registry: &ComponentRegistry,
    ) -> Self {
        if data.version != SCENE_FORMAT_VERSION {
            log::warn!(
                "Scene '{}' has format version {} (expected {SCENE_FORMAT_VERSION})",
                data.name,
                data.version
            );
        }

        ids.observe(data.root.id);
        let mut scene = Self::with_root(data.name.clone(), data.root.id, data.root.name.clone());
        let root = scene.root();
        scene.apply_entity_data(root, &data.root, layers, registry);

        let mut pending: Vec<(EntityId, &EntityData)> = data
            .root
            .children
            .iter()
            .rev()
            .map(|child| (root, child))
            .collect();

        while let Some((parent, entry)) = pending.pop() {
            ids.observe(entry.id);
            let entity = scene.create_entity_with_id(entry.id, entry.name.clone());
            if let Err(e) = scene.add_child(parent, entity) {
                log::warn!("Failed to attach '{}': {e}", entry.name);
            }
            scene.apply_entity_data(entity, entry, layers, registry);
            pending.extend(entry.children.iter().rev().map(|child| (entity, child)));
        }

        log::info!(
            "Built scene '{}' with {} entities",
            scene.name(),
            scene.entity_count()
        );
        scene
    }

    fn apply_entity_data(
        &mut self,
        entity: EntityId,
        data: &EntityData,
        layers: &LayerRegistry,
        registry: &ComponentRegistry,
    ) {
        let layer = layers.get_layer_bit(&data.layer).unwrap_or_else(|| {
            log::warn!(
                "Entity '{}' uses unknown layer '{}', using default",
                data.name,
                data.layer
            );
            crate::core::DEFAULT_LAYER
        });

        if let Some(object) = self.object_mut(entity) {
            object.set_layer(layer);
            let transform = object.transform_mut();
            transform.set_position(data.position);
            transform.set_rotation(data.rotation);
            transform.set_scale(data.scale);
        }

        for component_data in &data.components {
            let Some(mut component) = registry.create(&component_data.type_name) else {
                log::warn!(
                    "Skipping unknown component '{}' on entity '{}'",
                    component_data.type_name,
                    data.name
                );
                continue;
            };

            for (name, value) in &component_data.properties {
                if let Err(e) = component.set_property(name, value) {
                    log::error!(
                        "Failed to apply property on '{}' ({}): {e}",
                        data.name,
                        component_data.type_name
                    );
                }
            }

            if let Err(e) = self.add_boxed_component(entity, component) {
                log::warn!(
                    "Failed to attach component {} to '{}': {e}",
                    component_data.type_name,
                    data.name
                );
            }
        }
    }

    /// Slash-separated names from the root down to `entity`
    #[must_use]
    pub fn path_of(&self, entity: EntityId) -> Option<String> {
        let mut names = Vec::new();
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            names.push(self.object(current)?.name());
            cursor = self.parent(current);
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Resolve a location path produced by [`Scene::path_of`]
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<EntityId> {
        let mut segments = path.split('/');
        let first = segments.next()?;
        let root = self.root();
        if self.object(root)?.name() != first {
            return None;
        }

        segments.try_fold(root, |current, segment| {
            self.children(current)
                .iter()
                .copied()
                .find(|&child| self.object(child).is_some_and(|o| o.name() == segment))
        })
    }
}
