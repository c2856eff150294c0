//! Scene graph: entity storage, hierarchy and per-frame traversal

use smallvec::SmallVec;

use super::component::ComponentSlot;
use super::{
    Arena, Component, ComponentContext, EntityId, GameObject, ObjectId, SceneError, Transform,
};
use crate::core::IdAllocator;
use crate::math::{Matrix4, Vector3};
use crate::renderer::RenderFrame;

/// A hierarchy of [`GameObject`]s under a permanent root entity.
///
/// Parent/child links are arena ids, and [`Scene::add_child`] refuses any
/// link that would make a node its own ancestor, so the hierarchy is always
/// a forest.
///
/// World matrices are cached per node behind a dirty flag. Any local
/// mutation or reparenting dirties the node and all of its descendants;
/// [`Scene::world_matrix`] and [`Scene::update_matrices`] share that cache.
pub struct Scene {
    name: String,
    objects: Arena<GameObject>,
    root: EntityId,
    /// Nesting depth of running component callbacks
    traversal_depth: u32,
    /// Destroy requests made while callbacks were running
    pending_destroy: Vec<EntityId>,
}

impl Scene {
    /// Create an empty scene with a root entity named "Root"
    pub fn new(name: impl Into<String>, ids: &mut IdAllocator) -> Self {
        Self::with_root(name, ids.allocate(), "Root")
    }

    pub(crate) fn with_root(
        name: impl Into<String>,
        root_id: ObjectId,
        root_name: impl Into<String>,
    ) -> Self {
        let mut objects = Arena::new();
        let root_name = root_name.into();
        let root = objects.insert_with(|entity| GameObject::new(entity, root_id, root_name));
        Self {
            name: name.into(),
            objects,
            root,
            traversal_depth: 0,
            pending_destroy: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The permanent root entity
    #[must_use]
    pub fn root(&self) -> EntityId {
        self.root
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    /// Create a detached entity. Attach it with [`Scene::add_child`].
    pub fn create_entity(&mut self, ids: &mut IdAllocator, name: impl Into<String>) -> EntityId {
        self.create_entity_with_id(ids.allocate(), name)
    }

    pub(crate) fn create_entity_with_id(
        &mut self,
        id: ObjectId,
        name: impl Into<String>,
    ) -> EntityId {
        let name = name.into();
        self.objects
            .insert_with(|entity| GameObject::new(entity, id, name))
    }

    /// Create an entity and attach it under `parent`
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` does not exist
    pub fn spawn(
        &mut self,
        ids: &mut IdAllocator,
        name: impl Into<String>,
        parent: EntityId,
    ) -> Result<EntityId, SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownEntity(parent));
        }
        let entity = self.create_entity(ids, name);
        self.add_child(parent, entity)?;
        Ok(entity)
    }

    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.objects.contains(entity)
    }

    /// Number of live entities, root included
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn object(&self, entity: EntityId) -> Option<&GameObject> {
        self.objects.get(entity)
    }

    pub fn object_mut(&mut self, entity: EntityId) -> Option<&mut GameObject> {
        self.objects.get_mut(entity)
    }

    #[must_use]
    pub fn transform(&self, entity: EntityId) -> Option<&Transform> {
        self.objects.get(entity).map(GameObject::transform)
    }

    /// First entity with the given name, in arena order
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.objects
            .iter()
            .find(|(_, object)| object.name() == name)
            .map(|(id, _)| id)
    }

    #[must_use]
    pub fn find_by_object_id(&self, id: ObjectId) -> Option<EntityId> {
        self.objects
            .iter()
            .find(|(_, object)| object.id() == id)
            .map(|(entity, _)| entity)
    }

    // -------------------------------------------------------------------------
    // Hierarchy
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.transform(entity).and_then(Transform::parent)
    }

    /// Children in sibling order. Empty for unknown entities.
    #[must_use]
    pub fn children(&self, entity: EntityId) -> &[EntityId] {
        match self.transform(entity) {
            Some(transform) => transform.children(),
            None => &[],
        }
    }

    /// Whether `ancestor` is `node` or lies on its parent chain
    #[must_use]
    pub fn is_ancestor(&self, ancestor: EntityId, node: EntityId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Attach `child` as the last child of `parent`.
    ///
    /// The child is first detached from any previous parent, so it is never
    /// listed under two parents.
    ///
    /// # Errors
    ///
    /// Returns an error if either entity is unknown, if `child` is the root,
    /// or if `child` is `parent` or one of its ancestors.
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownEntity(parent));
        }
        if !self.contains(child) {
            return Err(SceneError::UnknownEntity(child));
        }
        if parent == child {
            return Err(SceneError::SelfParent(child));
        }
        if child == self.root {
            return Err(SceneError::RootOperation("reparented"));
        }
        if self.is_ancestor(child, parent) {
            return Err(SceneError::Cycle { parent, child });
        }

        if let Some(previous) = self.parent(child) {
            self.detach(previous, child);
        }

        if let Some(object) = self.objects.get_mut(parent) {
            object.transform_mut().push_child(child);
        }
        if let Some(object) = self.objects.get_mut(child) {
            object.transform_mut().set_parent(Some(parent));
        }
        self.invalidate_subtree(child);
        Ok(())
    }

    /// Detach `child` from `parent`, clearing its parent link.
    ///
    /// Returns `false` if `child` was not a child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if either entity is unknown
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> Result<bool, SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownEntity(parent));
        }
        if !self.contains(child) {
            return Err(SceneError::UnknownEntity(child));
        }
        if self.parent(child) != Some(parent) {
            return Ok(false);
        }
        self.detach(parent, child);
        Ok(true)
    }

    fn detach(&mut self, parent: EntityId, child: EntityId) {
        if let Some(object) = self.objects.get_mut(parent) {
            object.transform_mut().remove_child(child);
        }
        if let Some(object) = self.objects.get_mut(child) {
            object.transform_mut().set_parent(None);
        }
        self.invalidate_subtree(child);
    }

    /// Depth-first pre-order walk starting at `start`, in sibling order
    #[must_use]
    pub fn preorder(&self, start: EntityId) -> Vec<EntityId> {
        let mut order = Vec::new();
        if !self.contains(start) {
            return order;
        }

        let mut stack = vec![start];
        while let Some(entity) = stack.pop() {
            order.push(entity);
            stack.extend(self.children(entity).iter().rev().copied());
        }
        order
    }

    fn invalidate_subtree(&self, entity: EntityId) {
        let mut stack: SmallVec<[EntityId; 16]> = SmallVec::new();
        stack.push(entity);
        while let Some(current) = stack.pop() {
            if let Some(transform) = self.transform(current) {
                transform.invalidate();
                stack.extend(transform.children().iter().copied());
            }
        }
    }

    // -------------------------------------------------------------------------
    // Local transform
    // -------------------------------------------------------------------------

    fn mutate_local(
        &mut self,
        entity: EntityId,
        apply: impl FnOnce(&mut Transform),
    ) -> Result<(), SceneError> {
        let object = self
            .objects
            .get_mut(entity)
            .ok_or(SceneError::UnknownEntity(entity))?;
        apply(object.transform_mut());
        self.invalidate_subtree(entity);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the entity is unknown
    pub fn set_local_position(
        &mut self,
        entity: EntityId,
        position: Vector3,
    ) -> Result<(), SceneError> {
        self.mutate_local(entity, |t| t.set_position(position))
    }

    /// Set the Euler rotation in degrees
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is unknown
    pub fn set_local_rotation(
        &mut self,
        entity: EntityId,
        rotation: Vector3,
    ) -> Result<(), SceneError> {
        self.mutate_local(entity, |t| t.set_rotation(rotation))
    }

    /// # Errors
    ///
    /// Returns an error if the entity is unknown
    pub fn set_local_scale(&mut self, entity: EntityId, scale: Vector3) -> Result<(), SceneError> {
        self.mutate_local(entity, |t| t.set_scale(scale))
    }

    #[must_use]
    pub fn local_matrix(&self, entity: EntityId) -> Option<Matrix4> {
        self.transform(entity).map(Transform::local_matrix)
    }

    // -------------------------------------------------------------------------
    // World transform
    // -------------------------------------------------------------------------

    /// `parent.world × local`, or `local` for an entity without a parent.
    ///
    /// Only the dirty part of the parent chain is recomputed; the walk is
    /// iterative so depth is bounded by memory, not the call stack.
    #[must_use]
    pub fn world_matrix(&self, entity: EntityId) -> Option<Matrix4> {
        if !self.contains(entity) {
            return None;
        }

        let mut dirty_chain: SmallVec<[EntityId; 16]> = SmallVec::new();
        let mut base = Matrix4::IDENTITY;
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            let Some(transform) = self.transform(current) else {
                break;
            };
            if let Some(cached) = transform.cached_world() {
                base = cached;
                break;
            }
            dirty_chain.push(current);
            cursor = transform.parent();
        }

        let mut world = base;
        for &node in dirty_chain.iter().rev() {
            if let Some(transform) = self.transform(node) {
                world = world * transform.local_matrix();
                transform.store_world(world);
            }
        }
        Some(world)
    }

    /// Refresh every cached world matrix, parents before children
    pub fn update_matrices(&self) {
        let roots: Vec<EntityId> = self
            .objects
            .iter()
            .filter(|(_, object)| object.transform().parent().is_none())
            .map(|(id, _)| id)
            .collect();

        for root in roots {
            for entity in self.preorder(root) {
                let _ = self.world_matrix(entity);
            }
        }
    }

    fn parent_world_matrix(&self, entity: EntityId) -> Matrix4 {
        self.parent(entity)
            .and_then(|parent| self.world_matrix(parent))
            .unwrap_or(Matrix4::IDENTITY)
    }

    /// Translation of the world matrix
    #[must_use]
    pub fn world_position(&self, entity: EntityId) -> Option<Vector3> {
        self.world_matrix(entity).map(|m| m.translation())
    }

    /// Place the entity at `position` in world space by solving for its
    /// parent-relative position.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is unknown
    pub fn set_world_position(
        &mut self,
        entity: EntityId,
        position: Vector3,
    ) -> Result<(), SceneError> {
        if !self.contains(entity) {
            return Err(SceneError::UnknownEntity(entity));
        }
        let local = self.parent_world_matrix(entity).invert() * Matrix4::translate(position);
        self.set_local_position(entity, local.translation())
    }

    /// Sum of Euler rotations along the parent chain
    #[must_use]
    pub fn world_rotation(&self, entity: EntityId) -> Option<Vector3> {
        let transform = self.transform(entity)?;
        let mut rotation = transform.rotation();
        let mut cursor = transform.parent();
        while let Some(parent) = cursor.and_then(|p| self.transform(p)) {
            rotation += parent.rotation();
            cursor = parent.parent();
        }
        Some(rotation)
    }

    /// # Errors
    ///
    /// Returns an error if the entity is unknown
    pub fn set_world_rotation(
        &mut self,
        entity: EntityId,
        rotation: Vector3,
    ) -> Result<(), SceneError> {
        if !self.contains(entity) {
            return Err(SceneError::UnknownEntity(entity));
        }
        let parent_rotation = self
            .parent(entity)
            .and_then(|p| self.world_rotation(p))
            .unwrap_or(Vector3::ZERO);
        self.set_local_rotation(entity, rotation - parent_rotation)
    }

    /// Component-wise product of scales along the parent chain
    #[must_use]
    pub fn world_scale(&self, entity: EntityId) -> Option<Vector3> {
        let transform = self.transform(entity)?;
        let mut scale = transform.scale();
        let mut cursor = transform.parent();
        while let Some(parent) = cursor.and_then(|p| self.transform(p)) {
            scale = scale.mul_elements(parent.scale());
            cursor = parent.parent();
        }
        Some(scale)
    }

    /// Solve for the local scale giving `scale` in world space.
    ///
    /// Where the parent's world scale has a zero component the local
    /// component is left as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is unknown
    pub fn set_world_scale(&mut self, entity: EntityId, scale: Vector3) -> Result<(), SceneError> {
        let current = self
            .transform(entity)
            .ok_or(SceneError::UnknownEntity(entity))?
            .scale();
        let parent_scale = self
            .parent(entity)
            .and_then(|p| self.world_scale(p))
            .unwrap_or(Vector3::ONE);

        let solve = |world: f32, parent: f32, local: f32| {
            if parent == 0.0 { local } else { world / parent }
        };
        let local = Vector3::new(
            solve(scale.x, parent_scale.x, current.x),
            solve(scale.y, parent_scale.y, current.y),
            solve(scale.z, parent_scale.z, current.z),
        );
        self.set_local_scale(entity, local)
    }

    // -------------------------------------------------------------------------
    // Components
    // -------------------------------------------------------------------------

    /// Attach a component. Its `start` runs immediately, before any update.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is unknown
    pub fn add_component(
        &mut self,
        entity: EntityId,
        component: impl Component,
    ) -> Result<(), SceneError> {
        self.add_boxed_component(entity, Box::new(component))
    }

    /// # Errors
    ///
    /// Returns an error if the entity is unknown
    pub fn add_boxed_component(
        &mut self,
        entity: EntityId,
        mut component: Box<dyn Component>,
    ) -> Result<(), SceneError> {
        if !self.contains(entity) {
            return Err(SceneError::UnknownEntity(entity));
        }

        self.traversal_depth += 1;
        component.start(&mut ComponentContext::new(self, entity));
        self.traversal_depth -= 1;

        if let Some(object) = self.objects.get_mut(entity) {
            object.components.push(ComponentSlot {
                owner: entity,
                component,
            });
        }
        self.flush_pending_destroy();
        Ok(())
    }

    #[must_use]
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.objects.get(entity)?.get_component::<T>()
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.objects.get_mut(entity)?.get_component_mut::<T>()
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    /// Destroy an entity and its whole subtree.
    ///
    /// Components receive `on_destroy`, children before parents. Requests made
    /// from inside a component callback are carried out once the callback
    /// traversal finishes.
    ///
    /// # Errors
    ///
    /// Returns an error for the root or an unknown entity
    pub fn destroy(&mut self, entity: EntityId) -> Result<(), SceneError> {
        if entity == self.root {
            return Err(SceneError::RootOperation("destroyed"));
        }
        if !self.contains(entity) {
            return Err(SceneError::UnknownEntity(entity));
        }
        if self.traversal_depth > 0 {
            if !self.pending_destroy.contains(&entity) {
                self.pending_destroy.push(entity);
            }
            return Ok(());
        }

        if let Some(parent) = self.parent(entity) {
            self.detach(parent, entity);
        }

        let mut doomed = self.preorder(entity);
        doomed.reverse();

        self.traversal_depth += 1;
        for &node in &doomed {
            let Some(object) = self.objects.get_mut(node) else {
                continue;
            };
            let mut slots = std::mem::take(&mut object.components);
            for slot in &mut slots {
                slot.component
                    .on_destroy(&mut ComponentContext::new(self, slot.owner));
            }
        }
        self.traversal_depth -= 1;

        for node in doomed {
            self.objects.remove(node);
        }
        log::trace!("Destroyed entity {entity}");

        self.flush_pending_destroy();
        Ok(())
    }

    /// Destroy every entity under the root, then drop the root's own
    /// components. Every component receives `on_destroy`, children first.
    pub fn clear(&mut self) {
        let root = self.root;
        for child in self.children(root).to_vec() {
            if let Err(err) = self.destroy(child) {
                log::warn!("Failed to destroy {child} while clearing scene: {err}");
            }
        }

        let Some(object) = self.objects.get_mut(root) else {
            return;
        };
        let mut slots = std::mem::take(&mut object.components);
        self.traversal_depth += 1;
        for slot in &mut slots {
            slot.component
                .on_destroy(&mut ComponentContext::new(self, slot.owner));
        }
        self.traversal_depth -= 1;
        self.flush_pending_destroy();
    }

    fn flush_pending_destroy(&mut self) {
        if self.traversal_depth > 0 {
            return;
        }
        while let Some(entity) = self.pending_destroy.pop() {
            if self.contains(entity) {
                let _ = self.destroy(entity);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    /// Run `call` on every component reachable from the root, pre-order.
    ///
    /// The visit order is fixed before the first callback so reparenting
    /// inside a callback cannot visit an entity twice in one pass.
    fn drive(&mut self, mut call: impl FnMut(&mut dyn Component, &mut ComponentContext<'_>)) {
        let order = self.preorder(self.root);

        self.traversal_depth += 1;
        for entity in order {
            let Some(object) = self.objects.get_mut(entity) else {
                continue;
            };
            let mut slots = std::mem::take(&mut object.components);
            for slot in &mut slots {
                let mut ctx = ComponentContext::new(self, slot.owner);
                call(slot.component.as_mut(), &mut ctx);
            }
            if let Some(object) = self.objects.get_mut(entity) {
                // keep components attached during the callbacks
                slots.append(&mut object.components);
                object.components = slots;
            }
        }
        self.traversal_depth -= 1;

        self.flush_pending_destroy();
    }

    /// Per-frame update of every component reachable from the root
    pub fn update(&mut self, dt: f32) {
        self.drive(|component, ctx| component.update(ctx, dt));
    }

    /// Fixed-step update of every component reachable from the root
    pub fn fixed_update(&mut self, step: f32) {
        self.drive(|component, ctx| component.fixed_update(ctx, step));
    }

    /// Submit every reachable entity's components to `frame`, pre-order.
    pub fn render(&self, frame: &mut RenderFrame<'_>) {
        self.visit_for_render(frame, |component, frame| component.render(frame));
    }

    pub fn debug_render(&self, frame: &mut RenderFrame<'_>) {
        self.visit_for_render(frame, |component, frame| component.debug_render(frame));
    }

    fn visit_for_render(
        &self,
        frame: &mut RenderFrame<'_>,
        call: impl Fn(&dyn Component, &mut RenderFrame<'_>),
    ) {
        for entity in self.preorder(self.root) {
            let Some(object) = self.objects.get(entity) else {
                continue;
            };
            if object.components.is_empty() {
                continue;
            }
            let Some(world) = self.world_matrix(entity) else {
                continue;
            };
            frame.begin_entity(world, object.layer());
            for slot in &object.components {
                call(slot.component.as_ref(), frame);
            }
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("entities", &self.objects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    const EPSILON: f32 = 1e-4;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every callback it receives
    struct Recorder {
        label: &'static str,
        log: Log,
    }

    impl Recorder {
        fn new(label: &'static str, log: &Log) -> Self {
            Self {
                label,
                log: Rc::clone(log),
            }
        }
    }

    impl Component for Recorder {
        fn type_name(&self) -> &'static str {
            "Recorder"
        }

        fn start(&mut self, _ctx: &mut ComponentContext<'_>) {
            self.log.borrow_mut().push(format!("start:{}", self.label));
        }

        fn update(&mut self, _ctx: &mut ComponentContext<'_>, _dt: f32) {
            self.log.borrow_mut().push(format!("update:{}", self.label));
        }

        fn fixed_update(&mut self, _ctx: &mut ComponentContext<'_>, _step: f32) {
            self.log.borrow_mut().push(format!("fixed:{}", self.label));
        }

        fn on_destroy(&mut self, _ctx: &mut ComponentContext<'_>) {
            self.log.borrow_mut().push(format!("destroy:{}", self.label));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// Destroys its own entity on the first update
    struct SelfDestruct;

    impl Component for SelfDestruct {
        fn type_name(&self) -> &'static str {
            "SelfDestruct"
        }

        fn update(&mut self, ctx: &mut ComponentContext<'_>, _dt: f32) {
            let entity = ctx.entity();
            ctx.scene_mut().destroy(entity).unwrap();
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn scene() -> (Scene, IdAllocator) {
        let mut ids = IdAllocator::new();
        let scene = Scene::new("Test", &mut ids);
        (scene, ids)
    }

    #[test]
    fn test_root_world_matrix_is_local() {
        let (mut scene, _) = scene();
        let root = scene.root();
        scene
            .set_local_position(root, Vector3::new(2.0, 3.0, 0.0))
            .unwrap();
        scene
            .set_local_rotation(root, Vector3::new(0.0, 0.0, 30.0))
            .unwrap();

        assert_eq!(scene.world_matrix(root), scene.local_matrix(root));
    }

    #[test]
    fn test_world_matrix_composes_parent() {
        let (mut scene, mut ids) = scene();
        let parent = scene.spawn(&mut ids, "Parent", scene.root()).unwrap();
        let child = scene.spawn(&mut ids, "Child", parent).unwrap();

        scene
            .set_local_position(parent, Vector3::new(1.0, 2.0, 0.0))
            .unwrap();
        scene
            .set_local_rotation(parent, Vector3::new(0.0, 0.0, 45.0))
            .unwrap();
        scene
            .set_local_scale(parent, Vector3::new(2.0, 2.0, 1.0))
            .unwrap();
        scene
            .set_local_position(child, Vector3::new(0.5, 0.0, 0.0))
            .unwrap();

        let expected = scene.world_matrix(parent).unwrap() * scene.local_matrix(child).unwrap();
        assert!(scene.world_matrix(child).unwrap().abs_diff_eq(&expected, EPSILON));
    }

    #[test]
    fn test_grandchild_world_position() {
        let (mut scene, mut ids) = scene();
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        let b = scene.spawn(&mut ids, "B", a).unwrap();
        scene.set_local_position(a, Vector3::new(1.0, 0.0, 0.0)).unwrap();
        scene.set_local_position(b, Vector3::new(0.0, 1.0, 0.0)).unwrap();

        let world = scene.world_position(b).unwrap();
        assert!(world.abs_diff_eq(Vector3::new(1.0, 1.0, 0.0), EPSILON));
    }

    #[test]
    fn test_set_world_position_round_trips() {
        let (mut scene, mut ids) = scene();
        let parent = scene.spawn(&mut ids, "Parent", scene.root()).unwrap();
        let child = scene.spawn(&mut ids, "Child", parent).unwrap();
        let target = Vector3::new(-3.0, 4.5, 1.0);

        // identity parent
        scene.set_world_position(child, target).unwrap();
        assert!(scene.world_position(child).unwrap().abs_diff_eq(target, EPSILON));

        // translated parent
        scene.set_local_position(parent, Vector3::new(10.0, -2.0, 0.0)).unwrap();
        scene.set_world_position(child, target).unwrap();
        assert!(scene.world_position(child).unwrap().abs_diff_eq(target, EPSILON));

        // rotated and scaled parent
        scene.set_local_rotation(parent, Vector3::new(0.0, 0.0, 72.0)).unwrap();
        scene.set_local_scale(parent, Vector3::new(0.5, 3.0, 2.0)).unwrap();
        scene.set_world_position(child, target).unwrap();
        assert!(scene.world_position(child).unwrap().abs_diff_eq(target, EPSILON));
    }

    #[test]
    fn test_moving_parent_invalidates_children() {
        let (mut scene, mut ids) = scene();
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        let b = scene.spawn(&mut ids, "B", a).unwrap();
        scene.update_matrices();
        assert!(!scene.transform(b).unwrap().is_dirty());

        scene.set_local_position(a, Vector3::new(0.0, 5.0, 0.0)).unwrap();
        assert!(scene.transform(b).unwrap().is_dirty());
        assert!(scene.world_position(b).unwrap().abs_diff_eq(Vector3::new(0.0, 5.0, 0.0), EPSILON));
    }

    #[test]
    fn test_world_rotation_and_scale_accumulate() {
        let (mut scene, mut ids) = scene();
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        let b = scene.spawn(&mut ids, "B", a).unwrap();
        scene.set_local_rotation(a, Vector3::new(0.0, 0.0, 30.0)).unwrap();
        scene.set_local_scale(a, Vector3::new(2.0, 0.0, 1.0)).unwrap();
        scene.set_local_scale(b, Vector3::new(1.5, 4.0, 1.0)).unwrap();

        scene.set_world_rotation(b, Vector3::new(0.0, 0.0, 90.0)).unwrap();
        assert_eq!(scene.transform(b).unwrap().rotation().z, 60.0);
        assert_eq!(scene.world_rotation(b).unwrap().z, 90.0);

        scene.set_world_scale(b, Vector3::new(3.0, 7.0, 1.0)).unwrap();
        let local = scene.transform(b).unwrap().scale();
        assert_eq!(local.x, 1.5);
        assert_eq!(local.y, 4.0, "zero parent scale leaves the component alone");
        assert_eq!(scene.world_scale(b).unwrap().x, 3.0);
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let (mut scene, mut ids) = scene();
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        let b = scene.spawn(&mut ids, "B", a).unwrap();
        let c = scene.spawn(&mut ids, "C", b).unwrap();

        assert_eq!(scene.add_child(a, a), Err(SceneError::SelfParent(a)));
        assert_eq!(
            scene.add_child(c, a),
            Err(SceneError::Cycle {
                parent: c,
                child: a
            })
        );
        assert_eq!(
            scene.add_child(a, scene.root()),
            Err(SceneError::RootOperation("reparented"))
        );
        assert_eq!(scene.parent(a), Some(scene.root()));
    }

    #[test]
    fn test_add_child_detaches_from_previous_parent() {
        let (mut scene, mut ids) = scene();
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        let b = scene.spawn(&mut ids, "B", scene.root()).unwrap();
        let child = scene.spawn(&mut ids, "Child", a).unwrap();

        scene.add_child(b, child).unwrap();
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.children(b), &[child]);
        assert_eq!(scene.parent(child), Some(b));
    }

    #[test]
    fn test_remove_child_clears_parent() {
        let (mut scene, mut ids) = scene();
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        let b = scene.spawn(&mut ids, "B", scene.root()).unwrap();

        assert!(!scene.remove_child(a, b).unwrap());
        assert!(scene.remove_child(scene.root(), b).unwrap());
        assert_eq!(scene.parent(b), None);
        assert_eq!(scene.children(scene.root()), &[a]);
    }

    #[test]
    fn test_update_runs_preorder_after_start() {
        let (mut scene, mut ids) = scene();
        let log = Log::default();
        let root = scene.root();
        let a = scene.spawn(&mut ids, "A", root).unwrap();
        let a1 = scene.spawn(&mut ids, "A1", a).unwrap();
        let b = scene.spawn(&mut ids, "B", root).unwrap();
        let detached = scene.create_entity(&mut ids, "Detached");

        scene.add_component(b, Recorder::new("b", &log)).unwrap();
        scene.add_component(a1, Recorder::new("a1", &log)).unwrap();
        scene.add_component(a, Recorder::new("a", &log)).unwrap();
        scene.add_component(root, Recorder::new("root", &log)).unwrap();
        scene.add_component(detached, Recorder::new("detached", &log)).unwrap();

        scene.update(0.016);
        scene.fixed_update(0.02);

        assert_eq!(
            *log.borrow(),
            vec![
                "start:b",
                "start:a1",
                "start:a",
                "start:root",
                "start:detached",
                "update:root",
                "update:a",
                "update:a1",
                "update:b",
                "fixed:root",
                "fixed:a",
                "fixed:a1",
                "fixed:b",
            ]
        );
    }

    #[test]
    fn test_destroy_removes_subtree_children_first() {
        let (mut scene, mut ids) = scene();
        let log = Log::default();
        let a = scene.spawn(&mut ids, "A", scene.root()).unwrap();
        let b = scene.spawn(&mut ids, "B", a).unwrap();
        scene.add_component(a, Recorder::new("a", &log)).unwrap();
        scene.add_component(b, Recorder::new("b", &log)).unwrap();
        log.borrow_mut().clear();

        scene.destroy(a).unwrap();
        assert_eq!(*log.borrow(), vec!["destroy:b", "destroy:a"]);
        assert!(!scene.contains(a));
        assert!(!scene.contains(b));
        assert!(scene.children(scene.root()).is_empty());
        assert_eq!(
            scene.destroy(scene.root()),
            Err(SceneError::RootOperation("destroyed"))
        );
    }

    #[test]
    fn test_clear_destroys_everything_but_root() {
        let (mut scene, mut ids) = scene();
        let log = Log::default();
        let root = scene.root();
        let a = scene.spawn(&mut ids, "A", root).unwrap();
        let b = scene.spawn(&mut ids, "B", a).unwrap();
        scene.add_component(root, Recorder::new("root", &log)).unwrap();
        scene.add_component(a, Recorder::new("a", &log)).unwrap();
        scene.add_component(b, Recorder::new("b", &log)).unwrap();
        log.borrow_mut().clear();

        scene.clear();
        assert_eq!(*log.borrow(), vec!["destroy:b", "destroy:a", "destroy:root"]);
        assert!(scene.contains(root));
        assert!(!scene.contains(a));
        assert!(scene.children(root).is_empty());
        assert_eq!(scene.entity_count(), 1);
    }

    #[test]
    fn test_destroy_during_update_is_deferred() {
        let (mut scene, mut ids) = scene();
        let log = Log::default();
        let doomed = scene.spawn(&mut ids, "Doomed", scene.root()).unwrap();
        scene.add_component(doomed, SelfDestruct).unwrap();
        scene.add_component(doomed, Recorder::new("after", &log)).unwrap();

        scene.update(0.016);

        // the rest of the entity's components still ran this frame
        assert!(log.borrow().contains(&"update:after".to_string()));
        assert!(log.borrow().contains(&"destroy:after".to_string()));
        assert!(!scene.contains(doomed));
        assert_eq!(scene.entity_count(), 1);
    }

    #[test]
    fn test_find_and_component_lookup() {
        let (mut scene, mut ids) = scene();
        let log = Log::default();
        let a = scene.spawn(&mut ids, "Player", scene.root()).unwrap();
        scene.add_component(a, Recorder::new("player", &log)).unwrap();

        assert_eq!(scene.find_by_name("Player"), Some(a));
        let object_id = scene.object(a).unwrap().id();
        assert_eq!(scene.find_by_object_id(object_id), Some(a));
        assert_eq!(scene.get_component::<Recorder>(a).unwrap().label, "player");
        assert!(scene.get_component::<SelfDestruct>(a).is_none());
    }
}
