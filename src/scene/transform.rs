//! Hierarchical transform node
//!
//! A [`Transform`] holds the parent-relative ("local") position, rotation and
//! scale of one entity plus its links into the hierarchy. World-space queries
//! need the whole parent chain, so they live on [`Scene`](super::Scene).

use std::cell::Cell;

use smallvec::SmallVec;

use super::EntityId;
use crate::math::{Matrix4, Vector3};

/// Local transform and hierarchy links of one entity.
///
/// Rotation is an Euler vector in degrees. Only the Z component takes part in
/// the local matrix; X and Y are carried for 3D tooling and persistence.
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vector3,
    rotation: Vector3,
    scale: Vector3,

    /// Owning entity
    owner: EntityId,
    parent: Option<EntityId>,
    /// Sibling order is display order; it does not affect matrices
    children: SmallVec<[EntityId; 8]>,

    /// Cached world matrix, valid while `dirty` is false
    world_cache: Cell<Matrix4>,
    dirty: Cell<bool>,
}

impl Transform {
    pub(crate) fn new(owner: EntityId) -> Self {
        Self {
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
            scale: Vector3::ONE,
            owner,
            parent: None,
            children: SmallVec::new(),
            world_cache: Cell::new(Matrix4::IDENTITY),
            dirty: Cell::new(true),
        }
    }

    // -------------------------------------------------------------------------
    // Local state
    // -------------------------------------------------------------------------

    #[must_use]
    #[inline]
    pub fn position(&self) -> Vector3 {
        self.position
    }

    #[must_use]
    #[inline]
    pub fn rotation(&self) -> Vector3 {
        self.rotation
    }

    #[must_use]
    #[inline]
    pub fn scale(&self) -> Vector3 {
        self.scale
    }

    /// `translate × rotate(z) × scale`
    #[must_use]
    pub fn local_matrix(&self) -> Matrix4 {
        Matrix4::translate(self.position)
            * Matrix4::rotate(self.rotation.z, Vector3::Z)
            * Matrix4::scale(self.scale)
    }

    // Setters only touch this node. The scene invalidates descendants.

    pub(crate) fn set_position(&mut self, position: Vector3) {
        self.position = position;
        self.dirty.set(true);
    }

    pub(crate) fn set_rotation(&mut self, rotation: Vector3) {
        self.rotation = rotation;
        self.dirty.set(true);
    }

    pub(crate) fn set_scale(&mut self, scale: Vector3) {
        self.scale = scale;
        self.dirty.set(true);
    }

    // -------------------------------------------------------------------------
    // Hierarchy links
    // -------------------------------------------------------------------------

    #[must_use]
    #[inline]
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    #[must_use]
    #[inline]
    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    #[must_use]
    #[inline]
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub(crate) fn set_parent(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
        self.dirty.set(true);
    }

    pub(crate) fn push_child(&mut self, child: EntityId) {
        self.children.push(child);
    }

    pub(crate) fn remove_child(&mut self, child: EntityId) -> bool {
        if let Some(pos) = self.children.iter().position(|&c| c == child) {
            self.children.remove(pos);
            true
        } else {
            false
        }
    }

    // -------------------------------------------------------------------------
    // World matrix cache
    // -------------------------------------------------------------------------

    pub(crate) fn cached_world(&self) -> Option<Matrix4> {
        if self.dirty.get() {
            None
        } else {
            Some(self.world_cache.get())
        }
    }

    pub(crate) fn store_world(&self, world: Matrix4) {
        self.world_cache.set(world);
        self.dirty.set(false);
    }

    pub(crate) fn invalidate(&self) {
        self.dirty.set(true);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }
}
