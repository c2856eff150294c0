//! Generational arena for scene nodes
//!
//! Nodes are stored contiguously and addressed by an index plus a generation
//! counter. Releasing a slot bumps its generation, so ids handed out before
//! the release stop resolving instead of aliasing whatever reuses the slot.

// ============================================================================
// Arena Id
// ============================================================================

/// Handle to a slot in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId {
    index: u32,
    generation: u32,
}

impl ArenaId {
    /// Raw slot index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[must_use]
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for ArenaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

// ============================================================================
// Slots
// ============================================================================

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    /// Free slot linking to the next free slot (or `NONE`)
    Vacant { generation: u32, next_free: usize },
}

// ============================================================================
// Arena
// ============================================================================

/// Slot storage with a free list for O(1) insert and remove.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: usize,
    len: usize,
}

impl<T> Arena<T> {
    const NONE: usize = usize::MAX;

    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: Self::NONE,
            len: 0,
        }
    }

    /// Insert a value, returning its id.
    pub fn insert(&mut self, value: T) -> ArenaId {
        self.insert_with(|_| value)
    }

    /// Insert a value built from its own id.
    ///
    /// Used when the stored value needs a back-reference to its slot.
    pub fn insert_with(&mut self, build: impl FnOnce(ArenaId) -> T) -> ArenaId {
        self.len += 1;

        if self.free_head != Self::NONE {
            let index = self.free_head;
            let generation = match self.slots[index] {
                Slot::Vacant {
                    generation,
                    next_free,
                } => {
                    self.free_head = next_free;
                    generation
                }
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };

            let id = ArenaId {
                index: index as u32,
                generation,
            };
            self.slots[index] = Slot::Occupied {
                generation,
                value: build(id),
            };
            id
        } else {
            let id = ArenaId {
                index: self.slots.len() as u32,
                generation: 0,
            };
            self.slots.push(Slot::Occupied {
                generation: 0,
                value: build(id),
            });
            id
        }
    }

    /// Remove a value. Returns `None` for stale or unknown ids.
    pub fn remove(&mut self, id: ArenaId) -> Option<T> {
        let index = id.index();
        match self.slots.get(index) {
            Some(Slot::Occupied { generation, .. }) if *generation == id.generation => {}
            _ => return None,
        }

        let vacant = Slot::Vacant {
            generation: id.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let previous = std::mem::replace(&mut self.slots[index], vacant);
        self.free_head = index;
        self.len -= 1;

        match previous {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn get(&self, id: ArenaId) -> Option<&T> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, id: ArenaId) -> Option<&mut T> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn contains(&self, id: ArenaId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live values with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => Some((
                    ArenaId {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(b), Some("b"));
        assert_eq!(arena.len(), 1);
        assert!(arena.get(b).is_none());
        assert!(arena.remove(b).is_none(), "double remove should be rejected");
    }

    #[test]
    fn test_reused_slot_rejects_stale_id() {
        let mut arena = Arena::new();
        let old = arena.insert(1);
        arena.remove(old);

        let new = arena.insert(2);
        assert_eq!(old.index(), new.index(), "slot should be reused");
        assert_ne!(old.generation(), new.generation());
        assert!(arena.get(old).is_none());
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_insert_with_sees_own_id() {
        let mut arena = Arena::new();
        let id = arena.insert_with(|id| id);
        assert_eq!(arena.get(id), Some(&id));
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut arena = Arena::new();
        arena.insert(10);
        let gap = arena.insert(20);
        arena.insert(30);
        arena.remove(gap);

        let values: Vec<i32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10, 30]);
    }
}
