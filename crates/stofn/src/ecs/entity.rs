//! # Entity — Stable Identities for Scene Objects
//!
//! An [`Entity`] carries no data of its own. Every subsystem that wants to
//! attach something to an object keeps its own [`Pool`](super::pool::Pool)
//! keyed by the same entity values, and the [`Scene`](crate::scene::Scene)
//! decides when an identity dies.
//!
//! ## Slots and Generations
//!
//! Slots are recycled, so a bare slot number can't tell "the object I saved"
//! apart from "whatever lives in that slot now". Each slot therefore carries a
//! generation that is bumped every time the slot is released, and a handle
//! is only valid while its generation matches:
//!
//! ```text
//! create "Lamp"    -> (slot 5, gen 0)    saved by the renderer
//! release          -> slot 5 now gen 1, pushed on the free list
//! create "Crate"   -> (slot 5, gen 1)
//! renderer lookup  -> (slot 5, gen 0) != gen 1, rejected
//! ```
//!
//! Freed slots are handed out lowest-index first, so the id space stays dense
//! under churn.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use super::pool::Pool;

/// A lightweight handle to an object owned by an [`EntityAllocator`].
///
/// Equality is slot + generation equality. [`Entity::NIL`] is never issued by
/// an allocator and denotes "no object".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    /// Slot index in the allocator. This is recycled when the entity is released.
    pub(crate) index: u32,
    /// Generation counter. Incremented each time this slot is released, so
    /// stale handles can be detected.
    pub(crate) generation: u32,
}

impl Entity {
    /// The reserved "no object" handle.
    pub const NIL: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Returns `true` if this is [`Entity::NIL`].
    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }

    /// Slot number, shared by every generation of this slot.
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NIL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "Entity(NIL)")
        } else {
            write!(f, "Entity({}v{})", self.index, self.generation)
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "NIL")
        } else {
            write!(f, "{}v{}", self.index, self.generation)
        }
    }
}

/// Issues and recycles entity IDs, and labels every live one.
///
/// ```text
/// generations: [0, 1, 0, 2, 0]   current generation of every slot
/// free_list:   {1, 3}            released slots, lowest popped first
/// names:       Pool<(String,)>   one row per live entity
/// ```
pub struct EntityAllocator {
    generations: Vec<u32>,
    /// Indices of released entities, available for reuse (lowest first).
    free_list: BinaryHeap<Reverse<u32>>,
    /// Label column for live entities. Doubles as the live set.
    names: Pool<(String,)>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            free_list: BinaryHeap::new(),
            names: Pool::new(),
        }
    }

    /// Create an allocator with room for `capacity` live objects.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generations: Vec::with_capacity(capacity),
            free_list: BinaryHeap::new(),
            names: Pool::with_capacity(capacity),
        }
    }

    /// Allocate a new [`Entity`] labelled `label`. Reuses the lowest freed slot
    /// if one is available, otherwise allocates a fresh index.
    ///
    /// # Panics
    ///
    /// Panics if the 32-bit id space is exhausted.
    pub fn create(&mut self, label: &str) -> Entity {
        let entity = if let Some(Reverse(index)) = self.free_list.pop() {
            // Generation was bumped on release.
            Entity {
                index,
                generation: self.generations[index as usize],
            }
        } else {
            let index = match u32::try_from(self.generations.len()) {
                Ok(index) if index != u32::MAX => index,
                _ => panic!("entity id space exhausted"),
            };
            self.generations.push(0);
            Entity {
                index,
                generation: 0,
            }
        };

        let appended = self.names.try_append(entity, (label.to_owned(),));
        assert!(appended, "freshly allocated {entity:?} was already live");
        entity
    }

    /// Release an entity, making its slot available for reuse.
    ///
    /// Returns `true` if the entity was valid and released, `false` if it was
    /// stale or NIL. Releasing twice is a harmless no-op.
    pub fn release(&mut self, entity: Entity) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        let slot = &mut self.generations[entity.index as usize];
        *slot = slot.wrapping_add(1);
        self.free_list.push(Reverse(entity.index));
        self.names.try_release_swap(entity);
        true
    }

    /// Slot in range and generation current.
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.generations
            .get(entity.index as usize)
            .is_some_and(|&generation| generation == entity.generation)
    }

    /// The label given to `entity`, if it is live.
    pub fn name(&self, entity: Entity) -> Option<&str> {
        self.names.try_get::<0>(entity).map(String::as_str)
    }

    /// Replace the label of a live entity. Returns `false` for stale handles.
    pub fn try_rename(&mut self, entity: Entity, label: &str) -> bool {
        match self.names.try_get_mut::<0>(entity) {
            Some(name) => {
                label.clone_into(name);
                true
            }
            None => false,
        }
    }

    /// First live entity whose label equals `label`, in storage order.
    ///
    /// This is a linear scan; labels are not unique and not indexed.
    pub fn find(&self, label: &str) -> Option<Entity> {
        self.names
            .column::<0>()
            .iter()
            .position(|name| name == label)
            .map(|index| self.names.handle_by_index(index))
    }

    /// Live entities in storage order (unstable across releases).
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.names.handles().iter().copied()
    }

    /// Live entities.
    pub fn alive_count(&self) -> usize {
        self.names.count()
    }

    /// Released slots waiting for reuse.
    #[cfg(any(feature = "diagnostics", test))]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Slots ever handed out, live or free.
    #[cfg(any(feature = "diagnostics", test))]
    pub fn total_slots(&self) -> usize {
        self.generations.len()
    }

    /// Assert the live set and the slot bookkeeping agree.
    pub fn sanity_check(&self) {
        self.names.sanity_check();
        assert_eq!(
            self.names.count() + self.free_list.len(),
            self.generations.len(),
            "live + free slots must cover every allocated slot"
        );
        for entity in self.iter() {
            assert!(self.is_valid(entity), "{entity:?} is named but stale");
        }
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
