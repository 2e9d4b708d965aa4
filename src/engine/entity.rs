//! Generational entity handles and the slot allocator.
//!
//! An [`Entity`] packs a slot index and a version. Destroying an entity bumps
//! the slot's version, so stale handles are detected instead of aliasing the
//! slot's next occupant.
//!
//! Allocation and placement are separate steps. [`Entities::spawn`] makes an
//! identity alive without a table location; the store places it afterwards.
//! While recording, the store reserves identities this way and only places
//! them when the queued create is replayed.

use std::fmt;

use crate::engine::error::CapacityError;
use crate::engine::types::{ArchetypeID, EntityID, IndexID, RowID, VersionID, INDEX_BITS, INDEX_MASK};

/// Opaque, generational entity identifier.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(pub EntityID);

#[inline]
const fn make_id(index: IndexID, version: VersionID) -> EntityID {
    ((version as EntityID) << INDEX_BITS) | (index as EntityID)
}

impl Entity {
    /// Slot index.
    #[inline]
    pub fn index(self) -> IndexID {
        (self.0 & INDEX_MASK) as IndexID
    }

    /// Slot generation.
    #[inline]
    pub fn version(self) -> VersionID {
        (self.0 >> INDEX_BITS) as VersionID
    }

    /// Raw packed id.
    #[inline]
    pub fn to_bits(self) -> EntityID {
        self.0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.version())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.version())
    }
}

/// Where an entity's row lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// Owning archetype.
    pub archetype: ArchetypeID,
    /// Row within the archetype.
    pub row: RowID,
}

/// Slot allocator with a free list.
///
/// ## Invariants
/// - A slot is either alive or on the free list, never both.
/// - `locations[i]` is `None` for dead slots and for reserved slots that the
///   store has not yet placed.

#[derive(Default)]
pub struct Entities {
    versions: Vec<VersionID>,
    alive: Vec<bool>,
    locations: Vec<Option<EntityLocation>>,
    free_store: Vec<IndexID>,
    live_count: usize,
}

impl Entities {
    /// Creates an allocator with `capacity` slots reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            versions: Vec::with_capacity(capacity),
            alive: Vec::with_capacity(capacity),
            locations: Vec::with_capacity(capacity),
            free_store: Vec::new(),
            live_count: 0,
        }
    }

    /// Allocates an identity, alive but not yet placed in any table.
    ///
    /// Freed slots are reused first, lowest-freed-last.
    pub fn spawn(&mut self) -> Result<Entity, CapacityError> {
        let index = match self.free_store.pop() {
            Some(index) => index,
            None => {
                let next = self.versions.len() as u64;
                if next > INDEX_MASK {
                    return Err(CapacityError { needed: next + 1, capacity: INDEX_MASK + 1 });
                }
                self.versions.push(0);
                self.alive.push(false);
                self.locations.push(None);
                next as IndexID
            }
        };

        let slot = index as usize;
        self.alive[slot] = true;
        self.locations[slot] = None;
        self.live_count += 1;
        Ok(Entity(make_id(index, self.versions[slot])))
    }

    /// Frees the slot of a live entity. Returns `false` for stale handles.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = entity.index() as usize;
        self.versions[slot] = self.versions[slot].wrapping_add(1);
        self.alive[slot] = false;
        self.locations[slot] = None;
        self.free_store.push(entity.index());
        self.live_count -= 1;
        true
    }

    /// Returns `true` if `entity` names the current occupant of a live slot.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index() as usize;
        slot < self.versions.len() && self.alive[slot] && self.versions[slot] == entity.version()
    }

    /// Current table location, if alive and placed.
    #[inline]
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        if self.is_alive(entity) {
            self.locations[entity.index() as usize]
        } else {
            None
        }
    }

    /// Records where a live entity's row lives.
    pub fn set_location(&mut self, entity: Entity, location: EntityLocation) {
        debug_assert!(self.is_alive(entity), "set_location on dead entity {entity}");
        if self.is_alive(entity) {
            self.locations[entity.index() as usize] = Some(location);
        }
    }

    /// Number of live identities, placed or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns `true` when no identity is alive.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Snapshot of every live identity in slot order.
    pub fn alive(&self) -> Vec<Entity> {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, &alive)| alive)
            .map(|(slot, _)| Entity(make_id(slot as IndexID, self.versions[slot])))
            .collect()
    }
}
