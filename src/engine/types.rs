//! Core identifiers, signatures and event vocabulary.
//!
//! This module defines the **small, copyable types** shared by every other
//! part of the store: entity and component identifiers, archetype ids, the
//! per-table version counter type, the bitset [`Signature`] used as the
//! canonical key of an archetype, and the event kinds observers subscribe to.
//!
//! ## Entity Representation
//!
//! Entities are encoded as a packed 64-bit integer:
//!
//! ```text
//! | version (32) | index (32) |
//! ```
//!
//! - **Index** identifies the slot in the entity allocator.
//! - **Version** is bumped every time the slot is freed, so a handle to a
//!   destroyed entity never aliases the slot's next occupant.
//!
//! ## Signatures
//!
//! A [`Signature`] is a fixed-size bitset over [`ComponentID`]s. Two entities
//! with the same set of component kinds always produce the same signature,
//! regardless of the order in which components were added, which makes it the
//! lookup key for archetype creation.

/// Globally unique entity identifier encoded as a packed 64-bit value.
pub type EntityID = u64;
/// Slot index inside the entity allocator.
pub type IndexID = u32;
/// Generation counter used to detect stale entities.
pub type VersionID = u32;

/// Unique identifier for a registered component kind.
pub type ComponentID = u16;
/// Unique identifier for an archetype (table).
pub type ArchetypeID = u32;
/// Row index within an archetype.
pub type RowID = u32;

/// Monotonic per-(table, component) write counter.
pub type Version = u64;

/// Unique identifier for a registered observer.
pub type ObserverID = u32;

/// Number of bits reserved for the slot index of an [`EntityID`].
pub const INDEX_BITS: u32 = 32;
/// Mask selecting the index portion of an [`EntityID`].
pub const INDEX_MASK: EntityID = (1 << INDEX_BITS) - 1;

/// Hard upper bound on the number of component kinds a store may register.
pub const COMPONENT_CAP: usize = 1024;
/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = (COMPONENT_CAP + 63) / 64;

/// The archetype every entity starts in: no components.
pub const EMPTY_ARCHETYPE: ArchetypeID = 0;

/// Bitset representing a set of component kinds.
///
/// ## Invariants
/// Bit `i` is set if and only if component `i` is a member of the set.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Default for Signature {
    fn default() -> Self {
        Self { components: [0u64; SIGNATURE_SIZE] }
    }
}

impl Signature {
    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] &= !(1u64 << bits);
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if all components in `other` are present.
    #[inline]
    pub fn contains_all(&self, other: &Signature) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| (a & b) == *b)
    }

    /// Returns `true` if no component in `other` is present.
    #[inline]
    pub fn disjoint(&self, other: &Signature) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| (a & b) == 0)
    }

    /// Returns `true` when the signature holds no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|&word| word == 0)
    }

    /// Returns a copy with `component_id` added.
    #[inline]
    pub fn with(mut self, component_id: ComponentID) -> Self {
        self.set(component_id);
        self
    }

    /// Returns a copy with `component_id` removed.
    #[inline]
    pub fn without(mut self, component_id: ComponentID) -> Self {
        self.clear(component_id);
        self
    }

    /// Iterates over all component IDs set in this signature, in ascending order.
    pub fn iterate_over_components(&self) -> impl Iterator<Item = ComponentID> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as ComponentID)
                })
            })
    }
}

/// Builds a component signature from a list of component IDs.
pub fn build_signature(component_ids: &[ComponentID]) -> Signature {
    let mut signature = Signature::default();
    for &component_id in component_ids {
        signature.set(component_id);
    }
    signature
}

/// The kind of change an observer can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A component kind was attached to an entity.
    Add,
    /// A component kind is about to be detached from an entity.
    Remove,
    /// A component value was written (or flagged as modified).
    Set,
}

impl EventKind {
    #[inline]
    const fn bit(self) -> u8 {
        match self {
            EventKind::Add => 1,
            EventKind::Remove => 2,
            EventKind::Set => 4,
        }
    }
}

/// A subset of {Add, Remove, Set}.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EventSet(u8);

impl EventSet {
    /// The empty set.
    pub const NONE: EventSet = EventSet(0);
    /// Every event kind.
    pub const ALL: EventSet = EventSet(1 | 2 | 4);

    /// Builds a set from a slice of kinds.
    pub fn of(kinds: &[EventKind]) -> Self {
        kinds.iter().fold(Self::NONE, |set, &kind| set.with(kind))
    }

    /// Returns a copy with `kind` included.
    #[inline]
    pub fn with(self, kind: EventKind) -> Self {
        EventSet(self.0 | kind.bit())
    }

    /// Returns `true` if `kind` is a member.
    #[inline]
    pub fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns `true` if the set has no members.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}
