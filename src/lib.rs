//! # Archetype Store
//!
//! Columnar entity-component store built around three guarantees:
//!
//! - **Change tracking.** Every table keeps one monotonic version counter
//!   per component kind. Queries remember what they last saw and report
//!   whether a table changed since.
//! - **Deferred mutation.** Between `begin_readonly` and `end_readonly`
//!   every mutation is queued instead of applied; the queue then replays in
//!   issuance order through the immediate path.
//! - **Synchronous observers.** Add, Remove and Set events are dispatched
//!   when a mutation commits, batched per table for bulk writes.
//!
//! ## Design Goals
//! - Archetype-based storage for cache efficiency
//! - Order-independent table identity
//! - Single-threaded, reentrancy-safe mutation
//! - Safe, explicit data access (no `unsafe`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::manager::{Mode, World};

pub use engine::config::WorldConfig;

pub use engine::entity::{Entity, EntityLocation};

pub use engine::component::{Component, ComponentDesc, ComponentRegistry};

pub use engine::archetype::Archetype;

pub use engine::query::{Query, QueryBuilder, TableView};

pub use engine::observer::{Interest, ObserverBuilder, Trigger};

pub use engine::commands::{Command, Commands, ReplayReport};

pub use engine::systems::{FnSystem, Schedule, System};

pub use engine::error::{
    CapacityError,
    ECSError,
    ECSResult,
    EntityNotAliveError,
    RecordingError,
    TypeMismatchError,
};

pub use engine::types::{
    ArchetypeID,
    ComponentID,
    EntityID,
    EventKind,
    EventSet,
    ObserverID,
    Signature,
    Version,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use archetype_store::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Commands,
        ECSError,
        ECSResult,
        Entity,
        EventKind,
        EventSet,
        FnSystem,
        Query,
        Schedule,
        System,
        Trigger,
        World,
        WorldConfig,
    };
}
