//! Error types for the entity-component store.
//!
//! This module declares focused, composable error types used across entity
//! allocation, component storage, recording mode and observer dispatch. Each
//! error carries enough context to make failures actionable while remaining
//! small and cheap to pass around or convert into the aggregate [`ECSError`].
//!
//! ## Typical flow
//! Low-level storage operations return small, dedicated error types (e.g.
//! [`TypeMismatchError`]). Store entry points use `?` to bubble failures into
//! [`ECSError`], which callers can match on for control flow.
//!
//! ```ignore
//! match world.set(entity, Position { x: 1.0, y: 2.0 }) {
//!     Ok(()) => {}
//!     Err(ECSError::EntityNotAlive(e)) => eprintln!("{e}"),
//!     Err(other) => return Err(other),
//! }
//! ```
//!
//! ## Absence is not an error
//! Reading a component the entity does not hold yields `None`. Only a dead
//! entity handle is reported as a failure.
//!
//! ## Propagation
//! Every error here is local and synchronous. Nothing is retried internally,
//! and the store stays usable after any of them is returned.

use std::any::TypeId;

use thiserror::Error;

use crate::engine::entity::Entity;
use crate::engine::types::ComponentID;

/// Returned when a fixed-capacity table (entity slots, component kinds) has
/// no room for the requested allocation.
///
/// ### Fields
/// * `needed`: Total slots the operation required.
/// * `capacity`: The upper bound that prevented the operation.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("capacity exhausted ({needed} needed; capacity {capacity})")]
pub struct CapacityError {
    /// Total slots the operation attempted to allocate.
    pub needed: u64,

    /// Current capacity limiting the operation.
    pub capacity: u64,
}

/// Returned when an operation targets a destroyed or never-created entity.
///
/// No partial mutation happens before this error is produced.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("entity {0} is not alive")]
pub struct EntityNotAliveError(pub Entity);

/// Returned when a boxed component value does not match the registered type
/// of the component kind it is written to.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("type mismatch for component {component_id}: expected {expected_name}, got {actual:?}")]
pub struct TypeMismatchError {
    /// Component kind the value was written to.
    pub component_id: ComponentID,

    /// Declared element type of the destination column.
    pub expected: TypeId,

    /// Human-readable name of the declared element type.
    pub expected_name: &'static str,

    /// Dynamic type of the supplied value.
    pub actual: TypeId,
}

/// Misuse of the begin/end readonly pair.
///
/// These are programming errors: the operation that produced them did not
/// run, and the command queue is left untouched.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordingError {
    /// `begin_readonly` was called while already recording.
    #[error("store is already recording")]
    AlreadyRecording,

    /// `end_readonly` was called while not recording.
    #[error("store is not recording")]
    NotRecording,

    /// An operation that requires immediate mode ran while recording.
    #[error("operation `{0}` cannot run while the store is recording")]
    StillRecording(&'static str),
}

/// Aggregate error for every store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ECSError {
    /// The target entity was destroyed or never created.
    #[error(transparent)]
    EntityNotAlive(#[from] EntityNotAliveError),

    /// Begin/end readonly were called out of order.
    #[error(transparent)]
    Recording(#[from] RecordingError),

    /// The store was shut down; nothing may be registered or dispatched.
    #[error("store has been torn down")]
    StoreTornDown,

    /// A component id was used that this store never registered.
    #[error("component id {0} is not registered")]
    UnregisteredComponent(ComponentID),

    /// A Rust type was used as a component without being registered.
    #[error("type `{0}` is not registered as a component")]
    UnregisteredType(&'static str),

    /// A value's dynamic type did not match its component kind.
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    /// A fixed-capacity table is full.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// An observer was registered without any event kind.
    #[error("observer must subscribe to at least one event kind")]
    EmptyEventSet,

    /// A bulk write named the same component as both read and written.
    #[error("component {0} cannot be read and written by the same bulk write")]
    AliasedAccess(ComponentID),

    /// A bulk write touched a component the query does not require.
    #[error("component {0} is not required by the query")]
    ComponentNotQueried(ComponentID),
}

/// Result alias used across the store.
pub type ECSResult<T> = Result<T, ECSError>;
