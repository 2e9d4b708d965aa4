//! # Commands
//!
//! This module defines deferred commands used to mutate the store.
//!
//! ## Purpose
//! Commands provide an explicit, ordered representation of mutations issued
//! while the store is recording, or issued by observers during dispatch.
//! Rather than mutating archetypes directly, callers emit `Command` values that
//! are applied later at a safe point through the same path immediate-mode
//! calls use.
//!
//! ## Design
//! - Commands are plain data describing *what* change should occur, not *how*.
//! - Values are validated against the component registry when the command is
//!   issued, so replay never fails on a type mismatch.
//! - Two commands touching the same entity and kind are both kept; replay
//!   applies both, later one wins, and both fire their events.
//!
//! ## Invariants
//! - Commands are executed in the order they are recorded.
//! - Target entities must be alive at execution time; commands on entities
//!   that died in the meantime are skipped and counted in [`ReplayReport`].

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::entity::Entity;
use crate::engine::error::ECSResult;
use crate::engine::types::ComponentID;

/// A deferred store mutation.
pub enum Command {
    /// Places a reserved entity into the empty table.
    Create {
        /// Identity reserved when the command was issued.
        entity: Entity,
    },

    /// Destroys an entity.
    ///
    /// Fires Remove for every kind it holds, then frees the slot.
    Destroy {
        /// Entity to be removed from the store.
        entity: Entity,
    },

    /// Attaches a component kind.
    ///
    /// With a value and the kind already present, behaves like [`Command::Set`].
    Add {
        /// Target entity receiving the component.
        entity: Entity,
        /// Identifier of the component kind to add.
        component_id: ComponentID,
        /// Initial value; the kind's default when `None`.
        value: Option<Box<dyn Any + Send>>,
    },

    /// Detaches a component kind. No-op when absent.
    Remove {
        /// Target entity losing the component.
        entity: Entity,
        /// Identifier of the component kind to remove.
        component_id: ComponentID,
    },

    /// Writes a value, attaching the kind first when absent.
    Set {
        /// Target entity.
        entity: Entity,
        /// Identifier of the component kind written.
        component_id: ComponentID,
        /// New value.
        ///
        /// Must match the registered type for `component_id`.
        value: Box<dyn Any + Send>,
    },

    /// Flags an in-place write. No-op when absent.
    Modified {
        /// Target entity.
        entity: Entity,
        /// Identifier of the component kind flagged.
        component_id: ComponentID,
    },

    /// A bulk write of one kind over many entities.
    ///
    /// Replays as one commit per table the entities live in.
    SetBatch {
        /// Identifier of the component kind written.
        component_id: ComponentID,
        /// New values in issuance order.
        writes: Vec<(Entity, Box<dyn Any + Send>)>,
    },
}

impl Command {
    /// Short name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Destroy { .. } => "destroy",
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
            Command::Set { .. } => "set",
            Command::Modified { .. } => "modified",
            Command::SetBatch { .. } => "set_batch",
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create { entity } | Command::Destroy { entity } => {
                write!(f, "{}({entity})", self.label())
            }
            Command::Add { entity, component_id, .. }
            | Command::Remove { entity, component_id }
            | Command::Set { entity, component_id, .. }
            | Command::Modified { entity, component_id } => {
                write!(f, "{}({entity}, {component_id})", self.label())
            }
            Command::SetBatch { component_id, writes } => {
                write!(f, "set_batch({component_id}, {} entities)", writes.len())
            }
        }
    }
}

/// FIFO buffer of commands recorded while the store is readonly.
#[derive(Default)]
pub struct CommandQueue {
    commands: VecDeque<Command>,
}

impl CommandQueue {
    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    /// Appends every command from `more`, preserving order.
    pub fn extend(&mut self, more: impl IntoIterator<Item = Command>) {
        self.commands.extend(more);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Outcome of draining the command queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Commands that took effect (including no-op removes of absent kinds).
    pub applied: usize,
    /// Commands dropped because their target was no longer alive.
    pub skipped: usize,
}

impl ReplayReport {
    /// Total commands consumed.
    pub fn total(&self) -> usize {
        self.applied + self.skipped
    }
}

/// Mutations requested by an observer callback.
///
/// The buffer resolves component types against the store's registry and
/// validates values immediately. Buffered commands run after the current
/// dispatch completes, in the order they were pushed. Observers cannot create
/// entities.

pub struct Commands<'w> {
    registry: &'w ComponentRegistry,
    buffer: Vec<Command>,
}

impl<'w> Commands<'w> {
    pub(crate) fn new(registry: &'w ComponentRegistry) -> Self {
        Self { registry, buffer: Vec::new() }
    }

    pub(crate) fn into_commands(self) -> Vec<Command> {
        self.buffer
    }

    /// Queues a value write.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> ECSResult<()> {
        let component_id = self.registry.require_id_of::<T>()?;
        self.buffer.push(Command::Set { entity, component_id, value: Box::new(value) });
        Ok(())
    }

    /// Queues attaching `T` with its default value.
    pub fn add<T: Component>(&mut self, entity: Entity) -> ECSResult<()> {
        let component_id = self.registry.require_id_of::<T>()?;
        self.buffer.push(Command::Add { entity, component_id, value: None });
        Ok(())
    }

    /// Queues detaching `T`.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> ECSResult<()> {
        let component_id = self.registry.require_id_of::<T>()?;
        self.buffer.push(Command::Remove { entity, component_id });
        Ok(())
    }

    /// Queues flagging `T` as modified.
    pub fn modified<T: Component>(&mut self, entity: Entity) -> ECSResult<()> {
        let component_id = self.registry.require_id_of::<T>()?;
        self.buffer.push(Command::Modified { entity, component_id });
        Ok(())
    }

    /// Queues a boxed value write for a kind known only by id.
    pub fn set_id(&mut self, entity: Entity, component_id: ComponentID, value: Box<dyn Any + Send>) -> ECSResult<()> {
        self.registry.describe(component_id)?.check_value(value.as_ref())?;
        self.buffer.push(Command::Set { entity, component_id, value });
        Ok(())
    }

    /// Queues destroying `entity`.
    pub fn destroy(&mut self, entity: Entity) {
        self.buffer.push(Command::Destroy { entity });
    }

    /// Number of buffered commands.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
