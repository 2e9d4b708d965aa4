//! The store: entity and table management, deferred mutation and dispatch.
//!
//! [`World`] owns every archetype, the component registry, the entity
//! allocator, the command queue and the observer registry. All mutation
//! entry points are defined here.
//!
//! ## Modes
//!
//! * **Immediate** (default): a mutation updates storage, bumps version
//!   counters and fires observers before returning.
//! * **Recording**: entered with [`World::begin_readonly`]. Mutations are
//!   validated and appended to the command queue; storage, counters and
//!   observers are untouched, so reads keep seeing the pre-mutation state.
//!   [`World::end_readonly`] replays the queue through the same apply path
//!   immediate mode uses.
//!
//! Recording is not reentrant. Unbalanced begin/end calls return
//! [`RecordingError`] and leave the queue as it was.
//!
//! ## Apply path
//!
//! Every mutation, immediate or replayed, goes through `apply_command`. That
//! is the only code that moves rows, bumps counters and dispatches events:
//!
//! | Command  | Storage | Counters | Events |
//! |----------|---------|----------|--------|
//! | add      | move to `set ∪ {k}`, default value | all kinds of both tables | Add |
//! | set      | add if absent, then write | `k` (plus move bumps) | Add if attached, then Set |
//! | remove   | move to `set − {k}` | all kinds of both tables | Remove, before the move |
//! | modified | none | `k` | Set |
//! | destroy  | drop row, free slot | all kinds of the table | Remove per kind, before the drop |
//!
//! Removing or flagging an absent kind is a no-op that fires nothing.
//!
//! ## Observer follow-ups
//!
//! Observers receive `&World` and a [`Commands`] buffer. Buffered commands
//! run as soon as the mutation that triggered them has finished, before the
//! next call in immediate mode or the next queued entry while replaying, so
//! both modes reach the same final state.
//!
//! ## Teardown
//!
//! [`World::shutdown`] destroys every live entity (observers still see the
//! Remove events), drops all observers, and rejects every later mutation,
//! registration or recording with [`ECSError::StoreTornDown`].

use std::any::Any;
use std::collections::{HashMap, VecDeque};

use crate::engine::archetype::{get_archetype_pair_mut, Archetype};
use crate::engine::commands::{Command, CommandQueue, Commands, ReplayReport};
use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::config::WorldConfig;
use crate::engine::entity::{Entities, Entity, EntityLocation};
use crate::engine::error::{ECSError, ECSResult, EntityNotAliveError, RecordingError};
use crate::engine::observer::{Interest, ObserverBuilder, ObserverFn, ObserverRegistry};
use crate::engine::query::{Query, QueryBuilder};
use crate::engine::types::{
    ArchetypeID, ComponentID, EventKind, EventSet, ObserverID, RowID, Signature, Version, EMPTY_ARCHETYPE,
};

/// Whether mutations apply now or are queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Mutations apply synchronously.
    Immediate,
    /// Mutations are queued until [`World::end_readonly`].
    Recording,
}

/// Columnar entity/component store with change tracking, deferred
/// mutation and observer dispatch.
///
/// ## Invariants
/// - Every placed entity lives in exactly one archetype row, and
///   `entities.location(e)` names that row.
/// - `signature_map[a.signature()] == a.archetype_id()` for every archetype,
///   and `archetypes[id].archetype_id() == id`.
/// - Archetype 0 is the empty table.
/// - The command queue is empty whenever the mode is Immediate.

pub struct World {
    config: WorldConfig,
    registry: ComponentRegistry,
    entities: Entities,
    archetypes: Vec<Archetype>,
    signature_map: HashMap<Signature, ArchetypeID>,
    observers: ObserverRegistry,
    mode: Mode,
    queue: CommandQueue,
    followups: VecDeque<Command>,
    torn_down: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::with_config(WorldConfig::default())
    }
}

impl World {
    /// Creates an empty store with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store.
    pub fn with_config(config: WorldConfig) -> Self {
        let mut signature_map = HashMap::new();
        signature_map.insert(Signature::default(), EMPTY_ARCHETYPE);
        Self {
            registry: ComponentRegistry::with_cap(config.component_cap),
            entities: Entities::with_capacity(config.entity_capacity),
            archetypes: vec![Archetype::empty(EMPTY_ARCHETYPE)],
            signature_map,
            observers: ObserverRegistry::default(),
            mode: Mode::Immediate,
            queue: CommandQueue::default(),
            followups: VecDeque::new(),
            torn_down: false,
            config,
        }
    }

    /// Configuration the store was built with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Registers `T` as a component kind. Idempotent.
    pub fn register<T: Component + Default>(&mut self) -> ECSResult<ComponentID> {
        self.ensure_live()?;
        self.registry.register::<T>()
    }

    /// Registers `T` with an explicit default constructor. Idempotent.
    pub fn register_with_default<T: Component>(
        &mut self,
        make_default: impl Fn() -> T + Send + Sync + 'static,
    ) -> ECSResult<ComponentID> {
        self.ensure_live()?;
        self.registry.register_with_default::<T>(make_default)
    }

    /// Id of `T`, if registered.
    #[inline]
    pub fn component_id<T: Component>(&self) -> Option<ComponentID> {
        self.registry.id_of::<T>()
    }

    /// The component registry.
    #[inline]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Creates an entity with no components. Fires nothing.
    ///
    /// While recording, the identity is reserved and alive at once; it is
    /// placed in the empty table when the queue replays.
    pub fn create(&mut self) -> ECSResult<Entity> {
        self.ensure_live()?;
        let entity = self.entities.spawn()?;
        match self.mode {
            Mode::Recording => self.queue.push(Command::Create { entity }),
            Mode::Immediate => self.place_in_root(entity),
        }
        Ok(entity)
    }

    /// Destroys `entity`, firing Remove for each kind it holds.
    pub fn destroy(&mut self, entity: Entity) -> ECSResult<()> {
        self.ensure_live()?;
        self.require_alive(entity)?;
        self.issue(Command::Destroy { entity })
    }

    /// Returns `true` if `entity` is alive.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Attaches `T` with its default value. No-op if already present.
    pub fn add<T: Component>(&mut self, entity: Entity) -> ECSResult<()> {
        self.ensure_live()?;
        let component_id = self.registry.require_id_of::<T>()?;
        self.require_alive(entity)?;
        self.issue(Command::Add { entity, component_id, value: None })
    }

    /// Attaches a kind by id. With a value this behaves like [`set_id`](Self::set_id).
    pub fn add_id(
        &mut self,
        entity: Entity,
        component_id: ComponentID,
        value: Option<Box<dyn Any + Send>>,
    ) -> ECSResult<()> {
        self.ensure_live()?;
        let desc = self.registry.describe(component_id)?;
        if let Some(value) = &value {
            desc.check_value(value.as_ref())?;
        }
        self.require_alive(entity)?;
        self.issue(Command::Add { entity, component_id, value })
    }

    /// Writes `value`, attaching `T` first if absent.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> ECSResult<()> {
        self.ensure_live()?;
        let component_id = self.registry.require_id_of::<T>()?;
        self.require_alive(entity)?;
        self.issue(Command::Set { entity, component_id, value: Box::new(value) })
    }

    /// Writes a boxed value to a kind known by id.
    pub fn set_id(&mut self, entity: Entity, component_id: ComponentID, value: Box<dyn Any + Send>) -> ECSResult<()> {
        self.ensure_live()?;
        self.registry.describe(component_id)?.check_value(value.as_ref())?;
        self.require_alive(entity)?;
        self.issue(Command::Set { entity, component_id, value })
    }

    /// Detaches `T`. No-op if absent.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> ECSResult<()> {
        self.ensure_live()?;
        let component_id = self.registry.require_id_of::<T>()?;
        self.require_alive(entity)?;
        self.issue(Command::Remove { entity, component_id })
    }

    /// Detaches a kind by id. No-op if absent.
    pub fn remove_id(&mut self, entity: Entity, component_id: ComponentID) -> ECSResult<()> {
        self.ensure_live()?;
        self.registry.describe(component_id)?;
        self.require_alive(entity)?;
        self.issue(Command::Remove { entity, component_id })
    }

    /// Reports an in-place write of `T` made through [`get_mut`](Self::get_mut).
    ///
    /// Bumps the counter and fires Set exactly like [`set`](Self::set),
    /// without rewriting the value. No-op if absent.
    pub fn modified<T: Component>(&mut self, entity: Entity) -> ECSResult<()> {
        self.ensure_live()?;
        let component_id = self.registry.require_id_of::<T>()?;
        self.require_alive(entity)?;
        self.issue(Command::Modified { entity, component_id })
    }

    /// Id-based form of [`modified`](Self::modified).
    pub fn modified_id(&mut self, entity: Entity, component_id: ComponentID) -> ECSResult<()> {
        self.ensure_live()?;
        self.registry.describe(component_id)?;
        self.require_alive(entity)?;
        self.issue(Command::Modified { entity, component_id })
    }

    /// The `T` value of `entity`, or `None` if it lacks `T`.
    ///
    /// Fails only for dead entities.
    pub fn get<T: Component>(&self, entity: Entity) -> ECSResult<Option<&T>> {
        let location = self.require_alive(entity)?;
        let Some(component_id) = self.registry.id_of::<T>() else {
            return Ok(None);
        };
        Ok(location
            .and_then(|location| self.archetypes[location.archetype as usize].get_dyn(component_id, location.row))
            .and_then(|value| value.downcast_ref::<T>()))
    }

    /// Direct mutable handle to the `T` value of `entity`.
    ///
    /// Writes through this handle are invisible to change tracking and
    /// observers until [`modified`](Self::modified) is called.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> ECSResult<Option<&mut T>> {
        let location = self.require_alive(entity)?;
        let Some(component_id) = self.registry.id_of::<T>() else {
            return Ok(None);
        };
        Ok(location
            .and_then(|location| {
                self.archetypes[location.archetype as usize].get_dyn_mut(component_id, location.row)
            })
            .and_then(|value| value.downcast_mut::<T>()))
    }

    /// Type-erased read of a kind known by id.
    pub fn get_id(&self, entity: Entity, component_id: ComponentID) -> ECSResult<Option<&dyn Any>> {
        let location = self.require_alive(entity)?;
        Ok(location.and_then(|location| self.archetypes[location.archetype as usize].get_dyn(component_id, location.row)))
    }

    /// Returns `true` if `entity` holds `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> ECSResult<bool> {
        match self.registry.id_of::<T>() {
            Some(component_id) => self.has_id(entity, component_id),
            None => self.require_alive(entity).map(|_| false),
        }
    }

    /// Returns `true` if `entity` holds `component_id`.
    pub fn has_id(&self, entity: Entity, component_id: ComponentID) -> ECSResult<bool> {
        let location = self.require_alive(entity)?;
        Ok(location.map_or(false, |location| self.archetypes[location.archetype as usize].has(component_id)))
    }

    /// Enters recording mode.
    pub fn begin_readonly(&mut self) -> ECSResult<()> {
        self.ensure_live()?;
        if self.mode == Mode::Recording {
            return Err(RecordingError::AlreadyRecording.into());
        }
        self.mode = Mode::Recording;
        tracing::debug!("begin readonly");
        Ok(())
    }

    /// Leaves recording mode and replays the queue in issuance order.
    ///
    /// Observer follow-ups of an entry run before the next entry and are
    /// counted in the report. Entries whose target died before replay are
    /// skipped and counted.
    pub fn end_readonly(&mut self) -> ECSResult<ReplayReport> {
        if self.mode != Mode::Recording {
            return Err(RecordingError::NotRecording.into());
        }
        self.mode = Mode::Immediate;

        let mut report = ReplayReport::default();
        while let Some(command) = self.queue.pop() {
            let label = command.label();
            match self.apply_command(command) {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    tracing::warn!(command = label, %error, "skipped queued command");
                    report.skipped += 1;
                }
            }
            let followups = self.flush_followups();
            report.applied += followups.applied;
            report.skipped += followups.skipped;
        }

        tracing::debug!(applied = report.applied, skipped = report.skipped, "end readonly");
        Ok(report)
    }

    /// Returns `true` while recording.
    #[inline]
    pub fn is_recording(&self) -> bool {
        self.mode == Mode::Recording
    }

    /// Current mode.
    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of commands waiting for replay.
    #[inline]
    pub fn queued_commands(&self) -> usize {
        self.queue.len()
    }

    /// Starts an observer registration.
    pub fn observer(&mut self) -> ObserverBuilder<'_> {
        ObserverBuilder::new(self)
    }

    pub(crate) fn insert_observer(
        &mut self,
        name: Option<String>,
        interest: Interest,
        events: EventSet,
        callback: ObserverFn,
    ) -> ECSResult<ObserverID> {
        self.ensure_live()?;
        let id = self.observers.insert(name, interest, events, callback);
        tracing::debug!(observer = id, ?interest, "registered observer");
        Ok(id)
    }

    /// Resumes dispatch to an observer. `false` if it does not exist.
    pub fn enable_observer(&mut self, id: ObserverID) -> bool {
        self.observers.set_enabled(id, true)
    }

    /// Stops dispatch to an observer. `false` if it does not exist.
    ///
    /// Queued commands are unaffected and dispatch to whichever observers
    /// are enabled when they replay.
    pub fn disable_observer(&mut self, id: ObserverID) -> bool {
        self.observers.set_enabled(id, false)
    }

    /// Removes an observer for good. A second call returns `false`.
    pub fn destroy_observer(&mut self, id: ObserverID) -> bool {
        self.observers.destroy(id)
    }

    /// `Some(enabled)` for live observers.
    pub fn observer_enabled(&self, id: ObserverID) -> Option<bool> {
        self.observers.is_enabled(id)
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Starts a query definition.
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    fn matched_non_empty(&self, query: &Query) -> Vec<ArchetypeID> {
        query
            .matched_tables(self)
            .filter(|archetype| !archetype.is_empty())
            .map(Archetype::archetype_id)
            .collect()
    }

    /// Rewrites `W` for every entity `query` matches.
    ///
    /// ## Behavior
    /// - Immediate: each touched table commits once. Its `W` counter goes up
    ///   by exactly one and one Set event lists all of its entities.
    /// - Recording: `body` runs on clones and the results are queued as one
    ///   batch that replays with the same per-table commits.
    ///
    /// Returns the number of entities written.
    ///
    /// ## Errors
    /// `ComponentNotQueried` if `query` does not require `W`.

    pub fn each_mut<W, F>(&mut self, query: &Query, mut body: F) -> ECSResult<usize>
    where
        W: Component + Clone,
        F: FnMut(Entity, &mut W),
    {
        self.ensure_live()?;
        let write_id = self.registry.require_id_of::<W>()?;
        if !query.requires(write_id) {
            return Err(ECSError::ComponentNotQueried(write_id));
        }
        let tables = self.matched_non_empty(query);

        if self.mode == Mode::Recording {
            let mut writes: Vec<(Entity, Box<dyn Any + Send>)> = Vec::new();
            for archetype_id in tables {
                let archetype = &self.archetypes[archetype_id as usize];
                let Some(column) = archetype.column::<W>(write_id) else { continue };
                for (&entity, value) in archetype.entities().iter().zip(column) {
                    let mut value = value.clone();
                    body(entity, &mut value);
                    writes.push((entity, Box::new(value)));
                }
            }
            return Ok(self.queue_batch(write_id, writes));
        }

        let mut written = 0;
        for archetype_id in tables {
            let archetype = &mut self.archetypes[archetype_id as usize];
            let Some((entities, column)) = archetype.entities_and_column_mut::<W>(write_id) else { continue };
            for (&entity, value) in entities.iter().zip(column.iter_mut()) {
                body(entity, value);
            }
            let batch = entities.to_vec();
            self.commit_table(archetype_id, write_id, &batch);
            written += batch.len();
        }
        self.flush_followups();
        Ok(written)
    }

    /// Rewrites `W` from `R` for every entity `query` matches.
    ///
    /// Same commit and recording rules as [`each_mut`](Self::each_mut).
    ///
    /// ## Errors
    /// - `AliasedAccess` if `R` and `W` are the same kind.
    /// - `ComponentNotQueried` if `query` does not require both.

    pub fn each2_mut<R, W, F>(&mut self, query: &Query, mut body: F) -> ECSResult<usize>
    where
        R: Component,
        W: Component + Clone,
        F: FnMut(Entity, &R, &mut W),
    {
        self.ensure_live()?;
        let read_id = self.registry.require_id_of::<R>()?;
        let write_id = self.registry.require_id_of::<W>()?;
        if read_id == write_id {
            return Err(ECSError::AliasedAccess(write_id));
        }
        for component_id in [read_id, write_id] {
            if !query.requires(component_id) {
                return Err(ECSError::ComponentNotQueried(component_id));
            }
        }
        let tables = self.matched_non_empty(query);

        if self.mode == Mode::Recording {
            let mut writes: Vec<(Entity, Box<dyn Any + Send>)> = Vec::new();
            for archetype_id in tables {
                let archetype = &self.archetypes[archetype_id as usize];
                let (Some(reads), Some(column)) = (archetype.column::<R>(read_id), archetype.column::<W>(write_id))
                else {
                    continue;
                };
                for ((&entity, read), value) in archetype.entities().iter().zip(reads).zip(column) {
                    let mut value = value.clone();
                    body(entity, read, &mut value);
                    writes.push((entity, Box::new(value)));
                }
            }
            return Ok(self.queue_batch(write_id, writes));
        }

        let mut written = 0;
        for archetype_id in tables {
            let archetype = &mut self.archetypes[archetype_id as usize];
            let Some((entities, reads, column)) = archetype.column_pair::<R, W>(read_id, write_id) else { continue };
            for ((&entity, read), value) in entities.iter().zip(reads).zip(column.iter_mut()) {
                body(entity, read, value);
            }
            let batch = entities.to_vec();
            self.commit_table(archetype_id, write_id, &batch);
            written += batch.len();
        }
        self.flush_followups();
        Ok(written)
    }

    fn queue_batch(&mut self, component_id: ComponentID, writes: Vec<(Entity, Box<dyn Any + Send>)>) -> usize {
        let count = writes.len();
        if count > 0 {
            self.queue.push(Command::SetBatch { component_id, writes });
        }
        count
    }

    /// One commit of `component_id` in one table: bump once, dispatch once.
    fn commit_table(&mut self, archetype_id: ArchetypeID, component_id: ComponentID, entities: &[Entity]) {
        self.archetypes[archetype_id as usize].bump(component_id);
        self.dispatch(EventKind::Set, component_id, entities);
    }

    /// All tables, indexed by archetype id.
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// One table by id.
    #[inline]
    pub fn archetype(&self, archetype_id: ArchetypeID) -> Option<&Archetype> {
        self.archetypes.get(archetype_id as usize)
    }

    /// Table currently holding `entity`.
    pub fn archetype_of(&self, entity: Entity) -> Option<ArchetypeID> {
        self.entities.location(entity).map(|location| location.archetype)
    }

    /// Version counter of `T` in a table.
    pub fn table_version<T: Component>(&self, archetype_id: ArchetypeID) -> Option<Version> {
        self.table_version_id(archetype_id, self.registry.id_of::<T>()?)
    }

    /// Version counter of a kind in a table.
    pub fn table_version_id(&self, archetype_id: ArchetypeID, component_id: ComponentID) -> Option<Version> {
        self.archetype(archetype_id)?.version(component_id)
    }

    /// Number of tables, including the empty one.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    #[inline]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Destroys every entity, drops every observer and closes the store.
    ///
    /// Idempotent. Fails with `StillRecording` while recording.
    pub fn shutdown(&mut self) -> ECSResult<()> {
        if self.torn_down {
            return Ok(());
        }
        if self.mode == Mode::Recording {
            return Err(RecordingError::StillRecording("shutdown").into());
        }

        let live = self.entities.alive();
        let count = live.len();
        for entity in live {
            if let Err(error) = self.apply_destroy(entity) {
                tracing::warn!(%entity, %error, "destroy during shutdown failed");
            }
        }
        self.flush_followups();

        self.observers.clear();
        self.torn_down = true;
        tracing::debug!(entities = count, "store shut down");
        Ok(())
    }

    #[inline]
    fn ensure_live(&self) -> ECSResult<()> {
        if self.torn_down {
            Err(ECSError::StoreTornDown)
        } else {
            Ok(())
        }
    }

    /// Location of a live entity; `None` if reserved but not yet placed.
    #[inline]
    fn require_alive(&self, entity: Entity) -> ECSResult<Option<EntityLocation>> {
        if self.entities.is_alive(entity) {
            Ok(self.entities.location(entity))
        } else {
            Err(EntityNotAliveError(entity).into())
        }
    }

    /// Location of a live entity, placing it in the empty table if needed.
    fn placed_location(&mut self, entity: Entity) -> ECSResult<EntityLocation> {
        if let Some(location) = self.require_alive(entity)? {
            return Ok(location);
        }
        self.place_in_root(entity);
        self.require_alive(entity)?.ok_or(EntityNotAliveError(entity).into())
    }

    fn place_in_root(&mut self, entity: Entity) {
        let row = self.archetypes[EMPTY_ARCHETYPE as usize].push_bare(entity);
        self.entities.set_location(entity, EntityLocation { archetype: EMPTY_ARCHETYPE, row });
    }

    /// Applies now or queues, depending on the mode.
    fn issue(&mut self, command: Command) -> ECSResult<()> {
        match self.mode {
            Mode::Recording => {
                self.queue.push(command);
                Ok(())
            }
            Mode::Immediate => {
                let result = self.apply_command(command);
                self.flush_followups();
                result
            }
        }
    }

    /// Runs observer follow-ups until none are left, including the ones
    /// they trigger in turn.
    fn flush_followups(&mut self) -> ReplayReport {
        let mut report = ReplayReport::default();
        while let Some(command) = self.followups.pop_front() {
            let label = command.label();
            match self.apply_command(command) {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    tracing::warn!(command = label, %error, "skipped observer command");
                    report.skipped += 1;
                }
            }
        }
        report
    }

    fn apply_command(&mut self, command: Command) -> ECSResult<()> {
        tracing::trace!(?command, "apply");
        match command {
            Command::Create { entity } => self.placed_location(entity).map(|_| ()),
            Command::Destroy { entity } => self.apply_destroy(entity),
            Command::Add { entity, component_id, value: Some(value) } => self.apply_set(entity, component_id, value),
            Command::Add { entity, component_id, value: None } => self.apply_add_default(entity, component_id),
            Command::Remove { entity, component_id } => self.apply_remove(entity, component_id),
            Command::Set { entity, component_id, value } => self.apply_set(entity, component_id, value),
            Command::Modified { entity, component_id } => self.apply_modified(entity, component_id),
            Command::SetBatch { component_id, writes } => self.apply_set_batch(component_id, writes),
        }
    }

    fn apply_add_default(&mut self, entity: Entity, component_id: ComponentID) -> ECSResult<()> {
        let location = self.placed_location(entity)?;
        if self.archetypes[location.archetype as usize].has(component_id) {
            return Ok(());
        }
        let value = self.registry.describe(component_id)?.default_value();
        self.attach(entity, location, component_id, value)
    }

    fn apply_set(&mut self, entity: Entity, component_id: ComponentID, value: Box<dyn Any + Send>) -> ECSResult<()> {
        let location = self.placed_location(entity)?;
        let archetype = &mut self.archetypes[location.archetype as usize];
        if archetype.has(component_id) {
            archetype.set_dyn(component_id, location.row, value)?;
        } else {
            self.attach(entity, location, component_id, value)?;
        }

        let location = self.placed_location(entity)?;
        self.archetypes[location.archetype as usize].bump(component_id);
        self.dispatch(EventKind::Set, component_id, &[entity]);
        Ok(())
    }

    fn apply_remove(&mut self, entity: Entity, component_id: ComponentID) -> ECSResult<()> {
        let location = self.placed_location(entity)?;
        if !self.archetypes[location.archetype as usize].has(component_id) {
            return Ok(());
        }
        self.dispatch(EventKind::Remove, component_id, &[entity]);

        let destination = self.remove_target(location.archetype, component_id)?;
        self.move_entity(entity, location, destination, None)
    }

    fn apply_modified(&mut self, entity: Entity, component_id: ComponentID) -> ECSResult<()> {
        let location = self.placed_location(entity)?;
        if self.archetypes[location.archetype as usize].bump(component_id).is_none() {
            return Ok(());
        }
        self.dispatch(EventKind::Set, component_id, &[entity]);
        Ok(())
    }

    fn apply_destroy(&mut self, entity: Entity) -> ECSResult<()> {
        let location = self.placed_location(entity)?;
        let held = self.archetypes[location.archetype as usize].component_ids().to_vec();
        for component_id in held {
            self.dispatch(EventKind::Remove, component_id, &[entity]);
        }

        let archetype = &mut self.archetypes[location.archetype as usize];
        let swapped = archetype.swap_remove_row(location.row);
        archetype.bump_all();
        if let Some(moved) = swapped {
            self.entities.set_location(moved, location);
        }
        self.entities.despawn(entity);
        tracing::trace!(%entity, "destroyed");
        Ok(())
    }

    /// Replays a bulk write: entities still holding the kind commit once per
    /// table; entities that lost it go through the single-entity set path.
    fn apply_set_batch(&mut self, component_id: ComponentID, writes: Vec<(Entity, Box<dyn Any + Send>)>) -> ECSResult<()> {
        let mut groups: Vec<(ArchetypeID, Vec<(Entity, RowID, Box<dyn Any + Send>)>)> = Vec::new();
        let mut detached: Vec<(Entity, Box<dyn Any + Send>)> = Vec::new();

        for (entity, value) in writes {
            let location = match self.placed_location(entity) {
                Ok(location) => location,
                Err(error) => {
                    tracing::warn!(%entity, %error, "skipped batched write");
                    continue;
                }
            };
            if !self.archetypes[location.archetype as usize].has(component_id) {
                detached.push((entity, value));
                continue;
            }
            match groups.iter_mut().find(|(archetype_id, _)| *archetype_id == location.archetype) {
                Some((_, rows)) => rows.push((entity, location.row, value)),
                None => groups.push((location.archetype, vec![(entity, location.row, value)])),
            }
        }

        for (archetype_id, rows) in groups {
            let mut batch = Vec::with_capacity(rows.len());
            let archetype = &mut self.archetypes[archetype_id as usize];
            for (entity, row, value) in rows {
                archetype.set_dyn(component_id, row, value)?;
                batch.push(entity);
            }
            self.commit_table(archetype_id, component_id, &batch);
        }

        for (entity, value) in detached {
            self.apply_set(entity, component_id, value)?;
        }
        Ok(())
    }

    /// Moves `entity` into the table with `component_id` added, seeded with
    /// `value`, and fires Add.
    fn attach(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        component_id: ComponentID,
        value: Box<dyn Any + Send>,
    ) -> ECSResult<()> {
        let destination = self.add_target(location.archetype, component_id)?;
        self.move_entity(entity, location, destination, Some((component_id, value)))?;
        self.dispatch(EventKind::Add, component_id, &[entity]);
        Ok(())
    }

    fn move_entity(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        destination_id: ArchetypeID,
        added: Option<(ComponentID, Box<dyn Any + Send>)>,
    ) -> ECSResult<()> {
        let (source, destination) = get_archetype_pair_mut(&mut self.archetypes, location.archetype, destination_id);
        let (row, swapped) = source.move_row_to_archetype(destination, location.row, added)?;
        source.bump_all();
        destination.bump_all();

        self.entities.set_location(entity, EntityLocation { archetype: destination_id, row });
        if let Some(moved) = swapped {
            self.entities.set_location(moved, location);
        }
        tracing::trace!(%entity, from = location.archetype, to = destination_id, "moved");
        Ok(())
    }

    fn add_target(&mut self, source_id: ArchetypeID, component_id: ComponentID) -> ECSResult<ArchetypeID> {
        if let Some(target) = self.archetypes[source_id as usize].add_edge(component_id) {
            return Ok(target);
        }
        let signature = self.archetypes[source_id as usize].signature().with(component_id);
        let target = self.get_or_create_archetype(signature, source_id)?;
        self.archetypes[source_id as usize].set_add_edge(component_id, target);
        self.archetypes[target as usize].set_remove_edge(component_id, source_id);
        Ok(target)
    }

    fn remove_target(&mut self, source_id: ArchetypeID, component_id: ComponentID) -> ECSResult<ArchetypeID> {
        if let Some(target) = self.archetypes[source_id as usize].remove_edge(component_id) {
            return Ok(target);
        }
        let signature = self.archetypes[source_id as usize].signature().without(component_id);
        let target = self.get_or_create_archetype(signature, source_id)?;
        self.archetypes[source_id as usize].set_remove_edge(component_id, target);
        self.archetypes[target as usize].set_add_edge(component_id, source_id);
        Ok(target)
    }

    /// Retrieves the archetype matching `signature`, creating it if necessary.
    ///
    /// A new table inherits `source`'s counters for shared kinds.
    fn get_or_create_archetype(&mut self, signature: Signature, source: ArchetypeID) -> ECSResult<ArchetypeID> {
        if let Some(&id) = self.signature_map.get(&signature) {
            return Ok(id);
        }

        let id = self.archetypes.len() as ArchetypeID;
        let mut archetype = Archetype::new(id, signature, &self.registry, self.config.table_capacity)?;
        archetype.inherit_versions(&self.archetypes[source as usize]);
        tracing::debug!(archetype = id, components = ?archetype.component_ids(), "created archetype");

        self.archetypes.push(archetype);
        self.signature_map.insert(signature, id);
        Ok(id)
    }

    /// Calls every interested observer, then queues their follow-ups.
    fn dispatch(&mut self, event: EventKind, component_id: ComponentID, entities: &[Entity]) {
        if !self.observers.wants(event, component_id) {
            return;
        }
        let followups = {
            let world: &World = self;
            let mut commands = Commands::new(&world.registry);
            world.observers.dispatch(world, event, component_id, entities, &mut commands);
            commands.into_commands()
        };
        self.followups.extend(followups);
    }
}
