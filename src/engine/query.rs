//! Query construction, table matching and change detection.
//!
//! A [`Query`] selects every archetype holding all of its required kinds and
//! none of its excluded kinds. Besides matching, a query is a *cursor*: for
//! each matched table it remembers the version counters it last observed for
//! the kinds it reads or writes.
//!
//! ## Change detection
//! * A table the query has never observed reports changed.
//! * Otherwise a table is changed when any watched counter exceeds the stored
//!   value.
//! * [`Query::changed`] is a pure check. Cursors only move through
//!   [`Query::mark_seen`] or [`Query::run`].
//!
//! ## Iteration
//! [`Query::run`] visits each non-empty matched table through a [`TableView`]
//! and then advances that table's cursor, unless the body called
//! [`TableView::skip`]. Empty tables are not visited but still advance.
//! [`Query::for_each_table`] visits the same tables without touching cursors.
//!
//! Queries never mutate storage. Bulk writes go through
//! [`World::each_mut`](crate::engine::manager::World::each_mut) and
//! [`World::each2_mut`](crate::engine::manager::World::each2_mut), which take
//! the query as a description of what to touch.
//!
//! ## Example
//! ```ignore
//! let mut moving = world.query().read::<Velocity>().write::<Position>().build()?;
//! moving.run(&world, |table| {
//!     if !table.changed() {
//!         table.skip();
//!         return;
//!     }
//!     for position in table.column::<Position>().unwrap_or_default() {
//!         println!("{position:?}");
//!     }
//! });
//! ```

use std::collections::HashMap;

use crate::engine::archetype::Archetype;
use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::entity::Entity;
use crate::engine::error::{ECSError, ECSResult};
use crate::engine::manager::World;
use crate::engine::types::{ArchetypeID, ComponentID, Signature, Version};

/// Builder for component queries.
///
/// Component types are resolved against the store when declared; the first
/// unregistered type is reported by [`build`](Self::build).

#[must_use = "call `build` to obtain a query"]
pub struct QueryBuilder<'w> {
    world: &'w World,
    required: Signature,
    excluded: Signature,
    reads: Vec<ComponentID>,
    writes: Vec<ComponentID>,
    error: Option<ECSError>,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w World) -> Self {
        Self {
            world,
            required: Signature::default(),
            excluded: Signature::default(),
            reads: Vec::new(),
            writes: Vec::new(),
            error: None,
        }
    }

    fn resolve<T: Component>(&mut self) -> Option<ComponentID> {
        match self.world.registry().require_id_of::<T>() {
            Ok(component_id) => Some(component_id),
            Err(error) => {
                self.error.get_or_insert(error);
                None
            }
        }
    }

    /// Requires `T` and watches it for changes as a read.
    pub fn read<T: Component>(mut self) -> Self {
        if let Some(component_id) = self.resolve::<T>() {
            self.required.set(component_id);
            self.reads.push(component_id);
        }
        self
    }

    /// Requires `T` and watches it for changes as a write target.
    pub fn write<T: Component>(mut self) -> Self {
        if let Some(component_id) = self.resolve::<T>() {
            self.required.set(component_id);
            self.writes.push(component_id);
        }
        self
    }

    /// Excludes tables holding `T`.
    pub fn without<T: Component>(mut self) -> Self {
        if let Some(component_id) = self.resolve::<T>() {
            self.excluded.set(component_id);
        }
        self
    }

    /// Requires a kind known only by id.
    pub fn read_id(mut self, component_id: ComponentID) -> Self {
        match self.world.registry().describe(component_id) {
            Ok(_) => {
                self.required.set(component_id);
                self.reads.push(component_id);
            }
            Err(error) => {
                self.error.get_or_insert(error);
            }
        }
        self
    }

    /// Finalizes the query.
    pub fn build(self) -> ECSResult<Query> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut watched: Vec<ComponentID> = self.reads.iter().chain(self.writes.iter()).copied().collect();
        watched.sort_unstable();
        watched.dedup();

        Ok(Query {
            required: self.required,
            excluded: self.excluded,
            reads: self.reads,
            writes: self.writes,
            watched,
            cursors: HashMap::new(),
        })
    }
}

/// A table matcher plus per-table change cursors.
///
/// ## Invariants
/// - `watched` is sorted and deduplicated.
/// - A cursor entry holds one version per watched kind, in `watched` order.

#[derive(Debug, Clone)]
pub struct Query {
    required: Signature,
    excluded: Signature,
    reads: Vec<ComponentID>,
    writes: Vec<ComponentID>,
    watched: Vec<ComponentID>,
    cursors: HashMap<ArchetypeID, Vec<Version>>,
}

impl Query {
    /// Returns `true` if `archetype` has every required and no excluded kind.
    #[inline]
    pub fn matches(&self, archetype: &Archetype) -> bool {
        archetype.signature().contains_all(&self.required) && archetype.signature().disjoint(&self.excluded)
    }

    /// Returns `true` if every matched table is guaranteed to hold `component_id`.
    #[inline]
    pub fn requires(&self, component_id: ComponentID) -> bool {
        self.required.has(component_id)
    }

    /// Kinds declared with `read`, in declaration order.
    pub fn reads(&self) -> &[ComponentID] {
        &self.reads
    }

    /// Kinds declared with `write`, in declaration order.
    pub fn writes(&self) -> &[ComponentID] {
        &self.writes
    }

    /// Matched tables, in archetype-id order.
    pub fn matched_tables<'w>(&'w self, world: &'w World) -> impl Iterator<Item = &'w Archetype> + 'w {
        world.archetypes().iter().filter(move |archetype| self.matches(archetype))
    }

    fn snapshot(&self, archetype: &Archetype) -> Vec<Version> {
        self.watched
            .iter()
            .map(|&component_id| archetype.version(component_id).unwrap_or(0))
            .collect()
    }

    fn is_dirty(&self, archetype: &Archetype) -> bool {
        match self.cursors.get(&archetype.archetype_id()) {
            None => true,
            Some(seen) => self
                .watched
                .iter()
                .zip(seen)
                .any(|(&component_id, &seen)| archetype.version(component_id).unwrap_or(0) > seen),
        }
    }

    fn advance(&mut self, archetype: &Archetype) {
        let snapshot = self.snapshot(archetype);
        self.cursors.insert(archetype.archetype_id(), snapshot);
    }

    /// Returns `true` if any matched table changed since last observed.
    pub fn changed(&self, world: &World) -> bool {
        self.matched_tables(world).any(|archetype| self.is_dirty(archetype))
    }

    /// Per-table form of [`changed`](Self::changed).
    ///
    /// `false` for tables this query does not match.
    pub fn table_changed(&self, world: &World, archetype_id: ArchetypeID) -> bool {
        world
            .archetype(archetype_id)
            .filter(|archetype| self.matches(archetype))
            .map_or(false, |archetype| self.is_dirty(archetype))
    }

    /// Advances every matched table's cursor to its current counters.
    pub fn mark_seen(&mut self, world: &World) {
        for archetype in world.archetypes() {
            if self.matches(archetype) {
                self.advance(archetype);
            }
        }
    }

    /// Visits every non-empty matched table, then advances cursors of tables
    /// the body did not skip.
    pub fn run<F>(&mut self, world: &World, mut body: F)
    where
        F: FnMut(&mut TableView<'_>),
    {
        for archetype in world.archetypes() {
            if !self.matches(archetype) {
                continue;
            }
            if !archetype.is_empty() {
                let mut view = TableView::new(archetype, world.registry(), self.is_dirty(archetype));
                body(&mut view);
                if view.skipped {
                    continue;
                }
            }
            self.advance(archetype);
        }
    }

    /// Visits every non-empty matched table without moving cursors.
    pub fn for_each_table<F>(&self, world: &World, mut body: F)
    where
        F: FnMut(&mut TableView<'_>),
    {
        for archetype in self.matched_tables(world).filter(|archetype| !archetype.is_empty()) {
            let mut view = TableView::new(archetype, world.registry(), self.is_dirty(archetype));
            body(&mut view);
        }
    }

    /// Calls `body` with every matched entity and its `A` value.
    pub fn for_each<A: Component>(&self, world: &World, mut body: impl FnMut(Entity, &A)) {
        self.for_each_table(world, |table| {
            if let Some(column) = table.column::<A>() {
                for (entity, value) in table.entities().iter().zip(column) {
                    body(*entity, value);
                }
            }
        });
    }

    /// Calls `body` with every matched entity and its `A` and `B` values.
    pub fn for_each2<A: Component, B: Component>(&self, world: &World, mut body: impl FnMut(Entity, &A, &B)) {
        self.for_each_table(world, |table| {
            if let (Some(a), Some(b)) = (table.column::<A>(), table.column::<B>()) {
                for ((entity, a), b) in table.entities().iter().zip(a).zip(b) {
                    body(*entity, a, b);
                }
            }
        });
    }

    /// Total rows across matched tables.
    pub fn entity_count(&self, world: &World) -> usize {
        self.matched_tables(world).map(Archetype::len).sum()
    }
}

/// One matched table as seen by a query body.
pub struct TableView<'w> {
    archetype: &'w Archetype,
    registry: &'w ComponentRegistry,
    changed: bool,
    skipped: bool,
}

impl<'w> TableView<'w> {
    fn new(archetype: &'w Archetype, registry: &'w ComponentRegistry, changed: bool) -> Self {
        Self { archetype, registry, changed, skipped: false }
    }

    /// Table id.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeID {
        self.archetype.archetype_id()
    }

    /// Member entities in row order.
    #[inline]
    pub fn entities(&self) -> &'w [Entity] {
        self.archetype.entities()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.archetype.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetype.is_empty()
    }

    /// Whether this table changed since the query last observed it.
    #[inline]
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Leaves this table's cursor where it is.
    #[inline]
    pub fn skip(&mut self) {
        self.skipped = true;
    }

    #[inline]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Typed column of `T`, if this table stores it.
    pub fn column<T: Component>(&self) -> Option<&'w [T]> {
        let component_id = self.registry.id_of::<T>()?;
        self.archetype.column::<T>(component_id)
    }

    /// Current version counter of `T` in this table.
    pub fn version<T: Component>(&self) -> Option<Version> {
        let component_id = self.registry.id_of::<T>()?;
        self.archetype.version(component_id)
    }
}
