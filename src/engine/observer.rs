//! # Observers
//!
//! Observers are callbacks the store invokes synchronously when a mutation
//! commits. Each registration names an [`Interest`] (one component kind, or
//! any kind) and a non-empty [`EventSet`].
//!
//! ## Dispatch
//!
//! - Events fire only when a mutation applies: in immediate mode, or while
//!   the command queue is replayed. Queued commands never fire.
//! - Observers are visited in registration order. Each interested, enabled
//!   observer receives at most one call per event.
//! - A call reports one component kind and the batch of entities the commit
//!   touched. Single-entity mutations report one entity; bulk writes report
//!   every entity of one table.
//! - Wildcard interest is matched per event, never expanded into one
//!   registration per kind.
//!
//! ## Value visibility
//!
//! | Event  | What [`Trigger::value`] sees |
//! |--------|------------------------------|
//! | Add    | the freshly attached slot; no value is guaranteed |
//! | Set    | the value just written |
//! | Remove | the value about to be dropped |
//!
//! Callbacks get shared access to the store and a [`Commands`] buffer for
//! follow-up mutations, applied after the dispatch returns.

use std::cell::RefCell;
use std::fmt;

use crate::engine::commands::Commands;
use crate::engine::component::Component;
use crate::engine::entity::Entity;
use crate::engine::error::{ECSError, ECSResult};
use crate::engine::manager::World;
use crate::engine::types::{ComponentID, EventKind, EventSet, ObserverID};

/// Which component kinds an observer listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interest {
    /// Exactly one kind.
    Component(ComponentID),
    /// Every kind.
    Any,
}

impl Interest {
    #[inline]
    pub fn matches(self, component_id: ComponentID) -> bool {
        match self {
            Interest::Component(id) => id == component_id,
            Interest::Any => true,
        }
    }
}

/// Context handed to an observer callback.
pub struct Trigger<'w> {
    world: &'w World,
    event: EventKind,
    component_id: ComponentID,
    entities: &'w [Entity],
}

impl<'w> Trigger<'w> {
    /// The kind of change.
    #[inline]
    pub fn event(&self) -> EventKind {
        self.event
    }

    /// The component kind that changed.
    #[inline]
    pub fn component_id(&self) -> ComponentID {
        self.component_id
    }

    /// Entities touched by this commit.
    #[inline]
    pub fn entities(&self) -> &'w [Entity] {
        self.entities
    }

    /// Read-only view of the store at dispatch time.
    #[inline]
    pub fn world(&self) -> &'w World {
        self.world
    }

    /// The component value of `entity` as seen at dispatch time.
    ///
    /// `None` if `T` is not the triggering kind or the entity lacks it.
    pub fn value<T: Component>(&self, entity: Entity) -> Option<&'w T> {
        if self.world.component_id::<T>() != Some(self.component_id) {
            return None;
        }
        self.world.get::<T>(entity).ok().flatten()
    }
}

/// Boxed observer callback.
pub type ObserverFn = Box<dyn FnMut(&Trigger<'_>, &mut Commands<'_>)>;

struct ObserverEntry {
    name: Option<String>,
    interest: Interest,
    events: EventSet,
    enabled: bool,
    callback: RefCell<ObserverFn>,
}

/// Observers owned by one store, in registration order.
///
/// Destroyed slots stay as `None`, so ids are never reused. Callbacks sit
/// behind their own `RefCell`, so the registry stays in place and readable
/// through the store while one of them runs.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Vec<Option<ObserverEntry>>,
    live: usize,
}

impl ObserverRegistry {
    pub(crate) fn insert(
        &mut self,
        name: Option<String>,
        interest: Interest,
        events: EventSet,
        callback: ObserverFn,
    ) -> ObserverID {
        let id = self.entries.len() as ObserverID;
        self.entries.push(Some(ObserverEntry { name, interest, events, enabled: true, callback: RefCell::new(callback) }));
        self.live += 1;
        id
    }

    fn entry_mut(&mut self, id: ObserverID) -> Option<&mut ObserverEntry> {
        self.entries.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Sets the enabled flag. Returns `false` if `id` is unknown or destroyed.
    pub(crate) fn set_enabled(&mut self, id: ObserverID, enabled: bool) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Drops an observer. Returns `false` if it was already gone.
    pub(crate) fn destroy(&mut self, id: ObserverID) -> bool {
        match self.entries.get_mut(id as usize).and_then(Option::take) {
            Some(_) => {
                self.live -= 1;
                true
            }
            None => false,
        }
    }

    /// `Some(enabled)` for live observers.
    pub fn is_enabled(&self, id: ObserverID) -> Option<bool> {
        self.entries.get(id as usize).and_then(Option::as_ref).map(|entry| entry.enabled)
    }

    /// Registered name, if one was given.
    pub fn name(&self, id: ObserverID) -> Option<&str> {
        self.entries.get(id as usize).and_then(Option::as_ref).and_then(|entry| entry.name.as_deref())
    }

    /// Number of live observers.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.live = 0;
    }

    /// Returns `true` if some enabled observer wants `(event, component_id)`.
    pub(crate) fn wants(&self, event: EventKind, component_id: ComponentID) -> bool {
        self.entries
            .iter()
            .flatten()
            .any(|entry| entry.enabled && entry.events.contains(event) && entry.interest.matches(component_id))
    }

    /// Invokes every interested observer once.
    pub(crate) fn dispatch(
        &self,
        world: &World,
        event: EventKind,
        component_id: ComponentID,
        entities: &[Entity],
        commands: &mut Commands<'_>,
    ) {
        let trigger = Trigger { world, event, component_id, entities };
        for (id, entry) in self.entries.iter().enumerate() {
            let Some(entry) = entry else { continue };
            if !entry.enabled || !entry.events.contains(event) || !entry.interest.matches(component_id) {
                continue;
            }
            tracing::trace!(observer = id, ?event, component_id, count = entities.len(), "dispatch");
            let mut callback = entry.callback.borrow_mut();
            (*callback)(&trigger, commands);
        }
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry").field("live", &self.live).finish()
    }
}

/// Builder returned by [`World::observer`].
///
/// Interest defaults to [`Interest::Any`]. At least one event kind is required.
///
/// ```ignore
/// let id = world
///     .observer()
///     .component::<Position>()
///     .event(EventKind::Set)
///     .each(|trigger, _| println!("{:?}", trigger.entities()))?;
/// ```

#[must_use = "observers are registered by calling `each`"]
pub struct ObserverBuilder<'w> {
    world: &'w mut World,
    name: Option<String>,
    interest: Interest,
    events: EventSet,
    error: Option<ECSError>,
}

impl<'w> ObserverBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self { world, name: None, interest: Interest::Any, events: EventSet::NONE, error: None }
    }

    /// Listen to component kind `T`.
    pub fn component<T: Component>(mut self) -> Self {
        match self.world.registry().require_id_of::<T>() {
            Ok(component_id) => self.interest = Interest::Component(component_id),
            Err(error) => self.error = self.error.or(Some(error)),
        }
        self
    }

    /// Listen to one kind by id.
    pub fn component_id(mut self, component_id: ComponentID) -> Self {
        if let Err(error) = self.world.registry().describe(component_id) {
            self.error = self.error.or(Some(error));
        }
        self.interest = Interest::Component(component_id);
        self
    }

    /// Listen to every kind.
    pub fn any(mut self) -> Self {
        self.interest = Interest::Any;
        self
    }

    /// Add one event kind.
    pub fn event(mut self, kind: EventKind) -> Self {
        self.events = self.events.with(kind);
        self
    }

    /// Replace the event set.
    pub fn events(mut self, events: EventSet) -> Self {
        self.events = events;
        self
    }

    /// Attach a name for diagnostics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers `callback` and returns the observer id.
    ///
    /// ## Errors
    /// - `EmptyEventSet` if no event kind was selected.
    /// - `UnregisteredType` / `UnregisteredComponent` from the interest.
    /// - `StoreTornDown` after [`World::shutdown`].

    pub fn each<F>(self, callback: F) -> ECSResult<ObserverID>
    where
        F: FnMut(&Trigger<'_>, &mut Commands<'_>) + 'static,
    {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.events.is_empty() {
            return Err(ECSError::EmptyEventSet);
        }
        self.world.insert_observer(self.name, self.interest, self.events, Box::new(callback))
    }
}
