#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use archetype_store::prelude::*;
use archetype_store::ComponentID;

static INIT: Once = Once::new();

/// Installs a test-friendly subscriber once per test binary.
///
/// Filter with `RUST_LOG=archetype_store=trace`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AddPosition {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Mass(pub f32);

pub struct Ids {
    pub position: ComponentID,
    pub velocity: ComponentID,
    pub add_position: ComponentID,
    pub mass: ComponentID,
}

/// A fresh store with every test component registered.
pub fn world() -> ECSResult<(World, Ids)> {
    init_tracing();
    let mut world = World::new();
    let ids = Ids {
        position: world.register::<Position>()?,
        velocity: world.register::<Velocity>()?,
        add_position: world.register::<AddPosition>()?,
        mass: world.register::<Mass>()?,
    };
    Ok((world, ids))
}

/// One recorded dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub event: EventKind,
    pub component: ComponentID,
    pub entities: Vec<Entity>,
}

pub type Log = Rc<RefCell<Vec<Seen>>>;

/// Registers an observer that appends every dispatch it receives to a log.
pub fn record_all(world: &mut World, events: EventSet) -> ECSResult<(archetype_store::ObserverID, Log)> {
    let log: Log = Rc::default();
    let sink = Rc::clone(&log);
    let id = world.observer().any().events(events).each(move |trigger, _| {
        sink.borrow_mut().push(Seen {
            event: trigger.event(),
            component: trigger.component_id(),
            entities: trigger.entities().to_vec(),
        });
    })?;
    Ok((id, log))
}
