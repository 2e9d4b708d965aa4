mod common;

use archetype_store::prelude::*;
use archetype_store::{ECSError, Mode, RecordingError, ReplayReport};
use common::*;

#[test]
fn deferred_write_is_invisible_until_replay() -> ECSResult<()> {
    let (mut world, ids) = world()?;
    let e = world.create()?;
    world.set(e, Position { x: 1.0, y: 1.0 })?;
    let (_, log) = record_all(&mut world, EventSet::ALL)?;

    world.begin_readonly()?;
    world.set(e, Position { x: 2.0, y: 2.0 })?;
    assert_eq!(world.get::<Position>(e)?, Some(&Position { x: 1.0, y: 1.0 }));
    assert!(log.borrow().is_empty());
    assert_eq!(world.queued_commands(), 1);

    let report = world.end_readonly()?;
    assert_eq!(report, ReplayReport { applied: 1, skipped: 0 });
    assert_eq!(world.get::<Position>(e)?, Some(&Position { x: 2.0, y: 2.0 }));
    assert_eq!(*log.borrow(), vec![Seen { event: EventKind::Set, component: ids.position, entities: vec![e] }]);
    assert_eq!(world.queued_commands(), 0);
    Ok(())
}

#[test]
fn deferred_writes_do_not_bump_counters() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    world.set(e, Position::default())?;
    let table = world.archetype_of(e).unwrap_or_default();
    let before = world.table_version::<Position>(table);

    world.begin_readonly()?;
    world.set(e, Position { x: 5.0, y: 5.0 })?;
    world.modified::<Position>(e)?;
    assert_eq!(world.table_version::<Position>(table), before);
    world.end_readonly()?;

    assert_eq!(world.table_version::<Position>(table), before.map(|v| v + 2));
    Ok(())
}

#[test]
fn recording_is_not_reentrant() -> ECSResult<()> {
    let (mut world, _) = world()?;
    assert_eq!(world.end_readonly().unwrap_err(), ECSError::Recording(RecordingError::NotRecording));

    world.begin_readonly()?;
    let e = world.create()?;
    assert_eq!(world.begin_readonly().unwrap_err(), ECSError::Recording(RecordingError::AlreadyRecording));
    assert_eq!(world.mode(), Mode::Recording);
    assert_eq!(world.queued_commands(), 1);

    world.end_readonly()?;
    assert!(!world.is_recording());
    assert!(world.is_alive(e));
    Ok(())
}

#[test]
fn replay_is_last_write_wins_without_coalescing() -> ECSResult<()> {
    let (mut world, ids) = world()?;
    let e = world.create()?;
    world.set(e, Mass(0.0))?;
    let table = world.archetype_of(e).unwrap_or_default();
    let before = world.table_version_id(table, ids.mass).unwrap_or_default();
    let (_, log) = record_all(&mut world, EventSet::of(&[EventKind::Set]))?;

    world.begin_readonly()?;
    world.set(e, Mass(1.0))?;
    world.set(e, Mass(2.0))?;
    world.end_readonly()?;

    assert_eq!(world.get::<Mass>(e)?, Some(&Mass(2.0)));
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(world.table_version_id(table, ids.mass), Some(before + 2));
    Ok(())
}

#[test]
fn entity_created_while_recording_is_placed_on_replay() -> ECSResult<()> {
    let (mut world, _) = world()?;
    world.begin_readonly()?;
    let e = world.create()?;
    world.set(e, Velocity { x: 3.0, y: 0.0 })?;

    assert!(world.is_alive(e));
    assert_eq!(world.archetype_of(e), None);
    assert_eq!(world.get::<Velocity>(e)?, None);

    world.end_readonly()?;
    assert_eq!(world.get::<Velocity>(e)?, Some(&Velocity { x: 3.0, y: 0.0 }));
    Ok(())
}

#[test]
fn commands_on_entities_destroyed_earlier_in_queue_are_skipped() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    let survivor = world.create()?;

    world.begin_readonly()?;
    world.destroy(e)?;
    world.set(e, Position::default())?;
    world.set(survivor, Position::default())?;
    let report = world.end_readonly()?;

    assert_eq!(report, ReplayReport { applied: 2, skipped: 1 });
    assert_eq!(report.total(), 3);
    assert!(!world.is_alive(e));
    assert!(world.has::<Position>(survivor)?);
    Ok(())
}

#[test]
fn structural_changes_replay_in_order() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    world.set(e, Position::default())?;

    world.begin_readonly()?;
    world.add::<Velocity>(e)?;
    world.remove::<Position>(e)?;
    world.add::<Mass>(e)?;
    assert!(world.has::<Position>(e)?);
    assert!(!world.has::<Velocity>(e)?);
    world.end_readonly()?;

    assert!(!world.has::<Position>(e)?);
    assert!(world.has::<Velocity>(e)?);
    assert!(world.has::<Mass>(e)?);
    Ok(())
}

#[test]
fn disabling_observer_affects_queued_commands_at_replay_time() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let (id, log) = record_all(&mut world, EventSet::ALL)?;
    let e = world.create()?;

    world.begin_readonly()?;
    world.set(e, Mass(1.0))?;
    assert_eq!(world.queued_commands(), 1);
    world.disable_observer(id);
    world.end_readonly()?;

    assert!(log.borrow().is_empty());
    assert_eq!(world.get::<Mass>(e)?, Some(&Mass(1.0)));
    Ok(())
}

#[test]
fn deferred_destroy_fires_removes_at_replay() -> ECSResult<()> {
    let (mut world, ids) = world()?;
    let e = world.create()?;
    world.set(e, Position::default())?;
    world.set(e, Mass(1.0))?;
    let (_, log) = record_all(&mut world, EventSet::of(&[EventKind::Remove]))?;

    world.begin_readonly()?;
    world.destroy(e)?;
    assert!(log.borrow().is_empty());
    assert!(world.is_alive(e));
    assert_eq!(world.get::<Mass>(e)?, Some(&Mass(1.0)));

    world.end_readonly()?;
    let removed: Vec<_> = log.borrow().iter().map(|seen| (seen.component, seen.entities.clone())).collect();
    assert_eq!(removed, vec![(ids.position, vec![e]), (ids.mass, vec![e])]);
    assert!(!world.is_alive(e));
    Ok(())
}
