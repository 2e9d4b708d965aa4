mod common;

use std::cell::RefCell;
use std::rc::Rc;

use archetype_store::prelude::*;
use archetype_store::ECSError;
use common::*;

#[test]
fn cursor_starts_dirty_and_settles_after_mark_seen() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    world.set(e, Position::default())?;

    let mut query = world.query().read::<Position>().build()?;
    assert!(query.changed(&world));
    assert!(query.changed(&world), "checking must not consume the change");

    query.mark_seen(&world);
    assert!(!query.changed(&world));

    world.set(e, Position { x: 1.0, y: 0.0 })?;
    assert!(query.changed(&world));
    Ok(())
}

#[test]
fn modified_flags_in_place_writes() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    world.set(e, Position::default())?;
    let mut query = world.query().read::<Position>().build()?;
    query.mark_seen(&world);

    if let Some(position) = world.get_mut::<Position>(e)? {
        position.y = 3.0;
    }
    assert!(!query.changed(&world));
    world.modified::<Position>(e)?;
    assert!(query.changed(&world));
    Ok(())
}

#[test]
fn writes_to_unwatched_kinds_do_not_mark_change() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    world.set(e, Position::default())?;
    world.set(e, Mass(1.0))?;

    let mut query = world.query().read::<Position>().build()?;
    query.mark_seen(&world);
    world.set(e, Mass(2.0))?;
    assert!(!query.changed(&world));
    Ok(())
}

#[test]
fn structural_move_is_reported_as_change() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    world.set(e, Position::default())?;
    let mut query = world.query().read::<Position>().build()?;
    query.mark_seen(&world);

    world.add::<Velocity>(e)?;
    assert!(query.changed(&world));
    Ok(())
}

#[test]
fn bulk_write_commits_once_per_table() -> ECSResult<()> {
    let (mut world, ids) = world()?;
    let e1 = world.create()?;
    world.set(e1, Position { x: 0.0, y: 0.0 })?;
    world.set(e1, AddPosition { x: 2.0, y: 1.0 })?;
    let e2 = world.create()?;
    world.set(e2, Position { x: 1.0, y: 1.0 })?;
    world.set(e2, AddPosition { x: 1.0, y: 1.0 })?;

    let table = world.archetype_of(e1).unwrap_or_default();
    assert_eq!(world.archetype_of(e2), Some(table));
    let before = world.table_version::<Position>(table).unwrap_or_default();

    let mut watcher = world.query().read::<Position>().build()?;
    watcher.mark_seen(&world);

    let batches: Rc<RefCell<Vec<Vec<Entity>>>> = Rc::default();
    let sink = Rc::clone(&batches);
    world
        .observer()
        .component::<Position>()
        .event(EventKind::Set)
        .each(move |trigger, _| sink.borrow_mut().push(trigger.entities().to_vec()))?;

    let add = world.query().read::<AddPosition>().write::<Position>().build()?;
    let written = world.each2_mut::<AddPosition, Position, _>(&add, |_, delta, position| {
        position.x += delta.x;
        position.y += delta.y;
    })?;

    assert_eq!(written, 2);
    assert_eq!(world.get::<Position>(e1)?, Some(&Position { x: 2.0, y: 1.0 }));
    assert_eq!(world.get::<Position>(e2)?, Some(&Position { x: 2.0, y: 2.0 }));
    assert_eq!(world.table_version_id(table, ids.position), Some(before + 1));
    assert!(watcher.changed(&world));
    assert_eq!(*batches.borrow(), vec![vec![e1, e2]]);
    Ok(())
}

#[test]
fn bulk_write_dispatches_once_per_touched_table() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let plain = world.create()?;
    world.set(plain, Position::default())?;
    let heavy = world.create()?;
    world.set(heavy, Position::default())?;
    world.set(heavy, Mass(2.0))?;
    let (_, log) = record_all(&mut world, EventSet::of(&[EventKind::Set]))?;

    let query = world.query().write::<Position>().build()?;
    world.each_mut::<Position, _>(&query, |_, position| position.x += 1.0)?;

    let batches: Vec<_> = log.borrow().iter().map(|seen| seen.entities.clone()).collect();
    assert_eq!(batches.len(), 2);
    assert!(batches.contains(&vec![plain]));
    assert!(batches.contains(&vec![heavy]));
    Ok(())
}

#[test]
fn bulk_write_while_recording_replays_as_one_batch() -> ECSResult<()> {
    let (mut world, ids) = world()?;
    let entities: Vec<Entity> = (0..3)
        .map(|i| {
            let e = world.create()?;
            world.set(e, Mass(i as f32))?;
            Ok(e)
        })
        .collect::<ECSResult<_>>()?;
    let table = world.archetype_of(entities[0]).unwrap_or_default();
    let before = world.table_version_id(table, ids.mass).unwrap_or_default();
    let (_, log) = record_all(&mut world, EventSet::of(&[EventKind::Set]))?;

    let query = world.query().write::<Mass>().build()?;
    world.begin_readonly()?;
    world.each_mut::<Mass, _>(&query, |_, mass| mass.0 *= 10.0)?;
    assert_eq!(world.get::<Mass>(entities[2])?, Some(&Mass(2.0)));
    assert_eq!(world.queued_commands(), 1);
    world.end_readonly()?;

    assert_eq!(world.get::<Mass>(entities[2])?, Some(&Mass(20.0)));
    assert_eq!(world.table_version_id(table, ids.mass), Some(before + 1));
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].entities, entities);
    Ok(())
}

#[test]
fn bulk_write_rejects_aliasing_and_unqueried_kinds() -> ECSResult<()> {
    let (mut world, ids) = world()?;
    let query = world.query().read::<Position>().build()?;
    assert_eq!(
        world.each2_mut::<Position, Position, _>(&query, |_, _, _| {}).unwrap_err(),
        ECSError::AliasedAccess(ids.position)
    );
    assert_eq!(
        world.each_mut::<Mass, _>(&query, |_, _| {}).unwrap_err(),
        ECSError::ComponentNotQueried(ids.mass)
    );
    Ok(())
}

#[test]
fn run_advances_cursor_unless_table_is_skipped() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let a = world.create()?;
    world.set(a, Position::default())?;
    let b = world.create()?;
    world.set(b, Position::default())?;
    world.set(b, Velocity::default())?;
    let skipped_table = world.archetype_of(b).unwrap_or_default();

    let mut query = world.query().read::<Position>().build()?;
    let mut visited = Vec::new();
    query.run(&world, |table| {
        assert!(table.changed());
        visited.push(table.archetype_id());
        if table.archetype_id() == skipped_table {
            table.skip();
        }
    });
    assert_eq!(visited.len(), 2);
    assert!(query.changed(&world));
    assert!(query.table_changed(&world, skipped_table));
    assert!(!query.table_changed(&world, world.archetype_of(a).unwrap_or_default()));

    query.run(&world, |table| {
        assert_eq!(table.changed(), table.archetype_id() == skipped_table);
    });
    assert!(!query.changed(&world));
    Ok(())
}

#[test]
fn without_excludes_tables() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let still = world.create()?;
    world.set(still, Position { x: 1.0, y: 0.0 })?;
    let moving = world.create()?;
    world.set(moving, Position { x: 2.0, y: 0.0 })?;
    world.set(moving, Velocity::default())?;

    let query = world.query().read::<Position>().without::<Velocity>().build()?;
    let mut seen = Vec::new();
    query.for_each::<Position>(&world, |entity, position| seen.push((entity, position.x)));
    assert_eq!(seen, vec![(still, 1.0)]);
    assert_eq!(query.entity_count(&world), 1);
    Ok(())
}

#[test]
fn table_view_exposes_columns() -> ECSResult<()> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    world.set(e, Position { x: 4.0, y: 5.0 })?;
    world.set(e, Velocity { x: 1.0, y: 1.0 })?;

    let query = world.query().read::<Position>().read::<Velocity>().build()?;
    query.for_each_table(&world, |table| {
        assert_eq!(table.entities(), &[e]);
        assert_eq!(table.column::<Position>(), Some(&[Position { x: 4.0, y: 5.0 }][..]));
        assert!(table.column::<Mass>().is_none());
        assert!(table.version::<Velocity>().is_some());
    });
    let mut pairs = 0;
    query.for_each2::<Position, Velocity>(&world, |_, _, _| pairs += 1);
    assert_eq!(pairs, 1);
    Ok(())
}

#[test]
fn building_query_over_unregistered_type_fails() -> ECSResult<()> {
    struct Stranger;
    let (world, _) = world()?;
    assert!(matches!(world.query().read::<Stranger>().build(), Err(ECSError::UnregisteredType(_))));
    Ok(())
}
