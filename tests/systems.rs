mod common;

use std::cell::Cell;
use std::rc::Rc;

use archetype_store::prelude::*;
use common::*;

fn moving_world() -> ECSResult<(World, Entity, Query)> {
    let (mut world, _) = world()?;
    let e = world.create()?;
    world.set(e, Position { x: 0.0, y: 0.0 })?;
    world.set(e, Velocity { x: 1.0, y: 2.0 })?;
    let moving = world.query().read::<Velocity>().write::<Position>().build()?;
    Ok((world, e, moving))
}

#[test]
fn schedule_integrates_velocity() -> ECSResult<()> {
    let (mut world, e, moving) = moving_world()?;
    let mut schedule = Schedule::new();
    schedule.add_system(FnSystem::new("move", move |world: &mut World, dt: f32| {
        world.each2_mut::<Velocity, Position, _>(&moving, |_, velocity, position| {
            position.x += velocity.x * dt;
            position.y += velocity.y * dt;
        })?;
        Ok(())
    }));

    schedule.progress(&mut world, 0.5)?;
    schedule.progress(&mut world, 0.5)?;

    assert_eq!(schedule.tick(), 2);
    assert_eq!(world.get::<Position>(e)?, Some(&Position { x: 1.0, y: 2.0 }));
    assert!(!world.is_recording());
    Ok(())
}

#[test]
fn deferred_writes_reach_the_next_system() -> ECSResult<()> {
    let (mut world, e, _) = moving_world()?;
    let observed = Rc::new(Cell::new(None));
    let sink = Rc::clone(&observed);

    let mut schedule = Schedule::new();
    schedule
        .add_system(FnSystem::new("grow", move |world: &mut World, _| {
            world.set(e, Mass(4.0))?;
            assert!(!world.has::<Mass>(e)?);
            Ok(())
        }))
        .add_system(FnSystem::new("weigh", move |world: &mut World, _| {
            sink.set(world.get::<Mass>(e)?.copied());
            Ok(())
        }));

    schedule.progress(&mut world, 1.0)?;
    assert_eq!(observed.get(), Some(Mass(4.0)));
    assert_eq!(schedule.len(), 2);
    Ok(())
}

#[test]
fn immediate_system_sees_its_own_writes() -> ECSResult<()> {
    let (mut world, e, _) = moving_world()?;
    let mut schedule = Schedule::new();
    schedule.add_system(FnSystem::immediate("tag", move |world: &mut World, _| {
        world.add::<Mass>(e)?;
        assert!(world.has::<Mass>(e)?);
        Ok(())
    }));
    schedule.progress(&mut world, 1.0)?;
    Ok(())
}

#[test]
fn failing_system_still_replays_and_leaves_recording_closed() -> ECSResult<()> {
    let (mut world, e, _) = moving_world()?;
    let gone = world.create()?;
    world.destroy(gone)?;

    let mut schedule = Schedule::new();
    schedule.add_system(FnSystem::new("broken", move |world: &mut World, _| {
        world.set(e, Mass(1.0))?;
        world.set(gone, Mass(1.0))?;
        Ok(())
    }));

    let error = schedule.progress(&mut world, 1.0).unwrap_err();
    assert!(matches!(error, ECSError::EntityNotAlive(_)));
    assert!(!world.is_recording());
    assert_eq!(world.get::<Mass>(e)?, Some(&Mass(1.0)));
    assert_eq!(schedule.tick(), 0);
    Ok(())
}
