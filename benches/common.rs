#![allow(dead_code)]

use archetype_store::prelude::*;

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

#[derive(Clone, Copy, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Default)]
pub struct Wealth {
    pub value: f32,
}

pub fn make_world() -> ECSResult<World> {
    let mut world = World::with_config(WorldConfig::default().with_entity_capacity(AGENTS_MED));
    world.register::<Position>()?;
    world.register::<Velocity>()?;
    world.register::<Wealth>()?;
    Ok(world)
}

/// Spawns `agent_count` movers; every fourth one also carries wealth.
pub fn populate(world: &mut World, agent_count: usize) -> ECSResult<Vec<Entity>> {
    let mut entities = Vec::with_capacity(agent_count);
    for i in 0..agent_count {
        let e = world.create()?;
        world.set(e, Position { x: i as f32, y: 0.0 })?;
        world.set(e, Velocity { x: 1.0, y: 0.5 })?;
        if i % 4 == 0 {
            world.set(e, Wealth { value: 100.0 })?;
        }
        entities.push(e);
    }
    Ok(entities)
}
