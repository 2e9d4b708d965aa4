//! System abstractions and the sequential schedule.
//!
//! A **system** is a unit of logic run once per [`Schedule::progress`] call.
//! Systems run in registration order on the calling thread.
//!
//! ## Deferred systems
//!
//! By default a system runs inside recording mode: its writes are queued and
//! replayed when it returns, so a system iterating a table never observes its
//! own structural changes mid-iteration. The writes are visible to the next
//! system. A system that needs immediate effects overrides
//! [`System::deferred`] to return `false`.
//!
//! Recording mode is always closed after a deferred system, even when the
//! system fails; the first error is returned after replay.
//!
//! ## Function-backed systems
//!
//! [`FnSystem`] wraps a closure, which avoids a dedicated type per system:
//!
//! ```ignore
//! let mut schedule = Schedule::new();
//! schedule.add_system(FnSystem::new("move", move |world, dt| {
//!     world.each2_mut::<Velocity, Position, _>(&moving, |_, v, p| {
//!         p.x += v.x * dt;
//!         p.y += v.y * dt;
//!     })?;
//!     Ok(())
//! }));
//! schedule.progress(&mut world, 1.0)?;
//! ```

use crate::engine::error::ECSResult;
use crate::engine::manager::World;

/// A unit of logic operating on the store.
pub trait System {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Executes the system once.
    fn run(&mut self, world: &mut World, delta_time: f32) -> ECSResult<()>;

    /// Whether the schedule wraps this system in recording mode.
    fn deferred(&self) -> bool {
        true
    }
}

/// A [`System`] backed by a closure.
pub struct FnSystem<F>
where
    F: FnMut(&mut World, f32) -> ECSResult<()>,
{
    name: String,
    deferred: bool,
    f: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut World, f32) -> ECSResult<()>,
{
    /// Creates a deferred function-backed system.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), deferred: true, f }
    }

    /// Creates a system whose writes apply immediately.
    pub fn immediate(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), deferred: false, f }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World, f32) -> ECSResult<()>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, world: &mut World, delta_time: f32) -> ECSResult<()> {
        (self.f)(world, delta_time)
    }

    fn deferred(&self) -> bool {
        self.deferred
    }
}

/// Ordered list of systems.
#[derive(Default)]
pub struct Schedule {
    systems: Vec<Box<dyn System>>,
    tick: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a system; it runs after every system added before it.
    pub fn add_system(&mut self, system: impl System + 'static) -> &mut Self {
        self.systems.push(Box::new(system));
        self
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Number of completed `progress` calls.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Runs every system once, in order.
    ///
    /// Stops at the first failing system and returns its error.
    pub fn progress(&mut self, world: &mut World, delta_time: f32) -> ECSResult<()> {
        let span = tracing::debug_span!("progress", tick = self.tick);
        let _enter = span.enter();

        for system in &mut self.systems {
            if !system.deferred() {
                system.run(world, delta_time)?;
                continue;
            }

            world.begin_readonly()?;
            let outcome = system.run(world, delta_time);
            let report = world.end_readonly()?;
            tracing::trace!(system = system.name(), applied = report.applied, skipped = report.skipped, "system done");
            outcome?;
        }

        self.tick += 1;
        Ok(())
    }
}
