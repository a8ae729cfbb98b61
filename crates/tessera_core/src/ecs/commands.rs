//! # Deferred Commands
//!
//! Structural changes cannot happen while a query holds the world. Record
//! them in a [`Commands`] buffer during iteration and apply the buffer once
//! the query is done:
//!
//! ```rust
//! # use bytemuck::{Pod, Zeroable};
//! # use tessera_core::{Commands, Component, Entity, World};
//! # #[derive(Clone, Copy, Default, Pod, Zeroable)]
//! # #[repr(C)]
//! # struct Health(u32);
//! # impl Component for Health {}
//! let mut world = World::new();
//! world.register::<Health>().unwrap();
//! world.spawn((Health(0),)).unwrap();
//! world.spawn((Health(5),)).unwrap();
//!
//! let commands = Commands::new();
//! world.query::<(Entity, &Health)>().for_each(&mut world, |(entity, health)| {
//!     if health.0 == 0 {
//!         commands.despawn(entity);
//!     }
//! });
//! commands.apply(&mut world).unwrap();
//! assert_eq!(world.len(), 1);
//! ```
//!
//! The buffer is guarded by a mutex, so parallel queries may record into
//! one shared buffer.

use parking_lot::Mutex;

use super::bundle::Bundle;
use super::component::Component;
use super::entity::Entity;
use super::world::World;
use crate::error::{EcsError, EcsResult};

type Command = Box<dyn FnOnce(&mut World) -> EcsResult<()> + Send>;

/// Thread-safe buffer of deferred world mutations.
#[derive(Default)]
pub struct Commands {
    queue: Mutex<Vec<Command>>,
}

impl Commands {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Checks if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Records an arbitrary mutation.
    pub fn add<C>(&self, command: C)
    where
        C: FnOnce(&mut World) -> EcsResult<()> + Send + 'static,
    {
        self.queue.lock().push(Box::new(command));
    }

    /// Records a spawn.
    pub fn spawn<B: Bundle>(&self, bundle: B) {
        self.add(move |world| world.spawn(bundle).map(drop));
    }

    /// Records a despawn. Applying it fails if the entity is already dead.
    pub fn despawn(&self, entity: Entity) {
        self.add(move |world| {
            if world.despawn(entity) {
                Ok(())
            } else {
                Err(EcsError::NoSuchEntity(entity))
            }
        });
    }

    /// Records adding or overwriting component `T`.
    pub fn insert<T: Component>(&self, entity: Entity, value: T) {
        self.add(move |world| world.insert(entity, value));
    }

    /// Records removing component `T`.
    pub fn remove<T: Component>(&self, entity: Entity) {
        self.add(move |world| world.remove::<T>(entity).map(drop));
    }

    /// Runs every recorded command in recording order and empties the buffer.
    ///
    /// A failing command does not stop the rest.
    ///
    /// # Errors
    ///
    /// Returns the first failure; every failure is logged.
    pub fn apply(&self, world: &mut World) -> EcsResult<()> {
        let commands = std::mem::take(&mut *self.queue.lock());
        let mut first_error = None;

        for (position, command) in commands.into_iter().enumerate() {
            if let Err(error) = command(world) {
                tracing::warn!(command = position, %error, "deferred command failed");
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commands").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Health(u32);
    impl Component for Health {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Poisoned(u32);
    impl Component for Poisoned {}

    fn world() -> World {
        let mut world = World::new();
        world.register::<Health>().unwrap();
        world.register::<Poisoned>().unwrap();
        world
    }

    #[test]
    fn test_commands_run_in_order() {
        let mut world = world();
        let entity = world.spawn((Health(1),)).unwrap();

        let commands = Commands::new();
        commands.insert(entity, Poisoned(3));
        commands.insert(entity, Health(7));
        commands.remove::<Poisoned>(entity);
        commands.spawn((Health(2),));
        assert_eq!(commands.len(), 4);

        commands.apply(&mut world).unwrap();
        assert!(commands.is_empty());
        assert_eq!(world.get::<Health>(entity), Some(&Health(7)));
        assert!(!world.has::<Poisoned>(entity));
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn test_failure_does_not_stop_later_commands() {
        let mut world = world();
        let entity = world.spawn((Health(1),)).unwrap();
        world.despawn(entity);

        let commands = Commands::new();
        commands.despawn(entity);
        commands.spawn((Health(9),));

        let result = commands.apply(&mut world);
        assert!(matches!(result, Err(EcsError::NoSuchEntity(e)) if e == entity));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn test_custom_command() {
        let mut world = world();
        let commands = Commands::new();
        commands.add(|world: &mut World| {
            world.spawn((Health(4), Poisoned(1)))?;
            Ok(())
        });
        commands.apply(&mut world).unwrap();
        assert_eq!(world.query::<&Poisoned>().count(&world), 1);
    }
}
