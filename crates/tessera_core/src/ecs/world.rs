//! # ECS World
//!
//! The central container for all entities and components.
//!
//! The world owns the component registry, the entity allocator, the entity
//! index and every archetype. Archetypes live in one `Vec` and refer to each
//! other by [`ArchetypeId`]; entities are located through the index, so
//! moving rows between chunks or archetypes never invalidates a handle.

use super::archetype::{Archetype, ArchetypeId};
use super::bundle::{bundle_signature, Bundle};
use super::component::{Component, ComponentId, ComponentRegistry};
use super::entity::{Entity, EntityAllocator, Location};
use super::entity_index::EntityIndex;
use super::query::{Query, QueryData, QueryFilter};
use crate::config::WorldConfig;
use crate::error::{EcsError, EcsResult};
use crate::memory::{BitSet, NativeMap};

/// The ECS World - container for all entities and their components.
///
/// Structural changes (spawn, despawn, adding or removing components) take
/// `&mut self` and run on one thread. Queries borrow the world mutably for
/// the duration of the iteration.
///
/// # Example
///
/// ```rust
/// # use bytemuck::{Pod, Zeroable};
/// # use tessera_core::{Component, World};
/// # #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
/// # #[repr(C)]
/// # struct Position { x: f32, y: f32 }
/// # impl Component for Position {}
/// # #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
/// # #[repr(C)]
/// # struct Velocity { x: f32, y: f32 }
/// # impl Component for Velocity {}
/// let mut world = World::new();
/// world.register::<Position>().unwrap();
/// world.register::<Velocity>().unwrap();
///
/// let entity = world.spawn((Position { x: 1.0, y: 2.0 },)).unwrap();
/// world.insert(entity, Velocity { x: 0.5, y: 0.0 }).unwrap();
/// assert!(world.has::<Velocity>(entity));
/// assert_eq!(world.get::<Position>(entity), Some(&Position { x: 1.0, y: 2.0 }));
/// ```
pub struct World {
    config: WorldConfig,
    registry: ComponentRegistry,
    entities: EntityAllocator,
    index: EntityIndex,
    /// Indexed by `ArchetypeId`; slot 0 is the empty signature.
    archetypes: Vec<Archetype>,
    archetype_ids: NativeMap<BitSet, ArchetypeId>,
}

impl World {
    /// Creates a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Creates a world with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn with_config(config: WorldConfig) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        let mut world = Self {
            registry: ComponentRegistry::new(),
            entities: EntityAllocator::new(config.entity_capacity),
            index: EntityIndex::with_capacity(config.entity_capacity),
            archetypes: Vec::with_capacity(config.archetype_capacity),
            archetype_ids: NativeMap::with_capacity(config.archetype_capacity),
            config,
        };
        let empty = world.archetype_for(BitSet::new());
        debug_assert_eq!(empty, ArchetypeId::EMPTY);
        world
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Registers component type `T`. Registering twice returns the same id.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentLimit`] past 256 component types.
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentId> {
        self.registry.register::<T>()
    }

    /// Id of `T`, if registered.
    #[inline]
    #[must_use]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.registry.id_of::<T>()
    }

    /// The component registry.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// The configuration this world was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Spawns an entity carrying `bundle`.
    ///
    /// # Errors
    ///
    /// Fails if a bundle type is unregistered or listed twice, or if every
    /// entity id is in use.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> EcsResult<Entity> {
        let (ids, signature) = bundle_signature::<B>(&self.registry)?;
        let archetype_id = self.archetype_for(signature);
        let entity = self.entities.allocate()?;

        let archetype = &mut self.archetypes[archetype_id.index()];
        let location = archetype.insert(entity, &mut self.index);
        bundle.write(archetype, &ids, location);
        Ok(entity)
    }

    /// Spawns one entity per bundle, filling chunks in bulk.
    ///
    /// # Errors
    ///
    /// As [`World::spawn`]. On failure no entity is spawned.
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> EcsResult<Vec<Entity>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
    {
        let (ids, signature) = bundle_signature::<B>(&self.registry)?;
        let bundles: Vec<B> = bundles.into_iter().collect();

        let mut entities = Vec::with_capacity(bundles.len());
        for _ in 0..bundles.len() {
            match self.entities.allocate() {
                Ok(entity) => entities.push(entity),
                Err(error) => {
                    for &entity in &entities {
                        self.entities.free(entity);
                    }
                    return Err(error);
                }
            }
        }

        let archetype_id = self.archetype_for(signature);
        let archetype = &mut self.archetypes[archetype_id.index()];
        let locations = archetype.insert_batch(&entities, &mut self.index);
        for (bundle, location) in bundles.into_iter().zip(locations) {
            bundle.write(archetype, &ids, location);
        }
        Ok(entities)
    }

    /// Despawns `entity`. Returns `false` if it was not alive.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(location) = self.index.get(entity) else {
            return false;
        };
        self.archetypes[location.archetype.index()].remove(entity, &mut self.index);
        self.entities.free(entity);
        true
    }

    /// Checks if `entity` is alive. Handles from before a despawn stay dead
    /// after their id is reused.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.index.contains(entity)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entities.alive_count()
    }

    /// Checks if no entity is alive.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Where `entity` is stored.
    #[inline]
    #[must_use]
    pub fn location(&self, entity: Entity) -> Option<Location> {
        self.index.get(entity)
    }

    /// Despawns every entity. Archetypes and their chunks are kept for reuse
    /// and every outstanding handle becomes stale.
    pub fn clear(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.clear();
        }
        self.index.clear();
        self.entities.clear();
    }

    // =========================================================================
    // Component access
    // =========================================================================

    /// Component `T` of `entity`.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let location = self.index.get(entity)?;
        let archetype = &self.archetypes[location.archetype.index()];
        let column = archetype.column_of(self.registry.id_of::<T>()?)?;
        archetype.get_at(column, location)
    }

    /// Mutable component `T` of `entity`.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let location = self.index.get(entity)?;
        let archetype = &mut self.archetypes[location.archetype.index()];
        let column = archetype.column_of(self.registry.id_of::<T>()?)?;
        archetype.get_at_mut(column, location)
    }

    /// Overwrites component `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered, the entity is dead, or the entity does
    /// not carry `T` (use [`World::insert`] to add it).
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.registry.expect_id::<T>()?;
        if !self.is_alive(entity) {
            return Err(EcsError::NoSuchEntity(entity));
        }
        let slot = self.get_mut::<T>(entity).ok_or(EcsError::MissingComponent {
            entity,
            name: std::any::type_name::<T>(),
        })?;
        *slot = value;
        Ok(())
    }

    /// Checks if `entity` is alive and carries `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        match (self.index.get(entity), self.registry.id_of::<T>()) {
            (Some(location), Some(id)) => self.archetypes[location.archetype.index()].contains(id),
            _ => false,
        }
    }

    /// Adds component `T` to `entity`, or overwrites it if already present.
    ///
    /// Adding moves the entity to the archetype with `T` in its signature;
    /// every other component value is kept.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered or the entity is dead.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let id = self.registry.expect_id::<T>()?;
        let mut location = self.index.get(entity).ok_or(EcsError::NoSuchEntity(entity))?;

        if !self.archetypes[location.archetype.index()].contains(id) {
            let target = self.add_target(location.archetype, id);
            location = self.migrate(entity, location.archetype, target);
        }

        let archetype = &mut self.archetypes[location.archetype.index()];
        if let Some(slot) = archetype
            .column_of(id)
            .and_then(|column| archetype.get_at_mut::<T>(column, location))
        {
            *slot = value;
        }
        Ok(())
    }

    /// Removes component `T` from `entity`, returning its last value.
    ///
    /// Returns `Ok(None)` if the entity does not carry `T`. Removing moves the
    /// entity to the archetype without `T`; every other component value is
    /// kept.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered or the entity is dead.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> EcsResult<Option<T>> {
        let id = self.registry.expect_id::<T>()?;
        let location = self.index.get(entity).ok_or(EcsError::NoSuchEntity(entity))?;

        let archetype = &self.archetypes[location.archetype.index()];
        let Some(value) = archetype
            .column_of(id)
            .and_then(|column| archetype.get_at::<T>(column, location))
            .copied()
        else {
            return Ok(None);
        };

        let target = self.remove_target(location.archetype, id);
        self.migrate(entity, location.archetype, target);
        Ok(Some(value))
    }

    // =========================================================================
    // Archetypes
    // =========================================================================

    /// Archetype storing exactly `signature`, created on first request.
    ///
    /// # Panics
    ///
    /// Panics if `signature` names an id the registry never issued.
    pub fn archetype_for(&mut self, signature: BitSet) -> ArchetypeId {
        if let Some(&id) = self.archetype_ids.get(&signature) {
            return id;
        }

        assert!(
            signature.iter().all(|bit| bit < self.registry.len()),
            "signature names an unregistered component"
        );

        let id = ArchetypeId::new(self.archetypes.len() as u32);
        let archetype = Archetype::new(
            id,
            signature,
            self.registry.infos_of(&signature),
            self.config.chunk_bytes,
        );
        tracing::debug!(
            archetype = id.index(),
            components = signature.count(),
            rows_per_chunk = archetype.chunk_capacity(),
            "created archetype"
        );

        self.archetypes.push(archetype);
        self.archetype_ids.insert(signature, id);
        id
    }

    /// Every archetype, in creation order.
    #[inline]
    #[must_use]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Archetype `id`, if it exists.
    #[inline]
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Target of adding `component` to `source`, through the edge cache.
    fn add_target(&mut self, source: ArchetypeId, component: ComponentId) -> ArchetypeId {
        if let Some(target) = self.archetypes[source.index()].add_edge(component) {
            return target;
        }

        let mut signature = *self.archetypes[source.index()].signature();
        signature.set(component.index());
        let target = self.archetype_for(signature);

        self.archetypes[source.index()].set_add_edge(component, target);
        self.archetypes[target.index()].set_remove_edge(component, source);
        target
    }

    /// Target of removing `component` from `source`, through the edge cache.
    fn remove_target(&mut self, source: ArchetypeId, component: ComponentId) -> ArchetypeId {
        if let Some(target) = self.archetypes[source.index()].remove_edge(component) {
            return target;
        }

        let mut signature = *self.archetypes[source.index()].signature();
        signature.clear(component.index());
        let target = self.archetype_for(signature);

        self.archetypes[source.index()].set_remove_edge(component, target);
        self.archetypes[target.index()].set_add_edge(component, source);
        target
    }

    /// Moves `entity` between two distinct archetypes.
    fn migrate(&mut self, entity: Entity, source: ArchetypeId, target: ArchetypeId) -> Location {
        let (source, target) = pair_mut(&mut self.archetypes, source.index(), target.index());
        Archetype::move_entity(source, target, entity, &mut self.index)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Builds a query over `Q` with no filter.
    ///
    /// # Panics
    ///
    /// Panics if `Q` requests one component mutably more than once.
    #[must_use]
    pub fn query<Q: QueryData>(&self) -> Query<Q> {
        Query::new(&self.registry)
    }

    /// Builds a query over `Q` restricted by filter `F`.
    ///
    /// # Panics
    ///
    /// As [`World::query`].
    #[must_use]
    pub fn query_filtered<Q: QueryData, F: QueryFilter>(&self) -> Query<Q, F> {
        Query::new(&self.registry)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.len())
            .field("components", &self.registry.len())
            .field("archetypes", &self.archetypes.len())
            .finish_non_exhaustive()
    }
}

/// Two distinct elements of `slice`, mutably.
fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "pair_mut requires distinct indices");
    if a < b {
        let (head, tail) = slice.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = slice.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Without;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
        z: f32,
        _padding: f32,
    }
    impl Component for Position {}

    impl Position {
        fn new(x: f32, y: f32, z: f32) -> Self {
            Self { x, y, z, _padding: 0.0 }
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Velocity {
        x: f32,
        y: f32,
        z: f32,
        _padding: f32,
    }
    impl Component for Velocity {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Tag(u32);
    impl Component for Tag {}

    fn world() -> World {
        let mut world = World::new();
        world.register::<Position>().unwrap();
        world.register::<Velocity>().unwrap();
        world.register::<Tag>().unwrap();
        world
    }

    #[test]
    fn test_world_creation() {
        let world = World::new();
        assert!(world.is_empty());
        assert_eq!(world.archetypes().len(), 1);
        assert!(world.archetypes()[0].signature().is_empty());
    }

    #[test]
    fn test_spawn_despawn() {
        let mut world = world();
        let entity = world.spawn((Position::new(1.0, 2.0, 3.0),)).unwrap();
        assert!(world.is_alive(entity));
        assert_eq!(world.len(), 1);

        assert!(world.despawn(entity));
        assert!(!world.is_alive(entity));
        assert!(!world.despawn(entity));
        assert_eq!(world.len(), 0);
    }

    #[test]
    fn test_spawn_empty_bundle() {
        let mut world = world();
        let entity = world.spawn(()).unwrap();
        assert_eq!(world.location(entity).map(|l| l.archetype), Some(ArchetypeId::EMPTY));
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut world = world();
        let old = world.spawn((Tag(1),)).unwrap();
        world.despawn(old);
        let new = world.spawn((Tag(2),)).unwrap();

        assert_eq!(new.id, old.id);
        assert!(!world.is_alive(old));
        assert!(world.get::<Tag>(old).is_none());
        assert_eq!(world.get::<Tag>(new), Some(&Tag(2)));
        assert!(matches!(world.set(old, Tag(3)), Err(EcsError::NoSuchEntity(_))));
    }

    #[test]
    fn test_set_and_get() {
        let mut world = world();
        let entity = world.spawn((Position::default(), Tag(0))).unwrap();
        world.set(entity, Tag(9)).unwrap();
        world.get_mut::<Position>(entity).unwrap().x = 4.0;

        assert_eq!(world.get::<Tag>(entity), Some(&Tag(9)));
        assert_eq!(world.get::<Position>(entity).map(|p| p.x), Some(4.0));
        assert!(matches!(
            world.set(entity, Velocity::default()),
            Err(EcsError::MissingComponent { .. })
        ));
    }

    #[test]
    fn test_insert_and_remove_migrate() {
        let mut world = world();
        let entity = world.spawn((Position::new(1.0, 2.0, 3.0),)).unwrap();
        let start = world.location(entity).unwrap().archetype;

        world.insert(entity, Velocity::default()).unwrap();
        assert!(world.has::<Velocity>(entity));
        assert_eq!(world.get::<Position>(entity), Some(&Position::new(1.0, 2.0, 3.0)));

        // Inserting an existing component overwrites in place.
        let location = world.location(entity).unwrap();
        world.insert(entity, Position::new(7.0, 0.0, 0.0)).unwrap();
        assert_eq!(world.location(entity), Some(location));

        assert_eq!(world.remove::<Velocity>(entity).unwrap(), Some(Velocity::default()));
        assert_eq!(world.remove::<Velocity>(entity).unwrap(), None);
        assert_eq!(world.location(entity).unwrap().archetype, start);
        assert_eq!(world.get::<Position>(entity), Some(&Position::new(7.0, 0.0, 0.0)));
    }

    #[test]
    fn test_edges_are_cached() {
        let mut world = world();
        let a = world.spawn((Position::default(),)).unwrap();
        let b = world.spawn((Position::default(),)).unwrap();
        world.insert(a, Tag(1)).unwrap();
        let archetypes = world.archetypes().len();
        world.insert(b, Tag(2)).unwrap();

        assert_eq!(world.archetypes().len(), archetypes);
        assert_eq!(world.location(a).unwrap().archetype, world.location(b).unwrap().archetype);
    }

    #[test]
    fn test_archetype_for_is_unique_per_signature() {
        let mut world = world();
        let p = world.component_id::<Position>().unwrap();
        let v = world.component_id::<Velocity>().unwrap();

        let first = world.archetype_for(BitSet::from_bits(&[p.index(), v.index()]));
        let second = world.archetype_for(BitSet::from_bits(&[v.index(), p.index()]));
        assert_eq!(first, second);
        assert_eq!(world.archetype(first).map(Archetype::len), Some(0));
    }

    #[test]
    fn test_unregistered_component_errors() {
        let mut world = World::new();
        assert!(matches!(
            world.spawn((Tag(0),)),
            Err(EcsError::UnregisteredComponent { .. })
        ));
        let entity = world.spawn(()).unwrap();
        assert!(matches!(
            world.insert(entity, Tag(0)),
            Err(EcsError::UnregisteredComponent { .. })
        ));
    }

    #[test]
    fn test_spawn_batch() {
        let mut world = world();
        let entities = world
            .spawn_batch((0..1000).map(|i| (Tag(i), Position::new(i as f32, 0.0, 0.0))))
            .unwrap();
        assert_eq!(entities.len(), 1000);
        assert_eq!(world.len(), 1000);
        for (i, &entity) in entities.iter().enumerate() {
            assert_eq!(world.get::<Tag>(entity), Some(&Tag(i as u32)));
        }
    }

    #[test]
    fn test_clear_keeps_archetypes() {
        let mut world = world();
        let entity = world.spawn((Tag(1),)).unwrap();
        let archetypes = world.archetypes().len();
        world.clear();

        assert!(world.is_empty());
        assert!(!world.is_alive(entity));
        assert_eq!(world.archetypes().len(), archetypes);

        let fresh = world.spawn((Tag(2),)).unwrap();
        assert_eq!(world.get::<Tag>(fresh), Some(&Tag(2)));
    }

    #[test]
    fn test_query_sees_migrated_entities() {
        let mut world = world();
        for i in 0..10 {
            let entity = world.spawn((Tag(i),)).unwrap();
            if i % 2 == 0 {
                world.insert(entity, Velocity::default()).unwrap();
            }
        }

        let still = world.query_filtered::<&Tag, Without<Velocity>>();
        let mut seen = Vec::new();
        still.for_each(&mut world, |tag| seen.push(tag.0));
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = WorldConfig {
            chunk_bytes: 8,
            ..WorldConfig::default()
        };
        assert!(matches!(World::with_config(config), Err(EcsError::InvalidConfig(_))));
    }
}
