//! # Archetype-based Entity Storage
//!
//! Entities with the same component set share an archetype. An archetype is
//! a list of fixed-size chunks, each storing its rows as structure of arrays:
//!
//! ```text
//! Archetype {Position, Velocity}
//!   chunk 0: entities [E0 E1 E2 .. E818]  Position [P0 ..]  Velocity [V0 ..]
//!   chunk 1: entities [E819 .. ]          Position [..]     Velocity [..]
//! ```
//!
//! Iteration is linear within each column. Archetypes, chunks and rows refer
//! to each other by integer ids only, so moving data never invalidates a
//! handle held elsewhere.

use bytemuck::{Pod, Zeroable};

use super::chunk::ArchetypeChunk;
use super::component::{Component, ComponentId, ComponentInfo, ComponentRegistry};
use super::entity::{Entity, Location};
use super::entity_index::EntityIndex;
use crate::memory::{BitSet, NativeMap};

/// Index of an archetype within its world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The archetype of entities without components; every world has it.
    pub const EMPTY: Self = Self(0);

    /// Creates an id from its index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position of the archetype in the world's archetype list.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Storage for every entity with one exact component signature.
#[derive(Debug)]
pub struct Archetype {
    /// Identity within the world.
    id: ArchetypeId,
    /// Component ids stored here.
    signature: BitSet,
    /// Component metadata, ordered by id (column order).
    components: Box<[ComponentInfo]>,
    /// Chunks in creation order; never removed.
    chunks: Vec<ArchetypeChunk>,
    /// Rows per chunk.
    chunk_capacity: usize,
    /// Lowest chunk that may have a free row.
    open_chunk: usize,
    /// Live entities across all chunks.
    len: usize,
    /// Target archetype when a component is added.
    add_edges: NativeMap<ComponentId, ArchetypeId>,
    /// Target archetype when a component is removed.
    remove_edges: NativeMap<ComponentId, ArchetypeId>,
}

impl Archetype {
    /// Creates an empty archetype. No chunk is allocated until the first insert.
    ///
    /// # Panics
    ///
    /// Panics if `components` does not match `signature` in id order.
    #[must_use]
    pub fn new(id: ArchetypeId, signature: BitSet, components: Vec<ComponentInfo>, chunk_bytes: usize) -> Self {
        assert!(
            components.len() == signature.count()
                && components.iter().zip(signature.iter()).all(|(info, bit)| info.id.index() == bit),
            "component list does not match archetype signature"
        );

        let chunk_capacity = ArchetypeChunk::capacity_for(&components, chunk_bytes);
        Self {
            id,
            signature,
            components: components.into_boxed_slice(),
            chunks: Vec::new(),
            chunk_capacity,
            open_chunk: 0,
            len: 0,
            add_edges: NativeMap::new(),
            remove_edges: NativeMap::new(),
        }
    }

    /// Returns the id of this archetype.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Returns the signature of this archetype.
    #[inline]
    #[must_use]
    pub const fn signature(&self) -> &BitSet {
        &self.signature
    }

    /// Component metadata in column order.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    /// Returns the number of entities in this archetype.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Checks if empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rows per chunk.
    #[inline]
    #[must_use]
    pub const fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Chunks in creation order.
    #[inline]
    #[must_use]
    pub fn chunks(&self) -> &[ArchetypeChunk] {
        &self.chunks
    }

    /// Chunks in creation order, mutably.
    #[inline]
    pub fn chunks_mut(&mut self) -> &mut [ArchetypeChunk] {
        &mut self.chunks
    }

    /// Checks signature membership of a component id.
    #[inline]
    #[must_use]
    pub fn contains(&self, component: ComponentId) -> bool {
        self.signature.has(component.index())
    }

    /// Checks signature membership of `T`.
    #[inline]
    #[must_use]
    pub fn has<T: Component>(&self, registry: &ComponentRegistry) -> bool {
        registry.id_of::<T>().is_some_and(|id| self.contains(id))
    }

    /// Column holding `component`, if it is part of the signature.
    #[inline]
    #[must_use]
    pub fn column_of(&self, component: ComponentId) -> Option<usize> {
        self.contains(component)
            .then(|| self.signature.rank(component.index()))
    }

    /// Index of a chunk with a free row, allocating one if every chunk is full.
    fn open_chunk_index(&mut self) -> usize {
        while self.open_chunk < self.chunks.len() && self.chunks[self.open_chunk].is_full() {
            self.open_chunk += 1;
        }

        if self.open_chunk == self.chunks.len() {
            tracing::trace!(
                archetype = self.id.index(),
                chunk = self.chunks.len(),
                rows = self.chunk_capacity,
                "allocating chunk"
            );
            self.chunks.push(ArchetypeChunk::new(&self.components, self.chunk_capacity));
        }
        self.open_chunk
    }

    /// Adds `entity` with zeroed components and records its location.
    pub fn insert(&mut self, entity: Entity, index: &mut EntityIndex) -> Location {
        let chunk = self.open_chunk_index();
        let row = self.chunks[chunk].push(entity);
        self.len += 1;

        let location = Location::new(self.id, chunk as u32, row as u32);
        index.insert(entity, location);
        location
    }

    /// Adds many entities with zeroed components.
    ///
    /// Fills free rows chunk by chunk, publishing each run of rows at once.
    /// Returns the locations in input order.
    pub fn insert_batch(&mut self, entities: &[Entity], index: &mut EntityIndex) -> Vec<Location> {
        let mut locations = Vec::with_capacity(entities.len());
        let mut remaining = entities;

        while !remaining.is_empty() {
            let chunk = self.open_chunk_index();
            let take = self.chunks[chunk].free_rows().min(remaining.len());
            let (batch, rest) = remaining.split_at(take);

            let start = self.chunks[chunk].push_rows(batch);
            for (offset, &entity) in batch.iter().enumerate() {
                let location = Location::new(self.id, chunk as u32, (start + offset) as u32);
                index.insert(entity, location);
                locations.push(location);
            }

            self.len += take;
            remaining = rest;
        }

        locations
    }

    /// Swap-removes a row and re-indexes the entity that filled the hole.
    fn swap_remove_row(&mut self, chunk: usize, row: usize, index: &mut EntityIndex) {
        if let Some(moved) = self.chunks[chunk].swap_remove(row) {
            index.set_row(moved, row as u32);
        }
        self.len -= 1;
        self.open_chunk = self.open_chunk.min(chunk);
    }

    /// Removes `entity` and its components.
    ///
    /// Returns `false` if the entity does not live in this archetype.
    pub fn remove(&mut self, entity: Entity, index: &mut EntityIndex) -> bool {
        match index.get(entity) {
            Some(location) if location.archetype == self.id => {
                self.swap_remove_row(location.chunk as usize, location.row as usize, index);
                index.remove(entity);
                true
            }
            _ => false,
        }
    }

    /// Value of `column` at `location`.
    #[inline]
    #[must_use]
    pub fn get_at<T: Component>(&self, column: usize, location: Location) -> Option<&T> {
        self.chunks
            .get(location.chunk as usize)?
            .get_component::<T>(column, location.row as usize)
    }

    /// Mutable value of `column` at `location`.
    #[inline]
    pub fn get_at_mut<T: Component>(&mut self, column: usize, location: Location) -> Option<&mut T> {
        self.chunks
            .get_mut(location.chunk as usize)?
            .get_component_mut::<T>(column, location.row as usize)
    }

    fn locate<T: Component>(
        &self,
        registry: &ComponentRegistry,
        index: &EntityIndex,
        entity: Entity,
    ) -> Option<(usize, Location)> {
        let column = self.column_of(registry.id_of::<T>()?)?;
        let location = index.get(entity)?;
        (location.archetype == self.id).then_some((column, location))
    }

    /// Component `T` of `entity`, if the entity lives here and the signature
    /// contains `T`.
    #[must_use]
    pub fn get<T: Component>(&self, registry: &ComponentRegistry, index: &EntityIndex, entity: Entity) -> Option<&T> {
        let (column, location) = self.locate::<T>(registry, index, entity)?;
        self.get_at(column, location)
    }

    /// Mutable component `T` of `entity`.
    pub fn get_mut<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        index: &EntityIndex,
        entity: Entity,
    ) -> Option<&mut T> {
        let (column, location) = self.locate::<T>(registry, index, entity)?;
        self.get_at_mut(column, location)
    }

    /// Overwrites component `T` of `entity`. Returns `false` if the entity
    /// does not live here or the signature lacks `T`.
    pub fn set<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        index: &EntityIndex,
        entity: Entity,
        value: T,
    ) -> bool {
        match self.get_mut::<T>(registry, index, entity) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Moves `entity` from `source` into `target`.
    ///
    /// Components present in both signatures are copied; components only in
    /// `target` stay zeroed for the caller to fill; components only in
    /// `source` are dropped. The vacated source row is swap-filled.
    ///
    /// # Panics
    ///
    /// Panics if `entity` does not live in `source`.
    pub fn move_entity(
        source: &mut Self,
        target: &mut Self,
        entity: Entity,
        index: &mut EntityIndex,
    ) -> Location {
        let from = index
            .get(entity)
            .filter(|location| location.archetype == source.id)
            .unwrap_or_else(|| panic!("{entity:?} does not live in archetype {:?}", source.id));

        let chunk = target.open_chunk_index();
        let row = target.chunks[chunk].push(entity);
        target.len += 1;

        let source_chunk = &source.chunks[from.chunk as usize];
        let target_chunk = &mut target.chunks[chunk];
        for (column, info) in target.components.iter().enumerate() {
            if let Some(source_column) = source.column_of(info.id) {
                target_chunk.copy_component_from(column, row, source_chunk, source_column, from.row as usize);
            }
        }

        source.swap_remove_row(from.chunk as usize, from.row as usize, index);

        let location = Location::new(target.id, chunk as u32, row as u32);
        index.insert(entity, location);
        location
    }

    /// Cached target for adding `component`.
    #[inline]
    #[must_use]
    pub fn add_edge(&self, component: ComponentId) -> Option<ArchetypeId> {
        self.add_edges.get(&component).copied()
    }

    /// Caches the target for adding `component`.
    #[inline]
    pub fn set_add_edge(&mut self, component: ComponentId, target: ArchetypeId) {
        self.add_edges.insert(component, target);
    }

    /// Cached target for removing `component`.
    #[inline]
    #[must_use]
    pub fn remove_edge(&self, component: ComponentId) -> Option<ArchetypeId> {
        self.remove_edges.get(&component).copied()
    }

    /// Caches the target for removing `component`.
    #[inline]
    pub fn set_remove_edge(&mut self, component: ComponentId, target: ArchetypeId) {
        self.remove_edges.insert(component, target);
    }

    /// Drops every row, keeping the allocated chunks.
    pub fn clear(&mut self) {
        for chunk in &mut self.chunks {
            chunk.set_count(0);
        }
        self.open_chunk = 0;
        self.len = 0;
    }
}
