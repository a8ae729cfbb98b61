//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An id, recycled through a free list after despawn
//! - A generation counter, bumped on every reuse of the id
//!
//! A stale handle (old generation) never equals the live handle for the same
//! id, so every lookup keyed by `Entity` rejects it.

use bytemuck::{Pod, Zeroable};

use super::archetype::ArchetypeId;
use crate::error::{EcsError, EcsResult};
use crate::memory::NativeArray;

/// Handle to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(C)]
pub struct Entity {
    /// Slot id, unique among live entities.
    pub id: u32,
    /// Reuse counter of the id.
    pub generation: u32,
}

impl Entity {
    /// Highest id the allocator hands out (exclusive). Ids at or above this
    /// value would collide with the index's empty-slot sentinel.
    pub const MAX_ID: u32 = 0xFEFE_FEFE;

    /// Creates an entity handle from its parts.
    #[inline]
    #[must_use]
    pub const fn new(id: u32, generation: u32) -> Self {
        Self { id, generation }
    }

    /// Packs the handle into one integer (generation in the upper half).
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.id as u64
    }

    /// Inverse of [`Entity::to_bits`].
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            id: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

/// Where an entity's row lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Location {
    /// Owning archetype.
    pub archetype: ArchetypeId,
    /// Chunk index within the archetype.
    pub chunk: u32,
    /// Row within the chunk.
    pub row: u32,
}

impl Location {
    /// Creates a location.
    #[inline]
    #[must_use]
    pub const fn new(archetype: ArchetypeId, chunk: u32, row: u32) -> Self {
        Self {
            archetype,
            chunk,
            row,
        }
    }
}

/// Hands out entity ids and tracks their generations.
pub struct EntityAllocator {
    /// Current generation per id ever issued.
    generations: NativeArray<u32>,
    /// Number of ids ever issued.
    issued: u32,
    /// Despawned ids available for reuse.
    free_ids: Vec<u32>,
    /// Number of currently alive entities.
    alive_count: usize,
}

impl EntityAllocator {
    /// Creates an allocator with room for `capacity` ids before its first
    /// reallocation.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            generations: NativeArray::new(capacity),
            issued: 0,
            free_ids: Vec::new(),
            alive_count: 0,
        }
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Allocates an entity, reusing a freed id when one is available.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityLimit`] when every id below
    /// [`Entity::MAX_ID`] is alive.
    pub fn allocate(&mut self) -> EcsResult<Entity> {
        let entity = if let Some(id) = self.free_ids.pop() {
            Entity::new(id, self.generations[id as usize])
        } else {
            if self.issued >= Entity::MAX_ID {
                return Err(EcsError::EntityLimit { limit: Entity::MAX_ID });
            }
            let id = self.issued;
            self.issued += 1;
            if id as usize >= self.generations.len() {
                let grown = (self.generations.len() * 2).max(64);
                self.generations.resize(grown);
            }
            Entity::new(id, self.generations[id as usize])
        };

        self.alive_count += 1;
        Ok(entity)
    }

    /// Checks if `entity` carries the current generation of its id.
    ///
    /// Freed ids are bumped immediately, so handles to despawned entities
    /// fail this check even before the id is reused.
    #[inline]
    #[must_use]
    pub fn is_current(&self, entity: Entity) -> bool {
        entity.id < self.issued && self.generations[entity.id as usize] == entity.generation
    }

    /// Releases `entity`; its id comes back with the next generation.
    ///
    /// The caller guarantees `entity` is alive (the world checks the index
    /// first).
    pub fn free(&mut self, entity: Entity) {
        debug_assert!(entity.id < self.issued, "freeing an id that was never issued");
        let slot = &mut self.generations[entity.id as usize];
        *slot = slot.wrapping_add(1);
        self.free_ids.push(entity.id);
        self.alive_count -= 1;
    }

    /// Forgets every entity. Generations survive so old handles stay stale.
    pub fn clear(&mut self) {
        for slot in &mut self.generations.as_mut_slice()[..self.issued as usize] {
            *slot = slot.wrapping_add(1);
        }
        self.free_ids.clear();
        self.free_ids.extend((0..self.issued).rev());
        self.alive_count = 0;
    }
}
