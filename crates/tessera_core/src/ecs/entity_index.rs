//! # Entity Index
//!
//! Maps every live entity to the archetype, chunk and row holding its data.
//! Updated on every structural change: insert, swap-remove, migration.

use super::entity::{Entity, Location};
use crate::memory::NativeMap;

/// Entity-to-location map.
#[derive(Debug)]
pub struct EntityIndex {
    locations: NativeMap<Entity, Location>,
}

impl EntityIndex {
    /// Creates an index with `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            locations: NativeMap::with_capacity(capacity),
        }
    }

    /// Records the location of a new entity, or moves an existing one.
    #[inline]
    pub fn insert(&mut self, entity: Entity, location: Location) {
        self.locations.insert(entity, location);
    }

    /// Location of `entity`, if it is alive.
    #[inline]
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<Location> {
        self.locations.get(&entity).copied()
    }

    /// Checks if `entity` is indexed (alive).
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.locations.contains_key(&entity)
    }

    /// Updates the chunk row of an entity that was moved by swap-remove.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not indexed; a moved row always belongs to a
    /// live entity.
    #[inline]
    pub fn set_row(&mut self, entity: Entity, row: u32) {
        let location = self
            .locations
            .get_mut(&entity)
            .unwrap_or_else(|| panic!("moved entity {entity:?} missing from index"));
        location.row = row;
    }

    /// Drops `entity`, returning its last location.
    #[inline]
    pub fn remove(&mut self, entity: Entity) -> Option<Location> {
        self.locations.remove(&entity)
    }

    /// Number of indexed entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Checks if nothing is indexed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Forgets every entity.
    pub fn clear(&mut self) {
        self.locations.clear();
    }

    /// Iterates `(entity, location)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, Location)> + '_ {
        self.locations.iter().map(|(entity, location)| (*entity, *location))
    }
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::archetype::ArchetypeId;

    #[test]
    fn test_insert_get_remove() {
        let mut index = EntityIndex::with_capacity(0);
        let entity = Entity::new(3, 1);
        let location = Location::new(ArchetypeId::new(2), 0, 5);

        index.insert(entity, location);
        assert_eq!(index.get(entity), Some(location));
        assert!(!index.contains(Entity::new(3, 0)));

        index.set_row(entity, 9);
        assert_eq!(index.get(entity).map(|l| l.row), Some(9));

        assert_eq!(index.remove(entity).map(|l| l.row), Some(9));
        assert!(index.is_empty());
    }

    #[test]
    #[should_panic(expected = "missing from index")]
    fn test_set_row_on_missing_entity_panics() {
        let mut index = EntityIndex::default();
        index.set_row(Entity::new(0, 0), 1);
    }
}
