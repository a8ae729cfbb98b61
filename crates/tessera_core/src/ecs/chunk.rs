//! # Archetype Chunks
//!
//! A chunk is a fixed-capacity block of rows stored as structure of arrays:
//!
//! ```text
//! Chunk (capacity 4, count 3), signature {Position, Velocity}:
//!   entities : [E7, E2, E9, --]
//!   Position : [P7, P2, P9, --]
//!   Velocity : [V7, V2, V9, --]
//! ```
//!
//! Rows `[0, count)` are live; removal swaps the last live row into the hole
//! so the live range stays dense.

// SAFETY: Columns are type-erased buffers; typed views check the column's
// TypeId before casting.
#![allow(unsafe_code)]

use std::any::TypeId;

use super::component::{Component, ComponentInfo};
use super::entity::Entity;
use crate::memory::{NativeArray, RawBuffer};

/// One component column of a chunk.
#[derive(Debug)]
struct Column {
    info: ComponentInfo,
    data: RawBuffer,
}

/// Fixed-capacity structure-of-arrays block of an archetype.
#[derive(Debug)]
pub struct ArchetypeChunk {
    /// Entity stored in each row.
    entities: NativeArray<Entity>,
    /// One column per component, ordered by component id.
    columns: Box<[Column]>,
    /// Live rows.
    count: usize,
    /// Row capacity, fixed at creation.
    capacity: usize,
}

impl ArchetypeChunk {
    /// Row capacity for a chunk of `chunk_bytes` holding `infos`.
    ///
    /// Every row carries its entity handle plus one value per component; the
    /// result is at least one row so oversized rows still get a chunk.
    #[must_use]
    pub fn capacity_for(infos: &[ComponentInfo], chunk_bytes: usize) -> usize {
        let stride = std::mem::size_of::<Entity>() + infos.iter().map(ComponentInfo::size).sum::<usize>();
        (chunk_bytes / stride).max(1)
    }

    /// Allocates a zeroed chunk with room for `capacity` rows.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(infos: &[ComponentInfo], capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");

        let columns = infos
            .iter()
            .map(|info| Column {
                info: *info,
                data: RawBuffer::new(info.layout, capacity),
            })
            .collect();

        Self {
            entities: NativeArray::new(capacity),
            columns,
            count: 0,
            capacity,
        }
    }

    /// Number of live rows.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Row capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Checks if no row is free.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Checks if no row is live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of free rows.
    #[inline]
    #[must_use]
    pub const fn free_rows(&self) -> usize {
        self.capacity - self.count
    }

    /// Sets the live row count directly.
    ///
    /// Used by bulk paths that fill rows before publishing them.
    ///
    /// # Panics
    ///
    /// Panics if `count > capacity`.
    #[inline]
    pub fn set_count(&mut self, count: usize) {
        assert!(count <= self.capacity, "count {count} exceeds chunk capacity {}", self.capacity);
        self.count = count;
    }

    /// Number of component columns.
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Metadata of column `column`.
    #[inline]
    #[must_use]
    pub fn column_info(&self, column: usize) -> &ComponentInfo {
        &self.columns[column].info
    }

    /// Entities of the live rows.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities.as_slice()[..self.count]
    }

    /// Entity in `row`, if live.
    #[inline]
    #[must_use]
    pub fn entity(&self, row: usize) -> Option<Entity> {
        self.entities().get(row).copied()
    }

    /// Appends zeroed rows for `entities` and returns the first new row.
    ///
    /// # Panics
    ///
    /// Panics if the rows do not fit.
    pub fn push_rows(&mut self, entities: &[Entity]) -> usize {
        let start = self.count;
        let end = start + entities.len();
        assert!(end <= self.capacity, "chunk overflow: {end} rows, capacity {}", self.capacity);

        for column in self.columns.iter_mut() {
            column.data.zero_range(start, end);
        }
        self.entities.as_mut_slice()[start..end].copy_from_slice(entities);
        self.set_count(end);
        start
    }

    /// Appends one zeroed row for `entity` and returns it.
    #[inline]
    pub fn push(&mut self, entity: Entity) -> usize {
        self.push_rows(&[entity])
    }

    /// Removes `row` by moving the last live row into it.
    ///
    /// Returns the entity that now occupies `row`, or `None` when `row` was
    /// the last row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is not live.
    pub fn swap_remove(&mut self, row: usize) -> Option<Entity> {
        assert!(row < self.count, "row {row} out of bounds ({})", self.count);
        let last = self.count - 1;
        self.count = last;

        if row == last {
            return None;
        }

        for column in self.columns.iter_mut() {
            // SAFETY: row < last < capacity.
            unsafe { column.data.copy_within(last, row) };
        }
        let moved = self.entities[last];
        self.entities[row] = moved;
        Some(moved)
    }

    #[inline]
    fn check_type<T: Component>(&self, column: usize) {
        let info = &self.columns[column].info;
        assert!(
            info.type_id == TypeId::of::<T>(),
            "column {column} stores {}, not {}",
            info.name,
            std::any::type_name::<T>()
        );
    }

    /// Live values of column `column`.
    ///
    /// # Panics
    ///
    /// Panics if the column does not store `T`.
    #[inline]
    #[must_use]
    pub fn components<T: Component>(&self, column: usize) -> &[T] {
        self.check_type::<T>(column);
        // SAFETY: the column stores `capacity` values of T (checked above),
        // allocated with T's layout; rows below count are initialised.
        unsafe { std::slice::from_raw_parts(self.columns[column].data.as_ptr().cast::<T>(), self.count) }
    }

    /// Live values of column `column`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the column does not store `T`.
    #[inline]
    pub fn components_mut<T: Component>(&mut self, column: usize) -> &mut [T] {
        self.check_type::<T>(column);
        // SAFETY: as in `components`, and &mut self gives exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.columns[column].data.as_ptr().cast::<T>(), self.count) }
    }

    /// Value of column `column` in `row`.
    #[inline]
    #[must_use]
    pub fn get_component<T: Component>(&self, column: usize, row: usize) -> Option<&T> {
        self.components::<T>(column).get(row)
    }

    /// Mutable value of column `column` in `row`.
    #[inline]
    pub fn get_component_mut<T: Component>(&mut self, column: usize, row: usize) -> Option<&mut T> {
        self.components_mut::<T>(column).get_mut(row)
    }

    /// Overwrites column `column` in `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is not live or the column does not store `T`.
    #[inline]
    pub fn set_component<T: Component>(&mut self, column: usize, row: usize, value: T) {
        self.components_mut::<T>(column)[row] = value;
    }

    /// Copies one value from another chunk's column into this chunk.
    ///
    /// # Panics
    ///
    /// Panics if either row is not live or the columns store different types.
    pub fn copy_component_from(
        &mut self,
        column: usize,
        row: usize,
        source: &Self,
        source_column: usize,
        source_row: usize,
    ) {
        let dst = &self.columns[column];
        let src = &source.columns[source_column];
        assert_eq!(dst.info.type_id, src.info.type_id, "column type mismatch");
        assert!(row < self.count && source_row < source.count, "row out of bounds");

        // SAFETY: both rows are live, both columns hold the same type, and
        // the buffers belong to different chunks.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.data.item_ptr(source_row),
                dst.data.item_ptr(row),
                dst.info.size(),
            );
        }
    }

    /// Base pointer of column `column`, for query fetches.
    #[inline]
    pub(crate) fn column_ptr(&self, column: usize) -> *mut u8 {
        self.columns[column].data.as_ptr()
    }

    /// Base pointer of the entity column, for query fetches.
    #[inline]
    pub(crate) fn entities_ptr(&self) -> *const Entity {
        self.entities.as_ptr()
    }
}
