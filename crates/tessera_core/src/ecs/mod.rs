//! # Entity Component System
//!
//! Archetype-based storage with chunked structure-of-arrays columns.
//!
//! ## Design Philosophy
//!
//! - Entities with the same component set share an archetype
//! - Archetype data lives in fixed-size chunks, one column per component
//! - Entity handles carry a generation, so stale handles are rejected
//! - Cross references are integer ids, never pointers
//! - Query dispatch is monomorphised; no dynamic dispatch per row

pub mod archetype;
mod bundle;
pub mod chunk;
mod commands;
mod component;
mod entity;
mod entity_index;
pub mod query;
mod world;

pub use archetype::{Archetype, ArchetypeId};
pub use bundle::Bundle;
pub use chunk::ArchetypeChunk;
pub use commands::Commands;
pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry};
pub use entity::{Entity, EntityAllocator, Location};
pub use entity_index::EntityIndex;
pub use query::{ChunkIter, ForEach, Query, QueryData, QueryFilter, QueryItem, QueryIter, With, Without};
pub use world::World;
