//! # TESSERA Core
//!
//! Storage and query engine of a data-oriented Entity Component System:
//! - Unmanaged buffers ([`NativeArray`]) and a Robin-Hood hash map
//!   ([`NativeMap`]) over plain-old-data keys
//! - 256-bit component signatures ([`BitSet`])
//! - Archetypes made of fixed-size structure-of-arrays chunks
//! - Queries with `With`/`Without` filters, sequential or parallel
//!
//! ## Architecture Rules
//!
//! 1. **Components are plain data** - `Pod`, zeroable, copied bytewise
//! 2. **Data-oriented design** - every component is a contiguous column
//! 3. **Indices, not pointers** - archetypes, chunks and rows are addressed
//!    by integer ids, so moving data never invalidates a handle
//!
//! ## Example
//!
//! ```rust
//! use bytemuck::{Pod, Zeroable};
//! use tessera_core::{Component, Without, World};
//!
//! #[derive(Clone, Copy, Default, Pod, Zeroable)]
//! #[repr(C)]
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {}
//!
//! #[derive(Clone, Copy, Default, Pod, Zeroable)]
//! #[repr(C)]
//! struct Frozen(u32);
//! impl Component for Frozen {}
//!
//! let mut world = World::new();
//! world.register::<Position>().unwrap();
//! world.register::<Frozen>().unwrap();
//!
//! world.spawn((Position::default(),)).unwrap();
//! world.spawn((Position::default(), Frozen(1))).unwrap();
//!
//! let moving = world.query_filtered::<&mut Position, Without<Frozen>>();
//! moving.for_each(&mut world, |position| position.x += 1.0);
//! assert_eq!(moving.count(&world), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;

pub use config::WorldConfig;
pub use ecs::{
    Archetype, ArchetypeChunk, ArchetypeId, Bundle, Commands, Component, ComponentId, ComponentRegistry, Entity,
    EntityIndex, ForEach, Location, Query, QueryData, QueryFilter, QueryItem, With, Without, World,
};
pub use error::{EcsError, EcsResult};
pub use memory::{BitSet, NativeArray, NativeMap};
