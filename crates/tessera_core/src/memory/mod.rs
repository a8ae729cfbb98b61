//! # Native Collections
//!
//! Unmanaged storage primitives the ECS is built on.
//!
//! ## Design Philosophy
//!
//! - Plain-old-data only (`bytemuck::Pod`), so memory can be zeroed, copied
//!   and compared bytewise
//! - One owner per allocation, freed exactly once on drop
//! - Checked accessors by default, `unsafe` unchecked accessors for hot loops

mod bitset;
mod native_array;
mod native_map;

pub use bitset::{BitIter, BitSet};
pub use native_array::{NativeArray, RawBuffer};
pub use native_map::{DefaultHashBuilder, NativeMap};
