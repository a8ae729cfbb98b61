//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be `Pod` so chunk columns can be zeroed and copied bytewise.
//!
//! Ids are not baked into the types: each [`World`](crate::World) owns a
//! [`ComponentRegistry`] and assigns dense ids on explicit registration.

use std::alloc::Layout;
use std::any::TypeId;
use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::error::{EcsError, EcsResult};
use crate::memory::BitSet;

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Pod`: plain old data, bitwise copyable, valid when zeroed
/// - `Send + Sync`: chunks may be iterated from worker threads
///
/// # Example
///
/// ```rust
/// use bytemuck::{Pod, Zeroable};
/// use tessera_core::Component;
///
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     current: u32,
///     max: u32,
/// }
///
/// impl Component for Health {}
/// ```
pub trait Component: Pod + Send + Sync + 'static {}

/// Dense identifier of a registered component type (`0..256`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct ComponentId(u16);

impl ComponentId {
    /// Maximum number of component types per registry.
    pub const LIMIT: usize = BitSet::CAPACITY;

    /// Creates an id from its index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= LIMIT`.
    #[inline]
    #[must_use]
    pub fn new(index: usize) -> Self {
        assert!(index < Self::LIMIT, "component id {index} out of range");
        Self(index as u16)
    }

    /// Bit / slot index of this id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Metadata recorded for each registered component type.
#[derive(Clone, Copy, Debug)]
pub struct ComponentInfo {
    /// Assigned id.
    pub id: ComponentId,
    /// Type name, for diagnostics.
    pub name: &'static str,
    /// Memory layout of one value.
    pub layout: Layout,
    /// Rust type identity.
    pub type_id: TypeId,
}

impl ComponentInfo {
    /// Size of one value in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.layout.size()
    }
}

/// Registry of component types known to a world.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    ids: HashMap<TypeId, ComponentId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, returning its id. Registering twice returns the same id.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentLimit`] once [`ComponentId::LIMIT`] types
    /// are registered.
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentId> {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.ids.get(&type_id) {
            return Ok(id);
        }

        if self.infos.len() >= ComponentId::LIMIT {
            return Err(EcsError::ComponentLimit {
                limit: ComponentId::LIMIT,
            });
        }

        let id = ComponentId::new(self.infos.len());
        let info = ComponentInfo {
            id,
            name: std::any::type_name::<T>(),
            layout: Layout::new::<T>(),
            type_id,
        };
        tracing::debug!(component = info.name, id = id.index(), size = info.size(), "registered component");

        self.infos.push(info);
        self.ids.insert(type_id, id);
        Ok(id)
    }

    /// Id of `T`, if registered.
    #[inline]
    #[must_use]
    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.ids.get(&TypeId::of::<T>()).copied()
    }

    /// Id of `T`, or [`EcsError::UnregisteredComponent`].
    ///
    /// # Errors
    ///
    /// Fails if `T` was never registered.
    #[inline]
    pub fn expect_id<T: Component>(&self) -> EcsResult<ComponentId> {
        self.id_of::<T>().ok_or(EcsError::UnregisteredComponent {
            name: std::any::type_name::<T>(),
        })
    }

    /// Metadata of a registered id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    #[inline]
    #[must_use]
    pub fn info(&self, id: ComponentId) -> &ComponentInfo {
        &self.infos[id.index()]
    }

    /// Metadata of every id in `signature`, ordered by id.
    #[must_use]
    pub fn infos_of(&self, signature: &BitSet) -> Vec<ComponentInfo> {
        signature.iter().map(|bit| self.infos[bit]).collect()
    }

    /// Number of registered types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Checks if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}
