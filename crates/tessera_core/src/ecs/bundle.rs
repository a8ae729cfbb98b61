//! # Component Bundles
//!
//! A bundle is a tuple of component values spawned together:
//!
//! ```rust
//! # use bytemuck::{Pod, Zeroable};
//! # use tessera_core::{Component, World};
//! # #[derive(Clone, Copy, Default, Pod, Zeroable)]
//! # #[repr(C)]
//! # struct Position { x: f32, y: f32 }
//! # impl Component for Position {}
//! # #[derive(Clone, Copy, Default, Pod, Zeroable)]
//! # #[repr(C)]
//! # struct Health(u32);
//! # impl Component for Health {}
//! let mut world = World::new();
//! world.register::<Position>().unwrap();
//! world.register::<Health>().unwrap();
//!
//! let entity = world.spawn((Position { x: 1.0, y: 2.0 }, Health(10))).unwrap();
//! assert_eq!(world.get::<Health>(entity).map(|h| h.0), Some(10));
//! ```

use super::archetype::Archetype;
use super::component::{Component, ComponentId, ComponentRegistry};
use super::entity::Location;
use crate::error::{EcsError, EcsResult};
use crate::memory::BitSet;

/// A set of component values written into one row.
///
/// Implemented for `()` and tuples of up to eight components.
pub trait Bundle: Send + 'static {
    /// Ids of the bundle's components in tuple order.
    ///
    /// # Errors
    ///
    /// Fails with [`EcsError::UnregisteredComponent`] if any type is unknown
    /// to `registry`.
    fn component_ids(registry: &ComponentRegistry) -> EcsResult<Vec<ComponentId>>;

    /// Writes the values into the freshly allocated row at `location`.
    ///
    /// `ids` is the output of [`Bundle::component_ids`] for the archetype's
    /// registry.
    fn write(self, archetype: &mut Archetype, ids: &[ComponentId], location: Location);
}

/// Ids and signature of bundle `B`.
///
/// # Errors
///
/// Fails on unregistered types and on a type listed twice.
pub(crate) fn bundle_signature<B: Bundle>(registry: &ComponentRegistry) -> EcsResult<(Vec<ComponentId>, BitSet)> {
    let ids = B::component_ids(registry)?;
    let mut signature = BitSet::new();
    for id in &ids {
        if signature.has(id.index()) {
            return Err(EcsError::DuplicateComponent {
                name: registry.info(*id).name,
            });
        }
        signature.set(id.index());
    }
    Ok((ids, signature))
}

/// Writes one bundle value into its column.
#[inline]
fn write_value<T: Component>(archetype: &mut Archetype, id: ComponentId, location: Location, value: T) {
    let column = archetype
        .column_of(id)
        .unwrap_or_else(|| panic!("archetype {:?} lacks bundle component {id:?}", archetype.id()));
    if let Some(slot) = archetype.get_at_mut::<T>(column, location) {
        *slot = value;
    }
}

impl Bundle for () {
    fn component_ids(_registry: &ComponentRegistry) -> EcsResult<Vec<ComponentId>> {
        Ok(Vec::new())
    }

    fn write(self, _archetype: &mut Archetype, _ids: &[ComponentId], _location: Location) {}
}

macro_rules! impl_bundle {
    ($(($name:ident, $index:tt)),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            fn component_ids(registry: &ComponentRegistry) -> EcsResult<Vec<ComponentId>> {
                Ok(vec![$(registry.expect_id::<$name>()?),+])
            }

            fn write(self, archetype: &mut Archetype, ids: &[ComponentId], location: Location) {
                $(write_value::<$name>(archetype, ids[$index], location, self.$index);)+
            }
        }
    };
}

impl_bundle!((A, 0));
impl_bundle!((A, 0), (B, 1));
impl_bundle!((A, 0), (B, 1), (C, 2));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Mass(f32);
    impl Component for Mass {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Team(u8);
    impl Component for Team {}

    #[test]
    fn test_signature_of_tuple() {
        let mut registry = ComponentRegistry::new();
        let m = registry.register::<Mass>().unwrap();
        let t = registry.register::<Team>().unwrap();

        let (ids, signature) = bundle_signature::<(Team, Mass)>(&registry).unwrap();
        assert_eq!(ids, vec![t, m]);
        assert!(signature.has(m.index()) && signature.has(t.index()));
        assert_eq!(signature.count(), 2);
    }

    #[test]
    fn test_empty_bundle() {
        let registry = ComponentRegistry::new();
        let (ids, signature) = bundle_signature::<()>(&registry).unwrap();
        assert!(ids.is_empty());
        assert!(signature.is_empty());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Mass>().unwrap();
        assert!(matches!(
            bundle_signature::<(Mass, Mass)>(&registry),
            Err(EcsError::DuplicateComponent { .. })
        ));
    }

    #[test]
    fn test_unregistered_type_rejected() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Mass>().unwrap();
        assert!(matches!(
            bundle_signature::<(Mass, Team)>(&registry),
            Err(EcsError::UnregisteredComponent { .. })
        ));
    }
}
