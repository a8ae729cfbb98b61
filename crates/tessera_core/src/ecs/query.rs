//! # Queries
//!
//! A query walks every archetype whose signature contains all *required*
//! components and none of the *excluded* ones, then every chunk of those
//! archetypes, then every live row:
//!
//! ```text
//! Query<(&mut Position, &Velocity), Without<Frozen>>
//!   required = {Position, Velocity}    excluded = {Frozen}
//!
//!   archetype {Position}                   skipped (lacks Velocity)
//!   archetype {Position, Velocity}         visited
//!   archetype {Position, Velocity, Frozen} skipped (has Frozen)
//! ```
//!
//! Archetypes are visited in creation order, chunks in allocation order and
//! rows in row order. Every query call takes the world by `&mut`, so the
//! callback cannot make structural changes; record them in
//! [`Commands`](super::Commands) instead.
//!
//! ## Example
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
//! # struct Velocity { x: f32, y: f32 }
//! # impl Component for Velocity {}
//! let mut world = World::new();
//! world.register::<Position>().unwrap();
//! world.register::<Velocity>().unwrap();
//! world.spawn((Position::default(), Velocity { x: 1.0, y: 0.0 })).unwrap();
//!
//! let query = world.query::<(&mut Position, &Velocity)>();
//! query.for_each(&mut world, |(position, velocity)| {
//!     position.x += velocity.x;
//!     position.y += velocity.y;
//! });
//! ```

// SAFETY: Query items are produced from raw column pointers. Exclusivity
// comes from the `&mut World` borrow held for the item lifetime, and the
// aliasing check rejects a component fetched twice with mutable access.
#![allow(unsafe_code)]

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::archetype::Archetype;
use super::chunk::ArchetypeChunk;
use super::component::{Component, ComponentId, ComponentRegistry};
use super::entity::Entity;
use super::world::World;
use crate::memory::BitSet;

// =============================================================================
// ACCESS TRACKING
// =============================================================================

/// Components read and written by one query.
#[derive(Clone, Copy, Debug, Default)]
pub struct Access {
    reads: BitSet,
    writes: BitSet,
}

impl Access {
    /// Records a shared access.
    ///
    /// # Panics
    ///
    /// Panics if the component is already accessed mutably.
    pub fn add_read(&mut self, id: ComponentId, name: &str) {
        assert!(
            !self.writes.has(id.index()),
            "query accesses {name} both mutably and immutably"
        );
        self.reads.set(id.index());
    }

    /// Records an exclusive access.
    ///
    /// # Panics
    ///
    /// Panics if the component is already accessed in any way.
    pub fn add_write(&mut self, id: ComponentId, name: &str) {
        assert!(
            !self.reads.has(id.index()) && !self.writes.has(id.index()),
            "query accesses {name} mutably more than once"
        );
        self.writes.set(id.index());
    }

    /// Every accessed component.
    #[must_use]
    pub fn components(&self) -> BitSet {
        self.reads.union(&self.writes)
    }
}

// =============================================================================
// QUERY DATA
// =============================================================================

/// Data fetched per row by a query: `&T`, `&mut T`, [`Entity`], or tuples
/// of those.
///
/// # Safety
///
/// `init_state` must record every component the item touches in `access`
/// with the matching mutability, and `fetch` must only return pointers into
/// columns of the given chunk that hold the fetched type.
pub unsafe trait QueryData {
    /// Value handed to the callback for one row.
    type Item<'w>;
    /// Resolved component ids, computed once per query.
    type State: Copy + Send + Sync + 'static;
    /// Column pointers for one chunk.
    type Fetch: Copy;

    /// Resolves component ids and records their access.
    ///
    /// Returns `None` if a component is unregistered; the query then matches
    /// nothing.
    fn init_state(registry: &ComponentRegistry, access: &mut Access) -> Option<Self::State>;

    /// Column pointers of `chunk`, or `None` if `archetype` lacks a column.
    fn fetch(state: Self::State, archetype: &Archetype, chunk: &ArchetypeChunk) -> Option<Self::Fetch>;

    /// Item for `row`.
    ///
    /// # Safety
    ///
    /// `row` must be a live row of the fetched chunk, and no other item for
    /// the same row may be alive during `'w` if this item is mutable.
    unsafe fn item<'w>(fetch: Self::Fetch, row: usize) -> Self::Item<'w>;
}

/// Shorthand for the item type of `Q`.
pub type QueryItem<'w, Q> = <Q as QueryData>::Item<'w>;

/// Column of `id` in `chunk`, checked against the fetched type.
///
/// # Panics
///
/// Panics if the column holds another type, which means the query was built
/// against a different world's registry.
#[inline]
fn typed_column<T: Component>(id: ComponentId, archetype: &Archetype, chunk: &ArchetypeChunk) -> Option<*mut T> {
    let column = archetype.column_of(id)?;
    assert!(
        chunk.column_info(column).type_id == TypeId::of::<T>(),
        "query for {} used with a world of a different registry",
        std::any::type_name::<T>()
    );
    Some(chunk.column_ptr(column).cast::<T>())
}

unsafe impl<T: Component> QueryData for &T {
    type Item<'w> = &'w T;
    type State = ComponentId;
    type Fetch = *const T;

    fn init_state(registry: &ComponentRegistry, access: &mut Access) -> Option<ComponentId> {
        let id = registry.id_of::<T>()?;
        access.add_read(id, std::any::type_name::<T>());
        Some(id)
    }

    #[inline]
    fn fetch(state: ComponentId, archetype: &Archetype, chunk: &ArchetypeChunk) -> Option<*const T> {
        typed_column::<T>(state, archetype, chunk).map(<*mut T>::cast_const)
    }

    #[inline]
    unsafe fn item<'w>(fetch: *const T, row: usize) -> &'w T {
        // SAFETY: caller guarantees `row` is live in the fetched column.
        unsafe { &*fetch.add(row) }
    }
}

unsafe impl<T: Component> QueryData for &mut T {
    type Item<'w> = &'w mut T;
    type State = ComponentId;
    type Fetch = *mut T;

    fn init_state(registry: &ComponentRegistry, access: &mut Access) -> Option<ComponentId> {
        let id = registry.id_of::<T>()?;
        access.add_write(id, std::any::type_name::<T>());
        Some(id)
    }

    #[inline]
    fn fetch(state: ComponentId, archetype: &Archetype, chunk: &ArchetypeChunk) -> Option<*mut T> {
        typed_column::<T>(state, archetype, chunk)
    }

    #[inline]
    unsafe fn item<'w>(fetch: *mut T, row: usize) -> &'w mut T {
        // SAFETY: caller guarantees `row` is live and not aliased.
        unsafe { &mut *fetch.add(row) }
    }
}

unsafe impl QueryData for Entity {
    type Item<'w> = Entity;
    type State = ();
    type Fetch = *const Entity;

    fn init_state(_registry: &ComponentRegistry, _access: &mut Access) -> Option<()> {
        Some(())
    }

    #[inline]
    fn fetch(_state: (), _archetype: &Archetype, chunk: &ArchetypeChunk) -> Option<*const Entity> {
        Some(chunk.entities_ptr())
    }

    #[inline]
    unsafe fn item<'w>(fetch: *const Entity, row: usize) -> Self::Item<'w> {
        // SAFETY: caller guarantees `row` is live.
        unsafe { *fetch.add(row) }
    }
}

macro_rules! impl_query_data {
    ($(($name:ident, $index:tt)),+) => {
        unsafe impl<$($name: QueryData),+> QueryData for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);
            type State = ($($name::State,)+);
            type Fetch = ($($name::Fetch,)+);

            fn init_state(registry: &ComponentRegistry, access: &mut Access) -> Option<Self::State> {
                Some(($($name::init_state(registry, access)?,)+))
            }

            #[inline]
            fn fetch(state: Self::State, archetype: &Archetype, chunk: &ArchetypeChunk) -> Option<Self::Fetch> {
                Some(($($name::fetch(state.$index, archetype, chunk)?,)+))
            }

            #[inline]
            unsafe fn item<'w>(fetch: Self::Fetch, row: usize) -> Self::Item<'w> {
                // SAFETY: forwarded from the caller; elements touch distinct
                // columns (checked by `Access`).
                ($(unsafe { $name::item(fetch.$index, row) },)+)
            }
        }
    };
}

impl_query_data!((A, 0));
impl_query_data!((A, 0), (B, 1));
impl_query_data!((A, 0), (B, 1), (C, 2));
impl_query_data!((A, 0), (B, 1), (C, 2), (D, 3));
impl_query_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_query_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_query_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_query_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));

// =============================================================================
// FILTERS
// =============================================================================

/// Archetype-level constraint on a query.
pub trait QueryFilter {
    /// Adds the filter's ids to the `required` and `excluded` masks.
    ///
    /// Returns `false` if a required component is unregistered.
    fn init(registry: &ComponentRegistry, required: &mut BitSet, excluded: &mut BitSet) -> bool;
}

/// Requires component `T` without fetching it.
pub struct With<T>(PhantomData<T>);

/// Excludes archetypes containing component `T`.
pub struct Without<T>(PhantomData<T>);

impl QueryFilter for () {
    fn init(_registry: &ComponentRegistry, _required: &mut BitSet, _excluded: &mut BitSet) -> bool {
        true
    }
}

impl<T: Component> QueryFilter for With<T> {
    fn init(registry: &ComponentRegistry, required: &mut BitSet, _excluded: &mut BitSet) -> bool {
        match registry.id_of::<T>() {
            Some(id) => {
                required.set(id.index());
                true
            }
            None => false,
        }
    }
}

impl<T: Component> QueryFilter for Without<T> {
    fn init(registry: &ComponentRegistry, _required: &mut BitSet, excluded: &mut BitSet) -> bool {
        // An unregistered component is in no archetype, so it excludes nothing.
        if let Some(id) = registry.id_of::<T>() {
            excluded.set(id.index());
        }
        true
    }
}

macro_rules! impl_query_filter {
    ($($name:ident),+) => {
        impl<$($name: QueryFilter),+> QueryFilter for ($($name,)+) {
            fn init(registry: &ComponentRegistry, required: &mut BitSet, excluded: &mut BitSet) -> bool {
                let mut matches = true;
                $(matches &= $name::init(registry, required, excluded);)+
                matches
            }
        }
    };
}

impl_query_filter!(A);
impl_query_filter!(A, B);
impl_query_filter!(A, B, C);
impl_query_filter!(A, B, C, D);
impl_query_filter!(A, B, C, D, E);
impl_query_filter!(A, B, C, D, E, F);
impl_query_filter!(A, B, C, D, E, F, G);
impl_query_filter!(A, B, C, D, E, F, G, H);

// =============================================================================
// QUERY
// =============================================================================

/// Struct-based per-row job, run with [`Query::run`].
///
/// Useful when the per-row logic carries its own state or is reused across
/// frames.
pub trait ForEach<Q: QueryData> {
    /// Processes one row.
    fn execute(&mut self, item: QueryItem<'_, Q>);
}

/// Compiled query over data `Q` with filter `F`.
///
/// Component ids are resolved when the query is built, so build it after
/// registering every component it names and use it only with the world
/// that built it.
pub struct Query<Q: QueryData, F: QueryFilter = ()> {
    /// `None` when a required component is unregistered.
    state: Option<Q::State>,
    required: BitSet,
    excluded: BitSet,
    _marker: PhantomData<fn() -> (Q, F)>,
}

impl<Q: QueryData, F: QueryFilter> Query<Q, F> {
    /// Compiles the required and excluded masks against `registry`.
    ///
    /// # Panics
    ///
    /// Panics if `Q` fetches a component mutably more than once, or both
    /// mutably and immutably.
    #[must_use]
    pub fn new(registry: &ComponentRegistry) -> Self {
        let mut access = Access::default();
        let state = Q::init_state(registry, &mut access);

        let mut required = access.components();
        let mut excluded = BitSet::new();
        let filter_matches = F::init(registry, &mut required, &mut excluded);

        Self {
            state: state.filter(|_| filter_matches),
            required,
            excluded,
            _marker: PhantomData,
        }
    }

    /// Components an archetype must contain.
    #[inline]
    #[must_use]
    pub const fn required(&self) -> &BitSet {
        &self.required
    }

    /// Components an archetype must not contain.
    #[inline]
    #[must_use]
    pub const fn excluded(&self) -> &BitSet {
        &self.excluded
    }

    /// Checks if `archetype` is visited by this query.
    #[inline]
    #[must_use]
    pub fn matches(&self, archetype: &Archetype) -> bool {
        self.state.is_some()
            && archetype.signature().has_all(&self.required)
            && !archetype.signature().has_any(&self.excluded)
    }

    /// Number of rows the query would visit.
    #[must_use]
    pub fn count(&self, world: &World) -> usize {
        world
            .archetypes()
            .iter()
            .filter(|archetype| self.matches(archetype))
            .map(Archetype::len)
            .sum()
    }

    /// Calls `f` for every matching row.
    pub fn for_each<'w, Func>(&self, world: &'w mut World, mut f: Func)
    where
        Func: FnMut(Q::Item<'w>),
    {
        let Some(state) = self.state else { return };
        let world: &'w World = world;

        for archetype in world.archetypes().iter().filter(|archetype| self.matches(archetype)) {
            for chunk in archetype.chunks() {
                let Some(fetch) = Q::fetch(state, archetype, chunk) else { continue };
                for row in 0..chunk.count() {
                    // SAFETY: row < count; the world is exclusively borrowed
                    // for 'w and each row is yielded once.
                    f(unsafe { Q::item(fetch, row) });
                }
            }
        }
    }

    /// Runs a struct job over every matching row.
    pub fn run<J: ForEach<Q>>(&self, world: &mut World, job: &mut J) {
        self.for_each(world, |item| job.execute(item));
    }

    /// Calls `f` once per non-empty matching chunk with an iterator over its
    /// rows.
    pub fn for_each_chunk<'w, Func>(&self, world: &'w mut World, mut f: Func)
    where
        Func: FnMut(ChunkIter<'w, Q>),
    {
        let Some(state) = self.state else { return };
        let world: &'w World = world;

        for archetype in world.archetypes().iter().filter(|archetype| self.matches(archetype)) {
            for chunk in archetype.chunks().iter().filter(|chunk| !chunk.is_empty()) {
                if let Some(fetch) = Q::fetch(state, archetype, chunk) {
                    f(ChunkIter::new(fetch, chunk));
                }
            }
        }
    }

    /// Iterates every matching row.
    pub fn iter<'w>(&self, world: &'w mut World) -> QueryIter<'w, Q> {
        let world: &'w World = world;
        let archetypes: Vec<&'w Archetype> = match self.state {
            Some(_) => world
                .archetypes()
                .iter()
                .filter(|archetype| self.matches(archetype))
                .collect(),
            None => Vec::new(),
        };
        QueryIter {
            state: self.state,
            archetypes: archetypes.into_iter(),
            archetype: None,
            chunks: Default::default(),
            current: None,
        }
    }

    /// Calls `f` for every matching row, spreading chunks over worker
    /// threads.
    ///
    /// Each chunk is processed by exactly one worker; row order within a
    /// chunk is preserved, order across chunks is not. The worker count is
    /// taken from the world's configuration.
    pub fn par_for_each<'w, Func>(&self, world: &'w mut World, f: Func)
    where
        Func: Fn(Q::Item<'w>) + Sync,
    {
        let Some(state) = self.state else { return };
        let world: &'w World = world;

        let tasks: Vec<(&'w Archetype, &'w ArchetypeChunk)> = world
            .archetypes()
            .iter()
            .filter(|archetype| self.matches(archetype))
            .flat_map(|archetype| {
                archetype
                    .chunks()
                    .iter()
                    .filter(|chunk| !chunk.is_empty())
                    .map(move |chunk| (archetype, chunk))
            })
            .collect();

        let workers = world.config().resolved_worker_threads().min(tasks.len());
        let next = AtomicUsize::new(0);
        let run_tasks = || {
            while let Some(&(archetype, chunk)) = tasks.get(next.fetch_add(1, Ordering::Relaxed)) {
                let Some(fetch) = Q::fetch(state, archetype, chunk) else { continue };
                for row in 0..chunk.count() {
                    // SAFETY: every chunk is claimed by one worker through
                    // the shared counter, so rows are never yielded twice.
                    f(unsafe { Q::item(fetch, row) });
                }
            }
        };

        if workers <= 1 {
            run_tasks();
            return;
        }

        tracing::trace!(workers, chunks = tasks.len(), "parallel query");
        std::thread::scope(|scope| {
            for _ in 1..workers {
                scope.spawn(run_tasks);
            }
            run_tasks();
        });
    }
}

// =============================================================================
// ITERATORS
// =============================================================================

/// Rows of one chunk, yielded by [`Query::for_each_chunk`].
pub struct ChunkIter<'w, Q: QueryData> {
    fetch: Q::Fetch,
    entities: &'w [Entity],
    row: usize,
}

impl<'w, Q: QueryData> ChunkIter<'w, Q> {
    fn new(fetch: Q::Fetch, chunk: &'w ArchetypeChunk) -> Self {
        Self {
            fetch,
            entities: chunk.entities(),
            row: 0,
        }
    }

    /// Entities of every row of the chunk, including consumed ones.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &'w [Entity] {
        self.entities
    }
}

impl<'w, Q: QueryData> Iterator for ChunkIter<'w, Q> {
    type Item = Q::Item<'w>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.row == self.entities.len() {
            return None;
        }
        // SAFETY: row < count and each row is yielded once.
        let item = unsafe { Q::item(self.fetch, self.row) };
        self.row += 1;
        Some(item)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entities.len() - self.row;
        (remaining, Some(remaining))
    }
}

impl<Q: QueryData> ExactSizeIterator for ChunkIter<'_, Q> {}

/// Iterator over every matching row, returned by [`Query::iter`].
pub struct QueryIter<'w, Q: QueryData> {
    state: Option<Q::State>,
    archetypes: std::vec::IntoIter<&'w Archetype>,
    archetype: Option<&'w Archetype>,
    chunks: std::slice::Iter<'w, ArchetypeChunk>,
    current: Option<ChunkIter<'w, Q>>,
}

impl<'w, Q: QueryData> Iterator for QueryIter<'w, Q> {
    type Item = Q::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.state?;
        loop {
            if let Some(item) = self.current.as_mut().and_then(Iterator::next) {
                return Some(item);
            }

            match (self.archetype, self.chunks.next()) {
                (Some(archetype), Some(chunk)) => {
                    self.current = Q::fetch(state, archetype, chunk).map(|fetch| ChunkIter::new(fetch, chunk));
                }
                _ => {
                    let archetype = self.archetypes.next()?;
                    self.archetype = Some(archetype);
                    self.chunks = archetype.chunks().iter();
                    self.current = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Alpha(u32);
    impl Component for Alpha {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Beta(u32);
    impl Component for Beta {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Gamma(u32);
    impl Component for Gamma {}

    fn world() -> World {
        let mut world = World::new();
        world.register::<Alpha>().unwrap();
        world.register::<Beta>().unwrap();
        world.register::<Gamma>().unwrap();
        world
    }

    #[test]
    fn test_masks() {
        let world = world();
        let a = world.component_id::<Alpha>().unwrap().index();
        let b = world.component_id::<Beta>().unwrap().index();
        let g = world.component_id::<Gamma>().unwrap().index();

        let query = world.query_filtered::<(&Alpha, &mut Beta), (With<Gamma>, Without<Alpha>)>();
        assert_eq!(*query.required(), BitSet::from_bits(&[a, b, g]));
        assert_eq!(*query.excluded(), BitSet::from_bits(&[a]));
    }

    #[test]
    fn test_matches_archetypes() {
        let mut world = world();
        world.spawn((Alpha(0),)).unwrap();
        world.spawn((Alpha(0), Beta(0))).unwrap();
        world.spawn((Alpha(0), Beta(0), Gamma(0))).unwrap();

        let query = world.query_filtered::<&Alpha, (With<Beta>, Without<Gamma>)>();
        let matched: Vec<usize> = world
            .archetypes()
            .iter()
            .filter(|archetype| query.matches(archetype))
            .map(|archetype| archetype.signature().count())
            .collect();
        assert_eq!(matched, vec![2]);
    }

    #[test]
    fn test_shared_reads_are_allowed() {
        let world = world();
        let query = world.query::<(&Alpha, &Alpha)>();
        assert_eq!(query.count(&world), 0);
    }

    #[test]
    #[should_panic(expected = "mutably more than once")]
    fn test_double_write_panics() {
        let world = world();
        let _ = world.query::<(&mut Alpha, &mut Alpha)>();
    }

    #[test]
    fn test_empty_archetype_chunks_are_skipped() {
        let mut world = world();
        let entity = world.spawn((Alpha(7),)).unwrap();
        world.despawn(entity);

        let mut chunks = 0;
        world.query::<&Alpha>().for_each_chunk(&mut world, |_| chunks += 1);
        assert_eq!(chunks, 0);
        assert_eq!(world.query::<&Alpha>().iter(&mut world).count(), 0);
    }

    #[test]
    fn test_single_worker_runs_inline() {
        let config = WorldConfig {
            worker_threads: 1,
            ..WorldConfig::default()
        };
        let mut world = World::with_config(config).unwrap();
        world.register::<Alpha>().unwrap();
        world.spawn_batch((0..100).map(|i| (Alpha(i),))).unwrap();

        let total = AtomicUsize::new(0);
        world.query::<&Alpha>().par_for_each(&mut world, |alpha| {
            total.fetch_add(alpha.0 as usize, Ordering::Relaxed);
        });
        assert_eq!(total.load(Ordering::Relaxed), (0..100).sum::<usize>());
    }
}
