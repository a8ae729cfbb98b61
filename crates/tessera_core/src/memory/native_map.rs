//! # Open-Addressing Hash Map
//!
//! Keys and values live in two parallel [`NativeArray`]s. Empty slots hold a
//! sentinel key whose bytes are all `0xFE`; the sentinel is never a valid key.
//!
//! ## Robin-Hood Probing
//!
//! ```text
//! slot:   0     1     2     3     4
//! key:    A(0)  B(1)  C(0)  --    --      (n) = probe sequence length
//!
//! insert D (home 1):
//!   slot 1: B has PSL 0, D has 0  -> keep probing
//!   slot 2: C has PSL 2, D has 1  -> keep probing (C is poorer)
//!   slot 3: empty                 -> D lands with PSL 2
//! ```
//!
//! An incoming entry that is further from home than the resident takes the
//! slot and the resident continues probing. Lookups stop at an empty slot or
//! as soon as the resident is closer to home than the probe distance.
//!
//! Deletion shifts the rest of the probe chain back by one slot, so no
//! tombstones are needed and every remaining key stays reachable.

use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use bytemuck::Pod;
use siphasher::sip::SipHasher13;

use super::native_array::NativeArray;

/// Default hasher: SipHash-1-3 with fixed keys (deterministic layout).
pub type DefaultHashBuilder = BuildHasherDefault<SipHasher13>;

/// Byte pattern of the empty-slot key.
const SENTINEL_BYTE: u8 = 0xFE;

/// Maximum load factor, as `LOAD_NUM / LOAD_DEN`.
const LOAD_NUM: usize = 7;
const LOAD_DEN: usize = 8;

/// Open-addressing hash map over plain-old-data keys and values.
///
/// # Example
///
/// ```rust
/// use tessera_core::NativeMap;
///
/// let mut map: NativeMap<u32, f32> = NativeMap::new();
/// map.insert(1, 0.5);
/// assert_eq!(map.get(&1), Some(&0.5));
/// assert!(!map.contains_key(&2));
/// assert_eq!(map.remove(&1), Some(0.5));
/// ```
pub struct NativeMap<K, V, S = DefaultHashBuilder>
where
    K: Pod + Eq + Hash,
    V: Pod,
{
    keys: NativeArray<K>,
    values: NativeArray<V>,
    count: usize,
    hasher: S,
}

impl<K, V> NativeMap<K, V>
where
    K: Pod + Eq + Hash,
    V: Pod,
{
    /// Creates an empty map with no slots; the first insert allocates.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a map with `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> NativeMap<K, V, S>
where
    K: Pod + Eq + Hash,
    V: Pod,
    S: BuildHasher,
{
    /// Creates a map with `capacity` slots and a custom hasher.
    #[must_use]
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        let mut keys = NativeArray::new(capacity);
        keys.fill(sentinel());
        Self {
            keys,
            values: NativeArray::new(capacity),
            count: 0,
            hasher,
        }
    }

    /// Number of live entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Checks if the map has no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots.
    ///
    /// The table grows once it would pass 7/8 full, not when every slot is
    /// taken, so this is always larger than [`NativeMap::len`].
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    fn home(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) as usize) % self.capacity()
    }

    /// Probe sequence length of `key` sitting in `slot`.
    #[inline]
    fn psl(&self, slot: usize, key: &K) -> usize {
        let capacity = self.capacity();
        (slot + capacity - self.home(key)) % capacity
    }

    /// Slot holding `key`, if present.
    fn find(&self, key: &K) -> Option<usize> {
        let capacity = self.capacity();
        if capacity == 0 || self.count == 0 {
            return None;
        }

        let keys = self.keys.as_slice();
        let mut slot = self.home(key);
        for distance in 0..capacity {
            let resident = &keys[slot];
            if is_sentinel(resident) {
                return None;
            }
            if resident == key {
                return Some(slot);
            }
            if self.psl(slot, resident) < distance {
                // A Robin-Hood table would have placed `key` before this entry.
                return None;
            }
            slot = (slot + 1) % capacity;
        }
        None
    }

    /// Inserts `key -> value`, returning the previous value for an existing key.
    ///
    /// # Panics
    ///
    /// Panics if `key` is the sentinel (all bytes `0xFE`).
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        assert!(!is_sentinel(&key), "the sentinel key cannot be stored in a NativeMap");

        if let Some(slot) = self.find(&key) {
            let old = self.values[slot];
            self.values[slot] = value;
            return Some(old);
        }

        self.reserve_one();
        self.insert_new(key, value);
        None
    }

    /// Robin-Hood insertion of a key known to be absent. Requires a free slot.
    fn insert_new(&mut self, key: K, value: V) {
        let capacity = self.capacity();
        let mut key = key;
        let mut value = value;
        let mut slot = self.home(&key);
        let mut distance = 0;

        loop {
            let resident = self.keys[slot];
            if is_sentinel(&resident) {
                self.keys[slot] = key;
                self.values[slot] = value;
                self.count += 1;
                return;
            }

            let resident_distance = self.psl(slot, &resident);
            if distance > resident_distance {
                self.keys[slot] = key;
                key = resident;
                value = std::mem::replace(&mut self.values[slot], value);
                distance = resident_distance;
            }

            slot = (slot + 1) % capacity;
            distance += 1;
        }
    }

    /// Grows (doubling) until one more entry fits under the load factor.
    fn reserve_one(&mut self) {
        let needed = self.count + 1;
        let mut capacity = self.capacity();
        if needed * LOAD_DEN <= capacity * LOAD_NUM {
            return;
        }

        while needed * LOAD_DEN > capacity * LOAD_NUM {
            capacity = (capacity * 2).max(1);
        }
        self.rehash(capacity);
    }

    fn rehash(&mut self, new_capacity: usize) {
        tracing::trace!(
            from = self.capacity(),
            to = new_capacity,
            entries = self.count,
            "native map resize"
        );

        let mut keys = NativeArray::new(new_capacity);
        keys.fill(sentinel());
        let old_keys = std::mem::replace(&mut self.keys, keys);
        let old_values = std::mem::replace(&mut self.values, NativeArray::new(new_capacity));
        self.count = 0;

        for (key, value) in old_keys.as_slice().iter().zip(old_values.as_slice()) {
            if !is_sentinel(key) {
                self.insert_new(*key, *value);
            }
        }
    }

    /// Returns the value stored for `key`.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|slot| &self.values[slot])
    }

    /// Returns the value stored for `key` mutably.
    #[inline]
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = self.find(key)?;
        Some(&mut self.values[slot])
    }

    /// Checks whether `key` is present.
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Removes `key`, returning its value.
    ///
    /// Entries after the removed one are shifted back until an empty slot or
    /// an entry sitting in its home slot is reached.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.find(key)?;
        let capacity = self.capacity();
        let removed = self.values[slot];

        let mut hole = slot;
        loop {
            let next = (hole + 1) % capacity;
            let resident = self.keys[next];
            if is_sentinel(&resident) || self.psl(next, &resident) == 0 {
                break;
            }
            self.keys[hole] = resident;
            self.values[hole] = self.values[next];
            hole = next;
        }

        self.keys[hole] = sentinel();
        self.values[hole] = V::zeroed();
        self.count -= 1;
        Some(removed)
    }

    /// Removes every entry, keeping the slots.
    pub fn clear(&mut self) {
        self.keys.fill(sentinel());
        self.values.fill(V::zeroed());
        self.count = 0;
    }

    /// Iterates `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.keys
            .as_slice()
            .iter()
            .zip(self.values.as_slice())
            .filter(|(key, _)| !is_sentinel(*key))
    }

    /// Longest probe sequence currently in the table.
    #[must_use]
    pub fn max_probe_length(&self) -> usize {
        self.keys
            .as_slice()
            .iter()
            .enumerate()
            .filter(|(_, key)| !is_sentinel(*key))
            .map(|(slot, key)| self.psl(slot, key))
            .max()
            .unwrap_or(0)
    }
}

impl<K, V> Default for NativeMap<K, V>
where
    K: Pod + Eq + Hash,
    V: Pod,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> std::fmt::Debug for NativeMap<K, V, S>
where
    K: Pod + Eq + Hash + std::fmt::Debug,
    V: Pod + std::fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[inline]
fn sentinel<K: Pod>() -> K {
    let mut key = K::zeroed();
    bytemuck::bytes_of_mut(&mut key).fill(SENTINEL_BYTE);
    key
}

#[inline]
fn is_sentinel<K: Pod>(key: &K) -> bool {
    bytemuck::bytes_of(key).iter().all(|&b| b == SENTINEL_BYTE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hasher;

    /// Hashes integers to themselves so tests can force collisions.
    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | u64::from(b);
            }
        }

        fn write_u32(&mut self, n: u32) {
            self.0 = u64::from(n);
        }
    }

    type IdentityMap = NativeMap<u32, u32, BuildHasherDefault<IdentityHasher>>;

    fn identity_map(capacity: usize) -> IdentityMap {
        NativeMap::with_capacity_and_hasher(capacity, BuildHasherDefault::default())
    }

    #[test]
    fn test_insert_get() {
        let mut map: NativeMap<u32, u64> = NativeMap::new();
        assert_eq!(map.insert(1, 10), None);
        assert_eq!(map.insert(2, 20), None);
        assert_eq!(map.insert(3, 30), None);

        assert_eq!(map.get(&2), Some(&20));
        assert_eq!(map.len(), 3);
        assert!(!map.contains_key(&4));
        assert!(!map.contains_key(&100));
        assert!(!map.contains_key(&10000));
    }

    #[test]
    fn test_insert_overwrites() {
        let mut map: NativeMap<u32, u32> = NativeMap::with_capacity(4);
        map.insert(7, 1);
        assert_eq!(map.insert(7, 2), Some(1));
        assert_eq!(map.get(&7), Some(&2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_million_sequential_keys_from_small_capacity() {
        for initial in [0, 1] {
            let mut map: NativeMap<u32, u32> = NativeMap::with_capacity(initial);
            for key in 0..1_000_000u32 {
                map.insert(key, key.wrapping_mul(31));
            }
            assert_eq!(map.len(), 1_000_000);
            for key in 0..1_000_000u32 {
                assert_eq!(map.get(&key), Some(&key.wrapping_mul(31)), "initial capacity {initial}");
            }
            assert!(!map.contains_key(&1_000_000));
        }
    }

    #[test]
    fn test_capacity_stays_above_len() {
        let mut map: NativeMap<u32, u32> = NativeMap::with_capacity(1);
        for key in 0..1000u32 {
            map.insert(key, key);
            assert!(map.capacity() > map.len());
            assert!(map.len() * 8 <= map.capacity() * 7);
        }
    }

    #[test]
    fn test_zero_and_one_capacity_behave_alike() {
        let mut empty: NativeMap<u32, u32> = NativeMap::with_capacity(0);
        let mut one: NativeMap<u32, u32> = NativeMap::with_capacity(1);
        for key in 1..=100 {
            empty.insert(key, key * 2);
            one.insert(key, key * 2);
        }
        for key in 0..=101 {
            assert_eq!(empty.get(&key), one.get(&key));
        }
        assert_eq!(empty.len(), one.len());
    }

    #[test]
    fn test_lookup_on_unallocated_map() {
        let map: NativeMap<u32, u32> = NativeMap::new();
        assert!(map.get(&0).is_none());
        assert_eq!(map.capacity(), 0);
    }

    #[test]
    fn test_robin_hood_displaces_rich_entries() {
        let mut map = identity_map(16);
        // 0, 16, 32 share home slot 0; 1 has home slot 1.
        map.insert(0, 0);
        map.insert(1, 1);
        map.insert(16, 16);
        map.insert(32, 32);

        assert_eq!(map.max_probe_length(), 2);
        for key in [0, 1, 16, 32] {
            assert_eq!(map.get(&key), Some(&key));
        }
    }

    #[test]
    fn test_remove_keeps_later_probed_keys_reachable() {
        let mut map = identity_map(16);
        // Probe chain from slot 0: 0, 16, 32, 48.
        for key in [0, 16, 32, 48] {
            map.insert(key, key + 1);
        }

        assert_eq!(map.remove(&16), Some(17));
        assert!(!map.contains_key(&16));
        assert_eq!(map.get(&32), Some(&33));
        assert_eq!(map.get(&48), Some(&49));

        assert_eq!(map.remove(&0), Some(1));
        assert_eq!(map.get(&32), Some(&33));
        assert_eq!(map.get(&48), Some(&49));
        assert_eq!(map.len(), 2);
        assert_eq!(map.max_probe_length(), 1);
    }

    #[test]
    fn test_remove_wraps_around() {
        let mut map = identity_map(8);
        // Homes at slot 6 wrap into slots 7, 0, 1.
        for key in [6, 14, 22, 30] {
            map.insert(key, key);
        }
        assert_eq!(map.remove(&6), Some(6));
        for key in [14, 22, 30] {
            assert_eq!(map.get(&key), Some(&key));
        }
    }

    #[test]
    fn test_remove_missing() {
        let mut map: NativeMap<u32, u32> = NativeMap::new();
        assert_eq!(map.remove(&3), None);
        map.insert(3, 3);
        assert_eq!(map.remove(&4), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_insert_remove_churn() {
        let mut map: NativeMap<u32, u32> = NativeMap::new();
        for key in 0..10_000u32 {
            map.insert(key, key);
        }
        for key in (0..10_000u32).filter(|k| k % 3 == 0) {
            assert_eq!(map.remove(&key), Some(key));
        }
        for key in 0..10_000u32 {
            assert_eq!(map.contains_key(&key), key % 3 != 0, "key {key}");
        }
    }

    #[test]
    fn test_clear() {
        let mut map: NativeMap<u32, u32> = NativeMap::with_capacity(8);
        map.insert(1, 1);
        map.insert(2, 2);
        map.clear();
        assert!(map.is_empty());
        assert!(!map.contains_key(&1));
        assert_eq!(map.capacity(), 8);
    }

    #[test]
    fn test_iter_visits_live_entries() {
        let mut map: NativeMap<u32, u32> = NativeMap::new();
        for key in 0..50u32 {
            map.insert(key, key * key);
        }
        map.remove(&10);

        let mut pairs: Vec<(u32, u32)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort_unstable();
        assert_eq!(pairs.len(), 49);
        assert!(pairs.iter().all(|(k, v)| *k != 10 && *v == k * k));
    }

    #[test]
    #[should_panic(expected = "sentinel")]
    fn test_sentinel_key_rejected() {
        let mut map: NativeMap<u32, u32> = NativeMap::new();
        map.insert(0xFEFE_FEFE, 1);
    }
}
