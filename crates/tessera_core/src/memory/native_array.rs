//! # Unmanaged Buffers
//!
//! Owned, zero-initialised allocations that live outside the `Vec` machinery.
//!
//! ```text
//! RawBuffer    : one allocation, described by an item Layout (type-erased)
//! NativeArray  : RawBuffer + element type T: Pod
//! ```
//!
//! Chunks use `RawBuffer` for component columns (the component type is only
//! known through the registry), everything else uses `NativeArray<T>`.

// SAFETY: This module owns raw allocations. Every unsafe block states the
// invariant it relies on.
#![allow(unsafe_code)]

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::ptr::NonNull;

use bytemuck::Pod;

/// Type-erased, zero-initialised buffer of `len` items of one layout.
///
/// Items are stored contiguously with a stride of `item.size()` bytes.
/// Zero-length buffers and zero-sized items allocate nothing.
pub struct RawBuffer {
    /// Start of the allocation (aligned dangling pointer when nothing is allocated).
    ptr: NonNull<u8>,
    /// Layout of a single item.
    item: Layout,
    /// Number of items.
    len: usize,
}

impl RawBuffer {
    /// Allocates a zeroed buffer of `len` items.
    ///
    /// # Panics
    ///
    /// Panics if the total size overflows `isize::MAX`. Aborts through
    /// [`handle_alloc_error`] if the allocator fails.
    #[must_use]
    pub fn new(item: Layout, len: usize) -> Self {
        let item = item.pad_to_align();
        Self {
            ptr: Self::allocate(item, len),
            item,
            len,
        }
    }

    /// Layout of one item (padded to its alignment).
    #[inline]
    #[must_use]
    pub const fn item_layout(&self) -> Layout {
        self.item
    }

    /// Number of items.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Checks if the buffer holds no items.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total size in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.item.size() * self.len
    }

    /// Pointer to the first byte.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Pointer to item `index`.
    ///
    /// # Safety
    ///
    /// `index <= len` (one-past-the-end is allowed for pointer arithmetic only).
    #[inline]
    #[must_use]
    pub unsafe fn item_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index <= self.len, "item {index} out of bounds ({})", self.len);
        self.ptr.as_ptr().add(index * self.item.size())
    }

    /// Zeroes items `[start, end)`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn zero_range(&mut self, start: usize, end: usize) {
        assert!(start <= end && end <= self.len, "zero range {start}..{end} out of bounds ({})", self.len);
        // SAFETY: the range was checked against len above.
        unsafe {
            std::ptr::write_bytes(self.item_ptr(start), 0, (end - start) * self.item.size());
        }
    }

    /// Copies item `src` over item `dst` inside this buffer.
    ///
    /// # Safety
    ///
    /// Both indices must be `< len`.
    #[inline]
    pub unsafe fn copy_within(&mut self, src: usize, dst: usize) {
        debug_assert!(src < self.len && dst < self.len);
        if src != dst {
            std::ptr::copy_nonoverlapping(self.item_ptr(src), self.item_ptr(dst), self.item.size());
        }
    }

    /// Reallocates to `new_len` items, keeping `min(old, new)` items and
    /// zero-filling the growth.
    pub fn resize(&mut self, new_len: usize) {
        if new_len == self.len {
            return;
        }

        let new_ptr = Self::allocate(self.item, new_len);
        let keep = self.len.min(new_len) * self.item.size();

        // SAFETY: both allocations are valid for `keep` bytes and distinct.
        unsafe {
            if keep > 0 {
                std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), keep);
            }
            Self::release(self.ptr, self.item, self.len);
        }

        self.ptr = new_ptr;
        self.len = new_len;
    }

    fn array_layout(item: Layout, len: usize) -> Layout {
        let size = item.size().checked_mul(len).expect("native buffer capacity overflow");
        Layout::from_size_align(size, item.align()).expect("native buffer capacity overflow")
    }

    fn allocate(item: Layout, len: usize) -> NonNull<u8> {
        let layout = Self::array_layout(item, len);
        if layout.size() == 0 {
            return dangling(item.align());
        }

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        }
    }

    /// # Safety
    ///
    /// `ptr` must come from `allocate(item, len)` and not have been freed.
    unsafe fn release(ptr: NonNull<u8>, item: Layout, len: usize) {
        let layout = Self::array_layout(item, len);
        if layout.size() > 0 {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was produced by `allocate(item, len)`; drop runs once.
        unsafe { Self::release(self.ptr, self.item, self.len) }
    }
}

impl std::fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBuffer")
            .field("item", &self.item)
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: RawBuffer exclusively owns plain bytes.
unsafe impl Send for RawBuffer {}
// SAFETY: shared access only hands out pointers; writes require &mut.
unsafe impl Sync for RawBuffer {}

/// Aligned, non-null pointer that is never dereferenced for a non-zero size.
#[inline]
fn dangling(align: usize) -> NonNull<u8> {
    // SAFETY: alignments are non-zero powers of two.
    unsafe { NonNull::new_unchecked(align as *mut u8) }
}

/// Owned, fixed-capacity buffer of plain-old-data values.
///
/// The buffer is zero-initialised, never aliased (no `Clone`), and freed
/// exactly once when dropped. Growth goes through [`NativeArray::resize`],
/// which reallocates and copies.
///
/// # Example
///
/// ```rust
/// use tessera_core::NativeArray;
///
/// let mut values: NativeArray<u32> = NativeArray::new(4);
/// values.set(2, 7);
/// values.resize(8);
/// assert_eq!(values[2], 7);
/// assert_eq!(values[7], 0);
/// ```
pub struct NativeArray<T: Pod> {
    raw: RawBuffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> NativeArray<T> {
    /// Creates a zero-initialised array of `len` elements.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            raw: RawBuffer::new(Layout::new::<T>(), len),
            _marker: PhantomData,
        }
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Checks if the array is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Checked read.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Checked mutable read.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// Checked write.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[inline]
    pub fn set(&mut self, index: usize, value: T) {
        self.as_mut_slice()[index] = value;
    }

    /// Unchecked read.
    ///
    /// # Safety
    ///
    /// `index < len`.
    #[inline]
    #[must_use]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        debug_assert!(index < self.len(), "index {index} out of bounds ({})", self.len());
        &*self.raw.as_ptr().cast::<T>().add(index)
    }

    /// Unchecked mutable read.
    ///
    /// # Safety
    ///
    /// `index < len`.
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, index: usize) -> &mut T {
        debug_assert!(index < self.len(), "index {index} out of bounds ({})", self.len());
        &mut *self.raw.as_ptr().cast::<T>().add(index)
    }

    /// Unchecked write.
    ///
    /// # Safety
    ///
    /// `index < len`.
    #[inline]
    pub unsafe fn set_unchecked(&mut self, index: usize, value: T) {
        *self.get_unchecked_mut(index) = value;
    }

    /// Reallocates to `new_len` elements; surviving elements keep their
    /// values and new elements are zero.
    #[inline]
    pub fn resize(&mut self, new_len: usize) {
        self.raw.resize(new_len);
    }

    /// Overwrites every element with `value`.
    pub fn fill(&mut self, value: T) {
        self.as_mut_slice().fill(value);
    }

    /// Returns the elements as a slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the allocation holds `len` zero-initialised or written Pod
        // values, aligned for T.
        unsafe { std::slice::from_raw_parts(self.raw.as_ptr().cast::<T>(), self.len()) }
    }

    /// Returns the elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.raw.as_ptr().cast::<T>(), self.len()) }
    }

    /// Raw pointer to the first element.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.raw.as_ptr().cast::<T>()
    }
}

impl<T: Pod> Default for NativeArray<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Pod> Index<usize> for NativeArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T: Pod> IndexMut<usize> for NativeArray<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for NativeArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let array: NativeArray<u64> = NativeArray::new(128);
        assert_eq!(array.len(), 128);
        assert!(array.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut array: NativeArray<u32> = NativeArray::new(1000);
        for i in 0..1000 {
            array.set(i, (i * 3) as u32);
        }
        for i in 0..1000 {
            assert_eq!(array.get(i), Some(&((i * 3) as u32)));
        }
        assert!(array.get(1000).is_none());
    }

    #[test]
    fn test_unchecked_roundtrip() {
        let mut array: NativeArray<f32> = NativeArray::new(16);
        // SAFETY: every index is < 16.
        unsafe {
            for i in 0..16 {
                array.set_unchecked(i, i as f32 * 0.5);
            }
            assert!((*array.get_unchecked(15) - 7.5).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_resize_grow_keeps_values_and_zero_fills() {
        let mut array: NativeArray<u16> = NativeArray::new(4);
        for i in 0..4 {
            array[i] = i as u16 + 1;
        }

        array.resize(10);
        assert_eq!(array.len(), 10);
        assert_eq!(&array.as_slice()[..4], &[1, 2, 3, 4]);
        assert!(array.as_slice()[4..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_resize_shrink() {
        let mut array: NativeArray<u8> = NativeArray::new(8);
        array.fill(9);
        array.resize(3);
        assert_eq!(array.as_slice(), &[9, 9, 9]);

        array.resize(0);
        assert!(array.is_empty());
        array.resize(2);
        assert_eq!(array.as_slice(), &[0, 0]);
    }

    #[test]
    #[should_panic]
    fn test_checked_set_out_of_bounds_panics() {
        let mut array: NativeArray<u32> = NativeArray::new(2);
        array.set(2, 1);
    }

    #[test]
    fn test_zero_sized_items() {
        let mut array: NativeArray<()> = NativeArray::new(1_000);
        array.resize(2_000);
        assert_eq!(array.len(), 2_000);
    }

    #[test]
    fn test_raw_buffer_respects_alignment() {
        let layout = Layout::from_size_align(16, 16).unwrap();
        let mut raw = RawBuffer::new(layout, 5);
        assert_eq!(raw.as_ptr() as usize % 16, 0);
        assert_eq!(raw.byte_len(), 80);

        raw.resize(9);
        assert_eq!(raw.as_ptr() as usize % 16, 0);
        raw.zero_range(0, 9);
    }
}
