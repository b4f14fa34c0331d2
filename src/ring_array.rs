//! A circular buffer with constraint-checked mutation.
//!
//! [`RingArray`] is the payload of every tree node: a fixed-capacity ring
//! where pushing or popping at either end is O(1) and a middle insertion
//! shifts whichever side of the insertion point is shorter. The builder also
//! uses it in its growable form as a FIFO worklist.

use core::cmp::Ordering;
use core::fmt;
use core::iter::FusedIterator;
use core::ops::{Index, IndexMut};

use smallvec::SmallVec;

/// Number of slots stored inline before the buffer spills to the heap.
const INLINE_SLOTS: usize = 8;
/// Physical capacity a growable ring starts with on its first insertion.
const INITIAL_CAPACITY: usize = 4;

/// Mutability constraint applied to a [`RingArray`].
///
/// Violating a constraint is a programming error and panics; see the
/// individual `RingArray` methods for which constraint they require.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Constraint {
    /// No constraint: the ring doubles its capacity when full.
    #[default]
    Growable,
    /// The capacity is fixed; filling the ring past it panics.
    FixedCapacity,
    /// The length is fixed; only [`RingArray::replace`] and reads are legal.
    FixedSize,
    /// No mutation of any kind is legal.
    ReadOnly,
}

/// A circular buffer of `T` with O(1) operations at both ends.
///
/// Logical index 0 is wherever `start` currently points; the backing slots
/// wrap around the physical end of the buffer ("rotated"). Vacated slots are
/// written back to `None` so removed values drop eagerly.
///
/// # Examples
///
/// ```
/// use ring_tree::RingArray;
///
/// let mut ring = RingArray::fixed(4);
/// ring.push_last(2);
/// ring.push_last(3);
/// ring.push_first(1); // rotates; no shifting
/// assert_eq!(ring.len(), 3);
/// assert_eq!(ring[0], 1);
/// assert_eq!(ring.iter().copied().collect::<Vec<_>>(), [1, 2, 3]);
/// ```
#[derive(Clone)]
pub struct RingArray<T> {
    /// Physical slots; always exactly `capacity` long.
    buf: SmallVec<[Option<T>; INLINE_SLOTS]>,
    /// Physical index of logical element 0.
    start: usize,
    /// Number of occupied slots.
    len: usize,
    constraint: Constraint,
}

impl<T> RingArray<T> {
    /// Creates an empty growable ring without allocating.
    #[must_use]
    pub fn new() -> Self {
        Self::with_constraint(0, Constraint::Growable)
    }

    /// Creates an empty growable ring with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_constraint(capacity, Constraint::Growable)
    }

    /// Creates an empty ring of exactly `capacity` slots that never grows.
    #[must_use]
    pub fn fixed(capacity: usize) -> Self {
        Self::with_constraint(capacity, Constraint::FixedCapacity)
    }

    /// Creates an empty ring with the given capacity and constraint.
    #[must_use]
    pub fn with_constraint(capacity: usize, constraint: Constraint) -> Self {
        let mut buf = SmallVec::with_capacity(capacity);
        buf.extend(core::iter::repeat_with(|| None).take(capacity));
        Self {
            buf,
            start: 0,
            len: 0,
            constraint,
        }
    }

    /// Returns the number of elements in the ring.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the ring contains no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots, occupied or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if every slot is occupied. A growable ring reports full
    /// just before it would reallocate.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Returns the ring's mutability constraint.
    #[must_use]
    pub const fn constraint(&self) -> Constraint {
        self.constraint
    }

    /// Maps a logical index to its physical slot.
    ///
    /// `start + index < 2 * capacity` always holds, so a conditional subtract
    /// replaces the modulo on this hot path.
    #[inline]
    fn slot(&self, index: usize) -> usize {
        let physical = self.start + index;
        if physical >= self.buf.len() {
            physical - self.buf.len()
        } else {
            physical
        }
    }

    /// Physical index one before `start`, wrapping.
    #[inline]
    fn slot_before_start(&self) -> usize {
        if self.start == 0 {
            self.buf.len() - 1
        } else {
            self.start - 1
        }
    }

    /// Takes the element at a logical index, leaving the slot vacant.
    #[inline]
    fn take_slot(&mut self, index: usize) -> T {
        let slot = self.slot(index);
        self.buf[slot].take().expect("`RingArray` - occupied slot is vacant!")
    }

    /// Moves the element at logical `from` to logical `to`.
    #[inline]
    fn shift_slot(&mut self, from: usize, to: usize) {
        let from_slot = self.slot(from);
        let value = self.buf[from_slot].take();
        let slot = self.slot(to);
        self.buf[slot] = value;
    }

    fn assert_mutable(&self, op: &str) {
        assert!(
            self.constraint != Constraint::ReadOnly,
            "`RingArray::{op}()` - ring is read-only!"
        );
    }

    fn assert_resizable(&self, op: &str) {
        self.assert_mutable(op);
        assert!(
            self.constraint != Constraint::FixedSize,
            "`RingArray::{op}()` - ring is fixed-size!"
        );
    }

    /// Guarantees a free slot for one more element, growing a growable ring
    /// and panicking for a full fixed-capacity one.
    fn ensure_slot(&mut self, op: &str) {
        self.assert_resizable(op);
        if !self.is_full() {
            return;
        }
        assert!(
            self.constraint == Constraint::Growable,
            "`RingArray::{op}()` - ring is at fixed capacity!"
        );
        self.grow_for(self.len + 1);
    }

    /// Reallocates to at least `needed` slots, linearizing so `start` is 0.
    fn grow_for(&mut self, needed: usize) {
        let mut capacity = self.buf.len().max(INITIAL_CAPACITY);
        while capacity < needed {
            capacity *= 2;
        }
        let mut buf: SmallVec<[Option<T>; INLINE_SLOTS]> = SmallVec::with_capacity(capacity);
        buf.extend(core::iter::repeat_with(|| None).take(capacity));
        for index in 0..self.len {
            let slot = self.slot(index);
            buf[index] = self.buf[slot].take();
        }
        self.buf = buf;
        self.start = 0;
    }

    /// Returns a reference to the element at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len {
            self.buf[self.slot(index)].as_ref()
        } else {
            None
        }
    }

    /// Returns a mutable reference to the element at `index`, if any.
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len {
            let slot = self.slot(index);
            self.buf[slot].as_mut()
        } else {
            None
        }
    }

    /// Returns the first element, if any.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    /// Returns the last element, if any.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|index| self.get(index))
    }

    /// Replaces the element at `index`, returning the previous one.
    ///
    /// This is the one mutation a [`Constraint::FixedSize`] ring permits.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len` or the ring is read-only.
    pub fn replace(&mut self, index: usize, item: T) -> T {
        self.assert_mutable("replace");
        assert!(index < self.len, "`RingArray::replace()` - `index` out of range!");
        let slot = self.slot(index);
        self.buf[slot].replace(item).expect("`RingArray` - occupied slot is vacant!")
    }

    /// Prepends an element in O(1).
    ///
    /// # Panics
    ///
    /// Panics if the ring is constrained and cannot take another element.
    pub fn push_first(&mut self, item: T) {
        self.ensure_slot("push_first");
        self.start = self.slot_before_start();
        self.buf[self.start] = Some(item);
        self.len += 1;
    }

    /// Appends an element in O(1).
    ///
    /// # Panics
    ///
    /// Panics if the ring is constrained and cannot take another element.
    pub fn push_last(&mut self, item: T) {
        self.ensure_slot("push_last");
        let slot = self.slot(self.len);
        self.buf[slot] = Some(item);
        self.len += 1;
    }

    /// Removes and returns the first element in O(1).
    ///
    /// # Panics
    ///
    /// Panics if the ring is read-only or fixed-size.
    pub fn pop_first(&mut self) -> Option<T> {
        self.assert_resizable("pop_first");
        if self.len == 0 {
            return None;
        }
        let item = self.buf[self.start].take();
        self.start = self.slot(1);
        self.len -= 1;
        item
    }

    /// Removes and returns the last element in O(1).
    ///
    /// # Panics
    ///
    /// Panics if the ring is read-only or fixed-size.
    pub fn pop_last(&mut self) -> Option<T> {
        self.assert_resizable("pop_last");
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        let slot = self.slot(self.len);
        self.buf[slot].take()
    }

    /// Inserts `item` at `index`, shifting whichever side of the insertion
    /// point holds fewer elements. Amortized over random indices this moves
    /// capacity/4 elements instead of the capacity/2 a one-directional shift
    /// would.
    ///
    /// # Panics
    ///
    /// Panics if `index > len` or the ring is constrained and cannot take
    /// another element.
    pub fn insert(&mut self, index: usize, item: T) {
        assert!(index <= self.len, "`RingArray::insert()` - `index` out of range!");
        self.ensure_slot("insert");
        let after = self.len - index;
        if index <= after {
            // Shift the prefix one slot leftwards.
            self.start = self.slot_before_start();
            self.len += 1;
            for to in 0..index {
                self.shift_slot(to + 1, to);
            }
        } else {
            // Shift the suffix one slot rightwards.
            self.len += 1;
            for to in ((index + 1)..self.len).rev() {
                self.shift_slot(to - 1, to);
            }
        }
        let slot = self.slot(index);
        self.buf[slot] = Some(item);
    }

    /// Removes and returns the element at `index`, shifting from the
    /// shorter side, mirroring [`insert`](Self::insert).
    ///
    /// # Panics
    ///
    /// Panics if `index >= len` or the ring is read-only or fixed-size.
    pub fn remove(&mut self, index: usize) -> T {
        self.assert_resizable("remove");
        assert!(index < self.len, "`RingArray::remove()` - `index` out of range!");
        let item = self.take_slot(index);
        let after = self.len - index - 1;
        if index <= after {
            // Close the gap by moving the prefix rightwards.
            for from in (0..index).rev() {
                self.shift_slot(from, from + 1);
            }
            self.start = self.slot(1);
        } else {
            // Close the gap by moving the suffix leftwards.
            for to in index..self.len - 1 {
                self.shift_slot(to + 1, to);
            }
        }
        self.len -= 1;
        item
    }

    /// Inserts `item` at `index` and pops the first element, as one
    /// length-preserving step. With `index == 0` the item never enters the
    /// ring and is returned unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `index > len` or the ring is read-only or fixed-size.
    pub fn insert_pop_first(&mut self, index: usize, item: T) -> T {
        self.assert_resizable("insert_pop_first");
        assert!(index <= self.len, "`RingArray::insert_pop_first()` - `index` out of range!");
        if index == 0 {
            return item;
        }
        let first = self.take_slot(0);
        for to in 0..index - 1 {
            self.shift_slot(to + 1, to);
        }
        let slot = self.slot(index - 1);
        self.buf[slot] = Some(item);
        first
    }

    /// Inserts `item` at `index` and pops the last element, as one
    /// length-preserving step. With `index == len` the item never enters the
    /// ring and is returned unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `index > len` or the ring is read-only or fixed-size.
    pub fn insert_pop_last(&mut self, index: usize, item: T) -> T {
        self.assert_resizable("insert_pop_last");
        assert!(index <= self.len, "`RingArray::insert_pop_last()` - `index` out of range!");
        if index == self.len {
            return item;
        }
        let last = self.take_slot(self.len - 1);
        for to in ((index + 1)..self.len).rev() {
            self.shift_slot(to - 1, to);
        }
        let slot = self.slot(index);
        self.buf[slot] = Some(item);
        last
    }

    /// Binary-searches a ring sorted under `f`, where `f` compares a probed
    /// element against the target (the `slice::binary_search_by` contract:
    /// `Ok(index)` on a hit, `Err(insertion_point)` on a miss).
    ///
    /// Probes go through logical indices, so rotation is invisible to the
    /// search and each probe pays a single conditional subtract.
    pub fn binary_search_by<F>(&self, mut f: F) -> Result<usize, usize>
    where
        F: FnMut(&T) -> Ordering,
    {
        let mut lo = 0;
        let mut hi = self.len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let probe = self.buf[self.slot(mid)].as_ref().expect("`RingArray` - occupied slot is vacant!");
            match f(probe) {
                Ordering::Less => lo = mid + 1,
                Ordering::Equal => return Ok(mid),
                Ordering::Greater => hi = mid,
            }
        }
        Err(lo)
    }

    /// Binary-searches a sorted ring for `target`.
    pub fn binary_search(&self, target: &T) -> Result<usize, usize>
    where
        T: Ord,
    {
        self.binary_search_by(|probe| probe.cmp(target))
    }

    /// Splits off the upper half into a new ring of the same capacity and
    /// constraint. `self` keeps the lower ceil(len/2) elements.
    ///
    /// # Panics
    ///
    /// Panics if the ring is read-only or fixed-size.
    #[must_use]
    pub fn split_right(&mut self) -> Self {
        self.assert_resizable("split_right");
        let pivot = self.len.div_ceil(2);
        let mut right = Self::with_constraint(self.buf.len(), self.constraint);
        for index in pivot..self.len {
            let slot = self.slot(index);
            right.buf[index - pivot] = self.buf[slot].take();
        }
        right.len = self.len - pivot;
        self.len = pivot;
        right
    }

    /// Appends every element of `right`, preserving order.
    ///
    /// # Panics
    ///
    /// Panics if the ring is read-only or fixed-size, or if the combined
    /// length exceeds a fixed capacity.
    pub fn merge_with_right(&mut self, mut right: Self) {
        self.assert_resizable("merge_with_right");
        let combined = self.len + right.len;
        if combined > self.buf.len() {
            assert!(
                self.constraint == Constraint::Growable,
                "`RingArray::merge_with_right()` - combined length exceeds capacity!"
            );
            self.grow_for(combined);
        }
        for index in 0..right.len {
            let item = right.take_slot(index);
            let slot = self.slot(self.len);
            self.buf[slot] = Some(item);
            self.len += 1;
        }
    }

    /// Removes every element.
    ///
    /// # Panics
    ///
    /// Panics if the ring is read-only or fixed-size.
    pub fn clear(&mut self) {
        self.assert_resizable("clear");
        for slot in &mut self.buf {
            *slot = None;
        }
        self.start = 0;
        self.len = 0;
    }

    /// Returns a double-ended iterator over the elements in logical order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            ring: self,
            front: 0,
            back: self.len,
        }
    }
}

impl<T> Default for RingArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for RingArray<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.get(index).expect("`RingArray::index()` - `index` out of range!")
    }
}

impl<T> IndexMut<usize> for RingArray<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.get_mut(index).expect("`RingArray::index_mut()` - `index` out of range!")
    }
}

impl<T: fmt::Debug> fmt::Debug for RingArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for RingArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for RingArray<T> {}

impl<'a, T> IntoIterator for &'a RingArray<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// A double-ended iterator over the elements of a [`RingArray`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, T> {
    ring: &'a RingArray<T>,
    front: usize,
    back: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.front == self.back {
            return None;
        }
        let item = self.ring.get(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        self.ring.get(self.back)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}
