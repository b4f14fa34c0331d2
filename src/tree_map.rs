//! The public map type and its iterators.

use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;
use core::ops::{Bound, Index, RangeBounds};

use crate::TreeError;
use crate::builder::TreeBuilder;
use crate::raw::{DEFAULT_CAPACITY, Handle, RawTree};

mod cursor;

pub use cursor::Cursor;

/// Validates that the start bound does not exceed the end bound.
///
/// # Panics
///
/// Panics if `start > end` or if `start == end` and both bounds are
/// `Excluded`.
fn validate_range_bounds<T, R>(range: &R)
where
    T: ?Sized + Ord,
    R: RangeBounds<T>,
{
    if let (Bound::Included(start) | Bound::Excluded(start), Bound::Included(end) | Bound::Excluded(end)) =
        (range.start_bound(), range.end_bound())
    {
        let valid =
            if matches!(range.start_bound(), Bound::Excluded(_)) && matches!(range.end_bound(), Bound::Excluded(_)) {
                start < end
            } else {
                start <= end
            };
        assert!(valid, "range start is greater than range end in RingTreeMap");
    }
}

/// An ordered map based on a B+ tree with ring-buffer nodes.
///
/// Keys need a [total order] via the [`Ord`] trait and must be [`Clone`],
/// because internal nodes carry copies of leaf keys as separators. Lookups
/// accept any borrowed form of the key whose ordering matches, as with the
/// standard library's `BTreeMap`.
///
/// It is a logic error for a key to be modified in such a way that its
/// ordering relative to any other key changes while it is in the map. The
/// behavior resulting from such a logic error is not specified (lookups may
/// fail, iteration order may be wrong), but it will not be undefined
/// behavior.
///
/// # Examples
///
/// ```
/// use ring_tree::RingTreeMap;
///
/// let mut inventory = RingTreeMap::new();
/// inventory.insert("bolt", 120).unwrap();
/// inventory.insert("nut", 80).unwrap();
/// inventory.insert("washer", 250).unwrap();
///
/// assert_eq!(inventory.get(&"nut"), Some(&80));
/// assert!(inventory.contains_key(&"bolt"));
/// assert_eq!(inventory.len(), 3);
///
/// // Receiving a delivery either creates a line item or tops one up.
/// inventory.insert_or_update("nut", 40, |_, delivered, stock| *stock += delivered);
/// inventory.insert_or_update("screw", 500, |_, delivered, stock| *stock += delivered);
/// assert_eq!(inventory[&"nut"], 120);
/// assert_eq!(inventory[&"screw"], 500);
///
/// // Ordered iteration, in either direction.
/// let names: Vec<_> = inventory.keys().copied().collect();
/// assert_eq!(names, ["bolt", "nut", "screw", "washer"]);
/// assert_eq!(inventory.pop_first(), Some(("bolt", 120)));
/// ```
///
/// [total order]: https://en.wikipedia.org/wiki/Total_order
pub struct RingTreeMap<K, V> {
    pub(crate) raw: RawTree<K, V>,
}

impl<K, V> RingTreeMap<K, V> {
    /// Makes a new, empty `RingTreeMap` with the default node fan-out.
    ///
    /// Does not allocate anything on its own.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: RawTree::new(DEFAULT_CAPACITY, DEFAULT_CAPACITY),
        }
    }

    /// Makes a new, empty `RingTreeMap` with explicit node capacities:
    /// internal nodes hold up to `internal_cap` separators, leaves up to
    /// `leaf_cap` entries.
    ///
    /// Small capacities force splits and merges with only a handful of
    /// entries, which is mostly useful for exercising structural behavior;
    /// the defaults are the sensible choice otherwise.
    ///
    /// # Panics
    ///
    /// Panics if `internal_cap < 2` or `leaf_cap < 1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ring_tree::RingTreeMap;
    ///
    /// let mut map = RingTreeMap::with_order(3, 3);
    /// for key in 1..=7 {
    ///     map.insert(key, ()).unwrap();
    /// }
    /// // Seven entries overflow a 3-entry leaf twice: two levels now.
    /// assert_eq!(map.height(), 2);
    /// ```
    #[must_use]
    pub fn with_order(internal_cap: usize, leaf_cap: usize) -> Self {
        assert!(internal_cap >= 2, "`RingTreeMap::with_order()` - `internal_cap` must be at least 2!");
        assert!(leaf_cap >= 1, "`RingTreeMap::with_order()` - `leaf_cap` must be at least 1!");
        Self {
            raw: RawTree::new(internal_cap, leaf_cap),
        }
    }

    pub(crate) fn from_raw(raw: RawTree<K, V>) -> Self {
        Self { raw }
    }

    /// Returns a bulk-loading [`TreeBuilder`] with this map's default
    /// capacities. Equivalent to [`TreeBuilder::new`].
    #[must_use]
    pub fn builder() -> TreeBuilder<K, V> {
        TreeBuilder::new()
    }

    /// Returns the number of entries in the map.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if the map contains no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the number of levels in the tree: 0 when empty, 1 while a
    /// single leaf suffices.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.raw.height()
    }

    /// Returns the leaf fan-out this map was built with.
    #[must_use]
    pub const fn leaf_capacity(&self) -> usize {
        self.raw.leaf_capacity()
    }

    /// Returns the internal-node fan-out this map was built with.
    #[must_use]
    pub const fn internal_capacity(&self) -> usize {
        self.raw.internal_capacity()
    }

    /// Clears the map, removing all entries.
    ///
    /// Counts as a mutation even when the map is already empty, so any
    /// outstanding [`Cursor`] is invalidated either way.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns a double-ended iterator over all entries in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: &self.raw,
            front: self.raw.head().map(|handle| (handle, 0)),
            back: self.raw.tail().map(|handle| (handle, self.raw.leaf(handle).len() - 1)),
            remaining: self.raw.len(),
        }
    }

    /// Returns an iterator over the keys in order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values, ordered by key.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

impl<K: Ord + Clone, V> RingTreeMap<K, V> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use ring_tree::RingTreeMap;
    ///
    /// let mut map = RingTreeMap::new();
    /// map.insert(1, "a").unwrap();
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_mut(key)
    }

    /// Returns the stored key-value pair corresponding to the key.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_key_value(key)
    }

    /// Returns true if the map contains the given key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.contains_key(key)
    }

    /// Returns the value at the key's insertion point: the value stored
    /// under the key itself when present, otherwise the nearest entry of the
    /// leaf that would receive the key (clamping to that leaf's last entry
    /// when the key sorts past it). `None` only on an empty map.
    ///
    /// # Examples
    ///
    /// ```
    /// use ring_tree::RingTreeMap;
    ///
    /// let map: ring_tree::RingTreeMap<i32, &str> =
    ///     [(10, "ten"), (20, "twenty")].into();
    /// assert_eq!(map.next_nearest(&10), Some(&"ten"));
    /// assert_eq!(map.next_nearest(&15), Some(&"twenty"));
    /// assert_eq!(map.next_nearest(&99), Some(&"twenty"));
    /// ```
    pub fn next_nearest<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.next_nearest(key)
    }

    /// Returns the entry with the smallest key; O(1).
    #[must_use]
    pub fn first(&self) -> Option<(&K, &V)> {
        self.raw.first()
    }

    /// Returns the entry with the largest key; O(1).
    #[must_use]
    pub fn last(&self) -> Option<(&K, &V)> {
        self.raw.last()
    }

    /// Inserts a key-value pair, failing with
    /// [`TreeError::DuplicateKey`] - and leaving the map untouched - when
    /// the key is already present.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateKey`] if the key is present.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        let mut duplicate = false;
        self.raw.upsert(key, value, |_, value| value, |_, _, _| {
            duplicate = true;
            false
        });
        if duplicate { Err(TreeError::DuplicateKey) } else { Ok(()) }
    }

    /// Inserts the pair only when the key is absent; returns whether it was
    /// inserted. An existing value is left alone.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        self.raw.upsert(key, value, |_, value| value, |_, _, _| false)
    }

    /// Inserts the pair, overwriting any existing value. Returns true iff
    /// the key was new.
    pub fn insert_or_replace(&mut self, key: K, value: V) -> bool {
        self.raw.upsert(key, value, |_, value| value, |_, value, old| {
            *old = value;
            true
        })
    }

    /// Inserts the pair when the key is absent; otherwise lets `update`
    /// combine the incoming value into the stored one. Returns true iff the
    /// key was new.
    ///
    /// # Examples
    ///
    /// ```
    /// use ring_tree::RingTreeMap;
    ///
    /// let mut tally = RingTreeMap::new();
    /// tally.insert(2, 5).unwrap();
    /// let added = tally.insert_or_update(2, 20, |_, new, old| *old += new);
    /// assert!(!added);
    /// assert_eq!(tally[&2], 25);
    /// ```
    pub fn insert_or_update<F>(&mut self, key: K, value: V, update: F) -> bool
    where
        F: FnOnce(&K, V, &mut V),
    {
        self.raw.upsert(key, value, |_, value| value, |key, value, old| {
            update(key, value, old);
            true
        })
    }

    /// The fully general insert path: on a miss `add` builds the value from
    /// `arg`, on a hit `update` folds `arg` into the stored value. Returns
    /// true iff the key was new.
    ///
    /// This is the contract a multimap layer builds on:
    ///
    /// ```
    /// use ring_tree::RingTreeMap;
    ///
    /// let mut groups: RingTreeMap<&str, Vec<i32>> = RingTreeMap::new();
    /// for (name, score) in [("ada", 3), ("bix", 1), ("ada", 5)] {
    ///     groups.upsert(name, score, |_, score| vec![score], |_, score, group| group.push(score));
    /// }
    /// assert_eq!(groups[&"ada"], [3, 5]);
    /// ```
    pub fn upsert<A, FA, FU>(&mut self, key: K, arg: A, add: FA, update: FU) -> bool
    where
        FA: FnOnce(&K, A) -> V,
        FU: FnOnce(&K, A, &mut V),
    {
        self.raw.upsert(key, arg, add, |key, arg, old| {
            update(key, arg, old);
            true
        })
    }

    /// Removes a key from the map, returning its value if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key)
    }

    /// Removes a key from the map, returning the stored key-value pair if it
    /// was present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove_entry(key)
    }

    /// Removes and returns the smallest entry; O(1) unless the head leaf
    /// needs rebalancing.
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.raw.pop_first()
    }

    /// Removes and returns the largest entry; O(1) unless the tail leaf
    /// needs rebalancing.
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.raw.pop_last()
    }

    /// Returns a double-ended iterator over the entries within `range`.
    /// Locating the ends is O(log n); each step is O(1).
    ///
    /// # Panics
    ///
    /// Panics if the range's start is greater than its end, or if both are
    /// the same excluded bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use ring_tree::RingTreeMap;
    ///
    /// let map: RingTreeMap<i32, i32> = (0..10).map(|n| (n, n * n)).collect();
    /// let squares: Vec<_> = map.range(3..6).map(|(_, &sq)| sq).collect();
    /// assert_eq!(squares, [9, 16, 25]);
    /// // Reverse iteration from a start key:
    /// let down: Vec<_> = map.range(..=7).rev().map(|(&n, _)| n).collect();
    /// assert_eq!(down, [7, 6, 5, 4, 3, 2, 1, 0]);
    /// ```
    pub fn range<Q, R>(&self, range: R) -> Range<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
        R: RangeBounds<Q>,
    {
        validate_range_bounds(&range);
        let front = match range.start_bound() {
            Bound::Unbounded => self.raw.head().map(|handle| (handle, 0)),
            Bound::Included(key) => self.raw.lower_bound(key),
            Bound::Excluded(key) => self.raw.upper_bound(key),
        };
        let back = match range.end_bound() {
            Bound::Unbounded => self.raw.tail().map(|handle| (handle, self.raw.leaf(handle).len() - 1)),
            Bound::Included(key) => self.raw.upper_bound_inclusive(key),
            Bound::Excluded(key) => self.raw.lower_bound_exclusive(key),
        };
        let finished = match (front, back) {
            (Some((front_leaf, front_index)), Some((back_leaf, back_index))) => {
                // The ends may have crossed (an empty range between keys).
                self.raw.leaf(front_leaf).key(front_index) > self.raw.leaf(back_leaf).key(back_index)
            }
            _ => true,
        };
        Range {
            raw: &self.raw,
            front,
            back,
            finished,
        }
    }

    /// Returns a detached cursor positioned at the first entry.
    ///
    /// Unlike [`iter`](Self::iter), a cursor does not borrow the map; it
    /// revalidates a version snapshot on every step instead, failing with
    /// [`TreeError::ConcurrentModification`] once the map has been mutated.
    ///
    /// # Examples
    ///
    /// ```
    /// use ring_tree::{RingTreeMap, TreeError};
    ///
    /// let mut map: RingTreeMap<i32, &str> = [(1, "a"), (2, "b")].into();
    /// let mut cursor = map.cursor_forward();
    /// assert_eq!(cursor.next(&map), Ok(Some((&1, &"a"))));
    ///
    /// map.insert(3, "c").unwrap();
    /// assert_eq!(cursor.next(&map), Err(TreeError::ConcurrentModification));
    /// ```
    #[must_use]
    pub fn cursor_forward(&self) -> Cursor<K, V> {
        Cursor::new(self.raw.head().map(|handle| (handle, 0)), self.raw.version(), true)
    }

    /// Returns a detached cursor positioned at the last entry, stepping
    /// toward smaller keys.
    #[must_use]
    pub fn cursor_reverse(&self) -> Cursor<K, V> {
        let position = self.raw.tail().map(|handle| (handle, self.raw.leaf(handle).len() - 1));
        Cursor::new(position, self.raw.version(), false)
    }

    /// Returns a forward cursor positioned at the first key `>= start`.
    #[must_use]
    pub fn cursor_forward_from<Q>(&self, start: &Q) -> Cursor<K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        Cursor::new(self.raw.lower_bound(start), self.raw.version(), true)
    }

    /// Returns a reverse cursor positioned at the last key `<= start`.
    #[must_use]
    pub fn cursor_reverse_from<Q>(&self, start: &Q) -> Cursor<K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        Cursor::new(self.raw.upper_bound_inclusive(start), self.raw.version(), false)
    }
}

impl<K, V> Default for RingTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for RingTreeMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Clone, V: Clone> Clone for RingTreeMap<K, V> {
    fn clone(&self) -> Self {
        Self { raw: self.raw.clone() }
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for RingTreeMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for RingTreeMap<K, V> {}

impl<K, V, Q> Index<&Q> for RingTreeMap<K, V>
where
    K: Borrow<Q> + Ord + Clone,
    Q: ?Sized + Ord,
{
    type Output = V;

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present in the map.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K: Ord + Clone, V> Extend<(K, V)> for RingTreeMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert_or_replace(key, value);
        }
    }
}

impl<K: Ord + Clone, V> FromIterator<(K, V)> for RingTreeMap<K, V> {
    /// Builds the map through a [`TreeBuilder`], so already-sorted input is
    /// bulk-loaded in O(n).
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut builder = TreeBuilder::new();
        for (key, value) in iter {
            builder.insert_or_replace(key, value);
        }
        builder.into_tree()
    }
}

impl<K: Ord + Clone, V, const N: usize> From<[(K, V); N]> for RingTreeMap<K, V> {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<'a, K, V> IntoIterator for &'a RingTreeMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K, V> IntoIterator for RingTreeMap<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    /// Consumes the map into an iterator over its entries in key order,
    /// draining the leaf chain in O(n).
    fn into_iter(mut self) -> IntoIter<K, V> {
        IntoIter {
            inner: self.raw.drain_to_vec().into_iter(),
        }
    }
}

/// An iterator over the entries of a [`RingTreeMap`], in key order.
///
/// Created by [`RingTreeMap::iter`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    raw: &'a RawTree<K, V>,
    front: Option<(Handle, usize)>,
    back: Option<(Handle, usize)>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        if self.remaining == 0 {
            return None;
        }
        let (handle, index) = self.front?;
        let leaf = self.raw.leaf(handle);
        let entry = leaf.entry(index);
        self.remaining -= 1;
        self.front = if index + 1 < leaf.len() {
            Some((handle, index + 1))
        } else {
            leaf.next().map(|next| (next, 0))
        };
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<(&'a K, &'a V)> {
        if self.remaining == 0 {
            return None;
        }
        let (handle, index) = self.back?;
        let leaf = self.raw.leaf(handle);
        let entry = leaf.entry(index);
        self.remaining -= 1;
        self.back = if index > 0 {
            Some((handle, index - 1))
        } else {
            leaf.prev().map(|prev| (prev, self.raw.leaf(prev).len() - 1))
        };
        Some(entry)
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// An iterator over the keys of a [`RingTreeMap`], in order.
///
/// Created by [`RingTreeMap::keys`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K, V> DoubleEndedIterator for Keys<'a, K, V> {
    fn next_back(&mut self) -> Option<&'a K> {
        self.inner.next_back().map(|(key, _)| key)
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of a [`RingTreeMap`], ordered by key.
///
/// Created by [`RingTreeMap::values`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K, V> DoubleEndedIterator for Values<'a, K, V> {
    fn next_back(&mut self) -> Option<&'a V> {
        self.inner.next_back().map(|(_, value)| value)
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

/// An iterator over a sub-range of entries in a [`RingTreeMap`].
///
/// Created by [`RingTreeMap::range`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Range<'a, K, V> {
    raw: &'a RawTree<K, V>,
    front: Option<(Handle, usize)>,
    back: Option<(Handle, usize)>,
    /// Set once the two ends meet or cross.
    finished: bool,
}

impl<'a, K, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        if self.finished {
            return None;
        }
        let (handle, index) = self.front?;
        let leaf = self.raw.leaf(handle);
        let entry = leaf.entry(index);
        if self.front == self.back {
            self.finished = true;
        } else {
            self.front = if index + 1 < leaf.len() {
                Some((handle, index + 1))
            } else {
                leaf.next().map(|next| (next, 0))
            };
        }
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished { (0, Some(0)) } else { (0, Some(self.raw.len())) }
    }
}

impl<'a, K, V> DoubleEndedIterator for Range<'a, K, V> {
    fn next_back(&mut self) -> Option<(&'a K, &'a V)> {
        if self.finished {
            return None;
        }
        let (handle, index) = self.back?;
        let leaf = self.raw.leaf(handle);
        let entry = leaf.entry(index);
        if self.front == self.back {
            self.finished = true;
        } else {
            self.back = if index > 0 {
                Some((handle, index - 1))
            } else {
                leaf.prev().map(|prev| (prev, self.raw.leaf(prev).len() - 1))
            };
        }
        Some(entry)
    }
}

impl<K, V> FusedIterator for Range<'_, K, V> {}

/// An owning iterator over the entries of a [`RingTreeMap`], in key order.
///
/// Created by the [`IntoIterator`] impl for `RingTreeMap`.
pub struct IntoIter<K, V> {
    inner: alloc::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<(K, V)> {
        self.inner.next_back()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}
