//! Bulk-loading construction of a [`RingTreeMap`].

use core::borrow::Borrow;
use core::cmp::Ordering;

use crate::TreeError;
use crate::raw::{DEFAULT_CAPACITY, Handle, RawTree};
use crate::ring_array::RingArray;
use crate::tree_map::RingTreeMap;

/// Builds a [`RingTreeMap`] from a stream of entries, bulk-loading while
/// the stream stays ordered.
///
/// In bulk mode every entry is appended to the leaf under construction, so
/// loading n ordered entries is O(n) instead of the O(n log n) of repeated
/// inserts, and [`build`](TreeBuilder::build) stacks the internal levels
/// over the finished leaves in one pass. The first entry that arrives out
/// of order ends bulk mode: the structure built so far is committed as-is
/// (no copying; the leaves already in place stay the tree's leaves) and
/// that entry - and everything after it - takes the ordinary insert path.
/// [`remove`](TreeBuilder::remove) ends bulk mode the same way.
///
/// # Examples
///
/// ```
/// use ring_tree::TreeBuilder;
///
/// let mut builder = TreeBuilder::new();
/// for key in 0..1000 {
///     builder.insert(key, key * 2).unwrap();
/// }
/// let map = builder.into_tree();
/// assert_eq!(map.len(), 1000);
/// assert_eq!(map.first(), Some((&0, &0)));
/// assert_eq!(map.last(), Some((&999, &1998)));
/// ```
pub struct TreeBuilder<K, V> {
    tree: RingTreeMap<K, V>,
    /// Handles of the nodes on the level being assembled, with `None`
    /// markers separating levels once `build` starts stacking internals.
    worklist: RingArray<Option<Handle>>,
    /// Leaf currently receiving appends.
    current: Option<Handle>,
    /// True while bulk loading; irrevocably false afterwards.
    bulk: bool,
}

impl<K, V> TreeBuilder<K, V> {
    /// Creates a builder targeting a map with the default node fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::with_order(DEFAULT_CAPACITY, DEFAULT_CAPACITY)
    }

    /// Creates a builder targeting a map with explicit node capacities; see
    /// [`RingTreeMap::with_order`].
    ///
    /// # Panics
    ///
    /// Panics if `internal_cap < 2` or `leaf_cap < 1`.
    #[must_use]
    pub fn with_order(internal_cap: usize, leaf_cap: usize) -> Self {
        assert!(internal_cap >= 2, "`TreeBuilder::with_order()` - `internal_cap` must be at least 2!");
        assert!(leaf_cap >= 1, "`TreeBuilder::with_order()` - `leaf_cap` must be at least 1!");
        Self {
            tree: RingTreeMap::from_raw(RawTree::new(internal_cap, leaf_cap)),
            worklist: RingArray::new(),
            current: None,
            bulk: true,
        }
    }

    /// Returns the number of entries loaded so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns true if nothing has been loaded yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl<K: Ord + Clone, V> TreeBuilder<K, V> {
    /// Ends bulk mode, committing the structure built so far.
    fn finish_bulk(&mut self) {
        if !self.bulk {
            return;
        }
        self.bulk = false;
        self.tree.raw.bulk_finish(&mut self.worklist);
    }

    fn upsert_raw<A, FA, FU>(&mut self, key: K, arg: A, add: FA, update: FU) -> bool
    where
        FA: FnOnce(&K, A) -> V,
        FU: FnOnce(&K, A, &mut V) -> bool,
    {
        if !self.bulk {
            return self.tree.raw.upsert(key, arg, add, update);
        }
        let Some(current) = self.current else {
            let value = add(&key, arg);
            let handle = self.tree.raw.bulk_start(key, value);
            self.worklist.push_last(Some(handle));
            self.current = Some(handle);
            return true;
        };
        match self.tree.raw.bulk_compare(current, &key) {
            Ordering::Greater => {
                let value = add(&key, arg);
                let handle = self.tree.raw.bulk_push(current, key, value);
                if handle != current {
                    self.worklist.push_last(Some(handle));
                    self.current = Some(handle);
                }
                true
            }
            Ordering::Equal => {
                self.tree.raw.bulk_update_last(current, arg, update);
                false
            }
            Ordering::Less => {
                // Out-of-order input: commit the bulk structure and fall
                // back to the iterative path for good.
                self.finish_bulk();
                self.tree.raw.upsert(key, arg, add, update)
            }
        }
    }

    /// Loads a key-value pair, failing with [`TreeError::DuplicateKey`] when
    /// the key was already loaded.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateKey`] if the key is present.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        let mut duplicate = false;
        self.upsert_raw(key, value, |_, value| value, |_, _, _| {
            duplicate = true;
            false
        });
        if duplicate { Err(TreeError::DuplicateKey) } else { Ok(()) }
    }

    /// Loads the pair only when the key is absent; returns whether it was
    /// inserted.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        self.upsert_raw(key, value, |_, value| value, |_, _, _| false)
    }

    /// Loads the pair, overwriting any existing value. Returns true iff the
    /// key was new.
    pub fn insert_or_replace(&mut self, key: K, value: V) -> bool {
        self.upsert_raw(key, value, |_, value| value, |_, value, old| {
            *old = value;
            true
        })
    }

    /// Loads the pair when the key is absent, otherwise folds the incoming
    /// value into the stored one. Returns true iff the key was new.
    pub fn insert_or_update<F>(&mut self, key: K, value: V, update: F) -> bool
    where
        F: FnOnce(&K, V, &mut V),
    {
        self.upsert_raw(key, value, |_, value| value, |key, value, old| {
            update(key, value, old);
            true
        })
    }

    /// The fully general load path; see [`RingTreeMap::upsert`].
    pub fn upsert<A, FA, FU>(&mut self, key: K, arg: A, add: FA, update: FU) -> bool
    where
        FA: FnOnce(&K, A) -> V,
        FU: FnOnce(&K, A, &mut V),
    {
        self.upsert_raw(key, arg, add, |key, arg, old| {
            update(key, arg, old);
            true
        })
    }

    /// Removes a key. Bulk loading does not support mid-stream deletion, so
    /// this commits the bulk structure and switches to the iterative path,
    /// exactly as an out-of-order insert would.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.finish_bulk();
        self.tree.raw.remove(key)
    }

    /// Finishes construction and returns the map. The first call commits
    /// the bulk structure; repeated calls return the already-built map
    /// unchanged.
    pub fn build(&mut self) -> &RingTreeMap<K, V> {
        self.finish_bulk();
        &self.tree
    }

    /// Finishes construction and hands the map over.
    #[must_use]
    pub fn into_tree(mut self) -> RingTreeMap<K, V> {
        self.finish_bulk();
        self.tree
    }
}

impl<K, V> Default for TreeBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    #[test]
    fn bulk_load_matches_iterative_build() {
        let mut builder = TreeBuilder::with_order(3, 3);
        let mut iterative = RingTreeMap::with_order(3, 3);
        for key in 0..100 {
            builder.insert(key, key * 7).unwrap();
            iterative.insert(key, key * 7).unwrap();
        }
        let bulk = builder.into_tree();
        bulk.raw.validate();
        iterative.raw.validate();
        assert_eq!(bulk.len(), 100);
        assert_eq!(bulk.first(), Some((&0, &0)));
        assert_eq!(bulk.last(), Some((&99, &693)));
        assert!(bulk.iter().eq(iterative.iter()));
        assert!(bulk.iter().rev().eq(iterative.iter().rev()));
    }

    #[test]
    fn out_of_order_input_downgrades_to_inserts() {
        let mut builder = TreeBuilder::with_order(3, 3);
        for (key, value) in [(1, 'a'), (2, 'b'), (5, 'c'), (3, 'd')] {
            builder.insert(key, value).unwrap();
        }
        // Still usable after the fallback, including ordered keys again.
        builder.insert(4, 'e').unwrap();
        let map = builder.into_tree();
        map.raw.validate();
        let keys: Vec<i32> = map.keys().copied().collect();
        assert_eq!(keys, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn equal_keys_update_the_pending_entry() {
        let mut builder = TreeBuilder::with_order(3, 3);
        builder.insert_or_update(1, 10, |_, new, old| *old += new);
        builder.insert_or_update(2, 20, |_, new, old| *old += new);
        let added = builder.insert_or_update(2, 22, |_, new, old| *old += new);
        assert!(!added);
        assert!(builder.insert(2, 0).is_err());
        let map = builder.into_tree();
        assert_eq!(map[&2], 42);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn remove_forces_the_iterative_path() {
        let mut builder = TreeBuilder::with_order(3, 3);
        for key in 0..20 {
            builder.insert(key, key).unwrap();
        }
        assert_eq!(builder.remove(&10), Some(10));
        assert_eq!(builder.remove(&99), None);
        builder.insert(10, -10).unwrap();
        let map = builder.into_tree();
        map.raw.validate();
        assert_eq!(map.len(), 20);
        assert_eq!(map[&10], -10);
    }

    #[test]
    fn build_is_idempotent() {
        let mut builder = TreeBuilder::with_order(3, 3);
        for key in 0..50 {
            builder.insert(key, key).unwrap();
        }
        let len = builder.build().len();
        let height = builder.build().height();
        assert_eq!(builder.build().len(), len);
        assert_eq!(builder.build().height(), height);
        builder.build().raw.validate();
    }

    #[test]
    fn empty_builder_yields_an_empty_map() {
        let builder: TreeBuilder<i32, i32> = TreeBuilder::new();
        let map = builder.into_tree();
        map.raw.validate();
        assert!(map.is_empty());
        assert_eq!(map.height(), 0);
    }

    #[test]
    fn single_leaf_build_is_the_root() {
        let mut builder = TreeBuilder::with_order(3, 3);
        builder.insert(1, 'x').unwrap();
        builder.insert(2, 'y').unwrap();
        let map = builder.into_tree();
        map.raw.validate();
        assert_eq!(map.height(), 1);
        assert_eq!(map.len(), 2);
    }

    proptest! {
        /// Whatever the input order, the builder must agree with a
        /// `BTreeMap` fed the same pairs, and the result must be a valid
        /// tree at any fan-out.
        #[test]
        fn builder_matches_model(
            entries in prop::collection::vec((0i16..300, any::<i16>()), 0..300),
            internal_cap in 2usize..6,
            leaf_cap in 1usize..6,
        ) {
            let mut builder = TreeBuilder::with_order(internal_cap, leaf_cap);
            let mut model = BTreeMap::new();
            for &(key, value) in &entries {
                let added = builder.insert_or_replace(key, value);
                prop_assert_eq!(added, model.insert(key, value).is_none());
            }
            let map = builder.into_tree();
            map.raw.validate();
            prop_assert_eq!(map.len(), model.len());
            prop_assert!(map.iter().eq(model.iter()));
        }

        /// Bulk loading sorted input must be indistinguishable from
        /// one-by-one insertion.
        #[test]
        fn bulk_equals_iterative_on_sorted_input(
            length in 0usize..400,
            internal_cap in 2usize..6,
            leaf_cap in 1usize..6,
        ) {
            let mut builder = TreeBuilder::with_order(internal_cap, leaf_cap);
            let mut iterative = RingTreeMap::with_order(internal_cap, leaf_cap);
            for key in 0..length {
                builder.insert(key, key).unwrap();
                iterative.insert(key, key).unwrap();
            }
            let bulk = builder.into_tree();
            bulk.raw.validate();
            iterative.raw.validate();
            prop_assert!(bulk.iter().eq(iterative.iter()));
        }
    }
}
