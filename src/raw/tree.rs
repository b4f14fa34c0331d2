use core::borrow::Borrow;
use core::cmp::Ordering;

use alloc::vec::Vec;

use crate::ring_array::RingArray;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{InternalNode, LeafNode, Node, Separator};

// Node fan-out used when the caller does not pick one. Small under test so
// structural events happen with a handful of keys.
#[cfg(test)]
pub(crate) const DEFAULT_CAPACITY: usize = 8;
#[cfg(not(test))]
pub(crate) const DEFAULT_CAPACITY: usize = 64;

/// The core B+ tree backing `RingTreeMap`.
///
/// Mutations descend recursively from the root. Each level hands its child a
/// [`Relatives`] record naming the child's neighbours and the ancestors
/// holding the separators shared with them, which is what lets a node spill
/// to or borrow from a *cousin* (a neighbour under a different parent)
/// instead of splitting or merging early.
pub(crate) struct RawTree<K, V> {
    nodes: Arena<Node<K, V>>,
    root: Option<Handle>,
    /// First leaf of the chain, for forward iteration and prepend fast paths.
    head: Option<Handle>,
    /// Last leaf of the chain, for reverse iteration and append fast paths.
    tail: Option<Handle>,
    /// Number of levels; 1 for a single-leaf tree, 0 when empty.
    height: usize,
    len: usize,
    /// Bumped by every successful mutation; cursors re-validate against it.
    version: u64,
    internal_cap: usize,
    leaf_cap: usize,
}

/// Neighbour context handed down the recursive descent.
///
/// Each side names the node's neighbour at its own level, the ancestor
/// holding the separator between the two subtrees, and whether the neighbour
/// shares this node's direct parent. Spill and borrow work with either kind
/// of neighbour; merge needs `same_parent` because only then can the parent
/// delete the separator of the merged-away node.
#[derive(Clone, Copy, Default)]
pub(crate) struct Relatives {
    left: Option<SideRef>,
    right: Option<SideRef>,
}

#[derive(Clone, Copy)]
struct SideRef {
    /// The neighbouring node at the same level.
    node: Handle,
    /// Ancestor internal holding the separator between us and `node`.
    anchor: Handle,
    /// Index of that separator in `anchor`'s ring.
    anchor_index: usize,
    /// True when `node` shares our direct parent.
    same_parent: bool,
}

/// Mutable record threaded through the insert descent. The key, argument,
/// and callbacks are consumed at the leaf; `added`/`mutated` travel back up.
struct UpsertArgs<K, A, FA, FU> {
    key: Option<K>,
    arg: Option<A>,
    add: Option<FA>,
    update: Option<FU>,
    added: bool,
    mutated: bool,
}

impl<K, A, FA, FU> UpsertArgs<K, A, FA, FU> {
    fn key(&self) -> &K {
        self.key.as_ref().expect("`UpsertArgs` - key already consumed!")
    }
}

/// Mutable record threaded through the remove descent.
struct RemoveArgs<'q, Q: ?Sized, K, V> {
    key: &'q Q,
    removed: Option<(K, V)>,
}

impl<K, V> RawTree<K, V> {
    pub(crate) const fn new(internal_cap: usize, leaf_cap: usize) -> Self {
        Self {
            nodes: Arena::new(),
            root: None,
            head: None,
            tail: None,
            height: 0,
            len: 0,
            version: 0,
            internal_cap,
            leaf_cap,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn height(&self) -> usize {
        self.height
    }

    pub(crate) const fn version(&self) -> u64 {
        self.version
    }

    pub(crate) const fn internal_capacity(&self) -> usize {
        self.internal_cap
    }

    pub(crate) const fn leaf_capacity(&self) -> usize {
        self.leaf_cap
    }

    pub(crate) const fn head(&self) -> Option<Handle> {
        self.head
    }

    pub(crate) const fn tail(&self) -> Option<Handle> {
        self.tail
    }

    pub(crate) fn leaf(&self, handle: Handle) -> &LeafNode<K, V> {
        self.nodes.get(handle).as_leaf()
    }

    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Drops all entries. Still counts as a mutation, even on an empty tree,
    /// so outstanding cursors are invalidated.
    pub(crate) fn clear(&mut self) {
        self.reset_structure();
        self.bump_version();
    }

    fn reset_structure(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.head = None;
        self.tail = None;
        self.height = 0;
        self.len = 0;
    }

    /// Moves every entry into a vector by walking the leaf chain; O(n), no
    /// rebalancing. Leaves the tree empty.
    pub(crate) fn drain_to_vec(&mut self) -> Vec<(K, V)> {
        let mut result = Vec::with_capacity(self.len);
        let mut current = self.head;
        while let Some(handle) = current {
            let leaf = self.nodes.get_mut(handle).as_leaf_mut();
            current = leaf.next();
            while let Some(entry) = leaf.pop_first() {
                result.push(entry);
            }
        }
        self.reset_structure();
        self.bump_version();
        result
    }
}

impl<K: Ord + Clone, V> RawTree<K, V> {
    /// Descends to the leaf whose key range covers `key`.
    fn descend_to_leaf<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.route(key)),
                Node::Leaf(_) => return Some(current),
            }
        }
    }

    /// Point lookup; returns the leaf and entry index on a hit.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let handle = self.descend_to_leaf(key)?;
        match self.nodes.get(handle).as_leaf().search(key) {
            Ok(index) => Some((handle, index)),
            Err(_) => None,
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (handle, index) = self.search(key)?;
        Some(self.nodes.get(handle).as_leaf().value(index))
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (handle, index) = self.search(key)?;
        Some(self.nodes.get_mut(handle).as_leaf_mut().value_mut(index))
    }

    pub(crate) fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (handle, index) = self.search(key)?;
        Some(self.nodes.get(handle).as_leaf().entry(index))
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.search(key).is_some()
    }

    /// The value at the key's insertion point, clamped to the covering
    /// leaf's last entry when the key sorts past everything in it.
    pub(crate) fn next_nearest<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let handle = self.descend_to_leaf(key)?;
        let leaf = self.nodes.get(handle).as_leaf();
        let index = match leaf.search(key) {
            Ok(index) => index,
            Err(index) => index.min(leaf.len() - 1),
        };
        Some(leaf.value(index))
    }

    pub(crate) fn first(&self) -> Option<(&K, &V)> {
        let leaf = self.nodes.get(self.head?).as_leaf();
        Some(leaf.entry(0))
    }

    pub(crate) fn last(&self) -> Option<(&K, &V)> {
        let leaf = self.nodes.get(self.tail?).as_leaf();
        Some(leaf.entry(leaf.len() - 1))
    }

    /// First position with key `>= key`.
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let handle = self.descend_to_leaf(key)?;
        let leaf = self.nodes.get(handle).as_leaf();
        match leaf.search(key) {
            Ok(index) => Some((handle, index)),
            Err(index) if index < leaf.len() => Some((handle, index)),
            Err(_) => leaf.next().map(|next| (next, 0)),
        }
    }

    /// First position with key `> key`.
    pub(crate) fn upper_bound<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let handle = self.descend_to_leaf(key)?;
        let leaf = self.nodes.get(handle).as_leaf();
        let index = match leaf.search(key) {
            Ok(index) => index + 1,
            Err(index) => index,
        };
        if index < leaf.len() {
            Some((handle, index))
        } else {
            leaf.next().map(|next| (next, 0))
        }
    }

    /// Last position with key `<= key`.
    pub(crate) fn upper_bound_inclusive<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let handle = self.descend_to_leaf(key)?;
        let leaf = self.nodes.get(handle).as_leaf();
        match leaf.search(key) {
            Ok(index) => Some((handle, index)),
            Err(index) if index > 0 => Some((handle, index - 1)),
            Err(_) => {
                let prev = leaf.prev()?;
                let prev_leaf = self.nodes.get(prev).as_leaf();
                Some((prev, prev_leaf.len() - 1))
            }
        }
    }

    /// Last position with key `< key`.
    pub(crate) fn lower_bound_exclusive<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let handle = self.descend_to_leaf(key)?;
        let leaf = self.nodes.get(handle).as_leaf();
        let index = match leaf.search(key) {
            Ok(index) | Err(index) => index,
        };
        if index > 0 {
            Some((handle, index - 1))
        } else {
            let prev = leaf.prev()?;
            let prev_leaf = self.nodes.get(prev).as_leaf();
            Some((prev, prev_leaf.len() - 1))
        }
    }

    /// Single insert path behind the whole upsert family.
    ///
    /// On a miss, `add` builds the value and the entry is inserted; on a hit,
    /// `update` may mutate the stored value in place and reports whether it
    /// did. Returns true iff a new key was inserted. The version is bumped
    /// for insertions and for updates that report a mutation, so a strict
    /// insert that hits a duplicate leaves the tree untouched.
    pub(crate) fn upsert<A, FA, FU>(&mut self, key: K, arg: A, add: FA, update: FU) -> bool
    where
        FA: FnOnce(&K, A) -> V,
        FU: FnOnce(&K, A, &mut V) -> bool,
    {
        let Some(root) = self.root else {
            let value = add(&key, arg);
            let mut leaf = LeafNode::new(self.leaf_cap);
            leaf.push_last(key, value);
            let handle = self.nodes.alloc(Node::Leaf(leaf));
            self.root = Some(handle);
            self.head = Some(handle);
            self.tail = Some(handle);
            self.height = 1;
            self.len = 1;
            self.bump_version();
            return true;
        };

        // Append/prepend fast paths against the edge leaves.
        let tail = self.tail.expect("`RawTree` - non-empty tree has no tail!");
        let tail_leaf = self.nodes.get(tail).as_leaf();
        let tail_ordering = key.cmp(tail_leaf.last_key().expect("`RawTree` - leaf is empty!"));
        match tail_ordering {
            Ordering::Greater => {
                if !tail_leaf.is_full() {
                    let value = add(&key, arg);
                    self.nodes.get_mut(tail).as_leaf_mut().push_last(key, value);
                    self.len += 1;
                    self.bump_version();
                    return true;
                }
            }
            Ordering::Equal => {
                return self.update_in_place(tail, usize::MAX, arg, update);
            }
            Ordering::Less => {
                let head = self.head.expect("`RawTree` - non-empty tree has no head!");
                let head_leaf = self.nodes.get(head).as_leaf();
                match key.cmp(head_leaf.first_key().expect("`RawTree` - leaf is empty!")) {
                    Ordering::Less if !head_leaf.is_full() => {
                        let value = add(&key, arg);
                        self.nodes.get_mut(head).as_leaf_mut().push_first(key, value);
                        self.len += 1;
                        self.bump_version();
                        return true;
                    }
                    Ordering::Equal => {
                        return self.update_in_place(head, 0, arg, update);
                    }
                    _ => {}
                }
            }
        }

        let mut args = UpsertArgs {
            key: Some(key),
            arg: Some(arg),
            add: Some(add),
            update: Some(update),
            added: false,
            mutated: false,
        };
        if let Some(promotion) = self.upsert_in(root, &mut args, Relatives::default()) {
            let mut new_root = InternalNode::new(self.internal_cap, root);
            new_root.items_mut().push_last(promotion);
            self.root = Some(self.nodes.alloc(Node::Internal(new_root)));
            self.height += 1;
        }
        if args.added {
            self.len += 1;
        }
        if args.added || args.mutated {
            self.bump_version();
        }
        args.added
    }

    /// Runs `update` against one existing entry; `usize::MAX` means the
    /// leaf's last entry. Returns false (nothing added).
    fn update_in_place<A, FU>(&mut self, handle: Handle, index: usize, arg: A, update: FU) -> bool
    where
        FU: FnOnce(&K, A, &mut V) -> bool,
    {
        let leaf = self.nodes.get_mut(handle).as_leaf_mut();
        let index = index.min(leaf.len() - 1);
        let entry = &mut leaf.entries_mut()[index];
        if update(&entry.0, arg, &mut entry.1) {
            self.bump_version();
        }
        false
    }

    fn upsert_in<A, FA, FU>(
        &mut self,
        node: Handle,
        args: &mut UpsertArgs<K, A, FA, FU>,
        rel: Relatives,
    ) -> Option<Separator<K>>
    where
        FA: FnOnce(&K, A) -> V,
        FU: FnOnce(&K, A, &mut V) -> bool,
    {
        if self.nodes.get(node).is_leaf() {
            self.upsert_leaf(node, args, rel)
        } else {
            let internal = self.nodes.get(node).as_internal();
            let slot = internal.route(args.key());
            let child = internal.child(slot);
            let child_rel = self.child_relatives(node, slot, rel);
            let promotion = self.upsert_in(child, args, child_rel)?;
            self.place_promotion(node, slot, promotion, rel)
        }
    }

    /// Computes the [`Relatives`] of the child in `slot`. An edge child
    /// inherits a cousin through the parent's own relatives.
    fn child_relatives(&self, parent: Handle, slot: usize, rel: Relatives) -> Relatives {
        let internal = self.nodes.get(parent).as_internal();
        let left = if slot > 0 {
            Some(SideRef {
                node: internal.child(slot - 1),
                anchor: parent,
                anchor_index: slot - 1,
                same_parent: true,
            })
        } else {
            rel.left.map(|side| SideRef {
                node: self.nodes.get(side.node).as_internal().last_child(),
                anchor: side.anchor,
                anchor_index: side.anchor_index,
                same_parent: false,
            })
        };
        let right = if slot < internal.len() {
            Some(SideRef {
                node: internal.child(slot + 1),
                anchor: parent,
                anchor_index: slot,
                same_parent: true,
            })
        } else {
            rel.right.map(|side| SideRef {
                node: self.nodes.get(side.node).as_internal().child(0),
                anchor: side.anchor,
                anchor_index: side.anchor_index,
                same_parent: false,
            })
        };
        Relatives { left, right }
    }

    fn upsert_leaf<A, FA, FU>(
        &mut self,
        node: Handle,
        args: &mut UpsertArgs<K, A, FA, FU>,
        rel: Relatives,
    ) -> Option<Separator<K>>
    where
        FA: FnOnce(&K, A) -> V,
        FU: FnOnce(&K, A, &mut V) -> bool,
    {
        let leaf = self.nodes.get_mut(node).as_leaf_mut();
        match leaf.search(args.key()) {
            Ok(index) => {
                let update = args.update.take().expect("`UpsertArgs` - update already consumed!");
                let arg = args.arg.take().expect("`UpsertArgs` - arg already consumed!");
                let entry = &mut leaf.entries_mut()[index];
                args.mutated = update(&entry.0, arg, &mut entry.1);
                args.added = false;
                None
            }
            Err(index) => {
                let add = args.add.take().expect("`UpsertArgs` - add already consumed!");
                let arg = args.arg.take().expect("`UpsertArgs` - arg already consumed!");
                let key = args.key.take().expect("`UpsertArgs` - key already consumed!");
                let value = add(&key, arg);
                args.added = true;
                args.mutated = true;
                self.insert_leaf_entry(node, index, key, value, rel)
            }
        }
    }

    /// Places a new entry into a leaf: direct insert when there is room,
    /// then a spill to a non-full neighbour, then a split.
    fn insert_leaf_entry(
        &mut self,
        node: Handle,
        index: usize,
        key: K,
        value: V,
        rel: Relatives,
    ) -> Option<Separator<K>> {
        let leaf = self.nodes.get_mut(node).as_leaf_mut();
        if !leaf.is_full() {
            leaf.insert(index, key, value);
            return None;
        }

        // Spill left: the displaced first entry moves to the end of the
        // previous leaf, and the separator between the two becomes this
        // leaf's new first key.
        if let Some(left) = rel.left
            && !self.nodes.get(left.node).as_leaf().is_full()
        {
            debug_assert_eq!(self.nodes.get(node).as_leaf().prev(), Some(left.node));
            let leaf = self.nodes.get_mut(node).as_leaf_mut();
            let displaced = leaf.entries_mut().insert_pop_first(index, (key, value));
            let new_first = leaf.first_key().expect("`RawTree` - leaf is empty!").clone();
            self.nodes.get_mut(left.node).as_leaf_mut().entries_mut().push_last(displaced);
            self.nodes.get_mut(left.anchor).as_internal_mut().set_key(left.anchor_index, new_first);
            return None;
        }

        // Spill right: the displaced last entry (or the new entry itself,
        // when it sorts past everything here) becomes the next leaf's first,
        // and the separator over there follows it.
        if let Some(right) = rel.right
            && !self.nodes.get(right.node).as_leaf().is_full()
        {
            debug_assert_eq!(self.nodes.get(node).as_leaf().next(), Some(right.node));
            let leaf = self.nodes.get_mut(node).as_leaf_mut();
            let displaced = leaf.entries_mut().insert_pop_last(index, (key, value));
            let anchor_key = displaced.0.clone();
            self.nodes.get_mut(right.node).as_leaf_mut().entries_mut().push_first(displaced);
            self.nodes.get_mut(right.anchor).as_internal_mut().set_key(right.anchor_index, anchor_key);
            return None;
        }

        // Split. The left half keeps ceil(cap/2) entries; the new entry goes
        // to whichever half owns its index, with the boundary index opening
        // the right half.
        let leaf = self.nodes.get_mut(node).as_leaf_mut();
        let mut right_leaf = leaf.split_right();
        let pivot = leaf.len();
        if index < pivot {
            if leaf.is_full() {
                // Only reachable at capacity 1: make room by demoting the
                // left half's last entry to the right half.
                let (k, v) = leaf.pop_last().expect("`RawTree` - leaf is empty!");
                right_leaf.push_first(k, v);
            }
            leaf.insert(index, key, value);
        } else {
            right_leaf.insert(index - pivot, key, value);
        }

        let promoted_key = right_leaf.first_key().expect("`RawTree` - split produced an empty leaf!").clone();
        let old_next = leaf.next();
        right_leaf.set_prev(Some(node));
        right_leaf.set_next(old_next);
        let right_handle = self.nodes.alloc(Node::Leaf(right_leaf));
        self.nodes.get_mut(node).as_leaf_mut().set_next(Some(right_handle));
        if let Some(next) = old_next {
            self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(right_handle));
        }
        if self.tail == Some(node) {
            self.tail = Some(right_handle);
        }
        Some(Separator {
            key: promoted_key,
            child: right_handle,
        })
    }

    /// Places a promoted separator into an internal node, spilling to a
    /// neighbour or splitting when full. The new separator's index equals
    /// the child slot the promotion came from.
    fn place_promotion(
        &mut self,
        node: Handle,
        slot: usize,
        promotion: Separator<K>,
        rel: Relatives,
    ) -> Option<Separator<K>> {
        let internal = self.nodes.get_mut(node).as_internal_mut();
        if !internal.is_full() {
            internal.items_mut().insert(slot, promotion);
            return None;
        }

        // Spill left. Three keys rotate coherently through the shared
        // ancestor: the displaced separator's child becomes our left-most
        // child, our old left-most child re-anchors in the sibling under the
        // old ancestor key, and the displaced key replaces the ancestor key.
        if let Some(left) = rel.left
            && !self.nodes.get(left.node).as_internal().is_full()
        {
            let internal = self.nodes.get_mut(node).as_internal_mut();
            let mut displaced = internal.items_mut().insert_pop_first(slot, promotion);
            core::mem::swap(internal.left_mut(), &mut displaced.child);
            let anchor = self.nodes.get_mut(left.anchor).as_internal_mut();
            core::mem::swap(&mut anchor.items_mut()[left.anchor_index].key, &mut displaced.key);
            self.nodes.get_mut(left.node).as_internal_mut().items_mut().push_last(displaced);
            return None;
        }

        // Spill right: mirror image against the right sibling's left-most
        // child and the right ancestor's separator.
        if let Some(right) = rel.right
            && !self.nodes.get(right.node).as_internal().is_full()
        {
            let internal = self.nodes.get_mut(node).as_internal_mut();
            let mut displaced = internal.items_mut().insert_pop_last(slot, promotion);
            let sibling = self.nodes.get_mut(right.node).as_internal_mut();
            core::mem::swap(sibling.left_mut(), &mut displaced.child);
            let anchor = self.nodes.get_mut(right.anchor).as_internal_mut();
            core::mem::swap(&mut anchor.items_mut()[right.anchor_index].key, &mut displaced.key);
            self.nodes.get_mut(right.node).as_internal_mut().items_mut().push_first(displaced);
            return None;
        }

        // Split around a promoted middle: its key travels up, its child
        // becomes the new right node's left-most child.
        let internal = self.nodes.get_mut(node).as_internal_mut();
        let mut right_items = internal.split_right();
        let pivot = internal.len();
        let middle = match slot.cmp(&pivot) {
            Ordering::Less => {
                let displaced = internal.items_mut().pop_last().expect("`RawTree` - split left half is empty!");
                internal.items_mut().insert(slot, promotion);
                displaced
            }
            Ordering::Equal => promotion,
            Ordering::Greater => {
                let displaced = right_items.pop_first().expect("`RawTree` - split right half is empty!");
                right_items.insert(slot - pivot - 1, promotion);
                displaced
            }
        };
        let right_node = InternalNode::from_parts(middle.child, right_items);
        let right_handle = self.nodes.alloc(Node::Internal(right_node));
        Some(Separator {
            key: middle.key,
            child: right_handle,
        })
    }

    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.remove_entry(key).map(|(_, value)| value)
    }

    pub(crate) fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let root = self.root?;
        let head = self.head.expect("`RawTree` - non-empty tree has no head!");
        let tail = self.tail.expect("`RawTree` - non-empty tree has no tail!");

        // A key at or below the head leaf's range either lives there or is
        // absent; no ancestor separator names the head's first key, so the
        // removal is O(1) while the leaf stays half-full.
        let head_leaf = self.nodes.get(head).as_leaf();
        if key <= head_leaf.last_key().expect("`RawTree` - leaf is empty!").borrow() {
            let Ok(index) = head_leaf.search(key) else {
                return None;
            };
            if head_leaf.len() > head_leaf.min_len() || root == head {
                return Some(self.remove_resolved(head, index));
            }
        } else if key >= self.nodes.get(tail).as_leaf().first_key().expect("`RawTree` - leaf is empty!").borrow() {
            // Same at the tail, except removing the tail's first entry would
            // require re-anchoring a separator, which needs the descent.
            let tail_leaf = self.nodes.get(tail).as_leaf();
            let Ok(index) = tail_leaf.search(key) else {
                return None;
            };
            if index > 0 && (tail_leaf.len() > tail_leaf.min_len() || root == tail) {
                return Some(self.remove_resolved(tail, index));
            }
        }

        let mut args = RemoveArgs { key, removed: None };
        let merged = self.remove_in(root, &mut args, Relatives::default());
        debug_assert!(!merged, "root reported a merge");
        let entry = args.removed?;
        self.len -= 1;
        if self.len == 0 {
            self.reset_structure();
        } else if let Node::Internal(internal) = self.nodes.get(root)
            && internal.len() == 0
        {
            // The root lost its last separator: promote its only child.
            let child = internal.left();
            self.nodes.free(root);
            self.root = Some(child);
            self.height -= 1;
        }
        self.bump_version();
        Some(entry)
    }

    /// Edge-leaf removal that is known not to unbalance the tree.
    fn remove_resolved(&mut self, handle: Handle, index: usize) -> (K, V) {
        let entry = self.nodes.get_mut(handle).as_leaf_mut().remove(index);
        self.len -= 1;
        if self.len == 0 {
            self.reset_structure();
        }
        self.bump_version();
        entry
    }

    pub(crate) fn pop_first(&mut self) -> Option<(K, V)> {
        let head = self.head?;
        let leaf = self.nodes.get(head).as_leaf();
        if leaf.len() > leaf.min_len() || self.root == Some(head) {
            return Some(self.remove_resolved(head, 0));
        }
        // The head would underflow; take the slow path on its first key.
        let key = leaf.first_key().expect("`RawTree` - leaf is empty!").clone();
        self.remove_entry(&key)
    }

    pub(crate) fn pop_last(&mut self) -> Option<(K, V)> {
        let tail = self.tail?;
        let leaf = self.nodes.get(tail).as_leaf();
        if leaf.len() > leaf.min_len() || self.root == Some(tail) {
            return Some(self.remove_resolved(tail, leaf.len() - 1));
        }
        let key = leaf.last_key().expect("`RawTree` - leaf is empty!").clone();
        self.remove_entry(&key)
    }

    /// Returns true when this node merged with a true sibling and the caller
    /// must delete the corresponding separator.
    fn remove_in<Q>(&mut self, node: Handle, args: &mut RemoveArgs<'_, Q, K, V>, rel: Relatives) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        if self.nodes.get(node).is_leaf() {
            self.remove_leaf(node, args, rel)
        } else {
            self.remove_internal(node, args, rel)
        }
    }

    fn remove_leaf<Q>(&mut self, node: Handle, args: &mut RemoveArgs<'_, Q, K, V>, rel: Relatives) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf = self.nodes.get_mut(node).as_leaf_mut();
        let Ok(index) = leaf.search(args.key) else {
            return false;
        };
        args.removed = Some(leaf.remove(index));

        // Removing the smallest key makes the left-anchor separator stale;
        // re-point it at the new first key to keep separator identity.
        if index == 0
            && let Some(first) = self.nodes.get(node).as_leaf().first_key()
            && let Some(left) = rel.left
        {
            let first = first.clone();
            self.nodes.get_mut(left.anchor).as_internal_mut().set_key(left.anchor_index, first);
        }

        if !self.nodes.get(node).as_leaf().is_underfull() || self.root == Some(node) {
            return false;
        }

        // Borrow from the previous leaf: its last entry becomes our first,
        // and the separator between us takes the borrowed key.
        if let Some(left) = rel.left
            && self.nodes.get(left.node).as_leaf().can_lend()
        {
            let (key, value) = self.nodes.get_mut(left.node).as_leaf_mut().pop_last().expect("`RawTree` - lender is empty!");
            let anchor_key = key.clone();
            self.nodes.get_mut(node).as_leaf_mut().push_first(key, value);
            self.nodes.get_mut(left.anchor).as_internal_mut().set_key(left.anchor_index, anchor_key);
            return false;
        }

        // Borrow from the next leaf: its first entry becomes our last, and
        // the separator over there follows its new first key.
        if let Some(right) = rel.right
            && self.nodes.get(right.node).as_leaf().can_lend()
        {
            let (key, value) = self.nodes.get_mut(right.node).as_leaf_mut().pop_first().expect("`RawTree` - lender is empty!");
            let anchor_key = self.nodes.get(right.node).as_leaf().first_key().expect("`RawTree` - leaf is empty!").clone();
            self.nodes.get_mut(node).as_leaf_mut().push_last(key, value);
            self.nodes.get_mut(right.anchor).as_internal_mut().set_key(right.anchor_index, anchor_key);
            // The removal may have emptied this leaf, making the borrowed
            // entry its new minimum.
            self.refresh_left_anchor(node, rel);
            return false;
        }

        // Merge with a true sibling; the chain is spliced before the parent
        // drops the separator so no reachable link dangles.
        if let Some(left) = rel.left
            && left.same_parent
        {
            let removed = match self.nodes.take(node) {
                Node::Leaf(leaf) => leaf,
                Node::Internal(_) => panic!("expected leaf node"),
            };
            let target = self.nodes.get_mut(left.node).as_leaf_mut();
            target.merge_with_right(removed);
            let next = target.next();
            if let Some(next) = next {
                self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(left.node));
            }
            if self.tail == Some(node) {
                self.tail = Some(left.node);
            }
            true
        } else if let Some(right) = rel.right
            && right.same_parent
        {
            let removed = match self.nodes.take(right.node) {
                Node::Leaf(leaf) => leaf,
                Node::Internal(_) => panic!("expected leaf node"),
            };
            let target = self.nodes.get_mut(node).as_leaf_mut();
            target.merge_with_right(removed);
            let next = target.next();
            if let Some(next) = next {
                self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(node));
            }
            if self.tail == Some(right.node) {
                self.tail = Some(node);
            }
            // If the removal emptied this leaf, its minimum is now the
            // absorbed sibling's first key.
            self.refresh_left_anchor(node, rel);
            true
        } else {
            false
        }
    }

    /// Re-points the separator between `node` and its left neighbour at the
    /// leaf's current first key. A no-op unless the two drifted apart
    /// (which only happens when a removal emptied the leaf before a borrow
    /// or merge refilled it).
    fn refresh_left_anchor(&mut self, node: Handle, rel: Relatives) {
        if let Some(left) = rel.left {
            let first = self.nodes.get(node).as_leaf().first_key().expect("`RawTree` - leaf is empty!").clone();
            self.nodes.get_mut(left.anchor).as_internal_mut().set_key(left.anchor_index, first);
        }
    }

    fn remove_internal<Q>(&mut self, node: Handle, args: &mut RemoveArgs<'_, Q, K, V>, rel: Relatives) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let internal = self.nodes.get(node).as_internal();
        let slot = internal.route(args.key);
        let child = internal.child(slot);
        let child_rel = self.child_relatives(node, slot, rel);
        if !self.remove_in(child, args, child_rel) {
            return false;
        }

        // The child merged: slot 0 absorbed its right sibling, any other
        // slot folded itself into its left sibling. Either way the separator
        // owning the vanished node sits at slot - 1, clamped to 0.
        let internal = self.nodes.get_mut(node).as_internal_mut();
        let _ = internal.items_mut().remove(slot.saturating_sub(1));

        if !self.nodes.get(node).as_internal().is_underfull() || self.root == Some(node) {
            return false;
        }

        // Borrow from the left sibling: the same three-key rotation as the
        // insert-side spill, run in reverse.
        if let Some(left) = rel.left
            && self.nodes.get(left.node).as_internal().can_lend()
        {
            let mut popped = self
                .nodes
                .get_mut(left.node)
                .as_internal_mut()
                .items_mut()
                .pop_last()
                .expect("`RawTree` - lender is empty!");
            let internal = self.nodes.get_mut(node).as_internal_mut();
            core::mem::swap(internal.left_mut(), &mut popped.child);
            let anchor = self.nodes.get_mut(left.anchor).as_internal_mut();
            core::mem::swap(&mut anchor.items_mut()[left.anchor_index].key, &mut popped.key);
            self.nodes.get_mut(node).as_internal_mut().items_mut().push_first(popped);
            return false;
        }

        if let Some(right) = rel.right
            && self.nodes.get(right.node).as_internal().can_lend()
        {
            let mut popped = self
                .nodes
                .get_mut(right.node)
                .as_internal_mut()
                .items_mut()
                .pop_first()
                .expect("`RawTree` - lender is empty!");
            let sibling = self.nodes.get_mut(right.node).as_internal_mut();
            core::mem::swap(sibling.left_mut(), &mut popped.child);
            let anchor = self.nodes.get_mut(right.anchor).as_internal_mut();
            core::mem::swap(&mut anchor.items_mut()[right.anchor_index].key, &mut popped.key);
            self.nodes.get_mut(node).as_internal_mut().items_mut().push_last(popped);
            return false;
        }

        // Merge with a true sibling, demoting the ancestor separator key to
        // re-anchor the absorbed node's left-most child.
        if let Some(left) = rel.left
            && left.same_parent
        {
            let removed = match self.nodes.take(node) {
                Node::Internal(internal) => internal,
                Node::Leaf(_) => panic!("expected internal node"),
            };
            let demoted = self.nodes.get(left.anchor).as_internal().key(left.anchor_index).clone();
            self.nodes.get_mut(left.node).as_internal_mut().merge_with_right(demoted, removed);
            true
        } else if let Some(right) = rel.right
            && right.same_parent
        {
            let removed = match self.nodes.take(right.node) {
                Node::Internal(internal) => internal,
                Node::Leaf(_) => panic!("expected internal node"),
            };
            let demoted = self.nodes.get(right.anchor).as_internal().key(right.anchor_index).clone();
            self.nodes.get_mut(node).as_internal_mut().merge_with_right(demoted, removed);
            true
        } else {
            false
        }
    }

    // ─── Bulk-loading support (used by `TreeBuilder`) ────────────────────

    /// Seeds an empty tree with its first bulk-loaded entry and returns the
    /// leaf under construction. The head is final from this moment.
    pub(crate) fn bulk_start(&mut self, key: K, value: V) -> Handle {
        debug_assert!(self.root.is_none() && self.len == 0);
        let mut leaf = LeafNode::new(self.leaf_cap);
        leaf.push_last(key, value);
        let handle = self.nodes.alloc(Node::Leaf(leaf));
        self.head = Some(handle);
        self.height = 1;
        self.len = 1;
        handle
    }

    /// Appends an entry known to sort after everything loaded so far.
    /// Returns the leaf now under construction; a new handle means a new
    /// leaf was chained on and must join the builder's worklist.
    pub(crate) fn bulk_push(&mut self, current: Handle, key: K, value: V) -> Handle {
        if !self.nodes.get(current).as_leaf().is_full() {
            self.nodes.get_mut(current).as_leaf_mut().push_last(key, value);
            self.len += 1;
            return current;
        }
        let mut leaf = LeafNode::new(self.leaf_cap);
        leaf.push_last(key, value);
        leaf.set_prev(Some(current));
        let handle = self.nodes.alloc(Node::Leaf(leaf));
        self.nodes.get_mut(current).as_leaf_mut().set_next(Some(handle));
        self.len += 1;
        handle
    }

    /// Compares a candidate key against the last bulk-loaded one.
    pub(crate) fn bulk_compare(&self, current: Handle, key: &K) -> Ordering {
        key.cmp(self.nodes.get(current).as_leaf().last_key().expect("`RawTree` - leaf is empty!"))
    }

    /// Applies `update` to the most recently loaded entry.
    pub(crate) fn bulk_update_last<A, FU>(&mut self, current: Handle, arg: A, update: FU) -> bool
    where
        FU: FnOnce(&K, A, &mut V) -> bool,
    {
        let leaf = self.nodes.get_mut(current).as_leaf_mut();
        let index = leaf.len() - 1;
        let entry = &mut leaf.entries_mut()[index];
        update(&entry.0, arg, &mut entry.1)
    }

    /// Builds the internal levels over the loaded leaves and commits root,
    /// tail, and height. `worklist` holds the handles of every leaf in
    /// chain order; levels under construction are queued behind `None`
    /// markers in the same ring.
    pub(crate) fn bulk_finish(&mut self, worklist: &mut RingArray<Option<Handle>>) {
        if self.head.is_none() {
            self.bump_version();
            return;
        }
        if worklist.len() == 1 {
            let only = worklist.pop_first().flatten().expect("`RawTree` - worklist entry is a marker!");
            self.root = Some(only);
            self.tail = Some(only);
            self.height = 1;
            self.bump_version();
            return;
        }

        // Top up the last leaf from its neighbour until it is half-full;
        // with at least two leaves the neighbour can always afford it.
        let last = worklist.last().copied().flatten().expect("`RawTree` - worklist entry is a marker!");
        while self.nodes.get(last).as_leaf().is_underfull() {
            let prev = self.nodes.get(last).as_leaf().prev().expect("`RawTree` - lone leaf is underfull!");
            let (key, value) = self.nodes.get_mut(prev).as_leaf_mut().pop_last().expect("`RawTree` - lender is empty!");
            self.nodes.get_mut(last).as_leaf_mut().push_first(key, value);
        }

        // Produce internals level by level until a level holds one node.
        let mut height = 1;
        worklist.push_last(None);
        let root = loop {
            height += 1;
            let mut produced = 0usize;
            let mut current: Option<Handle> = None;
            while let Some(slot) = worklist.pop_first() {
                let Some(child) = slot else {
                    break; // level marker
                };
                match current {
                    None => {
                        let internal = InternalNode::new(self.internal_cap, child);
                        current = Some(self.nodes.alloc(Node::Internal(internal)));
                    }
                    Some(handle) if self.nodes.get(handle).as_internal().is_full() => {
                        worklist.push_last(Some(handle));
                        produced += 1;
                        let internal = InternalNode::new(self.internal_cap, child);
                        current = Some(self.nodes.alloc(Node::Internal(internal)));
                    }
                    Some(handle) => {
                        let key = self.subtree_first_key(child).clone();
                        self.nodes.get_mut(handle).as_internal_mut().items_mut().push_last(Separator { key, child });
                    }
                }
            }
            let handle = current.expect("`RawTree` - level produced no nodes!");

            // The trailing internal may be underfull; rotate separators in
            // from its left neighbour until it is not.
            if produced > 0 {
                while self.nodes.get(handle).as_internal().is_underfull() {
                    let left = worklist.last().copied().flatten().expect("`RawTree` - worklist entry is a marker!");
                    let popped = self
                        .nodes
                        .get_mut(left)
                        .as_internal_mut()
                        .items_mut()
                        .pop_last()
                        .expect("`RawTree` - lender is empty!");
                    let old_left = self.nodes.get(handle).as_internal().left();
                    let key = self.subtree_first_key(old_left).clone();
                    let internal = self.nodes.get_mut(handle).as_internal_mut();
                    internal.items_mut().push_first(Separator { key, child: old_left });
                    internal.set_left(popped.child);
                }
            }

            worklist.push_last(Some(handle));
            produced += 1;
            if produced == 1 {
                break handle;
            }
            worklist.push_last(None);
        };

        self.root = Some(root);
        self.height = height;

        // The tail is the right-most leaf under the new root.
        let mut current = root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.last_child(),
                Node::Leaf(_) => break,
            }
        }
        self.tail = Some(current);
        self.bump_version();
    }

    /// Smallest key under `handle`, found by walking left-most children.
    fn subtree_first_key(&self, handle: Handle) -> &K {
        let mut current = handle;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.left(),
                Node::Leaf(leaf) => return leaf.first_key().expect("`RawTree` - leaf is empty!"),
            }
        }
    }
}

impl<K: Clone, V: Clone> Clone for RawTree<K, V> {
    fn clone(&self) -> Self {
        // Handles are arena indices, so a slot-for-slot copy of the arena
        // preserves the whole structure, free list included.
        Self {
            nodes: self.nodes.clone(),
            root: self.root,
            head: self.head,
            tail: self.tail,
            height: self.height,
            len: self.len,
            version: self.version,
            internal_cap: self.internal_cap,
            leaf_cap: self.leaf_cap,
        }
    }
}
