use core::marker::PhantomData;

use crate::TreeError;
use crate::raw::Handle;

use super::RingTreeMap;

/// A detached, version-checked iterator over a [`RingTreeMap`].
///
/// A cursor holds no borrow of its map; every [`next`](Cursor::next) call is
/// handed the map again, and first compares the version snapshot taken at
/// creation against the map's current one. Any mutation in between - an
/// insert, a removal, an in-place update, or a `clear` - makes every
/// subsequent step fail with [`TreeError::ConcurrentModification`].
///
/// A cursor must only be handed back to the map that created it; positions
/// are meaningless in any other map.
///
/// # Examples
///
/// ```
/// use ring_tree::{RingTreeMap, TreeError};
///
/// let mut map: RingTreeMap<i32, char> = [(1, 'a'), (2, 'b'), (3, 'c')].into();
///
/// let mut cursor = map.cursor_reverse_from(&2);
/// assert_eq!(cursor.next(&map), Ok(Some((&2, &'b'))));
/// assert_eq!(cursor.next(&map), Ok(Some((&1, &'a'))));
/// assert_eq!(cursor.next(&map), Ok(None));
///
/// // Mutating the map invalidates an in-flight cursor.
/// let mut cursor = map.cursor_forward();
/// map.remove(&3);
/// assert_eq!(cursor.next(&map), Err(TreeError::ConcurrentModification));
/// ```
#[must_use = "cursors do nothing unless stepped"]
pub struct Cursor<K, V> {
    /// Leaf and entry index of the next entry to yield; `None` = exhausted.
    position: Option<(Handle, usize)>,
    /// The map version this cursor was created against.
    version: u64,
    forward: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Cursor<K, V> {
    pub(crate) fn new(position: Option<(Handle, usize)>, version: u64, forward: bool) -> Self {
        Self {
            position,
            version,
            forward,
            _marker: PhantomData,
        }
    }

    /// Yields the entry under the cursor and steps once in the cursor's
    /// direction. `Ok(None)` marks the end of the walk.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::ConcurrentModification`] if `map` has been
    /// mutated since the cursor was created.
    pub fn next<'a>(&mut self, map: &'a RingTreeMap<K, V>) -> Result<Option<(&'a K, &'a V)>, TreeError> {
        if self.version != map.raw.version() {
            return Err(TreeError::ConcurrentModification);
        }
        let Some((handle, index)) = self.position else {
            return Ok(None);
        };
        let leaf = map.raw.leaf(handle);
        let entry = leaf.entry(index);
        self.position = if self.forward {
            if index + 1 < leaf.len() {
                Some((handle, index + 1))
            } else {
                leaf.next().map(|next| (next, 0))
            }
        } else if index > 0 {
            Some((handle, index - 1))
        } else {
            leaf.prev().map(|prev| (prev, map.raw.leaf(prev).len() - 1))
        };
        Ok(Some(entry))
    }
}
