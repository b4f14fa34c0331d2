use thiserror::Error;

/// Recoverable failures reported by [`RingTreeMap`](crate::RingTreeMap) and
/// [`Cursor`](crate::Cursor).
///
/// Contract violations (out-of-range ring indices, mutating a constrained
/// [`RingArray`](crate::RingArray), capacities below the minimum) are
/// programming errors and panic instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum TreeError {
    /// A strict [`insert`](crate::RingTreeMap::insert) found the key already
    /// present. The map is unchanged.
    #[error("key is already present in the map")]
    DuplicateKey,
    /// A [`Cursor`](crate::Cursor) was stepped after the map was mutated.
    /// The cursor is permanently invalidated.
    #[error("map was mutated while a cursor was iterating it")]
    ConcurrentModification,
}
