//! A B+ tree map built on ring-buffer nodes.
//!
//! This crate provides [`RingTreeMap`], an in-memory ordered map with a few
//! capabilities the standard library's `BTreeMap` does not have:
//!
//! - **Flexible upserts** - [`insert`](RingTreeMap::insert) (strict, fails on
//!   duplicates), [`insert_if_absent`](RingTreeMap::insert_if_absent),
//!   [`insert_or_replace`](RingTreeMap::insert_or_replace),
//!   [`insert_or_update`](RingTreeMap::insert_or_update), and the fully
//!   general [`upsert`](RingTreeMap::upsert) with lazy value construction.
//! - **Bulk loading** - [`TreeBuilder`] constructs a balanced tree from
//!   ordered input in O(n), and transparently falls back to iterative
//!   insertion the moment the input goes out of order.
//! - **Detached cursors** - [`Cursor`] walks the tree in either direction
//!   without borrowing it, re-validating a version counter on every step so
//!   any interleaved mutation is reported instead of silently misbehaving.
//!
//! # Example
//!
//! ```
//! use ring_tree::RingTreeMap;
//!
//! let mut census = RingTreeMap::new();
//! census.insert("amsterdam", 931_000).unwrap();
//! census.insert("oslo", 717_000).unwrap();
//! census.insert("porto", 248_000).unwrap();
//!
//! // Strict insert refuses duplicates...
//! assert!(census.insert("oslo", 0).is_err());
//! // ...while the upsert family resolves them.
//! census.insert_or_update("oslo", 1_000, |_, delta, pop| *pop += delta);
//! assert_eq!(census.get(&"oslo"), Some(&718_000));
//!
//! // Entries come back in key order, from either end.
//! let cities: Vec<_> = census.keys().copied().collect();
//! assert_eq!(cities, ["amsterdam", "oslo", "porto"]);
//! assert_eq!(census.last(), Some((&"porto", &248_000)));
//! ```
//!
//! # Implementation
//!
//! The map is a B+ tree: all entries live in leaves, leaves form a
//! doubly-linked chain for O(1)-per-step range iteration, and internal nodes
//! hold separator keys that equal the smallest key of their right subtree.
//! Every node's payload is a [`RingArray`], a fixed-capacity circular buffer,
//! so prepends cost the same as appends and rebalancing moves entries from
//! whichever end is cheaper. Insertion spills one entry to a non-full
//! neighbour before splitting; deletion borrows from an over-full neighbour
//! before merging. Both keep nodes fuller than the textbook split-early
//! approach.
//!
//! Node fan-out is a per-tree runtime parameter, which the test suite uses
//! to force structural events with a handful of keys. See
//! [`RingTreeMap::with_order`].

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod builder;
mod error;
mod raw;

pub mod ring_array;
pub mod tree_map;

pub use builder::TreeBuilder;
pub use error::TreeError;
pub use ring_array::{Constraint, RingArray};
pub use tree_map::{Cursor, RingTreeMap};
