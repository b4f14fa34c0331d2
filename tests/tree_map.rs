use std::collections::BTreeMap;

use proptest::prelude::*;
use ring_tree::{RingTreeMap, TreeError};

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 4_000;

/// Keys drawn from a range small enough to force plenty of collisions.
fn key_strategy() -> impl Strategy<Value = i64> {
    -2_000i64..2_000i64
}

fn value_strategy() -> impl Strategy<Value = i64> {
    any::<i64>()
}

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum MapOp {
    InsertStrict(i64, i64),
    InsertIfAbsent(i64, i64),
    InsertOrReplace(i64, i64),
    InsertOrUpdate(i64, i64),
    Remove(i64),
    RemoveEntry(i64),
    Get(i64),
    ContainsKey(i64),
    GetKeyValue(i64),
    First,
    Last,
    PopFirst,
    PopLast,
}

fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    let pair = || (key_strategy(), value_strategy());
    prop_oneof![
        2 => pair().prop_map(|(k, v)| MapOp::InsertStrict(k, v)),
        2 => pair().prop_map(|(k, v)| MapOp::InsertIfAbsent(k, v)),
        3 => pair().prop_map(|(k, v)| MapOp::InsertOrReplace(k, v)),
        2 => pair().prop_map(|(k, v)| MapOp::InsertOrUpdate(k, v)),
        3 => key_strategy().prop_map(MapOp::Remove),
        1 => key_strategy().prop_map(MapOp::RemoveEntry),
        2 => key_strategy().prop_map(MapOp::Get),
        1 => key_strategy().prop_map(MapOp::ContainsKey),
        1 => key_strategy().prop_map(MapOp::GetKeyValue),
        1 => Just(MapOp::First),
        1 => Just(MapOp::Last),
        1 => Just(MapOp::PopFirst),
        1 => Just(MapOp::PopLast),
    ]
}

// ─── Core CRUD operations ────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Replays a random sequence of operations on both RingTreeMap and
    /// BTreeMap and asserts identical results at every step.
    #[test]
    fn map_ops_match_btreemap(ops in proptest::collection::vec(map_op_strategy(), TEST_SIZE)) {
        let mut rt_map: RingTreeMap<i64, i64> = RingTreeMap::new();
        let mut bt_map: BTreeMap<i64, i64> = BTreeMap::new();

        for op in &ops {
            match op {
                MapOp::InsertStrict(k, v) => {
                    let rt_result = rt_map.insert(*k, *v);
                    if bt_map.contains_key(k) {
                        prop_assert_eq!(rt_result, Err(TreeError::DuplicateKey), "insert({}, {})", k, v);
                    } else {
                        prop_assert_eq!(rt_result, Ok(()), "insert({}, {})", k, v);
                        bt_map.insert(*k, *v);
                    }
                }
                MapOp::InsertIfAbsent(k, v) => {
                    let rt_result = rt_map.insert_if_absent(*k, *v);
                    let bt_result = !bt_map.contains_key(k);
                    if bt_result {
                        bt_map.insert(*k, *v);
                    }
                    prop_assert_eq!(rt_result, bt_result, "insert_if_absent({}, {})", k, v);
                }
                MapOp::InsertOrReplace(k, v) => {
                    let rt_result = rt_map.insert_or_replace(*k, *v);
                    let bt_result = bt_map.insert(*k, *v).is_none();
                    prop_assert_eq!(rt_result, bt_result, "insert_or_replace({}, {})", k, v);
                }
                MapOp::InsertOrUpdate(k, v) => {
                    let rt_result = rt_map.insert_or_update(*k, *v, |_, new, old| *old = old.wrapping_add(new));
                    let bt_result = match bt_map.get_mut(k) {
                        Some(old) => {
                            *old = old.wrapping_add(*v);
                            false
                        }
                        None => {
                            bt_map.insert(*k, *v);
                            true
                        }
                    };
                    prop_assert_eq!(rt_result, bt_result, "insert_or_update({}, {})", k, v);
                }
                MapOp::Remove(k) => {
                    prop_assert_eq!(rt_map.remove(k), bt_map.remove(k), "remove({})", k);
                }
                MapOp::RemoveEntry(k) => {
                    prop_assert_eq!(rt_map.remove_entry(k), bt_map.remove_entry(k), "remove_entry({})", k);
                }
                MapOp::Get(k) => {
                    prop_assert_eq!(rt_map.get(k), bt_map.get(k), "get({})", k);
                }
                MapOp::ContainsKey(k) => {
                    prop_assert_eq!(rt_map.contains_key(k), bt_map.contains_key(k), "contains_key({})", k);
                }
                MapOp::GetKeyValue(k) => {
                    prop_assert_eq!(rt_map.get_key_value(k), bt_map.get_key_value(k), "get_key_value({})", k);
                }
                MapOp::First => {
                    prop_assert_eq!(rt_map.first(), bt_map.first_key_value(), "first");
                }
                MapOp::Last => {
                    prop_assert_eq!(rt_map.last(), bt_map.last_key_value(), "last");
                }
                MapOp::PopFirst => {
                    prop_assert_eq!(rt_map.pop_first(), bt_map.pop_first(), "pop_first");
                }
                MapOp::PopLast => {
                    prop_assert_eq!(rt_map.pop_last(), bt_map.pop_last(), "pop_last");
                }
            }
            prop_assert_eq!(rt_map.len(), bt_map.len(), "len mismatch after {:?}", op);
            prop_assert_eq!(rt_map.is_empty(), bt_map.is_empty(), "is_empty mismatch after {:?}", op);
        }
    }

    /// Iteration order and contents must match BTreeMap after random
    /// insertions, in both directions, at a fan-out that forces real depth.
    #[test]
    fn iter_matches_btreemap(entries in proptest::collection::vec((key_strategy(), value_strategy()), TEST_SIZE)) {
        let mut rt_map: RingTreeMap<i64, i64> = RingTreeMap::with_order(3, 3);
        let mut bt_map: BTreeMap<i64, i64> = BTreeMap::new();

        for (k, v) in &entries {
            rt_map.insert_or_replace(*k, *v);
            bt_map.insert(*k, *v);
        }

        let rt_items: Vec<_> = rt_map.iter().map(|(&k, &v)| (k, v)).collect();
        let bt_items: Vec<_> = bt_map.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&rt_items, &bt_items, "iter() mismatch");

        let rt_rev: Vec<_> = rt_map.iter().rev().map(|(&k, &v)| (k, v)).collect();
        let bt_rev: Vec<_> = bt_map.iter().rev().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&rt_rev, &bt_rev, "iter().rev() mismatch");

        let rt_keys: Vec<_> = rt_map.keys().copied().collect();
        let bt_keys: Vec<_> = bt_map.keys().copied().collect();
        prop_assert_eq!(&rt_keys, &bt_keys, "keys() mismatch");

        let rt_vals: Vec<_> = rt_map.values().copied().collect();
        let bt_vals: Vec<_> = bt_map.values().copied().collect();
        prop_assert_eq!(&rt_vals, &bt_vals, "values() mismatch");

        let rt_into: Vec<_> = rt_map.clone().into_iter().collect();
        let bt_into: Vec<_> = bt_map.clone().into_iter().collect();
        prop_assert_eq!(&rt_into, &bt_into, "into_iter() mismatch");
    }

    /// Range queries must match BTreeMap for every bound shape.
    #[test]
    fn range_matches_btreemap(
        entries in proptest::collection::vec((key_strategy(), value_strategy()), TEST_SIZE),
        lo in key_strategy(),
        hi in key_strategy(),
    ) {
        let mut rt_map: RingTreeMap<i64, i64> = RingTreeMap::with_order(3, 3);
        let mut bt_map: BTreeMap<i64, i64> = BTreeMap::new();

        for (k, v) in &entries {
            rt_map.insert_or_replace(*k, *v);
            bt_map.insert(*k, *v);
        }

        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };

        let rt_range: Vec<_> = rt_map.range(lo..=hi).map(|(&k, &v)| (k, v)).collect();
        let bt_range: Vec<_> = bt_map.range(lo..=hi).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&rt_range, &bt_range, "range({}..={}) mismatch", lo, hi);

        let rt_range: Vec<_> = rt_map.range(lo..hi).map(|(&k, &v)| (k, v)).collect();
        let bt_range: Vec<_> = bt_map.range(lo..hi).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&rt_range, &bt_range, "range({}..{}) mismatch", lo, hi);

        let rt_range: Vec<_> = rt_map.range(lo..).map(|(&k, &v)| (k, v)).collect();
        let bt_range: Vec<_> = bt_map.range(lo..).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&rt_range, &bt_range, "range({}..) mismatch", lo);

        let rt_range: Vec<_> = rt_map.range(..=hi).map(|(&k, &v)| (k, v)).collect();
        let bt_range: Vec<_> = bt_map.range(..=hi).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&rt_range, &bt_range, "range(..={}) mismatch", hi);

        let rt_range: Vec<_> = rt_map.range::<i64, _>(..).rev().map(|(&k, &v)| (k, v)).collect();
        let bt_range: Vec<_> = bt_map.range::<i64, _>(..).rev().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&rt_range, &bt_range, "range(..).rev() mismatch");
    }

    /// `next_nearest` resolves to the key's own value, or to the successor
    /// or predecessor value; at the extremes it is fully determined.
    #[test]
    fn next_nearest_is_a_neighbour(
        entries in proptest::collection::vec((key_strategy(), value_strategy()), 1..TEST_SIZE),
        probe in key_strategy(),
    ) {
        let mut rt_map: RingTreeMap<i64, i64> = RingTreeMap::with_order(3, 3);
        let mut bt_map: BTreeMap<i64, i64> = BTreeMap::new();
        for (k, v) in &entries {
            rt_map.insert_or_replace(*k, *v);
            bt_map.insert(*k, *v);
        }

        let got = rt_map.next_nearest(&probe).copied();
        if let Some(exact) = bt_map.get(&probe) {
            prop_assert_eq!(got, Some(*exact));
        } else {
            let successor = bt_map.range(probe..).next().map(|(_, &v)| v);
            let predecessor = bt_map.range(..probe).next_back().map(|(_, &v)| v);
            match (successor, predecessor) {
                (Some(succ), None) => prop_assert_eq!(got, Some(succ)),
                (None, Some(pred)) => prop_assert_eq!(got, Some(pred)),
                (Some(succ), Some(pred)) => {
                    prop_assert!(got == Some(succ) || got == Some(pred), "next_nearest({}) = {:?}", probe, got);
                }
                (None, None) => unreachable!("map is non-empty"),
            }
        }
    }
}

// ─── Structural scenarios at forced-small fan-out ────────────────────────────

#[test]
fn sequential_fill_splits_at_the_fourth_key() {
    let mut map = RingTreeMap::with_order(3, 3);
    for key in 1..=3 {
        map.insert(key, key * 10).unwrap();
        assert_eq!(map.height(), 1);
    }
    map.insert(4, 40).unwrap();
    assert_eq!(map.height(), 2);
    for key in 5..=7 {
        map.insert(key, key * 10).unwrap();
    }
    assert_eq!(map.height(), 2);
    let keys: Vec<_> = map.keys().copied().collect();
    assert_eq!(keys, [1, 2, 3, 4, 5, 6, 7]);

    assert_eq!(map.remove(&4), Some(40));
    assert_eq!(map.height(), 2);
    let keys: Vec<_> = map.keys().copied().collect();
    assert_eq!(keys, [1, 2, 3, 5, 6, 7]);
}

#[test]
fn shuffled_insertion_iterates_in_order() {
    let mut map = RingTreeMap::with_order(3, 3);
    for key in [5, 3, 7, 1, 9, 2, 8, 6, 4] {
        map.insert(key, key).unwrap();
    }
    let forward: Vec<_> = map.keys().copied().collect();
    assert_eq!(forward, [1, 2, 3, 4, 5, 6, 7, 8, 9]);

    let reverse_from_7: Vec<_> = map.range(..=7).rev().map(|(&k, _)| k).collect();
    assert_eq!(reverse_from_7, [7, 6, 5, 4, 3, 2, 1]);

    let mut cursor = map.cursor_reverse_from(&7);
    let mut walked = Vec::new();
    while let Ok(Some((&k, _))) = cursor.next(&map) {
        walked.push(k);
    }
    assert_eq!(walked, [7, 6, 5, 4, 3, 2, 1]);
}

#[test]
fn update_combines_with_the_stored_value() {
    let mut map = RingTreeMap::new();
    map.insert(2, 5).unwrap();
    let added = map.insert_or_update(2, 20, |_, new, old| *old += new);
    assert!(!added);
    assert_eq!(map[&2], 25);
}

#[test]
fn draining_a_middle_run_keeps_the_rest_in_order() {
    let mut map = RingTreeMap::with_order(4, 4);
    for key in 1..=32 {
        map.insert(key, key).unwrap();
    }
    for key in 16..=19 {
        assert_eq!(map.remove(&key), Some(key));
    }
    assert_eq!(map.len(), 28);
    let keys: Vec<_> = map.keys().copied().collect();
    let expected: Vec<_> = (1..=15).chain(20..=32).collect();
    assert_eq!(keys, expected);
}

#[test]
fn edge_pops_mirror_each_other() {
    let mut map: RingTreeMap<i32, i32> = (0..100).map(|n| (n, -n)).collect();
    let mut front = Vec::new();
    let mut back = Vec::new();
    loop {
        match (map.pop_first(), map.pop_last()) {
            (Some(first), Some(last)) => {
                front.push(first.0);
                back.push(last.0);
            }
            (Some(first), None) => {
                front.push(first.0);
                break;
            }
            (None, _) => break,
        }
    }
    assert_eq!(front, (0..50).collect::<Vec<_>>());
    assert_eq!(back, (50..100).rev().collect::<Vec<_>>());
    assert!(map.is_empty());
    assert_eq!(map.height(), 0);
}

// ─── Cursors and invalidation ────────────────────────────────────────────────

#[test]
fn cursor_fails_after_any_mutation() {
    let base: RingTreeMap<i32, i32> = (0..10).map(|n| (n, n)).collect();

    // Structural insert.
    let mut map = base.clone();
    let mut cursor = map.cursor_forward();
    assert_eq!(cursor.next(&map), Ok(Some((&0, &0))));
    map.insert(100, 100).unwrap();
    assert_eq!(cursor.next(&map), Err(TreeError::ConcurrentModification));

    // Removal.
    let mut map = base.clone();
    let mut cursor = map.cursor_forward();
    map.remove(&5);
    assert_eq!(cursor.next(&map), Err(TreeError::ConcurrentModification));

    // In-place update, no structural change.
    let mut map = base.clone();
    let mut cursor = map.cursor_forward();
    map.insert_or_update(5, 1, |_, new, old| *old += new);
    assert_eq!(cursor.next(&map), Err(TreeError::ConcurrentModification));

    // Clear, even of an already-empty map.
    let mut map: RingTreeMap<i32, i32> = RingTreeMap::new();
    let mut cursor = map.cursor_forward();
    map.clear();
    assert_eq!(cursor.next(&map), Err(TreeError::ConcurrentModification));
}

#[test]
fn failed_strict_insert_does_not_invalidate_cursors() {
    let mut map: RingTreeMap<i32, i32> = (0..10).map(|n| (n, n)).collect();
    let mut cursor = map.cursor_forward();
    assert_eq!(map.insert(5, 99), Err(TreeError::DuplicateKey));
    assert_eq!(cursor.next(&map), Ok(Some((&0, &0))));
    assert_eq!(map[&5], 5);
}

#[test]
fn cursor_walks_both_directions_from_a_start_key() {
    let map: RingTreeMap<i32, char> = [(10, 'a'), (20, 'b'), (30, 'c')].into();

    let mut cursor = map.cursor_forward_from(&15);
    assert_eq!(cursor.next(&map), Ok(Some((&20, &'b'))));
    assert_eq!(cursor.next(&map), Ok(Some((&30, &'c'))));
    assert_eq!(cursor.next(&map), Ok(None));
    assert_eq!(cursor.next(&map), Ok(None));

    let mut cursor = map.cursor_reverse_from(&15);
    assert_eq!(cursor.next(&map), Ok(Some((&10, &'a'))));
    assert_eq!(cursor.next(&map), Ok(None));

    let mut cursor = map.cursor_reverse();
    assert_eq!(cursor.next(&map), Ok(Some((&30, &'c'))));
}

// ─── Edge cases and std-trait plumbing ───────────────────────────────────────

#[test]
fn empty_map_behaviors() {
    let mut map: RingTreeMap<i32, i32> = RingTreeMap::new();
    assert_eq!(map.len(), 0);
    assert!(map.is_empty());
    assert_eq!(map.height(), 0);
    assert_eq!(map.first(), None);
    assert_eq!(map.last(), None);
    assert_eq!(map.get(&1), None);
    assert_eq!(map.next_nearest(&1), None);
    assert_eq!(map.pop_first(), None);
    assert_eq!(map.pop_last(), None);
    assert_eq!(map.remove(&1), None);
    assert_eq!(map.iter().count(), 0);
    assert_eq!(map.range::<i32, _>(..).count(), 0);
    let mut cursor = map.cursor_forward();
    assert_eq!(cursor.next(&map), Ok(None));
}

#[test]
fn clear_empties_the_map() {
    let mut map: RingTreeMap<i32, i32> = (0..50).map(|n| (n, n)).collect();
    map.clear();
    assert!(map.is_empty());
    assert_eq!(map.height(), 0);
    assert_eq!(map.iter().count(), 0);
    map.insert(1, 1).unwrap();
    assert_eq!(map.len(), 1);
}

#[test]
fn clone_and_equality() {
    let map: RingTreeMap<i32, i32> = (0..100).map(|n| (n, n * 3)).collect();
    let copy = map.clone();
    assert_eq!(map, copy);
    assert!(map.iter().eq(copy.iter()));

    let mut other = copy;
    other.insert_or_replace(3, -1);
    assert_ne!(map, other);
}

#[test]
fn extend_replaces_existing_values() {
    let mut map: RingTreeMap<i32, i32> = [(1, 1), (2, 2)].into();
    map.extend([(2, 20), (3, 30)]);
    assert_eq!(map.len(), 3);
    assert_eq!(map[&2], 20);
    assert_eq!(map[&3], 30);
}

#[test]
fn debug_renders_as_a_map() {
    let map: RingTreeMap<i32, char> = [(1, 'a'), (2, 'b')].into();
    assert_eq!(format!("{map:?}"), "{1: 'a', 2: 'b'}");
}

#[test]
fn alternating_double_ended_iteration_covers_everything() {
    let map: RingTreeMap<i32, i32> = (0..40).map(|n| (n, n)).collect();
    let mut iter = map.iter();
    assert_eq!(iter.len(), 40);
    let mut seen = Vec::new();
    let mut toggle = true;
    loop {
        let item = if toggle { iter.next() } else { iter.next_back() };
        match item {
            Some((&k, _)) => seen.push(k),
            None => break,
        }
        toggle = !toggle;
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..40).collect::<Vec<_>>());
}

#[test]
fn borrowed_key_lookups() {
    let mut map: RingTreeMap<String, i32> = RingTreeMap::new();
    map.insert("alpha".to_string(), 1).unwrap();
    map.insert("beta".to_string(), 2).unwrap();
    assert_eq!(map.get("alpha"), Some(&1));
    assert!(map.contains_key("beta"));
    assert_eq!(map.remove("alpha"), Some(1));
}

#[test]
#[should_panic(expected = "no entry found for key")]
fn indexing_a_missing_key_panics() {
    let map: RingTreeMap<i32, i32> = [(1, 1)].into();
    let _ = map[&2];
}

#[test]
#[should_panic(expected = "range start is greater than range end")]
fn inverted_range_panics() {
    let map: RingTreeMap<i32, i32> = [(1, 1)].into();
    let _ = map.range(5..1);
}

#[test]
#[should_panic(expected = "`RingTreeMap::with_order()` - `internal_cap` must be at least 2!")]
fn undersized_internal_capacity_panics() {
    let _ = RingTreeMap::<i32, i32>::with_order(1, 4);
}
