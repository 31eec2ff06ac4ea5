//! Property-based tests for ConcurrentTree.
//!
//! These tests check ConcurrentTree against `std::collections::BTreeMap` as a
//! model and verify the structural invariants after arbitrary operation
//! sequences using proptest.

use std::collections::BTreeMap;

use handtree::ConcurrentTree;
use proptest::prelude::*;

// =============================================================================
// Strategies for Generating Test Data
// =============================================================================

#[derive(Debug, Clone)]
enum Operation {
    Add(u16, i32),
    Delete(u16),
    Lookup(u16),
}

fn arbitrary_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        (any::<u16>(), any::<i32>()).prop_map(|(key, value)| Operation::Add(key % 256, value)),
        any::<u16>().prop_map(|key| Operation::Delete(key % 256)),
        any::<u16>().prop_map(|key| Operation::Lookup(key % 256)),
    ]
}

fn arbitrary_tree(max_size: usize) -> impl Strategy<Value = Vec<(u16, i32)>> {
    prop::collection::vec((any::<u16>(), any::<i32>()), 0..max_size)
}

/// Builds the model the same way `add` does: the first value for a key wins.
fn model_of(entries: &[(u16, i32)]) -> BTreeMap<u16, i32> {
    let mut model = BTreeMap::new();
    for (key, value) in entries {
        model.entry(*key).or_insert(*value);
    }
    model
}

// =============================================================================
// Lookup-Add Laws
// =============================================================================

proptest! {
    /// Law: lookup after a successful add returns the added value.
    #[test]
    fn prop_lookup_add_law(entries in arbitrary_tree(64), key: u16, value: i32) {
        let tree: ConcurrentTree<u16, i32> = entries.iter().copied().collect();
        let was_present = tree.contains_key(&key);
        let previous = tree.lookup(&key);

        prop_assert_eq!(tree.add(key, value), !was_present);
        let expected = previous.unwrap_or(value);
        prop_assert_eq!(tree.lookup(&key), Some(expected));
    }

    /// Law: add never changes the value of another key.
    #[test]
    fn prop_add_other_law(entries in arbitrary_tree(64), key1: u16, key2: u16, value: i32) {
        prop_assume!(key1 != key2);
        let tree: ConcurrentTree<u16, i32> = entries.iter().copied().collect();
        let before = tree.lookup(&key2);
        tree.add(key1, value);
        prop_assert_eq!(tree.lookup(&key2), before);
    }
}

// =============================================================================
// Delete Laws
// =============================================================================

proptest! {
    /// Law: lookup after delete returns None.
    #[test]
    fn prop_lookup_delete_law(entries in arbitrary_tree(64), key: u16) {
        let tree: ConcurrentTree<u16, i32> = entries.iter().copied().collect();
        tree.delete(&key);
        prop_assert_eq!(tree.lookup(&key), None);
    }

    /// Law: deleting an existing key removes it and nothing else.
    #[test]
    fn prop_delete_existing_law(entries in arbitrary_tree(64), index: prop::sample::Index) {
        prop_assume!(!entries.is_empty());
        let mut model = model_of(&entries);
        let tree: ConcurrentTree<u16, i32> = entries.iter().copied().collect();
        let key = entries[index.index(entries.len())].0;

        prop_assert_eq!(tree.remove(&key), model.remove(&key));
        prop_assert_eq!(tree.entries(), model.into_iter().collect::<Vec<_>>());
    }

    /// Law: deleting an absent key changes neither contents nor shape.
    #[test]
    fn prop_delete_absent_is_idempotent(entries in arbitrary_tree(64), key: u16) {
        let tree: ConcurrentTree<u16, i32> = entries.iter().copied().collect();
        prop_assume!(!tree.contains_key(&key));

        let mut shape = Vec::new();
        tree.depth_first(|key, _, depth| shape.push((*key, depth)));
        let length = tree.len();

        prop_assert!(!tree.delete(&key));

        let mut shape_after = Vec::new();
        tree.depth_first(|key, _, depth| shape_after.push((*key, depth)));
        prop_assert_eq!(shape_after, shape);
        prop_assert_eq!(tree.len(), length);
    }
}

// =============================================================================
// Model and Invariant Laws
// =============================================================================

proptest! {
    /// Law: any operation sequence behaves like BTreeMap with
    /// insert-if-absent semantics, and the invariants hold after every step.
    #[test]
    fn prop_matches_btreemap_model(operations in prop::collection::vec(arbitrary_operation(), 0..200)) {
        let tree = ConcurrentTree::new();
        let mut model = BTreeMap::new();

        for operation in operations {
            match operation {
                Operation::Add(key, value) => {
                    let inserted = !model.contains_key(&key);
                    if inserted {
                        model.insert(key, value);
                    }
                    prop_assert_eq!(tree.add(key, value), inserted);
                }
                Operation::Delete(key) => {
                    prop_assert_eq!(tree.delete(&key), model.remove(&key).is_some());
                }
                Operation::Lookup(key) => {
                    prop_assert_eq!(tree.lookup(&key), model.get(&key).copied());
                }
            }
            prop_assert_eq!(tree.verify(), Ok(model.len()));
        }

        prop_assert_eq!(tree.entries(), model.into_iter().collect::<Vec<_>>());
    }

    /// Law: every traversal visits exactly the live entries.
    #[test]
    fn prop_traversals_visit_all_entries(entries in arbitrary_tree(128)) {
        let tree: ConcurrentTree<u16, i32> = entries.iter().copied().collect();
        let mut expected: Vec<u16> = model_of(&entries).into_keys().collect();

        let mut depth_first = Vec::new();
        tree.depth_first(|key, _, _| depth_first.push(*key));
        let mut breadth_first = Vec::new();
        tree.breadth_first(|key, _| breadth_first.push(*key));

        depth_first.sort_unstable();
        breadth_first.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(&depth_first, &expected);
        prop_assert_eq!(&breadth_first, &expected);
        prop_assert_eq!(tree.keys(), expected);
    }
}
