//! Adaptive distinctness
//!
//! Small collections, and any collection containing primitives, deduplicate
//! by pairwise deep-equality. Larger all-complex collections switch to a
//! canonical-hash set (sorted keys, normalized quantities) for O(n)
//! behavior. `distinct`, `union`, `intersect`, `exclude`, `subsetOf` and
//! `repeat` all share this machinery, so the strategy threshold is a
//! behavioral contract, not a local optimization.

use crate::value::{Collection, Value};
use std::collections::HashSet;

/// Collections at or below this size always use pairwise deep-equality.
pub const HASH_STRATEGY_THRESHOLD: usize = 6;

enum Strategy {
    Pairwise,
    Hashed,
}

fn pick_strategy(items: &[&Value]) -> Strategy {
    if items.len() > HASH_STRATEGY_THRESHOLD && !items.iter().any(|v| v.is_primitive()) {
        Strategy::Hashed
    } else {
        Strategy::Pairwise
    }
}

/// Incremental duplicate filter over deep-equality.
pub struct SeenSet {
    strategy: Strategy,
    hashed: HashSet<Value>,
    ordered: Vec<Value>,
}

impl SeenSet {
    /// Choose the strategy from the collection(s) that will be inserted.
    pub fn for_items(items: &[&Value]) -> Self {
        Self {
            strategy: pick_strategy(items),
            hashed: HashSet::new(),
            ordered: Vec::new(),
        }
    }

    /// Insert a value; returns true when it was not seen before.
    pub fn insert(&mut self, value: &Value) -> bool {
        match self.strategy {
            Strategy::Hashed => {
                if self.hashed.insert(value.clone()) {
                    self.ordered.push(value.clone());
                    true
                } else {
                    false
                }
            }
            Strategy::Pairwise => {
                if self.ordered.iter().any(|seen| seen.deep_equal(value)) {
                    false
                } else {
                    self.ordered.push(value.clone());
                    true
                }
            }
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        match self.strategy {
            Strategy::Hashed => self.hashed.contains(value),
            Strategy::Pairwise => self.ordered.iter().any(|seen| seen.deep_equal(value)),
        }
    }
}

/// Deduplicate, preserving first-seen order.
pub fn distinct(input: &Collection) -> Collection {
    let items: Vec<&Value> = input.iter().collect();
    let mut seen = SeenSet::for_items(&items);
    let mut out = Collection::with_capacity(input.len());
    for item in input.iter() {
        if seen.insert(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Union with deduplication (`|` operator and `union()`).
pub fn union(left: &Collection, right: &Collection) -> Collection {
    let items: Vec<&Value> = left.iter().chain(right.iter()).collect();
    let mut seen = SeenSet::for_items(&items);
    let mut out = Collection::with_capacity(items.len());
    for item in items {
        if seen.insert(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Items of `left` also present in `right`, deduplicated.
pub fn intersect(left: &Collection, right: &Collection) -> Collection {
    let right_items: Vec<&Value> = right.iter().collect();
    let mut right_set = SeenSet::for_items(&right_items);
    for item in &right_items {
        right_set.insert(item);
    }

    let left_items: Vec<&Value> = left.iter().collect();
    let mut emitted = SeenSet::for_items(&left_items);
    let mut out = Collection::empty();
    for item in left.iter() {
        if right_set.contains(item) && emitted.insert(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Items of `left` not present in `right`; duplicates in `left` survive.
pub fn exclude(left: &Collection, right: &Collection) -> Collection {
    let right_items: Vec<&Value> = right.iter().collect();
    let mut right_set = SeenSet::for_items(&right_items);
    for item in &right_items {
        right_set.insert(item);
    }

    let mut out = Collection::empty();
    for item in left.iter() {
        if !right_set.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Whether every item of `subset` occurs in `superset`.
pub fn is_subset(subset: &Collection, superset: &Collection) -> bool {
    let super_items: Vec<&Value> = superset.iter().collect();
    let mut super_set = SeenSet::for_items(&super_items);
    for item in &super_items {
        super_set.insert(item);
    }
    subset.iter().all(|item| super_set.contains(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ResourceNode;
    use serde_json::json;
    use std::sync::Arc;

    fn ints(values: &[i64]) -> Collection {
        Collection::from_values(values.iter().map(|i| Value::integer(*i)).collect())
    }

    #[test]
    fn distinct_preserves_first_seen_order() {
        let out = distinct(&ints(&[3, 1, 3, 2, 1]));
        let got: Vec<i64> = out
            .iter()
            .map(|v| match v.data() {
                crate::value::ValueData::Integer(i) => *i,
                _ => panic!(),
            })
            .collect();
        assert_eq!(got, vec![3, 1, 2]);
    }

    #[test]
    fn distinct_is_idempotent() {
        let once = distinct(&ints(&[1, 2, 2, 3]));
        let twice = distinct(&once);
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn hashed_strategy_agrees_with_pairwise() {
        // 8 complex items with a duplicate: crosses the hash threshold.
        let mut values = Vec::new();
        for i in 0..7 {
            values.push(Value::node(ResourceNode::detached(Arc::new(
                json!({"n": i, "nested": {"a": [i, i]}}),
            ))));
        }
        values.push(Value::node(ResourceNode::detached(Arc::new(
            json!({"nested": {"a": [0, 0]}, "n": 0}),
        ))));
        let out = distinct(&Collection::from_values(values));
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn union_deduplicates_across_sides() {
        let out = union(&ints(&[1, 2]), &ints(&[2, 3]));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn union_is_commutative_up_to_order() {
        let a = ints(&[1, 2, 2]);
        let b = ints(&[2, 3]);
        let ab = union(&a, &b);
        let ba = union(&b, &a);
        assert_eq!(ab.len(), ba.len());
        for item in ab.iter() {
            assert!(ba.iter().any(|other| other.deep_equal(item)));
        }
    }

    #[test]
    fn intersect_and_exclude() {
        let a = ints(&[1, 2, 2, 3]);
        let b = ints(&[2, 3, 4]);
        let both = intersect(&a, &b);
        assert_eq!(both.len(), 2);

        let only_a = exclude(&a, &b);
        assert_eq!(only_a.len(), 1); // the two 2s and the 3 are excluded
    }

    #[test]
    fn subset_checks() {
        assert!(is_subset(&ints(&[]), &ints(&[1])));
        assert!(is_subset(&ints(&[1, 1]), &ints(&[1, 2])));
        assert!(!is_subset(&ints(&[1, 5]), &ints(&[1, 2])));
    }
}
