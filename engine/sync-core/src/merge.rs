//! Merge-by-key reconciliation of stored and freshly fetched records
//!
//! Old records are inserted first and new records second, so a key present in
//! both resolves to the new record. The result is ordered by key, largest
//! first, and truncated to a fixed cap.

use std::collections::BTreeMap;

/// A record carrying a natural deduplication key
pub trait Keyed {
    /// Key type; larger keys sort first in merged output
    type Key: Ord;

    /// The record's key
    fn key(&self) -> Self::Key;
}

/// Merge two record sets using `key` to deduplicate.
///
/// ```
/// use sync_core::merge::merge_by;
///
/// let old = vec![(1000, 5), (2000, 7)];
/// let new = vec![(2000, 9), (3000, 4)];
/// let merged = merge_by(old, new, 3, |sale: &(i64, u32)| sale.0);
/// assert_eq!(merged, vec![(3000, 4), (2000, 9), (1000, 5)]);
/// ```
pub fn merge_by<T, K, F>(
    old: impl IntoIterator<Item = T>,
    new: impl IntoIterator<Item = T>,
    cap: usize,
    key: F,
) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut merged = BTreeMap::new();
    for record in old.into_iter().chain(new) {
        merged.insert(key(&record), record);
    }

    merged.into_values().rev().take(cap).collect()
}

/// Merge two sets of [`Keyed`] records
pub fn merge_by_key<T: Keyed>(
    old: impl IntoIterator<Item = T>,
    new: impl IntoIterator<Item = T>,
    cap: usize,
) -> Vec<T> {
    merge_by(old, new, cap, T::key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sale {
        ts: i64,
        price: u32,
    }

    impl Keyed for Sale {
        type Key = i64;

        fn key(&self) -> i64 {
            self.ts
        }
    }

    fn sale(ts: i64, price: u32) -> Sale {
        Sale { ts, price }
    }

    #[test]
    fn test_new_record_wins_on_collision() {
        let old = vec![sale(1000, 5), sale(2000, 7)];
        let new = vec![sale(2000, 9), sale(3000, 4)];

        let merged = merge_by_key(old, new, 3);

        assert_eq!(merged, vec![sale(3000, 4), sale(2000, 9), sale(1000, 5)]);
    }

    #[test]
    fn test_cap_drops_oldest() {
        let old = vec![sale(1000, 5), sale(2000, 7)];
        let new = vec![sale(2000, 9), sale(3000, 4)];

        let merged = merge_by_key(old, new, 2);

        assert_eq!(merged, vec![sale(3000, 4), sale(2000, 9)]);
    }

    #[test]
    fn test_duplicates_within_new_keep_last() {
        let new = vec![sale(1000, 1), sale(1000, 2)];

        let merged = merge_by_key(Vec::new(), new, 10);

        assert_eq!(merged, vec![sale(1000, 2)]);
    }

    #[test]
    fn test_empty_inputs_and_zero_cap() {
        assert!(merge_by_key::<Sale>(Vec::new(), Vec::new(), 100).is_empty());
        assert!(merge_by_key(vec![sale(1, 1)], vec![sale(2, 2)], 0).is_empty());
    }

    #[test]
    fn test_merge_by_custom_key() {
        let old = vec![("pedri", "rare", 3), ("gavi", "limited", 1)];
        let new = vec![("pedri", "rare", 8)];

        let merged = merge_by(old, new, 10, |r: &(&str, &str, i32)| (r.0, r.1));

        assert_eq!(merged, vec![("pedri", "rare", 8), ("gavi", "limited", 1)]);
    }

    fn sales() -> impl Strategy<Value = Vec<Sale>> {
        prop::collection::vec((0i64..50, 0u32..1000).prop_map(|(ts, price)| sale(ts, price)), 0..40)
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(old in sales(), new in sales(), cap in 0usize..60) {
            let first = merge_by_key(old.clone(), new.clone(), cap);
            let second = merge_by_key(old.clone(), new.clone(), cap);
            prop_assert_eq!(&first, &second);

            // Folding the same fresh records in again changes nothing
            let again = merge_by_key(first.clone(), new, cap);
            prop_assert_eq!(again, first);
        }

        #[test]
        fn prop_merge_respects_cap(old in sales(), new in sales(), cap in 0usize..60) {
            prop_assert!(merge_by_key(old, new, cap).len() <= cap);
        }

        #[test]
        fn prop_merge_sorted_descending(old in sales(), new in sales(), cap in 0usize..60) {
            let merged = merge_by_key(old, new, cap);
            for pair in merged.windows(2) {
                prop_assert!(pair[0].ts > pair[1].ts);
            }
        }
    }
}
