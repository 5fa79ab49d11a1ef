//! Index set builder.
//!
//! Index candidates harvested from source metadata arrive one column at a time as
//! `(owning object, column, ordinal)`. They are grouped per owning object, ordered by ordinal
//! and merged with the mandatory default sequences and any explicitly requested sequences.
//! Duplicates (by exact column sequence) collapse to one entry, as do sequences whose generated
//! index names would coincide (`["a_b"]` and `["a", "b"]` both name `IX_<table>_a_b`).

use crate::types::{IndexCandidate, IndexSpec};

/// Group candidates by owning object name into column sequences.
///
/// Groups keep the order in which their owning object was first seen; columns within a group
/// are ordered by ordinal (stable for equal ordinals).
pub fn group_candidates(candidates: &[IndexCandidate]) -> Vec<IndexSpec> {
    let mut groups: Vec<(&str, Vec<&IndexCandidate>)> = Vec::new();
    for c in candidates {
        match groups.iter_mut().find(|(name, _)| *name == c.name) {
            Some((_, members)) => members.push(c),
            None => groups.push((c.name.as_str(), vec![c])),
        }
    }

    groups
        .into_iter()
        .map(|(_, mut members)| {
            members.sort_by_key(|c| c.ordinal);
            IndexSpec::new(members.into_iter().map(|c| c.column.clone()))
        })
        .collect()
}

/// Build the final, deduplicated index set.
///
/// Order: defaults first, then discovered groups, then explicit sequences. Empty sequences are
/// dropped. When two sequences map to the same index name the first one wins.
pub fn build_index_set(
    defaults: &[IndexSpec],
    candidates: &[IndexCandidate],
    explicit: &[IndexSpec],
) -> Vec<IndexSpec> {
    let discovered = group_candidates(candidates);
    let mut out: Vec<IndexSpec> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    for spec in defaults.iter().chain(discovered.iter()).chain(explicit.iter()) {
        if spec.is_empty() {
            continue;
        }
        let name = name_suffix(spec);
        if !names.contains(&name) {
            names.push(name);
            out.push(spec.clone());
        }
    }
    out
}

// The part of `sql::index_name` that depends on the spec.
fn name_suffix(spec: &IndexSpec) -> String {
    spec.columns().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_and_orders_by_ordinal() {
        let candidates = vec![
            IndexCandidate::new("IX_b", "second", 2),
            IndexCandidate::new("PK", "id", 1),
            IndexCandidate::new("IX_b", "first", 1),
        ];
        let groups = group_candidates(&candidates);
        assert_eq!(
            groups,
            vec![IndexSpec::new(["first", "second"]), IndexSpec::new(["id"])]
        );
    }

    #[test]
    fn identical_sequences_from_different_names_collapse() {
        let candidates = vec![
            IndexCandidate::new("PK_orders", "id", 1),
            IndexCandidate::new("UQ_orders", "id", 1),
            IndexCandidate::new("IX_orders_customer", "customer_id", 1),
            IndexCandidate::new("IX_orders_customer", "placed_at", 2),
            IndexCandidate::new("FK_orders_1", "customer_id", 1),
            IndexCandidate::new("FK_orders_1", "placed_at", 2),
        ];
        let set = build_index_set(&[], &candidates, &[]);
        assert_eq!(
            set,
            vec![
                IndexSpec::new(["id"]),
                IndexSpec::new(["customer_id", "placed_at"]),
            ]
        );
    }

    #[test]
    fn order_matters_for_equality() {
        let explicit = vec![IndexSpec::new(["a", "b"]), IndexSpec::new(["b", "a"])];
        assert_eq!(build_index_set(&[], &[], &explicit).len(), 2);
    }

    #[test]
    fn sequences_sharing_an_index_name_keep_the_first() {
        let explicit = vec![
            IndexSpec::new(["a", "b"]),
            IndexSpec::new(["a_b"]),
            IndexSpec::new(["a"]),
        ];
        let set = build_index_set(&[], &[], &explicit);
        assert_eq!(set, vec![IndexSpec::new(["a", "b"]), IndexSpec::new(["a"])]);
    }

    #[test]
    fn defaults_survive_and_come_first() {
        let defaults = vec![
            IndexSpec::new(["PartitionKey"]),
            IndexSpec::new(["PartitionKey", "RowKey"]),
        ];
        let candidates = vec![IndexCandidate::new("pk", "PartitionKey", 1)];
        let explicit = vec![IndexSpec::new(["PartitionKey", "RowKey"]), IndexSpec::new(["Name"])];
        let set = build_index_set(&defaults, &candidates, &explicit);
        assert_eq!(
            set,
            vec![
                IndexSpec::new(["PartitionKey"]),
                IndexSpec::new(["PartitionKey", "RowKey"]),
                IndexSpec::new(["Name"]),
            ]
        );
    }

    #[test]
    fn empty_inputs_give_empty_set() {
        assert!(build_index_set(&[], &[], &[IndexSpec::new(Vec::<String>::new())]).is_empty());
    }
}
