//! Schema Change Detector
//!
//! Pure comparison between two table-set summaries: which tables appeared,
//! which disappeared, and which changed column count since the previous
//! snapshot. A rename surfaces as one drop plus one add; no rename inference
//! is attempted (accepted, documented behavior).

use crate::models::{SchemaChanges, TableSummary};
use std::collections::{HashMap, HashSet};

/// Compare the previous snapshot's tables against a fresh extraction.
///
/// Table name matching is case-sensitive and exact. Deterministic: output
/// lists are sorted by name.
pub fn detect_changes(previous: &[TableSummary], current: &[TableSummary]) -> SchemaChanges {
    let prev_map: HashMap<&str, usize> = previous
        .iter()
        .map(|t| (t.name.as_str(), t.column_count()))
        .collect();

    let curr_map: HashMap<&str, usize> = current
        .iter()
        .map(|t| (t.name.as_str(), t.column_count()))
        .collect();

    let prev_names: HashSet<&str> = prev_map.keys().copied().collect();
    let curr_names: HashSet<&str> = curr_map.keys().copied().collect();

    let mut new_tables: Vec<String> = curr_names
        .difference(&prev_names)
        .map(|n| n.to_string())
        .collect();

    let mut dropped_tables: Vec<String> = prev_names
        .difference(&curr_names)
        .map(|n| n.to_string())
        .collect();

    let mut modified_tables: Vec<String> = curr_names
        .intersection(&prev_names)
        .filter(|n| prev_map[*n] != curr_map[*n])
        .map(|n| n.to_string())
        .collect();

    new_tables.sort();
    dropped_tables.sort();
    modified_tables.sort();

    SchemaChanges {
        new_tables,
        dropped_tables,
        modified_tables,
    }
}

impl SchemaChanges {
    /// True when no table was added, dropped or modified. The scheduler uses
    /// this to skip persisting a snapshot for an unchanged schema.
    pub fn is_empty(&self) -> bool {
        self.new_tables.is_empty()
            && self.dropped_tables.is_empty()
            && self.modified_tables.is_empty()
    }

    /// A first manual snapshot has no predecessor: every table is new.
    pub fn all_new(tables: &[TableSummary]) -> Self {
        let mut new_tables: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
        new_tables.sort();
        Self {
            new_tables,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnSummary;
    use pretty_assertions::assert_eq;

    fn table(name: &str, columns: usize) -> TableSummary {
        TableSummary {
            name: name.to_string(),
            row_count: Some(10),
            size_bytes: None,
            columns: (0..columns)
                .map(|i| ColumnSummary {
                    name: format!("col_{}", i),
                    data_type: "text".to_string(),
                    is_nullable: true,
                })
                .collect(),
        }
    }

    #[test]
    fn detects_added_modified_and_unchanged_tables() {
        let previous = vec![table("orders", 5), table("customers", 3)];
        let current = vec![table("orders", 6), table("customers", 3), table("products", 2)];

        let changes = detect_changes(&previous, &current);

        assert_eq!(changes.new_tables, vec!["products".to_string()]);
        assert_eq!(changes.dropped_tables, Vec::<String>::new());
        assert_eq!(changes.modified_tables, vec!["orders".to_string()]);
    }

    #[test]
    fn detects_dropped_tables() {
        let previous = vec![table("orders", 5), table("legacy_audit", 4)];
        let current = vec![table("orders", 5)];

        let changes = detect_changes(&previous, &current);

        assert_eq!(changes.dropped_tables, vec!["legacy_audit".to_string()]);
        assert!(changes.new_tables.is_empty());
        assert!(changes.modified_tables.is_empty());
    }

    #[test]
    fn rename_is_reported_as_drop_plus_add() {
        let previous = vec![table("users", 4)];
        let current = vec![table("accounts", 4)];

        let changes = detect_changes(&previous, &current);

        assert_eq!(changes.new_tables, vec!["accounts".to_string()]);
        assert_eq!(changes.dropped_tables, vec!["users".to_string()]);
    }

    #[test]
    fn table_name_comparison_is_case_sensitive() {
        let previous = vec![table("Orders", 5)];
        let current = vec![table("orders", 5)];

        let changes = detect_changes(&previous, &current);

        assert_eq!(changes.new_tables, vec!["orders".to_string()]);
        assert_eq!(changes.dropped_tables, vec!["Orders".to_string()]);
    }

    #[test]
    fn identical_sets_produce_empty_changes() {
        let previous = vec![table("orders", 5), table("customers", 3)];
        let current = vec![table("customers", 3), table("orders", 5)];

        let changes = detect_changes(&previous, &current);
        assert!(changes.is_empty());
    }

    #[test]
    fn change_sets_are_disjoint_and_cover_current_names() {
        let previous = vec![table("a", 1), table("b", 2), table("c", 3)];
        let current = vec![table("b", 5), table("c", 3), table("d", 1)];

        let changes = detect_changes(&previous, &current);

        let new: HashSet<_> = changes.new_tables.iter().collect();
        let dropped: HashSet<_> = changes.dropped_tables.iter().collect();
        let modified: HashSet<_> = changes.modified_tables.iter().collect();

        assert!(new.is_disjoint(&dropped));
        assert!(new.is_disjoint(&modified));
        assert!(dropped.is_disjoint(&modified));

        // new + modified + unchanged must equal the current name set
        let unchanged: HashSet<String> = current
            .iter()
            .map(|t| t.name.clone())
            .filter(|n| !changes.new_tables.contains(n) && !changes.modified_tables.contains(n))
            .collect();
        let mut reconstructed: HashSet<String> = unchanged;
        reconstructed.extend(changes.new_tables.iter().cloned());
        reconstructed.extend(changes.modified_tables.iter().cloned());

        let current_names: HashSet<String> = current.iter().map(|t| t.name.clone()).collect();
        assert_eq!(reconstructed, current_names);
    }

    #[test]
    fn detector_is_deterministic() {
        let previous = vec![table("z", 1), table("m", 2), table("a", 3)];
        let current = vec![table("q", 1), table("a", 9), table("m", 2)];

        let first = detect_changes(&previous, &current);
        let second = detect_changes(&previous, &current);

        assert_eq!(first.new_tables, second.new_tables);
        assert_eq!(first.dropped_tables, second.dropped_tables);
        assert_eq!(first.modified_tables, second.modified_tables);
    }

    #[test]
    fn all_new_lists_every_table() {
        let tables = vec![table("orders", 5), table("customers", 3)];
        let changes = SchemaChanges::all_new(&tables);

        assert_eq!(
            changes.new_tables,
            vec!["customers".to_string(), "orders".to_string()]
        );
        assert!(changes.dropped_tables.is_empty());
        assert!(changes.modified_tables.is_empty());
    }
}
