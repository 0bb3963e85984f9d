use crate::accounts::{AccountNode, AccountPath, HierarchyTree};
use crate::schema::ParserConfig;
use crate::utils::{format_amount, sum_tolerance};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SumMismatch {
    pub parent: AccountPath,
    pub expected_total: f64,
    pub children_total: f64,
    pub difference: f64,
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousAccount {
    pub path: AccountPath,
    pub reason: String,
}

/// A back edge `from -> to` closing a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularReference {
    pub from: AccountPath,
    pub to: AccountPath,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationFlags {
    pub sum_mismatches: Vec<SumMismatch>,
    pub ambiguous_accounts: Vec<AmbiguousAccount>,
    pub circular_references: Vec<CircularReference>,
    pub zero_value_accounts: Vec<AccountPath>,
    pub negative_value_accounts: Vec<AccountPath>,
}

impl ValidationFlags {
    pub fn is_ambiguous(&self, path: &AccountPath) -> bool {
        self.ambiguous_accounts.iter().any(|a| &a.path == path)
    }

    pub fn mismatch_for(&self, path: &AccountPath) -> Option<&SumMismatch> {
        self.sum_mismatches.iter().find(|m| &m.parent == path)
    }

    pub fn has_structural_risk(&self) -> bool {
        !self.sum_mismatches.is_empty()
            || !self.ambiguous_accounts.is_empty()
            || !self.circular_references.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

pub struct HierarchyValidator<'a> {
    config: &'a ParserConfig,
}

impl<'a> HierarchyValidator<'a> {
    pub fn new(config: &'a ParserConfig) -> Self {
        Self { config }
    }

    pub fn validate_hierarchy(&self, tree: &HierarchyTree) -> ValidationFlags {
        let mut flags = ValidationFlags::default();

        for node in tree.nodes() {
            if let Some(mismatch) = self.check_sum(tree, node) {
                warn!(
                    "Sum mismatch at '{}': parent {} vs children {} (difference {})",
                    mismatch.parent,
                    format_amount(mismatch.expected_total),
                    format_amount(mismatch.children_total),
                    format_amount(mismatch.difference)
                );
                flags.sum_mismatches.push(mismatch);
            }

            if node.has_value() && !node.children.is_empty() {
                flags.ambiguous_accounts.push(AmbiguousAccount {
                    path: node.path.clone(),
                    reason: format!(
                        "Holds value {} and has {} children - risk of double counting",
                        format_amount(node.total_value),
                        node.children.len()
                    ),
                });
            }

            if node.is_numeric && node.total_value == 0.0 {
                flags.zero_value_accounts.push(node.path.clone());
            } else if node.is_numeric && node.total_value < 0.0 {
                flags.negative_value_accounts.push(node.path.clone());
            }
        }

        flags.circular_references = Self::find_cycles(tree);
        for cycle in &flags.circular_references {
            warn!("Circular reference: '{}' -> '{}'", cycle.from, cycle.to);
        }

        debug!(
            "Validation: {} mismatches, {} ambiguous, {} cycles, {} zero, {} negative",
            flags.sum_mismatches.len(),
            flags.ambiguous_accounts.len(),
            flags.circular_references.len(),
            flags.zero_value_accounts.len(),
            flags.negative_value_accounts.len()
        );
        flags
    }

    fn check_sum(&self, tree: &HierarchyTree, node: &AccountNode) -> Option<SumMismatch> {
        if !node.is_numeric {
            return None;
        }

        let numeric_children: Vec<f64> = tree
            .children_of(node)
            .filter(|c| c.is_numeric)
            .map(|c| c.total_value)
            .collect();
        if numeric_children.is_empty() {
            return None;
        }

        let children_total: f64 = numeric_children.iter().sum();
        let difference = (node.total_value - children_total).abs();
        let tolerance = sum_tolerance(
            node.total_value,
            self.config.mismatch_tolerance_pct,
            self.config.mismatch_tolerance_abs,
        );

        (difference > tolerance).then(|| SumMismatch {
            parent: node.path.clone(),
            expected_total: node.total_value,
            children_total,
            difference,
            tolerance,
        })
    }

    /// Iterative DFS over the children graph; an edge into a node that is
    /// still on the DFS path is reported. Dangling child paths are ignored.
    fn find_cycles(tree: &HierarchyTree) -> Vec<CircularReference> {
        let mut state: HashMap<&AccountPath, Visit> = HashMap::new();
        let mut found: Vec<CircularReference> = Vec::new();

        for start in tree.nodes() {
            if state.contains_key(&start.path) {
                continue;
            }

            state.insert(&start.path, Visit::InProgress);
            let mut stack: Vec<(&AccountNode, usize)> = vec![(start, 0)];

            while let Some(frame) = stack.last_mut() {
                let (node, next) = (frame.0, frame.1);
                let Some(child_path) = node.children.get(next) else {
                    state.insert(&node.path, Visit::Done);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                let Some(child) = tree.get(child_path) else {
                    continue;
                };

                match state.get(&child.path) {
                    Some(Visit::InProgress) => {
                        let edge = CircularReference {
                            from: node.path.clone(),
                            to: child.path.clone(),
                        };
                        if !found.contains(&edge) {
                            found.push(edge);
                        }
                    }
                    Some(Visit::Done) => {}
                    None => {
                        state.insert(&child.path, Visit::InProgress);
                        stack.push((child, 0));
                    }
                }
            }
        }

        found
    }
}
