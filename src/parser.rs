//! Row extraction and tree construction.
//!
//! Each labelled row becomes one account. Its value comes from the first
//! nonzero subtotal cell when there is one; only otherwise are the period and
//! value cells summed. Levels come from numbering markers, then indentation.

use crate::accounts::{AccountNode, AccountPath, HierarchyTree};
use crate::classifier::{ColumnClassification, ColumnType};
use crate::error::Result;
use crate::grid::{Cell, SheetGrid, LABEL_COLUMN};
use crate::schema::ParserConfig;
use crate::utils::{compile_patterns, leading_indentation};
use log::{debug, info};
use regex::Regex;
use std::collections::BTreeMap;

/// One labelled row before it is placed in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAccount {
    pub row_index: usize,
    pub raw_label: String,
    pub clean_label: String,
    pub level: usize,
    pub contributions: BTreeMap<usize, f64>,
    pub total_value: f64,
    pub is_numeric: bool,
    pub used_subtotal: bool,
    pub subtotal_value: Option<f64>,
}

pub struct HierarchyParser {
    config: ParserConfig,
    numbering: Vec<(Regex, usize)>,
}

impl HierarchyParser {
    pub fn new(config: ParserConfig) -> Result<Self> {
        let patterns: Vec<String> = config
            .numbering_rules
            .iter()
            .map(|r| r.pattern.clone())
            .collect();
        let numbering = compile_patterns(&patterns)?
            .into_iter()
            .zip(config.numbering_rules.iter().map(|r| r.level))
            .collect();

        Ok(Self { config, numbering })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Level and byte length of the numbering marker at the start of the trimmed label.
    fn match_marker(&self, trimmed: &str) -> Option<(usize, usize)> {
        self.numbering.iter().find_map(|(re, level)| {
            re.find(trimmed)
                .filter(|m| m.start() == 0)
                .map(|m| ((*level).min(self.config.max_level), m.end()))
        })
    }

    pub fn detect_level(&self, raw_label: &str) -> usize {
        if let Some((level, _)) = self.match_marker(raw_label.trim()) {
            return level;
        }

        let indent = leading_indentation(raw_label);
        if indent >= self.config.indentation_threshold && indent > 0 {
            return (indent / 2 + 1).min(self.config.max_level);
        }

        0
    }

    pub fn clean_label(&self, raw_label: &str) -> String {
        let trimmed = raw_label.trim();
        match self.match_marker(trimmed) {
            Some((_, end)) => {
                let stripped = trimmed[end..].trim();
                if stripped.is_empty() {
                    trimmed.to_string()
                } else {
                    stripped.to_string()
                }
            }
            None => trimmed.to_string(),
        }
    }

    pub fn extract_accounts(
        &self,
        grid: &SheetGrid,
        classifications: &[ColumnClassification],
    ) -> Vec<ExtractedAccount> {
        let skip_first = classifications.iter().any(|c| c.header_from_first_row);
        let subtotal_columns: Vec<usize> = classifications
            .iter()
            .filter(|c| c.column_type == ColumnType::Subtotal && c.index != LABEL_COLUMN)
            .map(|c| c.index)
            .collect();
        let value_columns: Vec<usize> = classifications
            .iter()
            .filter(|c| c.include_in_calculations && c.index != LABEL_COLUMN)
            .map(|c| c.index)
            .collect();

        let mut accounts = Vec::new();
        for (row_index, row) in grid.rows().iter().enumerate() {
            if skip_first && row_index == 0 {
                continue;
            }

            let raw_label = match row.get(LABEL_COLUMN) {
                Some(cell) if !cell.is_empty() => cell.to_string(),
                _ => continue,
            };
            if raw_label.trim().is_empty() {
                continue;
            }

            let subtotal = subtotal_columns.iter().find_map(|&col| {
                row.get(col)
                    .and_then(Cell::as_number)
                    .filter(|v| *v != 0.0)
                    .map(|v| (col, v))
            });

            let mut contributions = BTreeMap::new();
            let (total_value, used_subtotal, subtotal_value) = match subtotal {
                Some((col, value)) => {
                    debug!(
                        "Row {} '{}': using subtotal column {} = {}",
                        row_index,
                        raw_label.trim(),
                        col,
                        value
                    );
                    contributions.insert(col, value);
                    (value, true, Some(value))
                }
                None => {
                    for &col in &value_columns {
                        if let Some(value) = row.get(col).and_then(Cell::as_number) {
                            contributions.insert(col, value);
                        }
                    }
                    (contributions.values().sum(), false, None)
                }
            };

            accounts.push(ExtractedAccount {
                row_index,
                level: self.detect_level(&raw_label),
                clean_label: self.clean_label(&raw_label),
                is_numeric: !contributions.is_empty(),
                raw_label,
                contributions,
                total_value,
                used_subtotal,
                subtotal_value,
            });
        }

        info!(
            "Extracted {} accounts ({} from subtotal columns)",
            accounts.len(),
            accounts.iter().filter(|a| a.used_subtotal).count()
        );
        accounts
    }

    /// Stack-based construction: the nearest preceding row with a lower level is the parent.
    pub fn build_tree(&self, accounts: Vec<ExtractedAccount>) -> HierarchyTree {
        let mut tree = HierarchyTree::new();
        let mut stack: Vec<(usize, AccountPath)> = Vec::new();

        for account in accounts {
            while stack.last().is_some_and(|(level, _)| *level >= account.level) {
                stack.pop();
            }
            let parent = stack.last().map(|(_, path)| path.clone());
            let path = tree.unique_child_path(parent.as_ref(), &account.clean_label);

            tree.insert(AccountNode {
                path: path.clone(),
                raw_label: account.raw_label,
                clean_label: account.clean_label,
                level: account.level,
                row_index: Some(account.row_index),
                contributions: account.contributions,
                total_value: account.total_value,
                is_numeric: account.is_numeric,
                used_subtotal: account.used_subtotal,
                subtotal_value: account.subtotal_value,
                parent: None,
                children: Vec::new(),
            });
            if let Some(parent) = &parent {
                tree.link(parent, &path);
            }

            stack.push((account.level, path));
        }

        info!(
            "Built hierarchy: {} accounts, {} roots, {} leaves",
            tree.len(),
            tree.roots().count(),
            tree.leaves().count()
        );
        tree
    }

    pub fn parse(&self, grid: &SheetGrid, classifications: &[ColumnClassification]) -> HierarchyTree {
        self.build_tree(self.extract_accounts(grid, classifications))
    }
}
