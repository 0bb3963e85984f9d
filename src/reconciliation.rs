use crate::accounts::{AccountPath, HierarchyTree};
use crate::classifier::{ColumnClassification, ColumnClassifier, ColumnSummary, RowReconciliation};
use crate::grid::SheetGrid;
use crate::schema::ParserConfig;
use crate::utils::format_amount;
use log::info;
use serde::{Deserialize, Serialize};

/// Relative variance under which a parent and its children count as a perfect match.
pub const PERFECT_MATCH_PCT: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceCategory {
    Perfect,
    Acceptable,
    Significant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildValue {
    pub path: AccountPath,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentReconciliation {
    pub account: AccountPath,
    pub parent_value: f64,
    pub children_sum: f64,
    pub variance_amount: f64,
    /// Percent, e.g. 24.4 for 24.4%.
    pub variance_pct: f64,
    pub children: Vec<ChildValue>,
    pub category: VarianceCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationAdvice {
    pub account: AccountPath,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub perfect_matches: Vec<ParentReconciliation>,
    pub acceptable_variances: Vec<ParentReconciliation>,
    pub significant_variances: Vec<ParentReconciliation>,
    pub advice: Vec<ReconciliationAdvice>,
    pub total_validated: usize,
    /// `(perfect + 0.8 * acceptable) / total_validated`, 0 when nothing was validated.
    pub data_quality_score: f64,
}

/// Uses each value-bearing parent as a reference total for its numeric children.
pub fn validate_parent_child_totals(tree: &HierarchyTree, config: &ParserConfig) -> ReconciliationReport {
    let mut report = ReconciliationReport::default();

    for node in tree.nodes() {
        if node.children.is_empty() || !node.is_numeric {
            continue;
        }

        let children: Vec<ChildValue> = tree
            .children_of(node)
            .filter(|c| c.is_numeric)
            .map(|c| ChildValue {
                path: c.path.clone(),
                value: c.total_value,
            })
            .collect();
        let children_sum: f64 = children.iter().map(|c| c.value).sum();
        let parent_value = node.total_value;

        if parent_value == 0.0 && children_sum == 0.0 {
            continue;
        }
        report.total_validated += 1;

        let variance_amount = (parent_value - children_sum).abs();
        let variance_ratio = if parent_value != 0.0 {
            variance_amount / parent_value.abs()
        } else {
            1.0
        };

        let category = if variance_amount <= config.mismatch_tolerance_abs
            || variance_ratio <= PERFECT_MATCH_PCT
        {
            VarianceCategory::Perfect
        } else if variance_ratio <= config.mismatch_tolerance_pct {
            VarianceCategory::Acceptable
        } else {
            VarianceCategory::Significant
        };

        let record = ParentReconciliation {
            account: node.path.clone(),
            parent_value,
            children_sum,
            variance_amount,
            variance_pct: variance_ratio * 100.0,
            children,
            category,
        };

        match category {
            VarianceCategory::Perfect => report.perfect_matches.push(record),
            VarianceCategory::Acceptable => report.acceptable_variances.push(record),
            VarianceCategory::Significant => {
                if children_sum > 0.0 {
                    report.advice.push(ReconciliationAdvice {
                        account: node.path.clone(),
                        issue: format!("Large variance detected: {:.1}%", variance_ratio * 100.0),
                        recommendation: format!(
                            "Use children sum ({}) instead of parent value ({})",
                            format_amount(children_sum),
                            format_amount(parent_value)
                        ),
                    });
                }
                report.significant_variances.push(record);
            }
        }
    }

    if report.total_validated > 0 {
        report.data_quality_score = (report.perfect_matches.len() as f64
            + 0.8 * report.acceptable_variances.len() as f64)
            / report.total_validated as f64;
    }

    info!(
        "Parent/child reconciliation: {} validated, quality {:.1}%",
        report.total_validated,
        report.data_quality_score * 100.0
    );
    report
}

impl ReconciliationReport {
    pub fn quality_label(&self) -> &'static str {
        if self.data_quality_score >= 0.95 {
            "EXCELLENT"
        } else if self.data_quality_score >= 0.80 {
            "GOOD"
        } else if self.data_quality_score >= 0.60 {
            "FAIR"
        } else {
            "POOR"
        }
    }

    pub fn render(&self) -> String {
        let mut report = String::new();
        report.push_str("PARENT-CHILD RECONCILIATION\n");
        report.push_str(&format!("{}\n\n", "=".repeat(70)));
        report.push_str(&format!(
            "Data quality score: {:.1}% ({})\n",
            self.data_quality_score * 100.0,
            self.quality_label()
        ));
        report.push_str(&format!("Parent accounts validated: {}\n", self.total_validated));

        if !self.perfect_matches.is_empty() {
            report.push_str(&format!("\nPerfect matches ({}):\n", self.perfect_matches.len()));
            for m in self.perfect_matches.iter().take(5) {
                report.push_str(&format!(
                    "  - {}: parent {} vs children {}\n",
                    m.account,
                    format_amount(m.parent_value),
                    format_amount(m.children_sum)
                ));
            }
        }

        if !self.acceptable_variances.is_empty() {
            report.push_str(&format!(
                "\nAcceptable variances (<1%) ({}):\n",
                self.acceptable_variances.len()
            ));
            for v in self.acceptable_variances.iter().take(3) {
                report.push_str(&format!(
                    "  - {}: variance {:.2}% ({})\n",
                    v.account,
                    v.variance_pct,
                    format_amount(v.variance_amount)
                ));
            }
        }

        if !self.significant_variances.is_empty() {
            report.push_str(&format!(
                "\nSignificant variances (>1%) ({}):\n",
                self.significant_variances.len()
            ));
            for v in &self.significant_variances {
                report.push_str(&format!("\n  {}\n", v.account));
                report.push_str(&format!("    Parent value:   {}\n", format_amount(v.parent_value)));
                report.push_str(&format!("    Children sum:   {}\n", format_amount(v.children_sum)));
                report.push_str(&format!(
                    "    Variance:       {} ({:.1}%)\n",
                    format_amount(v.variance_amount),
                    v.variance_pct
                ));
                for child in v.children.iter().take(5) {
                    report.push_str(&format!(
                        "      - {}: {}\n",
                        child.path.leaf_label(),
                        format_amount(child.value)
                    ));
                }
                if v.children.len() > 5 {
                    report.push_str(&format!("      ... and {} more\n", v.children.len() - 5));
                }
            }
        }

        for advice in &self.advice {
            report.push_str(&format!(
                "\n{}: {}. {}\n",
                advice.account, advice.issue, advice.recommendation
            ));
        }

        if self.significant_variances.is_empty() {
            report.push_str("\nAll parent-child relationships are consistent.\n");
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtotalUsage {
    pub path: AccountPath,
    pub subtotal_value: f64,
    pub total_value: f64,
    /// Same-row comparison of the subtotal against the period/value cells.
    pub row_check: Option<RowReconciliation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnUsageCheck {
    pub summary: ColumnSummary,
    pub subtotal_usages: Vec<SubtotalUsage>,
    /// Every account that used a subtotal carries that subtotal as its value.
    pub all_subtotals_applied: bool,
    /// Rows whose subtotal disagrees with their own period cells.
    pub rows_with_period_disagreement: usize,
}

pub fn check_column_usage(
    grid: &SheetGrid,
    classifications: &[ColumnClassification],
    tree: &HierarchyTree,
    classifier: &ColumnClassifier,
    config: &ParserConfig,
) -> ColumnUsageCheck {
    let subtotal_usages: Vec<SubtotalUsage> = tree
        .nodes()
        .filter(|n| n.used_subtotal)
        .filter_map(|n| {
            let subtotal_value = n.subtotal_value?;
            let row_check = n.row_index.and_then(|r| grid.rows().get(r)).map(|row| {
                classifier.reconcile_row(
                    row,
                    classifications,
                    config.mismatch_tolerance_pct,
                    config.mismatch_tolerance_abs,
                )
            });
            Some(SubtotalUsage {
                path: n.path.clone(),
                subtotal_value,
                total_value: n.total_value,
                row_check,
            })
        })
        .collect();

    let all_subtotals_applied = subtotal_usages
        .iter()
        .all(|u| (u.subtotal_value - u.total_value).abs() < 0.01);
    // Rows without any period cells have nothing to disagree with.
    let rows_with_period_disagreement = subtotal_usages
        .iter()
        .filter_map(|u| u.row_check.as_ref())
        .filter(|c| c.calculated_sum != 0.0 && !c.all_valid)
        .count();

    ColumnUsageCheck {
        summary: ColumnSummary::from_classifications(classifications),
        subtotal_usages,
        all_subtotals_applied,
        rows_with_period_disagreement,
    }
}

impl ColumnUsageCheck {
    pub fn render(&self) -> String {
        let excluded = &self.summary.excluded;
        let mut report = String::new();
        report.push_str("COLUMN USAGE\n");
        report.push_str(&format!(
            "  {} columns used for calculations\n",
            self.summary.value_columns.len()
        ));
        report.push_str(&format!(
            "  {} subtotal columns found (used when available)\n",
            self.summary.subtotal_columns.len()
        ));
        report.push_str(&format!(
            "  {} columns excluded from calculations\n",
            excluded.total()
        ));
        for (count, label) in [
            (excluded.subtotals.len(), "subtotal columns"),
            (excluded.notes.len(), "note/remark columns"),
            (excluded.ratios.len(), "ratio/percentage columns"),
            (excluded.headers.len(), "header/label columns"),
            (excluded.unknown.len(), "unclassified columns"),
        ] {
            if count > 0 {
                report.push_str(&format!("    - {} {}\n", count, label));
            }
        }
        if !self.subtotal_usages.is_empty() {
            report.push_str(&format!(
                "  {} accounts took their value from a subtotal column\n",
                self.subtotal_usages.len()
            ));
        }
        if self.rows_with_period_disagreement > 0 {
            report.push_str(&format!(
                "  {} rows have a subtotal that differs from their period cells\n",
                self.rows_with_period_disagreement
            ));
        }
        report
    }
}
