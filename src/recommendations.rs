//! Conservative safe-account selection.
//!
//! An account is usable downstream only if it is a numeric, nonzero leaf whose
//! name does not look like an aggregate. Everything else is excluded with a
//! recorded reason; when the structure is unclear, exclusion wins.

use crate::accounts::{AccountNode, AccountPath, HierarchyTree};
use crate::schema::{ParserConfig, ScoringWeights};
use crate::utils::{format_amount, KeywordMatcher};
use crate::validator::ValidationFlags;
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    Ambiguous,
    HasChildren,
    ZeroOrNonNumeric,
    SuspiciousName,
}

impl ExclusionReason {
    pub fn description(self) -> &'static str {
        match self {
            ExclusionReason::Ambiguous => "Ambiguous parent+value account - risk of double counting",
            ExclusionReason::HasChildren => "Has children - risk of double counting",
            ExclusionReason::ZeroOrNonNumeric => "Zero value or non-numeric",
            ExclusionReason::SuspiciousName => "Suspicious total/subtotal account name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedAccount {
    pub path: AccountPath,
    pub reason: ExclusionReason,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConservativeRecommendation {
    pub total_accounts: usize,
    pub recommended_accounts: Vec<AccountPath>,
    pub excluded_accounts: Vec<ExcludedAccount>,
    pub safe_account_ratio: f64,
    pub calculation_safety_score: f64,
}

impl ConservativeRecommendation {
    pub fn rating(&self) -> &'static str {
        if self.calculation_safety_score >= 0.8 {
            "EXCELLENT"
        } else if self.calculation_safety_score >= 0.6 {
            "GOOD"
        } else {
            "NEEDS REVIEW"
        }
    }
}

pub struct AccountSelector {
    suspicious_names: KeywordMatcher,
    weights: ScoringWeights,
}

impl AccountSelector {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            suspicious_names: KeywordMatcher::new(&config.suspicious_account_names),
            weights: config.scoring.clone(),
        }
    }

    pub fn is_suspicious_name(&self, label: &str) -> bool {
        self.suspicious_names.matches(label)
    }

    /// `None` when the account is safe. The first failing check is reported.
    pub fn evaluate(&self, node: &AccountNode, flags: &ValidationFlags) -> Option<ExclusionReason> {
        if flags.is_ambiguous(&node.path) {
            Some(ExclusionReason::Ambiguous)
        } else if !node.children.is_empty() {
            Some(ExclusionReason::HasChildren)
        } else if !node.has_value() {
            Some(ExclusionReason::ZeroOrNonNumeric)
        } else if self.is_suspicious_name(&node.clean_label) {
            Some(ExclusionReason::SuspiciousName)
        } else {
            None
        }
    }

    pub fn identify_safe_accounts(&self, tree: &HierarchyTree, flags: &ValidationFlags) -> Vec<AccountPath> {
        tree.nodes()
            .filter(|node| self.evaluate(node, flags).is_none())
            .map(|node| node.path.clone())
            .collect()
    }

    pub fn generate_recommendations(
        &self,
        tree: &HierarchyTree,
        flags: &ValidationFlags,
    ) -> ConservativeRecommendation {
        let mut recommended_accounts = Vec::new();
        let mut excluded_accounts = Vec::new();

        for node in tree.nodes() {
            match self.evaluate(node, flags) {
                None => recommended_accounts.push(node.path.clone()),
                Some(reason) => {
                    let message = format!("Excluded '{}': {}", node.path, reason.description());
                    debug!("{}", message);
                    excluded_accounts.push(ExcludedAccount {
                        path: node.path.clone(),
                        reason,
                        message,
                    });
                }
            }
        }

        let total_accounts = tree.len();
        let safe_account_ratio = if total_accounts == 0 {
            0.0
        } else {
            recommended_accounts.len() as f64 / total_accounts as f64
        };
        let calculation_safety_score = (safe_account_ratio
            - self.weights.ambiguous_penalty * flags.ambiguous_accounts.len() as f64
            - self.weights.mismatch_penalty * flags.sum_mismatches.len() as f64)
            .max(0.0);

        info!(
            "Conservative analysis: {} safe, {} excluded, safety score {:.2}",
            recommended_accounts.len(),
            excluded_accounts.len(),
            calculation_safety_score
        );

        ConservativeRecommendation {
            total_accounts,
            recommended_accounts,
            excluded_accounts,
            safe_account_ratio,
            calculation_safety_score,
        }
    }
}

pub fn generate_validation_report(
    tree: &HierarchyTree,
    flags: &ValidationFlags,
    recommendation: &ConservativeRecommendation,
) -> String {
    let total = recommendation.total_accounts;
    let safe = &recommendation.recommended_accounts;
    let exclusion_rate = (total - safe.len()) as f64 / total.max(1) as f64 * 100.0;

    let mut report = String::new();
    report.push_str("ACCOUNT STRUCTURE ANALYSIS\n");
    report.push_str(&format!("{}\n\n", "=".repeat(60)));
    report.push_str(&format!("Total accounts: {}\n", total));
    report.push_str(&format!("Safe accounts: {}\n", safe.len()));
    report.push_str(&format!("Exclusion rate: {:.1}%\n", exclusion_rate));

    report.push_str(&format!("\nSafe accounts ({}):\n", safe.len()));
    for path in safe.iter().take(10) {
        let value = tree.get(path).map(|n| n.total_value).unwrap_or(0.0);
        report.push_str(&format!("  + {}: {}\n", path, format_amount(value)));
    }
    if safe.len() > 10 {
        report.push_str(&format!("  ... and {} more\n", safe.len() - 10));
    }

    if !flags.sum_mismatches.is_empty() {
        report.push_str(&format!("\nSum mismatches ({}):\n", flags.sum_mismatches.len()));
        for m in flags.sum_mismatches.iter().take(3) {
            report.push_str(&format!(
                "  - {}: expected {}, children total {} (diff {})\n",
                m.parent,
                format_amount(m.expected_total),
                format_amount(m.children_total),
                format_amount(m.difference)
            ));
        }
    }

    if !flags.ambiguous_accounts.is_empty() {
        report.push_str(&format!("\nAmbiguous accounts ({}):\n", flags.ambiguous_accounts.len()));
        for a in flags.ambiguous_accounts.iter().take(3) {
            report.push_str(&format!("  - {}: {}\n", a.path, a.reason));
        }
    }

    if !flags.circular_references.is_empty() {
        report.push_str(&format!(
            "\nCircular references ({}):\n",
            flags.circular_references.len()
        ));
        for c in &flags.circular_references {
            report.push_str(&format!("  - {} -> {}\n", c.from, c.to));
        }
    }

    report.push_str(&format!(
        "\nSafety score: {:.2}/1.0 ({})\n",
        recommendation.calculation_safety_score,
        recommendation.rating()
    ));

    if !recommendation.excluded_accounts.is_empty() {
        report.push_str("\nExclusion reasons:\n");
        for excluded in recommendation.excluded_accounts.iter().take(5) {
            report.push_str(&format!("  - {}\n", excluded.message));
        }
        if recommendation.excluded_accounts.len() > 5 {
            report.push_str(&format!(
                "  ... and {} more\n",
                recommendation.excluded_accounts.len() - 5
            ));
        }
    }

    report.push_str("\nValidation required:\n");
    report.push_str("  1. Are the identified safe accounts correct for your analysis?\n");
    report.push_str("  2. Should any excluded accounts be included? (Risk: double counting)\n");
    report.push_str("  3. What depreciation periods apply to long-term assets?\n");
    report.push_str("  4. Are there any account relationships we missed?\n");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::HierarchyValidator;

    fn build() -> (HierarchyTree, ValidationFlags) {
        let mut tree = HierarchyTree::new();
        let parent = AccountPath::root("长期待摊费用");
        tree.insert(AccountNode::new(parent.clone(), 0).with_value(73906.01));
        for (label, value) in [("设施设备", 4613.0), ("新店装修", 24684.0), ("老店装修", 26543.0)] {
            let path = parent.child(label);
            tree.insert(AccountNode::new(path.clone(), 1).with_value(value));
            tree.link(&parent, &path);
        }

        let header = AccountPath::root("营业成本");
        tree.insert(AccountNode::new(header.clone(), 0));
        for (label, value) in [("合计", 500.0), ("空白", 0.0), ("退款", -20.0)] {
            let path = header.child(label);
            tree.insert(AccountNode::new(path.clone(), 1).with_value(value));
            tree.link(&header, &path);
        }
        tree.insert(AccountNode::new(AccountPath::root("说明"), 0));

        let config = ParserConfig::default();
        let flags = HierarchyValidator::new(&config).validate_hierarchy(&tree);
        (tree, flags)
    }

    fn selector() -> AccountSelector {
        AccountSelector::new(&ParserConfig::default())
    }

    #[test]
    fn test_only_leaves_are_safe() {
        let (tree, flags) = build();
        let safe = selector().identify_safe_accounts(&tree, &flags);

        let labels: Vec<&str> = safe.iter().map(|p| p.leaf_label()).collect();
        assert_eq!(labels, vec!["设施设备", "新店装修", "老店装修", "退款"]);
        for path in &safe {
            assert!(tree.get(path).unwrap().children.is_empty());
        }
    }

    #[test]
    fn test_exclusion_reasons() {
        let (tree, flags) = build();
        let rec = selector().generate_recommendations(&tree, &flags);

        let reason_of = |label: &str| {
            rec.excluded_accounts
                .iter()
                .find(|e| e.path.leaf_label() == label)
                .map(|e| e.reason)
        };
        assert_eq!(reason_of("长期待摊费用"), Some(ExclusionReason::Ambiguous));
        assert_eq!(reason_of("营业成本"), Some(ExclusionReason::HasChildren));
        assert_eq!(reason_of("空白"), Some(ExclusionReason::ZeroOrNonNumeric));
        assert_eq!(reason_of("说明"), Some(ExclusionReason::ZeroOrNonNumeric));
        assert_eq!(reason_of("合计"), Some(ExclusionReason::SuspiciousName));
        assert_eq!(rec.excluded_accounts.len() + rec.recommended_accounts.len(), tree.len());
        assert!(rec.excluded_accounts[0].message.contains("risk of double counting"));
    }

    #[test]
    fn test_safety_score() {
        let (tree, flags) = build();
        let rec = selector().generate_recommendations(&tree, &flags);

        // 4 of 9 safe, one ambiguous parent, one mismatch.
        let expected = (4.0 / 9.0 - 0.1 - 0.2_f64).max(0.0);
        assert!((rec.calculation_safety_score - expected).abs() < 1e-9);
        assert_eq!(rec.rating(), "NEEDS REVIEW");
    }

    #[test]
    fn test_score_floored_and_weights_configurable() {
        let (tree, flags) = build();

        let mut config = ParserConfig::default();
        config.scoring.ambiguous_penalty = 5.0;
        let floored = AccountSelector::new(&config).generate_recommendations(&tree, &flags);
        assert_eq!(floored.calculation_safety_score, 0.0);

        config.scoring.ambiguous_penalty = 0.0;
        config.scoring.mismatch_penalty = 0.0;
        let unpenalised = AccountSelector::new(&config).generate_recommendations(&tree, &flags);
        assert!((unpenalised.calculation_safety_score - 4.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_tree_scores_zero() {
        let tree = HierarchyTree::new();
        let rec = selector().generate_recommendations(&tree, &ValidationFlags::default());
        assert_eq!(rec.calculation_safety_score, 0.0);
        assert_eq!(rec.total_accounts, 0);
    }

    #[test]
    fn test_report_lists_issues() {
        let (tree, flags) = build();
        let rec = selector().generate_recommendations(&tree, &flags);
        let report = generate_validation_report(&tree, &flags, &rec);

        assert!(report.contains("Safe accounts: 4"));
        assert!(report.contains("长期待摊费用 > 设施设备: 4,613.00"));
        assert!(report.contains("diff 18,066.01"));
        assert!(report.contains("Safety score: 0.14/1.0 (NEEDS REVIEW)"));
    }
}
