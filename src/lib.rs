//! # Financial Structure
//!
//! A library for deriving trustworthy per-account values from spreadsheet-shaped
//! financial statements: free-text labels, period columns, precomputed
//! subtotals, ratio and note columns, and hierarchy expressed through numbering
//! or indentation.
//!
//! ## Core Concepts
//!
//! - **Column classification**: every column is a period, value, subtotal, note,
//!   ratio, header or unknown column; only period and value columns are summed
//! - **Subtotal precedence**: a row with a nonzero subtotal cell takes that cell
//!   as its value and never adds its period cells on top
//! - **Account paths**: accounts are keyed by their root-to-node path, so a label
//!   that repeats in different sections never collides
//! - **Conservative selection**: only numeric, nonzero leaves with non-aggregate
//!   names are recommended for calculations
//! - **Validation sessions**: calculation is gated on explicit confirmation of the
//!   structure, depreciation periods and the safe-account set
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_structure::*;
//!
//! let grid = SheetGrid::from_records(
//!     ["项目", "1月", "2月", "合计"],
//!     vec![
//!         vec!["长期待摊费用", "", "", "73906.01"],
//!         vec!["  设施设备", "2000", "2613", ""],
//!         vec!["  新店装修", "12000", "12684", ""],
//!     ],
//! )?;
//!
//! let analyzer = StatementAnalyzer::new(AnalysisConfig::default())?;
//! let manager = ValidationStateManager::default();
//!
//! if let ParseOutcome::Success(analysis) = analyzer.analyze_with_session("pl.xlsx", &grid, &manager) {
//!     println!("{}", analysis.validation_report);
//!     let session_id = analysis.session_id.clone().unwrap();
//!     manager.confirm_account_structure(&session_id, &analysis.summary);
//! }
//! ```

pub mod accounts;
pub mod classifier;
pub mod error;
pub mod grid;
pub mod parser;
pub mod reconciliation;
pub mod recommendations;
pub mod schema;
pub mod session;
pub mod utils;
pub mod validation_state;
pub mod validator;

pub use accounts::{AccountNode, AccountPath, HierarchyTree};
pub use classifier::{
    ColumnClassification, ColumnClassifier, ColumnSummary, ColumnType, ExcludedColumns,
    RowReconciliation, SubtotalCheck,
};
pub use error::{FinancialStructureError, Result};
pub use grid::{Cell, SheetGrid, LABEL_COLUMN};
pub use parser::{ExtractedAccount, HierarchyParser};
pub use reconciliation::{
    check_column_usage, validate_parent_child_totals, ColumnUsageCheck, ParentReconciliation,
    ReconciliationReport, VarianceCategory,
};
pub use recommendations::{
    generate_validation_report, AccountSelector, ConservativeRecommendation, ExcludedAccount,
    ExclusionReason,
};
pub use schema::*;
pub use session::{
    AssumptionStatus, ValidationAssumption, ValidationGates, ValidationSession, ValidationSummary,
};
pub use validation_state::{
    CalculationReadiness, SessionSnapshot, SessionStatistics, ValidationStateManager,
};
pub use validator::{
    AmbiguousAccount, CircularReference, HierarchyValidator, SumMismatch, ValidationFlags,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Counts and the safe-account list, copied into a session when the
/// structure is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchySummary {
    pub total_accounts: usize,
    pub safe_accounts: Vec<AccountPath>,
    pub ambiguous_accounts: usize,
    pub sum_mismatches: usize,
    pub circular_references: usize,
    pub calculation_safety_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyAnalysis {
    pub file_id: String,
    pub classifications: Vec<ColumnClassification>,
    pub column_summary: ColumnSummary,
    pub classification_report: String,
    pub tree: HierarchyTree,
    pub flags: ValidationFlags,
    pub safe_accounts: Vec<AccountPath>,
    pub recommendations: ConservativeRecommendation,
    pub reconciliation: ReconciliationReport,
    pub column_usage: ColumnUsageCheck,
    /// Structure, issues, safety score and open questions in one text block.
    pub validation_report: String,
    pub summary: HierarchySummary,
    /// Set when the analysis was opened through a validation session.
    pub session_id: Option<String>,
}

impl HierarchyAnalysis {
    pub fn format_display(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Account hierarchy for {}\n", self.file_id));
        output.push_str(&format!(
            "Total accounts: {} | Safe accounts: {}\n\n",
            self.tree.len(),
            self.safe_accounts.len()
        ));
        output.push_str(&self.tree.render_tree());
        output.push('\n');
        output.push_str(&self.column_usage.render());
        output
    }
}

/// Result of one parse. A failure never carries partial analysis data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseOutcome {
    Success(Box<HierarchyAnalysis>),
    Failure { message: String, kind: String },
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success(_))
    }

    pub fn analysis(&self) -> Option<&HierarchyAnalysis> {
        match self {
            ParseOutcome::Success(analysis) => Some(analysis),
            ParseOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            ParseOutcome::Success(_) => None,
            ParseOutcome::Failure { message, .. } => Some(message),
        }
    }
}

impl From<FinancialStructureError> for ParseOutcome {
    fn from(err: FinancialStructureError) -> Self {
        ParseOutcome::Failure {
            message: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

pub struct StatementAnalyzer {
    config: AnalysisConfig,
    classifier: ColumnClassifier,
    parser: HierarchyParser,
}

impl StatementAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: ColumnClassifier::new(config.classifier.clone())?,
            parser: HierarchyParser::new(config.parser.clone())?,
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze(&self, file_id: &str, grid: &SheetGrid) -> ParseOutcome {
        match self.run(file_id, grid) {
            Ok(analysis) => ParseOutcome::Success(Box::new(analysis)),
            Err(e) => {
                warn!("Parsing failed for {}: {}", file_id, e);
                e.into()
            }
        }
    }

    /// Builds the grid from raw string records first; a malformed grid is a `Failure`.
    pub fn analyze_records<H, R, S>(&self, file_id: &str, headers: H, records: R) -> ParseOutcome
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = Vec<S>>,
        S: AsRef<str>,
    {
        match SheetGrid::from_records(headers, records) {
            Ok(grid) => self.analyze(file_id, &grid),
            Err(e) => {
                warn!("Rejected input for {}: {}", file_id, e);
                e.into()
            }
        }
    }

    /// Analyzes the grid, then opens (or reuses) the file's validation session
    /// and stores a copy of the summary in its user context.
    pub fn analyze_with_session(
        &self,
        file_id: &str,
        grid: &SheetGrid,
        manager: &ValidationStateManager,
    ) -> ParseOutcome {
        let mut outcome = self.analyze(file_id, grid);

        if let ParseOutcome::Success(analysis) = &mut outcome {
            let session = manager.get_or_create_session(file_id);
            let summary = match serde_json::to_value(&analysis.summary) {
                Ok(value) => value,
                Err(e) => return FinancialStructureError::from(e).into(),
            };
            manager.set_user_context(&session.session_id, "hierarchy_summary", summary);
            info!(
                "Analysis for {} attached to session {} ({} safe accounts)",
                file_id,
                session.session_id,
                analysis.safe_accounts.len()
            );
            analysis.session_id = Some(session.session_id);
        }

        outcome
    }

    fn run(&self, file_id: &str, grid: &SheetGrid) -> Result<HierarchyAnalysis> {
        if grid.width() == 0 {
            return Err(FinancialStructureError::InvalidGrid("grid has no columns".to_string()));
        }
        if let Some(idx) = grid.rows().iter().position(|r| r.len() != grid.width()) {
            return Err(FinancialStructureError::InvalidGrid(format!(
                "row {} does not match the {} declared columns",
                idx,
                grid.width()
            )));
        }

        info!("Parsing hierarchy from: {}", file_id);
        let classifications = self.classifier.classify(grid);
        let column_summary = ColumnSummary::from_classifications(&classifications);
        info!(
            "Column intelligence: {} value columns, {} subtotal columns",
            column_summary.value_columns.len(),
            column_summary.subtotal_columns.len()
        );

        let tree = self.parser.parse(grid, &classifications);
        let flags = HierarchyValidator::new(&self.config.parser).validate_hierarchy(&tree);

        let selector = AccountSelector::new(&self.config.parser);
        let recommendations = selector.generate_recommendations(&tree, &flags);
        let safe_accounts = recommendations.recommended_accounts.clone();
        debug!("Safe accounts: {:?}", safe_accounts);

        let reconciliation = validate_parent_child_totals(&tree, &self.config.parser);
        let column_usage =
            check_column_usage(grid, &classifications, &tree, &self.classifier, &self.config.parser);
        let validation_report = generate_validation_report(&tree, &flags, &recommendations);

        let summary = HierarchySummary {
            total_accounts: tree.len(),
            safe_accounts: safe_accounts.clone(),
            ambiguous_accounts: flags.ambiguous_accounts.len(),
            sum_mismatches: flags.sum_mismatches.len(),
            circular_references: flags.circular_references.len(),
            calculation_safety_score: recommendations.calculation_safety_score,
        };

        Ok(HierarchyAnalysis {
            file_id: file_id.to_string(),
            classification_report: self.classifier.generate_report(&classifications),
            classifications,
            column_summary,
            tree,
            flags,
            safe_accounts,
            recommendations,
            reconciliation,
            column_usage,
            validation_report,
            summary,
            session_id: None,
        })
    }
}
