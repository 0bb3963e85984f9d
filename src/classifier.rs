//! Column classification for spreadsheet-shaped statements.
//!
//! Every column is given exactly one [`ColumnType`]. Only `Period` and `Value`
//! columns are ever summed; subtotal, note, ratio, header and unknown columns
//! are kept out of calculations at this single point.

use crate::error::Result;
use crate::grid::{Cell, SheetGrid, LABEL_COLUMN};
use crate::schema::ClassifierConfig;
use crate::utils::{compile_patterns, share, sum_tolerance, KeywordMatcher};
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// One time slice (month, quarter, year)
    Period,
    /// Numeric column without a period marker
    Value,
    /// Precomputed aggregate (合计, Total)
    Subtotal,
    /// Notes/remarks
    Note,
    /// Ratio or percentage
    Ratio,
    /// Label column, mostly text
    Header,
    Unknown,
}

impl ColumnType {
    pub fn include_in_calculations(self) -> bool {
        matches!(self, ColumnType::Period | ColumnType::Value)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Period => "period",
            ColumnType::Value => "value",
            ColumnType::Subtotal => "subtotal",
            ColumnType::Note => "note",
            ColumnType::Ratio => "ratio",
            ColumnType::Header => "header",
            ColumnType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnClassification {
    pub index: usize,
    /// Declared header, or the first data row's cell when that row is the real header row.
    pub header: String,
    pub column_type: ColumnType,
    pub sample_values: Vec<Cell>,
    pub include_in_calculations: bool,
    pub header_from_first_row: bool,
    /// Human readable explanation of the decision.
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludedColumns {
    pub subtotals: Vec<usize>,
    pub notes: Vec<usize>,
    pub ratios: Vec<usize>,
    pub headers: Vec<usize>,
    pub unknown: Vec<usize>,
}

impl ExcludedColumns {
    pub fn total(&self) -> usize {
        self.subtotals.len()
            + self.notes.len()
            + self.ratios.len()
            + self.headers.len()
            + self.unknown.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub value_columns: Vec<usize>,
    pub subtotal_columns: Vec<usize>,
    pub excluded: ExcludedColumns,
    pub header_from_first_row: bool,
}

impl ColumnSummary {
    pub fn from_classifications(classifications: &[ColumnClassification]) -> Self {
        let mut summary = ColumnSummary {
            header_from_first_row: classifications.iter().any(|c| c.header_from_first_row),
            ..Default::default()
        };

        for info in classifications {
            if info.index == LABEL_COLUMN {
                summary.excluded.headers.push(info.index);
                continue;
            }
            if info.include_in_calculations {
                summary.value_columns.push(info.index);
                continue;
            }

            match info.column_type {
                ColumnType::Subtotal => {
                    summary.subtotal_columns.push(info.index);
                    summary.excluded.subtotals.push(info.index);
                }
                ColumnType::Note => summary.excluded.notes.push(info.index),
                ColumnType::Ratio => summary.excluded.ratios.push(info.index),
                ColumnType::Header => summary.excluded.headers.push(info.index),
                _ => summary.excluded.unknown.push(info.index),
            }
        }

        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtotalCheck {
    pub column: usize,
    pub header: String,
    pub expected: f64,
    pub calculated: f64,
    pub variance: f64,
    pub variance_pct: f64,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowReconciliation {
    /// Sum of the row's Period/Value cells.
    pub calculated_sum: f64,
    pub checks: Vec<SubtotalCheck>,
    pub all_valid: bool,
}

pub struct ColumnClassifier {
    config: ClassifierConfig,
    subtotal: KeywordMatcher,
    note: KeywordMatcher,
    ratio: KeywordMatcher,
    period: KeywordMatcher,
    percentage: KeywordMatcher,
    period_patterns: Vec<Regex>,
    placeholder_headers: Vec<Regex>,
}

impl ColumnClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let keywords = &config.keywords;
        Ok(Self {
            subtotal: KeywordMatcher::new(&keywords.subtotal),
            note: KeywordMatcher::new(&keywords.note),
            ratio: KeywordMatcher::new(&keywords.ratio),
            period: KeywordMatcher::new(&keywords.period),
            percentage: KeywordMatcher::new(&keywords.percentage_markers),
            period_patterns: compile_patterns(&keywords.period_patterns)?,
            placeholder_headers: compile_patterns(&keywords.placeholder_headers)?,
            config,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, grid: &SheetGrid) -> Vec<ColumnClassification> {
        let header_from_first_row = self.should_use_first_row_as_headers(grid);
        if header_from_first_row {
            info!("Using first data row as column headers (declared headers are placeholders)");
        }

        let start_row = usize::from(header_from_first_row);
        let classifications: Vec<ColumnClassification> = (0..grid.width())
            .map(|col| {
                let header = self.resolve_header(grid, col, header_from_first_row);
                let data: Vec<&Cell> = grid.column(col).skip(start_row).collect();
                let (column_type, reason) = self.classify_single_column(&header, &data);

                let sample_values: Vec<Cell> = data
                    .iter()
                    .take(self.config.sample_rows)
                    .filter(|c| !c.is_empty())
                    .take(self.config.sample_values)
                    .map(|c| (*c).clone())
                    .collect();

                debug!("Column {} '{}' -> {} ({})", col, header, column_type.as_str(), reason);

                ColumnClassification {
                    index: col,
                    header,
                    column_type,
                    sample_values,
                    include_in_calculations: column_type.include_in_calculations(),
                    header_from_first_row,
                    reason,
                }
            })
            .collect();

        info!("Classified {} columns", classifications.len());
        classifications
    }

    /// True when most declared headers are placeholders and most first-row
    /// cells are text, i.e. the sheet carries its real header in row 0.
    pub fn should_use_first_row_as_headers(&self, grid: &SheetGrid) -> bool {
        let Some(first_row) = grid.rows().first() else {
            return false;
        };

        let generic = grid
            .headers()
            .iter()
            .filter(|h| self.is_placeholder_header(h))
            .count();
        if share(generic, grid.width()) <= self.config.generic_header_ratio {
            return false;
        }

        let text_cells = first_row.iter().filter(|c| c.is_text()).count();
        share(text_cells, first_row.len()) > self.config.first_row_text_ratio
    }

    pub fn is_placeholder_header(&self, header: &str) -> bool {
        let trimmed = header.trim();
        self.placeholder_headers.iter().any(|re| re.is_match(trimmed))
    }

    fn resolve_header(&self, grid: &SheetGrid, col: usize, from_first_row: bool) -> String {
        let raw = if from_first_row {
            grid.cell(0, col).to_string()
        } else {
            grid.headers().get(col).cloned().unwrap_or_default()
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            format!("Column_{}", col)
        } else {
            trimmed.to_string()
        }
    }

    /// Header keyword rules in priority order; `None` when no header rule fires.
    pub fn classify_header(&self, header: &str) -> Option<(ColumnType, String)> {
        if let Some(keyword) = self.subtotal.find(header) {
            if let Some(marker) = self.ratio.find(header).or_else(|| self.percentage.find(header)) {
                debug!(
                    "Header '{}' matched subtotal keyword '{}' but carries ratio marker '{}'",
                    header, keyword, marker
                );
            } else {
                return Some((ColumnType::Subtotal, format!("subtotal keyword '{}'", keyword)));
            }
        }

        if let Some(keyword) = self.note.find(header) {
            return Some((ColumnType::Note, format!("note keyword '{}'", keyword)));
        }

        if let Some(keyword) = self.ratio.find(header).or_else(|| self.percentage.find(header)) {
            return Some((ColumnType::Ratio, format!("ratio keyword '{}'", keyword)));
        }

        if let Some(keyword) = self.period.find(header) {
            return Some((ColumnType::Period, format!("period token '{}'", keyword)));
        }

        let trimmed = header.trim();
        if self.period_patterns.iter().any(|re| re.is_match(trimmed)) {
            return Some((ColumnType::Period, "period pattern".to_string()));
        }

        None
    }

    fn classify_single_column(&self, header: &str, data: &[&Cell]) -> (ColumnType, String) {
        if let Some(decision) = self.classify_header(header) {
            return decision;
        }

        let non_empty: Vec<&&Cell> = data.iter().filter(|c| !c.is_empty()).collect();
        if non_empty.is_empty() {
            return (ColumnType::Unknown, "column is empty".to_string());
        }

        // Text check runs first so mixed label/value columns stay out of sums.
        let text_share = share(non_empty.iter().filter(|c| c.is_text()).count(), non_empty.len());
        if text_share >= self.config.header_text_ratio {
            return (
                ColumnType::Header,
                format!("{:.0}% of cells are text", text_share * 100.0),
            );
        }

        let numeric_share = share(
            non_empty.iter().filter(|c| c.as_number().is_some()).count(),
            non_empty.len(),
        );
        if numeric_share > self.config.value_numeric_ratio {
            return (
                ColumnType::Value,
                format!("{:.0}% of cells are numeric", numeric_share * 100.0),
            );
        }

        (
            ColumnType::Unknown,
            "no header keyword and no dominant cell type".to_string(),
        )
    }

    /// Compares a row's Period/Value sum against each nonzero subtotal cell in it.
    pub fn reconcile_row(
        &self,
        row: &[Cell],
        classifications: &[ColumnClassification],
        tolerance_pct: f64,
        tolerance_abs: f64,
    ) -> RowReconciliation {
        let calculated_sum: f64 = classifications
            .iter()
            .filter(|c| c.include_in_calculations && c.index != LABEL_COLUMN)
            .filter_map(|c| row.get(c.index).and_then(Cell::as_number))
            .sum();

        let checks: Vec<SubtotalCheck> = classifications
            .iter()
            .filter(|c| c.column_type == ColumnType::Subtotal)
            .filter_map(|c| {
                let expected = row.get(c.index).and_then(Cell::as_number)?;
                if expected == 0.0 {
                    return None;
                }
                let variance = (calculated_sum - expected).abs();
                let tolerance = sum_tolerance(expected.abs(), tolerance_pct, tolerance_abs);
                Some(SubtotalCheck {
                    column: c.index,
                    header: c.header.clone(),
                    expected,
                    calculated: calculated_sum,
                    variance,
                    variance_pct: variance / expected.abs() * 100.0,
                    valid: variance <= tolerance,
                })
            })
            .collect();

        RowReconciliation {
            calculated_sum,
            all_valid: checks.iter().all(|c| c.valid),
            checks,
        }
    }

    pub fn generate_report(&self, classifications: &[ColumnClassification]) -> String {
        let summary = ColumnSummary::from_classifications(classifications);
        let header_of = |idx: usize| {
            classifications
                .iter()
                .find(|c| c.index == idx)
                .map(|c| c.header.as_str())
                .unwrap_or("")
        };

        let mut output = String::new();
        output.push_str("COLUMN CLASSIFICATION REPORT\n");
        output.push_str(&format!("{}\n\n", "=".repeat(70)));

        if summary.header_from_first_row {
            output.push_str("Header row: taken from the first data row\n\n");
        }

        output.push_str(&format!(
            "VALUE COLUMNS (included in calculations): {}\n",
            summary.value_columns.len()
        ));
        for idx in summary.value_columns.iter().take(10) {
            let kind = classifications
                .iter()
                .find(|c| c.index == *idx)
                .map(|c| c.column_type.as_str())
                .unwrap_or("unknown");
            output.push_str(&format!("  - Column {}: {} [{}]\n", idx, header_of(*idx), kind));
        }
        if summary.value_columns.len() > 10 {
            output.push_str(&format!("  ... and {} more\n", summary.value_columns.len() - 10));
        }

        if !summary.subtotal_columns.is_empty() {
            output.push_str(&format!(
                "\nSUBTOTAL COLUMNS (used instead of summing periods): {}\n",
                summary.subtotal_columns.len()
            ));
            for idx in &summary.subtotal_columns {
                output.push_str(&format!("  - Column {}: {}\n", idx, header_of(*idx)));
            }
        }

        let excluded = &summary.excluded;
        if excluded.total() > 0 {
            output.push_str(&format!("\nEXCLUDED COLUMNS: {}\n", excluded.total()));
            for (label, cols) in [
                ("Subtotals", &excluded.subtotals),
                ("Notes/Remarks", &excluded.notes),
                ("Ratios/Percentages", &excluded.ratios),
                ("Headers/Labels", &excluded.headers),
                ("Unclassified", &excluded.unknown),
            ] {
                if cols.is_empty() {
                    continue;
                }
                output.push_str(&format!("  {} ({}):\n", label, cols.len()));
                for idx in cols.iter().take(3) {
                    output.push_str(&format!("    - Column {}: {}\n", idx, header_of(*idx)));
                }
            }
        }

        output.push_str(&format!("\n{}\n", "=".repeat(70)));
        output.push_str("Is this column classification correct for your analysis?\n");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ColumnClassifier {
        ColumnClassifier::new(ClassifierConfig::default()).unwrap()
    }

    fn n(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn t(s: &str) -> Cell {
        Cell::text(s)
    }

    fn type_of(classifications: &[ColumnClassification], idx: usize) -> ColumnType {
        classifications[idx].column_type
    }

    #[test]
    fn test_declared_headers() {
        let grid = SheetGrid::new(
            vec![
                "项目".into(),
                "5月".into(),
                "6月".into(),
                "合计".into(),
                "占比".into(),
                "备注".into(),
            ],
            vec![
                vec![t("营业收入"), n(100.0), n(120.0), n(220.0), n(0.6), t("含税")],
                vec![t("营业成本"), n(60.0), n(70.0), n(130.0), n(0.4), Cell::Empty],
            ],
        )
        .unwrap();

        let c = classifier().classify(&grid);

        assert_eq!(type_of(&c, 0), ColumnType::Header);
        assert_eq!(type_of(&c, 1), ColumnType::Period);
        assert_eq!(type_of(&c, 2), ColumnType::Period);
        assert_eq!(type_of(&c, 3), ColumnType::Subtotal);
        assert_eq!(type_of(&c, 4), ColumnType::Ratio);
        assert_eq!(type_of(&c, 5), ColumnType::Note);
        assert!(!c[0].header_from_first_row);

        let summary = ColumnSummary::from_classifications(&c);
        assert_eq!(summary.value_columns, vec![1, 2]);
        assert_eq!(summary.subtotal_columns, vec![3]);
        assert_eq!(summary.excluded.ratios, vec![4]);
        assert_eq!(summary.excluded.notes, vec![5]);
        assert_eq!(summary.excluded.headers, vec![0]);
    }

    #[test]
    fn test_numeric_ratio_and_note_columns_never_values() {
        let grid = SheetGrid::new(
            vec!["Account".into(), "占比".into(), "备注".into()],
            vec![
                vec![t("Rent"), n(0.25), n(1.0)],
                vec![t("Wages"), n(0.75), n(2.0)],
            ],
        )
        .unwrap();

        let c = classifier().classify(&grid);
        let summary = ColumnSummary::from_classifications(&c);

        assert!(!summary.value_columns.contains(&1));
        assert!(!summary.value_columns.contains(&2));
        assert!(!c[1].include_in_calculations);
        assert!(!c[2].include_in_calculations);
    }

    #[test]
    fn test_label_column_never_counted_as_value() {
        let grid = SheetGrid::new(
            vec!["年度项目".into(), "1月".into(), "合计".into()],
            vec![vec![t("营业收入"), n(100.0), n(100.0)]],
        )
        .unwrap();
        let classifier = classifier();
        let c = classifier.classify(&grid);
        assert_eq!(c[0].column_type, ColumnType::Period);

        let summary = ColumnSummary::from_classifications(&c);
        assert_eq!(summary.value_columns, vec![1]);
        assert_eq!(summary.excluded.headers, vec![0]);

        let row = classifier.reconcile_row(&grid.rows()[0], &c, 0.01, 1.0);
        assert_eq!(row.calculated_sum, 100.0);
        assert!(row.all_valid);
    }

    #[test]
    fn test_total_percent_is_ratio() {
        let c = classifier();
        assert_eq!(c.classify_header("Total %").map(|d| d.0), Some(ColumnType::Ratio));
        assert_eq!(c.classify_header("合计占比").map(|d| d.0), Some(ColumnType::Ratio));
        assert_eq!(c.classify_header("Grand Total").map(|d| d.0), Some(ColumnType::Subtotal));
    }

    #[test]
    fn test_total_rate_headers_are_ratios() {
        let c = classifier();
        for header in ["累计增长率", "合计比例", "Total Rate", "Total Ratio"] {
            assert_eq!(
                c.classify_header(header).map(|d| d.0),
                Some(ColumnType::Ratio),
                "header {}",
                header
            );
        }
        assert_eq!(c.classify_header("累计").map(|d| d.0), Some(ColumnType::Subtotal));
    }

    #[test]
    fn test_period_headers() {
        let c = classifier();
        assert_eq!(c.classify_header("Mar-24").map(|d| d.0), Some(ColumnType::Period));
        assert_eq!(c.classify_header("2023").map(|d| d.0), Some(ColumnType::Period));
        assert_eq!(c.classify_header("2023-06").map(|d| d.0), Some(ColumnType::Period));
        assert_eq!(c.classify_header("2024 Q3").map(|d| d.0), Some(ColumnType::Period));
        assert_eq!(c.classify_header("第一季度").map(|d| d.0), Some(ColumnType::Period));
        assert_eq!(c.classify_header("Market"), None);
    }

    #[test]
    fn test_first_row_used_as_header() {
        let grid = SheetGrid::new(
            vec!["损益表".into(), "Unnamed: 1".into(), "Unnamed: 2".into(), "Unnamed: 3".into()],
            vec![
                vec![t("损益类别"), t("1月"), t("合计"), t("备注")],
                vec![t("营业收入"), n(100.0), n(100.0), Cell::Empty],
                vec![t("营业成本"), n(40.0), n(40.0), t("估算")],
            ],
        )
        .unwrap();

        let classifier = classifier();
        assert!(classifier.should_use_first_row_as_headers(&grid));

        let c = classifier.classify(&grid);
        assert!(c.iter().all(|info| info.header_from_first_row));
        assert_eq!(c[1].header, "1月");
        assert_eq!(type_of(&c, 0), ColumnType::Header);
        assert_eq!(type_of(&c, 1), ColumnType::Period);
        assert_eq!(type_of(&c, 2), ColumnType::Subtotal);
        assert_eq!(type_of(&c, 3), ColumnType::Note);
        // Samples skip the header row.
        assert_eq!(c[1].sample_values, vec![n(100.0), n(40.0)]);
    }

    #[test]
    fn test_first_row_not_used_when_headers_meaningful() {
        let grid = SheetGrid::new(
            vec!["Account".into(), "Unnamed: 1".into(), "Amount".into()],
            vec![vec![t("Label"), t("x"), t("y")]],
        )
        .unwrap();
        assert!(!classifier().should_use_first_row_as_headers(&grid));
    }

    #[test]
    fn test_content_rules() {
        let grid = SheetGrid::new(
            vec!["A".into(), "Amount".into(), "Mixed".into(), "Empty".into(), "Split".into()],
            vec![
                vec![t("x"), n(1.0), t("a"), Cell::Empty, t("a")],
                vec![t("y"), n(2.0), t("b"), Cell::Empty, n(1.0)],
                vec![t("z"), n(3.0), t("c"), Cell::Empty, t("b")],
                vec![t("w"), t("n/a"), t("d"), Cell::Empty, n(2.0)],
                vec![t("v"), n(5.0), n(9.0), Cell::Empty, Cell::Empty],
            ],
        )
        .unwrap();

        let c = classifier().classify(&grid);
        assert_eq!(type_of(&c, 1), ColumnType::Value);
        // 4 of 5 cells are text: exactly the 80% threshold.
        assert_eq!(type_of(&c, 2), ColumnType::Header);
        assert_eq!(type_of(&c, 3), ColumnType::Unknown);
        assert_eq!(type_of(&c, 4), ColumnType::Unknown);
        assert_eq!(c[1].sample_values.len(), 3);
    }

    #[test]
    fn test_reconcile_row() {
        let grid = SheetGrid::new(
            vec!["项目".into(), "1月".into(), "2月".into(), "合计".into()],
            vec![
                vec![t("收入"), n(100.0), n(200.0), n(300.5)],
                vec![t("成本"), n(100.0), n(200.0), n(400.0)],
            ],
        )
        .unwrap();

        let classifier = classifier();
        let c = classifier.classify(&grid);

        let ok = classifier.reconcile_row(&grid.rows()[0], &c, 0.01, 1.0);
        assert_eq!(ok.calculated_sum, 300.0);
        assert!(ok.all_valid);

        let bad = classifier.reconcile_row(&grid.rows()[1], &c, 0.01, 1.0);
        assert!(!bad.all_valid);
        assert_eq!(bad.checks.len(), 1);
        assert_eq!(bad.checks[0].variance, 100.0);
    }

    #[test]
    fn test_report_mentions_exclusions() {
        let grid = SheetGrid::new(
            vec!["项目".into(), "1月".into(), "合计".into(), "备注".into()],
            vec![vec![t("收入"), n(1.0), n(1.0), t("x")]],
        )
        .unwrap();

        let classifier = classifier();
        let report = classifier.generate_report(&classifier.classify(&grid));

        assert!(report.contains("VALUE COLUMNS (included in calculations): 1"));
        assert!(report.contains("Column 2: 合计"));
        assert!(report.contains("Notes/Remarks (1)"));
    }
}
