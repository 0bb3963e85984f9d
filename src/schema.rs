use crate::error::{FinancialStructureError, Result};
use crate::utils::compile_patterns;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for session timeouts and assumption lifetimes, one hundred years in hours.
pub const MAX_SESSION_HOURS: i64 = 100 * 365 * 24;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct KeywordSets {
    #[schemars(
        description = "Header keywords marking a precomputed aggregate column (e.g. '合计', 'Total'). Matched before every other rule."
    )]
    pub subtotal: Vec<String>,

    #[schemars(description = "Header keywords marking a notes/remarks column (e.g. '备注', 'Memo')")]
    pub note: Vec<String>,

    #[schemars(description = "Header keywords marking a ratio/percentage column (e.g. '占比', 'Rate', '%')")]
    pub ratio: Vec<String>,

    #[schemars(description = "Header tokens marking a single time period (months, quarters, years)")]
    pub period: Vec<String>,

    #[schemars(
        description = "Regular expressions matched against the trimmed header to detect period columns that carry no keyword (e.g. '2023', '2023-06')"
    )]
    pub period_patterns: Vec<String>,

    #[schemars(
        description = "Markers that, like the ratio keywords, veto the subtotal rule so that a header such as 'Total %' is classified as a ratio"
    )]
    pub percentage_markers: Vec<String>,

    #[schemars(
        description = "Regular expressions identifying generic placeholder headers (e.g. 'Unnamed: 3', 'Column_2', empty)"
    )]
    pub placeholder_headers: Vec<String>,
}

impl Default for KeywordSets {
    fn default() -> Self {
        Self {
            subtotal: strings(&[
                "合计", "总计", "小计", "汇总", "总额", "累计", "Total", "Subtotal", "Sub-total",
                "Sum", "Grand Total",
            ]),
            note: strings(&[
                "备注", "说明", "附注", "注释", "附件", "Notes", "Note", "Remark", "Remarks",
                "Comment", "Comments", "Memo",
            ]),
            ratio: strings(&[
                "占比", "比例", "百分比", "增长率", "同比", "环比", "率", "Ratio", "Percentage",
                "Percent", "Rate", "Margin", "%", "％",
            ]),
            period: strings(&[
                "上半年", "下半年", "季度", "月", "年", "Jan", "January", "Feb", "February", "Mar",
                "March", "Apr", "April", "May", "Jun", "June", "Jul", "July", "Aug", "August",
                "Sep", "Sept", "September", "Oct", "October", "Nov", "November", "Dec",
                "December", "Q1", "Q2", "Q3", "Q4", "H1", "H2", "Quarter", "FY",
            ]),
            period_patterns: strings(&[
                r"^(19|20)\d{2}$",
                r"^(19|20)\d{2}\s*[-/.]\s*\d{1,2}$",
                r"(?i)^(19|20)\d{2}\s*[-/ ]?\s*q[1-4]$",
            ]),
            percentage_markers: strings(&["%", "％", "占比", "百分比", "Percentage", "Percent"]),
            placeholder_headers: strings(&[
                r"^\s*$",
                r"(?i)^unnamed",
                r"(?i)^col(umn)?[_ ]?\d+$",
                r"^[A-Z]{1,3}$",
                r"^\d{1,2}$",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ClassifierConfig {
    #[schemars(description = "Keyword data consumed by the fixed classification rules")]
    pub keywords: KeywordSets,

    #[schemars(
        description = "Minimum share of non-empty cells that must be text for a column to be a header/label column. Default 0.8."
    )]
    pub header_text_ratio: f64,

    #[schemars(
        description = "Share of non-empty cells that must be numeric (strictly greater) for a column to be a value column. Default 0.5."
    )]
    pub value_numeric_ratio: f64,

    #[schemars(
        description = "Share of declared headers that must be generic placeholders (strictly greater) before the first data row is considered as the header row. Default 0.5."
    )]
    pub generic_header_ratio: f64,

    #[schemars(
        description = "Share of first-row cells that must be text (strictly greater) for the first row to be used as the header row. Default 0.5."
    )]
    pub first_row_text_ratio: f64,

    #[schemars(description = "Number of leading data rows scanned for sample values. Default 10.")]
    pub sample_rows: usize,

    #[schemars(description = "Maximum number of sample values kept per column. Default 3.")]
    pub sample_values: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keywords: KeywordSets::default(),
            header_text_ratio: 0.8,
            value_numeric_ratio: 0.5,
            generic_header_ratio: 0.5,
            first_row_text_ratio: 0.5,
            sample_rows: 10,
            sample_values: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct NumberingRule {
    #[schemars(
        description = "Regular expression anchored at the start of the trimmed label, e.g. '^[一二三四五六七八九十]+、'"
    )]
    pub pattern: String,

    #[schemars(description = "Hierarchy level (0-based) assigned to labels carrying this marker")]
    pub level: usize,
}

impl NumberingRule {
    pub fn new(pattern: &str, level: usize) -> Self {
        Self {
            pattern: pattern.to_string(),
            level,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ScoringWeights {
    #[schemars(description = "Safety score penalty per ambiguous (parent+value) account. Default 0.1.")]
    pub ambiguous_penalty: f64,

    #[schemars(description = "Safety score penalty per parent/children sum mismatch. Default 0.2.")]
    pub mismatch_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            ambiguous_penalty: 0.1,
            mismatch_penalty: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ParserConfig {
    #[schemars(
        description = "Ordered numbering conventions; the first rule whose pattern matches the trimmed label decides the level"
    )]
    pub numbering_rules: Vec<NumberingRule>,

    #[schemars(
        description = "Minimum leading whitespace (in characters) before indentation is used as a level hint. Default 2."
    )]
    pub indentation_threshold: usize,

    #[schemars(description = "Deepest level a label can be assigned. Default 4.")]
    pub max_level: usize,

    #[schemars(description = "Relative tolerance for parent/children sum checks. Default 0.01 (1%).")]
    pub mismatch_tolerance_pct: f64,

    #[schemars(description = "Absolute tolerance floor for parent/children sum checks. Default 1.0.")]
    pub mismatch_tolerance_abs: f64,

    #[schemars(
        description = "Account-name keywords that mark an aggregate row; such rows are never recommended as safe"
    )]
    pub suspicious_account_names: Vec<String>,

    #[schemars(description = "Weights used by the conservative safety score")]
    pub scoring: ScoringWeights,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            numbering_rules: vec![
                NumberingRule::new(r"^[一二三四五六七八九十]+[、.．]", 0),
                NumberingRule::new(r"^[IVX]+[.、]\s*", 0),
                NumberingRule::new(r"^[（(][一二三四五六七八九十]+[）)]", 1),
                NumberingRule::new(r"^[0-9]+\.[0-9]+[.、]?\s*", 3),
                NumberingRule::new(r"^[0-9]+[、.．]\s*", 2),
                NumberingRule::new(r"^[（(][0-9]+[）)]", 3),
                NumberingRule::new(r"^[a-z][）).]\s*", 4),
            ],
            indentation_threshold: 2,
            max_level: 4,
            mismatch_tolerance_pct: 0.01,
            mismatch_tolerance_abs: 1.0,
            suspicious_account_names: strings(&[
                "小计", "合计", "总计", "subtotal", "total", "totals", "grand total",
            ]),
            scoring: ScoringWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct SessionConfig {
    #[schemars(description = "Idle hours after which a validation session is reclaimed. Default 24.")]
    pub session_timeout_hours: i64,

    #[schemars(
        description = "Lifetime of a newly recorded assumption in hours. Null means assumptions never expire. Default 24."
    )]
    pub assumption_ttl_hours: Option<i64>,

    #[schemars(description = "Number of history events retained per session. Default 50.")]
    pub history_limit: usize,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SESSION_HOURS).contains(&self.session_timeout_hours) {
            return Err(FinancialStructureError::InvalidConfig(format!(
                "session_timeout_hours must be between 1 and {}, got {}",
                MAX_SESSION_HOURS, self.session_timeout_hours
            )));
        }
        if let Some(ttl) = self.assumption_ttl_hours {
            if ttl.abs() > MAX_SESSION_HOURS {
                return Err(FinancialStructureError::InvalidConfig(format!(
                    "assumption_ttl_hours must be within {} hours, got {}",
                    MAX_SESSION_HOURS, ttl
                )));
            }
        }
        if self.history_limit == 0 {
            return Err(FinancialStructureError::InvalidConfig(
                "history_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_hours: 24,
            assumption_ttl_hours: Some(24),
            history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    pub classifier: ClassifierConfig,
    pub parser: ParserConfig,
    pub session: SessionConfig,
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        for (name, value) in [
            ("header_text_ratio", c.header_text_ratio),
            ("value_numeric_ratio", c.value_numeric_ratio),
            ("generic_header_ratio", c.generic_header_ratio),
            ("first_row_text_ratio", c.first_row_text_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FinancialStructureError::InvalidConfig(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        let p = &self.parser;
        if p.mismatch_tolerance_pct < 0.0 || p.mismatch_tolerance_abs < 0.0 {
            return Err(FinancialStructureError::InvalidConfig(
                "mismatch tolerances must be non-negative".to_string(),
            ));
        }
        if p.scoring.ambiguous_penalty < 0.0 || p.scoring.mismatch_penalty < 0.0 {
            return Err(FinancialStructureError::InvalidConfig(
                "scoring penalties must be non-negative".to_string(),
            ));
        }
        if let Some(rule) = p.numbering_rules.iter().find(|r| r.level > p.max_level) {
            return Err(FinancialStructureError::InvalidConfig(format!(
                "numbering rule '{}' has level {} above max_level {}",
                rule.pattern, rule.level, p.max_level
            )));
        }

        self.session.validate()?;

        compile_patterns(&c.keywords.period_patterns)?;
        compile_patterns(&c.keywords.placeholder_headers)?;
        let numbering: Vec<String> = p.numbering_rules.iter().map(|r| r.pattern.clone()).collect();
        compile_patterns(&numbering)?;

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
