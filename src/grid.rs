use crate::error::{FinancialStructureError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

static EMPTY_CELL: Cell = Cell::Empty;

/// Column 0 always holds the account label and is never summed.
pub const LABEL_COLUMN: usize = 0;

/// A single typed cell handed over by the spreadsheet reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Maps a raw textual cell to a typed one.
    ///
    /// - blank → `Empty`
    /// - `1,234.5` → `Number(1234.5)`
    /// - `(1,234)` → `Number(-1234.0)` (accounting negative)
    /// - anything else, including `12%`, stays `Text` with its leading
    ///   whitespace intact (indentation is a hierarchy hint)
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }

        let (negated, body) = match trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
        {
            Some(inner) => (true, inner.trim()),
            None => (false, trimmed),
        };

        let normalized: String = body.chars().filter(|c| *c != ',').collect();
        let looks_numeric = !normalized.is_empty()
            && normalized
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
            && normalized.chars().any(|c| c.is_ascii_digit());

        if looks_numeric {
            if let Ok(value) = normalized.parse::<f64>() {
                if value.is_finite() {
                    return Cell::Number(if negated { -value } else { value });
                }
            }
        }

        Cell::Text(raw.trim_end().to_string())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Cell::Text(s) if !s.trim().is_empty())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            Cell::Number(v) => write!(f, "{}", v),
        }
    }
}

/// Row-major sheet contents plus the header strings the reader declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetGrid {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl SheetGrid {
    /// Rows shorter than the header row are padded with `Empty`; longer rows
    /// are rejected because their extra cells have no column to belong to.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        if headers.is_empty() {
            return Err(FinancialStructureError::InvalidGrid(
                "grid has no columns".to_string(),
            ));
        }

        let width = headers.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (idx, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(FinancialStructureError::InvalidGrid(format!(
                    "row {} has {} cells but only {} columns are declared",
                    idx,
                    row.len(),
                    width
                )));
            }
            row.resize(width, Cell::Empty);
            padded.push(row);
        }

        Ok(Self {
            headers,
            rows: padded,
        })
    }

    pub fn from_records<H, R, S>(headers: H, records: R) -> Result<Self>
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = Vec<S>>,
        S: AsRef<str>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let rows = records
            .into_iter()
            .map(|record| record.iter().map(|raw| Cell::infer(raw.as_ref())).collect())
            .collect();
        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |r| r.get(col).unwrap_or(&EMPTY_CELL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_cells() {
        assert_eq!(Cell::infer("  "), Cell::Empty);
        assert_eq!(Cell::infer("1,234.50"), Cell::Number(1234.5));
        assert_eq!(Cell::infer("(4,613)"), Cell::Number(-4613.0));
        assert_eq!(Cell::infer("-26543"), Cell::Number(-26543.0));
        assert_eq!(Cell::infer("12%"), Cell::text("12%"));
        assert_eq!(Cell::infer("  设施设备 "), Cell::text("  设施设备"));
        assert_eq!(Cell::infer("2023-06"), Cell::text("2023-06"));
    }

    #[test]
    fn test_display_integral_numbers_without_fraction() {
        assert_eq!(Cell::Number(2023.0).to_string(), "2023");
        assert_eq!(Cell::Number(0.25).to_string(), "0.25");
        assert_eq!(Cell::Empty.to_string(), "");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let grid = SheetGrid::new(
            vec!["项目".into(), "1月".into(), "备注".into()],
            vec![vec![Cell::text("现金"), Cell::Number(10.0)]],
        )
        .unwrap();

        assert_eq!(grid.height(), 1);
        assert_eq!(grid.rows()[0].len(), 3);
        assert_eq!(grid.cell(0, 2), &Cell::Empty);
        assert_eq!(grid.cell(9, 9), &Cell::Empty);
    }

    #[test]
    fn test_ragged_and_empty_grids_rejected() {
        let too_wide = SheetGrid::new(
            vec!["项目".into()],
            vec![vec![Cell::text("现金"), Cell::Number(10.0)]],
        );
        assert!(matches!(too_wide, Err(FinancialStructureError::InvalidGrid(_))));

        let no_columns = SheetGrid::new(vec![], vec![]);
        assert!(matches!(no_columns, Err(FinancialStructureError::InvalidGrid(_))));
    }

    #[test]
    fn test_from_records() {
        let grid = SheetGrid::from_records(
            ["Account", "Jan", "Feb"],
            vec![vec!["Rent", "1,000", "1,000"], vec!["Notes", "", "n/a"]],
        )
        .unwrap();

        assert_eq!(grid.cell(0, 1), &Cell::Number(1000.0));
        assert_eq!(grid.cell(1, 1), &Cell::Empty);
        assert_eq!(grid.cell(1, 2), &Cell::text("n/a"));
        assert_eq!(grid.column(2).count(), 2);
    }
}
