use crate::errors::{AppError, AppResult};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use chrono::NaiveDate;
use std::path::Path;

const BR_DATE_FORMAT: &str = "%d/%m/%Y";

/// Row/column access over a single sheet. Coordinates are 1-based; row 1
/// is the header and is never scanned by the evaluators.
pub trait TabularSource {
    fn cell(&self, row: u32, col: u32) -> Option<CellValue>;
    fn row_count(&self) -> u32;
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl CellValue {
    /// Rendering used for identifiers and report lines. Integral numbers
    /// render without a fractional tail, dates as dd/mm/yyyy.
    pub fn display(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{}", *value as i64)
                } else {
                    value.to_string()
                }
            }
            Self::Date(date) => date.format(BR_DATE_FORMAT).to_string(),
            Self::Bool(value) => value.to_string(),
        }
    }

    /// Presence test for funnel stage cells: zero and the empty string do
    /// not count as filled.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Text(text) => !text.is_empty(),
            Self::Number(value) => *value != 0.0,
            Self::Date(_) => true,
            Self::Bool(value) => *value,
        }
    }

    /// Deadline parsing: a native date cell, or text in dd/mm/yyyy form.
    /// Anything else is skipped by the caller.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Text(text) => NaiveDate::parse_from_str(text.trim(), BR_DATE_FORMAT).ok(),
            _ => None,
        }
    }

    /// Lenient numeric read for the BI value column.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok(),
            Self::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            Self::Date(_) => None,
        }
    }
}

/// Opens a source for the orchestrator. Trait seam so tests can swap in
/// an in-memory sheet.
pub trait SourceOpener: Send + Sync {
    fn open(&self, path: &Path) -> AppResult<Box<dyn TabularSource + Send>>;
}

/// First worksheet of an xlsx workbook. The workbook handle is dropped as
/// soon as the cell range is materialized; only the range is retained.
pub struct XlsxSource {
    range: Range<Data>,
}

impl XlsxSource {
    pub fn open(path: &Path) -> AppResult<Self> {
        let mut workbook: Xlsx<_> = open_workbook(path)
            .map_err(|error| AppError::SourceUnreadable(format!("{}: {}", path.display(), error)))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| {
                AppError::SourceUnreadable(format!("{}: workbook has no sheets", path.display()))
            })??;
        Ok(Self { range })
    }
}

impl TabularSource for XlsxSource {
    fn cell(&self, row: u32, col: u32) -> Option<CellValue> {
        if row == 0 || col == 0 {
            return None;
        }
        self.range.get_value((row - 1, col - 1)).and_then(convert)
    }

    fn row_count(&self) -> u32 {
        self.range.end().map_or(0, |(row, _)| row + 1)
    }
}

fn convert(data: &Data) -> Option<CellValue> {
    match data {
        Data::Empty => None,
        Data::String(text) => Some(CellValue::Text(text.clone())),
        Data::Int(value) => Some(CellValue::Number(*value as f64)),
        Data::Float(value) => Some(CellValue::Number(*value)),
        Data::Bool(value) => Some(CellValue::Bool(*value)),
        Data::DateTime(value) => value.as_datetime().map(|dt| CellValue::Date(dt.date())),
        Data::DateTimeIso(text) => NaiveDate::parse_from_str(&text[..text.len().min(10)], "%Y-%m-%d")
            .ok()
            .map(CellValue::Date),
        Data::DurationIso(_) | Data::Error(_) => None,
    }
}

pub struct XlsxOpener;

impl SourceOpener for XlsxOpener {
    fn open(&self, path: &Path) -> AppResult<Box<dyn TabularSource + Send>> {
        Ok(Box::new(XlsxSource::open(path)?))
    }
}

/// In-memory sheet backed by a grid of optional cells. Used by the test
/// suites in place of a workbook on disk.
pub struct MemorySource {
    rows: Vec<Vec<Option<CellValue>>>,
}

impl MemorySource {
    pub fn from_rows(rows: Vec<Vec<Option<CellValue>>>) -> Self {
        Self { rows }
    }
}

impl TabularSource for MemorySource {
    fn cell(&self, row: u32, col: u32) -> Option<CellValue> {
        if row == 0 || col == 0 {
            return None;
        }
        self.rows
            .get((row - 1) as usize)
            .and_then(|cells| cells.get((col - 1) as usize))
            .and_then(Clone::clone)
    }

    fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }
}
