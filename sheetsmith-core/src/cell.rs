//! Cell values, addresses and the actions recorded against them.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::style::Style;
use crate::utils::{coordinate_from_row_col, parse_coordinate, validate_cell};

/// A value written into a cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    /// Written natively as an ISO 8601 date cell.
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Text used for width estimation and display.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            CellValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

/// Shortest text for a number: integral values print without a fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        itoa::Buffer::new().format(n as i64).to_string()
    } else {
        ryu::Buffer::new().format(n).to_string()
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<f32> for CellValue {
    fn from(n: f32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<u32> for CellValue {
    fn from(n: u32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(dt: NaiveDateTime) -> Self {
        CellValue::DateTime(dt)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::DateTime(d.and_time(chrono::NaiveTime::MIN))
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// A validated 1-based cell position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub row: u32,
    pub column: u32,
}

impl CellAddress {
    /// Fails with `OutOfRange` when the position is outside the sheet.
    pub fn new(row: u32, column: u32) -> Result<Self> {
        validate_cell(row, column)?;
        Ok(CellAddress { row, column })
    }

    /// Parse an A1-style reference.
    pub fn parse(address: &str) -> Result<Self> {
        let (row, column) = parse_coordinate(address)?;
        Ok(CellAddress { row, column })
    }

    pub fn to_a1(&self) -> String {
        coordinate_from_row_col(self.row, self.column)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

impl FromStr for CellAddress {
    type Err = crate::error::SheetsmithError;

    fn from_str(s: &str) -> Result<Self> {
        CellAddress::parse(s)
    }
}

/// Key of the action map: a single cell (start == end) or a merge rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeKey {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl RangeKey {
    pub fn cell(at: CellAddress) -> Self {
        RangeKey {
            start_row: at.row,
            start_col: at.column,
            end_row: at.row,
            end_col: at.column,
        }
    }

    /// Normalized rectangle spanned by two corners given in any order.
    pub fn span(a: CellAddress, b: CellAddress) -> Self {
        RangeKey {
            start_row: a.row.min(b.row),
            start_col: a.column.min(b.column),
            end_row: a.row.max(b.row),
            end_col: a.column.max(b.column),
        }
    }

    pub fn is_single_cell(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }

    pub fn contains(&self, row: u32, column: u32) -> bool {
        (self.start_row..=self.end_row).contains(&row) && (self.start_col..=self.end_col).contains(&column)
    }

    pub fn top_left(&self) -> CellAddress {
        CellAddress {
            row: self.start_row,
            column: self.start_col,
        }
    }

    pub fn bottom_right(&self) -> CellAddress {
        CellAddress {
            row: self.end_row,
            column: self.end_col,
        }
    }

    /// "A1" for a single cell, "A1:C3" otherwise.
    pub fn to_a1(&self) -> String {
        if self.is_single_cell() {
            self.top_left().to_a1()
        } else {
            format!("{}:{}", self.top_left(), self.bottom_right())
        }
    }
}

/// One formatted run of an inline rich-text cell.
#[derive(Clone, Debug, PartialEq)]
pub struct RichTextRun {
    pub text: String,
    pub style: Style,
}

impl RichTextRun {
    pub fn new<S: Into<String>>(text: S, style: Style) -> Self {
        RichTextRun {
            text: text.into(),
            style,
        }
    }

    pub fn plain<S: Into<String>>(text: S) -> Self {
        Self::new(text, Style::default())
    }
}

/// A pending mutation, materialized only when the workbook is saved.
#[derive(Clone, Debug, PartialEq)]
pub enum CellAction {
    Value {
        at: CellAddress,
        value: CellValue,
        style_index: Option<u32>,
    },
    /// Formula text is kept without its leading '='.
    Formula {
        at: CellAddress,
        text: String,
        is_relative: bool,
        style_index: Option<u32>,
    },
    StyleOnly {
        at: CellAddress,
        style_index: Option<u32>,
    },
    Merge {
        range: RangeKey,
        style_index: Option<u32>,
    },
    RichText {
        at: CellAddress,
        runs: Vec<RichTextRun>,
        style_index: Option<u32>,
    },
}

impl CellAction {
    /// Top-left cell the action is anchored on.
    pub fn origin(&self) -> CellAddress {
        match self {
            CellAction::Value { at, .. }
            | CellAction::Formula { at, .. }
            | CellAction::StyleOnly { at, .. }
            | CellAction::RichText { at, .. } => *at,
            CellAction::Merge { range, .. } => range.top_left(),
        }
    }

    pub fn key(&self) -> RangeKey {
        match self {
            CellAction::Merge { range, .. } => *range,
            other => RangeKey::cell(other.origin()),
        }
    }

    pub fn style_index(&self) -> Option<u32> {
        match self {
            CellAction::Value { style_index, .. }
            | CellAction::Formula { style_index, .. }
            | CellAction::StyleOnly { style_index, .. }
            | CellAction::Merge { style_index, .. }
            | CellAction::RichText { style_index, .. } => *style_index,
        }
    }

    pub fn set_style_index(&mut self, index: Option<u32>) {
        match self {
            CellAction::Value { style_index, .. }
            | CellAction::Formula { style_index, .. }
            | CellAction::StyleOnly { style_index, .. }
            | CellAction::Merge { style_index, .. }
            | CellAction::RichText { style_index, .. } => *style_index = index,
        }
    }
}
