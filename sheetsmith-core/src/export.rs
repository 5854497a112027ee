//! Bulk export of uniform serde records: one header row from the field names,
//! then one row per record.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cell::CellValue;
use crate::error::{Result, SheetsmithError};
use crate::style::{BorderSides, Color, FontFamily, HorizontalAlignment, Style};
use crate::width::BASE_FONT_SIZE;
use crate::workbook::Workbook;

/// Layout and styling of one exported sheet.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Blank picks the next `Sheet<n>` name.
    pub sheet_name: String,
    pub header_row: u32,
    pub start_column: u32,
    /// Defaults to bold, one point larger than the sheet font, light gray
    /// fill, thin border, centered.
    pub header_style: Option<Style>,
    /// Defaults to a thin border around each cell.
    pub items_style: Option<Style>,
    /// Styles by field name; these replace the items style in that column.
    pub column_styles: BTreeMap<String, Style>,
    pub font_family: FontFamily,
    pub font_size: Option<f64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            sheet_name: String::new(),
            header_row: 1,
            start_column: 1,
            header_style: None,
            items_style: None,
            column_styles: BTreeMap::new(),
            font_family: FontFamily::Default,
            font_size: None,
        }
    }
}

impl ExportOptions {
    pub fn with_sheet_name<S: Into<String>>(mut self, name: S) -> Self {
        self.sheet_name = name.into();
        self
    }

    pub fn with_column_style<S: Into<String>>(mut self, field: S, style: Style) -> Self {
        self.column_styles.insert(field.into(), style);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.header_row < 1 {
            return Err(SheetsmithError::InvalidArgument("header_row must be at least 1".into()));
        }
        if self.start_column < 1 {
            return Err(SheetsmithError::InvalidArgument("start_column must be at least 1".into()));
        }
        Ok(())
    }

    fn resolved_header_style(&self) -> Style {
        self.header_style.clone().unwrap_or_else(|| {
            Style::new()
                .with_bold(true)
                .with_font_size(self.font_size.unwrap_or(BASE_FONT_SIZE) + 1.0)
                .with_fill_color(Color::rgb(0xE6, 0xE6, 0xE6))
                .with_border(BorderSides::AROUND)
                .with_horizontal_alignment(HorizontalAlignment::Center)
        })
    }

    fn resolved_items_style(&self) -> Style {
        self.items_style
            .clone()
            .unwrap_or_else(|| Style::new().with_border(BorderSides::AROUND))
    }
}

/// Shared stop signal for multi-collection exports.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One collection of a multi-sheet export, already serialized.
#[derive(Clone, Debug)]
pub struct ExportSet {
    records: Vec<Value>,
    pub options: ExportOptions,
}

impl ExportSet {
    pub fn new<T: Serialize>(records: &[T], options: ExportOptions) -> Result<Self> {
        Ok(ExportSet {
            records: serialize_records(records)?,
            options,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Write `records` into a new sheet of `into` (or of a fresh workbook).
///
/// Records must serialize to structs or maps; the first record's fields, in
/// declaration order, become the header. An empty slice produces a sheet with
/// no header.
pub fn to_workbook<T: Serialize>(records: &[T], options: &ExportOptions, into: Option<Workbook>) -> Result<Workbook> {
    let rows = serialize_records(records)?;
    let mut workbook = into.unwrap_or_default();
    write_records(&mut workbook, &rows, options)?;
    Ok(workbook)
}

pub fn export_to_bytes<T: Serialize>(records: &[T], options: &ExportOptions) -> Result<Vec<u8>> {
    to_workbook(records, options, None)?.save_to_bytes()
}

pub fn export_to_file<T: Serialize>(records: &[T], options: &ExportOptions, path: &str) -> Result<()> {
    to_workbook(records, options, None)?.save(path)
}

/// One sheet per set, in order. The flag is checked before each set.
pub fn export_multi_to_bytes(sets: &[ExportSet], cancel: &CancellationFlag) -> Result<Vec<u8>> {
    multi_workbook(sets, cancel)?.save_to_bytes()
}

pub fn export_multi_to_file(sets: &[ExportSet], cancel: &CancellationFlag, path: &str) -> Result<()> {
    multi_workbook(sets, cancel)?.save(path)
}

fn multi_workbook(sets: &[ExportSet], cancel: &CancellationFlag) -> Result<Workbook> {
    if sets.is_empty() {
        return Err(SheetsmithError::InvalidArgument(
            "at least one collection is required".into(),
        ));
    }
    let mut workbook = Workbook::new();
    for set in sets {
        if cancel.is_cancelled() {
            debug!("export cancelled after {} sheet(s)", workbook.worksheets().len());
            return Err(SheetsmithError::Cancelled);
        }
        write_records(&mut workbook, &set.records, &set.options)?;
    }
    Ok(workbook)
}

fn serialize_records<T: Serialize>(records: &[T]) -> Result<Vec<Value>> {
    records
        .iter()
        .map(|record| {
            let value = serde_json::to_value(record)?;
            fields_of(&value)?;
            Ok(value)
        })
        .collect()
}

fn fields_of(record: &Value) -> Result<&Map<String, Value>> {
    match record {
        Value::Object(fields) => Ok(fields),
        Value::Array(_) => Err(SheetsmithError::InvalidArgument(
            "records must have named fields; tuples and sequences are not supported".into(),
        )),
        other => Err(SheetsmithError::InvalidArgument(format!(
            "records must be structs or maps, got {}",
            kind_of(other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}

fn write_records(workbook: &mut Workbook, records: &[Value], options: &ExportOptions) -> Result<()> {
    options.validate()?;
    let mut ws = workbook.add_worksheet(&options.sheet_name);
    ws.font_family = options.font_family;
    ws.font_size = options.font_size;

    let Some(first) = records.first() else {
        debug!("exported empty collection to '{}'", ws.name());
        return Ok(());
    };
    let headers: Vec<&String> = fields_of(first)?.keys().collect();

    let header_style = options.resolved_header_style();
    for (offset, header) in headers.iter().enumerate() {
        let column = options.start_column + offset as u32;
        ws.set_value_at(options.header_row, column, header.as_str(), Some(header_style.clone()))?;
    }

    let items_style = options.resolved_items_style();
    for (index, record) in records.iter().enumerate() {
        let fields = fields_of(record)?;
        let row = options.header_row + 1 + index as u32;
        for (offset, header) in headers.iter().enumerate() {
            let column = options.start_column + offset as u32;
            let value = fields.get(header.as_str()).map_or(CellValue::Empty, json_to_cell);
            let style = options
                .column_styles
                .get(header.as_str())
                .cloned()
                .unwrap_or_else(|| items_style.clone());
            ws.set_value_at(row, column, value, Some(style))?;
        }
    }

    debug!(
        "exported {} record(s) x {} column(s) to '{}'",
        records.len(),
        headers.len(),
        ws.name()
    );
    Ok(())
}

fn json_to_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(b) => CellValue::Boolean(*b),
        Value::Number(n) => n.as_f64().map_or(CellValue::Empty, CellValue::Number),
        Value::String(s) => match parse_timestamp(s) {
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::String(s.clone()),
        },
        nested => CellValue::String(nested.to_string()),
    }
}

/// Strings in the shapes chrono serializes dates to become date cells.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
