//! Header-mapped row reading over an existing xlsx package.
//!
//! The first row at `header_row` names the columns; every following
//! consecutive row is decoded lazily into display strings.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use zip::ZipArchive;

use crate::error::{Result, SheetsmithError};
use crate::reader::{
    parse_iso_datetime, parse_sheet, read_package_index, read_zip_file_to_vec, serial_to_datetime, RawCell,
    RawSheet, SheetEntry, Stylesheet,
};
use crate::width::render_date;
use crate::FastMap;

/// Where the header row is and how far the data goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserOptions {
    /// Sheet to read; empty selects the first sheet.
    pub sheet_name: String,
    /// 1-based header row.
    pub header_row: u32,
    /// 1-based column of the first header cell.
    pub start_column: u32,
    /// Maximum number of header cells to read.
    pub header_length: Option<u32>,
    /// Last data row to read, inclusive.
    pub last_row: Option<u32>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            sheet_name: String::new(),
            header_row: 1,
            start_column: 1,
            header_length: None,
            last_row: None,
        }
    }
}

impl ParserOptions {
    fn validate(&self) -> Result<()> {
        if self.header_row < 1 {
            return Err(SheetsmithError::InvalidArgument("header_row must be at least 1".into()));
        }
        if self.start_column < 1 {
            return Err(SheetsmithError::InvalidArgument("start_column must be at least 1".into()));
        }
        if self.header_length == Some(0) {
            return Err(SheetsmithError::InvalidArgument("header_length must be at least 1".into()));
        }
        Ok(())
    }
}

/// Reads rows of one worksheet, keyed by normalized header text.
///
/// ```no_run
/// use sheetsmith_core::{ExcelParser, ParserOptions};
///
/// let mut parser = ExcelParser::open("orders.xlsx", ParserOptions::default())?;
/// for row in parser.rows()? {
///     let row = row?;
///     println!("{:?}", row.get("ORDERID"));
/// }
/// # Ok::<(), sheetsmith_core::SheetsmithError>(())
/// ```
pub struct ExcelParser {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    options: ParserOptions,
    sheets: Vec<SheetEntry>,
    shared_strings: Arc<Vec<String>>,
    stylesheet: Arc<Stylesheet>,
}

impl ExcelParser {
    pub fn open(path: &str, options: ParserOptions) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(SheetsmithError::FileNotFound(path.to_string()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes, options)
    }

    pub fn from_bytes(bytes: Vec<u8>, options: ParserOptions) -> Result<Self> {
        options.validate()?;
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let index = read_package_index(&mut archive)?;
        Ok(ExcelParser {
            archive,
            options,
            sheets: index.sheets,
            shared_strings: Arc::new(index.shared_strings),
            stylesheet: Arc::new(index.stylesheet),
        })
    }

    /// Names of the worksheets in workbook order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Read the header row and return an iterator over the data rows.
    pub fn rows(&mut self) -> Result<ParsedRows> {
        let wanted = self.options.sheet_name.as_str();
        let entry = if wanted.is_empty() {
            self.sheets.first()
        } else {
            self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(wanted))
        };
        let entry = entry.ok_or_else(|| {
            SheetsmithError::SheetNotFound(if wanted.is_empty() {
                "workbook has no worksheets".to_string()
            } else {
                wanted.to_string()
            })
        })?;

        let xml = read_zip_file_to_vec(&mut self.archive, &entry.path)?;
        let sheet = parse_sheet(&xml)?;

        let header_row = self.options.header_row;
        if !sheet.rows.contains_key(&header_row) {
            return Err(SheetsmithError::MissingHeaderRow(header_row));
        }

        let mut names = Vec::new();
        let mut index = FastMap::default();
        let mut column = self.options.start_column;
        while self.options.header_length.map_or(true, |limit| (names.len() as u32) < limit) {
            let Some(cell) = sheet.cell(header_row, column) else {
                break;
            };
            let text = decode_cell(cell, header_row, &self.shared_strings, &self.stylesheet)?.unwrap_or_default();
            let name = normalize_header(&text, column);
            // Duplicate headers: the first column keeps the name.
            index.entry(name.clone()).or_insert(names.len());
            names.push(name);
            column += 1;
        }

        debug!(
            "reading sheet '{}': {} header(s) at row {}",
            entry.name,
            names.len(),
            header_row
        );

        Ok(ParsedRows {
            sheet,
            header: Arc::new(Header { names, index }),
            shared_strings: Arc::clone(&self.shared_strings),
            stylesheet: Arc::clone(&self.stylesheet),
            start_column: self.options.start_column,
            next_row: header_row + 1,
            last_row: self.options.last_row,
            done: false,
        })
    }
}

/// Uppercase, no whitespace; blank headers are named after their column.
fn normalize_header(text: &str, column: u32) -> String {
    let name: String = text.to_uppercase().chars().filter(|c| !c.is_whitespace()).collect();
    if name.is_empty() {
        format!("COL_{}", column)
    } else {
        name
    }
}

#[derive(Debug)]
struct Header {
    names: Vec<String>,
    index: FastMap<String, usize>,
}

/// Lazy iterator over the data rows below the header.
///
/// Iteration stops at the first missing row, the first row whose header
/// columns are all empty, or past `last_row`. After an error no more rows are
/// produced.
pub struct ParsedRows {
    sheet: RawSheet,
    header: Arc<Header>,
    shared_strings: Arc<Vec<String>>,
    stylesheet: Arc<Stylesheet>,
    start_column: u32,
    next_row: u32,
    last_row: Option<u32>,
    done: bool,
}

impl ParsedRows {
    /// Normalized header names, in column order.
    pub fn headers(&self) -> &[String] {
        &self.header.names
    }

    fn decode_row(&self, row_number: u32, cells: &[RawCell]) -> Result<Vec<Option<String>>> {
        (0..self.header.names.len() as u32)
            .map(|offset| {
                let column = self.start_column + offset;
                match cells.iter().find(|c| c.column == column) {
                    Some(cell) => decode_cell(cell, row_number, &self.shared_strings, &self.stylesheet),
                    None => Ok(None),
                }
            })
            .collect()
    }
}

impl Iterator for ParsedRows {
    type Item = Result<ParsedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let row_number = self.next_row;
        if self.last_row.is_some_and(|last| row_number > last) {
            self.done = true;
            return None;
        }
        let Some(cells) = self.sheet.rows.get(&row_number) else {
            self.done = true;
            return None;
        };

        let values = match self.decode_row(row_number, cells) {
            Ok(values) => values,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        if values.iter().all(|v| v.as_deref().map_or(true, str::is_empty)) {
            self.done = true;
            return None;
        }

        self.next_row += 1;
        Some(Ok(ParsedRow {
            row_number,
            values,
            header: Arc::clone(&self.header),
        }))
    }
}

/// One decoded data row.
#[derive(Clone, Debug)]
pub struct ParsedRow {
    row_number: u32,
    values: Vec<Option<String>>,
    header: Arc<Header>,
}

impl ParsedRow {
    pub fn row_number(&self) -> u32 {
        self.row_number
    }

    /// Value under a header. Lookups accept the header as written in the
    /// sheet or in its normalized form.
    pub fn get(&self, header: &str) -> Option<&str> {
        let index = match self.header.index.get(header) {
            Some(&index) => index,
            None => {
                let normalized: String = header.to_uppercase().chars().filter(|c| !c.is_whitespace()).collect();
                *self.header.index.get(&normalized)?
            }
        };
        self.values.get(index)?.as_deref()
    }

    /// (header, value) pairs in column order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.header
            .names
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }
}

/// Display text of a stored cell, or `None` for a cell without content.
fn decode_cell(
    cell: &RawCell,
    row_number: u32,
    shared_strings: &[String],
    stylesheet: &Stylesheet,
) -> Result<Option<String>> {
    let value = cell.value.as_deref();
    let text = match cell.cell_type.as_deref() {
        Some("s") => {
            let Some(raw) = value else { return Ok(None) };
            let found = raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared_strings.get(i));
            match found {
                Some(s) => Some(s.clone()),
                None => {
                    return Err(SheetsmithError::ParseError(format!(
                        "Row {}: shared string index '{}' is out of range",
                        row_number, raw
                    )));
                }
            }
        }
        Some("b") => value.map(|v| {
            let on = matches!(v.trim(), "1" | "true" | "TRUE");
            on.to_string()
        }),
        Some("d") => value.map(|v| match parse_iso_datetime(v) {
            Some(dt) => render_date(&dt, date_format_of(cell, stylesheet)),
            None => v.to_string(),
        }),
        Some("inlineStr") => cell.inline_text.clone(),
        Some("str") | Some("e") => value.map(str::to_string),
        _ => value.map(|v| {
            let is_date = cell.style.is_some_and(|s| stylesheet.is_date_style(s));
            match v.trim().parse::<f64>().ok().filter(|_| is_date).and_then(serial_to_datetime) {
                Some(dt) => render_date(&dt, date_format_of(cell, stylesheet)),
                None => v.to_string(),
            }
        }),
    };
    Ok(text)
}

fn date_format_of(cell: &RawCell, stylesheet: &Stylesheet) -> Option<crate::style::DateFormat> {
    cell.style.and_then(|s| stylesheet.to_style(s).date_format)
}
