//! Workbook representation and file I/O operations.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use log::{debug, warn};
use rayon::prelude::*;
use zip::write::{ExtendedFileOptions, FileOptions};
use zip::{CompressionMethod, ZipArchive};

use crate::cell::{CellAddress, CellValue};
use crate::error::{Result, SheetsmithError};
use crate::reader::{
    parse_iso_datetime, parse_sheet, read_package_index, read_zip_file_to_vec, serial_to_datetime, PackageIndex,
    RawCell, RawSheet,
};
use crate::style::{Style, StyleRegistry};
use crate::worksheet::{Worksheet, WorksheetMut};
use crate::writer;
use crate::FastMap;

/// Longest sheet name the format accepts.
const MAX_SHEET_NAME_LEN: usize = 31;
const INVALID_SHEET_NAME_CHARS: [char; 7] = ['\\', '/', '*', '[', ']', ':', '?'];

/// Compression level for saving workbooks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionLevel {
    /// No compression - fastest saves, largest files
    None,
    /// Fast compression (deflate level 1)
    Fast,
    /// Deflate level 6
    #[default]
    Default,
    /// Best compression (deflate level 9) - smallest files, slowest
    Best,
}

/// An Excel workbook: ordered worksheets sharing one style registry.
///
/// Nothing is serialized until one of the `save*` methods runs; each save
/// renders the current state from scratch, so a workbook can be saved, edited
/// and saved again.
#[derive(Debug)]
pub struct Workbook {
    worksheets: Vec<Worksheet>,
    styles: StyleRegistry,
    /// Compression level for saving.
    pub compression: CompressionLevel,
}

impl Workbook {
    /// Create a new empty workbook.
    pub fn new() -> Self {
        Workbook {
            worksheets: Vec::new(),
            styles: StyleRegistry::new(),
            compression: CompressionLevel::default(),
        }
    }

    /// Set compression level for saving.
    pub fn set_compression(&mut self, level: CompressionLevel) {
        self.compression = level;
    }

    /// Append a worksheet and return a handle to it.
    ///
    /// The requested name is cleaned up rather than rejected: illegal
    /// characters are dropped, a blank name becomes `Sheet<n>`, long names are
    /// cut to 31 characters and collisions get a " (2)", " (3)"... suffix.
    pub fn add_worksheet(&mut self, name: &str) -> WorksheetMut<'_> {
        let name = self.unique_sheet_name(name);
        debug!("adding worksheet '{}'", name);
        self.worksheets.push(Worksheet::new(name));
        let index = self.worksheets.len() - 1;
        WorksheetMut::new(&mut self.worksheets[index], &mut self.styles)
    }

    /// Handle to a worksheet by name, compared case-insensitively.
    pub fn worksheet(&mut self, name: &str) -> Option<WorksheetMut<'_>> {
        let wanted = name.to_lowercase();
        let sheet = self
            .worksheets
            .iter_mut()
            .find(|ws| ws.name().to_lowercase() == wanted)?;
        Some(WorksheetMut::new(sheet, &mut self.styles))
    }

    pub fn worksheet_at(&mut self, index: usize) -> Option<WorksheetMut<'_>> {
        let sheet = self.worksheets.get_mut(index)?;
        Some(WorksheetMut::new(sheet, &mut self.styles))
    }

    pub fn worksheets(&self) -> &[Worksheet] {
        &self.worksheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.worksheets.iter().map(Worksheet::name).collect()
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    fn name_taken(&self, candidate: &str) -> bool {
        let candidate = candidate.to_lowercase();
        self.worksheets.iter().any(|ws| ws.name().to_lowercase() == candidate)
    }

    fn unique_sheet_name(&self, requested: &str) -> String {
        let cleaned: String = requested
            .chars()
            .filter(|c| !INVALID_SHEET_NAME_CHARS.contains(c))
            .collect();
        let base = if cleaned.trim().is_empty() {
            format!("Sheet{}", self.worksheets.len() + 1)
        } else {
            truncate_chars(&cleaned, MAX_SHEET_NAME_LEN)
        };
        if !self.name_taken(&base) {
            return base;
        }

        let mut n = 2u32;
        loop {
            let suffix = format!(" ({})", n);
            let stem = truncate_chars(&base, MAX_SHEET_NAME_LEN - suffix.chars().count());
            let candidate = format!("{}{}", stem, suffix);
            if !self.name_taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Save the workbook to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        // Render before creating the file so a bad formula leaves nothing behind.
        let bytes = self.save_to_bytes()?;
        std::fs::write(path, bytes)?;
        debug!("saved workbook to '{}'", path);
        Ok(())
    }

    /// Save the workbook to an in-memory byte vector.
    pub fn save_to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer::write_package(&mut zip, &self.get_file_options(), &self.worksheets, &self.styles)?;
        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }

    /// Save the workbook to any writer that implements Write + Seek.
    pub fn save_to_writer<W: std::io::Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = zip::ZipWriter::new(writer);
        writer::write_package(&mut zip, &self.get_file_options(), &self.worksheets, &self.styles)?;
        zip.finish()?;
        Ok(())
    }

    /// Get the file options based on compression settings.
    fn get_file_options(&self) -> FileOptions<'static, ExtendedFileOptions> {
        match self.compression {
            CompressionLevel::None => FileOptions::default()
                .large_file(false)
                .compression_method(CompressionMethod::Stored),
            CompressionLevel::Fast => FileOptions::default()
                .large_file(false)
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(1)),
            CompressionLevel::Default => FileOptions::default()
                .large_file(false)
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(6)),
            CompressionLevel::Best => FileOptions::default()
                .large_file(false)
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(9)),
        }
    }

    /// Load an existing package as a template.
    ///
    /// Every cell comes back as a value or formula action with a style rebuilt
    /// from the package stylesheet, and every merge is re-applied, so the
    /// result can be edited and saved like a workbook built in code.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(SheetsmithError::FileNotFound(path.to_string()));
        }
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        let workbook = Self::parse_workbook(&mut archive)?;
        debug!("loaded '{}' with {} worksheet(s)", path, workbook.worksheets.len());
        Ok(workbook)
    }

    /// Load a workbook from bytes (e.g., from memory or network).
    pub fn load_from_bytes(data: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;
        Self::parse_workbook(&mut archive)
    }

    fn parse_workbook<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self> {
        // Phase 1: sequential zip extraction
        let index = read_package_index(archive)?;
        let sheet_xml = index
            .sheets
            .iter()
            .map(|entry| read_zip_file_to_vec(archive, &entry.path))
            .collect::<Result<Vec<_>>>()?;

        // Phase 2: parse worksheets, in parallel when there is more than one
        let raw_sheets: Vec<Result<RawSheet>> = if sheet_xml.len() > 1 {
            sheet_xml.par_iter().map(|xml| parse_sheet(xml)).collect()
        } else {
            sheet_xml.iter().map(|xml| parse_sheet(xml)).collect()
        };

        // Phase 3: replay into actions; style interning is sequential
        let mut workbook = Workbook::new();
        let mut styles_by_xf: FastMap<u32, Style> = FastMap::default();
        for (entry, raw) in index.sheets.iter().zip(raw_sheets) {
            let raw = raw?;
            let mut ws = workbook.add_worksheet(&entry.name);
            replay_sheet(&mut ws, &raw, &index, &mut styles_by_xf)?;
        }
        Ok(workbook)
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn replay_sheet(
    ws: &mut WorksheetMut<'_>,
    raw: &RawSheet,
    index: &PackageIndex,
    styles_by_xf: &mut FastMap<u32, Style>,
) -> Result<()> {
    for (&row, cells) in &raw.rows {
        for cell in cells {
            if CellAddress::new(row, cell.column).is_err() {
                warn!(
                    "skipping cell at row {} column {} in '{}': outside the sheet",
                    row,
                    cell.column,
                    ws.name()
                );
                continue;
            }
            let style = cell.style.filter(|&xf| xf != 0).map(|xf| {
                styles_by_xf
                    .entry(xf)
                    .or_insert_with(|| index.stylesheet.to_style(xf))
                    .clone()
            });

            if let Some(formula) = cell.formula_text() {
                ws.set_formula_at(row, cell.column, formula, false, style)?;
                continue;
            }
            match stored_value(cell, index) {
                Some(value) => ws.set_value_at(row, cell.column, value, style)?,
                None => {
                    if let Some(style) = style {
                        ws.cell(row, cell.column)?.set_style(style)?;
                    }
                }
            }
        }
    }

    for range in &raw.merges {
        if range.is_single_cell() {
            continue;
        }
        ws.merge_range(range.top_left(), range.bottom_right(), None)?;
    }
    Ok(())
}

/// The value a stored cell carries, or `None` for a style-only cell.
fn stored_value(cell: &RawCell, index: &PackageIndex) -> Option<CellValue> {
    let value = cell.value.as_deref();
    match cell.cell_type.as_deref() {
        Some("s") => {
            let raw = value?;
            let text = raw.trim().parse::<usize>().ok().and_then(|i| index.shared_strings.get(i));
            if text.is_none() {
                warn!("shared string index '{}' is out of range; cell skipped", raw);
            }
            text.map(|s| CellValue::String(s.clone()))
        }
        Some("b") => value.map(|v| CellValue::Boolean(matches!(v.trim(), "1" | "true" | "TRUE"))),
        Some("d") => value.and_then(parse_iso_datetime).map(CellValue::DateTime),
        Some("inlineStr") => cell.inline_text.clone().map(CellValue::String),
        Some("str") | Some("e") => value.map(|v| CellValue::String(v.to_string())),
        _ => {
            let number = value?.trim().parse::<f64>().ok().filter(|n| n.is_finite())?;
            let is_date = cell.style.is_some_and(|s| index.stylesheet.is_date_style(s));
            match serial_to_datetime(number).filter(|_| is_date) {
                Some(dt) => Some(CellValue::DateTime(dt)),
                None => Some(CellValue::Number(number)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellAction, RangeKey};
    use crate::style::{BorderSides, Color, DateFormat};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_workbook_new() {
        let wb = Workbook::new();
        assert!(wb.worksheets().is_empty());
        assert_eq!(wb.styles().cell_format_count(), 1);
        assert_eq!(wb.compression, CompressionLevel::Default);
    }

    #[test]
    fn test_duplicate_names_get_suffixes() {
        let mut wb = Workbook::new();
        wb.add_worksheet("Report");
        wb.add_worksheet("report");
        wb.add_worksheet("Report");
        assert_eq!(wb.sheet_names(), vec!["Report", "Report (2)", "Report (3)"]);
    }

    #[test]
    fn test_names_are_cleaned_and_truncated() {
        let mut wb = Workbook::new();
        wb.add_worksheet("Q1/Q2 [draft]: totals?");
        wb.add_worksheet("   ");
        let long = "A".repeat(40);
        wb.add_worksheet(&long);
        wb.add_worksheet(&long);
        let names = wb.sheet_names();
        assert_eq!(names[0], "Q1Q2 draft totals");
        assert_eq!(names[1], "Sheet2");
        assert_eq!(names[2], "A".repeat(31));
        assert_eq!(names[3], format!("{} (2)", "A".repeat(27)));
        assert_eq!(names[3].chars().count(), 31);
    }

    #[test]
    fn test_worksheet_lookup() {
        let mut wb = Workbook::new();
        wb.add_worksheet("Data").set_value("A1", 1, None).unwrap();
        assert!(wb.worksheet("DATA").is_some());
        assert!(wb.worksheet("Missing").is_none());
        assert_eq!(wb.worksheet_at(0).unwrap().value_at(1, 1), Some(&CellValue::Number(1.0)));
        assert!(wb.worksheet_at(1).is_none());
    }

    #[test]
    fn test_save_to_bytes() {
        let mut wb = Workbook::new();
        let mut ws = wb.add_worksheet("Test");
        ws.set_value("A1", "Hello", None).unwrap();
        ws.set_value("B1", 42, None).unwrap();
        ws.set_value("A2", true, None).unwrap();

        let bytes = wb.save_to_bytes().unwrap();

        // Verify it's a valid ZIP file (starts with PK)
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[0..2], b"PK");
    }

    #[test]
    fn test_every_compression_level_saves() {
        for level in [
            CompressionLevel::None,
            CompressionLevel::Fast,
            CompressionLevel::Default,
            CompressionLevel::Best,
        ] {
            let mut wb = Workbook::new();
            wb.set_compression(level);
            wb.add_worksheet("S").set_value("A1", "x".repeat(500), None).unwrap();
            let bytes = wb.save_to_bytes().unwrap();
            assert!(Workbook::load_from_bytes(&bytes).is_ok());
        }
    }

    #[test]
    fn test_bad_formula_aborts_save() {
        let mut wb = Workbook::new();
        wb.add_worksheet("S").set_formula("B3", "SUM(A1 A2)", false, None).unwrap();
        match wb.save_to_bytes() {
            Err(SheetsmithError::InvalidFormula { cell, .. }) => assert_eq!(cell, "B3"),
            other => panic!("expected InvalidFormula, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_load_from_bytes_replays_values_styles_and_merges() {
        let header = Style::new()
            .with_bold(true)
            .with_fill_color(Color::rgb(0xE6, 0xE6, 0xE6))
            .with_border(BorderSides::AROUND);
        let when = NaiveDate::from_ymd_opt(2023, 7, 4).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let mut wb = Workbook::new();
        let mut ws = wb.add_worksheet("Summary");
        ws.set_value("A1", "Region", Some(header.clone())).unwrap();
        ws.set_value("B1", 123.45, None).unwrap();
        ws.set_value("C1", when, Some(Style::new().with_date_format(DateFormat::Date))).unwrap();
        ws.set_value("D1", false, None).unwrap();
        ws.set_formula("B2", "SUM(B1:B1)", false, None).unwrap();
        ws.merge_cells("A4", "C5", Some(header.clone())).unwrap();
        wb.add_worksheet("Second").set_value("A1", "other", None).unwrap();

        let bytes = wb.save_to_bytes().unwrap();
        let mut loaded = Workbook::load_from_bytes(&bytes).unwrap();
        assert_eq!(loaded.sheet_names(), vec!["Summary", "Second"]);

        let ws = loaded.worksheet("Summary").unwrap();
        assert_eq!(ws.value_at(1, 1), Some(&CellValue::String("Region".into())));
        assert_eq!(ws.style_at(1, 1), Some(header.clone()));
        assert_eq!(ws.value_at(1, 2), Some(&CellValue::Number(123.45)));
        assert_eq!(ws.value_at(1, 3), Some(&CellValue::DateTime(when)));
        assert_eq!(ws.value_at(1, 4), Some(&CellValue::Boolean(false)));
        assert_eq!(ws.formula_at(2, 2), Some("SUM(B1:B1)"));

        let merge = RangeKey::span(CellAddress::parse("A4").unwrap(), CellAddress::parse("C5").unwrap());
        assert!(matches!(ws.action(&merge), Some(CellAction::Merge { .. })));
        assert_eq!(ws.style_at(5, 3), Some(header));
    }

    #[test]
    fn test_load_resave_is_stable() {
        let mut wb = Workbook::new();
        let mut ws = wb.add_worksheet("S");
        ws.set_value("A1", "keep", Some(Style::new().with_italic(true))).unwrap();
        ws.set_value("B2", 0.5, Some(Style::new().with_percentage(true))).unwrap();

        let first = Workbook::load_from_bytes(&wb.save_to_bytes().unwrap()).unwrap();
        let second = Workbook::load_from_bytes(&first.save_to_bytes().unwrap()).unwrap();
        let a = &first.worksheets()[0];
        let b = &second.worksheets()[0];
        assert_eq!(a.value_at(1, 1), b.value_at(1, 1));
        assert_eq!(a.value_at(2, 2), b.value_at(2, 2));
        assert_eq!(first.styles().cell_format_count(), second.styles().cell_format_count());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Workbook::load("/no/such/template.xlsx"),
            Err(SheetsmithError::FileNotFound(_))
        ));
    }
}
