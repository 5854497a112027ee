//! Package reading shared by the row parser and template loading.
//!
//! Everything here works on part bytes already pulled out of the zip archive:
//! the workbook sheet list, relationship targets, the shared string table, the
//! stylesheet and raw worksheet cells.

use std::collections::BTreeMap;
use std::io::{BufRead, Cursor, Read, Seek};

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::cell::{CellAddress, RangeKey};
use crate::error::{Result, SheetsmithError};
use crate::style::{
    BorderSides, Color, DateFormat, FontDecoration, FontFamily, HorizontalAlignment, Style, VerticalAlignment,
    DATE_HOURS_CODE, DATE_HOURS_MINUTES_SECONDS_CODE,
};
use crate::utils::{parse_coordinate_bytes, parse_range};
use crate::FastMap;

/// A worksheet declared in `xl/workbook.xml`, with its resolved part path.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub path: String,
}

/// Workbook-level data needed before any worksheet can be decoded.
#[derive(Debug)]
pub(crate) struct PackageIndex {
    pub sheets: Vec<SheetEntry>,
    pub shared_strings: Vec<String>,
    pub stylesheet: Stylesheet,
}

/// Read the sheet list, shared strings and stylesheet of a package.
pub(crate) fn read_package_index<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<PackageIndex> {
    let workbook_xml = read_zip_file_to_vec(archive, "xl/workbook.xml")?;
    let rels_xml = read_zip_file_to_vec(archive, "xl/_rels/workbook.xml.rels").ok();
    let shared_strings_xml = read_zip_file_to_vec(archive, "xl/sharedStrings.xml").ok();
    let styles_xml = read_zip_file_to_vec(archive, "xl/styles.xml").ok();

    let declared = parse_workbook_sheets(Cursor::new(&workbook_xml))?;
    let rels = match rels_xml {
        Some(xml) => parse_workbook_rels(Cursor::new(&xml))?,
        None => FastMap::default(),
    };

    let sheets = declared
        .into_iter()
        .map(|(name, rel_id, sheet_id)| {
            let path = match rel_id.as_ref().and_then(|id| rels.get(id)) {
                Some(target) => match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{}", target),
                },
                None => format!("xl/worksheets/sheet{}.xml", sheet_id),
            };
            SheetEntry { name, path }
        })
        .collect::<Vec<_>>();

    let shared_strings = match shared_strings_xml {
        Some(xml) => parse_shared_strings(Cursor::new(&xml))?,
        None => Vec::new(),
    };
    let stylesheet = match styles_xml {
        Some(xml) => parse_stylesheet(&xml)?,
        None => Stylesheet::default(),
    };

    debug!(
        "package index: {} sheet(s), {} shared string(s), {} cell format(s)",
        sheets.len(),
        shared_strings.len(),
        stylesheet.cell_formats.len()
    );
    Ok(PackageIndex {
        sheets,
        shared_strings,
        stylesheet,
    })
}

/// Read a file from the ZIP archive into a Vec<u8>.
pub(crate) fn read_zip_file_to_vec<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| SheetsmithError::InvalidFormat(format!("Failed to find {} in archive: {}", path, e)))?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Sheets declared in workbook.xml as (name, relationship id, sheetId).
pub(crate) fn parse_workbook_sheets<R: BufRead>(reader: R) -> Result<Vec<(String, Option<String>, u32)>> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);

    let mut sheets = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"sheet" => {
                if let Some(name) = get_attr_str(&e, b"name") {
                    let sheet_id = get_attr_u32(&e, b"sheetId").unwrap_or(sheets.len() as u32 + 1);
                    let rel_id = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"r:id" || a.key.local_name().as_ref() == b"id")
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                    sheets.push((name, rel_id, sheet_id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SheetsmithError::ParseError(format!(
                    "XML parsing error in workbook.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// Relationship id to target path.
pub(crate) fn parse_workbook_rels<R: BufRead>(reader: R) -> Result<FastMap<String, String>> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);

    let mut rels = FastMap::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (get_attr_str(&e, b"Id"), get_attr_str(&e, b"Target")) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

pub(crate) fn parse_shared_strings<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(reader);
    // Whitespace inside <t> is significant.
    reader.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_t && !in_phonetic => {
                current.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SheetsmithError::ParseError(format!(
                    "XML parsing error in sharedStrings.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

fn get_attr_str(e: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Some(match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            });
        }
    }
    None
}

fn get_attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    get_attr_str(e, key).and_then(|s| s.parse().ok())
}

fn get_attr_f64(e: &BytesStart, key: &[u8]) -> Option<f64> {
    get_attr_str(e, key).and_then(|s| s.parse().ok())
}

/// Flag elements such as `<b/>` are on unless `val` says otherwise.
fn get_flag(e: &BytesStart) -> bool {
    !matches!(get_attr_str(e, b"val").as_deref(), Some("0" | "false" | "none"))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ParsedFont {
    pub size: Option<f64>,
    pub name: Option<String>,
    pub decoration: FontDecoration,
    pub color: Option<Color>,
}

/// One `cellXfs` record.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ParsedCellFormat {
    pub number_format_id: u32,
    pub font_id: usize,
    pub fill_id: usize,
    pub border_id: usize,
    pub horizontal: Option<HorizontalAlignment>,
    pub vertical: Option<VerticalAlignment>,
    pub wrap_text: bool,
    pub text_rotation: Option<u32>,
    pub indent: Option<u32>,
    pub shrink_to_fit: bool,
}

/// The parts of `xl/styles.xml` a `Style` can be rebuilt from.
#[derive(Clone, Debug, Default)]
pub(crate) struct Stylesheet {
    pub number_formats: FastMap<u32, String>,
    pub fonts: Vec<ParsedFont>,
    /// Solid fill color per fill record.
    pub fills: Vec<Option<Color>>,
    pub borders: Vec<BorderSides>,
    pub cell_formats: Vec<ParsedCellFormat>,
}

#[derive(Clone, Copy, PartialEq)]
enum StyleSection {
    Outside,
    NumFmts,
    Fonts,
    Fills,
    Borders,
    CellStyleXfs,
    CellXfs,
    Other,
}

impl StyleSection {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"numFmts" => Some(StyleSection::NumFmts),
            b"fonts" => Some(StyleSection::Fonts),
            b"fills" => Some(StyleSection::Fills),
            b"borders" => Some(StyleSection::Borders),
            b"cellStyleXfs" => Some(StyleSection::CellStyleXfs),
            b"cellXfs" => Some(StyleSection::CellXfs),
            b"cellStyles" | b"dxfs" | b"tableStyles" | b"colors" | b"extLst" => Some(StyleSection::Other),
            _ => None,
        }
    }
}

pub(crate) fn parse_stylesheet(xml: &[u8]) -> Result<Stylesheet> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut sheet = Stylesheet::default();
    let mut section = StyleSection::Outside;
    let mut solid_pattern = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match StyleSection::from_tag(e.local_name().as_ref()) {
                Some(entered) => section = entered,
                None => sheet.apply_element(section, &e, &mut solid_pattern),
            },
            Ok(Event::Empty(e)) => sheet.apply_element(section, &e, &mut solid_pattern),
            Ok(Event::End(e)) => {
                if StyleSection::from_tag(e.local_name().as_ref()).is_some() {
                    section = StyleSection::Outside;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SheetsmithError::ParseError(format!(
                    "XML parsing error in styles.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheet)
}

impl Stylesheet {
    fn apply_element(&mut self, section: StyleSection, e: &BytesStart, solid_pattern: &mut bool) {
        let name = e.local_name();
        match (section, name.as_ref()) {
            (StyleSection::NumFmts, b"numFmt") => {
                if let (Some(id), Some(code)) = (get_attr_u32(e, b"numFmtId"), get_attr_str(e, b"formatCode")) {
                    self.number_formats.insert(id, code);
                }
            }
            (StyleSection::Fonts, b"font") => self.fonts.push(ParsedFont::default()),
            (StyleSection::Fonts, tag) => {
                let Some(font) = self.fonts.last_mut() else { return };
                match tag {
                    b"sz" => font.size = get_attr_f64(e, b"val"),
                    b"name" => font.name = get_attr_str(e, b"val"),
                    b"b" => font.decoration.set(FontDecoration::BOLD, get_flag(e)),
                    b"i" => font.decoration.set(FontDecoration::ITALIC, get_flag(e)),
                    b"u" => font.decoration.set(FontDecoration::UNDERLINE, get_flag(e)),
                    b"strike" => font.decoration.set(FontDecoration::STRIKEOUT, get_flag(e)),
                    b"color" => font.color = get_attr_str(e, b"rgb").and_then(|rgb| Color::from_hex(&rgb).ok()),
                    _ => {}
                }
            }
            (StyleSection::Fills, b"fill") => self.fills.push(None),
            (StyleSection::Fills, b"patternFill") => {
                *solid_pattern = get_attr_str(e, b"patternType").as_deref() == Some("solid");
            }
            (StyleSection::Fills, b"fgColor") if *solid_pattern => {
                if let Some(fill) = self.fills.last_mut() {
                    *fill = get_attr_str(e, b"rgb").and_then(|rgb| Color::from_hex(&rgb).ok());
                }
            }
            (StyleSection::Borders, b"border") => self.borders.push(BorderSides::empty()),
            (StyleSection::Borders, tag) => {
                let side = match tag {
                    b"left" | b"start" => BorderSides::LEFT,
                    b"right" | b"end" => BorderSides::RIGHT,
                    b"top" => BorderSides::TOP,
                    b"bottom" => BorderSides::BOTTOM,
                    _ => return,
                };
                let styled = get_attr_str(e, b"style").is_some_and(|s| s != "none");
                if let (true, Some(border)) = (styled, self.borders.last_mut()) {
                    border.insert(side);
                }
            }
            (StyleSection::CellXfs, b"xf") => self.cell_formats.push(ParsedCellFormat {
                number_format_id: get_attr_u32(e, b"numFmtId").unwrap_or(0),
                font_id: get_attr_u32(e, b"fontId").unwrap_or(0) as usize,
                fill_id: get_attr_u32(e, b"fillId").unwrap_or(0) as usize,
                border_id: get_attr_u32(e, b"borderId").unwrap_or(0) as usize,
                ..ParsedCellFormat::default()
            }),
            (StyleSection::CellXfs, b"alignment") => {
                let Some(format) = self.cell_formats.last_mut() else { return };
                format.horizontal = get_attr_str(e, b"horizontal").and_then(|h| HorizontalAlignment::from_attr(&h));
                format.vertical = get_attr_str(e, b"vertical").and_then(|v| VerticalAlignment::from_attr(&v));
                format.wrap_text = get_attr_str(e, b"wrapText").is_some_and(|v| v == "1" || v == "true");
                format.text_rotation = get_attr_u32(e, b"textRotation");
                format.indent = get_attr_u32(e, b"indent");
                format.shrink_to_fit = get_attr_str(e, b"shrinkToFit").is_some_and(|v| v == "1" || v == "true");
            }
            _ => {}
        }
    }

    pub(crate) fn number_format_id(&self, xf_index: u32) -> u32 {
        self.cell_formats
            .get(xf_index as usize)
            .map_or(0, |format| format.number_format_id)
    }

    /// True when numbers under this cell format display as dates or times.
    pub(crate) fn is_date_style(&self, xf_index: u32) -> bool {
        match self.number_format_id(xf_index) {
            14..=22 | 45..=47 => true,
            id => self.number_formats.get(&id).is_some_and(|code| is_date_code(code)),
        }
    }

    /// Rebuild a `Style` from a cell format. Lossy: number formats that the
    /// style fields cannot express are kept as a custom code, or dropped with a
    /// warning when they are unknown built-ins.
    pub(crate) fn to_style(&self, xf_index: u32) -> Style {
        let mut style = Style::default();
        let Some(format) = self.cell_formats.get(xf_index as usize) else {
            return style;
        };

        if let Some(font) = self.fonts.get(format.font_id) {
            style.font_size = font.size;
            style.font_decoration = font.decoration;
            style.font_color = font.color;
            if let Some(name) = &font.name {
                style.font_family = FontFamily::from_name(name);
                if style.font_family == FontFamily::Default {
                    warn!("font '{}' has no family equivalent; using the default family", name);
                }
            }
        }
        style.fill_color = self.fills.get(format.fill_id).copied().flatten();
        style.border = self.borders.get(format.border_id).copied().unwrap_or_default();

        style.horizontal_alignment = format.horizontal;
        style.vertical_alignment = format.vertical;
        style.wrap_text = format.wrap_text;
        style.text_rotation = format.text_rotation;
        style.indent = format.indent;
        style.shrink_to_fit = format.shrink_to_fit;

        self.apply_number_format(&mut style, format.number_format_id);
        style
    }

    fn apply_number_format(&self, style: &mut Style, id: u32) {
        match id {
            0 => {}
            3 => style.thousand_separator = true,
            4 => {
                style.thousand_separator = true;
                style.decimal_places = Some(2);
            }
            9 => style.percentage = true,
            10 => {
                style.percentage = true;
                style.decimal_places = Some(2);
            }
            14 => style.date_format = Some(DateFormat::Date),
            20 => style.date_format = Some(DateFormat::HoursMinutes),
            21 => style.date_format = Some(DateFormat::HoursMinutesSeconds),
            22 => style.date_format = Some(DateFormat::DateHoursMinutes),
            id => match self.number_formats.get(&id) {
                Some(code) => apply_format_code(style, code),
                None => warn!("number format {} is not representable; using General", id),
            },
        }
    }
}

fn apply_format_code(style: &mut Style, code: &str) {
    if code == DATE_HOURS_CODE {
        style.date_format = Some(DateFormat::DateHours);
        return;
    }
    if code == DATE_HOURS_MINUTES_SECONDS_CODE {
        style.date_format = Some(DateFormat::DateHoursMinutesSeconds);
        return;
    }

    let zeros = |s: &str| !s.is_empty() && s.bytes().all(|b| b == b'0');

    if let Some(decimals) = code.strip_prefix("0.").and_then(|rest| rest.strip_suffix('%')) {
        if zeros(decimals) {
            style.percentage = true;
            style.decimal_places = Some(decimals.len() as u32);
            return;
        }
    }
    if let Some(decimals) = code.strip_prefix("#,##0.") {
        if zeros(decimals) {
            style.thousand_separator = true;
            style.decimal_places = Some(decimals.len() as u32);
            return;
        }
        if decimals.starts_with('0') && decimals[1..].bytes().all(|b| b == b'#') {
            style.decimal_places = Some(decimals.len() as u32);
            return;
        }
    }

    style.number_format = Some(code.to_string());
}

/// Heuristic: a format code shows a date or time when it has a year, day or
/// hour token outside quoted text and bracketed sections.
fn is_date_code(code: &str) -> bool {
    let mut in_quotes = false;
    let mut in_brackets = false;
    for c in code.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' if !in_quotes && !in_brackets => return true,
            _ => {}
        }
    }
    false
}

/// Convert a serial date (days since 1899-12-30) to a timestamp,
/// rounded to the millisecond.
pub(crate) fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    base.checked_add_signed(chrono::Duration::try_milliseconds(millis)?)
}

/// Parse an ISO 8601 `t="d"` cell value.
pub(crate) fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// One `<c>` element as stored in the package.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct RawCell {
    pub column: u32,
    /// The `t` attribute.
    pub cell_type: Option<String>,
    pub style: Option<u32>,
    pub value: Option<String>,
    pub formula: Option<String>,
    pub inline_text: Option<String>,
}

impl RawCell {
    /// Formula text when the cell carries one; shared-formula children have none.
    pub(crate) fn formula_text(&self) -> Option<&str> {
        self.formula.as_deref().filter(|f| !f.trim().is_empty())
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RawSheet {
    pub rows: BTreeMap<u32, Vec<RawCell>>,
    pub merges: Vec<RangeKey>,
}

impl RawSheet {
    pub(crate) fn cell(&self, row: u32, column: u32) -> Option<&RawCell> {
        self.rows.get(&row)?.iter().find(|c| c.column == column)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum TextTarget {
    Nowhere,
    Value,
    Formula,
    Inline,
}

/// Parse a worksheet part into raw rows and merge rectangles.
pub(crate) fn parse_sheet(xml: &[u8]) -> Result<RawSheet> {
    let mut reader = Reader::from_reader(xml);
    // Don't trim text - we need to preserve whitespace in cell values
    reader.config_mut().trim_text(false);

    let mut sheet = RawSheet::default();
    let mut buf = Vec::new();
    let mut row_number = 0u32;
    let mut last_column = 0u32;
    let mut cell: Option<RawCell> = None;
    let mut target = TextTarget::Nowhere;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_number = get_attr_u32(&e, b"r").unwrap_or(row_number + 1);
                    last_column = 0;
                    sheet.rows.entry(row_number).or_default();
                }
                b"c" => cell = Some(start_cell(&e, &mut last_column)),
                b"v" => target = TextTarget::Value,
                b"f" => target = TextTarget::Formula,
                b"t" if cell.is_some() => target = TextTarget::Inline,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_number = get_attr_u32(&e, b"r").unwrap_or(row_number + 1);
                    last_column = 0;
                    sheet.rows.entry(row_number).or_default();
                }
                b"c" => {
                    let empty = start_cell(&e, &mut last_column);
                    sheet.rows.entry(row_number).or_default().push(empty);
                }
                b"mergeCell" => {
                    if let Some(reference) = get_attr_str(&e, b"ref") {
                        match parse_range(&reference) {
                            Ok(((r1, c1), (r2, c2))) => sheet.merges.push(RangeKey::span(
                                CellAddress { row: r1, column: c1 },
                                CellAddress { row: r2, column: c2 },
                            )),
                            Err(_) => warn!("skipping merge with unusable reference '{}'", reference),
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if target != TextTarget::Nowhere => {
                let text = e
                    .unescape()
                    .map_err(|err| SheetsmithError::ParseError(format!("Bad cell text: {}", err)))?;
                if let Some(current) = cell.as_mut() {
                    let slot = match target {
                        TextTarget::Value => &mut current.value,
                        TextTarget::Formula => &mut current.formula,
                        _ => &mut current.inline_text,
                    };
                    slot.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"f" | b"t" => target = TextTarget::Nowhere,
                b"c" => {
                    if let Some(done) = cell.take() {
                        sheet.rows.entry(row_number).or_default().push(done);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SheetsmithError::ParseError(format!(
                    "XML parsing error in worksheet: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheet)
}

fn start_cell(e: &BytesStart, last_column: &mut u32) -> RawCell {
    let column = get_attr_str(e, b"r")
        .and_then(|r| parse_coordinate_bytes(r.as_bytes()))
        .map_or(*last_column + 1, |(_, column)| column);
    *last_column = column;
    RawCell {
        column,
        cell_type: get_attr_str(e, b"t"),
        style: get_attr_u32(e, b"s"),
        ..RawCell::default()
    }
}
