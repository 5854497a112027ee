//! XML part generation for the xlsx package.
//!
//! Parts are rendered to strings first so that a formula error aborts the save
//! before anything reaches the zip writer.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{Seek, Write};

use chrono::{NaiveDateTime, SecondsFormat, Utc};
use log::debug;
use quick_xml::escape::escape;
use zip::write::{ExtendedFileOptions, FileOptions};
use zip::ZipWriter;

use crate::cell::{format_number, CellAction, CellAddress, CellValue, RichTextRun};
use crate::error::{Result, SheetsmithError};
use crate::formula::{translate_relative, validate_formula};
use crate::style::{FontDecoration, FontFamily, StyleRegistry, StyleTable};
use crate::utils::coordinate_from_row_col;
use crate::worksheet::Worksheet;
use crate::FastMap;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Schema order of `<worksheet>` children.
pub const WORKSHEET_ELEMENT_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// Schema order of `<styleSheet>` children.
pub const STYLESHEET_ELEMENT_ORDER: &[&str] = &[
    "numFmts",
    "fonts",
    "fills",
    "borders",
    "cellStyleXfs",
    "cellXfs",
    "cellStyles",
    "dxfs",
    "tableStyles",
    "colors",
    "extLst",
];

/// Children of a part's root element, kept in schema order.
///
/// Each insertion lands immediately before the first existing child whose kind
/// sorts later, so callers may add elements in any order.
pub(crate) struct OrderedChildren {
    order: &'static [&'static str],
    children: Vec<(usize, String)>,
}

impl OrderedChildren {
    pub(crate) fn new(order: &'static [&'static str]) -> Self {
        OrderedChildren {
            order,
            children: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, kind: &str, xml: String) -> Result<()> {
        let rank = self
            .order
            .iter()
            .position(|k| *k == kind)
            .ok_or_else(|| SheetsmithError::Packaging(format!("Element '{}' has no place in the schema order", kind)))?;
        let at = self
            .children
            .iter()
            .position(|(existing, _)| *existing > rank)
            .unwrap_or(self.children.len());
        self.children.insert(at, (rank, xml));
        Ok(())
    }

    pub(crate) fn kinds(&self) -> Vec<&'static str> {
        self.children.iter().map(|(rank, _)| self.order[*rank]).collect()
    }

    fn render_into(&self, out: &mut String) {
        for (_, xml) in &self.children {
            out.push_str(xml);
        }
    }
}

pub(crate) fn escape_xml(text: &str) -> Cow<'_, str> {
    escape(text)
}

/// `<t>` element, preserving leading/trailing whitespace.
fn text_element(text: &str) -> String {
    let escaped = escape_xml(text);
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        format!(r#"<t xml:space="preserve">{}</t>"#, escaped)
    } else {
        format!("<t>{}</t>", escaped)
    }
}

/// Shared string table, rebuilt on every save.
#[derive(Debug, Default)]
pub(crate) struct SharedStrings {
    strings: Vec<String>,
    index: FastMap<String, u32>,
    references: usize,
}

impl SharedStrings {
    /// Index of `text`, appending it on first sight. Lookup is by exact text.
    pub(crate) fn intern(&mut self, text: &str) -> u32 {
        self.references += 1;
        if let Some(&idx) = self.index.get(text) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(text.to_string());
        self.index.insert(text.to_string(), idx);
        idx
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.strings.len()
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"{}<sst xmlns="{}" count="{}" uniqueCount="{}">"#,
            XML_HEADER,
            MAIN_NS,
            self.references,
            self.strings.len()
        );
        for s in &self.strings {
            xml.push_str("<si>");
            xml.push_str(&text_element(s));
            xml.push_str("</si>");
        }
        xml.push_str("</sst>");
        xml
    }
}

/// Serialize a style table as `xl/styles.xml`.
pub(crate) fn styles_xml(table: &StyleTable) -> Result<String> {
    let mut children = OrderedChildren::new(STYLESHEET_ELEMENT_ORDER);

    let mut xfs = format!(r#"<cellXfs count="{}">"#, table.cell_formats.len());
    for format in &table.cell_formats {
        xfs.push_str(&format!(
            r#"<xf numFmtId="{}" fontId="{}" fillId="{}" borderId="{}" xfId="0""#,
            format.number_format_id, format.font_id, format.fill_id, format.border_id
        ));
        if format.apply_number_format {
            xfs.push_str(r#" applyNumberFormat="1""#);
        }
        if format.font_id > 0 {
            xfs.push_str(r#" applyFont="1""#);
        }
        if format.apply_fill {
            xfs.push_str(r#" applyFill="1""#);
        }
        if format.apply_border {
            xfs.push_str(r#" applyBorder="1""#);
        }
        match &format.alignment {
            Some(alignment) => {
                xfs.push_str(r#" applyAlignment="1">"#);
                xfs.push_str(alignment);
                xfs.push_str("</xf>");
            }
            None => xfs.push_str("/>"),
        }
    }
    xfs.push_str("</cellXfs>");
    children.insert("cellXfs", xfs)?;

    children.insert("fonts", record_list("fonts", &table.fonts))?;
    children.insert("fills", record_list("fills", &table.fills))?;
    children.insert("borders", record_list("borders", &table.borders))?;
    children.insert(
        "cellStyleXfs",
        r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#.to_string(),
    )?;
    children.insert(
        "cellStyles",
        r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#.to_string(),
    )?;

    if !table.number_formats.is_empty() {
        let mut formats = format!(r#"<numFmts count="{}">"#, table.number_formats.len());
        for nf in &table.number_formats {
            formats.push_str(&format!(
                r#"<numFmt numFmtId="{}" formatCode="{}"/>"#,
                nf.id,
                escape_xml(&nf.code)
            ));
        }
        formats.push_str("</numFmts>");
        children.insert("numFmts", formats)?;
    }

    let mut xml = format!(r#"{}<styleSheet xmlns="{}">"#, XML_HEADER, MAIN_NS);
    children.render_into(&mut xml);
    xml.push_str("</styleSheet>");
    Ok(xml)
}

fn record_list(tag: &str, records: &[String]) -> String {
    let mut xml = format!(r#"<{} count="{}">"#, tag, records.len());
    for record in records {
        xml.push_str(record);
    }
    xml.push_str(&format!("</{}>", tag));
    xml
}

enum CellBody<'s> {
    Empty,
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
    Shared(u32),
    Formula(String),
    Rich(&'s [RichTextRun]),
}

struct CellRecord<'s> {
    style: Option<u32>,
    body: CellBody<'s>,
}

/// Render one worksheet part, interning its strings into `shared`.
///
/// Formulas are translated (when relative) and validated here; the first
/// failure aborts with `InvalidFormula`.
pub(crate) fn worksheet_xml(sheet: &Worksheet, shared: &mut SharedStrings) -> Result<String> {
    let mut rows: BTreeMap<u32, BTreeMap<u32, CellRecord<'_>>> = BTreeMap::new();
    let mut merges = Vec::new();

    for action in sheet.sorted_actions() {
        let origin = action.origin();
        let style = action.style_index();
        let body = match action {
            CellAction::Value { value, .. } => match value {
                CellValue::Empty => CellBody::Empty,
                CellValue::Number(n) => CellBody::Number(*n),
                CellValue::Boolean(b) => CellBody::Bool(*b),
                CellValue::DateTime(dt) => CellBody::Date(*dt),
                CellValue::String(s) => CellBody::Shared(shared.intern(s)),
            },
            CellAction::Formula { text, is_relative, .. } => {
                CellBody::Formula(checked_formula(text, *is_relative, origin)?)
            }
            CellAction::StyleOnly { .. } => CellBody::Empty,
            CellAction::RichText { runs, .. } => CellBody::Rich(runs),
            CellAction::Merge { range, .. } => {
                for corner in [range.top_left(), range.bottom_right()] {
                    rows.entry(corner.row)
                        .or_default()
                        .entry(corner.column)
                        .or_insert(CellRecord { style, body: CellBody::Empty });
                }
                merges.push(*range);
                continue;
            }
        };
        rows.entry(origin.row)
            .or_default()
            .insert(origin.column, CellRecord { style, body });
    }

    let mut data = String::with_capacity(64 * sheet.len() + 32);
    if rows.is_empty() {
        data.push_str("<sheetData/>");
    } else {
        data.push_str("<sheetData>");
        for (row, cells) in &rows {
            data.push_str(r#"<row r=""#);
            data.push_str(itoa::Buffer::new().format(*row));
            data.push_str(r#"">"#);
            for (column, record) in cells {
                write_cell(&mut data, *row, *column, record, sheet);
            }
            data.push_str("</row>");
        }
        data.push_str("</sheetData>");
    }

    let mut children = OrderedChildren::new(WORKSHEET_ELEMENT_ORDER);
    children.insert("sheetData", data)?;
    children.insert(
        "pageMargins",
        r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#.to_string(),
    )?;

    if !merges.is_empty() {
        let mut xml = format!(r#"<mergeCells count="{}">"#, merges.len());
        for range in &merges {
            xml.push_str(&format!(r#"<mergeCell ref="{}"/>"#, range.to_a1()));
        }
        xml.push_str("</mergeCells>");
        children.insert("mergeCells", xml)?;
    }

    if sheet.autofit_columns && !sheet.column_widths().is_empty() {
        let mut xml = String::from("<cols>");
        for (column, width) in sheet.column_widths() {
            xml.push_str(&format!(
                r#"<col min="{c}" max="{c}" width="{w}" customWidth="1"/>"#,
                c = column,
                w = format_number(*width)
            ));
        }
        xml.push_str("</cols>");
        children.insert("cols", xml)?;
    }

    if !sheet.show_gridlines {
        children.insert(
            "sheetViews",
            r#"<sheetViews><sheetView showGridLines="0" workbookViewId="0"/></sheetViews>"#.to_string(),
        )?;
    }

    children.insert("dimension", format!(r#"<dimension ref="{}"/>"#, sheet.dimension().to_a1()))?;

    let mut xml = format!(r#"{}<worksheet xmlns="{}" xmlns:r="{}">"#, XML_HEADER, MAIN_NS, REL_NS);
    children.render_into(&mut xml);
    xml.push_str("</worksheet>");
    Ok(xml)
}

fn checked_formula(text: &str, is_relative: bool, origin: CellAddress) -> Result<String> {
    let text = if is_relative {
        translate_relative(text, origin)?
    } else {
        text.to_string()
    };
    let errors = validate_formula(&text);
    if errors.is_empty() {
        Ok(text)
    } else {
        Err(SheetsmithError::InvalidFormula {
            cell: origin.to_a1(),
            formula: format!("={}", text),
            errors,
        })
    }
}

fn write_cell(out: &mut String, row: u32, column: u32, record: &CellRecord<'_>, sheet: &Worksheet) {
    out.push_str(r#"<c r=""#);
    out.push_str(&coordinate_from_row_col(row, column));
    out.push('"');
    if let Some(style) = record.style.filter(|&s| s != 0) {
        out.push_str(r#" s=""#);
        out.push_str(itoa::Buffer::new().format(style));
        out.push('"');
    }

    match &record.body {
        CellBody::Empty => out.push_str("/>"),
        CellBody::Number(n) => {
            out.push_str("><v>");
            out.push_str(&format_number(*n));
            out.push_str("</v></c>");
        }
        CellBody::Bool(b) => {
            out.push_str(r#" t="b"><v>"#);
            out.push(if *b { '1' } else { '0' });
            out.push_str("</v></c>");
        }
        CellBody::Date(dt) => {
            out.push_str(r#" t="d"><v>"#);
            out.push_str(&dt.format("%Y-%m-%dT%H:%M:%S").to_string());
            out.push_str("</v></c>");
        }
        CellBody::Shared(idx) => {
            out.push_str(r#" t="s"><v>"#);
            out.push_str(itoa::Buffer::new().format(*idx));
            out.push_str("</v></c>");
        }
        CellBody::Formula(text) => {
            out.push_str("><f>");
            out.push_str(&escape_xml(text));
            out.push_str("</f></c>");
        }
        CellBody::Rich(runs) => {
            out.push_str(r#" t="inlineStr"><is>"#);
            for run in runs.iter() {
                out.push_str("<r>");
                out.push_str(&run_properties(run, sheet));
                out.push_str(&text_element(&run.text));
                out.push_str("</r>");
            }
            out.push_str("</is></c>");
        }
    }
}

/// `<rPr>` for a rich-text run, in schema order. The sheet font fills in an
/// unset family or size.
fn run_properties(run: &RichTextRun, sheet: &Worksheet) -> String {
    let style = &run.style;
    let family = match style.font_family {
        FontFamily::Default => sheet.font_family,
        chosen => chosen,
    };

    let mut xml = String::from("<rPr>");
    if let Some(name) = family.name() {
        xml.push_str(&format!(r#"<rFont val="{}"/>"#, name));
    }
    if style.font_decoration.contains(FontDecoration::BOLD) {
        xml.push_str("<b/>");
    }
    if style.font_decoration.contains(FontDecoration::ITALIC) {
        xml.push_str("<i/>");
    }
    if style.font_decoration.contains(FontDecoration::STRIKEOUT) {
        xml.push_str("<strike/>");
    }
    if let Some(color) = style.font_color {
        xml.push_str(&format!(r#"<color rgb="{}"/>"#, color.to_hex()));
    }
    if let Some(size) = style.font_size.or(sheet.font_size) {
        xml.push_str(&format!(r#"<sz val="{}"/>"#, format_number(size)));
    }
    if style.font_decoration.contains(FontDecoration::UNDERLINE) {
        xml.push_str("<u/>");
    }
    xml.push_str("</rPr>");
    xml
}

pub(crate) fn content_types_xml(sheet_count: usize, has_shared_strings: bool) -> String {
    let mut xml = format!(
        r#"{}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/><Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#,
        XML_HEADER
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i
        ));
    }
    if has_shared_strings {
        xml.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
    }
    xml.push_str("</Types>");
    xml
}

pub(crate) fn root_rels_xml() -> String {
    format!(
        r#"{}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/></Relationships>"#,
        XML_HEADER
    )
}

pub(crate) fn core_props_xml() -> String {
    let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    format!(
        r#"{}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:creator>sheetsmith</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created></cp:coreProperties>"#,
        XML_HEADER, created
    )
}

pub(crate) fn app_props_xml() -> String {
    format!(
        r#"{}<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>sheetsmith</Application></Properties>"#,
        XML_HEADER
    )
}

pub(crate) fn workbook_xml(sheet_names: &[&str]) -> String {
    let mut xml = format!(
        r#"{}<workbook xmlns="{}" xmlns:r="{}"><bookViews><workbookView/></bookViews><sheets>"#,
        XML_HEADER, MAIN_NS, REL_NS
    );
    for (i, name) in sheet_names.iter().enumerate() {
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape_xml(name),
            i + 1,
            i + 1
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

pub(crate) fn workbook_rels_xml(sheet_count: usize, has_shared_strings: bool) -> String {
    let mut xml = format!(
        r#"{}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        XML_HEADER
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i, REL_NS, i
        ));
    }
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="{}/styles" Target="styles.xml"/>"#,
        sheet_count + 1,
        REL_NS
    ));
    if has_shared_strings {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{}/sharedStrings" Target="sharedStrings.xml"/>"#,
            sheet_count + 2,
            REL_NS
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn write_part<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: &FileOptions<'static, ExtendedFileOptions>,
    path: &str,
    content: &str,
) -> Result<()> {
    zip.start_file(path, options.clone())?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

/// Render every part and write the package.
pub(crate) fn write_package<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: &FileOptions<'static, ExtendedFileOptions>,
    worksheets: &[Worksheet],
    styles: &StyleRegistry,
) -> Result<()> {
    let mut shared = SharedStrings::default();
    let sheet_parts = worksheets
        .iter()
        .map(|sheet| worksheet_xml(sheet, &mut shared))
        .collect::<Result<Vec<String>>>()?;
    let styles_part = styles_xml(&styles.build_table())?;
    let has_shared_strings = !shared.is_empty();
    let names: Vec<&str> = worksheets.iter().map(Worksheet::name).collect();

    write_part(zip, options, "[Content_Types].xml", &content_types_xml(worksheets.len(), has_shared_strings))?;
    write_part(zip, options, "_rels/.rels", &root_rels_xml())?;
    write_part(zip, options, "docProps/core.xml", &core_props_xml())?;
    write_part(zip, options, "docProps/app.xml", &app_props_xml())?;
    write_part(zip, options, "xl/workbook.xml", &workbook_xml(&names))?;
    write_part(
        zip,
        options,
        "xl/_rels/workbook.xml.rels",
        &workbook_rels_xml(worksheets.len(), has_shared_strings),
    )?;
    write_part(zip, options, "xl/styles.xml", &styles_part)?;
    if has_shared_strings {
        write_part(zip, options, "xl/sharedStrings.xml", &shared.to_xml())?;
    }
    for (i, part) in sheet_parts.iter().enumerate() {
        write_part(zip, options, &format!("xl/worksheets/sheet{}.xml", i + 1), part)?;
    }

    debug!(
        "wrote package: {} worksheet(s), {} shared string(s), {} cell format(s)",
        worksheets.len(),
        shared.len(),
        styles.cell_format_count()
    );
    Ok(())
}
