//! End-to-end checks on the saved package: part list, element order and the
//! shared tables, read back with zip + quick-xml.

use std::io::{Cursor, Read};

use pretty_assertions::assert_eq;
use quick_xml::events::Event;
use quick_xml::Reader;
use sheetsmith_core::{parse_coordinate, BorderSides, Color, RichTextRun, SheetsmithError, Style, Workbook};
use zip::ZipArchive;

fn part(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut xml = String::new();
    file.read_to_string(&mut xml).unwrap();
    xml
}

fn part_names(bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.file_names().map(str::to_string).collect()
}

/// Local names of the root element's direct children.
fn top_level_children(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0;
    let mut names = Vec::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) => {
                if depth == 1 {
                    names.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 1 => {
                names.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::End(_) => depth -= 1,
            Event::Eof => break,
            _ => {}
        }
    }
    names
}

fn count_attr(xml: &str, element: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == element.as_bytes() => {
                return e
                    .try_get_attribute("count")
                    .unwrap()
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// `r` attributes of every `<c>` in document order.
fn cell_references(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut refs = Vec::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let r = e.try_get_attribute("r").unwrap().unwrap();
                refs.push(String::from_utf8_lossy(&r.value).into_owned());
            }
            Event::Eof => break,
            _ => {}
        }
    }
    refs
}

#[test]
fn test_mixed_sheet_cells_sorted_and_styles_counted() {
    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Mixed");
    ws.set_formula("B6", "=R[-3]C*2", true, None).unwrap();
    ws.merge_cells("A3", "C4", Some(Style::new().with_border(BorderSides::AROUND))).unwrap();
    ws.set_value("D1", 0.75, Some(Style::new().with_percentage(true))).unwrap();
    ws.set_value("A1", "Header", Some(Style::new().with_bold(true))).unwrap();
    ws.set_value("B3", 4, None).unwrap();
    let bytes = wb.save_to_bytes().unwrap();

    let sheet = part(&bytes, "xl/worksheets/sheet1.xml");
    let positions: Vec<(u32, u32)> = cell_references(&sheet)
        .iter()
        .map(|r| parse_coordinate(r).unwrap())
        .collect();
    assert_eq!(positions.len(), 9);
    assert!(
        positions.windows(2).all(|pair| pair[0] < pair[1]),
        "cells out of order: {:?}",
        positions
    );
    assert!(sheet.contains("<f>B3*2</f>"));

    // bold, percentage and bordered, plus the default at index 0
    let styles = part(&bytes, "xl/styles.xml");
    assert_eq!(count_attr(&styles, "cellXfs").as_deref(), Some("4"));
}

#[test]
fn test_parts_present() {
    let mut wb = Workbook::new();
    wb.add_worksheet("One").set_value("A1", "text", None).unwrap();
    wb.add_worksheet("Two").set_value("A1", 2, None).unwrap();
    let bytes = wb.save_to_bytes().unwrap();

    let names = part_names(&bytes);
    for expected in [
        "[Content_Types].xml",
        "_rels/.rels",
        "docProps/core.xml",
        "docProps/app.xml",
        "xl/workbook.xml",
        "xl/_rels/workbook.xml.rels",
        "xl/styles.xml",
        "xl/sharedStrings.xml",
        "xl/worksheets/sheet1.xml",
        "xl/worksheets/sheet2.xml",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {}", expected);
    }

    let rels = part(&bytes, "xl/_rels/workbook.xml.rels");
    assert!(rels.contains(r#"Id="rId3""#) && rels.contains("styles.xml"));
    assert!(rels.contains(r#"Id="rId4""#) && rels.contains("sharedStrings.xml"));
}

#[test]
fn test_no_shared_strings_part_without_text() {
    let mut wb = Workbook::new();
    wb.add_worksheet("Numbers").set_value("A1", 1.5, None).unwrap();
    let bytes = wb.save_to_bytes().unwrap();
    assert!(!part_names(&bytes).iter().any(|n| n == "xl/sharedStrings.xml"));
    assert!(!part(&bytes, "[Content_Types].xml").contains("sharedStrings"));
}

#[test]
fn test_worksheet_children_follow_schema_order() {
    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Layout");
    ws.show_gridlines = false;
    ws.set_value("A1", "Quarterly report", None).unwrap();
    ws.merge_cells("A1", "D1", Some(Style::new().with_bold(true))).unwrap();
    ws.set_value("B3", 10, None).unwrap();
    let bytes = wb.save_to_bytes().unwrap();

    let sheet = part(&bytes, "xl/worksheets/sheet1.xml");
    assert_eq!(
        top_level_children(&sheet),
        ["dimension", "sheetViews", "cols", "sheetData", "mergeCells", "pageMargins"]
    );
    assert!(sheet.contains(r#"<dimension ref="A1:D3"/>"#));
    assert!(sheet.contains(r#"<mergeCell ref="A1:D1"/>"#));
    assert!(sheet.contains(r#"showGridLines="0""#));
}

#[test]
fn test_style_tables_are_deduplicated() {
    let bordered = Style::new().with_border(BorderSides::AROUND);
    let filled = Style::new().with_fill_color(Color::rgb(0xFF, 0xEE, 0x00));

    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Styles");
    for row in 1..=50 {
        ws.set_value_at(row, 1, "same", Some(bordered.clone())).unwrap();
        ws.set_value_at(row, 2, row, Some(filled.clone())).unwrap();
    }
    let bytes = wb.save_to_bytes().unwrap();

    let styles = part(&bytes, "xl/styles.xml");
    assert_eq!(count_attr(&styles, "cellXfs").as_deref(), Some("3"));
    assert_eq!(count_attr(&styles, "fills").as_deref(), Some("3"));
    assert_eq!(count_attr(&styles, "borders").as_deref(), Some("2"));
    assert_eq!(
        top_level_children(&styles),
        ["fonts", "fills", "borders", "cellStyleXfs", "cellXfs", "cellStyles"]
    );

    let sst = part(&bytes, "xl/sharedStrings.xml");
    assert!(sst.contains(r#"count="50" uniqueCount="1""#));
}

#[test]
fn test_relative_formula_is_translated_on_save() {
    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Sums");
    ws.set_value("B3", 1, None).unwrap();
    ws.set_value("B4", 2, None).unwrap();
    ws.set_formula("B5", "=SUM(R[-2]C:R[-1]C)", true, None).unwrap();
    ws.set_formula("C5", "=B5*2", false, None).unwrap();
    let bytes = wb.save_to_bytes().unwrap();

    let sheet = part(&bytes, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains("<f>SUM(B3:B4)</f>"));
    assert!(sheet.contains("<f>B5*2</f>"));
}

#[test]
fn test_out_of_sheet_relative_reference_fails() {
    let mut wb = Workbook::new();
    wb.add_worksheet("Edge").set_formula("A1", "=R[-1]C", true, None).unwrap();
    match wb.save_to_bytes() {
        Err(SheetsmithError::InvalidFormula { cell, .. }) => assert_eq!(cell, "A1"),
        other => panic!("expected InvalidFormula, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn test_rich_text_written_inline() {
    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Rich");
    ws.set_rich_text(
        "A1",
        vec![
            RichTextRun::new("Bold", Style::new().with_bold(true)),
            RichTextRun::plain(" and plain"),
        ],
    )
    .unwrap();
    let bytes = wb.save_to_bytes().unwrap();

    let sheet = part(&bytes, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains(r#"t="inlineStr""#));
    assert!(sheet.contains("<b/>"));
    assert!(sheet.contains(r#"<t xml:space="preserve"> and plain</t>"#));
}

#[test]
fn test_save_to_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.xlsx");
    let path = path.to_str().unwrap();

    let mut wb = Workbook::new();
    wb.add_worksheet("Saved").set_value("A1", "on disk", None).unwrap();
    wb.save(path).unwrap();

    let bytes = std::fs::read(path).unwrap();
    assert_eq!(&bytes[0..2], b"PK");
    assert!(part(&bytes, "xl/workbook.xml").contains(r#"name="Saved""#));
}
