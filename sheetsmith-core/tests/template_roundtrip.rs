use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use sheetsmith_core::{BorderSides, CellValue, DateFormat, Style, Workbook};
use tempfile::NamedTempFile;

#[test]
fn test_boolean_roundtrip() {
    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Test");
    ws.set_value_at(1, 1, false, None).unwrap();
    ws.set_value_at(1, 2, true, None).unwrap();

    let temp_file = NamedTempFile::new().unwrap();
    let temp_path = temp_file.path().to_str().unwrap();
    wb.save(temp_path).unwrap();

    let mut loaded = Workbook::load(temp_path).unwrap();
    let ws = loaded.worksheet("Test").unwrap();
    assert_eq!(ws.value_at(1, 1), Some(&CellValue::Boolean(false)), "Boolean false should roundtrip");
    assert_eq!(ws.value_at(1, 2), Some(&CellValue::Boolean(true)), "Boolean true should roundtrip");
}

#[test]
fn test_template_values_survive_two_saves() {
    let stamp = NaiveDate::from_ymd_opt(2022, 12, 31).unwrap().and_hms_opt(23, 59, 58).unwrap();
    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Ledger");
    ws.set_value("A1", "  padded  ", None).unwrap();
    ws.set_value("A2", -0.125, None).unwrap();
    ws.set_value("A3", stamp, None).unwrap();
    ws.set_value("A4", "x < y & z", None).unwrap();

    let once = Workbook::load_from_bytes(&wb.save_to_bytes().unwrap()).unwrap();
    let twice = Workbook::load_from_bytes(&once.save_to_bytes().unwrap()).unwrap();

    let ws = &twice.worksheets()[0];
    assert_eq!(ws.name(), "Ledger");
    assert_eq!(ws.value_at(1, 1), Some(&CellValue::from("  padded  ")));
    assert_eq!(ws.value_at(2, 1), Some(&CellValue::Number(-0.125)));
    assert_eq!(ws.value_at(3, 1), Some(&CellValue::DateTime(stamp)));
    assert_eq!(ws.value_at(4, 1), Some(&CellValue::from("x < y & z")));
}

#[test]
fn test_loaded_template_can_be_filled_in() {
    let boxed = Style::new().with_border(BorderSides::AROUND);
    let mut template = Workbook::new();
    let mut ws = template.add_worksheet("Form");
    ws.set_value("A1", "Name", Some(boxed.clone())).unwrap();
    ws.set_style("B1", boxed.clone()).unwrap();
    ws.merge_cells("A3", "B4", None).unwrap();
    let bytes = template.save_to_bytes().unwrap();

    let mut filled = Workbook::load_from_bytes(&bytes).unwrap();
    let mut ws = filled.worksheet("Form").unwrap();
    assert_eq!(ws.style_at(1, 2), Some(boxed.clone()));
    assert!(ws.merge_containing(4, 2).is_some());

    // No explicit style: the template's style sticks.
    ws.set_value("B1", "Ada", None).unwrap();
    assert_eq!(ws.style_at(1, 2), Some(boxed));
    assert_eq!(ws.value_at(1, 2), Some(&CellValue::from("Ada")));

    let reloaded = Workbook::load_from_bytes(&filled.save_to_bytes().unwrap()).unwrap();
    assert_eq!(reloaded.worksheets()[0].value_at(1, 2), Some(&CellValue::from("Ada")));
}

#[test]
fn test_date_number_formats_reload_as_dates() {
    let day = NaiveDate::from_ymd_opt(2021, 3, 14).unwrap().and_hms_opt(15, 9, 0).unwrap();
    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Times");
    ws.set_value("A1", day, Some(Style::new().with_date_format(DateFormat::DateHoursMinutes)))
        .unwrap();
    let bytes = wb.save_to_bytes().unwrap();

    let mut loaded = Workbook::load_from_bytes(&bytes).unwrap();
    let ws = loaded.worksheet_at(0).unwrap();
    assert_eq!(ws.value_at(1, 1), Some(&CellValue::DateTime(day)));
    assert_eq!(
        ws.style_at(1, 1).and_then(|s| s.date_format),
        Some(DateFormat::DateHoursMinutes)
    );
}
