//! Column width heuristic used for autofit.

use chrono::NaiveDateTime;

use crate::cell::{CellValue, RichTextRun};
use crate::style::{DateFormat, FontFamily, Style};

/// Font size the width units are calibrated against.
pub const BASE_FONT_SIZE: f64 = 11.0;
/// Widest column the format allows.
pub const MAX_COLUMN_WIDTH: f64 = 255.0;
const PADDING: f64 = 2.0;

fn char_weight(c: char) -> f64 {
    match c {
        'i' | 'l' | 'I' | '|' | ' ' => 0.5,
        '-' | '_' => 0.75,
        'W' | 'M' => 1.5,
        _ => 1.0,
    }
}

fn run_width(text: &str, font_size: f64, family: FontFamily) -> f64 {
    let units: f64 = text.chars().map(char_weight).sum();
    units * (font_size / BASE_FONT_SIZE) * family.width_factor()
}

/// Estimated width of one line of text in a single font.
pub fn estimate_text_width(text: &str, font_size: f64, family: FontFamily) -> f64 {
    (run_width(text, font_size, family) + PADDING).min(MAX_COLUMN_WIDTH)
}

/// Text a date value shows under a date format.
pub fn render_date(value: &NaiveDateTime, format: Option<DateFormat>) -> String {
    let pattern = match format {
        None | Some(DateFormat::Date) => "%Y-%m-%d",
        Some(DateFormat::DateHoursMinutesSeconds) => "%Y-%m-%d %H:%M:%S",
        Some(DateFormat::DateHoursMinutes) => "%Y-%m-%d %H:%M",
        Some(DateFormat::DateHours) => "%Y-%m-%d %H",
        Some(DateFormat::HoursMinutesSeconds) => "%H:%M:%S",
        Some(DateFormat::HoursMinutes) => "%H:%M",
        Some(DateFormat::General) => "%Y-%m-%d %H:%M:%S",
    };
    value.format(pattern).to_string()
}

/// Width of a plain cell value under its effective style.
///
/// Font size and family fall back to the worksheet's, then to 11pt Calibri
/// metrics.
pub fn estimate_value_width(
    value: &CellValue,
    style: &Style,
    sheet_font_size: Option<f64>,
    sheet_family: FontFamily,
) -> f64 {
    let text = match value {
        CellValue::DateTime(dt) => render_date(dt, style.date_format),
        other => other.display_text(),
    };
    let (size, family) = effective_font(style, sheet_font_size, sheet_family);
    estimate_text_width(&text, size, family)
}

/// Width of a rich-text cell: the runs are summed, padded once.
pub fn estimate_rich_text_width(
    runs: &[RichTextRun],
    sheet_font_size: Option<f64>,
    sheet_family: FontFamily,
) -> f64 {
    let total: f64 = runs
        .iter()
        .map(|run| {
            let (size, family) = effective_font(&run.style, sheet_font_size, sheet_family);
            run_width(&run.text, size, family)
        })
        .sum();
    (total + PADDING).min(MAX_COLUMN_WIDTH)
}

fn effective_font(style: &Style, sheet_font_size: Option<f64>, sheet_family: FontFamily) -> (f64, FontFamily) {
    let size = style.font_size.or(sheet_font_size).unwrap_or(BASE_FONT_SIZE);
    let family = match style.font_family {
        FontFamily::Default => sheet_family,
        chosen => chosen,
    };
    (size, family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_character_weights() {
        assert!(close(estimate_text_width("", 11.0, FontFamily::Default), 2.0));
        assert!(close(estimate_text_width("abc", 11.0, FontFamily::Default), 5.0));
        assert!(close(estimate_text_width("il I|", 11.0, FontFamily::Calibri), 4.5));
        assert!(close(estimate_text_width("WM", 11.0, FontFamily::Calibri), 5.0));
        assert!(close(estimate_text_width("-_", 11.0, FontFamily::Calibri), 3.5));
    }

    #[test]
    fn test_font_scaling() {
        assert!(close(estimate_text_width("abcd", 22.0, FontFamily::Calibri), 10.0));
        assert!(close(estimate_text_width("abcd", 11.0, FontFamily::Arial), 4.0 * 1.08 + 2.0));
    }

    #[test]
    fn test_clamped_to_max() {
        let long = "W".repeat(1000);
        assert!(close(estimate_text_width(&long, 11.0, FontFamily::Default), MAX_COLUMN_WIDTH));
    }

    #[test]
    fn test_render_date_formats() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(7, 5, 3).unwrap();
        assert_eq!(render_date(&dt, None), "2024-03-09");
        assert_eq!(render_date(&dt, Some(DateFormat::DateHoursMinutesSeconds)), "2024-03-09 07:05:03");
        assert_eq!(render_date(&dt, Some(DateFormat::DateHoursMinutes)), "2024-03-09 07:05");
        assert_eq!(render_date(&dt, Some(DateFormat::DateHours)), "2024-03-09 07");
        assert_eq!(render_date(&dt, Some(DateFormat::HoursMinutesSeconds)), "07:05:03");
        assert_eq!(render_date(&dt, Some(DateFormat::HoursMinutes)), "07:05");
    }

    #[test]
    fn test_value_width_inherits_sheet_font() {
        let style = Style::new();
        let w = estimate_value_width(&CellValue::from("abcd"), &style, Some(22.0), FontFamily::Default);
        assert!(close(w, 10.0));

        let own = Style::new().with_font_size(11.0);
        let w = estimate_value_width(&CellValue::from("abcd"), &own, Some(22.0), FontFamily::Arial);
        assert!(close(w, 4.0 * 1.08 + 2.0));
    }

    #[test]
    fn test_rich_text_sums_runs() {
        let runs = vec![
            RichTextRun::plain("ab"),
            RichTextRun::new("cd", Style::new().with_font_size(22.0)),
        ];
        assert!(close(estimate_rich_text_width(&runs, None, FontFamily::Default), 2.0 + 4.0 + 2.0));
    }
}
