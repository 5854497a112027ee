//! Formula checks and R1C1-relative reference translation.
//!
//! Formulas are never evaluated. They are checked for common syntax mistakes
//! and, when registered as relative, rewritten from `R[-1]C`-style tokens into
//! A1 references anchored on the formula's own cell.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::cell::CellAddress;
use crate::error::{Result, SheetsmithError};
use crate::utils::{coordinate_from_row_col, validate_cell};

/// Upper bound on `NAME(` occurrences accepted in one formula.
pub const MAX_FUNCTION_CALLS: usize = 64;

static RELATIVE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"R(\[[+-]?\d+\]|\d+)?C(\[[+-]?\d+\]|\d+)?").expect("valid reference pattern"));
static SPACE_SEPARATED_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]+\d+ [A-Z]+\d+").expect("valid range pattern"));
static UNQUOTED_SHEET_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([^\s'\[]+\s[^\s'\[]+)!([A-Z]+\d+)").expect("valid sheet pattern"));
static BRACKETED_WORKBOOK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(.+\.xlsx)\]").expect("valid workbook pattern"));
static FUNCTION_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][A-Z0-9]*\(").expect("valid function pattern"));

/// Check a formula for syntax mistakes. An empty list means the formula passed.
pub fn validate_formula(formula: &str) -> Vec<String> {
    let mut errors = Vec::new();

    let body = formula.trim();
    if body.is_empty() || body == "=" {
        errors.push("Formula is empty".to_string());
        return errors;
    }

    let mut depth: i64 = 0;
    for c in body.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            errors.push("Parentheses closed before opening".to_string());
            break;
        }
    }
    if depth > 0 {
        errors.push("Missing closing parenthesis".to_string());
    }

    if SPACE_SEPARATED_RANGE.is_match(body) {
        errors.push("Cell ranges must use ':' not space".to_string());
    }

    if UNQUOTED_SHEET_REFERENCE.is_match(body) {
        errors.push("Sheet names with spaces must be wrapped in single quotes".to_string());
    }

    if body.contains(":\\") && !BRACKETED_WORKBOOK.is_match(body) {
        errors.push(
            "External references must include workbook name in brackets (e.g., [Workbook.xlsx])".to_string(),
        );
    }

    if has_grouped_number(body) {
        errors.push("Numbers should not contain commas for formatting (e.g., use 1000 not 1,000)".to_string());
    }

    if FUNCTION_CALL.find_iter(body).count() > MAX_FUNCTION_CALLS {
        errors.push(format!("Formula nests more than {} functions", MAX_FUNCTION_CALLS));
    }

    errors
}

/// True when a standalone numeric literal outside any function call is
/// followed by `,` and three digits (`=1,000+A1`). Inside parentheses the comma
/// separates arguments (`=MAX(5,250)`).
fn has_grouped_number(formula: &str) -> bool {
    let bytes = formula.as_bytes();
    let mut depth: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth != 0 || b != b',' || i == 0 || !bytes[i - 1].is_ascii_digit() {
            continue;
        }
        if bytes.len() < i + 4 || !bytes[i + 1..i + 4].iter().all(u8::is_ascii_digit) {
            continue;
        }

        let run_start = bytes[..i]
            .iter()
            .rposition(|c| !c.is_ascii_digit())
            .map(|p| p + 1)
            .unwrap_or(0);
        let part_of_name = run_start > 0
            && matches!(bytes[run_start - 1], b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'$' | b'.');
        if !part_of_name {
            return true;
        }
    }
    false
}

/// Rewrite every relative reference token against `anchor`.
///
/// A bracketed part is an offset from the anchor (`R[-1]`), bare digits are an
/// absolute row or column (`R1`), and a missing part keeps the anchor's own
/// row or column. Tokens glued to surrounding identifiers are left alone.
pub fn translate_relative(formula: &str, anchor: CellAddress) -> Result<String> {
    let mut failure: Option<String> = None;

    let translated = RELATIVE_REFERENCE.replace_all(formula, |caps: &Captures| {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        if is_embedded(formula, whole.start, whole.end) {
            return caps[0].to_string();
        }

        let row = resolve_part(caps.get(1).map(|m| m.as_str()), anchor.row);
        let column = resolve_part(caps.get(2).map(|m| m.as_str()), anchor.column);

        match (row, column) {
            (Some(row), Some(column)) if validate_cell(row, column).is_ok() => {
                coordinate_from_row_col(row, column)
            }
            _ => {
                failure.get_or_insert_with(|| {
                    format!("Reference '{}' resolves outside the sheet from {}", &caps[0], anchor)
                });
                caps[0].to_string()
            }
        }
    });

    match failure {
        Some(message) => Err(SheetsmithError::InvalidFormula {
            cell: anchor.to_a1(),
            formula: formula.to_string(),
            errors: vec![message],
        }),
        None => Ok(translated.into_owned()),
    }
}

fn resolve_part(part: Option<&str>, base: u32) -> Option<u32> {
    match part {
        None => Some(base),
        Some(p) if p.starts_with('[') => {
            let offset: i64 = p.trim_matches(|c| c == '[' || c == ']').parse().ok()?;
            (base as i64).checked_add(offset).and_then(|v| u32::try_from(v).ok())
        }
        Some(p) => p.parse().ok(),
    }
}

fn is_embedded(text: &str, start: usize, end: usize) -> bool {
    let glued = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '(';
    let before = text[..start].chars().next_back().map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    let after = text[end..].chars().next().map_or(false, glued);
    before || after
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(address: &str) -> CellAddress {
        CellAddress::parse(address).unwrap()
    }

    #[test]
    fn test_translate_offsets() {
        assert_eq!(translate_relative("=SUM(R[-3]C:R[-1]C)", at("D4")).unwrap(), "=SUM(D1:D3)");
        assert_eq!(translate_relative("=RC[-1]*2", at("C2")).unwrap(), "=B2*2");
        assert_eq!(translate_relative("=R[+1]C[2]", at("A1")).unwrap(), "=C2");
    }

    #[test]
    fn test_translate_absolute_parts() {
        assert_eq!(translate_relative("=SUM(R1C:R3C)", at("D5")).unwrap(), "=SUM(D1:D3)");
        assert_eq!(translate_relative("=R2C3", at("Z99")).unwrap(), "=C2");
        assert_eq!(translate_relative("=RC", at("B7")).unwrap(), "=B7");
    }

    #[test]
    fn test_translate_leaves_identifiers_alone() {
        assert_eq!(translate_relative("=ARC(R[-1]C)", at("B2")).unwrap(), "=ARC(B1)");
        assert_eq!(translate_relative("=A1+B2", at("C3")).unwrap(), "=A1+B2");
    }

    #[test]
    fn test_translate_out_of_sheet_fails() {
        let err = translate_relative("=R[-5]C", at("A2")).unwrap_err();
        match err {
            SheetsmithError::InvalidFormula { cell, errors, .. } => {
                assert_eq!(cell, "A2");
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(translate_relative("=RC[99999]", at("A1")).is_err());
    }

    #[test]
    fn test_translate_huge_offset_fails() {
        let err = translate_relative("=R[9223372036854775807]C", at("A2")).unwrap_err();
        assert!(matches!(err, SheetsmithError::InvalidFormula { .. }));
        assert!(translate_relative("=RC[-9223372036854775808]", at("B2")).is_err());
    }

    #[test]
    fn test_validate_clean_formulas() {
        assert!(validate_formula("=SUM(A1:B2)").is_empty());
        assert!(validate_formula("SUM(A1,100)").is_empty());
        assert!(validate_formula("'My Sheet'!A1+1000").is_empty());
        assert!(validate_formula("ROUND(A1,2)").is_empty());
    }

    #[test]
    fn test_validate_empty() {
        assert_eq!(validate_formula(""), vec!["Formula is empty"]);
        assert_eq!(validate_formula("  "), vec!["Formula is empty"]);
    }

    #[test]
    fn test_validate_space_range() {
        let errors = validate_formula("=SUM(A1 B2)");
        assert!(errors.contains(&"Cell ranges must use ':' not space".to_string()));
    }

    #[test]
    fn test_validate_parentheses() {
        assert_eq!(validate_formula("=SUM(A1:B2"), vec!["Missing closing parenthesis"]);
        assert_eq!(validate_formula("=A1)+(B1"), vec!["Parentheses closed before opening"]);
    }

    #[test]
    fn test_validate_grouped_number() {
        let errors = validate_formula("=1,000+A1");
        assert_eq!(
            errors,
            vec!["Numbers should not contain commas for formatting (e.g., use 1000 not 1,000)"]
        );
    }

    #[test]
    fn test_validate_argument_lists_are_not_grouped_numbers() {
        assert!(validate_formula("=IF(A1>0,1,100)").is_empty());
        assert!(validate_formula("=MAX(5,250)").is_empty());
        assert!(validate_formula("=SUM(1,234)").is_empty());
        assert!(!validate_formula("=2,500*SUM(1,234)").is_empty());
    }

    #[test]
    fn test_validate_unquoted_sheet_and_external_path() {
        let errors = validate_formula("=Sales Data!A1");
        assert!(errors.contains(&"Sheet names with spaces must be wrapped in single quotes".to_string()));

        let errors = validate_formula("='C:\\Reports\\Sheet1'!A1");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("External references"));
        assert!(validate_formula("='C:\\Reports\\[Book.xlsx]Sheet1'!A1").is_empty());
    }

    #[test]
    fn test_validate_function_call_bound() {
        let nested = format!("={}1{}", "ABS(".repeat(65), ")".repeat(65));
        let errors = validate_formula(&nested);
        assert_eq!(errors, vec!["Formula nests more than 64 functions"]);

        let within = format!("={}1{}", "ABS(".repeat(64), ")".repeat(64));
        assert!(validate_formula(&within).is_empty());
    }
}
