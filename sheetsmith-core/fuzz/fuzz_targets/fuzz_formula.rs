#![no_main]

//! Formula validation, relative translation and saving must report bad
//! formulas as errors, never panic.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sheetsmith_core::{translate_relative, validate_formula, CellAddress, Workbook};

#[derive(Arbitrary, Debug)]
struct FormulaInput {
    formula: String,
    row: u32,
    column: u32,
    relative: bool,
}

fuzz_target!(|input: FormulaInput| {
    let _ = validate_formula(&input.formula);

    let Ok(anchor) = CellAddress::new(input.row, input.column) else {
        return;
    };
    if let Ok(translated) = translate_relative(&input.formula, anchor) {
        let _ = validate_formula(&translated);
    }

    // Saving either succeeds or reports the formula; it never panics.
    let mut wb = Workbook::new();
    let mut ws = wb.add_worksheet("Fuzz");
    if ws
        .set_formula_at(anchor.row, anchor.column, &input.formula, input.relative, None)
        .is_ok()
    {
        let _ = wb.save_to_bytes();
    }
});
