#![no_main]

//! Arbitrary bytes fed to template loading and the row parser must produce
//! errors, not panics.

use libfuzzer_sys::fuzz_target;
use sheetsmith_core::{ExcelParser, ParserOptions, Workbook};

fuzz_target!(|data: &[u8]| {
    if let Ok(wb) = Workbook::load_from_bytes(data) {
        // Loaded formulas may fail validation; that is an error, not a panic.
        let _ = wb.save_to_bytes();
    }

    if let Ok(mut parser) = ExcelParser::from_bytes(data.to_vec(), ParserOptions::default()) {
        if let Ok(rows) = parser.rows() {
            for row in rows.take(1000) {
                if row.is_err() {
                    break;
                }
            }
        }
    }
});
