//! sheetsmith-core: build styled xlsx workbooks and read them back.
//!
//! A [`Workbook`] records cell actions (values, formulas, merges, pure style
//! assignments, rich text) per worksheet and deduplicates every [`Style`] into
//! a shared stylesheet. Nothing is serialized until [`Workbook::save`] (or one
//! of its siblings) walks the actions in row/column order and emits the OOXML
//! package.
//!
//! ```no_run
//! use sheetsmith_core::{BorderSides, Style, Workbook};
//!
//! let mut wb = Workbook::new();
//! let mut ws = wb.add_worksheet("Report");
//! ws.set_value("A1", "Total", Some(Style::new().with_bold(true)))?;
//! ws.set_value("B1", 0.25, Some(Style::new().with_percentage(true)))?;
//! ws.merge_cells("A3", "C4", Some(Style::new().with_border(BorderSides::AROUND)))?;
//! ws.set_formula("B5", "=SUM(R[-4]C:R[-1]C)", true, None)?;
//! wb.save("report.xlsx")?;
//! # Ok::<(), sheetsmith_core::SheetsmithError>(())
//! ```

pub mod cell;
pub mod error;
pub mod export;
pub mod formula;
pub mod parser;
pub mod reader;
pub mod style;
pub mod utils;
pub mod width;
pub mod workbook;
pub mod worksheet;
pub mod writer;

pub use cell::{CellAction, CellAddress, CellValue, RangeKey, RichTextRun};
pub use error::{Result, SheetsmithError};
pub use export::{
    export_multi_to_bytes, export_multi_to_file, export_to_bytes, export_to_file, to_workbook,
    CancellationFlag, ExportOptions, ExportSet,
};
pub use formula::{translate_relative, validate_formula};
pub use parser::{ExcelParser, ParsedRow, ParsedRows, ParserOptions};
pub use style::{
    BorderSides, Color, DateFormat, FontDecoration, FontFamily, HorizontalAlignment, Style,
    StyleRegistry, StyleTable, VerticalAlignment,
};
pub use utils::{
    column_to_letter, coordinate_from_row_col, expand_range, letter_to_column, parse_coordinate,
    parse_coordinate_bytes, parse_f64_bytes, parse_range, parse_u32_bytes, range_cell_count, validate_cell,
    MAX_COLUMN, MAX_ROW,
};
pub use workbook::{CompressionLevel, Workbook};
pub use worksheet::{CellRange, Worksheet, WorksheetMut};

/// Hash map used for the interning tables.
#[cfg(feature = "fast-hash")]
pub(crate) type FastMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
#[cfg(not(feature = "fast-hash"))]
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V>;
