//! Error types for sheetsmith-core.

use thiserror::Error;

/// Errors raised while building, saving or reading a workbook.
#[derive(Error, Debug)]
pub enum SheetsmithError {
    /// Malformed cell reference such as "A", "1A" or "A1B".
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Cell (row {row}, column {column}) is out of range (max row 1048576, max column 16384)")]
    OutOfRange { row: u32, column: u32 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A formula failed validation or relative-reference translation at save time.
    #[error("Invalid formula '{formula}' in cell {cell}: {}", .errors.join("; "))]
    InvalidFormula {
        cell: String,
        formula: String,
        errors: Vec<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Header row {0} not found")]
    MissingHeaderRow(u32),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("XML parse error: {0}")]
    ParseError(String),

    /// An element kind outside the part's schema ordering table.
    #[error("Packaging error: {0}")]
    Packaging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

impl SheetsmithError {
    /// Create a custom error with a message.
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        SheetsmithError::Custom(msg.into())
    }
}

/// Result type alias for sheetsmith-core operations.
pub type Result<T> = std::result::Result<T, SheetsmithError>;
