//! Address codec: A1-style references to and from (row, column) pairs.

use crate::error::{Result, SheetsmithError};

/// Maximum column number (XFD).
pub const MAX_COLUMN: u32 = 16384;
/// Maximum row number.
pub const MAX_ROW: u32 = 1_048_576;

/// Parse a cell reference from bytes (e.g. b"A1", b"xfd1048576") into (row, column).
///
/// Returns `None` for anything that is not a letter run followed by a digit run,
/// or that falls outside the sheet bounds. Used directly by the package reader.
#[inline]
pub fn parse_coordinate_bytes(bytes: &[u8]) -> Option<(u32, u32)> {
    let letters = bytes.iter().take_while(|b| b.is_ascii_alphabetic()).count();
    if letters == 0 || letters == bytes.len() {
        return None;
    }

    let mut column: u32 = 0;
    for &b in &bytes[..letters] {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as u32;
        column = column.checked_mul(26)?.checked_add(digit)?;
        if column > MAX_COLUMN {
            return None;
        }
    }

    let row = parse_u32_bytes(&bytes[letters..])?;
    if row == 0 || row > MAX_ROW {
        return None;
    }

    Some((row, column))
}

/// Parse a cell reference (e.g. "A1", "ab12") into (row, column).
pub fn parse_coordinate(coord: &str) -> Result<(u32, u32)> {
    let coord = coord.trim();
    parse_coordinate_bytes(coord.as_bytes())
        .ok_or_else(|| SheetsmithError::InvalidAddress(format!("Invalid cell reference: '{}'", coord)))
}

/// Parse a u32 from ASCII digits, rejecting overflow and non-digits.
#[inline]
pub fn parse_u32_bytes(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u32, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add((b - b'0') as u32)
    })
}

/// Parse an f64 from bytes, with a fast path for plain integers.
#[inline]
pub fn parse_f64_bytes(bytes: &[u8]) -> Option<f64> {
    if !bytes.is_empty() && bytes.len() < 16 && bytes.iter().all(u8::is_ascii_digit) {
        return Some(bytes.iter().fold(0.0, |acc, &b| acc * 10.0 + (b - b'0') as f64));
    }
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

/// Convert column letters ("A", "AB", "XFD") to a 1-based column number.
pub fn letter_to_column(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(SheetsmithError::InvalidAddress("Empty column letters".to_string()));
    }

    let mut column: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(SheetsmithError::InvalidAddress(format!(
                "Invalid character '{}' in column '{}'",
                ch, letters
            )));
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A' + 1) as u32;
        column = column
            .checked_mul(26)
            .and_then(|c| c.checked_add(digit))
            .filter(|&c| c <= MAX_COLUMN)
            .ok_or_else(|| {
                SheetsmithError::InvalidAddress(format!(
                    "Column '{}' exceeds maximum (XFD = {})",
                    letters, MAX_COLUMN
                ))
            })?;
    }

    Ok(column)
}

/// Convert a 1-based column number to letters (1 -> "A", 28 -> "AB").
///
/// Column 0 yields an empty string.
pub fn column_to_letter(column: u32) -> String {
    let mut buf = [0u8; 8];
    let mut len = 0;
    let mut col = column;

    while col > 0 {
        col -= 1;
        buf[len] = b'A' + (col % 26) as u8;
        len += 1;
        col /= 26;
    }

    buf[..len].iter().rev().map(|&b| b as char).collect()
}

/// Build an A1-style reference from a 1-based row and column.
pub fn coordinate_from_row_col(row: u32, column: u32) -> String {
    let mut out = column_to_letter(column);
    out.push_str(itoa::Buffer::new().format(row));
    out
}

/// Fail with `OutOfRange` unless the cell lies inside the sheet bounds.
pub fn validate_cell(row: u32, column: u32) -> Result<()> {
    if (1..=MAX_ROW).contains(&row) && (1..=MAX_COLUMN).contains(&column) {
        Ok(())
    } else {
        Err(SheetsmithError::OutOfRange { row, column })
    }
}

/// Parse a range reference (e.g. "A1:B10") into its two corners.
pub fn parse_range(range: &str) -> Result<((u32, u32), (u32, u32))> {
    let (start, end) = range
        .split_once(':')
        .ok_or_else(|| SheetsmithError::InvalidAddress(format!("Invalid range: '{}'", range)))?;

    if end.contains(':') {
        return Err(SheetsmithError::InvalidAddress(format!("Invalid range: '{}'", range)));
    }

    Ok((parse_coordinate(start)?, parse_coordinate(end)?))
}

/// Every cell of the inclusive rectangle spanned by two corners, row-major.
///
/// Corners may be given in any order. The list is built eagerly.
pub fn expand_range(from: (u32, u32), to: (u32, u32)) -> Vec<(u32, u32)> {
    let (top, bottom) = (from.0.min(to.0), from.0.max(to.0));
    let (left, right) = (from.1.min(to.1), from.1.max(to.1));

    let mut cells = Vec::with_capacity(range_cell_count(from, to).min(1 << 16) as usize);
    for row in top..=bottom {
        for column in left..=right {
            cells.push((row, column));
        }
    }
    cells
}

/// Number of cells in the inclusive rectangle spanned by two corners.
pub fn range_cell_count(from: (u32, u32), to: (u32, u32)) -> u64 {
    let rows = u64::from(from.0.abs_diff(to.0)) + 1;
    let columns = u64::from(from.1.abs_diff(to.1)) + 1;
    rows.saturating_mul(columns)
}
