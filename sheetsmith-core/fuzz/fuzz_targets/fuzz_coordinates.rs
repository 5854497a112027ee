#![no_main]

//! Address codec fuzzing: no panics, string and byte parsers agree, and
//! in-bounds coordinates survive a format/parse round trip.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sheetsmith_core::{
    column_to_letter, coordinate_from_row_col, letter_to_column, parse_coordinate, parse_coordinate_bytes,
    parse_range, CellAddress, MAX_COLUMN, MAX_ROW,
};

#[derive(Arbitrary, Debug)]
struct CoordinateInput {
    raw_bytes: Vec<u8>,
    text: String,
    row: u32,
    column: u32,
}

fn check_parse(text: &str) {
    if let Ok((row, column)) = parse_coordinate(text) {
        assert!((1..=MAX_ROW).contains(&row), "row {} out of bounds for {:?}", row, text);
        assert!((1..=MAX_COLUMN).contains(&column), "column {} out of bounds for {:?}", column, text);
    }
}

fn check_consistency(text: &str) {
    match (parse_coordinate(text), parse_coordinate_bytes(text.as_bytes())) {
        (Ok(s), Some(b)) => assert_eq!(s, b, "parsers disagree on {:?}", text),
        (Err(_), None) => {}
        // parse_coordinate trims; the byte parser does not
        (Ok(_), None) => assert_ne!(text.trim(), text, "only the string parser accepted {:?}", text),
        (Err(_), Some(b)) => panic!("only the byte parser accepted {:?} as {:?}", text, b),
    }
}

fn check_round_trip(row: u32, column: u32) {
    let letters = column_to_letter(column);
    if column == 0 {
        assert!(letters.is_empty());
        return;
    }
    if column <= MAX_COLUMN {
        assert_eq!(letter_to_column(&letters).ok(), Some(column));
    }

    if CellAddress::new(row, column).is_ok() {
        let reference = coordinate_from_row_col(row, column);
        assert_eq!(parse_coordinate(&reference).ok(), Some((row, column)));
    }
}

fn check_range(text: &str) {
    if let Ok(((r1, c1), (r2, c2))) = parse_range(text) {
        assert!(r1 > 0 && c1 > 0 && r2 > 0 && c2 > 0);
    }
}

fuzz_target!(|input: CoordinateInput| {
    check_parse(&input.text);
    check_consistency(&input.text);
    let _ = parse_coordinate_bytes(&input.raw_bytes);
    let _ = letter_to_column(&input.text);
    check_round_trip(input.row, input.column);
    check_range(&input.text);
});
