//! Cell styling: the `Style` descriptor and the per-workbook `StyleRegistry`
//! that deduplicates styles into fonts, fills, borders, number formats and
//! cell formats.

use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use log::trace;

use crate::cell::format_number;
use crate::error::{Result, SheetsmithError};
use crate::FastMap;

/// First id available for custom number formats; 0-163 are built in.
pub const FIRST_CUSTOM_NUMBER_FORMAT_ID: u32 = 164;

bitflags! {
    /// Font decorations, combinable.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FontDecoration: u8 {
        const BOLD = 1;
        const ITALIC = 2;
        const UNDERLINE = 4;
        const STRIKEOUT = 8;
    }
}

bitflags! {
    /// Thin border edges, combinable.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BorderSides: u8 {
        const TOP = 1;
        const BOTTOM = 2;
        const LEFT = 4;
        const RIGHT = 8;
        const AROUND = Self::TOP.bits() | Self::BOTTOM.bits() | Self::LEFT.bits() | Self::RIGHT.bits();
    }
}

/// Font family choice. `Default` leaves the family to the consuming application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FontFamily {
    #[default]
    Default,
    Calibri,
    Arial,
}

impl FontFamily {
    /// Name written to the font record, if any.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            FontFamily::Default => None,
            FontFamily::Calibri => Some("Calibri"),
            FontFamily::Arial => Some("Arial"),
        }
    }

    /// Map a font name read from a package; unknown names become `Default`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Calibri" => FontFamily::Calibri,
            "Arial" => FontFamily::Arial,
            _ => FontFamily::Default,
        }
    }

    /// Relative glyph width against Calibri.
    pub fn width_factor(&self) -> f64 {
        match self {
            FontFamily::Arial => 1.08,
            FontFamily::Calibri | FontFamily::Default => 1.0,
        }
    }
}

/// How a date/time value is displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DateFormat {
    /// Date only (built-in format 14).
    Date,
    HoursMinutes,
    HoursMinutesSeconds,
    DateHours,
    DateHoursMinutes,
    DateHoursMinutesSeconds,
    /// No date format; the serial value is shown with the General format.
    General,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
}

impl HorizontalAlignment {
    fn as_str(&self) -> &'static str {
        match self {
            HorizontalAlignment::Left => "left",
            HorizontalAlignment::Center => "center",
            HorizontalAlignment::Right => "right",
        }
    }

    pub(crate) fn from_attr(value: &str) -> Option<Self> {
        match value {
            "left" => Some(HorizontalAlignment::Left),
            "center" => Some(HorizontalAlignment::Center),
            "right" => Some(HorizontalAlignment::Right),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
}

impl VerticalAlignment {
    fn as_str(&self) -> &'static str {
        match self {
            VerticalAlignment::Top => "top",
            VerticalAlignment::Center => "center",
            VerticalAlignment::Bottom => "bottom",
        }
    }

    pub(crate) fn from_attr(value: &str) -> Option<Self> {
        match value {
            "top" => Some(VerticalAlignment::Top),
            "center" => Some(VerticalAlignment::Center),
            "bottom" => Some(VerticalAlignment::Bottom),
            _ => None,
        }
    }
}

/// An ARGB color. Equality is by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color(u32);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::argb(0xFF, r, g, b)
    }

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    /// Parse "#RRGGBB", "RRGGBB" or "AARRGGBB".
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim_start_matches('#');
        let value = u32::from_str_radix(digits, 16)
            .map_err(|_| SheetsmithError::InvalidArgument(format!("Invalid color: '{}'", hex)))?;
        match digits.len() {
            6 => Ok(Color(0xFF00_0000 | value)),
            8 => Ok(Color(value)),
            _ => Err(SheetsmithError::InvalidArgument(format!("Invalid color: '{}'", hex))),
        }
    }

    pub fn to_argb(&self) -> u32 {
        self.0
    }

    /// Eight uppercase hex digits, as written to `rgb` attributes.
    pub fn to_hex(&self) -> String {
        format!("{:08X}", self.0)
    }
}

/// Value descriptor for the look of a cell.
///
/// Styles are compared field by field; equal styles always resolve to the
/// same cell format index in a workbook.
#[derive(Clone, Debug, Default)]
pub struct Style {
    pub font_decoration: FontDecoration,
    pub font_family: FontFamily,
    /// Size in points; `None` inherits the worksheet default.
    pub font_size: Option<f64>,
    pub font_color: Option<Color>,
    /// `None` lets date values pick a format from their time component.
    pub date_format: Option<DateFormat>,
    /// Solid fill color.
    pub fill_color: Option<Color>,
    pub border: BorderSides,
    pub thousand_separator: bool,
    pub decimal_places: Option<u32>,
    pub percentage: bool,
    /// Custom number format code; wins over every other number setting.
    pub number_format: Option<String>,
    pub horizontal_alignment: Option<HorizontalAlignment>,
    pub vertical_alignment: Option<VerticalAlignment>,
    pub wrap_text: bool,
    /// Text rotation in degrees (0-180, or 255 for vertical text).
    pub text_rotation: Option<u32>,
    pub indent: Option<u32>,
    pub shrink_to_fit: bool,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bold(self, bold: bool) -> Self {
        self.with_decoration_flag(FontDecoration::BOLD, bold)
    }

    pub fn with_italic(self, italic: bool) -> Self {
        self.with_decoration_flag(FontDecoration::ITALIC, italic)
    }

    pub fn with_underline(self, underline: bool) -> Self {
        self.with_decoration_flag(FontDecoration::UNDERLINE, underline)
    }

    pub fn with_strikeout(self, strikeout: bool) -> Self {
        self.with_decoration_flag(FontDecoration::STRIKEOUT, strikeout)
    }

    fn with_decoration_flag(mut self, flag: FontDecoration, on: bool) -> Self {
        self.font_decoration.set(flag, on);
        self
    }

    pub fn with_font_family(mut self, family: FontFamily) -> Self {
        self.font_family = family;
        self
    }

    pub fn with_font_size(mut self, size: f64) -> Self {
        self.font_size = Some(size);
        self
    }

    pub fn with_font_color(mut self, color: Color) -> Self {
        self.font_color = Some(color);
        self
    }

    pub fn with_date_format(mut self, format: DateFormat) -> Self {
        self.date_format = Some(format);
        self
    }

    pub fn with_fill_color(mut self, color: Color) -> Self {
        self.fill_color = Some(color);
        self
    }

    pub fn with_border(mut self, border: BorderSides) -> Self {
        self.border = border;
        self
    }

    pub fn with_thousand_separator(mut self, on: bool) -> Self {
        self.thousand_separator = on;
        self
    }

    pub fn with_decimal_places(mut self, places: u32) -> Self {
        self.decimal_places = Some(places);
        self
    }

    pub fn with_percentage(mut self, on: bool) -> Self {
        self.percentage = on;
        self
    }

    /// Set a custom number format code such as `"0.000"` or `"dd/mm/yyyy"`.
    pub fn with_number_format<S: Into<String>>(mut self, code: S) -> Self {
        self.number_format = Some(code.into());
        self
    }

    pub fn with_horizontal_alignment(mut self, align: HorizontalAlignment) -> Self {
        self.horizontal_alignment = Some(align);
        self
    }

    pub fn with_vertical_alignment(mut self, align: VerticalAlignment) -> Self {
        self.vertical_alignment = Some(align);
        self
    }

    pub fn with_wrap_text(mut self, wrap: bool) -> Self {
        self.wrap_text = wrap;
        self
    }

    pub fn with_text_rotation(mut self, degrees: u32) -> Self {
        self.text_rotation = Some(degrees);
        self
    }

    pub fn with_indent(mut self, indent: u32) -> Self {
        self.indent = Some(indent);
        self
    }

    pub fn with_shrink_to_fit(mut self, shrink: bool) -> Self {
        self.shrink_to_fit = shrink;
        self
    }

    pub fn is_bold(&self) -> bool {
        self.font_decoration.contains(FontDecoration::BOLD)
    }

    fn custom_format_code(&self) -> Option<&str> {
        self.number_format.as_deref().filter(|code| !code.trim().is_empty())
    }

    fn has_alignment(&self) -> bool {
        self.horizontal_alignment.is_some()
            || self.vertical_alignment.is_some()
            || self.wrap_text
            || self.text_rotation.is_some()
            || self.indent.is_some()
            || self.shrink_to_fit
    }

    /// Canonical `<font>` record; also the font dedup key.
    pub(crate) fn font_xml(&self) -> String {
        let mut body = String::new();
        if let Some(size) = self.font_size {
            body.push_str(&format!(r#"<sz val="{}"/>"#, format_number(size)));
        }
        if let Some(name) = self.font_family.name() {
            body.push_str(&format!(r#"<name val="{}"/>"#, name));
        }
        for (flag, tag) in [
            (FontDecoration::BOLD, "<b/>"),
            (FontDecoration::ITALIC, "<i/>"),
            (FontDecoration::UNDERLINE, "<u/>"),
            (FontDecoration::STRIKEOUT, "<strike/>"),
        ] {
            if self.font_decoration.contains(flag) {
                body.push_str(tag);
            }
        }
        if let Some(color) = self.font_color {
            body.push_str(&format!(r#"<color rgb="{}"/>"#, color.to_hex()));
        }

        if body.is_empty() {
            "<font/>".to_string()
        } else {
            format!("<font>{}</font>", body)
        }
    }

    /// Canonical `<fill>` record; also the fill dedup key.
    pub(crate) fn fill_xml(&self) -> String {
        match self.fill_color {
            None => NO_FILL_XML.to_string(),
            Some(color) => {
                let hex = color.to_hex();
                format!(
                    r#"<fill><patternFill patternType="solid"><fgColor rgb="{hex}"/><bgColor rgb="{hex}"/></patternFill></fill>"#
                )
            }
        }
    }

    /// Canonical `<border>` record; also the border dedup key.
    pub(crate) fn border_xml(&self) -> String {
        let side = |tag: &str, flag: BorderSides| {
            if self.border.contains(flag) {
                format!(r#"<{} style="thin"/>"#, tag)
            } else {
                format!("<{}/>", tag)
            }
        };
        format!(
            "<border>{}{}{}{}<diagonal/></border>",
            side("left", BorderSides::LEFT),
            side("right", BorderSides::RIGHT),
            side("top", BorderSides::TOP),
            side("bottom", BorderSides::BOTTOM),
        )
    }

    /// `<alignment>` block, present only when an alignment field is set.
    pub(crate) fn alignment_xml(&self) -> Option<String> {
        if !self.has_alignment() {
            return None;
        }
        let mut xml = String::from("<alignment");
        if let Some(h) = self.horizontal_alignment {
            xml.push_str(&format!(r#" horizontal="{}""#, h.as_str()));
        }
        if let Some(v) = self.vertical_alignment {
            xml.push_str(&format!(r#" vertical="{}""#, v.as_str()));
        }
        if let Some(rotation) = self.text_rotation {
            xml.push_str(&format!(r#" textRotation="{}""#, rotation));
        }
        if self.wrap_text {
            xml.push_str(r#" wrapText="1""#);
        }
        if let Some(indent) = self.indent {
            xml.push_str(&format!(r#" indent="{}""#, indent));
        }
        if self.shrink_to_fit {
            xml.push_str(r#" shrinkToFit="1""#);
        }
        xml.push_str("/>");
        Some(xml)
    }

    fn size_bits(&self) -> Option<u64> {
        self.font_size.map(f64::to_bits)
    }
}

impl PartialEq for Style {
    fn eq(&self, other: &Self) -> bool {
        self.font_decoration == other.font_decoration
            && self.font_family == other.font_family
            && self.size_bits() == other.size_bits()
            && self.font_color == other.font_color
            && self.date_format == other.date_format
            && self.fill_color == other.fill_color
            && self.border == other.border
            && self.thousand_separator == other.thousand_separator
            && self.decimal_places == other.decimal_places
            && self.percentage == other.percentage
            && self.number_format == other.number_format
            && self.horizontal_alignment == other.horizontal_alignment
            && self.vertical_alignment == other.vertical_alignment
            && self.wrap_text == other.wrap_text
            && self.text_rotation == other.text_rotation
            && self.indent == other.indent
            && self.shrink_to_fit == other.shrink_to_fit
    }
}

impl Eq for Style {}

impl Hash for Style {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.font_decoration.hash(state);
        self.font_family.hash(state);
        self.size_bits().hash(state);
        self.font_color.hash(state);
        self.date_format.hash(state);
        self.fill_color.hash(state);
        self.border.hash(state);
        self.thousand_separator.hash(state);
        self.decimal_places.hash(state);
        self.percentage.hash(state);
        self.number_format.hash(state);
        self.horizontal_alignment.hash(state);
        self.vertical_alignment.hash(state);
        self.wrap_text.hash(state);
        self.text_rotation.hash(state);
        self.indent.hash(state);
        self.shrink_to_fit.hash(state);
    }
}

const NO_FILL_XML: &str = r#"<fill><patternFill patternType="none"/></fill>"#;
const GRAY_FILL_XML: &str = r#"<fill><patternFill patternType="gray125"/></fill>"#;

/// A custom number format record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberFormat {
    pub id: u32,
    pub code: String,
}

/// Composite cell format (an `xf` record); its table index is what cells store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellFormat {
    pub font_id: u32,
    pub fill_id: u32,
    pub border_id: u32,
    pub number_format_id: u32,
    pub apply_fill: bool,
    pub apply_border: bool,
    pub apply_number_format: bool,
    /// Serialized `<alignment>` child.
    pub alignment: Option<String>,
}

/// Snapshot of a registry, ready for serialization.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleTable {
    pub number_formats: Vec<NumberFormat>,
    pub fonts: Vec<String>,
    pub fills: Vec<String>,
    pub borders: Vec<String>,
    pub cell_formats: Vec<CellFormat>,
}

/// Per-workbook style deduplication tables.
///
/// Fill 0 is always "none" and fill 1 is always "gray125"; cell format 0 is
/// always the default style. Tables only grow.
#[derive(Clone, Debug)]
pub struct StyleRegistry {
    index_by_style: FastMap<Style, u32>,
    styles: Vec<Style>,
    fonts: Vec<String>,
    font_ids: FastMap<String, u32>,
    fills: Vec<String>,
    fill_ids: FastMap<String, u32>,
    borders: Vec<String>,
    border_ids: FastMap<String, u32>,
    number_formats: Vec<NumberFormat>,
    cell_formats: Vec<CellFormat>,
    next_number_format_id: u32,
}

impl StyleRegistry {
    pub fn new() -> Self {
        let mut registry = StyleRegistry {
            index_by_style: FastMap::default(),
            styles: Vec::new(),
            fonts: Vec::new(),
            font_ids: FastMap::default(),
            fills: Vec::new(),
            fill_ids: FastMap::default(),
            borders: Vec::new(),
            border_ids: FastMap::default(),
            number_formats: Vec::new(),
            cell_formats: Vec::new(),
            next_number_format_id: FIRST_CUSTOM_NUMBER_FORMAT_ID,
        };

        intern_record(&mut registry.fills, &mut registry.fill_ids, NO_FILL_XML.to_string());
        intern_record(&mut registry.fills, &mut registry.fill_ids, GRAY_FILL_XML.to_string());
        registry.intern(&Style::default());

        registry
    }

    /// Cell format index for a style, creating the records on first sight.
    pub fn intern(&mut self, style: &Style) -> u32 {
        if let Some(&index) = self.index_by_style.get(style) {
            return index;
        }

        let font_id = intern_record(&mut self.fonts, &mut self.font_ids, style.font_xml());
        let fill_id = intern_record(&mut self.fills, &mut self.fill_ids, style.fill_xml());
        let border_id = intern_record(&mut self.borders, &mut self.border_ids, style.border_xml());
        let number_format_id = self.number_format_id(style);

        let format = CellFormat {
            font_id,
            fill_id,
            border_id,
            number_format_id,
            apply_fill: style.fill_color.is_some(),
            apply_border: !style.border.is_empty(),
            apply_number_format: number_format_id >= FIRST_CUSTOM_NUMBER_FORMAT_ID,
            alignment: style.alignment_xml(),
        };

        let index = self.cell_formats.len() as u32;
        trace!(
            "interned style {} (font {}, fill {}, border {}, numFmt {})",
            index, font_id, fill_id, border_id, number_format_id
        );
        self.cell_formats.push(format);
        self.styles.push(style.clone());
        self.index_by_style.insert(style.clone(), index);
        index
    }

    /// The style that was interned at `index`.
    pub fn resolve_by_index(&self, index: u32) -> Option<Style> {
        self.styles.get(index as usize).cloned()
    }

    pub fn cell_format(&self, index: u32) -> Option<&CellFormat> {
        self.cell_formats.get(index as usize)
    }

    pub fn cell_format_count(&self) -> usize {
        self.cell_formats.len()
    }

    pub fn font_count(&self) -> usize {
        self.fonts.len()
    }

    pub fn fill_count(&self) -> usize {
        self.fills.len()
    }

    pub fn border_count(&self) -> usize {
        self.borders.len()
    }

    pub fn number_formats(&self) -> &[NumberFormat] {
        &self.number_formats
    }

    /// Snapshot of every table in insertion order.
    pub fn build_table(&self) -> StyleTable {
        StyleTable {
            number_formats: self.number_formats.clone(),
            fonts: self.fonts.clone(),
            fills: self.fills.clone(),
            borders: self.borders.clone(),
            cell_formats: self.cell_formats.clone(),
        }
    }

    /// Number format id, first match wins: custom code, percentage,
    /// thousands separator, decimal places, date format, General.
    fn number_format_id(&mut self, style: &Style) -> u32 {
        if let Some(code) = style.custom_format_code() {
            return self.add_custom_format(code.to_string());
        }

        let decimals = style.decimal_places.unwrap_or(0);

        if style.percentage {
            return match decimals {
                0 => 9,
                2 => 10,
                n => self.add_custom_format(format!("0.{}%", "0".repeat(n as usize))),
            };
        }

        if style.thousand_separator {
            return match decimals {
                0 => 3,
                2 => 4,
                n => self.add_custom_format(format!("#,##0.{}", "0".repeat(n as usize))),
            };
        }

        if decimals > 0 {
            return self.add_custom_format(format!("#,##0.0{}", "#".repeat(decimals as usize - 1)));
        }

        match style.date_format {
            Some(DateFormat::Date) => 14,
            Some(DateFormat::HoursMinutes) => 20,
            Some(DateFormat::HoursMinutesSeconds) => 21,
            Some(DateFormat::DateHoursMinutes) => 22,
            Some(DateFormat::DateHours) => self.add_custom_format(DATE_HOURS_CODE.to_string()),
            Some(DateFormat::DateHoursMinutesSeconds) => {
                self.add_custom_format(DATE_HOURS_MINUTES_SECONDS_CODE.to_string())
            }
            Some(DateFormat::General) | None => 0,
        }
    }

    /// Always allocates a new id, even for a code seen before.
    fn add_custom_format(&mut self, code: String) -> u32 {
        let id = self.next_number_format_id;
        self.next_number_format_id += 1;
        self.number_formats.push(NumberFormat { id, code });
        id
    }
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) const DATE_HOURS_CODE: &str = "yyyy-mm-dd hh";
pub(crate) const DATE_HOURS_MINUTES_SECONDS_CODE: &str = "yyyy-mm-dd hh:mm:ss";

fn intern_record(records: &mut Vec<String>, ids: &mut FastMap<String, u32>, xml: String) -> u32 {
    if let Some(&id) = ids.get(&xml) {
        return id;
    }
    let id = records.len() as u32;
    records.push(xml.clone());
    ids.insert(xml, id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_style_builder() {
        let style = Style::new()
            .with_bold(true)
            .with_italic(true)
            .with_font_size(12.0)
            .with_border(BorderSides::TOP | BorderSides::LEFT);

        assert!(style.is_bold());
        assert!(style.font_decoration.contains(FontDecoration::ITALIC));
        assert_eq!(style.font_size, Some(12.0));
        assert!(!style.border.contains(BorderSides::RIGHT));
        assert!(!Style::new().with_bold(true).with_bold(false).is_bold());
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::from_hex("#E6E6E6").unwrap(), Color::rgb(0xE6, 0xE6, 0xE6));
        assert_eq!(Color::from_hex("80FF0000").unwrap().to_hex(), "80FF0000");
        assert_eq!(Color::rgb(1, 2, 3).to_hex(), "FF010203");
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("zzzzzz").is_err());
    }

    #[test]
    fn test_default_tables() {
        let registry = StyleRegistry::new();
        let table = registry.build_table();
        assert_eq!(table.fills[0], NO_FILL_XML);
        assert_eq!(table.fills[1], GRAY_FILL_XML);
        assert_eq!(table.cell_formats.len(), 1);
        assert_eq!(table.fonts, vec!["<font/>".to_string()]);
        assert_eq!(registry.resolve_by_index(0), Some(Style::default()));
    }

    #[test]
    fn test_intern_is_structural() {
        let mut registry = StyleRegistry::new();
        let a = registry.intern(&Style::new().with_bold(true).with_fill_color(Color::rgb(255, 0, 0)));
        let b = registry.intern(&Style::new().with_fill_color(Color::rgb(255, 0, 0)).with_bold(true));
        assert_eq!(a, b);
        assert_eq!(registry.cell_format_count(), 2);
    }

    #[test]
    fn test_sub_records_shared_between_styles() {
        let mut registry = StyleRegistry::new();
        let bold = registry.intern(&Style::new().with_bold(true));
        let bold_framed = registry.intern(&Style::new().with_bold(true).with_border(BorderSides::AROUND));
        assert_ne!(bold, bold_framed);

        let first = registry.cell_format(bold).unwrap().clone();
        let second = registry.cell_format(bold_framed).unwrap().clone();
        assert_eq!(first.font_id, second.font_id);
        assert_eq!(first.fill_id, 0);
        assert_ne!(first.border_id, second.border_id);
        assert!(second.apply_border);
        assert!(!first.apply_border);
    }

    #[test]
    fn test_fixed_fills_survive_custom_fills() {
        let mut registry = StyleRegistry::new();
        registry.intern(&Style::new().with_fill_color(Color::rgb(0, 0, 255)));
        registry.intern(&Style::new().with_fill_color(Color::rgb(0, 255, 0)));
        let table = registry.build_table();
        assert_eq!(table.fills.len(), 4);
        assert_eq!(table.fills[0], NO_FILL_XML);
        assert_eq!(table.fills[1], GRAY_FILL_XML);
        assert_eq!(registry.cell_format(1).unwrap().fill_id, 2);
        assert!(registry.cell_format(1).unwrap().apply_fill);
    }

    #[test]
    fn test_number_format_precedence() {
        let mut registry = StyleRegistry::new();
        let id = |r: &mut StyleRegistry, s: Style| {
            let idx = r.intern(&s);
            r.cell_format(idx).unwrap().number_format_id
        };

        assert_eq!(id(&mut registry, Style::new().with_percentage(true)), 9);
        assert_eq!(id(&mut registry, Style::new().with_percentage(true).with_decimal_places(2)), 10);
        assert_eq!(id(&mut registry, Style::new().with_thousand_separator(true)), 3);
        assert_eq!(id(&mut registry, Style::new().with_thousand_separator(true).with_decimal_places(2)), 4);
        assert_eq!(id(&mut registry, Style::new().with_date_format(DateFormat::Date)), 14);
        assert_eq!(id(&mut registry, Style::new().with_date_format(DateFormat::HoursMinutes)), 20);
        assert_eq!(id(&mut registry, Style::new().with_date_format(DateFormat::HoursMinutesSeconds)), 21);
        assert_eq!(id(&mut registry, Style::new().with_date_format(DateFormat::DateHoursMinutes)), 22);
        assert_eq!(id(&mut registry, Style::new().with_date_format(DateFormat::General)), 0);
        assert_eq!(id(&mut registry, Style::new()), 0);

        // Percentage wins over thousands and date settings.
        let mixed = Style::new()
            .with_percentage(true)
            .with_thousand_separator(true)
            .with_date_format(DateFormat::Date);
        assert_eq!(id(&mut registry, mixed), 9);
        assert!(registry.number_formats().is_empty());
    }

    #[test]
    fn test_custom_number_format_codes() {
        let mut registry = StyleRegistry::new();
        registry.intern(&Style::new().with_percentage(true).with_decimal_places(3));
        registry.intern(&Style::new().with_thousand_separator(true).with_decimal_places(1));
        registry.intern(&Style::new().with_decimal_places(3));
        registry.intern(&Style::new().with_date_format(DateFormat::DateHours));
        registry.intern(&Style::new().with_date_format(DateFormat::DateHoursMinutesSeconds));
        registry.intern(&Style::new().with_number_format("0.000"));

        let codes: Vec<(u32, &str)> = registry
            .number_formats()
            .iter()
            .map(|f| (f.id, f.code.as_str()))
            .collect();
        assert_eq!(
            codes,
            vec![
                (164, "0.000%"),
                (165, "#,##0.0"),
                (166, "#,##0.0##"),
                (167, "yyyy-mm-dd hh"),
                (168, "yyyy-mm-dd hh:mm:ss"),
                (169, "0.000"),
            ]
        );
        assert!(registry.cell_formats.iter().skip(1).all(|f| f.apply_number_format));
    }

    #[test]
    fn test_same_custom_code_in_distinct_styles_allocates_twice() {
        let mut registry = StyleRegistry::new();
        registry.intern(&Style::new().with_number_format("0.0"));
        registry.intern(&Style::new().with_number_format("0.0").with_bold(true));
        registry.intern(&Style::new().with_number_format("0.0"));
        let ids: Vec<u32> = registry.number_formats().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![164, 165]);
    }

    #[test]
    fn test_font_xml_content() {
        let style = Style::new()
            .with_font_size(12.0)
            .with_font_family(FontFamily::Arial)
            .with_bold(true)
            .with_underline(true)
            .with_font_color(Color::rgb(255, 0, 0));
        assert_eq!(
            style.font_xml(),
            r#"<font><sz val="12"/><name val="Arial"/><b/><u/><color rgb="FFFF0000"/></font>"#
        );
    }

    #[test]
    fn test_alignment_only_when_set() {
        assert_eq!(Style::new().alignment_xml(), None);
        let style = Style::new()
            .with_horizontal_alignment(HorizontalAlignment::Center)
            .with_wrap_text(true);
        assert_eq!(
            style.alignment_xml().as_deref(),
            Some(r#"<alignment horizontal="center" wrapText="1"/>"#)
        );
    }

    #[test]
    fn test_border_xml() {
        let style = Style::new().with_border(BorderSides::TOP | BorderSides::BOTTOM);
        assert_eq!(
            style.border_xml(),
            r#"<border><left/><right/><top style="thin"/><bottom style="thin"/><diagonal/></border>"#
        );
    }
}
