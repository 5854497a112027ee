//! Worksheet action model.
//!
//! A worksheet records one [`CellAction`] per [`RangeKey`] in insertion order.
//! Single-cell keys and merge rectangles are distinct entries, so a cell can be
//! owned by its own action and covered by a merge at the same time.
//!
//! Mutations that need the workbook's style registry go through
//! [`WorksheetMut`], which borrows both the sheet and the registry.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use chrono::Timelike;

use crate::cell::{CellAction, CellAddress, CellValue, RangeKey, RichTextRun};
use crate::error::{Result, SheetsmithError};
use crate::style::{DateFormat, FontFamily, Style, StyleRegistry};
use crate::utils::{expand_range, parse_range};
use crate::width::{estimate_rich_text_width, estimate_value_width};
use crate::FastMap;

/// A single worksheet in a workbook.
#[derive(Clone, Debug)]
pub struct Worksheet {
    name: String,
    /// Family inherited by styles that leave theirs as `Default`.
    pub font_family: FontFamily,
    /// Size inherited by styles that leave theirs unset.
    pub font_size: Option<f64>,
    /// Emit estimated column widths on save.
    pub autofit_columns: bool,
    pub show_gridlines: bool,
    actions: Vec<CellAction>,
    positions: FastMap<RangeKey, usize>,
    max_column_widths: BTreeMap<u32, f64>,
}

impl Worksheet {
    pub(crate) fn new(name: String) -> Self {
        Worksheet {
            name,
            font_family: FontFamily::Default,
            font_size: None,
            autofit_columns: true,
            show_gridlines: true,
            actions: Vec::new(),
            positions: FastMap::default(),
            max_column_widths: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actions in insertion order.
    pub fn actions(&self) -> &[CellAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions ordered by origin row, then column. Ties keep insertion order.
    pub fn sorted_actions(&self) -> Vec<&CellAction> {
        let mut sorted: Vec<&CellAction> = self.actions.iter().collect();
        sorted.sort_by_key(|action| {
            let origin = action.origin();
            (origin.row, origin.column)
        });
        sorted
    }

    /// Exact-key lookup.
    pub fn action(&self, key: &RangeKey) -> Option<&CellAction> {
        self.positions.get(key).map(|&i| &self.actions[i])
    }

    fn action_mut(&mut self, key: &RangeKey) -> Option<&mut CellAction> {
        match self.positions.get(key) {
            Some(&i) => self.actions.get_mut(i),
            None => None,
        }
    }

    /// The action owning a single cell, if any.
    pub fn cell_action(&self, row: u32, column: u32) -> Option<&CellAction> {
        self.action(&RangeKey::cell(CellAddress { row, column }))
    }

    /// Value written at a cell, or `None` when the cell holds no value action.
    pub fn value_at(&self, row: u32, column: u32) -> Option<&CellValue> {
        match self.cell_action(row, column)? {
            CellAction::Value { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Formula text at a cell, without the leading '='.
    pub fn formula_at(&self, row: u32, column: u32) -> Option<&str> {
        match self.cell_action(row, column)? {
            CellAction::Formula { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn style_index_at(&self, row: u32, column: u32) -> Option<u32> {
        self.cell_action(row, column).and_then(CellAction::style_index)
    }

    /// Merge rectangles in insertion order.
    pub fn merged_ranges(&self) -> impl Iterator<Item = RangeKey> + '_ {
        self.actions.iter().filter_map(|action| match action {
            CellAction::Merge { range, .. } => Some(*range),
            _ => None,
        })
    }

    /// The merge rectangle covering a cell, if any.
    pub fn merge_containing(&self, row: u32, column: u32) -> Option<RangeKey> {
        self.merged_ranges().find(|range| range.contains(row, column))
    }

    /// Bounding rectangle of every recorded key; `A1` for an empty sheet.
    pub fn dimension(&self) -> RangeKey {
        let mut keys = self.actions.iter().map(CellAction::key);
        let Some(first) = keys.next() else {
            return RangeKey::cell(CellAddress { row: 1, column: 1 });
        };
        keys.fold(first, |acc, key| RangeKey {
            start_row: acc.start_row.min(key.start_row),
            start_col: acc.start_col.min(key.start_col),
            end_row: acc.end_row.max(key.end_row),
            end_col: acc.end_col.max(key.end_col),
        })
    }

    /// Estimated width per column, tracked while autofit is on.
    pub fn column_widths(&self) -> &BTreeMap<u32, f64> {
        &self.max_column_widths
    }

    /// Remove the merge record for a rectangle. Styles applied to the covered
    /// cells when the merge was made stay in place.
    ///
    /// Returns whether a merge was removed.
    pub fn unmerge_cells(&mut self, from: &str, to: &str) -> Result<bool> {
        let range = RangeKey::span(CellAddress::parse(from)?, CellAddress::parse(to)?);
        Ok(self.unmerge_range(range))
    }

    pub fn unmerge_range(&mut self, range: RangeKey) -> bool {
        if range.is_single_cell() || !matches!(self.action(&range), Some(CellAction::Merge { .. })) {
            return false;
        }
        self.remove(&range).is_some()
    }

    /// Insert or replace the action at its key. A replaced action keeps its
    /// position in insertion order.
    fn upsert(&mut self, action: CellAction) {
        let key = action.key();
        match self.positions.get(&key) {
            Some(&i) => self.actions[i] = action,
            None => {
                self.positions.insert(key, self.actions.len());
                self.actions.push(action);
            }
        }
    }

    fn remove(&mut self, key: &RangeKey) -> Option<CellAction> {
        let index = self.positions.remove(key)?;
        let removed = self.actions.remove(index);
        for position in self.positions.values_mut() {
            if *position > index {
                *position -= 1;
            }
        }
        Some(removed)
    }

    fn track_width(&mut self, column: u32, width: f64) {
        if !self.autofit_columns {
            return;
        }
        self.max_column_widths
            .entry(column)
            .and_modify(|w| *w = w.max(width))
            .or_insert(width);
    }
}

/// Mutable access to a worksheet together with the workbook's style registry.
pub struct WorksheetMut<'a> {
    sheet: &'a mut Worksheet,
    styles: &'a mut StyleRegistry,
}

impl<'a> WorksheetMut<'a> {
    pub(crate) fn new(sheet: &'a mut Worksheet, styles: &'a mut StyleRegistry) -> Self {
        WorksheetMut { sheet, styles }
    }

    /// Write a value at an A1 address.
    ///
    /// Without a style, an action already at the cell keeps its style index.
    pub fn set_value<V: Into<CellValue>>(&mut self, address: &str, value: V, style: Option<Style>) -> Result<()> {
        self.write_value(CellAddress::parse(address)?, value.into(), style)
    }

    pub fn set_value_at<V: Into<CellValue>>(
        &mut self,
        row: u32,
        column: u32,
        value: V,
        style: Option<Style>,
    ) -> Result<()> {
        self.write_value(CellAddress::new(row, column)?, value.into(), style)
    }

    /// Register a formula. Validation and relative-reference translation run
    /// when the workbook is saved.
    pub fn set_formula(&mut self, address: &str, text: &str, is_relative: bool, style: Option<Style>) -> Result<()> {
        self.write_formula(CellAddress::parse(address)?, text, is_relative, style)
    }

    pub fn set_formula_at(
        &mut self,
        row: u32,
        column: u32,
        text: &str,
        is_relative: bool,
        style: Option<Style>,
    ) -> Result<()> {
        self.write_formula(CellAddress::new(row, column)?, text, is_relative, style)
    }

    /// Merge the rectangle spanned by two corners and style every covered cell.
    ///
    /// Without a style, the top-left cell's current style is spread over the
    /// rectangle.
    pub fn merge_cells(&mut self, from: &str, to: &str, style: Option<Style>) -> Result<()> {
        self.merge_range(CellAddress::parse(from)?, CellAddress::parse(to)?, style)
    }

    pub fn merge_range(&mut self, from: CellAddress, to: CellAddress, style: Option<Style>) -> Result<()> {
        if from == to {
            return Err(SheetsmithError::InvalidArgument(format!(
                "Cannot merge a single cell ({})",
                from
            )));
        }

        let range = RangeKey::span(from, to);
        let top_left = self.sheet.action(&RangeKey::cell(range.top_left())).and_then(CellAction::style_index);
        let style_index = match (style, top_left) {
            (None, Some(index)) => index,
            (style, _) => self.style_index_for(style, None),
        };

        self.sheet.upsert(CellAction::Merge {
            range,
            style_index: Some(style_index),
        });
        for (row, column) in expand_range((range.start_row, range.start_col), (range.end_row, range.end_col)) {
            self.assign_style(CellAddress { row, column }, style_index);
        }
        Ok(())
    }

    /// Assign a style to one cell without touching its contents.
    pub fn set_style(&mut self, address: &str, style: Style) -> Result<()> {
        let at = CellAddress::parse(address)?;
        let index = self.style_index_for(Some(style), None);
        self.assign_style(at, index);
        Ok(())
    }

    /// Assign a style to every cell of a range, independently (no merge).
    pub fn set_style_range(&mut self, from: &str, to: &str, style: Style) -> Result<()> {
        let (from, to) = (CellAddress::parse(from)?, CellAddress::parse(to)?);
        let index = self.style_index_for(Some(style), None);
        for (row, column) in expand_range((from.row, from.column), (to.row, to.column)) {
            self.assign_style(CellAddress { row, column }, index);
        }
        Ok(())
    }

    /// Write inline rich text. The cell keeps the style index it already has.
    pub fn set_rich_text(&mut self, address: &str, runs: Vec<RichTextRun>) -> Result<()> {
        let at = CellAddress::parse(address)?;
        let style_index = match self.sheet.action(&RangeKey::cell(at)).and_then(CellAction::style_index) {
            Some(index) => index,
            None => self.style_index_for(None, None),
        };

        let width = estimate_rich_text_width(&runs, self.sheet.font_size, self.sheet.font_family);
        self.sheet.track_width(at.column, width);
        self.sheet.upsert(CellAction::RichText {
            at,
            runs,
            style_index: Some(style_index),
        });
        Ok(())
    }

    /// Style resolved from a cell's style index.
    pub fn style_at(&self, row: u32, column: u32) -> Option<Style> {
        self.sheet
            .style_index_at(row, column)
            .and_then(|index| self.styles.resolve_by_index(index))
    }

    /// Accessor over "A1" or "A1:C3".
    pub fn range(&mut self, reference: &str) -> Result<CellRange<'_, 'a>> {
        let key = if reference.contains(':') {
            let (from, to) = parse_range(reference)?;
            RangeKey::span(CellAddress { row: from.0, column: from.1 }, CellAddress { row: to.0, column: to.1 })
        } else {
            RangeKey::cell(CellAddress::parse(reference)?)
        };
        Ok(CellRange { sheet: self, key })
    }

    pub fn cell(&mut self, row: u32, column: u32) -> Result<CellRange<'_, 'a>> {
        let key = RangeKey::cell(CellAddress::new(row, column)?);
        Ok(CellRange { sheet: self, key })
    }

    pub fn cells(
        &mut self,
        from_row: u32,
        from_column: u32,
        to_row: u32,
        to_column: u32,
    ) -> Result<CellRange<'_, 'a>> {
        let key = RangeKey::span(CellAddress::new(from_row, from_column)?, CellAddress::new(to_row, to_column)?);
        Ok(CellRange { sheet: self, key })
    }

    fn write_value(&mut self, at: CellAddress, value: CellValue, style: Option<Style>) -> Result<()> {
        if let CellValue::Number(n) = value {
            if !n.is_finite() {
                return Err(SheetsmithError::InvalidArgument(format!("Cannot store {} in cell {}", n, at)));
            }
        }
        let existing = self.sheet.action(&RangeKey::cell(at)).and_then(CellAction::style_index);
        let (style_index, resolved) = match (style, existing) {
            (None, Some(index)) => (index, self.styles.resolve_by_index(index).unwrap_or_default()),
            (style, _) => {
                let resolved = self.effective_style(style, Some(&value));
                (self.styles.intern(&resolved), resolved)
            }
        };

        if !value.is_empty() {
            let width = estimate_value_width(&value, &resolved, self.sheet.font_size, self.sheet.font_family);
            self.sheet.track_width(at.column, width);
        }
        self.sheet.upsert(CellAction::Value {
            at,
            value,
            style_index: Some(style_index),
        });
        Ok(())
    }

    fn write_formula(&mut self, at: CellAddress, text: &str, is_relative: bool, style: Option<Style>) -> Result<()> {
        let existing = self.sheet.action(&RangeKey::cell(at)).and_then(CellAction::style_index);
        let style_index = match (style, existing) {
            (None, Some(index)) => index,
            (style, _) => self.style_index_for(style, None),
        };

        let text = text.trim();
        self.sheet.upsert(CellAction::Formula {
            at,
            text: text.strip_prefix('=').unwrap_or(text).to_string(),
            is_relative,
            style_index: Some(style_index),
        });
        Ok(())
    }

    /// Update an existing action's style in place, or record a style-only cell.
    fn assign_style(&mut self, at: CellAddress, style_index: u32) {
        let key = RangeKey::cell(at);
        match self.sheet.action_mut(&key) {
            Some(action) => action.set_style_index(Some(style_index)),
            None => self.sheet.upsert(CellAction::StyleOnly {
                at,
                style_index: Some(style_index),
            }),
        }

        let estimate = match self.sheet.action(&key) {
            Some(CellAction::Value { value, .. }) if !value.is_empty() => {
                let style = self.styles.resolve_by_index(style_index).unwrap_or_default();
                Some(estimate_value_width(value, &style, self.sheet.font_size, self.sheet.font_family))
            }
            _ => None,
        };
        if let Some(width) = estimate {
            self.sheet.track_width(at.column, width);
        }
    }

    fn style_index_for(&mut self, style: Option<Style>, value: Option<&CellValue>) -> u32 {
        let resolved = self.effective_style(style, value);
        self.styles.intern(&resolved)
    }

    /// Explicit style or a fresh default, with the sheet font filled in and a
    /// date format chosen for date values that have none.
    fn effective_style(&self, style: Option<Style>, value: Option<&CellValue>) -> Style {
        let mut style = style.unwrap_or_default();
        if style.font_family == FontFamily::Default {
            style.font_family = self.sheet.font_family;
        }
        if style.font_size.is_none() {
            style.font_size = self.sheet.font_size;
        }
        if let Some(dt) = value.and_then(CellValue::as_datetime) {
            if style.date_format.is_none() {
                let has_time = dt.hour() != 0 || dt.minute() != 0 || dt.second() != 0;
                style.date_format = Some(if has_time {
                    DateFormat::DateHoursMinutesSeconds
                } else {
                    DateFormat::Date
                });
            }
        }
        style
    }
}

impl Deref for WorksheetMut<'_> {
    type Target = Worksheet;

    fn deref(&self) -> &Worksheet {
        self.sheet
    }
}

impl DerefMut for WorksheetMut<'_> {
    fn deref_mut(&mut self) -> &mut Worksheet {
        self.sheet
    }
}

/// A cell or rectangle of a worksheet, addressed by "A1", (row, col) or
/// (row, col, row, col).
///
/// Value and formula access go through the top-left cell; styling applies to
/// every covered cell.
pub struct CellRange<'w, 'a> {
    sheet: &'w mut WorksheetMut<'a>,
    key: RangeKey,
}

impl CellRange<'_, '_> {
    pub fn key(&self) -> RangeKey {
        self.key
    }

    pub fn value(&self) -> Option<&CellValue> {
        let origin = self.key.top_left();
        self.sheet.value_at(origin.row, origin.column)
    }

    pub fn set_value<V: Into<CellValue>>(&mut self, value: V) -> Result<()> {
        self.sheet.write_value(self.key.top_left(), value.into(), None)
    }

    /// Formula at the top-left cell, with its leading '='.
    pub fn formula(&self) -> Option<String> {
        let origin = self.key.top_left();
        self.sheet.formula_at(origin.row, origin.column).map(|text| format!("={}", text))
    }

    pub fn set_formula(&mut self, text: &str) -> Result<()> {
        self.sheet.write_formula(self.key.top_left(), text, false, None)
    }

    /// True when this exact rectangle is merged.
    pub fn is_merged(&self) -> bool {
        matches!(self.sheet.action(&self.key), Some(CellAction::Merge { .. }))
    }

    pub fn set_merged(&mut self, merged: bool) -> Result<()> {
        if self.key.is_single_cell() {
            return Err(SheetsmithError::InvalidArgument(format!(
                "Cannot merge a single cell ({})",
                self.key.to_a1()
            )));
        }
        if merged {
            self.sheet.merge_range(self.key.top_left(), self.key.bottom_right(), None)
        } else {
            self.sheet.unmerge_range(self.key);
            Ok(())
        }
    }

    pub fn style(&self) -> Option<Style> {
        let origin = self.key.top_left();
        self.sheet.style_at(origin.row, origin.column)
    }

    pub fn set_style(&mut self, style: Style) -> Result<()> {
        let index = self.sheet.style_index_for(Some(style), None);
        let key = self.key;
        for (row, column) in expand_range((key.start_row, key.start_col), (key.end_row, key.end_col)) {
            self.sheet.assign_style(CellAddress { row, column }, index);
        }
        Ok(())
    }
}
