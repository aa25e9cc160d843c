//! Viewport - maps a window of lines onto a width × height row grid
//!
//! Layout is greedy: starting at the top marker, each logical line takes
//! `ceil(len/width)` consecutive rows (one row minimum for an empty line)
//! until the grid or the document runs out. A line that no longer fits in
//! the remaining rows is not shown partially; its rows become filler.
//! Re-running layout from the same top/width/height always produces the
//! same row table.
//!
//! Scrolling moves the top marker and re-lays-out; every scroll returns
//! the number of rows actually scrolled (0 at a document boundary, which
//! is a no-op, never an error). Row/line translation that names a line
//! not currently laid out is a caller bug and panics.

use ropey::Rope;

use crate::buffer::{LineBuffer, Marker};

/// Result of a viewport mutation, used to compute the minimal redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDelta {
    /// The line still occupies the same number of rows.
    Unchanged,
    /// The line's row count changed in place.
    Resized { old_rows: usize, new_rows: usize },
    /// The viewport scrolled this many rows to keep the edited line
    /// fully visible.
    Scrolled(usize),
}

/// The window of lines currently projected onto the grid.
#[derive(Debug)]
pub struct Viewport {
    top: Marker,
    /// Absolute document index of the top line.
    top_line: usize,
    /// Last fully laid-out line.
    bottom: Marker,
    width: usize,
    height: usize,
    /// Row → line offset from the top line; -1 marks a filler row.
    row_line: Vec<i32>,
    visible_lines: usize,
    virtual_height: usize,
}

impl Viewport {
    pub fn new(buf: &LineBuffer, width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "viewport must have a non-empty grid");
        let top = buf.first_marker();
        let mut viewport = Self {
            top,
            top_line: 0,
            bottom: top,
            width,
            height,
            row_line: vec![-1; height],
            visible_lines: 0,
            virtual_height: 0,
        };
        viewport.layout(buf);
        viewport
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn top_line(&self) -> usize {
        self.top_line
    }

    pub fn top_marker(&self) -> Marker {
        self.top
    }

    /// Count of logical lines with at least one row on screen.
    pub fn visible_lines(&self) -> usize {
        self.visible_lines
    }

    /// Rows actually occupied by content (`<= height`).
    pub fn virtual_height(&self) -> usize {
        self.virtual_height
    }

    pub fn set_size(&mut self, buf: &LineBuffer, width: usize, height: usize) {
        assert!(width > 0 && height > 0, "viewport must have a non-empty grid");
        self.width = width;
        self.height = height;
        self.row_line = vec![-1; height];
        self.layout(buf);
    }

    /// Rows needed to display a line of `chars` characters.
    pub fn rows_per_line(&self, chars: usize) -> usize {
        if chars == 0 {
            1
        } else {
            chars.div_ceil(self.width)
        }
    }

    /// Recompute the row table from the current top marker.
    pub fn layout(&mut self, buf: &LineBuffer) {
        let mut rows_remaining = self.height;
        let mut line_offset = 0usize;
        let mut current_row = 0usize;
        while rows_remaining > 0 {
            match buf.line_at(self.top, line_offset as isize) {
                None => {
                    for row in &mut self.row_line[current_row..] {
                        *row = -1;
                    }
                    rows_remaining = 0;
                }
                Some(line) => {
                    let rows = self.rows_per_line(line.len_chars());
                    if rows > rows_remaining {
                        // Never show a line partially; leave filler instead.
                        for row in &mut self.row_line[current_row..] {
                            *row = -1;
                        }
                        rows_remaining = 0;
                    } else {
                        for row in &mut self.row_line[current_row..current_row + rows] {
                            *row = line_offset as i32;
                        }
                        current_row += rows;
                        rows_remaining -= rows;
                        line_offset += 1;
                    }
                }
            }
        }
        self.visible_lines = line_offset;
        self.bottom = if line_offset == 0 {
            self.top
        } else {
            buf.marker_offset(self.top, line_offset as isize - 1)
                .expect("laid-out line must exist")
        };
        let trailing = self
            .row_line
            .iter()
            .rev()
            .take_while(|&&line| line == -1)
            .count();
        self.virtual_height = self.height - trailing;
    }

    // === Coordinate translation ===

    /// The line offset shown on a row, or `None` for a filler row.
    pub fn line_offset_for_row(&self, row: usize) -> Option<usize> {
        let line = self.row_line[row];
        if line < 0 {
            None
        } else {
            Some(line as usize)
        }
    }

    /// Absolute document line shown on a row, or `None` for filler.
    pub fn absolute_line_for_row(&self, row: usize) -> Option<usize> {
        self.line_offset_for_row(row)
            .map(|offset| self.top_line + offset)
    }

    pub fn absolute_line_for_offset(&self, offset: usize) -> usize {
        self.top_line + offset
    }

    /// First grid row of a laid-out line. Panics if the line offset is
    /// not currently laid out - that is a caller bug, not a user error.
    pub fn line_first_row(&self, offset: usize) -> usize {
        for (row, &line) in self.row_line.iter().enumerate() {
            if line < 0 {
                break;
            }
            if line as usize == offset {
                return row;
            }
        }
        panic!("line offset {offset} is not laid out");
    }

    /// Last grid row of a laid-out line. Panics if not laid out.
    pub fn line_last_row(&self, offset: usize) -> usize {
        self.line_first_row(offset) + self.line_row_count(offset) - 1
    }

    /// Number of grid rows a laid-out line occupies. Panics if not laid
    /// out.
    pub fn line_row_count(&self, offset: usize) -> usize {
        let count = self
            .row_line
            .iter()
            .filter(|&&line| line >= 0 && line as usize == offset)
            .count();
        if count == 0 {
            panic!("line offset {offset} is not laid out");
        }
        count
    }

    /// Character position inside the logical line for a grid coordinate.
    /// In insert mode the position may sit one past the last character.
    /// `None` for filler rows.
    pub fn position_in_line(
        &self,
        buf: &LineBuffer,
        row: usize,
        col: usize,
        insert_mode: bool,
    ) -> Option<usize> {
        let offset = self.line_offset_for_row(row)?;
        let row_in_line = row - self.line_first_row(offset);
        let line = self.line(buf, offset)?;
        let limit = line
            .len_chars()
            .saturating_sub(if insert_mode { 0 } else { 1 });
        Some((row_in_line * self.width + col).min(limit))
    }

    /// Grid coordinate of a character position in a laid-out line.
    pub fn grid_position(&self, offset: usize, position: usize) -> (usize, usize) {
        let row = self.line_first_row(offset) + position / self.width;
        (row, position % self.width)
    }

    /// The slice of a line shown on one grid row, or `None` for filler.
    pub fn row_text(&self, buf: &LineBuffer, row: usize) -> Option<String> {
        let offset = self.line_offset_for_row(row)?;
        let row_in_line = row - self.line_first_row(offset);
        let line = self.line(buf, offset)?;
        let start = row_in_line * self.width;
        let end = (start + self.width).min(line.len_chars());
        Some(line.slice(start..end).to_string())
    }

    pub fn line(&self, buf: &LineBuffer, offset: usize) -> Option<Rope> {
        buf.line_at(self.top, offset as isize)
    }

    pub fn line_for_row(&self, buf: &LineBuffer, row: usize) -> Option<Rope> {
        self.line(buf, self.line_offset_for_row(row)?)
    }

    pub fn marker_for_offset(&self, buf: &LineBuffer, offset: usize) -> Option<Marker> {
        buf.marker_offset(self.top, offset as isize)
    }

    pub fn marker_for_row(&self, buf: &LineBuffer, row: usize) -> Option<Marker> {
        self.marker_for_offset(buf, self.line_offset_for_row(row)?)
    }

    /// Line offset of a marker if it is currently laid out.
    pub fn offset_for_marker(&self, buf: &LineBuffer, marker: Marker) -> Option<usize> {
        let mut current = self.top;
        for offset in 0..self.visible_lines.max(1) {
            if current == marker {
                return Some(offset);
            }
            current = buf.next_marker(current)?;
        }
        None
    }

    /// Line offset for an absolute line if visible.
    pub fn relative_offset(&self, absolute_line: usize) -> Option<usize> {
        if absolute_line >= self.top_line && absolute_line - self.top_line < self.visible_lines {
            Some(absolute_line - self.top_line)
        } else {
            None
        }
    }

    pub fn is_line_visible(&self, absolute_line: usize) -> bool {
        self.relative_offset(absolute_line).is_some()
    }

    pub fn is_marker_visible(&self, buf: &LineBuffer, marker: Marker) -> bool {
        self.offset_for_marker(buf, marker).is_some()
    }

    // === Scrolling ===

    /// Scroll backward (toward the document start) by at least `rows`
    /// grid rows. Returns the rows actually scrolled.
    pub fn scroll_down_rows(&mut self, buf: &LineBuffer, rows: usize) -> usize {
        let mut scrolled = 0;
        while scrolled < rows {
            let Some(prev) = buf.marker_offset(self.top, -1) else {
                break;
            };
            self.top = prev;
            self.top_line -= 1;
            scrolled += self.rows_per_line(
                buf.line(prev).map(|line| line.len_chars()).unwrap_or(0),
            );
        }
        self.layout(buf);
        scrolled
    }

    /// Scroll backward by whole logical lines.
    pub fn scroll_down_lines(&mut self, buf: &LineBuffer, lines: usize) -> usize {
        let mut scrolled_rows = 0;
        let mut scrolled_lines = 0;
        while scrolled_lines < lines {
            let Some(prev) = buf.marker_offset(self.top, -1) else {
                break;
            };
            self.top = prev;
            self.top_line -= 1;
            scrolled_rows += self.rows_per_line(
                buf.line(prev).map(|line| line.len_chars()).unwrap_or(0),
            );
            scrolled_lines += 1;
        }
        self.layout(buf);
        scrolled_rows
    }

    /// Scroll forward (toward the document end) by at least `rows` grid
    /// rows, stopping once the last line is laid out.
    pub fn scroll_up_rows(&mut self, buf: &LineBuffer, rows: usize) -> usize {
        let mut scrolled = 0;
        while scrolled < rows && self.bottom != buf.last_marker() {
            let leaving = buf
                .line(self.top)
                .map(|line| line.len_chars())
                .unwrap_or(0);
            let Some(next) = buf.next_marker(self.top) else {
                break;
            };
            scrolled += self.rows_per_line(leaving);
            self.top = next;
            self.top_line += 1;
            self.layout(buf);
        }
        scrolled
    }

    /// Scroll forward until one more line enters the view.
    pub fn scroll_up_line(&mut self, buf: &LineBuffer) -> usize {
        let mut scrolled = 0;
        let previous_bottom = self.bottom;
        while self.bottom != buf.last_marker() {
            let leaving = buf
                .line(self.top)
                .map(|line| line.len_chars())
                .unwrap_or(0);
            let Some(next) = buf.next_marker(self.top) else {
                break;
            };
            scrolled += self.rows_per_line(leaving);
            self.top = next;
            self.top_line += 1;
            self.layout(buf);
            if self.bottom != previous_bottom {
                break;
            }
        }
        scrolled
    }

    /// Re-anchor after the store changed underneath the view (undo
    /// replay): recompute the top line's index, or fall back to
    /// `fallback_line` when the top line itself went away.
    pub fn reanchor(&mut self, buf: &LineBuffer, fallback_line: usize) {
        match buf.marker_index(self.top) {
            Some(index) => {
                self.top_line = index;
                self.layout(buf);
            }
            None => self.scroll_to_line(buf, fallback_line),
        }
    }

    /// Jump the view so `absolute_line` becomes the top line.
    pub fn scroll_to_line(&mut self, buf: &LineBuffer, absolute_line: usize) {
        let clamped = absolute_line.min(buf.line_count() - 1);
        self.top = buf
            .marker_at(clamped)
            .expect("clamped line index is in range");
        self.top_line = clamped;
        self.layout(buf);
    }

    // === Store mutation with layout upkeep ===

    /// Insert a line before the given offset, re-layout, and report the
    /// rows the new line occupies (0 when it landed off screen).
    pub fn insert_line_at_offset(
        &mut self,
        buf: &mut LineBuffer,
        offset: usize,
        value: Rope,
    ) -> usize {
        let rows = self.rows_per_line(value.len_chars());
        match buf.marker_offset(self.top, offset as isize) {
            None => {
                buf.append(value);
            }
            Some(at) => {
                let inserted = buf
                    .insert_before(at, value)
                    .expect("insert point resolved above");
                if offset == 0 {
                    // The new line becomes the top visible line.
                    self.top = inserted;
                }
            }
        }
        self.layout(buf);
        if self.is_line_visible(self.top_line + offset) {
            rows
        } else {
            0
        }
    }

    /// Replace the line at the given offset, re-layout, and report how
    /// the rows changed.
    pub fn set_line_at_offset(
        &mut self,
        buf: &mut LineBuffer,
        offset: usize,
        value: Rope,
    ) -> RowDelta {
        let old_line = self
            .line(buf, offset)
            .expect("line offset must be laid out");
        let old_rows = self.rows_per_line(old_line.len_chars());
        let new_rows = self.rows_per_line(value.len_chars());
        buf.set_line(self.top, offset as isize, value);
        if new_rows == old_rows {
            return RowDelta::Unchanged;
        }
        let first_row = self.line_first_row(offset);
        if first_row + new_rows > self.height {
            // The grown line no longer fits below its first row; refresh
            // the row table, then scroll so its tail stays visible.
            self.layout(buf);
            let scrolled = self.scroll_up_rows(buf, first_row + new_rows - self.height);
            return RowDelta::Scrolled(scrolled);
        }
        self.layout(buf);
        RowDelta::Resized { old_rows, new_rows }
    }

    /// Delete the line at the given offset, keeping the top marker on a
    /// surviving line, and return the removed text.
    pub fn delete_line_at_offset(&mut self, buf: &mut LineBuffer, offset: usize) -> Rope {
        let marker = self
            .marker_for_offset(buf, offset)
            .expect("line offset must be laid out");
        if marker == buf.first_marker() {
            let removed = buf.delete_first();
            self.top = buf.first_marker();
            self.top_line = 0;
            self.layout(buf);
            return removed;
        }
        if offset == 0 {
            if marker == buf.last_marker() {
                self.top = buf
                    .marker_offset(marker, -1)
                    .expect("not the first line");
                self.top_line -= 1;
            } else {
                // The next line takes over the removed line's index.
                self.top = buf.next_marker(marker).expect("not the last line");
            }
        }
        let removed = buf.delete_line(marker).expect("marker resolved above");
        self.layout(buf);
        removed
    }
}
