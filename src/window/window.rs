//! The edit engine: cursor arithmetic, motions, editing commands, and
//! minimal redraw emission over one viewport.
//!
//! The window owns grid cursor state, the mode machine, the selection
//! mark, and pending-insert bookkeeping. It mutates the line store only
//! through the viewport helpers (or the store's marker primitives for
//! off-screen lines) and pushes one undo record per committed command.
//! Every mutation emits row-level redraw instructions; user-boundary
//! conditions return `false` instead of failing.

use ropey::Rope;

use crate::buffer::{split_register, LineBuffer, Marker};
use crate::render::{Redraw, RedrawOp, FILLER_ROW};
use crate::undo::{UndoLog, UndoRecord};
use crate::viewport::{RowDelta, Viewport};

use super::cursor::{BufferMark, GridCursor};
use super::mode::Mode;
use super::motion::{char_class, is_keyword, skip_space_backward, skip_space_forward, CharClass};
use super::selection::{LineAction, LineRange, SelectionKind};
use super::Register;

/// Text accumulated during one insert-mode session. `backspaced` counts
/// characters consumed to the left of the original insert point.
#[derive(Debug, Default)]
struct PendingInsert {
    text: String,
    backspaced: usize,
    prior_line: Rope,
    line_number: usize,
    insert_point: usize,
    /// The insert session began on a freshly opened line (`o`/`O`).
    opened_line: bool,
}

impl PendingInsert {
    fn has_changed(&self) -> bool {
        !self.text.is_empty() || self.backspaced > 0
    }
}

/// Undo record for a whole-line delete. Removing the document's only
/// line leaves a synthesized empty line behind, so the reversible form
/// of that delete is an edit to empty, not a line removal.
fn delete_line_record(buf: &LineBuffer, line: usize, prior: Rope) -> UndoRecord {
    if buf.line_count() == 1 {
        UndoRecord::Edit {
            line,
            insert_point: 0,
            prior,
        }
    } else {
        UndoRecord::Delete { line, prior }
    }
}

/// The cursor & edit engine over one document and one viewport.
#[derive(Debug)]
pub struct Window {
    viewport: Viewport,
    cursor: GridCursor,
    /// Position within the logical line that vertical motion returns to.
    virtual_column: usize,
    mode: Mode,
    select_mark: Option<BufferMark>,
    pending: PendingInsert,
    redraw: Redraw,
}

impl Window {
    pub fn new(buf: &LineBuffer, width: usize, height: usize) -> Self {
        Self {
            viewport: Viewport::new(buf, width, height),
            cursor: GridCursor::default(),
            virtual_column: 0,
            mode: Mode::Normal,
            select_mark: None,
            pending: PendingInsert::default(),
            redraw: Redraw::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn cursor(&self) -> GridCursor {
        self.cursor
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn select_mark(&self) -> Option<BufferMark> {
        self.select_mark
    }

    /// Drain the redraw instructions accumulated since the last call.
    pub fn take_redraw(&mut self) -> Vec<RedrawOp> {
        self.redraw.take()
    }

    /// `line,column` (1-based) for the external status renderer.
    pub fn position_report(&self, buf: &LineBuffer) -> String {
        let line = self
            .viewport
            .absolute_line_for_row(self.cursor.row)
            .unwrap_or(0);
        let column = self.current_position(buf);
        format!("{},{}", line + 1, column + 1)
    }

    // === Internal coordinate helpers ===

    fn current_line_offset(&self) -> usize {
        self.viewport
            .line_offset_for_row(self.cursor.row)
            .expect("cursor rests on a content row")
    }

    fn current_line(&self, buf: &LineBuffer) -> Rope {
        self.viewport
            .line(buf, self.current_line_offset())
            .expect("cursor line is laid out")
    }

    fn current_position(&self, buf: &LineBuffer) -> usize {
        self.viewport
            .position_in_line(
                buf,
                self.cursor.row,
                self.cursor.col,
                self.mode.allows_past_line_end(),
            )
            .expect("cursor rests on a content row")
    }

    fn current_absolute_line(&self) -> usize {
        self.viewport
            .absolute_line_for_row(self.cursor.row)
            .expect("cursor rests on a content row")
    }

    fn adjust_cursor_to_line_end(&mut self, buf: &LineBuffer, safe: bool) {
        let Some(offset) = self.viewport.line_offset_for_row(self.cursor.row) else {
            return;
        };
        let Some(line) = self.viewport.line(buf, offset) else {
            return;
        };
        let past = safe || self.mode.allows_past_line_end();
        let limit = line.len_chars().saturating_sub(usize::from(!past));
        let position = self.virtual_column.min(limit);
        let (row, col) = self.viewport.grid_position(offset, position);
        self.cursor = GridCursor::new(row, col);
    }

    // === Redraw emission ===

    fn emit_row(&mut self, buf: &LineBuffer, row: usize) {
        let text = self
            .viewport
            .row_text(buf, row)
            .unwrap_or_else(|| FILLER_ROW.to_string());
        self.redraw.push(RedrawOp::SetRow { row, text });
    }

    /// Repaint every grid row (resize, undo, explicit refresh).
    pub fn emit_full(&mut self, buf: &LineBuffer) {
        for row in 0..self.viewport.height() {
            self.emit_row(buf, row);
        }
    }

    pub fn emit_cursor(&mut self) {
        self.redraw.push(RedrawOp::SetCursor {
            row: self.cursor.row,
            col: self.cursor.col,
        });
    }

    fn emit_bottom_fillers(&mut self, buf: &LineBuffer) {
        let mut row = self.viewport.height();
        while row > self.viewport.virtual_height() {
            row -= 1;
            self.emit_row(buf, row);
        }
    }

    fn refresh_line_rows(&mut self, buf: &LineBuffer, offset: usize, from_row: usize) {
        let mut row = from_row;
        while row < self.viewport.height() && self.viewport.line_offset_for_row(row) == Some(offset)
        {
            self.emit_row(buf, row);
            row += 1;
        }
    }

    /// Rows at and below `from_row` shifted up by `deleted_rows`; emit the
    /// scroll plus repaints for the vacated bottom region. `blank_rows`
    /// is the pre-delete filler count, excluded from the scroll region.
    fn emit_delete_rows(
        &mut self,
        buf: &LineBuffer,
        from_row: usize,
        deleted_rows: usize,
        blank_rows: usize,
    ) {
        if deleted_rows == 0 {
            return;
        }
        let bottom = self.viewport.height() - 1;
        let scroll_last = bottom.saturating_sub(blank_rows);
        if from_row <= scroll_last {
            self.redraw.push(RedrawOp::ScrollRows {
                first: from_row,
                last: scroll_last,
                rows: deleted_rows as isize,
            });
        }
        let repaint = (deleted_rows + blank_rows).min(self.viewport.height());
        for row in (self.viewport.height() - repaint)..self.viewport.height() {
            self.emit_row(buf, row);
        }
    }

    // === View scrolling with emission ===

    /// Bring the next line into view at the bottom. Returns rows scrolled.
    fn scroll_view_up_line(&mut self, buf: &LineBuffer) -> usize {
        let pre_virtual = self.viewport.virtual_height();
        let scrolled = self.viewport.scroll_up_line(buf);
        if scrolled > 0 {
            self.redraw.push(RedrawOp::ScrollRows {
                first: 0,
                last: pre_virtual.saturating_sub(1),
                rows: scrolled as isize,
            });
            for row in pre_virtual.saturating_sub(scrolled)..self.viewport.height() {
                self.emit_row(buf, row);
            }
        }
        scrolled
    }

    /// Scroll backward by whole lines. Returns rows scrolled.
    fn scroll_view_down(&mut self, buf: &LineBuffer, lines: usize) -> usize {
        let scrolled = self.viewport.scroll_down_lines(buf, lines);
        if scrolled > 0 {
            self.redraw.push(RedrawOp::ScrollRows {
                first: 0,
                last: self.viewport.height() - 1,
                rows: -(scrolled as isize),
            });
            for row in 0..scrolled.min(self.viewport.height()) {
                self.emit_row(buf, row);
            }
            self.emit_bottom_fillers(buf);
        }
        scrolled
    }

    /// Move the cursor one grid row toward the document end, scrolling at
    /// the last content row. `false` at the document boundary.
    fn move_cursor_row_forward(&mut self, buf: &LineBuffer) -> bool {
        if self.cursor.row + 1 < self.viewport.virtual_height() {
            self.cursor.row += 1;
            return true;
        }
        let scrolled = self.scroll_view_up_line(buf);
        if scrolled == 0 {
            return false;
        }
        self.cursor.row = (self.cursor.row + 1).saturating_sub(scrolled);
        true
    }

    /// Move the cursor one grid row toward the document start, scrolling
    /// at the top. `false` at the document boundary.
    fn move_cursor_row_back(&mut self, buf: &LineBuffer) -> bool {
        if self.cursor.row > 0 {
            self.cursor.row -= 1;
            return true;
        }
        let scrolled = self.scroll_view_down(buf, 1);
        if scrolled == 0 {
            return false;
        }
        self.cursor.row = scrolled - 1;
        true
    }

    // === Elementary motions ===

    pub fn cursor_down(&mut self, buf: &LineBuffer) -> bool {
        let Some(current) = self.viewport.line_offset_for_row(self.cursor.row) else {
            return false;
        };
        if current + 1 < self.viewport.visible_lines() {
            let first = self.viewport.line_first_row(current);
            let target = first + self.viewport.line_row_count(current);
            self.cursor.row = target;
            self.adjust_cursor_to_line_end(buf, false);
            return true;
        }
        // Last visible line: bring the next one in from below.
        let bottom_rows = self.viewport.height() - self.cursor.row;
        let scrolled = self.scroll_view_up_line(buf);
        if scrolled == 0 {
            return false;
        }
        self.cursor.row = (self.cursor.row + bottom_rows)
            .saturating_sub(scrolled)
            .min(self.viewport.virtual_height().saturating_sub(1));
        self.adjust_cursor_to_line_end(buf, false);
        true
    }

    pub fn cursor_up(&mut self, buf: &LineBuffer) -> bool {
        let Some(current) = self.viewport.line_offset_for_row(self.cursor.row) else {
            return false;
        };
        if current > 0 {
            self.cursor.row = self.viewport.line_first_row(current - 1);
            self.adjust_cursor_to_line_end(buf, false);
            return true;
        }
        let moved = self.cursor.row;
        self.cursor.row = 0;
        let scrolled = self.scroll_view_down(buf, 1);
        self.adjust_cursor_to_line_end(buf, false);
        moved > 0 || scrolled > 0
    }

    pub fn cursor_left(&mut self, buf: &LineBuffer, delta: usize) -> bool {
        let before = self.cursor;
        if self.cursor.col < delta {
            let Some(offset) = self.viewport.line_offset_for_row(self.cursor.row) else {
                return false;
            };
            if self.viewport.line_first_row(offset) < self.cursor.row {
                // Wrap to the previous row of the same line.
                self.cursor.col = self.viewport.width() - 1;
                self.cursor.row -= 1;
            } else {
                self.cursor.col = 0;
            }
        } else {
            self.cursor.col -= delta;
        }
        if let Some(position) =
            self.viewport
                .position_in_line(buf, self.cursor.row, self.cursor.col, false)
        {
            self.virtual_column = position;
        }
        self.cursor != before
    }

    pub fn cursor_right(&mut self, buf: &LineBuffer, safe: bool) -> bool {
        let before = self.cursor;
        if self.cursor.col + 1 >= self.viewport.width() {
            self.cursor.col = 0;
            if !self.move_cursor_row_forward(buf) {
                self.cursor = before;
                return false;
            }
        } else {
            self.cursor.col += 1;
        }
        let past = safe || self.mode.allows_past_line_end();
        if let Some(position) =
            self.viewport
                .position_in_line(buf, self.cursor.row, self.cursor.col, past)
        {
            self.virtual_column = position;
        }
        self.adjust_cursor_to_line_end(buf, safe);
        self.cursor != before
    }

    pub fn move_to_line_start(&mut self) {
        let offset = self.current_line_offset();
        self.cursor = GridCursor::new(self.viewport.line_first_row(offset), 0);
        self.virtual_column = 0;
    }

    pub fn move_to_line_end(&mut self, buf: &LineBuffer) {
        let offset = self.current_line_offset();
        let row = self.viewport.line_last_row(offset);
        let past = self.mode.allows_past_line_end();
        let row_len = self
            .viewport
            .row_text(buf, row)
            .map(|text| text.chars().count())
            .unwrap_or(0);
        let line_len = self
            .viewport
            .line(buf, offset)
            .map(|line| line.len_chars())
            .unwrap_or(0);
        self.cursor = GridCursor::new(row, row_len.saturating_sub(usize::from(!past)));
        self.virtual_column = line_len.saturating_sub(usize::from(!past));
    }

    /// Park the cursor at a character position within the current line.
    pub fn move_to_position_in_line(&mut self, buf: &LineBuffer, position: usize) {
        let offset = self.current_line_offset();
        let (row, col) = self.viewport.grid_position(offset, position);
        self.cursor = GridCursor::new(row, col);
        self.virtual_column = position;
        self.adjust_cursor_to_line_end(buf, false);
    }

    // === Word-class motions ===

    /// Continue a forward word scan on the next row. The move itself
    /// counts as motion: a failed retry leaves the cursor at the start
    /// of the wrapped row rather than restoring it.
    fn wrap_forward_and(
        &mut self,
        buf: &LineBuffer,
        retry: fn(&mut Self, &LineBuffer) -> bool,
    ) -> bool {
        let saved_cursor = self.cursor;
        let saved_virtual = self.virtual_column;
        self.cursor.col = 0;
        if self.move_cursor_row_forward(buf) {
            self.virtual_column = 0;
            retry(self, buf);
            true
        } else {
            self.cursor = saved_cursor;
            self.virtual_column = saved_virtual;
            false
        }
    }

    /// Continue a backward word scan on the previous row.
    fn wrap_backward_and(
        &mut self,
        buf: &LineBuffer,
        retry: fn(&mut Self, &LineBuffer) -> bool,
    ) -> bool {
        let saved_cursor = self.cursor;
        let saved_virtual = self.virtual_column;
        self.cursor.col = self.viewport.width() - 1;
        if self.move_cursor_row_back(buf) {
            if let Some(position) =
                self.viewport
                    .position_in_line(buf, self.cursor.row, self.cursor.col, false)
            {
                self.virtual_column = position;
            }
            retry(self, buf);
            true
        } else {
            self.cursor = saved_cursor;
            self.virtual_column = saved_virtual;
            false
        }
    }

    /// `w`: beginning of the next word or punctuation run.
    pub fn word_forward(&mut self, buf: &LineBuffer) -> bool {
        let line = self.current_line(buf);
        let len = line.len_chars();
        let mut position = self.current_position(buf);
        let mut find_any = false;
        if position < len && char_class(line.char(position)) == CharClass::Space {
            position = skip_space_forward(&line, position);
            find_any = true;
        }
        if position < len {
            let find_keyword = !is_keyword(line.char(position));
            let mut i = position;
            while i < len {
                if char_class(line.char(i)) == CharClass::Space {
                    i = skip_space_forward(&line, i);
                    find_any = true;
                    if i >= len {
                        break;
                    }
                }
                let ch = line.char(i);
                if ((find_any || find_keyword) && is_keyword(ch))
                    || ((find_any || !find_keyword) && char_class(ch) == CharClass::Punctuation)
                {
                    self.move_to_position_in_line(buf, i);
                    return true;
                }
                i += 1;
            }
        }
        self.wrap_forward_and(buf, Self::word_forward)
    }

    /// `W`: beginning of the next blank-delimited word.
    pub fn word_forward_any(&mut self, buf: &LineBuffer) -> bool {
        let line = self.current_line(buf);
        let len = line.len_chars();
        let mut i = self.current_position(buf);
        while i < len {
            if char_class(line.char(i)) == CharClass::Space {
                let next = skip_space_forward(&line, i);
                if next < len {
                    self.move_to_position_in_line(buf, next);
                    return true;
                }
                break;
            }
            i += 1;
        }
        self.wrap_forward_and(buf, Self::word_forward_any)
    }

    /// `e`: end of the current or next word/punctuation run.
    pub fn word_end(&mut self, buf: &LineBuffer) -> bool {
        let line = self.current_line(buf);
        let len = line.len_chars();
        let mut position = self.current_position(buf) + 1;
        if position >= len {
            return self.wrap_forward_and(buf, Self::word_end);
        }
        position = skip_space_forward(&line, position);
        if position >= len {
            return self.wrap_forward_and(buf, Self::word_end);
        }
        let find_keyword = !is_keyword(line.char(position));
        for i in position..len {
            let ch = line.char(i);
            let run_ended = if find_keyword {
                is_keyword(ch) || char_class(ch) == CharClass::Space
            } else {
                !is_keyword(ch)
            };
            if run_ended {
                self.move_to_position_in_line(buf, i - 1);
                return true;
            }
        }
        self.move_to_position_in_line(buf, len - 1);
        true
    }

    /// `E`: end of the current or next blank-delimited word.
    pub fn word_end_any(&mut self, buf: &LineBuffer) -> bool {
        let line = self.current_line(buf);
        let len = line.len_chars();
        let mut position = self.current_position(buf) + 1;
        if position >= len {
            return self.wrap_forward_and(buf, Self::word_end_any);
        }
        position = skip_space_forward(&line, position);
        if position >= len {
            return self.wrap_forward_and(buf, Self::word_end_any);
        }
        for i in position..len {
            if char_class(line.char(i)) == CharClass::Space {
                self.move_to_position_in_line(buf, i - 1);
                return true;
            }
        }
        self.move_to_position_in_line(buf, len - 1);
        true
    }

    /// `b`: backward to the beginning of a word/punctuation run.
    pub fn word_backward(&mut self, buf: &LineBuffer) -> bool {
        let line = self.current_line(buf);
        let current = self.current_position(buf);
        let start = if current == 0 {
            None
        } else {
            skip_space_backward(&line, current - 1)
        };
        let Some(position) = start else {
            return self.wrap_backward_and(buf, Self::word_backward);
        };
        let find_keyword = !is_keyword(line.char(position));
        let mut i = position as isize;
        while i >= 0 {
            let ch = line.char(i as usize);
            let run_ended = if find_keyword {
                is_keyword(ch) || char_class(ch) == CharClass::Space
            } else {
                !is_keyword(ch)
            };
            if run_ended {
                self.move_to_position_in_line(buf, i as usize + 1);
                return true;
            }
            i -= 1;
        }
        self.move_to_position_in_line(buf, 0);
        true
    }

    /// `B`: backward to the beginning of a blank-delimited word.
    pub fn word_backward_any(&mut self, buf: &LineBuffer) -> bool {
        let line = self.current_line(buf);
        let current = self.current_position(buf);
        let start = if current == 0 {
            None
        } else {
            skip_space_backward(&line, current - 1)
        };
        let Some(position) = start else {
            return self.wrap_backward_and(buf, Self::word_backward_any);
        };
        let mut i = position as isize;
        while i >= 0 {
            if char_class(line.char(i as usize)) == CharClass::Space {
                self.move_to_position_in_line(buf, i as usize + 1);
                return true;
            }
            i -= 1;
        }
        self.move_to_position_in_line(buf, 0);
        true
    }

    // === Window motions ===

    /// Ctrl-E: shift the view one line toward the document end.
    pub fn scroll_line_down(&mut self, buf: &LineBuffer) -> bool {
        let scrolled = self.scroll_view_up_line(buf);
        if scrolled == 0 {
            return false;
        }
        self.cursor.row = self.cursor.row.saturating_sub(scrolled);
        self.adjust_cursor_to_line_end(buf, false);
        true
    }

    /// Ctrl-Y: shift the view one line toward the document start.
    pub fn scroll_line_up(&mut self, buf: &LineBuffer) -> bool {
        let scrolled = self.scroll_view_down(buf, 1);
        if scrolled == 0 {
            return false;
        }
        self.cursor.row = (self.cursor.row + scrolled)
            .min(self.viewport.virtual_height().saturating_sub(1));
        self.adjust_cursor_to_line_end(buf, false);
        true
    }

    /// Ctrl-D / Ctrl-F: jump forward by rows, cursor to the top row.
    pub fn down_rows(&mut self, buf: &LineBuffer, rows: usize) -> bool {
        let scrolled = self.viewport.scroll_up_rows(buf, rows);
        if scrolled == 0 {
            return false;
        }
        self.emit_full(buf);
        self.cursor = GridCursor::new(0, 0);
        self.virtual_column = 0;
        true
    }

    /// Ctrl-U / Ctrl-B: jump backward by rows, cursor to the last content
    /// row.
    pub fn up_rows(&mut self, buf: &LineBuffer, rows: usize) -> bool {
        let scrolled = self.viewport.scroll_down_rows(buf, rows);
        if scrolled == 0 {
            return false;
        }
        self.emit_full(buf);
        self.cursor = GridCursor::new(self.viewport.virtual_height().saturating_sub(1), 0);
        self.virtual_column = 0;
        true
    }

    /// Jump to an absolute line, scrolling only when it is off screen.
    pub fn goto_line(&mut self, buf: &LineBuffer, absolute_line: usize) {
        let absolute_line = absolute_line.min(buf.line_count() - 1);
        if let Some(offset) = self.viewport.relative_offset(absolute_line) {
            self.cursor = GridCursor::new(self.viewport.line_first_row(offset), 0);
            self.virtual_column = 0;
            return;
        }
        self.viewport.scroll_to_line(buf, absolute_line);
        self.cursor = GridCursor::new(0, 0);
        self.virtual_column = 0;
        self.emit_full(buf);
    }

    /// Resize the grid, re-layout, keep the cursor on its line, and
    /// repaint everything.
    pub fn resize(&mut self, buf: &LineBuffer, width: usize, height: usize) {
        let mut offset = self.viewport.line_offset_for_row(self.cursor.row);
        let mut position = self.viewport.position_in_line(
            buf,
            self.cursor.row,
            self.cursor.col,
            self.mode.allows_past_line_end(),
        );
        self.viewport.set_size(buf, width, height);
        let off_screen = offset.map(|o| o >= self.viewport.visible_lines()).unwrap_or(true)
            || self.cursor.row >= self.viewport.virtual_height();
        if off_screen {
            self.cursor =
                GridCursor::new(self.viewport.virtual_height().saturating_sub(1), 0);
            self.adjust_cursor_to_line_end(buf, false);
            offset = self.viewport.line_offset_for_row(self.cursor.row);
            position = self.viewport.position_in_line(
                buf,
                self.cursor.row,
                self.cursor.col,
                self.mode.allows_past_line_end(),
            );
        }
        let (row, col) = self
            .viewport
            .grid_position(offset.unwrap_or(0), position.unwrap_or(0));
        self.cursor = GridCursor::new(row, col);
        self.emit_full(buf);
    }

    // === Mode transitions ===

    pub fn enter_insert(&mut self, buf: &LineBuffer, opened_line: bool) {
        debug_assert!(self.mode != Mode::Insert, "already in insert mode");
        self.mode = Mode::Insert;
        self.pending = PendingInsert {
            text: String::new(),
            backspaced: 0,
            prior_line: self.current_line(buf),
            line_number: self.current_absolute_line(),
            insert_point: self.current_position(buf),
            opened_line,
        };
    }

    /// Leave insert mode, committing one undo record for the session.
    pub fn exit_insert(&mut self, undo: &mut UndoLog) {
        debug_assert!(self.mode == Mode::Insert, "not in insert mode");
        self.mode = Mode::Normal;
        if self.pending.opened_line {
            undo.push(UndoRecord::Insert {
                line: self.pending.line_number,
            });
        } else if self.pending.has_changed() {
            undo.push(UndoRecord::Edit {
                line: self.pending.line_number,
                insert_point: self.pending.insert_point,
                prior: self.pending.prior_line.clone(),
            });
        }
    }

    pub fn enter_visual(&mut self, buf: &LineBuffer) {
        self.set_select_mark(buf);
        self.mode = Mode::Visual;
    }

    pub fn enter_visual_line(&mut self, buf: &LineBuffer) {
        self.set_select_mark(buf);
        self.mode = Mode::VisualLine;
    }

    fn set_select_mark(&mut self, buf: &LineBuffer) {
        let position = self
            .viewport
            .position_in_line(buf, self.cursor.row, self.cursor.col, false)
            .unwrap_or(0);
        self.select_mark = Some(BufferMark::new(self.current_absolute_line(), position));
    }

    pub fn leave_visual(&mut self) {
        self.mode = Mode::Normal;
        self.select_mark = None;
    }

    pub fn enter_command(&mut self) {
        self.mode = Mode::Command;
    }

    pub fn leave_command(&mut self) {
        self.mode = Mode::Normal;
    }

    // === Insert-mode editing ===

    fn rebuild_insert_line(&self) -> Rope {
        let mut line = self.pending.prior_line.clone();
        let point = self.pending.insert_point - self.pending.backspaced;
        if self.pending.backspaced > 0 {
            line.remove(point..self.pending.insert_point.min(line.len_chars()));
        }
        if point < line.len_chars() {
            line.insert(point, &self.pending.text);
        } else {
            line.append(Rope::from_str(&self.pending.text));
        }
        line
    }

    fn apply_pending_insert(&mut self, buf: &mut LineBuffer) {
        let value = self.rebuild_insert_line();
        if let Some(offset) = self.viewport.relative_offset(self.pending.line_number) {
            self.set_line(buf, offset, Some(self.cursor.row), value);
        }
    }

    pub fn insert_char(&mut self, buf: &mut LineBuffer, ch: char) {
        debug_assert!(self.mode == Mode::Insert, "not in insert mode");
        self.pending.text.push(ch);
        self.apply_pending_insert(buf);
        self.cursor_right(buf, false);
    }

    /// Backspace in insert mode. May cross the insert point into the
    /// pre-insert text, bounded by the start of the line.
    pub fn insert_backspace(&mut self, buf: &mut LineBuffer) -> bool {
        debug_assert!(self.mode == Mode::Insert, "not in insert mode");
        if !self.pending.text.is_empty() {
            self.pending.text.pop();
        } else if self.pending.insert_point > self.pending.backspaced {
            self.pending.backspaced += 1;
        } else {
            return false;
        }
        self.cursor_left(buf, 1);
        self.apply_pending_insert(buf);
        true
    }

    /// Ctrl-U in insert mode: discard the pending insert text. Returns
    /// the number of characters removed.
    pub fn insert_kill(&mut self, buf: &mut LineBuffer) -> usize {
        debug_assert!(self.mode == Mode::Insert, "not in insert mode");
        let removed = self.pending.text.chars().count();
        if removed == 0 {
            return 0;
        }
        self.pending.text.clear();
        self.apply_pending_insert(buf);
        self.cursor_left(buf, removed);
        removed
    }

    /// Enter in insert mode: commit the pending session, open a line
    /// below, and continue inserting there.
    pub fn insert_newline(&mut self, buf: &mut LineBuffer, undo: &mut UndoLog) {
        self.exit_insert(undo);
        self.cursor_left(buf, 1);
        self.open_below(buf, undo);
    }

    // === Normal-mode editing ===

    /// Replace a laid-out line and emit the minimal redraw for the
    /// change. `from_row` locates the refresh start (`None` = the line's
    /// first row). Returns the signed row-count change (0 when the view
    /// scrolled).
    fn set_line(
        &mut self,
        buf: &mut LineBuffer,
        offset: usize,
        from_row: Option<usize>,
        value: Rope,
    ) -> isize {
        let first_row = self.viewport.line_first_row(offset);
        let row = from_row.unwrap_or(first_row);
        let pre_virtual = self.viewport.virtual_height();
        match self.viewport.set_line_at_offset(buf, offset, value) {
            RowDelta::Unchanged => {
                self.refresh_line_rows(buf, offset, row);
                0
            }
            RowDelta::Scrolled(scrolled) => {
                self.redraw.push(RedrawOp::ScrollRows {
                    first: 0,
                    last: pre_virtual.saturating_sub(1),
                    rows: scrolled as isize,
                });
                for r in pre_virtual.saturating_sub(scrolled)..self.viewport.height() {
                    self.emit_row(buf, r);
                }
                self.cursor.row = self.cursor.row.saturating_sub(scrolled);
                let from = row.saturating_sub(scrolled);
                if let Some(new_offset) = self.viewport.line_offset_for_row(from) {
                    self.refresh_line_rows(buf, new_offset, from);
                }
                0
            }
            RowDelta::Resized { old_rows, new_rows } => {
                if new_rows < old_rows {
                    let delta = old_rows - new_rows;
                    self.redraw.push(RedrawOp::ScrollRows {
                        first: first_row + new_rows,
                        last: self.viewport.height() - 1,
                        rows: delta as isize,
                    });
                    for r in (self.viewport.height() - delta.min(self.viewport.height()))
                        ..self.viewport.height()
                    {
                        self.emit_row(buf, r);
                    }
                } else {
                    let delta = new_rows - old_rows;
                    self.redraw.push(RedrawOp::ScrollRows {
                        first: first_row + old_rows,
                        last: self.viewport.height() - 1,
                        rows: -(delta as isize),
                    });
                    self.emit_bottom_fillers(buf);
                }
                self.refresh_line_rows(buf, offset, row.max(first_row));
                new_rows as isize - old_rows as isize
            }
        }
    }

    fn set_current_line(&mut self, buf: &mut LineBuffer, value: Rope) {
        let offset = self.current_line_offset();
        self.set_line(buf, offset, Some(self.cursor.row), value);
    }

    /// `x`: delete `count` characters under and after the cursor.
    pub fn delete_char(&mut self, buf: &mut LineBuffer, undo: &mut UndoLog, count: usize) -> bool {
        let line = self.current_line(buf);
        if line.len_chars() == 0 {
            return false;
        }
        let position = self.current_position(buf);
        let end = (position + count.max(1)).min(line.len_chars());
        undo.push(UndoRecord::Edit {
            line: self.current_absolute_line(),
            insert_point: position,
            prior: line.clone(),
        });
        let mut value = line;
        value.remove(position..end);
        self.set_current_line(buf, value);
        self.adjust_cursor_to_line_end(buf, false);
        true
    }

    /// `D`: delete from the cursor to the end of the line.
    pub fn delete_to_eol(&mut self, buf: &mut LineBuffer, undo: &mut UndoLog) -> bool {
        let line = self.current_line(buf);
        if line.len_chars() == 0 {
            return false;
        }
        let position = self.current_position(buf);
        undo.push(UndoRecord::Edit {
            line: self.current_absolute_line(),
            insert_point: position,
            prior: line.clone(),
        });
        let mut value = line;
        value.remove(position..);
        self.set_current_line(buf, value);
        self.adjust_cursor_to_line_end(buf, false);
        true
    }

    /// `J`: append the next line with a single-space separator. `false`
    /// on the last line.
    pub fn join_line(&mut self, buf: &mut LineBuffer, undo: &mut UndoLog) -> bool {
        let offset = self.current_line_offset();
        let Some(marker) = self.viewport.marker_for_offset(buf, offset) else {
            return false;
        };
        if marker == buf.last_marker() {
            return false;
        }
        let current = self.current_line(buf);
        let next = buf.line_at(marker, 1).expect("not the last line");
        undo.push(UndoRecord::Join {
            line: self.viewport.absolute_line_for_offset(offset),
            prior_joined: current.clone(),
            prior_next: next,
        });
        let join_text = self.viewport.delete_line_at_offset(buf, offset + 1);
        let removed_rows = self.viewport.rows_per_line(join_text.len_chars());
        let mut joined = current;
        let appended = format!(" {}", join_text.to_string().trim());
        joined.append(Rope::from_str(&appended));
        self.set_line(buf, offset, Some(self.cursor.row), joined);
        self.redraw.push(RedrawOp::ScrollRows {
            first: (self.cursor.row + 1).min(self.viewport.height() - 1),
            last: self.viewport.height() - 1,
            rows: removed_rows as isize,
        });
        for row in (self.viewport.height() - removed_rows.min(self.viewport.height()))
            ..self.viewport.height()
        {
            self.emit_row(buf, row);
        }
        true
    }

    /// Delete the cursor's line, leaving the cursor at column 0 of the
    /// line that takes its place. No undo record; callers push their own.
    fn delete_cursor_line(&mut self, buf: &mut LineBuffer) -> String {
        let offset = self.current_line_offset();
        let first_row = self.viewport.line_first_row(offset);
        let blank_rows = self.viewport.height() - self.viewport.virtual_height();
        let removed = self.viewport.delete_line_at_offset(buf, offset);
        let removed_rows = self.viewport.rows_per_line(removed.len_chars());
        self.emit_delete_rows(buf, first_row, removed_rows, blank_rows);
        let row = first_row.min(self.viewport.virtual_height().saturating_sub(1));
        self.cursor = GridCursor::new(row, 0);
        self.virtual_column = 0;
        removed.to_string()
    }

    /// `dd`: delete the current line into the register.
    pub fn delete_current_line(&mut self, buf: &mut LineBuffer, undo: &mut UndoLog) -> String {
        undo.push(delete_line_record(
            buf,
            self.current_absolute_line(),
            self.current_line(buf),
        ));
        self.delete_cursor_line(buf)
    }

    /// Counted `dd`: delete `count` whole lines as one undo step.
    pub fn delete_lines(
        &mut self,
        buf: &mut LineBuffer,
        undo: &mut UndoLog,
        count: usize,
    ) -> Register {
        if count <= 1 {
            return Register::Line(self.delete_current_line(buf, undo));
        }
        let line_number = self.current_absolute_line();
        let count = count.min(buf.line_count() - line_number);
        let mut records = Vec::with_capacity(count);
        let mut register = String::new();
        for _ in 0..count {
            records.push(delete_line_record(
                buf,
                line_number,
                self.current_line(buf),
            ));
            register.push_str(&self.delete_cursor_line(buf));
            register.push('\n');
        }
        undo.push(UndoRecord::Composite(records));
        Register::Text(register)
    }

    /// `yy`: copy the current line into the register.
    pub fn yank_current_line(&self, buf: &LineBuffer) -> String {
        self.current_line(buf).to_string()
    }

    /// Counted `yy`: copy `count` whole lines.
    pub fn yank_lines(&self, buf: &LineBuffer, count: usize) -> Register {
        if count <= 1 {
            return Register::Line(self.yank_current_line(buf));
        }
        let line_number = self.current_absolute_line();
        let count = count.min(buf.line_count() - line_number);
        let marker = buf
            .marker_at(line_number)
            .expect("cursor line is in range");
        let mut register = String::new();
        for offset in 0..count {
            let line = buf
                .line_at(marker, offset as isize)
                .expect("counted lines are in range");
            register.push_str(&line.to_string());
            register.push('\n');
        }
        Register::Text(register)
    }

    /// `o`: open a line below and start inserting.
    pub fn open_below(&mut self, buf: &mut LineBuffer, undo: &mut UndoLog) {
        self.insert_line_after_current(buf, undo, Rope::new(), false);
        self.enter_insert(buf, true);
    }

    /// `O`: open a line above and start inserting.
    pub fn open_above(&mut self, buf: &mut LineBuffer, undo: &mut UndoLog) {
        self.insert_line_before_current(buf, undo, Rope::new(), false);
        self.enter_insert(buf, true);
    }

    /// `p`/`P`: re-insert the register at the cursor. `false` when the
    /// register is empty.
    pub fn put(
        &mut self,
        buf: &mut LineBuffer,
        undo: &mut UndoLog,
        register: &Register,
        before: bool,
    ) -> bool {
        match register {
            Register::Line(text) => {
                let value = Rope::from_str(text);
                if before {
                    self.insert_line_before_current(buf, undo, value, true);
                } else {
                    self.insert_line_after_current(buf, undo, value, true);
                }
            }
            Register::Text(text) => {
                if text.is_empty() {
                    return false;
                }
                let col = if before {
                    self.cursor.col
                } else {
                    self.cursor.col + 1
                };
                self.insert_splice(buf, undo, self.cursor.row, col, split_register(text));
            }
        }
        true
    }

    fn insert_line_after_current(
        &mut self,
        buf: &mut LineBuffer,
        undo: &mut UndoLog,
        text: Rope,
        record: bool,
    ) {
        let current = self.current_line_offset();
        let current_last_row = self.viewport.line_last_row(current);
        let needed_rows = self.viewport.rows_per_line(text.len_chars());
        self.viewport.insert_line_at_offset(buf, current + 1, text);
        let mut current_offset = current;
        let mut shifted = false;
        if current_last_row + needed_rows > self.viewport.height() - 1 {
            // No room below; scroll the inserted line into view.
            let scrolled = self.viewport.scroll_up_rows(buf, needed_rows);
            self.redraw.push(RedrawOp::ScrollRows {
                first: 0,
                last: self.viewport.virtual_height().saturating_sub(1),
                rows: scrolled as isize,
            });
            current_offset = self
                .viewport
                .line_offset_for_row(self.cursor.row.saturating_sub(scrolled))
                .unwrap_or(0);
            shifted = true;
        }
        let inserted_first_row = self.viewport.line_first_row(current_offset + 1);
        if !shifted {
            self.redraw.push(RedrawOp::ScrollRows {
                first: inserted_first_row,
                last: self.viewport.height() - 1,
                rows: -(needed_rows as isize),
            });
        }
        self.emit_bottom_fillers(buf);
        for row in inserted_first_row..(inserted_first_row + needed_rows).min(self.viewport.height())
        {
            self.emit_row(buf, row);
        }
        if shifted {
            for row in (inserted_first_row + needed_rows)..self.viewport.virtual_height() {
                self.emit_row(buf, row);
            }
        }
        self.cursor = GridCursor::new(inserted_first_row, 0);
        self.virtual_column = 0;
        if record {
            undo.push(UndoRecord::Insert {
                line: self.current_absolute_line(),
            });
        }
    }

    fn insert_line_before_current(
        &mut self,
        buf: &mut LineBuffer,
        undo: &mut UndoLog,
        text: Rope,
        record: bool,
    ) {
        if record {
            undo.push(UndoRecord::Insert {
                line: self.current_absolute_line(),
            });
        }
        let current = self.current_line_offset();
        let first_row = self.viewport.line_first_row(current);
        let needed_rows = self.viewport.rows_per_line(text.len_chars());
        self.viewport.insert_line_at_offset(buf, current, text);
        self.redraw.push(RedrawOp::ScrollRows {
            first: first_row,
            last: self.viewport.height() - 1,
            rows: -(needed_rows as isize),
        });
        self.emit_bottom_fillers(buf);
        for row in first_row..(first_row + needed_rows).min(self.viewport.height()) {
            self.emit_row(buf, row);
        }
        self.cursor = GridCursor::new(first_row, 0);
        self.virtual_column = 0;
    }

    /// Splice register parts into the line at (`row`, `col`): the first
    /// part extends the head of the line, interior parts become whole
    /// lines, and the last part picks up the severed tail.
    fn insert_splice(
        &mut self,
        buf: &mut LineBuffer,
        undo: &mut UndoLog,
        row: usize,
        col: usize,
        parts: Vec<Rope>,
    ) {
        let offset = self
            .viewport
            .line_offset_for_row(row)
            .expect("cursor rests on a content row");
        let position = self
            .viewport
            .position_in_line(buf, row, col, true)
            .expect("cursor rests on a content row");
        let line = self.viewport.line(buf, offset).expect("cursor line is laid out");
        let line_number = self.viewport.absolute_line_for_offset(offset);
        if parts.len() == 1 {
            undo.push(UndoRecord::Edit {
                line: line_number,
                insert_point: position,
                prior: line.clone(),
            });
            let mut value = line;
            value.insert(position, &parts[0].to_string());
            self.set_line(buf, offset, Some(row), value);
            return;
        }
        let mut records = vec![UndoRecord::Edit {
            line: line_number,
            insert_point: position,
            prior: line.clone(),
        }];
        let mut tail = line.clone();
        tail.remove(..position);
        let mut first = line;
        first.remove(position..);
        first.append(parts[0].clone());
        let mut added_rows = self.set_line(buf, offset, Some(row), first);
        let last = parts.len() - 1;
        for (i, part) in parts.iter().enumerate().skip(1) {
            records.push(UndoRecord::Insert {
                line: line_number + i,
            });
            let value = if i < last {
                part.clone()
            } else {
                let mut with_tail = part.clone();
                with_tail.append(tail.clone());
                with_tail
            };
            added_rows += self.viewport.insert_line_at_offset(buf, offset + i, value) as isize;
        }
        undo.push(UndoRecord::Composite(records));
        if added_rows > 0 {
            self.redraw.push(RedrawOp::ScrollRows {
                first: row,
                last: self.viewport.height() - 1,
                rows: -added_rows,
            });
        }
        self.emit_bottom_fillers(buf);
        let last_touched = (row as isize + added_rows).max(row as isize) as usize;
        for r in row..=last_touched.min(self.viewport.height() - 1) {
            self.emit_row(buf, r);
        }
    }

    // === Selection commands ===

    /// `d` in visual mode: remove the selection into a register.
    pub fn delete_selection(
        &mut self,
        buf: &mut LineBuffer,
        undo: &mut UndoLog,
    ) -> Option<Register> {
        let (register, records) = self.process_selection(buf, SelectionKind::Delete)?;
        match records.len() {
            0 => {}
            1 => undo.push(records.into_iter().next().expect("one record")),
            _ => undo.push(UndoRecord::Composite(records)),
        }
        Some(register)
    }

    /// `y` in visual mode: copy the selection into a register.
    pub fn yank_selection(&mut self, buf: &mut LineBuffer) -> Option<Register> {
        let (register, _) = self.process_selection(buf, SelectionKind::Yank)?;
        Some(register)
    }

    fn process_selection(
        &mut self,
        buf: &mut LineBuffer,
        kind: SelectionKind,
    ) -> Option<(Register, Vec<UndoRecord>)> {
        let mark = self.select_mark?;
        let cursor_line = self.viewport.absolute_line_for_row(self.cursor.row)?;
        let line_wise = self.mode == Mode::VisualLine;
        let cursor_pos =
            self.viewport
                .position_in_line(buf, self.cursor.row, self.cursor.col, true)?;
        // Orientation is resolved here, comparing (line, position) pairs
        // lexicographically; in line-wise mode only the lines matter.
        let (start_line, start_pos, end_line, end_pos) = if line_wise {
            let (first, last) = if cursor_line < mark.line {
                (cursor_line, mark.line)
            } else {
                (mark.line, cursor_line)
            };
            let last_len = buf.line(buf.marker_at(last)?)?.len_chars();
            (first, 0, last, last_len)
        } else if (cursor_line, cursor_pos) < (mark.line, mark.position) {
            (cursor_line, cursor_pos, mark.line, mark.position)
        } else {
            (mark.line, mark.position, cursor_line, cursor_pos)
        };
        // Where the cursor lands afterwards: the selection start, when
        // visible before the walk.
        let start_grid = self.viewport.relative_offset(start_line).map(|offset| {
            let limit = self
                .viewport
                .line(buf, offset)
                .map(|line| line.len_chars().saturating_sub(1))
                .unwrap_or(0);
            self.viewport.grid_position(offset, start_pos.min(limit))
        });

        let total = end_line - start_line + 1;
        let mut register = String::new();
        let mut records: Vec<UndoRecord> = Vec::new();
        let mut marker = buf.marker_at(start_line)?;
        let mut record_line = start_line;
        for index in 0..total {
            let line = buf.line(marker)?;
            let range = if total == 1 {
                LineRange::Only {
                    start: start_pos,
                    end: end_pos,
                }
            } else if index == 0 {
                LineRange::First { start: start_pos }
            } else if index == total - 1 {
                LineRange::Last { end: end_pos }
            } else {
                LineRange::Interior
            };
            let at_doc_end = marker == buf.last_marker();
            let next = buf.next_marker(marker);
            let line_number = if index == 0 { start_line } else { record_line };
            match kind.visit(&line, range, at_doc_end, &mut register) {
                LineAction::Keep => {
                    match next {
                        Some(n) => marker = n,
                        None => break,
                    }
                }
                LineAction::EditTo(value) => {
                    records.push(UndoRecord::Edit {
                        line: line_number,
                        insert_point: if index == 0 { start_pos } else { 0 },
                        prior: line.clone(),
                    });
                    if index == 0 {
                        record_line = start_line + 1;
                    }
                    self.apply_selection_edit(buf, marker, value);
                    match next {
                        Some(n) => marker = n,
                        None => break,
                    }
                }
                LineAction::DeleteLine => {
                    records.push(delete_line_record(buf, line_number, line.clone()));
                    self.apply_selection_delete(buf, marker);
                    match next {
                        Some(n) => marker = n,
                        None => break,
                    }
                }
                LineAction::JoinNext { shortened } => {
                    let next_line = buf.line_at(marker, 1).expect("join has a successor");
                    records.push(UndoRecord::Join {
                        line: line_number,
                        prior_joined: line.clone(),
                        prior_next: next_line,
                    });
                    self.apply_selection_join(buf, marker, shortened);
                }
            }
        }

        let (row, col) = start_grid.unwrap_or((0, 0));
        self.cursor = GridCursor::new(row, col);
        if self.cursor.row >= self.viewport.virtual_height() {
            self.cursor.row = self
                .viewport
                .line_first_row(self.viewport.visible_lines().saturating_sub(1));
        }
        if let Some(position) =
            self.viewport
                .position_in_line(buf, self.cursor.row, self.cursor.col, false)
        {
            self.virtual_column = position;
        }
        self.adjust_cursor_to_line_end(buf, false);
        Some((Register::Text(register), records))
    }

    fn apply_selection_edit(&mut self, buf: &mut LineBuffer, marker: Marker, value: Rope) {
        match self.viewport.offset_for_marker(buf, marker) {
            Some(offset) => {
                self.set_line(buf, offset, None, value);
            }
            None => {
                buf.set_line(marker, 0, value);
            }
        }
    }

    fn apply_selection_delete(&mut self, buf: &mut LineBuffer, marker: Marker) {
        match self.viewport.offset_for_marker(buf, marker) {
            Some(offset) => {
                let first_row = self.viewport.line_first_row(offset);
                let blank_rows = self.viewport.height() - self.viewport.virtual_height();
                let removed = self.viewport.delete_line_at_offset(buf, offset);
                let removed_rows = self.viewport.rows_per_line(removed.len_chars());
                self.emit_delete_rows(buf, first_row, removed_rows, blank_rows);
            }
            None => {
                buf.delete_line(marker);
            }
        }
    }

    fn apply_selection_join(&mut self, buf: &mut LineBuffer, marker: Marker, shortened: Rope) {
        match self.viewport.offset_for_marker(buf, marker) {
            Some(offset) => {
                let join_text = self.viewport.delete_line_at_offset(buf, offset + 1);
                let mut value = shortened;
                value.append(join_text);
                self.set_line(buf, offset, None, value);
            }
            None => {
                if let Some(next) = buf.next_marker(marker) {
                    let join_text = buf.delete_line(next).unwrap_or_default();
                    let mut value = shortened;
                    value.append(join_text);
                    buf.set_line(marker, 0, value);
                }
            }
        }
    }

    // === Undo ===

    /// `u`: pop the most recent record, replay its inverse, and park the
    /// cursor at the recorded position. Full repaint; `false` when the
    /// log is empty.
    pub fn undo(&mut self, buf: &mut LineBuffer, undo: &mut UndoLog) -> bool {
        let Some(record) = undo.pop() else {
            return false;
        };
        record.revert(buf);
        let line = record.cursor_line().min(buf.line_count() - 1);
        self.viewport.reanchor(buf, line);
        if self.viewport.relative_offset(line).is_none() {
            self.viewport.scroll_to_line(buf, line);
        }
        let (row, col) = match self.viewport.relative_offset(line) {
            Some(offset) => {
                let limit = self
                    .viewport
                    .line(buf, offset)
                    .map(|l| l.len_chars().saturating_sub(1))
                    .unwrap_or(0);
                let position = record.insert_point().min(limit);
                self.virtual_column = position;
                self.viewport.grid_position(offset, position)
            }
            None => {
                self.virtual_column = 0;
                (0, 0)
            }
        };
        self.cursor = GridCursor::new(row, col);
        self.emit_full(buf);
        true
    }
}
