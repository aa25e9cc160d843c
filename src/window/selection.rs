//! Selection processor - a two-variant visitor over a line range
//!
//! A selection is processed in a single pass over `[start_line ..= end_line]`.
//! Every visited line is classified by its place in the range, and the
//! visitor answers with the action to take on the store: keep, shorten,
//! remove, or join with the successor. The delete variant's actions are
//! executed by the walker as it goes; the yank variant only accumulates
//! register text. Both variants build the same register string.

use ropey::Rope;

/// The two selection-processing variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Delete,
    Yank,
}

/// Where a visited line sits inside the selected range, with the partial
/// positions that apply to it. `start` and `end` are character positions;
/// `end` may equal the line length when the selection runs through the
/// line break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRange {
    /// The selection covers a single line.
    Only { start: usize, end: usize },
    /// First of several lines: `[start..]` is selected.
    First { start: usize },
    /// A fully covered middle line.
    Interior,
    /// Last of several lines: `[..end]` is selected.
    Last { end: usize },
}

/// What the walker must do to the visited line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    /// Leave the line untouched (yank).
    Keep,
    /// Replace the line with a shortened value.
    EditTo(Rope),
    /// Remove the whole line.
    DeleteLine,
    /// Replace the line with `shortened`, then absorb the next line.
    JoinNext { shortened: Rope },
}

impl SelectionKind {
    /// Visit one line of the range: append its register contribution and
    /// return the store action. `at_doc_end` is true for the document's
    /// last line, where a selection through the line break has no
    /// successor to join.
    pub fn visit(
        self,
        line: &Rope,
        range: LineRange,
        at_doc_end: bool,
        register: &mut String,
    ) -> LineAction {
        let len = line.len_chars();
        let (piece, newline, action) = match range {
            LineRange::Only { start, end } => {
                if end < len {
                    // Character-wise: no trailing separator, so a later
                    // put splices instead of opening lines.
                    (slice(line, start, end + 1), false, edit(line, start, end + 1))
                } else if start > 0 {
                    let shortened = head(line, start);
                    let action = if at_doc_end {
                        LineAction::EditTo(shortened)
                    } else {
                        LineAction::JoinNext { shortened }
                    };
                    (slice(line, start, len), true, action)
                } else {
                    (line.to_string(), true, LineAction::DeleteLine)
                }
            }
            LineRange::First { start } => {
                if start > 0 {
                    (slice(line, start, len), true, LineAction::EditTo(head(line, start)))
                } else {
                    (line.to_string(), true, LineAction::DeleteLine)
                }
            }
            LineRange::Interior => (line.to_string(), true, LineAction::DeleteLine),
            LineRange::Last { end } => {
                if end < len {
                    (slice(line, 0, end + 1), false, LineAction::EditTo(tail(line, end + 1)))
                } else {
                    (line.to_string(), true, LineAction::DeleteLine)
                }
            }
        };
        register.push_str(&piece);
        if newline {
            register.push('\n');
        }
        match self {
            SelectionKind::Delete => action,
            SelectionKind::Yank => LineAction::Keep,
        }
    }
}

fn slice(line: &Rope, start: usize, end: usize) -> String {
    line.slice(start..end.min(line.len_chars())).to_string()
}

/// The line with `[start..end)` removed.
fn edit(line: &Rope, start: usize, end: usize) -> LineAction {
    let mut shortened = line.clone();
    shortened.remove(start..end.min(line.len_chars()));
    LineAction::EditTo(shortened)
}

/// `line[..position]`
fn head(line: &Rope, position: usize) -> Rope {
    let mut head = line.clone();
    head.remove(position..);
    head
}

/// `line[position..]`
fn tail(line: &Rope, position: usize) -> Rope {
    let mut tail = line.clone();
    tail.remove(..position.min(line.len_chars()));
    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rope(s: &str) -> Rope {
        Rope::from_str(s)
    }

    // ========================================================================
    // Only-line class
    // ========================================================================

    #[test]
    fn test_only_line_char_wise_has_no_separator() {
        let mut register = String::new();
        let action = SelectionKind::Delete.visit(
            &rope("abcdef"),
            LineRange::Only { start: 1, end: 3 },
            false,
            &mut register,
        );
        assert_eq!(register, "bcd");
        assert_eq!(action, LineAction::EditTo(rope("aef")));
    }

    #[test]
    fn test_only_line_through_break_joins_next() {
        let mut register = String::new();
        let action = SelectionKind::Delete.visit(
            &rope("abcdef"),
            LineRange::Only { start: 2, end: 6 },
            false,
            &mut register,
        );
        assert_eq!(register, "cdef\n");
        assert_eq!(
            action,
            LineAction::JoinNext {
                shortened: rope("ab")
            }
        );
    }

    #[test]
    fn test_only_line_through_break_at_doc_end_edits() {
        let mut register = String::new();
        let action = SelectionKind::Delete.visit(
            &rope("abcdef"),
            LineRange::Only { start: 2, end: 6 },
            true,
            &mut register,
        );
        assert_eq!(register, "cdef\n");
        assert_eq!(action, LineAction::EditTo(rope("ab")));
    }

    #[test]
    fn test_only_line_full_line_deletes() {
        let mut register = String::new();
        let action = SelectionKind::Delete.visit(
            &rope("abc"),
            LineRange::Only { start: 0, end: 3 },
            false,
            &mut register,
        );
        assert_eq!(register, "abc\n");
        assert_eq!(action, LineAction::DeleteLine);
    }

    // ========================================================================
    // First / Interior / Last classes
    // ========================================================================

    #[test]
    fn test_first_line_partial_edits() {
        let mut register = String::new();
        let action = SelectionKind::Delete.visit(
            &rope("hello"),
            LineRange::First { start: 2 },
            false,
            &mut register,
        );
        assert_eq!(register, "llo\n");
        assert_eq!(action, LineAction::EditTo(rope("he")));
    }

    #[test]
    fn test_first_line_from_column_zero_deletes() {
        let mut register = String::new();
        let action = SelectionKind::Delete.visit(
            &rope("hello"),
            LineRange::First { start: 0 },
            false,
            &mut register,
        );
        assert_eq!(register, "hello\n");
        assert_eq!(action, LineAction::DeleteLine);
    }

    #[test]
    fn test_interior_line_deletes_whole() {
        let mut register = String::new();
        let action =
            SelectionKind::Delete.visit(&rope("mid"), LineRange::Interior, false, &mut register);
        assert_eq!(register, "mid\n");
        assert_eq!(action, LineAction::DeleteLine);
    }

    #[test]
    fn test_last_line_partial_keeps_tail() {
        let mut register = String::new();
        let action = SelectionKind::Delete.visit(
            &rope("world"),
            LineRange::Last { end: 2 },
            false,
            &mut register,
        );
        // No trailing separator on a partial last line.
        assert_eq!(register, "wor");
        assert_eq!(action, LineAction::EditTo(rope("ld")));
    }

    #[test]
    fn test_last_line_through_break_deletes() {
        let mut register = String::new();
        let action = SelectionKind::Delete.visit(
            &rope("world"),
            LineRange::Last { end: 5 },
            true,
            &mut register,
        );
        assert_eq!(register, "world\n");
        assert_eq!(action, LineAction::DeleteLine);
    }

    // ========================================================================
    // Yank variant
    // ========================================================================

    #[test]
    fn test_yank_never_mutates() {
        for range in [
            LineRange::Only { start: 1, end: 2 },
            LineRange::First { start: 1 },
            LineRange::Interior,
            LineRange::Last { end: 1 },
        ] {
            let mut register = String::new();
            let action = SelectionKind::Yank.visit(&rope("abcd"), range, false, &mut register);
            assert_eq!(action, LineAction::Keep);
            assert!(!register.is_empty());
        }
    }

    #[test]
    fn test_yank_and_delete_accumulate_identical_registers() {
        let line = rope("abcdef");
        for (range, at_end) in [
            (LineRange::Only { start: 1, end: 3 }, false),
            (LineRange::Only { start: 2, end: 6 }, true),
            (LineRange::First { start: 3 }, false),
            (LineRange::Interior, false),
            (LineRange::Last { end: 4 }, false),
            (LineRange::Last { end: 6 }, true),
        ] {
            let mut deleted = String::new();
            let mut yanked = String::new();
            SelectionKind::Delete.visit(&line, range, at_end, &mut deleted);
            SelectionKind::Yank.visit(&line, range, at_end, &mut yanked);
            assert_eq!(deleted, yanked);
        }
    }
}
