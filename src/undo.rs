//! Undo log - reversible edit records
//!
//! Every committed editing command pushes one record carrying enough
//! state to restore the document exactly. Records are immutable once
//! pushed and replayed strictly LIFO. The log is single-direction: redo
//! is an intentional scope limit, not an oversight.

use std::collections::VecDeque;

use ropey::Rope;

use crate::buffer::LineBuffer;

/// One reversible edit. Line numbers are absolute document indices at
/// the time the record was pushed.
#[derive(Debug, Clone)]
pub enum UndoRecord {
    /// A line's content changed; `prior` is the pre-edit value and
    /// `insert_point` where the cursor sat when the edit began.
    Edit {
        line: usize,
        insert_point: usize,
        prior: Rope,
    },
    /// A line was inserted at `line`.
    Insert { line: usize },
    /// The line at `line` was deleted.
    Delete { line: usize, prior: Rope },
    /// The line at `line` absorbed its successor.
    Join {
        line: usize,
        prior_joined: Rope,
        prior_next: Rope,
    },
    /// An ordered bundle restored as one step, last entry first.
    Composite(Vec<UndoRecord>),
}

impl UndoRecord {
    /// The line the cursor returns to after undoing this record.
    pub fn cursor_line(&self) -> usize {
        match self {
            UndoRecord::Edit { line, .. }
            | UndoRecord::Insert { line }
            | UndoRecord::Delete { line, .. }
            | UndoRecord::Join { line, .. } => *line,
            UndoRecord::Composite(records) => {
                records.first().map(UndoRecord::cursor_line).unwrap_or(0)
            }
        }
    }

    /// The in-line position the cursor returns to.
    pub fn insert_point(&self) -> usize {
        match self {
            UndoRecord::Edit { insert_point, .. } => *insert_point,
            UndoRecord::Join { prior_joined, .. } => {
                prior_joined.len_chars().saturating_sub(1)
            }
            UndoRecord::Insert { .. } | UndoRecord::Delete { .. } => 0,
            UndoRecord::Composite(records) => {
                records.first().map(UndoRecord::insert_point).unwrap_or(0)
            }
        }
    }

    /// Replay the inverse of the recorded operation against the store.
    pub fn revert(&self, buf: &mut LineBuffer) {
        match self {
            UndoRecord::Edit { line, prior, .. } => {
                buf.set_line_at(*line, prior.clone());
            }
            UndoRecord::Insert { line } => {
                buf.remove_line_at(*line);
            }
            UndoRecord::Delete { line, prior } => {
                buf.insert_line_at(*line, prior.clone());
            }
            UndoRecord::Join {
                line,
                prior_joined,
                prior_next,
            } => {
                buf.set_line_at(*line, prior_joined.clone());
                buf.insert_line_at(*line + 1, prior_next.clone());
            }
            UndoRecord::Composite(records) => {
                for record in records.iter().rev() {
                    record.revert(buf);
                }
            }
        }
    }
}

/// Bounded LIFO stack of undo records. When the bound is reached the
/// oldest record is discarded.
#[derive(Debug)]
pub struct UndoLog {
    records: VecDeque<UndoRecord>,
    max_depth: usize,
}

impl UndoLog {
    pub const DEFAULT_DEPTH: usize = 100;

    pub fn new() -> Self {
        Self::with_depth(Self::DEFAULT_DEPTH)
    }

    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            records: VecDeque::new(),
            max_depth: max_depth.max(1),
        }
    }

    pub fn push(&mut self, record: UndoRecord) {
        if self.records.len() == self.max_depth {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn pop(&mut self) -> Option<UndoRecord> {
        self.records.pop_back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn rope(s: &str) -> Rope {
        Rope::from_str(s)
    }

    fn buffer(lines: &[&str]) -> LineBuffer {
        LineBuffer::from_reader(Cursor::new(lines.join("\n") + "\n")).unwrap()
    }

    fn contents(buf: &LineBuffer) -> Vec<String> {
        let mut out = Vec::new();
        let mut marker = Some(buf.first_marker());
        while let Some(current) = marker {
            out.push(buf.line(current).unwrap().to_string());
            marker = buf.next_marker(current);
        }
        out
    }

    #[test]
    fn test_edit_revert_restores_line() {
        let mut buf = buffer(&["abc", "def"]);
        let first = buf.first_marker();
        let record = UndoRecord::Edit {
            line: 0,
            insert_point: 1,
            prior: buf.line(first).unwrap(),
        };
        buf.set_line(first, 0, rope("ac"));
        record.revert(&mut buf);
        assert_eq!(contents(&buf), vec!["abc", "def"]);
    }

    #[test]
    fn test_insert_revert_removes_line() {
        let mut buf = buffer(&["a", "inserted", "b"]);
        UndoRecord::Insert { line: 1 }.revert(&mut buf);
        assert_eq!(contents(&buf), vec!["a", "b"]);
    }

    #[test]
    fn test_delete_revert_reinserts_line() {
        let mut buf = buffer(&["a", "c"]);
        UndoRecord::Delete {
            line: 1,
            prior: rope("b"),
        }
        .revert(&mut buf);
        assert_eq!(contents(&buf), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_delete_revert_at_end_appends() {
        let mut buf = buffer(&["a"]);
        UndoRecord::Delete {
            line: 1,
            prior: rope("b"),
        }
        .revert(&mut buf);
        assert_eq!(contents(&buf), vec!["a", "b"]);
    }

    #[test]
    fn test_join_revert_splits_again() {
        let mut buf = buffer(&["one two"]);
        UndoRecord::Join {
            line: 0,
            prior_joined: rope("one"),
            prior_next: rope("two"),
        }
        .revert(&mut buf);
        assert_eq!(contents(&buf), vec!["one", "two"]);
    }

    #[test]
    fn test_composite_reverts_in_reverse_order() {
        // Deleting lines 1..=2 produced two records, both at index 1
        // because the second delete saw the shifted document.
        let mut buf = buffer(&["a", "d"]);
        let record = UndoRecord::Composite(vec![
            UndoRecord::Delete {
                line: 1,
                prior: rope("b"),
            },
            UndoRecord::Delete {
                line: 1,
                prior: rope("c"),
            },
        ]);
        record.revert(&mut buf);
        assert_eq!(contents(&buf), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_composite_cursor_follows_first_entry() {
        let record = UndoRecord::Composite(vec![
            UndoRecord::Edit {
                line: 3,
                insert_point: 2,
                prior: rope("x"),
            },
            UndoRecord::Delete {
                line: 4,
                prior: rope("y"),
            },
        ]);
        assert_eq!(record.cursor_line(), 3);
        assert_eq!(record.insert_point(), 2);
    }

    #[test]
    fn test_log_is_lifo() {
        let mut log = UndoLog::new();
        log.push(UndoRecord::Insert { line: 1 });
        log.push(UndoRecord::Insert { line: 2 });
        assert!(matches!(log.pop(), Some(UndoRecord::Insert { line: 2 })));
        assert!(matches!(log.pop(), Some(UndoRecord::Insert { line: 1 })));
        assert!(log.pop().is_none());
    }

    #[test]
    fn test_log_depth_bound_drops_oldest() {
        let mut log = UndoLog::with_depth(2);
        for line in 0..5 {
            log.push(UndoRecord::Insert { line });
        }
        assert_eq!(log.len(), 2);
        assert!(matches!(log.pop(), Some(UndoRecord::Insert { line: 4 })));
        assert!(matches!(log.pop(), Some(UndoRecord::Insert { line: 3 })));
    }
}
