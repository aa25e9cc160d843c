//! Line store - the document as an ordered sequence of rope lines
//!
//! A [`LineBuffer`] always contains at least one line: an empty line stands
//! in for a fully deleted document. All marker-taking operations return
//! `None` for out-of-range offsets or stale markers; boundary conditions
//! are never errors here.

use std::io::{self, BufRead, Write};

use ropey::Rope;

use super::arena::{LineArena, Marker};

/// Line and character totals reported after a buffer write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub lines: usize,
    pub characters: u64,
}

/// The document: ordered lines with stable markers and a running
/// character count (maintained incrementally, never recomputed by scan).
#[derive(Debug)]
pub struct LineBuffer {
    lines: LineArena,
    char_count: u64,
    modified: bool,
}

impl LineBuffer {
    /// An empty document: one empty line.
    pub fn new() -> Self {
        let mut lines = LineArena::new();
        lines.push_back(Rope::new());
        Self {
            lines,
            char_count: 0,
            modified: false,
        }
    }

    /// Load a document from a line-oriented reader. Each input line, sans
    /// terminator, becomes one line. An empty input still produces the
    /// mandatory single empty line.
    pub fn from_reader(reader: impl BufRead) -> io::Result<Self> {
        let mut lines = LineArena::new();
        let mut char_count = 0u64;
        for line in reader.lines() {
            let line = line?;
            char_count += line.chars().count() as u64;
            lines.push_back(Rope::from_str(&line));
        }
        if lines.is_empty() {
            lines.push_back(Rope::new());
        }
        Ok(Self {
            lines,
            char_count,
            modified: false,
        })
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn char_count(&self) -> u64 {
        self.char_count
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Marker for the line at an absolute index. Walks from the first
    /// line; prefer [`marker_offset`](Self::marker_offset) when a nearby
    /// marker is already at hand.
    pub fn marker_at(&self, line_number: usize) -> Option<Marker> {
        self.lines.at(line_number)
    }

    pub fn first_marker(&self) -> Marker {
        self.lines
            .head()
            .expect("document always contains at least one line")
    }

    pub fn last_marker(&self) -> Marker {
        self.lines
            .tail()
            .expect("document always contains at least one line")
    }

    /// Walk `delta` lines from `marker`; 0 returns the marker itself,
    /// walking past either end returns `None`.
    pub fn marker_offset(&self, marker: Marker, delta: isize) -> Option<Marker> {
        self.lines.offset(marker, delta)
    }

    pub fn next_marker(&self, marker: Marker) -> Option<Marker> {
        self.lines.next(marker)
    }

    /// Absolute index of the line a marker refers to, or `None` for a
    /// stale marker. Walks from the first line.
    pub fn marker_index(&self, marker: Marker) -> Option<usize> {
        self.lines.get(marker)?;
        let mut index = 0;
        let mut current = self.first_marker();
        loop {
            if current == marker {
                return Some(index);
            }
            current = self.next_marker(current)?;
            index += 1;
        }
    }

    /// The line a marker refers to. Rope clones are cheap (shared
    /// structure), so callers get an owned value.
    pub fn line(&self, marker: Marker) -> Option<Rope> {
        self.lines.get(marker).cloned()
    }

    /// The line `offset` away from `marker`.
    pub fn line_at(&self, marker: Marker, offset: isize) -> Option<Rope> {
        self.line(self.lines.offset(marker, offset)?)
    }

    /// Replace the line `offset` away from `marker`. Returns `false` if
    /// the target does not exist.
    pub fn set_line(&mut self, marker: Marker, offset: isize, value: Rope) -> bool {
        let Some(target) = self.lines.offset(marker, offset) else {
            return false;
        };
        let new_len = value.len_chars() as u64;
        match self.lines.set(target, value) {
            Some(old) => {
                self.char_count = self.char_count - old.len_chars() as u64 + new_len;
                self.modified = true;
                true
            }
            None => false,
        }
    }

    /// Insert a line before `marker`. Returns the new line's marker.
    pub fn insert_before(&mut self, marker: Marker, value: Rope) -> Option<Marker> {
        let len = value.len_chars() as u64;
        let inserted = self.lines.insert_before(marker, value)?;
        self.char_count += len;
        self.modified = true;
        Some(inserted)
    }

    /// Append a line at the end of the document.
    pub fn append(&mut self, value: Rope) -> Marker {
        self.char_count += value.len_chars() as u64;
        self.modified = true;
        self.lines.push_back(value)
    }

    /// Delete the line a marker refers to, invalidating the marker and
    /// returning the removed text. Deleting the only line leaves a fresh
    /// empty line behind.
    pub fn delete_line(&mut self, marker: Marker) -> Option<Rope> {
        let removed = self.lines.remove(marker)?;
        self.char_count -= removed.len_chars() as u64;
        self.modified = true;
        if self.lines.is_empty() {
            self.lines.push_back(Rope::new());
        }
        Some(removed)
    }

    /// Delete the first line.
    pub fn delete_first(&mut self) -> Rope {
        let first = self.first_marker();
        self.delete_line(first)
            .expect("first marker is always valid")
    }

    // === Absolute-index primitives (undo replay) ===

    /// Replace the line at an absolute index.
    pub fn set_line_at(&mut self, line_number: usize, value: Rope) -> bool {
        match self.lines.at(line_number) {
            Some(marker) => self.set_line(marker, 0, value),
            None => false,
        }
    }

    /// Insert a line at an absolute index; an index equal to the line
    /// count appends.
    pub fn insert_line_at(&mut self, line_number: usize, value: Rope) -> bool {
        match self.lines.at(line_number) {
            Some(marker) => self.insert_before(marker, value).is_some(),
            None if line_number == self.lines.len() => {
                self.append(value);
                true
            }
            None => false,
        }
    }

    /// Remove the line at an absolute index.
    pub fn remove_line_at(&mut self, line_number: usize) -> Option<Rope> {
        let marker = self.lines.at(line_number)?;
        self.delete_line(marker)
    }

    /// Write every line, newline-terminated, and clear the modified flag.
    /// The counts feed the external status-line renderer.
    pub fn write_to(&mut self, mut writer: impl Write) -> io::Result<WriteSummary> {
        let mut lines = 0usize;
        let mut characters = 0u64;
        let mut marker = Some(self.first_marker());
        while let Some(current) = marker {
            let line = self.line(current).expect("walked marker is valid");
            for chunk in line.chunks() {
                writer.write_all(chunk.as_bytes())?;
            }
            writer.write_all(b"\n")?;
            lines += 1;
            characters += line.len_chars() as u64 + 1;
            marker = self.next_marker(current);
        }
        writer.flush()?;
        self.modified = false;
        Ok(WriteSummary { lines, characters })
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Split register text into the lines a put must splice in. A trailing
/// `\n` marks a selection that covered whole lines and contributes a
/// final empty part, so the splice re-creates the line break.
pub fn split_register(text: &str) -> Vec<Rope> {
    // A trailing separator yields a final empty part, which is exactly
    // the empty tail line the splice needs.
    text.split('\n').map(Rope::from_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn rope(s: &str) -> Rope {
        Rope::from_str(s)
    }

    fn buffer(lines: &[&str]) -> LineBuffer {
        let text = lines.join("\n") + "\n";
        LineBuffer::from_reader(Cursor::new(text)).unwrap()
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

    // ========================================================================
    // Construction tests
    // ========================================================================

    #[test]
    fn test_new_has_one_empty_line() {
        let buf = LineBuffer::new();
        assert_eq!(buf.line_count(), 1);
        assert_eq!(buf.char_count(), 0);
        assert!(!buf.is_modified());
    }

    #[test]
    fn test_from_reader_counts() {
        let buf = buffer(&["abc", "de", ""]);
        assert_eq!(buf.line_count(), 3);
        assert_eq!(buf.char_count(), 5);
    }

    #[test]
    fn test_from_reader_empty_input() {
        let buf = LineBuffer::from_reader(Cursor::new("")).unwrap();
        assert_eq!(buf.line_count(), 1);
        assert_eq!(buf.line(buf.first_marker()).unwrap().to_string(), "");
    }

    #[test]
    fn test_from_reader_strips_terminators() {
        let buf = LineBuffer::from_reader(Cursor::new("a\r\nb\n")).unwrap();
        assert_eq!(contents(&buf), vec!["a", "b"]);
    }

    // ========================================================================
    // Marker tests
    // ========================================================================

    #[test]
    fn test_marker_at_and_offset() {
        let buf = buffer(&["a", "b", "c"]);
        let b = buf.marker_at(1).unwrap();
        assert_eq!(buf.line(b).unwrap().to_string(), "b");
        assert_eq!(buf.marker_offset(b, 0), Some(b));
        let c = buf.marker_offset(b, 1).unwrap();
        assert_eq!(buf.line(c).unwrap().to_string(), "c");
        assert_eq!(buf.marker_offset(b, 2), None);
        assert_eq!(buf.marker_offset(b, -2), None);
    }

    #[test]
    fn test_marker_stability_under_insert() {
        let mut buf = buffer(&["a", "b", "c"]);
        let c = buf.marker_at(2).unwrap();
        let a = buf.marker_at(0).unwrap();
        buf.insert_before(a, rope("new"));
        assert_eq!(buf.line(c).unwrap().to_string(), "c");
        assert_eq!(buf.marker_at(3), Some(c));
    }

    #[test]
    fn test_marker_stability_under_delete() {
        let mut buf = buffer(&["a", "b", "c"]);
        let c = buf.marker_at(2).unwrap();
        let a = buf.marker_at(0).unwrap();
        buf.delete_line(a);
        assert_eq!(buf.line(c).unwrap().to_string(), "c");
        assert_eq!(buf.marker_at(1), Some(c));
    }

    #[test]
    fn test_deleted_line_marker_goes_stale() {
        let mut buf = buffer(&["a", "b"]);
        let b = buf.marker_at(1).unwrap();
        buf.delete_line(b);
        assert_eq!(buf.line(b), None);
        assert_eq!(buf.marker_offset(b, 1), None);
    }

    // ========================================================================
    // Mutation tests
    // ========================================================================

    #[test]
    fn test_set_line_updates_char_count() {
        let mut buf = buffer(&["abc", "de"]);
        let first = buf.first_marker();
        assert!(buf.set_line(first, 0, rope("xxxxx")));
        assert_eq!(buf.char_count(), 7);
        assert!(buf.is_modified());
    }

    #[test]
    fn test_set_line_out_of_range_is_noop() {
        let mut buf = buffer(&["abc"]);
        let first = buf.first_marker();
        assert!(!buf.set_line(first, 5, rope("x")));
        assert_eq!(buf.char_count(), 3);
    }

    #[test]
    fn test_delete_only_line_synthesizes_empty() {
        let mut buf = buffer(&["solo"]);
        let removed = buf.delete_first();
        assert_eq!(removed.to_string(), "solo");
        assert_eq!(buf.line_count(), 1);
        assert_eq!(buf.line(buf.first_marker()).unwrap().to_string(), "");
        assert_eq!(buf.char_count(), 0);
    }

    #[test]
    fn test_append_and_insert_before() {
        let mut buf = buffer(&["b"]);
        let b = buf.first_marker();
        buf.insert_before(b, rope("a"));
        buf.append(rope("c"));
        assert_eq!(contents(&buf), vec!["a", "b", "c"]);
        assert_eq!(buf.char_count(), 3);
    }

    // ========================================================================
    // Absolute-index tests (undo replay path)
    // ========================================================================

    #[test]
    fn test_insert_line_at_end_appends() {
        let mut buf = buffer(&["a"]);
        assert!(buf.insert_line_at(1, rope("b")));
        assert_eq!(contents(&buf), vec!["a", "b"]);
    }

    #[test]
    fn test_insert_line_at_past_end_fails() {
        let mut buf = buffer(&["a"]);
        assert!(!buf.insert_line_at(3, rope("b")));
    }

    #[test]
    fn test_remove_line_at() {
        let mut buf = buffer(&["a", "b", "c"]);
        assert_eq!(buf.remove_line_at(1).unwrap().to_string(), "b");
        assert_eq!(contents(&buf), vec!["a", "c"]);
        assert_eq!(buf.remove_line_at(5), None);
    }

    // ========================================================================
    // Write tests
    // ========================================================================

    #[test]
    fn test_write_to_round_trip() {
        let mut buf = buffer(&["one", "two", "three"]);
        let mut out = Vec::new();
        let summary = buf.write_to(&mut out).unwrap();
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.characters, 12);
        assert_eq!(String::from_utf8(out.clone()).unwrap(), "one\ntwo\nthree\n");

        let reloaded = LineBuffer::from_reader(Cursor::new(out)).unwrap();
        assert_eq!(contents(&reloaded), contents(&buf));
    }

    #[test]
    fn test_write_clears_modified() {
        let mut buf = buffer(&["a"]);
        let first = buf.first_marker();
        buf.set_line(first, 0, rope("b"));
        assert!(buf.is_modified());
        buf.write_to(Vec::new()).unwrap();
        assert!(!buf.is_modified());
    }

    // ========================================================================
    // Register splitting tests
    // ========================================================================

    #[test]
    fn test_split_register_char_wise() {
        let parts = split_register("abc");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].to_string(), "abc");
    }

    #[test]
    fn test_split_register_multi_line() {
        let parts = split_register("abc\ndef");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].to_string(), "def");
    }

    #[test]
    fn test_split_register_trailing_newline() {
        let parts = split_register("one\ntwo\n");
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].to_string(), "one");
        assert_eq!(parts[1].to_string(), "two");
        assert_eq!(parts[2].to_string(), "");
    }
}
