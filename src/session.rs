//! Editor session - the single owned aggregate behind the event loop
//!
//! One `EditorSession` owns the document, window, undo log, register,
//! and pending operator/count state, and is passed by reference through
//! the input loop. There are no process-wide singletons. The session
//! dispatches normalized input events by mode; the external command
//! dispatcher (the `:` prompt) calls back through the documented
//! operations: [`EditorSession::write_file`], [`EditorSession::goto_line`],
//! and [`EditorSession::end_command_mode`].

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::buffer::{LineBuffer, WriteSummary};
use crate::config::EditorConfig;
use crate::events::{Direction, EventOutcome, InputEvent};
use crate::render::RedrawOp;
use crate::undo::UndoLog;
use crate::window::{Mode, Register, Window};

/// Pending `d`/`y` operator waiting for its completing keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    Delete,
    Yank,
}

/// Load/write summary for the external status-line renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Loaded {
        name: String,
        lines: usize,
        characters: u64,
    },
    NewFile {
        name: String,
    },
    Written {
        name: String,
        lines: usize,
        characters: u64,
    },
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLine::Loaded {
                name,
                lines,
                characters,
            }
            | StatusLine::Written {
                name,
                lines,
                characters,
            } => write!(f, "\"{name}\" {lines} lines, {characters} characters"),
            StatusLine::NewFile { name } => write!(f, "New file \"{name}\""),
        }
    }
}

/// A complete editing session over one document.
#[derive(Debug)]
pub struct EditorSession {
    buffer: LineBuffer,
    window: Window,
    undo: UndoLog,
    register: Option<Register>,
    pending_count: Option<usize>,
    pending_op: Option<PendingOp>,
    path: Option<PathBuf>,
}

impl EditorSession {
    /// An empty session with default configuration.
    pub fn new(width: usize, height: usize) -> Self {
        Self::from_buffer(LineBuffer::new(), &EditorConfig::default(), width, height)
    }

    pub fn with_config(config: &EditorConfig, width: usize, height: usize) -> Self {
        Self::from_buffer(LineBuffer::new(), config, width, height)
    }

    /// Build a session from a line-oriented reader.
    pub fn from_reader(
        reader: impl BufRead,
        config: &EditorConfig,
        width: usize,
        height: usize,
    ) -> io::Result<Self> {
        Ok(Self::from_buffer(
            LineBuffer::from_reader(reader)?,
            config,
            width,
            height,
        ))
    }

    /// Open a file, falling back to an empty buffer with a "new file"
    /// status when it does not exist yet.
    pub fn load_path(
        path: impl Into<PathBuf>,
        config: &EditorConfig,
        width: usize,
        height: usize,
    ) -> anyhow::Result<(Self, StatusLine)> {
        let path = path.into();
        let name = path.display().to_string();
        let (buffer, status) = match File::open(&path) {
            Ok(file) => {
                let buffer = LineBuffer::from_reader(BufReader::new(file))
                    .with_context(|| format!("reading {name}"))?;
                let status = StatusLine::Loaded {
                    name,
                    lines: buffer.line_count(),
                    characters: buffer.char_count(),
                };
                (buffer, status)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                (LineBuffer::new(), StatusLine::NewFile { name })
            }
            Err(err) => {
                return Err(err).with_context(|| format!("opening {}", path.display()));
            }
        };
        tracing::debug!(path = %path.display(), "loaded buffer");
        let mut session = Self::from_buffer(buffer, config, width, height);
        session.path = Some(path);
        Ok((session, status))
    }

    fn from_buffer(
        buffer: LineBuffer,
        config: &EditorConfig,
        width: usize,
        height: usize,
    ) -> Self {
        let mut window = Window::new(&buffer, width, height);
        window.emit_full(&buffer);
        window.emit_cursor();
        Self {
            buffer,
            window,
            undo: UndoLog::with_depth(config.undo_depth),
            register: None,
            pending_count: None,
            pending_op: None,
            path: None,
        }
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn mode(&self) -> Mode {
        self.window.mode()
    }

    pub fn register(&self) -> Option<&Register> {
        self.register.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The whole document, newline-terminated, as the file writer would
    /// see it.
    pub fn contents(&self) -> String {
        let mut out = String::new();
        let mut marker = Some(self.buffer.first_marker());
        while let Some(current) = marker {
            if let Some(line) = self.buffer.line(current) {
                out.push_str(&line.to_string());
            }
            out.push('\n');
            marker = self.buffer.next_marker(current);
        }
        out
    }

    /// Drain the redraw instructions produced since the last call.
    pub fn take_redraw(&mut self) -> Vec<RedrawOp> {
        self.window.take_redraw()
    }

    /// `line,column` (1-based) for the status line.
    pub fn position_report(&self) -> String {
        self.window.position_report(&self.buffer)
    }

    // === External interface: size, command mode, persistence ===

    /// Resize signal: re-layout and repaint the whole window.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.window.resize(&self.buffer, width, height);
        self.window.emit_cursor();
    }

    /// Leave command mode without running a command (Escape at the
    /// prompt, or after the dispatcher ran one).
    pub fn end_command_mode(&mut self) {
        if self.window.mode() == Mode::Command {
            self.window.leave_command();
        }
        self.window.emit_cursor();
    }

    /// The bare-integer command: jump to an absolute line (0-based).
    pub fn goto_line(&mut self, line: usize) {
        self.window.goto_line(&self.buffer, line);
        self.window.emit_cursor();
    }

    /// Stream the document to a writer (newline-terminated lines).
    pub fn write_buffer(&mut self, writer: impl Write) -> anyhow::Result<WriteSummary> {
        self.buffer.write_to(writer).context("writing buffer")
    }

    /// `:w [path]` - persist to the given path, or the one the session
    /// was loaded from.
    pub fn write_file(&mut self, path: Option<&Path>) -> anyhow::Result<StatusLine> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self.path.clone().context("no file name")?,
        };
        let name = path.display().to_string();
        let file =
            File::create(&path).with_context(|| format!("writing {}", path.display()))?;
        let summary = self.buffer.write_to(BufWriter::new(file))?;
        tracing::debug!(path = %path.display(), lines = summary.lines, "wrote buffer");
        self.path = Some(path);
        Ok(StatusLine::Written {
            name,
            lines: summary.lines,
            characters: summary.characters,
        })
    }

    // === Event dispatch ===

    /// Process one normalized input event to completion.
    pub fn handle_event(&mut self, event: InputEvent) -> EventOutcome {
        let outcome = match self.window.mode() {
            Mode::Insert => self.handle_insert_event(event),
            // The external dispatcher owns the prompt while in command
            // mode; nothing to do here.
            Mode::Command => EventOutcome::Ignored,
            Mode::Normal | Mode::Visual | Mode::VisualLine => self.handle_normal_event(event),
        };
        self.window.emit_cursor();
        tracing::trace!(?event, ?outcome, mode = ?self.window.mode(), "handled event");
        outcome
    }

    fn handle_insert_event(&mut self, event: InputEvent) -> EventOutcome {
        match event {
            InputEvent::Escape => {
                self.window.exit_insert(&mut self.undo);
                self.window.cursor_left(&self.buffer, 1);
                EventOutcome::Handled
            }
            InputEvent::Backspace => {
                if self.window.insert_backspace(&mut self.buffer) {
                    EventOutcome::Handled
                } else {
                    EventOutcome::Ignored
                }
            }
            InputEvent::Ctrl('u') => {
                if self.window.insert_kill(&mut self.buffer) > 0 {
                    EventOutcome::Handled
                } else {
                    EventOutcome::Ignored
                }
            }
            InputEvent::Enter => {
                self.window.insert_newline(&mut self.buffer, &mut self.undo);
                EventOutcome::Handled
            }
            InputEvent::Char(ch) => {
                self.window.insert_char(&mut self.buffer, ch);
                EventOutcome::Handled
            }
            _ => EventOutcome::Ignored,
        }
    }

    fn take_count(&mut self) -> usize {
        self.pending_count.take().unwrap_or(1).max(1)
    }

    fn handle_normal_event(&mut self, event: InputEvent) -> EventOutcome {
        // Numeric prefixes accumulate; a leading 0 stays a motion.
        if let InputEvent::Char(ch) = event {
            if ch.is_ascii_digit() && (self.pending_count.is_some() || ch != '0') {
                let digit = ch as usize - '0' as usize;
                self.pending_count = Some(
                    self.pending_count
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
                return EventOutcome::Handled;
            }
        }

        let visual = self.window.mode().is_visual();

        // A pending operator completes only with its own key doubled.
        if let Some(op) = self.pending_op.take() {
            match (op, event) {
                (PendingOp::Delete, InputEvent::Char('d')) if !visual => {
                    let count = self.take_count();
                    let register = self.window.delete_lines(&mut self.buffer, &mut self.undo, count);
                    self.register = Some(register);
                    return EventOutcome::Handled;
                }
                (PendingOp::Yank, InputEvent::Char('y')) if !visual => {
                    let count = self.take_count();
                    self.register = Some(self.window.yank_lines(&self.buffer, count));
                    return EventOutcome::Handled;
                }
                _ => {
                    // Aborted operator: drop it and its count, then
                    // process the event normally.
                    self.pending_count = None;
                }
            }
        }

        match event {
            InputEvent::Escape => {
                self.pending_count = None;
                if visual {
                    self.window.leave_visual();
                }
                EventOutcome::Handled
            }

            // === Elementary motions ===
            InputEvent::Arrow(Direction::Left) | InputEvent::Char('h') => {
                let count = self.take_count();
                self.repeat_motion(count, |window, buf| window.cursor_left(buf, 1))
            }
            InputEvent::Arrow(Direction::Right) | InputEvent::Char('l') => {
                let count = self.take_count();
                self.repeat_motion(count, |window, buf| window.cursor_right(buf, false))
            }
            InputEvent::Arrow(Direction::Up) | InputEvent::Char('k') => {
                let count = self.take_count();
                self.repeat_motion(count, Window::cursor_up)
            }
            InputEvent::Arrow(Direction::Down) | InputEvent::Char('j') => {
                let count = self.take_count();
                self.repeat_motion(count, Window::cursor_down)
            }
            InputEvent::Home | InputEvent::Char('0') => {
                self.window.move_to_line_start();
                EventOutcome::Handled
            }
            InputEvent::End | InputEvent::Char('$') => {
                self.window.move_to_line_end(&self.buffer);
                EventOutcome::Handled
            }

            // === Word-class motions ===
            InputEvent::Char('w') => {
                let count = self.take_count();
                self.repeat_motion(count, Window::word_forward)
            }
            InputEvent::Char('W') => {
                let count = self.take_count();
                self.repeat_motion(count, Window::word_forward_any)
            }
            InputEvent::Char('e') => {
                let count = self.take_count();
                self.repeat_motion(count, Window::word_end)
            }
            InputEvent::Char('E') => {
                let count = self.take_count();
                self.repeat_motion(count, Window::word_end_any)
            }
            InputEvent::Char('b') => {
                let count = self.take_count();
                self.repeat_motion(count, Window::word_backward)
            }
            InputEvent::Char('B') => {
                let count = self.take_count();
                self.repeat_motion(count, Window::word_backward_any)
            }

            // === Operators and edits ===
            InputEvent::Char('d') => {
                if visual {
                    self.delete_selection_into_register()
                } else {
                    self.pending_op = Some(PendingOp::Delete);
                    EventOutcome::Handled
                }
            }
            InputEvent::Char('y') => {
                if visual {
                    self.yank_selection_into_register()
                } else {
                    self.pending_op = Some(PendingOp::Yank);
                    EventOutcome::Handled
                }
            }
            InputEvent::Char('x') => {
                if visual {
                    self.delete_selection_into_register()
                } else {
                    let count = self.take_count();
                    let done = self.window.delete_char(&mut self.buffer, &mut self.undo, count);
                    Self::boundary(done)
                }
            }
            InputEvent::Char('D') if !visual => {
                let done = self.window.delete_to_eol(&mut self.buffer, &mut self.undo);
                Self::boundary(done)
            }
            InputEvent::Char('J') if !visual => {
                let done = self.window.join_line(&mut self.buffer, &mut self.undo);
                Self::boundary(done)
            }
            InputEvent::Char('u') if !visual => {
                let done = self.window.undo(&mut self.buffer, &mut self.undo);
                Self::boundary(done)
            }
            InputEvent::Char('p') if !visual => self.put(false),
            InputEvent::Char('P') if !visual => self.put(true),

            // === Insert-mode entry ===
            InputEvent::Char('i') if !visual => {
                self.window.enter_insert(&self.buffer, false);
                EventOutcome::Handled
            }
            InputEvent::Char('I') if !visual => {
                self.window.move_to_line_start();
                self.window.enter_insert(&self.buffer, false);
                EventOutcome::Handled
            }
            InputEvent::Char('a') if !visual => {
                self.window.cursor_right(&self.buffer, true);
                self.window.enter_insert(&self.buffer, false);
                EventOutcome::Handled
            }
            InputEvent::Char('A') if !visual => {
                self.window.move_to_line_end(&self.buffer);
                self.window.cursor_right(&self.buffer, true);
                self.window.enter_insert(&self.buffer, false);
                EventOutcome::Handled
            }
            InputEvent::Char('o') if !visual => {
                self.window.open_below(&mut self.buffer, &mut self.undo);
                EventOutcome::Handled
            }
            InputEvent::Char('O') if !visual => {
                self.window.open_above(&mut self.buffer, &mut self.undo);
                EventOutcome::Handled
            }

            // === Visual modes ===
            InputEvent::Char('v') => {
                if self.window.mode() == Mode::Visual {
                    self.window.leave_visual();
                } else {
                    self.window.leave_visual();
                    self.window.enter_visual(&self.buffer);
                }
                EventOutcome::Handled
            }
            InputEvent::Char('V') => {
                if self.window.mode() == Mode::VisualLine {
                    self.window.leave_visual();
                } else {
                    self.window.leave_visual();
                    self.window.enter_visual_line(&self.buffer);
                }
                EventOutcome::Handled
            }

            // === Command mode ===
            InputEvent::Char(':') if !visual => {
                self.window.enter_command();
                EventOutcome::EnterCommand
            }

            // === Window motions ===
            InputEvent::Ctrl('e') => {
                let done = self.window.scroll_line_down(&self.buffer);
                Self::boundary(done)
            }
            InputEvent::Ctrl('y') => {
                let done = self.window.scroll_line_up(&self.buffer);
                Self::boundary(done)
            }
            InputEvent::Ctrl('d') => {
                let rows = self.window.viewport().height() / 2;
                let done = self.window.down_rows(&self.buffer, rows.max(1));
                Self::boundary(done)
            }
            InputEvent::Ctrl('u') => {
                let rows = self.window.viewport().height() / 2;
                let done = self.window.up_rows(&self.buffer, rows.max(1));
                Self::boundary(done)
            }
            InputEvent::Ctrl('f') => {
                let rows = self.window.viewport().height();
                let done = self.window.down_rows(&self.buffer, rows);
                Self::boundary(done)
            }
            InputEvent::Ctrl('b') => {
                let rows = self.window.viewport().height();
                let done = self.window.up_rows(&self.buffer, rows);
                Self::boundary(done)
            }
            InputEvent::Ctrl('l') => {
                self.window.emit_full(&self.buffer);
                EventOutcome::Handled
            }

            _ => EventOutcome::Ignored,
        }
    }

    fn repeat_motion(
        &mut self,
        count: usize,
        motion: impl Fn(&mut Window, &LineBuffer) -> bool,
    ) -> EventOutcome {
        let mut moved = false;
        for _ in 0..count.max(1) {
            if !motion(&mut self.window, &self.buffer) {
                break;
            }
            moved = true;
        }
        Self::boundary(moved)
    }

    /// Boundary no-ops are reported, never raised.
    fn boundary(done: bool) -> EventOutcome {
        if done {
            EventOutcome::Handled
        } else {
            EventOutcome::Ignored
        }
    }

    fn delete_selection_into_register(&mut self) -> EventOutcome {
        let register = self.window.delete_selection(&mut self.buffer, &mut self.undo);
        self.window.leave_visual();
        match register {
            Some(register) => {
                self.register = Some(register);
                EventOutcome::Handled
            }
            None => EventOutcome::Ignored,
        }
    }

    fn yank_selection_into_register(&mut self) -> EventOutcome {
        let register = self.window.yank_selection(&mut self.buffer);
        self.window.leave_visual();
        match register {
            Some(register) => {
                self.register = Some(register);
                EventOutcome::Handled
            }
            None => EventOutcome::Ignored,
        }
    }

    fn put(&mut self, before: bool) -> EventOutcome {
        let Some(register) = self.register.clone() else {
            return EventOutcome::Ignored;
        };
        let done = self
            .window
            .put(&mut self.buffer, &mut self.undo, &register, before);
        Self::boundary(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn session(text: &str, width: usize, height: usize) -> EditorSession {
        let mut session = EditorSession::from_reader(
            Cursor::new(text),
            &EditorConfig::default(),
            width,
            height,
        )
        .unwrap();
        session.take_redraw();
        session
    }

    fn feed(session: &mut EditorSession, events: &[InputEvent]) {
        for &event in events {
            session.handle_event(event);
        }
    }

    fn chars(session: &mut EditorSession, text: &str) {
        for ch in text.chars() {
            session.handle_event(InputEvent::Char(ch));
        }
    }

    #[test]
    fn test_insert_round_trip() {
        let mut session = session("hello\n", 20, 5);
        chars(&mut session, "i");
        assert_eq!(session.mode(), Mode::Insert);
        chars(&mut session, "say ");
        session.handle_event(InputEvent::Escape);
        assert_eq!(session.mode(), Mode::Normal);
        assert_eq!(session.contents(), "say hello\n");
    }

    #[test]
    fn test_count_multiplies_motion() {
        let mut session = session("a\nb\nc\nd\ne\n", 10, 5);
        chars(&mut session, "3j");
        assert_eq!(session.position_report(), "4,1");
    }

    #[test]
    fn test_leading_zero_is_line_start() {
        let mut session = session("abcdef\n", 10, 3);
        chars(&mut session, "ll0");
        assert_eq!(session.position_report(), "1,1");
    }

    #[test]
    fn test_dd_fills_register_and_removes_line() {
        let mut session = session("one\ntwo\nthree\n", 10, 5);
        chars(&mut session, "dd");
        assert_eq!(session.contents(), "two\nthree\n");
        assert_eq!(
            session.register(),
            Some(&Register::Line("one".to_string()))
        );
    }

    #[test]
    fn test_counted_dd_is_one_undo_step() {
        let mut session = session("one\ntwo\nthree\n", 10, 5);
        chars(&mut session, "2dd");
        assert_eq!(session.contents(), "three\n");
        assert_eq!(
            session.register(),
            Some(&Register::Text("one\ntwo\n".to_string()))
        );
        chars(&mut session, "u");
        assert_eq!(session.contents(), "one\ntwo\nthree\n");
    }

    #[test]
    fn test_aborted_operator_falls_through() {
        let mut session = session("abc\n", 10, 3);
        chars(&mut session, "dl");
        // 'd' was dropped; 'l' moved the cursor.
        assert_eq!(session.position_report(), "1,2");
        assert_eq!(session.contents(), "abc\n");
    }

    #[test]
    fn test_yy_then_put_after() {
        let mut session = session("one\ntwo\n", 10, 5);
        chars(&mut session, "yyp");
        assert_eq!(session.contents(), "one\none\ntwo\n");
    }

    #[test]
    fn test_colon_requests_command_mode() {
        let mut session = session("x\n", 10, 3);
        let outcome = session.handle_event(InputEvent::Char(':'));
        assert_eq!(outcome, EventOutcome::EnterCommand);
        assert_eq!(session.mode(), Mode::Command);
        // Events are ignored until the dispatcher releases the prompt.
        assert_eq!(
            session.handle_event(InputEvent::Char('j')),
            EventOutcome::Ignored
        );
        session.end_command_mode();
        assert_eq!(session.mode(), Mode::Normal);
    }

    #[test]
    fn test_join_on_last_line_is_ignored() {
        let mut session = session("only\n", 10, 3);
        assert_eq!(
            session.handle_event(InputEvent::Char('J')),
            EventOutcome::Ignored
        );
    }

    #[test]
    fn test_visual_delete_char_wise() {
        let mut session = session("abcdef\n", 10, 3);
        feed(
            &mut session,
            &[
                InputEvent::Char('l'),
                InputEvent::Char('v'),
                InputEvent::Char('l'),
                InputEvent::Char('l'),
                InputEvent::Char('d'),
            ],
        );
        assert_eq!(session.contents(), "aef\n");
        assert_eq!(
            session.register(),
            Some(&Register::Text("bcd".to_string()))
        );
        assert_eq!(session.mode(), Mode::Normal);
    }

    #[test]
    fn test_write_buffer_round_trip() {
        let mut session = session("alpha\nbeta\n", 10, 5);
        let mut out = Vec::new();
        let summary = session.write_buffer(&mut out).unwrap();
        assert_eq!(summary.lines, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "alpha\nbeta\n");
    }
}
