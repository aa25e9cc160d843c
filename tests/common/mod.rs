//! Shared test helpers for integration tests
//!
//! Note: Functions may appear unused because each test file compiles separately.

#![allow(dead_code)]

use std::io::Cursor;

use ved::config::EditorConfig;
use ved::events::InputEvent;
use ved::session::EditorSession;

/// Create a session over the given text with a width x height window
pub fn session(text: &str, width: usize, height: usize) -> EditorSession {
    let mut session =
        EditorSession::from_reader(Cursor::new(text), &EditorConfig::default(), width, height)
            .expect("in-memory reader");
    session.take_redraw();
    session
}

/// Create a session with a custom config
pub fn session_with_config(
    text: &str,
    config: &EditorConfig,
    width: usize,
    height: usize,
) -> EditorSession {
    let mut session = EditorSession::from_reader(Cursor::new(text), config, width, height)
        .expect("in-memory reader");
    session.take_redraw();
    session
}

/// Feed a string of keystrokes as character events
pub fn keys(session: &mut EditorSession, input: &str) {
    for ch in input.chars() {
        session.handle_event(InputEvent::Char(ch));
    }
}

pub fn escape(session: &mut EditorSession) {
    session.handle_event(InputEvent::Escape);
}

pub fn enter(session: &mut EditorSession) {
    session.handle_event(InputEvent::Enter);
}

pub fn backspace(session: &mut EditorSession) {
    session.handle_event(InputEvent::Backspace);
}
