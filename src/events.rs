//! Normalized input events consumed by the editing engine
//!
//! The mapping from raw terminal escape sequences to these events lives in
//! the terminal frontend; the engine only ever sees this normalized form.

/// Direction for cursor movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// A single normalized input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A printable character
    Char(char),
    /// A control-chord character (Ctrl held), lowercase
    Ctrl(char),
    /// Arrow navigation key
    Arrow(Direction),
    Home,
    End,
    Enter,
    Backspace,
    Escape,
}

/// What the engine did with an event.
///
/// `Ignored` covers user errors (motion at a document boundary, join on the
/// last line): the frontend may beep or do nothing, but the engine never
/// fails on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event was consumed and state may have changed
    Handled,
    /// The event had no effect (unbound key or boundary no-op)
    Ignored,
    /// The user requested command mode; the frontend owns the `:` prompt
    /// and calls back through the session's command operations
    EnterCommand,
}
