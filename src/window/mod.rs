//! Cursor & edit engine: mode state machine, motions, editing commands.

mod cursor;
mod mode;
mod motion;
mod selection;
#[allow(clippy::module_inception)]
mod window;

pub use cursor::{BufferMark, GridCursor};
pub use mode::Mode;
pub use motion::{char_class, is_keyword, CharClass};
pub use selection::{LineAction, LineRange, SelectionKind};
pub use window::Window;

/// The yank/delete register. Whole-line payloads put as opened lines;
/// selection payloads splice at the cursor, the trailing `\n` deciding
/// whether the splice re-creates line breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Register {
    /// One whole line, from `dd`/`yy`.
    Line(String),
    /// Selection text, possibly multi-line, from visual-mode delete/yank
    /// or a counted line operation.
    Text(String),
}

impl Register {
    pub fn as_str(&self) -> &str {
        match self {
            Register::Line(text) | Register::Text(text) => text,
        }
    }
}
