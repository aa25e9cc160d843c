//! Scrolling tests - cursor-driven scrolling, window motions, resize

mod common;

use common::{keys, session};
use ved::events::{Direction, EventOutcome, InputEvent};
use ved::render::RedrawOp;

fn numbered(n: usize) -> String {
    (0..n).map(|i| format!("line{i}\n")).collect()
}

// ========================================================================
// Cursor-driven scrolling
// ========================================================================

#[test]
fn test_no_scroll_while_content_fits() {
    let mut session = session(&numbered(3), 10, 10);
    keys(&mut session, "jjj");
    assert_eq!(session.window().viewport().top_line(), 0);
}

#[test]
fn test_cursor_down_scrolls_past_window_bottom() {
    let mut session = session(&numbered(10), 10, 3);
    keys(&mut session, "jjj");
    assert_eq!(session.window().viewport().top_line(), 1);
    assert_eq!(session.position_report(), "4,1");
}

#[test]
fn test_cursor_up_scrolls_past_window_top() {
    let mut session = session(&numbered(10), 10, 3);
    keys(&mut session, "jjjj");
    assert_eq!(session.window().viewport().top_line(), 2);
    keys(&mut session, "kkkk");
    assert_eq!(session.window().viewport().top_line(), 0);
    assert_eq!(session.position_report(), "1,1");
}

#[test]
fn test_motion_at_document_edges_is_ignored() {
    let mut session = session(&numbered(2), 10, 5);
    assert_eq!(
        session.handle_event(InputEvent::Arrow(Direction::Up)),
        EventOutcome::Ignored
    );
    keys(&mut session, "j");
    assert_eq!(
        session.handle_event(InputEvent::Arrow(Direction::Down)),
        EventOutcome::Ignored
    );
}

// ========================================================================
// Window motions
// ========================================================================

#[test]
fn test_ctrl_e_shifts_view_without_losing_cursor() {
    let mut session = session(&numbered(10), 10, 4);
    keys(&mut session, "jj");
    session.handle_event(InputEvent::Ctrl('e'));
    assert_eq!(session.window().viewport().top_line(), 1);
    // The cursor stays on the same document line.
    assert_eq!(session.position_report(), "3,1");
}

#[test]
fn test_ctrl_y_at_top_is_ignored() {
    let mut session = session(&numbered(10), 10, 4);
    assert_eq!(
        session.handle_event(InputEvent::Ctrl('y')),
        EventOutcome::Ignored
    );
}

#[test]
fn test_half_page_and_full_page_motions() {
    let mut session = session(&numbered(40), 10, 6);
    session.handle_event(InputEvent::Ctrl('d'));
    assert_eq!(session.window().viewport().top_line(), 3);
    session.handle_event(InputEvent::Ctrl('f'));
    assert_eq!(session.window().viewport().top_line(), 9);
    session.handle_event(InputEvent::Ctrl('u'));
    assert_eq!(session.window().viewport().top_line(), 6);
    session.handle_event(InputEvent::Ctrl('b'));
    assert_eq!(session.window().viewport().top_line(), 0);
    // At the top the motion is a no-op.
    assert_eq!(
        session.handle_event(InputEvent::Ctrl('b')),
        EventOutcome::Ignored
    );
}

#[test]
fn test_page_down_stops_at_document_end() {
    let mut session = session(&numbered(5), 10, 3);
    session.handle_event(InputEvent::Ctrl('f'));
    let top = session.window().viewport().top_line();
    assert!(top <= 4);
    // The last line is visible; further paging is a no-op.
    assert_eq!(
        session.handle_event(InputEvent::Ctrl('f')),
        EventOutcome::Ignored
    );
}

#[test]
fn test_goto_line_positions_cursor() {
    let mut session = session(&numbered(20), 10, 4);
    session.goto_line(12);
    assert_eq!(session.position_report(), "13,1");
}

// ========================================================================
// Scroll emission and resize
// ========================================================================

#[test]
fn test_scroll_emits_scroll_and_row_ops() {
    let mut session = session(&numbered(10), 10, 3);
    keys(&mut session, "jjj");
    let ops = session.take_redraw();
    assert!(ops
        .iter()
        .any(|op| matches!(op, RedrawOp::ScrollRows { rows, .. } if *rows > 0)));
    assert!(ops.iter().any(|op| matches!(op, RedrawOp::SetRow { .. })));
    assert!(ops
        .iter()
        .any(|op| matches!(op, RedrawOp::SetCursor { .. })));
}

#[test]
fn test_resize_repaints_every_row() {
    let mut session = session(&numbered(10), 10, 4);
    session.take_redraw();
    session.resize(8, 6);
    let ops = session.take_redraw();
    let painted: Vec<usize> = ops
        .iter()
        .filter_map(|op| match op {
            RedrawOp::SetRow { row, .. } => Some(*row),
            _ => None,
        })
        .collect();
    for row in 0..6 {
        assert!(painted.contains(&row), "row {row} not repainted on resize");
    }
}

#[test]
fn test_resize_to_narrow_width_rewraps() {
    let mut session = session("abcdefgh\nx\n", 10, 5);
    session.resize(5, 5);
    let view = session.window().viewport();
    assert_eq!(view.rows_per_line(8), 2);
    assert_eq!(view.virtual_height(), 3);
}

#[test]
fn test_filler_rows_render_as_tilde() {
    let mut session = session("only\n", 10, 3);
    session.resize(10, 3);
    let ops = session.take_redraw();
    assert!(ops.iter().any(
        |op| matches!(op, RedrawOp::SetRow { row: 2, text } if text.as_str() == ved::render::FILLER_ROW)
    ));
}
