//! Load/write round-trip tests

mod common;

use common::{escape, keys, session};
use ved::config::EditorConfig;
use ved::session::{EditorSession, StatusLine};

#[test]
fn test_write_then_reload_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scratch.txt");

    let mut session = session("alpha\nbeta\ngamma\n", 20, 5);
    keys(&mut session, "ix");
    escape(&mut session);
    let edited = session.contents();
    session.write_file(Some(path.as_path())).unwrap();

    let (reloaded, status) =
        EditorSession::load_path(&path, &EditorConfig::default(), 20, 5).unwrap();
    assert_eq!(reloaded.contents(), edited);
    assert!(matches!(status, StatusLine::Loaded { lines: 3, .. }));
}

#[test]
fn test_load_missing_file_reports_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-there.txt");
    let (session, status) =
        EditorSession::load_path(&path, &EditorConfig::default(), 20, 5).unwrap();
    assert_eq!(session.contents(), "\n");
    assert_eq!(
        status,
        StatusLine::NewFile {
            name: path.display().to_string()
        }
    );
    assert_eq!(status.to_string(), format!("New file \"{}\"", path.display()));
}

#[test]
fn test_write_reports_line_and_character_counts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counts.txt");
    let mut session = session("one\ntwo\n", 20, 5);
    let status = session.write_file(Some(path.as_path())).unwrap();
    match status {
        StatusLine::Written {
            lines, characters, ..
        } => {
            assert_eq!(lines, 2);
            // Terminators count, matching the bytes on disk.
            assert_eq!(characters, 8);
        }
        other => panic!("expected a written status, got {other:?}"),
    }
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
}

#[test]
fn test_write_without_name_fails() {
    let mut session = session("x\n", 10, 3);
    assert!(session.write_file(None).is_err());
}

#[test]
fn test_write_remembers_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remembered.txt");
    let mut session = session("x\n", 10, 3);
    session.write_file(Some(path.as_path())).unwrap();
    assert_eq!(session.path(), Some(path.as_path()));
    // A bare `:w` now works.
    session.write_file(None).unwrap();
}

#[test]
fn test_load_status_counts_match_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counted.txt");
    std::fs::write(&path, "ab\ncde\n").unwrap();
    let (session, status) =
        EditorSession::load_path(&path, &EditorConfig::default(), 20, 5).unwrap();
    assert_eq!(
        status,
        StatusLine::Loaded {
            name: path.display().to_string(),
            lines: 2,
            characters: 5,
        }
    );
    assert_eq!(session.buffer().char_count(), 5);
    assert_eq!(session.buffer().line_count(), 2);
}
