use std::fs;

use tempfile::TempDir;
use tracker_engine::{ensure_state_dir, StateFile};

#[test]
fn creates_missing_state_dir() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("state");
    assert!(!dir.exists());
    ensure_state_dir(&dir).unwrap();
    assert!(dir.is_dir());
}

#[test]
fn write_replaces_previous_snapshot() {
    let temp = TempDir::new().unwrap();
    let file = StateFile::new(temp.path().join("nested").join("jobs.ron"));
    assert_eq!(file.read().unwrap(), None);

    file.write("(jobs: [])").unwrap();
    file.write("(jobs: [\"a\"])").unwrap();
    assert_eq!(file.read().unwrap().as_deref(), Some("(jobs: [\"a\"])"));

    let leftovers = fs::read_dir(file.path().parent().unwrap()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn remove_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let file = StateFile::new(temp.path().join("jobs.ron"));
    file.write("()").unwrap();
    assert!(file.remove().unwrap());
    assert!(!file.remove().unwrap());
}

#[test]
fn state_dir_that_is_a_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not_a_dir");
    fs::write(&blocker, "x").unwrap();

    let file = StateFile::new(blocker.join("jobs.ron"));
    assert!(file.write("data").is_err());
    assert_eq!(fs::read_to_string(&blocker).unwrap(), "x");
}
