//! Exclusive run lock tests

use tempfile::TempDir;

use lws_fulfillment::{RunLock, WorkflowError};

#[test]
fn test_second_holder_is_turned_away() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("run.lock");

    let mut first = RunLock::open(&path).unwrap();
    let _guard = first.try_acquire().unwrap();

    let mut second = RunLock::open(&path).unwrap();
    match second.try_acquire() {
        Err(WorkflowError::RunInProgress { path: held }) => assert_eq!(held, path),
        Err(other) => panic!("expected RunInProgress, got {other}"),
        Ok(_) => panic!("two runs held the lock at once"),
    };
}

#[test]
fn test_lock_is_free_again_after_release() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.lock");

    let mut first = RunLock::open(&path).unwrap();
    {
        let _guard = first.try_acquire().unwrap();
    }

    let mut second = RunLock::open(&path).unwrap();
    assert!(second.try_acquire().is_ok());
}
