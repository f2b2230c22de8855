use crate::context::StoreContext;
use std::time::Duration;
use tempfile::TempDir;

/// Create an initialized store in a fresh temp directory.
pub(crate) fn create_test_store() -> (TempDir, StoreContext) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = StoreContext::at(temp_dir.path().join("store")).unwrap();
    ctx.create_layout().unwrap();
    (temp_dir, ctx)
}

/// Poll `check` until it returns true or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}
