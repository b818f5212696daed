//! Process-wide graceful shutdown (§4.9): a single `AtomicBool` every
//! long-running loop (PTY reader, client send loops, the accept loop)
//! checks on each iteration, plus a bounded join helper so shutdown
//! itself cannot hang forever on a stuck thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Join `handle`, giving it `grace_period` before giving up and leaving it
/// detached. A thread that ignores `ShutdownHandle` and never exits does
/// not block process exit past this budget (§4.9).
pub fn join_with_grace_period<T>(
    handle: JoinHandle<T>,
    grace_period: Duration,
) -> Result<std::thread::Result<T>, JoinHandle<T>> {
    let start = std::time::Instant::now();
    loop {
        if handle.is_finished() {
            return Ok(handle.join());
        }
        if start.elapsed() >= grace_period {
            return Err(handle);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_starts_running_and_reports_shutdown() {
        let handle = ShutdownHandle::new();
        assert!(handle.is_running());
        handle.request_shutdown();
        assert!(!handle.is_running());
    }

    #[test]
    fn clone_shares_the_same_flag() {
        let a = ShutdownHandle::new();
        let b = a.clone();
        a.request_shutdown();
        assert!(!b.is_running());
    }

    #[test]
    fn join_with_grace_period_succeeds_for_fast_threads() {
        let handle = std::thread::spawn(|| 7);
        let result = join_with_grace_period(handle, Duration::from_secs(1));
        assert_eq!(result.unwrap().unwrap(), 7);
    }

    #[test]
    fn join_with_grace_period_times_out_on_slow_threads() {
        let handle = std::thread::spawn(|| std::thread::sleep(Duration::from_secs(5)));
        let result = join_with_grace_period(handle, Duration::from_millis(50));
        assert!(result.is_err());
    }
}
