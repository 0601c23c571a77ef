use fd_lock::RwLock;
use rand::Rng;
use std::fs::OpenOptions;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{CoordinationError, Result};

/// How long to wait for a contended entity lock and how often to poll it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub timeout: Duration,
    pub retry: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: Duration::from_millis(10),
        }
    }
}

/// Run `f` while holding an exclusive advisory lock on `lock_path`.
///
/// The lock is an `flock`-style lock on a sidecar file, so it excludes other
/// processes as well as other threads that opened the file separately. It is
/// released when this function returns, whatever `f` returned.
pub fn with_exclusive<R>(
    lock_path: &Path,
    settings: &LockSettings,
    f: impl FnOnce() -> Result<R>,
) -> Result<R> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    let mut lock = RwLock::new(file);

    let started = Instant::now();
    let mut backoff = settings.retry;
    let max_backoff = settings.retry * 8;
    let mut attempts = 0u32;

    loop {
        match lock.try_write() {
            Ok(_guard) => {
                if attempts > 0 {
                    debug!(
                        lock = %lock_path.display(),
                        attempts,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Acquired contended lock"
                    );
                }
                return f();
            }
            Err(e) if e.kind() == IoErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        attempts += 1;
        let waited = started.elapsed();
        if waited >= settings.timeout {
            warn!(
                lock = %lock_path.display(),
                attempts,
                "Gave up waiting for lock"
            );
            return Err(CoordinationError::LockTimeout {
                path: lock_path.to_path_buf(),
                waited_ms: waited.as_millis() as u64,
            });
        }

        let jitter_ms = rand::rng().random_range(0..=backoff.as_millis() as u64);
        std::thread::sleep(backoff + Duration::from_millis(jitter_ms));
        backoff = (backoff * 2).min(max_backoff);
    }
}
