//! Per-project build lock for cross-process coordination.
//!
//! A build reads then writes graph nodes without database-level upserts, so at
//! most one build per project may run at a time. The lock is an OS file lock
//! (via `fs4`) on `<home>/.locks/<scope>/<project>.lock`, taken with
//! exponential backoff and released when the [`ProjectLock`] is dropped.
//!
//! File operations run under `spawn_blocking` so waiting for a lock never
//! blocks the runtime.

use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS, default_lock_timeout};
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

/// An exclusive lock on one project's builds.
///
/// The lock file stays on disk after release. Unlinking it would let a process
/// still waiting on the old inode and a newcomer on a fresh inode both hold it.
#[derive(Debug)]
pub struct ProjectLock {
    _file: Arc<File>,
    lock_name: String,
    lock_path: PathBuf,
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        debug!(lock_name = %self.lock_name, "Project lock released");
    }
}

impl ProjectLock {
    /// Acquire the build lock of `scope`/`project` with the default timeout.
    pub async fn acquire(home: &Path, scope: &str, project: &str) -> Result<Self> {
        Self::acquire_with_timeout(home, scope, project, default_lock_timeout()).await
    }

    /// Acquire the build lock, waiting at most `timeout`.
    pub async fn acquire_with_timeout(
        home: &Path,
        scope: &str,
        project: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let lock_name = format!("{scope}/{project}");
        debug!(lock_name = %lock_name, "Waiting for project lock");

        let locks_dir = home.join(".locks").join(sanitize(scope));
        tokio::fs::create_dir_all(&locks_dir).await.with_context(|| {
            format!("Failed to create locks directory: {}", locks_dir.display())
        })?;
        let lock_path = locks_dir.join(format!("{}.lock", sanitize(project)));

        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .context("spawn_blocking panicked")?
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        let file = Arc::new(file);

        let start = std::time::Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            let attempt = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || attempt.try_lock_exclusive())
                .await
                .context("spawn_blocking panicked")?;

            if matches!(locked, Ok(true)) {
                debug!(
                    lock_name = %lock_name,
                    wait_ms = start.elapsed().as_millis(),
                    "Project lock acquired"
                );
                return Ok(Self {
                    _file: file,
                    lock_name,
                    lock_path,
                });
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }

        Err(anyhow::anyhow!(
            "Timeout acquiring build lock for project '{lock_name}' after {timeout:?}; \
             another build of this project is still running"
        ))
    }

    /// Location of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
