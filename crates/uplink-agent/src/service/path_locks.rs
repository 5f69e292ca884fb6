//! # Path Locks
//!
//! Per-path async mutexes. Concurrent commands touching the same path
//! (archive replacement, removal, rename) are serialized; different paths
//! proceed in parallel.
//!
//! Keys are exact normalized paths: `/app/a` and `/app/a/b` do not exclude
//! each other.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-path locks. Cheap to clone.
#[derive(Clone, Default)]
pub struct PathLocks {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> PathGuard {
        let mutex = self
            .locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        PathGuard {
            guard: Some(guard),
            path: path.to_path_buf(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Lock two paths in a global order so two renames `a→b` and `b→a`
    /// cannot deadlock. Equal paths take a single lock.
    pub async fn lock_pair(&self, a: &Path, b: &Path) -> (PathGuard, Option<PathGuard>) {
        if a == b {
            return (self.lock(a).await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first_guard = self.lock(first).await;
        let second_guard = self.lock(second).await;
        (first_guard, Some(second_guard))
    }

    /// Paths with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

/// Held lock on one path. Unused entries are pruned on drop.
pub struct PathGuard {
    guard: Option<OwnedMutexGuard<()>>,
    path: PathBuf,
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathGuard {
    /// Locked path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only reference when idle
        self.guard.take();
        self.locks
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
