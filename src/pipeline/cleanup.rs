//! Scoped deletion of every file a pipeline run touches.
//!
//! Original uploads and rasterized page images are registered as the run
//! proceeds. `release` deletes them; `Drop` calls `release` if nobody did,
//! so early returns, `?` propagation and panics all end with an empty
//! registry. Deletion failures are logged and never escalated.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct CleanupCoordinator {
    paths: Vec<PathBuf>,
    released: bool,
}

/// Outcome of a release, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub already_absent: usize,
    pub failed: usize,
}

impl CleanupCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a path for deletion. Registering the same path twice is a no-op.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.is_registered(&path) {
            self.paths.push(path);
        }
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Delete every registered path exactly once.
    pub fn release(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        for path in self.paths.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => report.deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.already_absent += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = %path.display(), "Failed to delete pipeline file: {e}");
                }
            }
        }

        tracing::debug!(
            deleted = report.deleted,
            already_absent = report.already_absent,
            failed = report.failed,
            "Pipeline files released"
        );
        report
    }
}

impl Drop for CleanupCoordinator {
    fn drop(&mut self) {
        self.release();
    }
}
