//! Background build runner: one worker thread, events over a channel.

use crate::build::{BuildEvent, BuildPlan, BuildSummary, CancelToken};
use crate::error::{PackError, Result};
use crossbeam_channel::{Receiver, unbounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{info, warn};

/// Owns the "build in progress" state. At most one build runs per session.
#[derive(Debug, Default)]
pub struct BuildSession {
    active: Arc<AtomicBool>,
    cancel: CancelToken,
    worker: Option<JoinHandle<Result<BuildSummary>>>,
}

/// Clears the active flag when the worker exits, however it exits.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building the matrix described by the build config at `config_path`.
    pub fn start(&mut self, config_path: &Path) -> Result<Receiver<BuildEvent>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PackError::BuildInProgress);
        }
        // reap a finished previous run
        if let Some(old) = self.worker.take() {
            let _ = old.join();
        }

        self.cancel = CancelToken::new();
        let (tx, rx) = unbounded();
        let cancel = self.cancel.clone();
        let guard = ActiveGuard(Arc::clone(&self.active));
        let path: PathBuf = config_path.to_path_buf();

        let spawned = std::thread::Builder::new()
            .name("packsmith-build".into())
            .spawn(move || {
                let _guard = guard;
                let plan = BuildPlan::from_path(&path)?;
                plan.run(&cancel, &mut |event| {
                    // receiver may be gone; the build still completes
                    let _ = tx.send(event);
                })
            });
        match spawned {
            Ok(handle) => {
                info!(config = ?config_path, "build worker started");
                self.worker = Some(handle);
                Ok(rx)
            }
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Request cancellation; the worker stops before its next cell or stage.
    pub fn cancel(&self) {
        if self.is_running() {
            warn!("build cancellation requested");
        }
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Block until the current build finishes and return its summary.
    pub fn wait(&mut self) -> Result<BuildSummary> {
        let handle = self.worker.take().ok_or(PackError::NotStarted)?;
        handle.join().unwrap_or_else(|payload| {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(PackError::WorkerPanicked(msg))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_without_start_is_not_started() {
        let mut session = BuildSession::new();
        assert!(matches!(session.wait(), Err(PackError::NotStarted)));
    }

    #[test]
    fn worker_panic_is_reported_with_its_message() {
        let mut session = BuildSession::new();
        session.worker = Some(std::thread::spawn(|| -> Result<BuildSummary> {
            panic!("rule table exploded")
        }));
        match session.wait() {
            Err(PackError::WorkerPanicked(msg)) => assert_eq!(msg, "rule table exploded"),
            other => panic!("expected WorkerPanicked, got {other:?}"),
        }
        assert!(matches!(session.wait(), Err(PackError::NotStarted)));
    }
}
