//! In-memory [`Repository`] double that records every call.

use super::{
    ApplyOptions, ApplyOutcome, Listener, Listeners, PathSpec, RepoError, Repository,
    RestoreTarget, StatusView, Subscription,
};
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Apply { patch: String, options: ApplyOptions },
    AddToIndex(Option<Vec<String>>),
    ResetIndex(Option<Vec<String>>),
    Restore(String),
    Checkout(String),
    Remove(String),
    Diff { path: String, staged: bool },
    RefreshStatus,
    Status,
}

/// Pauses the first `status()` call until released
pub(crate) struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
}

#[derive(Default)]
pub(crate) struct MockRepo {
    pub(crate) root: Option<TempDir>,
    pub(crate) calls: Mutex<Vec<Call>>,
    pub(crate) apply_outcome: Mutex<Option<ApplyOutcome>>,
    pub(crate) diff_text: Mutex<String>,
    pub(crate) view: Mutex<StatusView>,
    pub(crate) fail_restore: bool,
    pub(crate) fail_checkout: bool,
    pub(crate) fail_refresh: bool,
    pub(crate) fail_status: bool,
    pub(crate) panic_on_apply: bool,
    pub(crate) gate: Mutex<Option<Gate>>,
    pub(crate) listeners: Listeners,
}

fn failure(command: &str) -> RepoError {
    RepoError::CommandFailed {
        command: command.to_string(),
        stderr: format!("{command} rejected by mock"),
    }
}

fn owned(paths: PathSpec<'_>) -> Option<Vec<String>> {
    match paths {
        PathSpec::Paths(paths) => Some(paths.to_vec()),
        PathSpec::All => None,
    }
}

impl MockRepo {
    /// A mock with a real scratch directory as its root
    #[allow(clippy::unwrap_used)]
    pub(crate) fn new() -> Self {
        MockRepo {
            root: Some(TempDir::new().unwrap()),
            ..MockRepo::default()
        }
    }

    pub(crate) fn with_gate(self, entered: Sender<()>, release: Receiver<()>) -> Self {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Gate { entered, release });
        self
    }

    pub(crate) fn with_diff(self, text: &str) -> Self {
        *self.diff_text.lock().unwrap_or_else(PoisonError::into_inner) = text.to_string();
        self
    }

    pub(crate) fn with_view(self, view: StatusView) -> Self {
        *self.view.lock().unwrap_or_else(PoisonError::into_inner) = view;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    /// Simulate a change made outside this process
    pub(crate) fn external_change(&self) {
        self.listeners.notify();
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Repository for MockRepo {
    fn root(&self) -> &Path {
        self.root
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new("."))
    }

    fn apply_patch(&self, patch: &Path, options: ApplyOptions) -> Result<ApplyOutcome, RepoError> {
        let text = std::fs::read_to_string(patch).map_err(|e| RepoError::Io {
            path: patch.display().to_string(),
            message: e.to_string(),
        })?;
        self.record(Call::Apply {
            patch: text,
            options,
        });
        if self.panic_on_apply {
            panic!("apply exploded");
        }
        Ok(self
            .apply_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(ApplyOutcome::success))
    }

    fn add_to_index(&self, paths: PathSpec<'_>) -> Result<(), RepoError> {
        self.record(Call::AddToIndex(owned(paths)));
        Ok(())
    }

    fn reset_index(&self, paths: PathSpec<'_>) -> Result<(), RepoError> {
        self.record(Call::ResetIndex(owned(paths)));
        Ok(())
    }

    fn restore_from_head(&self, path: &str, _target: RestoreTarget) -> Result<(), RepoError> {
        self.record(Call::Restore(path.to_string()));
        if self.fail_restore {
            return Err(failure("restore"));
        }
        Ok(())
    }

    fn checkout_from_head(&self, path: &str) -> Result<(), RepoError> {
        self.record(Call::Checkout(path.to_string()));
        if self.fail_checkout {
            return Err(failure("checkout"));
        }
        Ok(())
    }

    fn remove_from_worktree(&self, path: &str) -> Result<(), RepoError> {
        self.record(Call::Remove(path.to_string()));
        Ok(())
    }

    fn diff(&self, path: &str, staged: bool) -> Result<String, RepoError> {
        self.record(Call::Diff {
            path: path.to_string(),
            staged,
        });
        Ok(self
            .diff_text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn refresh_status(&self) -> Result<(), RepoError> {
        self.record(Call::RefreshStatus);
        if self.fail_refresh {
            return Err(failure("update-index"));
        }
        self.listeners.notify();
        Ok(())
    }

    fn status(&self) -> Result<StatusView, RepoError> {
        self.record(Call::Status);

        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }

        if self.fail_status {
            return Err(failure("status"));
        }
        Ok(self
            .view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}
