//! The external version-control capability hunk staging relies on.
//!
//! [`Repository`] lists every primitive the applier and the refresh
//! coordinator consume. [`GitCli`] implements it by driving the `git`
//! executable; tests substitute an in-memory double.

mod git;
#[cfg(test)]
pub(crate) mod mock;
pub mod status;

pub use git::GitCli;
pub use status::{FileEntry, FileStatus, StatusView};

use error_set::error_set;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

error_set! {
    /// Errors from invoking the version-control backend
    RepoError := {
        #[display("Failed to run git {command}: {message}")]
        SpawnFailed { command: String, message: String },
        #[display("git {command} failed: {stderr}")]
        CommandFailed { command: String, stderr: String },
        #[display("Invalid UTF-8 in git {command} output: {message}")]
        InvalidUtf8 { command: String, message: String },
        #[display("I/O error on {path}: {message}")]
        Io { path: String, message: String },
    }
}

/// Mode flags for [`Repository::apply_patch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Apply to the index instead of the working copy
    pub cached: bool,
    /// Apply in reverse
    pub reverse: bool,
}

/// Exit status and diagnostic text of an apply call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub exit_code: Option<i32>,
    pub diagnostic: String,
}

impl ApplyOutcome {
    pub fn success() -> Self {
        ApplyOutcome {
            exit_code: Some(0),
            diagnostic: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Which files an index operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSpec<'a> {
    Paths(&'a [String]),
    All,
}

/// Which copies [`Repository::restore_from_head`] overwrites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreTarget {
    pub staged: bool,
    pub worktree: bool,
}

impl RestoreTarget {
    pub const BOTH: RestoreTarget = RestoreTarget {
        staged: true,
        worktree: true,
    };
}

/// Callback invoked when the repository reports a state change
pub type Listener = Arc<dyn Fn() + Send + Sync>;

pub trait Repository: Send + Sync {
    /// Root of the working tree
    fn root(&self) -> &Path;

    /// Apply a patch file. A nonzero exit is reported in the outcome, not as an error.
    fn apply_patch(&self, patch: &Path, options: ApplyOptions) -> Result<ApplyOutcome, RepoError>;

    fn add_to_index(&self, paths: PathSpec<'_>) -> Result<(), RepoError>;

    fn reset_index(&self, paths: PathSpec<'_>) -> Result<(), RepoError>;

    fn restore_from_head(&self, path: &str, target: RestoreTarget) -> Result<(), RepoError>;

    /// Legacy-compatible `checkout HEAD -- <path>`
    fn checkout_from_head(&self, path: &str) -> Result<(), RepoError>;

    /// Delete a file from the working copy
    fn remove_from_worktree(&self, path: &str) -> Result<(), RepoError> {
        let full = self.root().join(path);
        std::fs::remove_file(&full).map_err(|e| RepoError::Io {
            path: full.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Unified diff of one file, worktree vs index or index vs HEAD when `staged`
    fn diff(&self, path: &str, staged: bool) -> Result<String, RepoError>;

    /// Force the backend to refresh its cached status information
    fn refresh_status(&self) -> Result<(), RepoError>;

    fn status(&self) -> Result<StatusView, RepoError>;

    /// Register for state change notifications until the subscription is dropped
    fn subscribe(&self, listener: Listener) -> Subscription;
}

type ListenerSlots = Mutex<Vec<(u64, Listener)>>;

/// Registry of change listeners shared by backends.
#[derive(Default)]
pub struct Listeners {
    slots: Arc<ListenerSlots>,
    next_id: AtomicU64,
}

impl Listeners {
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        Subscription {
            slots: Arc::downgrade(&self.slots),
            id,
        }
    }

    /// Invoke every registered listener.
    ///
    /// The registry lock is released before callbacks run, so a listener may
    /// subscribe or drop subscriptions.
    pub fn notify(&self) {
        let listeners: Vec<Listener> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener();
        }
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Disposable handle returned by [`Repository::subscribe`]; unsubscribes on drop.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    slots: Weak<ListenerSlots>,
    id: u64,
}

impl Subscription {
    /// A subscription that is not attached to anything
    pub fn detached() -> Self {
        Subscription {
            slots: Weak::new(),
            id: 0,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        (
            count,
            Arc::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn notify_reaches_every_listener() {
        let listeners = Listeners::default();
        let (first, a) = counter();
        let (second, b) = counter();
        let _a = listeners.subscribe(a);
        let _b = listeners.subscribe(b);

        listeners.notify();
        listeners.notify();

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let listeners = Listeners::default();
        let (count, listener) = counter();
        let subscription = listeners.subscribe(listener);
        assert_eq!(listeners.len(), 1);

        drop(subscription);
        listeners.notify();

        assert!(listeners.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let listeners = Listeners::default();
        let (_, listener) = counter();
        let subscription = listeners.subscribe(listener);
        drop(listeners);
        drop(subscription);
        drop(Subscription::detached());
    }

    #[test]
    fn apply_outcome_success() {
        assert!(ApplyOutcome::success().is_success());
        assert!(
            !ApplyOutcome {
                exit_code: Some(1),
                diagnostic: "error: patch failed".to_string()
            }
            .is_success()
        );
        assert!(!ApplyOutcome::default().is_success());
    }
}
