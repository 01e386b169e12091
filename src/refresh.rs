//! Single-flight, coalescing refresh of the status view.
//!
//! At most one refresh cycle runs at a time. Requests arriving while a cycle
//! is running collapse into one follow-up cycle whose `sync_status` flag is
//! the OR of theirs. The thread that started the first cycle keeps looping
//! until no request is pending, then returns the coordinator to idle.

use crate::repo::{RepoError, Repository, StatusView, Subscription};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Published at the end of every refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    Updated(StatusView),
    Failed { message: String },
}

/// Receives every published refresh result
pub type Publisher = Box<dyn Fn(RefreshEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Running,
    /// A cycle is running and at least one more was requested meanwhile
    RunningWithPending {
        sync_status: bool,
    },
}

pub struct RefreshCoordinator<R> {
    repo: Arc<R>,
    state: Mutex<RefreshState>,
    /// Set just before a forced status re-sync, consumed by the next change notification
    suppress_next_change: AtomicBool,
    publish: Publisher,
    cycles: AtomicU64,
}

/// Returns the coordinator to idle if a cycle unwinds mid-flight.
struct RunningGuard<'a> {
    state: &'a Mutex<RefreshState>,
    finished: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = RefreshState::Idle;
        }
    }
}

impl<R: Repository> RefreshCoordinator<R> {
    pub fn new(repo: Arc<R>, publish: Publisher) -> Self {
        RefreshCoordinator {
            repo,
            state: Mutex::new(RefreshState::Idle),
            suppress_next_change: AtomicBool::new(false),
            publish,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RefreshState {
        *self.lock_state()
    }

    /// Number of refresh cycles completed so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Ask for the status view to be re-read and published.
    ///
    /// If a cycle is already running this only records the request and
    /// returns. Otherwise the calling thread runs cycles until no request is
    /// pending.
    pub fn request_refresh(&self, sync_status: bool) {
        {
            let mut state = self.lock_state();
            match *state {
                RefreshState::Idle => *state = RefreshState::Running,
                RefreshState::Running => {
                    *state = RefreshState::RunningWithPending { sync_status };
                    return;
                }
                RefreshState::RunningWithPending {
                    sync_status: pending,
                } => {
                    *state = RefreshState::RunningWithPending {
                        sync_status: pending || sync_status,
                    };
                    return;
                }
            }
        }

        let mut guard = RunningGuard {
            state: &self.state,
            finished: false,
        };
        let mut sync_status = sync_status;

        loop {
            self.run_cycle(sync_status);

            let mut state = self.lock_state();
            match *state {
                RefreshState::RunningWithPending { sync_status: next } => {
                    *state = RefreshState::Running;
                    sync_status = next;
                }
                RefreshState::Running | RefreshState::Idle => {
                    *state = RefreshState::Idle;
                    guard.finished = true;
                    break;
                }
            }
        }
    }

    /// Handle a change notification from the repository.
    ///
    /// The notification provoked by this coordinator's own status re-sync is
    /// swallowed once; any other triggers a refresh without re-sync.
    pub fn on_external_change(&self) {
        if self.suppress_next_change.swap(false, Ordering::SeqCst) {
            debug!("ignoring change notification from own status refresh");
            return;
        }
        self.request_refresh(false);
    }

    /// Subscribe to the repository's change notifications.
    ///
    /// The coordinator is held weakly; dropping the returned subscription
    /// stops delivery.
    pub fn watch(self: &Arc<Self>) -> Subscription
    where
        R: 'static,
    {
        let coordinator = Arc::downgrade(self);
        self.repo.subscribe(Arc::new(move || {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.on_external_change();
            }
        }))
    }

    fn run_cycle(&self, sync_status: bool) {
        let cycle = self.cycles.load(Ordering::SeqCst) + 1;
        let event = match self.read_state(sync_status) {
            Ok(view) => {
                info!(
                    "refresh #{cycle}: {} staged, {} unstaged",
                    view.staged.len(),
                    view.unstaged.len()
                );
                RefreshEvent::Updated(view)
            }
            Err(e) => {
                warn!("refresh #{cycle} failed: {e}");
                RefreshEvent::Failed {
                    message: e.to_string(),
                }
            }
        };
        (self.publish)(event);
        self.cycles.fetch_add(1, Ordering::SeqCst);
    }

    fn read_state(&self, sync_status: bool) -> Result<StatusView, RepoError> {
        if sync_status {
            self.suppress_next_change.store(true, Ordering::SeqCst);
            if let Err(e) = self.repo.refresh_status() {
                // No notification is coming, so don't swallow the next real one
                self.suppress_next_change.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        self.repo.status()
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::repo::mock::{Call, MockRepo};
    use crate::repo::{FileEntry, FileStatus};
    use similar_asserts::assert_eq;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::mpsc;
    use std::thread;

    type Events = Arc<Mutex<Vec<RefreshEvent>>>;

    fn collecting(repo: &Arc<MockRepo>) -> (Arc<RefreshCoordinator<MockRepo>>, Events) {
        let events: Events = Arc::default();
        let sink = Arc::clone(&events);
        let coordinator = RefreshCoordinator::new(
            Arc::clone(repo),
            Box::new(move |event: RefreshEvent| sink.lock().unwrap().push(event)),
        );
        (Arc::new(coordinator), events)
    }

    fn view() -> StatusView {
        StatusView {
            staged: vec![],
            unstaged: vec![FileEntry {
                path: "a.rs".to_string(),
                origin: None,
                status: FileStatus::Modified,
            }],
        }
    }

    fn status_calls(repo: &MockRepo) -> usize {
        repo.count(|call| *call == Call::Status)
    }

    fn refresh_calls(repo: &MockRepo) -> usize {
        repo.count(|call| *call == Call::RefreshStatus)
    }

    #[test]
    fn idle_request_runs_one_cycle() {
        let repo = Arc::new(MockRepo::new().with_view(view()));
        let (coordinator, events) = collecting(&repo);

        coordinator.request_refresh(false);

        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(coordinator.cycles(), 1);
        assert_eq!(refresh_calls(&repo), 0);
        assert_eq!(*events.lock().unwrap(), vec![RefreshEvent::Updated(view())]);
    }

    #[test]
    fn sync_request_refreshes_status_first() {
        let repo = Arc::new(MockRepo::new());
        let (coordinator, _) = collecting(&repo);

        coordinator.request_refresh(true);

        assert_eq!(repo.calls(), vec![Call::RefreshStatus, Call::Status]);
    }

    #[test]
    fn burst_during_cycle_coalesces_into_one() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let repo = Arc::new(MockRepo::new().with_gate(entered_tx, release_rx));
        let (coordinator, events) = collecting(&repo);

        let runner = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.request_refresh(false))
        };
        entered_rx.recv().unwrap();
        assert_eq!(coordinator.state(), RefreshState::Running);

        for sync_status in [false, false, true, false, false] {
            coordinator.request_refresh(sync_status);
        }
        assert_eq!(
            coordinator.state(),
            RefreshState::RunningWithPending { sync_status: true }
        );

        release_tx.send(()).unwrap();
        runner.join().unwrap();

        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(coordinator.cycles(), 2);
        assert_eq!(status_calls(&repo), 2);
        assert_eq!(refresh_calls(&repo), 1);
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn pending_without_sync_stays_unsynced() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let repo = Arc::new(MockRepo::new().with_gate(entered_tx, release_rx));
        let (coordinator, _) = collecting(&repo);

        let runner = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.request_refresh(false))
        };
        entered_rx.recv().unwrap();
        coordinator.request_refresh(false);
        coordinator.request_refresh(false);
        release_tx.send(()).unwrap();
        runner.join().unwrap();

        assert_eq!(status_calls(&repo), 2);
        assert_eq!(refresh_calls(&repo), 0);
    }

    #[test]
    fn failure_is_published_and_coordinator_recovers() {
        let repo = Arc::new(MockRepo {
            fail_status: true,
            ..MockRepo::new()
        });
        let (coordinator, events) = collecting(&repo);

        coordinator.request_refresh(false);
        coordinator.request_refresh(false);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RefreshEvent::Failed { message } if message.contains("status")));
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }

    #[test]
    fn failed_resync_skips_status_read() {
        let repo = Arc::new(MockRepo {
            fail_refresh: true,
            ..MockRepo::new()
        });
        let (coordinator, events) = collecting(&repo);
        let _watch = coordinator.watch();

        coordinator.request_refresh(true);
        assert_eq!(repo.calls(), vec![Call::RefreshStatus]);
        assert!(matches!(
            events.lock().unwrap()[0],
            RefreshEvent::Failed { .. }
        ));

        // Suppression was cleared, so a genuine change still gets through
        repo.external_change();
        assert_eq!(coordinator.cycles(), 2);
    }

    #[test]
    fn panicking_publisher_does_not_wedge_coordinator() {
        let repo = Arc::new(MockRepo::new());
        fn explode(_: RefreshEvent) {
            panic!("view layer exploded");
        }
        let coordinator = RefreshCoordinator::new(Arc::clone(&repo), Box::new(explode));

        let result = catch_unwind(AssertUnwindSafe(|| coordinator.request_refresh(false)));

        assert!(result.is_err());
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }

    #[test]
    fn external_change_triggers_unsynced_refresh() {
        let repo = Arc::new(MockRepo::new());
        let (coordinator, events) = collecting(&repo);
        let _watch = coordinator.watch();

        repo.external_change();

        assert_eq!(repo.calls(), vec![Call::Status]);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn own_resync_notification_is_suppressed_once() {
        let repo = Arc::new(MockRepo::new());
        let (coordinator, _) = collecting(&repo);
        let _watch = coordinator.watch();

        // refresh_status notifies listeners from inside the cycle
        coordinator.request_refresh(true);
        assert_eq!(coordinator.cycles(), 1);
        assert_eq!(coordinator.state(), RefreshState::Idle);

        // The flag was consumed; the next notification is treated as external
        repo.external_change();
        assert_eq!(coordinator.cycles(), 2);
    }

    #[test]
    fn dropping_watch_unsubscribes() {
        let repo = Arc::new(MockRepo::new());
        let (coordinator, _) = collecting(&repo);

        let watch = coordinator.watch();
        assert_eq!(repo.listener_count(), 1);
        drop(watch);
        assert_eq!(repo.listener_count(), 0);

        repo.external_change();
        assert_eq!(coordinator.cycles(), 0);
    }
}
