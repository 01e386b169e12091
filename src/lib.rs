use error_set::error_set;
use log::debug;
use std::sync::Arc;

pub mod apply;
pub mod diff;
pub mod patch;
pub mod refresh;
pub mod repo;

pub use apply::{ApplyError, ChangeApplier, HunkMode};
pub use diff::{DiffDocument, Hunk};
pub use patch::build_patch;
pub use refresh::{Publisher, RefreshCoordinator, RefreshEvent, RefreshState};
pub use repo::{FileStatus, GitCli, RepoError, Repository, StatusView};

error_set! {
    /// Top-level error for hunk staging operations
    StagerError := {
        #[display("No repository found at {path}: {message}")]
        RepositoryUnavailable { path: String, message: String },
        #[display("No changes found in {file}")]
        NoChanges { file: String },
        #[display("Hunk {index} not found in {file} ({available} available)")]
        HunkNotFound { file: String, index: usize, available: usize },
        ApplyError(ApplyError),
        RepoError(RepoError),
    }
}

/// Main interface: fetch diffs, apply selections and keep the status view fresh
///
/// Every successful mutation requests a refresh with a forced status re-sync;
/// the resulting view is delivered to the publisher given at construction.
pub struct Stager<R: Repository + 'static> {
    repo: Arc<R>,
    applier: ChangeApplier<R>,
    refresh: Arc<RefreshCoordinator<R>>,
    _watch: repo::Subscription,
}

impl Stager<GitCli> {
    /// Open the git repository containing `path`.
    ///
    /// # Examples
    /// ```no_run
    /// # use git_hunks::{RefreshEvent, Stager};
    /// let publish = Box::new(|event: RefreshEvent| println!("{event:?}"));
    /// let stager = Stager::open(".", "git", publish).unwrap();
    /// let doc = stager.document("src/lib.rs", false).unwrap();
    /// stager.stage_hunks("src/lib.rs", &[0]).unwrap();
    /// ```
    pub fn open(path: &str, git: &str, publish: Publisher) -> Result<Self, StagerError> {
        let repo = GitCli::open_with(path, git).map_err(|e| StagerError::RepositoryUnavailable {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(Arc::new(repo), publish))
    }
}

impl<R: Repository + 'static> Stager<R> {
    pub fn new(repo: Arc<R>, publish: Publisher) -> Self {
        let refresh = Arc::new(RefreshCoordinator::new(Arc::clone(&repo), publish));
        let watch = refresh.watch();

        let coordinator = Arc::clone(&refresh);
        let applier = ChangeApplier::new(Arc::clone(&repo))
            .with_resync(Arc::new(move || coordinator.request_refresh(true)));

        Stager {
            repo,
            applier,
            refresh,
            _watch: watch,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator<R>> {
        &self.refresh
    }

    /// Fetch and parse the current diff of one file.
    ///
    /// `staged` selects index vs HEAD instead of worktree vs index.
    pub fn document(&self, path: &str, staged: bool) -> Result<DiffDocument, StagerError> {
        let text = self.repo.diff(path, staged)?;
        DiffDocument::parse(&text, Some(path)).ok_or_else(|| StagerError::NoChanges {
            file: path.to_string(),
        })
    }

    /// Stage the hunks at `indices` of the unstaged diff
    pub fn stage_hunks(&self, path: &str, indices: &[usize]) -> Result<(), StagerError> {
        self.apply_selected(path, indices, HunkMode::Stage)
    }

    /// Unstage the hunks at `indices` of the staged diff
    pub fn unstage_hunks(&self, path: &str, indices: &[usize]) -> Result<(), StagerError> {
        self.apply_selected(path, indices, HunkMode::Unstage)
    }

    /// Throw away the hunks at `indices` of the unstaged diff
    pub fn discard_hunks(&self, path: &str, indices: &[usize]) -> Result<(), StagerError> {
        self.apply_selected(path, indices, HunkMode::Discard)
    }

    fn apply_selected(
        &self,
        path: &str,
        indices: &[usize],
        mode: HunkMode,
    ) -> Result<(), StagerError> {
        let doc = self.document(path, mode == HunkMode::Unstage)?;
        if doc.is_empty() {
            return Err(StagerError::NoChanges {
                file: path.to_string(),
            });
        }

        let hunks = select_hunks(&doc, indices)?;
        debug!("selected hunks {indices:?} of {}", doc.file_path);

        match hunks.as_slice() {
            [hunk] => match mode {
                HunkMode::Stage => self.applier.stage_hunk(path, hunk, &doc.header)?,
                HunkMode::Unstage => self.applier.unstage_hunk(path, hunk, &doc.header)?,
                HunkMode::Discard => self.applier.discard_hunk(path, hunk, &doc.header)?,
            },
            _ => self.applier.apply_hunks(path, &doc.header, &hunks, mode)?,
        }
        Ok(())
    }

    pub fn stage_files(&self, paths: &[String]) -> Result<(), StagerError> {
        Ok(self.applier.stage_file(paths)?)
    }

    pub fn unstage_files(&self, paths: &[String]) -> Result<(), StagerError> {
        Ok(self.applier.unstage_file(paths)?)
    }

    pub fn stage_all(&self) -> Result<(), StagerError> {
        Ok(self.applier.stage_all()?)
    }

    pub fn unstage_all(&self) -> Result<(), StagerError> {
        Ok(self.applier.unstage_all()?)
    }

    /// Discard all changes to each path, staged or not, using its current status
    pub fn discard_files(&self, paths: &[String]) -> Result<(), StagerError> {
        let view = self.repo.status()?;
        for path in paths {
            let status = discard_status(&view, path)
                .ok_or_else(|| StagerError::NoChanges { file: path.clone() })?;
            self.applier.discard_file(path, status)?;
        }
        Ok(())
    }

    pub fn status(&self) -> Result<StatusView, StagerError> {
        Ok(self.repo.status()?)
    }

    /// Request a refresh, e.g. when the view becomes visible
    pub fn refresh(&self, sync_status: bool) {
        self.refresh.request_refresh(sync_status);
    }
}

/// A file added to the index counts as new even if it was edited since
fn discard_status(view: &StatusView, path: &str) -> Option<FileStatus> {
    let staged = view.staged_entry(path).map(|entry| entry.status);
    let unstaged = view.unstaged_entry(path).map(|entry| entry.status);
    match (staged, unstaged) {
        (Some(FileStatus::Added), _) => Some(FileStatus::Added),
        (_, Some(status)) | (Some(status), None) => Some(status),
        (None, None) => None,
    }
}

/// Pick hunks by index, keeping document order and dropping duplicates
fn select_hunks(doc: &DiffDocument, indices: &[usize]) -> Result<Vec<Hunk>, StagerError> {
    let mut wanted = indices.to_vec();
    wanted.sort_unstable();
    wanted.dedup();

    wanted
        .into_iter()
        .map(|index| {
            doc.hunk(index)
                .cloned()
                .ok_or_else(|| StagerError::HunkNotFound {
                    file: doc.file_path.clone(),
                    index,
                    available: doc.hunks.len(),
                })
        })
        .collect()
}
