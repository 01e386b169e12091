//! Stage, unstage and discard changes at hunk or file granularity.
//!
//! Hunk operations write a patch built from the document header and the
//! chosen hunks to a private temporary file at the repository root, hand it
//! to the backend's apply primitive and remove the file on every exit path.

use crate::diff::Hunk;
use crate::patch::build_patch;
use crate::repo::{ApplyOptions, FileStatus, PathSpec, RepoError, Repository, RestoreTarget};
use error_set::error_set;
use log::{debug, info, warn};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Reported when the apply primitive fails without printing anything
pub const GENERIC_APPLY_FAILURE: &str = "git apply failed without a diagnostic message";

error_set! {
    /// Errors from applying changes to the index or working copy
    ApplyError := {
        #[display("Failed to write patch file: {message}")]
        PatchFileFailed { message: String },
        #[display("{diagnostic}")]
        ApplyFailed { diagnostic: String },
        #[display("Failed to discard {path}: {message}")]
        DiscardFailed { path: String, message: String },
        #[display("No hunks of {path} selected")]
        NothingSelected { path: String },
        RepoError(RepoError),
    }
}

/// Where and in which direction a hunk patch is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkMode {
    /// Index, forward
    Stage,
    /// Index, reverse
    Unstage,
    /// Working copy, reverse
    Discard,
}

impl HunkMode {
    pub fn options(self) -> ApplyOptions {
        match self {
            HunkMode::Stage => ApplyOptions {
                cached: true,
                reverse: false,
            },
            HunkMode::Unstage => ApplyOptions {
                cached: true,
                reverse: true,
            },
            HunkMode::Discard => ApplyOptions {
                cached: false,
                reverse: true,
            },
        }
    }

    fn verb(self) -> &'static str {
        match self {
            HunkMode::Stage => "staged",
            HunkMode::Unstage => "unstaged",
            HunkMode::Discard => "discarded",
        }
    }
}

/// Called after every successful mutation so cached state can be re-synced
pub type ResyncHook = Arc<dyn Fn() + Send + Sync>;

pub struct ChangeApplier<R> {
    repo: Arc<R>,
    resync: Option<ResyncHook>,
}

impl<R: Repository> ChangeApplier<R> {
    pub fn new(repo: Arc<R>) -> Self {
        ChangeApplier { repo, resync: None }
    }

    /// Run `hook` after every successful mutating operation
    pub fn with_resync(mut self, hook: ResyncHook) -> Self {
        self.resync = Some(hook);
        self
    }

    pub fn stage_hunk(&self, path: &str, hunk: &Hunk, header: &str) -> Result<(), ApplyError> {
        self.apply_hunks(path, header, std::slice::from_ref(hunk), HunkMode::Stage)
    }

    pub fn unstage_hunk(&self, path: &str, hunk: &Hunk, header: &str) -> Result<(), ApplyError> {
        self.apply_hunks(path, header, std::slice::from_ref(hunk), HunkMode::Unstage)
    }

    pub fn discard_hunk(&self, path: &str, hunk: &Hunk, header: &str) -> Result<(), ApplyError> {
        self.apply_hunks(path, header, std::slice::from_ref(hunk), HunkMode::Discard)
    }

    /// Apply several hunks of one document as a single patch.
    pub fn apply_hunks(
        &self,
        path: &str,
        header: &str,
        hunks: &[Hunk],
        mode: HunkMode,
    ) -> Result<(), ApplyError> {
        if hunks.is_empty() {
            return Err(ApplyError::NothingSelected {
                path: path.to_string(),
            });
        }

        let patch = build_patch(header, hunks);
        let file = self.write_patch(&patch)?;
        debug!(
            "applying {} hunk(s) of {path} from {} with {:?}",
            hunks.len(),
            file.path().display(),
            mode.options()
        );

        // `file` is removed when dropped, including on early return or unwind
        let outcome = self.repo.apply_patch(file.path(), mode.options())?;
        if let Err(e) = file.close() {
            warn!("failed to remove temporary patch file: {e}");
        }

        if !outcome.is_success() {
            let diagnostic = if outcome.diagnostic.trim().is_empty() {
                GENERIC_APPLY_FAILURE.to_string()
            } else {
                outcome.diagnostic
            };
            return Err(ApplyError::ApplyFailed { diagnostic });
        }

        info!("{} {} hunk(s) of {path}", mode.verb(), hunks.len());
        self.resync();
        Ok(())
    }

    pub fn stage_file(&self, paths: &[String]) -> Result<(), ApplyError> {
        self.repo.add_to_index(PathSpec::Paths(paths))?;
        info!("staged {}", paths.join(", "));
        self.resync();
        Ok(())
    }

    pub fn unstage_file(&self, paths: &[String]) -> Result<(), ApplyError> {
        self.repo.reset_index(PathSpec::Paths(paths))?;
        info!("unstaged {}", paths.join(", "));
        self.resync();
        Ok(())
    }

    pub fn stage_all(&self) -> Result<(), ApplyError> {
        self.repo.add_to_index(PathSpec::All)?;
        info!("staged all changes");
        self.resync();
        Ok(())
    }

    pub fn unstage_all(&self) -> Result<(), ApplyError> {
        self.repo.reset_index(PathSpec::All)?;
        info!("unstaged all changes");
        self.resync();
        Ok(())
    }

    /// Throw away working copy changes to one file.
    ///
    /// New files have no committed version and are deleted, after dropping
    /// them from the index when they were added there. Everything else
    /// is restored from HEAD in both index and worktree, falling back to
    /// `checkout HEAD` when `restore` is unavailable or fails.
    pub fn discard_file(&self, path: &str, status: FileStatus) -> Result<(), ApplyError> {
        if status.is_new() {
            if status == FileStatus::Added {
                let paths = [path.to_string()];
                self.repo.reset_index(PathSpec::Paths(&paths))?;
            }
            self.repo.remove_from_worktree(path)?;
            info!("deleted new file {path}");
            self.resync();
            return Ok(());
        }

        if let Err(restore_err) = self.repo.restore_from_head(path, RestoreTarget::BOTH) {
            warn!("restore of {path} failed, falling back to checkout: {restore_err}");
            self.repo
                .checkout_from_head(path)
                .map_err(|checkout_err| ApplyError::DiscardFailed {
                    path: path.to_string(),
                    message: format!("{restore_err}; {checkout_err}"),
                })?;
        }

        info!("discarded changes to {path}");
        self.resync();
        Ok(())
    }

    fn write_patch(&self, patch: &str) -> Result<NamedTempFile, ApplyError> {
        let write_failed = |e: std::io::Error| ApplyError::PatchFileFailed {
            message: e.to_string(),
        };

        let mut file = tempfile::Builder::new()
            .prefix(".git-hunks-")
            .suffix(".patch")
            .tempfile_in(self.repo.root())
            .map_err(write_failed)?;
        file.write_all(patch.as_bytes()).map_err(write_failed)?;
        file.flush().map_err(write_failed)?;
        Ok(file)
    }

    fn resync(&self) {
        if let Some(hook) = &self.resync {
            hook();
        }
    }
}
