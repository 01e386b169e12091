use super::{
    ApplyOptions, ApplyOutcome, Listener, Listeners, PathSpec, RepoError, Repository,
    RestoreTarget, StatusView, Subscription,
};
use log::debug;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// [`Repository`] backed by the `git` executable.
pub struct GitCli {
    root: PathBuf,
    git: PathBuf,
    listeners: Listeners,
}

impl GitCli {
    /// Open the repository containing `path`, using `git` from `PATH`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::open_with(path, "git")
    }

    /// Open the repository containing `path` with a specific git executable.
    pub fn open_with(path: impl AsRef<Path>, git: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let git = git.into();
        let output = Command::new(&git)
            .arg("-C")
            .arg(path.as_ref())
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .map_err(|e| RepoError::SpawnFailed {
                command: "rev-parse".to_string(),
                message: e.to_string(),
            })?;

        let toplevel = checked_stdout("rev-parse", output)?;
        let root = PathBuf::from(toplevel.trim_end_matches(['\n', '\r']));
        debug!("opened repository at {}", root.display());

        Ok(GitCli {
            root,
            git,
            listeners: Listeners::default(),
        })
    }

    /// Run `git -C <root> <args>` and capture its output.
    fn run<I, S>(&self, label: &str, args: I) -> Result<Output, RepoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git);
        cmd.arg("-C").arg(&self.root).args(args);
        debug!("running {:?}", cmd);

        cmd.output().map_err(|e| RepoError::SpawnFailed {
            command: label.to_string(),
            message: e.to_string(),
        })
    }

    /// Run a command that must exit successfully, returning stdout.
    fn run_checked<I, S>(&self, label: &str, args: I) -> Result<String, RepoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        checked_stdout(label, self.run(label, args)?)
    }
}

fn checked_stdout(label: &str, output: Output) -> Result<String, RepoError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RepoError::CommandFailed {
            command: label.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| RepoError::InvalidUtf8 {
        command: label.to_string(),
        message: e.to_string(),
    })
}

fn path_args<'a>(prefix: &[&'a str], paths: &'a [String]) -> Vec<&'a str> {
    let mut args = prefix.to_vec();
    args.push("--");
    args.extend(paths.iter().map(String::as_str));
    args
}

impl Repository for GitCli {
    fn root(&self) -> &Path {
        &self.root
    }

    fn apply_patch(&self, patch: &Path, options: ApplyOptions) -> Result<ApplyOutcome, RepoError> {
        let mut args: Vec<&OsStr> = vec![OsStr::new("apply"), OsStr::new("--whitespace=nowarn")];
        if options.cached {
            args.push(OsStr::new("--cached"));
        }
        if options.reverse {
            args.push(OsStr::new("--reverse"));
        }
        args.push(patch.as_os_str());

        let output = self.run("apply", args)?;
        Ok(ApplyOutcome {
            exit_code: output.status.code(),
            diagnostic: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn add_to_index(&self, paths: PathSpec<'_>) -> Result<(), RepoError> {
        match paths {
            PathSpec::Paths(paths) => self.run_checked("add", path_args(&["add"], paths))?,
            PathSpec::All => self.run_checked("add", ["add", "--all"])?,
        };
        Ok(())
    }

    fn reset_index(&self, paths: PathSpec<'_>) -> Result<(), RepoError> {
        match paths {
            PathSpec::Paths(paths) => {
                self.run_checked("reset", path_args(&["reset", "-q"], paths))?
            }
            PathSpec::All => self.run_checked("reset", ["reset", "-q"])?,
        };
        Ok(())
    }

    fn restore_from_head(&self, path: &str, target: RestoreTarget) -> Result<(), RepoError> {
        let mut args = vec!["restore", "--source=HEAD"];
        if target.staged {
            args.push("--staged");
        }
        if target.worktree {
            args.push("--worktree");
        }
        args.extend(["--", path]);
        self.run_checked("restore", args)?;
        Ok(())
    }

    fn checkout_from_head(&self, path: &str) -> Result<(), RepoError> {
        self.run_checked("checkout", ["checkout", "HEAD", "--", path])?;
        Ok(())
    }

    fn diff(&self, path: &str, staged: bool) -> Result<String, RepoError> {
        // Patches are applied with the default -p1, so pin the a/ b/ prefixes
        let mut args = vec![
            "diff",
            "--no-ext-diff",
            "--no-color",
            "--src-prefix=a/",
            "--dst-prefix=b/",
        ];
        if staged {
            args.push("--cached");
        }
        args.extend(["--", path]);
        self.run_checked("diff", args)
    }

    fn refresh_status(&self) -> Result<(), RepoError> {
        // With -q, stale entries are not an error; a nonzero exit is a real failure
        self.run_checked("update-index", ["update-index", "-q", "--refresh"])?;
        self.listeners.notify();
        Ok(())
    }

    fn status(&self) -> Result<StatusView, RepoError> {
        let output = self.run_checked(
            "status",
            ["status", "--porcelain=v1", "-z", "--untracked-files=all"],
        )?;
        Ok(StatusView::parse(&output))
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}
