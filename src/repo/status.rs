//! Working tree status as shown to the user: staged and unstaged entries.
//!
//! Parsed from `git status --porcelain=v1 -z --untracked-files=all`. Each
//! record is `XY <path>` terminated by NUL; renames and copies are followed
//! by one more NUL-terminated record holding the origin path.

use std::fmt;

/// Kind of change recorded for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Untracked,
    Unmerged,
}

impl FileStatus {
    fn from_code(code: char) -> Option<Self> {
        match code {
            'M' => Some(FileStatus::Modified),
            'A' => Some(FileStatus::Added),
            'D' => Some(FileStatus::Deleted),
            'R' => Some(FileStatus::Renamed),
            'C' => Some(FileStatus::Copied),
            'T' => Some(FileStatus::TypeChanged),
            '?' => Some(FileStatus::Untracked),
            'U' => Some(FileStatus::Unmerged),
            _ => None,
        }
    }

    /// The file has no committed version to go back to.
    pub fn is_new(self) -> bool {
        matches!(self, FileStatus::Untracked | FileStatus::Added)
    }

    pub fn code(self) -> char {
        match self {
            FileStatus::Modified => 'M',
            FileStatus::Added => 'A',
            FileStatus::Deleted => 'D',
            FileStatus::Renamed => 'R',
            FileStatus::Copied => 'C',
            FileStatus::TypeChanged => 'T',
            FileStatus::Untracked => '?',
            FileStatus::Unmerged => 'U',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    /// Source path of a rename or copy
    pub origin: Option<String>,
    pub status: FileStatus,
}

/// View model published after every refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusView {
    pub staged: Vec<FileEntry>,
    pub unstaged: Vec<FileEntry>,
}

impl StatusView {
    /// Parse NUL-separated porcelain v1 output.
    pub fn parse(output: &str) -> Self {
        let mut view = StatusView::default();
        let mut records = output.split('\0').filter(|r| !r.is_empty());

        while let Some(record) = records.next() {
            let mut chars = record.chars();
            let (Some(x), Some(y)) = (chars.next(), chars.next()) else {
                continue;
            };
            let Some(path) = record.get(3..).filter(|p| !p.is_empty()) else {
                continue;
            };

            let origin = if matches!(x, 'R' | 'C') || matches!(y, 'R' | 'C') {
                records.next().map(str::to_string)
            } else {
                None
            };

            match (x, y) {
                ('!', '!') => {}
                ('?', '?') => view.unstaged.push(FileEntry {
                    path: path.to_string(),
                    origin: None,
                    status: FileStatus::Untracked,
                }),
                _ if is_unmerged(x, y) => view.unstaged.push(FileEntry {
                    path: path.to_string(),
                    origin: None,
                    status: FileStatus::Unmerged,
                }),
                _ => {
                    if let Some(status) = FileStatus::from_code(x) {
                        view.staged.push(FileEntry {
                            path: path.to_string(),
                            origin: origin.clone(),
                            status,
                        });
                    }
                    if let Some(status) = FileStatus::from_code(y) {
                        view.unstaged.push(FileEntry {
                            path: path.to_string(),
                            origin,
                            status,
                        });
                    }
                }
            }
        }

        view
    }

    /// Find the unstaged entry for a path
    pub fn unstaged_entry(&self, path: &str) -> Option<&FileEntry> {
        self.unstaged.iter().find(|entry| entry.path == path)
    }

    pub fn staged_entry(&self, path: &str) -> Option<&FileEntry> {
        self.staged.iter().find(|entry| entry.path == path)
    }

    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty()
    }
}

fn is_unmerged(x: char, y: char) -> bool {
    matches!(
        (x, y),
        ('D', 'D') | ('A', 'U') | ('U', 'D') | ('U', 'A') | ('D', 'U') | ('A', 'A') | ('U', 'U')
    )
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "nothing to commit, working tree clean");
        }

        let sections = [("Staged", &self.staged), ("Unstaged", &self.unstaged)];
        let mut first = true;
        for (title, entries) in sections {
            if entries.is_empty() {
                continue;
            }
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{title}:")?;
            for entry in entries {
                write!(f, "\n  {} {}", entry.status.code(), entry.path)?;
                if let Some(origin) = &entry.origin {
                    write!(f, " (from {origin})")?;
                }
            }
        }
        Ok(())
    }
}
