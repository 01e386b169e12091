use super::hunk::{Hunk, HunkRange, parse_hunk_marker};

const DIFF_MARKER: &str = "diff --git ";

/// A parsed single-file unified diff.
///
/// `header` holds every line before the first hunk marker (`diff --git`,
/// mode and index lines, `---`/`+++`), joined without a trailing newline.
/// Hunks keep their source order and are indexed densely from 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDocument {
    pub header: String,
    pub file_path: String,
    pub hunks: Vec<Hunk>,
}

/// Scanner position while walking the diff text
enum Scan<'a> {
    /// No hunk marker seen yet; lines belong to the header
    Header,
    /// Inside a hunk; every line belongs to it until the next marker
    InHunk(OpenHunk<'a>),
}

struct OpenHunk<'a> {
    range: HunkRange,
    lines: Vec<&'a str>,
}

impl<'a> OpenHunk<'a> {
    fn start(range: HunkRange, marker: &'a str) -> Self {
        OpenHunk {
            range,
            lines: vec![marker],
        }
    }

    fn finish(self, index: usize) -> Hunk {
        Hunk::from_lines(index, self.range, &self.lines)
    }
}

impl DiffDocument {
    /// Parse the unified diff of a single file.
    ///
    /// The path comes from the first `diff --git a/<path> b/<path>` header
    /// line; `fallback_path` is used when there is none or it cannot be read.
    ///
    /// Returns `None` only for empty or whitespace-only input. Text without
    /// any hunk marker still yields a document with an empty hunk list.
    ///
    /// # Examples
    ///
    /// ```
    /// use git_hunks::diff::DiffDocument;
    ///
    /// let doc = DiffDocument::parse("diff --git a/f b/f\n@@ -1,2 +1,3 @@\n a\n+b\n c\n", None).unwrap();
    /// assert_eq!(doc.file_path, "f");
    /// assert_eq!(doc.hunks.len(), 1);
    /// assert_eq!(doc.hunks[0].new_start, 1);
    /// assert_eq!(doc.hunks[0].new_count, 3);
    /// ```
    #[must_use]
    pub fn parse(text: &str, fallback_path: Option<&str>) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }

        let mut header_lines = Vec::new();
        let mut hunks = Vec::new();
        let mut scan = Scan::Header;

        for line in text.split_terminator('\n') {
            let marker = parse_hunk_marker(line);
            scan = match (scan, marker) {
                (Scan::Header, None) => {
                    header_lines.push(line);
                    Scan::Header
                }
                (Scan::Header, Some(range)) => Scan::InHunk(OpenHunk::start(range, line)),
                (Scan::InHunk(mut open), None) => {
                    open.lines.push(line);
                    Scan::InHunk(open)
                }
                (Scan::InHunk(open), Some(range)) => {
                    hunks.push(open.finish(hunks.len()));
                    Scan::InHunk(OpenHunk::start(range, line))
                }
            };
        }

        if let Scan::InHunk(open) = scan {
            hunks.push(open.finish(hunks.len()));
        }

        let file_path = header_lines
            .iter()
            .find(|line| line.starts_with(DIFF_MARKER))
            .and_then(|line| path_from_diff_line(line))
            .or_else(|| fallback_path.map(str::to_string))
            .unwrap_or_default();

        Some(DiffDocument {
            header: header_lines.join("\n"),
            file_path,
            hunks,
        })
    }

    /// Look up a hunk by the index assigned during parsing.
    pub fn hunk(&self, index: usize) -> Option<&Hunk> {
        self.hunks.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

/// Extract `<path>` from `diff --git a/<path> b/<path>`.
///
/// Handles paths containing spaces (via the symmetric `a/X b/X` form) and
/// C-quoted paths.
fn path_from_diff_line(line: &str) -> Option<String> {
    let rest = line.strip_prefix(DIFF_MARKER)?.trim_end_matches('\r');

    if rest.starts_with('"') {
        let (quoted, _) = unquote(rest)?;
        return quoted
            .strip_prefix("a/")
            .filter(|p| !p.is_empty())
            .map(str::to_string);
    }

    let rest = rest.strip_prefix("a/")?;

    // Unchanged paths produce "X b/X", so the split point is at the middle
    if rest.len() >= 3 && (rest.len() - 3) % 2 == 0 {
        let mid = (rest.len() - 3) / 2;
        if rest.is_char_boundary(mid)
            && rest.is_char_boundary(mid + 3)
            && &rest[mid..mid + 3] == " b/"
            && rest[..mid] == rest[mid + 3..]
            && mid > 0
        {
            return Some(rest[..mid].to_string());
        }
    }

    rest.find(" b/")
        .map(|end| &rest[..end])
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Decode a leading git C-style quoted string, returning it and the remainder.
fn unquote(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut bytes = Vec::new();
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let decoded = String::from_utf8_lossy(&bytes).into_owned();
                return Some((decoded, &body[i + 1..]));
            }
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => bytes.push(b'\n'),
                    't' => bytes.push(b'\t'),
                    'r' => bytes.push(b'\r'),
                    'a' => bytes.push(0x07),
                    'b' => bytes.push(0x08),
                    'f' => bytes.push(0x0c),
                    'v' => bytes.push(0x0b),
                    '0'..='7' => {
                        let mut value = escaped.to_digit(8)?;
                        for _ in 0..2 {
                            let (_, digit) = chars.next()?;
                            value = value * 8 + digit.to_digit(8)?;
                        }
                        bytes.push(u8::try_from(value).ok()?);
                    }
                    other => {
                        let mut buf = [0u8; 4];
                        bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                    }
                }
            }
            other => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    None
}
