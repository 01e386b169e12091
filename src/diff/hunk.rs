use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::{char, u32 as decimal},
    combinator::{map, opt},
    sequence::preceded,
};
use std::fmt;

/// Line ranges carried by a `@@ -old[,count] +new[,count] @@` marker.
///
/// An omitted count means exactly one line, so `@@ -5 +5 @@` has both counts
/// set to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkRange {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
}

/// A single hunk from a unified diff.
///
/// `content` is the marker line followed by every line of the hunk, always
/// terminated by a newline. Appended to the document header it forms a
/// patch that applies on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// Position in the parsed document, starting at 0
    pub index: usize,
    /// The `@@ ... @@` marker line
    pub header_line: String,
    /// Marker line plus body lines
    pub content: String,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
}

impl Hunk {
    /// Build a hunk from its marker range and raw lines (marker first).
    pub(crate) fn from_lines(index: usize, range: HunkRange, lines: &[&str]) -> Self {
        let header_line = lines.first().copied().unwrap_or_default().to_string();

        let mut content = lines.join("\n");
        content.push('\n');

        Hunk {
            index,
            header_line,
            content,
            old_start: range.old_start,
            old_count: range.old_count,
            new_start: range.new_start,
            new_count: range.new_count,
        }
    }

    pub fn range(&self) -> HunkRange {
        HunkRange {
            old_start: self.old_start,
            old_count: self.old_count,
            new_start: self.new_start,
            new_count: self.new_count,
        }
    }

    /// Body lines, without the marker line.
    pub fn body(&self) -> impl Iterator<Item = &str> {
        self.content.split_terminator('\n').skip(1)
    }

    /// Number of `+` lines in the body
    pub fn added(&self) -> usize {
        self.body().filter(|line| line.starts_with('+')).count()
    }

    /// Number of `-` lines in the body
    pub fn removed(&self) -> usize {
        self.body().filter(|line| line.starts_with('-')).count()
    }

    /// Section heading git prints after the closing `@@`, if any.
    ///
    /// ```
    /// use git_hunks::diff::DiffDocument;
    ///
    /// let doc = DiffDocument::parse("@@ -10 +10 @@ fn main() {\n-a\n+b\n", None).unwrap();
    /// assert_eq!(doc.hunks[0].section(), Some("fn main() {"));
    /// ```
    pub fn section(&self) -> Option<&str> {
        let rest = self.header_line.strip_prefix("@@ ")?;
        let end = rest.find(" @@")?;
        let section = rest[end + 3..].trim();
        (!section.is_empty()).then_some(section)
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// One side of a marker: `-12,3` or `+7`. A missing count defaults to 1.
fn side<'a>(sign: char) -> impl Parser<&'a str, Output = (u32, u32), Error = nom::error::Error<&'a str>>
{
    map(
        (
            preceded(char(sign), decimal),
            opt(preceded(char(','), decimal)),
        ),
        |(start, count)| (start, count.unwrap_or(1)),
    )
}

fn marker(input: &str) -> IResult<&str, HunkRange> {
    map(
        (tag("@@ "), side('-'), char(' '), side('+'), tag(" @@")),
        |(_, (old_start, old_count), _, (new_start, new_count), _)| HunkRange {
            old_start,
            old_count,
            new_start,
            new_count,
        },
    )
    .parse(input)
}

/// Recognize a hunk marker line and extract its ranges.
///
/// Returns `None` for anything that is not a well-formed marker; trailing
/// section text after the closing `@@` is ignored.
pub fn parse_hunk_marker(line: &str) -> Option<HunkRange> {
    marker(line).ok().map(|(_, range)| range)
}
