use crate::diff::Hunk;

/// Build a patch from a diff header and a selection of its hunks.
///
/// The header and each hunk's content are emitted in order, one newline
/// between them and a single newline at the end. Hunks are copied verbatim:
/// no line numbers are rewritten, so a subset carries the same ranges it had
/// in the full diff.
///
/// # Examples
///
/// ```
/// use git_hunks::diff::DiffDocument;
/// use git_hunks::patch::build_patch;
///
/// let text = "diff --git a/f b/f\n@@ -1,2 +1,3 @@\n a\n+b\n c\n";
/// let doc = DiffDocument::parse(text, None).unwrap();
/// assert_eq!(build_patch(&doc.header, &doc.hunks), text);
/// ```
pub fn build_patch<'a, I>(header: &str, hunks: I) -> String
where
    I: IntoIterator<Item = &'a Hunk>,
{
    let mut patch = String::new();

    if !header.is_empty() {
        patch.push_str(header.strip_suffix('\n').unwrap_or(header));
        patch.push('\n');
    }

    for hunk in hunks {
        // Content is newline terminated; strip it so segments join cleanly
        patch.push_str(hunk.content.strip_suffix('\n').unwrap_or(&hunk.content));
        patch.push('\n');
    }

    patch
}
