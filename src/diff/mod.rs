pub mod document;
pub mod hunk;

pub use document::DiffDocument;
pub use hunk::{Hunk, HunkRange, parse_hunk_marker};

/// Format a document's hunks for display, one line per hunk with its index
pub fn format_document(doc: &DiffDocument) -> String {
    let mut lines = vec![format!("{}:", doc.file_path)];

    for hunk in &doc.hunks {
        lines.push(format!(
            "[{}] {}  (+{} -{})",
            hunk.index,
            hunk.header_line.trim_end(),
            hunk.added(),
            hunk.removed()
        ));
    }

    if doc.hunks.is_empty() {
        lines.push("(no hunks)".to_string());
    }

    lines.join("\n")
}
