//! Unified diffs for create/edit proposals.

use similar::TextDiff;
use std::path::Path;

const CONTEXT_RADIUS: usize = 3;

/// Diff of a brand-new file against nothing.
pub fn create_diff(content: &str) -> String {
    TextDiff::from_lines("", content)
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header("Empty file", "New file content")
        .to_string()
}

/// Diff of proposed content against what is on disk.
pub fn edit_diff(original: &str, modified: &str) -> String {
    TextDiff::from_lines(original, modified)
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header("Original content", "Modified content")
        .to_string()
}

/// Preview for an edit of `path` (already resolved against the workspace).
///
/// A missing file produces a warning line instead of a diff.
pub async fn edit_preview(path: &Path, display_path: &str, modified: &str) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(original) => edit_diff(&original, modified),
        Err(_) => format!("File {} does not exist for editing", display_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_diff_adds_every_line() {
        let diff = create_diff("one\ntwo\n");
        assert!(diff.starts_with("--- Empty file\n+++ New file content\n"));
        assert!(diff.contains("+one\n"));
        assert!(diff.contains("+two\n"));
    }

    #[test]
    fn test_edit_diff_shows_change() {
        let diff = edit_diff("a\nb\nc\n", "a\nB\nc\n");
        assert!(diff.starts_with("--- Original content\n+++ Modified content\n"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+B\n"));
        assert!(diff.contains(" a\n"));
    }

    #[test]
    fn test_identical_content_has_no_hunks() {
        let diff = edit_diff("same\n", "same\n");
        assert!(!diff.contains("@@"));
    }

    #[tokio::test]
    async fn test_edit_preview_missing_file() {
        let temp = TempDir::new().unwrap();
        let preview = edit_preview(&temp.path().join("nope.rs"), "nope.rs", "x").await;
        assert_eq!(preview, "File nope.rs does not exist for editing");
    }

    #[tokio::test]
    async fn test_edit_preview_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "old\n").unwrap();
        let preview = edit_preview(&path, "a.txt", "new\n").await;
        assert!(preview.contains("-old\n"));
        assert!(preview.contains("+new\n"));
    }
}
