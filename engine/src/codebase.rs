//! Codebase manifest
//!
//! Paths only, never content, so the planner request stays small. Hidden
//! entries, ignored directories, `*.db` files and files above the size limit
//! are left out.

use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::PlannerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub extension: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Codebase {
    pub files: Vec<ManifestEntry>,
}

impl Codebase {
    /// Walk `root` and collect workspace-relative paths, sorted.
    pub fn scan(root: &Path, config: &PlannerConfig) -> Self {
        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.')
                && !config
                    .manifest_ignore
                    .iter()
                    .any(|ignored| ignored.as_str() == name.as_ref())
        });

        let mut files = Vec::new();
        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "db") {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.len() <= config.max_manifest_file_bytes => {}
                _ => continue,
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };

            files.push(ManifestEntry {
                path: relative.to_string_lossy().replace('\\', "/"),
                extension: path
                    .extension()
                    .map(|ext| format!(".{}", ext.to_string_lossy()))
                    .unwrap_or_default(),
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!("Scanned {} files under {}", files.len(), root.display());
        Self { files }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"files\":[]}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> PlannerConfig {
        PlannerConfig {
            max_manifest_file_bytes: 16,
            ..PlannerConfig::default()
        }
    }

    #[test]
    fn test_scan_filters_entries() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("Makefile"), "all:").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join(".env"), "SECRET=1").unwrap();
        fs::write(root.join("data.db"), "x").unwrap();
        fs::write(root.join("big.txt"), "x".repeat(64)).unwrap();

        let codebase = Codebase::scan(root, &config());
        let paths: Vec<&str> = codebase.files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(paths, vec!["Makefile", "src/main.rs"]);
        assert_eq!(codebase.files[1].extension, ".rs");
        assert_eq!(codebase.files[0].extension, "");
    }

    #[test]
    fn test_to_json_has_paths_only() {
        let codebase = Codebase {
            files: vec![ManifestEntry {
                path: "README.md".to_string(),
                extension: ".md".to_string(),
            }],
        };
        assert_eq!(
            codebase.to_json(),
            r#"{"files":[{"path":"README.md","extension":".md"}]}"#
        );
    }
}
