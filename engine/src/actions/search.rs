//! SEARCH_FILES: find files by glob pattern and/or content.
//!
//! Parameters come from the action's `code` as `{"pattern": .., "content": ..}`.
//! Plain text in `code` is a content search; with no `code` at all the
//! instruction itself is searched for.

use async_trait::async_trait;
use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::{Action, ActionKind, HandlerResult};
use serde::Deserialize;
use std::path::Path;
use walkdir::WalkDir;

use super::{ActionHandler, Classification};
use crate::fs_guard::FileSystemGuard;

/// Matching lines shown per file
const MAX_MATCHES_SHOWN: usize = 5;

/// Files listed when searching by pattern only
const MAX_FILES_LISTED: usize = 200;

const IGNORED_DIRS: [&str; 4] = ["node_modules", "dist", ".git", "target"];

const BINARY_EXTENSIONS: [&str; 24] = [
    "png", "jpg", "jpeg", "gif", "bmp", "tiff", "ico", "pdf", "zip", "tar", "gz", "7z", "rar",
    "exe", "dll", "so", "dylib", "bin", "dat", "db", "sqlite", "class", "jar", "war",
];

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct SearchParams {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl SearchParams {
    /// Work out what to search for from an action.
    pub fn from_action(action: &Action) -> Self {
        let params = match action.generated_content.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => serde_json::from_str::<SearchParams>(code)
                .unwrap_or_else(|_| SearchParams {
                    pattern: None,
                    content: Some(code.to_string()),
                }),
            _ => SearchParams {
                pattern: None,
                content: Some(action.instruction.trim().to_string()),
            },
        };

        SearchParams {
            pattern: params.pattern.filter(|p| !p.trim().is_empty()),
            content: params.content.filter(|c| !c.is_empty()),
        }
    }

    fn is_empty(&self) -> bool {
        self.pattern.is_none() && self.content.is_none()
    }
}

#[derive(Debug)]
struct FileMatches {
    file: String,
    lines: Vec<(usize, String)>,
}

/// Translate a glob into an anchored regex over `/`-separated relative paths.
///
/// `**/` matches any number of directories, `*` and `?` stay within one
/// path segment. `{a,b}` picks one alternative and `[abc]`, `[a-z]` or
/// `[!abc]` match a single character. An unclosed `[` is taken literally.
pub fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let chars: Vec<char> = glob.chars().collect();
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => {
                depth += 1;
                out.push_str("(?:");
            }
            ',' if depth > 0 => out.push('|'),
            '}' if depth > 0 => {
                depth -= 1;
                out.push(')');
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&char_class(&chars[i + 1..end]));
                    i = end + 1;
                    continue;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    Regex::new(&out)
}

/// Index of the `]` closing the class opened at `start`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!') | Some('^')) {
        j += 1;
    }
    // A `]` right after the opening is part of the set.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}

fn char_class(body: &[char]) -> String {
    let (negated, body) = match body.first() {
        Some('!') | Some('^') => (true, &body[1..]),
        _ => (false, body),
    };
    let mut out = String::from(if negated { "[^/" } else { "[" });
    for (k, c) in body.iter().enumerate() {
        if *c == '-' && k > 0 && k + 1 < body.len() {
            out.push('-');
        } else {
            out.push_str(&regex::escape(&c.to_string()));
        }
    }
    out.push(']');
    out
}

fn is_binary(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| BINARY_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn search(root: &Path, params: &SearchParams) -> Result<Vec<FileMatches>, EngineError> {
    let pattern = params.pattern.as_deref().unwrap_or("**/*");
    let matcher = glob_to_regex(pattern)
        .map_err(|e| EngineError::Handler(format!("Invalid search pattern '{}': {}", pattern, e)))?;

    let mut results = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry
                .file_name()
                .to_str()
                .is_some_and(|name| IGNORED_DIRS.contains(&name))
    });

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if !matcher.is_match(&relative) {
            continue;
        }

        match &params.content {
            None => results.push(FileMatches {
                file: relative,
                lines: Vec::new(),
            }),
            Some(needle) => {
                if is_binary(entry.path()) {
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                let lines: Vec<(usize, String)> = text
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| line.contains(needle.as_str()))
                    .map(|(i, line)| (i + 1, line.trim().to_string()))
                    .collect();
                if !lines.is_empty() {
                    results.push(FileMatches {
                        file: relative,
                        lines,
                    });
                }
            }
        }
    }

    results.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(results)
}

fn format_results(results: &[FileMatches]) -> String {
    if results.is_empty() {
        return "No matching files found.".to_string();
    }

    let mut output = format!("Found {} matching file(s):\n\n", results.len());
    for result in results.iter().take(MAX_FILES_LISTED) {
        output.push_str(&format!("File: {}\n", result.file));
        if !result.lines.is_empty() {
            output.push_str(&format!("Matches ({}):\n", result.lines.len()));
            for (line, text) in result.lines.iter().take(MAX_MATCHES_SHOWN) {
                output.push_str(&format!("  Line {}: {}\n", line, text));
            }
            if result.lines.len() > MAX_MATCHES_SHOWN {
                output.push_str(&format!(
                    "  ... and {} more matches\n",
                    result.lines.len() - MAX_MATCHES_SHOWN
                ));
            }
            output.push('\n');
        }
    }
    if results.len() > MAX_FILES_LISTED {
        output.push_str(&format!(
            "... and {} more files\n",
            results.len() - MAX_FILES_LISTED
        ));
    }
    output
}

pub struct SearchFilesHandler {
    guard: FileSystemGuard,
}

impl SearchFilesHandler {
    pub fn new(guard: FileSystemGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ActionHandler for SearchFilesHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::SearchFiles
    }

    fn classification(&self) -> Classification {
        Classification::ReadOnly
    }

    fn description(&self) -> &'static str {
        "Search the workspace. code is JSON {\"pattern\": glob, \"content\": text}; either may be omitted."
    }

    async fn execute(&self, action: &Action) -> Result<HandlerResult, EngineError> {
        let mut context = action.context.clone();
        let params = SearchParams::from_action(action);

        if params.is_empty() {
            return Ok(HandlerResult::failure(context, "Search criteria not provided"));
        }

        let root = self.guard.workspace().to_path_buf();
        let pattern = params.pattern.clone();
        let content = params.content.clone();
        let results = tokio::task::spawn_blocking(move || search(&root, &params))
            .await
            .map_err(|e| EngineError::Handler(format!("Search task failed: {}", e)))??;

        tracing::debug!(
            "Search pattern={:?} content={:?} matched {} files",
            pattern,
            content,
            results.len()
        );

        let report = format_results(&results);
        context.push_note(format!(
            "Searched for files with pattern '{}' containing '{}'",
            pattern.as_deref().unwrap_or("**/*"),
            content.as_deref().unwrap_or("")
        ));
        context.push_note(report.clone());

        Ok(HandlerResult::success(context, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::EpisodeContext;
    use std::fs;
    use tempfile::TempDir;

    fn action(prompt: &str, code: Option<&str>) -> Action {
        Action {
            kind: ActionKind::SearchFiles,
            target_path: String::new(),
            instruction: prompt.to_string(),
            generated_content: code.map(String::from),
            external_request: None,
            context: EpisodeContext::default(),
        }
    }

    fn workspace() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/nested")).unwrap();
        fs::create_dir_all(temp.path().join("node_modules/dep")).unwrap();
        fs::write(temp.path().join("src/main.ts"), "import x\nconst TODO = 1\n").unwrap();
        fs::write(temp.path().join("src/nested/util.ts"), "// TODO later\n").unwrap();
        fs::write(temp.path().join("README.md"), "TODO docs\n").unwrap();
        fs::write(temp.path().join("node_modules/dep/index.ts"), "TODO\n").unwrap();
        fs::write(temp.path().join("logo.png"), "TODO").unwrap();
        temp
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("**/*.ts").unwrap();
        assert!(re.is_match("main.ts"));
        assert!(re.is_match("src/nested/util.ts"));
        assert!(!re.is_match("main.rs"));

        let re = glob_to_regex("src/*.ts").unwrap();
        assert!(re.is_match("src/main.ts"));
        assert!(!re.is_match("src/nested/util.ts"));

        let re = glob_to_regex("file?.txt").unwrap();
        assert!(re.is_match("file1.txt"));
        assert!(!re.is_match("file10.txt"));
    }

    #[test]
    fn test_glob_braces_and_classes() {
        let re = glob_to_regex("src/**/*.{ts,tsx}").unwrap();
        assert!(re.is_match("src/app.ts"));
        assert!(re.is_match("src/components/Button.tsx"));
        assert!(!re.is_match("src/app.js"));

        let re = glob_to_regex("log[0-9].txt").unwrap();
        assert!(re.is_match("log7.txt"));
        assert!(!re.is_match("logx.txt"));

        let re = glob_to_regex("[!._]*.md").unwrap();
        assert!(re.is_match("README.md"));
        assert!(!re.is_match("_draft.md"));
        assert!(!re.is_match("dir/README.md"));

        let re = glob_to_regex("weird[name").unwrap();
        assert!(re.is_match("weird[name"));

        assert!(glob_to_regex("*.{ts").is_err());
    }

    #[test]
    fn test_params_from_json_code() {
        let params = SearchParams::from_action(&action(
            "find todos",
            Some(r#"{"pattern": "**/*.ts", "content": "TODO"}"#),
        ));
        assert_eq!(params.pattern.as_deref(), Some("**/*.ts"));
        assert_eq!(params.content.as_deref(), Some("TODO"));
    }

    #[test]
    fn test_params_fall_back_to_prompt() {
        let params = SearchParams::from_action(&action("useState", None));
        assert_eq!(params.pattern, None);
        assert_eq!(params.content.as_deref(), Some("useState"));

        let params = SearchParams::from_action(&action("ignored", Some("plain text")));
        assert_eq!(params.content.as_deref(), Some("plain text"));
    }

    #[tokio::test]
    async fn test_content_search_skips_ignored_and_binary() {
        let temp = workspace();
        let handler = SearchFilesHandler::new(FileSystemGuard::new(temp.path().to_path_buf()).unwrap());
        let result = handler
            .execute(&action("", Some(r#"{"content": "TODO"}"#)))
            .await
            .unwrap();

        assert!(result.success);
        let message = result.message.unwrap();
        assert!(message.starts_with("Found 3 matching file(s)"));
        assert!(message.contains("File: src/main.ts"));
        assert!(message.contains("  Line 2: const TODO = 1"));
        assert!(!message.contains("node_modules"));
        assert!(!message.contains("logo.png"));
    }

    #[tokio::test]
    async fn test_pattern_only_search_lists_files() {
        let temp = workspace();
        let handler = SearchFilesHandler::new(FileSystemGuard::new(temp.path().to_path_buf()).unwrap());
        let result = handler
            .execute(&action("", Some(r#"{"pattern": "src/**/*.ts"}"#)))
            .await
            .unwrap();

        let message = result.message.unwrap();
        assert!(message.contains("File: src/main.ts"));
        assert!(message.contains("File: src/nested/util.ts"));
        assert!(!message.contains("README.md"));
    }

    #[tokio::test]
    async fn test_empty_criteria_fails() {
        let temp = workspace();
        let handler = SearchFilesHandler::new(FileSystemGuard::new(temp.path().to_path_buf()).unwrap());
        let result = handler.execute(&action("   ", None)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Search criteria not provided"));
    }

    #[test]
    fn test_format_caps_matches_per_file() {
        let results = vec![FileMatches {
            file: "a.txt".to_string(),
            lines: (1..=8).map(|i| (i, format!("hit {}", i))).collect(),
        }];
        let output = format_results(&results);
        assert!(output.contains("  Line 5: hit 5"));
        assert!(!output.contains("  Line 6: hit 6"));
        assert!(output.contains("... and 3 more matches"));
    }
}
