use sdk::errors::EngineError;
use std::path::{Component, Path, PathBuf};

/// FileSystemGuard keeps action handlers inside the workspace.
///
/// It maintains a deny list of credential paths and checks paths both before
/// and after canonicalization so a symlink cannot smuggle a handler out of
/// the workspace or into a denied location.
///
/// # Validation Gates
///
/// For paths that exist ([`FileSystemGuard::validate_path`]):
/// 1. Check deny list before canonicalization
/// 2. Canonicalize path to resolve symlinks and .. patterns
/// 3. Check deny list after canonicalization
/// 4. Verify path is within workspace
///
/// Paths that do not exist yet ([`FileSystemGuard::validate_new_path`]) run
/// the same gates against their nearest existing ancestor.
#[derive(Debug, Clone)]
pub struct FileSystemGuard {
    workspace: PathBuf,
    deny_list: Vec<PathBuf>,
}

impl FileSystemGuard {
    /// Creates a new FileSystemGuard rooted at `workspace`.
    ///
    /// The deny list includes common credential paths:
    /// - .ssh, .gnupg (keys)
    /// - .env (environment variables)
    /// - .aws/credentials, .config/gcloud, .kube/config (cloud credentials)
    /// - id_rsa, id_ed25519, id_dsa (SSH private keys)
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathCanonicalization` if the workspace does not exist.
    pub fn new(workspace: PathBuf) -> Result<Self, EngineError> {
        // Canonicalize workspace to handle symlinks (e.g., /var -> /private/var on macOS)
        let workspace = workspace
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(workspace.clone(), e.to_string()))?;

        let deny_list = vec![
            PathBuf::from(".ssh"),
            PathBuf::from(".env"),
            PathBuf::from(".aws/credentials"),
            PathBuf::from(".config/gcloud"),
            PathBuf::from("id_rsa"),
            PathBuf::from("id_ed25519"),
            PathBuf::from("id_dsa"),
            PathBuf::from(".gnupg"),
            PathBuf::from(".kube/config"),
            PathBuf::from("credentials"),
            PathBuf::from("private_key"),
            PathBuf::from(".pypirc"),
        ];

        Ok(Self {
            workspace,
            deny_list,
        })
    }

    /// Resolve a path as the model wrote it against the workspace.
    ///
    /// Relative paths are joined onto the workspace; absolute paths are kept.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Validates an existing path through the four gates.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathDenied` if the path matches the deny list.
    /// Returns `EngineError::PathCanonicalization` if canonicalization fails.
    /// Returns `EngineError::PathOutsideWorkspace` if the path is outside workspace.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, EngineError> {
        // Gate 1: Check deny list before canonicalization
        if self.is_denied(path) {
            return Err(EngineError::PathDenied(path.to_path_buf()));
        }

        // Gate 2: Canonicalize to resolve symlinks and .. patterns
        let canonical = path
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(path.to_path_buf(), e.to_string()))?;

        // Gate 3: Check deny list after canonicalization (catches symlink bypasses)
        if self.is_denied(&canonical) {
            return Err(EngineError::PathDenied(canonical));
        }

        // Gate 4: Verify within workspace
        if !canonical.starts_with(&self.workspace) {
            return Err(EngineError::PathOutsideWorkspace(canonical));
        }

        Ok(canonical)
    }

    /// Validates a path that may not exist yet (create and move targets).
    ///
    /// The nearest existing ancestor is validated, then the missing tail is
    /// re-attached. A tail containing `..` is rejected outright.
    pub fn validate_new_path(&self, path: &Path) -> Result<PathBuf, EngineError> {
        if path.exists() {
            return self.validate_path(path);
        }

        if self.is_denied(path) {
            return Err(EngineError::PathDenied(path.to_path_buf()));
        }

        let mut ancestor = path;
        let mut tail = Vec::new();
        while !ancestor.exists() {
            let name = ancestor
                .file_name()
                .ok_or_else(|| EngineError::PathOutsideWorkspace(path.to_path_buf()))?;
            tail.push(name.to_os_string());
            ancestor = ancestor
                .parent()
                .ok_or_else(|| EngineError::PathOutsideWorkspace(path.to_path_buf()))?;
        }

        if path
            .strip_prefix(ancestor)
            .map(|rest| rest.components().any(|c| c == Component::ParentDir))
            .unwrap_or(true)
        {
            return Err(EngineError::PathOutsideWorkspace(path.to_path_buf()));
        }

        let mut resolved = self.validate_path(ancestor)?;
        for name in tail.iter().rev() {
            resolved.push(name);
        }
        Ok(resolved)
    }

    /// Checks if a path matches any entry in the deny list.
    ///
    /// This catches patterns like:
    /// - `/home/user/.ssh/id_rsa` (ends with denied path)
    /// - `/tmp/.env` (contains denied component)
    fn is_denied(&self, path: &Path) -> bool {
        self.deny_list.iter().any(|denied| {
            path.ends_with(denied)
                || path.components().any(|c| {
                    c.as_os_str()
                        .to_str()
                        .is_some_and(|os_str| denied.as_os_str().to_str() == Some(os_str))
                })
        })
    }

    /// Returns a reference to the workspace path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Render a path relative to the workspace for notes and messages.
    pub fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.workspace)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_deny_list_before_canonicalization() {
        let temp = TempDir::new().unwrap();
        let guard = FileSystemGuard::new(temp.path().to_path_buf()).unwrap();

        let result = guard.validate_path(&temp.path().join(".ssh"));
        assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_deny_list_after_canonicalization() {
        let temp = TempDir::new().unwrap();
        let ssh_dir = temp.path().join(".ssh");
        fs::create_dir(&ssh_dir).unwrap();

        let guard = FileSystemGuard::new(temp.path().to_path_buf()).unwrap();
        let symlink_path = temp.path().join("safe_link");
        std::os::unix::fs::symlink(&ssh_dir, &symlink_path).unwrap();

        let result = guard.validate_path(&symlink_path);
        assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
    }

    #[test]
    fn test_path_outside_workspace() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        fs::create_dir(&workspace).unwrap();
        let guard = FileSystemGuard::new(workspace).unwrap();

        let outside_path = temp.path().join("outside.txt");
        fs::write(&outside_path, "test").unwrap();

        let result = guard.validate_path(&outside_path);
        assert!(matches!(
            result.unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
    }

    #[test]
    fn test_path_traversal_attempt() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        fs::create_dir(&workspace).unwrap();
        let guard = FileSystemGuard::new(workspace).unwrap();

        fs::write(temp.path().join("secret.txt"), "secret").unwrap();

        let result = guard.validate_path(&guard.resolve("../secret.txt"));
        assert!(matches!(
            result.unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
    }

    #[test]
    fn test_new_path_inside_workspace() {
        let temp = TempDir::new().unwrap();
        let guard = FileSystemGuard::new(temp.path().to_path_buf()).unwrap();

        let resolved = guard
            .validate_new_path(&guard.resolve("src/new/module.rs"))
            .unwrap();
        assert!(resolved.starts_with(guard.workspace()));
        assert!(resolved.ends_with("src/new/module.rs"));
    }

    #[test]
    fn test_new_path_with_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        fs::create_dir(&workspace).unwrap();
        let guard = FileSystemGuard::new(workspace).unwrap();

        let result = guard.validate_new_path(&guard.resolve("missing/../../escape.txt"));
        assert!(matches!(
            result.unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
    }

    #[test]
    fn test_new_denied_path_rejected() {
        let temp = TempDir::new().unwrap();
        let guard = FileSystemGuard::new(temp.path().to_path_buf()).unwrap();

        let result = guard.validate_new_path(&guard.resolve("config/.env"));
        assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
    }

    #[test]
    fn test_display_is_workspace_relative() {
        let temp = TempDir::new().unwrap();
        let guard = FileSystemGuard::new(temp.path().to_path_buf()).unwrap();
        let path = guard.workspace().join("src").join("lib.rs");
        assert_eq!(guard.display(&path), "src/lib.rs");
    }
}
