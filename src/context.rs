//! Activation context.
//!
//! A [`Context`] is the ephemeral value a behavior's `when` predicate is
//! evaluated against. It is derived deterministically from whatever
//! signals the caller supplies per invocation (a file path, a task
//! description, environment hints) — the same signals always produce the
//! same context.

use crate::sanitize::{sanitize_path, sanitize_text};
use serde::{Deserialize, Serialize};

/// The context a behavior is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Path of the file being worked on, if any.
    pub file_path: Option<String>,
    /// Language inferred from the file extension.
    pub file_language: Option<String>,
    /// File extension without the leading dot.
    pub file_ext: Option<String>,
    /// Free-text description of the current task.
    pub task: Option<String>,
    /// Current VCS branch.
    pub branch: Option<String>,
    /// Execution environment (e.g. "ci", "local").
    pub environment: Option<String>,
    /// Repository root, when known.
    pub repo_root: Option<String>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context from raw caller-supplied signals.
    ///
    /// Path and task are sanitized; extension and language are inferred
    /// from the path. Empty strings are treated as absent.
    pub fn from_signals(
        file: Option<&str>,
        task: Option<&str>,
        branch: Option<&str>,
        environment: Option<&str>,
        repo_root: Option<&str>,
    ) -> Self {
        let file_path = file
            .map(sanitize_path)
            .filter(|p| !p.is_empty());
        let file_ext = file_path.as_deref().and_then(extension_of);
        let file_language = file_ext.as_deref().and_then(language_for_ext);

        Self {
            file_path,
            file_language: file_language.map(str::to_string),
            file_ext,
            task: task.map(sanitize_text).filter(|t| !t.is_empty()),
            branch: branch.map(sanitize_text).filter(|b| !b.is_empty()),
            environment: environment.map(sanitize_text).filter(|e| !e.is_empty()),
            repo_root: repo_root.map(sanitize_path).filter(|r| !r.is_empty()),
        }
    }

    pub fn with_file(mut self, path: impl AsRef<str>) -> Self {
        let sanitized = sanitize_path(path.as_ref());
        self.file_ext = extension_of(&sanitized);
        self.file_language = self
            .file_ext
            .as_deref()
            .and_then(language_for_ext)
            .map(str::to_string);
        self.file_path = Some(sanitized);
        self
    }

    pub fn with_task(mut self, task: impl AsRef<str>) -> Self {
        self.task = Some(sanitize_text(task.as_ref()));
        self
    }

    pub fn with_branch(mut self, branch: impl AsRef<str>) -> Self {
        self.branch = Some(sanitize_text(branch.as_ref()));
        self
    }

    pub fn with_environment(mut self, environment: impl AsRef<str>) -> Self {
        self.environment = Some(sanitize_text(environment.as_ref()));
        self
    }

    /// Look up a condition key as used in behavior `when` predicates.
    ///
    /// `language` is accepted as an alias for `file_language`.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "file_path" => self.file_path.as_deref(),
            "language" | "file_language" => self.file_language.as_deref(),
            "file_ext" => self.file_ext.as_deref(),
            "task" => self.task.as_deref(),
            "branch" => self.branch.as_deref(),
            "environment" => self.environment.as_deref(),
            "repo_root" => self.repo_root.as_deref(),
            _ => None,
        }
    }

    /// Whether any signal is present at all.
    pub fn is_empty(&self) -> bool {
        self.file_path.is_none()
            && self.task.is_none()
            && self.branch.is_none()
            && self.environment.is_none()
            && self.repo_root.is_none()
    }
}

fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Extension → language table. Kept small and stable: the values become
/// `when.language` keys in persisted behaviors.
fn language_for_ext(ext: &str) -> Option<&'static str> {
    let language = match ext {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "rb" => "ruby",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "php" => "php",
        "sh" | "bash" | "zsh" => "shell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" | "scss" => "css",
        "md" => "markdown",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "json" => "json",
        _ => return None,
    };
    Some(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_signals_derives_language() {
        let ctx = Context::from_signals(Some("src/script.py"), Some("testing"), None, None, None);
        assert_eq!(ctx.file_ext.as_deref(), Some("py"));
        assert_eq!(ctx.file_language.as_deref(), Some("python"));
        assert_eq!(ctx.task.as_deref(), Some("testing"));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = Context::from_signals(Some("a/b.rs"), Some("fix"), None, Some("ci"), None);
        let b = Context::from_signals(Some("a/b.rs"), Some("fix"), None, Some("ci"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_signals_are_absent() {
        let ctx = Context::from_signals(Some(""), Some("  "), None, None, None);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_get_language_alias() {
        let ctx = Context::new().with_file("main.go");
        assert_eq!(ctx.get("language"), Some("go"));
        assert_eq!(ctx.get("file_language"), Some("go"));
    }

    #[test]
    fn test_hidden_file_has_no_extension() {
        assert_eq!(extension_of(".gitignore"), None);
        assert_eq!(extension_of("src/lib.rs"), Some("rs".to_string()));
    }

    #[test]
    fn test_unknown_extension() {
        let ctx = Context::new().with_file("data.xyz");
        assert_eq!(ctx.file_ext.as_deref(), Some("xyz"));
        assert!(ctx.file_language.is_none());
    }
}
