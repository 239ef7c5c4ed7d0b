//! Semantic tag extraction.
//!
//! A static dictionary maps surface keywords to canonical tags. Tags feed
//! the similarity scorer and the shared-tag edge derivation rule, so the
//! dictionary leans toward coding-agent vocabulary: tools, languages,
//! workflows, and common correction topics.

use std::collections::BTreeSet;
use std::sync::LazyLock;

/// A canonical tag and the lowercase keywords that imply it.
struct TagEntry {
    tag: &'static str,
    keywords: &'static [&'static str],
}

static DICTIONARY: LazyLock<Vec<TagEntry>> = LazyLock::new(|| {
    vec![
        TagEntry { tag: "git", keywords: &["git", "commit", "rebase", "merge-conflict", "cherry-pick"] },
        TagEntry { tag: "worktree", keywords: &["worktree", "worktrees"] },
        TagEntry { tag: "branch", keywords: &["branch", "branches", "checkout"] },
        TagEntry { tag: "testing", keywords: &["test", "tests", "testing", "pytest", "unittest", "assert", "coverage"] },
        TagEntry { tag: "error-handling", keywords: &["error", "errors", "exception", "exceptions", "panic", "unwrap"] },
        TagEntry { tag: "logging", keywords: &["log", "logs", "logging", "logger", "tracing"] },
        TagEntry { tag: "async", keywords: &["async", "await", "asyncio", "tokio", "concurrency"] },
        TagEntry { tag: "pathlib", keywords: &["pathlib", "path", "paths", "filepath"] },
        TagEntry { tag: "filesystem", keywords: &["file", "files", "directory", "directories", "folder"] },
        TagEntry { tag: "imports", keywords: &["import", "imports", "require", "dependency", "dependencies"] },
        TagEntry { tag: "types", keywords: &["type", "types", "typing", "annotation", "annotations", "generic"] },
        TagEntry { tag: "formatting", keywords: &["format", "formatting", "lint", "linter", "style", "prettier", "rustfmt", "black"] },
        TagEntry { tag: "naming", keywords: &["name", "naming", "rename", "snake_case", "camelcase"] },
        TagEntry { tag: "database", keywords: &["database", "sql", "sqlite", "postgres", "query", "queries", "migration"] },
        TagEntry { tag: "http", keywords: &["http", "https", "request", "requests", "api", "endpoint", "rest"] },
        TagEntry { tag: "security", keywords: &["security", "secret", "secrets", "credential", "credentials", "auth", "token"] },
        TagEntry { tag: "docs", keywords: &["doc", "docs", "docstring", "documentation", "comment", "comments", "readme"] },
        TagEntry { tag: "config", keywords: &["config", "configuration", "settings", "env", "environment"] },
        TagEntry { tag: "build", keywords: &["build", "compile", "cargo", "npm", "makefile", "ci"] },
        TagEntry { tag: "performance", keywords: &["performance", "slow", "fast", "optimize", "cache", "caching"] },
        TagEntry { tag: "refactoring", keywords: &["refactor", "refactoring", "cleanup", "simplify", "extract"] },
        TagEntry { tag: "python", keywords: &["python", "pip", "venv", "django", "flask"] },
        TagEntry { tag: "rust", keywords: &["rust", "clippy", "borrow", "lifetime"] },
        TagEntry { tag: "javascript", keywords: &["javascript", "typescript", "node", "react", "eslint"] },
        TagEntry { tag: "go", keywords: &["golang", "goroutine", "gofmt"] },
        TagEntry { tag: "shell", keywords: &["bash", "shell", "script", "zsh", "cli"] },
    ]
});

/// Extract canonical tags from a piece of sanitized text.
///
/// Matching is token-based over lowercased alphanumeric words, so
/// "pathlib.Path" yields both the `pathlib` and `types`-adjacent tokens
/// without substring false positives.
pub fn extract_tags(text: &str) -> BTreeSet<String> {
    let tokens: BTreeSet<String> = tokenize(text).collect();

    let mut tags = BTreeSet::new();
    for entry in DICTIONARY.iter() {
        if entry.keywords.iter().any(|k| tokens.contains(*k)) {
            tags.insert(entry.tag.to_string());
        }
    }
    tags
}

/// Lowercased alphanumeric word tokens of a text.
///
/// Shared with the content-similarity scorer so both see the same token
/// stream.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
