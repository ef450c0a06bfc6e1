//! Architectural Enforcement Integration Tests
//!
//! Source scans shared by the tests in `tests/`:
//! - No blocking I/O inside async code
//! - No sleeping in production code
//!
//! Scans are line based. Everything from the first `#[cfg(test)]` of a file
//! onwards counts as test code and is skipped.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["mentor/core/src", "mentor/cli/src"];

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A Rust source file loaded for scanning
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    content: String,
}

impl SourceFile {
    /// Lines up to, not including, the first `#[cfg(test)]`
    #[must_use]
    pub fn production_lines(&self) -> Vec<&str> {
        self.content
            .lines()
            .take_while(|line| line.trim() != "#[cfg(test)]")
            .collect()
    }
}

/// Load every `.rs` file under the production trees
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut sources = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_path_buf();
            sources.push(SourceFile {
                path: relative,
                content,
            });
        }
    }
    sources
}

/// A forbidden pattern found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File, relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule was broken
    pub rule: &'static str,
    /// Offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// `Some(is_async)` when `line` starts a function
#[must_use]
pub fn fn_signature(line: &str) -> Option<bool> {
    let mut is_async = false;
    for token in line.split_whitespace() {
        match token {
            "pub" | "const" | "unsafe" | "extern" => {}
            t if t.starts_with("pub(") => {}
            "async" => is_async = true,
            "fn" => return Some(is_async),
            _ => return None,
        }
    }
    None
}

/// Whether the line at `idx` runs in an async context
///
/// The nearest enclosing function signature or `async` block decides.
#[must_use]
pub fn in_async_context(lines: &[&str], idx: usize) -> bool {
    for line in lines[..=idx].iter().rev() {
        let code = code_part(line);
        if code.contains("async move {") || code.contains("async {") {
            return true;
        }
        if let Some(is_async) = fn_signature(code.trim()) {
            return is_async;
        }
    }
    false
}

/// Run `check` over every production line, collecting violations
pub fn scan<F>(sources: &[SourceFile], mut check: F) -> Vec<Violation>
where
    F: FnMut(&[&str], usize) -> Option<&'static str>,
{
    let mut violations = Vec::new();
    for source in sources {
        let lines = source.production_lines();
        for idx in 0..lines.len() {
            if let Some(rule) = check(&lines, idx) {
                violations.push(Violation {
                    path: source.path.clone(),
                    line: idx + 1,
                    rule,
                    text: lines[idx].trim().to_string(),
                });
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_signature() {
        assert_eq!(fn_signature("fn main() {"), Some(false));
        assert_eq!(fn_signature("pub async fn submit(&mut self, text: &str) {"), Some(true));
        assert_eq!(fn_signature("pub(crate) async fn cancellable<F: Future>("), Some(true));
        assert_eq!(fn_signature("let f = fn_name();"), None);
        assert_eq!(fn_signature("impl Foo {"), None);
    }

    #[test]
    fn test_async_context() {
        let lines = vec![
            "fn spawn_stream() {",
            "    let path = std::fs::read(\"x\");",
            "    tokio::spawn(async move {",
            "        let data = std::fs::read(\"y\");",
            "    });",
            "}",
            "async fn load() {",
            "    let data = std::fs::read(\"z\");",
            "}",
        ];

        assert!(!in_async_context(&lines, 1));
        assert!(in_async_context(&lines, 3));
        assert!(in_async_context(&lines, 7));
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let source = SourceFile {
            path: PathBuf::from("a.rs"),
            content: "fn a() {}\n#[cfg(test)]\nmod tests {}\n".to_string(),
        };
        assert_eq!(source.production_lines(), vec!["fn a() {}"]);
    }

    #[test]
    fn test_workspace_has_sources() {
        assert!(!production_sources().is_empty());
    }
}
