//! Architectural Enforcement
//!
//! Source-level policy checks for the tutor crates:
//! - No blocking I/O inside async functions
//! - No sleeping in production code
//! - The streaming core stays free of HTTP-framework imports
//! - No `unwrap()` / `expect()` outside tests
//!
//! The checks are line-based. A file's `#[cfg(test)]` module is treated as
//! the end of its production code, which matches how every crate in this
//! workspace lays out unit tests.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["tutor/core/src", "tutor/daemon/src"];

/// One line that broke a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Which rule fired
    pub rule: &'static str,
    /// The offending source line, trimmed
    pub source: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.source
        )
    }
}

/// A production line with its context
#[derive(Debug, Clone)]
pub struct CodeLine<'a> {
    /// 1-based line number
    pub number: usize,
    /// The line with any `//` comment removed
    pub code: &'a str,
    /// The full line, trimmed
    pub raw: &'a str,
    /// Whether the closest enclosing `fn` is `async`
    pub in_async_fn: bool,
}

/// Workspace root, derived from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under `dir` (relative to the workspace root)
#[must_use]
pub fn rust_sources(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Split source text into production lines
///
/// Stops at the first `#[cfg(test)]`.
#[must_use]
pub fn production_lines(content: &str) -> Vec<CodeLine<'_>> {
    let mut lines = Vec::new();
    let mut in_async_fn = false;

    for (idx, line) in content.lines().enumerate() {
        let raw = line.trim();
        if raw.starts_with("#[cfg(test)]") {
            break;
        }

        let code = strip_comment(line);
        if let Some(is_async) = fn_signature(code) {
            in_async_fn = is_async;
        }

        lines.push(CodeLine {
            number: idx + 1,
            code,
            raw,
            in_async_fn,
        });
    }

    lines
}

/// Apply `check` to every production line under `dirs`
///
/// `check` returns the rule name when a line violates it.
pub fn scan<F>(dirs: &[&str], check: F) -> Vec<Violation>
where
    F: Fn(&CodeLine<'_>) -> Option<&'static str>,
{
    let mut violations = Vec::new();

    for dir in dirs {
        for path in rust_sources(dir) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for line in production_lines(&content) {
                if let Some(rule) = check(&line) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: line.number,
                        rule,
                        source: line.raw.to_string(),
                    });
                }
            }
        }
    }

    violations
}

/// Print violations and fail the calling test
///
/// # Panics
///
/// Panics whenever `violations` is non-empty.
pub fn assert_clean(policy: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {policy}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }

    panic!(
        "\nFound {} violation(s) of: {policy}\nFix these before merging!",
        violations.len()
    );
}

fn strip_comment(line: &str) -> &str {
    // Naive: a `//` inside a string literal also ends the line
    line.split("//").next().unwrap_or(line)
}

/// `Some(is_async)` if the line opens a function
fn fn_signature(code: &str) -> Option<bool> {
    let trimmed = code.trim_start();
    let words: Vec<&str> = trimmed.split_whitespace().collect();

    let fn_pos = words.iter().position(|w| *w == "fn")?;
    let qualifiers = &words[..fn_pos];
    let allowed = ["pub", "pub(crate)", "pub(super)", "async", "const", "unsafe", "extern"];
    if !qualifiers.iter().all(|q| allowed.contains(q)) {
        return None;
    }
    Some(qualifiers.contains(&"async"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_fn_tracking() {
        let code = "async fn bad() {\n    std::fs::read(\"x\");\n}\nfn fine() {\n    std::fs::read(\"x\");\n}\n";
        let lines = production_lines(code);

        assert!(lines[1].in_async_fn);
        assert!(!lines[4].in_async_fn);
    }

    #[test]
    fn test_pub_async_fn_detected() {
        assert_eq!(fn_signature("    pub async fn run(mut self) {"), Some(true));
        assert_eq!(fn_signature("    pub(crate) fn as_u8(self) -> u8 {"), Some(false));
        assert_eq!(fn_signature("    let f = fn_pointer;"), None);
    }

    #[test]
    fn test_stops_at_test_module() {
        let code = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { x.unwrap(); }\n}\n";
        assert_eq!(production_lines(code).len(), 1);
    }

    #[test]
    fn test_comments_stripped() {
        let lines = production_lines("let x = 1; // std::thread::sleep\n");
        assert!(!lines[0].code.contains("sleep"));
    }

    #[test]
    fn test_workspace_root_has_production_dirs() {
        for dir in PRODUCTION_DIRS {
            assert!(
                workspace_root().join(dir).is_dir(),
                "missing production directory {dir}"
            );
        }
    }
}
