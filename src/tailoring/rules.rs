//! Ignore rules and namespace patterns.
//!
//! Both `.jdpignore` lines and `nativeNamespaces` entries describe parts of
//! an archive in one of two notations:
//!
//! - dotted namespace, `com.example.native.mac`: everything under
//!   `com/example/native/mac/`, plus the class files of a class with that
//!   name (`com/example/native/mac.class`, `com/example/native/mac$X.class`)
//! - literal path, `/native/libfoo.so` or `native/x64/`: a leading `/` is
//!   stripped; a path whose last segment has no extension selects the
//!   directory, anything else selects exactly that file
//!
//! `*` matches within one path segment and `**` across segments.

use crate::error::{ErrorExt, Result};
use regex::Regex;
use std::path::Path;

/// Compiled selector over `/`-separated archive entry names.
#[derive(Debug, Clone)]
pub struct PathPattern {
    normalized: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Directory { class_stem: Option<String> },
    File,
    Wildcard(Regex),
}

impl PathPattern {
    /// Normalizes and compiles `pattern`.
    ///
    /// Returns `None` for a pattern that normalizes to nothing.
    pub fn parse(pattern: &str) -> Option<Self> {
        let normalized = normalize(pattern)?;
        let kind = if normalized.contains('*') {
            match Regex::new(&wildcard_regex(&normalized)) {
                Ok(re) => PatternKind::Wildcard(re),
                Err(e) => {
                    log::warn!("invalid wildcard pattern {pattern:?}: {e}");
                    return None;
                }
            }
        } else if normalized.ends_with('/') {
            let trimmed = pattern.trim();
            let class_stem = (!trimmed.contains('/'))
                .then(|| normalized.trim_end_matches('/').to_string());
            PatternKind::Directory { class_stem }
        } else {
            PatternKind::File
        };
        Some(Self { normalized, kind })
    }

    /// Normalized archive path, `/`-terminated for directory selectors.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether `entry` is selected.
    pub fn matches(&self, entry: &str) -> bool {
        match &self.kind {
            PatternKind::Directory { class_stem } => {
                entry.starts_with(&self.normalized)
                    || entry == self.normalized.trim_end_matches('/')
                    || class_stem.as_deref().is_some_and(|stem| is_class_of(entry, stem))
            }
            PatternKind::File => entry == self.normalized,
            PatternKind::Wildcard(re) => re.is_match(entry),
        }
    }
}

/// Converts a dotted namespace or literal path into archive path form.
///
/// Returns `None` for blank input.
///
/// | input | normalized |
/// |-------|------------|
/// | `com.example.native` | `com/example/native/` |
/// | `/native/lib.so` | `native/lib.so` |
/// | `/native/x64` | `native/x64/` |
/// | `native/lib.so` | `native/lib.so` |
pub fn normalize(pattern: &str) -> Option<String> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains('/') {
        let literal = trimmed.trim_start_matches('/');
        if literal.is_empty() {
            return None;
        }
        if literal.ends_with('/') || literal.contains('*') {
            return Some(literal.to_string());
        }
        let last = literal.rsplit('/').next().unwrap_or(literal);
        if last.contains('.') {
            Some(literal.to_string())
        } else {
            Some(format!("{literal}/"))
        }
    } else {
        let path = trimmed.replace('.', "/");
        if path.contains('*') {
            Some(path)
        } else {
            Some(format!("{path}/"))
        }
    }
}

fn wildcard_regex(normalized: &str) -> String {
    let mut out = String::from("^");
    let mut rest = normalized;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("**") {
            out.push_str(".*");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('*') {
            out.push_str("[^/]*");
            rest = tail;
        } else {
            let next = rest.find('*').unwrap_or(rest.len());
            out.push_str(&regex::escape(&rest[..next]));
            rest = &rest[next..];
        }
    }
    if normalized.ends_with('/') {
        out.push_str(".*");
    }
    out.push('$');
    out
}

fn is_class_of(entry: &str, stem: &str) -> bool {
    let Some(rest) = entry.strip_prefix(stem) else {
        return false;
    };
    rest == ".class" || (rest.starts_with('$') && rest.ends_with(".class"))
}

/// One parsed `.jdpignore` line.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    original_pattern: String,
    is_keep: bool,
    pattern: PathPattern,
}

impl IgnoreRule {
    /// The line as written, untrimmed.
    pub fn original_pattern(&self) -> &str {
        &self.original_pattern
    }

    /// Whether the line started with `!`.
    pub fn is_keep(&self) -> bool {
        self.is_keep
    }

    /// Archive path form of the pattern.
    pub fn normalized_path(&self) -> &str {
        self.pattern.normalized()
    }

    /// Whether the rule selects `entry`.
    pub fn matches(&self, entry: &str) -> bool {
        self.pattern.matches(entry)
    }
}

/// Parses the contents of an ignore file.
///
/// Blank lines and `#` comments are skipped. A leading `!` makes a keep
/// rule. Lines that normalize to nothing are logged and skipped.
pub fn parse_rules(content: &str) -> Vec<IgnoreRule> {
    let mut rules = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (is_keep, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, trimmed),
        };
        match PathPattern::parse(body) {
            Some(pattern) => rules.push(IgnoreRule {
                original_pattern: line.to_string(),
                is_keep,
                pattern,
            }),
            None => log::warn!("skipping malformed ignore rule on line {}: {line:?}", index + 1),
        }
    }
    rules
}

/// Reads and parses an ignore file. A missing file has no rules.
pub fn parse_rules_file(path: &Path) -> Result<Vec<IgnoreRule>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_rules(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).fs_context("reading ignore file", path),
    }
}

/// Whether any rule selects `entry`.
pub fn matches_any(entry: &str, rules: &[IgnoreRule]) -> bool {
    rules.iter().any(|r| r.matches(entry))
}

/// Whether a single pattern, in either notation, selects `entry`.
pub fn matches_pattern(entry: &str, pattern: &str) -> bool {
    PathPattern::parse(pattern).is_some_and(|p| p.matches(entry))
}
