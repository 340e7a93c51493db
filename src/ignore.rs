//! Path exclusion for working-directory scans.
//!
//! Grounded on the same "ordered list of matchers, first match wins" shape
//! used for repository ignore files elsewhere in this corpus, simplified
//! to the two matcher kinds this system's working-directory layout calls
//! for: path prefixes and globs.

use std::path::Path;

use anyhow::{Context, Result};
use glob::Pattern;

/// One rule from an ignore file. A path is excluded if any matcher in an
/// [`IgnoreSet`] matches it.
#[derive(Debug, Clone)]
pub enum IgnoreMatcher {
    Prefix(String),
    Glob(Pattern),
}

impl IgnoreMatcher {
    fn matches(&self, relative_path: &str) -> bool {
        match self {
            IgnoreMatcher::Prefix(prefix) => relative_path.starts_with(prefix.as_str()),
            IgnoreMatcher::Glob(pattern) => pattern.matches(relative_path),
        }
    }
}

/// `.versioning/` is always excluded, in addition to whatever the user's
/// ignore file contributes.
const ALWAYS_EXCLUDED_PREFIX: &str = ".versioning";

#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    matchers: Vec<IgnoreMatcher>,
}

impl IgnoreSet {
    pub fn new(matchers: Vec<IgnoreMatcher>) -> Self {
        IgnoreSet { matchers }
    }

    /// Parses one matcher per non-empty, non-`#`-prefixed line:
    /// `prefix:<path>` or `glob:<pattern>`. Unknown lines are rejected.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut matchers = Vec::new();
        for (lineno, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(prefix) = line.strip_prefix("prefix:") {
                matchers.push(IgnoreMatcher::Prefix(prefix.to_string()));
            } else if let Some(glob) = line.strip_prefix("glob:") {
                let pattern = Pattern::new(glob)
                    .with_context(|| format!("invalid glob pattern on line {}: {glob}", lineno + 1))?;
                matchers.push(IgnoreMatcher::Glob(pattern));
            } else {
                anyhow::bail!("unrecognised ignore matcher on line {}: {line}", lineno + 1);
            }
        }
        Ok(IgnoreSet::new(matchers))
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for matcher in &self.matchers {
            match matcher {
                IgnoreMatcher::Prefix(prefix) => out.push_str(&format!("prefix:{prefix}\n")),
                IgnoreMatcher::Glob(pattern) => out.push_str(&format!("glob:{pattern}\n")),
            }
        }
        out
    }

    /// True if `relative_path` (forward-slash, relative to the working
    /// directory root) should be excluded from scans and commits.
    pub fn is_ignored(&self, relative_path: &Path) -> bool {
        let as_str = relative_path.to_string_lossy().replace('\\', "/");
        if as_str == ALWAYS_EXCLUDED_PREFIX || as_str.starts_with(&format!("{ALWAYS_EXCLUDED_PREFIX}/")) {
            return true;
        }
        self.matchers.iter().any(|m| m.matches(&as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioning_directory_is_always_excluded() {
        let set = IgnoreSet::default();
        assert!(set.is_ignored(Path::new(".versioning/config")));
        assert!(set.is_ignored(Path::new(".versioning")));
        assert!(!set.is_ignored(Path::new("src/main.rs")));
    }

    #[test]
    fn parse_and_match_prefix_and_glob() {
        let set = IgnoreSet::parse("prefix:build/\nglob:*.tmp\n# comment\n\n").unwrap();
        assert!(set.is_ignored(Path::new("build/output.bin")));
        assert!(set.is_ignored(Path::new("scratch.tmp")));
        assert!(!set.is_ignored(Path::new("src/lib.rs")));
    }

    #[test]
    fn serialize_round_trips_through_parse() {
        let original = IgnoreSet::parse("prefix:a/\nglob:*.log\n").unwrap();
        let reparsed = IgnoreSet::parse(&original.serialize()).unwrap();
        assert!(reparsed.is_ignored(Path::new("a/x")));
        assert!(reparsed.is_ignored(Path::new("x.log")));
    }

    #[test]
    fn unrecognised_matcher_kind_is_rejected() {
        assert!(IgnoreSet::parse("nonsense:foo").is_err());
    }
}
