//! Ignore-Pattern Filter
//!
//! Decides whether a namespace path, and with it everything beneath the
//! path, is excluded from a scan. Patterns are literal path prefixes from
//! the configuration, compiled once at startup into a single anchored
//! matcher set; matching is a pure function over the compiled state.

use regex::RegexSet;

/// Filter error types
#[derive(Debug)]
pub enum FilterError {
    /// A configured prefix failed to compile into a matcher
    Pattern(regex::Error),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::Pattern(e) => write!(f, "invalid ignore pattern: {}", e),
        }
    }
}

impl std::error::Error for FilterError {}

impl From<regex::Error> for FilterError {
    fn from(e: regex::Error) -> Self {
        FilterError::Pattern(e)
    }
}

/// Compiled set of ignored path prefixes.
///
/// A path is ignored when any configured prefix matches at the start of
/// the path. Prefixes are matched literally (a `.` in a prefix is a dot,
/// not a wildcard).
#[derive(Debug, Clone)]
pub struct IgnoreList {
    set: RegexSet,
}

impl IgnoreList {
    /// Compile a list of literal path prefixes into a matcher set.
    pub fn compile(prefixes: &[String]) -> Result<Self, FilterError> {
        let anchored: Vec<String> = prefixes
            .iter()
            .map(|p| format!("^{}", regex::escape(p)))
            .collect();
        Ok(Self {
            set: RegexSet::new(&anchored)?,
        })
    }

    /// Whether this path (and so its whole subtree) is excluded.
    pub fn should_ignore(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    /// Number of compiled prefixes.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether the list has no prefixes at all.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
