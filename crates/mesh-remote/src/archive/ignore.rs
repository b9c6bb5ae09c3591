//! Ignore patterns for the workspace archive

use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;

/// A compiled set of ignore globs.
///
/// A pattern excludes a path when it matches the whole path relative to the
/// workspace root (`*` does not cross `/`) or when it matches the entry's
/// file name alone. So `*.tmp` excludes `b/skip.tmp`, and `node_modules`
/// excludes that directory at any depth.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    matchers: Vec<GlobMatcher>,
}

impl IgnoreSet {
    /// Compile patterns, skipping (and warning about) invalid ones
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matchers = patterns
            .into_iter()
            .filter_map(|pattern| {
                let pattern = pattern.as_ref();
                match GlobBuilder::new(pattern).literal_separator(true).build() {
                    Ok(glob) => Some(glob.compile_matcher()),
                    Err(e) => {
                        tracing::warn!("Skipping invalid ignore pattern '{}': {}", pattern, e);
                        None
                    }
                }
            })
            .collect();
        Self { matchers }
    }

    /// Whether `relative` (a path under the workspace root) is excluded
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let name = relative.file_name().map(Path::new);
        self.matchers.iter().any(|m| {
            m.is_match(relative) || name.is_some_and(|name| m.is_match(name))
        })
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}
