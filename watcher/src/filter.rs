//! Optional exclude patterns.

use wildmatch::WildMatch;

/// Drops events whose root-relative path matches any pattern.
///
/// Patterns use `*` (any run of characters, `/` included) and `?` (any one
/// character). With no patterns every path passes.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<WildMatch>,
}

impl PathFilter {
    /// Build a filter from pattern strings.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| WildMatch::new(p.as_ref()))
                .collect(),
        }
    }

    /// Whether the filter lets every path through.
    pub fn is_pass_through(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check if a canonical, root-relative path should be excluded.
    pub fn excludes(&self, relative_path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(relative_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_passes_everything() {
        let filter = PathFilter::default();
        assert!(filter.is_pass_through());
        assert!(!filter.excludes("a.txt"));
        assert!(!filter.excludes(".git/config"));
    }

    #[test]
    fn test_exclude_patterns() {
        let filter = PathFilter::new([".git/*", "*.swp", "cache/??.bin"]);

        assert!(filter.excludes(".git/config"));
        assert!(filter.excludes(".git/refs/heads/main"));
        assert!(filter.excludes("src/.main.rs.swp"));
        assert!(filter.excludes("cache/ab.bin"));
        assert!(!filter.excludes("cache/abc.bin"));
        assert!(!filter.excludes("src/main.rs"));
    }
}
