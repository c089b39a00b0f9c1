//! Method identity filtering for scoped instrumentation
//!
//! Supports:
//! - Regex exclusion patterns: `^app\.internal\.`, `Helper\.`
//! - The `runtime` class, which excludes the profiler's own identities

use crate::error::{ProfilerError, Result};
use regex::Regex;

/// Identities belonging to the profiler itself
const RUNTIME_PATTERNS: &[&str] = &[r"^jouler::", r"^jouler\."];

/// Decides which method identities are profiled
#[derive(Debug, Clone, Default)]
pub struct MethodFilter {
    /// Identities matching any of these are skipped
    exclude: Vec<Regex>,
}

impl MethodFilter {
    /// Create a filter that profiles every method
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from exclusion patterns
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut exclude = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }

            if pattern == "runtime" {
                for runtime in RUNTIME_PATTERNS {
                    exclude.push(compile(runtime)?);
                }
            } else {
                exclude.push(compile(pattern)?);
            }
        }

        Ok(Self { exclude })
    }

    /// Check if a method should be profiled
    pub fn should_profile(&self, method: &str) -> bool {
        !self.exclude.iter().any(|re| re.is_match(method))
    }

    pub fn is_empty(&self) -> bool {
        self.exclude.is_empty()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| ProfilerError::Config(format!("invalid exclude pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_all_profiles_everything() {
        let filter = MethodFilter::all();
        assert!(filter.should_profile("app.Main.main"));
        assert!(filter.should_profile("anything"));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_filter_excludes_matching() {
        let filter = MethodFilter::from_patterns(&[r"^app\.internal\.", "Helper"]).unwrap();
        assert!(!filter.should_profile("app.internal.Cache.get"));
        assert!(!filter.should_profile("app.StringHelper.trim"));
        assert!(filter.should_profile("app.Main.main"));
    }

    #[test]
    fn test_filter_runtime_class() {
        let filter = MethodFilter::from_patterns(&["runtime"]).unwrap();
        assert!(!filter.should_profile("jouler::engine::enter_method"));
        assert!(!filter.should_profile("jouler.Sampler.run"));
        assert!(filter.should_profile("app.Main.main"));
    }

    #[test]
    fn test_filter_whitespace_and_empty_patterns() {
        let filter = MethodFilter::from_patterns(&["  ", " ^a\\.b "]).unwrap();
        assert!(!filter.should_profile("a.b.c"));
        assert!(filter.should_profile("x.a.b"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = MethodFilter::from_patterns(&["(unclosed"]);
        assert!(matches!(result, Err(ProfilerError::Config(_))));
    }

    #[test]
    fn test_filter_clone() {
        let filter1 = MethodFilter::from_patterns(&["skip"]).unwrap();
        let filter2 = filter1.clone();
        assert!(!filter2.should_profile("a.skip.me"));
        assert!(filter2.should_profile("a.keep.me"));
    }
}
