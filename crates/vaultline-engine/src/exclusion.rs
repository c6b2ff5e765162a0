//! Exclusion pattern matching

use regex::Regex;
use std::collections::HashMap;

use crate::error::Result;
use crate::types::{ExclusionPattern, PatternScope};

/// The pattern that excluded a secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionMatch {
    pub pattern: String,
    pub global: bool,
}

/// Compiled exclusion patterns
///
/// Global patterns are checked first and on their own; a project's patterns
/// are only consulted when no global pattern matched.
#[derive(Debug, Default)]
pub struct ExclusionMatcher {
    global: Vec<Regex>,
    project: HashMap<String, Vec<Regex>>,
}

impl ExclusionMatcher {
    /// Compile a set of patterns, failing on the first invalid regex
    pub fn compile<'a>(patterns: impl IntoIterator<Item = &'a ExclusionPattern>) -> Result<Self> {
        let mut matcher = Self::default();
        for pattern in patterns {
            let re = compile_pattern(&pattern.pattern)?;
            match &pattern.scope {
                PatternScope::Global => matcher.global.push(re),
                PatternScope::Project(project) => {
                    matcher.project.entry(project.clone()).or_default().push(re)
                }
            }
        }
        Ok(matcher)
    }

    /// First pattern excluding `name` in `project`, if any
    pub fn matches(&self, project: &str, name: &str) -> Option<ExclusionMatch> {
        if let Some(re) = self.global.iter().find(|re| re.is_match(name)) {
            return Some(ExclusionMatch {
                pattern: re.as_str().to_string(),
                global: true,
            });
        }

        self.project
            .get(project)?
            .iter()
            .find(|re| re.is_match(name))
            .map(|re| ExclusionMatch {
                pattern: re.as_str().to_string(),
                global: false,
            })
    }

    pub fn is_excluded(&self, project: &str, name: &str) -> bool {
        self.matches(project, name).is_some()
    }
}

/// Compile one pattern, mapping regex errors to a config error
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| vaultline_core::Error::invalid_pattern(pattern, e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_global_pattern_applies_to_every_project() {
        let patterns = [ExclusionPattern::global("^GITHUB_TOKEN$")];
        let matcher = ExclusionMatcher::compile(&patterns).unwrap();

        assert!(matcher.is_excluded("web", "GITHUB_TOKEN"));
        assert!(matcher.is_excluded("api", "GITHUB_TOKEN"));
        assert!(!matcher.is_excluded("web", "GITHUB_TOKEN_2"));
        assert!(!matcher.is_excluded("web", "API_KEY"));
    }

    #[test]
    fn test_global_checked_before_project() {
        let patterns = [
            ExclusionPattern::project("web", "^DEBUG_"),
            ExclusionPattern::global("^DEBUG_"),
        ];
        let matcher = ExclusionMatcher::compile(&patterns).unwrap();

        let hit = matcher.matches("web", "DEBUG_LEVEL").unwrap();
        assert!(hit.global);
    }

    #[test]
    fn test_project_pattern_is_scoped() {
        let patterns = [ExclusionPattern::project("web", "^LOCAL_")];
        let matcher = ExclusionMatcher::compile(&patterns).unwrap();

        let hit = matcher.matches("web", "LOCAL_DB").unwrap();
        assert!(!hit.global);
        assert_eq!(hit.pattern, "^LOCAL_");
        assert!(!matcher.is_excluded("api", "LOCAL_DB"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let patterns = [ExclusionPattern::global("([")];
        let err = ExclusionMatcher::compile(&patterns).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(vaultline_core::Error::InvalidPattern { .. })
        ));
    }
}
