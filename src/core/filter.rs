//! Glob filters over experiment paths.
//!
//! A raw user filter expands into a small set of shell-style glob patterns
//! (`*`, `?`, `[...]`), and the set yields the literal scan prefix used to
//! narrow the storage listing.
//!
//! Expansion rules, in priority order:
//! - `foo/` → `foo/*`, `foo`
//! - anything containing `*`, `?` or `[` → unchanged
//! - `foo` → `foo`, `foo/*` (a bare name also matches its children)

use glob::Pattern;

use super::error::{EpiflowError, Result};

/// Characters that start a glob construct
pub const WILDCARDS: [char; 3] = ['*', '?', '['];

/// Expand a raw filter string into glob patterns
pub fn normalize_filter_patterns(raw: &str) -> Vec<String> {
    if raw.ends_with('/') {
        vec![format!("{}*", raw), raw.trim_end_matches('/').to_string()]
    } else if raw.contains(WILDCARDS) {
        vec![raw.to_string()]
    } else {
        vec![raw.to_string(), format!("{}/*", raw)]
    }
}

/// Longest wildcard-free, directory-aligned literal head shared by all patterns.
///
/// A pattern without wildcards contributes itself. A pattern with wildcards
/// contributes its text up to and including the last `/` before the first
/// wildcard. The shortest contribution wins.
pub fn extract_scan_prefix<S: AsRef<str>>(patterns: &[S]) -> String {
    patterns
        .iter()
        .map(|p| literal_head(p.as_ref()))
        .min_by_key(|head| head.len())
        .unwrap_or_default()
        .to_string()
}

fn literal_head(pattern: &str) -> &str {
    match pattern.find(WILDCARDS) {
        None => pattern,
        Some(idx) => match pattern[..idx].rfind('/') {
            Some(slash) => &pattern[..=slash],
            None => "",
        },
    }
}

/// Rewrite a shell glob into the `glob` crate's grammar.
///
/// Runs of `*` collapse to a single `*` (which already crosses `/`), and a
/// `[` with no closing `]` is escaped so it matches itself.
fn to_glob_syntax(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push('*');
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.extend(&chars[i..=end]);
                    i = end + 1;
                }
                None => {
                    out.push_str("[[]");
                    i += 1;
                }
            },
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Index of the `]` closing the class opened at `start`. The first member
/// (after an optional `!`) may itself be `]`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let first = if chars.get(start + 1) == Some(&'!') {
        start + 3
    } else {
        start + 2
    };
    chars
        .get(first..)?
        .iter()
        .position(|&c| c == ']')
        .map(|pos| first + pos)
}

/// A compiled filter
#[derive(Debug, Clone)]
pub struct FilterPatterns {
    patterns: Vec<String>,
    compiled: Vec<Pattern>,
}

impl FilterPatterns {
    /// Expand and compile `raw`
    pub fn new(raw: &str) -> Result<Self> {
        let patterns = normalize_filter_patterns(raw);
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(&to_glob_syntax(p)).map_err(|e| EpiflowError::InvalidFilter {
                    pattern: raw.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns, compiled })
    }

    /// Compile an optional filter. A missing or blank filter means no filter.
    pub fn from_optional(raw: Option<&str>) -> Result<Option<Self>> {
        raw.filter(|r| !r.trim().is_empty()).map(Self::new).transpose()
    }

    /// Literal prefix to narrow storage listings with
    pub fn scan_prefix(&self) -> String {
        extract_scan_prefix(&self.patterns)
    }

    /// True if any pattern matches `name`
    pub fn matches(&self, name: &str) -> bool {
        self.compiled.iter().any(|p| p.matches(name))
    }

    /// Keep the items whose name matches
    pub fn filter<T, I>(&self, items: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        items
            .into_iter()
            .filter(|item| self.matches(item.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn set(patterns: Vec<String>) -> HashSet<String> {
        patterns.into_iter().collect()
    }

    fn strs(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_rules() {
        assert_eq!(set(normalize_filter_patterns("foo/")), strs(&["foo/*", "foo"]));
        assert_eq!(set(normalize_filter_patterns("foo")), strs(&["foo", "foo/*"]));
        assert_eq!(set(normalize_filter_patterns("foo*")), strs(&["foo*"]));
        assert_eq!(set(normalize_filter_patterns("fo?")), strs(&["fo?"]));
        assert_eq!(set(normalize_filter_patterns("[ab]/x")), strs(&["[ab]/x"]));
    }

    #[test]
    fn test_trailing_slash_wins_over_wildcard() {
        assert_eq!(
            set(normalize_filter_patterns("2026*/")),
            strs(&["2026*/*", "2026*"])
        );
    }

    #[test]
    fn test_scan_prefix_literal() {
        let patterns = normalize_filter_patterns("202605/exp1");
        assert_eq!(extract_scan_prefix(&patterns), "202605/exp1");
    }

    #[test]
    fn test_scan_prefix_directory_aligned() {
        assert_eq!(extract_scan_prefix(&["202605/exp*"]), "202605/");
        assert_eq!(extract_scan_prefix(&["ab*cd/x"]), "");
        assert_eq!(extract_scan_prefix(&["a/b/c?/d"]), "a/b/");
        assert_eq!(extract_scan_prefix(&["a/b[12]/c"]), "a/");
    }

    #[test]
    fn test_scan_prefix_picks_shortest() {
        assert_eq!(extract_scan_prefix(&["foo/*", "foo"]), "foo");
        assert_eq!(extract_scan_prefix(&["a/b/c", "a/*"]), "a/");
        let empty: [&str; 0] = [];
        assert_eq!(extract_scan_prefix(&empty), "");
    }

    #[test]
    fn test_scan_prefix_never_exceeds_literal_head() {
        for raw in ["test/", "test/myexp", "2026*/exp1", "a/b?c", "x[0-9]/y/", "plain"] {
            let filter = FilterPatterns::new(raw).unwrap();
            let literal_head = match raw.find(WILDCARDS) {
                Some(idx) => &raw[..idx],
                None => raw,
            };
            let prefix = filter.scan_prefix();
            assert!(prefix.len() <= literal_head.len(), "{} -> {}", raw, prefix);
            assert!(literal_head.starts_with(&prefix), "{} -> {}", raw, prefix);
        }
    }

    #[test]
    fn test_bare_name_matches_children() {
        let filter = FilterPatterns::new("test").unwrap();
        assert!(filter.matches("test"));
        assert!(filter.matches("test/myexp"));
        assert!(filter.matches("test/deep/nested"));
        assert!(!filter.matches("testing"));
        assert!(!filter.matches("other/test"));
    }

    #[test]
    fn test_glob_semantics() {
        let filter = FilterPatterns::new("2026??/exp[12]").unwrap();
        assert!(filter.matches("202605/exp1"));
        assert!(filter.matches("202612/exp2"));
        assert!(!filter.matches("202605/exp3"));
        assert!(!filter.matches("2026051/exp1"));

        // `*` crosses path separators
        let filter = FilterPatterns::new("*exp1").unwrap();
        assert!(filter.matches("202605/exp1"));
    }

    #[test]
    fn test_filter_keeps_matching_items() {
        let filter = FilterPatterns::new("202605/").unwrap();
        let kept = filter.filter(vec!["202605/exp1", "202606/exp1", "202605", "202605/a/b"]);
        assert_eq!(kept, vec!["202605/exp1", "202605", "202605/a/b"]);
    }

    #[test]
    fn test_repeated_stars_act_as_one() {
        let filter = FilterPatterns::new("exp**").unwrap();
        assert!(filter.matches("exp"));
        assert!(filter.matches("exp1"));
        assert!(filter.matches("exp1/child"));
        assert!(!filter.matches("test/exp1"));

        let filter = FilterPatterns::new("a/***/b").unwrap();
        assert!(filter.matches("a/x/b"));
        assert!(filter.matches("a/x/y/b"));
    }

    #[test]
    fn test_unclosed_bracket_is_literal() {
        let filter = FilterPatterns::new("exp[1").unwrap();
        assert!(filter.matches("exp[1"));
        assert!(!filter.matches("exp1"));

        let filter = FilterPatterns::new("exp[").unwrap();
        assert!(filter.matches("exp["));

        // Closed classes keep their meaning next to a stray bracket
        let filter = FilterPatterns::new("[ab][").unwrap();
        assert!(filter.matches("a["));
        assert!(!filter.matches("c["));
    }

    #[test]
    fn test_to_glob_syntax() {
        assert_eq!(to_glob_syntax("exp**"), "exp*");
        assert_eq!(to_glob_syntax("**/x"), "*/x");
        assert_eq!(to_glob_syntax("exp[1"), "exp[[]1");
        assert_eq!(to_glob_syntax("x[]]"), "x[]]");
        assert_eq!(to_glob_syntax("x[!]"), "x[[]!]");
        assert_eq!(to_glob_syntax("x[!a]"), "x[!a]");
        assert_eq!(to_glob_syntax("plain"), "plain");
    }

    #[test]
    fn test_blank_filter_is_no_filter() {
        assert!(FilterPatterns::from_optional(None).unwrap().is_none());
        assert!(FilterPatterns::from_optional(Some("")).unwrap().is_none());
        assert!(FilterPatterns::from_optional(Some("  ")).unwrap().is_none());
        assert!(FilterPatterns::from_optional(Some("exp1")).unwrap().is_some());
    }
}
