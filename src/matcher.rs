//! Predicate evaluation of a file snapshot against a rule.
//!
//! Checks are performed in this order, stopping at the first failure:
//! 1. Extension allow-list (case- and dot-insensitive)
//! 2. Size bounds
//! 3. Creation-time bounds
//! 4. Include keywords against the file stem - any hit passes
//! 5. Exclude keywords against the file stem - any hit fails
//! 6. Regex against the full file name, case-insensitive
//!
//! An empty list or unset bound passes. A regex that fails to compile, or
//! exceeds the compiled-size limit, never matches.

use crate::rule::Rule;
use crate::snapshot::FileSnapshot;
use regex::{Regex, RegexBuilder};

/// Upper bound on the compiled program size of a rule regex.
///
/// Patterns that blow past this are treated like a matching timeout and
/// fail closed.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Returns true if `snapshot` satisfies every predicate of `rule`.
///
/// Compiles the rule's regex on every call; batch callers should build a
/// [`CompiledRule`] once instead.
pub fn matches(snapshot: &FileSnapshot, rule: &Rule) -> bool {
    CompiledRule::new(rule).matches(snapshot)
}

/// Regex state of a compiled rule.
#[derive(Debug)]
enum RegexState {
    /// The rule has no pattern.
    Unset,
    Compiled(Regex),
    /// The pattern is malformed or too large; nothing matches.
    Invalid,
}

/// A rule with its lowercased keywords, normalized extensions and compiled
/// regex prepared for repeated matching.
#[derive(Debug)]
pub struct CompiledRule<'a> {
    rule: &'a Rule,
    extensions: Vec<String>,
    include_keywords: Vec<String>,
    exclude_keywords: Vec<String>,
    regex: RegexState,
}

impl<'a> CompiledRule<'a> {
    /// Prepares `rule` for matching. Never fails.
    pub fn new(rule: &'a Rule) -> Self {
        let regex = match rule.regex_pattern.as_deref().map(str::trim) {
            None | Some("") => RegexState::Unset,
            Some(pattern) => match RegexBuilder::new(pattern)
                .case_insensitive(true)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
            {
                Ok(regex) => RegexState::Compiled(regex),
                Err(e) => {
                    tracing::warn!(
                        rule = %rule.name,
                        pattern,
                        error = %e,
                        "rule regex rejected, rule will not match"
                    );
                    RegexState::Invalid
                }
            },
        };

        Self {
            rule,
            extensions: rule
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            include_keywords: lowercase_all(&rule.include_keywords),
            exclude_keywords: lowercase_all(&rule.exclude_keywords),
            regex,
        }
    }

    /// The rule this was compiled from.
    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    /// Evaluates all predicates against `snapshot`.
    pub fn matches(&self, snapshot: &FileSnapshot) -> bool {
        self.matches_extension(snapshot)
            && self.matches_size(snapshot)
            && self.matches_created(snapshot)
            && self.matches_keywords(snapshot)
            && self.matches_regex(snapshot)
    }

    fn matches_extension(&self, snapshot: &FileSnapshot) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let ext = snapshot.bare_extension().to_lowercase();
        self.extensions.iter().any(|allowed| *allowed == ext)
    }

    fn matches_size(&self, snapshot: &FileSnapshot) -> bool {
        if let Some(min) = self.rule.min_size
            && snapshot.size_bytes < min
        {
            return false;
        }
        if let Some(max) = self.rule.max_size
            && snapshot.size_bytes > max
        {
            return false;
        }
        true
    }

    fn matches_created(&self, snapshot: &FileSnapshot) -> bool {
        if let Some(min) = self.rule.min_created
            && snapshot.created_at < min
        {
            return false;
        }
        if let Some(max) = self.rule.max_created
            && snapshot.created_at > max
        {
            return false;
        }
        true
    }

    fn matches_keywords(&self, snapshot: &FileSnapshot) -> bool {
        if self.include_keywords.is_empty() && self.exclude_keywords.is_empty() {
            return true;
        }

        let stem = snapshot.stem().to_lowercase();

        if !self.include_keywords.is_empty()
            && !self.include_keywords.iter().any(|k| stem.contains(k.as_str()))
        {
            return false;
        }

        !self.exclude_keywords.iter().any(|k| stem.contains(k.as_str()))
    }

    fn matches_regex(&self, snapshot: &FileSnapshot) -> bool {
        match &self.regex {
            RegexState::Unset => true,
            RegexState::Compiled(regex) => regex.is_match(&snapshot.name),
            RegexState::Invalid => false,
        }
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn snapshot(name: &str, size: u64) -> FileSnapshot {
        let created = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        FileSnapshot::new(format!("/downloads/{}", name), size, created, created)
    }

    #[test]
    fn test_empty_rule_matches_anything() {
        assert!(matches(&snapshot("anything.bin", 0), &Rule::default()));
    }

    #[test]
    fn test_extension_match() {
        let rule = Rule {
            extensions: vec!["pdf".to_string(), "doc".to_string()],
            ..Rule::default()
        };
        assert!(matches(&snapshot("document.pdf", 10), &rule));
        assert!(!matches(&snapshot("image.jpg", 10), &rule));
    }

    #[test]
    fn test_extension_ignores_case_and_dot() {
        let rule = Rule {
            extensions: vec![".PDF".to_string()],
            ..Rule::default()
        };
        assert!(matches(&snapshot("Report.Pdf", 10), &rule));
    }

    #[test]
    fn test_extension_list_rejects_extensionless_file() {
        let rule = Rule {
            extensions: vec!["txt".to_string()],
            ..Rule::default()
        };
        assert!(!matches(&snapshot("Makefile", 10), &rule));
    }

    #[test]
    fn test_size_bounds_inclusive() {
        let rule = Rule {
            min_size: Some(1000),
            max_size: Some(10000),
            ..Rule::default()
        };
        assert!(matches(&snapshot("a.txt", 1000), &rule));
        assert!(matches(&snapshot("a.txt", 5000), &rule));
        assert!(matches(&snapshot("a.txt", 10000), &rule));
        assert!(!matches(&snapshot("a.txt", 999), &rule));
        assert!(!matches(&snapshot("a.txt", 10001), &rule));
    }

    #[test]
    fn test_created_bounds() {
        let file = snapshot("a.txt", 1);
        let before = Rule {
            max_created: Some(file.created_at - Duration::days(1)),
            ..Rule::default()
        };
        let after = Rule {
            min_created: Some(file.created_at + Duration::days(1)),
            ..Rule::default()
        };
        let around = Rule {
            min_created: Some(file.created_at - Duration::days(1)),
            max_created: Some(file.created_at + Duration::days(1)),
            ..Rule::default()
        };

        assert!(!matches(&file, &before));
        assert!(!matches(&file, &after));
        assert!(matches(&file, &around));
    }

    #[test]
    fn test_include_keyword_any_hit() {
        let rule = Rule {
            include_keywords: vec!["invoice".to_string(), "receipt".to_string()],
            ..Rule::default()
        };
        assert!(matches(&snapshot("INVOICE_2024.pdf", 1), &rule));
        assert!(matches(&snapshot("store-receipt.png", 1), &rule));
        assert!(!matches(&snapshot("holiday.png", 1), &rule));
    }

    #[test]
    fn test_include_keyword_ignores_extension() {
        let rule = Rule {
            include_keywords: vec!["pdf".to_string()],
            ..Rule::default()
        };
        assert!(!matches(&snapshot("report.pdf", 1), &rule));
    }

    #[test]
    fn test_exclude_keyword_rejects() {
        let rule = Rule {
            exclude_keywords: vec!["temp".to_string(), "tmp".to_string()],
            ..Rule::default()
        };
        assert!(!matches(&snapshot("temp_file.txt", 1), &rule));
        assert!(matches(&snapshot("final.txt", 1), &rule));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let rule = Rule {
            include_keywords: vec!["invoice".to_string()],
            exclude_keywords: vec!["draft".to_string()],
            ..Rule::default()
        };
        assert!(!matches(&snapshot("invoice_draft.pdf", 1), &rule));
    }

    #[test]
    fn test_regex_on_full_name_case_insensitive() {
        let rule = Rule {
            regex_pattern: Some(r"^scan_\d+\.PDF$".to_string()),
            ..Rule::default()
        };
        assert!(matches(&snapshot("SCAN_0042.pdf", 1), &rule));
        assert!(!matches(&snapshot("scan_x.pdf", 1), &rule));
    }

    #[test]
    fn test_invalid_regex_fails_closed() {
        let rule = Rule {
            regex_pattern: Some("[invalid(".to_string()),
            ..Rule::default()
        };
        assert!(!matches(&snapshot("anything.txt", 1), &rule));
    }

    #[test]
    fn test_blank_regex_is_ignored() {
        let rule = Rule {
            regex_pattern: Some("   ".to_string()),
            ..Rule::default()
        };
        assert!(matches(&snapshot("anything.txt", 1), &rule));
    }

    #[test]
    fn test_oversized_regex_fails_closed() {
        let rule = Rule {
            regex_pattern: Some(r"(?:\w{1000}){10}".to_string()),
            ..Rule::default()
        };
        assert!(!matches(&snapshot("anything.txt", 1), &rule));
    }

    #[test]
    fn test_compiled_rule_reusable() {
        let rule = Rule {
            extensions: vec!["txt".to_string()],
            ..Rule::default()
        };
        let compiled = CompiledRule::new(&rule);
        assert!(compiled.matches(&snapshot("a.txt", 1)));
        assert!(!compiled.matches(&snapshot("a.md", 1)));
        assert_eq!(compiled.rule().id, rule.id);
    }
}
