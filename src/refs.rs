//! Man-page references and their validation cache.
//!
//! Every reference spelling encountered anywhere (`printf(3)`, `lsp(1)`)
//! is interned process-wide under its canonical form together with a
//! memoized validation state, no matter which document it came from.
//! Searching references in source code can produce a lot of invalid ones,
//! so the cache matters.

use std::collections::HashMap;
use std::process::{Command, Stdio};

use crate::config::expand_command;

/// Validation state of a reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

/// How references get validated.
#[derive(Debug, Clone)]
pub struct Verifier {
    /// Validation can be toggled off entirely, accepting everything.
    pub enabled: bool,
    /// Trust the preloaded apropos snapshot instead of running a command.
    pub with_apropos: bool,
    /// Command template with `%n` (name) and `%s` (section).
    pub command: String,
    /// Keep manual-page names case sensitive.
    pub man_case: bool,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            enabled: true,
            with_apropos: false,
            command: "man -w %s %n > /dev/null 2>&1".to_string(),
            man_case: false,
        }
    }
}

/// Canonical form of a reference spelling.
///
/// The flag is read at call time; entries interned earlier under a folded
/// key stay under that key.
pub fn canonical(spelling: &str, man_case: bool) -> String {
    if man_case {
        spelling.to_string()
    } else {
        spelling.to_lowercase()
    }
}

/// Split a reference into `(name, section)`.
///
/// Accepts `name(section)`, `name.section`, `section name` and a bare
/// `name` (empty section).  A dotted suffix only counts as a section when
/// it looks like one, i.e. starts with a digit or `n`.
pub fn parse_reference(s: &str) -> (String, String) {
    let s = s.trim();

    if let Some(open) = s.find('(') {
        let name = s[..open].to_string();
        let section = s[open + 1..].trim_end_matches(')').to_string();
        return (name, section);
    }

    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() == 2 && words[0].chars().all(|c| c.is_ascii_digit()) {
        return (words[1].to_string(), words[0].to_string());
    }

    if let Some(dot) = s.rfind('.') {
        let suffix = &s[dot + 1..];
        if suffix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || c == 'n')
        {
            return (s[..dot].to_string(), suffix.to_string());
        }
    }

    (s.to_string(), String::new())
}

/// Process-wide reference cache.
#[derive(Debug, Default)]
pub struct RefCache {
    map: HashMap<String, Validity>,
}

impl RefCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up a canonical name without interning it.
    pub fn find(&self, canonical_name: &str) -> Option<Validity> {
        self.map.get(canonical_name).copied()
    }

    /// Look up a canonical name, interning an unvalidated entry if it is
    /// new.
    pub fn search(&mut self, canonical_name: &str) -> Validity {
        *self
            .map
            .entry(canonical_name.to_string())
            .or_insert(Validity::Unknown)
    }

    /// Record a validation outcome.
    pub fn set(&mut self, canonical_name: &str, validity: Validity) {
        self.map.insert(canonical_name.to_string(), validity);
    }

    /// Intern a name from the apropos snapshot as known-valid.
    pub fn mark_valid(&mut self, canonical_name: &str) {
        self.map
            .insert(canonical_name.to_string(), Validity::Valid);
    }

    /// Whether the reference spelling names a real manual page.
    ///
    /// The outcome is memoized per canonical spelling for the process
    /// lifetime.
    pub fn validate(&mut self, spelling: &str, verifier: &Verifier) -> bool {
        if !verifier.enabled {
            return true;
        }

        let key = canonical(spelling, verifier.man_case);
        match self.search(&key) {
            Validity::Valid => true,
            Validity::Invalid => false,
            Validity::Unknown => {
                if verifier.with_apropos {
                    // Everything real is already in the snapshot.
                    self.set(&key, Validity::Invalid);
                    return false;
                }
                let (name, section) = parse_reference(&key);
                let valid = run_verify_command(&verifier.command, &name, &section);
                tracing::debug!(reference = %key, valid, "validated reference");
                self.set(
                    &key,
                    if valid { Validity::Valid } else { Validity::Invalid },
                );
                valid
            }
        }
    }
}

fn run_verify_command(template: &str, name: &str, section: &str) -> bool {
    let command = expand_command(template, name, section);
    Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_folds_case() {
        assert_eq!(canonical("Printf(3)", false), "printf(3)");
        assert_eq!(canonical("Printf(3)", true), "Printf(3)");
    }

    #[test]
    fn test_parse_name_section_parens() {
        assert_eq!(
            parse_reference("printf(3)"),
            ("printf".to_string(), "3".to_string())
        );
        assert_eq!(
            parse_reference("foo(3posix)"),
            ("foo".to_string(), "3posix".to_string())
        );
    }

    #[test]
    fn test_parse_name_dot_section() {
        assert_eq!(
            parse_reference("printf.3"),
            ("printf".to_string(), "3".to_string())
        );
    }

    #[test]
    fn test_parse_section_name() {
        assert_eq!(
            parse_reference("3 printf"),
            ("printf".to_string(), "3".to_string())
        );
    }

    #[test]
    fn test_parse_bare_name() {
        assert_eq!(parse_reference("ls"), ("ls".to_string(), String::new()));
    }

    #[test]
    fn test_parse_dotted_name_without_section() {
        assert_eq!(
            parse_reference("node.js"),
            ("node.js".to_string(), String::new())
        );
    }

    #[test]
    fn test_cache_find_after_search() {
        let mut cache = RefCache::new();
        assert!(cache.find("lsp(1)").is_none());
        assert_eq!(cache.search("lsp(1)"), Validity::Unknown);
        assert_eq!(cache.find("lsp(1)"), Some(Validity::Unknown));
        assert_eq!(cache.len(), 1);
        // Searching again returns the same entry.
        cache.set("lsp(1)", Validity::Valid);
        assert_eq!(cache.search("lsp(1)"), Validity::Valid);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_validate_disabled_accepts_all() {
        let mut cache = RefCache::new();
        let verifier = Verifier {
            enabled: false,
            ..Verifier::default()
        };
        assert!(cache.validate("whatever(9)", &verifier));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_validate_with_apropos_uses_snapshot() {
        let mut cache = RefCache::new();
        cache.mark_valid("lsp(1)");
        let verifier = Verifier {
            with_apropos: true,
            ..Verifier::default()
        };
        assert!(cache.validate("LSP(1)", &verifier));
        assert!(!cache.validate("printf(3)", &verifier));
        // The miss is memoized as invalid.
        assert_eq!(cache.find("printf(3)"), Some(Validity::Invalid));
    }

    #[test]
    fn test_validate_memoizes_command_outcome() {
        let mut cache = RefCache::new();
        let verifier = Verifier {
            command: "true %n %s".to_string(),
            ..Verifier::default()
        };
        assert!(cache.validate("anything(1)", &verifier));
        assert_eq!(cache.find("anything(1)"), Some(Validity::Valid));

        let failing = Verifier {
            command: "false %n %s".to_string(),
            ..Verifier::default()
        };
        // Memoized: the failing command is never consulted.
        assert!(cache.validate("anything(1)", &failing));
        assert!(!cache.validate("other(1)", &failing));
    }
}
