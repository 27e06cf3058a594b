//! Safety filter - textual blocklist
//!
//! A blocklist over raw source text is easy to walk around. `getattr(os,
//! "sys" + "tem")`, a module alias, or a string handed to something not on
//! the list all get through. This screen only catches the obvious spelling
//! of a dangerous call. It is NOT a containment boundary; the engine's
//! process isolation and deadline are what actually bound a snippet.
//!
//! The scan is a case-sensitive substring search in a fixed order. The first
//! pattern found wins and is reported verbatim.

use crate::capabilities::Capability;

/// Patterns blocked out of the box, in scan order
pub const DEFAULT_PATTERNS: &[(&str, Capability)] = &[
    ("os.system(", Capability::ProcessSpawn),
    ("subprocess", Capability::ProcessSpawn),
    ("eval(", Capability::DynamicEvaluation),
    ("exec(", Capability::DynamicEvaluation),
    ("__import__(", Capability::DynamicImport),
    ("importlib", Capability::DynamicImport),
    ("open(", Capability::FileIo),
    ("file(", Capability::FileIo),
    ("globals(", Capability::ScopeReflection),
    ("locals(", Capability::ScopeReflection),
    ("compile(", Capability::Recompilation),
];

/// One blocked substring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedPattern {
    pub pattern: String,
    pub capability: Capability,
}

/// Ordered blocklist applied to source text before anything else sees it
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    patterns: Vec<BlockedPattern>,
}

impl Default for SafetyFilter {
    fn default() -> Self {
        let mut filter = Self::empty();
        for (pattern, capability) in DEFAULT_PATTERNS {
            filter.block(pattern, *capability);
        }
        filter
    }
}

impl SafetyFilter {
    /// A filter that accepts everything
    pub fn empty() -> Self {
        Self { patterns: Vec::new() }
    }

    /// Append a pattern to the end of the scan order (no-op if present)
    pub fn block(&mut self, pattern: &str, capability: Capability) {
        if pattern.is_empty() || self.patterns.iter().any(|p| p.pattern == pattern) {
            return;
        }
        self.patterns.push(BlockedPattern {
            pattern: pattern.to_string(),
            capability,
        });
    }

    /// Remove a pattern from the blocklist
    pub fn permit(&mut self, pattern: &str) {
        self.patterns.retain(|p| p.pattern != pattern);
    }

    pub fn patterns(&self) -> &[BlockedPattern] {
        &self.patterns
    }

    /// Screen source text. Pure: no parsing, no side effects.
    pub fn screen(&self, source: &str) -> Result<(), Rejected> {
        match self.patterns.iter().find(|p| source.contains(p.pattern.as_str())) {
            Some(hit) => Err(Rejected {
                pattern: hit.pattern.clone(),
                capability: hit.capability,
            }),
            None => Ok(()),
        }
    }
}

/// Why the filter refused a snippet
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Potentially unsafe code detected: {pattern}")]
pub struct Rejected {
    /// The matched pattern, verbatim
    pub pattern: String,
    pub capability: Capability,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_code_accepted() {
        let filter = SafetyFilter::default();
        assert!(filter.screen("print('hello')").is_ok());
        assert!(filter.screen("import math\nprint(math.sqrt(2))").is_ok());
        assert!(filter.screen("").is_ok());
    }

    #[test]
    fn test_blocked_patterns() {
        let filter = SafetyFilter::default();
        for (source, pattern) in [
            ("import os\nos.system('ls')", "os.system("),
            ("import subprocess", "subprocess"),
            ("eval('1+1')", "eval("),
            ("exec('x = 1')", "exec("),
            ("m = __import__('os')", "__import__("),
            ("import importlib", "importlib"),
            ("f = open('/etc/passwd')", "open("),
            ("print(globals())", "globals("),
            ("code = compile('1', 'x', 'eval')", "compile("),
        ] {
            let err = filter.screen(source).unwrap_err();
            assert_eq!(err.pattern, pattern, "source: {source}");
        }
    }

    #[test]
    fn test_first_pattern_in_order_wins() {
        let filter = SafetyFilter::default();
        // contains both `eval(` and `subprocess`; subprocess is earlier in scan order
        let err = filter.screen("eval(x)\nimport subprocess").unwrap_err();
        assert_eq!(err.pattern, "subprocess");
        assert_eq!(err.capability, Capability::ProcessSpawn);
        assert_eq!(err.to_string(), "Potentially unsafe code detected: subprocess");
    }

    #[test]
    fn test_scan_is_case_sensitive() {
        let filter = SafetyFilter::default();
        assert!(filter.screen("EVAL(x)").is_ok());
        assert!(filter.screen("SubProcess").is_ok());
    }

    #[test]
    fn test_substring_catches_lookalikes() {
        // plain substring match: `reopen(` contains `open(`
        let filter = SafetyFilter::default();
        assert_eq!(filter.screen("reopen(door)").unwrap_err().pattern, "open(");
    }

    #[test]
    fn test_obfuscation_is_not_caught() {
        let filter = SafetyFilter::default();
        let sneaky = "import os\nf = getattr(os, 'sys' + 'tem')\nf('id')";
        assert!(filter.screen(sneaky).is_ok());
    }

    #[test]
    fn test_permit_and_block() {
        let mut filter = SafetyFilter::default();
        filter.permit("open(");
        assert!(filter.screen("open('data.txt')").is_ok());

        filter.block("socket", Capability::Custom);
        filter.block("socket", Capability::Custom);
        assert_eq!(filter.patterns().iter().filter(|p| p.pattern == "socket").count(), 1);
        assert_eq!(filter.screen("import socket").unwrap_err().pattern, "socket");
    }

    #[test]
    fn test_empty_filter() {
        let filter = SafetyFilter::empty();
        assert!(filter.screen("os.system('rm -rf /')").is_ok());
    }
}
