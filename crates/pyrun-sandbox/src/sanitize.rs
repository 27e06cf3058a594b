//! Diagnostic redaction
//!
//! Interpreter diagnostics name the files they come from, and those names are
//! absolute host paths. Nothing leaves the sandbox until it has been through
//! here.

use serde::{Deserialize, Serialize};

/// What kind of text is being cleaned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Exception-only formatting of a compile failure
    SyntaxError,
    /// A full formatted traceback
    Traceback,
}

/// Redacts host paths from diagnostic text
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    /// Host prefixes scrubbed anywhere in the text, longest first
    prefixes: Vec<String>,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scrub `prefix` (and `prefix` + separator) wherever it appears
    pub fn redact_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches(is_separator);
        if trimmed.is_empty() || self.prefixes.iter().any(|p| p == trimmed) {
            return self;
        }
        self.prefixes.push(trimmed.to_string());
        self.prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        self
    }

    pub fn sanitize(&self, raw: &str, kind: DiagnosticKind) -> String {
        let scrubbed = self.scrub(raw);
        let lines = scrubbed.split('\n');
        let cleaned: Vec<String> = match kind {
            DiagnosticKind::SyntaxError => lines
                .map(|line| redact_file_line(line).unwrap_or_else(|| line.to_string()))
                .collect(),
            DiagnosticKind::Traceback => lines
                .filter(|line| !line.trim().is_empty())
                .map(|line| redact_file_line(line).unwrap_or_else(|| line.to_string()))
                .collect(),
        };
        cleaned.join("\n")
    }

    /// Prefix scrubbing only; line structure is untouched
    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for prefix in &self.prefixes {
            for sep in ['/', '\\'] {
                out = out.replace(&format!("{prefix}{sep}"), "");
            }
            out = out.replace(prefix.as_str(), "<sandbox>");
        }
        out
    }
}

/// Sanitize with no extra host prefixes
pub fn sanitize(raw: &str, kind: DiagnosticKind) -> String {
    Sanitizer::default().sanitize(raw, kind)
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// `  File "/a/b/x.py", line 3` -> `  File "x.py", line 3`
fn redact_file_line(line: &str) -> Option<String> {
    const MARKER: &str = "File \"";
    let start = line.find(MARKER)?;
    let after = &line[start + MARKER.len()..];
    let end = after.find('"')?;
    let path = &after[..end];
    if !path.contains(is_separator) {
        return None;
    }
    let name = path.rsplit(is_separator).next().unwrap_or(path);
    Some(format!(
        "{}{}{}\"{}",
        &line[..start],
        MARKER,
        name,
        &after[end + 1..]
    ))
}
