// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort continuation context extracted from a force-killed agent's
//! partial output.
//!
//! Extraction is heuristic: file paths mentioned near the end of the output
//! plus the last few substantive lines. Correctness never depends on it; a
//! re-run without it only redoes work.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// How many trailing lines of output to scan and to keep.
const TAIL_LINES: usize = 40;
const KEEP_LINES: usize = 8;

/// Context prepended to the next prompt for the same phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationContext {
    /// File paths mentioned in the output tail
    pub files: Vec<String>,
    /// Last substantive output lines
    pub last_lines: Vec<String>,
}

impl ContinuationContext {
    /// Extract continuation hints from the tail of a partial output.
    pub fn extract(partial_output: &str) -> Self {
        let lines: Vec<&str> = partial_output.lines().collect();
        let tail_start = lines.len().saturating_sub(TAIL_LINES);
        let tail = &lines[tail_start..];

        let mut files: BTreeSet<String> = BTreeSet::new();
        for line in tail {
            for token in line.split_whitespace() {
                let token = token.trim_matches(|c: char| "\"'`,;:()[]<>".contains(c));
                if looks_like_path(token) {
                    files.insert(token.to_string());
                }
            }
        }

        let last_lines: Vec<String> = tail
            .iter()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .take(KEEP_LINES)
            .map(|l| l.trim().to_string())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        Self { files: files.into_iter().collect(), last_lines }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.last_lines.is_empty()
    }

    /// Render as a prompt prefix for the phase re-run.
    pub fn as_prompt_prefix(&self) -> String {
        let mut out = String::from(
            "A previous attempt at this step was interrupted. Partial progress:\n",
        );
        if !self.files.is_empty() {
            out.push_str("Files already touched:\n");
            for file in &self.files {
                out.push_str("  - ");
                out.push_str(file);
                out.push('\n');
            }
        }
        if !self.last_lines.is_empty() {
            out.push_str("Last output before interruption:\n");
            for line in &self.last_lines {
                out.push_str("  > ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str("Avoid redoing completed work; verify it instead.\n\n");
        out
    }
}

/// A token counts as a file path when it has a path separator or a known
/// source-file extension and no scheme prefix.
fn looks_like_path(token: &str) -> bool {
    if token.len() < 3 || token.contains("://") {
        return false;
    }
    let has_separator = token.contains('/');
    let has_extension = extensions()
        .iter()
        .any(|ext| token.len() > ext.len() && token.ends_with(ext));
    (has_separator && has_extension) || (has_separator && !token.starts_with('-') && token.matches('/').count() >= 2)
        || (!has_separator && has_extension)
}

fn extensions() -> &'static [&'static str] {
    static EXT: OnceLock<Vec<&'static str>> = OnceLock::new();
    EXT.get_or_init(|| {
        vec![
            ".rs", ".ts", ".tsx", ".js", ".py", ".go", ".java", ".c", ".h", ".cpp", ".md",
            ".toml", ".json", ".yaml", ".yml", ".sql", ".sh",
        ]
    })
}

#[cfg(test)]
#[path = "continuation_tests.rs"]
mod tests;
