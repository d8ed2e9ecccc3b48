//! Compiler diagnostic extraction.
//!
//! [`parse`] turns the raw stderr of a failed build into a [`Diagnostic`]:
//! the most relevant error excerpt plus, when recognisable, the source file
//! and line it points at. Parsing never fails; output without any error
//! marker degrades to a summary of the last few lines.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Token that marks a compiler error line (GHC, gcc, clang, rustc, ...).
pub const ERROR_MARKER: &str = "error:";

/// Lines kept after the marker line when building the excerpt.
const LINES_AFTER_MARKER: usize = 3;

/// Lines kept from the end of the output when no marker is present.
const FALLBACK_TAIL_LINES: usize = 3;

/// Message used when the build tool failed without printing anything.
pub const EMPTY_OUTPUT_MESSAGE: &str = "Build failed without diagnostic output";

/// Source file extensions recognised by the file-name extraction.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "hs", "lhs", "rs", "c", "h", "cc", "cpp", "hpp", "go", "py", "js", "ts", "java", "ml",
];

/// `:<line>:<column>:` as printed by most compilers.
static LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\d+):\d+:").expect("line pattern is valid"));

/// A bare file name (no directory part) with a known extension, followed by `:`.
static FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"([^/\\\s]+\.(?:{})):", SOURCE_EXTENSIONS.join("|"));
    Regex::new(&pattern).expect("file pattern is valid")
});

/// Structured summary of a build failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The most relevant error excerpt. Never empty.
    pub message: String,
    /// Source line the excerpt points at, if one could be extracted.
    pub line: Option<u32>,
    /// Source file name (without directories), if one could be extracted.
    pub file: Option<String>,
}

impl Diagnostic {
    /// A diagnostic carrying only a message, for failures that never reached
    /// the compiler (preparation errors, timeouts, crashes).
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: if message.trim().is_empty() {
                EMPTY_OUTPUT_MESSAGE.to_string()
            } else {
                message
            },
            line: None,
            file: None,
        }
    }
}

/// Parse raw compiler error output into a [`Diagnostic`].
///
/// Scans from the end for the last line containing [`ERROR_MARKER`] and keeps
/// it with up to three following lines, dropping blank ones. Without a marker
/// the last three non-blank lines are used instead.
pub fn parse(raw: &str) -> Diagnostic {
    let lines: Vec<&str> = raw.lines().collect();

    let excerpt: Vec<&str> = match lines.iter().rposition(|l| l.contains(ERROR_MARKER)) {
        Some(idx) => lines[idx..]
            .iter()
            .take(1 + LINES_AFTER_MARKER)
            .filter(|l| !l.trim().is_empty())
            .copied()
            .collect(),
        None => {
            let non_blank: Vec<&str> = lines
                .iter()
                .filter(|l| !l.trim().is_empty())
                .copied()
                .collect();
            let start = non_blank.len().saturating_sub(FALLBACK_TAIL_LINES);
            non_blank[start..].to_vec()
        }
    };

    let message = excerpt
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    if message.is_empty() {
        return Diagnostic::from_message(EMPTY_OUTPUT_MESSAGE);
    }

    let line = LINE_PATTERN
        .captures(&message)
        .and_then(|caps| caps[1].parse().ok());
    let file = FILE_PATTERN
        .captures(&message)
        .map(|caps| caps[1].to_string());

    Diagnostic {
        message,
        line,
        file,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
