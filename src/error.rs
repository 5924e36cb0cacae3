//! # Error Types
//!
//! This module defines the error and diagnostic types for the chordgrid compiler.
//!
//! There are two severities, and they must not be confused:
//!
//! - [`GridError`] - fatal, returned as `Err`. Reserved for catastrophic
//!   failures (nothing recognizable in the input at all, CLI-level I/O).
//! - [`Diagnostic`] - non-fatal, accumulated on the parsed grid. All
//!   notation-level problems (unknown tokens, malformed tuplet ratios,
//!   duration mismatches) become diagnostics; parsing continues and the
//!   caller always receives a best-effort structured result.
//!
//! ## Usage
//! ```rust
//! use chordgrid::parse;
//!
//! let grid = parse("4/4 | C[8888 888] |").unwrap();
//! for diag in &grid.errors {
//!     eprintln!("{}", diag);
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    /// Parse error with location information.
    ///
    /// Only raised when the lexer cannot make any sense of the input;
    /// ordinary bad tokens inside an otherwise well-formed grid become
    /// [`Diagnostic`]s instead.
    #[error("Parse error at line {line}, column {column}: {message}")]
    ParseError {
        line: usize,
        column: usize,
        message: String,
    },
}

/// A non-fatal, user-facing problem attached to a parsed grid.
///
/// `measure_index` is zero-based when present. `position` is the
/// `(line, column)` of the offending token when the lexer could locate one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<(usize, usize)>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            measure_index: None,
            position: None,
        }
    }

    pub fn in_measure(message: impl Into<String>, measure_index: usize) -> Self {
        Self {
            message: message.into(),
            measure_index: Some(measure_index),
            position: None,
        }
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.position = Some((line, column));
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.measure_index, self.position) {
            (Some(m), Some((l, c))) => {
                write!(f, "measure {} ({}:{}): {}", m + 1, l, c, self.message)
            }
            (Some(m), None) => write!(f, "measure {}: {}", m + 1, self.message),
            (None, Some((l, c))) => write!(f, "{}:{}: {}", l, c, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_parse_error_display() {
        let err = GridError::ParseError {
            line: 2,
            column: 5,
            message: "no recognizable grid notation in input".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Parse error at line 2, column 5: no recognizable grid notation in input"
        );
    }

    #[test]
    fn test_structural_problems_are_diagnostics_not_errors() {
        // Unterminated brackets, bad directives and malformed tuplets all
        // surface as diagnostics on an Ok grid.
        for source in ["4/4 | C[44", "frobnicate\n4/4 | C[4 4 4 4] |", "4/4 | C[{888 4] |"] {
            let grid = parse(source).unwrap();
            assert!(!grid.errors.is_empty(), "no diagnostic for {:?}", source);
        }
    }

    #[test]
    fn test_diagnostic_display_locations() {
        let d = Diagnostic::in_measure("too short", 1);
        assert_eq!(d.to_string(), "measure 2: too short");
        let d = Diagnostic::new("bad token").at(3, 7);
        assert_eq!(d.to_string(), "3:7: bad token");
    }
}
