//! # Public API
//!
//! This module contains the main entry points for the chordgrid library.
//!
//! ## Entry Points
//!
//! - [`compile()`] - Full pipeline: parse, validate durations, attach
//!   counting labels (recommended)
//! - [`compile_uncounted()`] - Parse and validate only, no counting labels
//! - [`compile_measures()`] - The flattened per-segment note view
//! - [`analyze()`] - Everything [`compile()`] does plus per-measure beam
//!   analysis
//!
//! ## Typical Usage
//!
//! ```rust
//! use chordgrid::compile;
//!
//! let grid = compile("4/4 | C[8888 8888] | Am[4. 8 2] |")?;
//! assert_eq!(grid.measures.len(), 2);
//! assert!(grid.errors.is_empty());
//! # Ok::<(), chordgrid::GridError>(())
//! ```
//!
//! Malformed measures do not abort the pipeline: the parser skips to the
//! next barline and records a [`Diagnostic`](crate::Diagnostic) on the
//! returned grid, so one bad measure never hides the rest of the chart.

use crate::analyzer::{MusicAnalyzer, RestBeamPolicy};
use crate::ast::{AnalyzedMeasure, Grid, ParsedGrid};
use crate::counting::analyze_counting;
use crate::error::GridError;
use crate::parser;

/// Compile a grid source string into a [`Grid`].
///
/// This is the main entry point for the library.
///
/// # Pipeline
/// 1. Tokenize directives and measures
/// 2. Build measures (segments, beats, ties, tuplets, transposition)
/// 3. Validate measure durations against the active time signature
/// 4. Attach pedagogical counting labels
///
/// # Example
/// ```rust
/// use chordgrid::compile;
///
/// let grid = compile("4/4 | C[4 4 4 4] |")?;
/// let first = &grid.measures[0].chord_segments[0];
/// assert_eq!(first.chord, "C");
/// # Ok::<(), chordgrid::GridError>(())
/// ```
///
/// # Errors
/// Returns [`GridError`] only when the source yields no usable grid at all;
/// per-measure problems are reported in [`Grid::errors`].
pub fn compile(source: &str) -> Result<Grid, GridError> {
    let mut grid = parser::parse(source)?;
    let ts = grid.time_signature;
    analyze_counting(&mut grid.measures, &ts);
    Ok(grid)
}

/// Compile without counting labels.
///
/// Identical to [`compile()`] but leaves every note's `counting_*` fields
/// unset. Useful for callers that render rhythm only.
pub fn compile_uncounted(source: &str) -> Result<Grid, GridError> {
    parser::parse(source)
}

/// Compile to the flattened [`ParsedGrid`] view: per-measure segments with
/// plain note lists and no beat substructure.
///
/// Derived from the same build as [`compile()`], so segment, tie and tuplet
/// semantics are guaranteed to match.
///
/// # Example
/// ```rust
/// use chordgrid::compile_measures;
///
/// let parsed = compile_measures("4/4 | C[4 8]G[8 2] |")?;
/// assert_eq!(parsed.measures[0].segments.len(), 2);
/// # Ok::<(), chordgrid::GridError>(())
/// ```
pub fn compile_measures(source: &str) -> Result<ParsedGrid, GridError> {
    parser::parse_measures(source)
}

/// Compile and run beam analysis over every measure.
///
/// Returns the analyzed measures alongside the grid they came from. The
/// measures inside the grid carry counting labels; the analyzed view adds
/// flattened notes and beam groups.
///
/// # Example
/// ```rust
/// use chordgrid::analyze;
///
/// let (grid, analyzed) = analyze("4/4 | C[8888 8888] |")?;
/// assert!(grid.errors.is_empty());
/// assert_eq!(analyzed[0].beam_groups.len(), 2);
/// # Ok::<(), chordgrid::GridError>(())
/// ```
pub fn analyze(source: &str) -> Result<(Grid, Vec<AnalyzedMeasure>), GridError> {
    analyze_with_policy(source, RestBeamPolicy::default())
}

/// [`analyze()`] with an explicit rest beaming policy.
pub fn analyze_with_policy(
    source: &str,
    rest_policy: RestBeamPolicy,
) -> Result<(Grid, Vec<AnalyzedMeasure>), GridError> {
    let grid = compile(source)?;
    let analyzer = MusicAnalyzer::with_rest_policy(rest_policy);
    let analyzed = grid.measures.iter().map(|m| analyzer.analyze(m)).collect();
    Ok((grid, analyzed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_attaches_counting() {
        let grid = compile("4/4 | C[4 4 4 4] |").unwrap();
        let note = grid.measures[0].chord_segments[0].beats[0]
            .notes
            .first()
            .unwrap();
        assert_eq!(note.counting_label.as_deref(), Some("1"));
    }

    #[test]
    fn test_compile_uncounted_leaves_labels_unset() {
        let grid = compile_uncounted("4/4 | C[4 4 4 4] |").unwrap();
        let note = grid.measures[0].chord_segments[0].beats[0]
            .notes
            .first()
            .unwrap();
        assert!(note.counting_label.is_none());
    }

    #[test]
    fn test_analyze_pairs_grid_and_measures() {
        let (grid, analyzed) = analyze("4/4 | C[88888888] | G |").unwrap();
        assert_eq!(grid.measures.len(), analyzed.len());
        assert_eq!(analyzed[0].beam_groups.len(), 1);
        assert!(analyzed[1].beam_groups.is_empty());
    }
}
