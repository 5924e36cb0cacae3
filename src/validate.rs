//! # Duration Validation
//!
//! Checks each measure's total notated duration against the active time
//! signature. A mismatch is a [`Diagnostic`], never an error: the grid is
//! rendered as parsed and the problem is surfaced to the caller.
//!
//! Inline meter changes are honored: a measure carrying its own
//! `time_signature` updates the expectation from that point on. Chord-only
//! and repeat measures have no rhythm to sum and are skipped.

use crate::ast::{Measure, TimeSignature};
use crate::error::Diagnostic;

/// Floating point slack for dotted and tupleted sums.
const TOLERANCE: f64 = 1e-6;

/// Validate all measures; returns one diagnostic per mismatched measure.
pub fn validate_durations(measures: &[Measure], grid_ts: &TimeSignature) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut current_ts = *grid_ts;

    for (i, measure) in measures.iter().enumerate() {
        if let Some(ts) = measure.time_signature {
            current_ts = ts;
        }
        if measure.is_repeat || !measure.has_rhythm() {
            continue;
        }
        if let Some(d) = validate_measure(measure, &current_ts, i) {
            diagnostics.push(d);
        }
    }

    diagnostics
}

fn validate_measure(
    measure: &Measure,
    ts: &TimeSignature,
    measure_index: usize,
) -> Option<Diagnostic> {
    let total = measure.total_duration_fraction();
    let expected = ts.whole_note_fraction();

    if (total - expected).abs() > TOLERANCE {
        let found_quarters = round_beats(total * 4.0);
        let expected_quarters = round_beats(ts.quarter_notes());
        return Some(Diagnostic::in_measure(
            format!(
                "expected {} quarter-notes, found {}",
                expected_quarters, found_quarters
            ),
            measure_index,
        ));
    }

    None
}

/// Tame float noise in the user-facing message: 2.9999999 reads as 3.
fn round_beats(beats: f64) -> f64 {
    (beats * 1000.0).round() / 1000.0
}
