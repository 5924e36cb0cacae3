//! # Beam Analysis
//!
//! Computes multi-level beam groups over one built measure.
//!
//! ## Algorithm
//! 1. Flatten all segments' notes, preserving order, assigning a global
//!    absolute index.
//! 2. Scan left to right accumulating runs of beamable notes (eighth or
//!    shorter, not a rest). A run ends when the next note is not beamable,
//!    when a textual space precedes it (unless both sides share a tuplet
//!    group - tuplets force the primary beam to bridge), or when the scan
//!    crosses into a segment whose `leading_space` is set. A segment change
//!    with no leading space does not break the beam, so a beam may span two
//!    chord symbols written without an intervening space.
//! 3. Rests end the run at level 1 unless the rest sits inside the same
//!    tuplet group as the running beam (see [`RestBeamPolicy`]); a bridged
//!    rest still partitions the deeper levels.
//! 4. Each flushed run of two or more notes yields one level-1 beam plus,
//!    per deeper level, subsets of the notes that reach that level. In-run
//!    spaces partition those subsets even though the primary beam bridges
//!    them (`{161616 161616}6` is one level-1 beam of six and two level-2
//!    beams of three). A single-note subset becomes a beamlet whose
//!    direction follows the dotted-neighbor rule, then the run-midpoint
//!    rule. A multi-note subset spans exactly its notes; indices need not
//!    be contiguous (stepped beams).
//!
//! In the metric grouping modes (`binary`/`ternary`, or `auto-beam` resolved
//! by the parser) level-1 runs break at computed group boundaries instead of
//! textual spaces.
//!
//! The analyzer is stateless: [`MusicAnalyzer::analyze`] is a pure function
//! of its input and an instance may be reused across calls.

use crate::ast::{
    AnalyzedMeasure, BeamDirection, BeamGroup, FlatNote, GroupingMode, Measure, NoteRef,
};

/// Whether a rest may sit under a primary beam.
///
/// Observed grids disagree across notation versions on rests inside tuplets;
/// the policy keeps both behaviors available. `TupletScoped` (the default)
/// lets a tuplet's primary beam bridge rests belonging to the same group;
/// `AlwaysBreak` ends the run at every rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestBeamPolicy {
    #[default]
    TupletScoped,
    AlwaysBreak,
}

/// Stateless beam analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MusicAnalyzer {
    rest_policy: RestBeamPolicy,
}

/// One accumulated run of beamable notes. `partition[i]` marks that a new
/// secondary-level grouping starts at run position i (an in-run space or a
/// bridged rest).
struct Run {
    positions: Vec<usize>,
    partition: Vec<bool>,
}

impl Run {
    fn new() -> Self {
        Self {
            positions: Vec::new(),
            partition: Vec::new(),
        }
    }

    fn push(&mut self, flat_index: usize, partition: bool) {
        self.positions.push(flat_index);
        self.partition.push(partition);
    }

    fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

impl MusicAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rest_policy(rest_policy: RestBeamPolicy) -> Self {
        Self { rest_policy }
    }

    /// Analyze one measure. Pure: the same input always yields structurally
    /// identical beam groups.
    pub fn analyze(&self, measure: &Measure) -> AnalyzedMeasure {
        let all_notes = flatten(measure);
        let runs = self.collect_runs(measure, &all_notes);

        let mut beam_groups = Vec::new();
        for run in &runs {
            if run.len() < 2 {
                // A lone beamable note is a flagged note, not a beam.
                continue;
            }
            self.emit_groups(run, &all_notes, &mut beam_groups);
        }

        AnalyzedMeasure {
            measure: measure.clone(),
            all_notes,
            beam_groups,
        }
    }

    fn collect_runs(&self, measure: &Measure, all_notes: &[FlatNote]) -> Vec<Run> {
        let mut runs = Vec::new();
        let mut run = Run::new();
        // Set when a bridged rest passed since the last appended note.
        let mut pending_partition = false;
        let mut position_sixteenths = 0.0f64;

        let metric_unit = match measure.grouping {
            GroupingMode::Binary => Some(4.0),
            GroupingMode::Ternary => Some(6.0),
            GroupingMode::Auto | GroupingMode::UserDefined => None,
        };

        for (i, fnote) in all_notes.iter().enumerate() {
            let onset = position_sixteenths;
            position_sixteenths += fnote.note.duration_sixteenths();
            let note = &fnote.note;

            if !note.is_beamable() {
                if note.is_rest && !run.is_empty() {
                    let prev = &all_notes[*run.positions.last().unwrap()];
                    let bridged = self.rest_policy == RestBeamPolicy::TupletScoped
                        && same_tuplet_group(note, &prev.note);
                    if bridged {
                        pending_partition = true;
                        continue;
                    }
                }
                flush(&mut runs, &mut run);
                pending_partition = false;
                continue;
            }

            if run.is_empty() {
                run.push(i, false);
                pending_partition = false;
                continue;
            }

            let prev = &all_notes[*run.positions.last().unwrap()];
            let in_tuplet = same_tuplet_group(note, &prev.note);
            let crossing_spaced_segment = fnote.segment_index != prev.segment_index
                && measure
                    .chord_segments
                    .get(fnote.segment_index)
                    .is_some_and(|s| s.leading_space);
            let spaced = note.has_leading_space || crossing_spaced_segment;

            let mut partition = pending_partition;
            let mut break_run = false;
            match metric_unit {
                Some(unit) => {
                    if on_boundary(onset, unit) && !in_tuplet {
                        break_run = true;
                    } else if spaced {
                        partition = true;
                    }
                }
                None => {
                    if spaced {
                        if in_tuplet {
                            partition = true;
                        } else {
                            break_run = true;
                        }
                    }
                }
            }

            if break_run {
                flush(&mut runs, &mut run);
                run.push(i, false);
            } else {
                run.push(i, partition);
            }
            pending_partition = false;
        }

        flush(&mut runs, &mut run);
        runs
    }

    /// Emit the level-1 beam and every deeper level's subsets for one run.
    fn emit_groups(&self, run: &Run, all_notes: &[FlatNote], out: &mut Vec<BeamGroup>) {
        let refs: Vec<NoteRef> = run
            .positions
            .iter()
            .map(|&i| note_ref(&all_notes[i]))
            .collect();

        let max_level = run
            .positions
            .iter()
            .map(|&i| all_notes[i].note.beam_level())
            .max()
            .unwrap_or(0);

        out.push(BeamGroup {
            level: 1,
            notes: refs.clone(),
            is_partial: false,
            direction: None,
        });

        for level in 2..=max_level {
            let mut subset: Vec<usize> = Vec::new(); // run positions
            let mut subsets: Vec<Vec<usize>> = Vec::new();
            for p in 0..run.len() {
                if run.partition[p] && !subset.is_empty() {
                    subsets.push(std::mem::take(&mut subset));
                }
                if all_notes[run.positions[p]].note.beam_level() >= level {
                    subset.push(p);
                }
            }
            if !subset.is_empty() {
                subsets.push(subset);
            }

            for subset in subsets {
                if subset.len() == 1 {
                    let p = subset[0];
                    out.push(BeamGroup {
                        level,
                        notes: vec![refs[p]],
                        is_partial: true,
                        direction: Some(beamlet_direction(run, all_notes, p)),
                    });
                } else {
                    out.push(BeamGroup {
                        level,
                        notes: subset.iter().map(|&p| refs[p]).collect(),
                        is_partial: false,
                        direction: None,
                    });
                }
            }
        }
    }
}

/// Beamlet stubs lean toward a dotted neighbor; otherwise toward the far
/// half of the enclosing run, ties resolved at the midpoint.
fn beamlet_direction(run: &Run, all_notes: &[FlatNote], p: usize) -> BeamDirection {
    if p > 0 && all_notes[run.positions[p - 1]].note.dotted {
        return BeamDirection::Left;
    }
    if p + 1 < run.len() && all_notes[run.positions[p + 1]].note.dotted {
        return BeamDirection::Right;
    }
    let midpoint = (run.len() - 1) as f64 / 2.0;
    if (p as f64) < midpoint {
        BeamDirection::Right
    } else {
        BeamDirection::Left
    }
}

fn flatten(measure: &Measure) -> Vec<FlatNote> {
    let mut all = Vec::new();
    for (segment_index, segment) in measure.chord_segments.iter().enumerate() {
        for (note_index_in_segment, note) in segment.notes().enumerate() {
            all.push(FlatNote {
                note: note.clone(),
                segment_index,
                note_index_in_segment,
                absolute_index: all.len(),
            });
        }
    }
    all
}

fn note_ref(fnote: &FlatNote) -> NoteRef {
    NoteRef {
        segment_index: fnote.segment_index,
        note_index: fnote.note_index_in_segment,
    }
}

fn same_tuplet_group(a: &crate::ast::NoteElement, b: &crate::ast::NoteElement) -> bool {
    matches!(
        (a.tuplet, b.tuplet),
        (Some(x), Some(y)) if x.group_id == y.group_id
    )
}

fn on_boundary(position: f64, unit: f64) -> bool {
    let rem = position % unit;
    rem.abs() < 1e-6 || (unit - rem).abs() < 1e-6
}

fn flush(runs: &mut Vec<Run>, run: &mut Run) {
    if !run.is_empty() {
        runs.push(std::mem::replace(run, Run::new()));
    }
}
