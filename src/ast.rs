//! # Grid Model Types
//!
//! This module defines all type structures for the chordgrid model.
//!
//! ## Type Hierarchy
//! ```text
//! Grid
//!   ├── GridContext (grouping mode, finger/pick display, transpose, stems)
//!   ├── errors: Vec<Diagnostic>
//!   └── Vec<Measure>
//!         ├── Vec<ChordSegment>
//!         │     ├── chord: String
//!         │     ├── leading_space: bool
//!         │     └── Vec<Beat>
//!         │           └── Vec<NoteElement>
//!         ├── barline, volta, repeat flags
//!         └── time_signature (inline change only)
//!
//! AnalyzedMeasure (produced by the analyzer, never by the parser)
//!   ├── all_notes: Vec<FlatNote>   (flattened, absolute-indexed)
//!   └── beam_groups: Vec<BeamGroup> (NoteRef back-references)
//! ```
//!
//! ## Key Concepts
//!
//! ### Duration Calculation
//! A note value is a plain denominator (1, 2, 4, 8, 16, 32, 64). The notated
//! duration of one element is `1/value x (1.5 if dotted) x (M/N if tupleted)`
//! as a fraction of a whole note. Positions and spans in the analysis passes
//! are measured in sixteenth-note units (`NoteElement::duration_sixteenths`).
//!
//! ### Ties
//! `tie_start` on note i is matched by `tie_end` on note i+1 in absolute note
//! order across segments. A tie that leaves or enters the measure is marked
//! `tie_to_void` / `tie_from_void`; drawing the cross-measure curve is the
//! renderer's concern.
//!
//! ### Back-references
//! [`NoteRef`] is a tagged index pair into the measure a [`BeamGroup`] was
//! derived from. Beam groups only read positions, they never own notes, and a
//! `NoteRef` must not be retained across re-analysis of a different measure.
//!
//! ## Related Modules
//! - `parser` - builds `Grid`/`Measure` from source
//! - `validate` - checks measure durations against the time signature
//! - `analyzer` - produces `AnalyzedMeasure`
//! - `counting` - attaches `counting_*` fields onto `NoteElement` in place

use serde::{Deserialize, Serialize};

use crate::error::Diagnostic;

/// Time signature (e.g. 4/4, 3/4, 6/8). Immutable per measure; may change
/// inline mid-grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
    /// The note value that carries one metric beat. Equal to the denominator
    /// unless set otherwise; compound-meter beat grouping is handled by the
    /// grouping mode, not here.
    pub beat_unit: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
            beat_unit: 4,
        }
    }
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
            beat_unit: denominator,
        }
    }

    /// Expected total measure duration as a fraction of a whole note.
    pub fn whole_note_fraction(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Expected total measure duration in quarter notes (used for the
    /// duration-mismatch diagnostic).
    pub fn quarter_notes(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }

    /// Expected total measure duration in sixteenth-note units.
    pub fn sixteenths(&self) -> f64 {
        self.numerator as f64 * 16.0 / self.denominator as f64
    }

    /// Compound meters (6/8, 9/8, 12/8, and 3/8) group their beats in threes.
    pub fn is_compound(&self) -> bool {
        self.denominator >= 8 && self.numerator % 3 == 0
    }
}

/// Tuplet membership for one note.
///
/// `count` is the notated note count N of the declared `N:M` ratio and
/// `actual_count` the metric count M the group occupies, so the duration
/// factor per note is `M/N`. Membership is closed: every note sharing a
/// `group_id` shares the same `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tuplet {
    pub group_id: usize,
    pub count: u8,
    pub actual_count: u8,
}

impl Tuplet {
    /// The default metric count for a notated count: the largest power of two
    /// strictly below it (3 -> 2, 5 -> 4, 6 -> 4, 7 -> 4).
    pub fn default_actual_count(count: u8) -> u8 {
        let mut m = 1u8;
        while m * 2 < count {
            m *= 2;
        }
        m.max(1)
    }
}

/// Display size of a pedagogical counting label: tall (on the beat), medium
/// (subdivision), small (rest or tie continuation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountingSize {
    #[serde(rename = "t")]
    Tall,
    #[serde(rename = "m")]
    Medium,
    #[serde(rename = "s")]
    Small,
}

/// One rhythmic atom of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteElement {
    /// Duration denominator: 1, 2, 4, 8, 16, 32, 64. Higher = shorter.
    pub value: u8,
    pub dotted: bool,
    pub is_rest: bool,
    pub tie_start: bool,
    pub tie_end: bool,
    /// Tie leaving the measure with no partner note inside it.
    pub tie_to_void: bool,
    /// Tie entering the measure from outside it.
    pub tie_from_void: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuplet: Option<Tuplet>,
    /// True if a textual space immediately preceded this note in its token
    /// stream. The primary beam/grouping-break signal.
    pub has_leading_space: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counting_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counting_size: Option<CountingSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counting_number: Option<u8>,
}

impl NoteElement {
    pub fn new(value: u8) -> Self {
        Self {
            value,
            dotted: false,
            is_rest: false,
            tie_start: false,
            tie_end: false,
            tie_to_void: false,
            tie_from_void: false,
            tuplet: None,
            has_leading_space: false,
            counting_label: None,
            counting_size: None,
            counting_number: None,
        }
    }

    pub fn rest(value: u8) -> Self {
        Self {
            is_rest: true,
            ..Self::new(value)
        }
    }

    /// Notated duration as a fraction of a whole note, dots and tuplet ratio
    /// included.
    pub fn duration_fraction(&self) -> f64 {
        let mut d = 1.0 / self.value as f64;
        if self.dotted {
            d *= 1.5;
        }
        if let Some(t) = self.tuplet {
            d *= t.actual_count as f64 / t.count as f64;
        }
        d
    }

    /// Notated duration in sixteenth-note units.
    pub fn duration_sixteenths(&self) -> f64 {
        self.duration_fraction() * 16.0
    }

    /// Beam depth this note value reaches: 1 for eighths, 2 for sixteenths,
    /// 3 for thirty-seconds, 4 for sixty-fourths, 0 for anything longer.
    pub fn beam_level(&self) -> u8 {
        match self.value {
            v if v >= 64 => 4,
            v if v >= 32 => 3,
            v if v >= 16 => 2,
            v if v >= 8 => 1,
            _ => 0,
        }
    }

    /// A note takes part in beam runs when it is short enough and not a rest.
    pub fn is_beamable(&self) -> bool {
        self.value >= 8 && !self.is_rest
    }
}

/// One space-delimited cluster of notes inside a segment's rhythm brackets.
///
/// `has_beam`/`beam_groups` are the legacy per-beat view kept for renderers
/// that lay out beat by beat; the cross-segment analysis in `analyzer` is
/// authoritative.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beat {
    pub notes: Vec<NoteElement>,
    pub has_beam: bool,
    pub beam_groups: Vec<Vec<usize>>,
}

impl Beat {
    pub fn from_notes(notes: Vec<NoteElement>) -> Self {
        let mut beam_groups = Vec::new();
        let mut run: Vec<usize> = Vec::new();
        for (i, n) in notes.iter().enumerate() {
            if n.is_beamable() {
                run.push(i);
            } else if run.len() >= 2 {
                beam_groups.push(std::mem::take(&mut run));
            } else {
                run.clear();
            }
        }
        if run.len() >= 2 {
            beam_groups.push(run);
        }
        Self {
            has_beam: !beam_groups.is_empty(),
            notes,
            beam_groups,
        }
    }
}

/// One harmonic region within a measure: a chord symbol and its own rhythm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordSegment {
    pub chord: String,
    /// True if a textual space preceded this segment's onset. The analyzer
    /// uses it to decide whether a beam may cross into the segment.
    pub leading_space: bool,
    pub beats: Vec<Beat>,
}

impl ChordSegment {
    pub fn chord_only(chord: String, leading_space: bool) -> Self {
        Self {
            chord,
            leading_space,
            beats: Vec::new(),
        }
    }

    /// All notes of the segment in order, across beats.
    pub fn notes(&self) -> impl Iterator<Item = &NoteElement> {
        self.beats.iter().flat_map(|b| b.notes.iter())
    }

    pub fn notes_mut(&mut self) -> impl Iterator<Item = &mut NoteElement> {
        self.beats.iter_mut().flat_map(|b| b.notes.iter_mut())
    }

    pub fn note_count(&self) -> usize {
        self.beats.iter().map(|b| b.notes.len()).sum()
    }
}

/// Barline kinds. A measure stores the barline that closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Barline {
    Single,
    Double,
    RepeatStart,
    RepeatEnd,
    DoubleRepeatStart,
    DoubleRepeatEnd,
}

impl Barline {
    pub fn is_repeat_start(&self) -> bool {
        matches!(self, Barline::RepeatStart | Barline::DoubleRepeatStart)
    }

    pub fn is_repeat_end(&self) -> bool {
        matches!(self, Barline::RepeatEnd | Barline::DoubleRepeatEnd)
    }
}

/// Beam-grouping policy: textual spacing (the default) or a computed metric
/// rule. `Auto` is resolved by the builder against the active time signature,
/// so analyzed measures only ever carry `UserDefined`, `Binary` or `Ternary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingMode {
    #[default]
    UserDefined,
    Auto,
    Binary,
    Ternary,
}

/// A single measure of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub chord_segments: Vec<ChordSegment>,
    pub barline: Barline,
    /// `|:`-style repeat opening attached to this measure.
    pub repeat_start: bool,
    /// Volta numbers (`.1-3`, `.4`) attached to this measure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volta: Option<Vec<u8>>,
    /// `%` / `[%]`: repeat the previous measure; no rhythm is re-derived.
    pub is_repeat: bool,
    pub is_line_break: bool,
    /// The raw notation this measure was parsed from.
    pub source: String,
    /// Present only when the meter changed at this measure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_signature: Option<TimeSignature>,
    /// Effective grouping mode for this measure, `Auto` already resolved.
    pub grouping: GroupingMode,
}

impl Measure {
    pub fn empty() -> Self {
        Self {
            chord_segments: Vec::new(),
            barline: Barline::Single,
            repeat_start: false,
            volta: None,
            is_repeat: false,
            is_line_break: false,
            source: String::new(),
            time_signature: None,
            grouping: GroupingMode::UserDefined,
        }
    }

    /// A measure with chord symbols but no rhythm tokens.
    pub fn is_chord_only(&self) -> bool {
        !self.chord_segments.is_empty()
            && self.chord_segments.iter().all(|s| s.beats.is_empty())
    }

    pub fn has_rhythm(&self) -> bool {
        self.chord_segments.iter().any(|s| !s.beats.is_empty())
    }

    /// Total notated duration as a fraction of a whole note.
    pub fn total_duration_fraction(&self) -> f64 {
        self.chord_segments
            .iter()
            .flat_map(|s| s.notes())
            .map(|n| n.duration_fraction())
            .sum()
    }
}

/// Back-reference into the measure a beam group was derived from. Never an
/// ownership link; `note_index` counts notes within the segment across beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRef {
    pub segment_index: usize,
    pub note_index: usize,
}

/// Direction a beamlet stub points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeamDirection {
    Left,
    Right,
}

/// One beam at one level. Level 1 is the eighth-note beam, 4 the
/// sixty-fourth. A single-note group is a beamlet (`is_partial`) with a
/// direction; a multi-note group spans exactly the referenced notes, which
/// need not be contiguous (a stepped beam may skip a note that does not
/// reach the level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeamGroup {
    pub level: u8,
    pub notes: Vec<NoteRef>,
    pub is_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<BeamDirection>,
}

/// A note in the analyzer's flattened, absolute-ordered view of a measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatNote {
    pub note: NoteElement,
    pub segment_index: usize,
    pub note_index_in_segment: usize,
    pub absolute_index: usize,
}

/// A measure plus its flattened note sequence and computed beam groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedMeasure {
    pub measure: Measure,
    pub all_notes: Vec<FlatNote>,
    pub beam_groups: Vec<BeamGroup>,
}

/// Language for fingering labels (`finger` / `finger:fr` directives).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerLanguage {
    English,
    French,
}

/// Stem orientation for the whole grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemDirection {
    #[default]
    Up,
    Down,
}

/// Cross-cutting defaults collected from the directive lines, threaded
/// through the builder as an immutable value. Inline overrides produce a new
/// context rather than mutating shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridContext {
    pub time_signature: TimeSignature,
    pub grouping: GroupingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finger: Option<FingerLanguage>,
    pub picks: bool,
    pub transpose: i8,
    pub stems_down: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measures_per_line: Option<u8>,
    pub display_repeat_symbol: bool,
}

impl Default for GridContext {
    fn default() -> Self {
        Self {
            time_signature: TimeSignature::default(),
            grouping: GroupingMode::UserDefined,
            finger: None,
            picks: false,
            transpose: 0,
            stems_down: false,
            measures_per_line: None,
            display_repeat_symbol: true,
        }
    }
}

/// The rendering-oriented result of parsing a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub measures: Vec<Measure>,
    pub errors: Vec<Diagnostic>,
    /// The original notation source.
    pub grid: String,
    pub time_signature: TimeSignature,
    pub display_repeat_symbol: bool,
    pub picks_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finger: Option<FingerLanguage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measures_per_line: Option<u8>,
    pub stems_direction: StemDirection,
}

/// The analyzer-oriented view: segments flattened to plain note lists, no
/// beat substructure. Derived from the same internal build as [`Grid`] so
/// segment/tie/tuplet semantics never diverge between the two call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedGrid {
    pub measures: Vec<ParsedMeasure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMeasure {
    pub segments: Vec<ParsedSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSegment {
    pub chord: String,
    pub leading_space: bool,
    pub notes: Vec<NoteElement>,
}

/// Closed variant set for renderer-facing element metadata. Each variant
/// carries exactly the fields its kind needs; there is no open bag of
/// optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RenderedElement {
    Note {
        note_ref: NoteRef,
    },
    Stem {
        note_ref: NoteRef,
        down: bool,
    },
    Chord {
        symbol: String,
        segment_index: usize,
    },
    RepeatSymbol {
        measure_index: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actual_count() {
        assert_eq!(Tuplet::default_actual_count(3), 2);
        assert_eq!(Tuplet::default_actual_count(5), 4);
        assert_eq!(Tuplet::default_actual_count(6), 4);
        assert_eq!(Tuplet::default_actual_count(7), 4);
        assert_eq!(Tuplet::default_actual_count(9), 8);
        assert_eq!(Tuplet::default_actual_count(2), 1);
    }

    #[test]
    fn test_duration_fraction() {
        let n = NoteElement::new(8);
        assert!((n.duration_fraction() - 0.125).abs() < 1e-9);

        let mut dotted = NoteElement::new(4);
        dotted.dotted = true;
        assert!((dotted.duration_fraction() - 0.375).abs() < 1e-9);

        let mut triplet = NoteElement::new(8);
        triplet.tuplet = Some(Tuplet {
            group_id: 0,
            count: 3,
            actual_count: 2,
        });
        assert!((triplet.duration_fraction() - 0.125 * 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_beam_level() {
        assert_eq!(NoteElement::new(4).beam_level(), 0);
        assert_eq!(NoteElement::new(8).beam_level(), 1);
        assert_eq!(NoteElement::new(16).beam_level(), 2);
        assert_eq!(NoteElement::new(32).beam_level(), 3);
        assert_eq!(NoteElement::new(64).beam_level(), 4);
    }

    #[test]
    fn test_beat_legacy_beam_groups() {
        let beat = Beat::from_notes(vec![
            NoteElement::new(8),
            NoteElement::new(8),
            NoteElement::rest(8),
            NoteElement::new(8),
        ]);
        assert!(beat.has_beam);
        assert_eq!(beat.beam_groups, vec![vec![0, 1]]);
    }

    #[test]
    fn test_compound_meter() {
        assert!(TimeSignature::new(6, 8).is_compound());
        assert!(TimeSignature::new(12, 8).is_compound());
        assert!(!TimeSignature::new(4, 4).is_compound());
        assert!(!TimeSignature::new(7, 8).is_compound());
    }

    #[test]
    fn test_counting_size_wire_format() {
        assert_eq!(serde_yaml::to_string(&CountingSize::Tall).unwrap().trim(), "t");
        assert_eq!(serde_yaml::to_string(&CountingSize::Small).unwrap().trim(), "s");
    }

    #[test]
    fn test_rendered_element_wire_format() {
        let stem = RenderedElement::Stem {
            note_ref: NoteRef {
                segment_index: 0,
                note_index: 2,
            },
            down: true,
        };
        let yaml = serde_yaml::to_string(&stem).unwrap();
        assert!(yaml.contains("kind: stem"), "got: {}", yaml);
        let back: RenderedElement = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, stem);

        let repeat = RenderedElement::RepeatSymbol { measure_index: 3 };
        let yaml = serde_yaml::to_string(&repeat).unwrap();
        assert!(yaml.contains("kind: repeat-symbol"), "got: {}", yaml);
        let back: RenderedElement = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, repeat);

        let chord = RenderedElement::Chord {
            symbol: "Am7".to_string(),
            segment_index: 1,
        };
        let yaml = serde_yaml::to_string(&chord).unwrap();
        assert!(yaml.contains("kind: chord"), "got: {}", yaml);
        assert_eq!(serde_yaml::from_str::<RenderedElement>(&yaml).unwrap(), chord);
    }
}
