//! # Parser
//!
//! This module parses tokens from the lexer into a [`Grid`].
//!
//! ## Purpose
//! The parser is the second stage of the pipeline. It takes the flat token
//! stream from the lexer and builds the structured measure model: chord
//! segments, beats, ties, dots, rests, tuplets, barlines, repeats and voltas.
//!
//! ## Structure of a grid
//! ```text
//! <directive lines>
//! <N/D> <measure> (<barline> <measure>)* <final barline>
//! ```
//! where a measure is one or more chord segments, each `Chord[notes...]`.
//! Directive lines (`auto-beam`, `finger:fr`, `transpose:+2`, ...) set global
//! defaults collected into a [`GridContext`] that is threaded through the
//! build as an immutable value; inline overrides (a mid-grid `N/D`, an inline
//! grouping keyword) derive a new context or a one-measure override instead
//! of mutating shared state.
//!
//! ## Error isolation
//! A malformed token records a [`Diagnostic`] and the parser skips to the
//! next barline; the offending measure is emitted with whatever structure was
//! recovered and parsing continues for the rest of the grid. Only a grid
//! with no recognizable structure at all fails with [`GridError`].
//!
//! ## Entry points
//! [`parse`] returns the rendering-oriented [`Grid`];
//! [`parse_measures`] returns the analyzer-oriented [`ParsedGrid`]. Both
//! derive from the same internal build so segment/tie/tuplet semantics never
//! diverge.

use crate::ast::*;
use crate::error::{Diagnostic, GridError};
use crate::lexer::{Lexer, LocatedToken, Token};
use crate::transpose::transpose_chord;
use crate::validate;

/// A chord segment being accumulated, beats still open.
struct SegmentInProgress {
    chord: String,
    leading_space: bool,
    beats: Vec<Vec<NoteElement>>,
    current_beat: Vec<NoteElement>,
    has_rhythm: bool,
}

impl SegmentInProgress {
    fn new(chord: String, leading_space: bool) -> Self {
        Self {
            chord,
            leading_space,
            beats: Vec::new(),
            current_beat: Vec::new(),
            has_rhythm: false,
        }
    }

    fn close_beat(&mut self) {
        if !self.current_beat.is_empty() {
            self.beats.push(std::mem::take(&mut self.current_beat));
        }
    }

    fn last_note_mut(&mut self) -> Option<&mut NoteElement> {
        if let Some(n) = self.current_beat.last_mut() {
            return Some(n);
        }
        self.beats.last_mut().and_then(|b| b.last_mut())
    }

    fn note_count(&self) -> usize {
        self.beats.iter().map(|b| b.len()).sum::<usize>() + self.current_beat.len()
    }

    fn finish(mut self, transpose: i8) -> ChordSegment {
        self.close_beat();
        let chord = if transpose != 0 && !self.chord.is_empty() {
            transpose_chord(&self.chord, transpose)
        } else {
            self.chord
        };
        ChordSegment {
            chord,
            leading_space: self.leading_space,
            beats: self.beats.into_iter().map(Beat::from_notes).collect(),
        }
    }
}

/// Measure-level accumulation state, reset at every barline.
struct MeasureState {
    segments: Vec<SegmentInProgress>,
    is_repeat: bool,
    /// A `tie_start` was emitted and is waiting for its partner note.
    pending_tie: bool,
    /// An explicit leading `_` marks the next note as a tie end.
    pending_tie_end: bool,
    start_offset: Option<usize>,
}

impl MeasureState {
    fn new() -> Self {
        Self {
            segments: Vec::new(),
            is_repeat: false,
            pending_tie: false,
            pending_tie_end: false,
            start_offset: None,
        }
    }

    fn has_content(&self) -> bool {
        !self.segments.is_empty() || self.is_repeat
    }

    fn current_segment(&mut self) -> &mut SegmentInProgress {
        if self.segments.is_empty() {
            // A bare bracket with no chord still gets a segment.
            self.segments.push(SegmentInProgress::new(String::new(), false));
        }
        self.segments.last_mut().unwrap()
    }

    fn last_note_mut(&mut self) -> Option<&mut NoteElement> {
        self.segments.iter_mut().rev().find_map(|s| s.last_note_mut())
    }
}

/// Parser for grid notation
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<LocatedToken>,
    position: usize,
    tuplet_counter: usize,
    errors: Vec<Diagnostic>,
    measures: Vec<Measure>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<LocatedToken>) -> Self {
        Self {
            source,
            tokens,
            position: 0,
            tuplet_counter: 0,
            errors: Vec::new(),
            measures: Vec::new(),
        }
    }

    fn current(&self) -> Option<&LocatedToken> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&LocatedToken> {
        let token = self.tokens.get(self.position);
        self.position += 1;
        token
    }

    fn diagnose(&mut self, message: impl Into<String>, located: Option<(usize, usize)>) {
        let mut d = Diagnostic::in_measure(message, self.measures.len());
        d.position = located;
        self.errors.push(d);
    }

    /// Leading directive lines: words before the first time signature,
    /// barline or chord. Unknown directives become diagnostics.
    fn parse_directives(&mut self, context: &mut GridContext) {
        loop {
            match self.current().map(|t| t.token.clone()) {
                Some(Token::Whitespace) | Some(Token::Newline) => {
                    self.advance();
                }
                Some(Token::Word(w)) if !w.starts_with(|c: char| c.is_ascii_uppercase()) => {
                    let (line, column) = {
                        let t = self.current().unwrap();
                        (t.line, t.column)
                    };
                    self.advance();
                    if !apply_directive(context, &w) {
                        self.errors.push(
                            Diagnostic::new(format!("unknown directive '{}'", w)).at(line, column),
                        );
                    }
                }
                _ => break,
            }
        }
    }

    /// The main measure loop. `context` is the directive-phase result; meter
    /// changes derive a new context value rather than mutating the old one.
    fn parse_grid(&mut self, context: GridContext) -> (Vec<Measure>, TimeSignature) {
        let mut context = context;
        let mut grid_ts: Option<TimeSignature> = None;
        let mut state = MeasureState::new();
        let mut pending_ts_change: Option<TimeSignature> = None;
        let mut pending_grouping: Option<GroupingMode> = None;
        let mut pending_repeat_start = false;
        let mut pending_volta: Option<Vec<u8>> = None;
        let mut last_was_space = true;

        while let Some(t) = self.current() {
            let (line, column, offset) = (t.line, t.column, t.offset);
            match t.token.clone() {
                Token::Whitespace => {
                    self.advance();
                    last_was_space = true;
                }
                Token::Newline => {
                    self.advance();
                    last_was_space = true;
                    if !state.has_content() {
                        if let Some(last) = self.measures.last_mut() {
                            last.is_line_break = true;
                        }
                    }
                }
                Token::TimeSig(n, d) => {
                    self.advance();
                    last_was_space = false;
                    let ts = TimeSignature::new(n, d);
                    if grid_ts.is_none() && self.measures.is_empty() && !state.has_content() {
                        grid_ts = Some(ts);
                    } else {
                        pending_ts_change = Some(ts);
                    }
                    context = GridContext {
                        time_signature: ts,
                        ..context.clone()
                    };
                }
                Token::Word(w) => {
                    self.advance();
                    if let Some(mode) = grouping_keyword(&w) {
                        // Inline keyword: overrides the next measure only.
                        pending_grouping = Some(mode);
                        last_was_space = false;
                        continue;
                    }
                    if state.start_offset.is_none() {
                        state.start_offset = Some(offset);
                    }
                    state
                        .segments
                        .push(SegmentInProgress::new(w, last_was_space));
                    last_was_space = false;
                }
                Token::OpenBracket => {
                    self.advance();
                    if state.start_offset.is_none() {
                        state.start_offset = Some(offset);
                    }
                    last_was_space = false;
                    self.parse_rhythm(&mut state);
                }
                Token::RepeatMeasure => {
                    self.advance();
                    if state.start_offset.is_none() {
                        state.start_offset = Some(offset);
                    }
                    state.is_repeat = true;
                    last_was_space = false;
                }
                Token::Volta(numbers) => {
                    self.advance();
                    pending_volta = Some(numbers);
                    last_was_space = false;
                }
                Token::Bar(barline) => {
                    self.advance();
                    last_was_space = true;
                    if state.has_content() {
                        let measure = self.close_measure(
                            std::mem::replace(&mut state, MeasureState::new()),
                            barline,
                            offset,
                            &context,
                            pending_ts_change.take(),
                            pending_grouping.take(),
                            pending_repeat_start,
                            pending_volta.take(),
                        );
                        pending_repeat_start = false;
                        self.measures.push(measure);
                    } else if barline.is_repeat_start() {
                        pending_repeat_start = true;
                    }
                }
                Token::Unknown(c) => {
                    self.advance();
                    self.diagnose(
                        format!("unexpected character '{}'", c),
                        Some((line, column)),
                    );
                    self.skip_to_barline();
                    last_was_space = true;
                }
                other => {
                    self.advance();
                    self.diagnose(
                        format!("unexpected token {:?}", other),
                        Some((line, column)),
                    );
                    self.skip_to_barline();
                    last_was_space = true;
                }
            }
        }

        // Trailing content with no closing barline: emit best-effort and say so.
        if state.has_content() {
            let end = self.source.len();
            let measure = self.close_measure(
                state,
                Barline::Single,
                end,
                &context,
                pending_ts_change.take(),
                pending_grouping.take(),
                pending_repeat_start,
                pending_volta.take(),
            );
            self.measures.push(measure);
            let idx = self.measures.len() - 1;
            self.errors
                .push(Diagnostic::in_measure("missing closing barline", idx));
        }

        (
            std::mem::take(&mut self.measures),
            grid_ts.unwrap_or(context.time_signature),
        )
    }

    /// Error isolation: consume tokens up to (not including) the next
    /// barline or newline so one bad measure cannot poison the next.
    fn skip_to_barline(&mut self) {
        while let Some(t) = self.current() {
            match t.token {
                Token::Bar(_) | Token::Newline => break,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Note tokens inside `[...]`: values, dots, rests, ties, tuplet braces,
    /// spaces (beat boundaries) and `%`.
    fn parse_rhythm(&mut self, state: &mut MeasureState) {
        let mut next_is_rest = false;
        let mut next_has_leading_space = false;
        let mut last_was_note = false;
        let mut tuplet_start: Option<(usize, usize, usize)> = None; // (note idx, line, col)

        loop {
            let Some(t) = self.current() else {
                self.diagnose("unterminated rhythm bracket at end of input", None);
                break;
            };
            let (line, column) = (t.line, t.column);
            match t.token.clone() {
                Token::CloseBracket => {
                    self.advance();
                    if let Some((start, l, c)) = tuplet_start.take() {
                        self.diagnose("unterminated tuplet brace", Some((l, c)));
                        self.apply_tuplet(state, start, 0, None);
                    }
                    break;
                }
                Token::NoteValue(value) => {
                    self.advance();
                    let mut note = if next_is_rest {
                        NoteElement::rest(value)
                    } else {
                        NoteElement::new(value)
                    };
                    next_is_rest = false;
                    note.has_leading_space = next_has_leading_space;
                    next_has_leading_space = false;
                    if state.pending_tie {
                        note.tie_end = true;
                        state.pending_tie = false;
                    } else if state.pending_tie_end {
                        // Explicit leading `_` with no in-measure partner:
                        // the tie crosses the measure boundary.
                        note.tie_end = true;
                        note.tie_from_void = true;
                    }
                    state.pending_tie_end = false;
                    let seg = state.current_segment();
                    seg.has_rhythm = true;
                    seg.current_beat.push(note);
                    last_was_note = true;
                }
                Token::Dot => {
                    self.advance();
                    match state.last_note_mut() {
                        Some(n) if last_was_note => n.dotted = true,
                        _ => self.diagnose("dot with no preceding note", Some((line, column))),
                    }
                }
                Token::Tie => {
                    self.advance();
                    if last_was_note {
                        if let Some(n) = state.last_note_mut() {
                            n.tie_start = true;
                        }
                        state.pending_tie = true;
                    } else {
                        state.pending_tie_end = true;
                    }
                }
                Token::RestMarker => {
                    self.advance();
                    next_is_rest = true;
                    last_was_note = false;
                }
                Token::Whitespace => {
                    self.advance();
                    if let Some(seg) = state.segments.last_mut() {
                        seg.close_beat();
                    }
                    next_has_leading_space = true;
                    last_was_note = false;
                }
                Token::OpenBrace => {
                    self.advance();
                    if tuplet_start.is_some() {
                        self.diagnose(
                            "nested tuplet braces are not supported",
                            Some((line, column)),
                        );
                    } else {
                        tuplet_start =
                            Some((state.current_segment().note_count(), line, column));
                    }
                    last_was_note = false;
                }
                Token::TupletClose { count, metric } => {
                    self.advance();
                    match tuplet_start.take() {
                        Some((start, _, _)) => {
                            if count == 0 {
                                self.diagnose(
                                    "malformed tuplet ratio after '}'",
                                    Some((line, column)),
                                );
                            }
                            self.apply_tuplet(state, start, count, metric);
                        }
                        None => self.diagnose(
                            "tuplet close with no opening brace",
                            Some((line, column)),
                        ),
                    }
                    last_was_note = false;
                }
                Token::RepeatMeasure => {
                    self.advance();
                    state.is_repeat = true;
                    last_was_note = false;
                }
                Token::Newline => {
                    self.diagnose("rhythm bracket not closed before end of line", Some((line, column)));
                    break;
                }
                other => {
                    self.advance();
                    let shown = match other {
                        Token::Unknown(c) => format!("'{}'", c),
                        t => format!("{:?}", t),
                    };
                    self.diagnose(
                        format!("unexpected token {} in rhythm", shown),
                        Some((line, column)),
                    );
                }
            }
        }

        if let Some(seg) = state.segments.last_mut() {
            seg.close_beat();
        }
    }

    /// Attach tuplet membership to the notes enclosed by a brace group.
    /// The enclosed note count wins when the declared count disagrees.
    fn apply_tuplet(
        &mut self,
        state: &mut MeasureState,
        start: usize,
        declared: u8,
        metric: Option<u8>,
    ) {
        let seg = state.current_segment();
        let enclosed = seg.note_count().saturating_sub(start);
        if enclosed == 0 {
            self.diagnose("empty tuplet brace", None);
            return;
        }
        let count = enclosed as u8;
        if declared != 0 && declared != count {
            self.diagnose(
                format!(
                    "tuplet declares {} notes but encloses {}",
                    declared, enclosed
                ),
                None,
            );
        }
        let actual_count = metric.unwrap_or_else(|| Tuplet::default_actual_count(count));
        let tuplet = Tuplet {
            group_id: self.tuplet_counter,
            count,
            actual_count,
        };
        self.tuplet_counter += 1;

        let seg = state.current_segment();
        for note in seg
            .beats
            .iter_mut()
            .flat_map(|b| b.iter_mut())
            .chain(seg.current_beat.iter_mut())
            .skip(start)
        {
            note.tuplet = Some(tuplet);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn close_measure(
        &mut self,
        mut state: MeasureState,
        barline: Barline,
        end_offset: usize,
        context: &GridContext,
        ts_change: Option<TimeSignature>,
        grouping_override: Option<GroupingMode>,
        repeat_start: bool,
        volta: Option<Vec<u8>>,
    ) -> Measure {
        // An unmatched tie start at measure end crosses the boundary.
        if state.pending_tie {
            if let Some(n) = state.last_note_mut() {
                n.tie_to_void = true;
            }
            state.pending_tie = false;
        }

        let source = state
            .start_offset
            .map(|s| self.source[s..end_offset.max(s)].trim().to_string())
            .unwrap_or_default();

        let chord_segments: Vec<ChordSegment> = state
            .segments
            .into_iter()
            .map(|s| s.finish(context.transpose))
            .collect();

        let ts = ts_change.unwrap_or(context.time_signature);
        let grouping = resolve_grouping(grouping_override.unwrap_or(context.grouping), &ts);

        Measure {
            chord_segments,
            barline,
            repeat_start,
            volta,
            is_repeat: state.is_repeat,
            is_line_break: false,
            source,
            time_signature: ts_change,
            grouping,
        }
    }
}

/// `Auto` picks ternary grouping for compound meters, binary otherwise, so
/// downstream passes only ever see a concrete mode.
fn resolve_grouping(mode: GroupingMode, ts: &TimeSignature) -> GroupingMode {
    match mode {
        GroupingMode::Auto => {
            if ts.is_compound() {
                GroupingMode::Ternary
            } else {
                GroupingMode::Binary
            }
        }
        other => other,
    }
}

fn grouping_keyword(word: &str) -> Option<GroupingMode> {
    match word {
        "auto-beam" => Some(GroupingMode::Auto),
        "binary" => Some(GroupingMode::Binary),
        "ternary" => Some(GroupingMode::Ternary),
        _ => None,
    }
}

/// Apply one directive line to the context. Returns false for unknown words.
fn apply_directive(context: &mut GridContext, word: &str) -> bool {
    if let Some(mode) = grouping_keyword(word) {
        context.grouping = mode;
        return true;
    }
    match word {
        "finger" => context.finger = Some(FingerLanguage::English),
        "finger:fr" => context.finger = Some(FingerLanguage::French),
        "pick" => context.picks = true,
        "stems-down" => context.stems_down = true,
        "no-repeat-symbol" => context.display_repeat_symbol = false,
        _ => {
            if let Some(rest) = word.strip_prefix("transpose:") {
                if let Ok(n) = rest.trim_start_matches('+').parse::<i8>() {
                    context.transpose = n;
                    return true;
                }
                return false;
            }
            if let Some(rest) = word.strip_prefix("measures-per-line:") {
                if let Ok(n) = rest.parse::<u8>() {
                    context.measures_per_line = Some(n);
                    return true;
                }
                return false;
            }
            return false;
        }
    }
    true
}

/// Parse grid notation into the rendering-oriented [`Grid`].
///
/// Duration validation runs as part of this call; its findings land in
/// `grid.errors` alongside the parser's own diagnostics. Notation-level
/// problems never fail the call.
pub fn parse(source: &str) -> Result<Grid, GridError> {
    let tokens = Lexer::new(source).tokenize();

    let recognizable = tokens.iter().any(|t| {
        matches!(
            t.token,
            Token::TimeSig(..) | Token::Bar(_) | Token::Word(_) | Token::OpenBracket
        )
    });
    if !recognizable {
        if let Some(t) = tokens
            .iter()
            .find(|t| matches!(t.token, Token::Unknown(_)))
        {
            return Err(GridError::ParseError {
                line: t.line,
                column: t.column,
                message: "no recognizable grid notation in input".to_string(),
            });
        }
        // Blank input: an empty grid, not an error.
    }

    let mut parser = Parser::new(source, tokens);
    let mut context = GridContext::default();
    parser.parse_directives(&mut context);
    let (measures, time_signature) = parser.parse_grid(context.clone());

    let mut errors = parser.errors;
    errors.extend(validate::validate_durations(&measures, &time_signature));

    Ok(Grid {
        measures,
        errors,
        grid: source.to_string(),
        time_signature,
        display_repeat_symbol: context.display_repeat_symbol,
        picks_mode: context.picks,
        finger: context.finger,
        measures_per_line: context.measures_per_line,
        stems_direction: if context.stems_down {
            StemDirection::Down
        } else {
            StemDirection::Up
        },
    })
}

/// Parse grid notation into the analyzer-oriented flat view. Same build as
/// [`parse`], reshaped.
pub fn parse_measures(source: &str) -> Result<ParsedGrid, GridError> {
    let grid = parse(source)?;
    let measures = grid
        .measures
        .into_iter()
        .map(|m| ParsedMeasure {
            segments: m
                .chord_segments
                .into_iter()
                .map(|s| ParsedSegment {
                    chord: s.chord,
                    leading_space: s.leading_space,
                    notes: s.beats.into_iter().flat_map(|b| b.notes).collect(),
                })
                .collect(),
        })
        .collect();
    Ok(ParsedGrid { measures })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(measure: &Measure) -> Vec<&NoteElement> {
        measure
            .chord_segments
            .iter()
            .flat_map(|s| s.notes())
            .collect()
    }

    #[test]
    fn test_simple_measure() {
        let grid = parse("4/4 | C[8888 8888] |").unwrap();
        assert!(grid.errors.is_empty(), "unexpected errors: {:?}", grid.errors);
        assert_eq!(grid.measures.len(), 1);
        let m = &grid.measures[0];
        assert_eq!(m.chord_segments.len(), 1);
        assert_eq!(m.chord_segments[0].chord, "C");
        assert_eq!(m.chord_segments[0].beats.len(), 2);
        assert_eq!(m.chord_segments[0].beats[0].notes.len(), 4);
        assert_eq!(m.chord_segments[0].beats[1].notes.len(), 4);
        assert!(m.chord_segments[0].beats[1].notes[0].has_leading_space);
        assert!(!m.chord_segments[0].beats[0].notes[0].has_leading_space);
    }

    #[test]
    fn test_time_signature() {
        let grid = parse("3/4 | C[4 4 4] |").unwrap();
        assert_eq!(grid.time_signature, TimeSignature::new(3, 4));
        assert!(grid.errors.is_empty());
    }

    #[test]
    fn test_inline_time_signature_change() {
        let grid = parse("4/4 | C[4 4 4 4] | 3/4 | G[4 4 4] | Am[4 4 4] |").unwrap();
        assert!(grid.errors.is_empty(), "unexpected errors: {:?}", grid.errors);
        assert_eq!(grid.measures.len(), 3);
        assert_eq!(grid.measures[0].time_signature, None);
        assert_eq!(
            grid.measures[1].time_signature,
            Some(TimeSignature::new(3, 4))
        );
        // The change persists without being restated.
        assert_eq!(grid.measures[2].time_signature, None);
    }

    #[test]
    fn test_segment_ligature_vs_space() {
        let grid = parse("4/4\nAm[4 8]G[8] |").unwrap();
        let m = &grid.measures[0];
        assert_eq!(m.chord_segments.len(), 2);
        assert_eq!(m.chord_segments[1].chord, "G");
        assert!(!m.chord_segments[1].leading_space);

        let grid = parse("4/4\nAm[4 8] G[8] |").unwrap();
        assert!(grid.measures[0].chord_segments[1].leading_space);
    }

    #[test]
    fn test_dotted_and_rest() {
        let grid = parse("4/4 | C[4. 8 -4 4] |").unwrap();
        assert!(grid.errors.is_empty(), "unexpected errors: {:?}", grid.errors);
        let m = &grid.measures[0];
        let ns = notes(m);
        assert!(ns[0].dotted);
        assert!(!ns[1].dotted);
        assert!(ns[2].is_rest);
        assert_eq!(ns[2].value, 4);
    }

    #[test]
    fn test_tie_within_measure() {
        let grid = parse("4/4 | C[4. 8_4 4] |").unwrap();
        assert!(grid.errors.is_empty(), "unexpected errors: {:?}", grid.errors);
        let m = &grid.measures[0];
        let ns = notes(m);
        assert!(ns[1].tie_start);
        assert!(ns[2].tie_end);
        assert!(!ns[2].tie_from_void);
    }

    #[test]
    fn test_tie_to_void_at_measure_end() {
        let grid = parse("4/4 | C[4 4 4 4_] | C[_4 4 4 4] |").unwrap();
        assert!(grid.errors.is_empty(), "unexpected errors: {:?}", grid.errors);
        let first = notes(&grid.measures[0]);
        assert!(first[3].tie_start);
        assert!(first[3].tie_to_void);
        let second = notes(&grid.measures[1]);
        assert!(second[0].tie_end);
        assert!(second[0].tie_from_void);
    }

    #[test]
    fn test_tie_across_segments() {
        let grid = parse("4/4 | C[4 4 8_]G[8 2] |").unwrap();
        assert!(grid.errors.is_empty(), "unexpected errors: {:?}", grid.errors);
        let ns = notes(&grid.measures[0]);
        assert!(ns[2].tie_start);
        assert!(ns[3].tie_end);
        assert!(!ns[3].tie_from_void);
    }

    #[test]
    fn test_triplet_default_ratio() {
        let grid = parse("4/4 | C[{888}3 4 4 4] |").unwrap();
        assert!(grid.errors.is_empty(), "unexpected errors: {:?}", grid.errors);
        let ns = notes(&grid.measures[0]);
        let t = ns[0].tuplet.unwrap();
        assert_eq!(t.count, 3);
        assert_eq!(t.actual_count, 2);
        assert_eq!(ns[1].tuplet.unwrap().group_id, t.group_id);
        assert_eq!(ns[2].tuplet.unwrap().group_id, t.group_id);
        assert!(ns[3].tuplet.is_none());
    }

    #[test]
    fn test_sextuplet_spans_beats() {
        let grid = parse("4/4 | C[{161616 161616}6 4 4 4] |").unwrap();
        assert!(grid.errors.is_empty(), "unexpected errors: {:?}", grid.errors);
        let m = &grid.measures[0];
        let ns = notes(m);
        let t = ns[0].tuplet.unwrap();
        assert_eq!(t.count, 6);
        assert_eq!(t.actual_count, 4);
        assert!(ns[..6].iter().all(|n| n.tuplet == Some(t)));
        assert!(ns[3].has_leading_space);
    }

    #[test]
    fn test_explicit_tuplet_ratio() {
        let grid = parse("4/4 | C[{44444}5:4] |").unwrap();
        let ns = notes(&grid.measures[0]);
        let t = ns[0].tuplet.unwrap();
        assert_eq!(t.count, 5);
        assert_eq!(t.actual_count, 4);
    }

    #[test]
    fn test_tuplet_count_mismatch_diagnostic() {
        let grid = parse("4/4 | C[{888}4 4 4 4] |").unwrap();
        assert!(grid
            .errors
            .iter()
            .any(|e| e.message.contains("declares 4 notes but encloses 3")));
        // Enclosed count wins.
        let ns = notes(&grid.measures[0]);
        assert_eq!(ns[0].tuplet.unwrap().count, 3);
    }

    #[test]
    fn test_chord_only_measure() {
        let grid = parse("4/4 | C | G7 |").unwrap();
        assert_eq!(grid.measures.len(), 2);
        assert!(grid.measures[0].is_chord_only());
        assert_eq!(grid.measures[1].chord_segments[0].chord, "G7");
        // No rhythm, so no duration diagnostics either.
        assert!(grid.errors.is_empty());
    }

    #[test]
    fn test_repeat_measure() {
        let grid = parse("4/4 | C[4 4 4 4] | % | [%] |").unwrap();
        assert_eq!(grid.measures.len(), 3);
        assert!(grid.measures[1].is_repeat);
        assert!(grid.measures[2].is_repeat);
        assert!(grid.errors.is_empty());
    }

    #[test]
    fn test_repeats_and_volta() {
        let grid = parse("4/4 |: C[4 4 4 4] :|.1-3 G[4 4 4 4] :| .4 F[1] ||").unwrap();
        assert_eq!(grid.measures.len(), 3);
        assert!(grid.measures[0].repeat_start);
        assert!(grid.measures[0].barline.is_repeat_end());
        assert_eq!(grid.measures[1].volta, Some(vec![1, 2, 3]));
        assert_eq!(grid.measures[2].volta, Some(vec![4]));
        assert_eq!(grid.measures[2].barline, Barline::Double);
    }

    #[test]
    fn test_directives() {
        let grid = parse("stems-down\npick\nfinger:fr\nmeasures-per-line:4\n4/4 | C[4 4 4 4] |")
            .unwrap();
        assert_eq!(grid.stems_direction, StemDirection::Down);
        assert!(grid.picks_mode);
        assert_eq!(grid.finger, Some(FingerLanguage::French));
        assert_eq!(grid.measures_per_line, Some(4));
        assert!(grid.errors.is_empty());
    }

    #[test]
    fn test_unknown_directive_diagnostic() {
        let grid = parse("frobnicate\n4/4 | C[4 4 4 4] |").unwrap();
        assert_eq!(grid.errors.len(), 1);
        assert!(grid.errors[0].message.contains("unknown directive"));
        assert_eq!(grid.measures.len(), 1);
    }

    #[test]
    fn test_transpose_directive() {
        let grid = parse("transpose:+2\n4/4 | C[4 4 4 4] | Bb |").unwrap();
        assert_eq!(grid.measures[0].chord_segments[0].chord, "D");
        assert_eq!(grid.measures[1].chord_segments[0].chord, "C");
    }

    #[test]
    fn test_grouping_directive_and_inline_override() {
        let grid = parse("ternary\n4/4 | C[888888 88] | binary G[8888 8888] | C[4 4 4 4] |")
            .unwrap();
        assert_eq!(grid.measures[0].grouping, GroupingMode::Ternary);
        assert_eq!(grid.measures[1].grouping, GroupingMode::Binary);
        // The override does not leak into later measures.
        assert_eq!(grid.measures[2].grouping, GroupingMode::Ternary);
    }

    #[test]
    fn test_auto_beam_resolution() {
        let grid = parse("auto-beam\n6/8 | C[888 888] |").unwrap();
        assert_eq!(grid.measures[0].grouping, GroupingMode::Ternary);
        let grid = parse("auto-beam\n4/4 | C[8888 8888] |").unwrap();
        assert_eq!(grid.measures[0].grouping, GroupingMode::Binary);
    }

    #[test]
    fn test_error_isolation() {
        let grid = parse("4/4 | C[7777] | G[4 4 4 4] |").unwrap();
        assert!(!grid.errors.is_empty());
        assert_eq!(grid.measures.len(), 2);
        // The good measure is untouched.
        assert_eq!(notes(&grid.measures[1]).len(), 4);
        assert!(grid
            .errors
            .iter()
            .all(|e| e.measure_index != Some(1) || e.message.contains("expected")));
    }

    #[test]
    fn test_unterminated_bracket() {
        let grid = parse("4/4 | C[44").unwrap();
        assert!(grid
            .errors
            .iter()
            .any(|e| e.message.contains("unterminated rhythm bracket")));
        assert_eq!(grid.measures.len(), 1);
    }

    #[test]
    fn test_measure_source_text() {
        let grid = parse("4/4 | C[8888 8888] | Am[4 4 4 4] |").unwrap();
        assert_eq!(grid.measures[0].source, "C[8888 8888]");
        assert_eq!(grid.measures[1].source, "Am[4 4 4 4]");
    }

    #[test]
    fn test_line_break_flag() {
        let grid = parse("4/4 | C[4 4 4 4] |\nG[4 4 4 4] |").unwrap();
        assert!(grid.measures[0].is_line_break);
        assert!(!grid.measures[1].is_line_break);
    }

    #[test]
    fn test_duration_diagnostic_wording() {
        let grid = parse("4/4 | C[4 4 4] |").unwrap();
        assert_eq!(grid.errors.len(), 1);
        assert!(grid.errors[0]
            .message
            .contains("expected 4 quarter-notes, found 3"));
    }

    #[test]
    fn test_parse_measures_view_matches_grid() {
        let parsed = parse_measures("4/4 | C[4 8_]G[8 2] |").unwrap();
        assert_eq!(parsed.measures.len(), 1);
        let m = &parsed.measures[0];
        assert_eq!(m.segments.len(), 2);
        assert_eq!(m.segments[0].notes.len(), 2);
        assert!(m.segments[0].notes[1].tie_start);
        assert!(m.segments[1].notes[0].tie_end);
    }

    #[test]
    fn test_garbage_input_is_fatal() {
        assert!(parse("???!!!").is_err());
    }

    #[test]
    fn test_blank_input_is_empty_grid() {
        let grid = parse("  \n").unwrap();
        assert!(grid.measures.is_empty());
        assert!(grid.errors.is_empty());
    }
}
