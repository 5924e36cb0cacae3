//! # Counting Analysis
//!
//! Attaches pedagogical counting labels ("1", "&", "2" ...) to every note,
//! in place. Counting always restarts at 1 at each measure and follows the
//! active time signature through inline meter changes.
//!
//! ## Mode Selection
//! Each measure is counted in one of two modes:
//! - **User-defined**: chosen for irregular meters (denominator above 4 with
//!   a numerator not divisible into equal groups of three) and for regular
//!   meters whose written beats have unequal durations. Labels are derived
//!   from where each note falls relative to the meter's own metric unit.
//! - **Mathematical**: chosen otherwise. Each metric beat's smallest note
//!   value fixes that beat's subdivision slot and labels are derived from
//!   slot positions, so every note in a uniform measure gets a label
//!   regardless of how the player spaced the text, and a beat of plain
//!   eighths is still spoken "&" even when a neighboring beat subdivides
//!   into sixteenths.
//!
//! Sizes encode pedagogy, not layout: on-the-beat labels are tall,
//! subdivisions medium, and rests or tie continuations small (spoken
//! quietly, or not at all).

use crate::ast::{CountingSize, Measure, NoteElement, TimeSignature};

const TOLERANCE: f64 = 1e-6;

/// Attach counting labels to every rhythm-bearing measure.
pub fn analyze_counting(measures: &mut [Measure], grid_ts: &TimeSignature) {
    let mut current_ts = *grid_ts;
    for measure in measures.iter_mut() {
        if let Some(ts) = measure.time_signature {
            current_ts = ts;
        }
        if measure.is_repeat || !measure.has_rhythm() {
            continue;
        }
        count_measure(measure, &current_ts);
    }
}

fn count_measure(measure: &mut Measure, ts: &TimeSignature) {
    if use_user_defined_mode(measure, ts) {
        count_user_defined(measure, ts);
    } else {
        count_mathematical(measure, ts);
    }
}

/// Irregular meters (7/8, 5/8, 11/8 ...) are always counted against their
/// own metric units; regular meters fall back to user-defined counting only
/// when the written beats are of unequal length.
fn use_user_defined_mode(measure: &Measure, ts: &TimeSignature) -> bool {
    let irregular = ts.denominator > 4 && !matches!(ts.numerator, 3 | 6 | 9 | 12);
    if irregular {
        return true;
    }

    let beat_durations: Vec<f64> = measure
        .chord_segments
        .iter()
        .flat_map(|s| s.beats.iter())
        .map(|b| {
            b.notes
                .iter()
                .map(|n| n.duration_sixteenths())
                .sum::<f64>()
        })
        .collect();

    beat_durations
        .windows(2)
        .any(|w| (w[0] - w[1]).abs() > TOLERANCE)
}

/// Position/duration pairs for the whole measure, in sixteenth-note units.
fn onsets(measure: &Measure) -> Vec<f64> {
    let mut positions = Vec::new();
    let mut pos = 0.0;
    for segment in &measure.chord_segments {
        for note in segment.notes() {
            positions.push(pos);
            pos += note.duration_sixteenths();
        }
    }
    positions
}

fn on_grid(position: f64, step: f64) -> bool {
    let rem = position % step;
    rem.abs() < TOLERANCE || (step - rem).abs() < TOLERANCE
}

/// Which metric beat a position falls in, clamped so an overfull measure
/// cannot index past the last beat.
fn beat_index(position: f64, beat_len: f64, beat_count: usize) -> usize {
    ((position / beat_len + TOLERANCE).floor() as usize).min(beat_count - 1)
}

fn count_user_defined(measure: &mut Measure, ts: &TimeSignature) {
    let unit_len = 16.0 / ts.denominator as f64;
    let positions = onsets(measure);

    // Per metric unit, '&' is only spoken when the unit holds nothing but
    // plain eighths.
    let mut unit_all_eighths: Vec<bool> = Vec::new();
    {
        let notes: Vec<&NoteElement> = measure
            .chord_segments
            .iter()
            .flat_map(|s| s.notes())
            .collect();
        let unit_count = (ts.sixteenths() / unit_len).round() as usize;
        for u in 0..unit_count.max(1) {
            let lo = u as f64 * unit_len;
            let hi = lo + unit_len;
            let all = positions
                .iter()
                .zip(&notes)
                .filter(|(p, _)| **p >= lo - TOLERANCE && **p < hi - TOLERANCE)
                .all(|(_, n)| n.value == 8 && !n.dotted);
            unit_all_eighths.push(all);
        }
    }

    let mut i = 0;
    for segment in measure.chord_segments.iter_mut() {
        for note in segment.notes_mut() {
            let pos = positions[i];
            i += 1;
            let unit = (pos / unit_len + TOLERANCE).floor() as usize;
            if on_grid(pos, unit_len) {
                let number = (unit + 1) as u8;
                note.counting_label = Some(number.to_string());
                note.counting_number = Some(number);
                note.counting_size = Some(if note.tie_end || note.is_rest {
                    CountingSize::Small
                } else {
                    CountingSize::Tall
                });
            } else {
                let all_eighths = unit_all_eighths.get(unit).copied().unwrap_or(false);
                if all_eighths {
                    note.counting_label = Some("&".to_string());
                } else {
                    let slot = ((pos - unit as f64 * unit_len) + TOLERANCE).floor() as u8 + 1;
                    note.counting_label = Some(slot.to_string());
                }
                note.counting_size = Some(if note.is_rest || note.tie_end {
                    CountingSize::Small
                } else {
                    CountingSize::Medium
                });
            }
        }
    }
}

fn count_mathematical(measure: &mut Measure, ts: &TimeSignature) {
    let beat_len = 16.0 / ts.beat_unit as f64;
    let positions = onsets(measure);

    // Each beat's shortest value sets that beat's subdivision slot size, so
    // a beat of plain eighths keeps its '&' next to a sixteenth-note beat.
    let beat_count = ((ts.sixteenths() / beat_len).round() as usize).max(1);
    let mut beat_smallest = vec![0u8; beat_count];
    {
        let notes: Vec<&NoteElement> = measure
            .chord_segments
            .iter()
            .flat_map(|s| s.notes())
            .collect();
        for (pos, note) in positions.iter().zip(&notes) {
            let beat = beat_index(*pos, beat_len, beat_count);
            beat_smallest[beat] = beat_smallest[beat].max(note.value);
        }
    }

    let mut i = 0;
    for segment in measure.chord_segments.iter_mut() {
        for note in segment.notes_mut() {
            let pos = positions[i];
            i += 1;
            if on_grid(pos, beat_len) {
                let beat = (pos / beat_len + TOLERANCE).floor() as u8 + 1;
                note.counting_label = Some(beat.to_string());
                note.counting_number = Some(beat);
                note.counting_size = Some(if note.is_rest || note.tie_end {
                    CountingSize::Small
                } else {
                    CountingSize::Tall
                });
            } else {
                let smallest = beat_smallest[beat_index(pos, beat_len, beat_count)];
                if smallest == 8 {
                    note.counting_label = Some("&".to_string());
                } else if smallest >= 16 {
                    let slot_len = 16.0 / smallest as f64;
                    let in_beat = pos % beat_len;
                    let slot = (in_beat / slot_len + TOLERANCE).floor() as u8 + 1;
                    note.counting_label = Some(slot.to_string());
                }
                note.counting_size = Some(if note.is_rest || note.tie_end {
                    CountingSize::Small
                } else {
                    CountingSize::Medium
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn labels(measure: &Measure) -> Vec<(String, CountingSize)> {
        measure
            .chord_segments
            .iter()
            .flat_map(|s| s.notes())
            .map(|n| {
                (
                    n.counting_label.clone().unwrap_or_default(),
                    n.counting_size.unwrap(),
                )
            })
            .collect()
    }

    fn counted(source: &str) -> Vec<Measure> {
        let grid = parse(source).unwrap();
        let mut measures = grid.measures;
        analyze_counting(&mut measures, &grid.time_signature);
        measures
    }

    #[test]
    fn test_quarters_in_common_time() {
        let measures = counted("4/4 | C[4 4 4 4] |");
        assert_eq!(
            labels(&measures[0]),
            vec![
                ("1".into(), CountingSize::Tall),
                ("2".into(), CountingSize::Tall),
                ("3".into(), CountingSize::Tall),
                ("4".into(), CountingSize::Tall),
            ]
        );
    }

    #[test]
    fn test_eighths_get_ands() {
        let measures = counted("4/4 | C[8888 8888] |");
        let got = labels(&measures[0]);
        let expected = ["1", "&", "2", "&", "3", "&", "4", "&"];
        for (i, (label, size)) in got.iter().enumerate() {
            assert_eq!(label, expected[i]);
            let want = if expected[i] == "&" {
                CountingSize::Medium
            } else {
                CountingSize::Tall
            };
            assert_eq!(*size, want);
        }
    }

    #[test]
    fn test_sixteenths_use_slot_numbers() {
        let measures = counted("4/4 | C[16161616 4 4 4] |");
        let got = labels(&measures[0]);
        assert_eq!(got[0].0, "1");
        assert_eq!(got[1].0, "2");
        assert_eq!(got[2].0, "3");
        assert_eq!(got[3].0, "4");
        assert_eq!(got[1].1, CountingSize::Medium);
        assert_eq!(got[4].0, "2");
        assert_eq!(got[4].1, CountingSize::Tall);
    }

    #[test]
    fn test_subdivision_rule_is_per_beat() {
        // Beat 1 holds plain eighths, beat 2 sixteenths; both last a quarter,
        // so the measure is mathematical, but the eighth beat keeps its '&'
        // while the sixteenth beat uses slot numbers.
        let measures = counted("4/4 | C[88 16161616 4 4] |");
        let got = labels(&measures[0]);
        assert_eq!(
            got.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>(),
            vec!["1", "&", "2", "2", "3", "4", "3", "4"]
        );
        assert_eq!(got[1].1, CountingSize::Medium);
        assert_eq!(got[3].1, CountingSize::Medium);
    }

    #[test]
    fn test_irregular_meter_counts_metric_units() {
        let measures = counted("7/8 | C[888 88 88] |");
        let got = labels(&measures[0]);
        assert_eq!(
            got.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>(),
            vec!["1", "2", "3", "4", "5", "6", "7"]
        );
        assert!(got.iter().all(|(_, s)| *s == CountingSize::Tall));
    }

    #[test]
    fn test_unequal_beats_force_user_defined() {
        // 4/4 with beats of unequal length: counted against quarter units,
        // not recomputed slots.
        let measures = counted("4/4 | C[4. 8 2] |");
        let got = labels(&measures[0]);
        assert_eq!(got[0].0, "1");
        assert_eq!(got[0].1, CountingSize::Tall);
        // The eighth lands mid-unit in a unit that is not all eighths.
        assert_eq!(got[1].1, CountingSize::Medium);
        assert_eq!(got[2].0, "3");
    }

    #[test]
    fn test_rest_counts_small() {
        let measures = counted("4/4 | C[4 -4 4 4] |");
        let got = labels(&measures[0]);
        assert_eq!(got[1].0, "2");
        assert_eq!(got[1].1, CountingSize::Small);
    }

    #[test]
    fn test_tie_continuation_counts_small() {
        let measures = counted("4/4 | C[4_ 4 4 4] |");
        let got = labels(&measures[0]);
        assert_eq!(got[1].0, "2");
        assert_eq!(got[1].1, CountingSize::Small);
        assert_eq!(got[0].1, CountingSize::Tall);
    }

    #[test]
    fn test_counting_restarts_each_measure() {
        let measures = counted("4/4 | C[4 4 4 4] | G[4 4 4 4] |");
        assert_eq!(labels(&measures[1])[0].0, "1");
    }

    #[test]
    fn test_inline_meter_change_recounts() {
        let measures = counted("4/4 | C[4 4 4 4] | 3/4 | G[4 4 4] |");
        let got = labels(&measures[1]);
        assert_eq!(
            got.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>(),
            vec!["1", "2", "3"]
        );
    }

    #[test]
    fn test_triplet_subdivisions_get_ands() {
        let measures = counted("4/4 | C[{888}3 4 4 4] |");
        let got = labels(&measures[0]);
        assert_eq!(got[0].0, "1");
        assert_eq!(got[1].0, "&");
        assert_eq!(got[2].0, "&");
        assert_eq!(got[3].0, "2");
    }

    #[test]
    fn test_repeat_and_chord_only_measures_untouched() {
        let measures = counted("4/4 | C | % |");
        assert!(measures[0]
            .chord_segments
            .iter()
            .flat_map(|s| s.notes())
            .all(|n| n.counting_label.is_none()));
    }
}
