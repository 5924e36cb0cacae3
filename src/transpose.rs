//! # Chord Transposition
//!
//! Implements the `transpose:+N` directive: chord symbols are moved around
//! the twelve-tone circle at parse time, so the built grid only ever carries
//! the transposed symbols.
//!
//! Spelling of the new root follows the source symbol and direction: a
//! flatted root stays in flat spelling, downward transposition prefers
//! flats, everything else prefers sharps. Quality text after the root
//! (`m`, `maj7`, `sus4` ...) passes through untouched, and slash-chord
//! basses are transposed with the same rule as the root.

/// Transpose a chord symbol by the given number of semitones.
///
/// Symbols whose first character is not a note letter are returned unchanged;
/// the parser reports unknown words before they ever get here, so this is
/// purely defensive pass-through.
pub fn transpose_chord(symbol: &str, semitones: i8) -> String {
    if let Some((head, bass)) = symbol.split_once('/') {
        return format!(
            "{}/{}",
            transpose_chord(head, semitones),
            transpose_chord(bass, semitones)
        );
    }

    let mut chars = symbol.chars();
    let root = match chars.next() {
        Some(c) => c,
        None => return String::new(),
    };
    let base: i16 = match root.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return symbol.to_string(),
    };

    let rest = chars.as_str();
    let (accidental, quality) = match rest.as_bytes().first() {
        Some(b'#') => (1i16, &rest[1..]),
        Some(b'b') => (-1i16, &rest[1..]),
        _ => (0i16, rest),
    };

    let pitch = (base + accidental + semitones as i16).rem_euclid(12);
    let name = spell(pitch, accidental < 0 || semitones < 0);
    format!("{}{}", name, quality)
}

/// Pitch class to a root spelling. Black keys pick sharp or flat per the
/// caller's preference; white keys are always natural.
fn spell(pitch: i16, prefer_flat: bool) -> &'static str {
    match pitch {
        0 => "C",
        1 => {
            if prefer_flat {
                "Db"
            } else {
                "C#"
            }
        }
        2 => "D",
        3 => {
            if prefer_flat {
                "Eb"
            } else {
                "D#"
            }
        }
        4 => "E",
        5 => "F",
        6 => {
            if prefer_flat {
                "Gb"
            } else {
                "F#"
            }
        }
        7 => "G",
        8 => {
            if prefer_flat {
                "Ab"
            } else {
                "G#"
            }
        }
        9 => "A",
        10 => {
            if prefer_flat {
                "Bb"
            } else {
                "A#"
            }
        }
        11 => "B",
        _ => unreachable!(),
    }
}
