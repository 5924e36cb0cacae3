//! # Lexer
//!
//! Turns raw grid notation into a flat token stream for the parser.
//!
//! The grammar is terse and context-dependent: a digit run inside rhythm
//! brackets is a sequence of note values (`8888` is four eighths, `161616`
//! three sixteenths), while outside brackets digits belong to a time
//! signature. The lexer therefore tracks bracket depth and splits digit runs
//! into valid note values greedily (two-character values 16/32/64 first,
//! then the single digits 1/2/4/8).
//!
//! Words outside brackets are emitted as [`Token::Word`]; the parser decides
//! whether a word is a directive, an inline grouping keyword or a chord
//! symbol, since that depends on where in the grid it appears.
//!
//! Unrecognized characters become [`Token::Unknown`] rather than failing the
//! whole tokenize call - error isolation is per measure and lives in the
//! parser.

use crate::ast::Barline;

/// Token types for grid notation
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A chord symbol, directive or keyword; classified by the parser.
    Word(String),
    /// `N/D` time signature declaration.
    TimeSig(u8, u8),
    /// `|`, `||`, `|:`, `:|`, `||:`, `:||`
    Bar(Barline),
    /// `.1-3`, `.4`, `.1,3` volta marker (ranges already expanded).
    Volta(Vec<u8>),

    // Rhythm tokens (inside `[...]`)
    OpenBracket,
    CloseBracket,
    OpenBrace,
    /// `}N` or `}N:M` closing a tuplet. `count == 0` means the digits were
    /// missing or malformed.
    TupletClose { count: u8, metric: Option<u8> },
    NoteValue(u8),
    Dot,        // .
    Tie,        // _
    RestMarker, // -
    /// `%` repeat-previous-measure (bare or bracketed).
    RepeatMeasure,

    // Structure
    Whitespace,
    Newline,
    Unknown(char),
}

/// A token with its position in the source
#[derive(Debug, Clone)]
pub struct LocatedToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the token start, used to recover measure source text.
    pub offset: usize,
}

/// Lexer for tokenizing grid notation
pub struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    position: usize,
    bracket_depth: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
            position: 0,
            bracket_depth: 0,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.input[self.position..].chars().nth(n)
    }

    fn consume_digits(&mut self) -> String {
        let start = self.position;
        while let Some(&c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.position].to_string()
    }

    pub fn tokenize(&mut self) -> Vec<LocatedToken> {
        let mut tokens = Vec::new();

        while let Some(&c) = self.peek() {
            let line = self.line;
            let column = self.column;
            let offset = self.position;

            let token = match c {
                '\n' => {
                    self.advance();
                    Token::Newline
                }
                ' ' | '\t' | '\r' => {
                    self.advance();
                    // Collapse runs: one space reads the same as three.
                    while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
                        self.advance();
                    }
                    Token::Whitespace
                }
                '[' => {
                    self.advance();
                    self.bracket_depth += 1;
                    Token::OpenBracket
                }
                ']' => {
                    self.advance();
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    Token::CloseBracket
                }
                '%' => {
                    self.advance();
                    Token::RepeatMeasure
                }
                '|' => {
                    self.advance();
                    match self.peek() {
                        Some('|') => {
                            self.advance();
                            if let Some(&':') = self.peek() {
                                self.advance();
                                Token::Bar(Barline::DoubleRepeatStart)
                            } else {
                                Token::Bar(Barline::Double)
                            }
                        }
                        Some(':') => {
                            self.advance();
                            Token::Bar(Barline::RepeatStart)
                        }
                        _ => Token::Bar(Barline::Single),
                    }
                }
                ':' => {
                    self.advance();
                    match self.peek() {
                        Some('|') => {
                            self.advance();
                            if let Some(&'|') = self.peek() {
                                self.advance();
                                Token::Bar(Barline::DoubleRepeatEnd)
                            } else {
                                Token::Bar(Barline::RepeatEnd)
                            }
                        }
                        _ => Token::Unknown(':'),
                    }
                }
                _ if self.bracket_depth > 0 => self.lex_rhythm(c),
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    self.advance();
                    Token::Volta(self.lex_volta_numbers())
                }
                '0'..='9' => self.lex_time_signature(),
                _ if c.is_alphabetic() => Token::Word(self.lex_word()),
                _ => {
                    self.advance();
                    Token::Unknown(c)
                }
            };

            tokens.push(LocatedToken {
                token,
                line,
                column,
                offset,
            });
        }

        tokens
    }

    /// Rhythm tokens inside `[...]`: note values, dots, ties, rests, tuplet
    /// braces and their trailing ratio.
    fn lex_rhythm(&mut self, c: char) -> Token {
        match c {
            '.' => {
                self.advance();
                Token::Dot
            }
            '_' => {
                self.advance();
                Token::Tie
            }
            '-' => {
                self.advance();
                Token::RestMarker
            }
            '{' => {
                self.advance();
                Token::OpenBrace
            }
            '}' => {
                self.advance();
                let digits = self.consume_digits();
                let count = digits.parse::<u8>().unwrap_or(0);
                let metric = if self.peek() == Some(&':') {
                    self.advance();
                    self.consume_digits().parse::<u8>().ok()
                } else {
                    None
                };
                Token::TupletClose { count, metric }
            }
            '0'..='9' => {
                // Two-character values take precedence so that `161616`
                // splits as three sixteenths, not garbage single digits.
                let two: String = self.input[self.position..].chars().take(2).collect();
                match two.as_str() {
                    "16" | "32" | "64" => {
                        self.advance();
                        self.advance();
                        Token::NoteValue(two.parse().unwrap_or(16))
                    }
                    _ => {
                        self.advance();
                        match c {
                            '1' | '2' | '4' | '8' => {
                                Token::NoteValue(c.to_digit(10).unwrap_or(4) as u8)
                            }
                            _ => Token::Unknown(c),
                        }
                    }
                }
            }
            _ => {
                self.advance();
                Token::Unknown(c)
            }
        }
    }

    /// Volta numbers after a leading dot: `1`, `1-3`, `1,3`. Ranges expand.
    fn lex_volta_numbers(&mut self) -> Vec<u8> {
        let mut numbers = Vec::new();
        loop {
            let digits = self.consume_digits();
            let Ok(start) = digits.parse::<u8>() else {
                break;
            };
            if self.peek() == Some(&'-') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                self.advance();
                let end = self.consume_digits().parse::<u8>().unwrap_or(start);
                for n in start..=end.max(start) {
                    numbers.push(n);
                }
            } else {
                numbers.push(start);
            }
            if self.peek() == Some(&',') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                self.advance();
            } else {
                break;
            }
        }
        numbers
    }

    /// Digits outside brackets must form a time signature `N/D`.
    fn lex_time_signature(&mut self) -> Token {
        let first = self.consume_digits();
        if self.peek() == Some(&'/') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
            self.advance();
            let second = self.consume_digits();
            match (first.parse::<u8>(), second.parse::<u8>()) {
                (Ok(n), Ok(d)) if n > 0 && d > 0 => Token::TimeSig(n, d),
                _ => Token::Unknown('/'),
            }
        } else {
            Token::Unknown(first.chars().next().unwrap_or('0'))
        }
    }

    /// A word outside brackets: chord symbol, directive or keyword. The
    /// continuation set is wide enough for `Am7`, `G/B`, `C#m7b5`,
    /// `auto-beam`, `finger:fr` and `transpose:+2`, while `:` stops before a
    /// `:|` barline and `/` before anything that is not a bass note.
    fn lex_word(&mut self) -> String {
        let start = self.position;
        self.advance();
        while let Some(&c) = self.peek() {
            let next = self.peek_at(1);
            let continues = match c {
                _ if c.is_alphanumeric() => true,
                '#' => true,
                ':' => next.is_some_and(|n| n.is_alphanumeric() || n == '+' || n == '-'),
                '/' => next.is_some_and(|n| n.is_alphabetic()),
                '-' | '+' => next.is_some_and(|n| n.is_alphanumeric()),
                _ => false,
            };
            if continues {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.position].to_string()
    }
}
