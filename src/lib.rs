pub mod analyzer;
pub mod api;
pub mod ast;
pub mod counting;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod transpose;
pub mod validate;

pub use analyzer::{MusicAnalyzer, RestBeamPolicy};
pub use api::{analyze, analyze_with_policy, compile, compile_measures, compile_uncounted};
pub use ast::*;
pub use counting::analyze_counting;
pub use error::*;
pub use parser::{parse, parse_measures};
pub use transpose::transpose_chord;
pub use validate::validate_durations;
