//! Parsing of generation output: tolerant JSON and numeric scores.

pub mod score;
pub mod tolerant;

pub use score::{DEFAULT_SCORE, extract_score, score_or_default};
pub use tolerant::{ParseFailure, ParseResult, Repair, parse_object, parse_tolerant};
