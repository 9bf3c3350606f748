//! Sentence segmentation seam used by document ingestion.

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("valid sentence boundary regex"));

/// Splits raw document text into ordered sentence units.
///
/// Tokenization quality is a collaborator concern; the core only requires
/// stable ordering and non-empty units.
pub trait SentenceSplitter {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Default splitter: breaks on runs of `.`, `!`, `?` and trims the pieces.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminatorSplitter;

impl SentenceSplitter for TerminatorSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        SENTENCE_BOUNDARY_RE
            .split(text)
            .map(str::trim)
            .filter(|unit| !unit.is_empty())
            .map(str::to_string)
            .collect()
    }
}
