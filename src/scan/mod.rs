//! Lexical scanning: signature location and body extraction.
//!
//! Function definitions are located by text pattern, not by a parser. The
//! pattern shape is `<modifiers> fn <name> ( <params> ) -> <return> {` with
//! no bracket balancing inside the parameter list, and bodies are delimited
//! by counting brace depth. Both are deliberate parser substitutes; see the
//! caveats on [`body_end`].

mod body;
mod signature;

pub use body::body_end;
pub use signature::{find_signatures, SignatureMatch, SignatureShape};

use thiserror::Error;

/// An immutable located region of the buffer.
///
/// Offsets are valid only within the pass that computed them; any splice at a
/// lower offset invalidates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
}

/// An unclosed body is not an error here: [`body_end`] returns `None` and the
/// orchestrator reports the function rather than aborting the batch.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid signature pattern for '{function}': {source}")]
    Pattern {
        function: String,
        source: regex::Error,
    },
}
