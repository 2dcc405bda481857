//! Post-rewrite parse check.
//!
//! Statement insertion is lexical; nothing upstream guarantees the result is
//! still a valid compilation unit. Running the rewritten buffer through a
//! full Rust parse catches the failure modes the lexical stages accept (a
//! string literal containing an unbalanced brace, a mid-expression insertion
//! point) before the file is handed to a real build.

use thiserror::Error;

#[derive(Error, Debug)]
#[error("rewritten source no longer parses: {message}")]
pub struct ParseCheckError {
    pub message: String,
}

/// Parse `source` as a full Rust file, reporting the first syntax error.
///
/// The check is advisory: whether a failure aborts the run is the caller's
/// policy, not this module's.
pub fn parse_check(source: &str) -> Result<(), ParseCheckError> {
    syn::parse_file(source).map(|_| ()).map_err(|e| ParseCheckError {
        message: e.to_string(),
    })
}
