use crate::scan::{MatchSpan, ScanError};
use regex::Regex;
use serde::Deserialize;

/// Matcher over the optional qualifiers and return shape of a signature.
///
/// The textual shape located is
/// `<visibility> <async> fn <name> ( <params> ) -> <return> {`. The parameter
/// list is matched as "anything not containing a close paren", so a list with
/// nested parentheses is a known miss.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SignatureShape {
    /// Require an `async` qualifier on the definition.
    pub require_async: bool,
    /// Fragment that must appear between `->` and the opening brace,
    /// e.g. `Result<CallToolResult, McpError>`. Whitespace inside the
    /// fragment matches flexibly; everything else is literal.
    pub return_fragment: Option<String>,
}

/// A located signature.
///
/// `span.start` is the first byte of the matched modifiers, `open_brace` the
/// offset of the matched `{`, and `body_start` the offset just past the brace
/// and any trailing blank space on that line (where inserted statements land).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureMatch {
    pub span: MatchSpan,
    pub open_brace: usize,
    pub body_start: usize,
}

/// Find every definition of `name` whose signature matches `shape`.
///
/// Returns matches in source order; an empty vector means the function is
/// absent (or its signature disagrees with the shape).
pub fn find_signatures(
    content: &str,
    name: &str,
    shape: &SignatureShape,
) -> Result<Vec<SignatureMatch>, ScanError> {
    let regex = build_pattern(name, shape).map_err(|source| ScanError::Pattern {
        function: name.to_string(),
        source,
    })?;

    let mut matches = Vec::new();
    for m in regex.find_iter(content) {
        let matched = m.as_str();
        // The pattern always ends in `{` plus optional trailing blanks and one
        // newline, so the brace offset is recoverable from the match text.
        let Some(brace_rel) = matched.rfind('{') else {
            continue;
        };
        matches.push(SignatureMatch {
            span: MatchSpan {
                start: m.start(),
                end: m.end(),
            },
            open_brace: m.start() + brace_rel,
            body_start: m.end(),
        });
    }

    Ok(matches)
}

/// Build the signature regex for one function.
///
/// Visibility is optional regardless of shape; the async qualifier and return
/// fragment tighten the match when the shape demands them.
fn build_pattern(name: &str, shape: &SignatureShape) -> Result<Regex, regex::Error> {
    let mut pattern = String::from(r"(?:pub(?:\([^)]*\))?\s+)?");

    if shape.require_async {
        pattern.push_str(r"async\s+");
    } else {
        pattern.push_str(r"(?:async\s+)?");
    }

    pattern.push_str(&format!(r"fn\s+{}\s*\(", regex::escape(name)));
    pattern.push_str(r"[^)]*\)\s*");

    match &shape.return_fragment {
        Some(fragment) => {
            pattern.push_str(r"->\s*");
            pattern.push_str(&escape_return_fragment(fragment));
            pattern.push_str(r"\s*");
        }
        None => pattern.push_str(r"(?:->\s*[^{]*?)?"),
    }

    pattern.push_str(r"\{[ \t]*\n?");

    Regex::new(&pattern)
}

/// Escape a return-type fragment, letting its internal whitespace match any
/// run of whitespace (`Result<CallToolResult, McpError>` should match with or
/// without the space after the comma).
fn escape_return_fragment(fragment: &str) -> String {
    fragment
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s*")
}
