use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental rewrite primitive: a byte-span splice against the in-memory
/// source buffer.
///
/// All high-level operations (span insertion, attribute rewrites, fixups)
/// compile down to this single primitive. Intelligence lives in span
/// acquisition, not application. A splice with `start == end` is a pure
/// insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a Splice does nothing until applied to a buffer"]
pub struct Splice {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    /// Text spliced in at [start, end)
    pub text: String,
    /// Verification of what we expect to find before applying.
    /// Insertions carry no expectation; replacements always do.
    pub expected_before: Option<SpliceVerification>,
}

/// Verification strategy for replacement safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl SpliceVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            SpliceVerification::ExactMatch(expected) => text == expected,
            SpliceVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            SpliceVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            SpliceVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum SpliceError {
    #[error(
        "before-text verification failed at byte {start}: expected {expected:?}, found {found:?}"
    )]
    BeforeTextMismatch {
        start: usize,
        expected: String,
        found: String,
    },

    #[error("invalid byte range [{start}, {end}) in buffer of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("splice range [{start}, {end}) is not on UTF-8 character boundaries")]
    NotCharBoundary { start: usize, end: usize },

    #[error("splices at [{first_start}, {first_end}) and [{second_start}, {second_end}) overlap")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Splice {
    /// A pure insertion at `offset`.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            start: offset,
            end: offset,
            text: text.into(),
            expected_before: None,
        }
    }

    /// A replacement of `[start, end)` with verification of the current text.
    pub fn replace(
        start: usize,
        end: usize,
        text: impl Into<String>,
        expected_before: &str,
    ) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            expected_before: Some(SpliceVerification::from_text(expected_before)),
        }
    }

    fn validate(&self, content: &str) -> Result<(), SpliceError> {
        if self.start > self.end || self.end > content.len() {
            return Err(SpliceError::InvalidRange {
                start: self.start,
                end: self.end,
                len: content.len(),
            });
        }
        if !content.is_char_boundary(self.start) || !content.is_char_boundary(self.end) {
            return Err(SpliceError::NotCharBoundary {
                start: self.start,
                end: self.end,
            });
        }
        if let Some(verification) = &self.expected_before {
            let current = &content[self.start..self.end];
            if !verification.matches(current) {
                return Err(SpliceError::BeforeTextMismatch {
                    start: self.start,
                    expected: format!("{verification:?}"),
                    found: current.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Apply a batch of splices to a source string, producing the rewritten text.
///
/// Splices are sorted by descending start offset and applied bottom-to-top so
/// that every splice's offsets, computed against the original text, stay valid
/// throughout the pass. Overlapping spans are rejected before anything is
/// applied.
pub fn apply_splices(content: &str, mut splices: Vec<Splice>) -> Result<String, SpliceError> {
    if splices.is_empty() {
        return Ok(content.to_string());
    }

    splices.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    // Validate everything against the untouched text first: either the whole
    // batch is applicable or none of it is applied.
    for splice in &splices {
        splice.validate(content)?;
    }

    // Sorted descending: for non-overlapping spans, the earlier (lower)
    // splice's end must not exceed the later splice's start.
    for window in splices.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.end > later.start {
            return Err(SpliceError::Overlap {
                first_start: earlier.start,
                first_end: earlier.end,
                second_start: later.start,
                second_end: later.end,
            });
        }
    }

    let mut out = content.to_string();
    for splice in &splices {
        out.replace_range(splice.start..splice.end, &splice.text);
    }
    Ok(out)
}

/// The whole target file held in memory: read once, mutated through
/// [`apply_splices`], written back exactly once per run.
///
/// A crash before [`SourceBuffer::persist`] leaves the original file
/// untouched; there is deliberately no partial-write path.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    path: PathBuf,
    content: String,
}

impl SourceBuffer {
    /// Read the target file into memory.
    pub fn read(path: impl Into<PathBuf>) -> Result<Self, SpliceError> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|source| SpliceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, content })
    }

    /// Wrap already-loaded content (used by dry runs and tests).
    pub fn from_string(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace the buffer content with the result of a rewrite pass.
    pub fn set_content(&mut self, content: String) {
        self.content = content;
    }

    /// Apply a batch of splices to the buffer in memory.
    pub fn apply_all(&mut self, splices: Vec<Splice>) -> Result<(), SpliceError> {
        self.content = apply_splices(&self.content, splices)?;
        Ok(())
    }

    /// Write the buffer back to its file atomically.
    ///
    /// Uses tempfile + fsync + rename so that either the full write succeeds
    /// or the original file is left intact, then bumps the mtime to
    /// invalidate incremental compilation of the instrumented file.
    pub fn persist(&self) -> Result<(), SpliceError> {
        atomic_write(&self.path, self.content.as_bytes()).map_err(|source| SpliceError::Io {
            path: self.path.clone(),
            source,
        })?;

        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&self.path, now).map_err(|source| SpliceError::Io {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }
}

/// Atomic file write: tempfile in the same directory + fsync + rename.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), std::io::Error> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_exact_match() {
        let verify = SpliceVerification::ExactMatch("hello world".to_string());
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn verification_hash() {
        let verify = SpliceVerification::Hash(xxh3_64(b"hello world"));
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("goodbye world"));
    }

    #[test]
    fn verification_from_text_picks_hash_for_large_spans() {
        assert!(matches!(
            SpliceVerification::from_text("small"),
            SpliceVerification::ExactMatch(_)
        ));
        assert!(matches!(
            SpliceVerification::from_text(&"x".repeat(2000)),
            SpliceVerification::Hash(_)
        ));
    }

    #[test]
    fn invalid_range_rejected() {
        let result = apply_splices("hello world", vec![Splice::insert(20, "x")]);
        assert!(matches!(result, Err(SpliceError::InvalidRange { .. })));
    }

    #[test]
    fn mismatched_before_text_rejected() {
        let result = apply_splices("hello world", vec![Splice::replace(0, 5, "HELLO", "jello")]);
        assert!(matches!(
            result,
            Err(SpliceError::BeforeTextMismatch { .. })
        ));
    }

    #[test]
    fn overlap_rejected_before_any_splice_applies() {
        let result = apply_splices(
            "hello world",
            vec![
                Splice::replace(0, 6, "a", "hello "),
                Splice::replace(4, 8, "b", "o wo"),
            ],
        );
        assert!(matches!(result, Err(SpliceError::Overlap { .. })));
    }

    #[test]
    fn descending_application_keeps_original_offsets_valid() {
        // Offsets computed against the original text; order of the input
        // vector must not matter.
        let splices = vec![
            Splice::insert(0, "<"),
            Splice::insert(5, "|"),
            Splice::insert(11, ">"),
        ];
        let out = apply_splices("hello world", splices).unwrap();
        assert_eq!(out, "<hello| world>");
    }

    #[test]
    fn ascending_naive_application_corrupts_text() {
        // Negative case: applying the same insertions lowest-first against a
        // buffer that is mutated as we go shifts every later offset.
        let mut naive = String::from("hello world");
        naive.insert_str(0, "<");
        naive.insert_str(5, "|");
        naive.insert_str(11, ">");
        assert_ne!(naive, "<hello| world>");
    }

    #[test]
    fn buffer_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.rs");
        fs::write(&path, "fn main() {}").unwrap();

        let mut buffer = SourceBuffer::read(&path).unwrap();
        buffer
            .apply_all(vec![Splice::insert(11, " println!(\"hi\"); ")])
            .unwrap();
        buffer.persist().unwrap();

        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "fn main() { println!(\"hi\"); }");
    }

    #[test]
    fn empty_batch_is_identity() {
        assert_eq!(apply_splices("abc", Vec::new()).unwrap(), "abc");
    }
}
