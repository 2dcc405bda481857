//! Span Stitcher: batch telemetry instrumentation for Rust tool handlers
//!
//! Locates function definitions by lexical signature pattern and stitches
//! span-open, attribute, and completion statements into their bodies, without
//! parsing the target. A follow-up correction pass repairs attribute
//! statements emitted from wrong field guesses.
//!
//! # Architecture
//!
//! All rewrites compile down to a single primitive: [`Splice`], a verified
//! byte-span edit against an in-memory buffer. Intelligence lives in span
//! acquisition (signature scanning, brace-depth body extraction, sentinel
//! guards), not in the application logic. Offsets are computed against the
//! current buffer and applied in descending order so the whole batch stays
//! valid without recomputation.
//!
//! # Safety
//!
//! - Replacements verify expected before-text before applying
//! - Atomic file writes (tempfile + fsync + rename), one write per run
//! - UTF-8 boundary validation on every splice
//! - Idempotent: re-running a plan is a no-op, byte for byte
//! - Per-function failures never abort the batch
//!
//! # Example
//!
//! ```no_run
//! use span_stitcher::instrument::instrument_file;
//! use span_stitcher::plan::{AttributeRule, FunctionSpec, InstrumentationPlan, RuleKind};
//!
//! # fn run() -> anyhow::Result<()> {
//! let plan = InstrumentationPlan {
//!     functions: vec![FunctionSpec::new("click_element")
//!         .attribute(AttributeRule::new("selector", "selector", RuleKind::RequiredScalar))],
//!     ..Default::default()
//! };
//!
//! let report = instrument_file("src/server.rs", &plan)?;
//! for (name, outcome) in &report.outcomes {
//!     println!("{name}: {outcome}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod correct;
pub mod edit;
pub mod instrument;
pub mod pipeline;
pub mod plan;
pub mod scan;
pub mod validate;

// Re-exports
pub use correct::{correct_file, correct_source, CorrectionReport, RewriteOutcome};
pub use edit::{apply_splices, SourceBuffer, Splice, SpliceError, SpliceVerification};
pub use instrument::{
    instrument_file, instrument_source, BatchReport, EngineError, FunctionOutcome,
};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use plan::{
    correction_from_path, instrumentation_from_path, AttributeRule, CorrectionPlan, FunctionSpec,
    InstrumentationPlan, PlanError, RuleKind, SpanTemplates,
};
pub use scan::{body_end, find_signatures, ScanError, SignatureMatch, SignatureShape};
pub use validate::{parse_check, ParseCheckError};
