//! End-to-end driver: read once, run any mix of passes in memory, write once.
//!
//! ```no_run
//! use span_stitcher::pipeline::Pipeline;
//! use span_stitcher::plan::instrumentation_from_path;
//!
//! # fn run() -> anyhow::Result<()> {
//! let plan = instrumentation_from_path("plans/tools.toml")?;
//! let outcome = Pipeline::open("src/server.rs")?
//!     .instrument(&plan)?
//!     .commit()?;
//! println!("{} instrumented", outcome.batch.unwrap().instrumented());
//! # Ok(())
//! # }
//! ```

use crate::correct::{correct_source, CorrectionReport};
use crate::edit::SourceBuffer;
use crate::instrument::{instrument_source, BatchReport, EngineError};
use crate::plan::{CorrectionPlan, InstrumentationPlan};
use crate::validate::{parse_check, ParseCheckError};
use std::path::{Path, PathBuf};

/// A single run over one target file. Passes chain in memory against the same
/// buffer; nothing touches the filesystem until [`Pipeline::commit`].
pub struct Pipeline {
    buffer: SourceBuffer,
    batch: Option<BatchReport>,
    correction: Option<CorrectionReport>,
}

/// Reports from the passes a committed (or inspected) pipeline ran.
#[derive(Debug, Default, Clone)]
pub struct PipelineOutcome {
    pub batch: Option<BatchReport>,
    pub correction: Option<CorrectionReport>,
}

impl Pipeline {
    /// Read the target file into the working buffer.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        Ok(Self::wrap(SourceBuffer::read(path.into())?))
    }

    /// Start from in-memory content (dry runs, tests).
    pub fn from_source(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self::wrap(SourceBuffer::from_string(path, content))
    }

    fn wrap(buffer: SourceBuffer) -> Self {
        Self {
            buffer,
            batch: None,
            correction: None,
        }
    }

    /// Run an instrumentation pass over the working buffer.
    pub fn instrument(mut self, plan: &InstrumentationPlan) -> Result<Self, EngineError> {
        let (rewritten, report) = instrument_source(self.buffer.content(), plan)?;
        self.buffer.set_content(rewritten);
        self.batch = Some(report);
        Ok(self)
    }

    /// Run a correction pass over the working buffer.
    pub fn correct(mut self, plan: &CorrectionPlan) -> Result<Self, EngineError> {
        let (rewritten, report) = correct_source(self.buffer.content(), plan)?;
        self.buffer.set_content(rewritten);
        self.correction = Some(report);
        Ok(self)
    }

    /// Parse the working buffer as a full Rust file.
    pub fn parse_check(&self) -> Result<(), ParseCheckError> {
        parse_check(self.buffer.content())
    }

    pub fn path(&self) -> &Path {
        self.buffer.path()
    }

    /// The working buffer as rewritten so far.
    pub fn content(&self) -> &str {
        self.buffer.content()
    }

    pub fn batch_report(&self) -> Option<&BatchReport> {
        self.batch.as_ref()
    }

    pub fn correction_report(&self) -> Option<&CorrectionReport> {
        self.correction.as_ref()
    }

    /// Discard the buffer without writing, keeping the reports (dry runs).
    pub fn into_outcome(self) -> PipelineOutcome {
        PipelineOutcome {
            batch: self.batch,
            correction: self.correction,
        }
    }

    /// Write the buffer back to its file atomically.
    pub fn commit(self) -> Result<PipelineOutcome, EngineError> {
        self.buffer.persist()?;
        Ok(PipelineOutcome {
            batch: self.batch,
            correction: self.correction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{AttributeRewrite, AttributeRule, FunctionSpec, RuleKind};

    const TOOL: &str = r#"
async fn press_key(&self, args: KeyArgs) -> Result<CallToolResult, McpError> {
    self.keyboard.press(&args.key)?;
    Ok(CallToolResult::success(vec![]))
}
"#;

    fn key_plan() -> InstrumentationPlan {
        InstrumentationPlan {
            functions: vec![FunctionSpec::new("press_key")
                .attribute(AttributeRule::new("key", "key", RuleKind::RequiredScalar))],
            ..Default::default()
        }
    }

    #[test]
    fn chained_passes_share_one_buffer() {
        let correction = CorrectionPlan {
            rewrites: vec![AttributeRewrite {
                function: Some("press_key".to_string()),
                signature: Default::default(),
                old: AttributeRule::new("key", "key", RuleKind::RequiredScalar),
                new: Some(AttributeRule::new("key_chord", "key", RuleKind::RequiredScalar)),
            }],
            ..Default::default()
        };

        let pipeline = Pipeline::from_source("mem.rs", TOOL)
            .instrument(&key_plan())
            .unwrap()
            .correct(&correction)
            .unwrap();

        // The correction saw the statement the instrumentation pass just
        // inserted, without any intermediate write.
        assert!(pipeline.content().contains("\"key_chord\""));
        assert!(!pipeline.content().contains("\"key\","));
        let outcome = pipeline.into_outcome();
        assert_eq!(outcome.batch.unwrap().instrumented(), 1);
        assert_eq!(outcome.correction.unwrap().rewritten(), 1);
    }

    #[test]
    fn commit_writes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.rs");
        std::fs::write(&path, TOOL).unwrap();

        let outcome = Pipeline::open(&path)
            .unwrap()
            .instrument(&key_plan())
            .unwrap()
            .commit()
            .unwrap();

        assert_eq!(outcome.batch.unwrap().instrumented(), 1);
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("StepSpan::new(\"press_key\""));
    }

    #[test]
    fn dry_run_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.rs");
        std::fs::write(&path, TOOL).unwrap();

        let pipeline = Pipeline::open(&path).unwrap().instrument(&key_plan()).unwrap();
        assert!(pipeline.content().contains("StepSpan::new"));
        drop(pipeline.into_outcome());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), TOOL);
    }

    #[test]
    fn commit_writes_even_when_buffer_fails_parse() {
        // The parse check is advisory: a failing buffer still commits, and
        // callers signal the violated post-condition through exit status.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.rs");
        std::fs::write(&path, "fn ok() {}").unwrap();

        let pipeline = Pipeline::from_source(&path, "fn broken() { {");
        assert!(pipeline.parse_check().is_err());
        pipeline.commit().unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "fn broken() { {"
        );
    }

    #[test]
    fn parse_check_flags_broken_rewrite() {
        let pipeline = Pipeline::from_source("mem.rs", "fn broken() { {\n");
        assert!(pipeline.parse_check().is_err());
    }
}
