//! The correction pass: repair attribute statements an earlier run emitted
//! from wrong field guesses.
//!
//! Because rendering is deterministic, re-rendering the old rule recovers the
//! exact text the first pass inserted. That text is located literally (scoped
//! to the named function's body when the rewrite names one) and replaced with
//! the new rule's rendering, or deleted outright.

use crate::edit::{apply_splices, SourceBuffer, Splice};
use crate::instrument::EngineError;
use crate::plan::{AttributeRewrite, CorrectionPlan, Renderer, TextFixup};
use crate::scan::{body_end, find_signatures};

/// Outcome of one rewrite entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The old statement was found and replaced with the new rendering.
    Rewritten,
    /// The old statement was found and deleted (no replacement rule).
    Removed,
    /// Neither the old nor the new statement text occurs in scope. The file
    /// is untouched for this entry.
    NotFound,
    /// The new statement is already in place and the old one is gone; an
    /// earlier correction run did the work.
    SkippedAlreadyCorrect,
}

impl std::fmt::Display for RewriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewriteOutcome::Rewritten => write!(f, "rewritten"),
            RewriteOutcome::Removed => write!(f, "removed"),
            RewriteOutcome::NotFound => write!(f, "not found"),
            RewriteOutcome::SkippedAlreadyCorrect => write!(f, "skipped (already correct)"),
        }
    }
}

/// Per-run report: one outcome per rewrite, plus fixup replacement counts.
#[derive(Debug, Default, Clone)]
pub struct CorrectionReport {
    /// `(attribute name, outcome)` per rewrite entry, in plan order.
    pub rewrites: Vec<(String, RewriteOutcome)>,
    /// `(find text, occurrences replaced)` per fixup, in plan order.
    pub fixups: Vec<(String, usize)>,
}

impl CorrectionReport {
    pub fn rewritten(&self) -> usize {
        self.count(|o| matches!(o, RewriteOutcome::Rewritten | RewriteOutcome::Removed))
    }

    pub fn not_found(&self) -> usize {
        self.count(|o| matches!(o, RewriteOutcome::NotFound))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RewriteOutcome::SkippedAlreadyCorrect))
    }

    pub fn fixup_total(&self) -> usize {
        self.fixups.iter().map(|(_, n)| n).sum()
    }

    fn count(&self, pred: impl Fn(&RewriteOutcome) -> bool) -> usize {
        self.rewrites.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Run the whole correction plan against `content`.
pub fn correct_source(
    content: &str,
    plan: &CorrectionPlan,
) -> Result<(String, CorrectionReport), EngineError> {
    let renderer = Renderer::new(&plan.templates);
    let mut working = content.to_string();
    let mut report = CorrectionReport::default();

    for rewrite in &plan.rewrites {
        let outcome = apply_rewrite(&mut working, rewrite, &renderer)?;
        report.rewrites.push((rewrite.old.name.clone(), outcome));
    }

    for fixup in &plan.fixups {
        let replaced = apply_fixup(&mut working, fixup)?;
        report.fixups.push((fixup.find.clone(), replaced));
    }

    Ok((working, report))
}

/// Read the file, run the correction plan, write the buffer back once.
pub fn correct_file(
    path: impl Into<std::path::PathBuf>,
    plan: &CorrectionPlan,
) -> Result<CorrectionReport, EngineError> {
    let mut buffer = SourceBuffer::read(path.into())?;
    let (rewritten, report) = correct_source(buffer.content(), plan)?;
    buffer.set_content(rewritten);
    buffer.persist()?;
    Ok(report)
}

fn apply_rewrite(
    working: &mut String,
    rewrite: &AttributeRewrite,
    renderer: &Renderer<'_>,
) -> Result<RewriteOutcome, EngineError> {
    let old_text = renderer.attribute(&rewrite.old);
    let new_text = rewrite
        .new
        .as_ref()
        .map(|rule| renderer.attribute(rule))
        .unwrap_or_default();

    let (scope_start, scope_end) = match scope_of(working, rewrite)? {
        Some(range) => range,
        None => return Ok(RewriteOutcome::NotFound),
    };
    let scope = &working[scope_start..scope_end];

    let Some(rel) = scope.find(&old_text) else {
        // The old text is gone; the new one already present means a previous
        // correction run handled this entry.
        if !new_text.is_empty() && scope.contains(&new_text) {
            return Ok(RewriteOutcome::SkippedAlreadyCorrect);
        }
        return Ok(RewriteOutcome::NotFound);
    };

    let start = scope_start + rel;
    let end = start + old_text.len();
    let splice = Splice::replace(start, end, new_text.clone(), &old_text);
    *working = apply_splices(working, vec![splice])?;

    if rewrite.new.is_some() {
        Ok(RewriteOutcome::Rewritten)
    } else {
        Ok(RewriteOutcome::Removed)
    }
}

/// Byte range the rewrite searches: the named function's body, or the whole
/// file when the rewrite names none. A named function with several matching
/// definitions widens the scope to span them all.
fn scope_of(
    working: &str,
    rewrite: &AttributeRewrite,
) -> Result<Option<(usize, usize)>, EngineError> {
    let Some(function) = &rewrite.function else {
        return Ok(Some((0, working.len())));
    };

    let sigs = find_signatures(working, function, &rewrite.signature)?;
    let mut range: Option<(usize, usize)> = None;
    for sig in &sigs {
        let Some(close) = body_end(working, sig.open_brace + 1) else {
            continue;
        };
        range = Some(match range {
            Some((start, end)) => (start.min(sig.body_start), end.max(close)),
            None => (sig.body_start, close),
        });
    }
    Ok(range)
}

/// Literal replace-all. Counts occurrences first so the report can say how
/// many landed; zero occurrences is not an error.
fn apply_fixup(working: &mut String, fixup: &TextFixup) -> Result<usize, EngineError> {
    let mut splices = Vec::new();
    let mut from = 0;
    while let Some(rel) = working[from..].find(&fixup.find) {
        let start = from + rel;
        let end = start + fixup.find.len();
        splices.push(Splice::replace(
            start,
            end,
            fixup.replace.clone(),
            &fixup.find,
        ));
        from = end;
    }

    let count = splices.len();
    if count > 0 {
        *working = apply_splices(working, splices)?;
    }
    Ok(count)
}
