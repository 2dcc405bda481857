//! The instrumentation pass: per-function pipeline and batch orchestration.
//!
//! For each entry in the plan's function table the pipeline runs
//! locate → extract body → idempotency guard → completion point → render →
//! splice. Failures are isolated per function; the batch always completes and
//! every outcome lands in the [`BatchReport`].

use crate::edit::{apply_splices, SourceBuffer, Splice, SpliceError};
use crate::plan::{FunctionSpec, InstrumentationPlan, Renderer, SpanTemplates};
use crate::scan::{body_end, find_signatures, ScanError};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Infrastructure failures. Per-function misses are not errors; they are
/// [`FunctionOutcome`]s.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Splice(#[from] SpliceError),
}

/// Outcome of one function-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionOutcome {
    /// Span-open, attributes, and completion statements were inserted.
    Instrumented,
    /// The open marker was already present; nothing was touched.
    SkippedAlreadyDone,
    /// No signature matched the name and shape; the file is untouched for
    /// this entry.
    NotFound {
        /// Closest function name present in the buffer, when one is similar
        /// enough to look like a typo.
        suggestion: Option<String>,
    },
    /// Neither success pattern occurred in the body: attributes were
    /// inserted, the completion statement was deliberately omitted, and the
    /// instrumentation is incomplete pending manual follow-up.
    AmbiguousSuccessPoint,
}

impl fmt::Display for FunctionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionOutcome::Instrumented => write!(f, "instrumented"),
            FunctionOutcome::SkippedAlreadyDone => write!(f, "skipped (already instrumented)"),
            FunctionOutcome::NotFound { suggestion } => match suggestion {
                Some(name) => write!(f, "not found (did you mean '{name}'?)"),
                None => write!(f, "not found"),
            },
            FunctionOutcome::AmbiguousSuccessPoint => {
                write!(f, "ambiguous success point (completion statement omitted)")
            }
        }
    }
}

/// Per-run report: one outcome per function-table entry, in plan order.
#[derive(Debug, Default, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<(String, FunctionOutcome)>,
}

impl BatchReport {
    pub fn instrumented(&self) -> usize {
        self.count(|o| matches!(o, FunctionOutcome::Instrumented))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FunctionOutcome::SkippedAlreadyDone))
    }

    pub fn not_found(&self) -> usize {
        self.count(|o| matches!(o, FunctionOutcome::NotFound { .. }))
    }

    pub fn ambiguous(&self) -> usize {
        self.count(|o| matches!(o, FunctionOutcome::AmbiguousSuccessPoint))
    }

    fn count(&self, pred: impl Fn(&FunctionOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Run the whole plan against `content`, returning the rewritten text and the
/// report. Pure with respect to the filesystem; [`instrument_file`] adds the
/// read-once/write-once wrapper.
pub fn instrument_source(
    content: &str,
    plan: &InstrumentationPlan,
) -> Result<(String, BatchReport), EngineError> {
    let renderer = Renderer::new(&plan.templates);
    let mut working = content.to_string();
    let mut report = BatchReport::default();

    for spec in &plan.functions {
        let outcome = instrument_function(&mut working, spec, &plan.templates, &renderer)?;
        report.outcomes.push((spec.name.clone(), outcome));
    }

    Ok((working, report))
}

/// Read the file, run the plan, write the mutated buffer back once.
pub fn instrument_file(
    path: impl Into<std::path::PathBuf>,
    plan: &InstrumentationPlan,
) -> Result<BatchReport, EngineError> {
    let mut buffer = SourceBuffer::read(path.into())?;
    let (rewritten, report) = instrument_source(buffer.content(), plan)?;
    buffer.set_content(rewritten);
    buffer.persist()?;
    Ok(report)
}

fn instrument_function(
    working: &mut String,
    spec: &FunctionSpec,
    templates: &SpanTemplates,
    renderer: &Renderer<'_>,
) -> Result<FunctionOutcome, EngineError> {
    let sigs = find_signatures(working, &spec.name, &spec.signature)?;
    if sigs.is_empty() {
        return Ok(FunctionOutcome::NotFound {
            suggestion: closest_name(working, &spec.name),
        });
    }

    let mut any_instrumented = false;
    let mut any_ambiguous = false;
    let mut splices = Vec::new();

    for sig in &sigs {
        // Depth is 1 just past the brace; the scan returns the offset where
        // it comes back to 0. A body that never closes means the brace scan
        // ran off the end of the file; the entry is reported absent.
        let body_close = match body_end(working, sig.open_brace + 1) {
            Some(end) => end,
            None => {
                return Ok(FunctionOutcome::NotFound { suggestion: None });
            }
        };

        // The idempotency guard runs before any other stage computes offsets:
        // a pre-existing marker means the buffer already diverges from what
        // the later stages assume.
        let guard_from = sig.body_start.min(body_close);
        let guard_to = floor_boundary(
            working,
            (sig.body_start + templates.open_guard_window).min(body_close),
        );
        if working[guard_from..guard_to].contains(&templates.open_marker) {
            continue;
        }

        let body = &working[sig.body_start..body_close];
        let completion_rel = find_last(body, &templates.success_pattern)
            .or_else(|| find_last(body, &templates.fallback_success_pattern));

        // The completion splice goes into the batch ahead of the opening
        // block: when both land on the same offset (success expression on the
        // body's first line), descending application puts the later-queued
        // splice first in the output.
        match completion_rel {
            Some(rel) => {
                let at = sig.body_start + rel;
                if let Some(splice) =
                    completion_splice(working, sig.body_start, at, templates, renderer)
                {
                    splices.push(splice);
                }
            }
            None => any_ambiguous = true,
        }

        splices.push(Splice::insert(
            sig.body_start,
            renderer.opening_block(&spec.name, &spec.attribute_plan),
        ));
        any_instrumented = true;
    }

    if !splices.is_empty() {
        *working = apply_splices(working, splices)?;
    }

    if any_ambiguous {
        Ok(FunctionOutcome::AmbiguousSuccessPoint)
    } else if any_instrumented {
        Ok(FunctionOutcome::Instrumented)
    } else {
        Ok(FunctionOutcome::SkippedAlreadyDone)
    }
}

/// Compute the completion-statement splice for a success occurrence at
/// absolute offset `at`, or `None` when the look-behind guard finds the
/// completion marker already in place.
fn completion_splice(
    working: &str,
    body_start: usize,
    at: usize,
    templates: &SpanTemplates,
    renderer: &Renderer<'_>,
) -> Option<Splice> {
    let guard_from = ceil_boundary(
        working,
        at.saturating_sub(templates.completion_guard_window),
    );
    if working[guard_from..at].contains(&templates.completion_marker) {
        return None;
    }

    let line_start = working[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &working[line_start..at];

    if line_start >= body_start && prefix.chars().all(|c| c == ' ' || c == '\t') {
        // The occurrence owns its line: emit a full statement block above it,
        // reusing the line's indentation.
        Some(Splice::insert(
            line_start,
            renderer.completion(prefix),
        ))
    } else {
        // Single-line body or mid-line occurrence: emit the statements inline,
        // immediately before the success expression.
        let inline = templates
            .completion
            .lines()
            .collect::<Vec<_>>()
            .join(" ");
        Some(Splice::insert(at, format!("{inline} ")))
    }
}

/// Nearest char boundary at or below `i`. Guard windows are byte-sized and
/// can land inside a multi-byte character.
fn floor_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Nearest char boundary at or above `i`.
fn ceil_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Last occurrence of `pattern` in `body`, in source order. The final
/// occurrence is the canonical completion point: it favors the outermost
/// trailing success expression over nested early-success paths.
fn find_last(body: &str, pattern: &str) -> Option<usize> {
    if pattern.is_empty() {
        return None;
    }
    body.rfind(pattern)
}

static FN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fn\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Closest `fn` name present in the buffer, when one scores like a typo.
fn closest_name(content: &str, wanted: &str) -> Option<String> {
    let mut best: Option<(f64, String)> = None;

    for cap in FN_NAME.captures_iter(content) {
        let candidate = &cap[1];
        if candidate == wanted {
            continue;
        }
        let score = strsim::jaro_winkler(wanted, candidate);
        if score >= 0.85 && best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, candidate.to_string()));
        }
    }

    best.map(|(_, name)| name)
}
