//! End-to-end instrumentation workflow
//!
//! Exercises the complete pipeline against a realistic tool-handler file:
//! 1. Load plans from TOML
//! 2. Instrument
//! 3. Re-run to check idempotency
//! 4. Correct a wrong field guess
//! 5. Parse the result

use span_stitcher::correct::{correct_source, RewriteOutcome};
use span_stitcher::instrument::{instrument_file, instrument_source, FunctionOutcome};
use span_stitcher::plan::{correction_from_str, instrumentation_from_str};
use span_stitcher::validate::parse_check;
use std::fs;
use tempfile::TempDir;

/// A cut-down tool-handler module shaped like the servers this engine is
/// pointed at: async methods taking typed args and returning
/// `Result<CallToolResult, McpError>`.
const SERVER: &str = r#"
impl DesktopServer {
    async fn click_element(&self, args: ClickArgs) -> Result<CallToolResult, McpError> {
        let element = self.locator(&args.selector).await?;
        element.click()?;
        Ok(CallToolResult::success(vec![Content::text("clicked")]))
    }

    async fn set_toggled(&self, args: ToggleArgs) -> Result<CallToolResult, McpError> {
        let element = self.locator(&args.selector).await?;
        if element.is_toggled()? == args.state {
            return Ok(CallToolResult::success(vec![Content::text("no-op")]));
        }
        element.toggle()?;
        Ok(CallToolResult::success(vec![Content::text("toggled")]))
    }

    async fn type_text(&self, args: TypeArgs) -> Result<CallToolResult, McpError> {
        let element = self.locator(&args.selector).await?;
        element.type_text(&args.text, args.clear_first.unwrap_or(false))?;
        Ok(CallToolResult::success(vec![Content::text("typed")]))
    }
}
"#;

const PLAN: &str = r#"
[meta]
name = "desktop tool telemetry"

[[functions]]
name = "click_element"
signature = { require_async = true, return_fragment = "Result<CallToolResult, McpError>" }
attributes = [
    { name = "selector", field = "selector", kind = "required-scalar" },
]

[[functions]]
name = "set_toggled"
attributes = [
    { name = "selector", field = "selector", kind = "required-scalar" },
    { name = "toggled", field = "toggled", kind = "required-scalar" },
]

[[functions]]
name = "type_text"
attributes = [
    { name = "selector", field = "selector", kind = "required-scalar" },
    { name = "clear_first", field = "clear_first", kind = "boolean" },
]
"#;

const CORRECTION: &str = r#"
[meta]
name = "toggled -> state schema repair"

[[rewrites]]
function = "set_toggled"
old = { name = "toggled", field = "toggled", kind = "required-scalar" }
new = { name = "state", field = "state", kind = "required-scalar" }
"#;

#[test]
fn full_workflow_instrument_then_correct() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("server.rs");
    fs::write(&target, SERVER).unwrap();

    let plan = instrumentation_from_str(PLAN).unwrap();

    // Step 1: instrument everything
    let report = instrument_file(&target, &plan).unwrap();
    assert_eq!(report.instrumented(), 3);
    assert_eq!(report.skipped(), 0);

    let instrumented = fs::read_to_string(&target).unwrap();
    assert_eq!(instrumented.matches("StepSpan::new(\"click_element\"").count(), 1);
    assert_eq!(instrumented.matches("StepSpan::new(\"set_toggled\"").count(), 1);
    assert_eq!(instrumented.matches("StepSpan::new(\"type_text\"").count(), 1);
    // set_toggled has two success returns; only the trailing one gets the
    // completion pair, plus one each for the other two functions.
    assert_eq!(instrumented.matches("span.end();").count(), 3);

    // Step 2: second run is a byte-identical no-op
    let report = instrument_file(&target, &plan).unwrap();
    assert_eq!(report.skipped(), 3);
    assert_eq!(fs::read_to_string(&target).unwrap(), instrumented);

    // Step 3: repair the wrong field guess
    let correction = correction_from_str(CORRECTION).unwrap();
    let (corrected, report) = correct_source(&instrumented, &correction).unwrap();
    assert_eq!(report.rewrites[0].1, RewriteOutcome::Rewritten);
    assert!(corrected.contains("span.set_attribute(\"state\", args.state.to_string());"));
    assert!(!corrected.contains("toggled\", args.toggled"));

    // Step 4: the rewritten module still parses
    parse_check(&corrected).unwrap();
}

#[test]
fn scenario_single_line_body() {
    // body = `{ ; Ok(X::success(v)) }` with one required attribute
    let src = "fn quick(args: Args) -> Result<CallToolResult, McpError> { ; Ok(CallToolResult::success(v)) }\n";
    let plan = instrumentation_from_str(
        r#"
[[functions]]
name = "quick"
attributes = [{ name = "selector", field = "selector", kind = "required-scalar" }]
"#,
    )
    .unwrap();

    let (out, report) = instrument_source(src, &plan).unwrap();

    assert_eq!(report.outcomes[0].1, FunctionOutcome::Instrumented);
    assert_eq!(out.matches("StepSpan::new(\"quick\"").count(), 1);
    assert_eq!(out.matches("span.set_attribute(\"selector\"").count(), 1);
    // Completion pair sits immediately before the success expression.
    assert_eq!(
        out.matches("span.set_status(true, None); span.end(); Ok(CallToolResult::success(v))")
            .count(),
        1
    );

    // And running the output through again changes nothing.
    let (again, report) = instrument_source(&out, &plan).unwrap();
    assert_eq!(again, out);
    assert_eq!(report.outcomes[0].1, FunctionOutcome::SkippedAlreadyDone);
}

#[test]
fn scenario_early_return_tie_break() {
    let src = r#"
async fn resolve(&self, args: Args) -> Result<CallToolResult, McpError> {
    if cached {
        return Ok(CallToolResult::success(early));
    }
    let value = compute()?;
    Ok(CallToolResult::success(value))
}
"#;
    let plan = instrumentation_from_str("[[functions]]\nname = \"resolve\"\n").unwrap();
    let (out, _) = instrument_source(src, &plan).unwrap();

    assert_eq!(out.matches("span.end();").count(), 1);
    let completion = out.find("span.end();").unwrap();
    assert!(completion > out.find("success(early)").unwrap());
    assert!(completion < out.find("success(value)").unwrap());
}

#[test]
fn scenario_absent_function_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("server.rs");
    fs::write(&target, SERVER).unwrap();

    let plan =
        instrumentation_from_str("[[functions]]\nname = \"clck_element\"\n").unwrap();
    let report = instrument_file(&target, &plan).unwrap();

    match &report.outcomes[0].1 {
        FunctionOutcome::NotFound { suggestion } => {
            assert_eq!(suggestion.as_deref(), Some("click_element"));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(&target).unwrap(), SERVER);
}

#[test]
fn correction_touches_nothing_else() {
    let plan = instrumentation_from_str(PLAN).unwrap();
    let (instrumented, _) = instrument_source(SERVER, &plan).unwrap();

    let correction = correction_from_str(CORRECTION).unwrap();
    let (corrected, _) = correct_source(&instrumented, &correction).unwrap();

    // Exactly one line differs between the two versions.
    let before: Vec<&str> = instrumented.lines().collect();
    let after: Vec<&str> = corrected.lines().collect();
    assert_eq!(before.len(), after.len());
    let changed = before
        .iter()
        .zip(&after)
        .filter(|(b, a)| b != a)
        .count();
    assert_eq!(changed, 1);
}

#[test]
fn instrumented_output_parses_as_rust() {
    // A standalone module (no `impl` wrapper) so syn accepts it whole.
    let src = r#"
async fn press_key(args: KeyArgs) -> Result<CallToolResult, McpError> {
    press(&args.key)?;
    Ok(CallToolResult::success(vec![]))
}
"#;
    let plan = instrumentation_from_str(
        r#"
[[functions]]
name = "press_key"
attributes = [
    { name = "key", field = "key", kind = "required-scalar" },
    { name = "hold_ms", field = "hold_ms", kind = "optional-numeric" },
]
"#,
    )
    .unwrap();

    let (out, report) = instrument_source(src, &plan).unwrap();
    assert_eq!(report.outcomes[0].1, FunctionOutcome::Instrumented);
    parse_check(&out).unwrap();
}
