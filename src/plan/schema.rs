use crate::scan::SignatureShape;
use serde::Deserialize;
use std::fmt;

/// A full instrumentation batch: which functions to stitch spans into and
/// which statement templates to stitch.
///
/// Plans are immutable configuration. They are either deserialized from TOML
/// or built in code as a static table; nothing mutates them at runtime.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct InstrumentationPlan {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub templates: SpanTemplates,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
}

/// A correction batch over an already-instrumented file: statements the first
/// pass emitted from wrong field guesses, and what to replace them with.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CorrectionPlan {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub templates: SpanTemplates,
    #[serde(default)]
    pub rewrites: Vec<AttributeRewrite>,
    #[serde(default)]
    pub fixups: Vec<TextFixup>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Statement templates and the sentinel markers that prove their presence.
///
/// Defaults mirror the `StepSpan` telemetry API; every field is overridable
/// so the engine is not wired to one span type.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SpanTemplates {
    /// Span-open statement; `{name}` expands to the function name.
    pub span_open: String,
    /// Sentinel substring whose presence after the body start means the
    /// function is already instrumented. Checked by substring search, never
    /// parsed.
    pub open_marker: String,
    /// Completion statements, one per line, emitted before the success point.
    pub completion: String,
    /// Sentinel substring proving completion statements are already present.
    pub completion_marker: String,
    /// Call prefix for attribute statements.
    pub attribute_call: String,
    /// Call-shaped expression signaling a successful return; the last
    /// occurrence in a body is the canonical completion point.
    pub success_pattern: String,
    /// Looser pattern tried when the primary one is absent.
    pub fallback_success_pattern: String,
    /// Receiver the attribute field paths are read from.
    pub args_binding: String,
    /// Indentation for statements inserted at the body start.
    pub indent: String,
    /// Bytes inspected after the body start for `open_marker`.
    pub open_guard_window: usize,
    /// Bytes inspected before a completion point for `completion_marker`.
    pub completion_guard_window: usize,
}

impl Default for SpanTemplates {
    fn default() -> Self {
        Self {
            span_open: "let mut span = StepSpan::new(\"{name}\", None);".to_string(),
            open_marker: "StepSpan::new".to_string(),
            completion: "span.set_status(true, None);\nspan.end();".to_string(),
            completion_marker: "span.end()".to_string(),
            attribute_call: "span.set_attribute".to_string(),
            success_pattern: "Ok(CallToolResult::success(".to_string(),
            fallback_success_pattern: "Ok(".to_string(),
            args_binding: "args".to_string(),
            indent: "        ".to_string(),
            open_guard_window: 200,
            completion_guard_window: 100,
        }
    }
}

/// One function to instrument: name, signature shape, ordered attribute plan.
#[derive(Debug, Deserialize, Clone)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub signature: SignatureShape,
    #[serde(default, rename = "attributes")]
    pub attribute_plan: Vec<AttributeRule>,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: SignatureShape::default(),
            attribute_plan: Vec::new(),
        }
    }

    pub fn signature(mut self, signature: SignatureShape) -> Self {
        self.signature = signature;
        self
    }

    pub fn attribute(mut self, rule: AttributeRule) -> Self {
        self.attribute_plan.push(rule);
        self
    }
}

/// One attribute to record on the span: public name, field path on the args
/// binding, and the rendering kind.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AttributeRule {
    /// Name recorded on the span (may differ from the field, e.g.
    /// `retry.max_attempts` for field `retries`).
    pub name: String,
    /// Field path read off the args binding.
    pub field: String,
    pub kind: RuleKind,
}

impl AttributeRule {
    pub fn new(name: impl Into<String>, field: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            kind,
        }
    }
}

/// How an attribute statement reads and renders its field.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// Direct, unconditional field read.
    RequiredScalar,
    /// Presence-checked extraction of a string-like field.
    OptionalScalar,
    /// Presence-checked extraction of a numeric field.
    OptionalNumeric,
    /// Unconditional read with `false` as the default when absent.
    Boolean,
    /// A derived representation rather than the raw field, e.g. a packed
    /// color rendered as `#{:08X}`.
    FormattedComposite { template: String },
    /// Records the size of a collection-typed field, not its contents.
    CountOfCollection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AttributeRewrite {
    /// Function whose body scopes the search; whole file when absent.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub signature: SignatureShape,
    /// The rule as (wrongly) emitted by the earlier pass; its rendering
    /// recovers the exact statement text to look for.
    pub old: AttributeRule,
    /// Corrected rule. Absent means the statement is removed outright.
    #[serde(default)]
    pub new: Option<AttributeRule>,
}

/// A literal structural repair, e.g. deleting a timing variable the first
/// pass inserted and nothing ended up using.
#[derive(Debug, Deserialize, Clone)]
pub struct TextFixup {
    pub find: String,
    pub replace: String,
}

impl InstrumentationPlan {
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        let mut issues = Vec::new();

        if self.functions.is_empty() {
            issues.push(PlanIssue::EmptyPlan);
        }
        validate_templates(&self.templates, &mut issues);

        for spec in &self.functions {
            if spec.name.trim().is_empty() {
                issues.push(PlanIssue::MissingField {
                    function: None,
                    field: "name",
                });
            }
            let mut seen = std::collections::HashSet::new();
            for rule in &spec.attribute_plan {
                validate_rule(rule, &spec.name, &mut issues);
                if !seen.insert(rule.name.as_str()) {
                    issues.push(PlanIssue::DuplicateAttribute {
                        function: spec.name.clone(),
                        attribute: rule.name.clone(),
                    });
                }
            }
        }

        finish(issues)
    }
}

impl CorrectionPlan {
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        let mut issues = Vec::new();

        if self.rewrites.is_empty() && self.fixups.is_empty() {
            issues.push(PlanIssue::EmptyPlan);
        }
        validate_templates(&self.templates, &mut issues);

        for rewrite in &self.rewrites {
            let scope = rewrite.function.clone().unwrap_or_default();
            validate_rule(&rewrite.old, &scope, &mut issues);
            if let Some(new) = &rewrite.new {
                validate_rule(new, &scope, &mut issues);
            }
        }
        for fixup in &self.fixups {
            if fixup.find.is_empty() {
                issues.push(PlanIssue::MissingField {
                    function: None,
                    field: "fixup.find",
                });
            }
        }

        finish(issues)
    }
}

fn validate_templates(templates: &SpanTemplates, issues: &mut Vec<PlanIssue>) {
    for (field, value) in [
        ("templates.span_open", &templates.span_open),
        ("templates.open_marker", &templates.open_marker),
        ("templates.completion_marker", &templates.completion_marker),
        ("templates.success_pattern", &templates.success_pattern),
        ("templates.args_binding", &templates.args_binding),
    ] {
        if value.trim().is_empty() {
            issues.push(PlanIssue::MissingField {
                function: None,
                field,
            });
        }
    }
}

fn validate_rule(rule: &AttributeRule, function: &str, issues: &mut Vec<PlanIssue>) {
    let function = if function.is_empty() {
        None
    } else {
        Some(function.to_string())
    };
    if rule.name.trim().is_empty() {
        issues.push(PlanIssue::MissingField {
            function: function.clone(),
            field: "attribute.name",
        });
    }
    if rule.field.trim().is_empty() {
        issues.push(PlanIssue::MissingField {
            function,
            field: "attribute.field",
        });
    }
}

fn finish(issues: Vec<PlanIssue>) -> Result<(), PlanValidationError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(PlanValidationError { issues })
    }
}

#[derive(Debug, Clone)]
pub struct PlanValidationError {
    pub issues: Vec<PlanIssue>,
}

impl fmt::Display for PlanValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PlanValidationError {}

#[derive(Debug, Clone)]
pub enum PlanIssue {
    EmptyPlan,
    MissingField {
        function: Option<String>,
        field: &'static str,
    },
    DuplicateAttribute {
        function: String,
        attribute: String,
    },
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanIssue::EmptyPlan => write!(f, "plan contains no work"),
            PlanIssue::MissingField { function, field } => match function {
                Some(name) => write!(f, "function '{name}' missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            PlanIssue::DuplicateAttribute {
                function,
                attribute,
            } => write!(
                f,
                "function '{function}' declares attribute '{attribute}' more than once"
            ),
        }
    }
}
