//! Batch configuration: plan schema, TOML loading, statement rendering.

mod loader;
mod render;
mod schema;

pub use loader::{
    correction_from_path, correction_from_str, instrumentation_from_path,
    instrumentation_from_str, PlanError,
};
pub use render::Renderer;
pub use schema::{
    AttributeRewrite, AttributeRule, CorrectionPlan, FunctionSpec, InstrumentationPlan, Metadata,
    PlanIssue, PlanValidationError, RuleKind, SpanTemplates, TextFixup,
};
