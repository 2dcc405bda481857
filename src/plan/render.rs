//! Statement rendering: the attribute emitter.
//!
//! Rendering is pure and deterministic — identical `(field, kind)` input
//! always yields byte-identical statement text. The correction pass depends
//! on this to recover the exact text an earlier run emitted.

use crate::plan::schema::{AttributeRule, RuleKind, SpanTemplates};

/// Renders span-open, attribute, and completion statements from templates.
pub struct Renderer<'a> {
    templates: &'a SpanTemplates,
}

impl<'a> Renderer<'a> {
    pub fn new(templates: &'a SpanTemplates) -> Self {
        Self { templates }
    }

    /// The span-open statement for `function`, indented, newline-terminated.
    pub fn span_open(&self, function: &str) -> String {
        format!(
            "{}{}\n",
            self.templates.indent,
            self.templates.span_open.replace("{name}", function)
        )
    }

    /// One attribute statement (or presence-checked block), indented,
    /// newline-terminated.
    pub fn attribute(&self, rule: &AttributeRule) -> String {
        let t = self.templates;
        let indent = &t.indent;
        let inner = format!("{indent}    ");
        let call = &t.attribute_call;
        let args = &t.args_binding;
        let name = &rule.name;
        let field = &rule.field;
        // Binding for presence-checked forms: the last path segment.
        let var = field.rsplit('.').next().unwrap_or(field);

        match &rule.kind {
            RuleKind::RequiredScalar => {
                format!("{indent}{call}(\"{name}\", {args}.{field}.to_string());\n")
            }
            RuleKind::OptionalScalar => format!(
                "{indent}if let Some(ref {var}) = {args}.{field} {{\n\
                 {inner}{call}(\"{name}\", {var}.clone());\n\
                 {indent}}}\n"
            ),
            RuleKind::OptionalNumeric => format!(
                "{indent}if let Some({var}) = {args}.{field} {{\n\
                 {inner}{call}(\"{name}\", {var}.to_string());\n\
                 {indent}}}\n"
            ),
            RuleKind::Boolean => format!(
                "{indent}{call}(\"{name}\", {args}.{field}.unwrap_or(false).to_string());\n"
            ),
            RuleKind::FormattedComposite { template } => format!(
                "{indent}if let Some(ref {var}) = {args}.{field} {{\n\
                 {inner}{call}(\"{name}\", format!(\"{template}\", {var}));\n\
                 {indent}}}\n"
            ),
            RuleKind::CountOfCollection => format!(
                "{indent}if let Some(ref {var}) = {args}.{field} {{\n\
                 {inner}{call}(\"{name}\", {var}.len().to_string());\n\
                 {indent}}}\n"
            ),
        }
    }

    /// The whole block inserted at a body start: span-open plus every
    /// attribute statement, in plan order.
    pub fn opening_block(&self, function: &str, rules: &[AttributeRule]) -> String {
        let mut block = self.span_open(function);
        for rule in rules {
            block.push_str(&self.attribute(rule));
        }
        block
    }

    /// Completion statements re-indented to the success point's line.
    pub fn completion(&self, line_indent: &str) -> String {
        let mut out = String::new();
        for line in self.templates.completion.lines() {
            out.push_str(line_indent);
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}
