//! Workflow expression language.
//!
//! Strings in a workflow may embed `${{ <expr> }}` segments ([`Template`]) and
//! `if:` fields hold a bare or wrapped expression ([`Condition`]). Both are
//! parsed once when a workflow is compiled so that syntax errors, unknown
//! functions and arity mistakes are reported before anything runs.

#![allow(unused_assignments)] // False positives from miette derive macro

mod eval;
mod lexer;
mod parser;
pub mod value;

pub use eval::{EvalContext, JobStatus};
pub use parser::{BinaryOp, CONTEXTS, Expr};
pub use value::Value;

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing or evaluating expressions.
#[derive(Debug, Error, Diagnostic)]
pub enum ExprError {
    /// Malformed expression
    #[error("invalid expression: {message}")]
    #[diagnostic(code(stepwise::expr::syntax))]
    Syntax {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: SourceSpan,
    },

    /// Call to a function that does not exist
    #[error("unknown function `{name}`")]
    #[diagnostic(
        code(stepwise::expr::unknown_function),
        help(
            "available functions: success, always, failure, cancelled, contains, startsWith, endsWith, format, join, toJSON, fromJSON, hashFiles"
        )
    )]
    UnknownFunction {
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("not a known function")]
        span: SourceSpan,
    },

    /// Function called with the wrong number of arguments
    #[error("`{name}` expects {expected} argument(s), found {found}")]
    #[diagnostic(code(stepwise::expr::arity))]
    Arity {
        name: String,
        expected: String,
        found: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("called with {found} argument(s)")]
        span: SourceSpan,
    },

    /// Reference to a context that does not exist
    #[error("unknown context `{name}`")]
    #[diagnostic(
        code(stepwise::expr::unknown_context),
        help("available contexts: {}", CONTEXTS.join(", "))
    )]
    UnknownContext {
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("unknown context")]
        span: SourceSpan,
    },

    /// Runtime evaluation failure (bad `fromJSON` input, unreadable files, ...)
    #[error("expression evaluation failed: {message}")]
    #[diagnostic(code(stepwise::expr::eval))]
    Eval { message: String },
}

impl ExprError {
    pub(crate) fn syntax(source: &str, span: SourceSpan, message: String) -> Self {
        Self::Syntax {
            message,
            src: Self::named_source(source),
            span,
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Self::Eval {
            message: message.into(),
        }
    }

    pub(crate) fn named_source(source: &str) -> NamedSource<String> {
        NamedSource::new("expression", source.to_string())
    }
}

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Expr(Expr),
}

/// A string with embedded `${{ }}` expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns an error for an unterminated `${{` or an invalid embedded
    /// expression.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let mut segments = Vec::new();
        let mut rest = 0;

        while let Some(found) = source[rest..].find(OPEN) {
            let open = rest + found;
            if open > rest {
                segments.push(Segment::Literal(source[rest..open].to_string()));
            }
            let body_start = open + OPEN.len();
            let close = find_close(&source[body_start..])
                .map(|offset| body_start + offset)
                .ok_or_else(|| {
                    ExprError::syntax(
                        source,
                        (open, source.len() - open).into(),
                        "unterminated `${{`".to_string(),
                    )
                })?;
            segments.push(Segment::Expr(parser::parse(source, body_start, close)?));
            rest = close + CLOSE.len();
        }
        if rest < source.len() {
            segments.push(Segment::Literal(source[rest..].to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// A template without expressions.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        let source = text.into();
        let segments = if source.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Literal(source.clone())]
        };
        Self { source, segments }
    }

    /// Whether the template contains no expressions.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// Original template text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the template against a context.
    ///
    /// # Errors
    ///
    /// Returns an error when an embedded expression fails to evaluate.
    pub fn render(&self, ctx: &EvalContext<'_>) -> Result<String, ExprError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => out.push_str(&ctx.evaluate(expr)?.to_display_string()),
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Find the closing `}}` of an expression body, ignoring quoted strings.
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_string = !in_string,
            b'}' if !in_string && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// A step `if:` condition.
///
/// Conditions that do not call a status function behave as
/// `success() && (<condition>)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
    implicit_success: bool,
}

impl Condition {
    /// Parse a condition; an enclosing `${{ }}` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error when the expression is invalid.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let leading = source.len() - source.trim_start().len();
        let trimmed = source.trim();
        let (start, end) = match trimmed
            .strip_prefix(OPEN)
            .and_then(|inner| inner.strip_suffix(CLOSE))
        {
            Some(inner) if find_close(inner).is_none() => {
                let start = leading + OPEN.len();
                (start, start + inner.len())
            }
            _ => (leading, leading + trimmed.len()),
        };

        let expr = parser::parse(source, start, end)?;
        let implicit_success = !expr.uses_status_function();
        Ok(Self {
            source: source.to_string(),
            expr,
            implicit_success,
        })
    }

    /// Original condition text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the condition.
    ///
    /// # Errors
    ///
    /// Returns an error when evaluation fails.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<bool, ExprError> {
        if self.implicit_success && ctx.status() != JobStatus::Success {
            return Ok(false);
        }
        Ok(ctx.evaluate(&self.expr)?.is_truthy())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn contexts() -> Value {
        let mut root = Value::object();
        root.insert(
            "matrix",
            Value::string_object([("os", "ubuntu-latest"), ("python-version", "3.9")]),
        );
        root.insert("env", Value::string_object([("pythonLocation", "/opt/py")]));
        let mut cache = Value::object();
        cache.insert("outputs", Value::string_object([("cache-hit", "true")]));
        let mut steps = Value::object();
        steps.insert("cache", cache);
        root.insert("steps", steps);
        root
    }

    #[test]
    fn test_template_render() {
        let root = contexts();
        let ctx = EvalContext::new(&root, Path::new("."));
        let template = Template::parse("${{ matrix.os }}-pip-v0-x").unwrap();
        assert!(!template.is_literal());
        assert_eq!(template.render(&ctx).unwrap(), "ubuntu-latest-pip-v0-x");
    }

    #[test]
    fn test_template_literal() {
        let template = Template::parse("pip install flake8").unwrap();
        assert!(template.is_literal());
        assert_eq!(template.source(), "pip install flake8");
    }

    #[test]
    fn test_template_braces_inside_strings() {
        let root = contexts();
        let ctx = EvalContext::new(&root, Path::new("."));
        let template = Template::parse("${{ format('{0}}}', 'a') }}!").unwrap();
        assert_eq!(template.render(&ctx).unwrap(), "a}!");
    }

    #[test]
    fn test_template_unterminated() {
        let err = Template::parse("echo ${{ matrix.os").unwrap_err();
        assert!(matches!(err, ExprError::Syntax { .. }));
    }

    #[test]
    fn test_template_missing_env_renders_empty() {
        let root = contexts();
        let ctx = EvalContext::new(&root, Path::new("."));
        let template = Template::parse("${{ env.missing }}").unwrap();
        assert_eq!(template.render(&ctx).unwrap(), "");
    }

    #[test]
    fn test_condition_cache_hit() {
        let root = contexts();
        let ctx = EvalContext::new(&root, Path::new("."));
        let condition = Condition::parse("steps.cache.outputs.cache-hit != 'true'").unwrap();
        assert!(!condition.evaluate(&ctx).unwrap());

        let wrapped = Condition::parse("${{ steps.cache.outputs.cache-hit == 'true' }}").unwrap();
        assert!(wrapped.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_condition_implicit_success() {
        let root = contexts();
        let ctx = EvalContext::new(&root, Path::new(".")).with_status(JobStatus::Failure);
        assert!(!Condition::parse("true").unwrap().evaluate(&ctx).unwrap());
        assert!(Condition::parse("always()").unwrap().evaluate(&ctx).unwrap());
        assert!(Condition::parse("failure()").unwrap().evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_condition_error_has_span() {
        let err = Condition::parse("${{ nope() }}").unwrap_err();
        let ExprError::UnknownFunction { span, .. } = err else {
            panic!("expected unknown function");
        };
        assert_eq!(span.offset(), 4);
    }
}
