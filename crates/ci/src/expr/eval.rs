//! Expression evaluation.

use super::ExprError;
use super::parser::{BinaryOp, Expr};
use super::value::Value;
use crate::hashing;
use std::cmp::Ordering;
use std::path::Path;

/// Job status seen by the status functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    /// No fatal failure so far
    #[default]
    Success,
    /// A previous step failed
    Failure,
    /// The run was cancelled
    Cancelled,
}

/// Everything an expression can observe.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    contexts: &'a Value,
    status: JobStatus,
    workspace: &'a Path,
}

impl<'a> EvalContext<'a> {
    /// Create a context. `contexts` is an object keyed by context name.
    #[must_use]
    pub const fn new(contexts: &'a Value, workspace: &'a Path) -> Self {
        Self {
            contexts,
            status: JobStatus::Success,
            workspace,
        }
    }

    /// Set the job status.
    #[must_use]
    pub const fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    /// Current job status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Evaluate an expression tree.
    ///
    /// # Errors
    ///
    /// Returns an error when a function fails at runtime.
    pub fn evaluate(&self, expr: &Expr) -> Result<Value, ExprError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Context(name) => Ok(self.contexts.get(name)),
            Expr::Property(base, name) => Ok(self.evaluate(base)?.get(name)),
            Expr::Index(base, index) => {
                let base = self.evaluate(base)?;
                let index = self.evaluate(index)?;
                Ok(base.index(&index))
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.evaluate(inner)?.is_truthy())),
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs),
            Expr::Call(name, args) => self.call(name, args),
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value, ExprError> {
        let left = self.evaluate(lhs)?;
        match op {
            BinaryOp::And => {
                if left.is_truthy() {
                    self.evaluate(rhs)
                } else {
                    Ok(left)
                }
            }
            BinaryOp::Or => {
                if left.is_truthy() {
                    Ok(left)
                } else {
                    self.evaluate(rhs)
                }
            }
            BinaryOp::Eq => Ok(Value::Bool(left.loose_eq(&self.evaluate(rhs)?))),
            BinaryOp::Ne => Ok(Value::Bool(!left.loose_eq(&self.evaluate(rhs)?))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = left.loose_cmp(&self.evaluate(rhs)?);
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering == Some(Ordering::Less),
                    BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    BinaryOp::Gt => ordering == Some(Ordering::Greater),
                    _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                }))
            }
        }
    }

    fn call(&self, name: &str, args: &[Expr]) -> Result<Value, ExprError> {
        // Status functions take no arguments and must not evaluate anything.
        match name {
            "success" => return Ok(Value::Bool(self.status == JobStatus::Success)),
            "always" => return Ok(Value::Bool(true)),
            "failure" => return Ok(Value::Bool(self.status == JobStatus::Failure)),
            "cancelled" => return Ok(Value::Bool(self.status == JobStatus::Cancelled)),
            _ => {}
        }

        let values = args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let arg = |i: usize| values.get(i).cloned().unwrap_or_default();

        match name {
            "contains" => Ok(Value::Bool(contains(&arg(0), &arg(1)))),
            "startsWith" => Ok(Value::Bool(
                arg(0)
                    .to_display_string()
                    .to_lowercase()
                    .starts_with(&arg(1).to_display_string().to_lowercase()),
            )),
            "endsWith" => Ok(Value::Bool(
                arg(0)
                    .to_display_string()
                    .to_lowercase()
                    .ends_with(&arg(1).to_display_string().to_lowercase()),
            )),
            "format" => format_string(&arg(0).to_display_string(), values.get(1..).unwrap_or(&[]))
                .map(Value::String),
            "join" => {
                let separator = values
                    .get(1)
                    .map_or_else(|| ",".to_string(), Value::to_display_string);
                Ok(Value::String(match arg(0) {
                    Value::Array(items) => items
                        .iter()
                        .map(Value::to_display_string)
                        .collect::<Vec<_>>()
                        .join(&separator),
                    other => other.to_display_string(),
                }))
            }
            "toJSON" => serde_json::to_string_pretty(&arg(0).to_json())
                .map(Value::String)
                .map_err(|e| ExprError::eval(format!("toJSON: {e}"))),
            "fromJSON" => serde_json::from_str::<serde_json::Value>(&arg(0).to_display_string())
                .map(Value::from)
                .map_err(|e| ExprError::eval(format!("fromJSON: {e}"))),
            "hashFiles" => {
                let patterns: Vec<String> = values.iter().map(Value::to_display_string).collect();
                hashing::hash_files(self.workspace, &patterns)
                    .map(Value::String)
                    .map_err(|e| ExprError::eval(format!("hashFiles: {e}")))
            }
            other => Err(ExprError::eval(format!("unknown function `{other}`"))),
        }
    }
}

fn contains(search: &Value, item: &Value) -> bool {
    match search {
        Value::Array(items) => items.iter().any(|candidate| candidate.loose_eq(item)),
        _ => search
            .to_display_string()
            .to_lowercase()
            .contains(&item.to_display_string().to_lowercase()),
    }
}

/// `format('{0} {1}', a, b)`; `{{` and `}}` escape braces.
fn format_string(template: &str, args: &[Value]) -> Result<String, ExprError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d == '}' {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                if chars.next() != Some('}') {
                    return Err(ExprError::eval(format!(
                        "format: unclosed placeholder in '{template}'"
                    )));
                }
                let index: usize = digits.trim().parse().map_err(|_| {
                    ExprError::eval(format!("format: invalid placeholder '{{{digits}}}'"))
                })?;
                let value = args.get(index).ok_or_else(|| {
                    ExprError::eval(format!(
                        "format: placeholder {{{index}}} has no argument"
                    ))
                })?;
                out.push_str(&value.to_display_string());
            }
            '}' => {
                return Err(ExprError::eval(format!(
                    "format: unmatched '}}' in '{template}'"
                )));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use tempfile::TempDir;

    fn eval_in(workspace: &Path, src: &str) -> Value {
        let mut root = Value::object();
        root.insert("github", Value::string_object([("ref", "refs/heads/main")]));
        root.insert(
            "matrix",
            Value::string_object([("os", "ubuntu-latest"), ("python-version", "3.9")]),
        );
        let expr = parse(src, 0, src.len()).unwrap();
        EvalContext::new(&root, workspace).evaluate(&expr).unwrap()
    }

    fn eval(src: &str) -> Value {
        eval_in(Path::new("."), src)
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("matrix.python-version == '3.9'"), Value::Bool(true));
        assert_eq!(eval("matrix.python-version == 3.9"), Value::Bool(true));
        assert_eq!(eval("matrix.python-version < 3.11"), Value::Bool(true));
        // numeric coercion: 3.10 is 3.1
        assert_eq!(eval("matrix.python-version < 3.10"), Value::Bool(false));
        assert_eq!(eval("'a' < 'B'"), Value::Bool(true));
        assert_eq!(eval("matrix.os != 'UBUNTU-LATEST'"), Value::Bool(false));
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(eval("matrix.missing || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("matrix.os && 'yes'"), Value::from("yes"));
        assert_eq!(eval("'' && 'yes'"), Value::from(""));
        assert_eq!(eval("!matrix.missing"), Value::Bool(true));
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(eval("startsWith(github.ref, 'refs/heads/')"), Value::Bool(true));
        assert_eq!(eval("endsWith(github.ref, 'MAIN')"), Value::Bool(true));
        assert_eq!(eval("contains(matrix.os, 'ubuntu')"), Value::Bool(true));
        assert_eq!(
            eval("contains(fromJSON('[\"3.8\", \"3.9\"]'), matrix.python-version)"),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_format_and_join() {
        assert_eq!(
            eval("format('{0}-pip-{1}', matrix.os, 'v0')"),
            Value::from("ubuntu-latest-pip-v0")
        );
        assert_eq!(eval("format('{{0}}')"), Value::from("{0}"));
        assert_eq!(
            eval("join(fromJSON('[1, 2, 3]'), '+')"),
            Value::from("1+2+3")
        );
    }

    #[test]
    fn test_format_missing_argument_fails() {
        let root = Value::object();
        let expr = parse("format('{1}', 'a')", 0, 18).unwrap();
        let err = EvalContext::new(&root, Path::new("."))
            .evaluate(&expr)
            .unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(eval("toJSON('x')"), Value::from("\"x\""));
    }

    #[test]
    fn test_hash_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "numpy\n").unwrap();
        let hash = eval_in(dir.path(), "hashFiles('requirements.txt')");
        assert_eq!(hash.to_display_string().len(), 64);
        assert_eq!(
            eval_in(dir.path(), "hashFiles('missing.txt')"),
            Value::from("")
        );
    }

    #[test]
    fn test_status_functions() {
        let root = Value::object();
        let expr = parse("cancelled()", 0, 11).unwrap();
        let ctx = EvalContext::new(&root, Path::new(".")).with_status(JobStatus::Cancelled);
        assert_eq!(ctx.evaluate(&expr).unwrap(), Value::Bool(true));
    }
}
