//! Boolean conditions shared by map `when` clauses and rule `if` clauses.
//!
//! Both surfaces parse into closed ASTs up front (literal patterns are
//! compiled at load time) and evaluate through the same leaf operations, so `in` or
//! `regex` mean the same thing wherever they appear.

use crate::error::{IssueSink, RemapError};
use crate::value::{as_number, text_form, type_name, values_equal};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const MAP_OPERATORS: [&str; 3] = ["in", "regex", "not"];

/// Failure while evaluating a rule expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("variable `{0}` is not bound")]
    UnboundVariable(String),

    #[error("`{operator}` needs numeric operands ({detail})")]
    TypeMismatch { operator: String, detail: String },

    #[error("invalid pattern `{pattern}`: {detail}")]
    InvalidPattern { pattern: String, detail: String },
}

impl EvalError {
    pub fn into_remap(self, rule: &str) -> RemapError {
        match self {
            EvalError::UnboundVariable(variable) => RemapError::UnboundVariable {
                rule: rule.to_string(),
                variable,
            },
            EvalError::TypeMismatch { operator, detail } => RemapError::TypeMismatch {
                rule: rule.to_string(),
                operator,
                detail,
            },
            EvalError::InvalidPattern { pattern, detail } => RemapError::TypeMismatch {
                rule: rule.to_string(),
                operator: "regex".to_string(),
                detail: format!("invalid pattern `{pattern}`: {detail}"),
            },
        }
    }
}

// Leaf operations.

/// Membership. A sequence on the left matches when any of its items is a
/// member; a string on the right is searched as a substring.
pub fn member(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(items), Value::Array(_)) => items.iter().any(|item| member(item, right)),
        (_, Value::Array(candidates)) => candidates.iter().any(|item| values_equal(left, item)),
        (Value::String(needle), Value::String(haystack)) => haystack.contains(needle.as_str()),
        _ => false,
    }
}

/// Pattern search anywhere in the value's text form.
pub fn search(value: &Value, pattern: &Regex) -> bool {
    pattern.is_match(&text_form(value))
}

pub fn starts_with(value: &Value, prefix: &Value) -> bool {
    text_form(value).starts_with(&text_form(prefix))
}

pub fn contains(value: &Value, needle: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        other => text_form(other).contains(&text_form(needle)),
    }
}

/// A map-file condition on one output field.
#[derive(Debug, Clone)]
pub enum Condition {
    Equals(Value),
    In(Vec<Value>),
    Regex(Regex),
    Not(Box<Condition>),
    /// Several operators in one mapping; all must hold.
    All(Vec<Condition>),
}

impl Condition {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Condition::Equals(expected) => values_equal(value, expected),
            Condition::In(candidates) => member(value, &Value::Array(candidates.clone())),
            Condition::Regex(pattern) => search(value, pattern),
            Condition::Not(inner) => !inner.matches(value),
            Condition::All(parts) => parts.iter().all(|part| part.matches(value)),
        }
    }

    pub(crate) fn parse(value: &Value, path: &str, issues: &mut IssueSink) -> Option<Condition> {
        let Value::Object(object) = value else {
            return Some(Condition::Equals(value.clone()));
        };
        if !object.keys().any(|key| MAP_OPERATORS.contains(&key.as_str())) {
            return Some(Condition::Equals(value.clone()));
        }
        let mut parts = Vec::with_capacity(object.len());
        for (op, operand) in object {
            let op_path = format!("{path}.{op}");
            let part = match op.as_str() {
                "in" => Some(Condition::In(match operand {
                    Value::Array(items) => items.clone(),
                    single => vec![single.clone()],
                })),
                "regex" => compile_pattern(operand, &op_path, issues).map(Condition::Regex),
                "not" => Condition::parse(operand, &op_path, issues)
                    .map(|inner| Condition::Not(Box::new(inner))),
                unknown => {
                    issues.push(op_path, format!("unknown condition operator `{unknown}`"));
                    None
                }
            };
            parts.push(part?);
        }
        if parts.len() == 1 {
            parts.pop()
        } else {
            Some(Condition::All(parts))
        }
    }
}

fn compile_pattern(value: &Value, path: &str, issues: &mut IssueSink) -> Option<Regex> {
    let Some(pattern) = value.as_str() else {
        issues.push(path, "pattern must be a string");
        return None;
    };
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(error) => {
            issues.push(path, format!("invalid pattern: {error}"));
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    In,
    StartsWith,
    Contains,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "in" => CompareOp::In,
            "startswith" => CompareOp::StartsWith,
            "contains" => CompareOp::Contains,
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::In => "in",
            CompareOp::StartsWith => "startswith",
            CompareOp::Contains => "contains",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        }
    }
}

/// A rule operand: `$name` reads a bound variable, anything else is literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(String),
    Literal(Value),
}

impl Operand {
    fn parse(value: &Value) -> Self {
        match value.as_str().and_then(|text| text.strip_prefix('$')) {
            Some(name) => Operand::Var(name.to_string()),
            None => Operand::Literal(value.clone()),
        }
    }

    fn collect_into<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        if let Operand::Var(name) = self {
            out.insert(name.as_str());
        }
    }

    fn resolve<'a>(&'a self, bindings: &'a Map<String, Value>) -> Result<&'a Value, EvalError> {
        match self {
            Operand::Var(name) => bindings
                .get(name)
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Operand::Literal(value) => Ok(value),
        }
    }
}

/// Right-hand side of a rule `regex`: compiled once, or read from a binding.
#[derive(Debug, Clone)]
pub enum Pattern {
    Compiled(Regex),
    Var(String),
}

/// A rule's `if` expression.
#[derive(Debug, Clone)]
pub enum RuleExpr {
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    Regex {
        left: Operand,
        pattern: Pattern,
    },
    Any(Vec<RuleExpr>),
    All(Vec<RuleExpr>),
    Not(Box<RuleExpr>),
}

impl RuleExpr {
    pub(crate) fn parse(value: &Value, path: &str, issues: &mut IssueSink) -> Option<RuleExpr> {
        let Some(object) = value.as_object() else {
            issues.push(path, "expression must be a mapping");
            return None;
        };
        if object.len() != 1 {
            issues.push(path, "expression must contain exactly one operator");
            return None;
        }
        let (op, args) = object.iter().next()?;
        let op_path = format!("{path}.{op}");
        match op.as_str() {
            "any" | "all" => {
                let Some(items) = args.as_array() else {
                    issues.push(op_path, format!("`{op}` takes a list of expressions"));
                    return None;
                };
                let mut parts = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    parts.push(RuleExpr::parse(item, &format!("{op_path}[{index}]"), issues));
                }
                let parts: Option<Vec<RuleExpr>> = parts.into_iter().collect();
                if op == "any" {
                    parts.map(RuleExpr::Any)
                } else {
                    parts.map(RuleExpr::All)
                }
            }
            "not" => RuleExpr::parse(args, &op_path, issues).map(|inner| RuleExpr::Not(Box::new(inner))),
            name => {
                let pair = match args.as_array().map(Vec::as_slice) {
                    Some([left, right]) => Some((left, right)),
                    _ => None,
                };
                let Some((left, right)) = pair else {
                    issues.push(op_path, format!("`{name}` takes exactly two operands"));
                    return None;
                };
                if name == "regex" {
                    let pattern = match Operand::parse(right) {
                        Operand::Var(variable) => Pattern::Var(variable),
                        Operand::Literal(_) => Pattern::Compiled(compile_pattern(
                            right,
                            &format!("{op_path}[1]"),
                            issues,
                        )?),
                    };
                    return Some(RuleExpr::Regex {
                        left: Operand::parse(left),
                        pattern,
                    });
                }
                let Some(compare) = CompareOp::parse(name) else {
                    issues.push(op_path, format!("unknown operator `{name}`"));
                    return None;
                };
                Some(RuleExpr::Compare {
                    op: compare,
                    left: Operand::parse(left),
                    right: Operand::parse(right),
                })
            }
        }
    }

    /// Names of every variable the expression reads.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            RuleExpr::Compare { left, right, .. } => {
                left.collect_into(out);
                right.collect_into(out);
            }
            RuleExpr::Regex { left, pattern } => {
                left.collect_into(out);
                if let Pattern::Var(name) = pattern {
                    out.insert(name.as_str());
                }
            }
            RuleExpr::Any(parts) | RuleExpr::All(parts) => {
                for part in parts {
                    part.collect_variables(out);
                }
            }
            RuleExpr::Not(inner) => inner.collect_variables(out),
        }
    }

    /// Evaluate against bound variables. Pure; `any`/`all` short-circuit.
    pub fn evaluate(&self, bindings: &Map<String, Value>) -> Result<bool, EvalError> {
        match self {
            RuleExpr::Any(parts) => {
                for part in parts {
                    if part.evaluate(bindings)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RuleExpr::All(parts) => {
                for part in parts {
                    if !part.evaluate(bindings)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RuleExpr::Not(inner) => Ok(!inner.evaluate(bindings)?),
            RuleExpr::Regex { left, pattern } => {
                let left = left.resolve(bindings)?;
                match pattern {
                    Pattern::Compiled(regex) => Ok(!left.is_null() && search(left, regex)),
                    Pattern::Var(name) => {
                        let raw = bindings
                            .get(name)
                            .ok_or_else(|| EvalError::UnboundVariable(name.clone()))?;
                        if left.is_null() || raw.is_null() {
                            return Ok(false);
                        }
                        let text = text_form(raw);
                        let regex = Regex::new(&text).map_err(|error| EvalError::InvalidPattern {
                            pattern: text.clone(),
                            detail: error.to_string(),
                        })?;
                        Ok(search(left, &regex))
                    }
                }
            }
            RuleExpr::Compare { op, left, right } => {
                let left = left.resolve(bindings)?;
                let right = right.resolve(bindings)?;
                compare(*op, left, right)
            }
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    let ordered = |test: fn(f64, f64) -> bool| -> Result<bool, EvalError> {
        if left.is_null() || right.is_null() {
            return Ok(false);
        }
        match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => Ok(test(a, b)),
            _ => Err(EvalError::TypeMismatch {
                operator: op.as_str().to_string(),
                detail: format!("got {} and {}", type_name(left), type_name(right)),
            }),
        }
    };
    let present = !left.is_null() && !right.is_null();
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::In => Ok(present && member(left, right)),
        CompareOp::StartsWith => Ok(present && starts_with(left, right)),
        CompareOp::Contains => Ok(present && contains(left, right)),
        CompareOp::Gt => ordered(|a, b| a > b),
        CompareOp::Ge => ordered(|a, b| a >= b),
        CompareOp::Lt => ordered(|a, b| a < b),
        CompareOp::Le => ordered(|a, b| a <= b),
    }
}
