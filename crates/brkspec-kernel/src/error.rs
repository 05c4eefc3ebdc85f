//! Error types for brkspec kernel operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while loading documents, resolving fields, or evaluating rules.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemapError {
    /// A document does not have the required shape.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A document could not be read.
    #[error("I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// A document is not valid YAML/JSON.
    #[error("parse error at {document}:{line}:{column}: {message}")]
    Parse {
        document: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// A required input resolved to nothing and carried no default.
    #[error("field `{field}`: required input `{input}` is missing")]
    MissingRequiredInput { field: String, input: String },

    /// A `ref` input points at an output path that has not been resolved yet.
    #[error("field `{field}`: reference `{reference}` is not resolved")]
    UnresolvedReference { field: String, reference: String },

    /// A rule condition names a variable that its `when` block does not bind.
    #[error("rule `{rule}`: variable `{variable}` is not bound")]
    UnboundVariable { rule: String, variable: String },

    /// A numeric comparison received a non-numeric operand.
    #[error("rule `{rule}`: `{operator}` needs numeric operands ({detail})")]
    TypeMismatch {
        rule: String,
        operator: String,
        detail: String,
    },

    /// A transform was unknown, rejected its arguments, or failed.
    #[error("transform `{transform}` failed for `{field}`: {message}")]
    TransformFailure {
        transform: String,
        field: String,
        message: String,
    },

    /// A `transforms_source` entry matched no catalog library or alias document.
    #[error("{document}: unknown transforms_source `{source_ref}`")]
    UnknownTransformSource { document: String, source_ref: String },

    /// Strict include mode found the same key in two documents.
    #[error("{document}: include conflict for key `{key}`")]
    IncludeConflict { document: String, key: String },

    /// A document includes itself, directly or transitively.
    #[error("circular include: {}", chain.join(" -> "))]
    CircularInclude { chain: Vec<String> },

    /// Several specs match a name reference.
    #[error("ambiguous spec reference `{reference}` ({category}): {}", candidates.join(", "))]
    AmbiguousReference {
        reference: String,
        category: String,
        candidates: Vec<String>,
    },

    /// No spec matches a name reference.
    #[error("spec `{reference}` not found ({category})")]
    SpecNotFound { reference: String, category: String },

    /// A study-scoped resolution read a non-subject source, or none at all.
    #[error("{document}: study resolution {message}")]
    StudyScope { document: String, message: String },

    /// Some fields failed; the caller asked for a complete result.
    #[error("{document}: resolution incomplete, failed fields: {}", fields.join(", "))]
    IncompleteResolution {
        document: String,
        fields: Vec<String>,
    },
}

/// One structural problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
}

/// Every structural problem found in one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaError {
    pub document: String,
    pub issues: Vec<SchemaIssue>,
}

impl SchemaError {
    pub fn single(document: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            issues: vec![SchemaIssue {
                path: path.into(),
                message: message.into(),
            }],
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid document {}:", self.document)?;
        for issue in &self.issues {
            write!(f, "\n  {}: {}", issue.path, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {}

/// Accumulates schema issues for one document, then converts to a result.
#[derive(Debug, Default)]
pub(crate) struct IssueSink {
    issues: Vec<SchemaIssue>,
}

impl IssueSink {
    pub(crate) fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(SchemaIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub(crate) fn finish(self, document: &str) -> Result<(), SchemaError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(SchemaError {
                document: document.to_string(),
                issues: self.issues,
            })
        }
    }
}
