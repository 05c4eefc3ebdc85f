//! Named inputs: one value from sources, a constant, or an earlier output.

use crate::error::{IssueSink, RemapError};
use crate::path::{DottedPath, OutputTree};
use crate::source::{SourceSelector, parse_sources, resolve_sources};
use crate::store::StoreContext;
use crate::transform::{TransformChain, TransformRegistry};
use serde_json::Value;

pub(crate) const INPUT_KEYS: [&str; 6] = ["sources", "const", "ref", "transform", "default", "required"];

#[derive(Debug, Clone, PartialEq)]
pub enum InputOrigin {
    Sources(Vec<SourceSelector>),
    Const(Value),
    /// Dotted path of an output resolved earlier in the same run.
    Ref(DottedPath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub origin: InputOrigin,
    pub transform: Option<TransformChain>,
    pub default: Option<Value>,
    pub required: bool,
}

impl InputSpec {
    pub fn new(origin: InputOrigin) -> Self {
        Self {
            origin,
            transform: None,
            default: None,
            required: false,
        }
    }

    pub fn sources(&self) -> &[SourceSelector] {
        match &self.origin {
            InputOrigin::Sources(selectors) => selectors,
            _ => &[],
        }
    }
}

/// Resolve one input for `field`.
///
/// `Ok(None)` means the input is absent and optional; it is left out of the
/// transform call entirely.
pub fn resolve_input(
    spec: &InputSpec,
    name: &str,
    field: &str,
    ctx: &StoreContext<'_>,
    tree: &OutputTree,
    registry: &TransformRegistry,
) -> Result<Option<Value>, RemapError> {
    let raw = match &spec.origin {
        InputOrigin::Const(value) => Some(value.clone()),
        InputOrigin::Ref(path) => Some(tree.get(path).cloned().ok_or_else(|| {
            RemapError::UnresolvedReference {
                field: field.to_string(),
                reference: path.to_string(),
            }
        })?),
        InputOrigin::Sources(selectors) => resolve_sources(selectors, ctx),
    };
    let value = match (raw, &spec.default) {
        (Some(value), _) => value,
        (None, Some(default)) => default.clone(),
        (None, None) if spec.required => {
            return Err(RemapError::MissingRequiredInput {
                field: field.to_string(),
                input: name.to_string(),
            });
        }
        (None, None) => return Ok(None),
    };
    match &spec.transform {
        Some(chain) => registry.apply_positional(chain, value, field).map(Some),
        None => Ok(Some(value)),
    }
}

pub(crate) fn parse_input(value: &Value, path: &str, issues: &mut IssueSink) -> Option<InputSpec> {
    let Some(object) = value.as_object() else {
        issues.push(path, "input must be a mapping");
        return None;
    };
    let extra: Vec<&String> = object
        .keys()
        .filter(|key| !INPUT_KEYS.contains(&key.as_str()))
        .collect();
    if !extra.is_empty() {
        issues.push(path, format!("unexpected keys {extra:?}"));
    }

    let declared: Vec<&str> = ["sources", "const", "ref"]
        .into_iter()
        .filter(|key| object.contains_key(*key))
        .collect();
    let origin = match declared.as_slice() {
        ["sources"] => parse_sources(&object["sources"], path, issues).map(InputOrigin::Sources),
        ["const"] => Some(InputOrigin::Const(object["const"].clone())),
        ["ref"] => match object["ref"].as_str().map(DottedPath::parse) {
            Some(Ok(target)) => Some(InputOrigin::Ref(target)),
            Some(Err(message)) => {
                issues.push(format!("{path}.ref"), message);
                None
            }
            None => {
                issues.push(format!("{path}.ref"), "ref must be a string");
                None
            }
        },
        [] => {
            issues.push(path, "requires one of sources, const, or ref");
            None
        }
        _ => {
            issues.push(path, format!("sources, const, and ref are exclusive; found {declared:?}"));
            None
        }
    };

    let transform = match object.get("transform") {
        Some(raw) => match TransformChain::from_value(raw) {
            Ok(chain) => Some(chain),
            Err(message) => {
                issues.push(format!("{path}.transform"), message);
                None
            }
        },
        None => None,
    };
    let required = match object.get("required") {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            issues.push(format!("{path}.required"), "required must be a boolean");
            false
        }
    };

    Some(InputSpec {
        origin: origin?,
        transform,
        default: object.get("default").cloned(),
        required,
    })
}
