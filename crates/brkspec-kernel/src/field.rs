//! Field rules: how one output field is produced.

use crate::error::{IssueSink, RemapError};
use crate::input::{InputSpec, parse_input, resolve_input};
use crate::path::OutputTree;
use crate::source::{SourceSelector, parse_sources, resolve_sources};
use crate::store::StoreContext;
use crate::transform::{TransformChain, TransformRegistry};
use serde_json::{Map, Value};

pub(crate) const FIELD_KEYS: [&str; 3] = ["sources", "inputs", "transform"];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOrigin {
    Sources(Vec<SourceSelector>),
    /// Named inputs in declaration order.
    Inputs(Vec<(String, InputSpec)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub origin: FieldOrigin,
    pub transform: Option<TransformChain>,
}

impl FieldRule {
    /// Every selector this rule may read, including those inside inputs.
    pub fn selectors(&self) -> Vec<&SourceSelector> {
        match &self.origin {
            FieldOrigin::Sources(selectors) => selectors.iter().collect(),
            FieldOrigin::Inputs(inputs) => inputs
                .iter()
                .flat_map(|(_, input)| input.sources().iter())
                .collect(),
        }
    }
}

/// Resolve one field against the tree built so far.
///
/// `Ok(None)` means a sources-based field found nothing; it is omitted.
pub fn resolve_field(
    rule: &FieldRule,
    field: &str,
    ctx: &StoreContext<'_>,
    tree: &OutputTree,
    registry: &TransformRegistry,
) -> Result<Option<Value>, RemapError> {
    match &rule.origin {
        FieldOrigin::Sources(selectors) => {
            let Some(value) = resolve_sources(selectors, ctx) else {
                return Ok(None);
            };
            match &rule.transform {
                Some(chain) => registry.apply_positional(chain, value, field).map(Some),
                None => Ok(Some(value)),
            }
        }
        FieldOrigin::Inputs(inputs) => {
            let mut resolved = Map::new();
            for (name, input) in inputs {
                if let Some(value) = resolve_input(input, name, field, ctx, tree, registry)? {
                    resolved.insert(name.clone(), value);
                }
            }
            match &rule.transform {
                Some(chain) => registry.apply_named(chain, resolved, field).map(Some),
                None => Ok(Some(Value::Object(resolved))),
            }
        }
    }
}

pub(crate) fn parse_field(value: &Value, path: &str, issues: &mut IssueSink) -> Option<FieldRule> {
    let Some(object) = value.as_object() else {
        issues.push(path, "field rule must be a mapping");
        return None;
    };
    let extra: Vec<&String> = object
        .keys()
        .filter(|key| !FIELD_KEYS.contains(&key.as_str()))
        .collect();
    if !extra.is_empty() {
        issues.push(path, format!("unexpected keys {extra:?}"));
    }

    let origin = match (object.get("sources"), object.get("inputs")) {
        (Some(sources), None) => parse_sources(sources, path, issues).map(FieldOrigin::Sources),
        (None, Some(inputs)) => parse_inputs(inputs, path, issues).map(FieldOrigin::Inputs),
        (Some(_), Some(_)) => {
            issues.push(path, "sources and inputs are mutually exclusive");
            None
        }
        (None, None) => {
            issues.push(path, "requires sources or inputs");
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
    Some(FieldRule {
        origin: origin?,
        transform,
    })
}

fn parse_inputs(
    value: &Value,
    path: &str,
    issues: &mut IssueSink,
) -> Option<Vec<(String, InputSpec)>> {
    let Some(object) = value.as_object() else {
        issues.push(format!("{path}.inputs"), "inputs must be a mapping");
        return None;
    };
    if object.is_empty() {
        issues.push(format!("{path}.inputs"), "inputs must not be empty");
        return None;
    }
    let mut inputs = Vec::with_capacity(object.len());
    for (name, raw) in object {
        if let Some(input) = parse_input(raw, &format!("{path}.inputs.{name}"), issues) {
            inputs.push((name.clone(), input));
        }
    }
    Some(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ParamFile};
    use crate::transform::builtin_library;
    use serde_json::json;

    fn parse(value: Value) -> FieldRule {
        let mut issues = IssueSink::default();
        let rule = parse_field(&value, "out.f", &mut issues);
        issues.finish("spec.yaml").expect("valid field rule");
        rule.expect("valid field rule")
    }

    #[test]
    fn inputs_without_transform_yield_the_mapping() {
        let rule = parse(json!({
            "inputs": {
                "a": {"const": 1},
                "b": {"sources": [{"file": "method", "key": "Missing"}]},
                "c": {"const": "x"}
            }
        }));
        let store = MemoryStore::new();
        let out = resolve_field(
            &rule,
            "out.f",
            &StoreContext::new(&store),
            &OutputTree::new(),
            &TransformRegistry::new(),
        )
        .unwrap();
        assert_eq!(out, Some(json!({"a": 1, "c": "x"})));
    }

    #[test]
    fn sources_field_absent_skips_transform() {
        let rule = parse(json!({
            "sources": [{"file": "method", "key": "Missing"}],
            "transform": "no_such_transform"
        }));
        let store = MemoryStore::new();
        let out = resolve_field(
            &rule,
            "out.f",
            &StoreContext::new(&store),
            &OutputTree::new(),
            &TransformRegistry::new(),
        )
        .unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn sources_field_applies_positional_chain() {
        let rule = parse(json!({
            "sources": [{"file": "acqp", "key": "ACQ_scan_name"}],
            "transform": ["strip", "lower"]
        }));
        let mut store = MemoryStore::new();
        store.set(ParamFile::Acqp, "ACQ_scan_name", json!("  T2_TurboRARE "));
        let out = resolve_field(
            &rule,
            "out.f",
            &StoreContext::new(&store),
            &OutputTree::new(),
            &builtin_library(),
        )
        .unwrap();
        assert_eq!(out, Some(json!("t2_turborare")));
    }

    #[test]
    fn sources_and_inputs_together_is_a_schema_issue() {
        let mut issues = IssueSink::default();
        let rule = parse_field(
            &json!({"sources": [{"file": "method", "key": "A"}], "inputs": {"a": {"const": 1}}}),
            "out.f",
            &mut issues,
        );
        assert!(rule.is_none());
        let err = issues.finish("spec.yaml").unwrap_err();
        assert_eq!(err.issues[0].message, "sources and inputs are mutually exclusive");
    }
}
