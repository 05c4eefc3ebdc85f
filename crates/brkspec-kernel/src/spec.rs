//! Spec documents: `__meta__` plus field rules.
//!
//! Two layouts are accepted. The flat layout puts every field rule at the top
//! level next to `__meta__`:
//!
//! ```yaml
//! __meta__:
//!   name: rare_info
//!   version: "1.0"
//!   description: RARE scan summary
//!   category: info_spec
//! out.echo_time:
//!   sources:
//!     - file: method
//!       key: PVM_EchoTime
//! ```
//!
//! The nested layout puts them under a `fields` mapping instead.

use crate::error::{IssueSink, SchemaError};
use crate::field::{FieldRule, parse_field};
use crate::path::DottedPath;
use crate::value::text_form;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub const META_KEY: &str = "__meta__";
pub const FIELDS_KEY: &str = "fields";

fn spec_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9]*(?:_[a-z0-9]+){0,3}$").expect("spec name regex must compile")
    })
}

pub fn is_valid_spec_name(name: &str) -> bool {
    spec_name_re().is_match(name)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeMode {
    /// The including document wins on key conflicts.
    #[default]
    Override,
    /// Any key defined twice is an error.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecMeta {
    pub name: String,
    pub version: String,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transforms_source: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    pub include_mode: IncludeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

/// A parsed spec with includes already merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct Spec {
    pub document: String,
    pub meta: SpecMeta,
    /// Field rules in declaration order.
    pub fields: Vec<(DottedPath, FieldRule)>,
}

impl Spec {
    /// Parse a document that carries no unresolved includes.
    pub fn from_document(document: &Value, origin: &str) -> Result<Self, SchemaError> {
        let mut issues = IssueSink::default();
        let Some(root) = document.as_object() else {
            return Err(SchemaError::single(origin, "spec", "spec must be a mapping"));
        };
        let meta = match root.get(META_KEY) {
            Some(raw) => parse_meta(raw, &mut issues),
            None => {
                issues.push(META_KEY, "__meta__ is required");
                None
            }
        };
        let fields = parse_fields(&field_entries(root, origin, &mut issues), &mut issues);
        issues.finish(origin)?;
        match meta {
            Some(meta) => Ok(Spec {
                document: origin.to_string(),
                meta,
                fields,
            }),
            None => Err(SchemaError::single(origin, META_KEY, "invalid __meta__")),
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(path, _)| path.as_str() == key)
            .map(|(_, rule)| rule)
    }
}

/// Structural validation of one spec document, independent of resolution.
pub fn validate_spec(document: &Value) -> Result<(), SchemaError> {
    Spec::from_document(document, "spec").map(|_| ())
}

/// Field rule entries of a spec document, in declaration order, whichever
/// layout it uses.
pub(crate) fn field_entries<'a>(
    root: &'a Map<String, Value>,
    origin: &str,
    issues: &mut IssueSink,
) -> Vec<(&'a String, &'a Value)> {
    if let Some(Value::Object(nested)) = root.get(FIELDS_KEY) {
        if !nested.contains_key("sources") && !nested.contains_key("inputs") {
            let stray: Vec<&String> = root
                .keys()
                .filter(|key| key.as_str() != META_KEY && key.as_str() != FIELDS_KEY)
                .collect();
            if !stray.is_empty() {
                issues.push(
                    FIELDS_KEY,
                    format!("{origin}: top-level keys {stray:?} next to `fields`"),
                );
            }
            return nested.iter().collect();
        }
    }
    root.iter()
        .filter(|(key, _)| key.as_str() != META_KEY)
        .collect()
}

pub(crate) fn parse_fields(
    entries: &[(&String, &Value)],
    issues: &mut IssueSink,
) -> Vec<(DottedPath, FieldRule)> {
    let mut fields = Vec::with_capacity(entries.len());
    for (key, raw) in entries {
        let path = match DottedPath::parse(key) {
            Ok(path) => path,
            Err(message) => {
                issues.push(key.as_str(), message);
                continue;
            }
        };
        if let Some(rule) = parse_field(raw, key, issues) {
            fields.push((path, rule));
        }
    }
    fields
}

pub(crate) fn parse_meta(value: &Value, issues: &mut IssueSink) -> Option<SpecMeta> {
    let Some(object) = value.as_object() else {
        issues.push(META_KEY, "__meta__ must be a mapping");
        return None;
    };

    let name = required_text(object, "name", issues);
    if let Some(name) = &name {
        if !is_valid_spec_name(name) {
            issues.push(
                format!("{META_KEY}.name"),
                format!("`{name}` must be a lowercase token of at most four `_`-joined segments"),
            );
        }
    }
    let version = match object.get("version") {
        Some(value @ (Value::String(_) | Value::Number(_))) => Some(text_form(value)),
        _ => {
            issues.push(format!("{META_KEY}.version"), "version is required (string or number)");
            None
        }
    };
    let description = required_text(object, "description", issues);
    let category = required_text(object, "category", issues);
    let transforms_source = string_or_list(object, "transforms_source", issues);
    let include = string_or_list(object, "include", issues);
    let include_mode = match object.get("include_mode").map(|value| value.as_str()) {
        None | Some(Some("override")) => IncludeMode::Override,
        Some(Some("strict")) => IncludeMode::Strict,
        Some(_) => {
            issues.push(
                format!("{META_KEY}.include_mode"),
                "include_mode must be `override` or `strict`",
            );
            IncludeMode::Override
        }
    };
    let map_file = optional_text(object, "map_file", issues);
    let doi = optional_text(object, "doi", issues);
    let citation = optional_text(object, "citation", issues);

    Some(SpecMeta {
        name: name?,
        version: version?,
        description: description?,
        category: category?,
        transforms_source,
        include,
        include_mode,
        map_file,
        authors: object.get("authors").cloned(),
        doi,
        citation,
    })
}

fn required_text(object: &Map<String, Value>, key: &str, issues: &mut IssueSink) -> Option<String> {
    match object.get(key).and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Some(text.to_string()),
        _ => {
            issues.push(format!("{META_KEY}.{key}"), format!("{key} is required and must be a non-empty string"));
            None
        }
    }
}

fn optional_text(object: &Map<String, Value>, key: &str, issues: &mut IssueSink) -> Option<String> {
    match object.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            issues.push(format!("{META_KEY}.{key}"), format!("{key} must be a string"));
            None
        }
    }
}

/// `key: a` or `key: [a, b]`.
pub(crate) fn string_or_list(
    object: &Map<String, Value>,
    key: &str,
    issues: &mut IssueSink,
) -> Vec<String> {
    match object.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(text)) => vec![text.clone()],
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(_) => {
            issues.push(
                format!("{META_KEY}.{key}"),
                format!("{key} must be a string or list of strings"),
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldOrigin;
    use serde_json::json;

    fn meta() -> Value {
        json!({
            "name": "rare_info",
            "version": 1.0,
            "description": "RARE summary",
            "category": "info_spec"
        })
    }

    #[test]
    fn spec_names_follow_token_rule() {
        for name in ["a", "rare", "rare_info", "a1_b2_c3_d4", "x_1"] {
            assert!(is_valid_spec_name(name), "{name} should be valid");
        }
        for name in ["", "Rare", "1abc", "a_b_c_d_e", "a__b", "a-b", "a_"] {
            assert!(!is_valid_spec_name(name), "{name} should be invalid");
        }
    }

    #[test]
    fn flat_and_nested_layouts_parse_to_same_fields() {
        let rule = json!({"sources": [{"file": "method", "key": "PVM_EchoTime"}]});
        let flat = json!({"__meta__": meta(), "out.te": rule.clone()});
        let nested = json!({"__meta__": meta(), "fields": {"out.te": rule}});

        let flat = Spec::from_document(&flat, "flat.yaml").unwrap();
        let nested = Spec::from_document(&nested, "nested.yaml").unwrap();
        assert_eq!(flat.fields, nested.fields);
        assert_eq!(flat.meta.version, "1.0");
        assert!(matches!(
            flat.field("out.te").map(|rule| &rule.origin),
            Some(FieldOrigin::Sources(_))
        ));
    }

    #[test]
    fn missing_meta_fields_are_all_reported() {
        let err = validate_spec(&json!({"__meta__": {"name": "Bad-Name"}})).unwrap_err();
        let paths: Vec<&str> = err.issues.iter().map(|issue| issue.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "__meta__.name",
                "__meta__.version",
                "__meta__.description",
                "__meta__.category"
            ]
        );
    }

    #[test]
    fn meta_is_mandatory() {
        let err = validate_spec(&json!({"out.x": {"sources": [{"file": "method", "key": "A"}]}}))
            .unwrap_err();
        assert_eq!(err.issues[0].path, "__meta__");
    }

    #[test]
    fn include_mode_and_lists_parse() {
        let mut raw = meta();
        raw["include"] = json!("base.yaml");
        raw["include_mode"] = json!("strict");
        raw["transforms_source"] = json!(["a.py", "b.py"]);
        let spec = Spec::from_document(&json!({"__meta__": raw}), "s.yaml").unwrap();
        assert_eq!(spec.meta.include, ["base.yaml"]);
        assert_eq!(spec.meta.include_mode, IncludeMode::Strict);
        assert_eq!(spec.meta.transforms_source, ["a.py", "b.py"]);
    }
}
