//! Map files: post-resolution overrides keyed by output path.

use crate::condition::Condition;
use crate::error::{IssueSink, SchemaError};
use crate::path::{DottedPath, OutputTree};
use crate::store::StoreContext;
use crate::value::text_form;
use serde_json::{Map, Value};

const MAPPING_KEYS: [&str; 4] = ["type", "values", "default", "override"];
const CONST_KEYS: [&str; 3] = ["type", "value", "override"];
const CONDITIONAL_KEYS: [&str; 3] = ["when", "value", "override"];
const DEFAULT_KEYS: [&str; 2] = ["default", "override"];

#[derive(Debug, Clone)]
pub struct MapFile {
    pub document: String,
    pub entries: Vec<(DottedPath, MapRule)>,
}

#[derive(Debug, Clone)]
pub enum MapRule {
    /// Translate the current value through a lookup table.
    Mapping {
        values: Map<String, Value>,
        default: Option<Value>,
        override_existing: bool,
    },
    Const {
        value: Value,
        override_existing: bool,
    },
    /// First entry whose `when` holds wins; the bare default comes last.
    Conditional {
        entries: Vec<ConditionalEntry>,
        default: Option<ConditionalDefault>,
    },
}

#[derive(Debug, Clone)]
pub struct ConditionalEntry {
    /// Every condition must hold. Keys are output paths or scan/reco aliases.
    pub when: Vec<(String, Condition)>,
    pub value: Value,
    pub override_existing: bool,
}

#[derive(Debug, Clone)]
pub struct ConditionalDefault {
    pub value: Value,
    /// Unset means fill only when the key is absent.
    pub override_existing: bool,
}

impl MapFile {
    pub fn from_document(document: &Value, origin: &str) -> Result<Self, SchemaError> {
        let Some(root) = document.as_object() else {
            return Err(SchemaError::single(origin, "map", "map file must be a mapping"));
        };
        let mut issues = IssueSink::default();
        let mut entries = Vec::with_capacity(root.len());
        for (key, raw) in root {
            let path = match DottedPath::parse(key) {
                Ok(path) => path,
                Err(message) => {
                    issues.push(key.as_str(), message);
                    continue;
                }
            };
            if let Some(rule) = parse_rule(raw, key, &mut issues) {
                entries.push((path, rule));
            }
        }
        issues.finish(origin)?;
        Ok(MapFile {
            document: origin.to_string(),
            entries,
        })
    }
}

pub fn validate_map_file(document: &Value) -> Result<(), SchemaError> {
    MapFile::from_document(document, "map").map(|_| ())
}

fn parse_rule(raw: &Value, path: &str, issues: &mut IssueSink) -> Option<MapRule> {
    match raw {
        Value::Array(items) => parse_conditional(items, path, issues),
        Value::Object(object) if object.contains_key("when") => {
            let entry = parse_conditional_entry(object, path, issues)?;
            Some(MapRule::Conditional {
                entries: vec![entry],
                default: None,
            })
        }
        Value::Object(object) => {
            let kind = match object.get("type") {
                None => None,
                Some(Value::String(kind)) => Some(kind.as_str()),
                Some(_) => {
                    issues.push(format!("{path}.type"), "type must be a string");
                    return None;
                }
            };
            match kind {
                Some("mapping") => parse_mapping(object, path, issues),
                Some("const") => parse_const(object, path, issues),
                Some(other) => {
                    issues.push(
                        format!("{path}.type"),
                        format!("unknown map rule type `{other}`; expected mapping or const"),
                    );
                    None
                }
                None if object.contains_key("values") => parse_mapping(object, path, issues),
                None if object.contains_key("value") => parse_const(object, path, issues),
                None if object.contains_key("default") => {
                    let default = parse_default(object, path, issues)?;
                    Some(MapRule::Conditional {
                        entries: Vec::new(),
                        default: Some(default),
                    })
                }
                None => {
                    issues.push(path, "map rule needs values, value, when, or default");
                    None
                }
            }
        }
        _ => {
            issues.push(path, "map rule must be a mapping or a list");
            None
        }
    }
}

fn parse_override(object: &Map<String, Value>, path: &str, issues: &mut IssueSink) -> Option<bool> {
    match object.get("override") {
        None => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(_) => {
            issues.push(format!("{path}.override"), "override must be a boolean");
            None
        }
    }
}

fn reject_extra(object: &Map<String, Value>, allowed: &[&str], path: &str, issues: &mut IssueSink) {
    let extra: Vec<&String> = object
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .collect();
    if !extra.is_empty() {
        issues.push(path, format!("unexpected keys {extra:?}"));
    }
}

fn parse_mapping(object: &Map<String, Value>, path: &str, issues: &mut IssueSink) -> Option<MapRule> {
    reject_extra(object, &MAPPING_KEYS, path, issues);
    let Some(Value::Object(values)) = object.get("values") else {
        issues.push(format!("{path}.values"), "values must be a mapping");
        return None;
    };
    Some(MapRule::Mapping {
        values: values.clone(),
        default: object.get("default").cloned(),
        override_existing: parse_override(object, path, issues).unwrap_or(true),
    })
}

fn parse_const(object: &Map<String, Value>, path: &str, issues: &mut IssueSink) -> Option<MapRule> {
    reject_extra(object, &CONST_KEYS, path, issues);
    let Some(value) = object.get("value") else {
        issues.push(format!("{path}.value"), "const rule requires value");
        return None;
    };
    Some(MapRule::Const {
        value: value.clone(),
        override_existing: parse_override(object, path, issues).unwrap_or(true),
    })
}

fn parse_conditional(items: &[Value], path: &str, issues: &mut IssueSink) -> Option<MapRule> {
    if items.is_empty() {
        issues.push(path, "conditional rule must not be empty");
        return None;
    }
    let mut entries = Vec::with_capacity(items.len());
    let mut default = None;
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{path}[{index}]");
        let Some(object) = item.as_object() else {
            issues.push(item_path, "conditional entry must be a mapping");
            continue;
        };
        if object.contains_key("when") {
            if let Some(entry) = parse_conditional_entry(object, &item_path, issues) {
                entries.push(entry);
            }
        } else if object.contains_key("default") {
            if index + 1 != items.len() {
                issues.push(item_path.clone(), "default entry must come last");
            }
            default = parse_default(object, &item_path, issues);
        } else {
            issues.push(item_path, "conditional entry needs when or default");
        }
    }
    Some(MapRule::Conditional { entries, default })
}

fn parse_conditional_entry(
    object: &Map<String, Value>,
    path: &str,
    issues: &mut IssueSink,
) -> Option<ConditionalEntry> {
    reject_extra(object, &CONDITIONAL_KEYS, path, issues);
    let Some(Value::Object(raw_when)) = object.get("when") else {
        issues.push(format!("{path}.when"), "when must be a mapping");
        return None;
    };
    if raw_when.is_empty() {
        issues.push(format!("{path}.when"), "when must not be empty");
        return None;
    }
    let mut when = Vec::with_capacity(raw_when.len());
    for (key, raw) in raw_when {
        if let Err(message) = DottedPath::parse(key) {
            issues.push(format!("{path}.when"), message);
            continue;
        }
        if let Some(condition) = Condition::parse(raw, &format!("{path}.when.{key}"), issues) {
            when.push((key.clone(), condition));
        }
    }
    let Some(value) = object.get("value") else {
        issues.push(format!("{path}.value"), "conditional entry requires value");
        return None;
    };
    Some(ConditionalEntry {
        when,
        value: value.clone(),
        override_existing: parse_override(object, path, issues).unwrap_or(true),
    })
}

fn parse_default(
    object: &Map<String, Value>,
    path: &str,
    issues: &mut IssueSink,
) -> Option<ConditionalDefault> {
    reject_extra(object, &DEFAULT_KEYS, path, issues);
    Some(ConditionalDefault {
        value: object.get("default")?.clone(),
        override_existing: parse_override(object, path, issues).unwrap_or(false),
    })
}

/// Apply every rule of `map` to `tree`, in map-file order.
pub fn apply_map(map: &MapFile, tree: &mut OutputTree, ctx: &StoreContext<'_>) {
    for (key, rule) in &map.entries {
        match rule {
            MapRule::Mapping {
                values,
                default,
                override_existing,
            } => {
                let current = tree.get(key).filter(|value| !value.is_null()).cloned();
                let mapped = match current {
                    Some(current) => map_value(&current, values, default.as_ref()),
                    None => default.clone(),
                };
                if let Some(value) = mapped {
                    write(tree, key, value, *override_existing);
                }
            }
            MapRule::Const {
                value,
                override_existing,
            } => write(tree, key, value.clone(), *override_existing),
            MapRule::Conditional { entries, default } => {
                let hit = entries.iter().find(|entry| {
                    entry
                        .when
                        .iter()
                        .all(|(target, condition)| match when_value(target, tree, ctx) {
                            Some(value) => condition.matches(&value),
                            None => false,
                        })
                });
                match (hit, default) {
                    (Some(entry), _) => write(tree, key, entry.value.clone(), entry.override_existing),
                    (None, Some(default)) => {
                        write(tree, key, default.value.clone(), default.override_existing)
                    }
                    (None, None) => {}
                }
            }
        }
    }
}

fn write(tree: &mut OutputTree, key: &DottedPath, value: Value, override_existing: bool) {
    if override_existing || !tree.has_value(key) {
        tree.insert(key, value);
    }
}

/// Sequences map element-wise; unmapped elements stay as they are.
fn map_value(current: &Value, values: &Map<String, Value>, default: Option<&Value>) -> Option<Value> {
    match current {
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| {
                    map_value(item, values, default).unwrap_or_else(|| item.clone())
                })
                .collect(),
        )),
        scalar => values
            .get(&text_form(scalar))
            .or(default)
            .cloned(),
    }
}

fn when_value(target: &str, tree: &OutputTree, ctx: &StoreContext<'_>) -> Option<Value> {
    let context_id = match target.to_ascii_lowercase().as_str() {
        "scanid" | "scan_id" => ctx.scan_id,
        "recoid" | "reco_id" => ctx.reco_id,
        _ => None,
    };
    if let Some(id) = context_id {
        return Some(Value::from(id));
    }
    // Without a context id the name is read from the output tree.
    let path = DottedPath::parse(target).ok()?;
    tree.get(&path).cloned()
}
