//! Source selectors and the first-present fallback chain.

use crate::error::IssueSink;
use crate::store::{ParamFile, StoreContext};
use serde::Serialize;
use serde_json::Value;

/// One lookup against the parameter store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSelector {
    pub file: ParamFile,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reco_id: Option<u32>,
}

impl SourceSelector {
    pub fn new(file: ParamFile, key: impl Into<String>) -> Self {
        Self {
            file,
            key: key.into(),
            reco_id: None,
        }
    }

    pub fn with_reco_id(mut self, reco_id: u32) -> Self {
        self.reco_id = Some(reco_id);
        self
    }
}

/// Value of the first selector the store has a value for, in declared order.
pub fn resolve_sources(selectors: &[SourceSelector], ctx: &StoreContext<'_>) -> Option<Value> {
    selectors
        .iter()
        .find_map(|selector| ctx.lookup(selector.file, &selector.key, selector.reco_id))
}

pub(crate) fn parse_sources(
    value: &Value,
    path: &str,
    issues: &mut IssueSink,
) -> Option<Vec<SourceSelector>> {
    let Some(items) = value.as_array() else {
        issues.push(format!("{path}.sources"), "sources must be a list");
        return None;
    };
    if items.is_empty() {
        issues.push(format!("{path}.sources"), "sources must not be empty");
        return None;
    }
    let mut selectors = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{path}.sources[{index}]");
        let Some(object) = item.as_object() else {
            issues.push(item_path, "source must be a mapping");
            continue;
        };
        let extra: Vec<&String> = object
            .keys()
            .filter(|key| !matches!(key.as_str(), "file" | "key" | "reco_id"))
            .collect();
        let mut valid = extra.is_empty();
        if !valid {
            issues.push(item_path.clone(), format!("unexpected keys {extra:?}"));
        }
        let file = match object.get("file").and_then(Value::as_str) {
            Some(raw) => match raw.parse::<ParamFile>() {
                Ok(file) => Some(file),
                Err(message) => {
                    issues.push(format!("{item_path}.file"), message);
                    None
                }
            },
            None => {
                issues.push(format!("{item_path}.file"), "file is required and must be a string");
                None
            }
        };
        let key = match object.get("key").and_then(Value::as_str) {
            Some(key) if !key.is_empty() => Some(key.to_string()),
            _ => {
                issues.push(format!("{item_path}.key"), "key is required and must be a string");
                None
            }
        };
        let reco_id = match object.get("reco_id") {
            None | Some(Value::Null) => None,
            Some(raw) => match raw.as_u64().and_then(|id| u32::try_from(id).ok()) {
                Some(id) if id >= 1 => Some(id),
                _ => {
                    issues.push(format!("{item_path}.reco_id"), "reco_id must be an integer >= 1");
                    valid = false;
                    None
                }
            },
        };
        if let (true, Some(file), Some(key)) = (valid, file, key) {
            selectors.push(SourceSelector { file, key, reco_id });
        }
    }
    Some(selectors)
}
