//! Dotted output paths and the nested output tree they address.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// A dotted key such as `out.subject.id`, split once into segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DottedPath {
    raw: String,
    segments: Vec<String>,
}

impl DottedPath {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("path must not be empty".to_string());
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(format!("path `{raw}` has an empty segment"));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }
}

impl fmt::Display for DottedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for DottedPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// Resolved output of one spec run: an insertion-ordered nested mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OutputTree {
    root: Map<String, Value>,
}

impl OutputTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at `path`, creating (or replacing non-mapping)
    /// intermediate nodes.
    pub fn insert(&mut self, path: &DottedPath, value: Value) {
        let Some((leaf, parents)) = path.segments().split_last() else {
            return;
        };
        let mut cursor = &mut self.root;
        for segment in parents {
            let slot = cursor
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(map) = slot else {
                return;
            };
            cursor = map;
        }
        cursor.insert(leaf.clone(), value);
    }

    pub fn get(&self, path: &DottedPath) -> Option<&Value> {
        let (first, rest) = path.segments().split_first()?;
        let mut cursor = self.root.get(first)?;
        for segment in rest {
            cursor = cursor.as_object()?.get(segment)?;
        }
        Some(cursor)
    }

    pub fn contains(&self, path: &DottedPath) -> bool {
        self.get(path).is_some()
    }

    /// Present and not null.
    pub fn has_value(&self, path: &DottedPath) -> bool {
        self.get(path).is_some_and(|value| !value.is_null())
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }
}

impl From<Map<String, Value>> for OutputTree {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}
