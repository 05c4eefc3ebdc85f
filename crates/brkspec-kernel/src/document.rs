//! Document access: YAML/JSON text to `serde_json::Value`.
//!
//! The kernel never touches the filesystem directly. Loaders go through a
//! [`DocumentSource`], which has a filesystem implementation for real use and
//! an in-memory one for tests and embedding.

use crate::error::RemapError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const DOCUMENT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Read-only access to definition documents.
pub trait DocumentSource: Send + Sync {
    /// Raw text of one document.
    fn read_text(&self, path: &Path) -> Result<String, RemapError>;

    /// Documents directly inside `dir` with a YAML or JSON extension, in any
    /// order. A missing directory yields an empty list.
    fn list_documents(&self, dir: &Path) -> Result<Vec<PathBuf>, RemapError>;

    fn exists(&self, path: &Path) -> bool;

    fn read_document(&self, path: &Path) -> Result<Value, RemapError> {
        let text = self.read_text(path)?;
        parse_document(&text, path)
    }
}

/// Documents on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDocuments;

impl DocumentSource for FsDocuments {
    fn read_text(&self, path: &Path) -> Result<String, RemapError> {
        fs::read_to_string(path).map_err(|error| RemapError::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        })
    }

    fn list_documents(&self, dir: &Path) -> Result<Vec<PathBuf>, RemapError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(dir).map_err(|error| RemapError::Io {
            path: dir.display().to_string(),
            message: error.to_string(),
        })?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| RemapError::Io {
                path: dir.display().to_string(),
                message: error.to_string(),
            })?;
            let path = entry.path();
            if path.is_file() && has_document_extension(&path) {
                out.push(path);
            }
        }
        Ok(out)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Documents held in memory, keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocuments {
    documents: BTreeMap<PathBuf, String>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.documents
            .insert(normalize_path(path.as_ref()), text.into());
    }

    pub fn with(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }
}

impl DocumentSource for MemoryDocuments {
    fn read_text(&self, path: &Path) -> Result<String, RemapError> {
        self.documents
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| RemapError::Io {
                path: path.display().to_string(),
                message: "no such document".to_string(),
            })
    }

    fn list_documents(&self, dir: &Path) -> Result<Vec<PathBuf>, RemapError> {
        let dir = normalize_path(dir);
        Ok(self
            .documents
            .keys()
            .filter(|path| path.parent() == Some(dir.as_path()) && has_document_extension(path))
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.documents.contains_key(&normalize_path(path))
    }
}

pub fn has_document_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext))
}

/// Lexically normalize `.` and `..` components without touching the disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `target` against the directory holding `document`, unless absolute.
pub fn resolve_relative(document: &Path, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return normalize_path(target);
    }
    let base = document.parent().unwrap_or_else(|| Path::new(""));
    normalize_path(&base.join(target))
}

/// Parse document text. `.json` files go through `serde_json`; everything
/// else is read as YAML. Empty documents parse to `null`.
pub fn parse_document(text: &str, path: &Path) -> Result<Value, RemapError> {
    let document = path.display().to_string();
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
    if is_json {
        return serde_json::from_str::<Value>(text).map_err(|error| RemapError::Parse {
            document,
            line: error.line(),
            column: error.column(),
            message: error.to_string(),
        });
    }
    let yaml = serde_yaml::from_str::<serde_yaml::Value>(text).map_err(|error| {
        let (line, column) = error
            .location()
            .map(|location| (location.line(), location.column()))
            .unwrap_or((0, 0));
        RemapError::Parse {
            document,
            line,
            column,
            message: error.to_string(),
        }
    })?;
    Ok(yaml_to_json(yaml))
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(flag) => Value::Bool(flag),
        serde_yaml::Value::Number(number) => yaml_number(&number),
        serde_yaml::Value::String(text) => Value::String(text),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, item) in mapping {
                out.insert(yaml_key(key), yaml_to_json(item));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_number(number: &serde_yaml::Number) -> Value {
    if let Some(int) = number.as_i64() {
        Value::from(int)
    } else if let Some(uint) = number.as_u64() {
        Value::from(uint)
    } else {
        number
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

// Mapping keys become strings; scalar keys keep their text form so that
// `values: {1: a}` is looked up as "1".
fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(text) => text,
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(flag) => flag.to_string(),
        serde_yaml::Value::Number(number) => yaml_number(&number).to_string(),
        other => yaml_to_json(other).to_string(),
    }
}
