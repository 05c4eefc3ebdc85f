//! Name lookup over the spec documents of an addon root.

use crate::document::{DocumentSource, has_document_extension, normalize_path};
use crate::error::RemapError;
use crate::spec::META_KEY;
use crate::value::text_form;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecEntry {
    pub name: String,
    pub version: String,
    pub category: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct SpecIndex {
    root: PathBuf,
    entries: Vec<SpecEntry>,
}

impl SpecIndex {
    /// Index every document under `<root>/specs` that carries a usable
    /// `__meta__`. Fragments meant only for inclusion are skipped.
    pub fn scan(documents: &dyn DocumentSource, root: &Path) -> Result<Self, RemapError> {
        let root = normalize_path(root);
        let mut paths = documents.list_documents(&specs_dir(&root))?;
        paths.sort();
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let document = documents.read_document(&path)?;
            match entry_for(&document, &path) {
                Some(entry) => entries.push(entry),
                None => tracing::debug!(path = %path.display(), "skipping document without spec metadata"),
            }
        }
        Ok(Self { root, entries })
    }

    pub fn entries(&self) -> &[SpecEntry] {
        &self.entries
    }

    /// Resolve a rule's `use` value to a spec document path.
    ///
    /// A reference carrying a document extension or a `/` is a path relative
    /// to the root (`specs/` is implied when absent). Anything else is a
    /// spec name matched within `category`, optionally pinned to `version`.
    pub fn resolve(
        &self,
        reference: &str,
        category: &str,
        version: Option<&str>,
    ) -> Result<PathBuf, RemapError> {
        let not_found = || RemapError::SpecNotFound {
            reference: reference.to_string(),
            category: category.to_string(),
        };
        let as_path = Path::new(reference);
        if has_document_extension(as_path) || reference.contains('/') {
            let path = if as_path.is_absolute() || as_path.starts_with("specs") {
                self.root.join(as_path)
            } else {
                specs_dir(&self.root).join(as_path)
            };
            let path = normalize_path(&path);
            return self
                .entries
                .iter()
                .find(|entry| entry.path == path)
                .map(|entry| entry.path.clone())
                .ok_or_else(not_found);
        }

        let candidates: Vec<&SpecEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.name == reference && entry.category == category)
            .filter(|entry| version.is_none_or(|version| entry.version == version))
            .collect();
        match candidates.as_slice() {
            [] => Err(not_found()),
            [only] => Ok(only.path.clone()),
            many => Err(RemapError::AmbiguousReference {
                reference: reference.to_string(),
                category: category.to_string(),
                candidates: many
                    .iter()
                    .map(|entry| entry.path.display().to_string())
                    .collect(),
            }),
        }
    }
}

pub fn specs_dir(root: &Path) -> PathBuf {
    root.join("specs")
}

fn entry_for(document: &Value, path: &Path) -> Option<SpecEntry> {
    let meta = document.get(META_KEY)?.as_object()?;
    let text = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_string);
    let version = match meta.get("version")? {
        value @ (Value::String(_) | Value::Number(_)) => text_form(value),
        _ => return None,
    };
    Some(SpecEntry {
        name: text("name")?,
        version,
        category: text("category")?,
        path: path.to_path_buf(),
    })
}
