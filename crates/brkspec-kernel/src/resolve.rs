//! Spec resolution: field rules to an output tree, then the map file.

use crate::error::RemapError;
use crate::field::resolve_field;
use crate::loader::LoadedSpec;
use crate::mapfile::{MapFile, apply_map};
use crate::path::OutputTree;
use crate::store::{ParamFile, ResolveScope, StoreContext};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FieldFailure {
    pub field: String,
    pub message: String,
    #[serde(skip)]
    pub error: RemapError,
}

/// One resolution run. Failed fields are absent from `output` and listed in
/// `failures`; the caller decides whether a partial tree is acceptable.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub document: String,
    pub digest: String,
    pub output: OutputTree,
    /// Sources-based fields that found no value.
    pub omitted: Vec<String>,
    pub failures: Vec<FieldFailure>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<OutputTree, RemapError> {
        if self.is_complete() {
            return Ok(self.output);
        }
        Err(RemapError::IncompleteResolution {
            document: self.document,
            fields: self.failures.into_iter().map(|failure| failure.field).collect(),
        })
    }
}

/// Resolve with the spec's own map file, if it has one.
pub fn resolve(spec: &LoadedSpec, ctx: &StoreContext<'_>) -> Result<Resolution, RemapError> {
    resolve_with_map(spec, ctx, spec.map.as_ref())
}

/// Resolve with `map` in place of the spec's bound map file.
pub fn resolve_with_map(
    spec: &LoadedSpec,
    ctx: &StoreContext<'_>,
    map: Option<&MapFile>,
) -> Result<Resolution, RemapError> {
    if ctx.scope == ResolveScope::Study {
        check_study_scope(spec)?;
    }

    let mut output = OutputTree::new();
    let mut omitted = Vec::new();
    let mut failures = Vec::new();
    for (path, rule) in &spec.spec.fields {
        match resolve_field(rule, path.as_str(), ctx, &output, &spec.transforms) {
            Ok(Some(value)) => output.insert(path, value),
            Ok(None) => {
                tracing::debug!(field = %path, "no source value; field omitted");
                omitted.push(path.to_string());
            }
            Err(error) => {
                tracing::warn!(field = %path, %error, "field failed");
                failures.push(FieldFailure {
                    field: path.to_string(),
                    message: error.to_string(),
                    error,
                });
            }
        }
    }
    if let Some(map) = map {
        apply_map(map, &mut output, ctx);
    }
    Ok(Resolution {
        document: spec.spec.document.clone(),
        digest: spec.digest.clone(),
        output,
        omitted,
        failures,
    })
}

/// Study records read only subject parameters, and at least one.
fn check_study_scope(spec: &LoadedSpec) -> Result<(), RemapError> {
    let selectors: Vec<_> = spec
        .spec
        .fields
        .iter()
        .flat_map(|(_, rule)| rule.selectors())
        .collect();
    let scope_error = |message: String| RemapError::StudyScope {
        document: spec.spec.document.clone(),
        message,
    };
    if let Some(selector) = selectors.iter().find(|selector| selector.file != ParamFile::Subject) {
        return Err(scope_error(format!(
            "may only read subject parameters; found {}:{}",
            selector.file, selector.key
        )));
    }
    if selectors.is_empty() {
        return Err(scope_error("must read at least one subject parameter".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocuments;
    use crate::loader::SpecLoader;
    use crate::store::MemoryStore;
    use crate::transform::TransformCatalog;
    use serde_json::json;

    const META: &str = "__meta__:\n  name: study_info\n  version: 1\n  description: d\n  category: info_spec\n";

    fn load(body: &str) -> LoadedSpec {
        let docs = MemoryDocuments::new().with("specs/s.yaml", format!("{META}{body}"));
        let catalog = TransformCatalog::with_builtins();
        SpecLoader::new(&docs, &catalog)
            .load("specs/s.yaml")
            .expect("spec loads")
    }

    #[test]
    fn study_scope_accepts_subject_only_specs() {
        let spec = load("study.id:\n  sources:\n    - {file: subject, key: SUBJECT_study_name}\n");
        let mut store = MemoryStore::new();
        store.set(ParamFile::Subject, "SUBJECT_study_name", json!("pilot"));
        let ctx = StoreContext::new(&store).study();
        let output = resolve(&spec, &ctx).unwrap().into_result().unwrap();
        assert_eq!(output.into_value(), json!({"study": {"id": "pilot"}}));
    }

    #[test]
    fn study_scope_rejects_scan_parameters() {
        let spec = load(
            "study.id:\n  sources:\n    - {file: subject, key: SUBJECT_study_name}\n    - {file: method, key: Method}\n",
        );
        let store = MemoryStore::new();
        let err = resolve(&spec, &StoreContext::new(&store).study()).unwrap_err();
        assert!(matches!(err, RemapError::StudyScope { ref message, .. } if message.contains("method:Method")));
    }

    #[test]
    fn study_scope_requires_a_subject_read() {
        let spec = load("study.kind:\n  inputs:\n    k: {const: study}\n");
        let store = MemoryStore::new();
        assert!(matches!(
            resolve(&spec, &StoreContext::new(&store).study()),
            Err(RemapError::StudyScope { .. })
        ));
        // The same spec is fine at scan scope.
        assert!(resolve(&spec, &StoreContext::new(&store)).is_ok());
    }

    #[test]
    fn explicit_map_replaces_the_bound_one() {
        let spec = load("sex:\n  sources:\n    - {file: subject, key: SUBJECT_sex}\n");
        let mut store = MemoryStore::new();
        store.set(ParamFile::Subject, "SUBJECT_sex", json!("M"));
        let map = MapFile::from_document(&json!({"sex": {"values": {"M": "male"}}}), "m.yaml").unwrap();
        let ctx = StoreContext::new(&store);
        let mapped = resolve_with_map(&spec, &ctx, Some(&map)).unwrap();
        assert_eq!(mapped.output.into_value(), json!({"sex": "male"}));
        let plain = resolve(&spec, &ctx).unwrap();
        assert_eq!(plain.output.into_value(), json!({"sex": "M"}));
    }

    #[test]
    fn incomplete_resolution_names_failed_fields() {
        let spec = load(
            "a:\n  inputs:\n    v: {sources: [{file: method, key: X}], required: true}\nb:\n  inputs:\n    v: {const: 1}\n",
        );
        let store = MemoryStore::new();
        let resolution = resolve(&spec, &StoreContext::new(&store)).unwrap();
        assert!(!resolution.is_complete());
        assert_eq!(resolution.output.as_map().len(), 1);
        let err = resolution.into_result().unwrap_err();
        assert!(matches!(err, RemapError::IncompleteResolution { ref fields, .. } if fields == &["a"]));
    }
}
