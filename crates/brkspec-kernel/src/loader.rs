//! Spec loading: include merge, transform sources, bound map file.

use crate::document::{DocumentSource, has_document_extension, normalize_path, resolve_relative};
use crate::error::{IssueSink, RemapError, SchemaError};
use crate::mapfile::MapFile;
use crate::spec::{META_KEY, Spec, field_entries, string_or_list};
use crate::transform::{TransformCatalog, TransformChain, TransformRegistry};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A spec ready to resolve: merged fields, its transforms, its map file.
#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub path: PathBuf,
    pub spec: Spec,
    pub transforms: TransformRegistry,
    pub map: Option<MapFile>,
    /// SHA-256 of the merged document, lowercase hex.
    pub digest: String,
}

/// A document after its includes were folded in.
struct Merged {
    meta: Option<Value>,
    fields: Map<String, Value>,
    /// Transform sources as `(declared, resolved path)`, first seen first.
    sources: Vec<(String, PathBuf)>,
}

pub struct SpecLoader<'a> {
    documents: &'a dyn DocumentSource,
    catalog: &'a TransformCatalog,
}

impl<'a> SpecLoader<'a> {
    pub fn new(documents: &'a dyn DocumentSource, catalog: &'a TransformCatalog) -> Self {
        Self { documents, catalog }
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadedSpec, RemapError> {
        let path = normalize_path(path.as_ref());
        let origin = path.display().to_string();
        let mut stack = Vec::new();
        let merged = self.merge(&path, &mut stack)?;

        let mut document = Map::new();
        if let Some(meta) = merged.meta {
            document.insert(META_KEY.to_string(), meta);
        }
        document.extend(merged.fields);
        let document = Value::Object(document);
        let spec = Spec::from_document(&document, &origin)?;

        let transforms = self.build_registry(&origin, &merged.sources)?;
        let map = match &spec.meta.map_file {
            Some(map_file) => Some(self.load_map_file(resolve_relative(&path, map_file))?),
            None => None,
        };
        let digest = format!("{:x}", Sha256::digest(document.to_string().as_bytes()));
        tracing::debug!(
            spec = %origin,
            fields = spec.fields.len(),
            digest = %digest,
            "loaded spec"
        );
        Ok(LoadedSpec {
            path,
            spec,
            transforms,
            map,
            digest,
        })
    }

    /// Only the transforms a spec binds, without validating its fields.
    pub fn load_transforms(&self, path: impl AsRef<Path>) -> Result<TransformRegistry, RemapError> {
        let path = normalize_path(path.as_ref());
        let merged = self.merge(&path, &mut Vec::new())?;
        self.build_registry(&path.display().to_string(), &merged.sources)
    }

    pub fn load_map_file(&self, path: impl AsRef<Path>) -> Result<MapFile, RemapError> {
        let path = normalize_path(path.as_ref());
        let document = self.documents.read_document(&path)?;
        Ok(MapFile::from_document(&document, &path.display().to_string())?)
    }

    fn merge(&self, path: &Path, stack: &mut Vec<PathBuf>) -> Result<Merged, RemapError> {
        let origin = path.display().to_string();
        if stack.iter().any(|seen| seen == path) {
            let mut chain: Vec<String> = stack.iter().map(|p| p.display().to_string()).collect();
            chain.push(origin);
            return Err(RemapError::CircularInclude { chain });
        }
        if !has_document_extension(path) {
            return Err(SchemaError::single(
                &origin,
                "include",
                "spec must be a .yaml, .yml, or .json document",
            )
            .into());
        }
        let document = self.documents.read_document(path)?;
        let Value::Object(root) = document else {
            return Err(SchemaError::single(&origin, "spec", "spec must be a mapping").into());
        };

        let mut issues = IssueSink::default();
        let meta = root.get(META_KEY).and_then(Value::as_object);
        let (includes, strict, declared_sources) = match meta {
            Some(meta) => {
                let strict = match meta.get("include_mode") {
                    None | Some(Value::Null) => false,
                    Some(Value::String(mode)) if mode == "override" => false,
                    Some(Value::String(mode)) if mode == "strict" => true,
                    Some(_) => {
                        issues.push(
                            format!("{META_KEY}.include_mode"),
                            "include_mode must be `override` or `strict`",
                        );
                        false
                    }
                };
                (
                    string_or_list(meta, "include", &mut issues),
                    strict,
                    string_or_list(meta, "transforms_source", &mut issues),
                )
            }
            None => (Vec::new(), false, Vec::new()),
        };
        let own_fields: Vec<(String, Value)> = field_entries(&root, &origin, &mut issues)
            .into_iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        issues.finish(&origin)?;

        // Own sources come first, so an included document's bindings
        // override same-named transforms.
        let mut sources: Vec<(String, PathBuf)> = Vec::new();
        for declared in declared_sources {
            let resolved = resolve_relative(path, &declared);
            push_source(&mut sources, (declared, resolved));
        }

        stack.push(path.to_path_buf());
        let mut fields = Map::new();
        for include in &includes {
            let target = resolve_relative(path, include);
            tracing::debug!(spec = %origin, include = %target.display(), "merging include");
            let included = self.merge(&target, stack)?;
            for source in included.sources {
                push_source(&mut sources, source);
            }
            for (key, value) in included.fields {
                if strict && fields.contains_key(&key) {
                    return Err(RemapError::IncludeConflict { document: origin, key });
                }
                fields.insert(key, value);
            }
        }
        stack.pop();

        for (key, value) in own_fields {
            if strict && fields.contains_key(&key) {
                return Err(RemapError::IncludeConflict { document: origin, key });
            }
            fields.insert(key, value);
        }

        let meta = root.get(META_KEY).cloned().map(|mut meta| {
            if let Value::Object(object) = &mut meta {
                object.remove("include");
                object.remove("include_mode");
            }
            meta
        });
        Ok(Merged {
            meta,
            fields,
            sources,
        })
    }

    /// Builtins first, then each source in order; later bindings win.
    fn build_registry(
        &self,
        origin: &str,
        sources: &[(String, PathBuf)],
    ) -> Result<TransformRegistry, RemapError> {
        let mut registry = self.catalog.default_registry();
        for (declared, resolved) in sources {
            if has_document_extension(resolved) && self.documents.exists(resolved) {
                self.apply_alias_document(&mut registry, resolved)?;
                continue;
            }
            let library = self.catalog.library(declared).ok_or_else(|| {
                RemapError::UnknownTransformSource {
                    document: origin.to_string(),
                    source_ref: declared.clone(),
                }
            })?;
            registry.extend(library);
        }
        Ok(registry)
    }

    fn apply_alias_document(
        &self,
        registry: &mut TransformRegistry,
        path: &Path,
    ) -> Result<(), RemapError> {
        let origin = path.display().to_string();
        let document = self.documents.read_document(path)?;
        let Value::Object(aliases) = document else {
            return Err(SchemaError::single(
                &origin,
                "transforms",
                "transform alias document must be a mapping",
            )
            .into());
        };
        let mut issues = IssueSink::default();
        for (name, raw) in &aliases {
            let chain = match TransformChain::from_value(raw) {
                Ok(chain) => chain,
                Err(message) => {
                    issues.push(name.as_str(), message);
                    continue;
                }
            };
            if let Err(message) = registry.alias(name, &chain) {
                issues.push(name.as_str(), message);
            }
        }
        issues.finish(&origin)?;
        Ok(())
    }
}

fn push_source(sources: &mut Vec<(String, PathBuf)>, source: (String, PathBuf)) {
    if !sources.iter().any(|(_, seen)| *seen == source.1) {
        sources.push(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocuments;
    use serde_json::json;

    const META: &str = "__meta__:\n  name: child\n  version: 1\n  description: d\n  category: info_spec\n";

    fn load(docs: &MemoryDocuments, path: &str) -> Result<LoadedSpec, RemapError> {
        let catalog = TransformCatalog::with_builtins();
        SpecLoader::new(docs, &catalog).load(path)
    }

    #[test]
    fn includes_merge_with_including_document_winning() {
        let docs = MemoryDocuments::new()
            .with(
                "specs/base.yaml",
                "out.x:\n  inputs:\n    v: {const: base}\nout.y:\n  inputs:\n    v: {const: y}\n",
            )
            .with(
                "specs/child.yaml",
                format!("{META}  include: base.yaml\nout.x:\n  inputs:\n    v: {{const: child}}\n"),
            );
        let loaded = load(&docs, "specs/child.yaml").unwrap();
        let keys: Vec<&str> = loaded.spec.fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["out.x", "out.y"]);
        assert!(loaded.spec.meta.include.is_empty());
        assert_eq!(loaded.digest.len(), 64);
    }

    #[test]
    fn strict_mode_rejects_duplicate_keys() {
        let docs = MemoryDocuments::new()
            .with("specs/base.yaml", "out.x:\n  inputs:\n    v: {const: 1}\n")
            .with(
                "specs/child.yaml",
                format!(
                    "{META}  include: base.yaml\n  include_mode: strict\nout.x:\n  inputs:\n    v: {{const: 2}}\n"
                ),
            );
        let err = load(&docs, "specs/child.yaml").unwrap_err();
        assert!(matches!(err, RemapError::IncludeConflict { ref key, .. } if key == "out.x"));
    }

    #[test]
    fn circular_includes_report_the_chain() {
        let docs = MemoryDocuments::new()
            .with("specs/a.yaml", format!("{META}  include: b.yaml\n"))
            .with("specs/b.yaml", "__meta__:\n  include: a.yaml\n");
        let err = load(&docs, "specs/a.yaml").unwrap_err();
        let RemapError::CircularInclude { chain } = err else {
            panic!("expected circular include, got {err:?}");
        };
        assert_eq!(chain, ["specs/a.yaml", "specs/b.yaml", "specs/a.yaml"]);
    }

    #[test]
    fn transform_sources_resolve_through_catalog_and_alias_documents() {
        let docs = MemoryDocuments::new()
            .with("specs/aliases.yaml", "shout: [strip, upper]\n")
            .with(
                "specs/child.yaml",
                format!("{META}  transforms_source: [lib/scan_tools.py, aliases.yaml]\n"),
            );
        let mut tools = TransformRegistry::new();
        tools.register("double", |args| {
            let value = args.single()?;
            value
                .as_f64()
                .map(|number| json!(number * 2.0))
                .ok_or_else(|| "not a number".to_string())
        });
        let mut catalog = TransformCatalog::with_builtins();
        catalog.add_library("scan_tools", tools);
        let loaded = SpecLoader::new(&docs, &catalog).load("specs/child.yaml").unwrap();
        assert!(loaded.transforms.contains("double"));
        assert!(loaded.transforms.contains("shout"));
        assert!(loaded.transforms.contains("identity"));
    }

    #[test]
    fn included_transform_sources_override_own_sources() {
        let labelled = |label: &'static str| {
            let mut tools = TransformRegistry::new();
            tools.register("label", move |_| Ok(json!(label)));
            tools
        };
        let mut catalog = TransformCatalog::with_builtins();
        catalog.add_library("own_lib", labelled("own"));
        catalog.add_library("inc_lib", labelled("included"));
        let docs = MemoryDocuments::new()
            .with("specs/base.yaml", "__meta__:\n  transforms_source: inc_lib\n")
            .with(
                "specs/top.yaml",
                format!("{META}  include: base.yaml\n  transforms_source: own_lib\n"),
            );
        let loaded = SpecLoader::new(&docs, &catalog).load("specs/top.yaml").unwrap();
        let label = loaded
            .transforms
            .apply_positional(&TransformChain::single("label"), json!(1), "x")
            .unwrap();
        assert_eq!(label, json!("included"));
    }

    #[test]
    fn unknown_transform_source_is_an_error() {
        let docs = MemoryDocuments::new().with(
            "specs/child.yaml",
            format!("{META}  transforms_source: missing.py\n"),
        );
        let err = load(&docs, "specs/child.yaml").unwrap_err();
        assert!(matches!(
            err,
            RemapError::UnknownTransformSource { ref source_ref, .. } if source_ref == "missing.py"
        ));
    }

    #[test]
    fn bound_map_file_is_loaded_and_validated() {
        let docs = MemoryDocuments::new()
            .with("specs/maps/sex.yaml", "sex:\n  values: {M: male}\n")
            .with("specs/child.yaml", format!("{META}  map_file: maps/sex.yaml\n"));
        let loaded = load(&docs, "specs/child.yaml").unwrap();
        assert_eq!(loaded.map.map(|map| map.entries.len()), Some(1));

        let docs = MemoryDocuments::new()
            .with("specs/maps/sex.yaml", "sex: 5\n")
            .with("specs/child.yaml", format!("{META}  map_file: maps/sex.yaml\n"));
        assert!(matches!(load(&docs, "specs/child.yaml"), Err(RemapError::Schema(_))));
    }

    #[test]
    fn digest_is_stable_across_loads() {
        let docs = MemoryDocuments::new().with(
            "specs/child.yaml",
            format!("{META}out.x:\n  inputs:\n    v: {{const: 1}}\n"),
        );
        let first = load(&docs, "specs/child.yaml").unwrap();
        let second = load(&docs, "specs/child.yaml").unwrap();
        assert_eq!(first.digest, second.digest);
    }
}
