//! Rule files and target selection.
//!
//! A rule binds variables from the parameter store (`when`), tests them
//! (`if`), and names a target (`use`). Across every rule file of a category
//! the last matching rule wins; files are visited in file-name order.

use crate::condition::RuleExpr;
use crate::document::DocumentSource;
use crate::error::{IssueSink, RemapError, SchemaError};
use crate::input::{InputSpec, parse_input, resolve_input};
use crate::loader::SpecLoader;
use crate::path::{DottedPath, OutputTree};
use crate::spec_index::SpecIndex;
use crate::store::StoreContext;
use crate::transform::TransformRegistry;
use crate::value::text_form;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

const RULE_KEYS: [&str; 6] = ["name", "description", "when", "if", "use", "version"];

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("variable regex must compile"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    InfoSpec,
    MetadataSpec,
    ConverterEntrypoint,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 3] = [
        RuleCategory::InfoSpec,
        RuleCategory::MetadataSpec,
        RuleCategory::ConverterEntrypoint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleCategory::InfoSpec => "info_spec",
            RuleCategory::MetadataSpec => "metadata_spec",
            RuleCategory::ConverterEntrypoint => "converter_entrypoint",
        }
    }

    /// Whether targets in this category are spec references.
    pub fn targets_spec(self) -> bool {
        !matches!(self, RuleCategory::ConverterEntrypoint)
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| {
                format!("unknown rule category `{s}`; expected info_spec, metadata_spec, or converter_entrypoint")
            })
    }
}

/// What a matching rule selects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetReference {
    /// A spec name or path, optionally pinned to a version.
    Spec {
        reference: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// A converter entrypoint name.
    Entrypoint { name: String },
}

#[derive(Debug, Clone)]
pub struct RuleItem {
    pub name: String,
    pub description: Option<String>,
    /// Variable bindings in declaration order.
    pub when: Vec<(String, InputSpec)>,
    pub condition: Option<RuleExpr>,
    pub target: TargetReference,
}

#[derive(Debug, Clone)]
pub struct RuleFile {
    pub document: String,
    pub info_spec: Vec<RuleItem>,
    pub metadata_spec: Vec<RuleItem>,
    pub converter_entrypoint: Vec<RuleItem>,
}

impl RuleFile {
    pub fn from_document(document: &Value, origin: &str) -> Result<Self, RemapError> {
        let mut file = RuleFile {
            document: origin.to_string(),
            info_spec: Vec::new(),
            metadata_spec: Vec::new(),
            converter_entrypoint: Vec::new(),
        };
        let root = match document {
            Value::Null => return Ok(file),
            Value::Object(root) => root,
            _ => return Err(SchemaError::single(origin, "rules", "rule file must be a mapping").into()),
        };

        let mut issues = IssueSink::default();
        for key in root.keys() {
            if key.parse::<RuleCategory>().is_err() {
                issues.push(key.as_str(), format!("unknown rule category `{key}`"));
            }
        }
        for category in RuleCategory::ALL {
            let Some(raw) = root.get(category.as_str()) else {
                continue;
            };
            let Some(items) = raw.as_array() else {
                issues.push(category.as_str(), "rule category must be a list");
                continue;
            };
            let mut parsed = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let path = format!("{category}[{index}]");
                if let Some(rule) = parse_rule(item, category, &path, &mut issues) {
                    parsed.push(rule);
                }
            }
            *file.items_mut(category) = parsed;
        }
        issues.finish(origin)?;

        for category in RuleCategory::ALL {
            for rule in file.items(category) {
                check_bound(rule)?;
            }
        }
        Ok(file)
    }

    pub fn items(&self, category: RuleCategory) -> &[RuleItem] {
        match category {
            RuleCategory::InfoSpec => &self.info_spec,
            RuleCategory::MetadataSpec => &self.metadata_spec,
            RuleCategory::ConverterEntrypoint => &self.converter_entrypoint,
        }
    }

    fn items_mut(&mut self, category: RuleCategory) -> &mut Vec<RuleItem> {
        match category {
            RuleCategory::InfoSpec => &mut self.info_spec,
            RuleCategory::MetadataSpec => &mut self.metadata_spec,
            RuleCategory::ConverterEntrypoint => &mut self.converter_entrypoint,
        }
    }
}

/// Every variable `if` reads must be declared in `when`.
fn check_bound(rule: &RuleItem) -> Result<(), RemapError> {
    let Some(condition) = &rule.condition else {
        return Ok(());
    };
    for variable in condition.variables() {
        if !rule.when.iter().any(|(name, _)| name == variable) {
            return Err(RemapError::UnboundVariable {
                rule: rule.name.clone(),
                variable: variable.to_string(),
            });
        }
    }
    Ok(())
}

pub fn validate_rule_file(document: &Value) -> Result<(), SchemaError> {
    match RuleFile::from_document(document, "rules") {
        Ok(_) => Ok(()),
        Err(RemapError::Schema(error)) => Err(error),
        Err(other) => Err(SchemaError::single("rules", "if", other.to_string())),
    }
}

fn parse_rule(
    value: &Value,
    category: RuleCategory,
    path: &str,
    issues: &mut IssueSink,
) -> Option<RuleItem> {
    let Some(object) = value.as_object() else {
        issues.push(path, "rule must be a mapping");
        return None;
    };
    let extra: Vec<&String> = object
        .keys()
        .filter(|key| !RULE_KEYS.contains(&key.as_str()))
        .collect();
    if !extra.is_empty() {
        issues.push(path, format!("unexpected keys {extra:?}"));
    }

    let name = match object.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => Some(name.to_string()),
        _ => {
            issues.push(format!("{path}.name"), "name is required and must be a non-empty string");
            None
        }
    };
    let description = object
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut when = Vec::new();
    match object.get("when") {
        None | Some(Value::Null) => {}
        Some(Value::Object(bindings)) => {
            for (variable, raw) in bindings {
                let binding_path = format!("{path}.when.{variable}");
                if !variable_re().is_match(variable) {
                    issues.push(binding_path, format!("`{variable}` is not a valid variable name"));
                    continue;
                }
                if let Some(input) = parse_input(raw, &binding_path, issues) {
                    when.push((variable.clone(), input));
                }
            }
        }
        Some(_) => issues.push(format!("{path}.when"), "when must be a mapping"),
    }

    let condition = match object.get("if") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(RuleExpr::parse(raw, &format!("{path}.if"), issues)?),
    };

    let target_name = match object.get("use").and_then(Value::as_str) {
        Some(target) if !target.trim().is_empty() => Some(target.to_string()),
        _ => {
            issues.push(format!("{path}.use"), "use is required and must be a non-empty string");
            None
        }
    };
    let version = match object.get("version") {
        None | Some(Value::Null) => None,
        Some(value @ (Value::String(_) | Value::Number(_))) => Some(text_form(value)),
        Some(_) => {
            issues.push(format!("{path}.version"), "version must be a string or number");
            None
        }
    };
    if version.is_some() && !category.targets_spec() {
        issues.push(format!("{path}.version"), "version only applies to spec targets");
    }

    let target_name = target_name?;
    let target = if category.targets_spec() {
        TargetReference::Spec {
            reference: target_name,
            version,
        }
    } else {
        TargetReference::Entrypoint { name: target_name }
    };
    Some(RuleItem {
        name: name?,
        description,
        when,
        condition,
        target,
    })
}

/// Every rule file of an addon root, in file-name order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    files: Vec<RuleFile>,
}

impl RuleSet {
    pub fn new(mut files: Vec<RuleFile>) -> Self {
        files.sort_by(|a, b| sort_key(&a.document).cmp(&sort_key(&b.document)));
        Self { files }
    }

    /// Load `*.yaml`, `*.yml`, and `*.json` directly under `dir`.
    pub fn load_dir(documents: &dyn DocumentSource, dir: &Path) -> Result<Self, RemapError> {
        let mut files = Vec::new();
        for path in documents.list_documents(dir)? {
            let document = documents.read_document(&path)?;
            files.push(RuleFile::from_document(&document, &path.display().to_string())?);
        }
        tracing::debug!(dir = %dir.display(), files = files.len(), "loaded rule files");
        Ok(Self::new(files))
    }

    pub fn files(&self) -> &[RuleFile] {
        &self.files
    }

    /// Rules of one category across all files, in evaluation order.
    pub fn rules(&self, category: RuleCategory) -> impl Iterator<Item = (&RuleFile, &RuleItem)> {
        self.files
            .iter()
            .flat_map(move |file| file.items(category).iter().map(move |rule| (file, rule)))
    }
}

fn sort_key(document: &str) -> (String, String) {
    let name = Path::new(document)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    (name, document.to_string())
}

/// Transforms each rule's `when` bindings resolve with.
///
/// A spec rule binds with the transforms of the spec it selects. Entrypoint
/// rules, and spec rules whose target is not indexed, use the fallback.
#[derive(Debug, Clone)]
pub struct RuleTransforms {
    fallback: TransformRegistry,
    targets: HashMap<(RuleCategory, TargetReference), Result<PathBuf, RemapError>>,
    loaded: HashMap<PathBuf, Result<TransformRegistry, RemapError>>,
}

impl RuleTransforms {
    /// Every rule binds with `registry`.
    pub fn fixed(registry: TransformRegistry) -> Self {
        Self {
            fallback: registry,
            targets: HashMap::new(),
            loaded: HashMap::new(),
        }
    }

    /// Resolve every spec target through `index` and load its transforms,
    /// once per spec path. Lookup and load errors are kept and surface as
    /// failures of the rules that select that target.
    pub fn for_rule_set(
        rule_set: &RuleSet,
        index: &SpecIndex,
        loader: &SpecLoader<'_>,
        fallback: TransformRegistry,
    ) -> Self {
        let mut transforms = Self::fixed(fallback);
        for category in RuleCategory::ALL.into_iter().filter(|c| c.targets_spec()) {
            for (_, rule) in rule_set.rules(category) {
                let TargetReference::Spec { reference, version } = &rule.target else {
                    continue;
                };
                let key = (category, rule.target.clone());
                if transforms.targets.contains_key(&key) {
                    continue;
                }
                match index.resolve(reference, category.as_str(), version.as_deref()) {
                    Ok(path) => {
                        if !transforms.loaded.contains_key(&path) {
                            let loaded = loader.load_transforms(&path);
                            if let Err(error) = &loaded {
                                tracing::warn!(spec = %path.display(), %error, "rule target transforms failed to load");
                            }
                            transforms.loaded.insert(path.clone(), loaded);
                        }
                        transforms.targets.insert(key, Ok(path));
                    }
                    Err(RemapError::SpecNotFound { .. }) => {
                        tracing::debug!(%reference, %category, "rule target not indexed; fallback transforms");
                    }
                    Err(error) => {
                        transforms.targets.insert(key, Err(error));
                    }
                }
            }
        }
        transforms
    }

    pub fn for_target(
        &self,
        category: RuleCategory,
        target: &TargetReference,
    ) -> Result<&TransformRegistry, RemapError> {
        let path = match self.targets.get(&(category, target.clone())) {
            None => return Ok(&self.fallback),
            Some(Err(error)) => return Err(error.clone()),
            Some(Ok(path)) => path,
        };
        match self.loaded.get(path) {
            Some(Ok(registry)) => Ok(registry),
            Some(Err(error)) => Err(error.clone()),
            None => Ok(&self.fallback),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    pub document: String,
    pub rule: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleFailure {
    pub document: String,
    pub rule: String,
    pub message: String,
    #[serde(skip)]
    pub error: RemapError,
}

/// Outcome of one category's selection.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub category: RuleCategory,
    pub target: Option<TargetReference>,
    /// The winning rule, if any.
    pub selected: Option<RuleMatch>,
    /// Every rule that matched, in evaluation order.
    pub matches: Vec<RuleMatch>,
    pub failures: Vec<RuleFailure>,
}

/// Evaluate every rule of `category`; the last match wins.
pub fn select_target(
    rule_set: &RuleSet,
    ctx: &StoreContext<'_>,
    category: RuleCategory,
    transforms: &RuleTransforms,
) -> Selection {
    let mut selection = Selection {
        category,
        target: None,
        selected: None,
        matches: Vec::new(),
        failures: Vec::new(),
    };
    for (file, rule) in rule_set.rules(category) {
        let outcome = transforms
            .for_target(category, &rule.target)
            .and_then(|registry| rule_matches(rule, ctx, registry));
        match outcome {
            Ok(true) => {
                tracing::debug!(rule = %rule.name, document = %file.document, %category, "rule matched");
                let hit = RuleMatch {
                    document: file.document.clone(),
                    rule: rule.name.clone(),
                };
                selection.target = Some(rule.target.clone());
                selection.selected = Some(hit.clone());
                selection.matches.push(hit);
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(rule = %rule.name, document = %file.document, %error, "rule failed");
                selection.failures.push(RuleFailure {
                    document: file.document.clone(),
                    rule: rule.name.clone(),
                    message: error.to_string(),
                    error,
                });
            }
        }
    }
    selection
}

/// Selections for every category.
pub fn select_all(
    rule_set: &RuleSet,
    ctx: &StoreContext<'_>,
    transforms: &RuleTransforms,
) -> Vec<Selection> {
    RuleCategory::ALL
        .into_iter()
        .map(|category| select_target(rule_set, ctx, category, transforms))
        .collect()
}

/// `Ok(false)` when a required binding is missing: the rule does not apply.
fn rule_matches(
    rule: &RuleItem,
    ctx: &StoreContext<'_>,
    registry: &TransformRegistry,
) -> Result<bool, RemapError> {
    let mut bindings = OutputTree::new();
    for (variable, input) in &rule.when {
        let field = format!("{}.{variable}", rule.name);
        let value = match resolve_input(input, variable, &field, ctx, &bindings, registry) {
            Ok(value) => value.unwrap_or(Value::Null),
            Err(RemapError::MissingRequiredInput { .. }) => {
                tracing::debug!(rule = %rule.name, %variable, "required binding missing; rule skipped");
                return Ok(false);
            }
            Err(error) => return Err(error),
        };
        let path = DottedPath::parse(variable)
            .map_err(|message| SchemaError::single(&rule.name, variable.as_str(), message))?;
        bindings.insert(&path, value);
    }
    match &rule.condition {
        Some(condition) => condition
            .evaluate(bindings.as_map())
            .map_err(|error| error.into_remap(&rule.name)),
        None => Ok(true),
    }
}

/// Rules directory of an addon root.
pub fn rules_dir(root: &Path) -> PathBuf {
    root.join("rules")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocuments;
    use crate::store::{MemoryStore, ParamFile};
    use crate::transform::{TransformCatalog, builtin_library};
    use serde_json::json;

    const RARE_SPEC: &str = "__meta__:\n  name: rare_info\n  version: \"1.0\"\n  description: d\n  category: info_spec\n  transforms_source: ../transforms/aliases.yaml\n";

    fn rule_file(value: Value, origin: &str) -> RuleFile {
        RuleFile::from_document(&value, origin).expect("valid rule file")
    }

    #[test]
    fn categories_round_trip_their_names() {
        for category in RuleCategory::ALL {
            assert_eq!(category.as_str().parse::<RuleCategory>(), Ok(category));
        }
        assert!("converter".parse::<RuleCategory>().is_err());
    }

    #[test]
    fn converter_rules_target_entrypoints() {
        let file = rule_file(
            json!({"converter_entrypoint": [{"name": "c", "use": "bruker_dti"}]}),
            "rules/a.yaml",
        );
        assert_eq!(
            file.converter_entrypoint[0].target,
            TargetReference::Entrypoint {
                name: "bruker_dti".to_string()
            }
        );
    }

    #[test]
    fn unbound_variables_are_rejected_at_load() {
        let err = RuleFile::from_document(
            &json!({"info_spec": [{
                "name": "rare",
                "when": {"method": {"sources": [{"file": "method", "key": "Method"}]}},
                "if": {"eq": ["$methd", "Bruker:RARE"]},
                "use": "rare_info"
            }]}),
            "rules/a.yaml",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RemapError::UnboundVariable { ref variable, .. } if variable == "methd"
        ));
    }

    #[test]
    fn unknown_categories_and_keys_are_schema_issues() {
        let err = validate_rule_file(&json!({
            "info": [],
            "info_spec": [{"name": "a", "use": "x", "extra": 1}],
            "converter_entrypoint": [{"name": "b", "use": "y", "version": "1"}]
        }))
        .unwrap_err();
        let paths: Vec<&str> = err.issues.iter().map(|issue| issue.path.as_str()).collect();
        assert_eq!(paths, ["info", "info_spec[0]", "converter_entrypoint[0].version"]);
    }

    #[test]
    fn last_match_wins_across_sorted_files() {
        let method = json!({"sources": [{"file": "method", "key": "Method"}]});
        let later = rule_file(
            json!({"info_spec": [{
                "name": "b", "when": {"m": method.clone()},
                "if": {"eq": ["$m", "Bruker:RARE"]}, "use": "b_spec"
            }]}),
            "rules/20-b.yaml",
        );
        let earlier = rule_file(
            json!({"info_spec": [{
                "name": "a", "when": {"m": method},
                "if": {"eq": ["$m", "Bruker:RARE"]}, "use": "a_spec", "version": "1.0"
            }]}),
            "rules/10-a.yaml",
        );
        let rules = RuleSet::new(vec![later, earlier]);
        let mut store = MemoryStore::new();
        store.set(ParamFile::Method, "Method", json!("Bruker:RARE"));
        let selection = select_target(
            &rules,
            &StoreContext::new(&store),
            RuleCategory::InfoSpec,
            &RuleTransforms::fixed(builtin_library()),
        );
        assert_eq!(
            selection.target,
            Some(TargetReference::Spec {
                reference: "b_spec".to_string(),
                version: None
            })
        );
        let order: Vec<&str> = selection.matches.iter().map(|m| m.rule.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn missing_required_binding_skips_rule_and_failures_are_recorded() {
        let file = rule_file(
            json!({"info_spec": [
                {"name": "base", "use": "base_spec"},
                {
                    "name": "needs_te",
                    "when": {"te": {"sources": [{"file": "method", "key": "PVM_EchoTime"}], "required": true}},
                    "use": "te_spec"
                },
                {
                    "name": "broken",
                    "when": {"m": {"const": "x", "transform": "to_int"}},
                    "use": "broken_spec"
                }
            ]}),
            "rules/a.yaml",
        );
        let store = MemoryStore::new();
        let selection = select_target(
            &RuleSet::new(vec![file]),
            &StoreContext::new(&store),
            RuleCategory::InfoSpec,
            &RuleTransforms::fixed(builtin_library()),
        );
        assert_eq!(selection.selected.map(|hit| hit.rule), Some("base".to_string()));
        assert_eq!(selection.failures.len(), 1);
        assert!(matches!(
            selection.failures[0].error,
            RemapError::TransformFailure { .. }
        ));
    }

    #[test]
    fn evaluation_type_mismatch_is_a_rule_failure() {
        let file = rule_file(
            json!({"metadata_spec": [{
                "name": "te",
                "when": {"te": {"const": "long"}},
                "if": {"gt": ["$te", 10]},
                "use": "te_spec"
            }]}),
            "rules/a.yaml",
        );
        let store = MemoryStore::new();
        let selection = select_target(
            &RuleSet::new(vec![file]),
            &StoreContext::new(&store),
            RuleCategory::MetadataSpec,
            &RuleTransforms::fixed(builtin_library()),
        );
        assert_eq!(selection.target, None);
        assert!(matches!(
            selection.failures[0].error,
            RemapError::TypeMismatch { ref rule, .. } if rule == "te"
        ));
    }

    #[test]
    fn spec_rules_bind_with_their_target_spec_transforms() {
        let docs = MemoryDocuments::new()
            .with("addon/transforms/aliases.yaml", "tidy: [strip, lower]\n")
            .with("addon/specs/rare_info.yaml", RARE_SPEC);
        let rules = RuleSet::new(vec![rule_file(
            json!({
                "info_spec": [{
                    "name": "rare",
                    "when": {
                        "m": {"sources": [{"file": "method", "key": "Method"}], "transform": "tidy"},
                        "p": {"const": "rare"}
                    },
                    "if": {"regex": ["$m", "$p"]},
                    "use": "rare_info"
                }],
                "converter_entrypoint": [{
                    "name": "conv",
                    "when": {"m": {"const": "x", "transform": "tidy"}},
                    "use": "bruker_default"
                }]
            }),
            "addon/rules/a.yaml",
        )]);
        let catalog = TransformCatalog::with_builtins();
        let index = SpecIndex::scan(&docs, Path::new("addon")).unwrap();
        let transforms = RuleTransforms::for_rule_set(
            &rules,
            &index,
            &SpecLoader::new(&docs, &catalog),
            catalog.default_registry(),
        );

        let mut store = MemoryStore::new();
        store.set(ParamFile::Method, "Method", json!(" Bruker:RARE "));
        let ctx = StoreContext::new(&store);
        let info = select_target(&rules, &ctx, RuleCategory::InfoSpec, &transforms);
        assert!(info.failures.is_empty(), "{:?}", info.failures);
        assert_eq!(info.selected.map(|hit| hit.rule), Some("rare".to_string()));

        // Entrypoint rules bind with the fallback registry, which has no `tidy`.
        let converter = select_target(&rules, &ctx, RuleCategory::ConverterEntrypoint, &transforms);
        assert_eq!(converter.target, None);
        assert!(matches!(
            converter.failures[0].error,
            RemapError::TransformFailure { ref transform, .. } if transform == "tidy"
        ));
    }

    #[test]
    fn unindexed_targets_fall_back_and_broken_targets_fail() {
        let docs = MemoryDocuments::new().with(
            "addon/specs/broken.yaml",
            "__meta__:\n  name: broken\n  version: 1\n  description: d\n  category: info_spec\n  transforms_source: nowhere.py\n",
        );
        let rules = RuleSet::new(vec![rule_file(
            json!({"info_spec": [
                {"name": "loose", "when": {"m": {"const": " A ", "transform": "strip"}}, "use": "not_indexed"},
                {"name": "bad", "use": "broken"}
            ]}),
            "addon/rules/a.yaml",
        )]);
        let catalog = TransformCatalog::with_builtins();
        let index = SpecIndex::scan(&docs, Path::new("addon")).unwrap();
        let transforms = RuleTransforms::for_rule_set(
            &rules,
            &index,
            &SpecLoader::new(&docs, &catalog),
            catalog.default_registry(),
        );
        let store = MemoryStore::new();
        let selection = select_target(
            &rules,
            &StoreContext::new(&store),
            RuleCategory::InfoSpec,
            &transforms,
        );
        assert_eq!(selection.selected.map(|hit| hit.rule), Some("loose".to_string()));
        assert_eq!(selection.failures.len(), 1);
        assert!(matches!(
            selection.failures[0].error,
            RemapError::UnknownTransformSource { ref source_ref, .. } if source_ref == "nowhere.py"
        ));
    }

    #[test]
    fn load_dir_sorts_by_file_name() {
        let docs = MemoryDocuments::new()
            .with("addon/rules/b.yaml", "info_spec:\n  - {name: b, use: b_spec}\n")
            .with("addon/rules/a.json", r#"{"info_spec": [{"name": "a", "use": "a_spec"}]}"#)
            .with("addon/rules/notes.txt", "ignored");
        let rules = RuleSet::load_dir(&docs, &rules_dir(Path::new("addon"))).unwrap();
        let names: Vec<&str> = rules
            .rules(RuleCategory::InfoSpec)
            .map(|(_, rule)| rule.name.as_str())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }
}
