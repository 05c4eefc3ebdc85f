//! Transform registry: a name-to-callable table built once per spec.
//!
//! Transforms receive either named arguments (the first transform of an
//! `inputs` field) or one positional value (every other call site). Hosts
//! register libraries in a [`TransformCatalog`]; a spec's `transforms_source`
//! entries pick libraries from it, later libraries overriding earlier ones.

use crate::error::RemapError;
use crate::value::text_form;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const BUILTIN_LIBRARY: &str = "builtin";

/// Arguments handed to a transform.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformArgs {
    Named(Map<String, Value>),
    Positional(Value),
}

impl TransformArgs {
    /// The single value this call carries: the positional value, or the only
    /// named argument.
    pub fn single(self) -> Result<Value, String> {
        match self {
            TransformArgs::Positional(value) => Ok(value),
            TransformArgs::Named(mut named) if named.len() == 1 => {
                let key = named.keys().next().cloned().unwrap_or_default();
                Ok(named.remove(&key).unwrap_or(Value::Null))
            }
            TransformArgs::Named(named) => Err(format!(
                "expected one argument, got {} named arguments",
                named.len()
            )),
        }
    }
}

pub type TransformFn = dyn Fn(TransformArgs) -> Result<Value, String> + Send + Sync;

/// One registered transform.
#[derive(Clone)]
pub struct Transform {
    name: String,
    required: Option<Vec<String>>,
    optional: Vec<String>,
    func: Arc<TransformFn>,
}

impl Transform {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(TransformArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            required: None,
            optional: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// Declare the named parameters this transform accepts. Named calls are
    /// then checked for extra and missing arguments before the call.
    pub fn with_params(mut self, required: &[&str], optional: &[&str]) -> Self {
        self.required = Some(required.iter().map(|name| name.to_string()).collect());
        self.optional = optional.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: TransformArgs) -> Result<Value, String> {
        if let (Some(required), TransformArgs::Named(named)) = (&self.required, &args) {
            let extra: Vec<&str> = named
                .keys()
                .filter(|key| !required.contains(*key) && !self.optional.contains(*key))
                .map(String::as_str)
                .collect();
            let missing: Vec<&str> = required
                .iter()
                .filter(|name| !named.contains_key(*name))
                .map(String::as_str)
                .collect();
            if !extra.is_empty() || !missing.is_empty() {
                return Err(format!(
                    "argument mismatch: extra={extra:?} missing={missing:?}"
                ));
            }
        }
        (self.func)(args)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

/// A transform name, or an ordered chain of names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformChain(Vec<String>);

impl TransformChain {
    pub fn new(names: Vec<String>) -> Result<Self, String> {
        if names.is_empty() {
            return Err("transform chain cannot be empty".to_string());
        }
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err("transform names must be non-empty".to_string());
        }
        Ok(Self(names))
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(name) => Self::new(vec![name.clone()]),
            Value::Array(items) => {
                let names = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| "transform list must contain only strings".to_string())
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::new(names)
            }
            _ => Err("transform must be a string or list of strings".to_string()),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

/// Name-to-transform table. Immutable once a spec is loaded.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, Transform>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, transform: Transform) {
        self.transforms.insert(transform.name.clone(), transform);
    }

    pub fn register<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: Fn(TransformArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.insert(Transform::new(name, func));
        self
    }

    /// Merge `other` in; its bindings replace same-named ones.
    pub fn extend(&mut self, other: &TransformRegistry) {
        for transform in other.transforms.values() {
            self.insert(transform.clone());
        }
    }

    /// Bind `name` to a chain of already registered transforms.
    pub fn alias(&mut self, name: &str, chain: &TransformChain) -> Result<(), String> {
        let steps = chain
            .names()
            .iter()
            .map(|step| {
                self.transforms
                    .get(step)
                    .cloned()
                    .ok_or_else(|| format!("alias `{name}` refers to unknown transform `{step}`"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.register(name, move |args| {
            let mut steps = steps.iter();
            let mut value = match steps.next() {
                Some(first) => first.call(args)?,
                None => args.single()?,
            };
            for step in steps {
                value = step.call(TransformArgs::Positional(value))?;
            }
            Ok(value)
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.transforms.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    fn call(&self, name: &str, args: TransformArgs, field: &str) -> Result<Value, RemapError> {
        let transform = self.get(name).ok_or_else(|| RemapError::TransformFailure {
            transform: name.to_string(),
            field: field.to_string(),
            message: "unknown transform".to_string(),
        })?;
        transform.call(args).map_err(|message| RemapError::TransformFailure {
            transform: name.to_string(),
            field: field.to_string(),
            message,
        })
    }

    /// Feed `value` through every transform in order, positionally.
    pub fn apply_positional(
        &self,
        chain: &TransformChain,
        value: Value,
        field: &str,
    ) -> Result<Value, RemapError> {
        chain.names().iter().try_fold(value, |value, name| {
            self.call(name, TransformArgs::Positional(value), field)
        })
    }

    /// Call the first transform with named inputs, then pipe its result
    /// positionally through the rest.
    pub fn apply_named(
        &self,
        chain: &TransformChain,
        inputs: Map<String, Value>,
        field: &str,
    ) -> Result<Value, RemapError> {
        let (head, tail) = chain
            .names()
            .split_first()
            .ok_or_else(|| RemapError::TransformFailure {
                transform: String::new(),
                field: field.to_string(),
                message: "transform chain cannot be empty".to_string(),
            })?;
        let first = self.call(head, TransformArgs::Named(inputs), field)?;
        tail.iter().try_fold(first, |value, name| {
            self.call(name, TransformArgs::Positional(value), field)
        })
    }
}

/// Transform libraries a host makes available to specs.
#[derive(Debug, Clone, Default)]
pub struct TransformCatalog {
    libraries: BTreeMap<String, TransformRegistry>,
}

impl TransformCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding only the `builtin` library.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.add_library(BUILTIN_LIBRARY, builtin_library());
        catalog
    }

    pub fn add_library(&mut self, name: impl Into<String>, library: TransformRegistry) {
        self.libraries.insert(name.into(), library);
    }

    /// Find the library for a declared `transforms_source`: by the exact
    /// string first, then by file stem (`lib/scan_tools.py` -> `scan_tools`).
    pub fn library(&self, declared: &str) -> Option<&TransformRegistry> {
        if let Some(library) = self.libraries.get(declared) {
            return Some(library);
        }
        let stem = Path::new(declared).file_stem()?.to_str()?;
        self.libraries.get(stem)
    }

    /// Builtins, used when a spec declares no transform sources.
    pub fn default_registry(&self) -> TransformRegistry {
        self.libraries
            .get(BUILTIN_LIBRARY)
            .cloned()
            .unwrap_or_default()
    }
}

/// Small general-purpose transforms every catalog can offer.
pub fn builtin_library() -> TransformRegistry {
    let mut registry = TransformRegistry::new();
    registry
        .register("identity", |args| args.single())
        .register("first", |args| {
            Ok(match args.single()? {
                Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
                other => other,
            })
        })
        .register("last", |args| {
            Ok(match args.single()? {
                Value::Array(items) => items.into_iter().next_back().unwrap_or(Value::Null),
                other => other,
            })
        })
        .register("unwrap", |args| {
            Ok(match args.single()? {
                Value::Array(mut items) if items.len() == 1 => items.remove(0),
                other => other,
            })
        })
        .register("upper", |args| map_text(args, |text| text.to_uppercase()))
        .register("lower", |args| map_text(args, |text| text.to_lowercase()))
        .register("strip", |args| map_text(args, |text| text.trim().to_string()))
        .register("to_string", |args| Ok(Value::String(text_form(&args.single()?))))
        .register("to_int", |args| {
            let value = args.single()?;
            let int = match &value {
                Value::Number(number) => number
                    .as_i64()
                    .or_else(|| number.as_f64().map(|float| float.trunc() as i64)),
                Value::String(text) => text.trim().parse::<i64>().ok(),
                Value::Bool(flag) => Some(i64::from(*flag)),
                _ => None,
            };
            int.map(Value::from)
                .ok_or_else(|| format!("cannot convert {value} to an integer"))
        })
        .register("to_float", |args| {
            let value = args.single()?;
            let float = match &value {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => text.trim().parse::<f64>().ok(),
                _ => None,
            };
            float
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("cannot convert {value} to a float"))
        })
        .register("length", |args| match args.single()? {
            Value::Array(items) => Ok(Value::from(items.len())),
            Value::String(text) => Ok(Value::from(text.chars().count())),
            other => Err(format!("no length for {other}")),
        })
        .register("join", |args| {
            let parts: Vec<String> = match args {
                TransformArgs::Named(named) => named
                    .values()
                    .filter(|value| !value.is_null())
                    .map(text_form)
                    .collect(),
                TransformArgs::Positional(Value::Array(items)) => {
                    items.iter().map(text_form).collect()
                }
                TransformArgs::Positional(other) => vec![text_form(&other)],
            };
            Ok(Value::String(parts.join("_")))
        });
    registry
}

fn map_text(args: TransformArgs, op: impl Fn(&str) -> String) -> Result<Value, String> {
    match args.single()? {
        Value::String(text) => Ok(Value::String(op(&text))),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => Ok(Value::String(op(&text))),
                other => Err(format!("expected text, got {other}")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Err(format!("expected text, got {other}")),
    }
}
