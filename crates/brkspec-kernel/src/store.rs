//! Parameter store interface.
//!
//! The instrument parameter reader lives outside the kernel. Resolution only
//! needs keyed lookups against one scan (or study) snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Parameter file kinds a source selector may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamFile {
    Method,
    Acqp,
    VisuPars,
    Reco,
    Subject,
}

impl ParamFile {
    pub const ALL: [ParamFile; 5] = [
        ParamFile::Method,
        ParamFile::Acqp,
        ParamFile::VisuPars,
        ParamFile::Reco,
        ParamFile::Subject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamFile::Method => "method",
            ParamFile::Acqp => "acqp",
            ParamFile::VisuPars => "visu_pars",
            ParamFile::Reco => "reco",
            ParamFile::Subject => "subject",
        }
    }

    /// Files stored once per reconstruction rather than once per scan.
    pub fn is_reco_scoped(self) -> bool {
        matches!(self, ParamFile::VisuPars | ParamFile::Reco)
    }
}

impl fmt::Display for ParamFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamFile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamFile::ALL
            .into_iter()
            .find(|file| file.as_str() == s)
            .ok_or_else(|| format!("unknown parameter file `{s}`"))
    }
}

/// Keyed, read-only access to one parameter snapshot.
pub trait ParameterStore: Send + Sync {
    fn lookup(&self, file: ParamFile, key: &str, reco_id: Option<u32>) -> Option<Value>;
}

/// What kind of object a resolution run describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolveScope {
    #[default]
    Scan,
    /// Study-level records may only read `subject` parameters.
    Study,
}

/// One scan's store plus the ids map rules can match on.
#[derive(Clone, Copy)]
pub struct StoreContext<'a> {
    pub store: &'a dyn ParameterStore,
    pub scan_id: Option<u32>,
    pub reco_id: Option<u32>,
    pub scope: ResolveScope,
}

impl<'a> StoreContext<'a> {
    pub fn new(store: &'a dyn ParameterStore) -> Self {
        Self {
            store,
            scan_id: None,
            reco_id: None,
            scope: ResolveScope::Scan,
        }
    }

    pub fn with_scan_id(mut self, scan_id: u32) -> Self {
        self.scan_id = Some(scan_id);
        self
    }

    pub fn with_reco_id(mut self, reco_id: u32) -> Self {
        self.reco_id = Some(reco_id);
        self
    }

    pub fn study(mut self) -> Self {
        self.scope = ResolveScope::Study;
        self
    }

    /// Look up a key; a selector without a reco id falls back to the context's.
    pub fn lookup(&self, file: ParamFile, key: &str, reco_id: Option<u32>) -> Option<Value> {
        self.store.lookup(file, key, reco_id.or(self.reco_id))
    }
}

impl fmt::Debug for StoreContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("scan_id", &self.scan_id)
            .field("reco_id", &self.reco_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// An in-memory parameter snapshot.
///
/// JSON shape:
/// ```text
/// {
///   "method":    { "Method": "Bruker:RARE", ... },
///   "acqp":      { ... },
///   "subject":   { ... },
///   "visu_pars": { "1": { ... }, "2": { ... } },
///   "reco":      { "1": { ... } }
/// }
/// ```
/// Reco-scoped files are keyed by reco id. Without a reco id, a reco-scoped
/// lookup succeeds only when exactly one reco is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub method: Map<String, Value>,
    #[serde(default)]
    pub acqp: Map<String, Value>,
    #[serde(default)]
    pub subject: Map<String, Value>,
    #[serde(default)]
    pub visu_pars: Map<String, Value>,
    #[serde(default)]
    pub reco: Map<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Set a scan-level parameter (`method`, `acqp`, `subject`).
    pub fn set(&mut self, file: ParamFile, key: &str, value: Value) -> &mut Self {
        match file {
            ParamFile::Method => self.method.insert(key.to_string(), value),
            ParamFile::Acqp => self.acqp.insert(key.to_string(), value),
            ParamFile::Subject => self.subject.insert(key.to_string(), value),
            ParamFile::VisuPars | ParamFile::Reco => return self.set_reco(file, 1, key, value),
        };
        self
    }

    /// Set a reco-scoped parameter (`visu_pars`, `reco`).
    pub fn set_reco(&mut self, file: ParamFile, reco_id: u32, key: &str, value: Value) -> &mut Self {
        let table = match file {
            ParamFile::VisuPars => &mut self.visu_pars,
            ParamFile::Reco => &mut self.reco,
            other => return self.set(other, key, value),
        };
        let entry = table
            .entry(reco_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(params) = entry {
            params.insert(key.to_string(), value);
        }
        self
    }

    fn table(&self, file: ParamFile, reco_id: Option<u32>) -> Option<&Map<String, Value>> {
        let scoped = match file {
            ParamFile::Method => return Some(&self.method),
            ParamFile::Acqp => return Some(&self.acqp),
            ParamFile::Subject => return Some(&self.subject),
            ParamFile::VisuPars => &self.visu_pars,
            ParamFile::Reco => &self.reco,
        };
        let entry = match reco_id {
            Some(id) => scoped.get(&id.to_string())?,
            None if scoped.len() == 1 => scoped.values().next()?,
            None => return None,
        };
        entry.as_object()
    }
}

impl ParameterStore for MemoryStore {
    fn lookup(&self, file: ParamFile, key: &str, reco_id: Option<u32>) -> Option<Value> {
        self.table(file, reco_id)?.get(key).cloned()
    }
}
