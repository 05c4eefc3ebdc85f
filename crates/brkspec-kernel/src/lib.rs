//! # brkspec Kernel
//!
//! Declarative remapping of acquisition parameters into structured records.
//! A spec names, per output field, where values come from and how they are
//! transformed; a map file rewrites the result; rules pick which spec or
//! converter applies to a scan.
//!
//! The kernel is **store-agnostic**: it never parses instrument parameter
//! files. Values arrive through [`ParameterStore`], and definition documents
//! through [`DocumentSource`].
//!
//! ## Architecture
//!
//! ```text
//! ParameterStore        ← (file, key, reco_id?) → value
//!     │
//! SourceSelector        ← first present value in declared order
//!     │
//! InputSpec             ← sources | const | ref, default, required
//!     │
//! FieldRule             ← sources | inputs, transform chain
//!     │
//! SpecLoader            ← include merge, transforms, bound map file
//!     │
//! resolve               ← Output Tree, then the map file
//!
//! RuleSet ─ select_target  ← when/if/use, last match wins per category;
//!                             bindings use the target spec's transforms
//! ```

pub mod condition;
pub mod document;
pub mod error;
pub mod field;
pub mod input;
pub mod loader;
pub mod mapfile;
pub mod path;
pub mod resolve;
pub mod rules;
pub mod source;
pub mod spec;
pub mod spec_index;
pub mod store;
pub mod transform;
pub mod value;

pub use condition::{Condition, EvalError, RuleExpr};
pub use document::{DocumentSource, FsDocuments, MemoryDocuments, parse_document};
pub use error::{RemapError, SchemaError, SchemaIssue};
pub use field::{FieldOrigin, FieldRule, resolve_field};
pub use input::{InputOrigin, InputSpec, resolve_input};
pub use loader::{LoadedSpec, SpecLoader};
pub use mapfile::{MapFile, MapRule, apply_map, validate_map_file};
pub use path::{DottedPath, OutputTree};
pub use resolve::{FieldFailure, Resolution, resolve, resolve_with_map};
pub use rules::{
    RuleCategory, RuleFile, RuleSet, RuleTransforms, Selection, TargetReference, rules_dir,
    select_all, select_target, validate_rule_file,
};
pub use source::{SourceSelector, resolve_sources};
pub use spec::{IncludeMode, Spec, SpecMeta, validate_spec};
pub use spec_index::{SpecEntry, SpecIndex, specs_dir};
pub use store::{MemoryStore, ParamFile, ParameterStore, ResolveScope, StoreContext};
pub use transform::{
    Transform, TransformArgs, TransformCatalog, TransformChain, TransformRegistry, builtin_library,
};
