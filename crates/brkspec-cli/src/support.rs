use brkspec_kernel::{
    DocumentSource, FsDocuments, MemoryStore, Resolution, StoreContext, TransformCatalog,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "BRKSPEC_LOG";
pub const ROOT_ENV: &str = "BRKSPEC_ROOT";

/// Events go to stderr so `--json` output stays parseable.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// `--root`, then `$BRKSPEC_ROOT`, then the working directory.
pub fn addon_root(root: Option<String>) -> PathBuf {
    root.or_else(|| std::env::var(ROOT_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Transforms available to specs run from the command line.
pub fn catalog() -> TransformCatalog {
    TransformCatalog::with_builtins()
}

pub fn read_document_or_exit(path: &str, label: &str) -> Value {
    FsDocuments.read_document(Path::new(path)).unwrap_or_else(|e| {
        eprintln!("error: failed to load {label}: {e}");
        std::process::exit(2);
    })
}

pub fn read_store_or_exit(path: &str) -> MemoryStore {
    let document = read_document_or_exit(path, "parameter snapshot");
    MemoryStore::from_value(document).unwrap_or_else(|e| {
        eprintln!("error: invalid parameter snapshot at {path}: {e}");
        std::process::exit(2);
    })
}

pub fn store_context(
    store: &MemoryStore,
    scan_id: Option<u32>,
    reco_id: Option<u32>,
) -> StoreContext<'_> {
    let mut ctx = StoreContext::new(store);
    if let Some(scan_id) = scan_id {
        ctx = ctx.with_scan_id(scan_id);
    }
    if let Some(reco_id) = reco_id {
        ctx = ctx.with_reco_id(reco_id);
    }
    ctx
}

pub fn exit_on_error<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(2);
    })
}

pub fn print_json_or_exit<T: Serialize>(value: &T, label: &str) {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|err| {
        eprintln!("error: failed to render {label} payload: {err}");
        std::process::exit(2);
    });
    println!("{rendered}");
}

/// Human summary of a resolution, shared by `resolve` and `remap`.
pub fn print_resolution(resolution: &Resolution) {
    println!("  Digest: {}", resolution.digest);
    println!("  Omitted fields: {}", resolution.omitted.len());
    println!("  Failed fields: {}", resolution.failures.len());
    for failure in &resolution.failures {
        println!("    - {}: {}", failure.field, failure.message);
    }
    match serde_json::to_string_pretty(&resolution.output) {
        Ok(rendered) => {
            println!("  Output:");
            for line in rendered.lines() {
                println!("    {line}");
            }
        }
        Err(err) => eprintln!("error: failed to render output: {err}"),
    }
}
