use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "brkspec",
    about = "brkspec: declarative parameter remapping and rule-based spec selection",
    version
)]
pub struct Cli {
    /// Log debug events to stderr (overrides BRKSPEC_LOG)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve one spec against a parameter snapshot
    Resolve {
        /// Spec document (YAML or JSON)
        spec: String,

        /// Parameter snapshot (JSON or YAML, keyed by parameter file)
        #[arg(long)]
        store: String,

        /// Map file to apply instead of the spec's own map_file
        #[arg(long)]
        map: Option<String>,

        /// Scan id visible to map conditions
        #[arg(long)]
        scan_id: Option<u32>,

        /// Reco id used for reco-scoped parameters
        #[arg(long)]
        reco_id: Option<u32>,

        /// Resolve a study-level record (subject parameters only)
        #[arg(long)]
        study: bool,

        /// Exit 0 even when some fields failed
        #[arg(long)]
        allow_partial: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate rules and report the selected target per category
    Select {
        /// Parameter snapshot (JSON or YAML, keyed by parameter file)
        #[arg(long)]
        store: String,

        /// Addon root holding rules/ and specs/ (default: $BRKSPEC_ROOT or .)
        #[arg(long)]
        root: Option<String>,

        /// Only this category: info_spec, metadata_spec, or converter_entrypoint
        #[arg(long)]
        category: Option<String>,

        /// Scan id
        #[arg(long)]
        scan_id: Option<u32>,

        /// Reco id
        #[arg(long)]
        reco_id: Option<u32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Select a spec by rules, then resolve it
    Remap {
        /// Parameter snapshot (JSON or YAML, keyed by parameter file)
        #[arg(long)]
        store: String,

        /// Addon root holding rules/ and specs/ (default: $BRKSPEC_ROOT or .)
        #[arg(long)]
        root: Option<String>,

        /// Spec category to select: info_spec or metadata_spec
        #[arg(long, default_value = "info_spec")]
        category: String,

        /// Scan id
        #[arg(long)]
        scan_id: Option<u32>,

        /// Reco id
        #[arg(long)]
        reco_id: Option<u32>,

        /// Exit 0 even when some fields failed
        #[arg(long)]
        allow_partial: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a spec document, including its includes and map file
    ValidateSpec {
        /// Spec document
        path: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a map file
    ValidateMap {
        /// Map file
        path: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a rule file
    ValidateRules {
        /// Rule file
        path: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
