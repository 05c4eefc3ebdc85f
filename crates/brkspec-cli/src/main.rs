//! brkspec CLI: the `brkspec` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_tracing(cli.verbose);

    match cli.command {
        Commands::Resolve {
            spec,
            store,
            map,
            scan_id,
            reco_id,
            study,
            allow_partial,
            json,
        } => commands::resolve::run(commands::resolve::Args {
            spec,
            store,
            map,
            scan_id,
            reco_id,
            study,
            allow_partial,
            json,
        }),

        Commands::Select {
            store,
            root,
            category,
            scan_id,
            reco_id,
            json,
        } => commands::select::run(store, root, category, scan_id, reco_id, json),

        Commands::Remap {
            store,
            root,
            category,
            scan_id,
            reco_id,
            allow_partial,
            json,
        } => commands::remap::run(commands::remap::Args {
            store,
            root,
            category,
            scan_id,
            reco_id,
            allow_partial,
            json,
        }),

        Commands::ValidateSpec { path, json } => commands::validate::run_spec(path, json),

        Commands::ValidateMap { path, json } => commands::validate::run_map(path, json),

        Commands::ValidateRules { path, json } => commands::validate::run_rules(path, json),
    }
}
