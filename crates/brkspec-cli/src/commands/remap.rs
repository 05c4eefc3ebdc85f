use crate::support::{
    addon_root, catalog, exit_on_error, print_json_or_exit, print_resolution,
    read_store_or_exit, store_context,
};
use brkspec_kernel::{
    FsDocuments, Resolution, RuleCategory, RuleSet, RuleTransforms, Selection, SpecIndex,
    SpecLoader, TargetReference, resolve, rules_dir, select_target,
};
use serde::Serialize;

pub struct Args {
    pub store: String,
    pub root: Option<String>,
    pub category: String,
    pub scan_id: Option<u32>,
    pub reco_id: Option<u32>,
    pub allow_partial: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct RemapReport<'a> {
    selection: &'a Selection,
    spec: String,
    resolution: &'a Resolution,
}

pub fn run(args: Args) {
    let category = exit_on_error(args.category.parse::<RuleCategory>());
    if !category.targets_spec() {
        eprintln!("error: `{category}` does not select specs");
        std::process::exit(2);
    }
    let documents = FsDocuments;
    let catalog = catalog();
    let root = addon_root(args.root);
    let rules = exit_on_error(RuleSet::load_dir(&documents, &rules_dir(&root)));
    let store = read_store_or_exit(&args.store);
    let ctx = store_context(&store, args.scan_id, args.reco_id);

    let index = exit_on_error(SpecIndex::scan(&documents, &root));
    let loader = SpecLoader::new(&documents, &catalog);
    let transforms =
        RuleTransforms::for_rule_set(&rules, &index, &loader, catalog.default_registry());

    let selection = select_target(&rules, &ctx, category, &transforms);
    let Some(TargetReference::Spec { reference, version }) = selection.target.clone() else {
        eprintln!("error: no {category} rule matched");
        std::process::exit(1);
    };
    let spec_path = exit_on_error(index.resolve(&reference, category.as_str(), version.as_deref()));
    tracing::debug!(spec = %spec_path.display(), "selected spec");

    let spec = exit_on_error(loader.load(&spec_path));
    let resolution = exit_on_error(resolve(&spec, &ctx));

    if args.json {
        let report = RemapReport {
            selection: &selection,
            spec: spec_path.display().to_string(),
            resolution: &resolution,
        };
        print_json_or_exit(&report, "remap");
    } else {
        println!("brkspec remap");
        println!("  Root: {}", root.display());
        if let Some(hit) = &selection.selected {
            println!("  Rule: {} in {}", hit.rule, hit.document);
        }
        println!("  Spec: {}", spec_path.display());
        print_resolution(&resolution);
    }

    if !resolution.is_complete() && !args.allow_partial {
        std::process::exit(1);
    }
}
