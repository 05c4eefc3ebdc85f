use crate::support::{
    addon_root, catalog, exit_on_error, print_json_or_exit, read_store_or_exit, store_context,
};
use brkspec_kernel::{
    FsDocuments, RuleCategory, RuleSet, RuleTransforms, SpecIndex, SpecLoader, TargetReference,
    rules_dir, select_all, select_target,
};

pub fn run(
    store_path: String,
    root: Option<String>,
    category: Option<String>,
    scan_id: Option<u32>,
    reco_id: Option<u32>,
    json_output: bool,
) {
    let category = category.map(|raw| exit_on_error(raw.parse::<RuleCategory>()));
    let root = addon_root(root);
    let documents = FsDocuments;
    let catalog = catalog();
    let rules = exit_on_error(RuleSet::load_dir(&documents, &rules_dir(&root)));
    let index = exit_on_error(SpecIndex::scan(&documents, &root));
    let transforms = RuleTransforms::for_rule_set(
        &rules,
        &index,
        &SpecLoader::new(&documents, &catalog),
        catalog.default_registry(),
    );
    let store = read_store_or_exit(&store_path);
    let ctx = store_context(&store, scan_id, reco_id);

    let selections = match category {
        Some(category) => vec![select_target(&rules, &ctx, category, &transforms)],
        None => select_all(&rules, &ctx, &transforms),
    };

    if json_output {
        print_json_or_exit(&selections, "selection");
    } else {
        println!("brkspec select");
        println!("  Root: {}", root.display());
        println!("  Rule files: {}", rules.files().len());
        for selection in &selections {
            let target = match &selection.target {
                Some(TargetReference::Spec {
                    reference,
                    version: Some(version),
                }) => format!("{reference} (version {version})"),
                Some(TargetReference::Spec { reference, .. }) => reference.clone(),
                Some(TargetReference::Entrypoint { name }) => name.clone(),
                None => "(none)".to_string(),
            };
            println!("  {}: {target}", selection.category);
            if let Some(hit) = &selection.selected {
                println!("    Rule: {} in {}", hit.rule, hit.document);
            }
            for failure in &selection.failures {
                println!("    Failed rule {}: {}", failure.rule, failure.message);
            }
        }
    }

    if category.is_some() && selections.iter().all(|selection| selection.target.is_none()) {
        std::process::exit(1);
    }
}
