use crate::support::{
    catalog, exit_on_error, print_json_or_exit, print_resolution, read_store_or_exit,
    store_context,
};
use brkspec_kernel::{FsDocuments, SpecLoader, resolve_with_map};

pub struct Args {
    pub spec: String,
    pub store: String,
    pub map: Option<String>,
    pub scan_id: Option<u32>,
    pub reco_id: Option<u32>,
    pub study: bool,
    pub allow_partial: bool,
    pub json: bool,
}

pub fn run(args: Args) {
    let documents = FsDocuments;
    let catalog = catalog();
    let loader = SpecLoader::new(&documents, &catalog);
    let spec = exit_on_error(loader.load(&args.spec));
    let explicit_map = args
        .map
        .as_deref()
        .map(|path| exit_on_error(loader.load_map_file(path)));
    let store = read_store_or_exit(&args.store);
    let mut ctx = store_context(&store, args.scan_id, args.reco_id);
    if args.study {
        ctx = ctx.study();
    }

    let map = explicit_map.as_ref().or(spec.map.as_ref());
    let resolution = exit_on_error(resolve_with_map(&spec, &ctx, map));

    if args.json {
        print_json_or_exit(&resolution, "resolution");
    } else {
        println!("brkspec resolve");
        println!("  Spec: {} ({} {})", args.spec, spec.spec.meta.name, spec.spec.meta.version);
        println!("  Store: {}", args.store);
        if let Some(map) = map {
            println!("  Map file: {}", map.document);
        }
        print_resolution(&resolution);
    }

    if !resolution.is_complete() && !args.allow_partial {
        std::process::exit(1);
    }
}
