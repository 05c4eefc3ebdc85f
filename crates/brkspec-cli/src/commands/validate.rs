use crate::support::{catalog, print_json_or_exit, read_document_or_exit};
use brkspec_kernel::{
    FsDocuments, RemapError, SchemaError, SchemaIssue, SpecLoader, validate_map_file,
    validate_rule_file,
};
use serde::Serialize;

#[derive(Serialize)]
struct ValidationReport {
    document: String,
    kind: &'static str,
    valid: bool,
    issues: Vec<SchemaIssue>,
}

/// Full load: includes, transform sources, and the bound map file.
pub fn run_spec(path: String, json_output: bool) {
    let documents = FsDocuments;
    let catalog = catalog();
    let issues = match SpecLoader::new(&documents, &catalog).load(&path) {
        Ok(_) => Vec::new(),
        Err(RemapError::Schema(error)) => error.issues,
        Err(error @ (RemapError::Io { .. } | RemapError::Parse { .. })) => {
            eprintln!("error: {error}");
            std::process::exit(2);
        }
        Err(other) => vec![SchemaIssue {
            path: String::new(),
            message: other.to_string(),
        }],
    };
    report(path, "spec", issues, json_output);
}

pub fn run_map(path: String, json_output: bool) {
    let document = read_document_or_exit(&path, "map file");
    report(path, "map", schema_issues(validate_map_file(&document)), json_output);
}

pub fn run_rules(path: String, json_output: bool) {
    let document = read_document_or_exit(&path, "rule file");
    report(path, "rules", schema_issues(validate_rule_file(&document)), json_output);
}

fn schema_issues(result: Result<(), SchemaError>) -> Vec<SchemaIssue> {
    result.err().map(|error| error.issues).unwrap_or_default()
}

fn report(document: String, kind: &'static str, issues: Vec<SchemaIssue>, json_output: bool) {
    let report = ValidationReport {
        document,
        kind,
        valid: issues.is_empty(),
        issues,
    };
    if json_output {
        print_json_or_exit(&report, "validation");
    } else {
        println!("brkspec validate-{kind}");
        println!("  Document: {}", report.document);
        println!("  Result: {}", if report.valid { "valid" } else { "invalid" });
        for issue in &report.issues {
            if issue.path.is_empty() {
                println!("    - {}", issue.message);
            } else {
                println!("    - {}: {}", issue.path, issue.message);
            }
        }
    }
    if !report.valid {
        std::process::exit(1);
    }
}
