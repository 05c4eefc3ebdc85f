use serde_json::{Value, json};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "brkspec-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_brkspec<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_brkspec");
    Command::new(bin)
        .args(args)
        .env_remove("BRKSPEC_ROOT")
        .env_remove("BRKSPEC_LOG")
        .output()
        .expect("brkspec command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout should be JSON: {e}\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        )
    })
}

fn write(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent dir should be created");
    }
    fs::write(path, text).expect("file should be written");
}

/// A small addon root: two rule files, one spec with an include and a map.
fn write_addon(root: &Path) {
    write(
        &root.join("rules/10-any.yaml"),
        "info_spec:\n  - name: any\n    use: basic_info\nconverter_entrypoint:\n  - name: conv\n    use: bruker_default\n",
    );
    write(
        &root.join("rules/20-rare.yaml"),
        concat!(
            "info_spec:\n",
            "  - name: rare\n",
            "    when:\n",
            "      method:\n",
            "        sources: [{file: method, key: Method}]\n",
            "    if:\n",
            "      regex: [\"$method\", \"RARE\"]\n",
            "    use: rare_info\n",
        ),
    );
    write(
        &root.join("specs/common.yaml"),
        "subject.sex:\n  sources: [{file: subject, key: SUBJECT_sex}]\n",
    );
    write(
        &root.join("specs/rare_info.yaml"),
        concat!(
            "__meta__:\n",
            "  name: rare_info\n",
            "  version: \"1.0\"\n",
            "  description: RARE scans\n",
            "  category: info_spec\n",
            "  include: common.yaml\n",
            "  map_file: ../maps/rare.yaml\n",
            "method:\n",
            "  sources: [{file: method, key: Method}]\n",
            "  transform: lower\n",
            "te:\n",
            "  inputs:\n",
            "    te: {sources: [{file: method, key: PVM_EchoTime}], required: true}\n",
            "  transform: to_float\n",
        ),
    );
    write(
        &root.join("maps/rare.yaml"),
        "subject.sex:\n  values: {M: male, F: female}\n",
    );
    write(
        &root.join("scan.json"),
        &json!({
            "method": {"Method": "Bruker:RARE", "PVM_EchoTime": "11.5"},
            "subject": {"SUBJECT_sex": "F"}
        })
        .to_string(),
    );
}

#[test]
fn resolve_json_prints_the_output_tree() {
    let tmp = TempDirGuard::new("resolve");
    write_addon(tmp.path());
    let output = run_brkspec([
        OsStr::new("resolve"),
        tmp.path().join("specs/rare_info.yaml").as_os_str(),
        OsStr::new("--store"),
        tmp.path().join("scan.json").as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(
        payload["output"],
        json!({"subject": {"sex": "female"}, "method": "bruker:rare", "te": 11.5})
    );
    assert_eq!(payload["failures"], json!([]));
    assert_eq!(payload["digest"].as_str().map(str::len), Some(64));
}

#[test]
fn resolve_exits_one_on_failed_fields_unless_partial_is_allowed() {
    let tmp = TempDirGuard::new("partial");
    write_addon(tmp.path());
    write(&tmp.path().join("bare.json"), r#"{"method": {"Method": "Bruker:RARE"}}"#);
    let spec = tmp.path().join("specs/rare_info.yaml");
    let store = tmp.path().join("bare.json");

    let strict = run_brkspec([
        OsStr::new("resolve"),
        spec.as_os_str(),
        OsStr::new("--store"),
        store.as_os_str(),
    ]);
    assert_eq!(strict.status.code(), Some(1));
    assert!(stdout_text(&strict).contains("Failed fields: 1"));

    let partial = run_brkspec([
        OsStr::new("resolve"),
        spec.as_os_str(),
        OsStr::new("--store"),
        store.as_os_str(),
        OsStr::new("--allow-partial"),
        OsStr::new("--json"),
    ]);
    assert_success(&partial);
    let payload = parse_json_stdout(&partial);
    assert_eq!(payload["failures"][0]["field"], "te");
}

#[test]
fn select_reports_last_match_per_category() {
    let tmp = TempDirGuard::new("select");
    write_addon(tmp.path());
    let output = run_brkspec([
        OsStr::new("select"),
        OsStr::new("--store"),
        tmp.path().join("scan.json").as_os_str(),
        OsStr::new("--root"),
        tmp.path().as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload[0]["category"], "info_spec");
    assert_eq!(payload[0]["target"], json!({"kind": "spec", "reference": "rare_info"}));
    assert_eq!(payload[1]["target"], Value::Null);
    assert_eq!(
        payload[2]["target"],
        json!({"kind": "entrypoint", "name": "bruker_default"})
    );
}

#[test]
fn select_reads_root_from_environment() {
    let tmp = TempDirGuard::new("select-env");
    write_addon(tmp.path());
    let output = Command::new(env!("CARGO_BIN_EXE_brkspec"))
        .args([
            OsStr::new("select"),
            OsStr::new("--store"),
            tmp.path().join("scan.json").as_os_str(),
            OsStr::new("--category"),
            OsStr::new("converter_entrypoint"),
        ])
        .env("BRKSPEC_ROOT", tmp.path())
        .output()
        .expect("brkspec command should execute");
    assert_success(&output);
    let text = stdout_text(&output);
    assert!(text.contains("converter_entrypoint: bruker_default"), "{text}");
}

#[test]
fn remap_selects_and_resolves() {
    let tmp = TempDirGuard::new("remap");
    write_addon(tmp.path());
    let output = run_brkspec([
        OsStr::new("remap"),
        OsStr::new("--store"),
        tmp.path().join("scan.json").as_os_str(),
        OsStr::new("--root"),
        tmp.path().as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["selection"]["selected"]["rule"], "rare");
    assert_eq!(payload["resolution"]["output"]["method"], "bruker:rare");
}

#[test]
fn validate_commands_report_issues() {
    let tmp = TempDirGuard::new("validate");
    write_addon(tmp.path());
    write(&tmp.path().join("bad_map.yaml"), "sex:\n  type: lookup\n");
    write(
        &tmp.path().join("bad_rules.yaml"),
        "info_spec:\n  - name: r\n    if: {eq: [\"$x\", 1]}\n    use: s\n",
    );

    let ok = run_brkspec([
        OsStr::new("validate-spec"),
        tmp.path().join("specs/rare_info.yaml").as_os_str(),
    ]);
    assert_success(&ok);
    assert!(stdout_text(&ok).contains("Result: valid"));

    let bad_map = run_brkspec([
        OsStr::new("validate-map"),
        tmp.path().join("bad_map.yaml").as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_eq!(bad_map.status.code(), Some(1));
    let payload = parse_json_stdout(&bad_map);
    assert_eq!(payload["valid"], false);
    assert_eq!(payload["issues"][0]["path"], "sex.type");

    let bad_rules = run_brkspec([
        OsStr::new("validate-rules"),
        tmp.path().join("bad_rules.yaml").as_os_str(),
    ]);
    assert_eq!(bad_rules.status.code(), Some(1));
    assert!(stdout_text(&bad_rules).contains("`x` is not bound"));
}

#[test]
fn unreadable_inputs_exit_two() {
    let tmp = TempDirGuard::new("missing");
    let output = run_brkspec([
        OsStr::new("validate-map"),
        tmp.path().join("nope.yaml").as_os_str(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}
