use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use glmarshal_contracts::CLASSIFY_REPORT_SCHEMA_VERSION;

fn fixture_registry() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../glmarshal-core/tests/fixtures/mini_gl.xml")
}

fn glmarshal(args: &[&std::ffi::OsStr]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_glmarshal"))
        .args(args)
        .output()
        .expect("run glmarshal")
}

fn generate_args(dir: &Path, registry: &Path) -> Vec<std::ffi::OsString> {
    vec![
        "generate".into(),
        "--registry".into(),
        registry.into(),
        "--out-c".into(),
        dir.join("glm_commands.c").into(),
        "--out-h".into(),
        dir.join("glm_commands.h").into(),
        "--out-manifest".into(),
        dir.join("glm_commands.csv").into(),
    ]
}

fn run(args: &[std::ffi::OsString]) -> Output {
    let refs: Vec<&std::ffi::OsStr> = args.iter().map(|a| a.as_os_str()).collect();
    glmarshal(&refs)
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "status={}\nstderr={}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn cli_generate_writes_all_artifacts_and_check_passes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = fixture_registry();
    let args = generate_args(dir.path(), &registry);

    let out = run(&args);
    assert_success(&out);

    let c = std::fs::read_to_string(dir.path().join("glm_commands.c")).expect("read .c");
    assert!(c.contains("#include \"glm_commands.h\"\n"));
    assert!(c.contains("GLM_EXPORT void glClear(GLbitfield mask) {\n"));
    let h = std::fs::read_to_string(dir.path().join("glm_commands.h")).expect("read .h");
    assert!(h.contains("  GLM_CMD_glVertexAttribPointer = 20,\n"));
    let m = std::fs::read_to_string(dir.path().join("glm_commands.csv")).expect("read manifest");
    assert_eq!(m.lines().count(), 20);
    assert!(m.contains("glGenBuffers,gen,9\n"));

    let mut check = args.clone();
    check.push("--check".into());
    assert_success(&run(&check));

    std::fs::write(dir.path().join("glm_commands.csv"), "stale\n").expect("clobber manifest");
    let out = run(&check);
    assert!(!out.status.success(), "check must fail on stale output");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("generated output differs"), "{stderr}");
}

#[test]
fn cli_generate_json_manifest_with_extensions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = fixture_registry();
    let mut args = generate_args(dir.path(), &registry);
    args.pop();
    args.push(dir.path().join("manifest.json").into());
    args.push("--extensions".into());

    assert_success(&run(&args));
    let bytes = std::fs::read(dir.path().join("manifest.json")).expect("read manifest");
    let v: serde_json::Value = serde_json::from_slice(&bytes).expect("parse manifest");
    let fns = v.get("functions").and_then(|f| f.as_array()).expect("functions");
    assert_eq!(fns.len(), 21);
    assert!(fns.iter().any(|f| {
        f.get("name").and_then(|n| n.as_str()) == Some("glBlendEquationEXT")
            && f.get("type").and_then(|t| t.as_str()) == Some("alias")
    }));
}

#[test]
fn cli_generate_reports_coded_diagnostic_and_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = dir.path().join("bad.json");
    std::fs::write(
        &registry,
        r#"{
  "schema_version": "glmarshal.registry@0.1.0",
  "commands": [
    { "name": "glGenThings", "return_type": "void",
      "params": [ { "type": "GLsizei", "name": "n" } ] }
  ],
  "features": [ { "name": "GL_VERSION_1_0", "api": "gl", "commands": ["glGenThings"] } ]
}"#,
    )
    .expect("write registry");

    let out = run(&generate_args(dir.path(), &registry));
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("GLM0200"), "{stderr}");
    assert!(stderr.contains("glGenThings"), "{stderr}");
    assert!(!dir.path().join("glm_commands.c").exists());
    assert!(!dir.path().join("glm_commands.h").exists());
    assert!(!dir.path().join("glm_commands.csv").exists());
}

#[test]
fn cli_classify_prints_report() {
    let registry = fixture_registry();
    let out = run(&[
        "classify".into(),
        "--registry".into(),
        registry.into(),
    ]);
    assert_success(&out);

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse report");
    assert_eq!(
        v.get("schema_version").and_then(|s| s.as_str()),
        Some(CLASSIFY_REPORT_SCHEMA_VERSION)
    );
    let fns = v.get("functions").and_then(|f| f.as_array()).expect("functions");
    let gen = fns
        .iter()
        .find(|f| f.get("name").and_then(|n| n.as_str()) == Some("glGenBuffers"))
        .expect("glGenBuffers row");
    assert_eq!(
        gen.get("classification").and_then(|c| c.as_str()),
        Some("generator_allocate")
    );
    assert_eq!(
        gen.get("prototype").and_then(|p| p.as_str()),
        Some("void glGenBuffers(GLsizei n, GLuint *buffers)")
    );
}

#[test]
fn cli_diagnostics_prints_catalog() {
    let out = run(&["diagnostics".into()]);
    assert_success(&out);
    let md = String::from_utf8_lossy(&out.stdout);
    assert!(md.starts_with("# glmarshal diagnostics catalog"));
    assert!(md.contains("| GLM0201 |"));
}
