use std::path::PathBuf;

use glmarshal_core::classify::Classification;
use glmarshal_core::ctype::CType;
use glmarshal_core::diagnostics::{Diagnostic, DiagnosticCode};
use glmarshal_core::functions::FunctionSpec;
use glmarshal_core::overrides::OverrideTables;
use glmarshal_core::pipeline::classify_registry;
use glmarshal_core::registry::{Command, CommandParam, FeatureGroup, Registry};

fn fixture() -> Registry {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/mini_gl.xml");
    Registry::load(&path, None).expect("load fixture registry")
}

fn classify(reg: &Registry, tables: &OverrideTables) -> Vec<FunctionSpec> {
    classify_registry(reg, tables).expect("classify registry")
}

fn find<'a>(fns: &'a [FunctionSpec], name: &str) -> &'a FunctionSpec {
    fns.iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("{name} not selected"))
}

fn cmd(name: &str, ret: &str, params: &[(&str, &str, Option<&str>)]) -> Command {
    Command {
        name: name.to_string(),
        return_type: CType::parse(ret),
        params: params
            .iter()
            .map(|(ty, pname, len)| CommandParam {
                ty: CType::parse(ty),
                name: pname.to_string(),
                len: len.map(str::to_string),
                group: None,
            })
            .collect(),
        alias: None,
    }
}

fn single_feature(commands: Vec<Command>) -> Registry {
    let names = commands.iter().map(|c| c.name.clone()).collect();
    Registry::from_parts(
        commands,
        vec![FeatureGroup {
            name: "GL_VERSION_1_0".to_string(),
            api: Some("gl".to_string()),
            number: Some("1.0".to_string()),
            commands: names,
        }],
        Vec::new(),
    )
    .expect("build registry")
}

fn diagnostic(err: &anyhow::Error) -> &Diagnostic {
    err.downcast_ref::<Diagnostic>()
        .unwrap_or_else(|| panic!("not a diagnostic: {err:#}"))
}

#[test]
fn fixture_commands_follow_naming_conventions() {
    let fns = classify(&fixture(), &OverrideTables::default());
    let expect = [
        ("glBitmap", Classification::Placeholder),
        ("glBlendEquation", Classification::Basic),
        ("glBufferData", Classification::Basic),
        ("glClear", Classification::Basic),
        ("glDeleteBuffers", Classification::GeneratorFree),
        ("glDeleteLists", Classification::Basic),
        ("glDeleteShader", Classification::Basic),
        ("glFlush", Classification::CustomNoBody),
        ("glGenBuffers", Classification::GeneratorAllocate),
        ("glGenLists", Classification::Basic),
        ("glGenerateMipmap", Classification::Basic),
        ("glGetBufferSubData", Classification::CustomNoBody),
        ("glGetError", Classification::Placeholder),
        ("glIsBuffer", Classification::Basic),
        ("glMultiDrawElements", Classification::Basic),
        ("glPointParameterfv", Classification::Basic),
        ("glStencilFuncSeparate", Classification::Basic),
        ("glTranslatex", Classification::Placeholder),
        ("glUniform1fv", Classification::Basic),
        ("glVertexAttribPointer", Classification::Basic),
    ];
    assert_eq!(fns.len(), expect.len());
    for (name, class) in expect {
        assert_eq!(find(&fns, name).classification, class, "{name}");
    }
}

#[test]
fn ids_are_contiguous_in_name_order() {
    let fns = classify(&fixture(), &OverrideTables::default());
    let ids: Vec<u32> = fns.iter().map(|f| f.id).collect();
    assert_eq!(ids, (1..=fns.len() as u32).collect::<Vec<_>>());
    let names: Vec<&str> = fns.iter().map(|f| f.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert_eq!(find(&fns, "glBitmap").id, 1);
    assert_eq!(find(&fns, "glVertexAttribPointer").id, 20);
}

#[test]
fn extensions_bring_in_aliases() {
    let mut tables = OverrideTables::default();
    tables.selection.extensions.enabled = true;
    let fns = classify(&fixture(), &tables);

    // GL_NV_fence is outside the default allow patterns.
    assert_eq!(fns.len(), 21);
    let alias = find(&fns, "glBlendEquationEXT");
    assert_eq!(alias.classification, Classification::Alias);
    assert_eq!(alias.alias_target.as_deref(), Some("glBlendEquation"));
    assert_eq!(find(&fns, "glBufferData").id, 4);
}

#[test]
fn alias_is_kept_when_its_target_is_not_selected() {
    let mut tables = OverrideTables::default();
    tables.selection.extensions.enabled = true;
    tables
        .selection
        .deny_commands
        .insert("glBlendEquation".to_string());
    let fns = classify(&fixture(), &tables);
    assert!(fns.iter().all(|f| f.name != "glBlendEquation"));
    let alias = find(&fns, "glBlendEquationEXT");
    assert_eq!(alias.classification, Classification::Alias);
}

#[test]
fn feature_api_filter_limits_selection() {
    let mut tables = OverrideTables::default();
    tables.selection.feature_apis = vec!["gles1".to_string()];
    let fns = classify(&fixture(), &tables);
    let names: Vec<&str> = fns.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["glClear", "glTranslatex"]);
    assert_eq!(fns[0].id, 1);
    assert_eq!(fns[1].id, 2);
}

#[test]
fn pointer_offsets_stay_scalar_and_reserved_names_are_renamed() {
    let fns = classify(&fixture(), &OverrideTables::default());

    let vap = find(&fns, "glVertexAttribPointer");
    assert_eq!(vap.buffer_param_count(), 0);
    let pointer = vap.param("pointer").expect("pointer param");
    assert!(pointer.is_scalar());
    assert_eq!(pointer.length_expr.as_deref(), Some("COMPSIZE(size,type,stride)"));

    let stencil = find(&fns, "glStencilFuncSeparate");
    assert!(stencil.param("ref").is_none());
    assert_eq!(
        stencil.prototype(),
        "void glStencilFuncSeparate(GLenum face, GLenum func, GLint ref_, GLuint mask)"
    );
}

#[test]
fn deferred_sizes_are_scoped_per_parameter() {
    let fns = classify(&fixture(), &OverrideTables::default());

    let single = find(&fns, "glPointParameterfv");
    let params = single.param("params").expect("params");
    let size = single.size_of(params).expect("size");
    assert_eq!(size.deferred_symbol(), Some("COMPSIZE_glPointParameterfv"));

    let multi = find(&fns, "glMultiDrawElements");
    let symbols: Vec<String> = multi
        .buffer_params()
        .map(|p| {
            multi
                .size_of(p)
                .and_then(|s| s.deferred_symbol().map(str::to_string))
                .expect("deferred symbol")
        })
        .collect();
    assert_eq!(
        symbols,
        vec![
            "COMPSIZE_glMultiDrawElements_count".to_string(),
            "COMPSIZE_glMultiDrawElements_indices".to_string(),
        ]
    );
}

#[test]
fn alias_outranks_allocation_convention() {
    let mut alias = cmd("glGenThingsEXT", "void", &[]);
    alias.alias = Some("glGenThings".to_string());
    let reg = single_feature(vec![
        cmd(
            "glGenThings",
            "void",
            &[("GLsizei", "n", None), ("GLuint *", "ids", Some("n"))],
        ),
        alias,
    ]);
    let fns = classify(&reg, &OverrideTables::default());
    assert_eq!(find(&fns, "glGenThings").classification, Classification::GeneratorAllocate);
    assert_eq!(find(&fns, "glGenThingsEXT").classification, Classification::Alias);
}

#[test]
fn placeholder_outranks_allocation_convention() {
    let mut tables = OverrideTables::default();
    tables.unsupported.insert("glGenThings".to_string());
    let reg = single_feature(vec![cmd("glGenThings", "void", &[("GLsizei", "n", None)])]);
    let fns = classify(&reg, &tables);
    assert_eq!(fns[0].classification, Classification::Placeholder);
}

#[test]
fn allocate_with_wrong_signature_is_fatal() {
    let reg = single_feature(vec![cmd("glGenThings", "void", &[("GLsizei", "n", None)])]);
    let err = classify_registry(&reg, &OverrideTables::default()).expect_err("must fail");
    let d = diagnostic(&err);
    assert_eq!(d.code, DiagnosticCode::Glm0200AllocateSignature);
    assert!(d.message.contains("glGenThings"), "{d}");
    assert!(d.message.contains("found void glGenThings(GLsizei n)"), "{d}");
}

#[test]
fn free_with_writable_ids_is_fatal() {
    let reg = single_feature(vec![cmd(
        "glDeleteThings",
        "void",
        &[("GLsizei", "n", None), ("GLuint *", "ids", Some("n"))],
    )]);
    let err = classify_registry(&reg, &OverrideTables::default()).expect_err("must fail");
    let d = diagnostic(&err);
    assert_eq!(d.code, DiagnosticCode::Glm0201FreeSignature);
    assert!(d.message.contains("GLuint *ids"), "{d}");
}

#[test]
fn allocate_returning_a_value_is_fatal() {
    let reg = single_feature(vec![cmd(
        "glGenThings",
        "GLuint",
        &[("GLsizei", "n", None), ("GLuint *", "ids", Some("n"))],
    )]);
    let err = classify_registry(&reg, &OverrideTables::default()).expect_err("must fail");
    assert_eq!(diagnostic(&err).code, DiagnosticCode::Glm0200AllocateSignature);
}

#[test]
fn feature_referencing_undefined_command_is_fatal() {
    let reg = Registry::from_parts(
        vec![cmd("glClear", "void", &[("GLbitfield", "mask", None)])],
        vec![FeatureGroup {
            name: "GL_VERSION_1_0".to_string(),
            api: Some("gl".to_string()),
            number: None,
            commands: vec!["glClear".to_string(), "glMissing".to_string()],
        }],
        Vec::new(),
    )
    .expect("build registry");
    let err = classify_registry(&reg, &OverrideTables::default()).expect_err("must fail");
    let d = diagnostic(&err);
    assert_eq!(d.code, DiagnosticCode::Glm0100UndefinedCommand);
    assert!(d.message.contains("glMissing"), "{d}");
}

#[test]
fn alias_of_undefined_command_is_fatal() {
    let mut alias = cmd("glFooEXT", "void", &[]);
    alias.alias = Some("glFoo".to_string());
    let reg = single_feature(vec![alias]);
    let err = classify_registry(&reg, &OverrideTables::default()).expect_err("must fail");
    assert_eq!(diagnostic(&err).code, DiagnosticCode::Glm0101UndefinedAliasTarget);
}

#[test]
fn duplicate_command_is_rejected() {
    let err = Registry::from_parts(
        vec![cmd("glClear", "void", &[]), cmd("glClear", "void", &[])],
        Vec::new(),
        Vec::new(),
    )
    .expect_err("must fail");
    assert_eq!(err.code, DiagnosticCode::Glm0102DuplicateCommand);
}

#[test]
fn xml_and_json_registries_agree() {
    let xml = fixture();
    let json = Registry::from_json_slice(xml.to_json_string().expect("to json").as_bytes())
        .expect("reparse json");
    let tables = OverrideTables::default();
    assert_eq!(classify(&xml, &tables), classify(&json, &tables));
    assert!(xml.source_sha256().is_some());
    assert_ne!(xml.source_sha256(), json.source_sha256());
}

#[test]
fn malformed_xml_reports_registry_parse() {
    let err = Registry::from_xml_str("<registry><commands>").expect_err("must fail");
    assert_eq!(diagnostic(&err).code, DiagnosticCode::Glm0001RegistryParse);
}

#[test]
fn renamed_parameters_are_renamed_in_lengths() {
    let reg = single_feature(vec![cmd(
        "glStencilValuesv",
        "void",
        &[("GLint", "ref", None), ("const GLint *", "values", Some("ref*2"))],
    )]);
    let fns = classify(&reg, &OverrideTables::default());
    let f = find(&fns, "glStencilValuesv");
    let values = f.param("values").expect("values param");
    assert_eq!(values.length_expr.as_deref(), Some("ref_*2"));
    let size = f.size_of(values).expect("size");
    assert_eq!(size.expr(), "ref_*2");
}
