use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use glmarshal_contracts::OVERRIDES_SCHEMA_VERSION;

use crate::diagnostics::{Diagnostic, DiagnosticCode};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NameRule {
    Exact(String),
    Prefix(String),
    Suffix(String),
}

impl NameRule {
    pub fn parse(pattern: &str) -> Result<Self, Diagnostic> {
        let invalid = || {
            Diagnostic::error(
                DiagnosticCode::Glm0400InvalidOverrides,
                format!("invalid name rule {pattern:?} (expected name, prefix* or *suffix)"),
            )
        };
        let p = pattern.trim();
        let rule = if let Some(rest) = p.strip_suffix('*') {
            NameRule::Prefix(rest.to_string())
        } else if let Some(rest) = p.strip_prefix('*') {
            NameRule::Suffix(rest.to_string())
        } else {
            NameRule::Exact(p.to_string())
        };
        match &rule {
            NameRule::Exact(s) | NameRule::Prefix(s) | NameRule::Suffix(s)
                if s.is_empty() || s.contains('*') =>
            {
                Err(invalid())
            }
            _ => Ok(rule),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameRule::Exact(s) => name == s,
            NameRule::Prefix(s) => name.starts_with(s.as_str()),
            NameRule::Suffix(s) => name.ends_with(s.as_str()),
        }
    }
}

impl fmt::Display for NameRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameRule::Exact(s) => write!(f, "{s}"),
            NameRule::Prefix(s) => write!(f, "{s}*"),
            NameRule::Suffix(s) => write!(f, "*{s}"),
        }
    }
}

impl TryFrom<String> for NameRule {
    type Error = Diagnostic;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        NameRule::parse(&s)
    }
}

impl From<NameRule> for String {
    fn from(r: NameRule) -> Self {
        r.to_string()
    }
}

pub fn any_rule_matches(rules: &[NameRule], name: &str) -> bool {
    rules.iter().any(|r| r.matches(name))
}

/// A naming convention that implies identifier allocation or release, minus
/// the names that look alike but mean something else (`glGenerateMipmap`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConventionRule {
    pub pattern: NameRule,
    #[serde(default)]
    pub exceptions: Vec<NameRule>,
}

impl ConventionRule {
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.matches(name) && !any_rule_matches(&self.exceptions, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentifierConvention {
    pub count_type: String,
    pub id_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExtensionFilter {
    pub enabled: bool,
    pub allow: Vec<String>,
    pub deny: BTreeSet<String>,
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        ExtensionFilter {
            enabled: false,
            allow: vec!["GL_ARB_*".to_string(), "GL_EXT_*".to_string()],
            deny: str_set(&[
                "GL_ARB_vertex_blend",
                "GL_EXT_coordinate_frame",
                "GL_EXT_vertex_shader",
                "GL_EXT_vertex_weighting",
                "GL_ARB_matrix_palette",
            ]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SelectionConfig {
    /// Only features whose `api` is listed are selected; empty selects every
    /// feature in the registry.
    pub feature_apis: Vec<String>,
    pub extensions: ExtensionFilter,
    pub deny_commands: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeAbi {
    pub export_macro: String,
    pub queue_fn: String,
    pub flush_fn: String,
    pub read_fn: String,
    pub read_fd: String,
    pub fail_fn: String,
    pub command_enum: String,
    pub command_prefix: String,
    pub field_prefix: String,
    pub runtime_header: String,
    pub size_table_header: String,
}

impl Default for RuntimeAbi {
    fn default() -> Self {
        RuntimeAbi {
            export_macro: "GLM_EXPORT".to_string(),
            queue_fn: "glm_queue_command".to_string(),
            flush_fn: "glm_flush_commands".to_string(),
            read_fn: "glm_read_reply".to_string(),
            read_fd: "GLM_REPLY_FD".to_string(),
            fail_fn: "glm_fail".to_string(),
            command_enum: "glm_command".to_string(),
            command_prefix: "GLM_CMD_".to_string(),
            field_prefix: "_glm_".to_string(),
            runtime_header: "glm_runtime.h".to_string(),
            size_table_header: "glm_compsizes.h".to_string(),
        }
    }
}

impl RuntimeAbi {
    fn identifiers(&self) -> [(&'static str, &str); 9] {
        [
            ("export_macro", &self.export_macro),
            ("queue_fn", &self.queue_fn),
            ("flush_fn", &self.flush_fn),
            ("read_fn", &self.read_fn),
            ("read_fd", &self.read_fd),
            ("fail_fn", &self.fail_fn),
            ("command_enum", &self.command_enum),
            ("command_prefix", &self.command_prefix),
            ("field_prefix", &self.field_prefix),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OverrideTables {
    pub schema_version: String,
    pub special: BTreeSet<String>,
    pub unsupported: BTreeSet<String>,
    pub pointer_offset: BTreeSet<String>,
    pub query: Vec<NameRule>,
    pub fixed_point: Vec<NameRule>,
    pub allocate: ConventionRule,
    pub free: ConventionRule,
    pub identifiers: IdentifierConvention,
    pub selection: SelectionConfig,
    pub runtime: RuntimeAbi,
}

impl Default for OverrideTables {
    fn default() -> Self {
        OverrideTables {
            schema_version: OVERRIDES_SCHEMA_VERSION.to_string(),
            special: str_set(&["glFlush", "glGetBufferSubData"]),
            unsupported: str_set(DEFAULT_UNSUPPORTED),
            pointer_offset: str_set(DEFAULT_POINTER_OFFSET),
            query: vec![NameRule::Prefix("glGet".to_string())],
            fixed_point: vec![
                NameRule::Suffix("x".to_string()),
                NameRule::Suffix("xv".to_string()),
            ],
            allocate: ConventionRule {
                pattern: NameRule::Prefix("glGen".to_string()),
                exceptions: vec![
                    NameRule::Exact("glGenLists".to_string()),
                    NameRule::Prefix("glGenerate".to_string()),
                ],
            },
            free: ConventionRule {
                pattern: NameRule::Prefix("glDelete".to_string()),
                exceptions: vec![
                    NameRule::Exact("glDeleteLists".to_string()),
                    NameRule::Exact("glDeleteShader".to_string()),
                    NameRule::Exact("glDeleteProgram".to_string()),
                ],
            },
            identifiers: IdentifierConvention {
                count_type: "GLsizei".to_string(),
                id_type: "GLuint".to_string(),
            },
            selection: SelectionConfig::default(),
            runtime: RuntimeAbi::default(),
        }
    }
}

impl OverrideTables {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, Diagnostic> {
        let tables: OverrideTables = serde_json::from_slice(bytes).map_err(|err| {
            Diagnostic::error(
                DiagnosticCode::Glm0400InvalidOverrides,
                format!("parse overrides JSON: {err}"),
            )
        })?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read overrides: {}", path.display()))?;
        OverrideTables::from_json_slice(&bytes)
            .with_context(|| format!("load overrides: {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), Diagnostic> {
        if self.schema_version.trim() != OVERRIDES_SCHEMA_VERSION {
            return Err(Diagnostic::error(
                DiagnosticCode::Glm0400InvalidOverrides,
                format!(
                    "overrides schema_version mismatch: expected {OVERRIDES_SCHEMA_VERSION} got {:?}",
                    self.schema_version
                ),
            ));
        }
        for (field, value) in self.runtime.identifiers() {
            if !crate::util::is_ident(value) {
                return Err(Diagnostic::error(
                    DiagnosticCode::Glm0400InvalidOverrides,
                    format!("runtime.{field} must be a C identifier, got {value:?}"),
                ));
            }
        }
        if let Some(name) = self.special.intersection(&self.unsupported).next() {
            return Err(Diagnostic::error(
                DiagnosticCode::Glm0400InvalidOverrides,
                format!("{name} is listed both as special and as unsupported"),
            ));
        }
        Ok(())
    }
}

fn str_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

const DEFAULT_UNSUPPORTED: &[&str] = &[
    // Pixel/parameter arrays whose element counts depend on enum arguments
    // that have no size table entry yet.
    "glBitmap",
    "glColorSubTable",
    "glColorTable",
    "glColorTableParameterfv",
    "glColorTableParameteriv",
    "glConvolutionFilter1D",
    "glConvolutionFilter2D",
    "glConvolutionParameterfv",
    "glConvolutionParameteriv",
    "glDrawPixels",
    "glFogfv",
    "glFogiv",
    "glFogxv",
    "glGetColorTable",
    "glGetColorTableParameterfv",
    "glGetColorTableParameteriv",
    "glGetPolygonStipple",
    "glInterleavedArrays",
    "glLightfv",
    "glLightiv",
    "glLightModelfv",
    "glLightModeliv",
    "glLightModelxv",
    "glLightxv",
    "glPolygonStipple",
    "glTexEnvfv",
    "glTexEnviv",
    "glTexEnvxv",
    "glTexGendv",
    "glTexGenfv",
    "glTexGeniv",
    "glTextureParameterfvEXT",
    "glTextureParameterIivEXT",
    "glTextureParameterIuivEXT",
    "glTextureParameterivEXT",
    "glMultiTexEnvfvEXT",
    "glMultiTexEnvivEXT",
    "glMultiTexGendvEXT",
    "glMultiTexGenfvEXT",
    "glMultiTexGenivEXT",
    "glMaterialfv",
    "glMaterialiv",
    "glMaterialxv",
    "glMultiTexCoordPointerEXT",
    "glMultiTexParameterfvEXT",
    "glMultiTexParameterIivEXT",
    "glMultiTexParameterIuivEXT",
    "glMultiTexParameterivEXT",
    "glMap1d",
    "glMap1f",
    "glMap2d",
    "glMap2f",
    "glTextureImage1DEXT",
    "glTextureImage2DEXT",
    "glTextureImage3DEXT",
    "glTextureSubImage1DEXT",
    "glTextureSubImage2DEXT",
    "glTextureSubImage3DEXT",
    "glSeparableFilter2D",
    "glMultiTexImage1DEXT",
    "glMultiTexImage2DEXT",
    "glMultiTexImage3DEXT",
    "glMultiTexSubImage1DEXT",
    "glMultiTexSubImage2DEXT",
    "glMultiTexSubImage3DEXT",
    // Sync objects.
    "glFenceSync",
    "glDeleteSync",
    "glGetSync",
    "glWaitSync",
    "glClientWaitSync",
    // Client-side mappings and pixel readback.
    "glMapBuffer",
    "glUnmapBuffer",
    "glMapBufferRange",
    "glMapNamedBuffer",
    "glMapNamedBufferRange",
    "glReadPixels",
    "glFinish",
    // ES-only entry points.
    "glEdgeFlag",
    "glEdgeFlagv",
    "glClipPlanef",
    "glFrustumf",
    "glOrthof",
];

const DEFAULT_POINTER_OFFSET: &[&str] = &[
    "glColorPointer",
    "glColorPointerEXT",
    "glEdgeFlagPointer",
    "glEdgeFlagPointerEXT",
    "glFogCoordPointer",
    "glFogCoordPointerEXT",
    "glIndexPointer",
    "glIndexPointerEXT",
    "glNormalPointer",
    "glNormalPointerEXT",
    "glSecondaryColorPointer",
    "glSecondaryColorPointerEXT",
    "glTexCoordPointer",
    "glTexCoordPointerEXT",
    "glVertexAttribIPointer",
    "glVertexAttribLPointer",
    "glVertexAttribPointer",
    "glVertexPointer",
    "glVertexPointerEXT",
    "glDrawElements",
    "glDrawElementsBaseVertex",
    "glDrawElementsInstanced",
    "glDrawElementsInstancedBaseVertex",
    "glDrawRangeElements",
    "glDrawRangeElementsBaseVertex",
    "glMultiDrawArraysIndirect",
    "glMultiDrawElementsIndirect",
];
