use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Parse,
    Select,
    Classify,
    Resolve,
    Codec,
    Config,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticCode {
    Glm0001RegistryParse,
    Glm0100UndefinedCommand,
    Glm0101UndefinedAliasTarget,
    Glm0102DuplicateCommand,
    Glm0200AllocateSignature,
    Glm0201FreeSignature,
    Glm0300SizeExprEval,
    Glm0400InvalidOverrides,
    Glm0500CodecArgs,
    Glm0901InternalBug,
}

impl DiagnosticCode {
    pub fn code_str(self) -> &'static str {
        match self {
            DiagnosticCode::Glm0001RegistryParse => "GLM0001",
            DiagnosticCode::Glm0100UndefinedCommand => "GLM0100",
            DiagnosticCode::Glm0101UndefinedAliasTarget => "GLM0101",
            DiagnosticCode::Glm0102DuplicateCommand => "GLM0102",
            DiagnosticCode::Glm0200AllocateSignature => "GLM0200",
            DiagnosticCode::Glm0201FreeSignature => "GLM0201",
            DiagnosticCode::Glm0300SizeExprEval => "GLM0300",
            DiagnosticCode::Glm0400InvalidOverrides => "GLM0400",
            DiagnosticCode::Glm0500CodecArgs => "GLM0500",
            DiagnosticCode::Glm0901InternalBug => "GLM0901",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            DiagnosticCode::Glm0001RegistryParse => Phase::Parse,
            DiagnosticCode::Glm0100UndefinedCommand
            | DiagnosticCode::Glm0101UndefinedAliasTarget
            | DiagnosticCode::Glm0102DuplicateCommand => Phase::Select,
            DiagnosticCode::Glm0200AllocateSignature | DiagnosticCode::Glm0201FreeSignature => {
                Phase::Classify
            }
            DiagnosticCode::Glm0300SizeExprEval => Phase::Resolve,
            DiagnosticCode::Glm0400InvalidOverrides => Phase::Config,
            DiagnosticCode::Glm0500CodecArgs => Phase::Codec,
            DiagnosticCode::Glm0901InternalBug => Phase::Internal,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            DiagnosticCode::Glm0001RegistryParse => "failed to parse registry",
            DiagnosticCode::Glm0100UndefinedCommand => {
                "feature or extension requires an undefined command"
            }
            DiagnosticCode::Glm0101UndefinedAliasTarget => {
                "alias target is not defined in the registry"
            }
            DiagnosticCode::Glm0102DuplicateCommand => "command is defined more than once",
            DiagnosticCode::Glm0200AllocateSignature => {
                "identifier-allocating command has an unexpected signature"
            }
            DiagnosticCode::Glm0201FreeSignature => {
                "identifier-freeing command has an unexpected signature"
            }
            DiagnosticCode::Glm0300SizeExprEval => "size expression cannot be evaluated",
            DiagnosticCode::Glm0400InvalidOverrides => "invalid overrides configuration",
            DiagnosticCode::Glm0500CodecArgs => "call arguments do not match the wire layout",
            DiagnosticCode::Glm0901InternalBug => "internal glmarshal bug",
        }
    }

    pub fn default_help(self) -> Option<&'static str> {
        match self {
            DiagnosticCode::Glm0001RegistryParse => Some(
                "Pass a Khronos XML registry (.xml) or a glmarshal JSON registry (.json).",
            ),
            DiagnosticCode::Glm0200AllocateSignature | DiagnosticCode::Glm0201FreeSignature => {
                Some("Add the command to the naming-convention exceptions or to the special set.")
            }
            DiagnosticCode::Glm0300SizeExprEval => {
                Some("Deferred COMPSIZE_* symbols must be supplied by an external size table.")
            }
            DiagnosticCode::Glm0901InternalBug => {
                Some("This is a bug in glmarshal. Please report it with the input registry.")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub phase: Phase,
    pub severity: Severity,
    pub message: String,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            phase: code.phase(),
            severity: Severity::Error,
            message: message.into(),
            help: code.default_help().map(|s| s.to_string()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} {:?}: {}",
            self.code.code_str(),
            self.phase,
            self.severity,
            self.message
        )?;
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

pub fn render_diagnostics_md() -> String {
    let mut rows: Vec<(String, Phase, String, String)> = all_codes()
        .iter()
        .map(|code| {
            (
                code.code_str().to_string(),
                code.phase(),
                code.default_message().to_string(),
                code.default_help().unwrap_or("").to_string(),
            )
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    out.push_str("# glmarshal diagnostics catalog\n\n");
    out.push_str("This document is generated from `crates/glmarshal-core/src/diagnostics.rs`.\n\n");
    out.push_str("| Code | Phase | Message | Help |\n");
    out.push_str("| ---- | ----- | ------- | ---- |\n");
    for (code, phase, msg, help) in rows {
        out.push_str(&format!("| {code} | {phase:?} | {msg} | {help} |\n"));
    }
    out
}

fn all_codes() -> &'static [DiagnosticCode] {
    &[
        DiagnosticCode::Glm0001RegistryParse,
        DiagnosticCode::Glm0100UndefinedCommand,
        DiagnosticCode::Glm0101UndefinedAliasTarget,
        DiagnosticCode::Glm0102DuplicateCommand,
        DiagnosticCode::Glm0200AllocateSignature,
        DiagnosticCode::Glm0201FreeSignature,
        DiagnosticCode::Glm0300SizeExprEval,
        DiagnosticCode::Glm0400InvalidOverrides,
        DiagnosticCode::Glm0500CodecArgs,
        DiagnosticCode::Glm0901InternalBug,
    ]
}
