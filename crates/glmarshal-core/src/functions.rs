use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{Classification, Classifier, RawFunction};
use crate::ctype::CType;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::overrides::OverrideTables;
use crate::param::{build_params, buffer_param_count, prototype, ParameterSpec};
use crate::select::Selection;
use crate::size_expr::{self, SizeExpression};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub id: u32,
    pub name: String,
    pub return_type: CType,
    pub params: Vec<ParameterSpec>,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_target: Option<String>,
}

impl FunctionSpec {
    pub fn buffer_params(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.params.iter().filter(|p| p.is_buffer)
    }

    pub fn scalar_params(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.params.iter().filter(|p| p.is_scalar())
    }

    pub fn buffer_param_count(&self) -> usize {
        buffer_param_count(&self.params)
    }

    pub fn param(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn size_of(&self, param: &ParameterSpec) -> Option<SizeExpression> {
        if !param.is_buffer {
            return None;
        }
        let len = param.length_expr.as_deref()?;
        Some(size_expr::resolve(
            len,
            &self.name,
            &param.name,
            self.buffer_param_count(),
        ))
    }

    pub fn prototype(&self) -> String {
        prototype(&self.return_type, &self.name, &self.params)
    }
}

/// Models, classifies and numbers every selected command. Ids follow name
/// order starting at 1 and are given to every function, including the ones
/// whose generated code never sends a request.
pub fn build_functions(
    selection: &Selection<'_>,
    tables: &OverrideTables,
) -> Result<Vec<FunctionSpec>, Diagnostic> {
    let classifier = Classifier::new(tables);
    let mut out: Vec<FunctionSpec> = Vec::with_capacity(selection.len());

    for (idx, (name, cmd)) in selection.commands.iter().enumerate() {
        let id = u32::try_from(idx + 1).map_err(|_| {
            Diagnostic::error(
                DiagnosticCode::Glm0901InternalBug,
                "more commands than fit in a 32-bit command tag",
            )
        })?;
        let params = build_params(cmd, tables.pointer_offset.contains(name));
        let classification = classifier.classify(&RawFunction {
            name,
            return_type: &cmd.return_type,
            params: &params,
            alias_target: cmd.alias.as_deref(),
        })?;
        let alias_target = cmd.alias.clone();
        if let (Classification::Alias, Some(target)) = (classification, &alias_target) {
            if !selection.contains(target) {
                warn!(
                    alias = %name,
                    target = %target,
                    "alias target is not selected; its definition must come from elsewhere"
                );
            }
        }
        debug!(id, name = %name, classification = %classification, "classified");

        out.push(FunctionSpec {
            id,
            name: name.clone(),
            return_type: cmd.return_type.clone(),
            params,
            classification,
            alias_target,
        });
    }
    Ok(out)
}
