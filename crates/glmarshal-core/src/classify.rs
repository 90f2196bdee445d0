use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ctype::CType;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::overrides::{any_rule_matches, OverrideTables};
use crate::param::{prototype, ParameterSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Basic,
    Alias,
    Placeholder,
    GeneratorAllocate,
    GeneratorFree,
    CustomNoBody,
}

impl Classification {
    pub const ALL: [Classification; 6] = [
        Classification::Basic,
        Classification::Alias,
        Classification::Placeholder,
        Classification::GeneratorAllocate,
        Classification::GeneratorFree,
        Classification::CustomNoBody,
    ];

    pub fn manifest_tag(self) -> &'static str {
        match self {
            Classification::Basic => "basic",
            Classification::Alias => "alias",
            Classification::Placeholder => "placeholder",
            Classification::GeneratorAllocate => "gen",
            Classification::GeneratorFree => "delete",
            Classification::CustomNoBody => "custom",
        }
    }

    pub fn from_manifest_tag(tag: &str) -> Option<Self> {
        Classification::ALL
            .into_iter()
            .find(|c| c.manifest_tag() == tag)
    }

    pub fn dispatches_by_id(self) -> bool {
        matches!(
            self,
            Classification::Basic
                | Classification::GeneratorAllocate
                | Classification::GeneratorFree
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.manifest_tag())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawFunction<'a> {
    pub name: &'a str,
    pub return_type: &'a CType,
    pub params: &'a [ParameterSpec],
    pub alias_target: Option<&'a str>,
}

pub struct Rule {
    pub classification: Classification,
    pub describe: &'static str,
    applies: fn(&OverrideTables, &RawFunction<'_>) -> bool,
}

/// Classification precedence, highest first.
pub const PRECEDENCE: [Rule; 5] = [
    Rule {
        classification: Classification::CustomNoBody,
        describe: "listed in the special set",
        applies: |t, f| t.special.contains(f.name),
    },
    Rule {
        classification: Classification::Placeholder,
        describe: "unsupported, a query, or a fixed-point variant",
        applies: |t, f| {
            t.unsupported.contains(f.name)
                || any_rule_matches(&t.query, f.name)
                || any_rule_matches(&t.fixed_point, f.name)
        },
    },
    Rule {
        classification: Classification::Alias,
        describe: "registry alias of another command",
        applies: |_, f| f.alias_target.is_some(),
    },
    Rule {
        classification: Classification::GeneratorAllocate,
        describe: "allocates identifiers",
        applies: |t, f| t.allocate.matches(f.name),
    },
    Rule {
        classification: Classification::GeneratorFree,
        describe: "frees identifiers",
        applies: |t, f| t.free.matches(f.name),
    },
];

pub struct Classifier<'t> {
    tables: &'t OverrideTables,
}

impl<'t> Classifier<'t> {
    pub fn new(tables: &'t OverrideTables) -> Self {
        Classifier { tables }
    }

    pub fn classify(&self, f: &RawFunction<'_>) -> Result<Classification, Diagnostic> {
        let Some(rule) = PRECEDENCE.iter().find(|r| (r.applies)(self.tables, f)) else {
            return Ok(Classification::Basic);
        };
        trace!(function = f.name, rule = rule.describe, "classification rule matched");
        match rule.classification {
            Classification::GeneratorAllocate => {
                self.check_identifier_signature(f, true)?;
            }
            Classification::GeneratorFree => {
                self.check_identifier_signature(f, false)?;
            }
            _ => {}
        }
        Ok(rule.classification)
    }

    fn check_identifier_signature(
        &self,
        f: &RawFunction<'_>,
        writable: bool,
    ) -> Result<(), Diagnostic> {
        let conv = &self.tables.identifiers;
        let shape_ok = f.return_type.is_void()
            && f.params.len() == 2
            && f.params[0].is_scalar()
            && !f.params[0].ty.is_pointer()
            && f.params[0].ty.base() == conv.count_type
            && f.params[1].is_buffer
            && f.params[1].ty.base() == conv.id_type
            && if writable {
                f.params[1].ty.is_writable_pointer()
            } else {
                f.params[1].ty.is_readonly_pointer()
            };
        if shape_ok {
            return Ok(());
        }

        let (code, expected) = if writable {
            (
                DiagnosticCode::Glm0200AllocateSignature,
                format!("void {}({} n, {} *ids)", f.name, conv.count_type, conv.id_type),
            )
        } else {
            (
                DiagnosticCode::Glm0201FreeSignature,
                format!(
                    "void {}({} n, const {} *ids)",
                    f.name, conv.count_type, conv.id_type
                ),
            )
        };
        Err(Diagnostic::error(
            code,
            format!(
                "{}: expected {expected}, found {}",
                f.name,
                prototype(f.return_type, f.name, f.params)
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{Classification, PRECEDENCE};

    #[test]
    fn precedence_order_is_fixed() {
        let order: Vec<Classification> = PRECEDENCE.iter().map(|r| r.classification).collect();
        assert_eq!(
            order,
            vec![
                Classification::CustomNoBody,
                Classification::Placeholder,
                Classification::Alias,
                Classification::GeneratorAllocate,
                Classification::GeneratorFree,
            ]
        );
    }

    #[test]
    fn manifest_tags_round_trip() {
        for c in Classification::ALL {
            assert_eq!(Classification::from_manifest_tag(c.manifest_tag()), Some(c));
        }
        assert_eq!(Classification::from_manifest_tag("bogus"), None);
    }
}
