use serde::{Deserialize, Serialize};

use crate::ctype::CType;
use crate::registry::{Command, CommandParam};
use crate::size_expr::rewrite_identifiers;

/// Parameter names that would collide with a name the wire struct or the
/// generated code reserves. Each is renamed by appending `_`.
pub const RESERVED_PARAM_NAMES: &[&str] = &["ref"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub ty: CType,
    pub name: String,
    pub is_buffer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl ParameterSpec {
    /// `pointer_is_offset` marks commands whose `len`-annotated pointers are
    /// offsets into a bound buffer object; those parameters stay scalar.
    pub fn from_registry(p: &CommandParam, pointer_is_offset: bool) -> Self {
        ParameterSpec {
            ty: p.ty.clone(),
            name: reserved_rename(&p.name).unwrap_or_else(|| p.name.clone()),
            is_buffer: p.len.is_some() && !pointer_is_offset,
            length_expr: p
                .len
                .as_deref()
                .map(|len| rewrite_identifiers(len, reserved_rename)),
            group: p.group.clone(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        !self.is_buffer
    }

    pub fn declaration(&self) -> String {
        declare(self.ty.as_str(), &self.name)
    }
}

fn reserved_rename(name: &str) -> Option<String> {
    RESERVED_PARAM_NAMES
        .contains(&name)
        .then(|| format!("{name}_"))
}

pub(crate) fn declare(ty: &str, name: &str) -> String {
    if ty.ends_with('*') {
        format!("{ty}{name}")
    } else {
        format!("{ty} {name}")
    }
}

pub(crate) fn prototype(ret: &CType, name: &str, params: &[ParameterSpec]) -> String {
    let args = if params.is_empty() {
        "void".to_string()
    } else {
        params
            .iter()
            .map(ParameterSpec::declaration)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("{}({args})", declare(ret.as_str(), name))
}

pub fn build_params(cmd: &Command, pointer_is_offset: bool) -> Vec<ParameterSpec> {
    cmd.params
        .iter()
        .map(|p| ParameterSpec::from_registry(p, pointer_is_offset))
        .collect()
}

pub fn buffer_param_count(params: &[ParameterSpec]) -> usize {
    params.iter().filter(|p| p.is_buffer).count()
}

#[cfg(test)]
mod tests {
    use super::ParameterSpec;
    use crate::ctype::CType;
    use crate::registry::CommandParam;

    fn raw(ty: &str, name: &str, len: Option<&str>) -> CommandParam {
        CommandParam {
            ty: CType::parse(ty),
            name: name.to_string(),
            len: len.map(str::to_string),
            group: None,
        }
    }

    #[test]
    fn len_makes_buffer_unless_offset() {
        let p = raw("const void *", "pointer", Some("COMPSIZE(size,type,stride)"));
        assert!(ParameterSpec::from_registry(&p, false).is_buffer);
        let off = ParameterSpec::from_registry(&p, true);
        assert!(off.is_scalar());
        assert_eq!(off.length_expr.as_deref(), Some("COMPSIZE(size,type,stride)"));
    }

    #[test]
    fn reserved_name_is_renamed() {
        let p = ParameterSpec::from_registry(&raw("GLint", "ref", None), false);
        assert_eq!(p.name, "ref_");
        assert_eq!(p.declaration(), "GLint ref_");
    }

    #[test]
    fn reserved_name_is_renamed_inside_lengths() {
        let p = ParameterSpec::from_registry(&raw("const GLint *", "values", Some("ref*2+refs")), false);
        assert_eq!(p.length_expr.as_deref(), Some("ref_*2+refs"));
    }

    #[test]
    fn pointer_declarator_has_no_gap() {
        let p = ParameterSpec::from_registry(&raw("GLuint *", "ids", Some("n")), false);
        assert_eq!(p.declaration(), "GLuint *ids");
    }
}
