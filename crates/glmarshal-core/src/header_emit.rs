use glmarshal_contracts::WIRE_PROTOCOL_VERSION;

use crate::c_emit::{banner, GenMeta};
use crate::functions::FunctionSpec;
use crate::overrides::RuntimeAbi;

pub fn emit_header(functions: &[FunctionSpec], abi: &RuntimeAbi, meta: &GenMeta) -> String {
    let guard = include_guard(&meta.header_include);
    let upper = abi.command_enum.to_ascii_uppercase();
    let tag_ty = format!("{}_tag_t", abi.command_enum);

    let mut out = banner(meta);
    out.push_str(&format!("#ifndef {guard}\n#define {guard}\n\n"));
    for sys in ["stddef.h", "stdint.h", "GL/gl.h", "GL/glext.h"] {
        out.push_str(&format!("#include <{sys}>\n"));
    }
    out.push_str(&format!("\n#include \"{}\"\n\n", abi.runtime_header));

    out.push_str("/*\n");
    out.push_str(" * Every request is a packed struct: the command tag, then one field per\n");
    out.push_str(" * parameter in declaration order. Scalars are copied as-is; a buffer is\n");
    out.push_str(" * sent as a uint64_t byte length (0 for NULL) and its bytes follow the\n");
    out.push_str(" * struct in parameter order. All values are in host (little-endian)\n");
    out.push_str(" * byte order.\n");
    out.push_str(" */\n");
    out.push_str(&format!(
        "#define {upper}_PROTOCOL_VERSION {WIRE_PROTOCOL_VERSION}\n\n"
    ));
    out.push_str(&format!("typedef uint32_t {tag_ty};\n"));
    out.push_str("typedef int GLclampx;\n\n");

    let mut ordered: Vec<&FunctionSpec> = functions.iter().collect();
    ordered.sort_by_key(|f| f.id);
    out.push_str("typedef enum {\n");
    out.push_str(&format!("  {}INVALID = 0,\n", abi.command_prefix));
    for f in ordered {
        out.push_str(&format!("  {}{} = {},\n", abi.command_prefix, f.name, f.id));
    }
    out.push_str(&format!("}} {};\n\n", abi.command_enum));
    out.push_str(&format!("#endif /* {guard} */\n"));
    out
}

fn include_guard(include: &str) -> String {
    let file = include.rsplit('/').next().unwrap_or(include);
    let mut guard: String = file
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    if guard.is_empty() || guard.starts_with(|c: char| c.is_ascii_digit()) {
        guard.insert_str(0, "GLM_");
    }
    guard.push('_');
    guard
}

#[cfg(test)]
mod tests {
    use super::include_guard;

    #[test]
    fn guard_is_derived_from_file_name() {
        assert_eq!(include_guard("gen/glm_commands.h"), "GLM_COMMANDS_H_");
        assert_eq!(include_guard("3d.h"), "GLM_3D_H_");
    }
}
