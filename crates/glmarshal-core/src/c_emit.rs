use glmarshal_contracts::WIRE_PROTOCOL_VERSION;

use crate::diagnostics::Diagnostic;
use crate::functions::FunctionSpec;
use crate::overrides::RuntimeAbi;
use crate::param::declare;
use crate::wire::{self, HeaderField, RequestLayout, Response, WireShape};

#[derive(Debug, Clone, Default)]
pub struct GenMeta {
    pub header_include: String,
    pub source_sha256: Option<String>,
}

pub(crate) fn banner(meta: &GenMeta) -> String {
    let mut out = String::from("// Generated by glmarshal. Do not edit.\n");
    out.push_str(&format!("// wire protocol: {WIRE_PROTOCOL_VERSION}\n"));
    if let Some(sha) = &meta.source_sha256 {
        out.push_str(&format!("// registry sha256: {sha}\n"));
    }
    out
}

pub fn emit_implementation(
    functions: &[FunctionSpec],
    abi: &RuntimeAbi,
    meta: &GenMeta,
) -> Result<String, Diagnostic> {
    let mut e = Emitter::new(abi);
    e.out.push_str(&banner(meta));
    e.line(&format!("#include \"{}\"", meta.header_include));
    e.line(&format!("#include \"{}\"", abi.size_table_header));
    e.line("");

    let mut ordered: Vec<&FunctionSpec> = functions.iter().collect();
    ordered.sort_by_key(|f| f.id);
    for f in ordered {
        e.function(f)?;
    }
    Ok(e.out)
}

pub fn emit_function(f: &FunctionSpec, abi: &RuntimeAbi) -> Result<String, Diagnostic> {
    let mut e = Emitter::new(abi);
    e.function(f)?;
    Ok(e.out)
}

struct Emitter<'a> {
    abi: &'a RuntimeAbi,
    out: String,
    indent: usize,
}

impl<'a> Emitter<'a> {
    fn new(abi: &'a RuntimeAbi) -> Self {
        Emitter {
            abi,
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, s: &str) {
        if s.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn open_block(&mut self, head: &str) {
        self.line(&format!("{head} {{"));
        self.indent += 1;
    }

    fn close_block(&mut self, tail: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(&format!("}}{tail}"));
    }

    fn field(&self, name: &str) -> String {
        format!("{}{name}", self.abi.field_prefix)
    }

    fn function(&mut self, f: &FunctionSpec) -> Result<(), Diagnostic> {
        let abi = self.abi;
        let export = &abi.export_macro;
        match wire::shape_of(f)? {
            WireShape::Request(layout) => {
                self.open_block(&format!("{export} {}", f.prototype()));
                self.request(f, &layout);
                self.close_block("");
            }
            WireShape::InheritsFrom { target } => {
                self.line(&format!(
                    "{export} {} __attribute__((alias(\"{target}\")));",
                    f.prototype()
                ));
            }
            WireShape::NeverSends => {
                let msg = c_escape_string(&format!(
                    "Called {}, whose wrapper is unimplemented.",
                    f.name
                ));
                self.line(&format!(
                    "{export} {} {{ {}(\"{msg}\"); }}",
                    f.prototype(),
                    abi.fail_fn
                ));
            }
            WireShape::HandWritten => {
                self.line(&format!(
                    "/* {} (command {}) is implemented by hand. */",
                    f.name, f.id
                ));
            }
        }
        self.line("");
        Ok(())
    }

    fn request(&mut self, f: &FunctionSpec, layout: &RequestLayout) {
        let req = self.field("req");
        let cmd = self.field("cmd");
        let tag_ty = format!("{}_tag_t", self.abi.command_enum);

        self.open_block("struct");
        self.line(&format!("{tag_ty} {cmd};"));
        for field in &layout.header {
            match field {
                HeaderField::Scalar { name, ty } => {
                    self.line(&format!("{};", declare(&ty.field_spelling(), name)));
                }
                HeaderField::BufferLength { name } => {
                    self.line(&format!("uint64_t {};", self.field(&format!("{name}_size"))));
                }
            }
        }
        self.close_block(&format!(" __attribute__((packed)) {req};"));

        self.line(&format!(
            "{req}.{cmd} = {}{};",
            self.abi.command_prefix, f.name
        ));
        for field in &layout.header {
            match field {
                HeaderField::Scalar { name, .. } => {
                    self.line(&format!("{req}.{name} = {name};"));
                }
                HeaderField::BufferLength { name } => {
                    let size = self.field(&format!("{name}_size"));
                    let bytes = byte_count(layout, name);
                    self.line(&format!("{req}.{size} = {name} == NULL ? 0 : {bytes};"));
                }
            }
        }
        self.line(&format!("{}(&{req}, sizeof({req}));", self.abi.queue_fn));
        for seg in &layout.trailing {
            let bytes = seg.count.byte_count_c(&seg.param);
            self.line(&format!(
                "if ({p} != NULL) {}({p}, {bytes});",
                self.abi.queue_fn,
                p = seg.param
            ));
        }

        if layout.response.blocks() {
            self.line(&format!("{}();", self.abi.flush_fn));
        }
        match &layout.response {
            Response::None => {}
            Response::Value { ty } => {
                let result = self.field("result");
                self.line(&format!("{};", declare(&ty.field_spelling(), &result)));
                self.line(&format!(
                    "{}({}, &{result}, sizeof({result}));",
                    self.abi.read_fn, self.abi.read_fd
                ));
                self.line(&format!("return {result};"));
            }
            Response::IntoBuffer { param, count, .. } => {
                self.line(&format!(
                    "{}({}, {param}, {});",
                    self.abi.read_fn,
                    self.abi.read_fd,
                    count.byte_count_c(param)
                ));
            }
        }
    }
}

fn byte_count(layout: &RequestLayout, param: &str) -> String {
    layout
        .trailing
        .iter()
        .find(|s| s.param == param)
        .map(|s| s.count.byte_count_c(param))
        .unwrap_or_else(|| "0".to_string())
}

fn c_escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}
