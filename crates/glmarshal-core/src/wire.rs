use std::collections::BTreeMap;

use serde::Serialize;

use glmarshal_contracts::{BUFFER_LENGTH_BYTES, COMMAND_TAG_BYTES};

use crate::classify::Classification;
use crate::ctype::CType;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::functions::FunctionSpec;
use crate::size_expr::{ExternalSizes, SizeExpression};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeaderField {
    Scalar { name: String, ty: CType },
    BufferLength { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrailingSegment {
    pub param: String,
    pub element_ty: CType,
    pub count: SizeExpression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    None,
    Value { ty: CType },
    IntoBuffer {
        param: String,
        element_ty: CType,
        count: SizeExpression,
    },
}

impl Response {
    pub fn blocks(&self) -> bool {
        !matches!(self, Response::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLayout {
    pub command_id: u32,
    pub header: Vec<HeaderField>,
    pub trailing: Vec<TrailingSegment>,
    pub response: Response,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireShape {
    Request(RequestLayout),
    InheritsFrom { target: String },
    NeverSends,
    HandWritten,
}

pub fn shape_of(f: &FunctionSpec) -> Result<WireShape, Diagnostic> {
    match f.classification {
        Classification::Basic | Classification::GeneratorFree => {
            Ok(WireShape::Request(basic_layout(f)?))
        }
        Classification::GeneratorAllocate => Ok(WireShape::Request(allocate_layout(f)?)),
        Classification::Alias => match &f.alias_target {
            Some(target) => Ok(WireShape::InheritsFrom {
                target: target.clone(),
            }),
            None => Err(internal(f, "alias without a target")),
        },
        Classification::Placeholder => Ok(WireShape::NeverSends),
        Classification::CustomNoBody => Ok(WireShape::HandWritten),
    }
}

fn basic_layout(f: &FunctionSpec) -> Result<RequestLayout, Diagnostic> {
    let mut header = Vec::with_capacity(f.params.len());
    let mut trailing = Vec::new();
    for p in &f.params {
        if p.is_buffer {
            header.push(HeaderField::BufferLength {
                name: p.name.clone(),
            });
            trailing.push(segment(f, &p.name)?);
        } else {
            header.push(HeaderField::Scalar {
                name: p.name.clone(),
                ty: p.ty.clone(),
            });
        }
    }
    let response = if f.return_type.is_void() {
        Response::None
    } else {
        Response::Value {
            ty: f.return_type.clone(),
        }
    };
    Ok(RequestLayout {
        command_id: f.id,
        header,
        trailing,
        response,
    })
}

fn allocate_layout(f: &FunctionSpec) -> Result<RequestLayout, Diagnostic> {
    let header = f
        .scalar_params()
        .map(|p| HeaderField::Scalar {
            name: p.name.clone(),
            ty: p.ty.clone(),
        })
        .collect();
    let Some(ids) = f.buffer_params().next() else {
        return Err(internal(f, "allocating function without an id buffer"));
    };
    let seg = segment(f, &ids.name)?;
    Ok(RequestLayout {
        command_id: f.id,
        header,
        trailing: Vec::new(),
        response: Response::IntoBuffer {
            param: seg.param,
            element_ty: seg.element_ty,
            count: seg.count,
        },
    })
}

fn segment(f: &FunctionSpec, param: &str) -> Result<TrailingSegment, Diagnostic> {
    let p = f
        .param(param)
        .ok_or_else(|| internal(f, &format!("no parameter {param}")))?;
    let count = f
        .size_of(p)
        .ok_or_else(|| internal(f, &format!("{param} has no length expression")))?;
    Ok(TrailingSegment {
        param: p.name.clone(),
        element_ty: p.ty.clone(),
        count,
    })
}

fn internal(f: &FunctionSpec, msg: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::Glm0901InternalBug,
        format!("{}: {msg}", f.name),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Int(i64),
    Float(f64),
    /// A buffer parameter; `None` is a null pointer.
    Buffer(Option<&'a [u8]>),
}

impl RequestLayout {
    pub fn header_len(&self) -> Result<usize, Diagnostic> {
        let mut n = COMMAND_TAG_BYTES;
        for field in &self.header {
            n += match field {
                HeaderField::Scalar { name, ty } => value_size(ty, name)?,
                HeaderField::BufferLength { .. } => BUFFER_LENGTH_BYTES,
            };
        }
        Ok(n)
    }
}

pub fn response_len(
    f: &FunctionSpec,
    args: &[Arg<'_>],
    external: &dyn ExternalSizes,
) -> Result<usize, Diagnostic> {
    let WireShape::Request(layout) = shape_of(f)? else {
        return Ok(0);
    };
    match &layout.response {
        Response::None => Ok(0),
        Response::Value { ty } => value_size(ty, "return value"),
        Response::IntoBuffer {
            param,
            element_ty,
            count,
        } => {
            let scalars = scalar_values(f, args)?;
            let n = count.element_count(&scalars, external)?;
            byte_len(element_ty, param, n)
        }
    }
}

/// Encodes one call the way the generated wrapper does.
pub fn encode_request(
    f: &FunctionSpec,
    args: &[Arg<'_>],
    external: &dyn ExternalSizes,
) -> Result<Vec<u8>, Diagnostic> {
    let WireShape::Request(layout) = shape_of(f)? else {
        return Err(codec_err(
            f,
            &format!("{} functions never send a request", f.classification),
        ));
    };
    if args.len() != f.params.len() {
        return Err(codec_err(
            f,
            &format!("expected {} arguments, got {}", f.params.len(), args.len()),
        ));
    }
    let scalars = scalar_values(f, args)?;
    let arg_of = |name: &str| {
        f.params
            .iter()
            .position(|p| p.name == name)
            .map(|i| args[i])
            .ok_or_else(|| internal(f, &format!("no parameter {name}")))
    };

    let mut out = Vec::with_capacity(layout.header_len()?);
    out.extend_from_slice(&layout.command_id.to_le_bytes());

    let mut payloads: Vec<&[u8]> = Vec::new();
    for field in &layout.header {
        match field {
            HeaderField::Scalar { name, ty } => {
                let size = value_size(ty, name)?;
                match arg_of(name)? {
                    Arg::Int(v) if !ty.is_floating() => {
                        out.extend_from_slice(&v.to_le_bytes()[..size.min(8)])
                    }
                    Arg::Float(v) if ty.is_floating() && size == 4 => {
                        out.extend_from_slice(&(v as f32).to_le_bytes())
                    }
                    Arg::Float(v) if ty.is_floating() && size == 8 => {
                        out.extend_from_slice(&v.to_le_bytes())
                    }
                    other => {
                        return Err(codec_err(
                            f,
                            &format!("{name} ({ty}) cannot take {other:?}"),
                        ))
                    }
                }
            }
            HeaderField::BufferLength { name } => {
                let Arg::Buffer(buf) = arg_of(name)? else {
                    return Err(codec_err(f, &format!("{name} expects a buffer argument")));
                };
                let Some(bytes) = buf else {
                    out.extend_from_slice(&0u64.to_le_bytes());
                    continue;
                };
                let Some(seg) = layout.trailing.iter().find(|s| &s.param == name) else {
                    return Err(internal(f, &format!("{name} has no trailing segment")));
                };
                let n = seg.count.element_count(&scalars, external)?;
                let len = byte_len(&seg.element_ty, name, n)?;
                if bytes.len() < len {
                    return Err(codec_err(
                        f,
                        &format!("{name} holds {} bytes but its length is {len}", bytes.len()),
                    ));
                }
                out.extend_from_slice(&(len as u64).to_le_bytes());
                payloads.push(&bytes[..len]);
            }
        }
    }
    for payload in payloads {
        out.extend_from_slice(payload);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest {
    pub command_id: u32,
    pub name: String,
    pub scalars: Vec<(String, Vec<u8>)>,
    pub buffers: Vec<(String, Option<Vec<u8>>)>,
    pub consumed: usize,
}

pub struct RequestDecoder<'f> {
    by_id: BTreeMap<u32, (&'f FunctionSpec, RequestLayout)>,
}

impl<'f> RequestDecoder<'f> {
    pub fn new(functions: &'f [FunctionSpec]) -> Result<Self, Diagnostic> {
        let mut by_id = BTreeMap::new();
        for f in functions {
            if let WireShape::Request(layout) = shape_of(f)? {
                by_id.insert(f.id, (f, layout));
            }
        }
        Ok(RequestDecoder { by_id })
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedRequest, Diagnostic> {
        let mut r = Reader { bytes, pos: 0 };
        let tag = u32::from_le_bytes(r.take_array::<4>()?);
        let Some((f, layout)) = self.by_id.get(&tag) else {
            return Err(Diagnostic::error(
                DiagnosticCode::Glm0500CodecArgs,
                format!("unknown command tag {tag}"),
            ));
        };

        let mut scalars = Vec::new();
        let mut lengths: Vec<(String, u64)> = Vec::new();
        for field in &layout.header {
            match field {
                HeaderField::Scalar { name, ty } => {
                    let size = value_size(ty, name)?;
                    scalars.push((name.clone(), r.take(size)?.to_vec()));
                }
                HeaderField::BufferLength { name } => {
                    lengths.push((name.clone(), u64::from_le_bytes(r.take_array::<8>()?)));
                }
            }
        }
        let mut buffers = Vec::with_capacity(lengths.len());
        for (name, len) in lengths {
            let len = usize::try_from(len).map_err(|_| codec_err(f, "buffer length overflow"))?;
            let body = if len == 0 {
                None
            } else {
                Some(r.take(len)?.to_vec())
            };
            buffers.push((name, body));
        }
        Ok(DecodedRequest {
            command_id: tag,
            name: f.name.clone(),
            scalars,
            buffers,
            consumed: r.pos,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Diagnostic> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.bytes.len());
        let Some(end) = end else {
            return Err(Diagnostic::error(
                DiagnosticCode::Glm0500CodecArgs,
                format!(
                    "truncated request: need {n} bytes at offset {}, have {}",
                    self.pos,
                    self.bytes.len() - self.pos
                ),
            ));
        };
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], Diagnostic> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

fn scalar_values(
    f: &FunctionSpec,
    args: &[Arg<'_>],
) -> Result<BTreeMap<String, i64>, Diagnostic> {
    if args.len() != f.params.len() {
        return Err(codec_err(
            f,
            &format!("expected {} arguments, got {}", f.params.len(), args.len()),
        ));
    }
    Ok(f.params
        .iter()
        .zip(args)
        .filter_map(|(p, a)| match a {
            Arg::Int(v) if p.is_scalar() => Some((p.name.clone(), *v)),
            _ => None,
        })
        .collect())
}

fn value_size(ty: &CType, what: &str) -> Result<usize, Diagnostic> {
    ty.value_size().ok_or_else(|| {
        Diagnostic::error(
            DiagnosticCode::Glm0500CodecArgs,
            format!("size of {what} type {ty} is unknown"),
        )
    })
}

fn byte_len(element_ty: &CType, param: &str, count: u64) -> Result<usize, Diagnostic> {
    let elem = element_ty.element_size().ok_or_else(|| {
        Diagnostic::error(
            DiagnosticCode::Glm0500CodecArgs,
            format!("element size of {param} ({element_ty}) is unknown"),
        )
    })?;
    usize::try_from(count)
        .ok()
        .and_then(|n| n.checked_mul(elem))
        .ok_or_else(|| {
            Diagnostic::error(
                DiagnosticCode::Glm0500CodecArgs,
                format!("byte length of {param} overflows"),
            )
        })
}

fn codec_err(f: &FunctionSpec, msg: &str) -> Diagnostic {
    Diagnostic::error(DiagnosticCode::Glm0500CodecArgs, format!("{}: {msg}", f.name))
}
