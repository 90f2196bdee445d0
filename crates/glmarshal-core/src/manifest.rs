use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use glmarshal_contracts::{MANIFEST_SCHEMA_VERSION, WIRE_PROTOCOL_VERSION};

use crate::classify::Classification;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::functions::FunctionSpec;
use crate::param::ParameterSpec;
use crate::size_expr::SizeExpression;
use crate::wire::{self, WireShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestFormat {
    #[default]
    Csv,
    Json,
}

impl ManifestFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(ManifestFormat::Csv),
            "json" => Some(ManifestFormat::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(ManifestFormat::parse)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub name: String,
    pub classification: Classification,
    pub id: u32,
}

pub fn manifest_rows(functions: &[FunctionSpec]) -> Vec<ManifestRow> {
    let mut rows: Vec<ManifestRow> = functions
        .iter()
        .map(|f| ManifestRow {
            name: f.name.clone(),
            classification: f.classification,
            id: f.id,
        })
        .collect();
    rows.sort_by_key(|r| r.id);
    rows
}

pub fn render_csv(functions: &[FunctionSpec]) -> String {
    let mut out = String::new();
    for row in manifest_rows(functions) {
        out.push_str(&format!(
            "{},{},{}\n",
            row.name,
            row.classification.manifest_tag(),
            row.id
        ));
    }
    out
}

pub fn parse_manifest_csv(text: &str) -> Result<Vec<ManifestRow>, Diagnostic> {
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bad = |what: &str| {
            Diagnostic::error(
                DiagnosticCode::Glm0500CodecArgs,
                format!("manifest line {}: {what}: {line:?}", idx + 1),
            )
        };
        let fields: Vec<&str> = line.split(',').collect();
        let [name, tag, id] = fields.as_slice() else {
            return Err(bad("expected name,type,id"));
        };
        let classification =
            Classification::from_manifest_tag(tag).ok_or_else(|| bad("unknown type"))?;
        let id: u32 = id.parse().map_err(|_| bad("invalid id"))?;
        rows.push(ManifestRow {
            name: name.to_string(),
            classification,
            id,
        });
    }
    Ok(rows)
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestDoc {
    schema_version: String,
    wire_protocol_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_sha256: Option<String>,
    functions: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    id: u32,
    name: String,
    #[serde(rename = "type")]
    tag: String,
    return_type: String,
    params: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alias_target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sizes: Vec<SizeEntry>,
    #[serde(skip_deserializing, default = "no_shape")]
    wire: Option<WireShape>,
}

fn no_shape() -> Option<WireShape> {
    None
}

#[derive(Debug, Serialize, Deserialize)]
struct SizeEntry {
    param: String,
    #[serde(flatten)]
    size: SizeExpression,
}

pub fn render_json(functions: &[FunctionSpec], source_sha256: Option<&str>) -> Result<String> {
    let mut ordered: Vec<&FunctionSpec> = functions.iter().collect();
    ordered.sort_by_key(|f| f.id);

    let mut entries = Vec::with_capacity(ordered.len());
    for f in ordered {
        let sizes = f
            .buffer_params()
            .filter_map(|p| {
                f.size_of(p).map(|size| SizeEntry {
                    param: p.name.clone(),
                    size,
                })
            })
            .collect();
        entries.push(ManifestEntry {
            id: f.id,
            name: f.name.clone(),
            tag: f.classification.manifest_tag().to_string(),
            return_type: f.return_type.as_str().to_string(),
            params: f.params.clone(),
            alias_target: f.alias_target.clone(),
            sizes,
            wire: Some(wire::shape_of(f)?),
        });
    }
    let doc = ManifestDoc {
        schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
        wire_protocol_version: WIRE_PROTOCOL_VERSION,
        source_sha256: source_sha256.map(str::to_string),
        functions: entries,
    };
    Ok(serde_json::to_string_pretty(&doc)? + "\n")
}

pub fn parse_manifest_json(bytes: &[u8]) -> Result<Vec<ManifestRow>> {
    let doc: ManifestDoc = serde_json::from_slice(bytes).map_err(|err| {
        Diagnostic::error(
            DiagnosticCode::Glm0500CodecArgs,
            format!("parse manifest JSON: {err}"),
        )
    })?;
    if doc.schema_version.trim() != MANIFEST_SCHEMA_VERSION {
        anyhow::bail!(
            "manifest schema_version mismatch: expected {MANIFEST_SCHEMA_VERSION} got {:?}",
            doc.schema_version
        );
    }
    doc.functions
        .into_iter()
        .map(|e| {
            let classification = Classification::from_manifest_tag(&e.tag)
                .ok_or_else(|| anyhow::anyhow!("{}: unknown type {:?}", e.name, e.tag))?;
            Ok(ManifestRow {
                name: e.name,
                classification,
                id: e.id,
            })
        })
        .collect()
}

pub fn render(
    format: ManifestFormat,
    functions: &[FunctionSpec],
    source_sha256: Option<&str>,
) -> Result<String> {
    match format {
        ManifestFormat::Csv => Ok(render_csv(functions)),
        ManifestFormat::Json => render_json(functions, source_sha256),
    }
}
