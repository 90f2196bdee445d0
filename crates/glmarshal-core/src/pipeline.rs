use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::c_emit::{emit_implementation, GenMeta};
use crate::classify::Classification;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::functions::{build_functions, FunctionSpec};
use crate::header_emit::emit_header;
use crate::manifest::{self, ManifestFormat};
use crate::overrides::OverrideTables;
use crate::registry::Registry;
use crate::select::select;

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub tables: OverrideTables,
    pub manifest_format: ManifestFormat,
    pub header_include: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        GenerateOptions {
            tables: OverrideTables::default(),
            manifest_format: ManifestFormat::Csv,
            header_include: "glm_commands.h".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Artifacts {
    pub implementation: String,
    pub header: String,
    pub manifest: String,
    pub functions: Vec<FunctionSpec>,
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub implementation: PathBuf,
    pub header: PathBuf,
    pub manifest: PathBuf,
}

pub fn classify_registry(registry: &Registry, tables: &OverrideTables) -> Result<Vec<FunctionSpec>> {
    let selection = select(registry, &tables.selection)?;
    let functions = build_functions(&selection, tables)?;
    check_ids(&functions)?;
    Ok(functions)
}

pub fn generate(registry: &Registry, opts: &GenerateOptions) -> Result<Artifacts> {
    let functions = classify_registry(registry, &opts.tables)?;
    let meta = GenMeta {
        header_include: opts.header_include.clone(),
        source_sha256: registry.source_sha256().map(str::to_string),
    };
    let abi = &opts.tables.runtime;

    let implementation = emit_implementation(&functions, abi, &meta)?;
    let header = emit_header(&functions, abi, &meta);
    let manifest = manifest::render(
        opts.manifest_format,
        &functions,
        registry.source_sha256(),
    )?;

    for c in Classification::ALL {
        let n = functions.iter().filter(|f| f.classification == c).count();
        info!(classification = %c, count = n, "classified functions");
    }
    info!(total = functions.len(), "generated wrappers");

    Ok(Artifacts {
        implementation,
        header,
        manifest,
        functions,
    })
}

/// `#include` path of the header as seen from the implementation file's
/// directory. Falls back to the header path as given when the two paths
/// cannot be related lexically (one absolute, or `..` components).
pub fn header_include_path(implementation: &Path, header: &Path) -> String {
    let from_dir = implementation.parent().unwrap_or_else(|| Path::new(""));
    let related = from_dir.is_absolute() == header.is_absolute()
        && !has_parent_dir(from_dir)
        && !has_parent_dir(header);
    if !related {
        return header.display().to_string();
    }
    let from = path_parts(from_dir);
    let to = path_parts(header);
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(to[common..].iter().cloned());
    parts.join("/")
}

fn has_parent_dir(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

fn path_parts(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().into_owned()),
            Component::RootDir | Component::CurDir | Component::ParentDir => None,
        })
        .collect()
}

/// Ids must be unique and run 1..=N so the manifest and the enumeration
/// describe the same dense table.
fn check_ids(functions: &[FunctionSpec]) -> Result<(), Diagnostic> {
    let ids: BTreeSet<u32> = functions.iter().map(|f| f.id).collect();
    let dense = ids.len() == functions.len()
        && ids.iter().copied().eq(1..=functions.len() as u32);
    if dense {
        Ok(())
    } else {
        Err(Diagnostic::error(
            DiagnosticCode::Glm0901InternalBug,
            "command ids are not unique and contiguous from 1",
        ))
    }
}

impl Artifacts {
    fn outputs<'a>(&'a self, paths: &'a ArtifactPaths) -> [(&'a Path, &'a str); 3] {
        [
            (paths.implementation.as_path(), self.implementation.as_str()),
            (paths.header.as_path(), self.header.as_str()),
            (paths.manifest.as_path(), self.manifest.as_str()),
        ]
    }

    /// Stages every artifact in a sibling temp file, then renames them all.
    /// A failed stage removes the temp files already written and leaves the
    /// previous outputs in place.
    pub fn write(&self, paths: &ArtifactPaths) -> Result<()> {
        let mut staged: Vec<(PathBuf, &Path)> = Vec::new();
        for (path, contents) in self.outputs(paths) {
            match stage(path, contents) {
                Ok(tmp) => staged.push((tmp, path)),
                Err(err) => {
                    discard(&staged);
                    return Err(err);
                }
            }
        }
        for (i, (tmp, path)) in staged.iter().enumerate() {
            if let Err(err) = std::fs::rename(tmp, path) {
                discard(&staged[i..]);
                return Err(err)
                    .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()));
            }
        }
        Ok(())
    }

    pub fn check(&self, paths: &ArtifactPaths) -> Result<()> {
        let mut stale = Vec::new();
        for (path, contents) in self.outputs(paths) {
            match std::fs::read_to_string(path) {
                Ok(cur) if cur == contents => {}
                Ok(_) => stale.push(path.display().to_string()),
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("read existing output: {}", path.display()))
                }
            }
        }
        if !stale.is_empty() {
            anyhow::bail!("generated output differs: {}", stale.join(", "));
        }
        Ok(())
    }
}

fn stage(path: &Path, contents: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("output path has no file name: {}", path.display()))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&tmp, contents.as_bytes())
        .with_context(|| format!("write output: {}", tmp.display()))?;
    Ok(tmp)
}

fn discard(staged: &[(PathBuf, &Path)]) {
    for (tmp, _) in staged {
        if let Err(err) = std::fs::remove_file(tmp) {
            warn!(path = %tmp.display(), error = %err, "could not remove temp output");
        }
    }
}
