use std::collections::BTreeMap;

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::overrides::{ExtensionFilter, SelectionConfig};
use crate::registry::{Command, Registry};

#[derive(Debug, Clone)]
pub struct Selection<'r> {
    pub commands: BTreeMap<String, &'r Command>,
    pub features: Vec<String>,
    pub extensions: Vec<String>,
}

impl Selection<'_> {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }
}

pub fn select<'r>(registry: &'r Registry, cfg: &SelectionConfig) -> Result<Selection<'r>> {
    let mut commands: BTreeMap<String, &'r Command> = BTreeMap::new();
    let mut features: Vec<String> = Vec::new();
    let mut extensions: Vec<String> = Vec::new();

    let api_selected = |api: Option<&str>| {
        cfg.feature_apis.is_empty()
            || api.is_some_and(|a| cfg.feature_apis.iter().any(|x| x == a))
    };

    for feature in registry.features() {
        if !api_selected(feature.api.as_deref()) {
            continue;
        }
        for name in &feature.commands {
            commands.insert(name.clone(), lookup(registry, name, &feature.name)?);
        }
        debug!(feature = %feature.name, commands = feature.commands.len(), "selected feature");
        features.push(feature.name.clone());
    }

    if cfg.extensions.enabled {
        let allow = build_allow_set(&cfg.extensions)?;
        for ext in registry.extensions() {
            if !allow.is_match(&ext.name) || cfg.extensions.deny.contains(&ext.name) {
                continue;
            }
            if !cfg.feature_apis.is_empty()
                && !cfg.feature_apis.iter().any(|api| ext.supports_api(api))
            {
                continue;
            }
            for name in &ext.commands {
                commands.insert(name.clone(), lookup(registry, name, &ext.name)?);
            }
            debug!(extension = %ext.name, commands = ext.commands.len(), "selected extension");
            extensions.push(ext.name.clone());
        }
    }

    for denied in &cfg.deny_commands {
        if commands.remove(denied).is_some() {
            debug!(command = %denied, "command denied by selection config");
        }
    }

    for cmd in commands.values() {
        if let Some(target) = &cmd.alias {
            if registry.command(target).is_none() {
                return Err(Diagnostic::error(
                    DiagnosticCode::Glm0101UndefinedAliasTarget,
                    format!("{} is an alias of {target}, which is not defined", cmd.name),
                )
                .into());
            }
        }
    }

    Ok(Selection {
        commands,
        features,
        extensions,
    })
}

fn lookup<'r>(registry: &'r Registry, name: &str, group: &str) -> Result<&'r Command, Diagnostic> {
    registry.command(name).ok_or_else(|| {
        Diagnostic::error(
            DiagnosticCode::Glm0100UndefinedCommand,
            format!("{group} requires {name}, which is not defined"),
        )
    })
}

fn build_allow_set(filter: &ExtensionFilter) -> Result<GlobSet, Diagnostic> {
    let mut builder = GlobSetBuilder::new();
    for pattern in &filter.allow {
        let glob = Glob::new(pattern).map_err(|err| {
            Diagnostic::error(
                DiagnosticCode::Glm0400InvalidOverrides,
                format!("invalid extension pattern {pattern:?}: {err}"),
            )
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|err| {
        Diagnostic::error(
            DiagnosticCode::Glm0400InvalidOverrides,
            format!("build extension allow set: {err}"),
        )
    })
}
