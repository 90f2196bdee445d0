pub mod khronos_xml;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use glmarshal_contracts::REGISTRY_JSON_SCHEMA_VERSION;

use crate::ctype::CType;
use crate::diagnostics::{Diagnostic, DiagnosticCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandParam {
    #[serde(rename = "type")]
    pub ty: CType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Command {
    pub name: String,
    pub return_type: CType,
    #[serde(default)]
    pub params: Vec<CommandParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl ExtensionGroup {
    pub fn supports_api(&self, api: &str) -> bool {
        match &self.supported {
            Some(s) => s.split('|').any(|a| a.trim() == api),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryFormat {
    Xml,
    Json,
}

impl RegistryFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("xml") => Some(RegistryFormat::Xml),
            Some("json") => Some(RegistryFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RegistryDoc {
    schema_version: String,
    commands: Vec<Command>,
    #[serde(default)]
    features: Vec<FeatureGroup>,
    #[serde(default)]
    extensions: Vec<ExtensionGroup>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    commands: BTreeMap<String, Command>,
    features: Vec<FeatureGroup>,
    extensions: Vec<ExtensionGroup>,
    source_sha256: Option<String>,
}

impl Registry {
    pub fn from_parts(
        commands: Vec<Command>,
        features: Vec<FeatureGroup>,
        extensions: Vec<ExtensionGroup>,
    ) -> Result<Self, Diagnostic> {
        let mut by_name: BTreeMap<String, Command> = BTreeMap::new();
        for cmd in commands {
            let name = cmd.name.clone();
            if by_name.insert(name.clone(), cmd).is_some() {
                return Err(Diagnostic::error(
                    DiagnosticCode::Glm0102DuplicateCommand,
                    format!("command {name} is defined more than once"),
                ));
            }
        }
        Ok(Registry {
            commands: by_name,
            features,
            extensions,
            source_sha256: None,
        })
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let doc: RegistryDoc = serde_json::from_slice(bytes).map_err(|err| {
            Diagnostic::error(
                DiagnosticCode::Glm0001RegistryParse,
                format!("parse registry JSON: {err}"),
            )
        })?;
        if doc.schema_version.trim() != REGISTRY_JSON_SCHEMA_VERSION {
            return Err(Diagnostic::error(
                DiagnosticCode::Glm0001RegistryParse,
                format!(
                    "registry schema_version mismatch: expected {REGISTRY_JSON_SCHEMA_VERSION} got {:?}",
                    doc.schema_version
                ),
            )
            .into());
        }
        let mut reg = Registry::from_parts(doc.commands, doc.features, doc.extensions)?;
        reg.source_sha256 = Some(crate::util::sha256_hex(bytes));
        Ok(reg)
    }

    pub fn from_xml_str(text: &str) -> Result<Self> {
        let mut reg = khronos_xml::parse_registry(text)?;
        reg.source_sha256 = Some(crate::util::sha256_hex(text.as_bytes()));
        Ok(reg)
    }

    pub fn load(path: &Path, format: Option<RegistryFormat>) -> Result<Self> {
        let format = match format.or_else(|| RegistryFormat::from_path(path)) {
            Some(f) => f,
            None => anyhow::bail!(
                "cannot infer registry format from {} (expected .xml or .json)",
                path.display()
            ),
        };
        let bytes =
            std::fs::read(path).with_context(|| format!("read registry: {}", path.display()))?;
        match format {
            RegistryFormat::Json => Registry::from_json_slice(&bytes),
            RegistryFormat::Xml => {
                let text = std::str::from_utf8(&bytes)
                    .with_context(|| format!("registry is not UTF-8: {}", path.display()))?;
                Registry::from_xml_str(text)
            }
        }
        .with_context(|| format!("load registry: {}", path.display()))
    }

    pub fn to_json_string(&self) -> Result<String> {
        let doc = RegistryDoc {
            schema_version: REGISTRY_JSON_SCHEMA_VERSION.to_string(),
            commands: self.commands.values().cloned().collect(),
            features: self.features.clone(),
            extensions: self.extensions.clone(),
        };
        Ok(serde_json::to_string_pretty(&doc)? + "\n")
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn features(&self) -> &[FeatureGroup] {
        &self.features
    }

    pub fn extensions(&self) -> &[ExtensionGroup] {
        &self.extensions
    }

    pub fn source_sha256(&self) -> Option<&str> {
        self.source_sha256.as_deref()
    }
}
