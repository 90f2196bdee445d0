use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use glmarshal_contracts::CLASSIFY_REPORT_SCHEMA_VERSION;
use glmarshal_core::manifest::ManifestFormat;
use glmarshal_core::overrides::OverrideTables;
use glmarshal_core::pipeline::{self, ArtifactPaths, GenerateOptions};
use glmarshal_core::registry::{Registry, RegistryFormat};

#[derive(Parser, Debug)]
#[command(name = "glmarshal")]
#[command(about = "Generates GL command marshalling wrappers from the API registry.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RegistryFormatArg {
    Xml,
    Json,
}

impl From<RegistryFormatArg> for RegistryFormat {
    fn from(v: RegistryFormatArg) -> Self {
        match v {
            RegistryFormatArg::Xml => RegistryFormat::Xml,
            RegistryFormatArg::Json => RegistryFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ManifestFormatArg {
    Csv,
    Json,
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Registry file (`.xml` or `.json`).
    #[arg(long)]
    registry: PathBuf,
    /// Overrides the format inferred from the registry's extension.
    #[arg(long, value_enum)]
    registry_format: Option<RegistryFormatArg>,
    /// Override tables (JSON). Built-in defaults when omitted.
    #[arg(long)]
    overrides: Option<PathBuf>,
    /// Also select commands from allowed extension groups.
    #[arg(long, default_value_t = false)]
    extensions: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the implementation source, header and manifest.
    Generate {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        out_c: PathBuf,
        #[arg(long)]
        out_h: PathBuf,
        #[arg(long)]
        out_manifest: PathBuf,
        /// Defaults to the manifest path's extension, else csv.
        #[arg(long, value_enum)]
        manifest_format: Option<ManifestFormatArg>,
        /// If set, fail if any output differs; do not write.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Print the classification of every selected command as JSON.
    Classify {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print the diagnostics catalog (markdown).
    Diagnostics,
}

fn main() -> Result<()> {
    init_tracing();
    try_main().map_err(|err| {
        eprintln!("{err:#}");
        err
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate {
            input,
            out_c,
            out_h,
            out_manifest,
            manifest_format,
            check,
        } => {
            let paths = ArtifactPaths {
                implementation: out_c,
                header: out_h,
                manifest: out_manifest,
            };
            run_generate(&input, &paths, manifest_format, check)
        }
        Command::Classify { input } => run_classify(&input),
        Command::Diagnostics => {
            print!("{}", glmarshal_core::diagnostics::render_diagnostics_md());
            Ok(())
        }
    }
}

fn load_inputs(input: &InputArgs) -> Result<(Registry, OverrideTables)> {
    let registry = Registry::load(&input.registry, input.registry_format.map(Into::into))?;
    let mut tables = match &input.overrides {
        Some(path) => OverrideTables::load(path)?,
        None => OverrideTables::default(),
    };
    if input.extensions {
        tables.selection.extensions.enabled = true;
    }
    Ok((registry, tables))
}

fn run_generate(
    input: &InputArgs,
    paths: &ArtifactPaths,
    manifest_format: Option<ManifestFormatArg>,
    check: bool,
) -> Result<()> {
    let (registry, tables) = load_inputs(input)?;
    let manifest_format = match manifest_format {
        Some(ManifestFormatArg::Csv) => ManifestFormat::Csv,
        Some(ManifestFormatArg::Json) => ManifestFormat::Json,
        None => ManifestFormat::from_path(&paths.manifest).unwrap_or_default(),
    };
    let opts = GenerateOptions {
        tables,
        manifest_format,
        header_include: pipeline::header_include_path(&paths.implementation, &paths.header),
    };
    let artifacts = pipeline::generate(&registry, &opts)?;
    if check {
        artifacts.check(paths)
    } else {
        artifacts.write(paths)
    }
}

#[derive(Debug, Serialize)]
struct ClassifyReport {
    schema_version: &'static str,
    source_sha256: Option<String>,
    functions: Vec<ClassifyRow>,
}

#[derive(Debug, Serialize)]
struct ClassifyRow {
    id: u32,
    name: String,
    classification: glmarshal_core::classify::Classification,
    prototype: String,
    dispatches_by_id: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias_target: Option<String>,
}

fn run_classify(input: &InputArgs) -> Result<()> {
    let (registry, tables) = load_inputs(input)?;
    let functions = pipeline::classify_registry(&registry, &tables)?;
    let report = ClassifyReport {
        schema_version: CLASSIFY_REPORT_SCHEMA_VERSION,
        source_sha256: registry.source_sha256().map(str::to_string),
        functions: functions
            .iter()
            .map(|f| ClassifyRow {
                id: f.id,
                name: f.name.clone(),
                classification: f.classification,
                prototype: f.prototype(),
                dispatches_by_id: f.classification.dispatches_by_id(),
                alias_target: f.alias_target.clone(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
