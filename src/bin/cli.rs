use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use flowpilot::prelude::*;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowpilot")]
#[command(about = "Run declarative workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single workflow file and print the final execution as JSON
    Run {
        /// Path to the workflow YAML or JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Trigger data as an inline JSON object
        #[arg(short, long, conflicts_with = "data_file")]
        data: Option<String>,

        /// Trigger data read from a JSON file
        #[arg(long, value_name = "PATH")]
        data_file: Option<PathBuf>,

        /// Path to engine.yaml (default: engine.yaml next to FILE, if present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a workflow file, or every workflow in a directory
    Validate {
        /// Path to workflow file or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// List workflows in a directory
    List {
        /// Path to the workflows directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "flowpilot=debug" } else { "flowpilot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "flowpilot failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run {
            file,
            data,
            data_file,
            config,
        } => run_single(file, data, data_file, config).await,
        Commands::Validate { path } => validate(path),
        Commands::List { dir } => list_workflows(dir),
    }
}

async fn run_single(
    file: PathBuf,
    data: Option<String>,
    data_file: Option<PathBuf>,
    config: Option<PathBuf>,
) -> anyhow::Result<bool> {
    let definition = DefinitionLoader::load_file(&file)
        .with_context(|| format!("Failed to load workflow {}", file.display()))?;
    let config = load_engine_config(&file, config)?;
    let trigger_data = load_trigger_data(data, data_file)?;

    let engine = WorkflowEngine::new(config).context("Failed to initialize engine")?;
    let workflow = engine.create_workflow(definition).await?;

    tracing::info!("Running workflow '{}'", workflow.name);
    let execution = engine.execute(&workflow.id, trigger_data).await?;

    println!("{}", serde_json::to_string_pretty(&execution)?);

    let failed_steps = execution
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Failed)
        .count();
    // Failed steps do not fail the run, but they do fail the command
    let success = execution.status == ExecutionStatus::Completed && failed_steps == 0;
    eprintln!(
        "{} '{}' {:?} ({} step(s), {} failed)",
        if success { "✓" } else { "✗" },
        workflow.name,
        execution.status,
        execution.steps.len(),
        failed_steps
    );

    Ok(success)
}

fn load_engine_config(file: &Path, explicit: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let sibling = file
                .parent()
                .map(|dir| dir.join("engine.yaml"))
                .filter(|p| p.exists());
            match sibling {
                Some(path) => path,
                None => return Ok(EngineConfig::default()),
            }
        }
    };

    EngineConfig::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn load_trigger_data(
    data: Option<String>,
    data_file: Option<PathBuf>,
) -> anyhow::Result<Map<String, Value>> {
    let raw = match (data, data_file) {
        (Some(inline), _) => inline,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => return Ok(Map::new()),
    };

    match serde_json::from_str::<Value>(&raw).context("Trigger data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("Trigger data must be a JSON object, got {}", other),
    }
}

fn validate(path: PathBuf) -> anyhow::Result<bool> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    if path.is_dir() {
        let workflows = DefinitionLoader::load_directory(&path)?;
        if workflows.is_empty() {
            println!("No workflows found in: {}", path.display());
            return Ok(true);
        }
        let steps: usize = workflows.iter().map(|w| w.steps.len()).sum();
        println!("✓ {} workflows validated, {} steps", workflows.len(), steps);
    } else {
        let workflow = DefinitionLoader::load_file(&path)?;
        println!(
            "✓ {} is valid ({} steps)",
            path.display(),
            workflow.steps.len()
        );
    }

    Ok(true)
}

fn list_workflows(dir: PathBuf) -> anyhow::Result<bool> {
    if !dir.exists() {
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    let workflows = DefinitionLoader::load_directory(&dir)?;

    if workflows.is_empty() {
        println!("No workflows found in: {}", dir.display());
        return Ok(true);
    }

    println!("Workflows in {}:\n", dir.display());

    for w in &workflows {
        let triggers = w.trigger_ids();
        println!(
            "  {} v{} ({} steps, triggers: {})",
            w.name,
            w.version,
            w.steps.len(),
            if triggers.is_empty() {
                "none".to_string()
            } else {
                triggers.join(", ")
            }
        );
    }

    Ok(true)
}
