//! toolflow: run contract-checked generative tasks from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use toolflow::config::Config;
use toolflow::registry::TaskInfo;
use toolflow::{TaskName, TaskRegistry};

/// Run contract-checked generative tasks
#[derive(Parser)]
#[command(name = "toolflow")]
#[command(about = "Run contract-checked generative tasks", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true, env = "TOOLFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every task with its strategy and description
    List,

    /// Print a task's JSON Schema
    Schema {
        /// Task name, e.g. format-code
        task: String,

        /// Print the output schema instead of the input schema
        #[arg(long)]
        output: bool,
    },

    /// Run a task and print its output as JSON
    Run {
        /// Task name, e.g. shorten-url
        task: String,

        /// Input as an inline JSON object
        #[arg(long, conflicts_with = "input_file", required_unless_present = "input_file")]
        input: Option<String>,

        /// Read the input JSON from a file ("-" for stdin)
        #[arg(long)]
        input_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    toolflow::logging::init(&cli.log_level);
    execute_command(cli)
}

fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::List => {
            for info in catalogue()? {
                println!("{:<26} {:<13} {}", info.name.as_str(), info.strategy, info.description);
            }
        },
        Commands::Schema { task, output } => {
            let name: TaskName = task.parse()?;
            let info = catalogue()?
                .into_iter()
                .find(|info| info.name == name)
                .with_context(|| format!("task '{name}' is not in the catalogue"))?;
            let schema = if output {
                info.output_schema
            } else {
                info.input_schema
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        },
        Commands::Run {
            task,
            input,
            input_file,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let raw = read_input(input, input_file.as_deref())?;
            let registry =
                TaskRegistry::from_config(&config).context("failed to set up the task registry")?;

            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            let output = runtime.block_on(registry.run(&task, raw))?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        },
    }
    Ok(())
}

fn catalogue() -> Result<Vec<TaskInfo>> {
    let definitions = toolflow::tasks::catalogue().context("built-in templates failed to parse")?;
    Ok(definitions.iter().map(TaskInfo::from).collect())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::from_env()),
    }
}

fn read_input(inline: Option<String>, file: Option<&Path>) -> Result<Value> {
    let text = match (inline, file) {
        (Some(inline), _) => inline,
        (None, Some(path)) if path == Path::new("-") => {
            std::io::read_to_string(std::io::stdin()).context("failed to read input from stdin")?
        },
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file '{}'", path.display()))?,
        (None, None) => anyhow::bail!("either --input or --input-file is required"),
    };
    serde_json::from_str(&text).context("input is not valid JSON")
}
