mod cmd;
mod input;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

/// kubearm - deployment template generator for Kubernetes clusters
#[derive(Parser)]
#[command(name = "kubearm")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Generate the deployment template for a cluster model
  Generate {
    /// Path to the cluster model (JSON, or YAML with a .yaml/.yml extension)
    model: PathBuf,

    /// Write the template here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    format: OutputFormat,

    /// Directory holding provisioning scripts and custom data files
    #[arg(long)]
    scripts_dir: Option<PathBuf>,
  },

  /// Print the derived template variables
  Variables {
    /// Path to the cluster model
    model: PathBuf,

    /// Print only this variable's value
    #[arg(short, long)]
    key: Option<String>,

    /// Directory holding provisioning scripts and custom data files
    #[arg(long)]
    scripts_dir: Option<PathBuf>,
  },

  /// Show resources in dependency order
  Graph {
    /// Path to the cluster model
    model: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Generate {
      model,
      output,
      format,
      scripts_dir,
    } => cmd::cmd_generate(&model, output.as_deref(), format, scripts_dir.as_deref()),
    Commands::Variables { model, key, scripts_dir } => {
      cmd::cmd_variables(&model, key.as_deref(), scripts_dir.as_deref())
    }
    Commands::Graph { model, format } => cmd::cmd_graph(&model, format),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      output::print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}
