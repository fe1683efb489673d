//! CLI argument definitions using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use arbiter_core::ArbiterConfig;

use crate::commands;
use crate::output::OutputFormat;

/// Arbiter - request orchestration and admission control
#[derive(Parser, Debug)]
#[command(name = "arbiter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (YAML). Built-in defaults when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a request through the full graph
    #[command(visible_alias = "run")]
    Invoke(commands::invoke::InvokeArgs),

    /// Show the complexity tier a request would get
    Classify(commands::classify::ClassifyArgs),

    /// Score a request with the heuristic evaluators, without executing it
    Score(commands::score::ScoreArgs),

    /// Validate a configuration file and check its backends
    Validate(commands::validate::ValidateArgs),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config_path = self.config.as_deref();
        match self.command {
            Commands::Invoke(args) => commands::invoke::execute(args, load_config(config_path)?, self.format).await,
            Commands::Classify(args) => commands::classify::execute(args, load_config(config_path)?, self.format),
            Commands::Score(args) => commands::score::execute(args, load_config(config_path)?, self.format),
            Commands::Validate(args) => commands::validate::execute(args, config_path, self.format).await,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<ArbiterConfig> {
    match path {
        Some(path) => ArbiterConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ArbiterConfig::default()),
    }
}
