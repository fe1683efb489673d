//! Score command - offline admission verdict with heuristic evaluators.

use anyhow::Result;
use clap::Args;

use arbiter_core::{evaluate_offline, ArbiterConfig, Complexity};

use crate::commands::invoke::print_evidence;
use crate::output::{emit, OutputFormat};

/// Arguments for the score command.
#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Request text
    #[arg(required = true)]
    pub command: Vec<String>,

    /// Skip classification and use this tier (low, medium, high)
    #[arg(long)]
    pub complexity: Option<Complexity>,
}

pub fn execute(args: ScoreArgs, config: ArbiterConfig, format: OutputFormat) -> Result<()> {
    let verdict = evaluate_offline(&config, &args.command.join(" "), args.complexity)?;

    emit(format, &verdict.evidence, |evidence| {
        println!("decision:   {}", evidence.decision);
        println!("complexity: {}", evidence.complexity);
        print_evidence(evidence);
    })
}
