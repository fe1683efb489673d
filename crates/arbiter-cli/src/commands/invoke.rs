//! Invoke command - run one request through the orchestration graph.

use anyhow::{bail, Result};
use clap::Args;
use std::collections::HashMap;

use arbiter_core::{ArbiterConfig, EvidenceBundle};
use arbiter_runtime::{InvocationResponse, Orchestrator, ShadowCompletion};

use crate::output::{emit, parse_pair, OutputFormat};

/// Arguments for the invoke command.
#[derive(Args, Debug)]
pub struct InvokeArgs {
    /// Request text
    #[arg(required = true)]
    pub command: Vec<String>,

    /// Context entry, e.g. `--ctx complexity=high` or `--ctx backend=claude`
    #[arg(long = "ctx", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub context: Vec<(String, String)>,

    /// Wait for the shadow run, if one starts, and print its diff
    #[arg(long)]
    pub wait_shadow: bool,
}

pub async fn execute(args: InvokeArgs, config: ArbiterConfig, format: OutputFormat) -> Result<()> {
    let shadow_timeout = config.shadow.timeout;
    let orchestrator = Orchestrator::from_config(config)?;
    let mut completions = orchestrator.shadow().take_completions();

    let command = args.command.join(" ");
    let context: HashMap<String, String> = args.context.into_iter().collect();

    let response = orchestrator.invoke(&command, &context).await;
    emit(format, &response, print_response)?;

    if response.shadow_trace_id.is_some() {
        match completions.as_mut() {
            Some(completions) if args.wait_shadow => {
                match tokio::time::timeout(shadow_timeout, completions.recv()).await {
                    Ok(Some(ShadowCompletion::Finished(diff))) => emit(format, &diff, |diff| {
                        println!(
                            "shadow {}: {} (success {}), outputs match: {}",
                            diff.secondary_profile,
                            diff.secondary_engine.as_deref().unwrap_or("-"),
                            diff.secondary_success,
                            diff.outputs_match
                        );
                    })?,
                    Ok(Some(other)) => eprintln!("shadow run {} did not finish", other.trace_id()),
                    Ok(None) | Err(_) => eprintln!("shadow run still in flight; abandoning it"),
                }
            }
            _ => {}
        }
    }
    orchestrator.shutdown();

    if !response.success {
        bail!(
            "request failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_response(response: &InvocationResponse) {
    println!("trace:      {}", response.trace_id);
    if let Some(complexity) = response.complexity {
        println!("complexity: {}", complexity);
    }
    if let Some(decision) = response.decision {
        println!("decision:   {}", decision);
    }
    if let Some(engine) = &response.engine_used {
        println!("engine:     {}", engine);
    }
    if let Some(evidence) = &response.evidence {
        print_evidence(evidence);
    }
    if let Some(ticket) = &response.ticket {
        println!();
        println!("{}", ticket.decision_point);
        for option in &ticket.options {
            println!("  - {}", option);
        }
    }
    for output in &response.outputs {
        println!();
        println!("{}", output);
    }
    if !response.errors.is_empty() {
        println!();
        for error in &response.errors {
            println!("error: {}", error);
        }
    }
    if let Some(shadow) = &response.shadow_trace_id {
        println!("shadow:     {}", shadow);
    }
}

pub fn print_evidence(evidence: &EvidenceBundle) {
    for dimension in &evidence.dimensions {
        println!(
            "  {:<16} {:.2}{}  {}",
            dimension.dimension.as_str(),
            dimension.score,
            if dimension.degraded { "*" } else { " " },
            dimension.detail
        );
    }
    println!("{}", evidence.summary);
}
