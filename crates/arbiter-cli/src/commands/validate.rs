//! Validate command - check a configuration file and its backends.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use arbiter_runtime::Orchestrator;

use crate::cli::load_config;
use crate::output::{emit, OutputFormat};

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Skip backend health checks
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    file: Option<String>,
    valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    backends: BTreeMap<String, bool>,
}

pub async fn execute(args: ValidateArgs, path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut report = ValidationReport {
        file: path.map(|p| p.display().to_string()),
        valid: true,
        error: None,
        backends: BTreeMap::new(),
    };

    match load_config(path).and_then(|config| Ok(Orchestrator::from_config(config)?)) {
        Ok(orchestrator) if !args.offline => {
            report.backends = orchestrator.router().health().await;
        }
        Ok(_) => {}
        Err(e) => {
            report.valid = false;
            report.error = Some(format!("{:#}", e));
        }
    }

    emit(format, &report, |report| {
        let file = report.file.as_deref().unwrap_or("<defaults>");
        match &report.error {
            None => println!("{}: valid", file),
            Some(error) => println!("{}: invalid\n  {}", file, error),
        }
        for (backend, healthy) in &report.backends {
            println!("  {:<20} {}", backend, if *healthy { "healthy" } else { "unreachable" });
        }
    })?;

    if !report.valid {
        bail!("configuration is invalid");
    }
    Ok(())
}
