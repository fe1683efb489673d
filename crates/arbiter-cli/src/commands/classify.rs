//! Classify command - show the complexity tier for a request.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use arbiter_core::{ArbiterConfig, Complexity, ComplexityClassifier, Dimension, KeywordClassifier};

use crate::output::{emit, OutputFormat};

/// Arguments for the classify command.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Request text
    #[arg(required = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Classification {
    complexity: Complexity,
    evaluators: Vec<Dimension>,
}

pub fn execute(args: ClassifyArgs, config: ArbiterConfig, format: OutputFormat) -> Result<()> {
    let classifier = KeywordClassifier::new(config.classifier.clone());
    let complexity = classifier.classify(&args.command.join(" "));
    let classification = Classification {
        complexity,
        evaluators: config.evaluators.tiers.for_complexity(complexity).to_vec(),
    };

    emit(format, &classification, |c| {
        let evaluators: Vec<&str> = c.evaluators.iter().map(|d| d.as_str()).collect();
        println!("{} ({})", c.complexity, evaluators.join(", "));
    })
}
