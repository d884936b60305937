//! slotfill CLI: graph consistency and inference for slot filling.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Deserialize;

use slotfill::checklist::{Checklist, NoopChecklist, TracingChecklist};
use slotfill::config::ReasonerConfig;
use slotfill::infer::RuleSet;
use slotfill::pipeline::{BatchJob, Reasoner, ReasonerSummary};
use slotfill::relation::{Cardinality, RelationTable};

#[derive(Parser)]
#[command(name = "slotfill", version, about = "Slot-filling consistency and inference engine")]
struct Cli {
    /// Reasoner configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve candidate facts for one or more query entities.
    Resolve {
        /// JSON file holding one job `{"query": ..., "candidates": [...]}` or
        /// an array of jobs. Reads stdin when omitted.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Log every checklist event at debug level.
        #[arg(long)]
        trace: bool,

        /// Pretty-print the output.
        #[arg(long)]
        pretty: bool,
    },

    /// Parse a rule file and list its rules.
    Rules {
        /// Rule file; the builtin rules when omitted.
        file: Option<PathBuf>,

        /// Fail on the first malformed line instead of skipping it.
        #[arg(long)]
        strict: bool,
    },

    /// Print the relation inventory.
    Relations,

    /// Print the effective configuration as TOML.
    Config,
}

/// A single job or a batch of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum JobInput {
    One(BatchJob),
    Many(Vec<BatchJob>),
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ReasonerConfig::load(path)?,
        None => ReasonerConfig::default(),
    };

    match cli.command {
        Commands::Resolve {
            input,
            trace,
            pretty,
        } => {
            let text = read_input(input.as_deref())?;
            let jobs = match serde_json::from_str::<JobInput>(&text).into_diagnostic()? {
                JobInput::One(job) => vec![job],
                JobInput::Many(jobs) => jobs,
            };

            let reasoner = Reasoner::new(config)?;
            let checklist: &dyn Checklist = if trace { &TracingChecklist } else { &NoopChecklist };
            let summaries: Vec<ReasonerSummary> = reasoner
                .run_batch(jobs, checklist)
                .iter()
                .map(ReasonerSummary::from)
                .collect();

            let rendered = if pretty {
                serde_json::to_string_pretty(&summaries)
            } else {
                serde_json::to_string(&summaries)
            }
            .into_diagnostic()?;
            println!("{rendered}");
        }

        Commands::Rules { file, strict } => {
            let rules = match (&file, strict) {
                (Some(path), true) => {
                    let text = std::fs::read_to_string(path).into_diagnostic()?;
                    RuleSet::parse_strict(&text)?
                }
                (Some(path), false) => RuleSet::load(path)?,
                (None, _) => RuleSet::builtin(),
            };

            let source = file
                .as_ref()
                .map_or_else(|| "builtin".to_string(), |p| p.display().to_string());
            println!("Rules ({}) from {source}:", rules.len());
            for rule in rules.iter() {
                println!("  {rule}");
            }
            if !rules.errors().is_empty() {
                println!("\nSkipped ({}):", rules.errors().len());
                for error in rules.errors() {
                    println!("  {error}");
                }
            }
        }

        Commands::Relations => {
            let table = RelationTable::kbp();
            println!("Relations ({}):", table.len());
            for info in table.sorted() {
                let cardinality = match info.cardinality {
                    Cardinality::Single => "single",
                    Cardinality::List => "list",
                };
                let values: Vec<&str> = info.value_types.iter().map(|t| t.as_str()).collect();
                let mut line = format!(
                    "  {:<40} {:<6} {:<13} [{}]",
                    info.name,
                    cardinality,
                    info.subject_type.as_str(),
                    values.join(", ")
                );
                if let Some(inverse) = table.inverse_of(&info.name) {
                    line.push_str(&format!(" inverse={inverse}"));
                }
                if table.is_transitive(&info.name) {
                    line.push_str(" transitive");
                }
                println!("{line}");
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).into_diagnostic(),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).into_diagnostic()?;
            Ok(text)
        }
    }
}
