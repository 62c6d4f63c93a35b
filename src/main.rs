//! talky CLI: plan and dry-run assistant requests against an action catalog.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde_json::Value;

use talky::assistant::Assistant;
use talky::audit::{AuditRecorder, MemorySink, render_explanation};
use talky::config::TalkyConfig;
use talky::execute::EchoInvoker;
use talky::intent::Intent;
use talky::knowledge::{KnowledgeBase, catalog};
use talky::state::{Fact, State};

#[derive(Parser)]
#[command(name = "talky", version, about = "Goal-directed planning for assistant requests")]
struct Cli {
    /// TOML configuration file (defaults apply to missing fields).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// TOML action catalog (defaults to the built-in catalog).
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the actions in the catalog.
    Actions,

    /// Show the plan for a request without executing it.
    Plan(RequestArgs),

    /// Plan and dry-run a request, echoing each action's parameters.
    Run(RequestArgs),
}

#[derive(Args)]
struct RequestArgs {
    /// Intent as LABEL or LABEL:CONFIDENCE (repeatable).
    #[arg(long = "intent", required = true)]
    intents: Vec<String>,

    /// Parameter as KEY=VALUE, shared by all intents (repeatable). Values
    /// that parse as JSON are used as JSON, anything else as a string.
    #[arg(long = "param")]
    params: Vec<String>,

    /// Initial fact as KEY=VALUE (repeatable).
    #[arg(long = "fact")]
    facts: Vec<String>,
}

impl RequestArgs {
    fn intents(&self) -> Result<Vec<Intent>> {
        let mut params = serde_json::Map::new();
        for raw in &self.params {
            let (key, value) = split_pair(raw)?;
            params.insert(key.to_string(), parse_value(value));
        }
        self.intents
            .iter()
            .map(|raw| {
                let (label, confidence) = match raw.rsplit_once(':') {
                    Some((label, conf)) => (label, conf.parse::<f64>().into_diagnostic()?),
                    None => (raw.as_str(), 1.0),
                };
                let mut intent = Intent::new(label, confidence);
                intent.parameters = params.clone();
                Ok(intent)
            })
            .collect()
    }

    fn state(&self) -> Result<State> {
        let mut state = State::new();
        for raw in &self.facts {
            let (key, value) = split_pair(raw)?;
            state = state.with_fact(key, Fact::from_json(&parse_value(value)));
        }
        Ok(state)
    }
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .ok_or_else(|| miette::miette!("expected KEY=VALUE, got \"{raw}\""))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
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
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TalkyConfig::load(path)?,
        None => TalkyConfig::default(),
    }
    .with_process_env()?;

    let kb = Arc::new(match &cli.catalog {
        Some(path) => KnowledgeBase::from_toml_file(path)?,
        None => catalog::builtin()?,
    });

    let assistant = Assistant::new(
        Arc::clone(&kb),
        config,
        Arc::new(EchoInvoker::new(Arc::clone(&kb))),
        AuditRecorder::new(Arc::new(MemorySink::new())),
    );

    match cli.command {
        Commands::Actions => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(kb.actions()).into_diagnostic()?
                );
            } else {
                for action in kb.actions() {
                    println!("{:<24} {:>6.2}  {}", action.id, action.cost, action.description);
                }
                println!("\n{} actions", kb.len());
            }
        }

        Commands::Plan(args) => {
            let request = assistant
                .request(args.intents()?)
                .with_state(args.state()?);
            let plan = assistant.plan(&request)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&plan).into_diagnostic()?);
            } else {
                println!("{plan}");
                println!(
                    "({} expanded, {} generated{})",
                    plan.stats.expanded,
                    plan.stats.generated,
                    if plan.stats.fast_path { ", fast path" } else { "" }
                );
            }
        }

        Commands::Run(args) => {
            let request = assistant
                .request(args.intents()?)
                .with_state(args.state()?);
            let id = request.id;
            let outcome = assistant.handle(request).await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).into_diagnostic()?
                );
            } else {
                for node in &outcome.report.nodes {
                    println!("{:>3}. {:<24} {}", node.step + 1, node.action_id, node.status);
                }
                println!("status: {}", outcome.report.status);
                println!();
                print!("{}", render_explanation(&assistant.explain(id).await));
            }
        }
    }

    Ok(())
}
