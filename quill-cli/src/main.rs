//! Quill CLI - drive content workflows from the terminal

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use quill_core::llm::providers::ScriptedProvider;
use quill_core::prelude::*;
use quill_core::store;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Human-in-the-loop content writer", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to quill.toml plus QUILL_* variables)
    #[arg(short, long, global = true, env = "QUILL_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// JSON file with guideline profiles
    #[arg(short, long, global = true)]
    guidelines: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new workflow and run it to the first gate
    Start {
        /// Article topic
        topic: String,
        /// Requesting user
        #[arg(short, long, env = "QUILL_USER")]
        user: String,
        /// Guideline profile to write against
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Answer a suspended workflow
    Resume {
        /// Request id
        id: String,
        #[command(subcommand)]
        decision: DecisionCommand,
    },
    /// Show a workflow's current report
    Status {
        /// Request id
        id: String,
    },
    /// List stored workflows
    List,
    /// Re-run a workflow left in processing by an interrupted process
    Recover {
        /// Request id
        id: String,
    },
    /// Cancel a workflow
    Cancel {
        /// Request id
        id: String,
        /// Reason recorded in the error log
        #[arg(short, long, default_value = "cancelled by user")]
        reason: String,
    },
    /// Version information
    Version,
}

#[derive(Clone, Subcommand)]
enum DecisionCommand {
    /// Approve one concept
    Concept {
        /// Concept id
        id: String,
    },
    /// Approve one or more subtopics
    Subtopics {
        /// Subtopic ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Accept the draft or ask for another one
    Review {
        /// accept or regenerate
        #[arg(value_parser = parse_review_decision)]
        decision: ReviewDecision,
        /// Notes for the next draft
        #[arg(short, long)]
        feedback: Option<String>,
    },
}

fn parse_review_decision(value: &str) -> std::result::Result<ReviewDecision, String> {
    ReviewDecision::from_id(value).ok_or_else(|| format!("expected accept or regenerate, got {value}"))
}

impl From<DecisionCommand> for HumanDecision {
    fn from(command: DecisionCommand) -> Self {
        match command {
            DecisionCommand::Concept { id } => HumanDecision::SelectConcept { concept_id: id },
            DecisionCommand::Subtopics { ids } => HumanDecision::SelectSubtopics { subtopic_ids: ids },
            DecisionCommand::Review { decision, feedback } => {
                HumanDecision::FinalReview { decision, feedback }
            }
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<QuillConfig> {
    let config = match path {
        Some(path) => QuillConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => QuillConfig::load()?,
    };
    Ok(config)
}

/// Build the engine; commands that never reach the model skip provider setup
fn build_workflow(cli: &Cli, config: &QuillConfig, needs_model: bool) -> Result<ContentWorkflow> {
    let provider: Arc<dyn LLMProvider> = if needs_model {
        LLMProviderFactory::create(&config.llm, &config.retry)?
    } else {
        Arc::new(ScriptedProvider::new())
    };

    let mut builder = ContentWorkflow::builder()
        .provider(provider)
        .config(config)
        .store(store::from_config(&config.store));

    if let Some(path) = &cli.guidelines {
        let guidelines = InMemoryGuidelineStore::from_json_file(path)
            .with_context(|| format!("loading guidelines from {}", path.display()))?;
        tracing::info!(profiles = guidelines.len(), "Loaded guideline profiles");
        builder = builder.guidelines(Arc::new(guidelines));
    }

    Ok(builder.build()?)
}

fn print_report(report: &WorkflowReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}  {}", report.request_id, report.summary());
    if let Some(pending) = &report.pending {
        match &pending.candidates {
            Candidates::Concepts(concepts) => {
                for c in concepts {
                    println!("  [{}] {} - {}", c.id, c.title, c.summary);
                }
            }
            Candidates::Subtopics(subtopics) => {
                for s in subtopics {
                    println!("  [{}] {} - {}", s.id, s.title, s.summary);
                }
            }
            Candidates::Options(options) => {
                for o in options {
                    println!("  [{}] {} - {}", o.id, o.title, o.summary);
                }
            }
        }
    }
    if let (Some(brand), Some(fact)) = (report.brand_score, report.fact_score) {
        println!("  brand {:.0} / fact {:.0}, regenerations {}", brand, fact, report.regeneration_count);
    }
    for (dimension, review) in &report.reviews {
        println!("  {:<13} {:>3.0}", dimension.as_str(), review.score);
        for issue in &review.issues {
            println!("    - {}", issue);
        }
    }
    if let Some(draft) = &report.draft {
        println!();
        println!("{}", draft.final_article);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("quill {}", env!("CARGO_PKG_VERSION"));
        println!("quill-core {}", quill_core::VERSION);
        return Ok(());
    }

    let config = load_config(cli.config.as_ref())?;

    match &cli.command {
        Commands::Start {
            topic,
            user,
            profile,
        } => {
            let workflow = build_workflow(&cli, &config, true)?;
            let mut request = ContentRequest::new(topic.clone(), user.clone());
            if let Some(profile) = profile {
                request = request.with_profile(profile.clone());
            }
            let report = workflow.start(request).await?;
            print_report(&report, cli.json)?;
        }
        Commands::Resume { id, decision } => {
            let workflow = build_workflow(&cli, &config, true)?;
            let decision = HumanDecision::from(decision.clone());
            let report = workflow.resume(id, decision).await?;
            print_report(&report, cli.json)?;
        }
        Commands::Status { id } => {
            let workflow = build_workflow(&cli, &config, false)?;
            let report = workflow.report(id).await?;
            print_report(&report, cli.json)?;
        }
        Commands::List => {
            let store = store::from_config(&config.store);
            let ids = store.list().await?;
            if ids.is_empty() {
                println!("No workflows stored");
            }
            for id in ids {
                match store.load(&id).await? {
                    Some(state) => println!(
                        "{}  {:<14} {:<22} {}",
                        id,
                        state.status,
                        state.current_step(),
                        state.topic
                    ),
                    None => bail!("workflow {} disappeared while listing", id),
                }
            }
        }
        Commands::Recover { id } => {
            let workflow = build_workflow(&cli, &config, true)?;
            let report = workflow.recover(id).await?;
            print_report(&report, cli.json)?;
        }
        Commands::Cancel { id, reason } => {
            let workflow = build_workflow(&cli, &config, false)?;
            let report = workflow.cancel(id, reason).await?;
            print_report(&report, cli.json)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
