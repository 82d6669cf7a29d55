use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use opscout_core::config::{AppConfig, EmbeddingConfig};
use opscout_core::traits::{KnowledgeQuery, TextGenerator};
use opscout_core::types::WorkflowEvent;

use opscout_agent::{opportunity_score, recommend_patents, OpportunityPipeline};
use opscout_knowledge::{
    index_patents, HttpEmbeddingProvider, Neo4jClient, SemanticSearch, VectorIndex,
    DEFAULT_BATCH_SIZE,
};
use opscout_llm::LlmTextGenerator;

#[derive(Parser)]
#[command(
    name = "opscout",
    version,
    about = "Scout innovation opportunities in a patent knowledge graph"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "opscout.toml", env = "OPSCOUT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the opportunity workflow over a list of patents
    Run {
        /// Patent names to analyse
        items: Vec<String>,
        /// Read patent names from a file, one per line ("-" for stdin)
        #[arg(long, conflicts_with = "items")]
        items_file: Option<PathBuf>,
    },
    /// Suggest candidate patents for a technical topic
    Recommend {
        /// The technical topic to search for
        #[arg(trailing_var_arg = true, required = true)]
        topic: Vec<String>,
        /// Number of candidates (default: [vector] top_k)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Embed every patent in the knowledge graph into the local vector index
    Index {
        /// Documents per embedding request
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Compute an opportunity score directly
    #[command(allow_negative_numbers = true)]
    Score {
        hotness: f64,
        gap: f64,
        maturity: f64,
        /// Maturity stage label, e.g. "growth" or "mature"
        stage: String,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("opscout=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Commands that need no config
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "opscout", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Score {
            hotness,
            gap,
            maturity,
            stage,
        } => {
            let score = opportunity_score(*hotness, *gap, *maturity, stage)?;
            println!("{:.2}", score);
            return Ok(());
        }
        _ => {}
    }

    let config = AppConfig::load(&cli.config).with_context(|| {
        format!(
            "could not load {} (see opscout.toml.example)",
            cli.config.display()
        )
    })?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        Commands::Run { items, items_file } => {
            let items = match items_file {
                Some(path) => read_items(&path)?,
                None if items.is_empty() => read_items(Path::new("-"))?,
                None => clean_items(items),
            };
            run_workflow(&config, items).await?;
        }
        Commands::Recommend { topic, limit } => {
            recommend(&config, &topic.join(" "), limit).await?;
        }
        Commands::Index { batch_size } => {
            index(&config, batch_size).await?;
        }
        Commands::Completions { .. } | Commands::Score { .. } => {}
    }

    Ok(())
}

fn clean_items(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect()
}

fn read_items(path: &Path) -> anyhow::Result<Vec<String>> {
    let lines: Vec<String> = if path == Path::new("-") {
        io::stdin().lock().lines().map_while(|l| l.ok()).collect()
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
            .lines()
            .map(String::from)
            .collect()
    };
    Ok(clean_items(lines))
}

async fn run_workflow(config: &AppConfig, items: Vec<String>) -> anyhow::Result<()> {
    let llm = Arc::from(opscout_llm::create_client(&config.model)?);
    let generator: Arc<dyn TextGenerator> =
        Arc::new(LlmTextGenerator::new(llm, config.model.clone()));
    let knowledge: Arc<dyn KnowledgeQuery> = Arc::new(Neo4jClient::new(&config.knowledge));

    let pipeline = OpportunityPipeline::new(knowledge, generator, config.workflow.clone());

    // Log progress as nodes finish
    let mut rx = pipeline.events().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                WorkflowEvent::RunStarted { run_id, items } => {
                    info!(run_id = %run_id, items, "Run started");
                }
                WorkflowEvent::NodeStarted { node_id } => {
                    info!(node_id = %node_id, "Node started");
                }
                WorkflowEvent::NodeCompleted {
                    node_id,
                    degraded,
                    elapsed_ms,
                } => {
                    info!(node_id = %node_id, degraded, elapsed_ms, "Node completed");
                }
                WorkflowEvent::NodeFailed { node_id, error } => {
                    warn!(node_id = %node_id, error = %error, "Node failed");
                }
                WorkflowEvent::RunCompleted { .. } => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let result = pipeline.run_with_cancel(items, cancel).await;
    progress.await.ok();

    let report = result?;
    println!("{}", report);
    Ok(())
}

fn embedding_config(config: &AppConfig) -> anyhow::Result<&EmbeddingConfig> {
    config
        .embedding
        .as_ref()
        .context("an [embedding] section is required for this command")
}

async fn recommend(config: &AppConfig, topic: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let embedder = Arc::new(HttpEmbeddingProvider::new(embedding_config(config)?));
    let index = Arc::new(VectorIndex::open(&config.vector_path())?);
    if index.count()? == 0 {
        warn!("Vector index is empty; run `opscout index` first");
    }

    let search = SemanticSearch::new(embedder, index);
    let candidates =
        recommend_patents(&search, topic, limit.unwrap_or(config.vector.top_k)).await?;

    if candidates.is_empty() {
        println!("No candidate patents found.");
    }
    for (i, c) in candidates.iter().enumerate() {
        match c.company {
            Some(ref company) => println!("{:>2}. {} ({}) [{:.3}]", i + 1, c.id, company, c.score),
            None => println!("{:>2}. {} [{:.3}]", i + 1, c.id, c.score),
        }
    }
    Ok(())
}

async fn index(config: &AppConfig, batch_size: usize) -> anyhow::Result<()> {
    let embedder = Arc::new(HttpEmbeddingProvider::new(embedding_config(config)?));
    let knowledge: Arc<dyn KnowledgeQuery> = Arc::new(Neo4jClient::new(&config.knowledge));
    let path = config.vector_path();
    let index = VectorIndex::open(&path)?;

    let report = index_patents(knowledge, embedder, &index, batch_size).await?;
    println!(
        "Indexed {} of {} patents into {} ({} failed batches, {} total in index).",
        report.indexed,
        report.exported,
        path.display(),
        report.failed_batches,
        index.count()?
    );
    Ok(())
}
