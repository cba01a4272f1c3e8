//! Vera CLI - Command-line interface
//!
//! Usage:
//!   vera build-index [--docs <dir>]
//!   vera query "your question" [--top-k N] [--json]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vera_core::{AppConfig, PipelineResult};
use vera_index::{create_embedding_client, IndexStore};
use vera_rag::SelfCorrectingPipeline;

#[derive(Parser)]
#[command(name = "vera")]
#[command(about = "Self-correcting retrieval-augmented question answering")]
#[command(version)]
struct Cli {
    /// Optional TOML config file; environment variables still override
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the document corpus and exit
    BuildIndex {
        /// Directory of .txt documents (overrides config)
        #[arg(long)]
        docs: Option<PathBuf>,
    },
    /// Ask the pipeline a question
    Query {
        /// Question to ask
        question: String,

        /// Number of documents to retrieve (overrides config)
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full result as JSON instead of the human rendering
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path.clone())?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    match cli.command {
        Commands::BuildIndex { docs } => {
            if let Some(docs) = docs {
                config.paths.docs_dir = docs;
            }
            let embedder = create_embedding_client(&config.llm)?;
            let store = IndexStore::new(config.paths.clone());
            let count = store.build(embedder.as_ref()).await?;
            println!(
                "Indexed {count} documents into {}",
                config.paths.index_dir.display()
            );
        }
        Commands::Query {
            question,
            top_k,
            json,
        } => {
            if let Some(top_k) = top_k {
                config.rag.top_k = top_k;
            }
            let pipeline = SelfCorrectingPipeline::from_config(&config)?;
            let result = pipeline.run(&question).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                render(&result);
            }
        }
    }

    Ok(())
}

fn render(result: &PipelineResult) {
    println!("\n=== Final Answer ===");
    println!("{}", result.answer);

    println!("\n=== Evaluation ===");
    println!("Score: {:.2}", result.score);
    println!("Explanation: {}", result.explanation);
    println!("Attempts: {}", result.attempts);

    println!("\n=== Context Chunks Used ===");
    for (i, chunk) in result.used_chunks.iter().enumerate() {
        println!(
            "\n[Chunk {} from {}, guardrail={:.2}]",
            i + 1,
            chunk.filename,
            chunk.guardrail_score.unwrap_or(0.0)
        );
        println!("{}", preview(&chunk.text, 400));
    }
}

/// First `limit` characters of `text`, with an ellipsis when truncated.
fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{truncated}...")
}
