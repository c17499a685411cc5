use clap::{Parser, Subcommand};
use post_search::Result;
use post_search::commands::{
    add_post, index_post, list_posts, reconcile, search_posts, seed_posts, show_status,
};
use post_search::config::{Config, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "post-search")]
#[command(about = "Semantic search over posts with an embedding index kept in sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, the vector index and service limits
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Store a new post and index it
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Find the posts closest in meaning to a query
    Search {
        query: String,
        /// Maximum number of results, defaults to the configured limit
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// Re-index one stored post by id
    Index { id: String },
    /// List all stored posts
    List,
    /// Bulk load posts from a JSON file of {"title", "description"} objects
    Seed {
        file: PathBuf,
        /// Drop every index entry before loading
        #[arg(long)]
        reset: bool,
    },
    /// Re-index posts missing from the vector index
    Reconcile {
        /// Only report what would be re-indexed
        #[arg(long)]
        dry_run: bool,
    },
    /// Show connectivity and index health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Add { title, description } => {
            add_post(&Config::load()?, &title, &description).await?;
        }
        Commands::Search { query, limit } => {
            search_posts(&Config::load()?, &query, limit).await?;
        }
        Commands::Index { id } => {
            index_post(&Config::load()?, &id).await?;
        }
        Commands::List => {
            list_posts(&Config::load()?).await?;
        }
        Commands::Seed { file, reset } => {
            seed_posts(&Config::load()?, &file, reset).await?;
        }
        Commands::Reconcile { dry_run } => {
            reconcile(&Config::load()?, dry_run).await?;
        }
        Commands::Status => {
            show_status(&Config::load()?).await?;
        }
    }

    Ok(())
}
