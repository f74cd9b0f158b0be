//! # topic-rag CLI
//!
//! Wires the library together from a TOML configuration file.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `topic-rag init` | Verify or create the pgvector extension and tables |
//! | `topic-rag topics` | List configured topics and whether their roots exist |
//! | `topic-rag ingest [--topic NAME]...` | Index the files of all (or the named) topics |
//! | `topic-rag retrieve QUERY ...` | Print the chunks nearest to a query |
//! | `topic-rag remove-topic NAME` | Delete a topic's documents and embeddings |
//! | `topic-rag stats` | Per-topic document and embedding counts |
//! | `topic-rag completions SHELL` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! topic-rag init
//! topic-rag ingest --topic docs
//! topic-rag retrieve "how is auth configured?" --workspace ~/ws --project .
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use topic_rag::config::{self, Config};
use topic_rag::context::{Project, TopicSelection, Workspace};
use topic_rag::db;
use topic_rag::embedding::create_embedder;
use topic_rag::ingest::IngestionPipeline;
use topic_rag::models::Topic;
use topic_rag::progress::{ProgressMode, ProgressMonitor};
use topic_rag::retrieve::{collect_topics, render_prompt, RetrievalEngine};
use topic_rag::schema::SchemaManager;
use topic_rag::stats;
use topic_rag::store::postgres::PgIndexStore;
use topic_rag::store::IndexStore;
use topic_rag::topics;

/// Topic-scoped retrieval-augmented context over PostgreSQL + pgvector.
#[derive(Parser)]
#[command(name = "topic-rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `~/.config/topic-rag/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress output on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify or create the vector extension and the index tables.
    ///
    /// Safe to run repeatedly. Fails with a description of the problem when
    /// existing tables do not have the expected shape.
    Init,

    /// List configured topics.
    Topics,

    /// Index the files of every configured topic, or only the named ones.
    ///
    /// Files that fail are reported and skipped; the run always continues.
    Ingest {
        /// Topic to ingest (repeatable).
        #[arg(long = "topic")]
        topics: Vec<String>,
    },

    /// Print the chunks nearest to QUERY among the selected topics.
    ///
    /// Topics come from `--topic` plus the selections of `--workspace` and
    /// `--project`. With no topics selected nothing is searched.
    Retrieve {
        query: String,

        /// Topic to search (repeatable).
        #[arg(long = "topic")]
        topics: Vec<String>,

        /// Workspace directory (reads `workspace.json`).
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Project directory (reads `.conf/assistants/project.json`).
        #[arg(long)]
        project: Option<PathBuf>,

        /// Number of chunks to return. Defaults to `retrieval.default_k`.
        #[arg(short)]
        k: Option<i64>,

        /// Prompt template with `{context}` and `{question}` placeholders.
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Delete every document of a topic, and its embeddings.
    RemoveTopic { name: String },

    /// Show per-topic document and embedding counts.
    Stats,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let load = || config::load_config(&config_path);
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "topic-rag", &mut std::io::stdout());
        }
        Commands::Init => {
            let cfg = load()?;
            let pool = db::connect(&cfg.db).await?;
            SchemaManager::new(&cfg.db, &cfg.embedding)
                .ensure_schema(&pool)
                .await?;
            println!("Schema ready.");
        }
        Commands::Topics => {
            let cfg = load()?;
            topics::list_topics(&cfg, &mut std::io::stdout())?;
        }
        Commands::Ingest { topics } => {
            let cfg = load()?;
            run_ingest(&cfg, &topics, progress).await?;
        }
        Commands::Retrieve {
            query,
            topics,
            workspace,
            project,
            k,
            template,
        } => {
            let cfg = load()?;
            let valid = cfg.topic_names();
            let workspace = workspace
                .map(|dir| Workspace::load(&dir, Some(&valid)))
                .transpose()?;
            let project = project
                .map(|dir| Project::load(&dir, Some(&valid)))
                .transpose()?;
            let mut selected: Vec<String> = Vec::new();
            let visible = collect_topics(
                workspace.as_ref().map(|w| w as &dyn TopicSelection),
                project.as_ref().map(|p| p as &dyn TopicSelection),
            );
            for topic in topics.into_iter().chain(visible) {
                if !topic.is_empty() && !selected.contains(&topic) {
                    selected.push(topic);
                }
            }

            let pool = db::connect_lazy(&cfg.db);
            let store: Arc<dyn IndexStore> = Arc::new(PgIndexStore::new(pool, &cfg.db));
            let engine = RetrievalEngine::new(store, create_embedder(&cfg.embedding)?);
            let k = k.unwrap_or(cfg.retrieval.default_k);
            let chunks = engine.retrieve(&query, &selected, k).await?;

            if let Some(path) = template {
                let template = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read template: {}", path.display()))?;
                println!("{}", render_prompt(&template, &chunks.join("\n\n"), &query));
            } else if chunks.is_empty() {
                println!("No results.");
            } else {
                println!("{}", chunks.join("\n\n"));
            }
        }
        Commands::RemoveTopic { name } => {
            let cfg = load()?;
            let pool = db::connect(&cfg.db).await?;
            let store = PgIndexStore::new(pool, &cfg.db);
            let removed = store.remove_topic(&name).await?;
            println!("Removed {} documents from topic '{}'.", removed, name);
        }
        Commands::Stats => {
            let cfg = load()?;
            let pool = db::connect(&cfg.db).await?;
            let store = PgIndexStore::new(pool, &cfg.db);
            stats::run_stats(&store, &mut std::io::stdout()).await?;
        }
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, names: &[String], progress: ProgressMode) -> Result<()> {
    let selected: Vec<Topic> = if names.is_empty() {
        cfg.topics.clone()
    } else {
        let mut selected = Vec::new();
        for name in names {
            match cfg.topic(name) {
                Some(topic) => selected.push(topic.clone()),
                None => bail!("Unknown topic: '{}'", name),
            }
        }
        selected
    };

    let pool = db::connect(&cfg.db).await?;
    SchemaManager::new(&cfg.db, &cfg.embedding)
        .ensure_schema(&pool)
        .await?;

    let store: Arc<dyn IndexStore> = Arc::new(PgIndexStore::new(pool, &cfg.db));
    let pipeline = IngestionPipeline::from_config(store, create_embedder(&cfg.embedding)?, cfg);
    let monitor = ProgressMonitor::new(progress.sink());
    let summary = pipeline.run(&selected, &monitor).await;

    println!("Ingest complete:");
    println!("  files:     {}", summary.files);
    println!("  created:   {}", summary.created);
    println!("  refreshed: {}", summary.refreshed);
    println!("  skipped:   {}", summary.skipped);
    println!("  errors:    {}", summary.errors.len());
    for error in &summary.errors {
        println!("    {}", error);
    }
    Ok(())
}
