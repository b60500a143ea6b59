//! segfuse CLI
//!
//! Thin command-line wrapper over `segfuse-core`.
//!
//! # Commands
//!
//! - `ensure`: provision the configured collection
//! - `index <corpus>`: provision and index a corpus file
//! - `query <text>`: hybrid query with rank fusion
//! - `delete <ids..>`: delete points by id
//! - `notify <events>`: handle storage notifications from a JSON file
//! - `config`: print the effective configuration
//!
//! Command results are JSON on stdout. Logs and errors go to stderr; any
//! failure exits with status 1.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use segfuse_core::config::Config;
use segfuse_core::corpus::load_corpus;
use segfuse_core::logging::{LogFormat, init_logging};
use segfuse_core::notification::{DirectorySource, NotificationOutcome, NotificationRouter, parse_notifications};
use segfuse_core::{
    CollectionManager, EmbeddingGenerator, IndexReport, Indexer, Provisioning, QueryEngine, Record,
    VectorStore, open_store,
};

/// segfuse - multi-space segment indexing with reciprocal rank fusion
#[derive(Parser)]
#[command(name = "segfuse")]
#[command(version)]
#[command(about = "Index text segments into several vector spaces and query them with rank fusion")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "SEGFUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Override the configured log format
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the collection if it does not exist
    Ensure,
    /// Provision the collection and index a corpus file
    Index {
        /// JSON array of records
        corpus: PathBuf,
    },
    /// Query the collection
    Query {
        text: String,
        /// Maximum number of results (defaults to query.default_limit)
        #[arg(long)]
        limit: Option<usize>,
        /// Index this corpus first (needed with the in-process store)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Delete points by id
    Delete {
        #[arg(required = true)]
        ids: Vec<u64>,
    },
    /// Handle storage notifications read from a JSON file (`-` for stdin)
    Notify { events: PathBuf },
    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct EnsureOutput {
    collection: String,
    provisioning: Provisioning,
}

#[derive(Serialize)]
struct IndexOutput {
    collection: String,
    provisioning: Option<Provisioning>,
    #[serde(flatten)]
    report: IndexReport,
}

#[derive(Serialize)]
struct DeleteOutput {
    collection: String,
    deleted: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(core) = err.downcast_ref::<segfuse_core::Error>() {
                eprintln!("Category: {}", core.category());
                if let Some(remediation) = core.remediation() {
                    eprint!("{}", remediation.render_plain());
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::default(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.validate().map_err(segfuse_core::Error::from)?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_logging(&config.logging).context("failed to initialize logging")?;

    if matches!(cli.command, Commands::Config) {
        print!("{}", config.to_toml_string().map_err(segfuse_core::Error::from)?);
        return Ok(());
    }

    let generator = EmbeddingGenerator::from_config(&config.models).map_err(segfuse_core::Error::from)?;
    let store = open_store(&config.store).map_err(segfuse_core::Error::from)?;
    let store: &dyn VectorStore = store.as_ref();

    match cli.command {
        Commands::Ensure => {
            let provisioning = provision(&config, &generator, store, &probe_record())?;
            print_json(&EnsureOutput {
                collection: config.collection.name.clone(),
                provisioning,
            })
        }
        Commands::Index { corpus } => {
            let output = index_corpus(&config, &generator, store, &corpus)?;
            print_json(&output)
        }
        Commands::Query {
            text,
            limit,
            corpus,
        } => {
            if let Some(path) = corpus {
                index_corpus(&config, &generator, store, &path)?;
            }
            let engine = QueryEngine::new(&generator, store, &config);
            let limit = limit.unwrap_or_else(|| engine.default_limit());
            let result = engine.query(&text, limit)?;
            print_json(&result)
        }
        Commands::Delete { ids } => {
            Indexer::new(&generator, store, &config).remove(&ids)?;
            print_json(&DeleteOutput {
                collection: config.collection.name.clone(),
                deleted: ids.len(),
            })
        }
        Commands::Notify { events } => {
            let raw = read_input(&events)?;
            let notifications = parse_notifications(&raw)?;
            let source = DirectorySource::new(&config.notifications.documents_dir);
            let mut router = NotificationRouter::new(&generator, store, &source, &config);
            let outcomes = router.handle_batch(&notifications)?;
            match outcomes.last().and_then(NotificationOutcome::validation_body) {
                Some(body) => print_json(&body),
                None => print_json(&outcomes),
            }
        }
        Commands::Config => Ok(()),
    }
}

/// Record used to size the spaces when no corpus is at hand.
fn probe_record() -> Record {
    Record::new(0, "dimension probe", "dimension probe", 0u64, 0u64)
}

fn provision(
    config: &Config,
    generator: &EmbeddingGenerator,
    store: &dyn VectorStore,
    sample: &Record,
) -> Result<Provisioning> {
    let mut manager = CollectionManager::new(store).with_retry_policy(config.retry.to_policy());
    Ok(manager.provision(generator, &config.collection, sample)?)
}

fn index_corpus(
    config: &Config,
    generator: &EmbeddingGenerator,
    store: &dyn VectorStore,
    path: &Path,
) -> Result<IndexOutput> {
    let corpus = load_corpus(path)?;
    let provisioning = match corpus.sample() {
        Some(sample) => Some(provision(config, generator, store, sample)?),
        None => None,
    };
    let mut report = Indexer::new(generator, store, config).index(&corpus.records)?;
    let mut rejected = corpus.rejected;
    rejected.append(&mut report.rejected);
    report.rejected = rejected;
    Ok(IndexOutput {
        collection: config.collection.name.clone(),
        provisioning,
        report,
    })
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
