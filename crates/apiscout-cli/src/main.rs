//! apiscout — command-line entry point.

mod config;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde_json::Value;

use apiscout::browser::{ChromiumConfig, LazyChromiumBrowser};
use apiscout::{
    Gallery, HealRequest, Healer, LocalDirectory, LocalGallery, Scout, ScoutOptions, ScoutRequest,
    SqliteStore, Store, Worker, WorkerRequest,
};

use config::{resolve_data_dir, DataDir};

#[derive(Parser)]
#[command(
    name = "apiscout",
    about = "Discover website APIs from browser traffic, replay them and heal them when they break",
    version
)]
struct Cli {
    /// Data directory (database, blobs, gallery, directory).
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Abort the command after this many seconds.
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse a site and derive its API contract.
    Scout {
        url: String,

        /// What the discovery is meant to achieve.
        #[arg(long, default_value = "explore")]
        task: String,

        /// Also publish the contract to the directory.
        #[arg(long, conflicts_with = "no_publish")]
        publish: bool,

        /// Publish nowhere, not even the gallery.
        #[arg(long)]
        no_publish: bool,

        /// Always browse, even when the gallery has the domain.
        #[arg(long)]
        no_cache: bool,
    },

    /// Replay a scouted path over HTTP.
    Worker {
        path_id: String,

        /// JSON object used for path parameters and the request body.
        #[arg(long)]
        data: Option<String>,

        /// Extra header, `Name: value`. Repeatable.
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,
    },

    /// Retry a failing path, re-discovering it if needed.
    Heal {
        path_id: String,

        /// Error the caller observed.
        #[arg(long)]
        error: Option<String>,
    },

    /// List scouted paths.
    Paths,

    /// Query the local gallery.
    Gallery {
        #[command(subcommand)]
        command: GalleryCommand,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   apiscout completions bash > ~/.local/share/bash-completion/completions/apiscout
    ///   apiscout completions zsh > ~/.zfunc/_apiscout
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum GalleryCommand {
    /// Search cached contracts by domain and task.
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    let data_dir = resolve_data_dir(cli.data_dir.as_deref());
    tracing::debug!("data dir: {}", data_dir.root().display());

    match cli.deadline_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run(cli.command, &data_dir))
            .await
            .map_err(|_| anyhow!("deadline of {secs}s exceeded"))?,
        None => run(cli.command, &data_dir).await,
    }
}

async fn run(command: Commands, data_dir: &DataDir) -> anyhow::Result<()> {
    match command {
        Commands::Scout {
            url,
            task,
            publish,
            no_publish,
            no_cache,
        } => {
            let publish = match (publish, no_publish) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let mut request = ScoutRequest::new(&url, &task).with_publish(publish);
            if no_cache {
                request = request.without_cache();
            }

            let store = open_store(data_dir)?;
            let scout = build_scout(data_dir, store)?;
            let outcome = scout.scout(&request).await?;
            print_json(&outcome)?;
        }

        Commands::Worker {
            path_id,
            data,
            headers,
        } => {
            let mut request = WorkerRequest::new(&path_id);
            if let Some(data) = data {
                let value: Value = serde_json::from_str(&data).context("--data must be valid JSON")?;
                request = request.with_data(value);
            }
            request.headers = parse_headers(&headers)?;

            let worker = Worker::new(open_store(data_dir)?);
            let outcome = worker.run(&request).await?;
            print_json(&outcome)?;
        }

        Commands::Heal { path_id, error } => {
            let store = open_store(data_dir)?;
            let scout = Arc::new(build_scout(data_dir, store.clone())?);
            let worker = Arc::new(Worker::new(store));
            let healer = Healer::new(scout, worker);

            let mut request = HealRequest::new(&path_id);
            if let Some(error) = error {
                request = request.with_error(error);
            }
            let outcome = healer.heal(&request).await?;
            print_json(&outcome)?;
        }

        Commands::Paths => {
            let store = open_store(data_dir)?;
            print_json(&store.list_paths().await?)?;
        }

        Commands::Gallery {
            command: GalleryCommand::Search { query, limit },
        } => {
            let gallery = LocalGallery::open(&data_dir.gallery_dir())?;
            print_json(&gallery.search(&query, limit).await?)?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "apiscout", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn open_store(data_dir: &DataDir) -> anyhow::Result<Arc<dyn Store>> {
    let store = SqliteStore::open(&data_dir.db_path(), &data_dir.blob_dir())
        .with_context(|| format!("opening store in {}", data_dir.root().display()))?;
    Ok(Arc::new(store))
}

/// Chromium starts only when a scout actually needs to browse.
fn build_scout(data_dir: &DataDir, store: Arc<dyn Store>) -> anyhow::Result<Scout> {
    let options = ScoutOptions::default();
    let browser = LazyChromiumBrowser::new(ChromiumConfig {
        executable: None,
        navigation_timeout: options.navigation_timeout,
    });

    Ok(Scout::new(Arc::new(browser), store)
        .with_gallery(Arc::new(LocalGallery::open(&data_dir.gallery_dir())?))
        .with_directory(Arc::new(LocalDirectory::open(&data_dir.directory_dir())?))
        .with_options(options))
}

/// Parse repeated `Name: value` flags.
fn parse_headers(raw: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();
    for header in raw {
        let Some((name, value)) = header.split_once(':') else {
            bail!("invalid header {header:?}, expected `Name: value`");
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("invalid header {header:?}, empty name");
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
