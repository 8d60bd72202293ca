use anyhow::Context;
use clap::{Parser, Subcommand};
use pagestamp_daemon::{
    get_author_info, load_config, run_scheduler, search_pages, trigger_once, ConfigOverrides,
    ContentStore, DaemonConfig, FsContentStore, ReconciliationRun, ScheduleConfig,
    ServiceIdentity,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Pagestamp Daemon - stamps published content with the time it was processed
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "PAGESTAMP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of the filesystem content store
    #[arg(long, env = "PAGESTAMP_STORE_ROOT")]
    store_root: Option<PathBuf>,

    /// Root under which published items are reconciled
    #[arg(long, env = "PAGESTAMP_CONTENT_PATH")]
    content_path: Option<String>,

    /// Seconds between scheduled runs
    #[arg(long, env = "PAGESTAMP_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Minimum seconds before an item is stamped again
    #[arg(long, env = "PAGESTAMP_DEBOUNCE_SECS")]
    debounce_secs: Option<u64>,

    /// Enable or disable scheduled runs (true/false)
    #[arg(long, env = "PAGESTAMP_ENABLED")]
    enabled: Option<bool>,

    /// Service user the store sessions are opened for
    #[arg(long, env = "PAGESTAMP_SERVICE_USER")]
    service_user: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run on the configured interval until interrupted (default)
    Serve,
    /// Run a single reconciliation pass and print its outcome
    Once,
    /// Search page titles and descriptions
    Search {
        /// Text to look for
        term: String,
    },
    /// Show who last modified a page
    Author {
        /// Page path, e.g. /content/site/en
        path: String,
    },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            enabled: self.enabled,
            interval_secs: self.interval_secs,
            content_path: self.content_path.clone(),
            debounce_window_secs: self.debounce_secs,
            store_root: self.store_root.clone(),
            service_user: self.service_user.clone(),
        }
    }
}

fn schedule_config(config: &DaemonConfig) -> anyhow::Result<ScheduleConfig> {
    Ok(ScheduleConfig {
        enabled: config.enabled,
        interval: config.interval(),
        search_root: config.search_root()?,
        debounce_window: config.debounce_window(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = load_config(args.config.as_deref(), args.overrides())
        .await
        .context("Failed to load configuration")?;

    let store: Arc<dyn ContentStore> = Arc::new(FsContentStore::new(config.store_root.clone()));
    let identity = ServiceIdentity::new(config.service_user.clone());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(store, identity, &config).await,
        Command::Once => {
            let run = ReconciliationRun::new(store, identity);
            match trigger_once(&run, &schedule_config(&config)?).await {
                Some(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                    if let Some(failure) = outcome.failure {
                        anyhow::bail!("Reconciliation run failed: {}", failure);
                    }
                }
                None => info!("Reconciliation is disabled, nothing to do"),
            }
            Ok(())
        }
        Command::Search { term } => {
            let root = config.search_root()?;
            let results = search_pages(store.as_ref(), &identity, &root, &term).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Command::Author { path } => {
            let info = get_author_info(store.as_ref(), &identity, &path).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}

async fn serve(
    store: Arc<dyn ContentStore>,
    identity: ServiceIdentity,
    config: &DaemonConfig,
) -> anyhow::Result<()> {
    let schedule = schedule_config(config)?;
    let run = Arc::new(ReconciliationRun::new(store, identity));

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received interrupt, stopping..."),
            Err(e) => warn!("Failed to listen for interrupt: {}", e),
        }
        shutdown_tx.send(true).ok();
    });

    info!(
        "Starting Pagestamp daemon on {} (store: {})",
        schedule.search_root,
        config.store_root.display()
    );

    let metrics = run_scheduler(run, schedule, shutdown_rx).await;
    let snapshot = metrics.snapshot();

    info!(
        runs = snapshot.runs,
        items_processed = snapshot.items_processed,
        "Pagestamp daemon stopped"
    );
    Ok(())
}
