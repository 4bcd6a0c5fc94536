//! rarity-scan - Collection rarity scanner
//!
//! `serve` runs the HTTP API, `scan` ranks one collection from the command
//! line, `clear-cache` empties the result cache.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rarity_common::config::{ConfigResolver, LoggingConfig, TomlConfig};
use rarity_common::events::EventBus;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rarity_scan::db::{self, SqliteRunStore};
use rarity_scan::report::{self, DEFAULT_PAGE_SIZE};
use rarity_scan::services::{
    run_collection, BaseUriSource, CollectionSource, HttpContentFetcher, IpfsGateway, LogObserver,
    RpcSourceProvider, ScanDeps, ScanRequest, SourceProvider,
};
use rarity_scan::{AppState, ScanDefaults};

/// Command-line arguments for rarity-scan
#[derive(Parser, Debug)]
#[command(name = "rarity-scan")]
#[command(about = "Rank collection items by attribute rarity")]
#[command(version)]
struct Cli {
    /// Config file (takes precedence over RARITY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite result cache file
    #[arg(long, global = true, env = "RARITY_DATABASE")]
    database: Option<PathBuf>,

    /// Gateway prefix for ipfs:// URIs
    #[arg(long, global = true, env = "RARITY_IPFS_GATEWAY")]
    gateway: Option<String>,

    /// JSON-RPC endpoint used to read collection contracts
    #[arg(long, global = true, env = "RARITY_RPC_URL")]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address
        #[arg(long, env = "RARITY_BIND")]
        bind: Option<String>,
    },

    /// Scan one collection and print a page of its ranking
    Scan(ScanArgs),

    /// Remove every cached scan result
    ClearCache,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Collection contract address
    collection: String,

    /// Concurrent fetch workers
    #[arg(long)]
    concurrency: Option<usize>,

    /// Attempts per item before it is abandoned
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Ignore and clear cached results before scanning
    #[arg(long)]
    no_cache: bool,

    /// Read metadata from <BASE_URI>/<id> instead of the contract
    #[arg(long, requires = "supply")]
    base_uri: Option<String>,

    /// Item count when scanning a base URI
    #[arg(long)]
    supply: Option<u64>,

    /// Ranking page to print (1-based)
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Items per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    limit: usize,

    /// Print the detail of one item instead of a page
    #[arg(long)]
    item: Option<u64>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigResolver::new(cli.config.clone())
        .resolve()
        .context("Failed to load configuration")?;
    if let Some(gateway) = cli.gateway {
        config.scan.ipfs_gateway = gateway;
    }
    if let Some(rpc_url) = cli.rpc_url {
        config.scan.rpc_url = Some(rpc_url);
    }
    if let Some(database) = cli.database {
        config.store.database_path = Some(database);
    }
    config.validate()?;

    init_tracing(&config.logging)?;
    info!("rarity-scan {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Scan(args) => scan(config, args).await,
        Command::ClearCache => clear_cache(config).await,
    }
}

/// Install the global subscriber: stderr, or the configured log file
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rarity_scan={level},rarity_common={level},tower_http=info",
            level = logging.level
        ))
    });

    let (stderr_layer, file_layer) = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn request_timeout(config: &TomlConfig) -> Duration {
    Duration::from_secs(config.scan.request_timeout_secs)
}

async fn open_store(config: &TomlConfig) -> Result<Arc<SqliteRunStore>> {
    let db_path = config.store.resolved_database_path();
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok(Arc::new(SqliteRunStore::new(pool)))
}

async fn serve(config: TomlConfig, bind: Option<String>) -> Result<()> {
    let store = open_store(&config).await?;
    let gateway = IpfsGateway::new(&config.scan.ipfs_gateway)?;
    let fetcher = Arc::new(HttpContentFetcher::new(
        request_timeout(&config),
        config.scan.requests_per_second,
    )?);

    if config.scan.rpc_url.is_none() {
        warn!("No RPC URL configured, scan requests will be rejected");
    }
    let sources = Arc::new(RpcSourceProvider::new(
        config.scan.rpc_url.clone(),
        request_timeout(&config),
    )?);

    let event_bus = EventBus::new(1000);
    let state = AppState::new(
        store,
        event_bus,
        sources,
        fetcher,
        gateway,
        ScanDefaults::from_config(&config),
    );
    let app = rarity_scan::build_router(state);

    let bind = bind.unwrap_or_else(|| config.server.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn scan(config: TomlConfig, args: ScanArgs) -> Result<()> {
    let store = open_store(&config).await?;
    let gateway = IpfsGateway::new(&config.scan.ipfs_gateway)?;
    let fetcher = Arc::new(HttpContentFetcher::new(
        request_timeout(&config),
        config.scan.requests_per_second,
    )?);

    let source: Arc<dyn CollectionSource> = match (&args.base_uri, args.supply) {
        (Some(base), Some(supply)) => Arc::new(BaseUriSource::new(base, supply)?),
        _ => RpcSourceProvider::new(config.scan.rpc_url.clone(), request_timeout(&config))?
            .source_for(&args.collection)?,
    };

    let request = ScanRequest {
        collection: args.collection.clone(),
        concurrency: args.concurrency.unwrap_or(config.scan.concurrency),
        max_attempts: args.max_attempts.unwrap_or(config.scan.max_attempts),
        use_cache: config.store.use_cache && !args.no_cache,
    };
    let deps = ScanDeps {
        source,
        fetcher,
        gateway: gateway.clone(),
        store,
    };

    let report = run_collection(&request, &deps, &LogObserver::default()).await?;
    if !report.abandoned.is_empty() {
        warn!(abandoned = ?report.abandoned, "Items left out of the ranking");
    }

    if let Some(id) = args.item {
        let detail = report::item_detail(&report.dataset, id, &gateway)
            .with_context(|| format!("Item {} is not in the ranking", id))?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&detail)?);
        } else {
            println!("#{} {} (rank {}, score {:.2})", detail.id, detail.name, detail.rank, detail.score);
            for attribute in &detail.attributes {
                println!(
                    "  {:<24} {:<24} {:>6.2}%  {:>10.2}",
                    attribute.label,
                    rarity_scan::models::value_key(&attribute.value),
                    attribute.percent,
                    attribute.score
                );
            }
        }
        return Ok(());
    }

    let page = report::paginate(&report.dataset, args.page, args.limit, &gateway)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        println!("{}", report::render_page(&page));
    }
    Ok(())
}

async fn clear_cache(config: TomlConfig) -> Result<()> {
    use rarity_scan::db::RunStore;

    let store = open_store(&config).await?;
    store.clear().await?;
    info!("Result cache cleared");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
