use anyhow::Context;
use clap::{Parser, ValueEnum};
use preranker_engine::{Config, Engine};
use preranker_memory_storage::MemoryStore;
use preranker_redis_storage::RedisStore;
use preranker_upstream::{HttpBlobClient, HttpEventSource, HttpSimulatorClient, RetryPolicy};
use std::{path::PathBuf, sync::Arc};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address to bind the operational surface to.
    #[arg(long, default_value_t = String::from("0.0.0.0:8300"))]
    address: String,

    /// Type of store backend to use.
    #[arg(long, short, default_value_t = Db::Memory, value_enum)]
    db: Db,

    /// Address of the Redis server, if using redis.
    #[arg(long, default_value_t = String::from("redis://127.0.0.1:6379"))]
    redis_address: String,

    /// Chain RPC endpoint polled for intent and solution events.
    #[arg(long)]
    rpc_url: String,

    /// Base URL of the blob store.
    #[arg(long)]
    blob_url: String,

    /// Dry-run endpoint of the simulator.
    #[arg(long)]
    simulator_url: String,

    /// Package id whose intent and solution events are consumed.
    #[arg(long)]
    package: String,

    /// Optional TOML file overriding engine defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = true)]
    tracing: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Db {
    Memory,
    Redis,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.tracing {
        if let Ok(filter) = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
            .parse("")
        {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }

    // Anything that fails down here is an unrecoverable bootstrap or run
    // failure; a clean shutdown exits zero.
    if let Err(err) = run_node(cli).await {
        tracing::error!(error = %err, "node failed");
        std::process::exit(1);
    }
}

async fn run_node(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref()).await?;

    let blob: Arc<HttpBlobClient> = Arc::new(
        HttpBlobClient::new(&cli.blob_url, config.blob_rps, RetryPolicy::default())
            .context("building blob client")?,
    );
    let simulator: Arc<HttpSimulatorClient> = Arc::new(
        HttpSimulatorClient::new(&cli.simulator_url, config.simulator_rps)
            .context("building simulator client")?,
    );
    let source: Arc<HttpEventSource> = Arc::new(
        HttpEventSource::new(&cli.rpc_url, &cli.package).context("building event source")?,
    );

    let (local_addr_tx, local_addr_rx) = tokio::sync::oneshot::channel();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    let address = cli.address.clone();
    let jh = tokio::spawn(async move {
        match cli.db {
            Db::Memory => {
                let store = MemoryStore::new();
                let engine = Engine::new(store, blob, simulator, source, config);
                preranker_node::run(engine, address, local_addr_tx, Some(shutdown_rx)).await
            }
            Db::Redis => {
                let store = RedisStore::new(&cli.redis_address)
                    .await
                    .context("connecting to redis")?;
                let engine = Engine::new(store, blob, simulator, source, config);
                preranker_node::run(engine, address, local_addr_tx, Some(shutdown_rx)).await
            }
        }
    });

    // A closed channel means the node task failed before binding; the join
    // below surfaces its error.
    if let Ok(local_addr) = local_addr_rx.await {
        tracing::info!(%local_addr, "operational surface listening");
    }
    jh.await.context("node task panicked")?
}

async fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}
