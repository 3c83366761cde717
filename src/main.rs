use anyhow::Context;
use clap::Parser;
use connpool::api::start_api_server;
use connpool::config::{Config, LoggingConfig};
use connpool::connector::TcpConnector;
use connpool::telemetry::TelemetryHistory;
use connpool::{Pool, PoolError};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[cfg(feature = "fast-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "connpool")]
#[command(about = "Elastic TCP connection pool with graceful shutdown", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long)]
    log_level: Option<String>,

    /// Upstream address (overrides config)
    #[arg(long, value_name = "ADDR")]
    target: Option<String>,

    /// Pool option override, e.g. --set poolMax=8 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Lease N connections concurrently at startup and report
    #[arg(long, value_name = "N")]
    probe: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Handle config generation
    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        println!("Edit the file and run: connpool --config {:?}", config_path);
        return Ok(());
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(target) = args.target {
        config.connector.address = target;
    }
    for assignment in &args.set {
        config
            .pool
            .apply_assignment(assignment)
            .with_context(|| format!("applying --set {}", assignment))?;
    }
    config.validate()?;

    init_logging(&config.logging)?;
    info!("connpool v{} starting", env!("CARGO_PKG_VERSION"));

    let pool_config = config.pool.to_pool_config()?;
    let grace = pool_config.terminate_grace;
    let connector = TcpConnector::new(
        config.connector.socket_addr()?,
        config.connector.connect_timeout(),
    );
    let telemetry = TelemetryHistory::new(
        config.telemetry.max_events,
        config.telemetry.retention_hours,
    );

    info!(
        "Pool '{}' -> {} (min {}, max {}, increment {})",
        pool_config.name,
        connector.address(),
        pool_config.pool_min,
        pool_config.pool_max,
        pool_config.pool_increment
    );
    let pool = Pool::with_telemetry(connector, pool_config, telemetry)?;

    let api = if config.api.enabled {
        Some(start_api_server(&config.api, pool.clone()).await?)
    } else {
        None
    };

    if let Some(count) = args.probe {
        run_probe(&pool, count).await;
    }

    info!("Pool ready, press Ctrl+C to shut down");
    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;
    info!(
        "Received Ctrl+C, terminating pool (grace {:?}); press Ctrl+C again to force",
        grace
    );

    let graceful = pool.terminate(false);
    tokio::pin!(graceful);
    let result = tokio::select! {
        result = &mut graceful => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Second Ctrl+C, forcing termination");
            pool.terminate(true).await
        }
    };

    if let Some(api) = api {
        api.abort();
    }

    match result {
        Ok(()) => {
            info!("Pool terminated cleanly");
            Ok(())
        }
        Err(e) => {
            error!("Pool termination error: {}", e);
            Err(e.into())
        }
    }
}

/// Lease `count` connections concurrently, touch each one and release it.
async fn run_probe(pool: &Pool<TcpConnector>, count: usize) {
    info!("Probing pool with {} concurrent leases", count);
    let started = Instant::now();

    let tasks = (0..count).map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move {
            let lease = pool.connect().await?;
            let peer = lease.lock().await?.peer_addr()?;
            lease.release().await?;
            Ok::<_, PoolError>(peer)
        })
    });

    let mut succeeded = 0;
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(Ok(_)) => succeeded += 1,
            Ok(Err(e)) => warn!("Probe lease failed: {}", e),
            Err(e) => warn!("Probe task failed: {}", e),
        }
    }

    let stats = pool.stats();
    info!(
        succeeded,
        failed = count - succeeded,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        immediate = stats.immediate,
        size = stats.size,
        created = stats.total_created,
        "Probe complete"
    );
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_new(&logging.level)
        .map_err(|e| PoolError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    Ok(())
}
