use clap::Parser;
use meshproxy::config::{load_config, Config};
use meshproxy::router::{registry, Headers, RouteTables, RouteWatcher, RouterRegistry};
use meshproxy::{MeshProxyError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "MeshProxy")]
#[command(about = "Sidecar proxy routing and upstream pooling core", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error), overrides config
    #[arg(long)]
    log_level: Option<String>,

    /// Listener whose routes resolve --header
    #[arg(long)]
    listener: Option<String>,

    /// Request header to route, as KEY=VALUE (repeatable)
    #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Reload routes when the configuration file changes
    #[arg(long)]
    watch: bool,
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle config generation
    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        println!("Edit the file and run: meshproxy --config {:?}", config_path);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => load_config(path).await?,
        None => Config::default(),
    };

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, &config.logging.format)?;

    info!("MeshProxy v{} starting", env!("CARGO_PKG_VERSION"));
    if args.config.is_none() {
        info!("No configuration file specified, using defaults");
    }

    #[cfg(feature = "metrics")]
    meshproxy::upstream::metrics::init();

    if !registry::install_global(RouterRegistry::with_defaults()) {
        warn!("Router registry already installed");
    }
    let registry = registry::global()
        .ok_or_else(|| MeshProxyError::Config("router registry unavailable".to_string()))?;

    let mut tables = RouteTables::new();
    for listener in &config.listeners {
        let table = registry.create(listener.downstream_protocol, listener)?;
        println!(
            "listener {} ({} -> {}): {} routes",
            listener.name,
            listener.downstream_protocol,
            listener.upstream_protocol,
            table.len().await
        );
        tables.insert(listener.name.clone(), Arc::new(table));
    }
    for cluster in &config.clusters {
        println!(
            "cluster {}: {} hosts, max_requests {}",
            cluster.name,
            cluster.hosts.len(),
            cluster.max_requests
        );
    }

    if !args.headers.is_empty() {
        let name = match &args.listener {
            Some(name) => name.clone(),
            None => config
                .listeners
                .first()
                .map(|l| l.name.clone())
                .ok_or_else(|| MeshProxyError::UnknownListener("<none>".to_string()))?,
        };
        let table = tables
            .get(&name)
            .ok_or_else(|| MeshProxyError::UnknownListener(name.clone()))?;

        let headers: Headers = args.headers.iter().cloned().collect::<HashMap<_, _>>();
        let result = table.route(&headers).await;
        match (&result.entry, result.cluster_name()) {
            (Some(entry), Some(cluster)) => println!(
                "route {} -> cluster {} (key {}, timeout {:?}, retries {})",
                entry.name().unwrap_or("<dynamic>"),
                cluster,
                result.match_key,
                entry.global_timeout(),
                entry.policy().num_retries()
            ),
            _ => println!("no route for listener {}", name),
        }
    }

    if args.watch {
        let Some(path) = args.config else {
            return Err(MeshProxyError::Config(
                "--watch requires --config".to_string(),
            ));
        };

        let mut watcher = RouteWatcher::new(path, Arc::new(tables));
        watcher.start().await?;

        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down gracefully...");
        watcher.stop();
    }

    Ok(())
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(level)
        .map_err(|e| MeshProxyError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    Ok(())
}
