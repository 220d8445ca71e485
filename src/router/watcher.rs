use super::table::RouteTable;
use crate::config::{load_config_sync, Config};
use crate::utils::error::{MeshProxyError, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode,
    Result as NotifyResult, Watcher,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Route tables keyed by listener name.
pub type RouteTables = HashMap<String, Arc<RouteTable>>;

/// Watches the configuration file and reloads route tables on change.
pub struct RouteWatcher {
    config_path: PathBuf,
    tables: Arc<RouteTables>,
    watcher: Option<RecommendedWatcher>,
}

impl RouteWatcher {
    pub fn new(config_path: PathBuf, tables: Arc<RouteTables>) -> Self {
        Self {
            config_path,
            tables,
            watcher: None,
        }
    }

    /// Start watching the config file for changes
    pub async fn start(&mut self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(100);
        let config_path = self.config_path.clone();
        let tables = Arc::clone(&self.tables);

        let mut watcher = RecommendedWatcher::new(
            move |res: NotifyResult<Event>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        let _ = tx.blocking_send(event);
                    }
                }
            },
            NotifyConfig::default()
                .with_poll_interval(Duration::from_secs(1))
                .with_compare_contents(true),
        )
        .map_err(|e| MeshProxyError::Config(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&config_path, RecursiveMode::NonRecursive)
            .map_err(|e| MeshProxyError::Config(format!("Failed to watch config file: {}", e)))?;

        self.watcher = Some(watcher);

        info!(path = ?config_path, "Route hot reload watcher started");

        tokio::spawn(async move {
            while let Some(_event) = rx.recv().await {
                info!("Config file changed, reloading routes...");
                Self::handle_reload_event(&config_path, &tables).await;
            }
        });

        Ok(())
    }

    async fn handle_reload_event(config_path: &Path, tables: &RouteTables) {
        let start_time = Instant::now();

        let new_config = match load_config_sync(config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Failed to load new config, keeping current routes");
                return;
            }
        };

        let reloaded = reload_tables(tables, &new_config).await;
        info!(
            listeners = reloaded,
            duration_ms = start_time.elapsed().as_millis(),
            "Route tables reloaded"
        );
    }

    /// Stop watching
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!("Route hot reload watcher stopped");
        }
    }
}

impl Drop for RouteWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reload every table that has a listener in `config`; returns how many did.
///
/// Tables whose listener disappeared keep their current rules.
pub async fn reload_tables(tables: &RouteTables, config: &Config) -> usize {
    let mut reloaded = 0;

    for (name, table) in tables {
        let Some(listener) = config.listener(name) else {
            warn!(listener = %name, "Listener missing from new config, keeping current routes");
            continue;
        };

        match table.reload(listener).await {
            Ok(()) => reloaded += 1,
            Err(e) => {
                error!(listener = %name, error = %e, "Failed to reload routes, keeping current ones")
            }
        }
    }

    reloaded
}
