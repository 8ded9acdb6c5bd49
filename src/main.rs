use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_folders::catalog::SqliteCatalog;
use media_folders::config::{AppConfig, ContentConfig, ServerConfig, WatcherConfig};
use media_folders::error::{AppError, Result};
use media_folders::fs::watcher::{sync_batches, ContentWatcher, DEFAULT_FLOOD_THRESHOLD};
use media_folders::scan::variants::{ImageVariants, NoVariants, VariantGenerator};
use media_folders::server;
use media_folders::service::DirectoryService;

/// Serve an editable directory tree over a media content root.
#[derive(Parser, Debug)]
#[command(name = "mfd", version, about)]
struct Cli {
    /// Content root (defaults to the configured root, then the current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file to load instead of the default locations
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Sync directories automatically when files change
    #[arg(long)]
    watch: bool,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: self.host.clone(),
                port: self.port,
            },
            content: ContentConfig {
                root: self.root.clone(),
                base_url: None,
            },
            watcher: WatcherConfig {
                enabled: self.watch.then_some(true),
                debounce_ms: None,
            },
            ..AppConfig::default()
        }
    }
}

fn init_logging(config: &AppConfig, debug: bool) {
    let default = if debug { "debug" } else { config.log_level() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Sync every directory the watcher reports. The watcher is held paused for two debounce
/// intervals past each batch so the scan's own writes are not reported back.
fn spawn_auto_sync(
    service: Arc<DirectoryService>,
    debounce: Duration,
) -> Option<Arc<ContentWatcher>> {
    let (dirs_tx, mut dirs_rx) = mpsc::unbounded_channel::<Vec<String>>();
    let watcher = match ContentWatcher::new(service.root(), debounce, DEFAULT_FLOOD_THRESHOLD, dirs_tx)
    {
        Ok(watcher) => Arc::new(watcher),
        Err(e) => {
            warn!(error = %e, "watcher unavailable, automatic sync disabled");
            return None;
        }
    };

    let handle = watcher.clone();
    tokio::spawn(async move {
        sync_batches(&handle, &mut dirs_rx, debounce * 2, |dir| {
            let service = service.clone();
            async move {
                let id = dir.clone();
                match tokio::task::spawn_blocking(move || service.sync(Some(&id))).await {
                    Ok(Ok(report)) => {
                        info!(dir = %dir, registered = report.registered.len(), "auto sync")
                    }
                    Ok(Err(e)) => warn!(dir = %dir, error = %e, "auto sync failed"),
                    Err(e) => warn!(dir = %dir, error = %e, "auto sync task failed"),
                }
            }
        })
        .await;
    });

    Some(watcher)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_warnings) = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    init_logging(&config, cli.debug);
    for warning in &config_warnings {
        warn!(path = %warning.path.display(), error = %warning.message, "failed to parse config file");
    }

    let configured_root = config.content_root();
    let root = configured_root.canonicalize().map_err(|_| {
        AppError::InvalidPath(format!("{} does not exist", configured_root.display()))
    })?;

    let catalog = Arc::new(SqliteCatalog::open(config.database_path())?);
    let variants: Arc<dyn VariantGenerator> = if config.variants_enabled() {
        Arc::new(ImageVariants::new(config.variant_sizes()))
    } else {
        Arc::new(NoVariants)
    };
    let service = Arc::new(
        DirectoryService::new(&root, config.base_url(), catalog, variants)
            .with_variant_mode(Some(config.variant_mode())),
    );
    info!(root = %root.display(), "content root");

    server::start_server(service.clone(), config.host(), config.port()).await?;

    let _watcher = if config.watcher_enabled() {
        spawn_auto_sync(service, Duration::from_millis(config.debounce_ms()))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
