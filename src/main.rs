//! dev-middleware
//!
//! Development server that mounts hot-reloaded middleware files in front of an
//! optional static directory.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!   Client Request        │  http::server (request id, trace, timeout)   │
//!   ──────────────────────┼─▶ pipeline::entry_point ── prefix? ──┐       │
//!                         │        │ yes                         │ no    │
//!                         │        ▼                             │       │
//!                         │   defaults → mw/a → mw/b → …  ───────┤       │
//!                         │        ▲                             ▼       │
//!                         │        │ ArcSwap<Pipeline>    static dir/404 │
//!                         │   watcher::coordinator ◀── notify ◀── disk   │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use dev_middleware::config::{
    load_config, load_config_or_default, schema::DEFAULT_CONFIG_FILE, validate_config, ConfigError,
    DevConfig,
};
use dev_middleware::discovery::{locate, Patterns};
use dev_middleware::lifecycle::shutdown_signal;
use dev_middleware::observability::{init_logging, init_metrics};
use dev_middleware::{DevMiddleware, DevServer, Options, Shutdown, StartupError};

#[derive(Parser)]
#[command(name = "dev-middleware")]
#[command(about = "Dev server with hot-reloaded middleware files", long_about = None)]
struct Cli {
    /// Config file (defaults apply when ./dev-middleware.toml is absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides server.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// URL prefix the middleware is mounted under
    #[arg(short, long)]
    prefix: Option<String>,

    /// Directory served when no middleware answers
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Print the matched middleware files and exit
    #[arg(long)]
    list: bool,

    /// Middleware glob patterns, replacing middleware.files
    files: Vec<String>,
}

impl Cli {
    fn load(&self) -> Result<DevConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => load_config_or_default(&PathBuf::from(DEFAULT_CONFIG_FILE))?,
        };

        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.middleware.prefix_url = prefix.clone();
        }
        if let Some(dir) = &self.static_dir {
            config.server.static_dir = Some(dir.clone());
        }
        if !self.files.is_empty() {
            config.middleware.files = Patterns::from(self.files.clone());
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    run(cli).await?;
    Ok(())
}

async fn run(cli: Cli) -> dev_middleware::Result<()> {
    let config = cli.load()?;
    let cwd = std::env::current_dir()?;

    init_logging(&config.observability);
    tracing::info!("dev-middleware v{} starting", env!("CARGO_PKG_VERSION"));

    if cli.list {
        let paths = locate(&config.middleware.files, &cwd).map_err(StartupError::from)?;
        for path in paths {
            println!("{}", path.display());
        }
        return Ok(());
    }

    tracing::info!(
        bind_address = %config.server.bind_address,
        prefix = %config.middleware.prefix_url,
        patterns = ?config.middleware.files.iter().collect::<Vec<_>>(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let dev = DevMiddleware::with_manifest_loader(Options::from_config(&config.middleware, cwd));
    let server = DevServer::new(&config.server, &dev);
    let watch = dev.start(shutdown.subscribe()).await?;

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let stopped = shutdown.signalled();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, stopped).await?;
    watch.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
