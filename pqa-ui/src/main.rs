//! pqa-ui - Paragraph quality annotation service
//!
//! Serves the annotation page and its JSON API. Each annotator works through
//! a fixed block of fiction and nonfiction prompts, ranking and rating four
//! paragraphs per prompt; every change is written to a local recovery file
//! and the finished session is submitted to the durable store.

use anyhow::{Context, Result};
use clap::Parser;
use pqa_common::assignment::check_capacity;
use pqa_common::config::{ConfigResolver, RemoteConfig, TomlConfig};
use pqa_common::content::ContentCatalog;
use pqa_common::persistence::{DurableStore, LocalRecoveryStore, RowStore, SheetsRowStore, SqliteRowStore};
use pqa_common::session::SessionStores;
use pqa_ui::{bind_listener, build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pqa-ui")]
#[command(about = "Paragraph quality annotation service")]
#[command(version)]
struct Args {
    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, env = "PQA_BIND_ADDRESS")]
    bind_address: Option<String>,

    #[arg(short, long, env = "PQA_PORT")]
    port: Option<u16>,

    /// Folder for recovery files and the SQLite database
    #[arg(long, env = "PQA_DATA_FOLDER")]
    data_folder: Option<PathBuf>,

    #[arg(long, env = "PQA_FICTION_PATH")]
    fiction_path: Option<PathBuf>,

    #[arg(long, env = "PQA_NONFICTION_PATH")]
    nonfiction_path: Option<PathBuf>,

    #[arg(long, env = "PQA_ADMIN_SECRET", hide_env_values = true)]
    admin_secret: Option<String>,
}

impl Args {
    /// Command-line / env values win over the config file
    fn apply(self, mut config: TomlConfig) -> TomlConfig {
        if let Some(bind_address) = self.bind_address {
            config.bind_address = bind_address;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(data_folder) = self.data_folder {
            config.data_folder = Some(data_folder);
        }
        if let Some(path) = self.fiction_path {
            config.fiction_path = path;
        }
        if let Some(path) = self.nonfiction_path {
            config.nonfiction_path = path;
        }
        if let Some(secret) = self.admin_secret {
            config.admin_secret = Some(secret);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let resolver = ConfigResolver::new(args.config.clone());
    let config = resolver.resolve().context("Failed to load configuration")?;
    let config = args.apply(config);

    let default_filter = format!(
        "pqa_ui={0},pqa_common={0},tower_http={0}",
        config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PQA annotation service v{}", env!("CARGO_PKG_VERSION"));
    match resolver.config_path().filter(|p| p.exists()) {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No config file found; running on compiled defaults"),
    }

    let roster = config.validate().context("Invalid configuration")?;
    info!(
        annotators = roster.len(),
        prompts_per_annotator = config.prompts_per_annotator,
        "Annotator roster loaded"
    );

    let catalog = ContentCatalog::load(&config.fiction_path, &config.nonfiction_path)
        .context("Failed to load reference content")?;

    for shortfall in check_capacity(&roster, &catalog, config.prompts_per_annotator) {
        warn!(
            annotator = %shortfall.annotator,
            category = %shortfall.category,
            assigned = shortfall.assigned,
            expected = shortfall.expected,
            "Not enough prompts for annotator"
        );
    }

    let local = LocalRecoveryStore::new(config.recovery_dir());
    local
        .ensure_dir()
        .await
        .context("Failed to create recovery directory")?;
    info!("Recovery files: {}", local.dir().display());

    let durable = DurableStore::new(open_row_store(&config).await?);
    info!("Durable store: {}", durable.backend_name());

    if config.admin_secret.is_none() {
        info!("Admin recovery view disabled (no admin_secret configured)");
    }

    let state = AppState::new(
        catalog,
        roster,
        config.prompts_per_annotator,
        SessionStores { local, durable },
        config.admin_secret.clone(),
    );
    let app = build_router(state);

    let listener = bind_listener(&config.bind_address, config.port)
        .await
        .with_context(|| {
            format!("Failed to bind to {}:{}", config.bind_address, config.port)
        })?;
    info!("pqa-ui listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Backend selected by `[remote]`
async fn open_row_store(config: &TomlConfig) -> Result<Arc<dyn RowStore>> {
    match &config.remote {
        RemoteConfig::Sqlite { .. } => {
            let path = config
                .database_path()
                .context("SQLite backend without a database path")?;
            let store = SqliteRowStore::open(&path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            Ok(Arc::new(store))
        }
        RemoteConfig::Sheets {
            spreadsheet_id,
            sheet_name,
            token_env,
        } => {
            let token = std::env::var(token_env)
                .with_context(|| format!("Sheets backend needs an access token in ${}", token_env))?;
            let store = SheetsRowStore::new(spreadsheet_id.as_str(), sheet_name.as_str(), token)?;
            store
                .ensure_header()
                .await
                .context("Failed to reach the annotation spreadsheet")?;
            Ok(Arc::new(store))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
