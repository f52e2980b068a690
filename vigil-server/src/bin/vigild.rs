use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_core::TrustedSubnet;
use vigil_server::grpc::{MetricsGrpc, MetricsServiceServer};
use vigil_server::storage::{file::run_periodic_save, Backend};
use vigil_server::{AppState, Mode, ServerConfig};

/// In-flight requests get this long to drain after the shutdown signal.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = ServerConfig::load()?;
    init_logging(&cfg.log_level);

    // Key material and the trusted subnet are validated before anything
    // binds; a bad key or CIDR aborts startup.
    let private_key = if cfg.crypto_key.is_empty() {
        info!("no private key configured, expecting plaintext payloads");
        None
    } else {
        let key = vigil_core::crypto::load_private_key(Path::new(&cfg.crypto_key))
            .context("failed to load private key")?;
        info!(path = %cfg.crypto_key, "private key loaded");
        Some(key)
    };
    let trusted = TrustedSubnet::parse(&cfg.trusted_subnet)?;

    let shutdown = vigil_core::shutdown::install();

    let backend = Backend::setup(&cfg.database_dsn, &cfg.file_storage_path, cfg.restore)
        .await
        .context("failed to set up storage")?;

    let save_task = match &backend {
        Backend::File(fs) => Some(tokio::spawn(run_periodic_save(
            fs.clone(),
            Duration::from_secs(cfg.store_interval.max(1)),
            shutdown.clone(),
        ))),
        _ => None,
    };

    let state = Arc::new(
        AppState::new(backend.shared(), shutdown.clone())
            .with_hash_key(cfg.hash_key.clone())
            .with_private_key(private_key)
            .with_trusted_subnet(trusted),
    );

    match cfg.mode {
        Mode::Http => serve_http(&cfg.address, state, shutdown.clone()).await?,
        Mode::Grpc => serve_grpc(&cfg.grpc_address, state, shutdown.clone()).await?,
    }

    // Let the file backend write its final snapshot before exiting.
    if let Some(task) = save_task {
        let _ = task.await;
    }

    info!("server stopped");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve_http(addr: &str, state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let app = vigil_server::http::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "http server listening");

    let drain = shutdown.clone();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { drain.cancelled().await })
            .await
    };

    tokio::select! {
        res = server => res.context("http server failed")?,
        _ = deadline(&shutdown) => {
            warn!("drain deadline exceeded, abandoning in-flight requests");
        }
    }
    Ok(())
}

async fn serve_grpc(addr: &str, state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let socket = tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("failed to resolve {addr}"))?
        .next()
        .with_context(|| format!("no address for {addr}"))?;

    let service = MetricsServiceServer::new(MetricsGrpc::new(state));
    info!(%addr, "grpc server listening");

    let drain = shutdown.clone();
    let server = tonic::transport::Server::builder()
        .add_service(service)
        .serve_with_shutdown(socket, async move { drain.cancelled().await });

    tokio::select! {
        res = server => res.context("grpc server failed")?,
        _ = deadline(&shutdown) => {
            warn!("drain deadline exceeded, abandoning in-flight streams");
        }
    }
    Ok(())
}

/// Resolves only after shutdown has fired *and* the drain deadline passed.
async fn deadline(shutdown: &CancellationToken) {
    shutdown.cancelled().await;
    tokio::time::sleep(SHUTDOWN_DEADLINE).await;
}
