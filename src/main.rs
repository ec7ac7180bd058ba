use anyhow::{Context, Result};
use disk_object_store::{config::AppConfig, routes::routes::app, services::build_backend};
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!("Starting disk-object-store with config: {:?}", cfg);
    tracing::info!(
        "Storage root {} (path containment checks: {}, max object size: {} bytes, chunk size: {} bytes)",
        cfg.storage.storage_dir.display(),
        cfg.storage.path_traversal_protection,
        cfg.storage.max_file_size,
        cfg.storage.chunk_size
    );
    if !cfg.storage.path_traversal_protection {
        tracing::warn!("Path containment checks are disabled");
    }

    // --- Initialize storage backend ---
    let storage = build_backend(&cfg.storage, &cfg.storage_backend)
        .await
        .with_context(|| format!("initializing `{}` storage backend", cfg.storage_backend))?;

    // --- Build router ---
    let app = app(storage, &cfg.allowed_origins);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err).with_context(|| format!("binding {}", addr)),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
