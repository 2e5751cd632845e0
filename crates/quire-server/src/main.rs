//! # quire-server
//!
//! HTTP API for the Quire code-review journal.
//!
//! This binary provides:
//! - **REST API** (axum) for accounts, submissions, reviews and line comments
//! - **Federation reads** for peer journals holding a security token
//! - **Reconciliation** of the database with the submission tree at startup,
//!   periodically and on demand

mod api;
mod archive;
mod config;
mod error;
mod sessions;

use std::sync::Arc;

use quire_store::Repository;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::sessions::SessionStore;

/// How often expired sessions are dropped.
const SESSION_PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,quire_server=debug,quire_store=info")),
        )
        .init();

    info!("Starting Quire journal server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        database = %config.database_path.display(),
        fs_root = %config.fs_root.display(),
        group_number = config.group_number,
        admin_enabled = config.admin_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open the repository and reconcile before serving
    // -----------------------------------------------------------------------
    let db_path = config.database_path.clone();
    let fs_root = config.fs_root.clone();
    let group_number = config.group_number;
    let repo = tokio::task::spawn_blocking(move || -> anyhow::Result<Repository> {
        let repo = Repository::open(&db_path, &fs_root, group_number)?;
        let report = repo.reconcile()?;
        info!(clean = report.is_clean(), "Startup reconciliation finished");
        Ok(repo)
    })
    .await??;

    let app_state = AppState {
        repo: Arc::new(repo),
        sessions: SessionStore::new(config.session_ttl),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic reconciliation
    if !config.reconcile_interval.is_zero() {
        let repo = app_state.repo.clone();
        let period = config.reconcile_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; startup already reconciled.
            interval.tick().await;
            loop {
                interval.tick().await;
                let repo = repo.clone();
                match tokio::task::spawn_blocking(move || repo.reconcile()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Periodic reconciliation failed"),
                    Err(e) => tracing::error!(error = %e, "Reconciliation task panicked"),
                }
            }
        });
    }

    // Periodic session cleanup
    let sessions = app_state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            sessions.purge_expired().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
