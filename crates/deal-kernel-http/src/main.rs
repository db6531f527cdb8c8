// crates/deal-kernel-http/src/main.rs
// ============================================================================
// Module: Deal Kernel Server Binary
// Description: Entry point wiring configuration, store, and HTTP surface.
// Purpose: Run the deal lifecycle kernel as a standalone HTTP service.
// Dependencies: deal-kernel-http, deal-kernel-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! The binary resolves environment configuration, opens the `SQLite` store
//! and artifact root, selects an audit sink, and serves the REST surface
//! until the process is stopped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use deal_kernel_http::AppState;
use deal_kernel_http::ArtifactStore;
use deal_kernel_http::FileAuditSink;
use deal_kernel_http::KernelAuditSink;
use deal_kernel_http::KernelConfig;
use deal_kernel_http::StderrAuditSink;
use deal_kernel_http::build_router;
use deal_kernel_store_sqlite::DealStore;
use deal_kernel_store_sqlite::DealStoreConfig;
use tokio::sync::Semaphore;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Runs the kernel server.
#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            let _ = writeln!(std::io::stderr(), "deal-kernel startup failed: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Builds and serves the kernel, returning a startup failure message.
async fn run() -> Result<(), String> {
    let config = KernelConfig::from_env().map_err(|err| err.to_string())?;
    let store = DealStore::open(&DealStoreConfig {
        path: config.database_path.clone(),
        busy_timeout_ms: 5_000,
        journal_mode: deal_kernel_store_sqlite::SqliteStoreMode::Wal,
        sync_mode: deal_kernel_store_sqlite::SqliteSyncMode::Full,
    })
    .map_err(|err| err.to_string())?;
    let artifacts =
        Arc::new(ArtifactStore::open(&config.artifact_root).map_err(|err| err.to_string())?);
    let audit: Arc<dyn KernelAuditSink> = match &config.audit_log {
        Some(path) => Arc::new(FileAuditSink::new(path).map_err(|err| err.to_string())?),
        None => Arc::new(StderrAuditSink),
    };
    let state = AppState {
        store,
        artifacts,
        audit,
        inflight: Arc::new(Semaphore::new(config.max_inflight)),
    };
    let router = build_router(state, config.max_body_bytes);
    let listener =
        tokio::net::TcpListener::bind(config.bind).await.map_err(|err| err.to_string())?;
    axum::serve(listener, router).await.map_err(|err| err.to_string())
}
