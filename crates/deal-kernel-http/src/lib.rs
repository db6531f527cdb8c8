// crates/deal-kernel-http/src/lib.rs
// ============================================================================
// Module: Deal Kernel HTTP Library
// Description: HTTP surface, configuration, audit, artifacts, and exports.
// Purpose: Expose the kernel server building blocks for the binary and tests.
// Dependencies: crate submodules
// ============================================================================

//! ## Overview
//! This crate binds the kernel together: environment configuration, the
//! axum REST surface, JSON-line audit sinks, the content-addressed artifact
//! file store, the deterministic cover PDF, and the ProofPack exporter.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod artifacts;
pub mod audit;
pub mod config;
pub mod pdf;
pub mod proofpack;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifacts::ArtifactStore;
pub use artifacts::ArtifactStoreError;
pub use artifacts::safe_filename;
pub use audit::FileAuditSink;
pub use audit::KernelAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use config::ConfigError;
pub use config::KernelConfig;
pub use pdf::render_cover_sheet;
pub use proofpack::ProofPackBundle;
pub use proofpack::ProofPackError;
pub use proofpack::export;
pub use server::AppState;
pub use server::build_router;
