// crates/deal-kernel-store-sqlite/src/lib.rs
// ============================================================================
// Module: Deal Kernel SQLite Store Library
// Description: Durable kernel persistence backed by SQLite WAL.
// Purpose: Expose the transactional deal store and its configuration.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! This crate persists the kernel's relational model in `SQLite` and owns
//! the transactional event appender: gate evaluation, hash-chain append,
//! projection recompute, and the deal-row update share one transaction so a
//! blocked or failed append leaves no trace.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::AppendOutcome;
pub use store::ArtifactRegistration;
pub use store::DealStore;
pub use store::DealStoreConfig;
pub use store::DealStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
