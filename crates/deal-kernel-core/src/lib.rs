// crates/deal-kernel-core/src/lib.rs
// ============================================================================
// Module: Deal Kernel Core Library
// Description: Public API surface for the deal lifecycle kernel core.
// Purpose: Expose core types and pure runtime evaluation helpers.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! The kernel core defines the event-sourced deal model: hash-chained
//! events, the lifecycle and stress projection, authority rules, truth-
//! classed materials, gate evaluation with first-class Explain blocks, and
//! point-in-time snapshot assembly. It performs no I/O; persistence and the
//! HTTP surface integrate through explicit inputs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use runtime::ApprovalSummary;
pub use runtime::ApprovalVote;
pub use runtime::ChainIssue;
pub use runtime::ChainIssueKind;
pub use runtime::ChainReport;
pub use runtime::GateContext;
pub use runtime::GateDecision;
pub use runtime::IntegrityNote;
pub use runtime::LifecycleState;
pub use runtime::MaterialRequirementStatus;
pub use runtime::MaterialStateView;
pub use runtime::MaterialTruth;
pub use runtime::Projection;
pub use runtime::ReplaySource;
pub use runtime::RequirementStatus;
pub use runtime::SnapshotReport;
pub use runtime::StressMode;
pub use runtime::TimelineSummary;
pub use runtime::build_snapshot;
pub use runtime::evaluate;
pub use runtime::override_valid;
pub use runtime::project;
pub use runtime::verify_chain;
