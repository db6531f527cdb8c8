// crates/deal-kernel-core/src/runtime/mod.rs
// ============================================================================
// Module: Deal Kernel Runtime
// Description: Pure evaluation logic over core types.
// Purpose: Group projection, gate evaluation, chain verification, snapshots.
// Dependencies: crate::runtime submodules
// ============================================================================

//! ## Overview
//! Runtime logic is deterministic and side-effect free. The store assembles
//! inputs; these modules evaluate them.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod chain;
pub mod gate;
pub mod projection;
pub mod snapshot;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use chain::ChainIssue;
pub use chain::ChainIssueKind;
pub use chain::ChainReport;
pub use chain::verify_chain;
pub use gate::ApprovalVote;
pub use gate::GateContext;
pub use gate::GateDecision;
pub use gate::MaterialTruth;
pub use gate::evaluate;
pub use gate::override_valid;
pub use projection::LifecycleState;
pub use projection::Projection;
pub use projection::StressMode;
pub use projection::project;
pub use snapshot::ApprovalSummary;
pub use snapshot::IntegrityNote;
pub use snapshot::MaterialRequirementStatus;
pub use snapshot::MaterialStateView;
pub use snapshot::ReplaySource;
pub use snapshot::RequirementStatus;
pub use snapshot::SnapshotReport;
pub use snapshot::TimelineSummary;
pub use snapshot::build_snapshot;
