// crates/deal-kernel-core/src/core/draft.rs
// ============================================================================
// Module: Deal Kernel Draft Sandbox Types
// Description: Per-deal draft state, simulated events, and gate previews.
// Purpose: Model what-if event sequences layered over the committed ledger.
// Dependencies: crate::core::{event, explain, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Each deal has at most one draft sandbox: an ordered bucket of simulated
//! events that never join the committed ledger until an explicit commit.
//! Simulation skips gate checks so blocked sequences can be explored; the
//! cached gate previews show what would block on the composite stream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::authority::GateAction;
use crate::core::event::EventType;
use crate::core::explain::BlockReason;
use crate::core::explain::NextStep;
use crate::core::explain::ProjectionSummary;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::DealId;
use crate::core::identifiers::DraftId;
use crate::core::identifiers::GatePreviewId;
use crate::core::identifiers::SimulatedEventId;
use crate::core::time::Timestamp;
use crate::runtime::projection::LifecycleState;
use crate::runtime::projection::StressMode;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Draft sandbox row.
///
/// # Invariants
/// - Zero or one per deal; created on first simulation, deleted on revert
///   or commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftStateRecord {
    /// Draft identifier.
    pub draft_id: DraftId,
    /// Deal the sandbox belongs to.
    pub deal_id: DealId,
    /// Sandbox creation time.
    pub created_at: Timestamp,
}

/// One simulated event inside a draft sandbox.
///
/// # Invariants
/// - `sequence_order` is 0-based and dense within the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedEventRecord {
    /// Simulated event identifier.
    pub simulated_event_id: SimulatedEventId,
    /// Owning draft.
    pub draft_id: DraftId,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Acting principal, if any.
    pub actor_id: Option<ActorId>,
    /// Opaque event payload.
    pub payload: Value,
    /// Caller-supplied authority context.
    pub authority_context: Value,
    /// Evidence references.
    pub evidence_refs: Vec<String>,
    /// 0-based position within the draft.
    pub sequence_order: u32,
    /// Simulation time.
    pub created_at: Timestamp,
}

/// Cached gate preview for one gate-advancing action.
///
/// # Invariants
/// - Regenerated from scratch on every simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatePreview {
    /// Preview identifier.
    pub preview_id: GatePreviewId,
    /// Owning draft.
    pub draft_id: DraftId,
    /// Previewed action.
    pub action: GateAction,
    /// Indicates the composite stream would block the action.
    pub is_blocked: bool,
    /// Block reasons, empty when the action would pass.
    pub reasons: Vec<BlockReason>,
    /// Unblock guidance, empty when the action would pass.
    pub next_steps: Vec<NextStep>,
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Sandbox status returned by start and simulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftStatus {
    /// Draft identifier.
    pub draft_id: DraftId,
    /// Deal the sandbox belongs to.
    pub deal_id: DealId,
    /// Projection over committed events only.
    pub committed: ProjectionSummary,
    /// Projection over committed plus simulated events.
    pub draft: ProjectionSummary,
    /// Number of simulated events in the sandbox.
    pub simulated_events_count: u32,
}

/// Gate previews plus the composite projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatePreviewSet {
    /// Projection over committed plus simulated events.
    pub projection: ProjectionSummary,
    /// Previews for the gate-advancing actions.
    pub gates: Vec<GatePreview>,
}

/// Committed-side summary within a draft diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedSummary {
    /// Lifecycle state over committed events.
    pub state: LifecycleState,
    /// Stress mode over committed events.
    pub stress_mode: StressMode,
    /// Committed event count.
    pub events_count: u64,
}

/// Draft-side summary within a draft diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
    /// Lifecycle state over the composite stream.
    pub state: LifecycleState,
    /// Stress mode over the composite stream.
    pub stress_mode: StressMode,
    /// Simulated event count.
    pub simulated_events_count: u32,
}

/// Committed-versus-draft comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftDiff {
    /// Committed-side summary.
    pub committed: CommittedSummary,
    /// Draft-side summary.
    pub draft: DraftSummary,
    /// Simulated events in order.
    pub delta_events: Vec<SimulatedEventRecord>,
}
