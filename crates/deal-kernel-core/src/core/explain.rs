// crates/deal-kernel-core/src/core/explain.rs
// ============================================================================
// Module: Deal Kernel Explain Blocks
// Description: Machine-readable block reasons and unblock guidance.
// Purpose: Make "why is this blocked" a first-class response type.
// Dependencies: crate::core::{authority, identifiers, material, time}, serde
// ============================================================================

//! ## Overview
//! When a gate refuses an action, the kernel answers with an Explain block:
//! the action, a structured reason set, and the roles that can fix or
//! override each reason. Explain blocks are product surface, not errors, and
//! are returned verbatim from live appends (409) and explain replay (200).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::authority::GateAction;
use crate::core::authority::RoleName;
use crate::core::identifiers::ActorId;
use crate::core::material::TruthClass;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Gate evaluation status on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExplainStatus {
    /// The action may proceed.
    Allowed,
    /// The action is blocked; reasons enumerate why.
    Blocked,
}

// ============================================================================
// SECTION: Reasons
// ============================================================================

/// One structured reason inside an Explain block.
///
/// # Invariants
/// - `code` tags are stable wire identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum BlockReason {
    /// Actor lacks an allowed role for the action.
    Authority {
        /// Action that was attempted.
        action: GateAction,
        /// Acting principal, when known.
        actor_id: Option<ActorId>,
        /// Roles that are allowed to perform the action.
        roles_allowed: Vec<RoleName>,
    },
    /// Approval count is below the rule threshold.
    ApprovalThreshold {
        /// Required approval count.
        threshold: u32,
        /// Approvals currently counted.
        current_count: u32,
        /// Roles whose holders' approvals count.
        roles_allowed: Vec<RoleName>,
        /// Approval counts broken down by allowed role.
        satisfied_by_role: BTreeMap<RoleName, u32>,
    },
    /// A required material does not exist at evaluation time.
    MissingMaterial {
        /// Required material type name.
        material_type: String,
        /// Minimum truth class the material must carry.
        required_truth: TruthClass,
    },
    /// A required material exists but ranks below the required truth class.
    InsufficientTruth {
        /// Required material type name.
        material_type: String,
        /// Minimum truth class the material must carry.
        required_truth: TruthClass,
        /// Truth class the material currently carries.
        current_truth: TruthClass,
    },
}

impl BlockReason {
    /// Indicates whether the reason is an authority denial.
    #[must_use]
    pub const fn is_authority(&self) -> bool {
        matches!(self, Self::Authority { .. })
    }

    /// Indicates whether the reason is an approval shortfall.
    #[must_use]
    pub const fn is_approval_shortfall(&self) -> bool {
        matches!(self, Self::ApprovalThreshold { .. })
    }
}

// ============================================================================
// SECTION: Next Steps
// ============================================================================

/// Guidance entry describing how to unblock an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    /// Human-readable unblock description.
    pub description: String,
    /// Roles able to satisfy the blocking requirement directly.
    pub can_be_fixed_by_roles: Vec<RoleName>,
    /// Roles able to override the gate instead.
    pub can_be_overridden_by_roles: Vec<RoleName>,
}

// ============================================================================
// SECTION: Explain Block
// ============================================================================

/// Machine-readable explanation of a blocked action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainBlock {
    /// Action that was evaluated.
    pub action: GateAction,
    /// Always [`ExplainStatus::Blocked`] for a block.
    pub status: ExplainStatus,
    /// Structured reasons, in pipeline order.
    pub reasons: Vec<BlockReason>,
    /// Unblock guidance.
    pub next_steps: Vec<NextStep>,
}

// ============================================================================
// SECTION: Replay Report
// ============================================================================

/// Projection summary embedded in replay outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    /// Lifecycle state.
    pub state: crate::runtime::projection::LifecycleState,
    /// Stress mode.
    pub stress_mode: crate::runtime::projection::StressMode,
}

/// Point-in-time inputs a replayed gate evaluation used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayInputs {
    /// Counted approvals for the action as of `t`.
    pub approvals_at_t: u32,
    /// Materials visible as of `t`.
    pub materials_at_t: MaterialsAtTime,
    /// Deal projection as of `t`.
    pub deal_state_at_t: ProjectionSummary,
}

/// Materials section of [`ReplayInputs`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialsAtTime {
    /// Material types visible as of `t` with their truth classes.
    pub list: Vec<MaterialAtTime>,
    /// The action's fixed requirements.
    pub requirements: Vec<RequirementAtTime>,
}

/// One material visible at replay time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialAtTime {
    /// Material type name.
    #[serde(rename = "type")]
    pub material_type: String,
    /// Truth class at `t`.
    pub truth_class: TruthClass,
}

/// One requirement row at replay time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementAtTime {
    /// Required material type name.
    #[serde(rename = "type")]
    pub material_type: String,
    /// Minimum truth class.
    pub required_truth: TruthClass,
}

/// Result of an explain replay at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Action that was evaluated.
    pub action: GateAction,
    /// Replay instant.
    pub at: Timestamp,
    /// Evaluation status at `t`.
    pub status: ExplainStatus,
    /// Deal projection at `t`.
    pub projection_summary: ProjectionSummary,
    /// Reasons, present when blocked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<BlockReason>,
    /// Unblock guidance, present when blocked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<NextStep>,
    /// Inputs the evaluation used, present when blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs_used: Option<ReplayInputs>,
}
