// crates/deal-kernel-core/src/runtime/gate.rs
// ============================================================================
// Module: Deal Kernel Gate Evaluation
// Description: Pure gate evaluator over point-in-time inputs.
// Purpose: Decide allow/block for a proposed action and build Explain blocks.
// Dependencies: crate::core::{authority, event, explain, material, time}
// ============================================================================

//! ## Overview
//! The gate evaluator is a pure function over a [`GateContext`] assembled by
//! the store for a specific instant. The same evaluator serves live appends
//! (at "now") and explain replay (at `t`), which keeps live block reasons and
//! replayed block reasons consistent by construction.
//!
//! The pipeline is: authority (fail-fast), then approval threshold and
//! material requirements (collected), with a valid override suppressing the
//! collected reasons but never the authority check.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::authority::AuthorityRule;
use crate::core::authority::RoleName;
use crate::core::event::EventType;
use crate::core::explain::BlockReason;
use crate::core::explain::ExplainBlock;
use crate::core::explain::ExplainStatus;
use crate::core::explain::NextStep;
use crate::core::identifiers::ActorId;
use crate::core::material::TruthClass;
use crate::core::material::requirements_for;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Context Inputs
// ============================================================================

/// One counted approval: a distinct actor whose latest vote for the action
/// is a grant, together with the deal roles the actor held at evaluation
/// time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalVote {
    /// Approving actor.
    pub actor_id: ActorId,
    /// Roles the actor held on the deal at evaluation time.
    pub roles: Vec<RoleName>,
}

/// One material visible at evaluation time (latest revision at or before
/// the instant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialTruth {
    /// Material type name.
    pub material_type: String,
    /// Truth class at evaluation time.
    pub truth_class: TruthClass,
}

/// Point-in-time inputs for one gate evaluation.
///
/// # Invariants
/// - All fields reflect the same evaluation instant.
/// - `rule` governs the resolved action; `override_rule` governs `OVERRIDE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateContext {
    /// Event type being proposed.
    pub event_type: EventType,
    /// Authority rule for the resolved action.
    pub rule: AuthorityRule,
    /// Authority rule for the `OVERRIDE` action (used in guidance).
    pub override_rule: AuthorityRule,
    /// Roles the proposing actor holds on the deal, or `None` to skip the
    /// authority check (explain replay without an actor).
    pub actor_roles: Option<Vec<RoleName>>,
    /// Identity of the proposing actor, for Explain payloads.
    pub actor_id: Option<ActorId>,
    /// Counted approvals for the action at evaluation time.
    pub approvals: Vec<ApprovalVote>,
    /// Materials visible at evaluation time.
    pub materials: Vec<MaterialTruth>,
    /// Most recent matching override attestation, if any.
    pub last_override_at: Option<Timestamp>,
    /// Most recent commit of the action's gate event, if any.
    pub last_gate_event_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The action may proceed.
    Allowed {
        /// Indicates a valid override suppressed blocking reasons.
        override_used: bool,
    },
    /// The action is blocked.
    Blocked {
        /// Explain block to return to the caller.
        explain: ExplainBlock,
        /// Indicates the block is an authority denial (403, not 409).
        authority_denied: bool,
    },
}

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Evaluates a gate context into an allow or block decision.
#[must_use]
pub fn evaluate(ctx: &GateContext) -> GateDecision {
    if let Some(roles) = &ctx.actor_roles {
        let authorized = roles.iter().any(|role| ctx.rule.roles_allowed.contains(role));
        if !authorized {
            let reason = BlockReason::Authority {
                action: ctx.rule.action,
                actor_id: ctx.actor_id,
                roles_allowed: ctx.rule.roles_allowed.clone(),
            };
            return GateDecision::Blocked {
                explain: build_explain(ctx, vec![reason]),
                authority_denied: true,
            };
        }
    }

    if !ctx.event_type.is_gate_event() {
        return GateDecision::Allowed {
            override_used: false,
        };
    }

    let mut reasons = Vec::new();
    collect_approval_reason(ctx, &mut reasons);
    collect_material_reasons(ctx, &mut reasons);

    if reasons.is_empty() {
        return GateDecision::Allowed {
            override_used: false,
        };
    }

    if override_valid(ctx) {
        return GateDecision::Allowed {
            override_used: true,
        };
    }

    GateDecision::Blocked {
        explain: build_explain(ctx, reasons),
        authority_denied: false,
    }
}

/// Indicates whether a pending override covers this gate.
///
/// An override is consumed by the next commit of the gate event: once a gate
/// event postdates the override, a fresh attestation is required.
#[must_use]
pub fn override_valid(ctx: &GateContext) -> bool {
    match (ctx.last_override_at, ctx.last_gate_event_at) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(override_at), Some(gate_at)) => override_at > gate_at,
    }
}

// ============================================================================
// SECTION: Check Pipeline
// ============================================================================

/// Collects an approval-threshold reason when the rule is unsatisfied.
fn collect_approval_reason(ctx: &GateContext, reasons: &mut Vec<BlockReason>) {
    if !ctx.rule.action.requires_approval_threshold() {
        return;
    }
    let counted: Vec<&ApprovalVote> = ctx
        .approvals
        .iter()
        .filter(|vote| vote.roles.iter().any(|role| ctx.rule.roles_allowed.contains(role)))
        .collect();
    let current_count = u32::try_from(counted.len()).unwrap_or(u32::MAX);
    if current_count >= ctx.rule.threshold {
        return;
    }
    let mut satisfied_by_role: BTreeMap<RoleName, u32> = BTreeMap::new();
    for role in &ctx.rule.roles_allowed {
        let holders =
            counted.iter().filter(|vote| vote.roles.contains(role)).count();
        satisfied_by_role.insert(*role, u32::try_from(holders).unwrap_or(u32::MAX));
    }
    reasons.push(BlockReason::ApprovalThreshold {
        threshold: ctx.rule.threshold,
        current_count,
        roles_allowed: ctx.rule.roles_allowed.clone(),
        satisfied_by_role,
    });
}

/// Collects missing-material and insufficient-truth reasons.
///
/// When several materials share a type, the best-ranked one is the one the
/// requirement is judged against.
fn collect_material_reasons(ctx: &GateContext, reasons: &mut Vec<BlockReason>) {
    for requirement in requirements_for(ctx.rule.action) {
        let current = ctx
            .materials
            .iter()
            .filter(|material| material.material_type == requirement.material_type)
            .max_by_key(|material| material.truth_class.rank());
        match current {
            None => reasons.push(BlockReason::MissingMaterial {
                material_type: requirement.material_type.to_string(),
                required_truth: requirement.required_truth,
            }),
            Some(material) if !material.truth_class.satisfies(requirement.required_truth) => {
                reasons.push(BlockReason::InsufficientTruth {
                    material_type: requirement.material_type.to_string(),
                    required_truth: requirement.required_truth,
                    current_truth: material.truth_class,
                });
            }
            Some(_) => {}
        }
    }
}

// ============================================================================
// SECTION: Explain Construction
// ============================================================================

/// Builds the Explain block for a reason set.
fn build_explain(ctx: &GateContext, reasons: Vec<BlockReason>) -> ExplainBlock {
    let description = if reasons.iter().any(BlockReason::is_approval_shortfall) {
        "Collect approvals for the required action."
    } else {
        "Provide required materials for the action."
    };
    let next_steps = vec![NextStep {
        description: description.to_string(),
        can_be_fixed_by_roles: ctx.rule.roles_allowed.clone(),
        can_be_overridden_by_roles: ctx.override_rule.roles_allowed.clone(),
    }];
    ExplainBlock {
        action: ctx.rule.action,
        status: ExplainStatus::Blocked,
        reasons,
        next_steps,
    }
}
