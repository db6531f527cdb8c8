// crates/deal-kernel-core/tests/gate_evaluator.rs
// ============================================================================
// Module: Gate Evaluator Tests
// Description: Tests for the pure gate evaluation pipeline.
// ============================================================================
//! ## Overview
//! Validates authority fail-fast, approval-threshold counting, material
//! truth checks, override validity, and Explain block construction.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use deal_kernel_core::ActorId;
use deal_kernel_core::ApprovalVote;
use deal_kernel_core::AuthorityRule;
use deal_kernel_core::BlockReason;
use deal_kernel_core::DealId;
use deal_kernel_core::EventType;
use deal_kernel_core::GateAction;
use deal_kernel_core::GateContext;
use deal_kernel_core::GateDecision;
use deal_kernel_core::MaterialTruth;
use deal_kernel_core::RoleName;
use deal_kernel_core::Timestamp;
use deal_kernel_core::TruthClass;
use deal_kernel_core::evaluate;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a rule for the tests' deal.
fn rule(deal_id: DealId, action: GateAction, threshold: u32, roles: &[RoleName]) -> AuthorityRule {
    AuthorityRule {
        deal_id,
        action,
        threshold,
        roles_allowed: roles.to_vec(),
        roles_required: Vec::new(),
    }
}

/// Builds a vote by a fresh actor holding the given roles.
fn vote(roles: &[RoleName]) -> ApprovalVote {
    ApprovalVote {
        actor_id: ActorId::generate(),
        roles: roles.to_vec(),
    }
}

/// Builds a baseline context for `ATTEST_READY_TO_CLOSE`.
fn attest_context(deal_id: DealId) -> GateContext {
    GateContext {
        event_type: EventType::ClosingReadinessAttested,
        rule: rule(deal_id, GateAction::AttestReadyToClose, 2, &[RoleName::Gp, RoleName::Legal]),
        override_rule: rule(deal_id, GateAction::Override, 0, &[RoleName::Gp, RoleName::Court]),
        actor_roles: Some(vec![RoleName::Gp]),
        actor_id: Some(ActorId::generate()),
        approvals: vec![vote(&[RoleName::Gp]), vote(&[RoleName::Legal])],
        materials: vec![
            MaterialTruth {
                material_type: "FinalUnderwriting".to_string(),
                truth_class: TruthClass::Doc,
            },
            MaterialTruth {
                material_type: "SourcesAndUses".to_string(),
                truth_class: TruthClass::Doc,
            },
        ],
        last_override_at: None,
        last_gate_event_at: None,
    }
}

// ============================================================================
// SECTION: Authority
// ============================================================================

/// Tests an actor without an allowed role is denied before other checks.
#[test]
fn test_authority_denial_is_fail_fast() {
    let deal_id = DealId::generate();
    let mut ctx = attest_context(deal_id);
    ctx.actor_roles = Some(vec![RoleName::Auditor]);
    ctx.approvals.clear();
    ctx.materials.clear();

    let GateDecision::Blocked {
        explain,
        authority_denied,
    } = evaluate(&ctx)
    else {
        panic!("expected blocked decision");
    };
    assert!(authority_denied);
    assert_eq!(explain.reasons.len(), 1);
    assert!(explain.reasons[0].is_authority());
}

/// Tests a missing actor skips the authority check (replay without actor).
#[test]
fn test_absent_actor_skips_authority() {
    let deal_id = DealId::generate();
    let mut ctx = attest_context(deal_id);
    ctx.actor_roles = None;
    ctx.actor_id = None;

    assert!(matches!(evaluate(&ctx), GateDecision::Allowed { .. }));
}

// ============================================================================
// SECTION: Approval Threshold
// ============================================================================

/// Tests a satisfied gate passes without an override.
#[test]
fn test_satisfied_gate_is_allowed() {
    let ctx = attest_context(DealId::generate());
    assert_eq!(
        evaluate(&ctx),
        GateDecision::Allowed {
            override_used: false
        }
    );
}

/// Tests approvals below threshold produce a structured shortfall reason.
#[test]
fn test_threshold_shortfall_is_reported() {
    let mut ctx = attest_context(DealId::generate());
    ctx.approvals = vec![vote(&[RoleName::Gp])];

    let GateDecision::Blocked {
        explain, ..
    } = evaluate(&ctx)
    else {
        panic!("expected blocked decision");
    };
    let Some(BlockReason::ApprovalThreshold {
        threshold,
        current_count,
        satisfied_by_role,
        ..
    }) = explain.reasons.first()
    else {
        panic!("expected approval threshold reason");
    };
    assert_eq!(*threshold, 2);
    assert_eq!(*current_count, 1);
    assert_eq!(satisfied_by_role.get(&RoleName::Gp), Some(&1));
    assert_eq!(satisfied_by_role.get(&RoleName::Legal), Some(&0));
    assert_eq!(explain.next_steps.len(), 1);
    assert_eq!(explain.next_steps[0].description, "Collect approvals for the required action.");
}

/// Tests votes from actors without an allowed role never count.
#[test]
fn test_unqualified_votes_do_not_count() {
    let mut ctx = attest_context(DealId::generate());
    ctx.approvals = vec![vote(&[RoleName::Auditor]), vote(&[RoleName::Escrow])];

    assert!(matches!(evaluate(&ctx), GateDecision::Blocked { .. }));
}

// ============================================================================
// SECTION: Materials
// ============================================================================

/// Tests a missing required material blocks the gate.
#[test]
fn test_missing_material_blocks() {
    let mut ctx = attest_context(DealId::generate());
    ctx.materials.retain(|material| material.material_type != "FinalUnderwriting");

    let GateDecision::Blocked {
        explain, ..
    } = evaluate(&ctx)
    else {
        panic!("expected blocked decision");
    };
    assert!(explain.reasons.iter().any(|reason| matches!(
        reason,
        BlockReason::MissingMaterial { material_type, .. } if material_type == "FinalUnderwriting"
    )));
    assert_eq!(explain.next_steps[0].description, "Provide required materials for the action.");
}

/// Tests a material below the required truth class blocks the gate.
#[test]
fn test_insufficient_truth_blocks() {
    let mut ctx = attest_context(DealId::generate());
    for material in &mut ctx.materials {
        if material.material_type == "SourcesAndUses" {
            material.truth_class = TruthClass::Human;
        }
    }

    let GateDecision::Blocked {
        explain, ..
    } = evaluate(&ctx)
    else {
        panic!("expected blocked decision");
    };
    assert!(explain.reasons.iter().any(|reason| matches!(
        reason,
        BlockReason::InsufficientTruth {
            material_type,
            current_truth: TruthClass::Human,
            ..
        } if material_type == "SourcesAndUses"
    )));
}

/// Tests the truth rank forbids AI satisfying a HUMAN requirement.
#[test]
fn test_truth_rank_order() {
    assert!(TruthClass::Doc.satisfies(TruthClass::Human));
    assert!(TruthClass::Human.satisfies(TruthClass::Human));
    assert!(!TruthClass::Ai.satisfies(TruthClass::Human));
    assert!(!TruthClass::Human.satisfies(TruthClass::Doc));
}

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Tests a pending override suppresses gate reasons exactly once.
#[test]
fn test_override_suppresses_then_expires() {
    let mut ctx = attest_context(DealId::generate());
    ctx.approvals.clear();
    ctx.last_override_at = Some(Timestamp::parse("2026-03-01T10:00:00.000Z").unwrap());

    assert_eq!(
        evaluate(&ctx),
        GateDecision::Allowed {
            override_used: true
        }
    );

    ctx.last_gate_event_at = Some(Timestamp::parse("2026-03-01T11:00:00.000Z").unwrap());
    assert!(matches!(evaluate(&ctx), GateDecision::Blocked { .. }));

    ctx.last_override_at = Some(Timestamp::parse("2026-03-01T12:00:00.000Z").unwrap());
    assert_eq!(
        evaluate(&ctx),
        GateDecision::Allowed {
            override_used: true
        }
    );
}

/// Tests an override never bypasses the authority check.
#[test]
fn test_override_does_not_bypass_authority() {
    let mut ctx = attest_context(DealId::generate());
    ctx.actor_roles = Some(vec![RoleName::Auditor]);
    ctx.last_override_at = Some(Timestamp::parse("2026-03-01T10:00:00.000Z").unwrap());

    let GateDecision::Blocked {
        authority_denied, ..
    } = evaluate(&ctx)
    else {
        panic!("expected blocked decision");
    };
    assert!(authority_denied);
}

/// Tests a passing gate does not consume a pending override.
#[test]
fn test_passing_gate_reports_no_override_use() {
    let mut ctx = attest_context(DealId::generate());
    ctx.last_override_at = Some(Timestamp::parse("2026-03-01T10:00:00.000Z").unwrap());

    assert_eq!(
        evaluate(&ctx),
        GateDecision::Allowed {
            override_used: false
        }
    );
}
