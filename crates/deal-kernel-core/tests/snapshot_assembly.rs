// crates/deal-kernel-core/tests/snapshot_assembly.rs
// ============================================================================
// Module: Snapshot Assembly Tests
// Description: Tests for replay-source derivation and snapshot building.
// ============================================================================
//! ## Overview
//! Validates approval vote derivation (latest-wins with denials), override
//! and gate-event lookups, and the canonical snapshot summaries.

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
use deal_kernel_core::ActorRoleRecord;
use deal_kernel_core::DealId;
use deal_kernel_core::EventId;
use deal_kernel_core::EventRecord;
use deal_kernel_core::EventType;
use deal_kernel_core::GateAction;
use deal_kernel_core::LifecycleState;
use deal_kernel_core::MaterialId;
use deal_kernel_core::MaterialStateView;
use deal_kernel_core::ReplaySource;
use deal_kernel_core::RequirementStatus;
use deal_kernel_core::RoleName;
use deal_kernel_core::Timestamp;
use deal_kernel_core::TruthClass;
use deal_kernel_core::build_snapshot;
use deal_kernel_core::default_rules;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an event record at the given sequence and minute offset.
fn event(
    deal_id: DealId,
    sequence_number: u64,
    event_type: EventType,
    actor_id: Option<ActorId>,
    payload: Value,
) -> EventRecord {
    let minute = 10 + sequence_number;
    EventRecord {
        event_id: EventId::generate(),
        deal_id,
        event_type,
        actor_id,
        payload,
        authority_context: json!({}),
        evidence_refs: Vec::new(),
        sequence_number,
        previous_event_hash: None,
        event_hash: String::new(),
        created_at: Timestamp::parse(&format!("2026-03-01T09:{minute:02}:00Z")).unwrap(),
    }
}

/// Builds a role grant effective from the start of the scenario.
fn grant(deal_id: DealId, actor_id: ActorId, role: RoleName) -> ActorRoleRecord {
    ActorRoleRecord {
        actor_id,
        role,
        deal_id,
        created_at: Timestamp::parse("2026-03-01T09:00:00Z").unwrap(),
    }
}

// ============================================================================
// SECTION: Approval Votes
// ============================================================================

/// Tests per-actor latest-wins voting with denial cancellation.
#[test]
fn test_denial_cancels_earlier_grant() {
    let deal_id = DealId::generate();
    let gp = ActorId::generate();
    let legal = ActorId::generate();
    let source = ReplaySource {
        rules: default_rules(deal_id),
        events: vec![
            event(
                deal_id,
                1,
                EventType::ApprovalGranted,
                Some(gp),
                json!({"action": "ATTEST_READY_TO_CLOSE"}),
            ),
            event(
                deal_id,
                2,
                EventType::ApprovalGranted,
                Some(legal),
                json!({"action": "ATTEST_READY_TO_CLOSE"}),
            ),
            event(
                deal_id,
                3,
                EventType::ApprovalDenied,
                Some(legal),
                json!({"action": "ATTEST_READY_TO_CLOSE"}),
            ),
        ],
        actor_roles: vec![grant(deal_id, gp, RoleName::Gp), grant(deal_id, legal, RoleName::Legal)],
        materials: Vec::new(),
    };

    let votes = source.approval_votes(GateAction::AttestReadyToClose);
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].actor_id, gp);
}

/// Tests votes for a different action are isolated.
#[test]
fn test_votes_are_scoped_per_action() {
    let deal_id = DealId::generate();
    let gp = ActorId::generate();
    let source = ReplaySource {
        rules: default_rules(deal_id),
        events: vec![event(
            deal_id,
            1,
            EventType::ApprovalGranted,
            Some(gp),
            json!({"action": "APPROVE_DEAL"}),
        )],
        actor_roles: vec![grant(deal_id, gp, RoleName::Gp)],
        materials: Vec::new(),
    };

    assert_eq!(source.approval_votes(GateAction::ApproveDeal).len(), 1);
    assert!(source.approval_votes(GateAction::FinalizeClosing).is_empty());
}

// ============================================================================
// SECTION: Override Lookups
// ============================================================================

/// Tests override lookup requires a matching target and non-empty reason.
#[test]
fn test_override_lookup_filters_targets_and_reasons() {
    let deal_id = DealId::generate();
    let gp = ActorId::generate();
    let source = ReplaySource {
        rules: default_rules(deal_id),
        events: vec![
            event(
                deal_id,
                1,
                EventType::OverrideAttested,
                Some(gp),
                json!({"action": "FINALIZE_CLOSING", "reason": ""}),
            ),
            event(
                deal_id,
                2,
                EventType::OverrideAttested,
                Some(gp),
                json!({"action": "ATTEST_READY_TO_CLOSE", "reason": "audit-waived"}),
            ),
        ],
        actor_roles: vec![grant(deal_id, gp, RoleName::Gp)],
        materials: Vec::new(),
    };

    assert!(source.last_override_at(GateAction::FinalizeClosing).is_none());
    assert!(source.last_override_at(GateAction::AttestReadyToClose).is_some());
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Tests the snapshot reports projection, approvals, and requirements.
#[test]
fn test_snapshot_summaries() {
    let deal_id = DealId::generate();
    let gp = ActorId::generate();
    let at = Timestamp::parse("2026-03-01T10:00:00Z").unwrap();
    let source = ReplaySource {
        rules: default_rules(deal_id),
        events: vec![
            event(deal_id, 1, EventType::ReviewOpened, Some(gp), json!({})),
            event(
                deal_id,
                2,
                EventType::ApprovalGranted,
                Some(gp),
                json!({"action": "APPROVE_DEAL"}),
            ),
        ],
        actor_roles: vec![grant(deal_id, gp, RoleName::Gp)],
        materials: vec![MaterialStateView {
            material_id: MaterialId::generate(),
            material_type: "UnderwritingSummary".to_string(),
            truth_class: TruthClass::Ai,
            data: json!({}),
            created_at: Timestamp::parse("2026-03-01T09:30:00Z").unwrap(),
        }],
    };

    let snapshot = build_snapshot(deal_id, at, &source);
    assert_eq!(snapshot.projection.state, LifecycleState::UnderReview);
    assert_eq!(snapshot.timeline.events_count, 2);
    assert_eq!(snapshot.timeline.last_event_type, Some(EventType::ApprovalGranted));

    let approve = snapshot
        .approvals
        .iter()
        .find(|summary| summary.action == GateAction::ApproveDeal)
        .unwrap();
    assert_eq!(approve.current_count, 1);
    assert!(approve.satisfied);

    let underwriting = snapshot
        .material_requirements
        .iter()
        .find(|row| row.material_type == "UnderwritingSummary")
        .unwrap();
    assert_eq!(underwriting.status, RequirementStatus::Insufficient);
    assert_eq!(underwriting.current_truth, Some(TruthClass::Ai));

    let wire = snapshot
        .material_requirements
        .iter()
        .find(|row| row.material_type == "WireConfirmation")
        .unwrap();
    assert_eq!(wire.status, RequirementStatus::Missing);

    assert!(snapshot.integrity.deterministic);
    assert_eq!(snapshot.integrity.replay_from, "events+materials");
}
