// crates/deal-kernel-store-sqlite/tests/store.rs
// ============================================================================
// Module: SQLite Deal Store Tests
// Description: End-to-end store tests for gated appends and replay views.
// ============================================================================
//! ## Overview
//! Exercises the transactional appender against the full lifecycle: gated
//! advances, overrides, chain verification, point-in-time snapshots, the
//! draft sandbox, and artifact hash ownership.

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
use deal_kernel_core::ActorType;
use deal_kernel_core::ArtifactId;
use deal_kernel_core::ArtifactRecord;
use deal_kernel_core::BlockReason;
use deal_kernel_core::DealId;
use deal_kernel_core::EventRecord;
use deal_kernel_core::EventType;
use deal_kernel_core::ExplainStatus;
use deal_kernel_core::GateAction;
use deal_kernel_core::LifecycleState;
use deal_kernel_core::ProposedEvent;
use deal_kernel_core::RoleName;
use deal_kernel_core::StressMode;
use deal_kernel_core::Timestamp;
use deal_kernel_core::TruthClass;
use deal_kernel_store_sqlite::AppendOutcome;
use deal_kernel_store_sqlite::ArtifactRegistration;
use deal_kernel_store_sqlite::DealStore;
use deal_kernel_store_sqlite::DealStoreConfig;
use deal_kernel_store_sqlite::DealStoreError;
use deal_kernel_store_sqlite::SqliteStoreMode;
use deal_kernel_store_sqlite::SqliteSyncMode;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Opens a store inside a fresh temporary directory.
fn open_store() -> (TempDir, DealStore) {
    let dir = TempDir::new().unwrap();
    let store = DealStore::open(&DealStoreConfig {
        path: dir.path().join("kernel.db"),
        busy_timeout_ms: 5_000,
        journal_mode: SqliteStoreMode::Wal,
        sync_mode: SqliteSyncMode::Full,
    })
    .unwrap();
    (dir, store)
}

/// Builds a proposed event with an object payload.
fn proposed(event_type: EventType, actor_id: ActorId, payload: Value) -> ProposedEvent {
    ProposedEvent {
        event_type,
        actor_id: Some(actor_id),
        payload,
        authority_context: json!({}),
        evidence_refs: Vec::new(),
    }
}

/// Appends an event and asserts it committed.
fn must_commit(store: &DealStore, deal_id: DealId, event: &ProposedEvent) -> EventRecord {
    match store.append_event(deal_id, event).unwrap() {
        AppendOutcome::Committed {
            event, ..
        } => event,
        AppendOutcome::Blocked {
            explain, ..
        } => panic!("unexpected block: {:?}", explain.reasons),
    }
}

/// Posts an approval for an action.
fn approve(store: &DealStore, deal_id: DealId, actor_id: ActorId, action: GateAction) {
    must_commit(
        store,
        deal_id,
        &proposed(EventType::ApprovalGranted, actor_id, json!({"action": action.as_str()})),
    );
}

/// Deal fixture with the four standard closing-party actors.
struct ClosingParties {
    /// Deal under test.
    deal_id: DealId,
    /// General partner.
    gp: ActorId,
    /// Legal counsel.
    legal: ActorId,
    /// Lender.
    lender: ActorId,
    /// Escrow agent.
    escrow: ActorId,
}

/// Creates a deal with the standard closing parties.
fn closing_parties(store: &DealStore) -> ClosingParties {
    let (deal, _genesis) = store.create_deal("Riverside Portfolio").unwrap();
    let deal_id = deal.deal_id;
    let gp = store
        .create_actor(deal_id, "gp", ActorType::Human, RoleName::Gp)
        .unwrap()
        .actor
        .actor_id;
    let legal = store
        .create_actor(deal_id, "legal", ActorType::Human, RoleName::Legal)
        .unwrap()
        .actor
        .actor_id;
    let lender = store
        .create_actor(deal_id, "lender", ActorType::Human, RoleName::Lender)
        .unwrap()
        .actor
        .actor_id;
    let escrow = store
        .create_actor(deal_id, "escrow", ActorType::Human, RoleName::Escrow)
        .unwrap()
        .actor
        .actor_id;
    ClosingParties {
        deal_id,
        gp,
        legal,
        lender,
        escrow,
    }
}

/// Drives a deal from draft to closed through every gate.
fn drive_to_closed(store: &DealStore, parties: &ClosingParties) {
    let deal_id = parties.deal_id;
    must_commit(store, deal_id, &proposed(EventType::ReviewOpened, parties.gp, json!({})));

    store
        .create_material(deal_id, "UnderwritingSummary", TruthClass::Human, json!({}))
        .unwrap();
    approve(store, deal_id, parties.gp, GateAction::ApproveDeal);
    must_commit(store, deal_id, &proposed(EventType::DealApproved, parties.gp, json!({})));

    store.create_material(deal_id, "FinalUnderwriting", TruthClass::Doc, json!({})).unwrap();
    store.create_material(deal_id, "SourcesAndUses", TruthClass::Doc, json!({})).unwrap();
    approve(store, deal_id, parties.gp, GateAction::AttestReadyToClose);
    approve(store, deal_id, parties.legal, GateAction::AttestReadyToClose);
    must_commit(
        store,
        deal_id,
        &proposed(EventType::ClosingReadinessAttested, parties.gp, json!({})),
    );

    store.create_material(deal_id, "WireConfirmation", TruthClass::Doc, json!({})).unwrap();
    store
        .create_material(deal_id, "EntityFormationDocs", TruthClass::Doc, json!({}))
        .unwrap();
    approve(store, deal_id, parties.gp, GateAction::FinalizeClosing);
    approve(store, deal_id, parties.lender, GateAction::FinalizeClosing);
    approve(store, deal_id, parties.escrow, GateAction::FinalizeClosing);
    must_commit(store, deal_id, &proposed(EventType::ClosingFinalized, parties.gp, json!({})));
}

/// Drives a closed deal into operations.
fn drive_to_operating(store: &DealStore, parties: &ClosingParties) {
    let deal_id = parties.deal_id;
    store
        .create_material(deal_id, "PropertyManagementAgreement", TruthClass::Doc, json!({}))
        .unwrap();
    approve(store, deal_id, parties.gp, GateAction::ActivateOperations);
    must_commit(store, deal_id, &proposed(EventType::OperationsActivated, parties.gp, json!({})));
}

// ============================================================================
// SECTION: Deal Creation
// ============================================================================

/// Tests a new deal seeds default rules and a verifiable genesis chain.
#[test]
fn test_create_deal_seeds_rules_and_genesis() {
    let (_dir, store) = open_store();
    let (deal, genesis) = store.create_deal("Riverside Portfolio").unwrap();

    assert_eq!(deal.state, LifecycleState::Draft);
    assert_eq!(deal.stress_mode, StressMode::Sm0);
    assert_eq!(genesis.sequence_number, 1);
    assert!(genesis.previous_event_hash.is_none());

    let source = store.replay_source(deal.deal_id, None).unwrap();
    assert_eq!(source.rules.len(), 16);

    let report = store.verify(deal.deal_id).unwrap();
    assert!(report.valid);
    assert_eq!(report.total_events, 1);
}

/// Tests deal names must be non-empty.
#[test]
fn test_create_deal_rejects_empty_name() {
    let (_dir, store) = open_store();
    assert!(matches!(store.create_deal("  "), Err(DealStoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Gated Lifecycle
// ============================================================================

/// Tests the full create-approve-close scenario with a dense valid chain.
#[test]
fn test_full_closing_flow() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    drive_to_closed(&store, &parties);

    let deal = store.deal(parties.deal_id).unwrap();
    assert_eq!(deal.state, LifecycleState::Closed);
    assert_eq!(deal.stress_mode, StressMode::Sm0);

    let report = store.verify(parties.deal_id).unwrap();
    assert!(report.valid, "chain issues: {:?}", report.issues);
    assert_eq!(report.total_events, 11);

    let events = store.events(parties.deal_id).unwrap();
    let sequences: Vec<u64> = events.iter().map(|event| event.sequence_number).collect();
    assert_eq!(sequences, (1..=11).collect::<Vec<u64>>());
    for pair in events.windows(2) {
        assert_eq!(pair[1].previous_event_hash.as_deref(), Some(pair[0].event_hash.as_str()));
    }
}

/// Tests an actor without an allowed role is refused with an authority
/// denial.
#[test]
fn test_authority_denied_actor() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    let outcome = store
        .append_event(
            parties.deal_id,
            &proposed(EventType::ReviewOpened, parties.legal, json!({})),
        )
        .unwrap();

    let AppendOutcome::Blocked {
        explain,
        authority_denied,
    } = outcome
    else {
        panic!("expected blocked outcome");
    };
    assert!(authority_denied);
    assert!(explain.reasons[0].is_authority());
    assert_eq!(store.events(parties.deal_id).unwrap().len(), 1);
}

/// Tests an unknown actor is treated as holding no roles.
#[test]
fn test_unknown_actor_is_denied() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    let outcome = store
        .append_event(
            parties.deal_id,
            &proposed(EventType::ReviewOpened, ActorId::generate(), json!({})),
        )
        .unwrap();
    assert!(matches!(
        outcome,
        AppendOutcome::Blocked {
            authority_denied: true,
            ..
        }
    ));
}

/// Tests a missing material blocks, and an override permits exactly one
/// commit.
#[test]
fn test_missing_material_then_override() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    let deal_id = parties.deal_id;
    must_commit(&store, deal_id, &proposed(EventType::ReviewOpened, parties.gp, json!({})));
    store
        .create_material(deal_id, "UnderwritingSummary", TruthClass::Human, json!({}))
        .unwrap();
    approve(&store, deal_id, parties.gp, GateAction::ApproveDeal);
    must_commit(&store, deal_id, &proposed(EventType::DealApproved, parties.gp, json!({})));

    // SourcesAndUses only; FinalUnderwriting is deliberately absent.
    store.create_material(deal_id, "SourcesAndUses", TruthClass::Doc, json!({})).unwrap();
    approve(&store, deal_id, parties.gp, GateAction::AttestReadyToClose);
    approve(&store, deal_id, parties.legal, GateAction::AttestReadyToClose);

    let outcome = store
        .append_event(
            deal_id,
            &proposed(EventType::ClosingReadinessAttested, parties.gp, json!({})),
        )
        .unwrap();
    let AppendOutcome::Blocked {
        explain,
        authority_denied,
    } = outcome
    else {
        panic!("expected blocked outcome");
    };
    assert!(!authority_denied);
    assert!(explain.reasons.iter().any(|reason| matches!(
        reason,
        BlockReason::MissingMaterial { material_type, .. } if material_type == "FinalUnderwriting"
    )));

    must_commit(
        &store,
        deal_id,
        &proposed(
            EventType::OverrideAttested,
            parties.gp,
            json!({"action": "ATTEST_READY_TO_CLOSE", "reason": "audit-waived"}),
        ),
    );
    let attested = must_commit(
        &store,
        deal_id,
        &proposed(EventType::ClosingReadinessAttested, parties.gp, json!({})),
    );
    assert_eq!(attested.authority_context.get("overrideUsed"), Some(&json!(true)));
    assert_eq!(
        attested.authority_context.get("overrideAction"),
        Some(&json!("ATTEST_READY_TO_CLOSE"))
    );
    assert_eq!(store.deal(deal_id).unwrap().state, LifecycleState::ReadyToClose);

    // The override was consumed by that commit; the same gate blocks again.
    let repeat = store
        .append_event(
            deal_id,
            &proposed(EventType::ClosingReadinessAttested, parties.gp, json!({})),
        )
        .unwrap();
    assert!(matches!(
        repeat,
        AppendOutcome::Blocked {
            authority_denied: false,
            ..
        }
    ));
}

/// Tests freeze preserves the prior state and drives the stress mode.
#[test]
fn test_freeze_round_trip() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    drive_to_closed(&store, &parties);
    drive_to_operating(&store, &parties);
    let court = store
        .create_actor(parties.deal_id, "court", ActorType::Human, RoleName::Court)
        .unwrap()
        .actor
        .actor_id;

    must_commit(&store, parties.deal_id, &proposed(EventType::FreezeImposed, court, json!({})));
    let frozen = store.deal(parties.deal_id).unwrap();
    assert_eq!(frozen.state, LifecycleState::Frozen);
    assert_eq!(frozen.stress_mode, StressMode::Sm3);

    must_commit(&store, parties.deal_id, &proposed(EventType::FreezeLifted, court, json!({})));
    let lifted = store.deal(parties.deal_id).unwrap();
    assert_eq!(lifted.state, LifecycleState::Operating);
    assert_eq!(lifted.stress_mode, StressMode::Sm0);
}

/// Tests distress toggles the stressed mode and resolves with approvals.
#[test]
fn test_distress_round_trip() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    drive_to_closed(&store, &parties);
    drive_to_operating(&store, &parties);

    must_commit(
        &store,
        parties.deal_id,
        &proposed(EventType::DistressDeclared, parties.gp, json!({})),
    );
    let distressed = store.deal(parties.deal_id).unwrap();
    assert_eq!(distressed.state, LifecycleState::Distressed);
    assert_eq!(distressed.stress_mode, StressMode::Sm2);

    // Resolution is threshold-gated: one approval is not enough.
    approve(&store, parties.deal_id, parties.gp, GateAction::ResolveDistress);
    let shortfall = store
        .append_event(
            parties.deal_id,
            &proposed(EventType::DistressResolved, parties.gp, json!({})),
        )
        .unwrap();
    assert!(matches!(
        shortfall,
        AppendOutcome::Blocked {
            authority_denied: false,
            ..
        }
    ));

    approve(&store, parties.deal_id, parties.lender, GateAction::ResolveDistress);
    must_commit(
        &store,
        parties.deal_id,
        &proposed(EventType::DistressResolved, parties.gp, json!({})),
    );
    let resolved = store.deal(parties.deal_id).unwrap();
    assert_eq!(resolved.state, LifecycleState::Resolved);
    assert_eq!(resolved.stress_mode, StressMode::Sm0);
}

// ============================================================================
// SECTION: Explain Replay
// ============================================================================

/// Tests a live block and its replay agree on the reasons.
#[test]
fn test_explain_matches_live_block() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    must_commit(
        &store,
        parties.deal_id,
        &proposed(EventType::ReviewOpened, parties.gp, json!({})),
    );

    let outcome = store
        .append_event(
            parties.deal_id,
            &proposed(EventType::DealApproved, parties.gp, json!({})),
        )
        .unwrap();
    let AppendOutcome::Blocked {
        explain, ..
    } = outcome
    else {
        panic!("expected blocked outcome");
    };

    let replay = store
        .explain(
            parties.deal_id,
            Timestamp::now(),
            GateAction::ApproveDeal,
            Some(parties.gp),
        )
        .unwrap();
    assert_eq!(replay.status, ExplainStatus::Blocked);
    for reason in &replay.reasons {
        assert!(explain.reasons.contains(reason), "unexpected replay reason: {reason:?}");
    }
    let inputs = replay.inputs_used.unwrap();
    assert_eq!(inputs.approvals_at_t, 0);
    assert_eq!(inputs.deal_state_at_t.state, LifecycleState::UnderReview);
}

/// Tests the snapshot excludes materials and events newer than `at`.
#[test]
fn test_snapshot_is_point_in_time() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    must_commit(
        &store,
        parties.deal_id,
        &proposed(EventType::ReviewOpened, parties.gp, json!({})),
    );
    std::thread::sleep(std::time::Duration::from_millis(10));
    let at = Timestamp::now();
    std::thread::sleep(std::time::Duration::from_millis(10));

    store
        .create_material(parties.deal_id, "UnderwritingSummary", TruthClass::Human, json!({}))
        .unwrap();
    approve(&store, parties.deal_id, parties.gp, GateAction::ApproveDeal);
    must_commit(&store, parties.deal_id, &proposed(EventType::DealApproved, parties.gp, json!({})));

    let snapshot = store.snapshot(parties.deal_id, at).unwrap();
    assert_eq!(snapshot.projection.state, LifecycleState::UnderReview);
    assert_eq!(snapshot.timeline.events_count, 2);
    assert!(snapshot.materials.is_empty());

    let current = store.snapshot(parties.deal_id, Timestamp::now()).unwrap();
    assert_eq!(current.projection.state, LifecycleState::Approved);
    assert_eq!(current.materials.len(), 1);
}

/// Tests material updates surface as revisions with point-in-time truth.
#[test]
fn test_material_revisions_are_append_only() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    let material = store
        .create_material(parties.deal_id, "UnderwritingSummary", TruthClass::Ai, json!({}))
        .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));
    let before_upgrade = Timestamp::now();
    std::thread::sleep(std::time::Duration::from_millis(10));
    store
        .update_material(
            parties.deal_id,
            material.material_id,
            Some(TruthClass::Human),
            None,
        )
        .unwrap();

    let revisions =
        store.material_revisions(parties.deal_id, material.material_id).unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].truth_class, TruthClass::Ai);
    assert_eq!(revisions[1].truth_class, TruthClass::Human);

    let past = store.snapshot(parties.deal_id, before_upgrade).unwrap();
    let row = past
        .materials
        .iter()
        .find(|view| view.material_type == "UnderwritingSummary")
        .unwrap();
    assert_eq!(row.truth_class, TruthClass::Ai);
}

// ============================================================================
// SECTION: Draft Sandbox
// ============================================================================

/// Tests simulate, diff, and commit on a fresh deal.
#[test]
fn test_draft_simulate_and_commit() {
    let (_dir, store) = open_store();
    let (deal, _genesis) = store.create_deal("Sandbox Deal").unwrap();
    let deal_id = deal.deal_id;

    let started = store.draft_start(deal_id).unwrap();
    assert_eq!(started.simulated_events_count, 0);
    assert!(store.deal(deal_id).unwrap().is_draft);

    let review = ProposedEvent {
        event_type: EventType::ReviewOpened,
        actor_id: None,
        payload: json!({}),
        authority_context: json!({}),
        evidence_refs: Vec::new(),
    };
    let approved = ProposedEvent {
        event_type: EventType::DealApproved,
        actor_id: None,
        payload: json!({}),
        authority_context: json!({}),
        evidence_refs: Vec::new(),
    };
    store.draft_simulate(deal_id, &review).unwrap();
    let status = store.draft_simulate(deal_id, &approved).unwrap();
    assert_eq!(status.simulated_events_count, 2);
    assert_eq!(status.committed.state, LifecycleState::Draft);
    assert_eq!(status.draft.state, LifecycleState::Approved);

    let diff = store.draft_diff(deal_id).unwrap();
    assert_eq!(diff.committed.state, LifecycleState::Draft);
    assert_eq!(diff.draft.state, LifecycleState::Approved);
    assert_eq!(diff.delta_events.len(), 2);

    let gates = store.draft_gates(deal_id).unwrap();
    assert_eq!(gates.gates.len(), 4);
    assert_eq!(gates.projection.state, LifecycleState::Approved);

    let (committed_deal, committed_events) = store.draft_commit(deal_id).unwrap();
    assert_eq!(committed_deal.state, LifecycleState::Approved);
    assert!(!committed_deal.is_draft);
    assert_eq!(committed_events.len(), 2);
    assert!(store.verify(deal_id).unwrap().valid);
    assert!(matches!(store.draft_diff(deal_id), Err(DealStoreError::NotFound(_))));
}

/// Tests revert deletes all simulated state.
#[test]
fn test_draft_revert_clears_sandbox() {
    let (_dir, store) = open_store();
    let (deal, _genesis) = store.create_deal("Sandbox Deal").unwrap();
    let deal_id = deal.deal_id;
    store
        .draft_simulate(deal_id, &ProposedEvent {
            event_type: EventType::ReviewOpened,
            actor_id: None,
            payload: json!({}),
            authority_context: json!({}),
            evidence_refs: Vec::new(),
        })
        .unwrap();

    let reverted = store.draft_revert(deal_id).unwrap();
    assert!(!reverted.is_draft);
    assert_eq!(store.events(deal_id).unwrap().len(), 1);
    assert!(matches!(store.draft_gates(deal_id), Err(DealStoreError::NotFound(_))));
}

// ============================================================================
// SECTION: Artifacts
// ============================================================================

/// Builds an artifact row for registration tests.
fn artifact_row(deal_id: DealId, sha256_hex: &str) -> ArtifactRecord {
    let artifact_id = ArtifactId::generate();
    ArtifactRecord {
        artifact_id,
        deal_id,
        filename: "wire.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        size_bytes: 4,
        sha256_hex: sha256_hex.to_string(),
        storage_key: format!("artifacts/{deal_id}/{artifact_id}/wire.pdf"),
        uploader_id: None,
        created_at: Timestamp::now(),
    }
}

/// Tests artifact hash ownership: idempotent per deal, conflict across
/// deals.
#[test]
fn test_artifact_hash_ownership() {
    let (_dir, store) = open_store();
    let (deal_a, _) = store.create_deal("Deal A").unwrap();
    let (deal_b, _) = store.create_deal("Deal B").unwrap();
    let sha = "aa".repeat(32);

    let first = artifact_row(deal_a.deal_id, &sha);
    assert!(matches!(
        store.register_artifact(&first).unwrap(),
        ArtifactRegistration::Created(_)
    ));

    let duplicate = artifact_row(deal_a.deal_id, &sha);
    let ArtifactRegistration::Existing(existing) =
        store.register_artifact(&duplicate).unwrap()
    else {
        panic!("expected idempotent registration");
    };
    assert_eq!(existing.artifact_id, first.artifact_id);

    let foreign = artifact_row(deal_b.deal_id, &sha);
    assert!(matches!(store.register_artifact(&foreign), Err(DealStoreError::Conflict(_))));
}

/// Tests links validate same-deal ownership and feed the evidence index.
#[test]
fn test_links_and_evidence_index() {
    let (_dir, store) = open_store();
    let parties = closing_parties(&store);
    let (other, _) = store.create_deal("Other Deal").unwrap();
    let review =
        must_commit(&store, parties.deal_id, &proposed(EventType::ReviewOpened, parties.gp, json!({})));

    let record = artifact_row(parties.deal_id, &"bb".repeat(32));
    store.register_artifact(&record).unwrap();

    store
        .link_artifact(record.artifact_id, Some(review.event_id), None, Some("site-visit".to_string()))
        .unwrap();

    let (foreign_deal, foreign_genesis) = (other.deal_id, store.events(other.deal_id).unwrap());
    let mismatch = store.link_artifact(
        record.artifact_id,
        Some(foreign_genesis[0].event_id),
        None,
        None,
    );
    assert!(matches!(mismatch, Err(DealStoreError::Invalid(_))));
    assert_ne!(foreign_deal, parties.deal_id);

    let index = store.evidence_index(parties.deal_id, Timestamp::now()).unwrap();
    assert_eq!(index.artifacts.len(), 1);
    assert_eq!(index.artifacts[0].references.len(), 1);
}
