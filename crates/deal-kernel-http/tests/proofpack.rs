// crates/deal-kernel-http/tests/proofpack.rs
// ============================================================================
// Module: ProofPack Exporter Tests
// Description: Tests for deterministic bundle assembly.
// ============================================================================
//! ## Overview
//! Exercises the exporter against a real store: fixed entry set, manifest
//! digests that are reproducible across exports, and default actions.

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

use std::io::Read;

use deal_kernel_core::ActorType;
use deal_kernel_core::EventType;
use deal_kernel_core::GateAction;
use deal_kernel_core::ProposedEvent;
use deal_kernel_core::RoleName;
use deal_kernel_core::Timestamp;
use deal_kernel_core::TruthClass;
use deal_kernel_http::export;
use deal_kernel_store_sqlite::AppendOutcome;
use deal_kernel_store_sqlite::DealStore;
use deal_kernel_store_sqlite::DealStoreConfig;
use deal_kernel_store_sqlite::SqliteStoreMode;
use deal_kernel_store_sqlite::SqliteSyncMode;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Opens a store and seeds a partially advanced deal.
fn seeded_store() -> (TempDir, DealStore, deal_kernel_core::DealId) {
    let dir = TempDir::new().unwrap();
    let store = DealStore::open(&DealStoreConfig {
        path: dir.path().join("kernel.db"),
        busy_timeout_ms: 5_000,
        journal_mode: SqliteStoreMode::Wal,
        sync_mode: SqliteSyncMode::Full,
    })
    .unwrap();
    let (deal, _genesis) = store.create_deal("Harbor Point").unwrap();
    let gp = store
        .create_actor(deal.deal_id, "gp", ActorType::Human, RoleName::Gp)
        .unwrap()
        .actor
        .actor_id;
    let outcome = store
        .append_event(deal.deal_id, &ProposedEvent {
            event_type: EventType::ReviewOpened,
            actor_id: Some(gp),
            payload: json!({}),
            authority_context: json!({}),
            evidence_refs: Vec::new(),
        })
        .unwrap();
    assert!(matches!(outcome, AppendOutcome::Committed { .. }));
    store
        .create_material(deal.deal_id, "UnderwritingSummary", TruthClass::Human, json!({}))
        .unwrap();
    (dir, store, deal.deal_id)
}

/// Lists entry names in a ZIP archive.
fn entry_names(zip_bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
    (0..archive.len())
        .map(|index| archive.by_index(index).unwrap().name().to_string())
        .collect()
}

// ============================================================================
// SECTION: Bundle Layout
// ============================================================================

/// Tests the bundle carries the fixed entry set in order.
#[test]
fn test_bundle_entries() {
    let (_dir, store, deal_id) = seeded_store();
    let at = Timestamp::now();
    let bundle = export(
        &store,
        deal_id,
        at,
        &[GateAction::FinalizeClosing, GateAction::ApproveDeal],
    )
    .unwrap();

    let names = entry_names(&bundle.zip_bytes);
    assert_eq!(names, vec![
        "snapshot.json".to_string(),
        "explains/FINALIZE_CLOSING.json".to_string(),
        "explains/APPROVE_DEAL.json".to_string(),
        "evidence-index.json".to_string(),
        "compliance-snapshot.pdf".to_string(),
        "manifest.json".to_string(),
    ]);
    assert_eq!(bundle.manifest.files.len(), 5);
    assert!(bundle.manifest.deterministic_claim);
}

/// Tests an empty action list defaults to closing finalization.
#[test]
fn test_default_action() {
    let (_dir, store, deal_id) = seeded_store();
    let bundle = export(&store, deal_id, Timestamp::now(), &[]).unwrap();
    let names = entry_names(&bundle.zip_bytes);
    assert!(names.contains(&"explains/FINALIZE_CLOSING.json".to_string()));
}

// ============================================================================
// SECTION: Determinism
// ============================================================================

/// Tests two exports at the same instant produce identical file digests.
#[test]
fn test_manifest_digests_are_reproducible() {
    let (_dir, store, deal_id) = seeded_store();
    let at = Timestamp::now();

    let first = export(&store, deal_id, at, &[GateAction::FinalizeClosing]).unwrap();
    let second = export(&store, deal_id, at, &[GateAction::FinalizeClosing]).unwrap();
    assert_eq!(first.manifest.files, second.manifest.files);
}

/// Tests exports stay reproducible after unrelated later writes.
#[test]
fn test_manifest_digests_survive_later_writes() {
    let (_dir, store, deal_id) = seeded_store();
    std::thread::sleep(std::time::Duration::from_millis(10));
    let at = Timestamp::now();
    std::thread::sleep(std::time::Duration::from_millis(10));

    let before = export(&store, deal_id, at, &[GateAction::ApproveDeal]).unwrap();
    store
        .create_material(deal_id, "SourcesAndUses", TruthClass::Doc, json!({}))
        .unwrap();
    let after = export(&store, deal_id, at, &[GateAction::ApproveDeal]).unwrap();
    assert_eq!(before.manifest.files, after.manifest.files);
}

/// Tests the archived snapshot parses back into canonical JSON.
#[test]
fn test_snapshot_entry_parses() {
    let (_dir, store, deal_id) = seeded_store();
    let bundle = export(&store, deal_id, Timestamp::now(), &[]).unwrap();
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bundle.zip_bytes.as_slice())).unwrap();
    let mut entry = archive.by_name("snapshot.json").unwrap();
    let mut raw = String::new();
    entry.read_to_string(&mut raw).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["dealId"], json!(deal_id.to_string()));
    assert_eq!(parsed["integrity"]["deterministic"], json!(true));
}
