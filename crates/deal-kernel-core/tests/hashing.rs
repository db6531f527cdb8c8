// crates/deal-kernel-core/tests/hashing.rs
// ============================================================================
// Module: Hashing Tests
// Description: Tests for canonical JSON hashing and event-hash computation.
// ============================================================================
//! ## Overview
//! Validates deterministic hashing using RFC 8785 canonicalization and the
//! stability of the event chain payload digest.

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

use deal_kernel_core::ChainPayload;
use deal_kernel_core::DealId;
use deal_kernel_core::EventType;
use deal_kernel_core::Timestamp;
use deal_kernel_core::compute_event_hash;
use deal_kernel_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use deal_kernel_core::core::hashing::hash_canonical_json;
use deal_kernel_core::core::hashing::sha256_hex;
use serde_json::json;

// ============================================================================
// SECTION: Canonical Hashing
// ============================================================================

/// Tests canonical json hash is stable under key reordering.
#[test]
fn test_canonical_json_hash_is_stable() {
    let value_a = json!({"b": 1, "a": 2});
    let value_b = json!({"a": 2, "b": 1});

    let hash_a = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &value_a).unwrap();
    let hash_b = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &value_b).unwrap();

    assert_eq!(hash_a, hash_b);
}

/// Tests the raw-byte helper agrees with the well-known empty-input digest.
#[test]
fn test_sha256_hex_empty_input() {
    assert_eq!(
        sha256_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

// ============================================================================
// SECTION: Event Hash
// ============================================================================

/// Tests the event hash is a pure function of the chain payload.
#[test]
fn test_event_hash_recomputes_identically() {
    let deal_id = DealId::generate();
    let payload = json!({"action": "APPROVE_DEAL"});
    let timestamp = Timestamp::parse("2026-03-01T12:00:00.000Z").unwrap();

    let chain_payload = ChainPayload {
        deal_id,
        sequence_number: 2,
        event_type: EventType::ApprovalGranted,
        payload: &payload,
        previous_hash: Some("ab"),
        timestamp,
    };
    let first = compute_event_hash(&chain_payload).unwrap();

    let again = ChainPayload {
        deal_id,
        sequence_number: 2,
        event_type: EventType::ApprovalGranted,
        payload: &payload,
        previous_hash: Some("ab"),
        timestamp,
    };
    let second = compute_event_hash(&again).unwrap();

    assert_eq!(first, second);
}

/// Tests the event hash changes when any chained field changes.
#[test]
fn test_event_hash_binds_all_fields() {
    let deal_id = DealId::generate();
    let payload = json!({});
    let timestamp = Timestamp::parse("2026-03-01T12:00:00.000Z").unwrap();
    let base = ChainPayload {
        deal_id,
        sequence_number: 1,
        event_type: EventType::ReviewOpened,
        payload: &payload,
        previous_hash: None,
        timestamp,
    };
    let base_hash = compute_event_hash(&base).unwrap();

    let other_seq = ChainPayload {
        sequence_number: 2,
        ..base
    };
    assert_ne!(compute_event_hash(&other_seq).unwrap(), base_hash);

    let other_prev = ChainPayload {
        previous_hash: Some("00"),
        ..other_seq
    };
    assert_ne!(compute_event_hash(&other_prev).unwrap(), base_hash);
}
