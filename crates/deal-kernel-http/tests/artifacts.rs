// crates/deal-kernel-http/tests/artifacts.rs
// ============================================================================
// Module: Artifact File Store Tests
// Description: Tests for streaming hashing, persistence, and sanitization.
// ============================================================================
//! ## Overview
//! Validates the upload spool's incremental digest, storage-key layout, and
//! filename sanitization.

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

use deal_kernel_core::ArtifactId;
use deal_kernel_core::ArtifactRecord;
use deal_kernel_core::DealId;
use deal_kernel_core::Timestamp;
use deal_kernel_core::core::hashing::sha256_hex;
use deal_kernel_http::ArtifactStore;
use deal_kernel_http::safe_filename;
use tempfile::TempDir;

// ============================================================================
// SECTION: Upload Spool
// ============================================================================

/// Tests chunked writes hash identically to the whole payload.
#[test]
fn test_spool_digest_matches_whole_payload() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let payload = b"wire confirmation bytes".repeat(100);

    let mut spool = store.begin_upload().unwrap();
    for chunk in payload.chunks(7) {
        spool.write_chunk(chunk).unwrap();
    }
    let (_temp, digest, size) = spool.finish();

    assert_eq!(digest, sha256_hex(&payload));
    assert_eq!(size, payload.len() as u64);
}

/// Tests persisted payloads land at the storage key and verify on read.
#[test]
fn test_persist_and_read_verified() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let payload = b"entity formation documents";

    let mut spool = store.begin_upload().unwrap();
    spool.write_chunk(payload).unwrap();
    let (temp, digest, size) = spool.finish();

    let deal_id = DealId::generate();
    let artifact_id = ArtifactId::generate();
    let record = ArtifactRecord {
        artifact_id,
        deal_id,
        filename: "docs.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        size_bytes: size,
        sha256_hex: digest,
        storage_key: ArtifactStore::storage_key(
            &deal_id.to_string(),
            &artifact_id.to_string(),
            "docs.pdf",
        ),
        uploader_id: None,
        created_at: Timestamp::now(),
    };
    store.persist(&record, temp).unwrap();

    let read_back = store.read_verified(&record).unwrap();
    assert_eq!(read_back, payload);
    assert!(store.payload_path(&record).ends_with(format!(
        "artifacts/{deal_id}/{artifact_id}/docs.pdf"
    )));
}

/// Tests corruption is detected on verified reads.
#[test]
fn test_read_verified_detects_tampering() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let mut spool = store.begin_upload().unwrap();
    spool.write_chunk(b"original").unwrap();
    let (temp, digest, size) = spool.finish();

    let deal_id = DealId::generate();
    let artifact_id = ArtifactId::generate();
    let record = ArtifactRecord {
        artifact_id,
        deal_id,
        filename: "note.txt".to_string(),
        mime_type: "text/plain".to_string(),
        size_bytes: size,
        sha256_hex: digest,
        storage_key: ArtifactStore::storage_key(
            &deal_id.to_string(),
            &artifact_id.to_string(),
            "note.txt",
        ),
        uploader_id: None,
        created_at: Timestamp::now(),
    };
    store.persist(&record, temp).unwrap();
    std::fs::write(store.payload_path(&record), b"tampered").unwrap();

    assert!(store.read_verified(&record).is_err());
}

// ============================================================================
// SECTION: Filename Sanitization
// ============================================================================

/// Tests traversal sequences and separators are neutralized.
#[test]
fn test_safe_filename_neutralizes_paths() {
    assert_eq!(safe_filename("../../etc/passwd"), "etc_passwd");
    assert_eq!(safe_filename("closing statement.pdf"), "closing_statement.pdf");
    assert_eq!(safe_filename("wire\\confirm.pdf"), "wire_confirm.pdf");
}

/// Tests empty and dot-only names fall back to a fixed default.
#[test]
fn test_safe_filename_fallback() {
    assert_eq!(safe_filename(""), "upload.bin");
    assert_eq!(safe_filename("..."), "upload.bin");
}
