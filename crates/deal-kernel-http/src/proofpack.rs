// crates/deal-kernel-http/src/proofpack.rs
// ============================================================================
// Module: ProofPack Exporter
// Description: Deterministic ZIP bundle of snapshot, explains, and evidence.
// Purpose: Export an offline-verifiable replay bundle for a deal at `t`.
// Dependencies: deal-kernel-core, deal-kernel-store-sqlite, zip
// ============================================================================

//! ## Overview
//! The exporter assembles `snapshot.json`, one `explains/{ACTION}.json` per
//! requested action, `evidence-index.json`, the deterministic cover PDF, and
//! a manifest of per-entry SHA-256 digests. Entry bytes are canonical JSON
//! (RFC 8785) so identical replay inputs always hash identically; only the
//! manifest's `generatedAt` varies between exports.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Cursor;
use std::io::Write;

use deal_kernel_core::DealId;
use deal_kernel_core::ExplainStatus;
use deal_kernel_core::GateAction;
use deal_kernel_core::ReplayReport;
use deal_kernel_core::RequirementStatus;
use deal_kernel_core::SnapshotReport;
use deal_kernel_core::THRESHOLD_ACTIONS;
use deal_kernel_core::Timestamp;
use deal_kernel_core::core::hashing::canonical_json_bytes;
use deal_kernel_core::core::hashing::sha256_hex;
use deal_kernel_core::core::proofpack::EvidenceIndex;
use deal_kernel_core::core::proofpack::FileDigest;
use deal_kernel_core::core::proofpack::ProofPackManifest;
use deal_kernel_store_sqlite::DealStore;
use deal_kernel_store_sqlite::DealStoreError;
use serde::Serialize;
use thiserror::Error;

use crate::pdf::render_cover_sheet;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bundle path for the snapshot entry.
const SNAPSHOT_PATH: &str = "snapshot.json";
/// Bundle path for the evidence index entry.
const EVIDENCE_INDEX_PATH: &str = "evidence-index.json";
/// Bundle path for the cover sheet entry.
const COVER_PATH: &str = "compliance-snapshot.pdf";
/// Bundle path for the manifest entry.
const MANIFEST_PATH: &str = "manifest.json";
/// Default action when the caller requests none.
pub const DEFAULT_ACTION: GateAction = GateAction::FinalizeClosing;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// ProofPack export errors.
#[derive(Debug, Error)]
pub enum ProofPackError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] DealStoreError),
    /// Canonical serialization failed.
    #[error("proofpack serialization error: {0}")]
    Serialization(String),
    /// ZIP assembly failed.
    #[error("proofpack archive error: {0}")]
    Archive(String),
}

// ============================================================================
// SECTION: Bundle
// ============================================================================

/// Exported ProofPack bundle.
#[derive(Debug, Clone)]
pub struct ProofPackBundle {
    /// ZIP archive bytes.
    pub zip_bytes: Vec<u8>,
    /// Manifest describing the archive entries.
    pub manifest: ProofPackManifest,
}

/// Exports a ProofPack for a deal at an instant.
///
/// An empty `actions` slice defaults to [`DEFAULT_ACTION`].
///
/// # Errors
///
/// Returns [`ProofPackError`] when replay inputs cannot be loaded or the
/// archive cannot be assembled.
pub fn export(
    store: &DealStore,
    deal_id: DealId,
    at: Timestamp,
    actions: &[GateAction],
) -> Result<ProofPackBundle, ProofPackError> {
    let actions: Vec<GateAction> =
        if actions.is_empty() { vec![DEFAULT_ACTION] } else { actions.to_vec() };

    let snapshot = store.snapshot(deal_id, at)?;
    let mut explains = Vec::with_capacity(actions.len());
    for action in &actions {
        explains.push(store.explain(deal_id, at, *action, None)?);
    }
    let evidence = store.evidence_index(deal_id, at)?;
    let cover = render_cover_sheet(&cover_lines(&snapshot, &explains, &evidence));

    let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(actions.len() + 4);
    entries.push((SNAPSHOT_PATH.to_string(), canonical_entry(&snapshot)?));
    for explain in &explains {
        entries
            .push((format!("explains/{}.json", explain.action), canonical_entry(explain)?));
    }
    entries.push((EVIDENCE_INDEX_PATH.to_string(), canonical_entry(&evidence)?));
    entries.push((COVER_PATH.to_string(), cover));

    let files = entries
        .iter()
        .map(|(path, bytes)| FileDigest {
            path: path.clone(),
            sha256_hex: sha256_hex(bytes),
        })
        .collect();
    let manifest = ProofPackManifest {
        generated_at: Timestamp::now(),
        deal_id,
        at,
        deterministic_claim: true,
        replay_inputs: vec![
            "events".to_string(),
            "materialRevisions".to_string(),
            "artifacts".to_string(),
        ],
        files,
    };
    entries.push((MANIFEST_PATH.to_string(), canonical_entry(&manifest)?));

    let zip_bytes = write_archive(&entries)?;
    Ok(ProofPackBundle {
        zip_bytes,
        manifest,
    })
}

// ============================================================================
// SECTION: Archive Assembly
// ============================================================================

/// Serializes an entry as canonical JSON bytes.
fn canonical_entry<T: Serialize>(value: &T) -> Result<Vec<u8>, ProofPackError> {
    canonical_json_bytes(value).map_err(|err| ProofPackError::Serialization(err.to_string()))
}

/// Writes entries into a ZIP archive with fixed ordering and timestamps.
fn write_archive(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ProofPackError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    for (path, bytes) in entries {
        writer
            .start_file(path.as_str(), options)
            .map_err(|err| ProofPackError::Archive(err.to_string()))?;
        writer.write_all(bytes).map_err(|err| ProofPackError::Archive(err.to_string()))?;
    }
    let cursor = writer.finish().map_err(|err| ProofPackError::Archive(err.to_string()))?;
    Ok(cursor.into_inner())
}

// ============================================================================
// SECTION: Cover Sheet
// ============================================================================

/// Builds the fixed-order cover sheet lines.
fn cover_lines(
    snapshot: &SnapshotReport,
    explains: &[ReplayReport],
    evidence: &EvidenceIndex,
) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("Compliance Snapshot".to_string());
    lines.push(format!("Deal: {}", snapshot.deal_id));
    lines.push(format!("As of: {}", snapshot.at));
    lines.push(format!(
        "State: {}  Stress: {}",
        snapshot.projection.state, snapshot.projection.stress_mode
    ));
    lines.push(String::new());
    lines.push("Approvals".to_string());
    for summary in &snapshot.approvals {
        if !THRESHOLD_ACTIONS.contains(&summary.action) {
            continue;
        }
        let verdict = if summary.satisfied { "PASS" } else { "FAIL" };
        lines.push(format!(
            "  {}: {} ({}/{})",
            summary.action, verdict, summary.current_count, summary.threshold
        ));
    }
    lines.push(String::new());
    lines.push("Material requirements".to_string());
    let mut gated_actions = Vec::new();
    for row in &snapshot.material_requirements {
        if !gated_actions.contains(&row.action) {
            gated_actions.push(row.action);
        }
    }
    for action in gated_actions {
        let missing = snapshot
            .material_requirements
            .iter()
            .filter(|row| row.action == action && row.status != RequirementStatus::Ok)
            .count();
        lines.push(format!("  {action}: {missing} missing"));
    }
    lines.push(String::new());
    lines.push("Gate replays".to_string());
    for explain in explains {
        let verdict = match explain.status {
            ExplainStatus::Allowed => "ALLOWED",
            ExplainStatus::Blocked => "BLOCKED",
        };
        lines.push(format!("  {}: {}", explain.action, verdict));
    }
    lines.push(String::new());
    lines.push("Artifact fingerprints".to_string());
    for entry in &evidence.artifacts {
        lines.push(format!("  {} {}", entry.sha256_hex, entry.filename));
    }
    lines
}
