// crates/deal-kernel-core/src/core/proofpack.rs
// ============================================================================
// Module: Deal Kernel ProofPack Types
// Description: Manifest and evidence-index types for replay bundles.
// Purpose: Describe the deterministic ZIP bundle a deal exports for audit.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A ProofPack bundles a point-in-time snapshot, Explain replays for the
//! requested actions, an evidence index, a deterministic cover PDF, and a
//! manifest of per-entry SHA-256 digests. Identical replay inputs must yield
//! identical per-file digests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::DealId;
use crate::core::identifiers::EventId;
use crate::core::identifiers::LinkId;
use crate::core::identifiers::MaterialId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Per-entry digest row in the ProofPack manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDigest {
    /// Bundle-relative entry path.
    pub path: String,
    /// Lowercase hex SHA-256 of the entry bytes.
    pub sha256_hex: String,
}

/// ProofPack manifest.
///
/// # Invariants
/// - `files` lists every other bundle entry in fixed order.
/// - Entry digests are a pure function of the replay inputs; only
///   `generated_at` may vary between exports of the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofPackManifest {
    /// Export wall-clock time.
    pub generated_at: Timestamp,
    /// Deal the bundle describes.
    pub deal_id: DealId,
    /// Replay instant the bundle was assembled for.
    pub at: Timestamp,
    /// Asserts the bundle is reproducible from the named inputs.
    pub deterministic_claim: bool,
    /// Input streams the bundle replays from.
    pub replay_inputs: Vec<String>,
    /// Per-entry digests.
    pub files: Vec<FileDigest>,
}

// ============================================================================
// SECTION: Evidence Index
// ============================================================================

/// One reference tying an artifact to the record it evidences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EvidenceReference {
    /// Explicit artifact link row.
    Link {
        /// Link identifier.
        link_id: LinkId,
        /// Evidenced event, if any.
        event_id: Option<EventId>,
        /// Evidenced material, if any.
        material_id: Option<MaterialId>,
        /// Association tag, if any.
        tag: Option<String>,
    },
    /// Event whose `evidenceRefs` names the artifact.
    Event {
        /// Referencing event.
        event_id: EventId,
    },
    /// Material whose data `evidenceRefs` names the artifact.
    Material {
        /// Referencing material.
        material_id: MaterialId,
    },
}

/// Evidence-index entry for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceEntry {
    /// Artifact identifier.
    pub artifact_id: ArtifactId,
    /// Artifact filename.
    pub filename: String,
    /// Artifact payload digest.
    pub sha256_hex: String,
    /// Aggregated references, deduplicated and stably ordered.
    pub references: Vec<EvidenceReference>,
}

/// Evidence index over all artifacts visible at the replay instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceIndex {
    /// Deal the index describes.
    pub deal_id: DealId,
    /// Replay instant.
    pub at: Timestamp,
    /// Entries ordered by artifact creation then identifier.
    pub artifacts: Vec<EvidenceEntry>,
}
