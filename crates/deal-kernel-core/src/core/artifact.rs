// crates/deal-kernel-core/src/core/artifact.rs
// ============================================================================
// Module: Deal Kernel Artifact Records
// Description: Content-addressed artifact rows and evidence links.
// Purpose: Define the metadata for immutable, hash-identified files.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Artifacts are immutable byte payloads identified by their SHA-256. The
//! hash is unique across the whole store: re-uploading identical bytes to
//! the same deal is idempotent, while the same bytes under a different deal
//! is a conflict. Links relate an artifact to the event or material it
//! evidences, or carry a bare tag.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ActorId;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::DealId;
use crate::core::identifiers::EventId;
use crate::core::identifiers::LinkId;
use crate::core::identifiers::MaterialId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Artifact
// ============================================================================

/// Content-addressed artifact row.
///
/// # Invariants
/// - `sha256_hex` is unique across the store.
/// - Bytes are immutable once committed; the hash is their identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Artifact identifier.
    pub artifact_id: ArtifactId,
    /// Owning deal.
    pub deal_id: DealId,
    /// Original filename (sanitized for storage).
    pub filename: String,
    /// MIME type reported at upload.
    pub mime_type: String,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the payload.
    pub sha256_hex: String,
    /// Storage key relative to the artifact root.
    pub storage_key: String,
    /// Uploading principal, when provided.
    pub uploader_id: Option<ActorId>,
    /// Upload time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Artifact Links
// ============================================================================

/// Join row between an artifact and the record it evidences.
///
/// # Invariants
/// - The referenced event or material belongs to the same deal as the
///   artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactLinkRecord {
    /// Link identifier.
    pub link_id: LinkId,
    /// Owning deal.
    pub deal_id: DealId,
    /// Linked artifact.
    pub artifact_id: ArtifactId,
    /// Evidenced event, if any.
    pub event_id: Option<EventId>,
    /// Evidenced material, if any.
    pub material_id: Option<MaterialId>,
    /// Free-form association tag, if any.
    pub tag: Option<String>,
    /// Link time.
    pub created_at: Timestamp,
}
