// crates/deal-kernel-http/src/artifacts.rs
// ============================================================================
// Module: Content-Addressed Artifact Store
// Description: Immutable file storage keyed by SHA-256.
// Purpose: Spool uploads with streaming hashing and serve downloads.
// Dependencies: deal-kernel-core, sha2, tempfile
// ============================================================================

//! ## Overview
//! Artifact bytes live under `$ARTIFACT_ROOT/artifacts/{dealId}/{artifactId}/
//! {filename}`. Uploads are hashed incrementally while spooling to a
//! temporary file, so the full payload is never buffered in memory; the
//! spool is persisted only after the store row is registered, and dropped
//! otherwise, which keeps rollbacks clean.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use deal_kernel_core::ArtifactRecord;
use deal_kernel_core::core::hashing::HashAlgorithm;
use deal_kernel_core::core::hashing::HashDigest;
use deal_kernel_core::core::hashing::sha256_hex;
use sha2::Digest;
use sha2::Sha256;
use tempfile::NamedTempFile;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Subdirectory under the artifact root for committed payloads.
const ARTIFACTS_DIR: &str = "artifacts";
/// Subdirectory under the artifact root for upload spools.
const SPOOL_DIR: &str = "spool";
/// Maximum stored filename length.
const MAX_FILENAME_LENGTH: usize = 255;
/// Fallback filename when sanitization leaves nothing.
const FALLBACK_FILENAME: &str = "upload.bin";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Artifact file-store errors.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    /// Filesystem error.
    #[error("artifact store io error: {0}")]
    Io(String),
    /// Stored payload does not match its recorded digest.
    #[error("artifact store corruption: {0}")]
    Corrupt(String),
}

// ============================================================================
// SECTION: Upload Spool
// ============================================================================

/// In-progress upload: spooled bytes plus an incremental digest.
///
/// # Invariants
/// - Dropping the spool without persisting removes the temporary file.
pub struct UploadSpool {
    /// Temporary spool file.
    file: NamedTempFile,
    /// Incremental SHA-256 state.
    hasher: Sha256,
    /// Bytes written so far.
    size_bytes: u64,
}

impl UploadSpool {
    /// Appends a chunk to the spool.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError::Io`] when the spool write fails.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ArtifactStoreError> {
        self.file
            .as_file_mut()
            .write_all(chunk)
            .map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        self.hasher.update(chunk);
        self.size_bytes =
            self.size_bytes.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        Ok(())
    }

    /// Finalizes the digest, returning the spool, hex digest, and size.
    #[must_use]
    pub fn finish(self) -> (NamedTempFile, String, u64) {
        let digest = self.hasher.finalize();
        let hex = HashDigest::new(HashAlgorithm::Sha256, &digest).value;
        (self.file, hex, self.size_bytes)
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Content-addressed artifact file store.
pub struct ArtifactStore {
    /// Artifact root directory.
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens the store, creating root directories when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError::Io`] when directories cannot be
    /// created.
    pub fn open(root: &Path) -> Result<Self, ArtifactStoreError> {
        std::fs::create_dir_all(root.join(ARTIFACTS_DIR))
            .map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        std::fs::create_dir_all(root.join(SPOOL_DIR))
            .map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Starts a new upload spool.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError::Io`] when the spool file cannot be
    /// created.
    pub fn begin_upload(&self) -> Result<UploadSpool, ArtifactStoreError> {
        let file = NamedTempFile::new_in(self.root.join(SPOOL_DIR))
            .map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        Ok(UploadSpool {
            file,
            hasher: Sha256::new(),
            size_bytes: 0,
        })
    }

    /// Returns the storage key for an artifact row.
    #[must_use]
    pub fn storage_key(record_deal: &str, record_artifact: &str, filename: &str) -> String {
        format!("{ARTIFACTS_DIR}/{record_deal}/{record_artifact}/{filename}")
    }

    /// Persists a finished spool at the record's storage key.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError::Io`] when the move fails.
    pub fn persist(
        &self,
        record: &ArtifactRecord,
        spool: NamedTempFile,
    ) -> Result<(), ArtifactStoreError> {
        let target = self.root.join(&record.storage_key);
        let Some(parent) = target.parent() else {
            return Err(ArtifactStoreError::Io("storage key missing parent".to_string()));
        };
        std::fs::create_dir_all(parent).map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        spool.persist(&target).map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        Ok(())
    }

    /// Resolves the on-disk path for a committed artifact.
    #[must_use]
    pub fn payload_path(&self, record: &ArtifactRecord) -> PathBuf {
        self.root.join(&record.storage_key)
    }

    /// Reads and re-verifies a committed artifact payload.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError`] when the payload is missing or its
    /// digest no longer matches the record.
    pub fn read_verified(&self, record: &ArtifactRecord) -> Result<Vec<u8>, ArtifactStoreError> {
        let bytes = std::fs::read(self.payload_path(record))
            .map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        let digest = sha256_hex(&bytes);
        if digest != record.sha256_hex {
            return Err(ArtifactStoreError::Corrupt(format!(
                "artifact {} digest mismatch",
                record.artifact_id
            )));
        }
        Ok(bytes)
    }
}

// ============================================================================
// SECTION: Filename Sanitization
// ============================================================================

/// Sanitizes an uploaded filename into a single safe path component.
#[must_use]
pub fn safe_filename(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|ch| ch == '.' || ch == '_');
    let mut name =
        if trimmed.is_empty() { FALLBACK_FILENAME.to_string() } else { trimmed.to_string() };
    name.truncate(MAX_FILENAME_LENGTH);
    name
}
