// crates/deal-kernel-core/src/core/mod.rs
// ============================================================================
// Module: Deal Kernel Core Types
// Description: Data model shared by the store, evaluator, and HTTP surface.
// Purpose: Group identifier, event, authority, and evidence definitions.
// Dependencies: crate::core submodules
// ============================================================================

//! ## Overview
//! Core types carry no I/O. Everything here is serializable, deterministic,
//! and safe to replay.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod artifact;
pub mod authority;
pub mod deal;
pub mod draft;
pub mod event;
pub mod explain;
pub mod hashing;
pub mod identifiers;
pub mod material;
pub mod proofpack;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifact::ArtifactLinkRecord;
pub use artifact::ArtifactRecord;
pub use authority::ALL_ACTIONS;
pub use authority::AuthorityParseError;
pub use authority::AuthorityRule;
pub use authority::GateAction;
pub use authority::RoleName;
pub use authority::THRESHOLD_ACTIONS;
pub use authority::default_rules;
pub use deal::ActorRecord;
pub use deal::ActorRoleRecord;
pub use deal::ActorType;
pub use deal::ActorWithRoles;
pub use deal::DealRecord;
pub use deal::RoleRecord;
pub use draft::CommittedSummary;
pub use draft::DraftDiff;
pub use draft::DraftStateRecord;
pub use draft::DraftStatus;
pub use draft::DraftSummary;
pub use draft::GatePreview;
pub use draft::GatePreviewSet;
pub use draft::SimulatedEventRecord;
pub use event::ALL_EVENT_TYPES;
pub use event::ChainPayload;
pub use event::EventIntakeError;
pub use event::EventRecord;
pub use event::EventType;
pub use event::ProposedEvent;
pub use event::compute_event_hash;
pub use event::decorate_override;
pub use event::override_target;
pub use event::resolve_action;
pub use explain::BlockReason;
pub use explain::ExplainBlock;
pub use explain::ExplainStatus;
pub use explain::NextStep;
pub use explain::ProjectionSummary;
pub use explain::ReplayInputs;
pub use explain::ReplayReport;
pub use identifiers::ActorId;
pub use identifiers::ArtifactId;
pub use identifiers::DealId;
pub use identifiers::DraftId;
pub use identifiers::EventId;
pub use identifiers::GatePreviewId;
pub use identifiers::LinkId;
pub use identifiers::MaterialId;
pub use identifiers::RevisionId;
pub use identifiers::RoleId;
pub use identifiers::SimulatedEventId;
pub use material::MATERIAL_GATED_ACTIONS;
pub use material::MaterialRecord;
pub use material::MaterialRequirement;
pub use material::MaterialRevisionRecord;
pub use material::TruthClass;
pub use material::requirements_for;
pub use proofpack::EvidenceEntry;
pub use proofpack::EvidenceIndex;
pub use proofpack::EvidenceReference;
pub use proofpack::FileDigest;
pub use proofpack::ProofPackManifest;
pub use time::Timestamp;
pub use time::TimestampError;
