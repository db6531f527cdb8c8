// crates/deal-kernel-core/src/core/event.rs
// ============================================================================
// Module: Deal Kernel Event Model
// Description: Ledger event types, records, and hash-chain payloads.
// Purpose: Define the immutable, hash-chained event vocabulary of a deal.
// Dependencies: crate::core::{authority, hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Every state change on a deal is an immutable event. Events carry a dense
//! 1-based sequence number per deal and chain to their predecessor through
//! `previous_event_hash`. The event hash covers a canonical JSON payload with
//! the exact key set `{dealId, sequenceNumber, type, payload, previousHash,
//! timestamp}`, canonicalized per RFC 8785.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::authority::GateAction;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::DealId;
use crate::core::identifiers::EventId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Event types accepted by the kernel ledger.
///
/// # Invariants
/// - Variants serialize with their exact wire spelling (no case mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Deal genesis event written on creation (never gated).
    DealCreated,
    /// Review opened on a draft deal.
    ReviewOpened,
    /// Deal approved.
    DealApproved,
    /// Closing readiness attested.
    ClosingReadinessAttested,
    /// Closing finalized.
    ClosingFinalized,
    /// Operations activated.
    OperationsActivated,
    /// Material change detected during operations.
    MaterialChangeDetected,
    /// Material change reconciled.
    ChangeReconciled,
    /// Distress declared.
    DistressDeclared,
    /// Distress resolved.
    DistressResolved,
    /// Freeze imposed.
    FreezeImposed,
    /// Freeze lifted.
    FreezeLifted,
    /// Exit finalized.
    ExitFinalized,
    /// Deal terminated (absorbing).
    DealTerminated,
    /// Recorded data disputed.
    DataDisputed,
    /// Approval granted toward an action's threshold.
    ApprovalGranted,
    /// Approval denied (cancels the actor's earlier grant).
    ApprovalDenied,
    /// Override attested for a named action's gate.
    OverrideAttested,
}

/// All event types accepted on the intake surface.
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::DealCreated,
    EventType::ReviewOpened,
    EventType::DealApproved,
    EventType::ClosingReadinessAttested,
    EventType::ClosingFinalized,
    EventType::OperationsActivated,
    EventType::MaterialChangeDetected,
    EventType::ChangeReconciled,
    EventType::DistressDeclared,
    EventType::DistressResolved,
    EventType::FreezeImposed,
    EventType::FreezeLifted,
    EventType::ExitFinalized,
    EventType::DealTerminated,
    EventType::DataDisputed,
    EventType::ApprovalGranted,
    EventType::ApprovalDenied,
    EventType::OverrideAttested,
];

impl EventType {
    /// Returns the canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DealCreated => "DealCreated",
            Self::ReviewOpened => "ReviewOpened",
            Self::DealApproved => "DealApproved",
            Self::ClosingReadinessAttested => "ClosingReadinessAttested",
            Self::ClosingFinalized => "ClosingFinalized",
            Self::OperationsActivated => "OperationsActivated",
            Self::MaterialChangeDetected => "MaterialChangeDetected",
            Self::ChangeReconciled => "ChangeReconciled",
            Self::DistressDeclared => "DistressDeclared",
            Self::DistressResolved => "DistressResolved",
            Self::FreezeImposed => "FreezeImposed",
            Self::FreezeLifted => "FreezeLifted",
            Self::ExitFinalized => "ExitFinalized",
            Self::DealTerminated => "DealTerminated",
            Self::DataDisputed => "DataDisputed",
            Self::ApprovalGranted => "ApprovalGranted",
            Self::ApprovalDenied => "ApprovalDenied",
            Self::OverrideAttested => "OverrideAttested",
        }
    }

    /// Returns the fixed action for event types with a one-to-one mapping.
    ///
    /// Approval and override events resolve their action from the payload and
    /// return `None` here.
    #[must_use]
    pub const fn fixed_action(self) -> Option<GateAction> {
        match self {
            Self::DealCreated => Some(GateAction::CreateDeal),
            Self::ReviewOpened => Some(GateAction::OpenReview),
            Self::DealApproved => Some(GateAction::ApproveDeal),
            Self::ClosingReadinessAttested => Some(GateAction::AttestReadyToClose),
            Self::ClosingFinalized => Some(GateAction::FinalizeClosing),
            Self::OperationsActivated => Some(GateAction::ActivateOperations),
            Self::MaterialChangeDetected => Some(GateAction::DetectMaterialChange),
            Self::ChangeReconciled => Some(GateAction::ReconcileChange),
            Self::DistressDeclared => Some(GateAction::DeclareDistress),
            Self::DistressResolved => Some(GateAction::ResolveDistress),
            Self::FreezeImposed => Some(GateAction::ImposeFreeze),
            Self::FreezeLifted => Some(GateAction::LiftFreeze),
            Self::ExitFinalized => Some(GateAction::FinalizeExit),
            Self::DealTerminated => Some(GateAction::TerminateDeal),
            Self::DataDisputed => Some(GateAction::DisputeData),
            Self::ApprovalGranted | Self::ApprovalDenied => None,
            Self::OverrideAttested => Some(GateAction::Override),
        }
    }

    /// Indicates whether this is one of the five gate event types whose
    /// commits run the approval-threshold and material checks.
    #[must_use]
    pub const fn is_gate_event(self) -> bool {
        matches!(
            self,
            Self::DealApproved
                | Self::ClosingReadinessAttested
                | Self::ClosingFinalized
                | Self::OperationsActivated
                | Self::DistressResolved
        )
    }

    /// Returns the event type that carries an action on the ledger.
    ///
    /// Approval votes are excluded: they reference a target action but do
    /// not carry it.
    #[must_use]
    pub fn for_action(action: GateAction) -> Option<Self> {
        ALL_EVENT_TYPES
            .iter()
            .copied()
            .find(|event_type| event_type.fixed_action() == Some(action))
    }

    /// Returns the gate event type corresponding to an action, when the
    /// action has one (used for override consumption).
    #[must_use]
    pub const fn gate_event_for(action: GateAction) -> Option<Self> {
        match action {
            GateAction::ApproveDeal => Some(Self::DealApproved),
            GateAction::AttestReadyToClose => Some(Self::ClosingReadinessAttested),
            GateAction::FinalizeClosing => Some(Self::ClosingFinalized),
            GateAction::ActivateOperations => Some(Self::OperationsActivated),
            GateAction::ResolveDistress => Some(Self::DistressResolved),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventIntakeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ALL_EVENT_TYPES
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == value)
            .ok_or_else(|| EventIntakeError::UnknownEventType(value.to_string()))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while validating inbound events.
#[derive(Debug, Error)]
pub enum EventIntakeError {
    /// Event type outside the accepted vocabulary.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
    /// Approval or override payload is missing `action`.
    #[error("payload.action is required for {0} events")]
    MissingAction(&'static str),
    /// Payload `action` is not a governed action name.
    #[error("payload.action is not a governed action: {0}")]
    InvalidAction(String),
    /// Override payload is missing a non-empty `reason`.
    #[error("payload.reason must be a non-empty string for overrides")]
    MissingReason,
    /// Payload is not a JSON object.
    #[error("payload must be a json object")]
    PayloadNotObject,
}

// ============================================================================
// SECTION: Proposed and Committed Events
// ============================================================================

/// Validated inbound event before gate evaluation and chain append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Acting principal, if any.
    pub actor_id: Option<ActorId>,
    /// Opaque event payload (JSON object).
    pub payload: Value,
    /// Caller-supplied authority context, decorated on override use.
    pub authority_context: Value,
    /// Evidence references (artifact ids or external URIs).
    pub evidence_refs: Vec<String>,
}

/// Committed ledger event.
///
/// # Invariants
/// - `sequence_number` is dense and 1-based per deal.
/// - `previous_event_hash` is `None` exactly for sequence 1; otherwise it
///   equals the predecessor's `event_hash`.
/// - Rows are append-only; no update or delete after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Event identifier.
    pub event_id: EventId,
    /// Deal the event belongs to.
    pub deal_id: DealId,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Acting principal, if any.
    pub actor_id: Option<ActorId>,
    /// Opaque event payload.
    pub payload: Value,
    /// Authority context captured at commit time.
    pub authority_context: Value,
    /// Evidence references.
    pub evidence_refs: Vec<String>,
    /// Dense 1-based sequence number within the deal.
    pub sequence_number: u64,
    /// Predecessor hash, absent for sequence 1.
    pub previous_event_hash: Option<String>,
    /// Hash of this event's canonical chain payload.
    pub event_hash: String,
    /// Server-assigned commit time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Action Resolution
// ============================================================================

/// Resolves the governed action for a proposed event.
///
/// Approval events take the action from `payload.action`; overrides resolve
/// to [`GateAction::Override`] and additionally require a target
/// `payload.action` plus a non-empty `payload.reason`.
///
/// # Errors
///
/// Returns [`EventIntakeError`] when the payload does not carry the fields
/// the event type requires.
pub fn resolve_action(event_type: EventType, payload: &Value) -> Result<GateAction, EventIntakeError> {
    if !payload.is_object() {
        return Err(EventIntakeError::PayloadNotObject);
    }
    match event_type {
        EventType::ApprovalGranted | EventType::ApprovalDenied => {
            payload_action(payload, event_type.as_str())
        }
        EventType::OverrideAttested => {
            payload_action(payload, event_type.as_str())?;
            let reason = payload.get("reason").and_then(Value::as_str).unwrap_or_default();
            if reason.trim().is_empty() {
                return Err(EventIntakeError::MissingReason);
            }
            Ok(GateAction::Override)
        }
        other => other.fixed_action().ok_or(EventIntakeError::MissingAction(other.as_str())),
    }
}

/// Returns the override's target action, when the event is an override.
///
/// # Errors
///
/// Returns [`EventIntakeError`] when the target action is missing or unknown.
pub fn override_target(payload: &Value) -> Result<GateAction, EventIntakeError> {
    payload_action(payload, "OverrideAttested")
}

/// Reads and parses `payload.action`.
fn payload_action(payload: &Value, event_label: &'static str) -> Result<GateAction, EventIntakeError> {
    let raw = payload
        .get("action")
        .and_then(Value::as_str)
        .ok_or(EventIntakeError::MissingAction(event_label))?;
    raw.parse::<GateAction>().map_err(|_| EventIntakeError::InvalidAction(raw.to_string()))
}

// ============================================================================
// SECTION: Chain Payload
// ============================================================================

/// Canonical hash-chain payload for one event.
///
/// # Invariants
/// - Field names and order follow the ledger contract exactly; RFC 8785
///   canonicalization makes the byte stream key-sorted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainPayload<'a> {
    /// Deal identifier.
    pub deal_id: DealId,
    /// Dense 1-based sequence number.
    pub sequence_number: u64,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Opaque event payload.
    pub payload: &'a Value,
    /// Predecessor hash, `null` for sequence 1.
    pub previous_hash: Option<&'a str>,
    /// Server-assigned commit time.
    pub timestamp: Timestamp,
}

/// Computes the event hash for a chain payload.
///
/// # Errors
///
/// Returns [`HashError`] when the payload cannot be canonicalized (for
/// example a non-finite float smuggled into the payload).
pub fn compute_event_hash(chain_payload: &ChainPayload<'_>) -> Result<HashDigest, HashError> {
    hash_canonical_json(DEFAULT_HASH_ALGORITHM, chain_payload)
}

// ============================================================================
// SECTION: Authority Context Decoration
// ============================================================================

/// Decorates an authority context with override-consumption markers.
///
/// Non-object contexts are replaced by a fresh object so the markers are
/// never silently dropped.
#[must_use]
pub fn decorate_override(context: Value, action: GateAction) -> Value {
    let mut map = match context {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    map.insert("overrideUsed".to_string(), Value::Bool(true));
    map.insert("overrideAction".to_string(), Value::String(action.as_str().to_string()));
    Value::Object(map)
}
