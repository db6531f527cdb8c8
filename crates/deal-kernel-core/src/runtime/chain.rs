// crates/deal-kernel-core/src/runtime/chain.rs
// ============================================================================
// Module: Deal Kernel Chain Verification
// Description: Offline integrity walk over a deal's event chain.
// Purpose: Detect sequence gaps, broken links, and recomputation mismatches.
// Dependencies: crate::core::event, serde
// ============================================================================

//! ## Overview
//! Chain verification replays the stored events in sequence order and fails
//! closed: any gap in the dense sequence, any link whose
//! `previous_event_hash` differs from the predecessor's `event_hash`, and
//! any stored hash that does not match a recomputation of the canonical
//! payload is reported as an issue.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::event::ChainPayload;
use crate::core::event::EventRecord;
use crate::core::event::compute_event_hash;

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Issue kinds reported by chain verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainIssueKind {
    /// Sequence numbers are not dense from 1.
    SequenceGap,
    /// `previous_event_hash` does not match the predecessor's hash.
    BrokenLink,
    /// Stored hash differs from recomputation of the canonical payload.
    HashMismatch,
    /// Canonical payload could not be recomputed.
    Unverifiable,
}

/// One verification issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainIssue {
    /// Sequence number the issue was detected at.
    pub sequence_number: u64,
    /// Issue kind.
    pub kind: ChainIssueKind,
    /// Human-readable detail.
    pub detail: String,
}

/// Verification report for a deal's event chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    /// Indicates an unbroken, densely sequenced, recomputable chain.
    pub valid: bool,
    /// Number of events examined.
    pub total_events: u64,
    /// Issues, empty when valid.
    pub issues: Vec<ChainIssue>,
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies the hash chain over events sorted ascending by sequence number.
#[must_use]
pub fn verify_chain(events: &[EventRecord]) -> ChainReport {
    let mut issues = Vec::new();
    let mut previous_hash: Option<&str> = None;
    let mut expected_seq: u64 = 0;

    for event in events {
        expected_seq = expected_seq.saturating_add(1);
        if event.sequence_number != expected_seq {
            issues.push(ChainIssue {
                sequence_number: event.sequence_number,
                kind: ChainIssueKind::SequenceGap,
                detail: format!(
                    "expected sequence {expected_seq}, found {}",
                    event.sequence_number
                ),
            });
        }

        if event.previous_event_hash.as_deref() != previous_hash {
            issues.push(ChainIssue {
                sequence_number: event.sequence_number,
                kind: ChainIssueKind::BrokenLink,
                detail: format!(
                    "previous hash {:?} does not match predecessor hash {:?}",
                    event.previous_event_hash, previous_hash
                ),
            });
        }

        let chain_payload = ChainPayload {
            deal_id: event.deal_id,
            sequence_number: event.sequence_number,
            event_type: event.event_type,
            payload: &event.payload,
            previous_hash: event.previous_event_hash.as_deref(),
            timestamp: event.created_at,
        };
        match compute_event_hash(&chain_payload) {
            Ok(digest) => {
                if digest.value != event.event_hash {
                    issues.push(ChainIssue {
                        sequence_number: event.sequence_number,
                        kind: ChainIssueKind::HashMismatch,
                        detail: format!(
                            "stored hash {} does not match recomputed hash {}",
                            event.event_hash, digest.value
                        ),
                    });
                }
            }
            Err(err) => issues.push(ChainIssue {
                sequence_number: event.sequence_number,
                kind: ChainIssueKind::Unverifiable,
                detail: err.to_string(),
            }),
        }

        previous_hash = Some(event.event_hash.as_str());
    }

    ChainReport {
        valid: issues.is_empty(),
        total_events: u64::try_from(events.len()).unwrap_or(u64::MAX),
        issues,
    }
}
