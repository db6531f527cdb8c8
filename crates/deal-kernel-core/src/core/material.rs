// crates/deal-kernel-core/src/core/material.rs
// ============================================================================
// Module: Deal Kernel Material Model
// Description: Truth-classed materials and per-action requirement tables.
// Purpose: Define the evidence objects that gate-advancing actions require.
// Dependencies: crate::core::{authority, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A material is a typed, truth-classed piece of evidence attached to a deal.
//! Truth classes form the total order `AI < HUMAN < DOC`; a material
//! satisfies a requirement exactly when its current truth class ranks at or
//! above the required one. Every create or update writes an append-only
//! revision so point-in-time snapshots are exact.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::authority::GateAction;
use crate::core::identifiers::DealId;
use crate::core::identifiers::MaterialId;
use crate::core::identifiers::RevisionId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Truth Classes
// ============================================================================

/// Truth classification for a material's backing.
///
/// # Invariants
/// - The numeric rank encodes the total order `AI < HUMAN < DOC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TruthClass {
    /// Model-generated assertion.
    Ai,
    /// Human-attested assertion.
    Human,
    /// Document-backed assertion.
    Doc,
}

impl TruthClass {
    /// Returns the numeric rank under the `AI < HUMAN < DOC` order.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Ai => 0,
            Self::Human => 1,
            Self::Doc => 2,
        }
    }

    /// Indicates whether this class satisfies the required class.
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        self.rank() >= required.rank()
    }

    /// Returns the canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::Human => "HUMAN",
            Self::Doc => "DOC",
        }
    }
}

impl fmt::Display for TruthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Material Records
// ============================================================================

/// Current value of a material object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRecord {
    /// Material identifier.
    pub material_id: MaterialId,
    /// Deal the material belongs to.
    pub deal_id: DealId,
    /// Material type name (for example `UnderwritingSummary`).
    #[serde(rename = "type")]
    pub material_type: String,
    /// Current truth class.
    pub truth_class: TruthClass,
    /// Evidence references and metadata.
    pub data: Value,
    /// Creation time of the base object.
    pub created_at: Timestamp,
}

/// Append-only material revision.
///
/// # Invariants
/// - A new row is written on every create and update; rows never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRevisionRecord {
    /// Revision identifier.
    pub revision_id: RevisionId,
    /// Material the revision belongs to.
    pub material_id: MaterialId,
    /// Deal the material belongs to.
    pub deal_id: DealId,
    /// Material type name at revision time.
    #[serde(rename = "type")]
    pub material_type: String,
    /// Truth class at revision time.
    pub truth_class: TruthClass,
    /// Evidence references and metadata at revision time.
    pub data: Value,
    /// Revision time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Requirement Tables
// ============================================================================

/// One material requirement of a gated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRequirement {
    /// Required material type name.
    pub material_type: &'static str,
    /// Minimum truth class.
    pub required_truth: TruthClass,
}

/// Requirements for `APPROVE_DEAL`.
const APPROVE_DEAL_REQUIREMENTS: &[MaterialRequirement] = &[MaterialRequirement {
    material_type: "UnderwritingSummary",
    required_truth: TruthClass::Human,
}];

/// Requirements for `ATTEST_READY_TO_CLOSE`.
const ATTEST_READY_TO_CLOSE_REQUIREMENTS: &[MaterialRequirement] = &[
    MaterialRequirement {
        material_type: "FinalUnderwriting",
        required_truth: TruthClass::Doc,
    },
    MaterialRequirement {
        material_type: "SourcesAndUses",
        required_truth: TruthClass::Doc,
    },
];

/// Requirements for `FINALIZE_CLOSING`.
const FINALIZE_CLOSING_REQUIREMENTS: &[MaterialRequirement] = &[
    MaterialRequirement {
        material_type: "WireConfirmation",
        required_truth: TruthClass::Doc,
    },
    MaterialRequirement {
        material_type: "EntityFormationDocs",
        required_truth: TruthClass::Doc,
    },
];

/// Requirements for `ACTIVATE_OPERATIONS`.
const ACTIVATE_OPERATIONS_REQUIREMENTS: &[MaterialRequirement] = &[MaterialRequirement {
    material_type: "PropertyManagementAgreement",
    required_truth: TruthClass::Doc,
}];

/// Returns the fixed material requirements for an action.
///
/// Actions without material gates return an empty slice.
#[must_use]
pub const fn requirements_for(action: GateAction) -> &'static [MaterialRequirement] {
    match action {
        GateAction::ApproveDeal => APPROVE_DEAL_REQUIREMENTS,
        GateAction::AttestReadyToClose => ATTEST_READY_TO_CLOSE_REQUIREMENTS,
        GateAction::FinalizeClosing => FINALIZE_CLOSING_REQUIREMENTS,
        GateAction::ActivateOperations => ACTIVATE_OPERATIONS_REQUIREMENTS,
        _ => &[],
    }
}

/// Actions whose gates enforce material requirements.
pub const MATERIAL_GATED_ACTIONS: &[GateAction] = &[
    GateAction::ApproveDeal,
    GateAction::AttestReadyToClose,
    GateAction::FinalizeClosing,
    GateAction::ActivateOperations,
];
