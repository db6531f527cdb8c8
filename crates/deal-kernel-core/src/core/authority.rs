// crates/deal-kernel-core/src/core/authority.rs
// ============================================================================
// Module: Deal Kernel Authority Model
// Description: Roles, gate actions, and per-deal authority rules.
// Purpose: Define who may advance a deal and under what approval threshold.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Every advance on a deal is a symbolic action governed by exactly one
//! authority rule. Rules are seeded from a fixed default set when the deal is
//! created and are scoped per `(deal, action)`. Role names are the domain's
//! fixed vocabulary; actors acquire them per deal through append-only
//! role grants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::DealId;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Domain role vocabulary.
///
/// # Invariants
/// - Variants are stable for serialization and rule matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleName {
    /// General partner.
    Gp,
    /// Legal counsel.
    Legal,
    /// Lender.
    Lender,
    /// Escrow agent.
    Escrow,
    /// Property operator.
    Operator,
    /// Court.
    Court,
    /// Regulator.
    Regulator,
    /// Trustee.
    Trustee,
    /// Auditor.
    Auditor,
}

impl RoleName {
    /// Returns the canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gp => "GP",
            Self::Legal => "LEGAL",
            Self::Lender => "LENDER",
            Self::Escrow => "ESCROW",
            Self::Operator => "OPERATOR",
            Self::Court => "COURT",
            Self::Regulator => "REGULATOR",
            Self::Trustee => "TRUSTEE",
            Self::Auditor => "AUDITOR",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = AuthorityParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "GP" => Ok(Self::Gp),
            "LEGAL" => Ok(Self::Legal),
            "LENDER" => Ok(Self::Lender),
            "ESCROW" => Ok(Self::Escrow),
            "OPERATOR" => Ok(Self::Operator),
            "COURT" => Ok(Self::Court),
            "REGULATOR" => Ok(Self::Regulator),
            "TRUSTEE" => Ok(Self::Trustee),
            "AUDITOR" => Ok(Self::Auditor),
            other => Err(AuthorityParseError::UnknownRole(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Gate Actions
// ============================================================================

/// Symbolic actions governed by authority rules.
///
/// # Invariants
/// - Variants are stable for serialization and rule matching.
/// - Exactly one authority rule exists per `(deal, action)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateAction {
    /// Create the deal (genesis; never gated).
    CreateDeal,
    /// Open formal review.
    OpenReview,
    /// Approve the deal.
    ApproveDeal,
    /// Attest closing readiness.
    AttestReadyToClose,
    /// Finalize the closing.
    FinalizeClosing,
    /// Activate operations.
    ActivateOperations,
    /// Record a detected material change.
    DetectMaterialChange,
    /// Reconcile a material change.
    ReconcileChange,
    /// Declare distress.
    DeclareDistress,
    /// Resolve distress.
    ResolveDistress,
    /// Impose a freeze.
    ImposeFreeze,
    /// Lift a freeze.
    LiftFreeze,
    /// Finalize an exit.
    FinalizeExit,
    /// Terminate the deal.
    TerminateDeal,
    /// Dispute recorded data.
    DisputeData,
    /// Attest an override for another action's gate.
    Override,
}

/// All actions seeded with a default rule on deal creation.
pub const ALL_ACTIONS: &[GateAction] = &[
    GateAction::CreateDeal,
    GateAction::OpenReview,
    GateAction::ApproveDeal,
    GateAction::AttestReadyToClose,
    GateAction::FinalizeClosing,
    GateAction::ActivateOperations,
    GateAction::DetectMaterialChange,
    GateAction::ReconcileChange,
    GateAction::DeclareDistress,
    GateAction::ResolveDistress,
    GateAction::ImposeFreeze,
    GateAction::LiftFreeze,
    GateAction::FinalizeExit,
    GateAction::TerminateDeal,
    GateAction::DisputeData,
    GateAction::Override,
];

/// Actions whose gates enforce an approval threshold.
pub const THRESHOLD_ACTIONS: &[GateAction] = &[
    GateAction::ApproveDeal,
    GateAction::AttestReadyToClose,
    GateAction::FinalizeClosing,
    GateAction::ActivateOperations,
    GateAction::ResolveDistress,
];

impl GateAction {
    /// Returns the canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateDeal => "CREATE_DEAL",
            Self::OpenReview => "OPEN_REVIEW",
            Self::ApproveDeal => "APPROVE_DEAL",
            Self::AttestReadyToClose => "ATTEST_READY_TO_CLOSE",
            Self::FinalizeClosing => "FINALIZE_CLOSING",
            Self::ActivateOperations => "ACTIVATE_OPERATIONS",
            Self::DetectMaterialChange => "DETECT_MATERIAL_CHANGE",
            Self::ReconcileChange => "RECONCILE_CHANGE",
            Self::DeclareDistress => "DECLARE_DISTRESS",
            Self::ResolveDistress => "RESOLVE_DISTRESS",
            Self::ImposeFreeze => "IMPOSE_FREEZE",
            Self::LiftFreeze => "LIFT_FREEZE",
            Self::FinalizeExit => "FINALIZE_EXIT",
            Self::TerminateDeal => "TERMINATE_DEAL",
            Self::DisputeData => "DISPUTE_DATA",
            Self::Override => "OVERRIDE",
        }
    }

    /// Indicates whether the action's gate enforces an approval threshold.
    #[must_use]
    pub fn requires_approval_threshold(self) -> bool {
        THRESHOLD_ACTIONS.contains(&self)
    }
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateAction {
    type Err = AuthorityParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ALL_ACTIONS
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AuthorityParseError::UnknownAction(value.to_string()))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing authority vocabulary.
#[derive(Debug, Error)]
pub enum AuthorityParseError {
    /// Role name outside the domain vocabulary.
    #[error("unknown role: {0}")]
    UnknownRole(String),
    /// Action name outside the governed set.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

// ============================================================================
// SECTION: Authority Rules
// ============================================================================

/// Authority rule for one `(deal, action)` pair.
///
/// # Invariants
/// - Exactly one rule exists per `(deal, action)`.
/// - `threshold` counts distinct approving actors holding an allowed role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityRule {
    /// Deal the rule is scoped to.
    pub deal_id: DealId,
    /// Action the rule governs.
    pub action: GateAction,
    /// Approval threshold for gate-advancing actions.
    pub threshold: u32,
    /// Roles whose holders may perform or approve the action.
    pub roles_allowed: Vec<RoleName>,
    /// Roles that must each be represented among approvers (reserved).
    pub roles_required: Vec<RoleName>,
}

/// Builds the fixed default rule set for a freshly created deal.
#[must_use]
pub fn default_rules(deal_id: DealId) -> Vec<AuthorityRule> {
    use GateAction as A;
    use RoleName as R;

    /// Shorthand rule constructor for the default table.
    fn rule(
        deal_id: DealId,
        action: GateAction,
        threshold: u32,
        roles_allowed: &[RoleName],
    ) -> AuthorityRule {
        AuthorityRule {
            deal_id,
            action,
            threshold,
            roles_allowed: roles_allowed.to_vec(),
            roles_required: Vec::new(),
        }
    }

    vec![
        rule(deal_id, A::CreateDeal, 0, &[R::Gp, R::Operator]),
        rule(deal_id, A::OpenReview, 0, &[R::Gp, R::Operator]),
        rule(deal_id, A::ApproveDeal, 1, &[R::Gp]),
        rule(deal_id, A::AttestReadyToClose, 2, &[R::Gp, R::Legal]),
        rule(deal_id, A::FinalizeClosing, 3, &[R::Gp, R::Lender, R::Escrow]),
        rule(deal_id, A::ActivateOperations, 1, &[R::Gp, R::Operator]),
        rule(deal_id, A::DetectMaterialChange, 0, &[R::Gp, R::Operator, R::Auditor]),
        rule(deal_id, A::ReconcileChange, 0, &[R::Gp, R::Operator]),
        rule(deal_id, A::DeclareDistress, 0, &[R::Gp, R::Lender, R::Court, R::Regulator, R::Trustee]),
        rule(deal_id, A::ResolveDistress, 2, &[R::Gp, R::Lender, R::Court, R::Trustee]),
        rule(deal_id, A::ImposeFreeze, 0, &[R::Court, R::Regulator]),
        rule(deal_id, A::LiftFreeze, 0, &[R::Court, R::Regulator]),
        rule(deal_id, A::FinalizeExit, 0, &[R::Gp]),
        rule(deal_id, A::TerminateDeal, 0, &[R::Gp, R::Court]),
        rule(deal_id, A::DisputeData, 0, &[R::Gp, R::Legal, R::Lender, R::Auditor, R::Regulator]),
        rule(deal_id, A::Override, 0, &[R::Gp, R::Court, R::Regulator]),
    ]
}
