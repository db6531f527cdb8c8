// crates/deal-kernel-core/src/core/deal.rs
// ============================================================================
// Module: Deal Kernel Deal and Actor Records
// Description: Deal, actor, role, and role-grant record types.
// Purpose: Define the mutable-by-projection deal row and its principals.
// Dependencies: crate::core::{authority, identifiers, time}, crate::runtime, serde
// ============================================================================

//! ## Overview
//! The deal row carries the latest projection output (lifecycle state and
//! stress mode) and is mutated only by the event appender. Actors are global;
//! their roles are scoped to a deal through append-only grants that become
//! effective at grant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::authority::RoleName;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::DealId;
use crate::core::identifiers::RoleId;
use crate::core::time::Timestamp;
use crate::runtime::projection::LifecycleState;
use crate::runtime::projection::StressMode;

// ============================================================================
// SECTION: Deal
// ============================================================================

/// Deal row reflecting the latest committed projection.
///
/// # Invariants
/// - `state` and `stress_mode` equal the projection over all committed
///   events; only the event appender updates them.
/// - Deals are never deleted in normal flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    /// Deal identifier.
    pub deal_id: DealId,
    /// Deal display name.
    pub name: String,
    /// Lifecycle state from the latest projection.
    pub state: LifecycleState,
    /// Stress mode from the latest projection.
    pub stress_mode: StressMode,
    /// Indicates an open draft sandbox on the deal.
    pub is_draft: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Actors and Roles
// ============================================================================

/// Principal type for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    /// Human principal.
    Human,
    /// System principal.
    System,
}

/// Global actor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRecord {
    /// Actor identifier.
    pub actor_id: ActorId,
    /// Actor display name.
    pub name: String,
    /// Principal type.
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Role row (vocabulary entry, optionally organization-scoped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    /// Role identifier.
    pub role_id: RoleId,
    /// Role name.
    pub name: RoleName,
    /// Optional organization scope.
    pub org_id: Option<String>,
}

/// Append-only role grant scoping an actor's role to a deal.
///
/// # Invariants
/// - Grants are effective from `created_at` and are never revoked by update;
///   the grant log is the authority history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRoleRecord {
    /// Actor holding the role.
    pub actor_id: ActorId,
    /// Granted role.
    pub role: RoleName,
    /// Deal the grant is scoped to.
    pub deal_id: DealId,
    /// Grant time.
    pub created_at: Timestamp,
}

/// Actor view with deal-scoped roles aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorWithRoles {
    /// Actor record.
    #[serde(flatten)]
    pub actor: ActorRecord,
    /// Roles held on the requested deal.
    pub roles: Vec<RoleName>,
}
