// crates/deal-kernel-core/src/runtime/snapshot.rs
// ============================================================================
// Module: Deal Kernel Snapshot Assembly
// Description: Point-in-time snapshot, approval, and replay-input assembly.
// Purpose: Derive canonical point-in-time views from replayed store inputs.
// Dependencies: crate::core, crate::runtime::{gate, projection}
// ============================================================================

//! ## Overview
//! A snapshot is a deterministic function of the events, material revisions,
//! and role grants at or before the requested instant. The same
//! [`ReplaySource`] feeds snapshot assembly, explain replay, and the live
//! appender's gate context, so every surface agrees on what the world looked
//! like at `t`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::authority::AuthorityRule;
use crate::core::authority::GateAction;
use crate::core::authority::RoleName;
use crate::core::deal::ActorRoleRecord;
use crate::core::event::EventRecord;
use crate::core::event::EventType;
use crate::core::event::resolve_action;
use crate::core::explain::MaterialAtTime;
use crate::core::explain::MaterialsAtTime;
use crate::core::explain::ProjectionSummary;
use crate::core::explain::ReplayInputs;
use crate::core::explain::RequirementAtTime;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::DealId;
use crate::core::identifiers::MaterialId;
use crate::core::material::MATERIAL_GATED_ACTIONS;
use crate::core::material::TruthClass;
use crate::core::material::requirements_for;
use crate::core::time::Timestamp;
use crate::runtime::gate::ApprovalVote;
use crate::runtime::gate::GateContext;
use crate::runtime::gate::MaterialTruth;
use crate::runtime::projection::Projection;
use crate::runtime::projection::project;

// ============================================================================
// SECTION: Replay Source
// ============================================================================

/// Effective state of one material at the replay instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialStateView {
    /// Material identifier.
    pub material_id: MaterialId,
    /// Material type name.
    #[serde(rename = "type")]
    pub material_type: String,
    /// Truth class of the effective revision.
    pub truth_class: TruthClass,
    /// Data of the effective revision.
    pub data: Value,
    /// Effective revision time.
    pub created_at: Timestamp,
}

/// Store-assembled inputs for one replay instant.
///
/// # Invariants
/// - `events` are at or before the instant, ascending by sequence number.
/// - `actor_roles` and `materials` are filtered to the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySource {
    /// All authority rules for the deal.
    pub rules: Vec<AuthorityRule>,
    /// Committed events at or before the instant.
    pub events: Vec<EventRecord>,
    /// Role grants effective at the instant.
    pub actor_roles: Vec<ActorRoleRecord>,
    /// Effective material states at the instant.
    pub materials: Vec<MaterialStateView>,
}

impl ReplaySource {
    /// Returns the rule for an action.
    ///
    /// Falls back to a closed rule (no allowed roles) when the row is
    /// missing, which fails the gate rather than opening it.
    #[must_use]
    pub fn rule_for(&self, deal_id: DealId, action: GateAction) -> AuthorityRule {
        self.rules.iter().find(|rule| rule.action == action).cloned().unwrap_or(AuthorityRule {
            deal_id,
            action,
            threshold: u32::MAX,
            roles_allowed: Vec::new(),
            roles_required: Vec::new(),
        })
    }

    /// Returns the roles an actor holds on the deal at the instant.
    #[must_use]
    pub fn roles_of(&self, actor_id: ActorId) -> Vec<RoleName> {
        let mut roles: Vec<RoleName> = self
            .actor_roles
            .iter()
            .filter(|grant| grant.actor_id == actor_id)
            .map(|grant| grant.role)
            .collect();
        roles.sort_unstable();
        roles.dedup();
        roles
    }

    /// Folds the event stream into a projection.
    #[must_use]
    pub fn projection(&self) -> Projection {
        project(Projection::initial(), self.events.iter().map(|event| event.event_type))
    }

    /// Derives approval votes for an action.
    ///
    /// Votes are per actor with latest-wins semantics: a later denial
    /// cancels an earlier grant. Actors with no role on the deal at the
    /// instant never produce a vote; consumers additionally filter by the
    /// rule's allowed roles.
    #[must_use]
    pub fn approval_votes(&self, action: GateAction) -> Vec<ApprovalVote> {
        let mut latest: BTreeMap<ActorId, bool> = BTreeMap::new();
        for event in &self.events {
            let granted = match event.event_type {
                EventType::ApprovalGranted => true,
                EventType::ApprovalDenied => false,
                _ => continue,
            };
            let Some(actor_id) = event.actor_id else {
                continue;
            };
            let Ok(vote_action) = resolve_action(event.event_type, &event.payload) else {
                continue;
            };
            if vote_action == action {
                latest.insert(actor_id, granted);
            }
        }
        latest
            .into_iter()
            .filter_map(|(actor_id, granted)| {
                granted.then(|| ApprovalVote {
                    actor_id,
                    roles: self.roles_of(actor_id),
                })
            })
            .filter(|vote| !vote.roles.is_empty())
            .collect()
    }

    /// Returns the commit time of the most recent valid override for an
    /// action (matching target and non-empty reason).
    #[must_use]
    pub fn last_override_at(&self, action: GateAction) -> Option<Timestamp> {
        self.events
            .iter()
            .rev()
            .find(|event| {
                event.event_type == EventType::OverrideAttested
                    && override_matches(&event.payload, action)
            })
            .map(|event| event.created_at)
    }

    /// Returns the commit time of the most recent gate event for an action.
    #[must_use]
    pub fn last_gate_event_at(&self, action: GateAction) -> Option<Timestamp> {
        let gate_event = EventType::gate_event_for(action)?;
        self.events
            .iter()
            .rev()
            .find(|event| event.event_type == gate_event)
            .map(|event| event.created_at)
    }

    /// Returns material truths in the shape the gate evaluator consumes.
    #[must_use]
    pub fn material_truths(&self) -> Vec<MaterialTruth> {
        self.materials
            .iter()
            .map(|material| MaterialTruth {
                material_type: material.material_type.clone(),
                truth_class: material.truth_class,
            })
            .collect()
    }

    /// Builds the gate context for a proposed event at this instant.
    ///
    /// `actor_roles` of `None` skips the authority check (explain replay
    /// without an actor).
    #[must_use]
    pub fn gate_context(
        &self,
        deal_id: DealId,
        event_type: EventType,
        action: GateAction,
        actor_id: Option<ActorId>,
    ) -> GateContext {
        GateContext {
            event_type,
            rule: self.rule_for(deal_id, action),
            override_rule: self.rule_for(deal_id, GateAction::Override),
            actor_roles: actor_id.map(|actor| self.roles_of(actor)),
            actor_id,
            approvals: self.approval_votes(action),
            materials: self.material_truths(),
            last_override_at: self.last_override_at(action),
            last_gate_event_at: self.last_gate_event_at(action),
        }
    }

    /// Builds the replay-inputs section for a blocked explain replay.
    #[must_use]
    pub fn replay_inputs(&self, action: GateAction) -> ReplayInputs {
        let projection = self.projection();
        ReplayInputs {
            approvals_at_t: u32::try_from(self.approval_votes(action).len()).unwrap_or(u32::MAX),
            materials_at_t: MaterialsAtTime {
                list: self
                    .materials
                    .iter()
                    .map(|material| MaterialAtTime {
                        material_type: material.material_type.clone(),
                        truth_class: material.truth_class,
                    })
                    .collect(),
                requirements: requirements_for(action)
                    .iter()
                    .map(|requirement| RequirementAtTime {
                        material_type: requirement.material_type.to_string(),
                        required_truth: requirement.required_truth,
                    })
                    .collect(),
            },
            deal_state_at_t: ProjectionSummary {
                state: projection.state,
                stress_mode: projection.stress_mode,
            },
        }
    }
}

/// Indicates whether an override payload targets the action with a reason.
fn override_matches(payload: &Value, action: GateAction) -> bool {
    let target = payload.get("action").and_then(Value::as_str);
    let reason = payload.get("reason").and_then(Value::as_str).unwrap_or_default();
    target == Some(action.as_str()) && !reason.trim().is_empty()
}

// ============================================================================
// SECTION: Snapshot Report
// ============================================================================

/// Approval summary for one rule at the snapshot instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSummary {
    /// Governed action.
    pub action: GateAction,
    /// Required approval count.
    pub threshold: u32,
    /// Approvals counted at the instant.
    pub current_count: u32,
    /// Approval counts broken down by allowed role.
    pub satisfied_by_role: BTreeMap<RoleName, u32>,
    /// Indicates the threshold is met.
    pub satisfied: bool,
}

/// Requirement status vocabulary for snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementStatus {
    /// Requirement satisfied.
    Ok,
    /// No material of the required type exists.
    Missing,
    /// Material exists below the required truth class.
    Insufficient,
}

/// Material requirement status for one gated action at the instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRequirementStatus {
    /// Gated action.
    pub action: GateAction,
    /// Required material type name.
    #[serde(rename = "type")]
    pub material_type: String,
    /// Minimum truth class.
    pub required_truth: TruthClass,
    /// Status at the instant.
    pub status: RequirementStatus,
    /// Truth class currently carried, when the material exists.
    pub current_truth: Option<TruthClass>,
}

/// Timeline summary for the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSummary {
    /// Number of events at or before the instant.
    pub events_count: u64,
    /// Commit time of the newest event, if any.
    pub last_event_at: Option<Timestamp>,
    /// Type of the newest event, if any.
    pub last_event_type: Option<EventType>,
}

/// Integrity note attached to every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityNote {
    /// Input streams the snapshot replays from.
    pub replay_from: String,
    /// Asserts the snapshot is a pure function of those inputs.
    pub deterministic: bool,
}

/// Canonical point-in-time snapshot of a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReport {
    /// Deal identifier.
    pub deal_id: DealId,
    /// Snapshot instant.
    pub at: Timestamp,
    /// Projection over events at or before the instant.
    pub projection: ProjectionSummary,
    /// Approval summaries per rule, ascending by action.
    pub approvals: Vec<ApprovalSummary>,
    /// Material requirement statuses per gated action.
    pub material_requirements: Vec<MaterialRequirementStatus>,
    /// Effective material states at the instant.
    pub materials: Vec<MaterialStateView>,
    /// Authority rules for the deal, ascending by action.
    pub rules: Vec<AuthorityRule>,
    /// Timeline summary.
    pub timeline: TimelineSummary,
    /// Integrity note.
    pub integrity: IntegrityNote,
}

// ============================================================================
// SECTION: Snapshot Assembly
// ============================================================================

/// Builds the canonical snapshot for a deal at an instant.
#[must_use]
pub fn build_snapshot(deal_id: DealId, at: Timestamp, source: &ReplaySource) -> SnapshotReport {
    let projection = source.projection();

    let mut rules = source.rules.clone();
    rules.sort_by_key(|rule| rule.action);

    let approvals = rules
        .iter()
        .map(|rule| {
            let votes: Vec<_> = source
                .approval_votes(rule.action)
                .into_iter()
                .filter(|vote| vote.roles.iter().any(|role| rule.roles_allowed.contains(role)))
                .collect();
            let current_count = u32::try_from(votes.len()).unwrap_or(u32::MAX);
            let mut satisfied_by_role: BTreeMap<RoleName, u32> = BTreeMap::new();
            for role in &rule.roles_allowed {
                let holders = votes.iter().filter(|vote| vote.roles.contains(role)).count();
                satisfied_by_role.insert(*role, u32::try_from(holders).unwrap_or(u32::MAX));
            }
            ApprovalSummary {
                action: rule.action,
                threshold: rule.threshold,
                current_count,
                satisfied_by_role,
                satisfied: current_count >= rule.threshold,
            }
        })
        .collect();

    let mut material_requirements = Vec::new();
    for action in MATERIAL_GATED_ACTIONS {
        for requirement in requirements_for(*action) {
            let current = source
                .materials
                .iter()
                .filter(|material| material.material_type == requirement.material_type)
                .max_by_key(|material| material.truth_class.rank());
            let (status, current_truth) = match current {
                None => (RequirementStatus::Missing, None),
                Some(material) if material.truth_class.satisfies(requirement.required_truth) => {
                    (RequirementStatus::Ok, Some(material.truth_class))
                }
                Some(material) => (RequirementStatus::Insufficient, Some(material.truth_class)),
            };
            material_requirements.push(MaterialRequirementStatus {
                action: *action,
                material_type: requirement.material_type.to_string(),
                required_truth: requirement.required_truth,
                status,
                current_truth,
            });
        }
    }

    let mut materials = source.materials.clone();
    materials.sort_by(|a, b| {
        a.material_type.cmp(&b.material_type).then_with(|| a.material_id.cmp(&b.material_id))
    });

    let timeline = TimelineSummary {
        events_count: u64::try_from(source.events.len()).unwrap_or(u64::MAX),
        last_event_at: source.events.last().map(|event| event.created_at),
        last_event_type: source.events.last().map(|event| event.event_type),
    };

    SnapshotReport {
        deal_id,
        at,
        projection: ProjectionSummary {
            state: projection.state,
            stress_mode: projection.stress_mode,
        },
        approvals,
        material_requirements,
        materials,
        rules,
        timeline,
        integrity: IntegrityNote {
            replay_from: "events+materials".to_string(),
            deterministic: true,
        },
    }
}
