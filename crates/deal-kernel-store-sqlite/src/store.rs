// crates/deal-kernel-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Deal Store
// Description: Durable deal-kernel persistence backed by SQLite WAL.
// Purpose: Serialize gated appends and serve deterministic replay inputs.
// Dependencies: deal-kernel-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements the kernel's relational store. All writes go
//! through a single mutex-guarded connection with immediate transactions, so
//! concurrent appenders for any deal serialize and sequence numbers stay
//! dense and gap-free. The gated event appender lives here because the gate
//! check, chain append, projection recompute, and deal-row update must share
//! one transaction.
//!
//! Reads assemble [`ReplaySource`] inputs; all evaluation is delegated to
//! the pure functions in `deal-kernel-core`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use deal_kernel_core::ActorId;
use deal_kernel_core::ActorRecord;
use deal_kernel_core::ActorRoleRecord;
use deal_kernel_core::ActorType;
use deal_kernel_core::ActorWithRoles;
use deal_kernel_core::ArtifactId;
use deal_kernel_core::ArtifactLinkRecord;
use deal_kernel_core::ArtifactRecord;
use deal_kernel_core::AuthorityRule;
use deal_kernel_core::ChainPayload;
use deal_kernel_core::ChainReport;
use deal_kernel_core::CommittedSummary;
use deal_kernel_core::DealId;
use deal_kernel_core::DealRecord;
use deal_kernel_core::DraftDiff;
use deal_kernel_core::DraftId;
use deal_kernel_core::DraftStateRecord;
use deal_kernel_core::DraftStatus;
use deal_kernel_core::DraftSummary;
use deal_kernel_core::EventId;
use deal_kernel_core::EventRecord;
use deal_kernel_core::EventType;
use deal_kernel_core::ExplainBlock;
use deal_kernel_core::ExplainStatus;
use deal_kernel_core::GateAction;
use deal_kernel_core::GateDecision;
use deal_kernel_core::GatePreview;
use deal_kernel_core::GatePreviewId;
use deal_kernel_core::GatePreviewSet;
use deal_kernel_core::LinkId;
use deal_kernel_core::MATERIAL_GATED_ACTIONS;
use deal_kernel_core::MaterialId;
use deal_kernel_core::MaterialRecord;
use deal_kernel_core::MaterialRevisionRecord;
use deal_kernel_core::MaterialStateView;
use deal_kernel_core::ProjectionSummary;
use deal_kernel_core::ProposedEvent;
use deal_kernel_core::ReplayReport;
use deal_kernel_core::ReplaySource;
use deal_kernel_core::RevisionId;
use deal_kernel_core::RoleId;
use deal_kernel_core::RoleName;
use deal_kernel_core::SimulatedEventId;
use deal_kernel_core::SimulatedEventRecord;
use deal_kernel_core::SnapshotReport;
use deal_kernel_core::Timestamp;
use deal_kernel_core::TruthClass;
use deal_kernel_core::build_snapshot;
use deal_kernel_core::compute_event_hash;
use deal_kernel_core::core::proofpack::EvidenceEntry;
use deal_kernel_core::core::proofpack::EvidenceIndex;
use deal_kernel_core::core::proofpack::EvidenceReference;
use deal_kernel_core::decorate_override;
use deal_kernel_core::default_rules;
use deal_kernel_core::evaluate;
use deal_kernel_core::resolve_action;
use deal_kernel_core::verify_chain;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized payload size accepted per event.
pub const MAX_EVENT_PAYLOAD_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` deal store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct DealStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` deal store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw payload bodies.
#[derive(Debug, Error)]
pub enum DealStoreError {
    /// Store I/O error.
    #[error("deal store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("deal store db error: {0}")]
    Db(String),
    /// Store corruption or integrity failure.
    #[error("deal store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("deal store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid request or stored data.
    #[error("deal store invalid data: {0}")]
    Invalid(String),
    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unique-ownership conflict (artifact hash owned elsewhere).
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Maps a `rusqlite` error into a store error.
fn db_err(err: rusqlite::Error) -> DealStoreError {
    DealStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of a gated append attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The event was committed and the deal row updated.
    Committed {
        /// Persisted event.
        event: EventRecord,
        /// Deal row after projection recompute.
        deal: DealRecord,
    },
    /// The gate refused the event; nothing was written.
    Blocked {
        /// Explain block to return verbatim.
        explain: ExplainBlock,
        /// Indicates an authority denial rather than a gate shortfall.
        authority_denied: bool,
    },
}

/// Result of registering an artifact row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRegistration {
    /// A new row was inserted.
    Created(ArtifactRecord),
    /// Identical bytes already registered on the same deal (idempotent).
    Existing(ArtifactRecord),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed deal store with WAL support.
///
/// # Invariants
/// - All access is serialized through the connection mutex; writers use
///   immediate transactions so appends per deal are strictly ordered.
/// - Event rows are append-only.
#[derive(Clone)]
pub struct DealStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl DealStore {
    /// Opens the store, creating the database and schema when missing.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the path is unsafe, the database
    /// cannot be opened, or the schema version is unsupported.
    pub fn open(config: &DealStoreConfig) -> Result<Self, DealStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Acquires the connection guard.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DealStoreError> {
        self.connection.lock().map_err(|_| DealStoreError::Db("mutex poisoned".to_string()))
    }

    // ------------------------------------------------------------------
    // Deals
    // ------------------------------------------------------------------

    /// Creates a deal with its default authority rules and genesis event.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when validation or persistence fails.
    pub fn create_deal(&self, name: &str) -> Result<(DealRecord, EventRecord), DealStoreError> {
        if name.trim().is_empty() {
            return Err(DealStoreError::Invalid("deal name must be non-empty".to_string()));
        }
        let deal_id = DealId::generate();
        let now = Timestamp::now();
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        tx.execute(
            "INSERT INTO deals (deal_id, name, state, stress_mode, is_draft, created_at, \
             updated_at) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            params![
                deal_id.to_string(),
                name,
                enum_to_sql(&deal_kernel_core::LifecycleState::Draft)?,
                enum_to_sql(&deal_kernel_core::StressMode::Sm0)?,
                now.render()
            ],
        )
        .map_err(db_err)?;
        for rule in default_rules(deal_id) {
            tx.execute(
                "INSERT INTO authority_rules (deal_id, action, threshold, roles_allowed, \
                 roles_required) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    deal_id.to_string(),
                    enum_to_sql(&rule.action)?,
                    rule.threshold,
                    json_to_sql(&rule.roles_allowed)?,
                    json_to_sql(&rule.roles_required)?
                ],
            )
            .map_err(db_err)?;
        }
        let genesis = ProposedEvent {
            event_type: EventType::DealCreated,
            actor_id: None,
            payload: serde_json::json!({ "name": name }),
            authority_context: serde_json::json!({ "system": true }),
            evidence_refs: Vec::new(),
        };
        let event = append_chain_event(&tx, deal_id, &genesis)?;
        let deal = recompute_deal(&tx, deal_id)?;
        tx.commit().map_err(db_err)?;
        Ok((deal, event))
    }

    /// Fetches a deal row.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the deal does not exist.
    pub fn deal(&self, deal_id: DealId) -> Result<DealRecord, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)
    }

    /// Lists all deals ascending by creation time.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the query fails.
    pub fn list_deals(&self) -> Result<Vec<DealRecord>, DealStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT deal_id, name, state, stress_mode, is_draft, created_at, updated_at \
                 FROM deals ORDER BY created_at, deal_id",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![], read_deal_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    // ------------------------------------------------------------------
    // Actors and roles
    // ------------------------------------------------------------------

    /// Creates an actor and grants its first deal-scoped role.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing or persistence
    /// fails.
    pub fn create_actor(
        &self,
        deal_id: DealId,
        name: &str,
        actor_type: ActorType,
        role: RoleName,
    ) -> Result<ActorWithRoles, DealStoreError> {
        if name.trim().is_empty() {
            return Err(DealStoreError::Invalid("actor name must be non-empty".to_string()));
        }
        let actor_id = ActorId::generate();
        let now = Timestamp::now();
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        tx.execute(
            "INSERT INTO actors (actor_id, name, actor_type, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![actor_id.to_string(), name, enum_to_sql(&actor_type)?, now.render()],
        )
        .map_err(db_err)?;
        grant_role_tx(&tx, deal_id, actor_id, role, now)?;
        let actor = fetch_actor(&tx, deal_id, actor_id)?;
        tx.commit().map_err(db_err)?;
        Ok(actor)
    }

    /// Grants an additional role to an actor on a deal.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal or actor is missing.
    pub fn grant_role(
        &self,
        deal_id: DealId,
        actor_id: ActorId,
        role: RoleName,
    ) -> Result<ActorWithRoles, DealStoreError> {
        let now = Timestamp::now();
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        ensure_actor_exists(&tx, actor_id)?;
        grant_role_tx(&tx, deal_id, actor_id, role, now)?;
        let actor = fetch_actor(&tx, deal_id, actor_id)?;
        tx.commit().map_err(db_err)?;
        Ok(actor)
    }

    /// Lists actors holding at least one role on a deal.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn actors(&self, deal_id: DealId) -> Result<Vec<ActorWithRoles>, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let mut statement = guard
            .prepare(
                "SELECT DISTINCT a.actor_id FROM actors a JOIN actor_roles ar ON ar.actor_id = \
                 a.actor_id WHERE ar.deal_id = ?1 ORDER BY a.created_at, a.actor_id",
            )
            .map_err(db_err)?;
        let ids = statement
            .query_map(params![deal_id.to_string()], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut actors = Vec::with_capacity(ids.len());
        for raw in ids {
            let actor_id = parse_id::<ActorId>(&raw)?;
            actors.push(fetch_actor(&guard, deal_id, actor_id)?);
        }
        Ok(actors)
    }

    /// Fetches one actor with deal-scoped roles aggregated.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the deal or actor is
    /// missing.
    pub fn actor(
        &self,
        deal_id: DealId,
        actor_id: ActorId,
    ) -> Result<ActorWithRoles, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        fetch_actor(&guard, deal_id, actor_id)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Appends an event through the full gate pipeline.
    ///
    /// On a blocked gate nothing is written and the Explain block is
    /// returned for the caller to surface verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when validation fails or persistence
    /// fails; gate refusals are an [`AppendOutcome::Blocked`], not an error.
    pub fn append_event(
        &self,
        deal_id: DealId,
        proposed: &ProposedEvent,
    ) -> Result<AppendOutcome, DealStoreError> {
        if proposed.event_type == EventType::DealCreated {
            return Err(DealStoreError::Invalid(
                "DealCreated is reserved for deal creation".to_string(),
            ));
        }
        let action = resolve_action(proposed.event_type, &proposed.payload)
            .map_err(|err| DealStoreError::Invalid(err.to_string()))?;
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        let source = load_replay_source(&tx, deal_id, None)?;
        let context =
            source.gate_context(deal_id, proposed.event_type, action, proposed.actor_id);
        match evaluate(&context) {
            GateDecision::Blocked {
                explain,
                authority_denied,
            } => Ok(AppendOutcome::Blocked {
                explain,
                authority_denied,
            }),
            GateDecision::Allowed {
                override_used,
            } => {
                let mut event = proposed.clone();
                if override_used {
                    event.authority_context =
                        decorate_override(event.authority_context, action);
                }
                let event = append_chain_event(&tx, deal_id, &event)?;
                let deal = recompute_deal(&tx, deal_id)?;
                tx.commit().map_err(db_err)?;
                Ok(AppendOutcome::Committed {
                    event,
                    deal,
                })
            }
        }
    }

    /// Lists a deal's events ascending by sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn events(&self, deal_id: DealId) -> Result<Vec<EventRecord>, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        load_events(&guard, deal_id, None)
    }

    /// Verifies the deal's hash chain.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn verify(&self, deal_id: DealId) -> Result<ChainReport, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let events = load_events(&guard, deal_id, None)?;
        Ok(verify_chain(&events))
    }

    // ------------------------------------------------------------------
    // Point-in-time views
    // ------------------------------------------------------------------

    /// Builds the canonical snapshot for a deal at an instant.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn snapshot(
        &self,
        deal_id: DealId,
        at: Timestamp,
    ) -> Result<SnapshotReport, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let source = load_replay_source(&guard, deal_id, Some(at))?;
        Ok(build_snapshot(deal_id, at, &source))
    }

    /// Replays the gate evaluator for an action at an instant.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing or the action is
    /// not replayable.
    pub fn explain(
        &self,
        deal_id: DealId,
        at: Timestamp,
        action: GateAction,
        actor_id: Option<ActorId>,
    ) -> Result<ReplayReport, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let source = load_replay_source(&guard, deal_id, Some(at))?;
        let event_type = EventType::for_action(action).ok_or_else(|| {
            DealStoreError::Invalid(format!("action {action} has no replayable gate"))
        })?;
        let context = source.gate_context(deal_id, event_type, action, actor_id);
        let projection = source.projection();
        let summary = ProjectionSummary {
            state: projection.state,
            stress_mode: projection.stress_mode,
        };
        let report = match evaluate(&context) {
            GateDecision::Allowed {
                ..
            } => ReplayReport {
                action,
                at,
                status: ExplainStatus::Allowed,
                projection_summary: summary,
                reasons: Vec::new(),
                next_steps: Vec::new(),
                inputs_used: None,
            },
            GateDecision::Blocked {
                explain, ..
            } => ReplayReport {
                action,
                at,
                status: ExplainStatus::Blocked,
                projection_summary: summary,
                reasons: explain.reasons,
                next_steps: explain.next_steps,
                inputs_used: Some(source.replay_inputs(action)),
            },
        };
        Ok(report)
    }

    /// Assembles the replay source for external consumers (ProofPack).
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn replay_source(
        &self,
        deal_id: DealId,
        at: Option<Timestamp>,
    ) -> Result<ReplaySource, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        load_replay_source(&guard, deal_id, at)
    }

    // ------------------------------------------------------------------
    // Materials
    // ------------------------------------------------------------------

    /// Creates a material and its first revision.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing or persistence
    /// fails.
    pub fn create_material(
        &self,
        deal_id: DealId,
        material_type: &str,
        truth_class: TruthClass,
        data: Value,
    ) -> Result<MaterialRecord, DealStoreError> {
        if material_type.trim().is_empty() {
            return Err(DealStoreError::Invalid("material type must be non-empty".to_string()));
        }
        let material_id = MaterialId::generate();
        let now = Timestamp::now();
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        tx.execute(
            "INSERT INTO materials (material_id, deal_id, material_type, truth_class, data, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                material_id.to_string(),
                deal_id.to_string(),
                material_type,
                enum_to_sql(&truth_class)?,
                json_to_sql(&data)?,
                now.render()
            ],
        )
        .map_err(db_err)?;
        insert_revision(&tx, deal_id, material_id, material_type, truth_class, &data, now)?;
        tx.commit().map_err(db_err)?;
        Ok(MaterialRecord {
            material_id,
            deal_id,
            material_type: material_type.to_string(),
            truth_class,
            data,
            created_at: now,
        })
    }

    /// Updates a material's truth class and/or data, writing a new revision.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal or material is missing.
    pub fn update_material(
        &self,
        deal_id: DealId,
        material_id: MaterialId,
        truth_class: Option<TruthClass>,
        data: Option<Value>,
    ) -> Result<MaterialRecord, DealStoreError> {
        let now = Timestamp::now();
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        let current = fetch_material(&tx, deal_id, material_id)?;
        let next_truth = truth_class.unwrap_or(current.truth_class);
        let next_data = data.unwrap_or_else(|| current.data.clone());
        tx.execute(
            "UPDATE materials SET truth_class = ?1, data = ?2 WHERE material_id = ?3",
            params![enum_to_sql(&next_truth)?, json_to_sql(&next_data)?, material_id.to_string()],
        )
        .map_err(db_err)?;
        insert_revision(
            &tx,
            deal_id,
            material_id,
            &current.material_type,
            next_truth,
            &next_data,
            now,
        )?;
        tx.commit().map_err(db_err)?;
        Ok(MaterialRecord {
            material_id,
            deal_id,
            material_type: current.material_type,
            truth_class: next_truth,
            data: next_data,
            created_at: current.created_at,
        })
    }

    /// Lists a deal's materials ascending by creation time.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn materials(&self, deal_id: DealId) -> Result<Vec<MaterialRecord>, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let mut statement = guard
            .prepare(
                "SELECT material_id, deal_id, material_type, truth_class, data, created_at FROM \
                 materials WHERE deal_id = ?1 ORDER BY created_at, material_id",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![deal_id.to_string()], read_material_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Fetches one material.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the deal or material is
    /// missing.
    pub fn material(
        &self,
        deal_id: DealId,
        material_id: MaterialId,
    ) -> Result<MaterialRecord, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        fetch_material(&guard, deal_id, material_id)
    }

    /// Lists a material's revisions ascending by creation time.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the deal or material is
    /// missing.
    pub fn material_revisions(
        &self,
        deal_id: DealId,
        material_id: MaterialId,
    ) -> Result<Vec<MaterialRevisionRecord>, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        fetch_material(&guard, deal_id, material_id)?;
        let mut statement = guard
            .prepare(
                "SELECT revision_id, material_id, deal_id, material_type, truth_class, data, \
                 created_at FROM material_revisions WHERE material_id = ?1 ORDER BY created_at, \
                 rowid",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![material_id.to_string()], read_revision_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    // ------------------------------------------------------------------
    // Artifacts
    // ------------------------------------------------------------------

    /// Registers an artifact row under store-wide hash uniqueness.
    ///
    /// Identical bytes on the same deal are idempotent; identical bytes on a
    /// different deal are a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::Conflict`] on cross-deal hash collision.
    pub fn register_artifact(
        &self,
        record: &ArtifactRecord,
    ) -> Result<ArtifactRegistration, DealStoreError> {
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, record.deal_id)?;
        let existing = find_artifact_by_hash(&tx, &record.sha256_hex)?;
        if let Some(existing) = existing {
            if existing.deal_id == record.deal_id {
                return Ok(ArtifactRegistration::Existing(existing));
            }
            return Err(DealStoreError::Conflict(format!(
                "artifact sha256 {} already owned by another deal",
                record.sha256_hex
            )));
        }
        tx.execute(
            "INSERT INTO artifacts (artifact_id, deal_id, filename, mime_type, size_bytes, \
             sha256_hex, storage_key, uploader_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, \
             ?7, ?8, ?9)",
            params![
                record.artifact_id.to_string(),
                record.deal_id.to_string(),
                record.filename,
                record.mime_type,
                i64::try_from(record.size_bytes)
                    .map_err(|_| DealStoreError::Corrupt("artifact size too large".to_string()))?,
                record.sha256_hex,
                record.storage_key,
                record.uploader_id.map(|id| id.to_string()),
                record.created_at.render()
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(ArtifactRegistration::Created(record.clone()))
    }

    /// Lists a deal's artifacts ascending by creation time.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn artifacts(&self, deal_id: DealId) -> Result<Vec<ArtifactRecord>, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let mut statement = guard
            .prepare(
                "SELECT artifact_id, deal_id, filename, mime_type, size_bytes, sha256_hex, \
                 storage_key, uploader_id, created_at FROM artifacts WHERE deal_id = ?1 ORDER BY \
                 created_at, artifact_id",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![deal_id.to_string()], read_artifact_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Fetches one artifact by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the artifact is missing.
    pub fn artifact(&self, artifact_id: ArtifactId) -> Result<ArtifactRecord, DealStoreError> {
        let guard = self.lock()?;
        fetch_artifact(&guard, artifact_id)
    }

    /// Links an artifact to an event, a material, or a bare tag.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the artifact is missing, the
    /// reference is missing, or the reference belongs to a different deal.
    pub fn link_artifact(
        &self,
        artifact_id: ArtifactId,
        event_id: Option<EventId>,
        material_id: Option<MaterialId>,
        tag: Option<String>,
    ) -> Result<ArtifactLinkRecord, DealStoreError> {
        if event_id.is_none() && material_id.is_none() && tag.is_none() {
            return Err(DealStoreError::Invalid(
                "link requires an event, a material, or a tag".to_string(),
            ));
        }
        let now = Timestamp::now();
        let link_id = LinkId::generate();
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        let artifact = fetch_artifact(&tx, artifact_id)?;
        if let Some(event_id) = event_id {
            let owner: Option<String> = tx
                .query_row(
                    "SELECT deal_id FROM events WHERE event_id = ?1",
                    params![event_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            check_same_deal(owner.as_deref(), artifact.deal_id, "event")?;
        }
        if let Some(material_id) = material_id {
            let owner: Option<String> = tx
                .query_row(
                    "SELECT deal_id FROM materials WHERE material_id = ?1",
                    params![material_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            check_same_deal(owner.as_deref(), artifact.deal_id, "material")?;
        }
        tx.execute(
            "INSERT INTO artifact_links (link_id, deal_id, artifact_id, event_id, material_id, \
             tag, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                link_id.to_string(),
                artifact.deal_id.to_string(),
                artifact_id.to_string(),
                event_id.map(|id| id.to_string()),
                material_id.map(|id| id.to_string()),
                tag,
                now.render()
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(ArtifactLinkRecord {
            link_id,
            deal_id: artifact.deal_id,
            artifact_id,
            event_id,
            material_id,
            tag,
            created_at: now,
        })
    }

    /// Builds the evidence index over artifacts visible at an instant.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn evidence_index(
        &self,
        deal_id: DealId,
        at: Timestamp,
    ) -> Result<EvidenceIndex, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let artifacts = {
            let mut statement = guard
                .prepare(
                    "SELECT artifact_id, deal_id, filename, mime_type, size_bytes, sha256_hex, \
                     storage_key, uploader_id, created_at FROM artifacts WHERE deal_id = ?1 AND \
                     created_at <= ?2 ORDER BY created_at, artifact_id",
                )
                .map_err(db_err)?;
            let rows = statement
                .query_map(params![deal_id.to_string(), at.render()], read_artifact_row)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            rows.into_iter().map(TryInto::try_into).collect::<Result<Vec<ArtifactRecord>, _>>()?
        };
        let links = load_links(&guard, deal_id, at)?;
        let events = load_events(&guard, deal_id, Some(at))?;
        let source = load_replay_source(&guard, deal_id, Some(at))?;

        let mut entries = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let mut references = Vec::new();
            for link in &links {
                if link.artifact_id == artifact.artifact_id {
                    references.push(EvidenceReference::Link {
                        link_id: link.link_id,
                        event_id: link.event_id,
                        material_id: link.material_id,
                        tag: link.tag.clone(),
                    });
                }
            }
            for event in &events {
                if references_artifact(&event.evidence_refs, artifact) {
                    references.push(EvidenceReference::Event {
                        event_id: event.event_id,
                    });
                }
            }
            for material in &source.materials {
                if material_references_artifact(&material.data, artifact) {
                    references.push(EvidenceReference::Material {
                        material_id: material.material_id,
                    });
                }
            }
            entries.push(EvidenceEntry {
                artifact_id: artifact.artifact_id,
                filename: artifact.filename.clone(),
                sha256_hex: artifact.sha256_hex.clone(),
                references,
            });
        }
        Ok(EvidenceIndex {
            deal_id,
            at,
            artifacts: entries,
        })
    }

    // ------------------------------------------------------------------
    // Draft sandbox
    // ------------------------------------------------------------------

    /// Starts (or returns) the deal's draft sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing.
    pub fn draft_start(&self, deal_id: DealId) -> Result<DraftStatus, DealStoreError> {
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        let draft = get_or_create_draft(&tx, deal_id)?;
        let status = draft_status(&tx, deal_id, &draft)?;
        tx.commit().map_err(db_err)?;
        Ok(status)
    }

    /// Appends a simulated event and refreshes the cached gate previews.
    ///
    /// Simulation deliberately skips gate checks so otherwise-blocked
    /// sequences can be explored.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError`] when the deal is missing or the event
    /// shape is invalid.
    pub fn draft_simulate(
        &self,
        deal_id: DealId,
        proposed: &ProposedEvent,
    ) -> Result<DraftStatus, DealStoreError> {
        if proposed.event_type == EventType::DealCreated {
            return Err(DealStoreError::Invalid(
                "DealCreated is reserved for deal creation".to_string(),
            ));
        }
        resolve_action(proposed.event_type, &proposed.payload)
            .map_err(|err| DealStoreError::Invalid(err.to_string()))?;
        let now = Timestamp::now();
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        let draft = get_or_create_draft(&tx, deal_id)?;
        let order: u32 = tx
            .query_row(
                "SELECT COUNT(*) FROM simulated_events WHERE draft_id = ?1",
                params![draft.draft_id.to_string()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        tx.execute(
            "INSERT INTO simulated_events (sim_event_id, draft_id, event_type, actor_id, \
             payload, authority_context, evidence_refs, sequence_order, created_at) VALUES (?1, \
             ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                SimulatedEventId::generate().to_string(),
                draft.draft_id.to_string(),
                enum_to_sql(&proposed.event_type)?,
                proposed.actor_id.map(|id| id.to_string()),
                json_to_sql(&proposed.payload)?,
                json_to_sql(&proposed.authority_context)?,
                json_to_sql(&proposed.evidence_refs)?,
                order,
                now.render()
            ],
        )
        .map_err(db_err)?;
        refresh_gate_previews(&tx, deal_id, &draft)?;
        let status = draft_status(&tx, deal_id, &draft)?;
        tx.commit().map_err(db_err)?;
        Ok(status)
    }

    /// Returns the cached gate previews and the composite projection.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the deal has no sandbox.
    pub fn draft_gates(&self, deal_id: DealId) -> Result<GatePreviewSet, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let draft = fetch_draft(&guard, deal_id)?;
        let composite = composite_source(&guard, deal_id, &draft)?;
        let projection = composite.projection();
        let mut statement = guard
            .prepare(
                "SELECT preview_id, draft_id, action, is_blocked, reasons, next_steps FROM \
                 projection_gates WHERE draft_id = ?1 ORDER BY action",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![draft.draft_id.to_string()], read_preview_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let gates =
            rows.into_iter().map(TryInto::try_into).collect::<Result<Vec<GatePreview>, _>>()?;
        Ok(GatePreviewSet {
            projection: ProjectionSummary {
                state: projection.state,
                stress_mode: projection.stress_mode,
            },
            gates,
        })
    }

    /// Compares the committed deal against the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the deal has no sandbox.
    pub fn draft_diff(&self, deal_id: DealId) -> Result<DraftDiff, DealStoreError> {
        let guard = self.lock()?;
        fetch_deal(&guard, deal_id)?;
        let draft = fetch_draft(&guard, deal_id)?;
        let committed_source = load_replay_source(&guard, deal_id, None)?;
        let committed_projection = committed_source.projection();
        let simulated = load_simulated(&guard, draft.draft_id)?;
        let composite = composite_source(&guard, deal_id, &draft)?;
        let composite_projection = composite.projection();
        Ok(DraftDiff {
            committed: CommittedSummary {
                state: committed_projection.state,
                stress_mode: committed_projection.stress_mode,
                events_count: u64::try_from(committed_source.events.len()).unwrap_or(u64::MAX),
            },
            draft: DraftSummary {
                state: composite_projection.state,
                stress_mode: composite_projection.stress_mode,
                simulated_events_count: u32::try_from(simulated.len()).unwrap_or(u32::MAX),
            },
            delta_events: simulated,
        })
    }

    /// Deletes the sandbox and all simulated state.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the deal has no sandbox.
    pub fn draft_revert(&self, deal_id: DealId) -> Result<DealRecord, DealStoreError> {
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        let draft = fetch_draft(&tx, deal_id)?;
        delete_draft(&tx, draft.draft_id)?;
        tx.execute(
            "UPDATE deals SET is_draft = 0 WHERE deal_id = ?1",
            params![deal_id.to_string()],
        )
        .map_err(db_err)?;
        let deal = fetch_deal(&tx, deal_id)?;
        tx.commit().map_err(db_err)?;
        Ok(deal)
    }

    /// Replays the sandbox onto the committed ledger and clears it.
    ///
    /// By contract the caller has confirmed intent, so simulated events are
    /// written verbatim without re-running gates.
    ///
    /// # Errors
    ///
    /// Returns [`DealStoreError::NotFound`] when the deal has no sandbox.
    pub fn draft_commit(
        &self,
        deal_id: DealId,
    ) -> Result<(DealRecord, Vec<EventRecord>), DealStoreError> {
        let mut guard = self.lock()?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        fetch_deal(&tx, deal_id)?;
        let draft = fetch_draft(&tx, deal_id)?;
        let simulated = load_simulated(&tx, draft.draft_id)?;
        let mut committed = Vec::with_capacity(simulated.len());
        for event in &simulated {
            let proposed = ProposedEvent {
                event_type: event.event_type,
                actor_id: event.actor_id,
                payload: event.payload.clone(),
                authority_context: event.authority_context.clone(),
                evidence_refs: event.evidence_refs.clone(),
            };
            committed.push(append_chain_event(&tx, deal_id, &proposed)?);
        }
        delete_draft(&tx, draft.draft_id)?;
        tx.execute(
            "UPDATE deals SET is_draft = 0 WHERE deal_id = ?1",
            params![deal_id.to_string()],
        )
        .map_err(db_err)?;
        let deal = recompute_deal(&tx, deal_id)?;
        tx.commit().map_err(db_err)?;
        Ok((deal, committed))
    }
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), DealStoreError> {
    let Some(parent) = path.parent() else {
        return Err(DealStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| DealStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), DealStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(DealStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(DealStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(DealStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durability pragmas applied.
fn open_connection(config: &DealStoreConfig) -> Result<Connection, DealStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_err)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_err)?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), DealStoreError> {
    let tx = connection.transaction().map_err(db_err)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_err)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_err)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_err)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS deals (
                    deal_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    state TEXT NOT NULL,
                    stress_mode TEXT NOT NULL,
                    is_draft INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS actors (
                    actor_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    actor_type TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS roles (
                    role_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    org_id TEXT
                );
                CREATE TABLE IF NOT EXISTS actor_roles (
                    actor_id TEXT NOT NULL REFERENCES actors(actor_id),
                    role_id TEXT NOT NULL REFERENCES roles(role_id),
                    deal_id TEXT NOT NULL REFERENCES deals(deal_id),
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (actor_id, role_id, deal_id)
                );
                CREATE TABLE IF NOT EXISTS authority_rules (
                    deal_id TEXT NOT NULL REFERENCES deals(deal_id),
                    action TEXT NOT NULL,
                    threshold INTEGER NOT NULL,
                    roles_allowed TEXT NOT NULL,
                    roles_required TEXT NOT NULL,
                    PRIMARY KEY (deal_id, action)
                );
                CREATE TABLE IF NOT EXISTS events (
                    event_id TEXT PRIMARY KEY,
                    deal_id TEXT NOT NULL REFERENCES deals(deal_id),
                    event_type TEXT NOT NULL,
                    actor_id TEXT,
                    payload TEXT NOT NULL,
                    authority_context TEXT NOT NULL,
                    evidence_refs TEXT NOT NULL,
                    sequence_number INTEGER NOT NULL,
                    previous_event_hash TEXT,
                    event_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (deal_id, sequence_number)
                );
                CREATE INDEX IF NOT EXISTS idx_events_deal_seq
                    ON events (deal_id, sequence_number);
                CREATE TABLE IF NOT EXISTS materials (
                    material_id TEXT PRIMARY KEY,
                    deal_id TEXT NOT NULL REFERENCES deals(deal_id),
                    material_type TEXT NOT NULL,
                    truth_class TEXT NOT NULL,
                    data TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS material_revisions (
                    revision_id TEXT PRIMARY KEY,
                    material_id TEXT NOT NULL REFERENCES materials(material_id),
                    deal_id TEXT NOT NULL REFERENCES deals(deal_id),
                    material_type TEXT NOT NULL,
                    truth_class TEXT NOT NULL,
                    data TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_revisions_material
                    ON material_revisions (material_id, created_at);
                CREATE TABLE IF NOT EXISTS artifacts (
                    artifact_id TEXT PRIMARY KEY,
                    deal_id TEXT NOT NULL REFERENCES deals(deal_id),
                    filename TEXT NOT NULL,
                    mime_type TEXT NOT NULL,
                    size_bytes INTEGER NOT NULL,
                    sha256_hex TEXT NOT NULL UNIQUE,
                    storage_key TEXT NOT NULL,
                    uploader_id TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS artifact_links (
                    link_id TEXT PRIMARY KEY,
                    deal_id TEXT NOT NULL REFERENCES deals(deal_id),
                    artifact_id TEXT NOT NULL REFERENCES artifacts(artifact_id),
                    event_id TEXT,
                    material_id TEXT,
                    tag TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS draft_states (
                    draft_id TEXT PRIMARY KEY,
                    deal_id TEXT NOT NULL UNIQUE REFERENCES deals(deal_id),
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS simulated_events (
                    sim_event_id TEXT PRIMARY KEY,
                    draft_id TEXT NOT NULL REFERENCES draft_states(draft_id) ON DELETE CASCADE,
                    event_type TEXT NOT NULL,
                    actor_id TEXT,
                    payload TEXT NOT NULL,
                    authority_context TEXT NOT NULL,
                    evidence_refs TEXT NOT NULL,
                    sequence_order INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS projection_gates (
                    preview_id TEXT PRIMARY KEY,
                    draft_id TEXT NOT NULL REFERENCES draft_states(draft_id) ON DELETE CASCADE,
                    action TEXT NOT NULL,
                    is_blocked INTEGER NOT NULL,
                    reasons TEXT NOT NULL,
                    next_steps TEXT NOT NULL
                );",
            )
            .map_err(db_err)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(DealStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_err)?;
    Ok(())
}

// ============================================================================
// SECTION: Serialization Helpers
// ============================================================================

/// Serializes a value to a JSON column.
fn json_to_sql<T: Serialize>(value: &T) -> Result<String, DealStoreError> {
    serde_json::to_string(value).map_err(|err| DealStoreError::Invalid(err.to_string()))
}

/// Deserializes a value from a JSON column.
fn json_from_sql<T: DeserializeOwned>(raw: &str) -> Result<T, DealStoreError> {
    serde_json::from_str(raw).map_err(|err| DealStoreError::Corrupt(err.to_string()))
}

/// Serializes a wire enum to its bare string spelling.
fn enum_to_sql<T: Serialize>(value: &T) -> Result<String, DealStoreError> {
    match serde_json::to_value(value) {
        Ok(Value::String(text)) => Ok(text),
        Ok(_) => Err(DealStoreError::Invalid("enum column must serialize to a string".to_string())),
        Err(err) => Err(DealStoreError::Invalid(err.to_string())),
    }
}

/// Deserializes a wire enum from its bare string spelling.
fn enum_from_sql<T: DeserializeOwned>(raw: &str) -> Result<T, DealStoreError> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|err| DealStoreError::Corrupt(format!("bad enum column {raw}: {err}")))
}

/// Parses a UUID-backed identifier column.
fn parse_id<T>(raw: &str) -> Result<T, DealStoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|err| DealStoreError::Corrupt(format!("bad id column: {err}")))
}

/// Parses a timestamp column.
fn ts_from_sql(raw: &str) -> Result<Timestamp, DealStoreError> {
    Timestamp::parse(raw).map_err(|err| DealStoreError::Corrupt(err.to_string()))
}

// ============================================================================
// SECTION: Raw Rows
// ============================================================================

/// Raw deal row before typed conversion.
struct RawDeal {
    /// Deal identifier column.
    deal_id: String,
    /// Name column.
    name: String,
    /// State column.
    state: String,
    /// Stress mode column.
    stress_mode: String,
    /// Draft flag column.
    is_draft: i64,
    /// Creation time column.
    created_at: String,
    /// Update time column.
    updated_at: String,
}

/// Reads a deal row.
fn read_deal_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDeal> {
    Ok(RawDeal {
        deal_id: row.get(0)?,
        name: row.get(1)?,
        state: row.get(2)?,
        stress_mode: row.get(3)?,
        is_draft: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl TryFrom<RawDeal> for DealRecord {
    type Error = DealStoreError;

    fn try_from(raw: RawDeal) -> Result<Self, Self::Error> {
        Ok(Self {
            deal_id: parse_id(&raw.deal_id)?,
            name: raw.name,
            state: enum_from_sql(&raw.state)?,
            stress_mode: enum_from_sql(&raw.stress_mode)?,
            is_draft: raw.is_draft != 0,
            created_at: ts_from_sql(&raw.created_at)?,
            updated_at: ts_from_sql(&raw.updated_at)?,
        })
    }
}

/// Raw event row before typed conversion.
struct RawEvent {
    /// Event identifier column.
    event_id: String,
    /// Deal identifier column.
    deal_id: String,
    /// Event type column.
    event_type: String,
    /// Actor identifier column.
    actor_id: Option<String>,
    /// Payload column.
    payload: String,
    /// Authority context column.
    authority_context: String,
    /// Evidence refs column.
    evidence_refs: String,
    /// Sequence number column.
    sequence_number: i64,
    /// Previous hash column.
    previous_event_hash: Option<String>,
    /// Event hash column.
    event_hash: String,
    /// Creation time column.
    created_at: String,
}

/// Reads an event row.
fn read_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        event_id: row.get(0)?,
        deal_id: row.get(1)?,
        event_type: row.get(2)?,
        actor_id: row.get(3)?,
        payload: row.get(4)?,
        authority_context: row.get(5)?,
        evidence_refs: row.get(6)?,
        sequence_number: row.get(7)?,
        previous_event_hash: row.get(8)?,
        event_hash: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl TryFrom<RawEvent> for EventRecord {
    type Error = DealStoreError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let actor_id = raw.actor_id.as_deref().map(parse_id::<ActorId>).transpose()?;
        Ok(Self {
            event_id: parse_id(&raw.event_id)?,
            deal_id: parse_id(&raw.deal_id)?,
            event_type: enum_from_sql(&raw.event_type)?,
            actor_id,
            payload: json_from_sql(&raw.payload)?,
            authority_context: json_from_sql(&raw.authority_context)?,
            evidence_refs: json_from_sql(&raw.evidence_refs)?,
            sequence_number: u64::try_from(raw.sequence_number)
                .map_err(|_| DealStoreError::Corrupt("negative sequence number".to_string()))?,
            previous_event_hash: raw.previous_event_hash,
            event_hash: raw.event_hash,
            created_at: ts_from_sql(&raw.created_at)?,
        })
    }
}

/// Raw material row before typed conversion.
struct RawMaterial {
    /// Material identifier column.
    material_id: String,
    /// Deal identifier column.
    deal_id: String,
    /// Material type column.
    material_type: String,
    /// Truth class column.
    truth_class: String,
    /// Data column.
    data: String,
    /// Creation time column.
    created_at: String,
}

/// Reads a material row.
fn read_material_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMaterial> {
    Ok(RawMaterial {
        material_id: row.get(0)?,
        deal_id: row.get(1)?,
        material_type: row.get(2)?,
        truth_class: row.get(3)?,
        data: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl TryFrom<RawMaterial> for MaterialRecord {
    type Error = DealStoreError;

    fn try_from(raw: RawMaterial) -> Result<Self, Self::Error> {
        Ok(Self {
            material_id: parse_id(&raw.material_id)?,
            deal_id: parse_id(&raw.deal_id)?,
            material_type: raw.material_type,
            truth_class: enum_from_sql(&raw.truth_class)?,
            data: json_from_sql(&raw.data)?,
            created_at: ts_from_sql(&raw.created_at)?,
        })
    }
}

/// Raw material revision row before typed conversion.
struct RawRevision {
    /// Revision identifier column.
    revision_id: String,
    /// Material identifier column.
    material_id: String,
    /// Deal identifier column.
    deal_id: String,
    /// Material type column.
    material_type: String,
    /// Truth class column.
    truth_class: String,
    /// Data column.
    data: String,
    /// Creation time column.
    created_at: String,
}

/// Reads a material revision row.
fn read_revision_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRevision> {
    Ok(RawRevision {
        revision_id: row.get(0)?,
        material_id: row.get(1)?,
        deal_id: row.get(2)?,
        material_type: row.get(3)?,
        truth_class: row.get(4)?,
        data: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl TryFrom<RawRevision> for MaterialRevisionRecord {
    type Error = DealStoreError;

    fn try_from(raw: RawRevision) -> Result<Self, Self::Error> {
        Ok(Self {
            revision_id: parse_id::<RevisionId>(&raw.revision_id)?,
            material_id: parse_id(&raw.material_id)?,
            deal_id: parse_id(&raw.deal_id)?,
            material_type: raw.material_type,
            truth_class: enum_from_sql(&raw.truth_class)?,
            data: json_from_sql(&raw.data)?,
            created_at: ts_from_sql(&raw.created_at)?,
        })
    }
}

/// Raw artifact row before typed conversion.
struct RawArtifact {
    /// Artifact identifier column.
    artifact_id: String,
    /// Deal identifier column.
    deal_id: String,
    /// Filename column.
    filename: String,
    /// MIME type column.
    mime_type: String,
    /// Size column.
    size_bytes: i64,
    /// Digest column.
    sha256_hex: String,
    /// Storage key column.
    storage_key: String,
    /// Uploader column.
    uploader_id: Option<String>,
    /// Creation time column.
    created_at: String,
}

/// Reads an artifact row.
fn read_artifact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawArtifact> {
    Ok(RawArtifact {
        artifact_id: row.get(0)?,
        deal_id: row.get(1)?,
        filename: row.get(2)?,
        mime_type: row.get(3)?,
        size_bytes: row.get(4)?,
        sha256_hex: row.get(5)?,
        storage_key: row.get(6)?,
        uploader_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl TryFrom<RawArtifact> for ArtifactRecord {
    type Error = DealStoreError;

    fn try_from(raw: RawArtifact) -> Result<Self, Self::Error> {
        let uploader_id = raw.uploader_id.as_deref().map(parse_id::<ActorId>).transpose()?;
        Ok(Self {
            artifact_id: parse_id(&raw.artifact_id)?,
            deal_id: parse_id(&raw.deal_id)?,
            filename: raw.filename,
            mime_type: raw.mime_type,
            size_bytes: u64::try_from(raw.size_bytes)
                .map_err(|_| DealStoreError::Corrupt("negative artifact size".to_string()))?,
            sha256_hex: raw.sha256_hex,
            storage_key: raw.storage_key,
            uploader_id,
            created_at: ts_from_sql(&raw.created_at)?,
        })
    }
}

/// Raw simulated event row before typed conversion.
struct RawSimulated {
    /// Simulated event identifier column.
    sim_event_id: String,
    /// Draft identifier column.
    draft_id: String,
    /// Event type column.
    event_type: String,
    /// Actor identifier column.
    actor_id: Option<String>,
    /// Payload column.
    payload: String,
    /// Authority context column.
    authority_context: String,
    /// Evidence refs column.
    evidence_refs: String,
    /// Order column.
    sequence_order: i64,
    /// Creation time column.
    created_at: String,
}

/// Reads a simulated event row.
fn read_simulated_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSimulated> {
    Ok(RawSimulated {
        sim_event_id: row.get(0)?,
        draft_id: row.get(1)?,
        event_type: row.get(2)?,
        actor_id: row.get(3)?,
        payload: row.get(4)?,
        authority_context: row.get(5)?,
        evidence_refs: row.get(6)?,
        sequence_order: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl TryFrom<RawSimulated> for SimulatedEventRecord {
    type Error = DealStoreError;

    fn try_from(raw: RawSimulated) -> Result<Self, Self::Error> {
        let actor_id = raw.actor_id.as_deref().map(parse_id::<ActorId>).transpose()?;
        Ok(Self {
            simulated_event_id: parse_id(&raw.sim_event_id)?,
            draft_id: parse_id(&raw.draft_id)?,
            event_type: enum_from_sql(&raw.event_type)?,
            actor_id,
            payload: json_from_sql(&raw.payload)?,
            authority_context: json_from_sql(&raw.authority_context)?,
            evidence_refs: json_from_sql(&raw.evidence_refs)?,
            sequence_order: u32::try_from(raw.sequence_order)
                .map_err(|_| DealStoreError::Corrupt("negative sequence order".to_string()))?,
            created_at: ts_from_sql(&raw.created_at)?,
        })
    }
}

/// Raw gate preview row before typed conversion.
struct RawPreview {
    /// Preview identifier column.
    preview_id: String,
    /// Draft identifier column.
    draft_id: String,
    /// Action column.
    action: String,
    /// Blocked flag column.
    is_blocked: i64,
    /// Reasons column.
    reasons: String,
    /// Next steps column.
    next_steps: String,
}

/// Reads a gate preview row.
fn read_preview_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPreview> {
    Ok(RawPreview {
        preview_id: row.get(0)?,
        draft_id: row.get(1)?,
        action: row.get(2)?,
        is_blocked: row.get(3)?,
        reasons: row.get(4)?,
        next_steps: row.get(5)?,
    })
}

impl TryFrom<RawPreview> for GatePreview {
    type Error = DealStoreError;

    fn try_from(raw: RawPreview) -> Result<Self, Self::Error> {
        Ok(Self {
            preview_id: parse_id::<GatePreviewId>(&raw.preview_id)?,
            draft_id: parse_id(&raw.draft_id)?,
            action: enum_from_sql(&raw.action)?,
            is_blocked: raw.is_blocked != 0,
            reasons: json_from_sql(&raw.reasons)?,
            next_steps: json_from_sql(&raw.next_steps)?,
        })
    }
}

// ============================================================================
// SECTION: Query Helpers
// ============================================================================

/// Fetches a deal row or reports not-found.
fn fetch_deal(connection: &Connection, deal_id: DealId) -> Result<DealRecord, DealStoreError> {
    let row = connection
        .query_row(
            "SELECT deal_id, name, state, stress_mode, is_draft, created_at, updated_at FROM \
             deals WHERE deal_id = ?1",
            params![deal_id.to_string()],
            read_deal_row,
        )
        .optional()
        .map_err(db_err)?;
    row.map_or_else(|| Err(DealStoreError::NotFound(format!("deal {deal_id}"))), TryInto::try_into)
}

/// Ensures an actor row exists.
fn ensure_actor_exists(connection: &Connection, actor_id: ActorId) -> Result<(), DealStoreError> {
    let found: Option<String> = connection
        .query_row(
            "SELECT actor_id FROM actors WHERE actor_id = ?1",
            params![actor_id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if found.is_none() {
        return Err(DealStoreError::NotFound(format!("actor {actor_id}")));
    }
    Ok(())
}

/// Gets or creates the role row for a role name.
fn role_row(connection: &Connection, role: RoleName) -> Result<RoleId, DealStoreError> {
    let existing: Option<String> = connection
        .query_row("SELECT role_id FROM roles WHERE name = ?1", params![role.as_str()], |row| {
            row.get(0)
        })
        .optional()
        .map_err(db_err)?;
    if let Some(raw) = existing {
        return parse_id(&raw);
    }
    let role_id = RoleId::generate();
    connection
        .execute(
            "INSERT INTO roles (role_id, name, org_id) VALUES (?1, ?2, NULL)",
            params![role_id.to_string(), role.as_str()],
        )
        .map_err(db_err)?;
    Ok(role_id)
}

/// Inserts a deal-scoped role grant (idempotent per role).
fn grant_role_tx(
    connection: &Connection,
    deal_id: DealId,
    actor_id: ActorId,
    role: RoleName,
    now: Timestamp,
) -> Result<(), DealStoreError> {
    let role_id = role_row(connection, role)?;
    connection
        .execute(
            "INSERT OR IGNORE INTO actor_roles (actor_id, role_id, deal_id, created_at) VALUES \
             (?1, ?2, ?3, ?4)",
            params![actor_id.to_string(), role_id.to_string(), deal_id.to_string(), now.render()],
        )
        .map_err(db_err)?;
    Ok(())
}

/// Fetches an actor with roles aggregated for a deal.
fn fetch_actor(
    connection: &Connection,
    deal_id: DealId,
    actor_id: ActorId,
) -> Result<ActorWithRoles, DealStoreError> {
    let raw: Option<(String, String, String, String)> = connection
        .query_row(
            "SELECT actor_id, name, actor_type, created_at FROM actors WHERE actor_id = ?1",
            params![actor_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((raw_id, name, actor_type, created_at)) = raw else {
        return Err(DealStoreError::NotFound(format!("actor {actor_id}")));
    };
    let mut statement = connection
        .prepare(
            "SELECT r.name FROM actor_roles ar JOIN roles r ON r.role_id = ar.role_id WHERE \
             ar.actor_id = ?1 AND ar.deal_id = ?2 ORDER BY r.name",
        )
        .map_err(db_err)?;
    let names = statement
        .query_map(params![actor_id.to_string(), deal_id.to_string()], |row| {
            row.get::<_, String>(0)
        })
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    let mut roles = Vec::with_capacity(names.len());
    for raw_role in names {
        roles.push(enum_from_sql::<RoleName>(&raw_role)?);
    }
    Ok(ActorWithRoles {
        actor: ActorRecord {
            actor_id: parse_id(&raw_id)?,
            name,
            actor_type: enum_from_sql::<ActorType>(&actor_type)?,
            created_at: ts_from_sql(&created_at)?,
        },
        roles,
    })
}

/// Fetches a material scoped to a deal.
fn fetch_material(
    connection: &Connection,
    deal_id: DealId,
    material_id: MaterialId,
) -> Result<MaterialRecord, DealStoreError> {
    let row = connection
        .query_row(
            "SELECT material_id, deal_id, material_type, truth_class, data, created_at FROM \
             materials WHERE material_id = ?1 AND deal_id = ?2",
            params![material_id.to_string(), deal_id.to_string()],
            read_material_row,
        )
        .optional()
        .map_err(db_err)?;
    row.map_or_else(
        || Err(DealStoreError::NotFound(format!("material {material_id}"))),
        TryInto::try_into,
    )
}

/// Inserts a material revision row.
fn insert_revision(
    connection: &Connection,
    deal_id: DealId,
    material_id: MaterialId,
    material_type: &str,
    truth_class: TruthClass,
    data: &Value,
    now: Timestamp,
) -> Result<(), DealStoreError> {
    connection
        .execute(
            "INSERT INTO material_revisions (revision_id, material_id, deal_id, material_type, \
             truth_class, data, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                RevisionId::generate().to_string(),
                material_id.to_string(),
                deal_id.to_string(),
                material_type,
                enum_to_sql(&truth_class)?,
                json_to_sql(data)?,
                now.render()
            ],
        )
        .map_err(db_err)?;
    Ok(())
}

/// Fetches an artifact row or reports not-found.
fn fetch_artifact(
    connection: &Connection,
    artifact_id: ArtifactId,
) -> Result<ArtifactRecord, DealStoreError> {
    let row = connection
        .query_row(
            "SELECT artifact_id, deal_id, filename, mime_type, size_bytes, sha256_hex, \
             storage_key, uploader_id, created_at FROM artifacts WHERE artifact_id = ?1",
            params![artifact_id.to_string()],
            read_artifact_row,
        )
        .optional()
        .map_err(db_err)?;
    row.map_or_else(
        || Err(DealStoreError::NotFound(format!("artifact {artifact_id}"))),
        TryInto::try_into,
    )
}

/// Finds an artifact by payload hash.
fn find_artifact_by_hash(
    connection: &Connection,
    sha256_hex: &str,
) -> Result<Option<ArtifactRecord>, DealStoreError> {
    let row = connection
        .query_row(
            "SELECT artifact_id, deal_id, filename, mime_type, size_bytes, sha256_hex, \
             storage_key, uploader_id, created_at FROM artifacts WHERE sha256_hex = ?1",
            params![sha256_hex],
            read_artifact_row,
        )
        .optional()
        .map_err(db_err)?;
    row.map(TryInto::try_into).transpose()
}

/// Checks a link target belongs to the artifact's deal.
fn check_same_deal(
    owner: Option<&str>,
    deal_id: DealId,
    kind: &str,
) -> Result<(), DealStoreError> {
    match owner {
        None => Err(DealStoreError::NotFound(format!("{kind} reference"))),
        Some(raw) if raw == deal_id.to_string() => Ok(()),
        Some(_) => {
            Err(DealStoreError::Invalid(format!("{kind} belongs to a different deal")))
        }
    }
}

/// Loads artifact links for a deal at or before an instant.
fn load_links(
    connection: &Connection,
    deal_id: DealId,
    at: Timestamp,
) -> Result<Vec<ArtifactLinkRecord>, DealStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT link_id, deal_id, artifact_id, event_id, material_id, tag, created_at FROM \
             artifact_links WHERE deal_id = ?1 AND created_at <= ?2 ORDER BY created_at, link_id",
        )
        .map_err(db_err)?;
    let raw_rows = statement
        .query_map(params![deal_id.to_string(), at.render()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    let mut links = Vec::with_capacity(raw_rows.len());
    for (link_id, raw_deal, artifact_id, event_id, material_id, tag, created_at) in raw_rows {
        links.push(ArtifactLinkRecord {
            link_id: parse_id(&link_id)?,
            deal_id: parse_id(&raw_deal)?,
            artifact_id: parse_id(&artifact_id)?,
            event_id: event_id.as_deref().map(parse_id::<EventId>).transpose()?,
            material_id: material_id.as_deref().map(parse_id::<MaterialId>).transpose()?,
            tag,
            created_at: ts_from_sql(&created_at)?,
        });
    }
    Ok(links)
}

/// Indicates whether evidence references name an artifact by id or digest.
fn references_artifact(evidence_refs: &[String], artifact: &ArtifactRecord) -> bool {
    let id = artifact.artifact_id.to_string();
    evidence_refs.iter().any(|reference| reference == &id || reference == &artifact.sha256_hex)
}

/// Indicates whether a material's data references an artifact.
fn material_references_artifact(data: &Value, artifact: &ArtifactRecord) -> bool {
    data.get("evidenceRefs").and_then(Value::as_array).is_some_and(|refs| {
        let id = artifact.artifact_id.to_string();
        refs.iter()
            .filter_map(Value::as_str)
            .any(|reference| reference == id || reference == artifact.sha256_hex)
    })
}

// ============================================================================
// SECTION: Chain Append
// ============================================================================

/// Appends one event to the deal's hash chain inside the open transaction.
fn append_chain_event(
    connection: &Connection,
    deal_id: DealId,
    proposed: &ProposedEvent,
) -> Result<EventRecord, DealStoreError> {
    let payload_bytes = json_to_sql(&proposed.payload)?;
    if payload_bytes.len() > MAX_EVENT_PAYLOAD_BYTES {
        return Err(DealStoreError::Invalid(format!(
            "payload exceeds size limit: {} bytes (max {MAX_EVENT_PAYLOAD_BYTES})",
            payload_bytes.len()
        )));
    }
    let head: Option<(i64, String)> = connection
        .query_row(
            "SELECT sequence_number, event_hash FROM events WHERE deal_id = ?1 ORDER BY \
             sequence_number DESC LIMIT 1",
            params![deal_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    let (previous_seq, previous_hash) = match head {
        None => (0_u64, None),
        Some((seq, hash)) => (
            u64::try_from(seq)
                .map_err(|_| DealStoreError::Corrupt("negative sequence number".to_string()))?,
            Some(hash),
        ),
    };
    let sequence_number = previous_seq
        .checked_add(1)
        .ok_or_else(|| DealStoreError::Corrupt("sequence number overflow".to_string()))?;
    let created_at = Timestamp::now();
    let chain_payload = ChainPayload {
        deal_id,
        sequence_number,
        event_type: proposed.event_type,
        payload: &proposed.payload,
        previous_hash: previous_hash.as_deref(),
        timestamp: created_at,
    };
    let digest =
        compute_event_hash(&chain_payload).map_err(|err| DealStoreError::Invalid(err.to_string()))?;
    let event_id = EventId::generate();
    connection
        .execute(
            "INSERT INTO events (event_id, deal_id, event_type, actor_id, payload, \
             authority_context, evidence_refs, sequence_number, previous_event_hash, event_hash, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                event_id.to_string(),
                deal_id.to_string(),
                enum_to_sql(&proposed.event_type)?,
                proposed.actor_id.map(|id| id.to_string()),
                payload_bytes,
                json_to_sql(&proposed.authority_context)?,
                json_to_sql(&proposed.evidence_refs)?,
                i64::try_from(sequence_number)
                    .map_err(|_| DealStoreError::Corrupt("sequence number overflow".to_string()))?,
                previous_hash,
                digest.value.clone(),
                created_at.render()
            ],
        )
        .map_err(db_err)?;
    Ok(EventRecord {
        event_id,
        deal_id,
        event_type: proposed.event_type,
        actor_id: proposed.actor_id,
        payload: proposed.payload.clone(),
        authority_context: proposed.authority_context.clone(),
        evidence_refs: proposed.evidence_refs.clone(),
        sequence_number,
        previous_event_hash: chain_payload.previous_hash.map(ToString::to_string),
        event_hash: digest.value,
        created_at,
    })
}

/// Recomputes the projection and updates the deal row.
fn recompute_deal(connection: &Connection, deal_id: DealId) -> Result<DealRecord, DealStoreError> {
    let events = load_events(connection, deal_id, None)?;
    let projection = deal_kernel_core::project(
        deal_kernel_core::Projection::initial(),
        events.iter().map(|event| event.event_type),
    );
    connection
        .execute(
            "UPDATE deals SET state = ?1, stress_mode = ?2, updated_at = ?3 WHERE deal_id = ?4",
            params![
                enum_to_sql(&projection.state)?,
                enum_to_sql(&projection.stress_mode)?,
                Timestamp::now().render(),
                deal_id.to_string()
            ],
        )
        .map_err(db_err)?;
    fetch_deal(connection, deal_id)
}

// ============================================================================
// SECTION: Replay Source Assembly
// ============================================================================

/// Loads a deal's events, optionally truncated at an instant.
fn load_events(
    connection: &Connection,
    deal_id: DealId,
    at: Option<Timestamp>,
) -> Result<Vec<EventRecord>, DealStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT event_id, deal_id, event_type, actor_id, payload, authority_context, \
             evidence_refs, sequence_number, previous_event_hash, event_hash, created_at FROM \
             events WHERE deal_id = ?1 AND (?2 IS NULL OR created_at <= ?2) ORDER BY \
             sequence_number",
        )
        .map_err(db_err)?;
    let rows = statement
        .query_map(params![deal_id.to_string(), at.map(|ts| ts.render())], read_event_row)
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Assembles the full replay source for an instant (`None` = now).
fn load_replay_source(
    connection: &Connection,
    deal_id: DealId,
    at: Option<Timestamp>,
) -> Result<ReplaySource, DealStoreError> {
    let rules = {
        let mut statement = connection
            .prepare(
                "SELECT action, threshold, roles_allowed, roles_required FROM authority_rules \
                 WHERE deal_id = ?1 ORDER BY action",
            )
            .map_err(db_err)?;
        let raw_rows = statement
            .query_map(params![deal_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut rules = Vec::with_capacity(raw_rows.len());
        for (action, threshold, roles_allowed, roles_required) in raw_rows {
            rules.push(AuthorityRule {
                deal_id,
                action: enum_from_sql(&action)?,
                threshold: u32::try_from(threshold)
                    .map_err(|_| DealStoreError::Corrupt("negative threshold".to_string()))?,
                roles_allowed: json_from_sql(&roles_allowed)?,
                roles_required: json_from_sql(&roles_required)?,
            });
        }
        rules
    };

    let events = load_events(connection, deal_id, at)?;

    let actor_roles = {
        let mut statement = connection
            .prepare(
                "SELECT ar.actor_id, r.name, ar.created_at FROM actor_roles ar JOIN roles r ON \
                 r.role_id = ar.role_id WHERE ar.deal_id = ?1 AND (?2 IS NULL OR ar.created_at \
                 <= ?2) ORDER BY ar.created_at",
            )
            .map_err(db_err)?;
        let raw_rows = statement
            .query_map(params![deal_id.to_string(), at.map(|ts| ts.render())], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut grants = Vec::with_capacity(raw_rows.len());
        for (actor_id, role, created_at) in raw_rows {
            grants.push(ActorRoleRecord {
                actor_id: parse_id(&actor_id)?,
                role: enum_from_sql(&role)?,
                deal_id,
                created_at: ts_from_sql(&created_at)?,
            });
        }
        grants
    };

    let materials = {
        let mut statement = connection
            .prepare(
                "SELECT material_id, material_type, truth_class, data, created_at FROM \
                 material_revisions WHERE deal_id = ?1 AND (?2 IS NULL OR created_at <= ?2) \
                 ORDER BY created_at, rowid",
            )
            .map_err(db_err)?;
        let raw_rows = statement
            .query_map(params![deal_id.to_string(), at.map(|ts| ts.render())], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut latest: BTreeMap<MaterialId, MaterialStateView> = BTreeMap::new();
        for (material_id, material_type, truth_class, data, created_at) in raw_rows {
            let material_id: MaterialId = parse_id(&material_id)?;
            latest.insert(material_id, MaterialStateView {
                material_id,
                material_type,
                truth_class: enum_from_sql(&truth_class)?,
                data: json_from_sql(&data)?,
                created_at: ts_from_sql(&created_at)?,
            });
        }
        latest.into_values().collect()
    };

    Ok(ReplaySource {
        rules,
        events,
        actor_roles,
        materials,
    })
}

// ============================================================================
// SECTION: Draft Helpers
// ============================================================================

/// Fetches the sandbox row for a deal.
fn fetch_draft(
    connection: &Connection,
    deal_id: DealId,
) -> Result<DraftStateRecord, DealStoreError> {
    let row: Option<(String, String)> = connection
        .query_row(
            "SELECT draft_id, created_at FROM draft_states WHERE deal_id = ?1",
            params![deal_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((draft_id, created_at)) = row else {
        return Err(DealStoreError::NotFound(format!("draft for deal {deal_id}")));
    };
    Ok(DraftStateRecord {
        draft_id: parse_id(&draft_id)?,
        deal_id,
        created_at: ts_from_sql(&created_at)?,
    })
}

/// Gets or creates the sandbox row, marking the deal as drafting.
fn get_or_create_draft(
    connection: &Connection,
    deal_id: DealId,
) -> Result<DraftStateRecord, DealStoreError> {
    match fetch_draft(connection, deal_id) {
        Ok(existing) => return Ok(existing),
        Err(DealStoreError::NotFound(_)) => {}
        Err(err) => return Err(err),
    }
    let draft = DraftStateRecord {
        draft_id: DraftId::generate(),
        deal_id,
        created_at: Timestamp::now(),
    };
    connection
        .execute(
            "INSERT INTO draft_states (draft_id, deal_id, created_at) VALUES (?1, ?2, ?3)",
            params![draft.draft_id.to_string(), deal_id.to_string(), draft.created_at.render()],
        )
        .map_err(db_err)?;
    connection
        .execute("UPDATE deals SET is_draft = 1 WHERE deal_id = ?1", params![deal_id.to_string()])
        .map_err(db_err)?;
    Ok(draft)
}

/// Loads simulated events ascending by order.
fn load_simulated(
    connection: &Connection,
    draft_id: DraftId,
) -> Result<Vec<SimulatedEventRecord>, DealStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT sim_event_id, draft_id, event_type, actor_id, payload, authority_context, \
             evidence_refs, sequence_order, created_at FROM simulated_events WHERE draft_id = ?1 \
             ORDER BY sequence_order",
        )
        .map_err(db_err)?;
    let rows = statement
        .query_map(params![draft_id.to_string()], read_simulated_row)
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Builds the committed-plus-simulated replay source for previews.
fn composite_source(
    connection: &Connection,
    deal_id: DealId,
    draft: &DraftStateRecord,
) -> Result<ReplaySource, DealStoreError> {
    let mut source = load_replay_source(connection, deal_id, None)?;
    let simulated = load_simulated(connection, draft.draft_id)?;
    let mut next_seq = source.events.last().map_or(0, |event| event.sequence_number);
    for event in simulated {
        next_seq = next_seq.saturating_add(1);
        source.events.push(EventRecord {
            event_id: EventId::from_uuid(event.simulated_event_id.as_uuid()),
            deal_id,
            event_type: event.event_type,
            actor_id: event.actor_id,
            payload: event.payload,
            authority_context: event.authority_context,
            evidence_refs: event.evidence_refs,
            sequence_number: next_seq,
            previous_event_hash: None,
            event_hash: String::new(),
            created_at: event.created_at,
        });
    }
    Ok(source)
}

/// Regenerates the cached gate previews over the composite stream.
fn refresh_gate_previews(
    connection: &Connection,
    deal_id: DealId,
    draft: &DraftStateRecord,
) -> Result<(), DealStoreError> {
    let composite = composite_source(connection, deal_id, draft)?;
    connection
        .execute(
            "DELETE FROM projection_gates WHERE draft_id = ?1",
            params![draft.draft_id.to_string()],
        )
        .map_err(db_err)?;
    for action in MATERIAL_GATED_ACTIONS {
        let event_type = EventType::gate_event_for(*action).ok_or_else(|| {
            DealStoreError::Invalid(format!("action {action} has no gate event"))
        })?;
        let context = composite.gate_context(deal_id, event_type, *action, None);
        let (is_blocked, reasons, next_steps) = match evaluate(&context) {
            GateDecision::Allowed {
                ..
            } => (false, Vec::new(), Vec::new()),
            GateDecision::Blocked {
                explain, ..
            } => (true, explain.reasons, explain.next_steps),
        };
        connection
            .execute(
                "INSERT INTO projection_gates (preview_id, draft_id, action, is_blocked, \
                 reasons, next_steps) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    GatePreviewId::generate().to_string(),
                    draft.draft_id.to_string(),
                    enum_to_sql(action)?,
                    i64::from(is_blocked),
                    json_to_sql(&reasons)?,
                    json_to_sql(&next_steps)?
                ],
            )
            .map_err(db_err)?;
    }
    Ok(())
}

/// Builds the sandbox status response.
fn draft_status(
    connection: &Connection,
    deal_id: DealId,
    draft: &DraftStateRecord,
) -> Result<DraftStatus, DealStoreError> {
    let committed_source = load_replay_source(connection, deal_id, None)?;
    let committed = committed_source.projection();
    let composite = composite_source(connection, deal_id, draft)?;
    let draft_projection = composite.projection();
    let simulated_count: u32 = connection
        .query_row(
            "SELECT COUNT(*) FROM simulated_events WHERE draft_id = ?1",
            params![draft.draft_id.to_string()],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    Ok(DraftStatus {
        draft_id: draft.draft_id,
        deal_id,
        committed: ProjectionSummary {
            state: committed.state,
            stress_mode: committed.stress_mode,
        },
        draft: ProjectionSummary {
            state: draft_projection.state,
            stress_mode: draft_projection.stress_mode,
        },
        simulated_events_count: simulated_count,
    })
}

/// Deletes the sandbox and its children.
fn delete_draft(connection: &Connection, draft_id: DraftId) -> Result<(), DealStoreError> {
    connection
        .execute(
            "DELETE FROM simulated_events WHERE draft_id = ?1",
            params![draft_id.to_string()],
        )
        .map_err(db_err)?;
    connection
        .execute(
            "DELETE FROM projection_gates WHERE draft_id = ?1",
            params![draft_id.to_string()],
        )
        .map_err(db_err)?;
    connection
        .execute("DELETE FROM draft_states WHERE draft_id = ?1", params![draft_id.to_string()])
        .map_err(db_err)?;
    Ok(())
}
