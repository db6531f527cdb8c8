// crates/deal-kernel-http/src/server.rs
// ============================================================================
// Module: Kernel HTTP Surface
// Description: Axum REST surface binding the store, gates, and exporters.
// Purpose: Expose the deal lifecycle kernel over HTTP with typed errors.
// Dependencies: deal-kernel-core, deal-kernel-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! The HTTP layer is deliberately thin: request shapes are validated here,
//! then handed to the store, which owns transactions and gate evaluation.
//! Explain blocks are returned verbatim (409 from live appends, 403 for
//! authority denials, 200 from replay); every other 4xx uses the standard
//! error envelope `{message, request}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::extract::FromRequestParts;
use axum::extract::Multipart;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::RawPathParams;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::extract::rejection::PathRejection;
use axum::http::StatusCode;
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use deal_kernel_core::ActorId;
use deal_kernel_core::ActorType;
use deal_kernel_core::ArtifactId;
use deal_kernel_core::ArtifactRecord;
use deal_kernel_core::DealId;
use deal_kernel_core::DealRecord;
use deal_kernel_core::EventId;
use deal_kernel_core::EventRecord;
use deal_kernel_core::EventType;
use deal_kernel_core::GateAction;
use deal_kernel_core::MaterialId;
use deal_kernel_core::ProposedEvent;
use deal_kernel_core::RoleName;
use deal_kernel_core::Timestamp;
use deal_kernel_core::TruthClass;
use deal_kernel_core::resolve_action;
use deal_kernel_store_sqlite::AppendOutcome;
use deal_kernel_store_sqlite::ArtifactRegistration;
use deal_kernel_store_sqlite::DealStore;
use deal_kernel_store_sqlite::DealStoreError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;

use crate::artifacts::ArtifactStore;
use crate::artifacts::safe_filename;
use crate::audit::GateAuditEvent;
use crate::audit::KernelAuditSink;
use crate::audit::RequestAuditEvent;
use crate::proofpack;
use crate::proofpack::ProofPackError;

// ============================================================================
// SECTION: Application State
// ============================================================================

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Transactional deal store.
    pub store: DealStore,
    /// Content-addressed artifact file store.
    pub artifacts: Arc<ArtifactStore>,
    /// Audit sink for request and gate events.
    pub audit: Arc<dyn KernelAuditSink>,
    /// Concurrency limiter for inflight requests.
    pub inflight: Arc<Semaphore>,
}

// ============================================================================
// SECTION: Request Echo and Errors
// ============================================================================

/// Request facts echoed inside error envelopes.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEcho {
    /// HTTP method.
    pub method: String,
    /// Full request URL (path and query).
    pub url: String,
    /// Matched path parameters.
    pub params: BTreeMap<String, String>,
    /// Raw query parameters.
    pub query: BTreeMap<String, String>,
}

/// Extractor capturing request facts for error envelopes and audit.
#[derive(Debug, Clone)]
pub struct RequestInfo(pub RequestEcho);

impl<S: Send + Sync> FromRequestParts<S> for RequestInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Infallible> {
        let params = match RawPathParams::from_request_parts(parts, state).await {
            Ok(raw) => {
                raw.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
            }
            Err(_) => BTreeMap::new(),
        };
        let query = parts.uri.query().map(parse_query).unwrap_or_default();
        Ok(Self(RequestEcho {
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            params,
            query,
        }))
    }
}

/// Splits a raw query string into a key/value map.
fn parse_query(raw: &str) -> BTreeMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=').map_or_else(
                || (pair.to_string(), String::new()),
                |(key, value)| (key.to_string(), value.to_string()),
            )
        })
        .collect()
}

/// Standard error envelope body.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    /// Human-readable error message.
    message: String,
    /// Request facts for client-side correlation.
    request: RequestEcho,
}

/// Typed handler error carrying the response status and envelope.
#[derive(Debug)]
pub struct ApiError {
    /// Response status.
    status: StatusCode,
    /// Envelope message.
    message: String,
    /// Request facts.
    echo: RequestEcho,
}

impl ApiError {
    /// Builds an error for a request.
    #[must_use]
    pub fn new(info: &RequestInfo, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            echo: info.0.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            message: self.message,
            request: self.echo,
        };
        (self.status, Json(envelope)).into_response()
    }
}

/// Maps a store error onto the spec's status table.
fn store_error(info: &RequestInfo, err: DealStoreError) -> ApiError {
    let status = match &err {
        DealStoreError::NotFound(_) => StatusCode::NOT_FOUND,
        DealStoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        DealStoreError::Conflict(_) => StatusCode::CONFLICT,
        DealStoreError::Io(_)
        | DealStoreError::Db(_)
        | DealStoreError::Corrupt(_)
        | DealStoreError::VersionMismatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ApiError::new(info, status, err.to_string())
}

/// Unwraps a JSON body or maps the rejection to a 400 envelope.
fn parse_body<T>(
    info: &RequestInfo,
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::new(info, StatusCode::BAD_REQUEST, rejection.body_text()))
}

/// Unwraps typed path parameters or maps the rejection to a 400 envelope.
fn parse_path<T>(
    info: &RequestInfo,
    path: Result<Path<T>, PathRejection>,
) -> Result<T, ApiError> {
    path.map(|Path(value)| value)
        .map_err(|rejection| ApiError::new(info, StatusCode::BAD_REQUEST, rejection.body_text()))
}

/// Parses an optional `at` query value, defaulting to now.
fn parse_at(info: &RequestInfo, at: Option<&str>) -> Result<Timestamp, ApiError> {
    at.map_or_else(
        || Ok(Timestamp::now()),
        |raw| {
            Timestamp::parse(raw).map_err(|err| {
                ApiError::new(info, StatusCode::BAD_REQUEST, format!("bad at parameter: {err}"))
            })
        },
    )
}

// ============================================================================
// SECTION: Request Bodies
// ============================================================================

/// Body for `POST /deals`.
#[derive(Debug, Deserialize)]
struct CreateDealRequest {
    /// Deal display name.
    name: String,
}

/// Body for `POST /deals/{dealId}/actors`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateActorRequest {
    /// Actor display name.
    name: String,
    /// Principal type.
    #[serde(rename = "type")]
    actor_type: ActorType,
    /// First deal-scoped role.
    role: RoleName,
}

/// Body for `POST /deals/{dealId}/actors/{actorId}/roles`.
#[derive(Debug, Deserialize)]
struct GrantRoleRequest {
    /// Role to grant.
    role: RoleName,
}

/// Body for event intake and draft simulation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRequest {
    /// Event type name.
    #[serde(rename = "type")]
    event_type: String,
    /// Acting principal.
    actor_id: Option<ActorId>,
    /// Opaque event payload.
    payload: Option<Value>,
    /// Caller-supplied authority context.
    authority_context: Option<Value>,
    /// Evidence references.
    evidence_refs: Option<Vec<String>>,
}

/// Body for `POST /deals/{dealId}/explain`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplainRequest {
    /// Action to replay.
    action: String,
    /// Acting principal; authority is skipped when absent.
    actor_id: Option<ActorId>,
}

/// Body for `POST /deals/{dealId}/materials`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMaterialRequest {
    /// Material type name.
    #[serde(rename = "type")]
    material_type: String,
    /// Truth class.
    truth_class: TruthClass,
    /// Evidence references and metadata.
    data: Option<Value>,
}

/// Body for `PATCH /deals/{dealId}/materials/{materialId}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchMaterialRequest {
    /// Replacement truth class.
    truth_class: Option<TruthClass>,
    /// Replacement data.
    data: Option<Value>,
}

/// Body for `POST /artifacts/{artifactId}/link`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkRequest {
    /// Evidenced event.
    event_id: Option<EventId>,
    /// Evidenced material.
    material_id: Option<MaterialId>,
    /// Free-form tag.
    tag: Option<String>,
}

/// Query shape for snapshot and explain endpoints.
#[derive(Debug, Deserialize)]
struct AtQuery {
    /// Replay instant (defaults to now).
    at: Option<String>,
}

/// Query shape for the ProofPack endpoint.
#[derive(Debug, Deserialize)]
struct ProofPackQuery {
    /// Replay instant (defaults to now).
    at: Option<String>,
    /// Comma-separated action list.
    actions: Option<String>,
}

/// Response body for draft commit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DraftCommitResponse {
    /// Deal row after the replay.
    deal: DealRecord,
    /// Committed events in order.
    events: Vec<EventRecord>,
}

// ============================================================================
// SECTION: Event Intake
// ============================================================================

/// Validates an inbound event request into a proposed event.
fn validate_event(
    info: &RequestInfo,
    request: EventRequest,
    actor_required: bool,
) -> Result<ProposedEvent, ApiError> {
    let event_type = EventType::from_str(&request.event_type)
        .map_err(|err| ApiError::new(info, StatusCode::BAD_REQUEST, err.to_string()))?;
    if event_type == EventType::DealCreated {
        return Err(ApiError::new(
            info,
            StatusCode::BAD_REQUEST,
            "DealCreated is reserved for deal creation",
        ));
    }
    if actor_required && request.actor_id.is_none() {
        return Err(ApiError::new(info, StatusCode::BAD_REQUEST, "actorId is required"));
    }
    let payload = request.payload.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    if !payload.is_object() {
        return Err(ApiError::new(info, StatusCode::BAD_REQUEST, "payload must be a json object"));
    }
    resolve_action(event_type, &payload)
        .map_err(|err| ApiError::new(info, StatusCode::BAD_REQUEST, err.to_string()))?;
    Ok(ProposedEvent {
        event_type,
        actor_id: request.actor_id,
        payload,
        authority_context: request
            .authority_context
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        evidence_refs: request.evidence_refs.unwrap_or_default(),
    })
}

// ============================================================================
// SECTION: Handlers — Deals
// ============================================================================

/// Liveness probe.
async fn healthz() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Creates a deal with default rules and the genesis event.
async fn create_deal(
    State(state): State<AppState>,
    info: RequestInfo,
    body: Result<Json<CreateDealRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = parse_body(&info, body)?;
    let (deal, _genesis) =
        state.store.create_deal(&request.name).map_err(|err| store_error(&info, err))?;
    Ok((StatusCode::CREATED, Json(deal)).into_response())
}

/// Lists deals.
async fn list_deals(
    State(state): State<AppState>,
    info: RequestInfo,
) -> Result<Response, ApiError> {
    let deals = state.store.list_deals().map_err(|err| store_error(&info, err))?;
    Ok(Json(deals).into_response())
}

/// Fetches one deal.
async fn get_deal(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let deal = state.store.deal(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(deal).into_response())
}

// ============================================================================
// SECTION: Handlers — Actors
// ============================================================================

/// Creates an actor with its first role.
async fn create_actor(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
    body: Result<Json<CreateActorRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let request = parse_body(&info, body)?;
    let actor = state
        .store
        .create_actor(deal_id, &request.name, request.actor_type, request.role)
        .map_err(|err| store_error(&info, err))?;
    Ok((StatusCode::CREATED, Json(actor)).into_response())
}

/// Lists a deal's actors with aggregated roles.
async fn list_actors(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let actors = state.store.actors(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(actors).into_response())
}

/// Fetches one actor with aggregated roles.
async fn get_actor(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<(DealId, ActorId)>, PathRejection>,
) -> Result<Response, ApiError> {
    let (deal_id, actor_id) = parse_path(&info, path)?;
    let actor = state.store.actor(deal_id, actor_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(actor).into_response())
}

/// Grants an additional role.
async fn grant_role(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<(DealId, ActorId)>, PathRejection>,
    body: Result<Json<GrantRoleRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (deal_id, actor_id) = parse_path(&info, path)?;
    let request = parse_body(&info, body)?;
    let actor = state
        .store
        .grant_role(deal_id, actor_id, request.role)
        .map_err(|err| store_error(&info, err))?;
    Ok((StatusCode::CREATED, Json(actor)).into_response())
}

// ============================================================================
// SECTION: Handlers — Events
// ============================================================================

/// Appends an event through the gate pipeline.
async fn post_event(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
    body: Result<Json<EventRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let request = parse_body(&info, body)?;
    let proposed = validate_event(&info, request, true)?;
    let outcome =
        state.store.append_event(deal_id, &proposed).map_err(|err| store_error(&info, err))?;
    match outcome {
        AppendOutcome::Committed {
            event, ..
        } => Ok((StatusCode::CREATED, Json(event)).into_response()),
        AppendOutcome::Blocked {
            explain,
            authority_denied,
        } => {
            state.audit.record_gate(&GateAuditEvent::new(
                deal_id.to_string(),
                explain.action,
                explain.reasons.len(),
                authority_denied,
            ));
            let status =
                if authority_denied { StatusCode::FORBIDDEN } else { StatusCode::CONFLICT };
            Ok((status, Json(explain)).into_response())
        }
    }
}

/// Lists a deal's events in sequence order.
async fn list_events(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let events = state.store.events(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(events).into_response())
}

/// Verifies the deal's hash chain.
async fn verify_events(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let report = state.store.verify(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(report).into_response())
}

// ============================================================================
// SECTION: Handlers — Snapshot, Explain, ProofPack
// ============================================================================

/// Builds a point-in-time snapshot.
async fn get_snapshot(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
    Query(query): Query<AtQuery>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let at = parse_at(&info, query.at.as_deref())?;
    let snapshot = state.store.snapshot(deal_id, at).map_err(|err| store_error(&info, err))?;
    Ok(Json(snapshot).into_response())
}

/// Replays the gate evaluator at a point in time.
async fn post_explain(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
    Query(query): Query<AtQuery>,
    body: Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let at = parse_at(&info, query.at.as_deref())?;
    let request = parse_body(&info, body)?;
    let action = GateAction::from_str(&request.action)
        .map_err(|err| ApiError::new(&info, StatusCode::BAD_REQUEST, err.to_string()))?;
    let report = state
        .store
        .explain(deal_id, at, action, request.actor_id)
        .map_err(|err| store_error(&info, err))?;
    Ok(Json(report).into_response())
}

/// Exports a deterministic ProofPack ZIP.
async fn get_proofpack(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
    Query(query): Query<ProofPackQuery>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let at = parse_at(&info, query.at.as_deref())?;
    let mut actions = Vec::new();
    if let Some(raw) = query.actions.as_deref() {
        for token in raw.split(',').filter(|token| !token.is_empty()) {
            let action = GateAction::from_str(token)
                .map_err(|err| ApiError::new(&info, StatusCode::BAD_REQUEST, err.to_string()))?;
            actions.push(action);
        }
    }
    let bundle = proofpack::export(&state.store, deal_id, at, &actions).map_err(|err| match err {
        ProofPackError::Store(store_err) => store_error(&info, store_err),
        other => ApiError::new(&info, StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;
    let disposition = format!("attachment; filename=\"proofpack-{deal_id}.zip\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bundle.zip_bytes,
    )
        .into_response())
}

// ============================================================================
// SECTION: Handlers — Materials
// ============================================================================

/// Creates a material with its first revision.
async fn create_material(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
    body: Result<Json<CreateMaterialRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let request = parse_body(&info, body)?;
    let data = request.data.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    if !data.is_object() {
        return Err(ApiError::new(&info, StatusCode::BAD_REQUEST, "data must be a json object"));
    }
    let material = state
        .store
        .create_material(deal_id, &request.material_type, request.truth_class, data)
        .map_err(|err| store_error(&info, err))?;
    Ok((StatusCode::CREATED, Json(material)).into_response())
}

/// Lists a deal's materials.
async fn list_materials(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let materials = state.store.materials(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(materials).into_response())
}

/// Fetches one material.
async fn get_material(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<(DealId, MaterialId)>, PathRejection>,
) -> Result<Response, ApiError> {
    let (deal_id, material_id) = parse_path(&info, path)?;
    let material =
        state.store.material(deal_id, material_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(material).into_response())
}

/// Updates a material, writing a new revision.
async fn patch_material(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<(DealId, MaterialId)>, PathRejection>,
    body: Result<Json<PatchMaterialRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (deal_id, material_id) = parse_path(&info, path)?;
    let request = parse_body(&info, body)?;
    if let Some(data) = &request.data
        && !data.is_object()
    {
        return Err(ApiError::new(&info, StatusCode::BAD_REQUEST, "data must be a json object"));
    }
    let material = state
        .store
        .update_material(deal_id, material_id, request.truth_class, request.data)
        .map_err(|err| store_error(&info, err))?;
    Ok(Json(material).into_response())
}

/// Lists a material's revisions.
async fn list_revisions(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<(DealId, MaterialId)>, PathRejection>,
) -> Result<Response, ApiError> {
    let (deal_id, material_id) = parse_path(&info, path)?;
    let revisions = state
        .store
        .material_revisions(deal_id, material_id)
        .map_err(|err| store_error(&info, err))?;
    Ok(Json(revisions).into_response())
}

// ============================================================================
// SECTION: Handlers — Artifacts
// ============================================================================

/// Lists a deal's artifacts.
async fn list_artifacts(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let artifacts = state.store.artifacts(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(artifacts).into_response())
}

/// Accepts a multipart artifact upload with streaming hashing.
async fn upload_artifact(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let mut uploader_id: Option<ActorId> = None;
    let mut upload: Option<(tempfile::NamedTempFile, String, u64, String, String)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|err| {
        ApiError::new(&info, StatusCode::BAD_REQUEST, format!("bad multipart body: {err}"))
    })? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let filename = safe_filename(field.file_name().unwrap_or("upload.bin"));
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let mut spool = state.artifacts.begin_upload().map_err(|err| {
                    ApiError::new(&info, StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                })?;
                while let Some(chunk) = field.chunk().await.map_err(|err| {
                    ApiError::new(
                        &info,
                        StatusCode::BAD_REQUEST,
                        format!("upload stream failed: {err}"),
                    )
                })? {
                    spool.write_chunk(&chunk).map_err(|err| {
                        ApiError::new(&info, StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                    })?;
                }
                let (temp, sha256_hex, size_bytes) = spool.finish();
                upload = Some((temp, sha256_hex, size_bytes, filename, mime));
            }
            "uploaderId" => {
                let raw = field.text().await.map_err(|err| {
                    ApiError::new(&info, StatusCode::BAD_REQUEST, err.to_string())
                })?;
                let parsed = raw.parse::<ActorId>().map_err(|_| {
                    ApiError::new(&info, StatusCode::BAD_REQUEST, "bad uploaderId")
                })?;
                uploader_id = Some(parsed);
            }
            _ => {}
        }
    }

    let Some((temp, sha256_hex, size_bytes, filename, mime_type)) = upload else {
        return Err(ApiError::new(&info, StatusCode::BAD_REQUEST, "file part is required"));
    };

    let artifact_id = ArtifactId::generate();
    let record = ArtifactRecord {
        artifact_id,
        deal_id,
        filename: filename.clone(),
        mime_type,
        size_bytes,
        sha256_hex,
        storage_key: ArtifactStore::storage_key(
            &deal_id.to_string(),
            &artifact_id.to_string(),
            &filename,
        ),
        uploader_id,
        created_at: Timestamp::now(),
    };
    state.artifacts.persist(&record, temp).map_err(|err| {
        ApiError::new(&info, StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?;
    match state.store.register_artifact(&record) {
        Ok(ArtifactRegistration::Created(created)) => {
            Ok((StatusCode::CREATED, Json(created)).into_response())
        }
        Ok(ArtifactRegistration::Existing(existing)) => {
            remove_payload(&state.artifacts, &record);
            Ok(Json(existing).into_response())
        }
        Err(err) => {
            remove_payload(&state.artifacts, &record);
            Err(store_error(&info, err))
        }
    }
}

/// Removes a persisted payload after a failed or redundant registration.
fn remove_payload(artifacts: &ArtifactStore, record: &ArtifactRecord) {
    let path = artifacts.payload_path(record);
    let _ = std::fs::remove_file(&path);
    if let Some(parent) = path.parent() {
        let _ = std::fs::remove_dir(parent);
    }
}

/// Streams an artifact payload from disk.
async fn download_artifact(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<ArtifactId>, PathRejection>,
) -> Result<Response, ApiError> {
    let artifact_id = parse_path(&info, path)?;
    let record = state.store.artifact(artifact_id).map_err(|err| store_error(&info, err))?;
    let file = tokio::fs::File::open(state.artifacts.payload_path(&record)).await.map_err(
        |err| {
            ApiError::new(
                &info,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("artifact payload unavailable: {err}"),
            )
        },
    )?;
    let disposition = format!("attachment; filename=\"{}\"", record.filename);
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, record.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Links an artifact to an event, a material, or a tag.
async fn link_artifact(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<ArtifactId>, PathRejection>,
    body: Result<Json<LinkRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let artifact_id = parse_path(&info, path)?;
    let request = parse_body(&info, body)?;
    let link = state
        .store
        .link_artifact(artifact_id, request.event_id, request.material_id, request.tag)
        .map_err(|err| store_error(&info, err))?;
    Ok((StatusCode::CREATED, Json(link)).into_response())
}

// ============================================================================
// SECTION: Handlers — Draft Sandbox
// ============================================================================

/// Starts (or returns) the deal's draft sandbox.
async fn draft_start(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let status = state.store.draft_start(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(status).into_response())
}

/// Appends a simulated event (gate checks deliberately skipped).
async fn draft_simulate(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
    body: Result<Json<EventRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let request = parse_body(&info, body)?;
    let proposed = validate_event(&info, request, false)?;
    let status =
        state.store.draft_simulate(deal_id, &proposed).map_err(|err| store_error(&info, err))?;
    Ok(Json(status).into_response())
}

/// Returns cached gate previews and the composite projection.
async fn draft_gates(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let previews = state.store.draft_gates(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(previews).into_response())
}

/// Compares the committed deal against the sandbox.
async fn draft_diff(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let diff = state.store.draft_diff(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(diff).into_response())
}

/// Deletes the sandbox.
async fn draft_revert(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let deal = state.store.draft_revert(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(deal).into_response())
}

/// Replays the sandbox onto the committed ledger.
async fn draft_commit(
    State(state): State<AppState>,
    info: RequestInfo,
    path: Result<Path<DealId>, PathRejection>,
) -> Result<Response, ApiError> {
    let deal_id = parse_path(&info, path)?;
    let (deal, events) =
        state.store.draft_commit(deal_id).map_err(|err| store_error(&info, err))?;
    Ok(Json(DraftCommitResponse {
        deal,
        events,
    })
    .into_response())
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Serializes inflight requests through the configured semaphore.
async fn limit_inflight(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let Ok(_permit) = state.inflight.acquire().await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    next.run(request).await
}

/// Records a request audit event for every response.
async fn audit_requests(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    state.audit.record_request(&RequestAuditEvent::new(
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis(),
    ));
    response
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the kernel router with middleware applied.
#[must_use]
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/deals", post(create_deal).get(list_deals))
        .route("/deals/{deal_id}", get(get_deal))
        .route("/deals/{deal_id}/actors", post(create_actor).get(list_actors))
        .route("/deals/{deal_id}/actors/{actor_id}", get(get_actor))
        .route("/deals/{deal_id}/actors/{actor_id}/roles", post(grant_role))
        .route("/deals/{deal_id}/events", post(post_event).get(list_events))
        .route("/deals/{deal_id}/events/verify", get(verify_events))
        .route("/deals/{deal_id}/snapshot", get(get_snapshot))
        .route("/deals/{deal_id}/explain", post(post_explain))
        .route("/deals/{deal_id}/proofpack", get(get_proofpack))
        .route("/deals/{deal_id}/materials", post(create_material).get(list_materials))
        .route(
            "/deals/{deal_id}/materials/{material_id}",
            get(get_material).patch(patch_material),
        )
        .route("/deals/{deal_id}/materials/{material_id}/revisions", get(list_revisions))
        .route("/deals/{deal_id}/artifacts", post(upload_artifact).get(list_artifacts))
        .route("/artifacts/{artifact_id}/download", get(download_artifact))
        .route("/artifacts/{artifact_id}/link", post(link_artifact))
        .route("/deals/{deal_id}/draft/start", post(draft_start))
        .route("/deals/{deal_id}/draft/simulate-event", post(draft_simulate))
        .route("/deals/{deal_id}/draft/gates", get(draft_gates))
        .route("/deals/{deal_id}/draft/diff", get(draft_diff))
        .route("/deals/{deal_id}/draft/revert", post(draft_revert))
        .route("/deals/{deal_id}/draft/commit", post(draft_commit))
        .layer(middleware::from_fn_with_state(state.clone(), audit_requests))
        .layer(middleware::from_fn_with_state(state.clone(), limit_inflight))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
