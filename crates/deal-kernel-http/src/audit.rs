// crates/deal-kernel-http/src/audit.rs
// ============================================================================
// Module: Kernel Audit Logging
// Description: Structured audit events for HTTP request handling and gates.
// Purpose: Emit redacted JSON-line audit logs without hard dependencies.
// Dependencies: deal-kernel-core, serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines audit event payloads and sinks for kernel request
//! logging. It is intentionally lightweight so deployments can route events
//! to their preferred logging pipeline without redesign. Payload bodies are
//! never logged; events carry metadata only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use deal_kernel_core::GateAction;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request outcome classification for audit logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Request succeeded.
    Ok,
    /// Request failed validation or lookup.
    ClientError,
    /// Request was refused by a gate.
    Blocked,
    /// Request failed inside the kernel.
    ServerError,
}

/// HTTP request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Response status code.
    pub status: u16,
    /// Outcome classification.
    pub outcome: RequestOutcome,
    /// Handler latency in milliseconds.
    pub latency_ms: u128,
}

impl RequestAuditEvent {
    /// Creates a new request audit event with a consistent timestamp.
    #[must_use]
    pub fn new(method: String, path: String, status: u16, latency_ms: u128) -> Self {
        let outcome = match status {
            403 | 409 => RequestOutcome::Blocked,
            400..=499 => RequestOutcome::ClientError,
            500..=599 => RequestOutcome::ServerError,
            _ => RequestOutcome::Ok,
        };
        Self {
            event: "http_request",
            timestamp_ms: unix_millis(),
            method,
            path,
            status,
            outcome,
            latency_ms,
        }
    }
}

/// Gate refusal audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct GateAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Deal identifier.
    pub deal_id: String,
    /// Refused action.
    pub action: GateAction,
    /// Number of structured reasons.
    pub reason_count: usize,
    /// Indicates an authority denial.
    pub authority_denied: bool,
}

impl GateAuditEvent {
    /// Creates a new gate audit event with a consistent timestamp.
    #[must_use]
    pub fn new(
        deal_id: String,
        action: GateAction,
        reason_count: usize,
        authority_denied: bool,
    ) -> Self {
        Self {
            event: "gate_blocked",
            timestamp_ms: unix_millis(),
            deal_id,
            action,
            reason_count,
            authority_denied,
        }
    }
}

/// Returns milliseconds since the unix epoch.
fn unix_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for kernel events.
pub trait KernelAuditSink: Send + Sync {
    /// Record a request audit event.
    fn record_request(&self, event: &RequestAuditEvent);

    /// Record a gate refusal audit event.
    fn record_gate(&self, _event: &GateAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl KernelAuditSink for StderrAuditSink {
    fn record_request(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }

    fn record_gate(&self, event: &GateAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl KernelAuditSink for FileAuditSink {
    fn record_request(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }

    fn record_gate(&self, event: &GateAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl KernelAuditSink for NoopAuditSink {
    fn record_request(&self, _event: &RequestAuditEvent) {}

    fn record_gate(&self, _event: &GateAuditEvent) {}
}
