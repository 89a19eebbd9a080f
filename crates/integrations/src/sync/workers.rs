//! Shared worker provisioning flow
//!
//! Several categories share the precondition "this candidate exists as a
//! portal worker"; this module is the single implementation. The duplicate
//! check runs first, so re-discovery from both the poll and webhook paths
//! converges without a second registration.

use anyhow::{Result, anyhow};
use log::{info, warn};
use serde_json::{Value, json};

use super::engine::TenantContext;
use crate::mapper;

/// How the worker came to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerSync {
    Existing(String),
    Created(String),
}

impl WorkerSync {
    pub fn worker_id(&self) -> &str {
        match self {
            WorkerSync::Existing(id) | WorkerSync::Created(id) => id,
        }
    }
}

/// Why the worker could not be provisioned. Callers branch on this to
/// decide between abandoning and retrying.
#[derive(Debug, thiserror::Error)]
pub enum WorkerSyncError {
    /// The portal refused the registration; re-submitting the same data
    /// cannot succeed (duplicate email and the like)
    #[error("worker registration rejected with http {0}")]
    Rejected(u16),
    /// An unexpected status from either system; worth another tick
    #[error("unexpected http {status} during {operation}")]
    Unexpected { operation: &'static str, status: u16 },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Ensure the candidate exists as a portal worker, registering it from
/// fresh source data when missing.
pub fn get_or_create_worker(
    cx: &TenantContext,
    candidate_id: i64,
) -> Result<WorkerSync, WorkerSyncError> {
    let worker_id = cx.config.ats.prefixed_worker_id(candidate_id);

    let (status, _) = cx.target.get_worker(&worker_id)?;
    match status {
        200 => {
            info!("Worker {worker_id} already exists on the portal");
            Ok(WorkerSync::Existing(worker_id))
        }
        404 => create_worker_from_candidate(cx, candidate_id),
        status => Err(WorkerSyncError::Unexpected {
            operation: "worker lookup",
            status,
        }),
    }
}

fn create_worker_from_candidate(
    cx: &TenantContext,
    candidate_id: i64,
) -> Result<WorkerSync, WorkerSyncError> {
    let ats = &cx.config.ats;

    let fields: Vec<&str> = ats.candidate_fields.iter().map(String::as_str).collect();
    let (status, body) = cx.source.fetch_entity("Candidate", candidate_id, &fields)?;
    if status != 200 {
        return Err(WorkerSyncError::Unexpected {
            operation: "candidate fetch",
            status,
        });
    }
    let candidate = body
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("candidate {candidate_id} response carried no data"))?;

    let payload = mapper::candidate_to_worker(ats, candidate);
    let (status, created) = cx.target.create_worker(&Value::Object(payload))?;
    if status != 200 {
        warn!("Cannot register worker for candidate {candidate_id}: http {status}");
        return Err(WorkerSyncError::Rejected(status));
    }

    let worker_id = created
        .get(ats.worker_id_field())
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| ats.prefixed_worker_id(candidate_id));
    info!("Portal worker {worker_id} created");

    send_registration_notification(cx, &worker_id);

    Ok(WorkerSync::Created(worker_id))
}

/// Best effort: a failed notification is logged and never rolls back the
/// registration.
fn send_registration_notification(cx: &TenantContext, worker_id: &str) {
    let payload = json!({
        "action": "notification",
        "type": "registration",
        "data": { "email": true, "sms": true }
    });
    match cx.target.trigger_action(worker_id, &payload) {
        Ok((status, _)) if (200..300).contains(&status) => {
            info!("Registration notification triggered for {worker_id}");
        }
        Ok((status, _)) => {
            warn!("Registration notification for {worker_id} answered http {status}");
        }
        Err(error) => {
            warn!("Registration notification for {worker_id} failed: {error:#}");
        }
    }
}
