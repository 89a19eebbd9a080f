//! Push-style callbacks from the portal
//!
//! The HTTP boundary (out of scope for this crate) acknowledges receipt
//! immediately and then hands the tenant token and body to
//! [`WebhookRouter::dispatch`]. Nothing in here errors toward the caller:
//! unknown tokens, unknown `(type, action)` pairs and malformed bodies are
//! logged and dropped.

use log::{info, warn};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::mapper::{self, plain_string};
use crate::sync::{
    SyncEngine, TenantContext, VACANCY_SUBMISSION_ACCEPTED, VACANCY_SUBMISSION_REJECTED,
    VACANCY_VENDOR_INVITED, VendorInviteSync,
};

/// Token-keyed dispatcher over all configured tenants
pub struct WebhookRouter {
    tenants: Vec<Arc<TenantContext>>,
}

impl WebhookRouter {
    pub fn new(tenants: Vec<Arc<TenantContext>>) -> Self {
        Self { tenants }
    }

    /// Dispatch one callback, keyed by the lower-cased concatenation of
    /// `type` and `action`.
    pub fn dispatch(&self, token: &str, payload: &Value) {
        let Some(cx) = self
            .tenants
            .iter()
            .find(|cx| cx.config.webhook_token == token)
        else {
            warn!("No integration for the provided webhook token");
            return;
        };

        let kind = payload.get("type").and_then(Value::as_str).unwrap_or_default();
        let action = payload.get("action").and_then(Value::as_str).unwrap_or_default();
        let key = format!("{kind}{action}").to_lowercase();
        info!("Webhook '{key}' for {}", cx.config.name);

        match key.as_str() {
            "workerupdate" => worker_updated(cx, payload),
            "vacancyvendorinvited" => vendor_invited(cx, payload),
            "vacancysubmissionstatuschanged" => submission_status_changed(cx, payload),
            _ => warn!("No action handler for webhook '{key}'"),
        }
    }
}

/// A vendor invitation becomes a pending job-order obligation; on top of
/// waiting for the next tick, one immediate best-effort reconciliation
/// runs now.
fn vendor_invited(cx: &Arc<TenantContext>, payload: &Value) {
    let Some(vacancy_id) = payload.get("id").map(plain_string) else {
        warn!("Vendor invitation carried no vacancy id");
        return;
    };

    if let Err(error) = cx.ledger.upsert(VACANCY_VENDOR_INVITED, &vacancy_id, None) {
        warn!("Could not persist vendor invitation {vacancy_id}: {error:#}");
        return;
    }
    info!("Persisted vendor invitation for vacancy {vacancy_id}");

    SyncEngine::new(cx.clone(), Box::new(VendorInviteSync)).reconcile_pending();
}

/// A submission decision becomes a pending status-mirror obligation,
/// keyed by the submission and carrying the ids reconciliation will need.
fn submission_status_changed(cx: &Arc<TenantContext>, payload: &Value) {
    let status = payload
        .get("submissionStatus")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let category = match status {
        "ACCEPTED" => VACANCY_SUBMISSION_ACCEPTED,
        "REJECTED" => VACANCY_SUBMISSION_REJECTED,
        other => {
            warn!("Not a vacancy submission status we are interested in: {other:?}");
            return;
        }
    };

    let Some(submission_id) = payload.get("submissionId").map(plain_string) else {
        warn!("Submission status change carried no submission id");
        return;
    };

    let context = json!({
        "vacancyId": payload.get("id"),
        "workerId": payload.get("workerId"),
    });
    match cx.ledger.upsert(category, &submission_id, Some(context)) {
        Ok(()) => info!("Persisted {status} submission {submission_id}"),
        Err(error) => warn!("Could not persist submission {submission_id}: {error:#}"),
    }
}

/// Direct path, no ledger: mirror a changed worker back onto its source
/// candidate. Failures are logged, never retried.
fn worker_updated(cx: &Arc<TenantContext>, payload: &Value) {
    let Some(worker_id) = payload.get("id").map(plain_string) else {
        warn!("Worker update carried no id");
        return;
    };

    let (status, worker) = match cx.target.get_worker(&worker_id) {
        Ok(result) => result,
        Err(error) => {
            warn!("Cannot fetch worker {worker_id}: {error:#}");
            return;
        }
    };
    if status != 200 {
        warn!("Could not find worker {worker_id}: http {status}");
        return;
    }
    let Some(worker) = worker.as_object() else {
        warn!("Worker {worker_id} response was not an object");
        return;
    };

    let external_id = worker
        .get(cx.config.ats.worker_id_field())
        .and_then(Value::as_str)
        .unwrap_or(&worker_id);
    let Ok(candidate_id) = cx.config.ats.strip_worker_prefix(external_id).parse::<i64>() else {
        warn!("Worker {external_id} does not map back to a candidate id");
        return;
    };

    update_candidate(cx, candidate_id, worker);
}

fn update_candidate(cx: &TenantContext, candidate_id: i64, worker: &Map<String, Value>) {
    // Only update candidates that still exist
    match cx.source.fetch_entity("Candidate", candidate_id, &["id"]) {
        Ok((200, _)) => {}
        Ok((status, _)) => {
            info!("Not updating a non-existing candidate {candidate_id} (http {status})");
            return;
        }
        Err(error) => {
            warn!("Cannot fetch candidate {candidate_id}: {error:#}");
            return;
        }
    }

    let mut body = Value::Object(mapper::worker_to_candidate(&cx.config.ats, worker));
    if let Some(defaults) = &cx.config.portal.candidate_defaults {
        overlay(&mut body, defaults);
    }

    match cx.source.update_entity("Candidate", candidate_id, &body) {
        Ok((200, _)) => info!("Candidate {candidate_id} updated"),
        Ok((status, _)) => warn!("Could not update candidate {candidate_id}: http {status}"),
        Err(error) => warn!("Could not update candidate {candidate_id}: {error:#}"),
    }
}

/// Deep-merge the configured defaults into the update body; defaults win
fn overlay(target: &mut Value, defaults: &Value) {
    match (target, defaults) {
        (Value::Object(target), Value::Object(defaults)) => {
            for (key, value) in defaults {
                overlay(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, defaults) => *target = defaults.clone(),
    }
}
