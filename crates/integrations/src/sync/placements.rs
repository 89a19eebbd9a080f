//! Placement-driven categories
//!
//! Two obligations originate from placement events on the source side:
//! a status change that qualifies the candidate for worker registration,
//! and a freshly inserted placement whose matching vacancy prospect must
//! be confirmed on the portal.

use anyhow::Result;
use log::{info, warn};
use serde_json::Value;

use super::engine::{
    CategorySync, Outcome, TenantContext, combine_outcomes, mutation_outcome, read_disposition,
    unique_entity_ids,
};
use super::workers::{WorkerSyncError, get_or_create_worker};
use crate::models::WorkItem;

/// Placements whose status changed on the source side
pub const PLACEMENT_STATUS_UPDATED: &str = "plac:status:up";
/// Placements newly inserted on the source side
pub const PLACEMENT_INSERTED: &str = "plac:ins";

const MAX_EVENTS: usize = 100;

/// Status changes: register the candidate as a worker once the placement
/// reaches the accepted status.
pub struct PlacementStatusSync;

impl CategorySync for PlacementStatusSync {
    fn category(&self) -> &'static str {
        PLACEMENT_STATUS_UPDATED
    }

    fn discover(&self, cx: &TenantContext) -> Result<Vec<WorkItem>> {
        let (status, feed) = cx
            .source
            .poll_subscription_events("placementUpdate", MAX_EVENTS)?;
        info!(
            "Got {} event(s) (http {status}) for subscription 'placementUpdate'",
            feed.events.len(),
        );

        let mut ids = Vec::new();
        for event in &feed.events {
            if event.entity_name.as_deref() == Some("Placement")
                && event.updated_properties.iter().any(|p| p == "status")
                && let Some(id) = event.entity_id
                && !ids.contains(&id)
            {
                ids.push(id);
            }
        }

        Ok(ids
            .into_iter()
            .map(|id| WorkItem::new(PLACEMENT_STATUS_UPDATED, id.to_string()))
            .collect())
    }

    fn reconcile(&self, cx: &TenantContext, item: &WorkItem) -> Result<Outcome> {
        let accepted = &cx.config.ats.accepted_placement_status;
        let query = format!("id:{} AND status:{accepted}", item.entity_id);
        let (status, result) =
            cx.source
                .search_entities("Placement", &["id", "status", "candidate"], &query)?;
        if status != 200 {
            warn!("Placement search for {} answered http {status}", item.entity_id);
            return Ok(Outcome::Retry);
        }

        if result.data.is_empty() {
            info!("Placement {} is not in status {accepted}", item.entity_id);
            return Ok(Outcome::Abandoned);
        }

        let mut outcomes = Vec::new();
        for placement in &result.data {
            let Some(candidate_id) = placement.pointer("/candidate/id").and_then(Value::as_i64)
            else {
                warn!("Placement {} carried no candidate id", item.entity_id);
                outcomes.push(Outcome::Abandoned);
                continue;
            };
            outcomes.push(worker_outcome(cx, candidate_id));
        }
        Ok(combine_outcomes(&outcomes))
    }
}

fn worker_outcome(cx: &TenantContext, candidate_id: i64) -> Outcome {
    match get_or_create_worker(cx, candidate_id) {
        Ok(_) => Outcome::Resolved,
        Err(WorkerSyncError::Rejected(status)) => {
            warn!("Worker registration for candidate {candidate_id} rejected (http {status})");
            Outcome::Abandoned
        }
        Err(error) => {
            warn!("Could not provision worker for candidate {candidate_id}: {error:#}");
            Outcome::Retry
        }
    }
}

/// Insertions: confirm the prospect that produced the placement.
pub struct PlacementInsertSync;

impl CategorySync for PlacementInsertSync {
    fn category(&self) -> &'static str {
        PLACEMENT_INSERTED
    }

    fn discover(&self, cx: &TenantContext) -> Result<Vec<WorkItem>> {
        let (status, feed) = cx
            .source
            .poll_subscription_events("placementInsert", MAX_EVENTS)?;
        info!(
            "Got {} event(s) (http {status}) for subscription 'placementInsert'",
            feed.events.len(),
        );

        Ok(unique_entity_ids(&feed.events)
            .into_iter()
            .map(|id| WorkItem::new(PLACEMENT_INSERTED, id.to_string()))
            .collect())
    }

    fn reconcile(&self, cx: &TenantContext, item: &WorkItem) -> Result<Outcome> {
        let Some(placement_id) = item.numeric_id() else {
            warn!("Malformed placement id {:?}", item.entity_id);
            return Ok(Outcome::Abandoned);
        };

        let (status, body) = cx.source.fetch_entity(
            "Placement",
            placement_id,
            &["id", "candidate", "jobOrder(externalID)"],
        )?;
        if let Some(outcome) = read_disposition(status) {
            warn!("Fetching placement {placement_id} answered http {status}");
            return Ok(outcome);
        }
        let data = body.get("data").cloned().unwrap_or(Value::Null);

        let external_id = data.pointer("/jobOrder/externalID").and_then(Value::as_str);
        let Some(vacancy_id) = external_id.and_then(|e| cx.config.portal.parse_external_id(e))
        else {
            info!("Placement {placement_id} does not belong to a portal vacancy");
            return Ok(Outcome::Abandoned);
        };

        let Some(candidate_id) = data.pointer("/candidate/id").and_then(Value::as_i64) else {
            warn!("Placement {placement_id} carried no candidate id");
            return Ok(Outcome::Abandoned);
        };

        confirm_matching_prospects(cx, placement_id, vacancy_id, candidate_id)
    }
}

/// Find the vacancy prospect belonging to this candidate and confirm it.
fn confirm_matching_prospects(
    cx: &TenantContext,
    placement_id: i64,
    vacancy_id: i64,
    candidate_id: i64,
) -> Result<Outcome> {
    let (status, prospects) = cx.target.vacancy_prospects(vacancy_id)?;
    if status != 200 {
        warn!("Fetching prospects for vacancy {vacancy_id} answered http {status}");
        return Ok(Outcome::Retry);
    }

    let worker_id = cx.config.ats.prefixed_worker_id(candidate_id);
    let matching: Vec<&Value> = prospects
        .as_array()
        .map(|list| {
            list.iter()
                .filter(|p| {
                    p.get("personExternalId").and_then(Value::as_str) == Some(worker_id.as_str())
                })
                .collect()
        })
        .unwrap_or_default();

    if matching.len() != 1 {
        warn!(
            "Expected exactly one matching prospect for placement {placement_id}, found {}",
            matching.len(),
        );
    }
    if matching.is_empty() {
        return Ok(Outcome::Abandoned);
    }

    let mut outcomes = Vec::new();
    for prospect in matching {
        let Some(prospect_id) = prospect.get("id").and_then(Value::as_i64) else {
            warn!("Prospect for worker {worker_id} carried no id");
            outcomes.push(Outcome::Abandoned);
            continue;
        };
        info!("Setting prospect {prospect_id} (worker {worker_id}) to confirmed");
        let (status, _) = cx.target.update_prospect_status(prospect_id, "CONFIRMED")?;
        if status != 204 {
            warn!("Confirming prospect {prospect_id} answered http {status}");
        }
        outcomes.push(mutation_outcome(status, 204));
    }
    Ok(combine_outcomes(&outcomes))
}
