//! Job-order update category
//!
//! A changed job order that belongs to a portal vacancy obliges us to
//! submit each of its placements as a worker placement on the portal.

use anyhow::Result;
use log::{info, warn};
use serde_json::{Value, json};

use super::engine::{
    CategorySync, Outcome, TenantContext, combine_outcomes, mutation_outcome, read_disposition,
    unique_entity_ids,
};
use super::workers::{WorkerSyncError, get_or_create_worker};
use crate::models::WorkItem;

/// Job orders updated on the source side
pub const JOB_ORDER_UPDATED: &str = "joborder:up";

const MAX_EVENTS: usize = 100;

const PLACEMENT_FIELDS: [&str; 7] = [
    "id",
    "candidate",
    "dateBegin",
    "dateEnd",
    "durationWeeks",
    "payRate",
    "clientBillRate",
];

const DEFAULT_DURATION_WEEKS: f64 = 52.0;
const MILLIS_PER_DAY: i64 = 86_400_000;

pub struct JobOrderUpdateSync;

impl CategorySync for JobOrderUpdateSync {
    fn category(&self) -> &'static str {
        JOB_ORDER_UPDATED
    }

    fn discover(&self, cx: &TenantContext) -> Result<Vec<WorkItem>> {
        let (status, feed) = cx
            .source
            .poll_subscription_events("jobOrderUpdate", MAX_EVENTS)?;
        info!(
            "Got {} event(s) (http {status}) for subscription 'jobOrderUpdate'",
            feed.events.len(),
        );

        Ok(unique_entity_ids(&feed.events)
            .into_iter()
            .map(|id| WorkItem::new(JOB_ORDER_UPDATED, id.to_string()))
            .collect())
    }

    fn reconcile(&self, cx: &TenantContext, item: &WorkItem) -> Result<Outcome> {
        let Some(job_order_id) = item.numeric_id() else {
            warn!("Malformed job order id {:?}", item.entity_id);
            return Ok(Outcome::Abandoned);
        };

        let (status, body) =
            cx.source
                .fetch_entity("JobOrder", job_order_id, &["id", "placements", "externalID"])?;
        if let Some(outcome) = read_disposition(status) {
            warn!("Fetching job order {job_order_id} answered http {status}");
            return Ok(outcome);
        }
        let data = body.get("data").cloned().unwrap_or(Value::Null);

        let external_id = data.get("externalID").and_then(Value::as_str);
        let Some(vacancy_id) = external_id.and_then(|e| cx.config.portal.parse_external_id(e))
        else {
            info!("Job order {job_order_id} does not belong to a portal vacancy");
            return Ok(Outcome::Abandoned);
        };

        let total = data
            .pointer("/placements/total")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if total == 0 {
            info!("Job order {job_order_id} has no placements");
            return Ok(Outcome::Abandoned);
        }

        let mut outcomes = Vec::new();
        if let Some(placements) = data.pointer("/placements/data").and_then(Value::as_array) {
            for placement in placements {
                let Some(placement_id) = placement.get("id").and_then(Value::as_i64) else {
                    warn!("Job order {job_order_id} listed a placement without an id");
                    outcomes.push(Outcome::Abandoned);
                    continue;
                };
                info!("Processing placement {placement_id} for job order {job_order_id}");
                outcomes.push(submit_placement(cx, vacancy_id, placement_id)?);
            }
        }
        Ok(combine_outcomes(&outcomes))
    }
}

/// Fetch a placement's details and submit its candidate as a worker
/// placement against the vacancy.
fn submit_placement(cx: &TenantContext, vacancy_id: i64, placement_id: i64) -> Result<Outcome> {
    let (status, body) = cx
        .source
        .fetch_entity("Placement", placement_id, &PLACEMENT_FIELDS)?;
    if let Some(outcome) = read_disposition(status) {
        warn!("Fetching placement {placement_id} answered http {status}");
        return Ok(outcome);
    }
    let data = body.get("data").cloned().unwrap_or(Value::Null);

    let Some(candidate_id) = data.pointer("/candidate/id").and_then(Value::as_i64) else {
        warn!("Placement {placement_id} carried no candidate id");
        return Ok(Outcome::Abandoned);
    };
    let Some(date_begin) = data.get("dateBegin").and_then(Value::as_i64) else {
        warn!("Placement {placement_id} carried no start date");
        return Ok(Outcome::Abandoned);
    };

    let worker = match get_or_create_worker(cx, candidate_id) {
        Ok(worker) => worker,
        Err(WorkerSyncError::Rejected(status)) => {
            warn!("Worker registration for candidate {candidate_id} rejected (http {status})");
            return Ok(Outcome::Abandoned);
        }
        Err(error) => {
            warn!("Cannot submit worker to placement: {error:#}");
            return Ok(Outcome::Retry);
        }
    };

    let payload = json!({
        "personId": worker.worker_id(),
        "vacancyDetailId": vacancy_id,
        "startDate": format_date(date_begin),
        "finishDate": finish_date(date_begin, &data),
        "rates": [
            {
                "name": "rate",
                "payRate": data.get("payRate").cloned().unwrap_or(Value::Null),
                "chargeTotal": data.get("clientBillRate").cloned().unwrap_or(Value::Null),
                "payType": "CONTRACT",
                "rateType": "HOURLY"
            }
        ]
    });

    let (status, response) = cx.target.place_worker(&payload)?;
    if status == 201 {
        info!(
            "Worker {} placed successfully (prospect {})",
            worker.worker_id(),
            response.get("id").cloned().unwrap_or(Value::Null),
        );
    } else {
        warn!(
            "Could not place worker {} (http {status}): {}",
            worker.worker_id(),
            response.get("message").and_then(Value::as_str).unwrap_or(""),
        );
    }
    Ok(mutation_outcome(status, 201))
}

/// Render an epoch-millisecond timestamp as an ISO date
fn format_date(millis: i64) -> String {
    use chrono::TimeZone;
    chrono::Utc
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Canonical finish-date policy: an explicit end date wins; otherwise the
/// start date plus seven days per duration week, the duration defaulting
/// to 52 weeks.
fn finish_date(date_begin: i64, placement: &Value) -> String {
    if let Some(end) = placement.get("dateEnd").and_then(Value::as_i64) {
        return format_date(end);
    }
    let weeks = placement
        .get("durationWeeks")
        .and_then(Value::as_f64)
        .filter(|w| *w > 0.0)
        .unwrap_or(DEFAULT_DURATION_WEEKS);
    let days = (weeks * 7.0).ceil() as i64;
    format_date(date_begin + days * MILLIS_PER_DAY)
}
