//! Vacancy-driven categories
//!
//! Both obligations here arrive over the webhook boundary rather than the
//! polled feed: a vendor invitation that may need a job order created on
//! the source side, and a submission-status change that must be mirrored
//! onto the matching job submissions.

use anyhow::Result;
use log::{info, warn};
use serde_json::{Value, json};

use super::engine::{
    CategorySync, Outcome, TenantContext, combine_outcomes, mutation_outcome, read_disposition,
};
use crate::mapper::plain_string;
use crate::models::WorkItem;

/// Vacancies whose vendor was invited on the portal
pub const VACANCY_VENDOR_INVITED: &str = "vac:ven:inv";
/// Vacancy submissions accepted on the portal
pub const VACANCY_SUBMISSION_ACCEPTED: &str = "vac:sub:acc";
/// Vacancy submissions rejected on the portal
pub const VACANCY_SUBMISSION_REJECTED: &str = "vac:sub:rej";

/// Ensure a job order exists for an invited vacancy.
pub struct VendorInviteSync;

impl CategorySync for VendorInviteSync {
    fn category(&self) -> &'static str {
        VACANCY_VENDOR_INVITED
    }

    fn reconcile(&self, cx: &TenantContext, item: &WorkItem) -> Result<Outcome> {
        let Some(vacancy_id) = item.numeric_id() else {
            warn!("Malformed vacancy id {:?}", item.entity_id);
            return Ok(Outcome::Abandoned);
        };
        let external_id = cx.config.portal.external_id(vacancy_id);

        let (status, found) = cx.source.search_entities(
            "JobOrder",
            &["id"],
            &format!("externalID:{external_id}"),
        )?;
        if status != 200 {
            warn!("Job order search for {external_id} answered http {status}");
            return Ok(Outcome::Retry);
        }

        if found.total.unwrap_or(0) > 0 {
            // Already created by an earlier tick or a racing trigger
            info!("Job order already exists for {external_id}");
            return Ok(Outcome::Resolved);
        }

        create_job_order(cx, vacancy_id, &external_id)
    }
}

/// Build a job order from the vacancy and its hiring manager's contact.
fn create_job_order(cx: &TenantContext, vacancy_id: i64, external_id: &str) -> Result<Outcome> {
    let (status, vacancy) = cx.target.get_vacancy(vacancy_id)?;
    if let Some(outcome) = read_disposition(status) {
        warn!("Fetching vacancy {vacancy_id} answered http {status}");
        return Ok(outcome);
    }

    let Some(manager_email) = vacancy.pointer("/hiringManager/email").and_then(Value::as_str)
    else {
        warn!("Vacancy {vacancy_id} carries no hiring manager email");
        return Ok(Outcome::Abandoned);
    };
    let title = vacancy.get("tradeName").and_then(Value::as_str).unwrap_or_default();

    let (status, contacts) = cx.source.search_entities(
        "ClientContact",
        &["id", "clientCorporation"],
        &format!("email:{manager_email}"),
    )?;
    if status != 200 {
        warn!("Client contact search for {manager_email} answered http {status}");
        return Ok(Outcome::Retry);
    }
    if contacts.data.is_empty() {
        warn!("No client contacts for {manager_email}; job order cannot be created");
        return Ok(Outcome::Abandoned);
    }

    let total = contacts.total.unwrap_or(contacts.data.len() as i64);
    if total > 1 {
        warn!("Found {total} client contacts for {manager_email}; taking the first");
    }
    let contact = &contacts.data[0];
    let Some(contact_id) = contact.get("id").and_then(Value::as_i64) else {
        warn!("Client contact for {manager_email} carried no id");
        return Ok(Outcome::Abandoned);
    };
    let Some(corporation_id) = contact.pointer("/clientCorporation/id").and_then(Value::as_i64)
    else {
        warn!("Client contact {contact_id} carried no corporation");
        return Ok(Outcome::Abandoned);
    };

    let payload = json!({
        "clientContact": { "id": contact_id },
        "clientCorporation": { "id": corporation_id },
        "title": title,
        "externalID": external_id,
    });
    info!("Creating job order for vacancy {vacancy_id}");
    let (status, _) = cx.source.create_entity("JobOrder", &payload)?;
    if status != 200 {
        warn!("Creating job order for vacancy {vacancy_id} answered http {status}");
    }
    Ok(mutation_outcome(status, 200))
}

/// Mirror a portal submission decision onto the matching job submissions.
///
/// One strategy serves both decisions; the category key and the status it
/// writes are the only differences.
pub struct SubmissionStatusSync {
    category: &'static str,
    submission_status: &'static str,
}

impl SubmissionStatusSync {
    pub fn accepted() -> Self {
        Self {
            category: VACANCY_SUBMISSION_ACCEPTED,
            submission_status: "Offer Extended",
        }
    }

    pub fn rejected() -> Self {
        Self {
            category: VACANCY_SUBMISSION_REJECTED,
            submission_status: "Client Rejected",
        }
    }
}

impl CategorySync for SubmissionStatusSync {
    fn category(&self) -> &'static str {
        self.category
    }

    fn reconcile(&self, cx: &TenantContext, item: &WorkItem) -> Result<Outcome> {
        let payload = item.payload.clone().unwrap_or(Value::Null);

        let worker_id = payload.get("workerId").map(plain_string);
        let vacancy_id = payload.get("vacancyId").and_then(Value::as_i64);
        let (Some(worker_id), Some(vacancy_id)) = (worker_id, vacancy_id) else {
            warn!(
                "Submission {} carried no worker or vacancy context",
                item.entity_id,
            );
            return Ok(Outcome::Abandoned);
        };

        let candidate_id = cx.config.ats.strip_worker_prefix(&worker_id);
        let external_id = cx.config.portal.external_id(vacancy_id);
        let where_clause =
            format!("jobOrder.externalID='{external_id}' AND candidate.id={candidate_id}");

        let (status, result) = cx.source.query_entities(
            "JobSubmission",
            &["id", "jobOrder", "candidate"],
            &where_clause,
        )?;
        if status != 200 {
            warn!("Job submission query ({where_clause}) answered http {status}");
            return Ok(Outcome::Retry);
        }

        if result.data.is_empty() {
            warn!(
                "No matching job submissions for candidate {candidate_id} and vacancy {external_id}",
            );
            return Ok(Outcome::Abandoned);
        }
        let count = result.count.unwrap_or(result.data.len() as i64);
        if count > 1 {
            warn!(
                "Got {count} job submissions for candidate {candidate_id} and vacancy {external_id}",
            );
        }

        let mut outcomes = Vec::new();
        for submission in &result.data {
            let Some(submission_id) = submission.get("id").and_then(Value::as_i64) else {
                warn!("Job submission for {external_id} carried no id");
                outcomes.push(Outcome::Abandoned);
                continue;
            };
            info!(
                "Setting job submission {submission_id} status to '{}'",
                self.submission_status,
            );
            let (status, _) = cx.source.update_entity(
                "JobSubmission",
                submission_id,
                &json!({ "status": self.submission_status }),
            )?;
            if status != 200 {
                warn!("Updating job submission {submission_id} answered http {status}");
            }
            outcomes.push(mutation_outcome(status, 200));
        }
        Ok(combine_outcomes(&outcomes))
    }
}
