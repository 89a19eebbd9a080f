//! The eventual synchronization engine
//!
//! One [`SyncEngine`] exists per (tenant, category) pair. Categories are
//! strategy objects implementing [`CategorySync`]; the engine owns the
//! uniform ledger lifecycle (discover → persist → reconcile → clear) and
//! the error-isolation rules around them.

mod engine;
mod job_orders;
mod placements;
mod vacancies;
mod workers;

pub use engine::{CategorySync, Outcome, SyncEngine, TenantContext, TickStats};
pub use job_orders::{JOB_ORDER_UPDATED, JobOrderUpdateSync};
pub use placements::{
    PLACEMENT_INSERTED, PLACEMENT_STATUS_UPDATED, PlacementInsertSync, PlacementStatusSync,
};
pub use vacancies::{
    SubmissionStatusSync, VACANCY_SUBMISSION_ACCEPTED, VACANCY_SUBMISSION_REJECTED,
    VACANCY_VENDOR_INVITED, VendorInviteSync,
};
pub use workers::{WorkerSync, WorkerSyncError, get_or_create_worker};

/// Every category this service synchronizes, in scheduling order
pub fn category_syncs() -> Vec<Box<dyn CategorySync>> {
    vec![
        Box::new(PlacementStatusSync),
        Box::new(PlacementInsertSync),
        Box::new(JobOrderUpdateSync),
        Box::new(VendorInviteSync),
        Box::new(SubmissionStatusSync::accepted()),
        Box::new(SubmissionStatusSync::rejected()),
    ]
}
