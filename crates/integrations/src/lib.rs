//! Integrations crate - eventual synchronization between two staffing systems
//!
//! This crate propagates entity changes (workers, job orders, placements,
//! vacancies) between a source-side ATS and a target-side workforce portal,
//! neither of which shares a consistency boundary with the other. It
//! provides:
//! - A durable pending-update ledger (in-memory and SQLite backends)
//! - A generic per-category sync engine with poll and webhook triggers
//! - An authenticating source-system client that survives mid-flight
//!   credential expiry
//! - Declarative bidirectional field mapping between the two record shapes
//! - A per-tenant scheduler and a webhook dispatcher
//!
//! The HTTP server, process bootstrap and log formatting are the host
//! application's concern; this crate has no binary surface.

pub mod ats;
pub mod ledger;
pub mod mapper;
pub mod models;
pub mod portal;
pub mod scheduler;
pub mod sync;
pub mod webhook;

pub use ats::{AtsClient, Authenticator, Session, SessionStore, SourceSystem};
pub use ledger::{InMemoryLedger, Ledger, SqliteLedger};
pub use models::{AtsConfig, IntegrationConfig, Mappings, PortalConfig, WorkItem};
pub use portal::{PortalClient, TargetSystem};
pub use scheduler::Scheduler;
pub use sync::{
    CategorySync, Outcome, SyncEngine, TenantContext, TickStats, WorkerSync, WorkerSyncError,
    category_syncs, get_or_create_worker,
};
pub use webhook::WebhookRouter;
