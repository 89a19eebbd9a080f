//! Generic per-category synchronization engine
//!
//! One engine instance exists per (tenant, category) pair. Each tick runs
//! discovery (pull the change feed, persist work items) and then
//! reconciliation (scan the ledger, attempt each item against current
//! remote truth, remove on terminal outcomes). Failures are isolated per
//! item and per tick; nothing here ever propagates an error to the
//! scheduler.

use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;

use crate::ats::SourceSystem;
use crate::ats::api::SubscriptionEvent;
use crate::ledger::Ledger;
use crate::models::{IntegrationConfig, WorkItem};
use crate::portal::TargetSystem;

/// Terminal disposition of one reconciliation attempt.
///
/// `Resolved` and `Abandoned` both remove the item from the ledger; the
/// distinction exists for observability. `Retry` leaves the item where it
/// is; the next scheduled tick is the retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The remote-side effect is in place (or already was)
    Resolved,
    /// The item no longer qualifies or can never succeed as submitted
    Abandoned,
    /// Transient trouble; attempt again next tick
    Retry,
}

/// Everything a category strategy needs for one tenant
pub struct TenantContext {
    pub config: IntegrationConfig,
    pub source: Arc<dyn SourceSystem>,
    pub target: Arc<dyn TargetSystem>,
    pub ledger: Arc<dyn Ledger>,
}

impl TenantContext {
    /// Wire the real remote clients for one tenant. The session store is
    /// created here and shared by every engine the scheduler builds for
    /// the tenant.
    pub fn connect(config: IntegrationConfig, ledger: Arc<dyn Ledger>) -> Arc<Self> {
        let sessions = Arc::new(crate::ats::SessionStore::new());
        let source = Arc::new(crate::ats::AtsClient::new(config.ats.clone(), sessions));
        let target = Arc::new(crate::portal::PortalClient::new(config.portal.clone()));
        Arc::new(Self {
            config,
            source,
            target,
            ledger,
        })
    }
}

/// One named kind of change being synchronized.
///
/// Strategies carry the category-specific pieces (the feed name and
/// interest predicate, the qualification predicate against fresh remote
/// state, and the target mutation) while the engine owns the uniform
/// ledger lifecycle around them.
pub trait CategorySync: Send + Sync {
    /// Stable ledger key for this category
    fn category(&self) -> &'static str;

    /// Pull the change feed and return the work items to persist.
    /// Purely additive: never reads or removes from the ledger.
    /// Webhook-fed categories have nothing to poll.
    fn discover(&self, cx: &TenantContext) -> Result<Vec<WorkItem>> {
        let _ = cx;
        Ok(Vec::new())
    }

    /// Attempt to complete one item against current remote truth
    fn reconcile(&self, cx: &TenantContext, item: &WorkItem) -> Result<Outcome>;
}

/// Per-tick counters, for logging and tests
#[derive(Debug, Default, Clone)]
pub struct TickStats {
    pub discovered: usize,
    pub resolved: usize,
    pub abandoned: usize,
    pub retried: usize,
    pub errors: usize,
}

/// The discover/reconcile loop for one (tenant, category) pair
pub struct SyncEngine {
    context: Arc<TenantContext>,
    category: Box<dyn CategorySync>,
}

impl SyncEngine {
    pub fn new(context: Arc<TenantContext>, category: Box<dyn CategorySync>) -> Self {
        Self { context, category }
    }

    pub fn category(&self) -> &'static str {
        self.category.category()
    }

    /// One scheduler tick: discovery, then an independent reconciliation
    /// pass over everything pending in the category.
    pub fn tick(&self) -> TickStats {
        let mut stats = TickStats::default();
        self.run_discovery(&mut stats);
        self.run_reconciliation(&mut stats);
        stats
    }

    /// Reconciliation only, used for the immediate best-effort attempt
    /// after a webhook upsert.
    pub fn reconcile_pending(&self) -> TickStats {
        let mut stats = TickStats::default();
        self.run_reconciliation(&mut stats);
        stats
    }

    fn run_discovery(&self, stats: &mut TickStats) {
        let tenant = &self.context.config.name;
        let items = match self.category.discover(&self.context) {
            Ok(items) => items,
            Err(error) => {
                warn!("{}: discovery failed for {tenant}: {error:#}", self.category());
                stats.errors += 1;
                return;
            }
        };

        // The feed is destructive on read; persist every extracted id
        // before anything else happens to it.
        for item in items {
            match self
                .context
                .ledger
                .upsert(&item.category, &item.entity_id, item.payload.clone())
            {
                Ok(()) => {
                    stats.discovered += 1;
                    info!("{}: persisted update for {}", self.category(), item.entity_id);
                }
                Err(error) => {
                    stats.errors += 1;
                    warn!(
                        "{}: could not persist update for {}: {error:#}",
                        self.category(),
                        item.entity_id,
                    );
                }
            }
        }
    }

    fn run_reconciliation(&self, stats: &mut TickStats) {
        let tenant = &self.context.config.name;
        let items = match self.context.ledger.scan(self.category()) {
            Ok(items) => items,
            Err(error) => {
                warn!("{}: ledger scan failed for {tenant}: {error:#}", self.category());
                stats.errors += 1;
                return;
            }
        };

        if !items.is_empty() {
            info!("{}: {} pending item(s) for {tenant}", self.category(), items.len());
        }

        for item in items {
            match self.category.reconcile(&self.context, &item) {
                Ok(Outcome::Resolved) => {
                    self.remove(&item);
                    stats.resolved += 1;
                    info!("{}: resolved {}", self.category(), item.entity_id);
                }
                Ok(Outcome::Abandoned) => {
                    self.remove(&item);
                    stats.abandoned += 1;
                    warn!("{}: abandoned {}", self.category(), item.entity_id);
                }
                Ok(Outcome::Retry) => {
                    stats.retried += 1;
                    warn!(
                        "{}: left {} for the next tick",
                        self.category(),
                        item.entity_id,
                    );
                }
                Err(error) => {
                    stats.errors += 1;
                    warn!(
                        "{}: reconciling {} failed: {error:#}",
                        self.category(),
                        item.entity_id,
                    );
                }
            }
        }
    }

    fn remove(&self, item: &WorkItem) {
        if let Err(error) = self.context.ledger.remove(&item.category, &item.entity_id) {
            warn!(
                "{}: could not remove {}: {error:#}",
                self.category(),
                item.entity_id,
            );
        }
    }
}

// --- shared disposition policy ---

/// Disposition of a read of authoritative remote state: 200 proceeds,
/// 404 means the entity is gone (disqualified), anything else is
/// transient.
pub(crate) fn read_disposition(status: u16) -> Option<Outcome> {
    match status {
        200 => None,
        404 => Some(Outcome::Abandoned),
        _ => Some(Outcome::Retry),
    }
}

/// Disposition of a target mutation given the category's success code.
/// Other 4xx statuses are validation-style rejections that will not
/// self-resolve.
pub(crate) fn mutation_outcome(status: u16, success: u16) -> Outcome {
    if status == success {
        Outcome::Resolved
    } else if (400..500).contains(&status) {
        Outcome::Abandoned
    } else {
        Outcome::Retry
    }
}

/// Fold sub-operation outcomes into the item's overall disposition: any
/// transient sub-result keeps the item; otherwise it resolves if anything
/// succeeded. An empty set abandons.
pub(crate) fn combine_outcomes(outcomes: &[Outcome]) -> Outcome {
    if outcomes.contains(&Outcome::Retry) {
        Outcome::Retry
    } else if outcomes.contains(&Outcome::Resolved) {
        Outcome::Resolved
    } else {
        Outcome::Abandoned
    }
}

/// Distinct entity ids from a batch of feed events, in arrival order
pub(crate) fn unique_entity_ids(events: &[SubscriptionEvent]) -> Vec<i64> {
    let mut ids = Vec::new();
    for event in events {
        if let Some(id) = event.entity_id
            && !ids.contains(&id)
        {
            ids.push(id);
        }
    }
    ids
}
