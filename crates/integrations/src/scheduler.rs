//! Periodic tick scheduling
//!
//! One thread per (tenant, category) pair, each on the tenant's fixed
//! interval. Threads never share work, so a slow remote on one tenant or
//! category cannot stall any other's ticks. An in-flight tick that
//! outlives its slot simply finishes; the next tick scans ledger state as
//! it is by then.

use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::sync::{SyncEngine, TenantContext, category_syncs};

/// Handle over all running tick threads
pub struct Scheduler {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn tick threads for every tenant and category
    pub fn start(tenants: Vec<Arc<TenantContext>>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        for context in tenants {
            let interval = Duration::from_secs(context.config.poll_interval_secs.max(1));
            for category in category_syncs() {
                let engine = SyncEngine::new(context.clone(), category);
                info!(
                    "Scheduling {}/{} every {}s",
                    context.config.name,
                    engine.category(),
                    interval.as_secs(),
                );
                let stop = stop.clone();
                handles.push(thread::spawn(move || run_ticks(engine, interval, stop)));
            }
        }

        Self { stop, handles }
    }

    /// Signal every tick thread and wait for them to finish
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn run_ticks(engine: SyncEngine, interval: Duration, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        engine.tick();

        // Sleep in short slices so shutdown stays prompt even on long
        // intervals
        let mut remaining = interval;
        while !stop.load(Ordering::SeqCst) && remaining > Duration::ZERO {
            let step = remaining.min(Duration::from_millis(200));
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }
}
