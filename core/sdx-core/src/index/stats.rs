//! Index counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters updated by workers without locking.
#[derive(Debug, Default)]
pub struct IndexStats {
    pub commits: AtomicU64,
    pub ignored_upserts: AtomicU64,
    pub queries: AtomicU64,
    pub maintenance_runs: AtomicU64,
    pub expired_documents: AtomicU64,
    pub service_delete_broadcasts: AtomicU64,
    pub failures: AtomicU64,
    pub rejected_operations: AtomicU64,
}

impl IndexStats {
    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        active_query_filters: usize,
        query_queue_depth: usize,
        update_queue_depth: usize,
        page_services: usize,
    ) -> IndexStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        IndexStatsSnapshot {
            commits: load(&self.commits),
            ignored_upserts: load(&self.ignored_upserts),
            queries: load(&self.queries),
            maintenance_runs: load(&self.maintenance_runs),
            expired_documents: load(&self.expired_documents),
            service_delete_broadcasts: load(&self.service_delete_broadcasts),
            failures: load(&self.failures),
            rejected_operations: load(&self.rejected_operations),
            active_query_filters,
            query_queue_depth,
            update_queue_depth,
            page_services,
        }
    }
}

/// Point-in-time copy of [`IndexStats`] plus current gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatsSnapshot {
    pub commits: u64,
    pub ignored_upserts: u64,
    pub queries: u64,
    pub maintenance_runs: u64,
    pub expired_documents: u64,
    pub service_delete_broadcasts: u64,
    pub failures: u64,
    pub rejected_operations: u64,
    pub active_query_filters: usize,
    pub query_queue_depth: usize,
    pub update_queue_depth: usize,
    pub page_services: usize,
}
