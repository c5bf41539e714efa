//! Published route table with whole-table swap.
//!
//! # Responsibilities
//! - Hand readers an immutable snapshot of the current table
//! - Replace the table atomically on reload
//!
//! # Design Decisions
//! - `ArcSwap` for lock-free reads; a reader keeps its `Arc` for the whole request
//! - Each published table carries its generation, so a snapshot is self-describing
//! - Reload never mutates a published table
//! - One task publishes; concurrent publishers may store out of generation order

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::RouterConfig;
use crate::observability::metrics;
use crate::routing::table::{RouteBuildError, RouteTable};

#[derive(Debug)]
pub struct RouteTableHandle {
    current: ArcSwap<RouteTable>,
    generation: AtomicU64,
}

impl RouteTableHandle {
    /// Publish `table` as generation 1.
    pub fn new(table: RouteTable) -> Self {
        let handle = Self {
            current: ArcSwap::from_pointee(RouteTable::empty()),
            generation: AtomicU64::new(0),
        };
        handle.publish(table);
        handle
    }

    /// Build and publish a table; route build errors are returned alongside.
    pub fn from_config(config: &RouterConfig) -> (Self, Vec<RouteBuildError>) {
        let build = RouteTable::build(config);
        (Self::new(build.table), build.errors)
    }

    /// Snapshot of the current table.
    pub fn load(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Swap in a new table and return its generation.
    pub fn publish(&self, mut table: RouteTable) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        table.set_generation(generation);

        let virtual_hosts = table.virtual_hosts().len();
        let routes = table.route_count();
        self.current.store(Arc::new(table));

        metrics::record_generation(generation);
        tracing::info!(generation, virtual_hosts, routes, "Published route table");
        generation
    }

    /// Rebuild from `config` and publish the result.
    pub fn reload(&self, config: &RouterConfig) -> Vec<RouteBuildError> {
        let build = RouteTable::build(config);
        self.publish(build.table);
        metrics::record_reload(true);
        build.errors
    }
}
