use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// The routing table's contents: topic name to the ordered list of subscribing
/// function identifiers.
pub type RoutingTable = HashMap<String, Vec<String>>;

/// Concurrent topic→[function] lookup with atomic swap.
///
/// Reads never take a lock: `match_topic` loads the current `Arc<RoutingTable>`
/// and is contention-free with respect to concurrent `sync` calls. A `match_topic`
/// racing a `sync` observes either the whole old table or the whole new one, never
/// a torn mix of the two.
#[derive(Default)]
pub struct TopicMap {
    table: ArcSwap<RoutingTable>,
}

impl TopicMap {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(RoutingTable::new()),
        }
    }

    /// Returns the current subscriber list for `topic`, or an empty list if there
    /// is none. Never panics on an unknown topic.
    pub fn match_topic(&self, topic: &str) -> Vec<String> {
        self.table
            .load()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Atomically installs `table` as the active routing table.
    pub fn sync(&self, table: RoutingTable) {
        self.table.store(Arc::new(table));
    }

    /// A snapshot of the currently-known topics.
    pub fn topics(&self) -> Vec<String> {
        self.table.load().keys().cloned().collect()
    }
}
