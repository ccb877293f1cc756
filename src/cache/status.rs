use std::time::Instant;

use data_plane_api::envoy::config::core::v3::Node;
use data_plane_api::envoy::service::discovery::v3::DiscoveryRequest;
use slab::Slab;

use super::watch::WatchResponder;

/// One parked watch: the request that created it plus the responder it will
/// be answered through. Cancellation is driven externally — the owning
/// stream calls `SnapshotCache::cancel_watch` under the write lock, which
/// removes the entry from its group's slab — rather than the watch holding
/// its own cancel callback (see DESIGN.md).
#[derive(Debug)]
pub(crate) struct Watch {
    pub req: DiscoveryRequest,
    pub tx: WatchResponder,
}

/// Per-node-group bookkeeping: last-request timestamp and the live watch
/// set, all mutated only while the cache's write lock is held.
#[derive(Debug)]
pub(crate) struct NodeStatus {
    pub node: Option<Node>,
    pub last_watch_request_time: Instant,
    pub watches: Slab<Watch>,
}

impl NodeStatus {
    pub fn new(node: Option<Node>) -> Self {
        Self { node, last_watch_request_time: Instant::now(), watches: Slab::new() }
    }

    pub fn set_last_watch_request_time(&mut self, ts: Instant) {
        self.last_watch_request_time = ts;
    }

    pub fn set_watch(&mut self, watch: Watch) -> usize {
        self.watches.insert(watch)
    }

    pub fn remove_watch(&mut self, index: usize) {
        self.watches.try_remove(index);
    }

    /// Drops every watch for which `predicate` returns `true`. The predicate
    /// is allowed to emit on the watch before returning `true`: `set_snapshot`
    /// uses this to respond-then-drop watches whose version went stale in
    /// one pass.
    pub fn remove_if<F>(&mut self, mut predicate: F)
    where
        F: FnMut(usize, &mut Watch) -> bool,
    {
        let stale: Vec<usize> =
            self.watches.iter_mut().filter_map(|(id, watch)| predicate(id, watch).then_some(id)).collect();
        for id in stale {
            self.watches.remove(id);
        }
    }
}

/// A read-only snapshot of [`NodeStatus`] returned to callers outside the
/// cache lock, via `status_info`.
#[derive(Clone, Debug)]
pub struct NodeStatusSnapshot {
    pub last_watch_request_time: Instant,
    pub open_watches: usize,
}

impl From<&NodeStatus> for NodeStatusSnapshot {
    fn from(status: &NodeStatus) -> Self {
        Self { last_watch_request_time: status.last_watch_request_time, open_watches: status.watches.len() }
    }
}
