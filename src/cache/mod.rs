//! The `Cache` collaborator interface and its reference implementation,
//! [`SnapshotCache`].

mod snapshot_cache;
mod status;
mod watch;

pub use snapshot_cache::SnapshotCache;
pub use status::NodeStatusSnapshot;
pub use watch::{channel, WatchId, WatchResponder};

use async_trait::async_trait;
use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};

/// The interface a [`crate::server::DiscoveryServer`] drives per request.
/// `SnapshotCache` is the one implementation this crate ships, but the
/// server is written against this trait so a different watch/versioning
/// policy can be swapped in without touching the streaming state machine.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Either answers `tx` immediately and returns `None`, or parks a watch
    /// and returns `Some(id)` the caller must remember in order to cancel it
    /// later. Takes `request` by value since a parked watch needs to own it
    /// for the lifetime of the park.
    async fn create_watch(&self, request: DiscoveryRequest, tx: WatchResponder) -> Option<WatchId>;

    /// Idempotently drops a previously parked watch.
    async fn cancel_watch(&self, watch_id: &WatchId);

    /// Unary fetch: answers immediately from the current state, without
    /// parking anything.
    async fn fetch(&self, request: &DiscoveryRequest) -> crate::error::Result<DiscoveryResponse>;
}
