use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;

/// Identifies a watch parked inside one node group's [`super::status::NodeStatus`].
///
/// A `WatchId` is only meaningful against the cache that issued it: `group`
/// says which node group's status table to look in, `index` is the slot
/// inside that group's watch slab.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WatchId {
    pub(crate) group: String,
    pub(crate) index: usize,
}

/// The single-shot emitter half of a watch. Buffer size 1: a watch emits at
/// most one response over its lifetime, and dropping the sender without
/// ever calling `send` is how an unanswered watch that the stream gave up on
/// gets cleaned up.
pub type WatchResponder = mpsc::Sender<(DiscoveryRequest, DiscoveryResponse)>;

/// Creates a fresh single-shot watch channel.
pub fn channel() -> (WatchResponder, mpsc::Receiver<(DiscoveryRequest, DiscoveryResponse)>) {
    mpsc::channel(1)
}
