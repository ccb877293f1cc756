//! Node-group hashing: maps a client's identity to the cache key it shares
//! a snapshot and status with.

use data_plane_api::envoy::config::core::v3::Node;

/// Deterministically maps a client's `Node` identity to the key under which
/// `SnapshotCache` stores its snapshot and status. The cache is generic over
/// this policy; callers who want to group nodes by something other than raw
/// node ID (e.g. cluster, locality) provide their own implementation.
pub trait NodeGroup: Send + Sync {
    fn hash(&self, node: &Option<Node>) -> String;
}

/// The default grouping policy: the node's `id` field verbatim, or the
/// empty string for an absent node.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeId;

impl NodeGroup for NodeId {
    fn hash(&self, node: &Option<Node>) -> String {
        node.as_ref().map_or(String::new(), |node| node.id.clone())
    }
}
