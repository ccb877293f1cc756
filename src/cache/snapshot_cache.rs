use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::RwLock;
use tracing::info;

use super::status::{NodeStatus, NodeStatusSnapshot, Watch};
use super::watch::{WatchId, WatchResponder};
use super::Cache;
use crate::error::{Error, Result};
use crate::node::{NodeGroup, NodeId};
use crate::snapshot::Snapshot;

/// The snapshot cache: indexes configuration per node group, parks watches
/// that can't be answered yet, and fans responses out to every affected open
/// watch when the operator installs a new snapshot.
///
/// A single reader-writer lock guards `snapshots`, `statuses`, and every
/// `NodeStatus` inside them. `create_watch` and `set_snapshot` take the
/// write lock; `status_info` takes the read lock.
#[derive(Debug)]
pub struct SnapshotCache<G: NodeGroup = NodeId> {
    inner: RwLock<Inner>,
    ads: bool,
    node_group: G,
}

#[derive(Debug, Default)]
struct Inner {
    statuses: HashMap<String, NodeStatus>,
    snapshots: HashMap<String, Snapshot>,
}

impl SnapshotCache<NodeId> {
    /// A cache grouping nodes by their raw `node.id`.
    pub fn new(ads: bool) -> Self {
        Self::with_node_group(ads, NodeId)
    }
}

impl<G: NodeGroup> SnapshotCache<G> {
    pub fn with_node_group(ads: bool, node_group: G) -> Self {
        Self { inner: RwLock::new(Inner::default()), ads, node_group }
    }

    /// Replaces the snapshot for `group` and triggers every parked watch
    /// whose request version no longer matches.
    pub async fn set_snapshot(&self, group: &str, snapshot: Snapshot) {
        let mut inner = self.inner.write().await;
        inner.snapshots.insert(group.to_string(), snapshot.clone());

        let ads = self.ads;
        if let Some(status) = inner.statuses.get_mut(group) {
            status.remove_if(|_, watch| {
                let version = snapshot.version(&watch.req.type_url);
                if version == watch.req.version_info {
                    return false;
                }
                match build_response(ads, &watch.req, &snapshot) {
                    Some(response) => {
                        info!(
                            version,
                            type_url = %watch.req.type_url,
                            group,
                            "watch triggered by new snapshot"
                        );
                        try_respond(&watch.tx, watch.req.clone(), response);
                        true
                    }
                    None => {
                        info!(type_url = %watch.req.type_url, group, "not responding: ads consistency");
                        false
                    }
                }
            });
        }
    }

    /// A read-only view of one node group's bookkeeping, taken under the
    /// cache's read lock.
    pub async fn status_info(&self, group: &str) -> Option<NodeStatusSnapshot> {
        let inner = self.inner.read().await;
        inner.statuses.get(group).map(NodeStatusSnapshot::from)
    }

    pub async fn node_statuses(&self) -> HashMap<String, NodeStatusSnapshot> {
        let inner = self.inner.read().await;
        inner.statuses.iter().map(|(group, status)| (group.clone(), status.into())).collect()
    }
}

#[async_trait]
impl<G: NodeGroup> Cache for SnapshotCache<G> {
    async fn create_watch(&self, request: DiscoveryRequest, tx: WatchResponder) -> Option<WatchId> {
        let mut inner = self.inner.write().await;
        let group = self.node_group.hash(&request.node);

        let snapshot = inner.snapshots.get(&group).cloned();
        let status =
            inner.statuses.entry(group.clone()).or_insert_with(|| NodeStatus::new(request.node.clone()));
        status.set_last_watch_request_time(Instant::now());

        let up_to_date = match &snapshot {
            None => true,
            Some(snapshot) => request.version_info == snapshot.version(&request.type_url),
        };

        if !up_to_date {
            // Snapshot exists and the client is behind: try to answer now.
            let snapshot = snapshot.expect("up_to_date is only false when a snapshot is present");
            if let Some(response) = build_response(self.ads, &request, &snapshot) {
                info!(
                    version = %response.version_info,
                    type_url = %request.type_url,
                    group,
                    "responding: new version"
                );
                try_respond(&tx, request, response);
                return None;
            }
            info!(type_url = %request.type_url, group, "not responding: ads consistency");
        }

        let index = status.set_watch(Watch { req: request, tx });
        Some(WatchId { group, index })
    }

    async fn cancel_watch(&self, watch_id: &WatchId) {
        let mut inner = self.inner.write().await;
        if let Some(status) = inner.statuses.get_mut(&watch_id.group) {
            status.remove_watch(watch_id.index);
        }
    }

    async fn fetch(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        let inner = self.inner.read().await;
        let group = self.node_group.hash(&request.node);
        let snapshot = inner.snapshots.get(&group).ok_or(Error::NotFound)?;
        if request.version_info == snapshot.version(&request.type_url) {
            return Err(Error::UpToDate);
        }
        build_response(false, request, snapshot).ok_or(Error::NotFound)
    }
}

/// Builds the `DiscoveryResponse` a request should receive from `snapshot`,
/// or `None` if ADS resource-naming rules mean it isn't answerable yet.
fn build_response(ads: bool, req: &DiscoveryRequest, snapshot: &Snapshot) -> Option<DiscoveryResponse> {
    let type_url = req.type_url.as_str();
    let resources = snapshot.resources_or_empty(type_url);

    if ads && !req.resource_names.is_empty() {
        let missing = req.resource_names.iter().any(|name| !resources.items.contains_key(name));
        if missing {
            return None;
        }
    }

    let filtered = if req.resource_names.is_empty() {
        resources.items.values().cloned().collect()
    } else {
        req.resource_names.iter().filter_map(|name| resources.items.get(name).cloned()).collect()
    };

    Some(DiscoveryResponse {
        type_url: req.type_url.clone(),
        version_info: snapshot.version(type_url).to_string(),
        resources: filtered,
        nonce: String::new(),
        control_plane: None,
        canary: false,
    })
}

/// Hands a response to its watch's channel without blocking the cache lock:
/// emitters must be non-blocking with respect to the lock they're called
/// under. The channel has capacity 1 and is fresh, so the only way
/// `try_send` fails is a watch whose stream already went away.
fn try_respond(tx: &WatchResponder, req: DiscoveryRequest, response: DiscoveryResponse) {
    if let Err(err) = tx.try_send((req, response)) {
        tracing::debug!(error = %err, "dropping discovery response: watch receiver gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::watch::channel;
    use crate::snapshot::{type_url, Resources};
    use data_plane_api::envoy::config::core::v3::Node;
    use prost_types::Any;

    fn req(node_id: &str, version: &str, names: &[&str]) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Some(Node { id: node_id.to_string(), ..Default::default() }),
            type_url: type_url::CLUSTER.to_string(),
            version_info: version.to_string(),
            resource_names: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn resources_with(names: &[&str]) -> Resources {
        let mut resources = Resources::new();
        for name in names {
            resources.insert(*name, Any { type_url: type_url::CLUSTER.to_string(), value: name.as_bytes().to_vec() });
        }
        resources
    }

    #[tokio::test]
    async fn cold_start_parks_a_watch_with_no_response() {
        let cache = SnapshotCache::new(false);
        let (tx, mut rx) = channel();
        let watch_id = cache.create_watch(req("node-a", "", &[]), tx).await;
        assert!(watch_id.is_some());
        assert!(rx.try_recv().is_err());

        let status = cache.status_info("node-a").await.expect("status tracked");
        assert_eq!(status.open_watches, 1);
    }

    #[tokio::test]
    async fn set_snapshot_triggers_parked_watch() {
        let cache = SnapshotCache::new(false);
        let (tx, mut rx) = channel();
        cache.create_watch(req("node-a", "", &[]), tx).await;

        let snapshot =
            Snapshot::builder().with_resources(type_url::CLUSTER, "v1", resources_with(&["a", "b"])).build();
        cache.set_snapshot("node-a", snapshot).await;

        let (_, response) = rx.try_recv().expect("watch fired");
        assert_eq!(response.version_info, "v1");
        assert_eq!(response.resources.len(), 2);
        assert!(cache.status_info("node-a").await.unwrap().open_watches == 0);
    }

    #[tokio::test]
    async fn ack_at_current_version_parks_again_without_responding() {
        let cache = SnapshotCache::new(false);
        let snapshot =
            Snapshot::builder().with_resources(type_url::CLUSTER, "v1", resources_with(&["a"])).build();
        cache.set_snapshot("node-a", snapshot).await;

        let (tx, mut rx) = channel();
        let watch_id = cache.create_watch(req("node-a", "v1", &[]), tx).await;
        assert!(watch_id.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ads_gating_blocks_response_until_all_named_resources_present() {
        let cache = SnapshotCache::new(true);
        let snapshot =
            Snapshot::builder().with_resources(type_url::ENDPOINT, "v2", resources_with(&["a", "b"])).build();
        cache.set_snapshot("node-a", snapshot).await;

        let mut request = req("node-a", "", &["a", "b", "c"]);
        request.type_url = type_url::ENDPOINT.to_string();
        let (tx, mut rx) = channel();
        let watch_id = cache.create_watch(request, tx).await;
        assert!(watch_id.is_some(), "watch should remain parked: resource c is missing");
        assert!(rx.try_recv().is_err());

        let mut next = Snapshot::builder();
        next = next.with_resources(type_url::ENDPOINT, "v3", resources_with(&["a", "b", "c"]));
        cache.set_snapshot("node-a", next.build()).await;

        let (_, response) = rx.try_recv().expect("watch fires once c is present");
        assert_eq!(response.version_info, "v3");
        assert_eq!(response.resources.len(), 3);
    }

    #[tokio::test]
    async fn cancel_watch_removes_it_from_status() {
        let cache = SnapshotCache::new(false);
        let (tx, _rx) = channel();
        let watch_id = cache.create_watch(req("node-a", "", &[]), tx).await.unwrap();
        assert_eq!(cache.status_info("node-a").await.unwrap().open_watches, 1);

        cache.cancel_watch(&watch_id).await;
        assert_eq!(cache.status_info("node-a").await.unwrap().open_watches, 0);

        // Idempotent: cancelling again is a no-op, not an error.
        cache.cancel_watch(&watch_id).await;
    }

    #[tokio::test]
    async fn fetch_errors_when_no_snapshot_or_already_current() {
        let cache = SnapshotCache::new(false);
        let request = req("node-a", "", &[]);
        assert!(matches!(cache.fetch(&request).await, Err(Error::NotFound)));

        let snapshot =
            Snapshot::builder().with_resources(type_url::CLUSTER, "v1", resources_with(&["a"])).build();
        cache.set_snapshot("node-a", snapshot).await;

        let current = req("node-a", "v1", &[]);
        assert!(matches!(cache.fetch(&current).await, Err(Error::UpToDate)));

        let stale = req("node-a", "", &[]);
        let response = cache.fetch(&stale).await.expect("should answer");
        assert_eq!(response.version_info, "v1");
    }
}
