//! The per-stream request/response state machine.
//!
//! Five gRPC services (ADS, CDS, EDS, LDS, RDS) share one state machine,
//! parameterised only by `default_type_url`. Each service's tonic impl lives
//! in its own small file under this module and just wires the generated
//! trait onto [`DiscoveryServer`].

mod ads;
mod cds;
mod eds;
mod lds;
mod rds;

pub use ads::AggregatedDiscoveryServer;
pub use cds::ClusterServer;
pub use eds::EndpointServer;
pub use lds::ListenerServer;
pub use rds::RouteServer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Status, Streaming};
use tracing::{debug, error, info, warn};

use crate::cache::{self, Cache, WatchId};
use crate::error::Error;
use crate::snapshot::type_url;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(0);

fn next_stream_id() -> u64 {
    NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)
}

/// Drives one xDS gRPC service's request/response state machine against a
/// [`Cache`]. `default_type_url` is `""` for ADS (the type URL is carried
/// per-message) and one of the four core type URLs for the single-typed
/// services.
#[derive(Debug)]
pub struct DiscoveryServer<C: Cache> {
    cache: Arc<C>,
    default_type_url: &'static str,
}

impl<C: Cache + 'static> DiscoveryServer<C> {
    pub fn new(cache: Arc<C>, default_type_url: &'static str) -> Self {
        Self { cache, default_type_url }
    }

    pub fn is_ads(&self) -> bool {
        self.default_type_url.is_empty()
    }

    /// Runs one bidirectional stream's state machine to completion,
    /// returning the stream of responses to hand back to tonic.
    pub fn stream(
        &self,
        in_stream: Streaming<DiscoveryRequest>,
    ) -> ReceiverStream<std::result::Result<DiscoveryResponse, Status>> {
        run_stream(self.cache.clone(), self.default_type_url, in_stream)
    }

    /// The unary fetch path: a single request/response round trip against
    /// whatever snapshot is current right now, with no watch parked.
    pub async fn fetch(
        &self,
        mut request: DiscoveryRequest,
    ) -> std::result::Result<DiscoveryResponse, Status> {
        if request.type_url.is_empty() {
            request.type_url = self.default_type_url.to_string();
        }
        self.cache.fetch(&request).await.map_err(Status::from)
    }
}

/// What a parked watch's listener task reports back to the stream's main
/// loop once it resolves.
enum WatchEvent {
    Delivered { type_url: String, response: DiscoveryResponse },
    /// The watch's channel closed without ever delivering a response. This
    /// is expected when the stream itself cancelled the watch to replace
    /// it with a newer one; the main loop tells the two apart by checking
    /// whether `watch_id` is still the type's current watch.
    Closed { type_url: String, watch_id: WatchId },
}

fn run_stream<C: Cache + 'static>(
    cache: Arc<C>,
    default_type_url: &'static str,
    mut in_stream: Streaming<DiscoveryRequest>,
) -> ReceiverStream<std::result::Result<DiscoveryResponse, Status>> {
    let (outbound_tx, outbound_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel::<WatchEvent>(16);
    let stream_id = next_stream_id();
    let ads = default_type_url.is_empty();

    tokio::spawn(async move {
        // Keyed by type URL: the watch currently live for that type (at most
        // one per type at a time), and the nonce of the last response sent
        // for it. Both are local to this task, so no lock is needed — the
        // whole per-stream state machine runs serialised by virtue of being
        // one task driving one `select!` loop.
        let mut watches: HashMap<String, WatchId> = HashMap::new();
        let mut last_nonce: HashMap<String, String> = HashMap::new();
        let mut stream_nonce: u64 = 0;

        loop {
            tokio::select! {
                incoming = in_stream.next() => {
                    match incoming {
                        Some(Ok(request)) => {
                            if let Err(status) = handle_request(
                                &cache, &event_tx, &mut watches, &last_nonce, default_type_url, ads, stream_id, request,
                            ).await {
                                warn!(stream_id, %status, "failing stream");
                                let _ = outbound_tx.send(Err(status)).await;
                                break;
                            }
                        }
                        Some(Err(status)) => {
                            warn!(stream_id, %status, "stream receive error");
                            let _ = outbound_tx.send(Err(status)).await;
                            break;
                        }
                        None => {
                            info!(stream_id, "stream completed by client");
                            break;
                        }
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(WatchEvent::Delivered { type_url, mut response }) => {
                            let nonce = stream_nonce.to_string();
                            stream_nonce += 1;
                            response.nonce = nonce.clone();
                            info!(
                                stream_id,
                                type_url = %type_url,
                                version = %response.version_info,
                                nonce = %nonce,
                                resources = response.resources.len(),
                                "sending discovery response"
                            );
                            if outbound_tx.send(Ok(response)).await.is_err() {
                                debug!(stream_id, "receiver gone, stopping stream");
                                break;
                            }
                            last_nonce.insert(type_url, nonce);
                        }
                        Some(WatchEvent::Closed { type_url, watch_id }) => {
                            if watches.get(&type_url) == Some(&watch_id) {
                                error!(stream_id, type_url = %type_url, "watch closed unexpectedly");
                                watches.remove(&type_url);
                                let _ = outbound_tx.send(Err(Error::WatchClosed.into())).await;
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        for (_, watch_id) in watches.drain() {
            cache.cancel_watch(&watch_id).await;
        }
    });

    ReceiverStream::new(outbound_rx)
}

/// Handles one inbound `DiscoveryRequest`: substitutes the default type URL,
/// drops requests for unrecognised types or with a stale nonce, and replaces
/// any watch already parked for the request's type URL with a fresh one.
/// Returns `Err` only for conditions that must fail the whole stream.
#[allow(clippy::too_many_arguments)]
async fn handle_request<C: Cache + 'static>(
    cache: &Arc<C>,
    event_tx: &mpsc::Sender<WatchEvent>,
    watches: &mut HashMap<String, WatchId>,
    last_nonce: &HashMap<String, String>,
    default_type_url: &'static str,
    ads: bool,
    stream_id: u64,
    mut request: DiscoveryRequest,
) -> std::result::Result<(), Status> {
    if ads && request.type_url.is_empty() {
        return Err(Error::MissingAdsTypeUrl.into());
    }
    if request.type_url.is_empty() {
        request.type_url = default_type_url.to_string();
    }

    if !type_url::is_core_type(&request.type_url) {
        debug!(stream_id, type_url = %request.type_url, "ignoring request for unknown type URL");
        return Ok(());
    }

    if let Some(last) = last_nonce.get(&request.type_url) {
        if !request.response_nonce.is_empty() && &request.response_nonce != last {
            debug!(
                stream_id,
                type_url = %request.type_url,
                nonce = %request.response_nonce,
                expected = %last,
                "discarding request with stale nonce"
            );
            return Ok(());
        }
    }

    let type_url = request.type_url.clone();
    if let Some(old) = watches.remove(&type_url) {
        cache.cancel_watch(&old).await;
    }

    let (tx, mut rx) = cache::channel();
    let watch_id = cache.create_watch(request, tx).await;
    if let Some(id) = &watch_id {
        watches.insert(type_url.clone(), id.clone());
    }

    let event_tx = event_tx.clone();
    tokio::spawn(async move {
        match rx.recv().await {
            Some((_, response)) => {
                let _ = event_tx.send(WatchEvent::Delivered { type_url, response }).await;
            }
            None => {
                if let Some(watch_id) = watch_id {
                    let _ = event_tx.send(WatchEvent::Closed { type_url, watch_id }).await;
                }
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SnapshotCache;
    use crate::snapshot::{Resources, Snapshot};
    use data_plane_api::envoy::config::core::v3::Node;
    use prost_types::Any;

    fn req(version: &str, nonce: &str, type_url: &str) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Some(Node { id: "node-a".to_string(), ..Default::default() }),
            type_url: type_url.to_string(),
            version_info: version.to_string(),
            response_nonce: nonce.to_string(),
            ..Default::default()
        }
    }

    // Exercises `handle_request` and the watch-event plumbing directly.
    // Constructing a real `tonic::Streaming` needs a live transport, so the
    // full `run_stream` loop is exercised end-to-end by the harness crate's
    // integration tests instead.

    #[tokio::test]
    async fn parked_watch_delivers_through_the_event_channel_on_set_snapshot() {
        let cache = Arc::new(SnapshotCache::new(false));
        let mut watches = HashMap::new();
        let last_nonce = HashMap::new();
        let (event_tx, mut event_rx) = mpsc::channel(4);

        handle_request(&cache, &event_tx, &mut watches, &last_nonce, "", false, 0, req("", "", type_url::CLUSTER))
            .await
            .unwrap();
        assert_eq!(watches.len(), 1);

        let mut resources = Resources::new();
        resources.insert("a", Any { type_url: type_url::CLUSTER.to_string(), value: b"a".to_vec() });
        let snapshot = Snapshot::builder().with_resources(type_url::CLUSTER, "v1", resources).build();
        cache.set_snapshot("node-a", snapshot).await;

        match event_rx.recv().await.expect("watch fired") {
            WatchEvent::Delivered { type_url: t, response } => {
                assert_eq!(t, type_url::CLUSTER);
                assert_eq!(response.version_info, "v1");
            }
            WatchEvent::Closed { .. } => panic!("expected delivery"),
        }
    }

    #[tokio::test]
    async fn stale_nonce_is_discarded_without_replacing_the_watch() {
        let cache = Arc::new(SnapshotCache::new(false));
        let mut watches = HashMap::new();
        let mut last_nonce = HashMap::new();
        let (event_tx, _event_rx) = mpsc::channel(4);

        handle_request(&cache, &event_tx, &mut watches, &last_nonce, "", false, 0, req("", "", type_url::CLUSTER))
            .await
            .unwrap();
        let original = watches.get(type_url::CLUSTER).cloned();
        last_nonce.insert(type_url::CLUSTER.to_string(), "5".to_string());

        handle_request(
            &cache,
            &event_tx,
            &mut watches,
            &last_nonce,
            "",
            false,
            0,
            req("", "wrong-nonce", type_url::CLUSTER),
        )
        .await
        .unwrap();

        assert_eq!(watches.get(type_url::CLUSTER).cloned(), original, "stale nonce must not replace the watch");
    }

    #[tokio::test]
    async fn unknown_type_url_is_silently_ignored() {
        let cache = Arc::new(SnapshotCache::new(false));
        let mut watches = HashMap::new();
        let last_nonce = HashMap::new();
        let (event_tx, _event_rx) = mpsc::channel(4);

        handle_request(&cache, &event_tx, &mut watches, &last_nonce, "", false, 0, req("", "", "type.googleapis.com/unknown.Thing"))
            .await
            .unwrap();
        assert!(watches.is_empty());
    }

    #[tokio::test]
    async fn ads_request_without_type_url_fails_the_stream() {
        let cache = Arc::new(SnapshotCache::new(true));
        let mut watches = HashMap::new();
        let last_nonce = HashMap::new();
        let (event_tx, _event_rx) = mpsc::channel(4);

        let err = handle_request(&cache, &event_tx, &mut watches, &last_nonce, "", true, 0, req("", "", ""))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unknown);
    }
}
