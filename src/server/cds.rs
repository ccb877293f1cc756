use std::pin::Pin;
use std::sync::Arc;

use data_plane_api::envoy::service::cluster::v3::cluster_discovery_service_server::{
    ClusterDiscoveryService, ClusterDiscoveryServiceServer,
};
use data_plane_api::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use futures::Stream;
use tonic::{Request, Response, Status, Streaming};

use super::DiscoveryServer;
use crate::cache::Cache;
use crate::snapshot::type_url;

type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send + 'static>>;

/// CDS: `default_type_url` is `Cluster`, so a request's type URL may be
/// omitted on this service's own stream.
pub struct ClusterServer<C: Cache>(DiscoveryServer<C>);

impl<C: Cache + 'static> ClusterServer<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self(DiscoveryServer::new(cache, type_url::CLUSTER))
    }

    pub fn into_service(self) -> ClusterDiscoveryServiceServer<Self> {
        ClusterDiscoveryServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl<C: Cache + 'static> ClusterDiscoveryService for ClusterServer<C> {
    type StreamClustersStream = ResponseStream;

    async fn stream_clusters(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamClustersStream>, Status> {
        let out_stream = self.0.stream(request.into_inner());
        Ok(Response::new(Box::pin(out_stream) as ResponseStream))
    }

    type DeltaClustersStream = Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send + 'static>>;

    async fn delta_clusters(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaClustersStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }

    async fn fetch_clusters(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.0.fetch(request.into_inner()).await.map(Response::new)
    }
}
