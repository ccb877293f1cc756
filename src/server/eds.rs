use std::pin::Pin;
use std::sync::Arc;

use data_plane_api::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use data_plane_api::envoy::service::endpoint::v3::endpoint_discovery_service_server::{
    EndpointDiscoveryService, EndpointDiscoveryServiceServer,
};
use futures::Stream;
use tonic::{Request, Response, Status, Streaming};

use super::DiscoveryServer;
use crate::cache::Cache;
use crate::snapshot::type_url;

type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send + 'static>>;

/// EDS: `default_type_url` is `Endpoint`. Endpoint requests are expected to
/// always carry an explicit, non-empty `resource_names` list.
pub struct EndpointServer<C: Cache>(DiscoveryServer<C>);

impl<C: Cache + 'static> EndpointServer<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self(DiscoveryServer::new(cache, type_url::ENDPOINT))
    }

    pub fn into_service(self) -> EndpointDiscoveryServiceServer<Self> {
        EndpointDiscoveryServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl<C: Cache + 'static> EndpointDiscoveryService for EndpointServer<C> {
    type StreamEndpointsStream = ResponseStream;

    async fn stream_endpoints(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamEndpointsStream>, Status> {
        let out_stream = self.0.stream(request.into_inner());
        Ok(Response::new(Box::pin(out_stream) as ResponseStream))
    }

    type DeltaEndpointsStream = Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send + 'static>>;

    async fn delta_endpoints(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaEndpointsStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }

    async fn fetch_endpoints(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.0.fetch(request.into_inner()).await.map(Response::new)
    }
}
