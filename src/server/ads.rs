use std::pin::Pin;
use std::sync::Arc;

use data_plane_api::envoy::service::discovery::v3::aggregated_discovery_service_server::{
    AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
};
use data_plane_api::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use futures::Stream;
use tonic::{Request, Response, Status, Streaming};

use super::DiscoveryServer;
use crate::cache::Cache;

type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send + 'static>>;

/// The ADS endpoint: `default_type_url` is empty, so every request on the
/// stream must carry its own type URL.
pub struct AggregatedDiscoveryServer<C: Cache>(DiscoveryServer<C>);

impl<C: Cache + 'static> AggregatedDiscoveryServer<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self(DiscoveryServer::new(cache, ""))
    }

    pub fn into_service(self) -> AggregatedDiscoveryServiceServer<Self> {
        AggregatedDiscoveryServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl<C: Cache + 'static> AggregatedDiscoveryService for AggregatedDiscoveryServer<C> {
    type StreamAggregatedResourcesStream = ResponseStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        let in_stream = request.into_inner();
        let out_stream = self.0.stream(in_stream);
        Ok(Response::new(Box::pin(out_stream) as ResponseStream))
    }

    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send + 'static>>;

    async fn delta_aggregated_resources(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        // Only the state-of-the-world protocol is implemented.
        Err(Status::unimplemented("delta xDS is not supported"))
    }
}
