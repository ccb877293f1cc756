use std::pin::Pin;
use std::sync::Arc;

use data_plane_api::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use data_plane_api::envoy::service::route::v3::route_discovery_service_server::{
    RouteDiscoveryService, RouteDiscoveryServiceServer,
};
use futures::Stream;
use tonic::{Request, Response, Status, Streaming};

use super::DiscoveryServer;
use crate::cache::Cache;
use crate::snapshot::type_url;

type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send + 'static>>;

/// RDS: `default_type_url` is `RouteConfiguration`, so a request's type URL
/// may be omitted on this service's own stream.
pub struct RouteServer<C: Cache>(DiscoveryServer<C>);

impl<C: Cache + 'static> RouteServer<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self(DiscoveryServer::new(cache, type_url::ROUTE))
    }

    pub fn into_service(self) -> RouteDiscoveryServiceServer<Self> {
        RouteDiscoveryServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl<C: Cache + 'static> RouteDiscoveryService for RouteServer<C> {
    type StreamRoutesStream = ResponseStream;

    async fn stream_routes(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamRoutesStream>, Status> {
        let out_stream = self.0.stream(request.into_inner());
        Ok(Response::new(Box::pin(out_stream) as ResponseStream))
    }

    type DeltaRoutesStream = Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send + 'static>>;

    async fn delta_routes(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaRoutesStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }

    async fn fetch_routes(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.0.fetch(request.into_inner()).await.map(Response::new)
    }
}
