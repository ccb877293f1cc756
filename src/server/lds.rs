use std::pin::Pin;
use std::sync::Arc;

use data_plane_api::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use data_plane_api::envoy::service::listener::v3::listener_discovery_service_server::{
    ListenerDiscoveryService, ListenerDiscoveryServiceServer,
};
use futures::Stream;
use tonic::{Request, Response, Status, Streaming};

use super::DiscoveryServer;
use crate::cache::Cache;
use crate::snapshot::type_url;

type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send + 'static>>;

/// LDS: `default_type_url` is `Listener`, so a request's type URL may be
/// omitted on this service's own stream.
pub struct ListenerServer<C: Cache>(DiscoveryServer<C>);

impl<C: Cache + 'static> ListenerServer<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self(DiscoveryServer::new(cache, type_url::LISTENER))
    }

    pub fn into_service(self) -> ListenerDiscoveryServiceServer<Self> {
        ListenerDiscoveryServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl<C: Cache + 'static> ListenerDiscoveryService for ListenerServer<C> {
    type StreamListenersStream = ResponseStream;

    async fn stream_listeners(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamListenersStream>, Status> {
        let out_stream = self.0.stream(request.into_inner());
        Ok(Response::new(Box::pin(out_stream) as ResponseStream))
    }

    type DeltaListenersStream = Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send + 'static>>;

    async fn delta_listeners(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaListenersStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }

    async fn fetch_listeners(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.0.fetch(request.into_inner()).await.map(Response::new)
    }
}
