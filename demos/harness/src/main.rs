//! A small standalone ADS server: boots `xds-control-plane`'s
//! `SnapshotCache` behind a gRPC listener and pushes a fresh snapshot for
//! one node group on a timer, so the library's behavior can be observed
//! end-to-end against a real transport rather than only through unit tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use prost_types::Any;
use tonic::transport::Server;
use tracing::info;

use xds_control_plane::cache::SnapshotCache;
use xds_control_plane::server::AggregatedDiscoveryServer;
use xds_control_plane::snapshot::{type_url, Resources, Snapshot};

#[derive(Parser, Debug)]
#[command(name = "xds-harness", about = "Demo ADS server for xds-control-plane")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:18000")]
    listen: SocketAddr,

    /// Node ID the demo snapshots are published under.
    #[arg(long, default_value = "demo-node")]
    node: String,

    /// Seconds between each simulated snapshot update.
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "xds_harness=info,xds_control_plane=info".into()),
        )
        .init();

    let args = Args::parse();
    let cache = Arc::new(SnapshotCache::new(true));

    info!(node = %args.node, interval_secs = args.interval_secs, "seeding snapshots on a timer");
    tokio::spawn(publish_snapshots(cache.clone(), args.node.clone(), args.interval_secs));

    let ads = AggregatedDiscoveryServer::new(cache).into_service();

    info!(address = %args.listen, "starting ADS demo server");
    Server::builder()
        .add_service(ads)
        .serve_with_shutdown(args.listen, shutdown_signal())
        .await?;

    info!("ADS demo server shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    info!("shutdown signal received");
}

/// Publishes an ever-growing cluster list for `node` every `interval_secs`,
/// purely so a demo client has something changing to watch.
async fn publish_snapshots(cache: Arc<SnapshotCache>, node: String, interval_secs: u64) {
    let mut tick = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut generation: u64 = 0;
    loop {
        tick.tick().await;
        generation += 1;
        let mut resources = Resources::new();
        for i in 0..generation {
            let name = format!("cluster-{i}");
            resources.insert(name.clone(), Any { type_url: type_url::CLUSTER.to_string(), value: name.into_bytes() });
        }
        let version = generation.to_string();
        info!(%version, clusters = resources.len(), "publishing snapshot");
        let snapshot = Snapshot::builder().with_resources(type_url::CLUSTER, version, resources).build();
        cache.set_snapshot(&node, snapshot).await;
    }
}
