//! A library for writing Envoy xDS control-planes: the in-memory snapshot
//! cache Envoy's discovery services read from, and the gRPC state machine
//! that drives a per-stream `DiscoveryRequest`/`DiscoveryResponse` exchange
//! against it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use xds_control_plane::cache::{Cache, SnapshotCache};
//! use xds_control_plane::server::ClusterServer;
//!
//! # async fn example() {
//! let cache = Arc::new(SnapshotCache::new(false));
//! let _service = ClusterServer::new(cache).into_service();
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod node;
pub mod server;
pub mod snapshot;

pub use cache::Cache;
pub use error::{Error, Result};
pub use node::{NodeGroup, NodeId};
pub use snapshot::Snapshot;
