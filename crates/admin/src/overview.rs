//! Dashboard summary assembled from concurrent admin reads

use crate::client::AdminTransport;
use crate::route::extract_routes;
use crate::upstream::{parse_upstreams, UpstreamStats};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    /// The full config read succeeded
    pub reachable: bool,
    /// Why the config read failed, if it did
    pub error: Option<String>,
    pub route_count: usize,
    pub upstreams: UpstreamStats,
}

impl Overview {
    /// Read config, servers and upstream health in parallel. Failures of the
    /// server or upstream reads degrade to zero counts.
    pub async fn fetch<A>(api: &A) -> Self
    where
        A: AdminTransport + ?Sized,
    {
        let (config, servers, upstreams) =
            tokio::join!(api.full_config(), api.servers(), api.upstreams());

        let route_count = extract_routes(servers.data()).len();
        let upstreams = UpstreamStats::from_statuses(&parse_upstreams(upstreams.data()));

        debug!(
            reachable = config.is_ok(),
            route_count,
            upstreams = upstreams.total,
            "Overview fetched"
        );

        Self {
            reachable: config.is_ok(),
            error: config.error().map(str::to_string),
            route_count,
            upstreams,
        }
    }
}
