//! caddystate-admin: Adapter over the Caddy admin API
//!
//! Reads the live configuration and flattens it into route and upstream
//! views, applies index-addressed route mutations, parses the Prometheus
//! metrics endpoint and probes upstream reachability. The crate holds no
//! state of its own; the only state is the remote server's configuration.

pub mod client;
pub mod error;
pub mod health;
pub mod metrics;
pub mod mutate;
pub mod overview;
pub mod route;
pub mod upstream;

pub use client::{AdminCallResult, AdminClient, AdminTransport};
pub use error::*;
pub use health::{http_check, tcp_check, UpstreamCheck, DEFAULT_TCP_TIMEOUT};
pub use metrics::{group_metrics, parse_prometheus_text, MetricGroup, MetricSample, MetricSeries};
pub use mutate::{add_route, build_route, delete_route_by_index, reload_current};
pub use overview::Overview;
pub use route::{extract_routes, extract_upstreams, FlatRoute};
pub use upstream::{parse_upstreams, UpstreamStats, UpstreamStatus};
