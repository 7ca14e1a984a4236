//! caddystate: inspect and edit a running Caddy server through its admin API
//!
//! Flattens the live HTTP configuration into route and upstream views,
//! applies route additions and deletions, summarizes Prometheus metrics and
//! probes upstream reachability.

use admin::{
    add_route, delete_route_by_index, extract_routes, group_metrics, http_check, parse_prometheus_text,
    parse_upstreams, reload_current, tcp_check, AdminCallResult, AdminClient, AdminTransport,
    Overview, UpstreamStats,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

mod telemetry;

#[derive(Parser)]
#[command(name = "caddystate")]
#[command(author, version, about = "Inspect and edit a running Caddy server through its admin API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "caddystate.toml", global = true)]
    config: PathBuf,

    /// Log level (overrides the config file)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Admin API base URL (overrides the config file and CADDY_ADMIN_URL)
    #[arg(long, global = true)]
    admin_url: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List routes across all HTTP servers
    Routes,
    /// Show live upstream health
    Upstreams,
    /// Show metrics grouped by subsystem
    Metrics {
        /// Print the raw exposition text
        #[arg(long)]
        raw: bool,
    },
    /// Print the full running configuration
    Config,
    /// Reachability, route count and upstream summary
    Overview,
    /// Append a reverse-proxy route to the first HTTP server
    AddRoute {
        /// Upstream dial address, e.g. 10.0.0.1:8080
        #[arg(long)]
        upstream: String,
        /// Host matcher
        #[arg(long)]
        host: Option<String>,
        /// Path matcher
        #[arg(long)]
        path: Option<String>,
    },
    /// Delete a route by its current index
    DeleteRoute {
        server: String,
        #[arg(allow_hyphen_values = true)]
        index: String,
    },
    /// Re-submit the running configuration
    Reload,
    /// Probe an upstream directly
    Check {
        #[command(subcommand)]
        probe: Probe,
    },
}

#[derive(Subcommand)]
enum Probe {
    /// Raw TCP connect
    Tcp {
        host: String,
        port: u16,
        /// Connect timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// HTTP GET, reporting the status code
    Http {
        addr: String,
        /// http or https
        #[arg(long)]
        proto: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    config.apply_env_overrides();
    config.apply_admin_url_override(cli.admin_url.clone());
    config.validate().context("Invalid configuration")?;

    let level = telemetry::parse_level(cli.log_level.as_deref().unwrap_or(&config.global.log_level));
    let telemetry_provider = telemetry::init(level, &config.global.tracing)?;

    debug!(admin = %config.admin.url, "Configuration loaded");

    let result = run(&cli, &config).await;
    telemetry::shutdown_telemetry(telemetry_provider);
    result
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    let api = AdminClient::from_config(&config.admin).context("Failed to create admin client")?;

    match &cli.command {
        Commands::Routes => show_routes(&api, cli.json).await,
        Commands::Upstreams => show_upstreams(&api, cli.json).await,
        Commands::Metrics { raw } => show_metrics(&api, *raw, cli.json).await,
        Commands::Config => {
            let config = ensure_ok(api.full_config().await)?;
            print_json(&config.unwrap_or(Value::Null))
        }
        Commands::Overview => {
            let overview = Overview::fetch(&api).await;
            if cli.json {
                return print_json(&overview);
            }
            match &overview.error {
                None => println!("Caddy: reachable ({})", api.base_url()),
                Some(e) => println!("Caddy: unreachable ({}): {}", api.base_url(), e),
            }
            println!("Routes: {}", overview.route_count);
            print_stats(&overview.upstreams);
            Ok(())
        }
        Commands::AddRoute {
            upstream,
            host,
            path,
        } => {
            let upstream = upstream.trim();
            if upstream.is_empty() {
                bail!("Upstream address is required.");
            }
            let host = non_blank(host.as_deref());
            let path = non_blank(path.as_deref());

            let result = add_route(&api, host, path, upstream).await;
            audit("ROUTE_ADD", upstream, &result, "Route added");
            ensure_ok(result).map(|_| println!("Route added successfully."))
        }
        Commands::DeleteRoute { server, index } => {
            let result = delete_route_by_index(&api, server, index).await;
            let subject = format!("{}/routes/{}", server, index);
            audit("ROUTE_DELETE", &subject, &result, "Route deleted");
            ensure_ok(result).map(|_| println!("Route deleted."))
        }
        Commands::Reload => {
            let result = reload_current(&api).await;
            audit("CONFIG_RELOAD", api.base_url(), &result, "Manual reload triggered");
            ensure_ok(result).map(|_| println!("Caddy config reloaded successfully."))
        }
        Commands::Check { probe } => run_probe(probe, config, cli.json).await,
    }
}

async fn show_routes(api: &AdminClient, json: bool) -> Result<()> {
    let servers = ensure_ok(api.servers().await)?;
    let routes = extract_routes(servers.as_ref());

    if json {
        return print_json(&routes);
    }

    if routes.is_empty() {
        println!("No routes configured");
        return Ok(());
    }

    for route in &routes {
        let hosts = route.hosts();
        let paths = route.paths();
        println!(
            "{}[{}] host={} path={} -> {}",
            route.server_name,
            route.index,
            if hosts.is_empty() { "*".to_string() } else { hosts.join(",") },
            if paths.is_empty() { "*".to_string() } else { paths.join(",") },
            if route.upstreams.is_empty() { "-".to_string() } else { route.upstreams.join(", ") },
        );
    }
    Ok(())
}

async fn show_upstreams(api: &AdminClient, json: bool) -> Result<()> {
    let upstreams = parse_upstreams(ensure_ok(api.upstreams().await)?.as_ref());
    let stats = UpstreamStats::from_statuses(&upstreams);

    if json {
        return print_json(&serde_json::json!({ "upstreams": upstreams, "stats": stats }));
    }

    for upstream in &upstreams {
        println!(
            "{:<32} {:<9} requests={} fails={}",
            upstream.address,
            if upstream.healthy { "healthy" } else { "UNHEALTHY" },
            upstream.num_requests,
            upstream.fails
        );
    }
    print_stats(&stats);
    Ok(())
}

async fn show_metrics(api: &AdminClient, raw: bool, json: bool) -> Result<()> {
    let text = ensure_ok(api.metrics_text().await)?;

    if raw {
        print!("{}", text.unwrap_or_default());
        return Ok(());
    }

    let groups = group_metrics(&parse_prometheus_text(text.as_deref()));
    if json {
        return print_json(&groups);
    }

    for group in &groups {
        println!("== {} ({})", group.label, group.metrics.len());
        for metric in &group.metrics {
            if metric.simple {
                println!("  {} = {}", metric.name, metric.samples[0].value);
                continue;
            }
            println!("  {} [{}]", metric.name, metric.metric_type);
            for sample in &metric.samples {
                let labels: Vec<String> = sample
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, v))
                    .collect();
                println!("    {{{}}} {}", labels.join(","), sample.value);
            }
        }
    }
    Ok(())
}

async fn run_probe(probe: &Probe, config: &Config, json: bool) -> Result<()> {
    match probe {
        Probe::Tcp {
            host,
            port,
            timeout_ms,
        } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.probe.tcp_timeout());
            let reachable = tcp_check(host, *port, timeout).await;

            if json {
                return print_json(&serde_json::json!({ "host": host, "port": port, "reachable": reachable }));
            }
            println!("{}:{} {}", host, port, if reachable { "reachable" } else { "unreachable" });
            if !reachable {
                bail!("{}:{} is unreachable", host, port);
            }
            Ok(())
        }
        Probe::Http { addr, proto } => {
            let check = http_check(addr, proto.as_deref(), config.probe.http_timeout()).await;

            if json {
                return print_json(&check);
            }
            match (&check.status, &check.error) {
                (Some(status), _) => println!("{} {} ({})", addr, status, check.badge()),
                (None, Some(e)) => println!("{} ERR: {}", addr, e),
                (None, None) => println!("{} ERR", addr),
            }
            Ok(())
        }
    }
}

/// Record a mutation attempt and its outcome
fn audit(action: &str, subject: &str, result: &AdminCallResult, success_detail: &str) {
    match result.error() {
        None => info!(
            target: telemetry::AUDIT_TARGET,
            action,
            subject,
            status = "SUCCESS",
            detail = success_detail,
            "Mutation applied"
        ),
        Some(e) => warn!(
            target: telemetry::AUDIT_TARGET,
            action,
            subject,
            status = "FAILURE",
            detail = e,
            "Mutation failed"
        ),
    }
}

fn ensure_ok<T>(result: AdminCallResult<T>) -> Result<Option<T>> {
    match result.into_result() {
        Ok(data) => Ok(data),
        Err(e) => bail!(e),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn print_stats(stats: &UpstreamStats) {
    println!("Upstreams: {} total, {} up, {} down", stats.total, stats.up, stats.down);
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
