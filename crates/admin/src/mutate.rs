//! Index-addressed mutations against the live route configuration
//!
//! Both operations read before they write and neither is atomic: another
//! writer changing the route sequence between the read and the write is
//! silently overwritten, and an index taken from an earlier read may point at
//! a different route by the time it is used. The admin API offers no
//! precondition primitive to guard against that, so serializing writers is
//! left to the caller.

use crate::client::{server_routes_path, AdminCallResult, AdminTransport};
use crate::error::AdminError;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Build a reverse-proxy route to a single upstream.
///
/// `match` is only present when a host or path is given.
pub fn build_route(match_host: Option<&str>, match_path: Option<&str>, upstream_dial: &str) -> Value {
    let mut route = Map::new();

    let mut matcher = Map::new();
    if let Some(host) = match_host.filter(|h| !h.is_empty()) {
        matcher.insert("host".to_string(), json!([host]));
    }
    if let Some(path) = match_path.filter(|p| !p.is_empty()) {
        matcher.insert("path".to_string(), json!([path]));
    }
    if !matcher.is_empty() {
        route.insert("match".to_string(), Value::Array(vec![Value::Object(matcher)]));
    }

    route.insert(
        "handle".to_string(),
        json!([{
            "handler": "reverse_proxy",
            "upstreams": [{ "dial": upstream_dial }]
        }]),
    );

    Value::Object(route)
}

/// Parse a route index, accepting only integers within `[0, len)`
pub fn parse_route_index(raw: &str, len: usize) -> Option<usize> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|idx| usize::try_from(idx).ok())
        .filter(|idx| *idx < len)
}

/// Append a reverse-proxy route to the first configured HTTP server.
///
/// The target is the first server in document order; there is no way to
/// pick a server by name.
pub async fn add_route<A>(
    api: &A,
    match_host: Option<&str>,
    match_path: Option<&str>,
    upstream_dial: &str,
) -> AdminCallResult
where
    A: AdminTransport + ?Sized,
{
    let servers = match api.servers().await.into_result() {
        Ok(servers) => servers,
        Err(e) => return AdminCallResult::failure(e),
    };

    let server_names: Vec<String> = servers
        .as_ref()
        .and_then(Value::as_object)
        .map(|servers| servers.keys().cloned().collect())
        .unwrap_or_default();

    let Some(server_name) = server_names.first() else {
        return AdminError::NoServers.into();
    };

    if server_names.len() > 1 {
        warn!(
            target_server = %server_name,
            servers = ?server_names,
            "Several HTTP servers configured, adding route to the first one"
        );
    }

    let route = build_route(match_host, match_path, upstream_dial);
    info!(server = %server_name, upstream = %upstream_dial, "Appending route");

    // The `...` suffix appends every element of the array body
    let path = format!("{}/...", server_routes_path(server_name));
    api.call(Method::POST, &path, Some(&Value::Array(vec![route])))
        .await
}

/// Remove the route at `route_index` from `server_name` by rewriting the
/// server's whole route sequence.
///
/// An index that does not parse or is out of range fails before any write
/// is attempted.
pub async fn delete_route_by_index<A>(api: &A, server_name: &str, route_index: &str) -> AdminCallResult
where
    A: AdminTransport + ?Sized,
{
    let routes = match api.server_routes(server_name).await.into_result() {
        Ok(routes) => routes,
        Err(e) => return AdminCallResult::failure(e),
    };

    let mut routes = match routes {
        Some(Value::Array(routes)) => routes,
        _ => Vec::new(),
    };

    let Some(idx) = parse_route_index(route_index, routes.len()) else {
        warn!(server = %server_name, index = %route_index, routes = routes.len(), "Rejected route index");
        return AdminError::InvalidRouteIndex(route_index.to_string()).into();
    };

    routes.remove(idx);
    info!(server = %server_name, index = idx, remaining = routes.len(), "Replacing route sequence");

    api.call(
        Method::PUT,
        &server_routes_path(server_name),
        Some(&Value::Array(routes)),
    )
    .await
}

/// Re-submit the running configuration to `/load`
pub async fn reload_current<A>(api: &A) -> AdminCallResult
where
    A: AdminTransport + ?Sized,
{
    let config = match api.full_config().await.into_result() {
        Ok(config) => config.unwrap_or(Value::Null),
        Err(e) => return AdminCallResult::failure(e),
    };

    info!("Reloading current configuration");
    api.reload_config(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::ScriptedTransport;
    use crate::client::{CONFIG_PATH, LOAD_PATH, SERVERS_PATH};

    fn three_routes() -> Value {
        json!([
            {"@id": "first", "handle": [{"handler": "reverse_proxy", "upstreams": [{"dial": "a:1"}]}]},
            {"handle": [{"handler": "file_server", "root": "/srv"}], "terminal": true},
            {"match": [{"path": ["/z"]}], "handle": []}
        ])
    }

    #[test]
    fn test_build_route_without_match() {
        let route = build_route(None, None, "10.0.0.1:8080");

        assert!(route.get("match").is_none());
        assert_eq!(route["handle"][0]["handler"], "reverse_proxy");
        assert_eq!(route["handle"][0]["upstreams"], json!([{"dial": "10.0.0.1:8080"}]));
    }

    #[test]
    fn test_build_route_with_match() {
        let route = build_route(Some("app.example.com"), Some("/api/*"), "app:3000");
        assert_eq!(
            route["match"],
            json!([{"host": ["app.example.com"], "path": ["/api/*"]}])
        );

        let route = build_route(None, Some("/api/*"), "app:3000");
        assert_eq!(route["match"], json!([{"path": ["/api/*"]}]));

        let route = build_route(Some(""), None, "app:3000");
        assert!(route.get("match").is_none());
    }

    #[test]
    fn test_parse_route_index() {
        assert_eq!(parse_route_index("0", 3), Some(0));
        assert_eq!(parse_route_index(" 2 ", 3), Some(2));
        assert_eq!(parse_route_index("3", 3), None);
        assert_eq!(parse_route_index("-1", 3), None);
        assert_eq!(parse_route_index("99", 3), None);
        assert_eq!(parse_route_index("1x", 3), None);
        assert_eq!(parse_route_index("", 3), None);
        assert_eq!(parse_route_index("0", 0), None);
    }

    #[tokio::test]
    async fn test_add_route_single_server() {
        let api = ScriptedTransport::new(vec![
            AdminCallResult::ok(json!({"srv0": {"listen": [":443"], "routes": []}})),
            AdminCallResult::empty(),
        ]);

        let result = add_route(&api, None, None, "10.0.0.1:8080").await;
        assert!(result.is_ok());

        let calls = api.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, Method::GET);
        assert_eq!(calls[0].1, SERVERS_PATH);
        assert_eq!(calls[1].0, Method::POST);
        assert_eq!(calls[1].1, "/config/apps/http/servers/srv0/routes/...");

        let body = calls[1].2.as_ref().unwrap();
        let route = &body[0];
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert!(route.get("match").is_none());
        assert_eq!(route["handle"][0]["upstreams"][0]["dial"], "10.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_add_route_targets_first_server() {
        let api = ScriptedTransport::new(vec![
            AdminCallResult::ok(json!({"public": {"routes": []}, "internal": {"routes": []}})),
            AdminCallResult::empty(),
        ]);

        add_route(&api, Some("a.test"), None, "a:1").await;

        let calls = api.calls.lock();
        assert_eq!(calls[1].1, "/config/apps/http/servers/public/routes/...");
        assert_eq!(calls[1].2.as_ref().unwrap()[0]["match"], json!([{"host": ["a.test"]}]));
    }

    #[tokio::test]
    async fn test_add_route_no_servers() {
        for servers in [AdminCallResult::ok(json!({})), AdminCallResult::empty()] {
            let api = ScriptedTransport::new(vec![servers]);
            let result = add_route(&api, None, None, "a:1").await;

            assert_eq!(result.error(), Some("No HTTP servers configured"));
            assert_eq!(api.methods(), vec![Method::GET]);
        }
    }

    #[tokio::test]
    async fn test_add_route_propagates_read_error() {
        let api = ScriptedTransport::new(vec![AdminCallResult::failure("connection refused")]);
        let result = add_route(&api, None, None, "a:1").await;

        assert_eq!(result.error(), Some("connection refused"));
        assert!(result.data().is_none());
        assert_eq!(api.methods(), vec![Method::GET]);
    }

    #[tokio::test]
    async fn test_delete_route_invalid_index_issues_no_write() {
        for index in ["-1", "99", "abc"] {
            let api = ScriptedTransport::new(vec![AdminCallResult::ok(three_routes())]);
            let result = delete_route_by_index(&api, "srv0", index).await;

            assert_eq!(
                result.error().map(str::to_string),
                Some(format!("Invalid route index: {}", index))
            );
            assert_eq!(api.methods(), vec![Method::GET]);
        }
    }

    #[tokio::test]
    async fn test_delete_route_replaces_sequence() {
        let api = ScriptedTransport::new(vec![
            AdminCallResult::ok(three_routes()),
            AdminCallResult::empty(),
        ]);

        let result = delete_route_by_index(&api, "srv0", "1").await;
        assert!(result.is_ok());

        let calls = api.calls.lock();
        assert_eq!(calls[0].1, "/config/apps/http/servers/srv0/routes");
        assert_eq!(calls[1].0, Method::PUT);
        assert_eq!(calls[1].1, "/config/apps/http/servers/srv0/routes");

        let routes = three_routes();
        let expected = json!([routes[0].clone(), routes[2].clone()]);
        assert_eq!(calls[1].2.as_ref().unwrap(), &expected);
    }

    #[tokio::test]
    async fn test_delete_route_null_sequence() {
        let api = ScriptedTransport::new(vec![AdminCallResult::empty()]);
        let result = delete_route_by_index(&api, "srv0", "0").await;

        assert_eq!(result.error(), Some("Invalid route index: 0"));
        assert_eq!(api.methods(), vec![Method::GET]);
    }

    #[tokio::test]
    async fn test_delete_route_propagates_read_error() {
        let api = ScriptedTransport::new(vec![AdminCallResult::failure(
            "Caddy responded 400: unknown object key 'nope'",
        )]);
        let result = delete_route_by_index(&api, "nope", "0").await;

        assert_eq!(
            result.error(),
            Some("Caddy responded 400: unknown object key 'nope'")
        );
    }

    #[tokio::test]
    async fn test_delete_route_surfaces_write_error() {
        let api = ScriptedTransport::new(vec![
            AdminCallResult::ok(three_routes()),
            AdminCallResult::failure("Caddy responded 500: boom"),
        ]);

        let result = delete_route_by_index(&api, "srv0", "0").await;
        assert_eq!(result.error(), Some("Caddy responded 500: boom"));
    }

    #[tokio::test]
    async fn test_reload_current() {
        let config = json!({"apps": {"http": {"servers": {}}}});
        let api = ScriptedTransport::new(vec![
            AdminCallResult::ok(config.clone()),
            AdminCallResult::empty(),
        ]);

        assert!(reload_current(&api).await.is_ok());

        let calls = api.calls.lock();
        assert_eq!(calls[0].1, CONFIG_PATH);
        assert_eq!(calls[1].0, Method::POST);
        assert_eq!(calls[1].1, LOAD_PATH);
        assert_eq!(calls[1].2.as_ref(), Some(&config));
    }

    #[tokio::test]
    async fn test_reload_current_fetch_error() {
        let api = ScriptedTransport::new(vec![AdminCallResult::failure("timed out")]);

        assert_eq!(reload_current(&api).await.error(), Some("timed out"));
        assert_eq!(api.methods(), vec![Method::GET]);
    }
}
