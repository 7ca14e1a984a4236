//! Flattened route views over the Caddy HTTP server set
//!
//! A server set maps server names to documents holding a `routes` sequence.
//! Each route has a `handle` list of handlers; a handler may carry
//! `upstreams` (`[{ "dial": "host:port" }]`) and/or a nested `routes`
//! sequence (subroute) of any depth. Absent or mistyped fields degrade to
//! empty sequences.
//!
//! The walk has no cycle guard. A JSON document parsed from the wire is a
//! tree, so recursion always terminates; depth is bounded by the document.

use serde::Serialize;
use serde_json::Value;

/// Display-ready projection of one route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRoute {
    pub server_name: String,
    /// The route document as returned by the admin API
    pub route: Value,
    /// Position in the server's route sequence at read time; not a stable id
    pub index: usize,
    /// Dial addresses reachable from this route, in handler order
    pub upstreams: Vec<String>,
}

impl FlatRoute {
    /// Host matchers across all match sets
    pub fn hosts(&self) -> Vec<&str> {
        self.matcher_values("host")
    }

    /// Path matchers across all match sets
    pub fn paths(&self) -> Vec<&str> {
        self.matcher_values("path")
    }

    fn matcher_values(&self, key: &str) -> Vec<&str> {
        as_slice(self.route.get("match"))
            .iter()
            .flat_map(|m| as_slice(m.get(key)))
            .filter_map(Value::as_str)
            .collect()
    }
}

/// Handler shape as far as the walk is concerned
#[derive(Debug)]
enum HandlerNode<'a> {
    /// Proxy handler with its upstream list
    Upstream(&'a [Value]),
    /// Subroute handler with its nested routes
    Subroute(&'a [Value]),
    /// Proxy handler that also nests routes
    Both {
        upstreams: &'a [Value],
        routes: &'a [Value],
    },
    Opaque,
}

impl<'a> HandlerNode<'a> {
    fn classify(handler: &'a Value) -> Self {
        let upstreams = handler
            .get("upstreams")
            .and_then(Value::as_array)
            .map(Vec::as_slice);
        let routes = handler
            .get("routes")
            .and_then(Value::as_array)
            .map(Vec::as_slice);

        match (upstreams, routes) {
            (Some(upstreams), Some(routes)) => HandlerNode::Both { upstreams, routes },
            (Some(upstreams), None) => HandlerNode::Upstream(upstreams),
            (None, Some(routes)) => HandlerNode::Subroute(routes),
            (None, None) => HandlerNode::Opaque,
        }
    }
}

fn as_slice(value: Option<&Value>) -> &[Value] {
    value.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// Collect every dial address reachable from a `handle` list
pub fn extract_upstreams(handlers: Option<&Value>) -> Vec<String> {
    let mut dials = Vec::new();
    walk_handlers(as_slice(handlers), &mut dials);
    dials
}

fn walk_handlers(handlers: &[Value], dials: &mut Vec<String>) {
    for handler in handlers {
        match HandlerNode::classify(handler) {
            HandlerNode::Upstream(upstreams) => push_dials(upstreams, dials),
            HandlerNode::Subroute(routes) => walk_routes(routes, dials),
            HandlerNode::Both { upstreams, routes } => {
                push_dials(upstreams, dials);
                walk_routes(routes, dials);
            }
            HandlerNode::Opaque => {}
        }
    }
}

fn walk_routes(routes: &[Value], dials: &mut Vec<String>) {
    for route in routes {
        walk_handlers(as_slice(route.get("handle")), dials);
    }
}

fn push_dials(upstreams: &[Value], dials: &mut Vec<String>) {
    dials.extend(
        upstreams
            .iter()
            .filter_map(|u| u.get("dial").and_then(Value::as_str))
            .filter(|dial| !dial.is_empty())
            .map(str::to_string),
    );
}

/// Flatten every server's routes, grouped by server in document order and by
/// ascending index within a server
pub fn extract_routes(servers: Option<&Value>) -> Vec<FlatRoute> {
    let Some(servers) = servers.and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut flat = Vec::new();
    for (server_name, server) in servers {
        for (index, route) in as_slice(server.get("routes")).iter().enumerate() {
            flat.push(FlatRoute {
                server_name: server_name.clone(),
                route: route.clone(),
                index,
                upstreams: extract_upstreams(route.get("handle")),
            });
        }
    }
    flat
}
