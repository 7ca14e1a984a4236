//! Live upstream health as reported by the reverse proxy

use serde::Serialize;
use serde_json::Value;

/// One entry of `/reverse_proxy/upstreams`.
///
/// Decoding is lenient so every entry is counted: only an explicit
/// `"healthy": false` marks an upstream down, and missing or ill-typed fields
/// fall back to empty/zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UpstreamStatus {
    pub address: String,
    pub healthy: bool,
    pub num_requests: i64,
    pub fails: i64,
}

impl UpstreamStatus {
    fn from_entry(entry: &Value) -> Self {
        let count = |key: &str| entry.get(key).and_then(Value::as_i64).unwrap_or(0);

        Self {
            address: entry
                .get("address")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            healthy: entry.get("healthy").and_then(Value::as_bool) != Some(false),
            num_requests: count("num_requests"),
            fails: count("fails"),
        }
    }
}

/// Decode the upstream list, one status per array entry.
/// Anything other than an array yields an empty list.
pub fn parse_upstreams(data: Option<&Value>) -> Vec<UpstreamStatus> {
    data.and_then(Value::as_array)
        .map(|entries| entries.iter().map(UpstreamStatus::from_entry).collect())
        .unwrap_or_default()
}

/// Up/down tally over a set of upstreams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpstreamStats {
    pub total: usize,
    pub up: usize,
    pub down: usize,
}

impl UpstreamStats {
    pub fn from_statuses(statuses: &[UpstreamStatus]) -> Self {
        let down = statuses.iter().filter(|s| !s.healthy).count();
        Self {
            total: statuses.len(),
            up: statuses.len() - down,
            down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_upstreams() {
        let data = json!([
            {"address": "10.0.0.1:80", "num_requests": 4, "fails": 0},
            {"address": "10.0.0.2:80", "healthy": false, "fails": 3},
            {"address": "10.0.0.3:80", "healthy": true},
            {"num_requests": 1}
        ]);

        let upstreams = parse_upstreams(Some(&data));
        assert_eq!(upstreams.len(), 4);
        assert!(upstreams[0].healthy);
        assert_eq!(upstreams[0].num_requests, 4);
        assert!(!upstreams[1].healthy);
        assert_eq!(upstreams[1].fails, 3);
        assert_eq!(upstreams[3].address, "");
        assert_eq!(upstreams[3].num_requests, 1);
    }

    #[test]
    fn test_parse_upstreams_counts_loose_entries() {
        let data = json!([
            {"address": "a:1", "healthy": null},
            {"address": "b:1", "num_requests": -1},
            {"address": "c:1", "healthy": false},
            {"healthy": "no"},
            "d:1"
        ]);

        let upstreams = parse_upstreams(Some(&data));
        assert_eq!(upstreams.len(), 5);
        assert!(upstreams[0].healthy);
        assert_eq!(upstreams[1].num_requests, -1);
        assert!(upstreams[3].healthy);
        assert_eq!(upstreams[4], UpstreamStatus { healthy: true, ..Default::default() });

        let stats = UpstreamStats::from_statuses(&upstreams);
        assert_eq!(stats, UpstreamStats { total: 5, up: 4, down: 1 });
    }

    #[test]
    fn test_parse_upstreams_non_array() {
        assert!(parse_upstreams(None).is_empty());
        assert!(parse_upstreams(Some(&Value::Null)).is_empty());
        assert!(parse_upstreams(Some(&json!({"address": "x"}))).is_empty());
    }

    #[test]
    fn test_stats() {
        let data = json!([
            {"address": "a"},
            {"address": "b", "healthy": false},
            {"address": "c", "healthy": true}
        ]);

        let stats = UpstreamStats::from_statuses(&parse_upstreams(Some(&data)));
        assert_eq!(stats, UpstreamStats { total: 3, up: 2, down: 1 });
        assert_eq!(UpstreamStats::from_statuses(&[]), UpstreamStats::default());
    }
}
