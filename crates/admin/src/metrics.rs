//! Prometheus exposition text parsing and grouping
//!
//! Parsing is tolerant: lines that do not look like a `# HELP`, `# TYPE` or
//! sample line are skipped. Sample values are kept verbatim (`+Inf`, `NaN`
//! and exponent notation pass through untouched).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// `name{labels} value [timestamp]`
static SAMPLE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z_:][a-zA-Z0-9_:]*)(?:\{(.*)\})?\s+(\S+)(?:\s+\S+)?$")
        .expect("sample line pattern")
});

/// `key="value"`, honouring backslash escapes inside the value
static LABEL_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_][a-zA-Z0-9_]*)="((?:[^"\\]|\\.)*)""#).expect("label pair pattern")
});

/// Name suffix of cumulative histogram buckets
const BUCKET_SUFFIX: &str = "_bucket";

/// One sample line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub labels: BTreeMap<String, String>,
    pub value: String,
}

/// A metric family with its help text, type and samples
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MetricSeries {
    pub name: String,
    pub help: String,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub samples: Vec<MetricSample>,
    /// Exactly one sample and it has no labels
    pub simple: bool,
}

impl MetricSeries {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn is_simple(&self) -> bool {
        self.samples.len() == 1 && self.samples[0].labels.is_empty()
    }
}

fn series<'a>(map: &'a mut BTreeMap<String, MetricSeries>, name: &str) -> &'a mut MetricSeries {
    map.entry(name.to_string())
        .or_insert_with(|| MetricSeries::new(name))
}

/// Split `<name> <rest>` after a directive prefix
fn directive(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim_start();
    let (name, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if name.is_empty() {
        return None;
    }
    Some((name, text.trim()))
}

fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    LABEL_PAIR
        .captures_iter(raw)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Parse exposition text into series keyed by metric name.
///
/// Series are created on first mention, so HELP/TYPE lines may appear before
/// or after the samples they describe.
pub fn parse_prometheus_text(text: Option<&str>) -> BTreeMap<String, MetricSeries> {
    let mut map = BTreeMap::new();

    for line in text.unwrap_or_default().lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("# HELP ") {
            if let Some((name, help)) = directive(rest) {
                series(&mut map, name).help = help.to_string();
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("# TYPE ") {
            if let Some((name, metric_type)) = directive(rest) {
                series(&mut map, name).metric_type = metric_type.to_string();
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let Some(caps) = SAMPLE_LINE.captures(line) else {
            continue;
        };

        let labels = caps
            .get(2)
            .map(|m| parse_labels(m.as_str()))
            .unwrap_or_default();

        series(&mut map, &caps[1]).samples.push(MetricSample {
            labels,
            value: caps[3].to_string(),
        });
    }

    for series in map.values_mut() {
        series.simple = series.is_simple();
    }

    map
}

/// Presentation bucket for related series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricGroup {
    pub id: &'static str,
    pub label: &'static str,
    pub metrics: Vec<MetricSeries>,
}

/// Fixed buckets in display order. The last entry catches everything.
const GROUPS: &[(&str, &str, &str)] = &[
    ("http", "HTTP Server", "caddy_http_"),
    ("reverse_proxy", "Reverse Proxy", "caddy_reverse_proxy_"),
    ("admin", "Admin API", "caddy_admin_"),
    ("runtime", "Go Runtime", "go_"),
    ("process", "Process", "process_"),
    ("other", "Other", ""),
];

/// Group id a metric name falls into
pub fn classify(name: &str) -> &'static str {
    GROUPS
        .iter()
        .find(|(_, _, prefix)| name.starts_with(prefix))
        .map(|(id, _, _)| *id)
        .unwrap_or("other")
}

/// Bucket parsed series by name prefix, dropping histogram buckets and empty
/// series. Groups with nothing in them are omitted.
pub fn group_metrics(map: &BTreeMap<String, MetricSeries>) -> Vec<MetricGroup> {
    let mut groups: Vec<MetricGroup> = GROUPS
        .iter()
        .map(|(id, label, _)| MetricGroup {
            id: *id,
            label: *label,
            metrics: Vec::new(),
        })
        .collect();

    for (name, series) in map {
        if name.ends_with(BUCKET_SUFFIX) || series.samples.is_empty() {
            continue;
        }

        let id = classify(name);
        if let Some(group) = groups.iter_mut().find(|g| g.id == id) {
            let mut series = series.clone();
            series.simple = series.is_simple();
            group.metrics.push(series);
        }
    }

    groups.retain(|g| !g.metrics.is_empty());
    groups
}
