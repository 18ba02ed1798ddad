use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::sanitize::{sanitize_field, sanitize_optional};

/// One observed HTTP call, as submitted by an ingesting service.
///
/// `created_at` defaults to the ingestion time when absent. All free-text
/// fields are sanitized before persistence or comparison; see
/// [`TelemetryRecord::sanitized`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRecord {
    pub service: String,
    pub node: Option<String>,
    pub method: String,
    pub endpoint: String,
    pub status: u16,
    pub response_time: i64,
    pub consumer: String,
    pub context: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TelemetryRecord {
    /// Returns the record with every free-text field sanitized.
    pub fn sanitized(self) -> Self {
        Self {
            service: sanitize_field(&self.service),
            node: sanitize_optional(self.node.as_deref()),
            method: sanitize_field(&self.method),
            endpoint: sanitize_field(&self.endpoint),
            status: self.status,
            response_time: self.response_time,
            consumer: sanitize_field(&self.consumer),
            context: sanitize_optional(self.context.as_deref()),
            created_at: self.created_at,
        }
    }
}

/// A raw telemetry row read back from the store. Unlike [`TelemetryRecord`]
/// the event timestamp is always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    pub service: String,
    pub node: Option<String>,
    pub method: String,
    pub endpoint: String,
    pub status: u16,
    pub response_time: i64,
    pub consumer: String,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One pre-aggregated rollup row, keyed by the full dimension tuple plus
/// bucket. Rollup tables are refreshed out-of-band and read-only here.
///
/// `p95_response_time` is nullable: a percentile over pre-aggregated data is
/// only approximate and the materializer may omit it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollupRow {
    pub service: String,
    pub node: Option<String>,
    pub method: String,
    pub endpoint: String,
    pub consumer: String,
    pub context: Option<String>,
    pub status: u16,
    pub bucket: DateTime<Utc>,
    pub count_requests: u64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub avg_response_time: f64,
    pub p95_response_time: Option<f64>,
}

/// Aggregation interval requested by a caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Interval {
    #[serde(rename = "1min")]
    OneMin,
    #[serde(rename = "5min")]
    FiveMin,
    #[serde(rename = "1hour")]
    OneHour,
}

impl Interval {
    pub const VALID: &'static [&'static str] = &["1min", "5min", "1hour"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneMin => "1min",
            Self::FiveMin => "5min",
            Self::OneHour => "1hour",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "1min" => Some(Self::OneMin),
            "5min" => Some(Self::FiveMin),
            "1hour" => Some(Self::OneHour),
            _ => None,
        }
    }
}

/// Dimension filters applied to a dashboard query. Every field maps to a
/// fixed column of the telemetry schema; filter values are always bound as
/// parameters, never interpolated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsFilter {
    pub service: Option<String>,
    pub node: Option<String>,
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub consumer: Option<String>,
    pub context: Option<String>,
}

/// Caller-supplied filter/time-window/interval descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsQuery {
    #[serde(flatten)]
    pub filter: MetricsFilter,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub interval: Option<Interval>,
}

/// A resolved, inclusive query time window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// One gap-filled point of the dashboard time series. Buckets without events
/// carry `total_requests = 0` and null latencies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSeriesPoint {
    pub bucket: DateTime<Utc>,
    pub total_requests: u64,
    pub min_latency: Option<f64>,
    pub avg_latency: Option<f64>,
    pub p95_latency: Option<f64>,
    pub max_latency: Option<f64>,
}

/// Global latency summary over the whole filtered window.
///
/// At rollup tiers `p95_latency` is the max of per-bucket p95 values, a
/// deliberate conservative upper estimate; only the raw tier computes an
/// exact percentile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub avg_latency: Option<f64>,
    pub min_latency: Option<f64>,
    pub p95_latency: Option<f64>,
    pub max_latency: Option<f64>,
}

impl MetricsSummary {
    pub fn empty() -> Self {
        Self {
            total_requests: 0,
            avg_latency: None,
            min_latency: None,
            p95_latency: None,
            max_latency: None,
        }
    }
}

/// Per-endpoint traffic and error accounting, volume-descending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointAggregate {
    pub endpoint: String,
    pub method: String,
    pub service: String,
    pub total_requests: u64,
    pub error_count: u64,
    pub error_rate: f64,
}

/// Per-service status-class breakdown plus the full status → count map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusDistribution {
    pub service: String,
    pub total_requests: u64,
    pub success_2xx: u64,
    pub warning_3xx: u64,
    pub error_4xx_5xx: u64,
    pub status_breakdown: BTreeMap<u16, u64>,
}

/// Per-consumer traffic and error accounting, volume-descending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerAggregate {
    pub consumer: String,
    pub total_requests: u64,
    pub error_count: u64,
    pub error_rate: f64,
}

/// Global totals for the system overview card. Never absent from a
/// response; an empty window yields a zero-valued record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemOverview {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub avg_latency: Option<f64>,
}

impl SystemOverview {
    pub fn empty() -> Self {
        Self {
            total_requests: 0,
            total_errors: 0,
            error_rate: 0.0,
            avg_latency: None,
        }
    }
}

/// The assembled multi-shape dashboard payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardResponse {
    pub time_series: Vec<TimeSeriesPoint>,
    pub metrics_summary: MetricsSummary,
    pub endpoints: Vec<EndpointAggregate>,
    pub status_distribution: Vec<StatusDistribution>,
    pub consumers: Vec<ConsumerAggregate>,
    pub system_overview: SystemOverview,
    pub distinct_nodes: Vec<String>,
    pub distinct_contexts: Vec<String>,
}

/// Display thresholds for dashboard status indicators. Error-rate values are
/// percentages, latency values milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DashboardThresholds {
    pub error_rate_success_threshold: f64,
    pub error_rate_warning_threshold: f64,
    pub latency_success_threshold: f64,
    pub latency_warning_threshold: f64,
}

impl Default for DashboardThresholds {
    fn default() -> Self {
        Self {
            error_rate_success_threshold: 1.0,
            error_rate_warning_threshold: 2.0,
            latency_success_threshold: 300.0,
            latency_warning_threshold: 600.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Interval, TelemetryRecord};

    #[test]
    fn sanitized_cleans_every_free_text_field() {
        let record = TelemetryRecord {
            service: "<b>payments</b>".to_string(),
            node: Some("node\r\n1".to_string()),
            method: "GET\0".to_string(),
            endpoint: "/orders<script>".to_string(),
            status: 200,
            response_time: 12,
            consumer: "  partner  ".to_string(),
            context: None,
            created_at: None,
        };

        let clean = record.sanitized();
        assert_eq!(clean.service, "payments");
        assert_eq!(clean.node.as_deref(), Some("node 1"));
        assert_eq!(clean.method, "GET");
        assert_eq!(clean.endpoint, "/orders");
        assert_eq!(clean.consumer, "partner");
        assert_eq!(clean.context, None);
    }

    #[test]
    fn interval_round_trips_its_wire_names() {
        for name in Interval::VALID {
            let parsed = Interval::from_str(name).expect("valid interval");
            assert_eq!(parsed.as_str(), *name);
        }
        assert_eq!(Interval::from_str("2min"), None);
    }
}
