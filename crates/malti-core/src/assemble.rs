//! Dashboard assembly: turns the fetched base set for a tier into the
//! multi-shape dashboard response, with gap-filling and safe defaults.
//!
//! Numeric policy, applied uniformly: an "error" is `status >= 400` except
//! `401` (unauthenticated calls are excluded from error-rate accounting by
//! business rule); error rates are percentages and exactly `0` over empty
//! sets. Rollup merges weight averages by request count. Rollup p95 is the
//! max of per-bucket p95 values — a conservative upper estimate, traded
//! deliberately against the cost of scanning raw events; only the raw tier
//! computes an exact percentile.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::planner::{self, QueryPlan};
use crate::storage::{DashboardSource, StoreError, TelemetryStore, TierRows};
use crate::types::{
    ConsumerAggregate, DashboardResponse, EndpointAggregate, Interval, MetricsQuery,
    MetricsSummary, RawEvent, RollupRow, StatusDistribution, SystemOverview, TimeSeriesPoint,
    TimeWindow,
};

/// Hard cap on the realtime query window.
pub const REALTIME_MAX_MINUTES: i64 = 60;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Time range cannot exceed 60 minutes for real-time metrics (got {requested_minutes} minutes)")]
    RangeTooWide { requested_minutes: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues the tier-specific fetch and merges the result shapes into one
/// response. Holds no per-request state; every call re-executes against the
/// chosen tier.
pub struct DashboardAssembler {
    store: Arc<dyn TelemetryStore>,
}

impl DashboardAssembler {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    pub async fn dashboard_metrics(
        &self,
        query: MetricsQuery,
    ) -> Result<DashboardResponse, MetricsError> {
        self.dashboard_metrics_at(query, Utc::now()).await
    }

    /// [`DashboardAssembler::dashboard_metrics`] with an injected clock.
    pub async fn dashboard_metrics_at(
        &self,
        query: MetricsQuery,
        now: DateTime<Utc>,
    ) -> Result<DashboardResponse, MetricsError> {
        let plan = planner::plan(&query, now);
        let source = self.store.fetch_dashboard_source(&plan, &query.filter).await?;
        Ok(assemble_response(&plan, source))
    }

    /// Realtime specialization: forced to 1-minute buckets over raw data,
    /// window capped at [`REALTIME_MAX_MINUTES`]. Any caller-supplied
    /// interval is overridden; the range check runs before any storage call.
    pub async fn realtime_metrics(
        &self,
        query: MetricsQuery,
    ) -> Result<DashboardResponse, MetricsError> {
        self.realtime_metrics_at(query, Utc::now()).await
    }

    pub async fn realtime_metrics_at(
        &self,
        mut query: MetricsQuery,
        now: DateTime<Utc>,
    ) -> Result<DashboardResponse, MetricsError> {
        query.interval = Some(Interval::OneMin);

        if let (Some(start), Some(end)) = (query.start_time, query.end_time) {
            let span = end - start;
            if span > Duration::minutes(REALTIME_MAX_MINUTES) {
                return Err(MetricsError::RangeTooWide {
                    requested_minutes: span.num_minutes(),
                });
            }
        }

        self.dashboard_metrics_at(query, now).await
    }
}

/// Build the full response from one fetched source. Pure; unit-tested
/// per shape.
pub fn assemble_response(plan: &QueryPlan, source: DashboardSource) -> DashboardResponse {
    let counted = counted_rows(&source.rows);

    let (time_series, metrics_summary, overall_avg_latency) = match &source.rows {
        TierRows::Raw(events) => (
            time_series_from_raw(events, plan),
            summary_from_raw(events),
            mean_latency(events),
        ),
        TierRows::Rollup(rows) => (
            time_series_from_rollups(rows, plan),
            summary_from_rollups(rows),
            weighted_avg_latency(rows.iter().map(|r| (r.avg_response_time, r.count_requests))),
        ),
    };

    DashboardResponse {
        time_series,
        metrics_summary,
        endpoints: endpoints_shape(&counted),
        status_distribution: status_shape(&counted),
        consumers: consumers_shape(&counted),
        system_overview: overview_shape(&counted, overall_avg_latency),
        distinct_nodes: source.distinct_nodes,
        distinct_contexts: source.distinct_contexts,
    }
}

fn is_error(status: u16) -> bool {
    status >= 400 && status != 401
}

fn error_rate(errors: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64 * 100.0
    }
}

// One dimensional row with its request weight: raw events weigh 1, rollup
// rows weigh `count_requests`. Lets the count-based shapes share a single
// implementation across tiers.
struct CountedRow<'a> {
    service: &'a str,
    method: &'a str,
    endpoint: &'a str,
    consumer: &'a str,
    status: u16,
    count: u64,
}

fn counted_rows(rows: &TierRows) -> Vec<CountedRow<'_>> {
    match rows {
        TierRows::Raw(events) => events
            .iter()
            .map(|event| CountedRow {
                service: &event.service,
                method: &event.method,
                endpoint: &event.endpoint,
                consumer: &event.consumer,
                status: event.status,
                count: 1,
            })
            .collect(),
        TierRows::Rollup(rollups) => rollups
            .iter()
            .map(|row| CountedRow {
                service: &row.service,
                method: &row.method,
                endpoint: &row.endpoint,
                consumer: &row.consumer,
                status: row.status,
                count: row.count_requests,
            })
            .collect(),
    }
}

fn endpoints_shape(rows: &[CountedRow<'_>]) -> Vec<EndpointAggregate> {
    let mut grouped: BTreeMap<(&str, &str, &str), (u64, u64)> = BTreeMap::new();
    for row in rows {
        let entry = grouped
            .entry((row.endpoint, row.method, row.service))
            .or_insert((0, 0));
        entry.0 += row.count;
        if is_error(row.status) {
            entry.1 += row.count;
        }
    }

    let mut endpoints: Vec<EndpointAggregate> = grouped
        .into_iter()
        .map(|((endpoint, method, service), (total, errors))| EndpointAggregate {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            service: service.to_string(),
            total_requests: total,
            error_count: errors,
            error_rate: error_rate(errors, total),
        })
        .collect();
    // Stable sort: ties keep the BTreeMap key order, so output is
    // deterministic.
    endpoints.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));
    endpoints
}

fn status_shape(rows: &[CountedRow<'_>]) -> Vec<StatusDistribution> {
    #[derive(Default)]
    struct ServiceAccum {
        total: u64,
        success_2xx: u64,
        warning_3xx: u64,
        error_4xx_5xx: u64,
        breakdown: BTreeMap<u16, u64>,
    }

    let mut grouped: BTreeMap<&str, ServiceAccum> = BTreeMap::new();
    for row in rows {
        let accum = grouped.entry(row.service).or_default();
        accum.total += row.count;
        match row.status {
            200..=299 => accum.success_2xx += row.count,
            300..=399 => accum.warning_3xx += row.count,
            // 401 stays in the 4xx class here; only error-*rate* accounting
            // excludes it.
            400.. => accum.error_4xx_5xx += row.count,
            _ => {}
        }
        *accum.breakdown.entry(row.status).or_insert(0) += row.count;
    }

    let mut distribution: Vec<StatusDistribution> = grouped
        .into_iter()
        .map(|(service, accum)| StatusDistribution {
            service: service.to_string(),
            total_requests: accum.total,
            success_2xx: accum.success_2xx,
            warning_3xx: accum.warning_3xx,
            error_4xx_5xx: accum.error_4xx_5xx,
            status_breakdown: accum.breakdown,
        })
        .collect();
    distribution.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));
    distribution
}

fn consumers_shape(rows: &[CountedRow<'_>]) -> Vec<ConsumerAggregate> {
    let mut grouped: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for row in rows {
        let entry = grouped.entry(row.consumer).or_insert((0, 0));
        entry.0 += row.count;
        if is_error(row.status) {
            entry.1 += row.count;
        }
    }

    let mut consumers: Vec<ConsumerAggregate> = grouped
        .into_iter()
        .map(|(consumer, (total, errors))| ConsumerAggregate {
            consumer: consumer.to_string(),
            total_requests: total,
            error_count: errors,
            error_rate: error_rate(errors, total),
        })
        .collect();
    consumers.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));
    consumers
}

fn overview_shape(rows: &[CountedRow<'_>], avg_latency: Option<f64>) -> SystemOverview {
    let total: u64 = rows.iter().map(|row| row.count).sum();
    let errors: u64 = rows
        .iter()
        .filter(|row| is_error(row.status))
        .map(|row| row.count)
        .sum();

    SystemOverview {
        total_requests: total,
        total_errors: errors,
        error_rate: error_rate(errors, total),
        avg_latency,
    }
}

/// Floor a timestamp to its epoch-aligned bucket.
fn bucket_floor(timestamp: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let step = width.num_seconds().max(1);
    let aligned = timestamp.timestamp().div_euclid(step) * step;
    DateTime::<Utc>::from_timestamp(aligned, 0).unwrap_or(timestamp)
}

/// The gap-fill axis. Buckets are epoch-aligned and the series runs from
/// the bucket containing `start` through the bucket containing `end`,
/// inclusive: an aligned 15-minute window at 5-minute buckets yields 4
/// points. Sparse data must not compress the x-axis.
fn bucket_series(window: TimeWindow, width: Duration) -> Vec<DateTime<Utc>> {
    let mut buckets = Vec::new();
    if window.end < window.start {
        return buckets;
    }
    let mut bucket = bucket_floor(window.start, width);
    while bucket <= window.end {
        buckets.push(bucket);
        bucket += width;
    }
    buckets
}

fn gap_point(bucket: DateTime<Utc>) -> TimeSeriesPoint {
    TimeSeriesPoint {
        bucket,
        total_requests: 0,
        min_latency: None,
        avg_latency: None,
        p95_latency: None,
        max_latency: None,
    }
}

fn time_series_from_raw(events: &[RawEvent], plan: &QueryPlan) -> Vec<TimeSeriesPoint> {
    let mut grouped: HashMap<DateTime<Utc>, Vec<f64>> = HashMap::new();
    for event in events {
        grouped
            .entry(bucket_floor(event.created_at, plan.bucket_width))
            .or_default()
            .push(event.response_time as f64);
    }

    bucket_series(plan.window, plan.bucket_width)
        .into_iter()
        .map(|bucket| match grouped.get(&bucket) {
            Some(times) => {
                let mut sorted = times.clone();
                sorted.sort_by(|a, b| a.total_cmp(b));
                TimeSeriesPoint {
                    bucket,
                    total_requests: sorted.len() as u64,
                    min_latency: sorted.first().copied(),
                    avg_latency: Some(sorted.iter().sum::<f64>() / sorted.len() as f64),
                    p95_latency: Some(percentile_cont(&sorted, 0.95)),
                    max_latency: sorted.last().copied(),
                }
            }
            None => gap_point(bucket),
        })
        .collect()
}

fn time_series_from_rollups(rollups: &[RollupRow], plan: &QueryPlan) -> Vec<TimeSeriesPoint> {
    #[derive(Default)]
    struct BucketAccum {
        count: u64,
        weighted_latency: f64,
        min: Option<f64>,
        max: Option<f64>,
        p95: Option<f64>,
    }

    let mut grouped: HashMap<DateTime<Utc>, BucketAccum> = HashMap::new();
    for row in rollups {
        let accum = grouped
            .entry(bucket_floor(row.bucket, plan.bucket_width))
            .or_default();
        accum.count += row.count_requests;
        accum.weighted_latency += row.avg_response_time * row.count_requests as f64;
        accum.min = Some(accum.min.map_or(row.min_response_time, |current| {
            current.min(row.min_response_time)
        }));
        accum.max = Some(accum.max.map_or(row.max_response_time, |current| {
            current.max(row.max_response_time)
        }));
        if let Some(p95) = row.p95_response_time {
            accum.p95 = Some(accum.p95.map_or(p95, |current| current.max(p95)));
        }
    }

    bucket_series(plan.window, plan.bucket_width)
        .into_iter()
        .map(|bucket| match grouped.get(&bucket) {
            Some(accum) if accum.count > 0 => TimeSeriesPoint {
                bucket,
                total_requests: accum.count,
                min_latency: accum.min,
                avg_latency: Some(accum.weighted_latency / accum.count as f64),
                p95_latency: accum.p95,
                max_latency: accum.max,
            },
            _ => gap_point(bucket),
        })
        .collect()
}

fn summary_from_raw(events: &[RawEvent]) -> MetricsSummary {
    if events.is_empty() {
        return MetricsSummary::empty();
    }

    let mut sorted: Vec<f64> = events.iter().map(|e| e.response_time as f64).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    MetricsSummary {
        total_requests: sorted.len() as u64,
        avg_latency: Some(sorted.iter().sum::<f64>() / sorted.len() as f64),
        min_latency: sorted.first().copied(),
        p95_latency: Some(percentile_cont(&sorted, 0.95)),
        max_latency: sorted.last().copied(),
    }
}

fn summary_from_rollups(rollups: &[RollupRow]) -> MetricsSummary {
    let total: u64 = rollups.iter().map(|row| row.count_requests).sum();
    if total == 0 {
        return MetricsSummary::empty();
    }

    let min = rollups
        .iter()
        .map(|row| row.min_response_time)
        .fold(f64::INFINITY, f64::min);
    let max = rollups
        .iter()
        .map(|row| row.max_response_time)
        .fold(f64::NEG_INFINITY, f64::max);
    let p95 = rollups
        .iter()
        .filter_map(|row| row.p95_response_time)
        .fold(None, |acc: Option<f64>, p| {
            Some(acc.map_or(p, |current| current.max(p)))
        });

    MetricsSummary {
        total_requests: total,
        avg_latency: weighted_avg_latency(
            rollups
                .iter()
                .map(|row| (row.avg_response_time, row.count_requests)),
        ),
        min_latency: Some(min),
        p95_latency: p95,
        max_latency: Some(max),
    }
}

fn mean_latency(events: &[RawEvent]) -> Option<f64> {
    if events.is_empty() {
        return None;
    }
    Some(events.iter().map(|e| e.response_time as f64).sum::<f64>() / events.len() as f64)
}

/// Average weighted by request count. A naive mean of per-bucket averages
/// would skew toward quiet buckets.
fn weighted_avg_latency(parts: impl Iterator<Item = (f64, u64)>) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut total: u64 = 0;
    for (avg, count) in parts {
        weighted_sum += avg * count as f64;
        total += count;
    }
    if total == 0 {
        None
    } else {
        Some(weighted_sum / total as f64)
    }
}

/// PERCENTILE_CONT semantics: linear interpolation at rank
/// `fraction * (n - 1)` over the sorted sample.
fn percentile_cont(sorted: &[f64], fraction: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = fraction * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}
