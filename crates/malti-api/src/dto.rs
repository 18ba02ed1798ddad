//! Wire-level request and response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use malti_core::{
    DashboardThresholds, Identity, Interval, MetricsFilter, MetricsQuery, TelemetryRecord,
};

use crate::error::AppError;

/// Body of `POST /api/v1/ingest`.
#[derive(Debug, Deserialize)]
pub struct TelemetryBatch {
    pub requests: Vec<TelemetryRecord>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub message: String,
    pub count: usize,
    pub service: String,
}

/// Query string of `GET /api/v1/metrics/aggregate`.
///
/// `interval` is kept as a raw string so an unknown value maps to a 422 with
/// the valid set listed, instead of a generic deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct AggregateParams {
    pub service: Option<String>,
    pub node: Option<String>,
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub consumer: Option<String>,
    pub context: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub interval: Option<String>,
}

impl AggregateParams {
    pub fn into_query(self) -> Result<MetricsQuery, AppError> {
        let interval = match self.interval {
            Some(raw) => Some(Interval::from_str(&raw).ok_or_else(|| {
                AppError::InvalidInterval {
                    got: raw,
                    valid: Interval::VALID.join(", "),
                }
            })?),
            None => None,
        };

        Ok(MetricsQuery {
            filter: MetricsFilter {
                service: self.service,
                node: self.node,
                method: self.method,
                endpoint: self.endpoint,
                consumer: self.consumer,
                context: self.context,
            },
            start_time: self.start_time,
            end_time: self.end_time,
            interval,
        })
    }
}

/// Query string of `GET /api/v1/metrics/aggregate/realtime`. No interval:
/// the realtime endpoint always resolves to 1-minute buckets.
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeParams {
    pub service: Option<String>,
    pub node: Option<String>,
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub consumer: Option<String>,
    pub context: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RealtimeParams {
    pub fn into_query(self) -> MetricsQuery {
        MetricsQuery {
            filter: MetricsFilter {
                service: self.service,
                node: self.node,
                method: self.method,
                endpoint: self.endpoint,
                consumer: self.consumer,
                context: self.context,
            },
            start_time: self.start_time,
            end_time: self.end_time,
            interval: None,
        }
    }
}

/// Response of `GET /api/v1/auth/test`: the resolved identity plus the
/// dashboard display thresholds the caller should render with.
#[derive(Debug, Serialize)]
pub struct AuthTestResponse {
    pub authenticated: bool,
    pub user: Identity,
    pub timestamp: DateTime<Utc>,
    pub dashboard_thresholds: DashboardThresholds,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::AggregateParams;
    use crate::error::AppError;
    use malti_core::Interval;

    #[test]
    fn unknown_interval_is_rejected_with_the_valid_set() {
        let params = AggregateParams {
            interval: Some("2min".to_string()),
            ..AggregateParams::default()
        };
        let err = params.into_query().expect_err("invalid interval");
        match err {
            AppError::InvalidInterval { got, valid } => {
                assert_eq!(got, "2min");
                assert_eq!(valid, "1min, 5min, 1hour");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn known_interval_and_filters_carry_through() {
        let params = AggregateParams {
            service: Some("payments".to_string()),
            interval: Some("1hour".to_string()),
            ..AggregateParams::default()
        };
        let query = params.into_query().expect("valid params");
        assert_eq!(query.interval, Some(Interval::OneHour));
        assert_eq!(query.filter.service.as_deref(), Some("payments"));
        assert_eq!(query.filter.node, None);
    }
}
