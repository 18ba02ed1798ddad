pub mod assemble;
pub mod auth;
pub mod ingest;
pub mod planner;
pub mod sanitize;
pub mod storage;
pub mod types;

pub use assemble::{DashboardAssembler, MetricsError, REALTIME_MAX_MINUTES};
pub use auth::{CredentialCache, Identity, IdentityKind, Permission};
pub use ingest::{validate_batch, IngestError};
pub use planner::{plan, QueryPlan, Tier};
pub use sanitize::{sanitize_field, sanitize_optional};
pub use storage::{
    DashboardSource, SqliteTelemetryStore, StoreError, StoreResult, TelemetryStore, TierRows,
};
pub use types::{
    ConsumerAggregate, DashboardResponse, DashboardThresholds, EndpointAggregate, Interval,
    MetricsFilter, MetricsQuery, MetricsSummary, RawEvent, RollupRow, StatusDistribution,
    SystemOverview, TelemetryRecord, TimeSeriesPoint, TimeWindow,
};
