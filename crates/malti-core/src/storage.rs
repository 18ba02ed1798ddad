//! Telemetry persistence behind an async trait.
//!
//! The SQLite implementation runs blocking work on the tokio blocking pool
//! and opens a fresh WAL-mode connection per call. Rollup tables are treated
//! as read-only here; they are materialized out-of-band on a fixed cadence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection};
use thiserror::Error;

use crate::planner::{QueryPlan, Tier};
use crate::types::{MetricsFilter, RawEvent, RollupRow, TelemetryRecord, TimeWindow};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("time parse error: {0}")]
    Chrono(#[from] chrono::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task join error: {0}")]
    Task(String),

    #[error("invalid telemetry data: {0}")]
    InvalidData(String),
}

/// Base rows for one dashboard query: raw events or rollup rows depending on
/// the planned tier.
#[derive(Debug, Clone, PartialEq)]
pub enum TierRows {
    Raw(Vec<RawEvent>),
    Rollup(Vec<RollupRow>),
}

/// Everything one dashboard assembly needs, fetched as a single read.
/// `distinct_nodes`/`distinct_contexts` are scoped by time window only, for
/// populating filter UI regardless of the active filters.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSource {
    pub rows: TierRows,
    pub distinct_nodes: Vec<String>,
    pub distinct_contexts: Vec<String>,
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn init(&self) -> StoreResult<()>;

    /// Persist a batch as a single transaction: the whole batch commits or
    /// none of it does. Records missing `created_at` get the ingestion time.
    async fn insert_batch(&self, records: Vec<TelemetryRecord>) -> StoreResult<usize>;

    /// Fetch the filtered base set for the planned tier plus the distinct
    /// node/context values observed in the window.
    async fn fetch_dashboard_source(
        &self,
        plan: &QueryPlan,
        filter: &MetricsFilter,
    ) -> StoreResult<DashboardSource>;
}

#[derive(Debug, Clone)]
pub struct SqliteTelemetryStore {
    db_path: PathBuf,
}

impl SqliteTelemetryStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    async fn with_connection<T, F>(&self, func: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&db_path)?;
            func(&mut connection)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
    }

    /// Insert rollup rows directly. Not part of [`TelemetryStore`]: rollup
    /// materialization is external; this exists for tests and backfill
    /// tooling.
    pub async fn seed_rollup_rows(&self, tier: Tier, rows: Vec<RollupRow>) -> StoreResult<()> {
        if tier == Tier::Raw {
            return Err(StoreError::InvalidData(
                "raw tier has no rollup table".to_string(),
            ));
        }
        let table = tier.table();

        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            {
                let sql = format!(
                    "INSERT INTO {table} (service, node, method, endpoint, consumer, context, status, bucket, \
                     count_requests, min_response_time, max_response_time, avg_response_time, p95_response_time) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                );
                let mut stmt = tx.prepare(&sql)?;
                for row in &rows {
                    stmt.execute(params![
                        row.service,
                        row.node,
                        row.method,
                        row.endpoint,
                        row.consumer,
                        row.context,
                        i64::from(row.status),
                        format_timestamp(row.bucket),
                        row.count_requests as i64,
                        row.min_response_time,
                        row.max_response_time,
                        row.avg_response_time,
                        row.p95_response_time,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl TelemetryStore for SqliteTelemetryStore {
    async fn init(&self) -> StoreResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    service TEXT NOT NULL,
                    node TEXT,
                    method TEXT NOT NULL,
                    endpoint TEXT NOT NULL,
                    status INTEGER NOT NULL,
                    response_time INTEGER NOT NULL,
                    consumer TEXT NOT NULL,
                    context TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS requests_5min (
                    service TEXT NOT NULL,
                    node TEXT,
                    method TEXT NOT NULL,
                    endpoint TEXT NOT NULL,
                    consumer TEXT NOT NULL,
                    context TEXT,
                    status INTEGER NOT NULL,
                    bucket TEXT NOT NULL,
                    count_requests INTEGER NOT NULL,
                    min_response_time REAL NOT NULL,
                    max_response_time REAL NOT NULL,
                    avg_response_time REAL NOT NULL,
                    p95_response_time REAL
                );

                CREATE TABLE IF NOT EXISTS requests_1hour (
                    service TEXT NOT NULL,
                    node TEXT,
                    method TEXT NOT NULL,
                    endpoint TEXT NOT NULL,
                    consumer TEXT NOT NULL,
                    context TEXT,
                    status INTEGER NOT NULL,
                    bucket TEXT NOT NULL,
                    count_requests INTEGER NOT NULL,
                    min_response_time REAL NOT NULL,
                    max_response_time REAL NOT NULL,
                    avg_response_time REAL NOT NULL,
                    p95_response_time REAL
                );

                CREATE INDEX IF NOT EXISTS idx_requests_created_at ON requests(created_at);
                CREATE INDEX IF NOT EXISTS idx_requests_service ON requests(service);
                CREATE INDEX IF NOT EXISTS idx_requests_5min_bucket ON requests_5min(bucket);
                CREATE INDEX IF NOT EXISTS idx_requests_1hour_bucket ON requests_1hour(bucket);
                "#,
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_batch(&self, records: Vec<TelemetryRecord>) -> StoreResult<usize> {
        let received_at = Utc::now();

        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO requests (service, node, method, endpoint, status, response_time, consumer, context, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for record in &records {
                    stmt.execute(params![
                        record.service,
                        record.node,
                        record.method,
                        record.endpoint,
                        i64::from(record.status),
                        record.response_time,
                        record.consumer,
                        record.context,
                        format_timestamp(record.created_at.unwrap_or(received_at)),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
        .await
    }

    async fn fetch_dashboard_source(
        &self,
        plan: &QueryPlan,
        filter: &MetricsFilter,
    ) -> StoreResult<DashboardSource> {
        let plan = *plan;
        let filter = filter.clone();

        self.with_connection(move |connection| {
            let rows = match plan.tier {
                Tier::Raw => TierRows::Raw(load_raw_events(connection, &filter, plan.window)?),
                tier => TierRows::Rollup(load_rollup_rows(connection, tier, &filter, plan.window)?),
            };
            let distinct_nodes = load_distinct(connection, plan.tier, "node", plan.window)?;
            let distinct_contexts = load_distinct(connection, plan.tier, "context", plan.window)?;

            Ok(DashboardSource {
                rows,
                distinct_nodes,
                distinct_contexts,
            })
        })
        .await
    }
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let connection = Connection::open(path)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

// Fixed-width UTC timestamps so lexicographic TEXT comparison matches
// chronological order.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: String) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}

fn status_from_row(value: i64) -> StoreResult<u16> {
    u16::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("status out of range: {value}")))
}

/// Append filter conditions for the fixed dimension columns. Values are
/// bound as parameters; column names come from this closed set only.
fn push_filter_conditions(
    filter: &MetricsFilter,
    conditions: &mut Vec<String>,
    params_vec: &mut Vec<String>,
) {
    let dimensions: [(&str, &Option<String>); 6] = [
        ("service", &filter.service),
        ("node", &filter.node),
        ("method", &filter.method),
        ("endpoint", &filter.endpoint),
        ("consumer", &filter.consumer),
        ("context", &filter.context),
    ];
    for (column, value) in dimensions {
        if let Some(value) = value {
            conditions.push(format!("{column} = ?"));
            params_vec.push(value.clone());
        }
    }
}

fn build_where_clause(
    time_column: &str,
    window: TimeWindow,
    filter: &MetricsFilter,
    params_vec: &mut Vec<String>,
) -> String {
    let mut conditions = vec![
        format!("{time_column} >= ?"),
        format!("{time_column} <= ?"),
    ];
    params_vec.push(format_timestamp(window.start));
    params_vec.push(format_timestamp(window.end));
    push_filter_conditions(filter, &mut conditions, params_vec);
    format!("WHERE {}", conditions.join(" AND "))
}

fn load_raw_events(
    connection: &Connection,
    filter: &MetricsFilter,
    window: TimeWindow,
) -> StoreResult<Vec<RawEvent>> {
    let mut params_vec = Vec::new();
    let where_clause = build_where_clause("created_at", window, filter, &mut params_vec);
    let sql = format!(
        "SELECT service, node, method, endpoint, status, response_time, consumer, context, created_at \
         FROM requests {where_clause} ORDER BY created_at ASC"
    );

    let mut stmt = connection.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params_vec.iter()))?;
    let mut events = Vec::new();

    while let Some(row) = rows.next()? {
        events.push(RawEvent {
            service: row.get(0)?,
            node: row.get(1)?,
            method: row.get(2)?,
            endpoint: row.get(3)?,
            status: status_from_row(row.get::<_, i64>(4)?)?,
            response_time: row.get(5)?,
            consumer: row.get(6)?,
            context: row.get(7)?,
            created_at: parse_timestamp(row.get::<_, String>(8)?)?,
        });
    }

    Ok(events)
}

fn load_rollup_rows(
    connection: &Connection,
    tier: Tier,
    filter: &MetricsFilter,
    window: TimeWindow,
) -> StoreResult<Vec<RollupRow>> {
    let mut params_vec = Vec::new();
    let where_clause = build_where_clause("bucket", window, filter, &mut params_vec);
    let sql = format!(
        "SELECT service, node, method, endpoint, consumer, context, status, bucket, \
         count_requests, min_response_time, max_response_time, avg_response_time, p95_response_time \
         FROM {} {where_clause} ORDER BY bucket ASC",
        tier.table()
    );

    let mut stmt = connection.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params_vec.iter()))?;
    let mut result = Vec::new();

    while let Some(row) = rows.next()? {
        result.push(RollupRow {
            service: row.get(0)?,
            node: row.get(1)?,
            method: row.get(2)?,
            endpoint: row.get(3)?,
            consumer: row.get(4)?,
            context: row.get(5)?,
            status: status_from_row(row.get::<_, i64>(6)?)?,
            bucket: parse_timestamp(row.get::<_, String>(7)?)?,
            count_requests: row.get::<_, i64>(8)? as u64,
            min_response_time: row.get(9)?,
            max_response_time: row.get(10)?,
            avg_response_time: row.get(11)?,
            p95_response_time: row.get(12)?,
        });
    }

    Ok(result)
}

fn load_distinct(
    connection: &Connection,
    tier: Tier,
    column: &str,
    window: TimeWindow,
) -> StoreResult<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT {column} FROM {} WHERE {column} IS NOT NULL AND {time} >= ?1 AND {time} <= ?2 ORDER BY {column} ASC",
        tier.table(),
        time = tier.time_column(),
    );
    let mut stmt = connection.prepare(&sql)?;
    let mut rows = stmt.query(params![
        format_timestamp(window.start),
        format_timestamp(window.end)
    ])?;

    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        values.push(row.get(0)?);
    }
    Ok(values)
}
