//! Tier selection: pick the cheapest data source that still satisfies the
//! requested interval and time range.

use chrono::{DateTime, Duration, Utc};

use crate::types::{Interval, MetricsQuery, TimeWindow};

/// Which granularity a query is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Raw events, aggregated on the fly. Only affordable for short,
    /// minute-granularity windows.
    Raw,
    /// 5-minute rollup table.
    FiveMinute,
    /// 1-hour rollup table.
    OneHour,
}

impl Tier {
    pub fn table(self) -> &'static str {
        match self {
            Self::Raw => "requests",
            Self::FiveMinute => "requests_5min",
            Self::OneHour => "requests_1hour",
        }
    }

    /// Column the time window is applied to: event timestamp for raw data,
    /// rollup bucket otherwise.
    pub fn time_column(self) -> &'static str {
        match self {
            Self::Raw => "created_at",
            Self::FiveMinute | Self::OneHour => "bucket",
        }
    }

    pub fn bucket_width(self) -> Duration {
        match self {
            Self::Raw => Duration::minutes(1),
            Self::FiveMinute => Duration::minutes(5),
            Self::OneHour => Duration::hours(1),
        }
    }
}

/// A fully resolved query plan: tier, bucket width, and inclusive window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPlan {
    pub tier: Tier,
    pub bucket_width: Duration,
    pub window: TimeWindow,
}

const HISTORICAL_LOOKBACK_DAYS: i64 = 7;
const REALTIME_LOOKBACK_MINUTES: i64 = 60;

/// Resolve window defaults and choose a tier.
///
/// Decision order: explicit 1-minute resolution reads raw data; spans over
/// four days or an explicit 1-hour interval read the hourly rollup;
/// everything else reads the 5-minute rollup.
pub fn plan(query: &MetricsQuery, now: DateTime<Utc>) -> QueryPlan {
    let interval = query.interval.unwrap_or(Interval::FiveMin);

    let start = query.start_time.unwrap_or_else(|| match interval {
        Interval::OneMin => now - Duration::minutes(REALTIME_LOOKBACK_MINUTES),
        _ => now - Duration::days(HISTORICAL_LOOKBACK_DAYS),
    });
    let end = query.end_time.unwrap_or(now);
    let window = TimeWindow { start, end };

    let tier = if interval == Interval::OneMin {
        Tier::Raw
    } else if window.span().num_days() > 4 || interval == Interval::OneHour {
        Tier::OneHour
    } else {
        Tier::FiveMinute
    };

    QueryPlan {
        tier,
        bucket_width: tier.bucket_width(),
        window,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{plan, Tier};
    use crate::types::{Interval, MetricsQuery, TimeWindow};

    fn at(h: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, 0, 0)
            .single()
            .expect("valid datetime")
    }

    fn query(interval: Option<Interval>, window: Option<TimeWindow>) -> MetricsQuery {
        MetricsQuery {
            interval,
            start_time: window.map(|w| w.start),
            end_time: window.map(|w| w.end),
            ..MetricsQuery::default()
        }
    }

    #[test]
    fn one_minute_interval_reads_raw_events() {
        let decision = plan(&query(Some(Interval::OneMin), None), at(12));
        assert_eq!(decision.tier, Tier::Raw);
        assert_eq!(decision.bucket_width, Duration::minutes(1));
        assert_eq!(decision.tier.time_column(), "created_at");
        // Realtime default lookback is one hour.
        assert_eq!(decision.window.start, at(11));
        assert_eq!(decision.window.end, at(12));
    }

    #[test]
    fn wide_spans_escalate_to_hourly_rollup() {
        let now = at(12);
        let wide = TimeWindow {
            start: now - Duration::days(5),
            end: now,
        };
        let decision = plan(&query(Some(Interval::FiveMin), Some(wide)), now);
        assert_eq!(decision.tier, Tier::OneHour);
        assert_eq!(decision.tier.time_column(), "bucket");
    }

    #[test]
    fn four_day_span_stays_on_five_minute_rollup() {
        let now = at(12);
        let window = TimeWindow {
            start: now - Duration::days(4),
            end: now,
        };
        let decision = plan(&query(Some(Interval::FiveMin), Some(window)), now);
        assert_eq!(decision.tier, Tier::FiveMinute);
        assert_eq!(decision.bucket_width, Duration::minutes(5));
    }

    #[test]
    fn explicit_hourly_interval_forces_hourly_rollup() {
        let now = at(12);
        let narrow = TimeWindow {
            start: now - Duration::hours(2),
            end: now,
        };
        let decision = plan(&query(Some(Interval::OneHour), Some(narrow)), now);
        assert_eq!(decision.tier, Tier::OneHour);
        assert_eq!(decision.bucket_width, Duration::hours(1));
    }

    #[test]
    fn historical_defaults_to_a_seven_day_lookback() {
        let now = at(12);
        let decision = plan(&query(None, None), now);
        assert_eq!(decision.window.start, now - Duration::days(7));
        assert_eq!(decision.window.end, now);
        // Seven days is over the four-day cutoff.
        assert_eq!(decision.tier, Tier::OneHour);
    }
}
