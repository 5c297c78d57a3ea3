//! Data models for dashboard aggregation.
//!
//! This module contains the date filter, the source catalogue, every payload
//! shape the billing backend returns, and the two composite results the
//! aggregator produces.

use crate::clock::Clock;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Inclusive calendar date range used to filter dashboard sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day included in the range.
    pub start: NaiveDate,
    /// Last day included in the range.
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// First through last day of the month the clock is currently in.
    pub fn current_month(clock: &dyn Clock) -> Self {
        let today = clock.today();
        let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);

        let (next_year, next_month) = if today.month() == 12 {
            (today.year() + 1, 1)
        } else {
            (today.year(), today.month() + 1)
        };
        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|first| first.pred_opt())
            .unwrap_or(today);

        Self { start, end }
    }

    /// Whether `start` does not come after `end`.
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    /// Query parameters understood by the backend.
    pub fn query_params(&self) -> Vec<(String, String)> {
        vec![
            ("start_date".to_string(), self.start.format("%Y-%m-%d").to_string()),
            ("end_date".to_string(), self.end.format("%Y-%m-%d").to_string()),
        ]
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// A remote endpoint contributing one field of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Overview,
    ZoneStats,
    BillingStats,
    Usage,
    Alerts,
    Activities,
    Statistics,
    Bills,
    Meter,
    UsageHistory,
    Announcements,
}

impl Source {
    /// Sources that make up the site dashboard, in declaration order.
    pub const DASHBOARD: [Source; 7] = [
        Source::Overview,
        Source::ZoneStats,
        Source::BillingStats,
        Source::Usage,
        Source::Alerts,
        Source::Activities,
        Source::Statistics,
    ];

    /// Sources that make up a single resident's view, in declaration order.
    pub const RESIDENT: [Source; 4] = [
        Source::Bills,
        Source::Meter,
        Source::UsageHistory,
        Source::Announcements,
    ];

    /// Stable machine name, also used as the key in aggregate entries.
    pub fn name(&self) -> &'static str {
        match self {
            Source::Overview => "overview",
            Source::ZoneStats => "zone_stats",
            Source::BillingStats => "billing_stats",
            Source::Usage => "usage",
            Source::Alerts => "alerts",
            Source::Activities => "activities",
            Source::Statistics => "statistics",
            Source::Bills => "bills",
            Source::Meter => "meter",
            Source::UsageHistory => "usage_history",
            Source::Announcements => "announcements",
        }
    }

    /// Human-readable heading for reports.
    pub fn label(&self) -> &'static str {
        match self {
            Source::Overview => "Overview",
            Source::ZoneStats => "Zone Statistics",
            Source::BillingStats => "Billing Statistics",
            Source::Usage => "Usage",
            Source::Alerts => "Alerts",
            Source::Activities => "Recent Activities",
            Source::Statistics => "Statistics",
            Source::Bills => "Bills",
            Source::Meter => "Meter",
            Source::UsageHistory => "Usage History",
            Source::Announcements => "Announcements",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A source that did not produce a usable payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    /// Name of the failed source.
    pub source: String,
    /// Message reported by the backend, or a generic fallback.
    pub message: String,
}

impl SourceFailure {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

/// Field decoders for backend payloads.
///
/// A field of the wrong type decodes to its zero value instead of failing
/// the whole payload. Numbers may arrive as integral floats (`120.0`) or as
/// numeric strings (`"5400.50"`).
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Ok(to_count(&Value::deserialize(deserializer)?))
    }

    pub fn amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(to_amount(&Value::deserialize(deserializer)?))
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }

    pub fn counts<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, u64>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), to_count(v))).collect(),
            _ => BTreeMap::new(),
        })
    }

    pub(super) fn to_amount(value: &Value) -> f64 {
        let amount = match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        if amount.is_finite() {
            amount
        } else {
            0.0
        }
    }

    pub(super) fn to_count(value: &Value) -> u64 {
        if let Some(n) = value.as_u64() {
            return n;
        }
        let amount = to_amount(value);
        if amount >= 0.0 && amount.fract() == 0.0 && amount <= u64::MAX as f64 {
            amount as u64
        } else {
            0
        }
    }
}

/// Site-wide headline figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overview {
    #[serde(deserialize_with = "lenient::count")]
    pub total_residents: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub total_meters: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub active_meters: u64,
    /// Cubic metres consumed within the filter range.
    #[serde(deserialize_with = "lenient::amount")]
    pub total_usage: f64,
    #[serde(deserialize_with = "lenient::amount")]
    pub total_billed: f64,
    #[serde(deserialize_with = "lenient::amount")]
    pub total_collected: f64,
    #[serde(deserialize_with = "lenient::count")]
    pub pending_bills: u64,
}

/// Per-zone consumption and billing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneStat {
    #[serde(deserialize_with = "lenient::text")]
    pub zone: String,
    #[serde(deserialize_with = "lenient::count")]
    pub residents: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub meters: u64,
    #[serde(deserialize_with = "lenient::amount")]
    pub usage: f64,
    #[serde(deserialize_with = "lenient::amount")]
    pub billed: f64,
}

/// Bill counts and amounts for the filter range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingStats {
    #[serde(deserialize_with = "lenient::count")]
    pub total_bills: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub paid_bills: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub unpaid_bills: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub overdue_bills: u64,
    #[serde(deserialize_with = "lenient::amount")]
    pub total_amount: f64,
    #[serde(deserialize_with = "lenient::amount")]
    pub paid_amount: f64,
    #[serde(deserialize_with = "lenient::amount")]
    pub unpaid_amount: f64,
    /// Fraction of billed amount collected, 0.0 to 1.0.
    #[serde(deserialize_with = "lenient::amount")]
    pub collection_rate: f64,
}

/// One period of a usage trend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsagePoint {
    #[serde(deserialize_with = "lenient::text")]
    pub period: String,
    #[serde(deserialize_with = "lenient::amount")]
    pub usage: f64,
    #[serde(deserialize_with = "lenient::amount")]
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    #[serde(deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub level: String,
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub message: String,
    #[serde(deserialize_with = "lenient::text")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    #[serde(deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub actor: String,
    #[serde(deserialize_with = "lenient::text")]
    pub action: String,
    #[serde(deserialize_with = "lenient::text")]
    pub target: String,
    #[serde(deserialize_with = "lenient::text")]
    pub created_at: String,
}

/// Meter-reading statistics for the filter range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    #[serde(deserialize_with = "lenient::amount")]
    pub average_usage: f64,
    #[serde(deserialize_with = "lenient::amount")]
    pub peak_usage: f64,
    #[serde(deserialize_with = "lenient::text")]
    pub peak_period: String,
    #[serde(deserialize_with = "lenient::count")]
    pub total_readings: u64,
    /// Reading counts keyed by meter status.
    #[serde(deserialize_with = "lenient::counts")]
    pub by_status: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bill {
    #[serde(deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub period: String,
    #[serde(deserialize_with = "lenient::amount")]
    pub usage: f64,
    #[serde(deserialize_with = "lenient::amount")]
    pub amount: f64,
    #[serde(deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(deserialize_with = "lenient::text")]
    pub due_date: String,
    #[serde(deserialize_with = "lenient::text")]
    pub paid_at: String,
}

/// The meter assigned to a resident.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterRecord {
    #[serde(deserialize_with = "lenient::text")]
    pub meter_no: String,
    #[serde(deserialize_with = "lenient::text")]
    pub address: String,
    #[serde(deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(deserialize_with = "lenient::text")]
    pub installed_at: String,
    #[serde(deserialize_with = "lenient::amount")]
    pub last_reading: f64,
    #[serde(deserialize_with = "lenient::text")]
    pub last_read_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Announcement {
    #[serde(deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub content: String,
    #[serde(deserialize_with = "lenient::text")]
    pub published_at: String,
}

/// Common view over the composite results.
pub trait Aggregate {
    /// Configured sources, in declaration order.
    fn sources(&self) -> &'static [Source];

    /// One payload per configured source name.
    fn entries(&self) -> Map<String, Value>;

    fn failures(&self) -> &[SourceFailure];

    /// Whether at least one source failed.
    fn is_partial(&self) -> bool {
        !self.failures().is_empty()
    }
}

fn entry<T: Serialize>(map: &mut Map<String, Value>, source: Source, payload: &T) {
    let value = serde_json::to_value(payload).unwrap_or(Value::Null);
    map.insert(source.name().to_string(), value);
}

/// Everything the site dashboard shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardAggregate {
    pub overview: Overview,
    pub zone_stats: Vec<ZoneStat>,
    pub billing_stats: BillingStats,
    pub usage: Vec<UsagePoint>,
    pub alerts: Vec<Alert>,
    pub activities: Vec<Activity>,
    pub statistics: Statistics,
    pub failures: Vec<SourceFailure>,
}

impl Aggregate for DashboardAggregate {
    fn sources(&self) -> &'static [Source] {
        &Source::DASHBOARD
    }

    fn entries(&self) -> Map<String, Value> {
        let mut map = Map::new();
        entry(&mut map, Source::Overview, &self.overview);
        entry(&mut map, Source::ZoneStats, &self.zone_stats);
        entry(&mut map, Source::BillingStats, &self.billing_stats);
        entry(&mut map, Source::Usage, &self.usage);
        entry(&mut map, Source::Alerts, &self.alerts);
        entry(&mut map, Source::Activities, &self.activities);
        entry(&mut map, Source::Statistics, &self.statistics);
        map
    }

    fn failures(&self) -> &[SourceFailure] {
        &self.failures
    }
}

/// Everything a single resident's view shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidentAggregate {
    pub bills: Vec<Bill>,
    pub meter: MeterRecord,
    pub usage_history: Vec<UsagePoint>,
    pub announcements: Vec<Announcement>,
    pub failures: Vec<SourceFailure>,
}

impl Aggregate for ResidentAggregate {
    fn sources(&self) -> &'static [Source] {
        &Source::RESIDENT
    }

    fn entries(&self) -> Map<String, Value> {
        let mut map = Map::new();
        entry(&mut map, Source::Bills, &self.bills);
        entry(&mut map, Source::Meter, &self.meter);
        entry(&mut map, Source::UsageHistory, &self.usage_history);
        entry(&mut map, Source::Announcements, &self.announcements);
        map
    }

    fn failures(&self) -> &[SourceFailure] {
        &self.failures
    }
}

/// Which composite a report was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "view", content = "aggregate", rename_all = "snake_case")]
pub enum ReportBody {
    Dashboard(DashboardAggregate),
    Resident(ResidentAggregate),
}

impl ReportBody {
    pub fn aggregate(&self) -> &dyn Aggregate {
        match self {
            ReportBody::Dashboard(a) => a,
            ReportBody::Resident(a) => a,
        }
    }
}

/// Metadata about a generated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Site the report covers.
    pub site: String,
    /// Resident the report covers, for resident views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resident: Option<String>,
    /// Date filter, for dashboard views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<DateRange>,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Number of sources queried.
    pub sources_total: usize,
    /// Number of sources that failed.
    pub sources_failed: usize,
    /// Wall time spent waiting for sources, in seconds.
    pub duration_seconds: f64,
}

/// A rendered aggregation run.
#[derive(Debug, Clone)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub body: ReportBody,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_current_month_mid_month() {
        let clock = FixedClock::new(date(2024, 2, 14));
        let range = DateRange::current_month(&clock);
        assert_eq!(range.start, date(2024, 2, 1));
        assert_eq!(range.end, date(2024, 2, 29));
    }

    #[test]
    fn test_current_month_december_rolls_year() {
        let clock = FixedClock::new(date(2023, 12, 31));
        let range = DateRange::current_month(&clock);
        assert_eq!(range.start, date(2023, 12, 1));
        assert_eq!(range.end, date(2023, 12, 31));
    }

    #[test]
    fn test_query_params_format() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 31));
        assert_eq!(
            range.query_params(),
            vec![
                ("start_date".to_string(), "2024-03-01".to_string()),
                ("end_date".to_string(), "2024-03-31".to_string()),
            ]
        );
    }

    #[test]
    fn test_unordered_range_is_representable() {
        let range = DateRange::new(date(2024, 3, 31), date(2024, 3, 1));
        assert!(!range.is_ordered());
    }

    #[test]
    fn test_default_dashboard_has_every_entry() {
        let aggregate = DashboardAggregate::default();
        let entries = aggregate.entries();
        assert_eq!(entries.len(), Source::DASHBOARD.len());
        for source in Source::DASHBOARD {
            assert!(entries.contains_key(source.name()), "missing {}", source);
        }
        assert_eq!(entries["zone_stats"], Value::Array(vec![]));
        assert_eq!(entries["overview"]["total_meters"], 0);
    }

    #[test]
    fn test_default_resident_has_every_entry() {
        let aggregate = ResidentAggregate::default();
        let keys: Vec<String> = aggregate.entries().keys().cloned().collect();
        let mut expected: Vec<String> = Source::RESIDENT
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        expected.sort();
        assert_eq!(keys, expected);
        assert!(!aggregate.is_partial());
    }

    #[test]
    fn test_is_partial() {
        let aggregate = DashboardAggregate {
            failures: vec![SourceFailure::new("alerts", "timeout")],
            ..Default::default()
        };
        assert!(aggregate.is_partial());
        assert_eq!(aggregate.entries().len(), Source::DASHBOARD.len());
    }

    #[test]
    fn test_payload_missing_fields_default() {
        let stats: BillingStats = serde_json::from_str(r#"{"total_bills": 4}"#).unwrap();
        assert_eq!(stats.total_bills, 4);
        assert_eq!(stats.paid_amount, 0.0);

        let statistics: Statistics = serde_json::from_str("{}").unwrap();
        assert!(statistics.by_status.is_empty());
    }

    #[test]
    fn test_wrong_typed_fields_default_individually() {
        let alert: Alert =
            serde_json::from_str(r#"{"id": 42, "level": ["bad"], "title": "Leak"}"#).unwrap();
        assert_eq!(alert.id, "42");
        assert_eq!(alert.level, "");
        assert_eq!(alert.title, "Leak");

        let statistics: Statistics = serde_json::from_str(
            r#"{"total_readings": -3, "by_status": {"normal": "110", "fault": 8.0, "odd": 1.5}}"#,
        )
        .unwrap();
        assert_eq!(statistics.total_readings, 0);
        assert_eq!(statistics.by_status["normal"], 110);
        assert_eq!(statistics.by_status["fault"], 8);
        assert_eq!(statistics.by_status["odd"], 0);
    }

    #[test]
    fn test_numeric_coercion() {
        use serde_json::json;
        assert_eq!(lenient::to_count(&json!(120.0)), 120);
        assert_eq!(lenient::to_count(&json!(" 7 ")), 7);
        assert_eq!(lenient::to_count(&json!("n/a")), 0);
        assert_eq!(lenient::to_amount(&json!("5400.50")), 5400.5);
        assert_eq!(lenient::to_amount(&json!("NaN")), 0.0);
        assert_eq!(lenient::to_amount(&json!(true)), 0.0);
    }
}
