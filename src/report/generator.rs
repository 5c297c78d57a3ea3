//! Markdown and JSON report generation.
//!
//! This module renders an aggregation run. Sources that failed are shown as
//! unavailable rather than as their zero-valued defaults.

use crate::models::{
    Activity, Aggregate, Alert, Announcement, Bill, BillingStats, DashboardAggregate, MeterRecord,
    Overview, Report, ReportBody, ReportMetadata, ResidentAggregate, Source, SourceFailure,
    Statistics, UsagePoint, ZoneStat,
};
use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Rendering options.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Maximum rows rendered per list section.
    pub max_list_rows: usize,
    /// Include the failure list.
    pub show_failures: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_list_rows: 10,
            show_failures: true,
        }
    }
}

impl From<&crate::config::ReportConfig> for RenderOptions {
    fn from(config: &crate::config::ReportConfig) -> Self {
        Self {
            max_list_rows: config.max_list_rows,
            show_failures: config.show_failures,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &RenderOptions) -> String {
    let mut output = String::new();

    let title = match &report.body {
        ReportBody::Dashboard(_) => "Site Dashboard",
        ReportBody::Resident(_) => "Resident View",
    };
    output.push_str(&format!("# {}\n\n", title));

    output.push_str(&generate_metadata_section(&report.metadata));

    let aggregate = report.body.aggregate();
    if options.show_failures && aggregate.is_partial() {
        output.push_str(&generate_partial_warning(aggregate.failures()));
    }

    match &report.body {
        ReportBody::Dashboard(dashboard) => {
            output.push_str(&generate_dashboard_sections(dashboard, options))
        }
        ReportBody::Resident(resident) => {
            output.push_str(&generate_resident_sections(resident, options))
        }
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Site:** {}\n", metadata.site));
    if let Some(ref resident) = metadata.resident {
        section.push_str(&format!("- **Resident:** {}\n", resident));
    }
    if let Some(ref range) = metadata.range {
        section.push_str(&format!("- **Period:** {}\n", range));
    }
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Sources:** {} ok, {} failed\n",
        metadata.sources_total - metadata.sources_failed,
        metadata.sources_failed
    ));
    section.push_str(&format!(
        "- **Fetch Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Non-blocking warning listing the sources that failed.
fn generate_partial_warning(failures: &[SourceFailure]) -> String {
    let mut section = String::new();

    section.push_str("> ⚠️ **Partial data.** Some sources could not be loaded:\n>\n");
    for failure in failures {
        section.push_str(&format!("> - `{}`: {}\n", failure.source, failure.message));
    }
    section.push('\n');

    section
}

fn heading(source: Source) -> String {
    format!("## {}\n\n", source.label())
}

fn unavailable(aggregate: &dyn Aggregate, source: Source) -> Option<String> {
    aggregate
        .failures()
        .iter()
        .find(|f| f.source == source.name())
        .map(|f| format!("{}_Unavailable: {}_\n\n", heading(source), f.message))
}

fn table(header: &[&str], rows: Vec<Vec<String>>, max_rows: usize) -> String {
    if rows.is_empty() {
        return "_No entries._\n\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!(
        "|{}\n",
        header.iter().map(|_| ":---|").collect::<String>()
    ));

    let total = rows.len();
    for row in rows.into_iter().take(max_rows) {
        let cells: Vec<String> = row.iter().map(|cell| escape_cell(cell)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    if total > max_rows {
        out.push_str(&format!("\n_{} more not shown._\n", total - max_rows));
    }
    out.push('\n');

    out
}

/// Keep backend text from breaking out of its table cell.
fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

fn money(amount: f64) -> String {
    format!("{:.2}", amount)
}

fn volume(amount: f64) -> String {
    format!("{:.1} m³", amount)
}

/// Render one source, or its failure notice.
fn section(
    aggregate: &dyn Aggregate,
    source: Source,
    render: impl FnOnce() -> String,
) -> String {
    unavailable(aggregate, source).unwrap_or_else(|| format!("{}{}", heading(source), render()))
}

fn generate_dashboard_sections(dashboard: &DashboardAggregate, options: &RenderOptions) -> String {
    let max = options.max_list_rows;
    let mut output = String::new();

    output.push_str(&section(dashboard, Source::Overview, || {
        overview_table(&dashboard.overview)
    }));
    output.push_str(&section(dashboard, Source::ZoneStats, || {
        zone_table(&dashboard.zone_stats, max)
    }));
    output.push_str(&section(dashboard, Source::BillingStats, || {
        billing_table(&dashboard.billing_stats)
    }));
    output.push_str(&section(dashboard, Source::Usage, || {
        usage_table(&dashboard.usage, max)
    }));
    output.push_str(&section(dashboard, Source::Alerts, || {
        alert_table(&dashboard.alerts, max)
    }));
    output.push_str(&section(dashboard, Source::Activities, || {
        activity_table(&dashboard.activities, max)
    }));
    output.push_str(&section(dashboard, Source::Statistics, || {
        statistics_table(&dashboard.statistics, max)
    }));

    output
}

fn generate_resident_sections(resident: &ResidentAggregate, options: &RenderOptions) -> String {
    let max = options.max_list_rows;
    let mut output = String::new();

    output.push_str(&section(resident, Source::Meter, || {
        meter_table(&resident.meter)
    }));
    output.push_str(&section(resident, Source::Bills, || {
        bill_table(&resident.bills, max)
    }));
    output.push_str(&section(resident, Source::UsageHistory, || {
        usage_table(&resident.usage_history, max)
    }));
    output.push_str(&section(resident, Source::Announcements, || {
        announcement_list(&resident.announcements, max)
    }));

    output
}

fn overview_table(overview: &Overview) -> String {
    table(
        &["Residents", "Meters", "Active", "Usage", "Billed", "Collected", "Pending Bills"],
        vec![vec![
            overview.total_residents.to_string(),
            overview.total_meters.to_string(),
            overview.active_meters.to_string(),
            volume(overview.total_usage),
            money(overview.total_billed),
            money(overview.total_collected),
            overview.pending_bills.to_string(),
        ]],
        1,
    )
}

fn zone_table(zones: &[ZoneStat], max: usize) -> String {
    let rows = zones
        .iter()
        .map(|z| {
            vec![
                z.zone.clone(),
                z.residents.to_string(),
                z.meters.to_string(),
                volume(z.usage),
                money(z.billed),
            ]
        })
        .collect();
    table(&["Zone", "Residents", "Meters", "Usage", "Billed"], rows, max)
}

fn billing_table(stats: &BillingStats) -> String {
    table(
        &["Bills", "Paid", "Unpaid", "Overdue", "Amount", "Collected", "Outstanding", "Rate"],
        vec![vec![
            stats.total_bills.to_string(),
            stats.paid_bills.to_string(),
            stats.unpaid_bills.to_string(),
            stats.overdue_bills.to_string(),
            money(stats.total_amount),
            money(stats.paid_amount),
            money(stats.unpaid_amount),
            format!("{:.1}%", stats.collection_rate * 100.0),
        ]],
        1,
    )
}

fn usage_table(points: &[UsagePoint], max: usize) -> String {
    let rows = points
        .iter()
        .map(|p| vec![p.period.clone(), volume(p.usage), money(p.amount)])
        .collect();
    table(&["Period", "Usage", "Amount"], rows, max)
}

fn alert_table(alerts: &[Alert], max: usize) -> String {
    let rows = alerts
        .iter()
        .map(|a| {
            vec![
                a.level.to_uppercase(),
                a.title.clone(),
                a.message.clone(),
                a.created_at.clone(),
            ]
        })
        .collect();
    table(&["Level", "Title", "Message", "Raised"], rows, max)
}

fn activity_table(activities: &[Activity], max: usize) -> String {
    let rows = activities
        .iter()
        .map(|a| {
            vec![
                a.created_at.clone(),
                a.actor.clone(),
                a.action.clone(),
                a.target.clone(),
            ]
        })
        .collect();
    table(&["When", "Who", "Action", "Target"], rows, max)
}

fn statistics_table(stats: &Statistics, max: usize) -> String {
    let mut out = table(
        &["Average Usage", "Peak Usage", "Peak Period", "Readings"],
        vec![vec![
            volume(stats.average_usage),
            volume(stats.peak_usage),
            stats.peak_period.clone(),
            stats.total_readings.to_string(),
        ]],
        1,
    );

    if !stats.by_status.is_empty() {
        let rows = stats
            .by_status
            .iter()
            .map(|(status, count)| vec![status.clone(), count.to_string()])
            .collect();
        out.push_str(&table(&["Meter Status", "Readings"], rows, max));
    }

    out
}

fn meter_table(meter: &MeterRecord) -> String {
    table(
        &["Meter", "Address", "Status", "Installed", "Last Reading", "Read At"],
        vec![vec![
            meter.meter_no.clone(),
            meter.address.clone(),
            meter.status.clone(),
            meter.installed_at.clone(),
            volume(meter.last_reading),
            meter.last_read_at.clone(),
        ]],
        1,
    )
}

fn bill_table(bills: &[Bill], max: usize) -> String {
    let rows = bills
        .iter()
        .map(|b| {
            vec![
                b.period.clone(),
                volume(b.usage),
                money(b.amount),
                b.status.clone(),
                b.due_date.clone(),
                b.paid_at.clone(),
            ]
        })
        .collect();
    table(&["Period", "Usage", "Amount", "Status", "Due", "Paid"], rows, max)
}

fn announcement_list(announcements: &[Announcement], max: usize) -> String {
    if announcements.is_empty() {
        return "_No entries._\n\n".to_string();
    }

    let mut out = String::new();
    for a in announcements.iter().take(max) {
        out.push_str(&format!("### {}\n\n", a.title));
        if !a.published_at.is_empty() {
            out.push_str(&format!("*{}*\n\n", a.published_at));
        }
        if !a.content.is_empty() {
            out.push_str(&format!("{}\n\n", a.content));
        }
    }
    out
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!("---\n\n*Report generated by meterdash v{}*\n", env!("CARGO_PKG_VERSION"))
}

#[derive(Serialize)]
struct JsonReport<'a> {
    metadata: &'a ReportMetadata,
    view: &'static str,
    data: Map<String, Value>,
    failures: &'a [SourceFailure],
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    let aggregate = report.body.aggregate();
    let json = JsonReport {
        metadata: &report.metadata,
        view: match report.body {
            ReportBody::Dashboard(_) => "dashboard",
            ReportBody::Resident(_) => "resident",
        },
        data: aggregate.entries(),
        failures: aggregate.failures(),
    };
    serde_json::to_string_pretty(&json).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn metadata(failed: usize) -> ReportMetadata {
        ReportMetadata {
            site: "north".to_string(),
            resident: None,
            range: Some(crate::models::DateRange::new(
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            )),
            generated_at: Utc::now(),
            sources_total: 7,
            sources_failed: failed,
            duration_seconds: 0.42,
        }
    }

    fn create_test_report() -> Report {
        let dashboard = DashboardAggregate {
            overview: Overview {
                total_residents: 120,
                total_meters: 118,
                ..Default::default()
            },
            zone_stats: vec![ZoneStat {
                zone: "Riverside".to_string(),
                meters: 40,
                ..Default::default()
            }],
            alerts: vec![Alert {
                level: "warning".to_string(),
                title: "Leak suspected".to_string(),
                ..Default::default()
            }],
            failures: vec![SourceFailure::new("billing_stats", "billing service down")],
            ..Default::default()
        };
        Report {
            metadata: metadata(1),
            body: ReportBody::Dashboard(dashboard),
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report(), &RenderOptions::default());

        assert!(markdown.contains("# Site Dashboard"));
        assert!(markdown.contains("2024-03-01 to 2024-03-31"));
        assert!(markdown.contains("6 ok, 1 failed"));
        assert!(markdown.contains("Partial data"));
        assert!(markdown.contains("`billing_stats`: billing service down"));
        assert!(markdown.contains("## Billing Statistics\n\n_Unavailable: billing service down_"));
        assert!(markdown.contains("Riverside"));
        assert!(markdown.contains("WARNING"));
    }

    #[test]
    fn test_markdown_without_failures_has_no_warning() {
        let report = Report {
            metadata: metadata(0),
            body: ReportBody::Dashboard(DashboardAggregate::default()),
        };
        let markdown = generate_markdown_report(&report, &RenderOptions::default());
        assert!(!markdown.contains("Partial data"));
        assert!(markdown.contains("## Zone Statistics\n\n_No entries._"));
    }

    #[test]
    fn test_failures_can_be_hidden() {
        let options = RenderOptions {
            show_failures: false,
            ..Default::default()
        };
        let markdown = generate_markdown_report(&create_test_report(), &options);
        assert!(!markdown.contains("Partial data"));
        assert!(markdown.contains("_Unavailable: billing service down_"));
    }

    #[test]
    fn test_table_truncates_rows() {
        let rows = (0..5).map(|i| vec![i.to_string()]).collect();
        let rendered = table(&["N"], rows, 2);
        assert!(rendered.contains("| 0 |"));
        assert!(rendered.contains("| 1 |"));
        assert!(!rendered.contains("| 2 |"));
        assert!(rendered.contains("3 more not shown"));
    }

    #[test]
    fn test_table_escapes_cells() {
        let rows = vec![vec!["North | East".to_string(), "line one\nline two\r\nthree".to_string()]];
        let rendered = table(&["Zone", "Note"], rows, 10);
        assert!(rendered.contains("| North \\| East | line one line two three |"));
        assert_eq!(rendered.lines().filter(|l| l.starts_with('|')).count(), 3);
    }

    #[test]
    fn test_resident_markdown() {
        let resident = ResidentAggregate {
            meter: MeterRecord {
                meter_no: "WM-0091".to_string(),
                ..Default::default()
            },
            announcements: vec![Announcement {
                title: "Maintenance Friday".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let report = Report {
            metadata: ReportMetadata {
                resident: Some("r9".to_string()),
                range: None,
                sources_total: 4,
                ..metadata(0)
            },
            body: ReportBody::Resident(resident),
        };
        let markdown = generate_markdown_report(&report, &RenderOptions::default());
        assert!(markdown.contains("# Resident View"));
        assert!(markdown.contains("**Resident:** r9"));
        assert!(markdown.contains("WM-0091"));
        assert!(markdown.contains("### Maintenance Friday"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["view"], "dashboard");
        assert_eq!(value["metadata"]["site"], "north");
        assert_eq!(value["data"]["overview"]["total_residents"], 120);
        assert_eq!(value["data"]["billing_stats"]["total_bills"], 0);
        assert_eq!(value["failures"][0]["source"], "billing_stats");
        assert_eq!(value["data"].as_object().unwrap().len(), 7);
    }
}
