//! Static source catalogue.
//!
//! Each descriptor maps one [`Source`] to one GET request. Extra parameters
//! are fixed per source and come from configuration, never from the caller.

use crate::models::Source;

/// Fixed per-source request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Months of history for the dashboard usage trend.
    pub usage_months: u32,
    /// Maximum alerts returned.
    pub alerts_limit: u32,
    /// Maximum activities returned.
    pub activities_limit: u32,
    /// Months of history for a resident's usage.
    pub resident_usage_months: u32,
    /// Maximum announcements returned.
    pub announcements_limit: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            usage_months: 6,
            alerts_limit: 10,
            activities_limit: 10,
            resident_usage_months: 12,
            announcements_limit: 5,
        }
    }
}

impl From<&crate::config::SourcesConfig> for SourceSettings {
    fn from(config: &crate::config::SourcesConfig) -> Self {
        Self {
            usage_months: config.usage_months,
            alerts_limit: config.alerts_limit,
            activities_limit: config.activities_limit,
            resident_usage_months: config.resident_usage_months,
            announcements_limit: config.announcements_limit,
        }
    }
}

/// One remote read contributing one field of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub source: Source,
    /// Path template with `{scope}` and optionally `{subject}` placeholders.
    pub template: &'static str,
    /// Extra query parameters sent with every request for this source.
    pub params: Vec<(String, String)>,
}

impl SourceDescriptor {
    fn new(source: Source, template: &'static str) -> Self {
        Self {
            source,
            template,
            params: Vec::new(),
        }
    }

    fn param(mut self, key: &str, value: u32) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// Concrete request path for the given scope and subject.
    pub fn path(&self, scope: &str, subject: Option<&str>) -> String {
        let path = self.template.replace("{scope}", scope);
        match subject {
            Some(subject) => path.replace("{subject}", subject),
            None => path,
        }
    }
}

/// Descriptors for the site dashboard, in [`Source::DASHBOARD`] order.
pub fn dashboard_sources(settings: &SourceSettings) -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor::new(Source::Overview, "/sites/{scope}/overview"),
        SourceDescriptor::new(Source::ZoneStats, "/sites/{scope}/zones/stats"),
        SourceDescriptor::new(Source::BillingStats, "/sites/{scope}/billing/stats"),
        SourceDescriptor::new(Source::Usage, "/sites/{scope}/usage")
            .param("months", settings.usage_months),
        SourceDescriptor::new(Source::Alerts, "/sites/{scope}/alerts")
            .param("limit", settings.alerts_limit),
        SourceDescriptor::new(Source::Activities, "/sites/{scope}/activities")
            .param("limit", settings.activities_limit),
        SourceDescriptor::new(Source::Statistics, "/sites/{scope}/statistics"),
    ]
}

/// Descriptors for a resident's view, in [`Source::RESIDENT`] order.
pub fn resident_sources(settings: &SourceSettings) -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor::new(Source::Bills, "/sites/{scope}/residents/{subject}/bills"),
        SourceDescriptor::new(Source::Meter, "/sites/{scope}/residents/{subject}/meter"),
        SourceDescriptor::new(Source::UsageHistory, "/sites/{scope}/residents/{subject}/usage")
            .param("months", settings.resident_usage_months),
        SourceDescriptor::new(Source::Announcements, "/sites/{scope}/announcements")
            .param("limit", settings.announcements_limit),
    ]
}
