//! Resilient multi-source aggregation.
//!
//! An aggregation call issues one GET per configured source, waits for every
//! request to settle, and folds the outcomes into a single composite. A
//! failing source degrades to its default payload plus an entry in the
//! failure list; it never aborts its siblings.

pub mod reduce;
pub mod sources;

use crate::client::{ApiClient, ClientError};
use crate::clock::Clock;
use crate::models::{DashboardAggregate, DateRange, ResidentAggregate, Source};
use futures::future::join_all;
use reduce::Reducer;
use serde_json::Value;
use sources::{dashboard_sources, resident_sources, SourceDescriptor, SourceSettings};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Fault in composing a result; never caused by a remote failure.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("could not compose aggregate: {0}")]
    Composition(String),
}

/// Fans out source reads and reduces them into composites.
pub struct Aggregator<C: ApiClient> {
    client: Arc<C>,
    clock: Arc<dyn Clock>,
    settings: SourceSettings,
}

impl<C: ApiClient> Aggregator<C> {
    pub fn new(client: Arc<C>, clock: Arc<dyn Clock>, settings: SourceSettings) -> Self {
        Self {
            client,
            clock,
            settings,
        }
    }

    /// The given filter, or the current calendar month by the injected clock.
    pub fn resolve_range(&self, filter: Option<DateRange>) -> DateRange {
        filter.unwrap_or_else(|| DateRange::current_month(self.clock.as_ref()))
    }

    /// Build the site dashboard for `scope`.
    ///
    /// A blank scope returns the all-default result without touching the
    /// network. A missing filter means the current calendar month.
    pub async fn aggregate(
        &self,
        scope: Option<&str>,
        filter: Option<DateRange>,
    ) -> Result<DashboardAggregate, AggregateError> {
        let Some(scope) = non_blank(scope) else {
            debug!("No scope given, skipping dashboard aggregation");
            return Ok(DashboardAggregate::default());
        };

        let range = self.resolve_range(filter);
        let descriptors = dashboard_sources(&self.settings);
        let outcomes = self
            .settle_all(&descriptors, scope, None, &range.query_params())
            .await;

        let mut reducer = Reducer::new(outcomes)?;
        let aggregate = DashboardAggregate {
            overview: reducer.object(Source::Overview)?,
            zone_stats: reducer.list(Source::ZoneStats)?,
            billing_stats: reducer.object(Source::BillingStats)?,
            usage: reducer.list(Source::Usage)?,
            alerts: reducer.list(Source::Alerts)?,
            activities: reducer.list(Source::Activities)?,
            statistics: reducer.object(Source::Statistics)?,
            failures: reducer.finish(&Source::DASHBOARD)?,
        };

        info!(
            "Dashboard for {} ({}): {} ok, {} failed",
            scope,
            range,
            descriptors.len() - aggregate.failures.len(),
            aggregate.failures.len()
        );
        Ok(aggregate)
    }

    /// Build the view of a single resident `subject` within `scope`.
    ///
    /// A blank scope or subject returns the all-default result without
    /// touching the network.
    pub async fn aggregate_resident_view(
        &self,
        scope: Option<&str>,
        subject: Option<&str>,
    ) -> Result<ResidentAggregate, AggregateError> {
        let (Some(scope), Some(subject)) = (non_blank(scope), non_blank(subject)) else {
            debug!("Scope or resident missing, skipping resident aggregation");
            return Ok(ResidentAggregate::default());
        };

        let descriptors = resident_sources(&self.settings);
        let outcomes = self
            .settle_all(&descriptors, scope, Some(subject), &[])
            .await;

        let mut reducer = Reducer::new(outcomes)?;
        let aggregate = ResidentAggregate {
            bills: reducer.list(Source::Bills)?,
            meter: reducer.object(Source::Meter)?,
            usage_history: reducer.list(Source::UsageHistory)?,
            announcements: reducer.list(Source::Announcements)?,
            failures: reducer.finish(&Source::RESIDENT)?,
        };

        info!(
            "Resident view for {}/{}: {} ok, {} failed",
            scope,
            subject,
            descriptors.len() - aggregate.failures.len(),
            aggregate.failures.len()
        );
        Ok(aggregate)
    }

    /// Dispatch every descriptor at once and wait until all have settled.
    async fn settle_all(
        &self,
        descriptors: &[SourceDescriptor],
        scope: &str,
        subject: Option<&str>,
        shared_query: &[(String, String)],
    ) -> Vec<(Source, Result<Value, ClientError>)> {
        let client = self.client.as_ref();

        let requests = descriptors.iter().map(|descriptor| {
            let path = descriptor.path(scope, subject);
            let mut query = shared_query.to_vec();
            query.extend(descriptor.params.iter().cloned());

            async move {
                debug!(source = %descriptor.source, "Dispatching {}", path);
                let outcome = client.get(&path, &query).await;
                (descriptor.source, outcome)
            }
        });

        join_all(requests).await
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
