//! Reduction of settled source outcomes into typed payloads.

use super::AggregateError;
use crate::client::ClientError;
use crate::models::{Source, SourceFailure};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Message used when a failed source carries no declared message.
pub const FALLBACK_MESSAGE: &str = "request failed";

/// Keys under which list payloads may be nested.
const LIST_KEYS: [&str; 3] = ["list", "items", "records"];

/// Take the payload out of the backend's `{ "data": ... }` envelope.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Drop `null` object members so missing and null fields default alike.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Accept either a bare array or an object holding one under a list key.
///
/// A null or absent list is empty; null elements are dropped.
fn list_items(payload: Value) -> Result<Value, String> {
    let items = match payload {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(mut map) => match LIST_KEYS.iter().find_map(|key| map.remove(*key)) {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => return Err(format!("expected a list, got {}", other)),
        },
        other => return Err(format!("expected a list, got {}", other)),
    };

    Ok(Value::Array(
        items.into_iter().filter(|item| !item.is_null()).collect(),
    ))
}

fn decode<T: DeserializeOwned + Default>(payload: Value) -> Result<T, String> {
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(strip_nulls(payload)).map_err(|e| e.to_string())
}

/// Collects outcomes by source and turns each into a payload or a default.
pub struct Reducer {
    outcomes: HashMap<Source, Result<Value, ClientError>>,
    failures: Vec<SourceFailure>,
}

impl Reducer {
    pub fn new(outcomes: Vec<(Source, Result<Value, ClientError>)>) -> Result<Self, AggregateError> {
        let expected = outcomes.len();
        let outcomes: HashMap<_, _> = outcomes.into_iter().collect();
        if outcomes.len() != expected {
            return Err(AggregateError::Composition(
                "duplicate outcome for a source".to_string(),
            ));
        }

        Ok(Self {
            outcomes,
            failures: Vec::new(),
        })
    }

    /// Payload for an object-shaped source.
    pub fn object<T: DeserializeOwned + Default>(&mut self, source: Source) -> Result<T, AggregateError> {
        self.take(source, decode)
    }

    /// Payload for a list-shaped source.
    pub fn list<T: DeserializeOwned>(&mut self, source: Source) -> Result<Vec<T>, AggregateError> {
        self.take(source, |payload| list_items(payload).and_then(decode))
    }

    fn take<T: Default>(
        &mut self,
        source: Source,
        decode: impl FnOnce(Value) -> Result<T, String>,
    ) -> Result<T, AggregateError> {
        let outcome = self.outcomes.remove(&source).ok_or_else(|| {
            AggregateError::Composition(format!("no outcome recorded for source {}", source))
        })?;

        match outcome {
            Ok(body) => match decode(unwrap_envelope(body)) {
                Ok(payload) => Ok(payload),
                Err(e) => {
                    warn!(source = %source, "Malformed payload: {}", e);
                    self.failures
                        .push(SourceFailure::new(source.name(), format!("malformed payload: {}", e)));
                    Ok(T::default())
                }
            },
            Err(e) => {
                if e.is_unauthorized() {
                    warn!(source = %source, "Backend rejected the credentials");
                } else {
                    warn!(source = %source, "Source failed: {}", e);
                }
                let message = e.message().unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
                self.failures.push(SourceFailure::new(source.name(), message));
                Ok(T::default())
            }
        }
    }

    /// Failures in declaration order; every outcome must have been consumed.
    pub fn finish(self, order: &[Source]) -> Result<Vec<SourceFailure>, AggregateError> {
        if let Some(source) = self.outcomes.keys().next() {
            return Err(AggregateError::Composition(format!(
                "outcome for source {} was never reduced",
                source
            )));
        }

        let mut failures = self.failures;
        failures.sort_by_key(|f| {
            order
                .iter()
                .position(|s| s.name() == f.source)
                .unwrap_or(usize::MAX)
        });
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Overview, ZoneStat};
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(unwrap_envelope(json!({"data": {"a": 1}})), json!({"a": 1}));
        assert_eq!(unwrap_envelope(json!({"a": 1})), json!({"a": 1}));
        assert_eq!(unwrap_envelope(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_strip_nulls_nested() {
        let stripped = strip_nulls(json!({"a": null, "b": {"c": null, "d": 1}, "e": [{"f": null}]}));
        assert_eq!(stripped, json!({"b": {"d": 1}, "e": [{}]}));
    }

    #[test]
    fn test_list_accepts_both_shapes() {
        let mut reducer = Reducer::new(vec![
            (Source::ZoneStats, Ok(json!({"data": [{"zone": "A"}]}))),
            (Source::Usage, Ok(json!({"data": {"list": [{"period": "2024-01"}]}}))),
        ])
        .unwrap();

        let zones: Vec<ZoneStat> = reducer.list(Source::ZoneStats).unwrap();
        let usage: Vec<crate::models::UsagePoint> = reducer.list(Source::Usage).unwrap();
        assert_eq!(zones[0].zone, "A");
        assert_eq!(usage[0].period, "2024-01");
        assert!(reducer.finish(&Source::DASHBOARD).unwrap().is_empty());
    }

    #[test]
    fn test_null_fields_default() {
        let mut reducer = Reducer::new(vec![(
            Source::Overview,
            Ok(json!({"data": {"total_meters": null, "active_meters": 2}})),
        )])
        .unwrap();
        let overview: Overview = reducer.object(Source::Overview).unwrap();
        assert_eq!(overview.total_meters, 0);
        assert_eq!(overview.active_meters, 2);
    }

    #[test]
    fn test_loose_numbers_keep_the_payload() {
        let mut reducer = Reducer::new(vec![(
            Source::Overview,
            Ok(json!({"data": {"total_residents": 120.0, "total_meters": 118, "total_usage": "5400.50"}})),
        )])
        .unwrap();
        let overview: Overview = reducer.object(Source::Overview).unwrap();
        assert_eq!(overview.total_residents, 120);
        assert_eq!(overview.total_meters, 118);
        assert_eq!(overview.total_usage, 5400.5);
        assert!(reducer.finish(&Source::DASHBOARD).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_typed_field_defaults_alone() {
        let mut reducer = Reducer::new(vec![(
            Source::Overview,
            Ok(json!({"data": {"total_residents": "many", "active_meters": 9}})),
        )])
        .unwrap();
        let overview: Overview = reducer.object(Source::Overview).unwrap();
        assert_eq!(overview.total_residents, 0);
        assert_eq!(overview.active_meters, 9);
        assert!(reducer.finish(&Source::DASHBOARD).unwrap().is_empty());
    }

    #[test]
    fn test_null_list_wrapper_is_empty() {
        let mut reducer = Reducer::new(vec![
            (Source::ZoneStats, Ok(json!({"data": {"list": null, "total": 0}}))),
            (Source::Alerts, Ok(json!({"data": {"total": 0}}))),
        ])
        .unwrap();
        let zones: Vec<ZoneStat> = reducer.list(Source::ZoneStats).unwrap();
        let alerts: Vec<crate::models::Alert> = reducer.list(Source::Alerts).unwrap();
        assert!(zones.is_empty());
        assert!(alerts.is_empty());
        assert!(reducer.finish(&Source::DASHBOARD).unwrap().is_empty());
    }

    #[test]
    fn test_null_list_elements_are_dropped() {
        let mut reducer = Reducer::new(vec![(
            Source::Usage,
            Ok(json!({"data": [null, {"period": "2024-01"}, null]})),
        )])
        .unwrap();
        let usage: Vec<crate::models::UsagePoint> = reducer.list(Source::Usage).unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].period, "2024-01");
        assert!(reducer.finish(&Source::DASHBOARD).unwrap().is_empty());
    }

    #[test]
    fn test_non_list_under_list_key_is_failure() {
        let mut reducer =
            Reducer::new(vec![(Source::Activities, Ok(json!({"data": {"items": "none"}})))]).unwrap();
        let activities: Vec<crate::models::Activity> = reducer.list(Source::Activities).unwrap();
        assert!(activities.is_empty());
        let failures = reducer.finish(&Source::DASHBOARD).unwrap();
        assert_eq!(failures[0].source, "activities");
    }

    #[test]
    fn test_malformed_payload_becomes_failure() {
        let mut reducer = Reducer::new(vec![(Source::Alerts, Ok(json!({"data": "oops"})))]).unwrap();
        let alerts: Vec<crate::models::Alert> = reducer.list(Source::Alerts).unwrap();
        assert!(alerts.is_empty());

        let failures = reducer.finish(&Source::DASHBOARD).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].source, "alerts");
        assert!(failures[0].message.starts_with("malformed payload"));
    }

    #[test]
    fn test_error_without_message_uses_fallback() {
        let mut reducer = Reducer::new(vec![(Source::Overview, Err(ClientError::Timeout))]).unwrap();
        let overview: Overview = reducer.object(Source::Overview).unwrap();
        assert_eq!(overview, Overview::default());
        let failures = reducer.finish(&Source::DASHBOARD).unwrap();
        assert_eq!(failures, vec![SourceFailure::new("overview", FALLBACK_MESSAGE)]);
    }

    #[test]
    fn test_missing_outcome_is_composition_error() {
        let mut reducer = Reducer::new(vec![]).unwrap();
        let result: Result<Overview, _> = reducer.object(Source::Overview);
        assert!(matches!(result, Err(AggregateError::Composition(_))));
    }

    #[test]
    fn test_unconsumed_outcome_is_composition_error() {
        let reducer = Reducer::new(vec![(Source::Overview, Ok(json!({})))]).unwrap();
        assert!(matches!(
            reducer.finish(&Source::DASHBOARD),
            Err(AggregateError::Composition(_))
        ));
    }

    #[test]
    fn test_duplicate_outcome_is_composition_error() {
        let result = Reducer::new(vec![
            (Source::Overview, Ok(json!({}))),
            (Source::Overview, Ok(json!({}))),
        ]);
        assert!(matches!(result, Err(AggregateError::Composition(_))));
    }

    #[test]
    fn test_failures_sorted_by_declaration() {
        let mut reducer = Reducer::new(vec![
            (Source::Statistics, Err(ClientError::Timeout)),
            (Source::Overview, Err(ClientError::Timeout)),
        ])
        .unwrap();
        let _: crate::models::Statistics = reducer.object(Source::Statistics).unwrap();
        let _: Overview = reducer.object(Source::Overview).unwrap();
        let failures = reducer.finish(&Source::DASHBOARD).unwrap();
        assert_eq!(failures[0].source, "overview");
        assert_eq!(failures[1].source, "statistics");
    }
}
