//! Bounded log of pool lifecycle events, served by the diagnostics API.
//!
//! Recording is synchronous so the pool can log from inside its state lock.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TelemetrySeverity {
    Info,
    Warning,
    Error,
}

/// What happened to the pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Connector `create` failed
    Create,
    /// Connector `destroy` failed
    Destroy,
    /// A queued connect request expired
    Timeout,
    /// An idle connection aged out
    Eviction,
    /// The pool finished shutting down
    Termination,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Create => "create",
            EventCategory::Destroy => "destroy",
            EventCategory::Timeout => "timeout",
            EventCategory::Eviction => "eviction",
            EventCategory::Termination => "termination",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: TelemetrySeverity,
    pub pool: String,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Selects events from a [`TelemetryHistory`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events from the last N minutes
    pub minutes: Option<i64>,
    pub category: Option<EventCategory>,
    /// Only events at or above this severity
    pub min_severity: Option<TelemetrySeverity>,
}

impl EventFilter {
    fn matches(&self, event: &TelemetryEvent, cutoff: Option<DateTime<Utc>>) -> bool {
        cutoff.map_or(true, |cutoff| event.timestamp >= cutoff)
            && self.category.map_or(true, |c| event.category == c)
            && self.min_severity.map_or(true, |s| event.severity >= s)
    }
}

/// Shared, size- and age-bounded event history. Clones share the buffer.
#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    events: Arc<RwLock<VecDeque<TelemetryEvent>>>,
    max_events: usize,
    max_age: ChronoDuration,
}

impl Default for TelemetryHistory {
    fn default() -> Self {
        Self::new(256, 24)
    }
}

impl TelemetryHistory {
    pub fn new(max_events: usize, retention_hours: u64) -> Self {
        let max_events = max_events.max(1);
        let retention_hours = i64::try_from(retention_hours).unwrap_or(i64::MAX);
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(max_events))),
            max_events,
            max_age: ChronoDuration::try_hours(retention_hours).unwrap_or(ChronoDuration::MAX),
        }
    }

    /// Record an event stamped with the current time.
    pub fn record_event(
        &self,
        severity: TelemetrySeverity,
        pool: &str,
        category: EventCategory,
        message: impl Into<String>,
        details: Option<Value>,
    ) {
        self.push(TelemetryEvent {
            timestamp: Utc::now(),
            severity,
            pool: pool.to_string(),
            category,
            message: message.into(),
            details,
        });
    }

    fn push(&self, event: TelemetryEvent) {
        let mut events = self.events.write();
        let cutoff = Utc::now().checked_sub_signed(self.max_age);
        if let Some(cutoff) = cutoff {
            while events.front().is_some_and(|e| e.timestamp < cutoff) {
                events.pop_front();
            }
        }

        if events.len() == self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Retained events matching `filter`, oldest first.
    pub fn query(&self, filter: &EventFilter) -> Vec<TelemetryEvent> {
        let cutoff = filter
            .minutes
            .and_then(ChronoDuration::try_minutes)
            .and_then(|window| Utc::now().checked_sub_signed(window));

        self.events
            .read()
            .iter()
            .filter(|event| filter.matches(event, cutoff))
            .cloned()
            .collect()
    }

    /// Every retained event, oldest first.
    pub fn get_events(&self) -> Vec<TelemetryEvent> {
        self.query(&EventFilter::default())
    }

    /// Number of retained events per category.
    pub fn counts(&self) -> BTreeMap<EventCategory, usize> {
        let mut counts = BTreeMap::new();
        for event in self.events.read().iter() {
            *counts.entry(event.category).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(age: ChronoDuration, category: EventCategory, severity: TelemetrySeverity) -> TelemetryEvent {
        TelemetryEvent {
            timestamp: Utc::now() - age,
            severity,
            pool: "p".to_string(),
            category,
            message: category.to_string(),
            details: None,
        }
    }

    #[test]
    fn keeps_only_the_newest_events() {
        let history = TelemetryHistory::new(2, 1);
        for n in 0..3 {
            history.record_event(
                TelemetrySeverity::Warning,
                "p",
                EventCategory::Timeout,
                format!("timeout {}", n),
                None,
            );
        }

        let messages: Vec<_> = history.get_events().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["timeout 1", "timeout 2"]);
    }

    #[test]
    fn expired_events_are_dropped_on_record() {
        let history = TelemetryHistory::new(10, 1);
        history.push(event(
            ChronoDuration::hours(2),
            EventCategory::Eviction,
            TelemetrySeverity::Info,
        ));
        history.record_event(TelemetrySeverity::Error, "p", EventCategory::Create, "refused", None);

        let events = history.get_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, EventCategory::Create);
    }

    #[test]
    fn query_filters_by_window_category_and_severity() {
        let history = TelemetryHistory::new(10, 24);
        history.push(event(ChronoDuration::minutes(30), EventCategory::Create, TelemetrySeverity::Error));
        history.push(event(ChronoDuration::minutes(2), EventCategory::Eviction, TelemetrySeverity::Info));
        history.push(event(ChronoDuration::minutes(1), EventCategory::Create, TelemetrySeverity::Error));

        let recent = history.query(&EventFilter {
            minutes: Some(5),
            ..Default::default()
        });
        assert_eq!(recent.len(), 2);

        let creates = history.query(&EventFilter {
            category: Some(EventCategory::Create),
            ..Default::default()
        });
        assert_eq!(creates.len(), 2);

        let errors = history.query(&EventFilter {
            minutes: Some(5),
            min_severity: Some(TelemetrySeverity::Warning),
            ..Default::default()
        });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, EventCategory::Create);
    }

    #[test]
    fn counts_group_by_category() {
        let history = TelemetryHistory::default();
        history.record_event(TelemetrySeverity::Info, "p", EventCategory::Eviction, "idle", None);
        history.record_event(TelemetrySeverity::Info, "p", EventCategory::Eviction, "idle", None);
        history.record_event(TelemetrySeverity::Info, "p", EventCategory::Termination, "done", None);

        let counts = history.counts();
        assert_eq!(counts.get(&EventCategory::Eviction), Some(&2));
        assert_eq!(counts.get(&EventCategory::Termination), Some(&1));
        assert_eq!(counts.get(&EventCategory::Create), None);
    }

    #[test]
    fn categories_serialize_lowercase() {
        let json = serde_json::to_string(&EventCategory::Termination).unwrap();
        assert_eq!(json, "\"termination\"");
    }
}
