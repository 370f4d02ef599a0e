//! Observability sink for recovered-but-notable conditions

use std::collections::BTreeMap;
use std::sync::Mutex;

/// One captured condition: error text, category tag and breadcrumb data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub category: String,
    pub message: String,
    pub data: BTreeMap<String, String>,
}

impl Alert {
    pub fn new(category: impl Into<String>, error: &dyn std::error::Error) -> Self {
        Self {
            category: category.into(),
            message: error.to_string(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

pub trait AlertSink: Send + Sync {
    fn capture(&self, alert: Alert);
}

/// Emits alerts as `warn` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn capture(&self, alert: Alert) {
        tracing::warn!(
            category = %alert.category,
            data = ?alert.data,
            "{}",
            alert.message
        );
    }
}

/// Keeps every alert in memory
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        match self.alerts.lock() {
            Ok(alerts) => alerts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.alerts().len()
    }
}

impl AlertSink for RecordingAlertSink {
    fn capture(&self, alert: Alert) {
        match self.alerts.lock() {
            Ok(mut alerts) => alerts.push(alert),
            Err(poisoned) => poisoned.into_inner().push(alert),
        }
    }
}
