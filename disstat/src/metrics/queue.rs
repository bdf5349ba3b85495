use crate::backend::QueueMode;
use crate::error::{DisstatError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Scalar carried by a custom event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Text(String),
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Int(i64::from(value))
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => MetricValue::Int(v),
            Err(_) => MetricValue::Text(value.to_string()),
        }
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// A single custom graph event (`{type, value1, value2, value3}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomEvent {
    #[serde(rename = "type")]
    pub graph_type: String,
    pub value1: MetricValue,
    pub value2: MetricValue,
    pub value3: MetricValue,
}

impl CustomEvent {
    pub const MAX_VALUES: usize = 3;

    /// Build an event; missing values default to `0`
    pub fn new(graph_type: &str, values: Vec<MetricValue>) -> Result<Self> {
        if graph_type.trim().is_empty() {
            return Err(DisstatError::validation("graph_type cannot be empty"));
        }
        if values.len() > Self::MAX_VALUES {
            return Err(DisstatError::validation(format!(
                "a custom event takes at most {} values, got {}",
                Self::MAX_VALUES,
                values.len()
            )));
        }

        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or(MetricValue::Int(0));
        Ok(Self {
            graph_type: graph_type.to_string(),
            value1: next(),
            value2: next(),
            value3: next(),
        })
    }
}

/// Data points accumulated for one custom chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomGraph {
    pub id: String,
    pub data: Vec<Map<String, Value>>,
}

/// An entry waiting in the custom metric queue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CustomMetricEntry {
    Event(CustomEvent),
    Graph(CustomGraph),
}

impl CustomMetricEntry {
    pub fn graph_id(&self) -> &str {
        match self {
            CustomMetricEntry::Event(event) => &event.graph_type,
            CustomMetricEntry::Graph(graph) => &graph.id,
        }
    }
}

/// Custom metrics waiting for the next stats report
///
/// Every mutation and the drain run under the same lock, so an entry pushed
/// concurrently with a drain lands either in the drained batch or in the queue.
pub struct CustomMetricQueue {
    mode: QueueMode,
    entries: Mutex<Vec<CustomMetricEntry>>,
}

impl CustomMetricQueue {
    pub fn new(mode: QueueMode) -> Self {
        Self {
            mode,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Enqueue an entry. Empty graph ids are rejected and leave the queue untouched.
    pub fn push(&self, entry: CustomMetricEntry) -> Result<()> {
        if entry.graph_id().trim().is_empty() {
            return Err(DisstatError::validation("custom metric id cannot be empty"));
        }
        let mut entries = self.entries.lock();
        Self::insert(self.mode, &mut entries, entry);
        Ok(())
    }

    /// Take the whole queue, leaving it empty
    pub fn drain(&self) -> Vec<CustomMetricEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Put previously drained entries back in front of anything queued since
    pub fn restore(&self, drained: Vec<CustomMetricEntry>) {
        if drained.is_empty() {
            return;
        }
        let mut entries = self.entries.lock();
        let newer = std::mem::replace(&mut *entries, drained);
        for entry in newer {
            Self::insert(self.mode, &mut entries, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<CustomMetricEntry> {
        self.entries.lock().clone()
    }

    fn insert(mode: QueueMode, entries: &mut Vec<CustomMetricEntry>, entry: CustomMetricEntry) {
        match (mode, entry) {
            (QueueMode::MergeById, CustomMetricEntry::Graph(graph)) => {
                let existing = entries.iter_mut().find_map(|queued| match queued {
                    CustomMetricEntry::Graph(queued) if queued.id == graph.id => Some(queued),
                    _ => None,
                });
                match existing {
                    Some(queued) => queued.data.extend(graph.data),
                    None => entries.push(CustomMetricEntry::Graph(graph)),
                }
            }
            (_, entry) => entries.push(entry),
        }
    }
}
