use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::DcrError;

/// Event of a [`Trace`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier of the executed activity
    pub activity: String,
    /// Display name of the event
    pub name: String,
    /// Time at which the event occurred (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl Event {
    /// Create an event for the given activity (using the activity identifier as name)
    pub fn new<S: Into<String>>(activity: S) -> Self {
        let activity = activity.into();
        Self {
            name: activity.clone(),
            activity,
            timestamp: None,
        }
    }

    /// Set the timestamp of the event
    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Ordered sequence of [`Event`]s of one process instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Identifier of the trace (case)
    pub id: String,
    /// Events in order of occurrence
    pub events: Vec<Event>,
}

impl Trace {
    /// Activity identifiers of the events
    pub fn activities(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.activity.as_str()).collect()
    }
}

/// Event log: a declared alphabet of activities and a collection of [`Trace`]s
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Declared activities (identifier to display name)
    pub alphabet: BTreeMap<String, String>,
    /// Traces of the log
    pub traces: Vec<Trace>,
}

impl Log {
    /// Create a new, empty [`Log`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an activity of the alphabet
    pub fn add_activity<I: Into<String>, N: Into<String>>(&mut self, id: I, name: N) {
        self.alphabet.insert(id.into(), name.into());
    }

    /// Add a trace to the log
    pub fn add_trace(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    /// Build a log from activity sequences; every activity that occurs is declared
    pub fn from_activity_sequences<T, S>(sequences: T) -> Self
    where
        T: IntoIterator,
        T::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut log = Self::new();
        for (i, sequence) in sequences.into_iter().enumerate() {
            let events: Vec<Event> = sequence
                .into_iter()
                .map(|act| Event::new(act.as_ref()))
                .collect();
            for e in &events {
                log.alphabet
                    .entry(e.activity.clone())
                    .or_insert_with(|| e.name.clone());
            }
            log.traces.push(Trace {
                id: i.to_string(),
                events,
            });
        }
        log
    }

    /// Total number of events in all traces
    pub fn event_count(&self) -> usize {
        self.traces.iter().map(|t| t.events.len()).sum()
    }

    /// Checks that every event references a declared activity
    pub fn validate(&self) -> Result<(), DcrError> {
        match self
            .traces
            .iter()
            .flat_map(|t| t.events.iter())
            .find(|e| !self.alphabet.contains_key(&e.activity))
        {
            Some(e) => Err(DcrError::unknown(e.activity.as_str())),
            None => Ok(()),
        }
    }

    /// Distinct activity sequences (variants) of the log with their frequency
    ///
    /// Variants are returned in order of their first occurrence.
    pub fn variants(&self) -> Vec<(Vec<&str>, u64)> {
        let mut index: HashMap<Vec<&str>, usize> = HashMap::new();
        let mut variants: Vec<(Vec<&str>, u64)> = Vec::new();
        for trace in &self.traces {
            let activities = trace.activities();
            match index.get(&activities) {
                Some(i) => variants[*i].1 += 1,
                None => {
                    index.insert(activities.clone(), variants.len());
                    variants.push((activities, 1));
                }
            }
        }
        variants
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
