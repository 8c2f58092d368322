//! Contradiction mining of DCR graphs
//!
//! The miner starts from the most constrained graph consistent with co-occurrence in the log and
//! drops every candidate relation that is contradicted by more traces than the
//! [`ViolationThreshold`] allows.
//!
//! Candidates and their violations:
//!
//! - `Condition(A, B)` for activities occurring together in a trace (`A` being the one that
//!   occurred first in the first such trace): violated by traces in which `B` occurs before
//!   any `A`.
//! - `Response(A, B)`: violated by traces in which the last `A` is not followed by a `B`.
//! - `Exclude(A, A)`: violated by traces in which `A` occurs more than once.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::core::event_data::{Log, Trace};
use crate::core::process_models::dcr::{Activity, ActivityId, DcrGraph, Relation, RelationKind};
use crate::error::DcrError;

/// Tolerated number of violating traces per candidate relation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ViolationThreshold {
    /// Fraction of all observed traces (e.g., `0.05` for 5%)
    Fraction(f64),
    /// Absolute number of traces
    Absolute(u64),
}

impl Default for ViolationThreshold {
    fn default() -> Self {
        Self::Fraction(0.0)
    }
}

impl ViolationThreshold {
    /// Checks whether `violations` out of `traces` observed traces are tolerated
    ///
    /// Fractions tolerate rounding errors of the product (e.g., `0.57 * 100.0` allows 57).
    pub fn allows(&self, violations: u64, traces: u64) -> bool {
        match self {
            ViolationThreshold::Fraction(fraction) => {
                let traces = traces as f64;
                violations as f64 <= fraction * traces + f64::EPSILON * traces
            }
            ViolationThreshold::Absolute(allowed) => violations <= *allowed,
        }
    }
}

/// Options for the [`ContradictionMiner`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContradictionMinerOptions {
    /// Tolerated violations per candidate relation
    pub threshold: ViolationThreshold,
    /// Whether response relations are mined
    pub mine_responses: bool,
    /// Whether self-excludes (activities occurring at most once) are mined
    pub mine_self_exclusions: bool,
}

impl Default for ContradictionMinerOptions {
    fn default() -> Self {
        Self {
            threshold: ViolationThreshold::default(),
            mine_responses: true,
            mine_self_exclusions: true,
        }
    }
}

impl ContradictionMinerOptions {
    /// Default options with the given threshold
    pub fn with_threshold(threshold: ViolationThreshold) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Counts collected while mining
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningStatistics {
    /// Number of observed traces
    pub traces: u64,
    /// Number of observed events
    pub events: u64,
    /// Number of violating traces per candidate relation
    #[serde_as(as = "Vec<(_, _)>")]
    pub violations: BTreeMap<Relation, u64>,
    /// Candidates committed to the graph
    pub kept: BTreeSet<Relation>,
}

/// Result of [`ContradictionMiner::stop`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningResult {
    /// Mined graph
    pub graph: DcrGraph,
    /// Counts collected while mining
    pub statistics: MiningStatistics,
}

/// State of the trace currently being observed
#[derive(Debug, Default)]
struct TraceState {
    /// Activities in order of their first occurrence
    first_occurrences: Vec<ActivityId>,
    occurrences: HashMap<ActivityId, u64>,
    /// For each activity: activities that occurred after its last occurrence
    after_last: HashMap<ActivityId, HashSet<ActivityId>>,
    last_timestamp: Option<DateTime<FixedOffset>>,
}

///
/// Incremental contradiction miner
///
/// Feed traces with [`ContradictionMiner::add_event`] / [`ContradictionMiner::finish_trace`],
/// [`ContradictionMiner::add_trace`] or [`ContradictionMiner::add_variant`] and finalize
/// with [`ContradictionMiner::stop`].
///
/// All counts are exact: the violations of `Condition(A, B)` are the traces containing `B`
/// minus the traces in which some `A` precedes the first `B`, so candidates discovered late
/// are judged on the whole log. Each event only touches the pairs ending in its activity.
///
#[derive(Debug)]
pub struct ContradictionMiner {
    alphabet: BTreeMap<ActivityId, String>,
    options: ContradictionMinerOptions,
    traces: u64,
    events: u64,
    /// Traces containing the activity
    trace_occurrences: HashMap<ActivityId, u64>,
    /// Traces containing the activity more than once
    repeated: HashMap<ActivityId, u64>,
    /// Condition candidates (directed by first co-occurrence) by unordered pair
    condition_candidates: HashMap<(ActivityId, ActivityId), (ActivityId, ActivityId)>,
    /// Traces in which `A` occurs before the first `B`
    precedence_support: HashMap<(ActivityId, ActivityId), u64>,
    /// Traces in which the last `A` is followed by `B`
    response_support: HashMap<(ActivityId, ActivityId), u64>,
    current: TraceState,
}

fn unordered(a: &str, b: &str) -> (ActivityId, ActivityId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl ContradictionMiner {
    /// Create a miner over the given activities (identifier to display name)
    pub fn new(alphabet: BTreeMap<ActivityId, String>, options: ContradictionMinerOptions) -> Self {
        Self {
            alphabet,
            options,
            traces: 0,
            events: 0,
            trace_occurrences: HashMap::new(),
            repeated: HashMap::new(),
            condition_candidates: HashMap::new(),
            precedence_support: HashMap::new(),
            response_support: HashMap::new(),
            current: TraceState::default(),
        }
    }

    /// Observe the next event of the current trace
    ///
    /// Timestamps are optional; events are always processed in the order they are added.
    pub fn add_event(
        &mut self,
        activity: &str,
        timestamp: Option<DateTime<FixedOffset>>,
    ) -> Result<(), DcrError> {
        if !self.alphabet.contains_key(activity) {
            return Err(DcrError::unknown(activity));
        }
        if let Some(timestamp) = timestamp {
            if self.current.last_timestamp.is_some_and(|last| timestamp < last) {
                tracing::warn!(
                    activity,
                    timestamp = %timestamp,
                    "Event timestamp is earlier than the previous event of the trace"
                );
            }
            self.current.last_timestamp = Some(timestamp);
        }
        self.observe(activity);
        Ok(())
    }

    fn observe(&mut self, activity: &str) {
        let current = &mut self.current;
        let count = current.occurrences.entry(activity.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            current.first_occurrences.push(activity.to_string());
        }
        for (other, followers) in current.after_last.iter_mut() {
            if other != activity {
                followers.insert(activity.to_string());
            }
        }
        current
            .after_last
            .insert(activity.to_string(), HashSet::new());
    }

    /// Finish the current trace
    pub fn finish_trace(&mut self) {
        self.finish_trace_with_frequency(1);
    }

    fn finish_trace_with_frequency(&mut self, frequency: u64) {
        let trace = std::mem::take(&mut self.current);
        self.traces += frequency;
        for (activity, count) in &trace.occurrences {
            self.events += count * frequency;
            *self.trace_occurrences.entry(activity.clone()).or_insert(0) += frequency;
            if *count > 1 {
                *self.repeated.entry(activity.clone()).or_insert(0) += frequency;
            }
        }
        for (i, b) in trace.first_occurrences.iter().enumerate() {
            for a in &trace.first_occurrences[..i] {
                self.condition_candidates
                    .entry(unordered(a, b))
                    .or_insert_with(|| (a.clone(), b.clone()));
                *self
                    .precedence_support
                    .entry((a.clone(), b.clone()))
                    .or_insert(0) += frequency;
            }
        }
        if self.options.mine_responses {
            for (a, followers) in trace.after_last {
                for b in followers {
                    *self.response_support.entry((a.clone(), b)).or_insert(0) += frequency;
                }
            }
        }
    }

    /// Observe a complete trace
    pub fn add_trace(&mut self, trace: &Trace) -> Result<(), DcrError> {
        for event in &trace.events {
            self.add_event(&event.activity, event.timestamp)?;
        }
        self.finish_trace();
        Ok(())
    }

    /// Observe `frequency` traces with the same activity sequence
    pub fn add_variant<S: AsRef<str>>(
        &mut self,
        activities: &[S],
        frequency: u64,
    ) -> Result<(), DcrError> {
        for activity in activities {
            self.add_event(activity.as_ref(), None)?;
        }
        self.finish_trace_with_frequency(frequency);
        Ok(())
    }

    fn occurrences(&self, activity: &str) -> u64 {
        self.trace_occurrences.get(activity).copied().unwrap_or(0)
    }

    fn condition_violations(&self, a: &str, b: &str) -> u64 {
        let support = self
            .precedence_support
            .get(&(a.to_string(), b.to_string()))
            .copied()
            .unwrap_or(0);
        self.occurrences(b) - support
    }

    fn response_violations(&self, a: &str, b: &str) -> u64 {
        let support = self
            .response_support
            .get(&(a.to_string(), b.to_string()))
            .copied()
            .unwrap_or(0);
        self.occurrences(a) - support
    }

    /// Candidate relations with their number of violating traces, in deterministic order
    fn candidates(&self) -> Vec<(Relation, u64)> {
        let mut candidates: Vec<(Relation, u64)> = self
            .condition_candidates
            .values()
            .map(|(a, b)| {
                (
                    Relation::new(RelationKind::Condition, a.as_str(), b.as_str()),
                    self.condition_violations(a, b),
                )
            })
            .collect();
        if self.options.mine_responses {
            candidates.extend(self.response_support.keys().map(|(a, b)| {
                (
                    Relation::new(RelationKind::Response, a.as_str(), b.as_str()),
                    self.response_violations(a, b),
                )
            }));
        }
        if self.options.mine_self_exclusions {
            candidates.extend(self.trace_occurrences.keys().map(|a| {
                (
                    Relation::new(RelationKind::Exclude, a.as_str(), a.as_str()),
                    self.repeated.get(a).copied().unwrap_or(0),
                )
            }));
        }
        candidates.sort();
        candidates
    }

    ///
    /// Finalize mining
    ///
    /// Candidates within the threshold are committed; of two opposite responses only the one
    /// with fewer violations is kept (on ties, the one with the smaller source).
    ///
    pub fn stop(mut self) -> Result<MiningResult, DcrError> {
        if !self.current.occurrences.is_empty() {
            self.finish_trace();
        }
        let candidates = self.candidates();
        let violations: BTreeMap<Relation, u64> = candidates.iter().cloned().collect();
        let mut kept: BTreeSet<Relation> = candidates
            .into_iter()
            .filter(|(_, v)| self.options.threshold.allows(*v, self.traces))
            .map(|(r, _)| r)
            .collect();
        let dominated: Vec<Relation> = kept
            .iter()
            .filter(|r| r.kind == RelationKind::Response && r.source != r.target)
            .filter(|r| {
                let opposite = Relation::new(RelationKind::Response, r.target.as_str(), r.source.as_str());
                kept.contains(&opposite) && {
                    let own = violations.get(*r).copied().unwrap_or(0);
                    let other = violations.get(&opposite).copied().unwrap_or(0);
                    own > other || (own == other && r.source > r.target)
                }
            })
            .cloned()
            .collect();
        for relation in &dominated {
            kept.remove(relation);
        }

        let graph = DcrGraph::from_parts(
            self.alphabet
                .iter()
                .map(|(id, name)| Activity::new(id.as_str(), name.as_str())),
            kept.iter().cloned(),
        )?;
        tracing::info!(
            traces = self.traces,
            events = self.events,
            candidates = violations.len(),
            relations = kept.len(),
            "Finished contradiction mining"
        );
        Ok(MiningResult {
            graph,
            statistics: MiningStatistics {
                traces: self.traces,
                events: self.events,
                violations,
                kept,
            },
        })
    }
}

fn warn_on_unordered_timestamps(trace: &Trace) {
    let timestamps = trace.events.iter().filter_map(|e| e.timestamp);
    let out_of_order = timestamps
        .clone()
        .zip(timestamps.skip(1))
        .any(|(previous, next)| next < previous);
    if out_of_order {
        tracing::warn!(trace = %trace.id, "Trace events are not ordered by timestamp");
    }
}

///
/// Discover a [`DcrGraph`] from an event log using contradiction mining
///
/// The log is validated first: events of activities outside its alphabet are rejected with
/// [`DcrError::UnknownActivity`] before any mining happens. Identical traces are processed
/// once (as a variant with frequency).
///
pub fn discover_dcr_graph(
    log: &Log,
    options: &ContradictionMinerOptions,
) -> Result<MiningResult, DcrError> {
    log.validate()?;
    log.traces.iter().for_each(warn_on_unordered_timestamps);
    let mut miner = ContradictionMiner::new(log.alphabet.clone(), *options);
    for (variant, frequency) in log.variants() {
        miner.add_variant(&variant, frequency)?;
    }
    miner.stop()
}
