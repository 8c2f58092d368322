//! Fitness, precision and simplicity of a [`DcrGraph`] with respect to a [`Log`]
use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::event_data::{Log, Trace};
use crate::core::process_models::dcr::execution::{enabled_activities, execute_unchecked};
use crate::core::process_models::dcr::{ActivityId, DcrGraph, Marking, ALL_RELATION_KINDS};

/// Value of a measure that was not computed
pub const NOT_COMPUTED: f64 = -1.0;

/// Quality measures of a graph; each value is in `[0, 1]` or [`NOT_COMPUTED`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMeasures {
    /// Share of replayed events that were enabled
    pub fitness: f64,
    /// One minus the share of enabled activities never observed from a visited state
    pub precision: f64,
    /// One minus the relation count relative to the maximal possible relation count
    pub simplicity: f64,
}

impl Default for QualityMeasures {
    fn default() -> Self {
        Self {
            fitness: NOT_COMPUTED,
            precision: NOT_COMPUTED,
            simplicity: NOT_COMPUTED,
        }
    }
}

impl QualityMeasures {
    /// Compute all measures of `graph` on `log`
    pub fn compute(graph: &DcrGraph, log: &Log) -> Self {
        let statistics = ReplayStatistics::collect(graph, log);
        let measures = Self {
            fitness: statistics.fitness(),
            precision: statistics.precision(),
            simplicity: simplicity(graph),
        };
        tracing::info!(
            fitness = measures.fitness,
            precision = measures.precision,
            simplicity = measures.simplicity,
            "Computed quality measures"
        );
        measures
    }

    /// Only simplicity is computed (e.g., when no log is available)
    pub fn simplicity_only(graph: &DcrGraph) -> Self {
        Self {
            simplicity: simplicity(graph),
            ..Default::default()
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// States visited while replaying a log
#[derive(Debug, Default)]
struct ReplayStatistics {
    events: usize,
    violations: usize,
    /// Enabled and observed activities per visited state
    states: HashMap<Marking, (BTreeSet<ActivityId>, BTreeSet<ActivityId>)>,
}

impl ReplayStatistics {
    fn collect(graph: &DcrGraph, log: &Log) -> Self {
        log.traces
            .par_iter()
            .fold(ReplayStatistics::default, |mut stats, trace| {
                stats.add_trace(graph, trace);
                stats
            })
            .reduce(ReplayStatistics::default, ReplayStatistics::merge)
    }

    fn add_trace(&mut self, graph: &DcrGraph, trace: &Trace) {
        let mut state = graph.clone();
        for event in &trace.events {
            let enabled = enabled_activities(&state);
            if !enabled.contains(&event.activity) {
                self.violations += 1;
            }
            let entry = self.states.entry(state.marking()).or_default();
            entry.0.extend(enabled);
            entry.1.insert(event.activity.clone());
            // Unknown activities have no effect
            if execute_unchecked(&mut state, &event.activity).is_err() {
                tracing::trace!(activity = %event.activity, "Replayed unknown activity");
            }
            self.events += 1;
        }
    }

    fn merge(mut self, other: ReplayStatistics) -> ReplayStatistics {
        self.events += other.events;
        self.violations += other.violations;
        for (marking, (enabled, observed)) in other.states {
            let entry = self.states.entry(marking).or_default();
            entry.0.extend(enabled);
            entry.1.extend(observed);
        }
        self
    }

    fn fitness(&self) -> f64 {
        if self.events == 0 {
            return 1.0;
        }
        1.0 - self.violations as f64 / self.events as f64
    }

    fn precision(&self) -> f64 {
        let (enabled, escaping) = self
            .states
            .values()
            .fold((0usize, 0usize), |(enabled, escaping), (en, observed)| {
                (enabled + en.len(), escaping + en.difference(observed).count())
            });
        if enabled == 0 {
            return 1.0;
        }
        1.0 - escaping as f64 / enabled as f64
    }
}

/// Share of replayed events that were enabled (1.0 if the log has no events)
pub fn fitness(graph: &DcrGraph, log: &Log) -> f64 {
    ReplayStatistics::collect(graph, log).fitness()
}

/// One minus the share of escaping activities over all visited states
///
/// States are identified by their [`Marking`]; an enabled activity escapes a state if no trace
/// executes it next from that state.
pub fn precision(graph: &DcrGraph, log: &Log) -> f64 {
    ReplayStatistics::collect(graph, log).precision()
}

/// `1 - relations / (leaves^2 * 5)`, counting relations of all levels
pub fn simplicity(graph: &DcrGraph) -> f64 {
    let leaves = graph.leaf_count();
    if leaves == 0 {
        return 1.0;
    }
    let max_relations = (leaves * leaves * ALL_RELATION_KINDS.len()) as f64;
    (1.0 - graph.total_relation_count() as f64 / max_relations).max(0.0)
}
