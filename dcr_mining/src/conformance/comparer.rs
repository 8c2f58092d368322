//! Bounded behavioral comparison of two [`DcrGraph`]s
use std::collections::{BTreeSet, HashSet, VecDeque};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::core::process_models::dcr::{ActivityId, DcrGraph, Marking};
use crate::error::DcrError;
use crate::reduction::{remove_redundancy, RedundancyOptions, RedundancyReport};

/// Bounds of the state space exploration of [`compare_behavior`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparerOptions {
    /// Maximal length of explored traces
    pub max_depth: usize,
    /// Maximal number of explored state pairs
    pub max_states: usize,
}

impl Default for ComparerOptions {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_states: 100_000,
        }
    }
}

impl ComparerOptions {
    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// How two graphs differ after the same trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancyKind {
    /// Different sets of enabled activities
    EnabledActivities {
        /// Enabled in the first graph (sorted)
        left: Vec<ActivityId>,
        /// Enabled in the second graph (sorted)
        right: Vec<ActivityId>,
    },
    /// Only one of the graphs is accepting
    Acceptance {
        /// Whether the first graph is accepting
        left: bool,
        /// Whether the second graph is accepting
        right: bool,
    },
}

/// A trace after which two graphs behave differently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Executed activities (shortest such trace)
    pub trace: Vec<ActivityId>,
    /// What differs
    pub kind: DiscrepancyKind,
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            DiscrepancyKind::EnabledActivities { left, right } => write!(
                f,
                "enabled activities differ: [{}] vs. [{}]",
                left.iter().join(", "),
                right.iter().join(", ")
            ),
            DiscrepancyKind::Acceptance { left, right } => {
                write!(f, "acceptance differs: {} vs. {}", left, right)
            }
        }
    }
}

/// Result of [`compare_behavior`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// First discrepancy found (if any)
    pub discrepancy: Option<Discrepancy>,
    /// Number of explored state pairs
    pub explored_states: usize,
    /// Whether the reachable state space was explored completely within the bounds
    pub exhaustive: bool,
}

impl ComparisonReport {
    /// Checks if no discrepancy was found
    pub fn is_equivalent(&self) -> bool {
        self.discrepancy.is_none()
    }
}

///
/// Compare the behavior of two graphs by breadth-first exploration of their joint state space
///
/// Starting from the initial markings, both graphs execute the same enabled activity in each
/// step. In each visited state pair, the sets of enabled activities and the acceptance must
/// agree. Both graphs are only read; exploration works on copies.
///
pub fn compare_behavior(
    left: &DcrGraph,
    right: &DcrGraph,
    options: &ComparerOptions,
) -> ComparisonReport {
    let mut visited: HashSet<(Marking, Marking)> = HashSet::new();
    let mut queue: VecDeque<(DcrGraph, DcrGraph, Vec<ActivityId>)> = VecDeque::new();
    visited.insert((left.marking(), right.marking()));
    queue.push_back((left.clone(), right.clone(), Vec::new()));
    let mut exhaustive = true;

    while let Some((l, r, trace)) = queue.pop_front() {
        // Leaves are listed in tree order, which differs between nested and flat graphs
        let enabled_left: BTreeSet<ActivityId> = l.enabled_activities().into_iter().collect();
        let enabled_right: BTreeSet<ActivityId> = r.enabled_activities().into_iter().collect();
        let kind = if enabled_left != enabled_right {
            Some(DiscrepancyKind::EnabledActivities {
                left: enabled_left.iter().cloned().collect(),
                right: enabled_right.into_iter().collect(),
            })
        } else if l.is_accepting() != r.is_accepting() {
            Some(DiscrepancyKind::Acceptance {
                left: l.is_accepting(),
                right: r.is_accepting(),
            })
        } else {
            None
        };
        if let Some(kind) = kind {
            tracing::debug!(trace = ?trace, "Found behavioral discrepancy");
            return ComparisonReport {
                discrepancy: Some(Discrepancy { trace, kind }),
                explored_states: visited.len(),
                exhaustive: false,
            };
        }
        if trace.len() >= options.max_depth {
            if !enabled_left.is_empty() {
                exhaustive = false;
            }
            continue;
        }
        for activity in enabled_left {
            let (Ok(next_left), Ok(next_right)) = (l.after(&activity), r.after(&activity)) else {
                continue;
            };
            if !visited.insert((next_left.marking(), next_right.marking())) {
                continue;
            }
            if visited.len() > options.max_states {
                exhaustive = false;
                break;
            }
            let mut next_trace = trace.clone();
            next_trace.push(activity);
            queue.push_back((next_left, next_right, next_trace));
        }
    }
    ComparisonReport {
        discrepancy: None,
        explored_states: visited.len(),
        exhaustive,
    }
}

///
/// Remove redundancy from `graph` and check that the result behaves like the input
///
/// A discrepancy is reported as [`DcrError::SoundnessViolation`].
///
pub fn verify_reduction(
    graph: &DcrGraph,
    redundancy: &RedundancyOptions,
    comparer: &ComparerOptions,
) -> Result<(DcrGraph, RedundancyReport), DcrError> {
    let (reduced, report) = remove_redundancy(graph, redundancy)?;
    let comparison = compare_behavior(graph, &reduced, comparer);
    match comparison.discrepancy {
        Some(discrepancy) => Err(DcrError::SoundnessViolation {
            details: discrepancy.to_string(),
            trace: discrepancy.trace,
        }),
        None => {
            tracing::info!(
                explored_states = comparison.explored_states,
                exhaustive = comparison.exhaustive,
                "Verified reduction"
            );
            Ok((reduced, report))
        }
    }
}
