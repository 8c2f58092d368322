//! Execution semantics of DCR graphs
//!
//! Only the `included`, `pending` and `executed` flags of leaf activities are changed; relations
//! are never touched.
use serde::{Deserialize, Serialize};

use super::dcr_graph_struct::{ActivityId, DcrGraph, RelationKind};
use crate::core::event_data::Trace;
use crate::error::DcrError;

/// Checks whether a leaf activity can be executed in the current marking
///
/// An activity is enabled iff it is included, every condition predecessor is excluded or
/// executed, and no milestone predecessor is included and pending.
/// Relations on enclosing nests are taken into account.
pub fn is_enabled(graph: &DcrGraph, activity: &str) -> bool {
    let Some(path) = graph.ancestry(activity) else {
        return false;
    };
    match graph.leaf(activity) {
        Some(leaf) if leaf.included => {}
        _ => return false,
    }
    path.iter().all(|(level, node)| {
        level
            .sources(RelationKind::Condition, node)
            .all(|c| level.all_leaves_satisfy(c, &|a| !a.included || a.executed))
            && level
                .sources(RelationKind::Milestone, node)
                .all(|m| level.all_leaves_satisfy(m, &|a| !a.included || !a.pending))
    })
}

/// Leaf activities enabled in the current marking
pub fn enabled_activities(graph: &DcrGraph) -> Vec<ActivityId> {
    graph
        .leaves()
        .into_iter()
        .filter(|a| is_enabled(graph, a.id()))
        .map(|a| a.id().clone())
        .collect()
}

/// Execute an enabled leaf activity
///
/// Fails with [`DcrError::UnknownActivity`] if the graph has no such leaf and with
/// [`DcrError::NotEnabled`] if the activity is not enabled.
pub fn execute(graph: &mut DcrGraph, activity: &str) -> Result<(), DcrError> {
    if graph.leaf(activity).is_none() {
        return Err(DcrError::unknown(activity));
    }
    if !is_enabled(graph, activity) {
        return Err(DcrError::NotEnabled {
            activity: activity.to_string(),
        });
    }
    execute_unchecked(graph, activity)
}

#[derive(Debug, Default)]
struct Effects {
    pending: Vec<ActivityId>,
    inclusion: Vec<(ActivityId, bool)>,
}

fn collect_effects(graph: &DcrGraph, activity: &str) -> Option<Effects> {
    let path = graph.ancestry(activity)?;
    let mut effects = Effects::default();
    // Outer levels first, so inner include/exclude relations take precedence
    for (level, node) in path.iter().rev() {
        for target in level.targets(RelationKind::Response, node) {
            effects
                .pending
                .extend(level.leaves_of(target).iter().map(|a| a.id().clone()));
        }
        for (kind, included) in [(RelationKind::Include, true), (RelationKind::Exclude, false)] {
            for target in level.targets(kind, node) {
                effects.inclusion.extend(
                    level
                        .leaves_of(target)
                        .iter()
                        .map(|a| (a.id().clone(), included)),
                );
            }
        }
    }
    Some(effects)
}

/// Apply the effects of executing a leaf activity without checking whether it is enabled
///
/// Used for replaying logs, where disabled events are recorded as violations and forced.
pub fn execute_unchecked(graph: &mut DcrGraph, activity: &str) -> Result<(), DcrError> {
    if graph.leaf(activity).is_none() {
        return Err(DcrError::unknown(activity));
    }
    let effects = collect_effects(graph, activity).ok_or_else(|| DcrError::unknown(activity))?;
    if let Some(leaf) = graph.leaf_mut(activity) {
        leaf.executed = true;
        leaf.pending = false;
    }
    for id in effects.pending {
        if let Some(leaf) = graph.leaf_mut(&id) {
            leaf.pending = true;
        }
    }
    for (id, included) in effects.inclusion {
        if let Some(leaf) = graph.leaf_mut(&id) {
            leaf.included = included;
        }
    }
    Ok(())
}

/// Checks whether no leaf activity is included and pending at the same time
pub fn is_accepting(graph: &DcrGraph) -> bool {
    graph.leaves().iter().all(|a| !(a.included && a.pending))
}

/// Outcome of replaying a single event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStep {
    /// Replayed activity
    pub activity: ActivityId,
    /// Whether the activity was enabled when the event occurred
    pub enabled: bool,
    /// Number of activities enabled before the event occurred
    pub enabled_before: usize,
}

/// Result of replaying a trace on a [`DcrGraph`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResult {
    /// One step per replayed event
    pub steps: Vec<ReplayStep>,
    /// Whether the graph was in an accepting state after the last event
    pub accepting: bool,
}

impl ReplayResult {
    /// Number of events that were not enabled when they occurred
    pub fn violations(&self) -> usize {
        self.steps.iter().filter(|s| !s.enabled).count()
    }

    /// Checks if all events were enabled and the final state is accepting
    pub fn is_fitting(&self) -> bool {
        self.accepting && self.violations() == 0
    }
}

/// Replay a sequence of activities on a copy of the graph
///
/// The replay never aborts: disabled events are recorded as violations and executed anyway,
/// events of unknown activities are recorded as violations without any effect.
pub fn replay<S: AsRef<str>>(graph: &DcrGraph, trace: &[S]) -> ReplayResult {
    let mut graph = graph.clone();
    let steps = trace
        .iter()
        .map(|activity| {
            let activity = activity.as_ref();
            let enabled = is_enabled(&graph, activity);
            let enabled_before = enabled_activities(&graph).len();
            if execute_unchecked(&mut graph, activity).is_err() {
                tracing::trace!(activity = %activity, "Replayed event of unknown activity");
            }
            ReplayStep {
                activity: activity.to_string(),
                enabled,
                enabled_before,
            }
        })
        .collect();
    ReplayResult {
        steps,
        accepting: is_accepting(&graph),
    }
}

/// Replay the events of a [`Trace`] (see [`replay`])
pub fn replay_trace(graph: &DcrGraph, trace: &Trace) -> ReplayResult {
    let activities: Vec<&str> = trace.events.iter().map(|e| e.activity.as_str()).collect();
    replay(graph, &activities)
}

impl DcrGraph {
    /// See [`is_enabled`]
    pub fn is_enabled(&self, activity: &str) -> bool {
        is_enabled(self, activity)
    }

    /// See [`enabled_activities`]
    pub fn enabled_activities(&self) -> Vec<ActivityId> {
        enabled_activities(self)
    }

    /// See [`execute`]
    pub fn execute(&mut self, activity: &str) -> Result<(), DcrError> {
        execute(self, activity)
    }

    /// Copy of this graph after executing `activity`
    pub fn after(&self, activity: &str) -> Result<DcrGraph, DcrError> {
        let mut next = self.clone();
        execute(&mut next, activity)?;
        Ok(next)
    }

    /// See [`is_accepting`]
    pub fn is_accepting(&self) -> bool {
        is_accepting(self)
    }

    /// See [`replay`]
    pub fn replay<S: AsRef<str>>(&self, trace: &[S]) -> ReplayResult {
        replay(self, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process_models::dcr::{Activity, Relation, ALL_RELATION_KINDS};
    use proptest::prelude::*;

    fn graph(activities: Vec<Activity>, relations: Vec<(RelationKind, &str, &str)>) -> DcrGraph {
        DcrGraph::from_parts(
            activities,
            relations
                .into_iter()
                .map(|(k, s, t)| Relation::new(k, s, t)),
        )
        .unwrap()
    }

    #[test]
    fn condition_blocks_until_source_executed() {
        let mut g = graph(
            vec![Activity::new("A", "A"), Activity::new("B", "B")],
            vec![(RelationKind::Condition, "A", "B")],
        );
        assert!(!g.is_enabled("B"));
        assert_eq!(
            g.execute("B"),
            Err(DcrError::NotEnabled {
                activity: "B".into()
            })
        );
        g.execute("A").unwrap();
        assert!(g.is_enabled("B"));
    }

    #[test]
    fn excluded_condition_source_does_not_block() {
        let g = graph(
            vec![
                Activity::new("A", "A").with_included(false),
                Activity::new("B", "B"),
            ],
            vec![(RelationKind::Condition, "A", "B")],
        );
        assert!(g.is_enabled("B"));
        assert!(!g.is_enabled("A"));
    }

    #[test]
    fn milestone_blocks_while_pending() {
        let mut g = graph(
            vec![
                Activity::new("A", "A").with_pending(true),
                Activity::new("B", "B"),
            ],
            vec![(RelationKind::Milestone, "A", "B")],
        );
        assert!(!g.is_enabled("B"));
        assert!(!g.is_accepting());
        g.execute("A").unwrap();
        assert!(g.is_enabled("B"));
        assert!(g.is_accepting());
    }

    #[test]
    fn response_include_exclude_effects() {
        let mut g = graph(
            vec![
                Activity::new("A", "A"),
                Activity::new("B", "B"),
                Activity::new("C", "C").with_included(false),
            ],
            vec![
                (RelationKind::Response, "A", "B"),
                (RelationKind::Include, "A", "C"),
                (RelationKind::Exclude, "A", "A"),
            ],
        );
        g.execute("A").unwrap();
        let a = g.activity("A").unwrap();
        assert!(a.executed && !a.pending && !a.included);
        assert!(g.activity("B").unwrap().pending);
        assert!(g.activity("C").unwrap().included);
        assert!(!g.is_accepting());
        assert_eq!(g.enabled_activities(), vec!["B".to_string(), "C".to_string()]);
        g.execute("B").unwrap();
        assert!(g.is_accepting());
    }

    #[test]
    fn self_response_keeps_activity_pending() {
        let mut g = graph(
            vec![Activity::new("A", "A")],
            vec![(RelationKind::Response, "A", "A")],
        );
        g.execute("A").unwrap();
        let a = g.activity("A").unwrap();
        assert!(a.executed && a.pending);
    }

    #[test]
    fn execute_unknown_activity() {
        let mut g = DcrGraph::new();
        assert_eq!(
            g.execute("X"),
            Err(DcrError::UnknownActivity {
                activity: "X".into()
            })
        );
        assert!(g.is_accepting());
    }

    #[test]
    fn replay_records_and_forces_violations() {
        let g = graph(
            vec![Activity::new("A", "A"), Activity::new("B", "B")],
            vec![
                (RelationKind::Condition, "A", "B"),
                (RelationKind::Response, "B", "A"),
            ],
        );
        let result = g.replay(&["B", "A", "X"]);
        assert_eq!(
            result.steps.iter().map(|s| s.enabled).collect::<Vec<_>>(),
            vec![false, true, false]
        );
        assert_eq!(result.violations(), 2);
        assert_eq!(result.steps[0].enabled_before, 1);
        assert!(result.accepting);
        assert!(!result.is_fitting());
        // initial marking of the input graph is untouched
        assert!(!g.activity("B").unwrap().executed);

        let fitting = g.replay(&["A", "B", "A"]);
        assert!(fitting.is_fitting());
    }

    #[test]
    fn nested_relations_apply_to_leaves() {
        let inner = graph(
            vec![Activity::new("X", "X"), Activity::new("Y", "Y")],
            vec![(RelationKind::Condition, "X", "Y")],
        );
        let mut g = graph(
            vec![Activity::nest("N", "N", inner), Activity::new("Z", "Z")],
            vec![
                (RelationKind::Condition, "Z", "N"),
                (RelationKind::Exclude, "N", "Z"),
            ],
        );
        assert!(!g.is_enabled("N"));
        assert!(!g.is_enabled("X"));
        g.execute("Z").unwrap();
        assert!(g.is_enabled("X"));
        assert!(!g.is_enabled("Y"));
        g.execute("X").unwrap();
        assert!(g.is_enabled("Y"));
        assert!(!g.activity("Z").unwrap().included);
        assert_eq!(
            g.execute("N"),
            Err(DcrError::UnknownActivity {
                activity: "N".into()
            })
        );
    }

    #[test]
    fn condition_from_nest_requires_all_leaves() {
        let inner = graph(
            vec![Activity::new("X", "X"), Activity::new("Y", "Y")],
            vec![],
        );
        let mut g = graph(
            vec![Activity::nest("N", "N", inner), Activity::new("Z", "Z")],
            vec![(RelationKind::Condition, "N", "Z")],
        );
        g.execute("X").unwrap();
        assert!(!g.is_enabled("Z"));
        g.execute("Y").unwrap();
        assert!(g.is_enabled("Z"));
    }

    #[test]
    fn after_returns_new_value() {
        let g = graph(vec![Activity::new("A", "A")], vec![]);
        let next = g.after("A").unwrap();
        assert!(next.activity("A").unwrap().executed);
        assert!(!g.activity("A").unwrap().executed);
    }

    fn arb_run() -> impl Strategy<Value = (DcrGraph, Vec<usize>)> {
        let ids = ["A", "B", "C"];
        (
            proptest::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 3),
            proptest::collection::vec((0..ALL_RELATION_KINDS.len(), 0..3usize, 0..3usize), 0..8),
            proptest::collection::vec(0..3usize, 0..8),
        )
            .prop_map(move |(flags, relations, trace)| {
                let activities = ids.iter().zip(flags).map(|(id, (included, pending, executed))| {
                    Activity::new(*id, *id)
                        .with_included(included)
                        .with_pending(pending)
                        .with_executed(executed)
                });
                let relations = relations
                    .into_iter()
                    .map(|(k, s, t)| Relation::new(ALL_RELATION_KINDS[k], ids[s], ids[t]));
                (DcrGraph::from_parts(activities, relations).unwrap(), trace)
            })
    }

    /// A at the root next to nest N holding B and C
    fn arb_nested_run() -> impl Strategy<Value = (DcrGraph, Vec<usize>)> {
        (
            proptest::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 3),
            proptest::collection::vec((0..ALL_RELATION_KINDS.len(), 0..2usize, 0..2usize), 0..5),
            proptest::collection::vec((0..ALL_RELATION_KINDS.len(), 0..2usize, 0..2usize), 0..5),
            proptest::collection::vec(0..3usize, 0..8),
        )
            .prop_map(|(flags, outer, inner, trace)| {
                let leaves: Vec<Activity> = ["A", "B", "C"]
                    .iter()
                    .zip(flags)
                    .map(|(id, (included, pending, executed))| {
                        Activity::new(*id, *id)
                            .with_included(included)
                            .with_pending(pending)
                            .with_executed(executed)
                    })
                    .collect();
                let level = |ids: [&'static str; 2], relations: Vec<(usize, usize, usize)>| {
                    relations
                        .into_iter()
                        .map(move |(k, s, t)| Relation::new(ALL_RELATION_KINDS[k], ids[s], ids[t]))
                };
                let nest = DcrGraph::from_parts(leaves[1..].iter().cloned(), level(["B", "C"], inner))
                    .unwrap();
                let g = DcrGraph::from_parts(
                    [leaves[0].clone(), Activity::nest("N", "N", nest)],
                    level(["A", "N"], outer),
                )
                .unwrap();
                (g, trace)
            })
    }

    proptest! {
        #[test]
        fn accepting_iff_no_included_pending((mut g, trace) in arb_run()) {
            let relations = g.relations();
            for i in trace {
                let id = ["A", "B", "C"][i];
                if g.is_enabled(id) {
                    g.execute(id).unwrap();
                    prop_assert!(g.activity(id).unwrap().executed);
                } else {
                    prop_assert!(g.execute(id).is_err());
                }
                let marking = g.marking();
                prop_assert_eq!(
                    g.is_accepting(),
                    marking.included.is_disjoint(&marking.pending)
                );
                prop_assert_eq!(&g.relations(), &relations);
            }
        }

        #[test]
        fn nested_run_matches_flattened((mut nested, trace) in arb_nested_run()) {
            let mut flat = nested.flatten();
            for i in trace {
                let id = ["A", "B", "C"][i];
                let mut expected = flat.enabled_activities();
                let mut enabled = nested.enabled_activities();
                expected.sort();
                enabled.sort();
                prop_assert_eq!(&enabled, &expected);
                prop_assert_eq!(nested.execute(id).is_ok(), flat.execute(id).is_ok());
                prop_assert_eq!(nested.marking(), flat.marking());
            }
        }
    }
}
