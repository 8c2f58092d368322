//! Behavior-preserving removal of redundant relations and activities
//!
//! The remover repeatedly scans the graph for the highest-priority applicable rule (see
//! [`RULE_PRIORITY`]), applies it to one candidate and starts over, until no rule applies.
//! Every application strictly shrinks the graph.
use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::core::process_models::dcr::{ActivityId, DcrGraph, Relation};
use crate::error::DcrError;

mod rules;
pub use rules::{RedundancyRule, RULE_PRIORITY};
use rules::RuleContext;

/// Options for [`remove_redundancy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyOptions {
    /// Maximal number of rule applications before giving up with
    /// [`DcrError::IterationLimitExceeded`]
    pub max_iterations: usize,
}

impl Default for RedundancyOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
        }
    }
}

impl RedundancyOptions {
    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One application of a [`RedundancyRule`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleApplication {
    /// Applied rule
    pub rule: RedundancyRule,
    /// Removed activity (only for [`RedundancyRule::DeadActivity`])
    pub removed_activity: Option<ActivityId>,
    /// Removed relation (`None` for [`RedundancyRule::DeadActivity`])
    pub removed_relation: Option<Relation>,
    /// Number of relations removed by this application
    pub removed_relations: usize,
}

/// Summary of a [`remove_redundancy`] run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyReport {
    /// Number of removed activities
    pub removed_activities: usize,
    /// Number of removed relations (including those of removed activities)
    pub removed_relations: usize,
    /// Number of scans over the graph (one more than the number of applications)
    pub iterations: usize,
    /// Applied rules in order
    pub applications: Vec<RuleApplication>,
}

impl RedundancyReport {
    /// Number of applications of the given rule
    pub fn count_of(&self, rule: RedundancyRule) -> usize {
        self.applications.iter().filter(|a| a.rule == rule).count()
    }
}

/// Removal step selected in one scan
#[derive(Debug, Clone, PartialEq, Eq)]
enum Removal {
    Activity(ActivityId),
    Relation(Relation),
}

///
/// Remove redundant relations and activities from a graph
///
/// Returns the reduced graph as a new value; `graph` itself is not changed.
/// Rules are checked against the flattened graph, so relations inherited from enclosing nests
/// are taken into account. Only relations between two leaves of the same level (and leaf
/// activities) are removal candidates.
///
pub fn remove_redundancy(
    graph: &DcrGraph,
    options: &RedundancyOptions,
) -> Result<(DcrGraph, RedundancyReport), DcrError> {
    let mut current = graph.clone();
    let mut report = RedundancyReport::default();
    loop {
        report.iterations += 1;
        let Some((next, application)) = find_application(&current) else {
            break;
        };
        if report.applications.len() >= options.max_iterations {
            return Err(DcrError::IterationLimitExceeded {
                limit: options.max_iterations,
            });
        }
        tracing::debug!(
            rule = %application.rule,
            activity = ?application.removed_activity,
            relation = ?application.removed_relation,
            "Removed redundancy"
        );
        if application.removed_activity.is_some() {
            report.removed_activities += 1;
        }
        report.removed_relations += application.removed_relations;
        report.applications.push(application);
        current = next;
    }
    tracing::info!(
        removed_activities = report.removed_activities,
        removed_relations = report.removed_relations,
        iterations = report.iterations,
        "Redundancy removal finished"
    );
    Ok((current, report))
}

/// Relations of all levels whose endpoints are both leaves
fn leaf_relations(graph: &DcrGraph) -> Vec<Relation> {
    let mut relations: Vec<Relation> = graph
        .relations()
        .into_iter()
        .filter(|r| {
            [&r.source, &r.target]
                .iter()
                .all(|id| graph.activity(id).is_some_and(|a| !a.is_nest()))
        })
        .collect();
    for nested in graph.activities().filter_map(|a| a.nested()) {
        relations.extend(leaf_relations(nested));
    }
    relations
}

fn find_application(graph: &DcrGraph) -> Option<(DcrGraph, RuleApplication)> {
    let flat: Cow<'_, DcrGraph> = if graph.has_nests() {
        Cow::Owned(graph.flatten())
    } else {
        Cow::Borrowed(graph)
    };
    let context = RuleContext::new(&flat);
    let relations = leaf_relations(graph);
    for rule in RULE_PRIORITY {
        let candidates: Vec<Removal> = match rule.candidate_kind() {
            None => graph
                .leaves()
                .into_iter()
                .filter(|a| context.is_dead(a.id()))
                .map(|a| Removal::Activity(a.id().clone()))
                .collect(),
            Some(_) => relations
                .iter()
                .filter(|r| context.is_redundant(*rule, r))
                .map(|r| Removal::Relation(r.clone()))
                .collect(),
        };
        for removal in candidates {
            if let Some(result) = apply(graph, &flat, *rule, &removal) {
                return Some(result);
            }
        }
    }
    None
}

/// Apply a removal to a copy of `graph`
///
/// For nested graphs, the removal is only accepted if the flattened result is the flat graph
/// with the same removal applied (or unchanged), i.e., if no relation of another level takes
/// over the removed one.
fn apply(
    graph: &DcrGraph,
    flat: &DcrGraph,
    rule: RedundancyRule,
    removal: &Removal,
) -> Option<(DcrGraph, RuleApplication)> {
    let mut next = graph.clone();
    let mut expected = flat.clone();
    let application = match removal {
        Removal::Activity(id) => {
            let (_, removed_relations) = next.graph_of_mut(id)?.remove_activity(id)?;
            expected.remove_activity(id);
            RuleApplication {
                rule,
                removed_activity: Some(id.clone()),
                removed_relation: None,
                removed_relations,
            }
        }
        Removal::Relation(relation) => {
            let level = next.graph_of_mut(&relation.source)?;
            if !level.remove_relation(relation.kind, &relation.source, &relation.target) {
                return None;
            }
            expected.remove_relation(relation.kind, &relation.source, &relation.target);
            RuleApplication {
                rule,
                removed_activity: None,
                removed_relation: Some(relation.clone()),
                removed_relations: 1,
            }
        }
    };
    if graph.has_nests() {
        let new_flat = next.flatten();
        if new_flat != expected && new_flat != *flat {
            return None;
        }
    }
    Some((next, application))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::conformance::comparer::{compare_behavior, ComparerOptions};
    use crate::core::process_models::dcr::{Activity, RelationKind, ALL_RELATION_KINDS};

    fn graph(activities: Vec<Activity>, relations: Vec<(RelationKind, &str, &str)>) -> DcrGraph {
        DcrGraph::from_parts(
            activities,
            relations.into_iter().map(|(k, s, t)| Relation::new(k, s, t)),
        )
        .unwrap()
    }

    fn reduce(g: &DcrGraph) -> (DcrGraph, RedundancyReport) {
        remove_redundancy(g, &RedundancyOptions::default()).unwrap()
    }

    #[test]
    fn include_subsumption() {
        let g = graph(
            vec![
                Activity::new("A", "A"),
                Activity::new("B", "B"),
                Activity::new("C", "C").with_included(false),
            ],
            vec![
                (RelationKind::Condition, "A", "B"),
                (RelationKind::Include, "B", "C"),
                (RelationKind::Include, "A", "C"),
            ],
        );
        let (reduced, report) = reduce(&g);
        assert!(!reduced.contains_relation(RelationKind::Include, "B", "C"));
        assert!(reduced.contains_relation(RelationKind::Include, "A", "C"));
        assert!(reduced.contains_relation(RelationKind::Condition, "A", "B"));
        assert_eq!(report.count_of(RedundancyRule::IncludeSubsumption), 1);
        assert_eq!(report.removed_relations, 1);
        assert_eq!(report.iterations, 2);
        // input is untouched
        assert_eq!(g.relation_count(), 3);
    }

    #[test]
    fn vacuous_include() {
        let g = graph(
            vec![Activity::new("A", "A"), Activity::new("B", "B")],
            vec![(RelationKind::Include, "A", "B")],
        );
        let (reduced, report) = reduce(&g);
        assert_eq!(reduced.relation_count(), 0);
        assert_eq!(reduced.activity_count(), 2);
        assert_eq!(report.count_of(RedundancyRule::VacuousInclude), 1);
    }

    #[test]
    fn dead_activity_pruning() {
        let g = graph(
            vec![
                Activity::new("A", "A").with_included(false),
                Activity::new("B", "B"),
                Activity::new("C", "C"),
                Activity::new("D", "D"),
            ],
            vec![
                (RelationKind::Condition, "A", "B"),
                (RelationKind::Milestone, "A", "C"),
                (RelationKind::Include, "A", "D"),
                (RelationKind::Response, "A", "B"),
                (RelationKind::Response, "B", "C"),
            ],
        );
        let (reduced, report) = reduce(&g);
        assert!(!reduced.contains_activity("A"));
        assert!(reduced
            .relations()
            .iter()
            .all(|r| r.source != "A" && r.target != "A"));
        assert!(reduced.contains_relation(RelationKind::Response, "B", "C"));
        assert_eq!(report.removed_activities, 1);
        assert_eq!(report.removed_relations, 4);
        assert_eq!(report.applications[0].rule, RedundancyRule::DeadActivity);
    }

    #[test]
    fn condition_subsumed_by_include() {
        let g = graph(
            vec![
                Activity::new("A", "A"),
                Activity::new("B", "B").with_included(false),
            ],
            vec![
                (RelationKind::Condition, "A", "B"),
                (RelationKind::Include, "A", "B"),
                (RelationKind::Exclude, "B", "B"),
            ],
        );
        let (reduced, report) = reduce(&g);
        assert!(!reduced.contains_relation(RelationKind::Condition, "A", "B"));
        assert!(reduced.contains_relation(RelationKind::Include, "A", "B"));
        assert_eq!(report.count_of(RedundancyRule::ConditionSubsumedByInclude), 1);
    }

    #[test]
    fn response_cancelled_by_exclude() {
        let g = graph(
            vec![Activity::new("A", "A"), Activity::new("B", "B")],
            vec![
                (RelationKind::Response, "A", "B"),
                (RelationKind::Exclude, "A", "B"),
            ],
        );
        let (reduced, _) = reduce(&g);
        assert!(!reduced.contains_relation(RelationKind::Response, "A", "B"));
        assert!(reduced.contains_relation(RelationKind::Exclude, "A", "B"));
    }

    #[test]
    fn condition_milestone_duplication_keeps_milestone() {
        let g = graph(
            vec![
                Activity::new("A", "A").with_included(false),
                Activity::new("B", "B"),
                Activity::new("X", "X"),
            ],
            vec![
                (RelationKind::Condition, "A", "B"),
                (RelationKind::Milestone, "A", "B"),
                (RelationKind::Include, "X", "A"),
                (RelationKind::Response, "X", "A"),
            ],
        );
        let (reduced, report) = reduce(&g);
        assert!(!reduced.contains_relation(RelationKind::Condition, "A", "B"));
        assert!(reduced.contains_relation(RelationKind::Milestone, "A", "B"));
        assert_eq!(
            report.count_of(RedundancyRule::ConditionMilestoneDuplication),
            1
        );
    }

    #[test]
    fn empty_graph_is_already_reduced() {
        let (reduced, report) = reduce(&DcrGraph::new());
        assert!(reduced.is_empty());
        assert_eq!(report.applications.len(), 0);
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn iteration_limit() {
        let g = graph(
            vec![Activity::new("A", "A"), Activity::new("B", "B")],
            vec![
                (RelationKind::Include, "A", "B"),
                (RelationKind::Include, "B", "A"),
            ],
        );
        assert_eq!(
            remove_redundancy(&g, &RedundancyOptions { max_iterations: 1 }),
            Err(DcrError::IterationLimitExceeded { limit: 1 })
        );
        assert!(remove_redundancy(&g, &RedundancyOptions { max_iterations: 2 }).is_ok());
    }

    #[test]
    fn nested_relations_are_considered() {
        // Include(C, B) would be vacuous without the exclude of N inherited by B
        let inner = graph(
            vec![Activity::new("B", "B"), Activity::new("C", "C")],
            vec![(RelationKind::Include, "C", "B")],
        );
        let g = graph(
            vec![Activity::nest("N", "N", inner), Activity::new("A", "A")],
            vec![(RelationKind::Exclude, "A", "N")],
        );
        let (reduced, report) = reduce(&g);
        assert_eq!(report.applications.len(), 0);
        assert_eq!(reduced, g);
    }

    #[test]
    fn inner_include_overriding_outer_exclude_is_kept() {
        let inner = graph(
            vec![Activity::new("B", "B"), Activity::new("C", "C")],
            vec![(RelationKind::Include, "B", "C")],
        );
        let g = graph(
            vec![Activity::nest("N", "N", inner)],
            vec![(RelationKind::Exclude, "N", "N")],
        );
        let (reduced, _) = reduce(&g);
        assert!(reduced
            .graph_of("B")
            .unwrap()
            .contains_relation(RelationKind::Include, "B", "C"));
    }

    #[test]
    fn rule_application_order_is_reproducible() {
        let g = graph(
            vec![
                Activity::new("A", "A").with_included(false),
                Activity::new("B", "B"),
                Activity::new("C", "C"),
            ],
            vec![
                (RelationKind::Include, "B", "C"),
                (RelationKind::Include, "C", "B"),
                (RelationKind::Response, "A", "C"),
            ],
        );
        let (_, first) = reduce(&g);
        let (_, second) = reduce(&g);
        assert_eq!(first, second);
        assert_eq!(first.applications[0].rule, RedundancyRule::DeadActivity);
    }

    type Flags = (bool, bool, bool);

    fn arb_flags() -> impl Strategy<Value = Vec<Flags>> {
        proptest::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 4)
    }

    fn arb_relations(ids: usize, max: usize) -> impl Strategy<Value = Vec<(usize, usize, usize)>> {
        proptest::collection::vec((0..ALL_RELATION_KINDS.len(), 0..ids, 0..ids), 0..max)
    }

    fn leaf(id: &str, (included, pending, executed): Flags) -> Activity {
        Activity::new(id, id)
            .with_included(included)
            .with_pending(pending)
            .with_executed(executed)
    }

    fn level(ids: &[&str], activities: Vec<Activity>, relations: Vec<(usize, usize, usize)>) -> DcrGraph {
        let relations = relations
            .into_iter()
            .map(|(k, s, t)| Relation::new(ALL_RELATION_KINDS[k], ids[s], ids[t]));
        DcrGraph::from_parts(activities, relations).unwrap()
    }

    fn arb_flat_graph() -> impl Strategy<Value = DcrGraph> {
        let ids = ["A", "B", "C", "D"];
        (arb_flags(), arb_relations(4, 10)).prop_map(move |(flags, relations)| {
            let activities = ids.iter().zip(flags).map(|(id, f)| leaf(id, f)).collect();
            level(&ids, activities, relations)
        })
    }

    /// A and B at the root next to nest N holding C and D
    fn arb_nested_graph() -> impl Strategy<Value = DcrGraph> {
        (arb_flags(), arb_relations(3, 8), arb_relations(2, 5)).prop_map(
            |(flags, outer, inner)| {
                let inner = level(
                    &["C", "D"],
                    vec![leaf("C", flags[2]), leaf("D", flags[3])],
                    inner,
                );
                level(
                    &["A", "B", "N"],
                    vec![
                        leaf("A", flags[0]),
                        leaf("B", flags[1]),
                        Activity::nest("N", "N", inner),
                    ],
                    outer,
                )
            },
        )
    }

    fn arb_graph() -> impl Strategy<Value = DcrGraph> {
        prop_oneof![arb_flat_graph(), arb_nested_graph()]
    }

    proptest! {
        #[test]
        fn reduction_preserves_behavior(g in arb_graph()) {
            let (reduced, _) = reduce(&g);
            let options = ComparerOptions { max_depth: 6, max_states: 5_000 };
            let comparison = compare_behavior(&g, &reduced, &options);
            prop_assert!(comparison.discrepancy.is_none(), "{:?}", comparison.discrepancy);
        }

        #[test]
        fn reduction_is_idempotent(g in arb_graph()) {
            let (reduced, _) = reduce(&g);
            let (again, report) = reduce(&reduced);
            prop_assert_eq!(report.applications.len(), 0);
            prop_assert_eq!(again, reduced);
        }

        #[test]
        fn reduction_only_shrinks(g in arb_graph()) {
            let (reduced, report) = reduce(&g);
            prop_assert!(reduced.total_relation_count() <= g.total_relation_count());
            prop_assert!(reduced.all_activity_ids().len() <= g.all_activity_ids().len());
            prop_assert_eq!(
                g.total_relation_count() - reduced.total_relation_count(),
                report.removed_relations
            );
            prop_assert_eq!(
                g.all_activity_ids().len() - reduced.all_activity_ids().len(),
                report.removed_activities
            );
        }
    }
}
