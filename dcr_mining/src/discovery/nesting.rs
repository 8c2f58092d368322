//! Grouping of activities with identical external relations into nests
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::process_models::dcr::{Activity, ActivityId, DcrGraph, Relation, RelationKind};
use crate::error::DcrError;

/// Nests created by [`create_nests`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestingReport {
    /// Members of each created nest
    pub nests: BTreeMap<ActivityId, Vec<ActivityId>>,
    /// Number of relations (on all levels) before nesting
    pub relations_before: usize,
    /// Number of relations (on all levels) after nesting
    pub relations_after: usize,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
enum Direction {
    Outgoing,
    Incoming,
}

type Signature<'a> = BTreeSet<(RelationKind, Direction, &'a str)>;

/// Relations of each root activity, seen from that activity
fn relation_index(relations: &[Relation]) -> HashMap<&str, Vec<(RelationKind, Direction, &str)>> {
    let mut index: HashMap<&str, Vec<(RelationKind, Direction, &str)>> = HashMap::new();
    for r in relations {
        index
            .entry(r.source.as_str())
            .or_default()
            .push((r.kind, Direction::Outgoing, r.target.as_str()));
        if r.source != r.target {
            index
                .entry(r.target.as_str())
                .or_default()
                .push((r.kind, Direction::Incoming, r.source.as_str()));
        }
    }
    index
}

fn external_signature<'a>(
    index: &HashMap<&'a str, Vec<(RelationKind, Direction, &'a str)>>,
    member: &str,
    cluster: &BTreeSet<&str>,
) -> Signature<'a> {
    index
        .get(member)
        .into_iter()
        .flatten()
        .filter(|(_, _, other)| !cluster.contains(other))
        .copied()
        .collect()
}

fn uniform_signature<'a>(
    index: &HashMap<&'a str, Vec<(RelationKind, Direction, &'a str)>>,
    cluster: &BTreeSet<&str>,
) -> Option<Signature<'a>> {
    let mut members = cluster.iter();
    let first = external_signature(index, members.next()?, cluster);
    members
        .all(|m| external_signature(index, m, cluster) == first)
        .then_some(first)
}

fn next_nest_id(graph: &DcrGraph, used: &HashSet<String>, counter: &mut usize) -> String {
    loop {
        *counter += 1;
        let id = format!("nest{}", counter);
        if graph.find_activity(&id).is_none() && !used.contains(&id) {
            return id;
        }
    }
}

///
/// Collapse groups of root-level leaves with identical external relations into nests
///
/// Leaves are considered in identifier order. Each leaf not yet assigned seeds a cluster,
/// which grows by every later leaf that keeps all external relations of the members identical
/// (same kind, direction and counterpart). A cluster becomes a nest if it has at least
/// `max(2, minimum_nest_size)` members and at least one external relation; the members and
/// their internal relations move into the nest and the shared external relations are attached
/// to the nest once.
///
/// The nested graph behaves exactly like the input (see [`DcrGraph::flatten`]).
///
pub fn create_nests(
    graph: &DcrGraph,
    minimum_nest_size: usize,
) -> Result<(DcrGraph, NestingReport), DcrError> {
    let minimum_nest_size = minimum_nest_size.max(2);
    let relations = graph.relations();
    let index = relation_index(&relations);
    let leaves: Vec<&str> = graph
        .activities()
        .filter(|a| !a.is_nest())
        .map(|a| a.id().as_str())
        .collect();

    let mut assigned: HashSet<&str> = HashSet::new();
    let mut clusters: Vec<BTreeSet<&str>> = Vec::new();
    for (i, seed) in leaves.iter().enumerate() {
        if assigned.contains(seed) {
            continue;
        }
        let mut cluster = BTreeSet::from([*seed]);
        for candidate in &leaves[i + 1..] {
            if assigned.contains(candidate) {
                continue;
            }
            let mut extended = cluster.clone();
            extended.insert(*candidate);
            if uniform_signature(&index, &extended).is_some() {
                cluster = extended;
            }
        }
        let shares_relations = uniform_signature(&index, &cluster).is_some_and(|s| !s.is_empty());
        if cluster.len() >= minimum_nest_size && shares_relations {
            assigned.extend(cluster.iter().copied());
            clusters.push(cluster);
        }
    }

    let mut report = NestingReport {
        relations_before: graph.total_relation_count(),
        ..Default::default()
    };
    let mut used = HashSet::new();
    let mut counter = 0;
    let mut owner: HashMap<&str, String> = HashMap::new();
    let mut nests = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
        let id = next_nest_id(graph, &used, &mut counter);
        used.insert(id.clone());
        let mut inner = DcrGraph::new();
        for member in cluster {
            if let Some(activity) = graph.activity(member) {
                inner.add_activity(activity.clone())?;
            }
            owner.insert(*member, id.clone());
        }
        for r in &relations {
            if cluster.contains(r.source.as_str()) && cluster.contains(r.target.as_str()) {
                inner.add_relation(r.kind, &r.source, &r.target)?;
            }
        }
        tracing::debug!(nest = %id, members = ?cluster, "Created nest");
        report
            .nests
            .insert(id.clone(), cluster.iter().map(|m| m.to_string()).collect());
        nests.push(Activity::nest(id.as_str(), id.as_str(), inner));
    }

    let mut nested = DcrGraph::new();
    for activity in graph.activities() {
        if !owner.contains_key(activity.id().as_str()) {
            nested.add_activity(activity.clone())?;
        }
    }
    for nest in nests {
        nested.add_activity(nest)?;
    }
    for r in &relations {
        let source = owner.get(r.source.as_str());
        let target = owner.get(r.target.as_str());
        if source.is_some() && source == target {
            continue;
        }
        nested.add_relation(
            r.kind,
            source.map_or(r.source.as_str(), |s| s.as_str()),
            target.map_or(r.target.as_str(), |t| t.as_str()),
        )?;
    }
    report.relations_after = nested.total_relation_count();
    tracing::info!(
        nests = report.nests.len(),
        relations_before = report.relations_before,
        relations_after = report.relations_after,
        "Finished nesting"
    );
    Ok((nested, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::comparer::{compare_behavior, ComparerOptions};
    use crate::core::process_models::dcr::ALL_RELATION_KINDS;
    use proptest::prelude::*;

    fn fan_out(extra: &[&str]) -> DcrGraph {
        let mut activities = vec![
            Activity::new("A", "A"),
            Activity::new("B", "B"),
            Activity::new("C", "C"),
        ];
        activities.extend(extra.iter().map(|id| Activity::new(*id, *id)));
        DcrGraph::from_parts(
            activities,
            vec![
                Relation::new(RelationKind::Condition, "A", "B"),
                Relation::new(RelationKind::Condition, "A", "C"),
                Relation::new(RelationKind::Response, "A", "B"),
                Relation::new(RelationKind::Response, "A", "C"),
                Relation::new(RelationKind::Exclude, "B", "B"),
                Relation::new(RelationKind::Exclude, "C", "C"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn shared_relations_move_to_the_nest() {
        let graph = fan_out(&[]);
        let (nested, report) = create_nests(&graph, 2).unwrap();
        assert_eq!(
            report.nests.get("nest1"),
            Some(&vec!["B".to_string(), "C".to_string()])
        );
        assert!(nested.contains_relation(RelationKind::Condition, "A", "nest1"));
        assert!(nested.contains_relation(RelationKind::Response, "A", "nest1"));
        let inner = nested.activity("nest1").and_then(|a| a.nested()).unwrap();
        assert!(inner.contains_relation(RelationKind::Exclude, "B", "B"));
        assert_eq!(report.relations_before, 6);
        assert_eq!(report.relations_after, 4);
        assert_eq!(nested.flatten().relations(), graph.relations());
        assert!(compare_behavior(&graph, &nested, &ComparerOptions::default()).is_equivalent());
    }

    #[test]
    fn minimum_size_is_respected() {
        let (nested, report) = create_nests(&fan_out(&[]), 3).unwrap();
        assert!(report.nests.is_empty());
        assert!(!nested.has_nests());
    }

    #[test]
    fn nest_ids_skip_existing_activities() {
        let (nested, report) = create_nests(&fan_out(&["nest1"]), 2).unwrap();
        assert!(report.nests.contains_key("nest2"));
        assert!(nested.activity("nest1").is_some_and(|a| !a.is_nest()));
    }

    #[test]
    fn unrelated_activities_are_not_nested() {
        let graph = DcrGraph::from_parts(
            vec![Activity::new("A", "A"), Activity::new("B", "B")],
            vec![
                Relation::new(RelationKind::Exclude, "A", "A"),
                Relation::new(RelationKind::Exclude, "B", "B"),
            ],
        )
        .unwrap();
        let (nested, report) = create_nests(&graph, 2).unwrap();
        assert!(report.nests.is_empty());
        assert_eq!(nested, graph);
    }

    #[test]
    fn relations_between_nests() {
        // A and B both include C and D
        let mut relations = Vec::new();
        for s in ["A", "B"] {
            for t in ["C", "D"] {
                relations.push(Relation::new(RelationKind::Include, s, t));
            }
        }
        let graph = DcrGraph::from_parts(
            ["A", "B", "C", "D"]
                .into_iter()
                .map(|id| Activity::new(id, id).with_included(id < "C")),
            relations,
        )
        .unwrap();
        let (nested, report) = create_nests(&graph, 2).unwrap();
        assert_eq!(report.nests.len(), 2);
        assert!(nested.contains_relation(RelationKind::Include, "nest1", "nest2"));
        assert_eq!(nested.relation_count(), 1);
        assert!(compare_behavior(&graph, &nested, &ComparerOptions::default()).is_equivalent());
    }

    #[test]
    fn nest_id_sorting_apart_from_members() {
        let graph = DcrGraph::from_parts(
            ["A", "B", "C", "E"].into_iter().map(|id| Activity::new(id, id)),
            vec![
                Relation::new(RelationKind::Response, "A", "B"),
                Relation::new(RelationKind::Response, "A", "C"),
            ],
        )
        .unwrap();
        let (nested, report) = create_nests(&graph, 2).unwrap();
        assert_eq!(
            report.nests.get("nest1"),
            Some(&vec!["B".to_string(), "C".to_string()])
        );
        assert_eq!(nested.flatten().relations(), graph.relations());
        let comparison = compare_behavior(&graph, &nested, &ComparerOptions::default());
        assert!(comparison.is_equivalent(), "{:?}", comparison.discrepancy);
    }

    fn arb_graph() -> impl Strategy<Value = DcrGraph> {
        let ids = ["A", "B", "C", "D", "E"];
        (
            proptest::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 5),
            proptest::collection::vec((0..ALL_RELATION_KINDS.len(), 0..5usize, 0..5usize), 0..12),
        )
            .prop_map(move |(flags, relations)| {
                let activities = ids.iter().zip(flags).map(|(id, (included, pending, executed))| {
                    Activity::new(*id, *id)
                        .with_included(included)
                        .with_pending(pending)
                        .with_executed(executed)
                });
                let relations = relations
                    .into_iter()
                    .map(|(k, s, t)| Relation::new(ALL_RELATION_KINDS[k], ids[s], ids[t]));
                DcrGraph::from_parts(activities, relations).unwrap()
            })
    }

    proptest! {
        #[test]
        fn nesting_preserves_behavior(g in arb_graph(), minimum in 0..4usize) {
            let (nested, report) = create_nests(&g, minimum).unwrap();
            prop_assert_eq!(nested.leaf_count(), g.leaf_count());
            prop_assert_eq!(nested.flatten().relations(), g.relations());
            prop_assert!(report.relations_after <= report.relations_before);
            let options = ComparerOptions { max_depth: 6, max_states: 5_000 };
            let comparison = compare_behavior(&g, &nested, &options);
            prop_assert!(comparison.is_equivalent(), "{:?}", comparison.discrepancy);
        }
    }
}
