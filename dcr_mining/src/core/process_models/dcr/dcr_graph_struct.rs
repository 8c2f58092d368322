use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::DcrError;

/// Identifier of an [`Activity`]
pub type ActivityId = String;

/// Kind of a DCR relation
///
/// [`RelationKind::Include`] and [`RelationKind::Exclude`] are the two polarities of the
/// signed include/exclude relation: a pair of activities carries at most one of them.
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum RelationKind {
    /// Target cannot execute until the source has executed (or is excluded)
    Condition,
    /// Executing the source marks the target as pending
    Response,
    /// Target cannot execute while the source is included and pending
    Milestone,
    /// Executing the source includes the target
    Include,
    /// Executing the source excludes the target
    Exclude,
}

/// All relation kinds (in the order used for iteration)
pub const ALL_RELATION_KINDS: &[RelationKind] = &[
    RelationKind::Condition,
    RelationKind::Response,
    RelationKind::Milestone,
    RelationKind::Include,
    RelationKind::Exclude,
];

impl RelationKind {
    /// Get the (lowercase) name of the relation kind
    pub fn get_name(&self) -> &'static str {
        match self {
            RelationKind::Condition => "condition",
            RelationKind::Response => "response",
            RelationKind::Milestone => "milestone",
            RelationKind::Include => "include",
            RelationKind::Exclude => "exclude",
        }
    }

    /// For include/exclude: the kind with the other polarity
    pub fn opposite_polarity(&self) -> Option<RelationKind> {
        match self {
            RelationKind::Include => Some(RelationKind::Exclude),
            RelationKind::Exclude => Some(RelationKind::Include),
            RelationKind::Condition | RelationKind::Response | RelationKind::Milestone => None,
        }
    }
}

impl Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

/// A single relation (edge) between two activities
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    /// Kind of the relation
    pub kind: RelationKind,
    /// Source activity
    pub source: ActivityId,
    /// Target activity
    pub target: ActivityId,
}

impl Relation {
    /// Create a new relation
    pub fn new<S: Into<String>, T: Into<String>>(kind: RelationKind, source: S, target: T) -> Self {
        Self {
            kind,
            source: source.into(),
            target: target.into(),
        }
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.source, self.target)
    }
}

/// Activity (event) of a [`DcrGraph`]
///
/// An activity is either a leaf or a nest, which exclusively owns a nested [`DcrGraph`].
/// Only leaves are executed; the state flags of a nest itself carry no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    id: ActivityId,
    /// Display name
    pub name: String,
    /// Whether the activity currently participates in the process
    pub included: bool,
    /// Whether the activity has an outstanding obligation to execute
    pub pending: bool,
    /// Whether the activity was executed at least once
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nested: Option<Box<DcrGraph>>,
}

impl Activity {
    /// Create a new leaf activity (included, not pending, not executed)
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            included: true,
            pending: false,
            executed: false,
            nested: None,
        }
    }

    /// Create a nest activity owning the given graph
    pub fn nest<I: Into<String>, N: Into<String>>(id: I, name: N, graph: DcrGraph) -> Self {
        Self {
            nested: Some(Box::new(graph)),
            ..Self::new(id, name)
        }
    }

    /// Set the initial included flag
    pub fn with_included(mut self, included: bool) -> Self {
        self.included = included;
        self
    }

    /// Set the initial pending flag
    pub fn with_pending(mut self, pending: bool) -> Self {
        self.pending = pending;
        self
    }

    /// Set the initial executed flag
    pub fn with_executed(mut self, executed: bool) -> Self {
        self.executed = executed;
        self
    }

    /// Identifier of the activity
    pub fn id(&self) -> &ActivityId {
        &self.id
    }

    /// Whether this activity owns a nested graph
    pub fn is_nest(&self) -> bool {
        self.nested.is_some()
    }

    /// Nested graph (if this activity is a nest)
    pub fn nested(&self) -> Option<&DcrGraph> {
        self.nested.as_deref()
    }

    pub(crate) fn nested_mut(&mut self) -> Option<&mut DcrGraph> {
        self.nested.as_deref_mut()
    }
}

/// One relation kind, indexed in both directions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RelationSet {
    forward: BTreeMap<ActivityId, BTreeSet<ActivityId>>,
    backward: BTreeMap<ActivityId, BTreeSet<ActivityId>>,
    len: usize,
}

impl RelationSet {
    fn insert(&mut self, source: &str, target: &str) -> bool {
        let inserted = self
            .forward
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string());
        if inserted {
            self.backward
                .entry(target.to_string())
                .or_default()
                .insert(source.to_string());
            self.len += 1;
        }
        inserted
    }

    fn remove(&mut self, source: &str, target: &str) -> bool {
        let removed = match self.forward.get_mut(source) {
            Some(targets) => targets.remove(target),
            None => false,
        };
        if removed {
            if self.forward.get(source).is_some_and(|t| t.is_empty()) {
                self.forward.remove(source);
            }
            if let Some(sources) = self.backward.get_mut(target) {
                sources.remove(source);
                if sources.is_empty() {
                    self.backward.remove(target);
                }
            }
            self.len -= 1;
        }
        removed
    }

    fn contains(&self, source: &str, target: &str) -> bool {
        self.forward
            .get(source)
            .is_some_and(|targets| targets.contains(target))
    }

    fn targets<'a>(&'a self, source: &str) -> impl Iterator<Item = &'a ActivityId> + 'a {
        self.forward.get(source).into_iter().flatten()
    }

    fn sources<'a>(&'a self, target: &str) -> impl Iterator<Item = &'a ActivityId> + 'a {
        self.backward.get(target).into_iter().flatten()
    }

    fn iter(&self) -> impl Iterator<Item = (&ActivityId, &ActivityId)> + '_ {
        self.forward
            .iter()
            .flat_map(|(s, targets)| targets.iter().map(move |t| (s, t)))
    }

    /// Remove all relations touching `id`, returning how many were removed
    fn remove_activity(&mut self, id: &str) -> usize {
        let outgoing: Vec<ActivityId> = self.targets(id).cloned().collect();
        let incoming: Vec<ActivityId> = self.sources(id).cloned().collect();
        let mut removed = 0;
        for target in outgoing {
            if self.remove(id, &target) {
                removed += 1;
            }
        }
        for source in incoming {
            if self.remove(&source, id) {
                removed += 1;
            }
        }
        removed
    }
}

/// A Dynamic Condition Response (DCR) graph
///
/// Consists of [`Activity`]s and five relation sets (see [`RelationKind`]).
/// Relations always connect two activities of the same graph level; a relation with a nest as
/// endpoint applies to every leaf below that nest.
///
/// Activity identifiers are unique within the whole tree of nested graphs, so leaves can be
/// addressed from the root graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "DcrGraphData", try_from = "DcrGraphData")]
pub struct DcrGraph {
    activities: BTreeMap<ActivityId, Activity>,
    conditions: RelationSet,
    responses: RelationSet,
    milestones: RelationSet,
    includes: RelationSet,
    excludes: RelationSet,
}

impl DcrGraph {
    /// Create a new, empty [`DcrGraph`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a graph from activities and relations, validating all invariants
    pub fn from_parts<A, R>(activities: A, relations: R) -> Result<Self, DcrError>
    where
        A: IntoIterator<Item = Activity>,
        R: IntoIterator<Item = Relation>,
    {
        let mut graph = Self::new();
        for activity in activities {
            graph.add_activity(activity)?;
        }
        for relation in relations {
            graph.add_relation(relation.kind, &relation.source, &relation.target)?;
        }
        Ok(graph)
    }

    fn relation_set(&self, kind: RelationKind) -> &RelationSet {
        match kind {
            RelationKind::Condition => &self.conditions,
            RelationKind::Response => &self.responses,
            RelationKind::Milestone => &self.milestones,
            RelationKind::Include => &self.includes,
            RelationKind::Exclude => &self.excludes,
        }
    }

    fn relation_set_mut(&mut self, kind: RelationKind) -> &mut RelationSet {
        match kind {
            RelationKind::Condition => &mut self.conditions,
            RelationKind::Response => &mut self.responses,
            RelationKind::Milestone => &mut self.milestones,
            RelationKind::Include => &mut self.includes,
            RelationKind::Exclude => &mut self.excludes,
        }
    }

    /// Add an activity (and the nested graph it owns, if any) to this graph level
    ///
    /// Fails with [`DcrError::DuplicateActivity`] if any of the new identifiers is already in use.
    pub fn add_activity(&mut self, activity: Activity) -> Result<(), DcrError> {
        let mut new_ids = vec![activity.id()];
        if let Some(nested) = activity.nested() {
            new_ids.extend(nested.all_activity_ids());
        }
        if let Some(duplicate) = new_ids.into_iter().find(|id| self.find_activity(id).is_some()) {
            return Err(DcrError::DuplicateActivity {
                activity: duplicate.clone(),
            });
        }
        self.activities.insert(activity.id.clone(), activity);
        Ok(())
    }

    /// Remove an activity of this graph level together with all relations touching it
    ///
    /// Returns the removed activity and the number of removed relations.
    pub fn remove_activity(&mut self, id: &str) -> Option<(Activity, usize)> {
        let activity = self.activities.remove(id)?;
        let removed_relations = ALL_RELATION_KINDS
            .iter()
            .map(|kind| self.relation_set_mut(*kind).remove_activity(id))
            .sum();
        Some((activity, removed_relations))
    }

    /// Get an activity of this graph level
    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.get(id)
    }

    /// Get an activity of this graph level mutably
    pub fn activity_mut(&mut self, id: &str) -> Option<&mut Activity> {
        self.activities.get_mut(id)
    }

    /// Activities of this graph level (ordered by identifier)
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    /// Checks if this graph level directly contains the activity
    pub fn contains_activity(&self, id: &str) -> bool {
        self.activities.contains_key(id)
    }

    /// Number of activities of this graph level (nests count as one)
    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }

    /// Checks if the graph has neither activities nor relations
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Find an activity on any level of the graph
    pub fn find_activity(&self, id: &str) -> Option<&Activity> {
        self.graph_of(id).and_then(|g| g.activity(id))
    }

    pub(crate) fn find_activity_mut(&mut self, id: &str) -> Option<&mut Activity> {
        self.graph_of_mut(id).and_then(|g| g.activity_mut(id))
    }

    /// The graph level (this graph or a nested one) which directly contains the activity
    pub fn graph_of(&self, id: &str) -> Option<&DcrGraph> {
        if self.activities.contains_key(id) {
            return Some(self);
        }
        self.activities
            .values()
            .filter_map(|a| a.nested())
            .find_map(|nested| nested.graph_of(id))
    }

    /// Mutable access to the graph level which directly contains the activity
    pub fn graph_of_mut(&mut self, id: &str) -> Option<&mut DcrGraph> {
        if self.activities.contains_key(id) {
            return Some(self);
        }
        self.activities
            .values_mut()
            .filter_map(|a| a.nested_mut())
            .find_map(|nested| nested.graph_of_mut(id))
    }

    /// Chain of (graph level, activity) pairs from the activity itself up to the root level
    pub(crate) fn ancestry<'a>(&'a self, id: &str) -> Option<Vec<(&'a DcrGraph, &'a ActivityId)>> {
        if let Some((key, _)) = self.activities.get_key_value(id) {
            return Some(vec![(self, key)]);
        }
        self.activities.iter().find_map(|(key, activity)| {
            let mut path = activity.nested()?.ancestry(id)?;
            path.push((self, key));
            Some(path)
        })
    }

    /// Identifiers of all activities on all levels
    pub fn all_activity_ids(&self) -> Vec<&ActivityId> {
        let mut ids = Vec::with_capacity(self.activities.len());
        for (id, activity) in &self.activities {
            ids.push(id);
            if let Some(nested) = activity.nested() {
                ids.extend(nested.all_activity_ids());
            }
        }
        ids
    }

    /// All leaf activities on all levels
    pub fn leaves(&self) -> Vec<&Activity> {
        let mut leaves = Vec::with_capacity(self.activities.len());
        for activity in self.activities.values() {
            match activity.nested() {
                Some(nested) => leaves.extend(nested.leaves()),
                None => leaves.push(activity),
            }
        }
        leaves
    }

    /// Number of leaf activities on all levels
    pub fn leaf_count(&self) -> usize {
        self.activities
            .values()
            .map(|a| a.nested().map_or(1, |n| n.leaf_count()))
            .sum()
    }

    /// Find a leaf activity on any level
    pub fn leaf(&self, id: &str) -> Option<&Activity> {
        self.find_activity(id).filter(|a| !a.is_nest())
    }

    /// Find a leaf activity on any level mutably
    pub fn leaf_mut(&mut self, id: &str) -> Option<&mut Activity> {
        self.find_activity_mut(id).filter(|a| !a.is_nest())
    }

    /// Leaves represented by an activity of this level: the activity itself or all leaves below it
    pub fn leaves_of(&self, id: &str) -> Vec<&Activity> {
        match self.activities.get(id) {
            Some(activity) => match activity.nested() {
                Some(nested) => nested.leaves(),
                None => vec![activity],
            },
            None => Vec::new(),
        }
    }

    /// Checks `pred` on every leaf represented by an activity of this level (true if there are none)
    pub(crate) fn all_leaves_satisfy(&self, id: &str, pred: &dyn Fn(&Activity) -> bool) -> bool {
        match self.activities.get(id) {
            Some(activity) => match activity.nested() {
                Some(nested) => nested
                    .activities
                    .keys()
                    .all(|k| nested.all_leaves_satisfy(k, pred)),
                None => pred(activity),
            },
            None => true,
        }
    }

    /// Checks if any activity of this graph is a nest
    pub fn has_nests(&self) -> bool {
        self.activities.values().any(|a| a.is_nest())
    }

    /// Add a relation between two activities of this graph level
    ///
    /// Adding an include replaces an exclude between the same activities (and vice versa).
    /// Returns whether the graph changed.
    pub fn add_relation(
        &mut self,
        kind: RelationKind,
        source: &str,
        target: &str,
    ) -> Result<bool, DcrError> {
        for id in [source, target] {
            if !self.activities.contains_key(id) {
                return Err(DcrError::unknown(id));
            }
        }
        Ok(self.insert_relation_unchecked(kind, source, target))
    }

    fn insert_relation_unchecked(&mut self, kind: RelationKind, source: &str, target: &str) -> bool {
        let flipped = match kind.opposite_polarity() {
            Some(opposite) => self.relation_set_mut(opposite).remove(source, target),
            None => false,
        };
        self.relation_set_mut(kind).insert(source, target) || flipped
    }

    /// Remove a relation of this graph level, returning whether it existed
    pub fn remove_relation(&mut self, kind: RelationKind, source: &str, target: &str) -> bool {
        self.relation_set_mut(kind).remove(source, target)
    }

    /// Checks if the relation exists on this graph level
    pub fn contains_relation(&self, kind: RelationKind, source: &str, target: &str) -> bool {
        self.relation_set(kind).contains(source, target)
    }

    /// Targets of all relations of the given kind starting at `source`
    pub fn targets<'a>(
        &'a self,
        kind: RelationKind,
        source: &str,
    ) -> impl Iterator<Item = &'a ActivityId> + 'a {
        self.relation_set(kind).targets(source)
    }

    /// Sources of all relations of the given kind ending at `target`
    pub fn sources<'a>(
        &'a self,
        kind: RelationKind,
        target: &str,
    ) -> impl Iterator<Item = &'a ActivityId> + 'a {
        self.relation_set(kind).sources(target)
    }

    /// All relations of this graph level, ordered by kind, source and target
    pub fn relations(&self) -> Vec<Relation> {
        ALL_RELATION_KINDS
            .iter()
            .flat_map(|kind| {
                self.relation_set(*kind)
                    .iter()
                    .map(move |(s, t)| Relation::new(*kind, s.as_str(), t.as_str()))
            })
            .collect()
    }

    /// Number of relations on this graph level
    pub fn relation_count(&self) -> usize {
        ALL_RELATION_KINDS
            .iter()
            .map(|kind| self.relation_set(*kind).len)
            .sum()
    }

    /// Number of relations on all levels
    pub fn total_relation_count(&self) -> usize {
        self.relation_count()
            + self
                .activities
                .values()
                .filter_map(|a| a.nested())
                .map(|n| n.total_relation_count())
                .sum::<usize>()
    }

    /// Equivalent flat graph: all leaves, with relations on nests distributed to their leaves
    ///
    /// If relations of different levels assign both polarities to the same pair of leaves, the
    /// innermost one is kept.
    pub fn flatten(&self) -> DcrGraph {
        let mut flat = DcrGraph::new();
        for leaf in self.leaves() {
            flat.activities.insert(leaf.id.clone(), leaf.clone());
        }
        self.collect_flat_relations(&mut flat);
        flat
    }

    fn collect_flat_relations(&self, flat: &mut DcrGraph) {
        for relation in self.relations() {
            for source in self.leaves_of(&relation.source) {
                for target in self.leaves_of(&relation.target) {
                    flat.insert_relation_unchecked(relation.kind, source.id(), target.id());
                }
            }
        }
        for nested in self.activities.values().filter_map(|a| a.nested()) {
            nested.collect_flat_relations(flat);
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Flat (de)serialization form of a [`DcrGraph`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DcrGraphData {
    activities: Vec<Activity>,
    relations: Vec<Relation>,
}

impl From<DcrGraph> for DcrGraphData {
    fn from(graph: DcrGraph) -> Self {
        let relations = graph.relations();
        Self {
            activities: graph.activities.into_values().collect(),
            relations,
        }
    }
}

impl TryFrom<DcrGraphData> for DcrGraph {
    type Error = DcrError;

    fn try_from(data: DcrGraphData) -> Result<Self, Self::Error> {
        DcrGraph::from_parts(data.activities, data.relations)
    }
}

/// Snapshot of the state of all leaves of a [`DcrGraph`]
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Marking {
    /// Executed leaves
    pub executed: BTreeSet<ActivityId>,
    /// Included leaves
    pub included: BTreeSet<ActivityId>,
    /// Pending leaves
    pub pending: BTreeSet<ActivityId>,
}

impl DcrGraph {
    /// Current [`Marking`] of the graph
    pub fn marking(&self) -> Marking {
        let mut marking = Marking::default();
        for leaf in self.leaves() {
            if leaf.executed {
                marking.executed.insert(leaf.id.clone());
            }
            if leaf.included {
                marking.included.insert(leaf.id.clone());
            }
            if leaf.pending {
                marking.pending.insert(leaf.id.clone());
            }
        }
        marking
    }
}
