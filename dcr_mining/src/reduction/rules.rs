//! Preconditions of the redundancy rules
//!
//! All checks are evaluated on a flat graph (see [`DcrGraph::flatten`]).
use std::fmt::Display;

use petgraph::{algo::has_path_connecting, graphmap::DiGraphMap};
use serde::{Deserialize, Serialize};

use crate::core::process_models::dcr::{DcrGraph, Relation, RelationKind};

/// Redundancy rules in priority order
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RedundancyRule {
    /// R6: an excluded activity that nothing includes can never execute
    DeadActivity,
    /// R1: `Include(B, C)` is implied by `Include(A, C)` if `B` can only execute after `A`
    IncludeSubsumption,
    /// R2: `Condition(A, B)` is implied by `Include(A, B)` if only `A` includes an excluded `B`
    ConditionSubsumedByInclude,
    /// R3: `Response(A, B)` is cancelled by `Exclude(A, B)` if nothing includes `B`
    ResponseExcludeCancellation,
    /// R4: including an activity that can never be excluded has no effect
    VacuousInclude,
    /// R5: `Condition(A, B)` is implied by `Milestone(A, B)` if `A` is pending whenever included
    ConditionMilestoneDuplication,
}

/// All rules, highest priority first
pub const RULE_PRIORITY: &[RedundancyRule] = &[
    RedundancyRule::DeadActivity,
    RedundancyRule::IncludeSubsumption,
    RedundancyRule::ConditionSubsumedByInclude,
    RedundancyRule::ResponseExcludeCancellation,
    RedundancyRule::VacuousInclude,
    RedundancyRule::ConditionMilestoneDuplication,
];

impl RedundancyRule {
    /// Short code of the rule (`R1` to `R6`)
    pub fn code(&self) -> &'static str {
        match self {
            RedundancyRule::IncludeSubsumption => "R1",
            RedundancyRule::ConditionSubsumedByInclude => "R2",
            RedundancyRule::ResponseExcludeCancellation => "R3",
            RedundancyRule::VacuousInclude => "R4",
            RedundancyRule::ConditionMilestoneDuplication => "R5",
            RedundancyRule::DeadActivity => "R6",
        }
    }

    /// Kind of the relations this rule removes (`None` for rules removing activities)
    pub fn candidate_kind(&self) -> Option<RelationKind> {
        match self {
            RedundancyRule::DeadActivity => None,
            RedundancyRule::IncludeSubsumption | RedundancyRule::VacuousInclude => {
                Some(RelationKind::Include)
            }
            RedundancyRule::ConditionSubsumedByInclude
            | RedundancyRule::ConditionMilestoneDuplication => Some(RelationKind::Condition),
            RedundancyRule::ResponseExcludeCancellation => Some(RelationKind::Response),
        }
    }
}

impl Display for RedundancyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Rule preconditions over one flat snapshot of a graph
#[derive(Debug)]
pub(crate) struct RuleContext<'a> {
    flat: &'a DcrGraph,
    /// Condition relations whose source is permanently included and not yet executed
    forced_order: DiGraphMap<&'a str, ()>,
}

impl<'a> RuleContext<'a> {
    pub(crate) fn new(flat: &'a DcrGraph) -> Self {
        let mut forced_order = DiGraphMap::new();
        for source in flat.activities().map(|a| a.id().as_str()) {
            let executed = flat.activity(source).is_some_and(|a| a.executed);
            if executed || !permanently_included(flat, source) {
                continue;
            }
            for target in flat.targets(RelationKind::Condition, source) {
                forced_order.add_edge(source, target.as_str(), ());
            }
        }
        Self { flat, forced_order }
    }

    fn node(&self, id: &str) -> Option<&'a str> {
        self.flat.activity(id).map(|a| a.id().as_str())
    }

    /// Checks whether `target` can only execute after `source` has executed
    fn forced_after(&self, source: &str, target: &str) -> bool {
        match (self.node(source), self.node(target)) {
            (Some(source), Some(target)) => {
                source != target
                    && self.forced_order.contains_node(source)
                    && self.forced_order.contains_node(target)
                    && has_path_connecting(&self.forced_order, source, target, None)
            }
            _ => false,
        }
    }

    fn has_includer_other_than(&self, id: &str, other: &str) -> bool {
        self.flat
            .sources(RelationKind::Include, id)
            .any(|s| s != other)
    }

    fn starts_included(&self, id: &str) -> bool {
        self.flat.activity(id).is_some_and(|a| a.included)
    }

    pub(crate) fn is_dead(&self, id: &str) -> bool {
        !self.starts_included(id) && !self.has_includer_other_than(id, id)
    }

    /// Checks whether `relation` is redundant according to `rule`
    pub(crate) fn is_redundant(&self, rule: RedundancyRule, relation: &Relation) -> bool {
        if rule.candidate_kind() != Some(relation.kind)
            || !self
                .flat
                .contains_relation(relation.kind, &relation.source, &relation.target)
        {
            return false;
        }
        let (a, b) = (relation.source.as_str(), relation.target.as_str());
        match rule {
            RedundancyRule::DeadActivity => false,
            RedundancyRule::IncludeSubsumption => self.include_subsumed(a, b),
            RedundancyRule::ConditionSubsumedByInclude => self.condition_subsumed_by_include(a, b),
            RedundancyRule::ResponseExcludeCancellation => {
                self.flat.contains_relation(RelationKind::Exclude, a, b)
                    && self.flat.sources(RelationKind::Include, b).next().is_none()
            }
            RedundancyRule::VacuousInclude => permanently_included(self.flat, b),
            RedundancyRule::ConditionMilestoneDuplication => {
                self.condition_duplicates_milestone(a, b)
            }
        }
    }

    /// `Include(b, c)` where some other includer of `c` always executes before `b`
    fn include_subsumed(&self, b: &str, c: &str) -> bool {
        never_excluded(self.flat, c)
            && self
                .flat
                .sources(RelationKind::Include, c)
                .any(|a| a != b && self.forced_after(a, b))
    }

    fn condition_subsumed_by_include(&self, a: &str, b: &str) -> bool {
        a != b
            && !self.starts_included(b)
            && self.flat.contains_relation(RelationKind::Include, a, b)
            && !self.has_includer_other_than(b, a)
            && never_excluded(self.flat, a)
    }

    fn condition_duplicates_milestone(&self, a: &str, b: &str) -> bool {
        self.flat.contains_relation(RelationKind::Milestone, a, b)
            && !self.starts_included(a)
            && self
                .flat
                .sources(RelationKind::Include, a)
                .all(|x| self.flat.contains_relation(RelationKind::Response, x, a))
    }
}

fn never_excluded(flat: &DcrGraph, id: &str) -> bool {
    flat.sources(RelationKind::Exclude, id).next().is_none()
}

fn permanently_included(flat: &DcrGraph, id: &str) -> bool {
    flat.activity(id).is_some_and(|a| a.included) && never_excluded(flat, id)
}
