//! Indexing modes and the results of matching them against a goal.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::keys::{keys_compatible, Key, Reductions};
use crate::engine::GoalView;
use crate::expr::{Expr, FVarId};

/// How a rule should be indexed, before keys are computed.
///
/// The rule set turns a spec into an [`IndexingMode`] with its own
/// [`Reductions`], so every rule of a set is keyed with the same strength.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndexSpec {
    /// Try the rule on every goal.
    #[default]
    Unindexed,
    /// Try the rule on goals whose target matches the pattern.
    Target(Expr),
    /// Try the rule on goals with a hypothesis matching the pattern.
    Hyps(Expr),
    /// Try the rule if any of the specs match.
    Or(Vec<IndexSpec>),
}

impl IndexSpec {
    /// Computes the keys of every pattern in this spec.
    pub fn build(&self, reductions: &Reductions) -> IndexingMode {
        match self {
            IndexSpec::Unindexed => IndexingMode::Unindexed,
            IndexSpec::Target(pattern) => IndexingMode::target(pattern, reductions),
            IndexSpec::Hyps(pattern) => IndexingMode::hyps(pattern, reductions),
            IndexSpec::Or(specs) => IndexingMode::Or(specs.iter().map(|s| s.build(reductions)).collect()),
        }
    }
}

/// How a rule is keyed for retrieval. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexingMode {
    /// Matches every goal, at [`IndexMatchLocation::None`].
    Unindexed,
    /// Matches goals whose target keys are compatible with these.
    Target(Vec<Key>),
    /// Matches each hypothesis whose type keys are compatible with these.
    Hyps(Vec<Key>),
    /// Union of the sub-modes.
    Or(Vec<IndexingMode>),
}

impl IndexingMode {
    /// Builds a target mode from the type a goal's target must match.
    pub fn target(ty: &Expr, reductions: &Reductions) -> Self {
        IndexingMode::Target(reductions.keys(ty))
    }

    /// Builds a hypothesis mode from the type a hypothesis must match.
    pub fn hyps(ty: &Expr, reductions: &Reductions) -> Self {
        IndexingMode::Hyps(reductions.keys(ty))
    }

    /// Returns every location of `goal` this mode matches. An empty set
    /// means the rule does not apply.
    pub fn query(&self, goal: &GoalView, reductions: &Reductions) -> BTreeSet<IndexMatchLocation> {
        let mut out = BTreeSet::new();
        self.query_into(goal, reductions, &mut out);
        out
    }

    fn query_into(&self, goal: &GoalView, reductions: &Reductions, out: &mut BTreeSet<IndexMatchLocation>) {
        match self {
            IndexingMode::Unindexed => {
                out.insert(IndexMatchLocation::None);
            }
            IndexingMode::Target(keys) => {
                if keys_compatible(keys, &reductions.keys(&goal.target)) {
                    out.insert(IndexMatchLocation::Target);
                }
            }
            IndexingMode::Hyps(keys) => {
                for hyp in &goal.hyps {
                    if keys_compatible(keys, &reductions.keys(&hyp.ty)) {
                        out.insert(IndexMatchLocation::Hyp(hyp.fvar));
                    }
                }
            }
            IndexingMode::Or(modes) => {
                for mode in modes {
                    mode.query_into(goal, reductions, out);
                }
            }
        }
    }
}

/// Where in a goal an indexed rule matched.
///
/// The order (`Target < None < Hyp`, hypotheses by identity) only makes sets
/// of locations canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexMatchLocation {
    /// The goal's target.
    Target,
    /// No particular location; the rule is unindexed.
    None,
    /// A hypothesis, identified by its stable id rather than its name.
    Hyp(FVarId),
}

/// A rule retrieved for a goal, with the locations it matched at.
///
/// Equality and order look at the rule only.
#[derive(Debug, Clone)]
pub struct IndexMatchResult<R> {
    /// The matching rule.
    pub rule: R,
    /// Where the rule matched.
    pub locations: BTreeSet<IndexMatchLocation>,
}

impl<R> IndexMatchResult<R> {
    /// Creates a result.
    pub fn new(rule: R, locations: BTreeSet<IndexMatchLocation>) -> Self {
        Self { rule, locations }
    }

    /// Returns the matched hypotheses, in identity order.
    pub fn hyps(&self) -> impl Iterator<Item = FVarId> + '_ {
        self.locations.iter().filter_map(|loc| match loc {
            IndexMatchLocation::Hyp(id) => Some(*id),
            _ => None,
        })
    }
}

impl<R: PartialEq> PartialEq for IndexMatchResult<R> {
    fn eq(&self, other: &Self) -> bool {
        self.rule == other.rule
    }
}

impl<R: Eq> Eq for IndexMatchResult<R> {}

impl<R: Ord> PartialOrd for IndexMatchResult<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: Ord> Ord for IndexMatchResult<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rule.cmp(&other.rule)
    }
}
