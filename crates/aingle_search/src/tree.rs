//! The AND-OR proof tree.
//!
//! Goals are OR nodes over the rule applications (rapps) tried on them. A
//! rapp is an AND node over metavariable clusters. A cluster groups the goals
//! of a rapp that share metavariables. Every rapp attached to a member of a
//! cluster must carry the other members again as subgoals, instantiated with
//! the rapp's assignments (see [`Tree::cluster_mates`]). A cluster is
//! therefore proven as soon as one member is, and fails as soon as one
//! member does. All nodes live in arenas owned by the [`Tree`]; links in
//! either direction are plain ids.
//!
//! Statuses are propagated bottom-up whenever something changes: goal to
//! cluster, cluster to rapp, rapp to goal.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use indexmap::IndexMap;
use log::{debug, trace};

use crate::expr::MVarId;
use crate::index::IndexMatchResult;
use crate::rule::{Percent, ScriptBuilder};

/// Identifier of a goal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoalId(pub usize);

/// Identifier of a rule application node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RappId(pub usize);

/// Identifier of a metavariable cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub usize);

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl fmt::Display for RappId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Why a goal is unprovable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unprovability {
    /// The goal hit the depth limit and was never expanded.
    Forced,
    /// Every rule was tried and every application failed.
    Derived,
}

/// Status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoalStatus {
    /// Still to be proven.
    Active,
    /// Some rule application is proven.
    Proven,
    /// No proof exists within the limits.
    Unprovable(Unprovability),
    /// No longer needed: an ancestor was decided another way.
    Irrelevant,
}

impl GoalStatus {
    /// Returns `true` for goals that may still be expanded.
    pub fn is_active(self) -> bool {
        self == GoalStatus::Active
    }

    /// Returns `true` for proven goals.
    pub fn is_proven(self) -> bool {
        self == GoalStatus::Proven
    }

    /// Returns `true` for unprovable goals, forced or derived.
    pub fn is_unprovable(self) -> bool {
        matches!(self, GoalStatus::Unprovable(_))
    }
}

/// Status of a rule application or a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Undecided.
    Pending,
    /// Every child is proven.
    Proven,
    /// Some child is unprovable.
    Unprovable,
}

/// A proof obligation.
#[derive(Debug, Clone)]
pub struct Goal {
    /// Id of this goal.
    pub id: GoalId,
    /// The engine goal.
    pub mvar: MVarId,
    /// The rapp that produced this goal; `None` for the root.
    pub parent: Option<RappId>,
    /// The cluster this goal belongs to.
    pub cluster: ClusterId,
    /// Number of rapps between the root and this goal.
    pub depth: usize,
    /// Current status.
    pub status: GoalStatus,
    /// Iteration in which the goal was last expanded.
    pub last_expanded: Option<u64>,
    /// The cluster-mate of the parent goal this goal proves again.
    pub origin: Option<GoalId>,
    /// Rapps attached to this goal, oldest first.
    pub children: Vec<RappId>,
    /// Product of the success probabilities of the rapps above this goal.
    pub success_probability: Percent,
    /// Unassigned metavariables reachable from the goal when it was created.
    pub mvars: BTreeSet<MVarId>,
    untried: Option<VecDeque<IndexMatchResult<usize>>>,
}

impl Goal {
    /// Returns `true` if the goal may still be expanded.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Returns `true` once the index has been queried for this goal.
    pub fn is_indexed(&self) -> bool {
        self.untried.is_some()
    }

    /// Returns `true` if some candidate rule has not been tried yet. Goals
    /// that were never indexed count as having candidates.
    pub fn has_untried_rules(&self) -> bool {
        self.untried.as_ref().is_none_or(|q| !q.is_empty())
    }
}

/// One application of one rule to one goal.
#[derive(Debug, Clone)]
pub struct Rapp<S> {
    /// Id of this rapp.
    pub id: RappId,
    /// The goal the rule was applied to.
    pub parent: GoalId,
    /// Name of the rule.
    pub rule: String,
    /// Success probability of this application.
    pub success_probability: Percent,
    /// Engine state right after the rule fired.
    pub post_state: S,
    /// Script step, kept only when scripts are requested.
    pub script: Option<ScriptBuilder>,
    /// Goals produced, in the order the rule reported them.
    pub goals: Vec<GoalId>,
    /// Clusters partitioning `goals`.
    pub clusters: Vec<ClusterId>,
    /// Current status.
    pub status: NodeStatus,
}

/// Goals of a rapp that share metavariables.
#[derive(Debug, Clone)]
pub struct MVarCluster {
    /// Id of this cluster.
    pub id: ClusterId,
    /// The rapp this cluster belongs to; `None` for the root cluster.
    pub parent: Option<RappId>,
    /// Member goals.
    pub goals: Vec<GoalId>,
    /// Current status.
    pub status: NodeStatus,
}

/// A subgoal reported by a rule, as handed to [`Tree::add_rapp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGoal {
    /// The engine goal.
    pub mvar: MVarId,
    /// Unassigned metavariables reachable from it.
    pub mvars: BTreeSet<MVarId>,
    /// The cluster-mate this subgoal proves again, if it is a copy.
    pub origin: Option<GoalId>,
}

/// The search tree.
#[derive(Debug)]
pub struct Tree<S> {
    goals: Vec<Goal>,
    rapps: Vec<Rapp<S>>,
    clusters: Vec<MVarCluster>,
    root_state: S,
}

impl<S> Tree<S> {
    /// Creates a tree with a single active root goal in the root cluster.
    pub fn new(root: MVarId, mvars: BTreeSet<MVarId>, root_state: S) -> Self {
        let goal = Goal {
            id: GoalId(0),
            mvar: root,
            parent: None,
            cluster: ClusterId(0),
            depth: 0,
            status: GoalStatus::Active,
            last_expanded: None,
            origin: None,
            children: Vec::new(),
            success_probability: Percent::ONE,
            mvars,
            untried: None,
        };
        let cluster = MVarCluster {
            id: ClusterId(0),
            parent: None,
            goals: vec![GoalId(0)],
            status: NodeStatus::Pending,
        };
        Self {
            goals: vec![goal],
            rapps: Vec::new(),
            clusters: vec![cluster],
            root_state,
        }
    }

    /// The root goal.
    pub fn root(&self) -> GoalId {
        GoalId(0)
    }

    /// The cluster holding the root goal.
    pub fn root_cluster(&self) -> ClusterId {
        ClusterId(0)
    }

    /// The engine state the search started from.
    pub fn root_state(&self) -> &S {
        &self.root_state
    }

    /// Returns a goal. Ids are only handed out by this tree.
    pub fn goal(&self, id: GoalId) -> &Goal {
        &self.goals[id.0]
    }

    /// Returns a rapp.
    pub fn rapp(&self, id: RappId) -> &Rapp<S> {
        &self.rapps[id.0]
    }

    /// Returns a cluster.
    pub fn cluster(&self, id: ClusterId) -> &MVarCluster {
        &self.clusters[id.0]
    }

    /// The other goals of the cluster holding `goal`. Every rapp attached to
    /// `goal` has to prove them again under its own assignments.
    pub fn cluster_mates(&self, goal: GoalId) -> Vec<GoalId> {
        let cluster = self.goals[goal.0].cluster;
        self.clusters[cluster.0]
            .goals
            .iter()
            .copied()
            .filter(|g| *g != goal)
            .collect()
    }

    /// Iterates over all goals.
    pub fn goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter()
    }

    /// Iterates over all rapps.
    pub fn rapps(&self) -> impl Iterator<Item = &Rapp<S>> {
        self.rapps.iter()
    }

    /// Number of goals.
    pub fn num_goals(&self) -> usize {
        self.goals.len()
    }

    /// Number of rapps.
    pub fn num_rapps(&self) -> usize {
        self.rapps.len()
    }

    /// The engine state in which `goal` is expanded: the post state of its
    /// parent rapp, or the root state.
    pub fn goal_state(&self, goal: GoalId) -> &S {
        match self.goals[goal.0].parent {
            Some(r) => &self.rapps[r.0].post_state,
            None => &self.root_state,
        }
    }

    /// Returns `true` once the root cluster is proven.
    pub fn is_proven(&self) -> bool {
        self.clusters[0].status == NodeStatus::Proven
    }

    /// Returns `true` once the root goal is unprovable.
    pub fn is_unprovable(&self) -> bool {
        self.goals[0].status.is_unprovable()
    }

    /// Stores the candidate rules of `goal`, in the order they will be tried.
    pub fn set_candidates(&mut self, goal: GoalId, candidates: Vec<IndexMatchResult<usize>>) {
        self.goals[goal.0].untried = Some(candidates.into());
    }

    /// Takes the next untried candidate of `goal`.
    pub fn next_candidate(&mut self, goal: GoalId) -> Option<IndexMatchResult<usize>> {
        self.goals[goal.0].untried.as_mut().and_then(VecDeque::pop_front)
    }

    /// Discards the remaining candidates of `goal`.
    pub fn drop_candidates(&mut self, goal: GoalId) {
        if let Some(q) = self.goals[goal.0].untried.as_mut() {
            q.clear();
        }
    }

    /// Records that `goal` was expanded in `iteration`.
    pub fn set_last_expanded(&mut self, goal: GoalId, iteration: u64) {
        self.goals[goal.0].last_expanded = Some(iteration);
    }

    /// Attaches a rule application to `parent` and creates its subgoals.
    ///
    /// Subgoals are grouped into clusters by shared metavariables. A rapp
    /// without subgoals is proven immediately and its parent with it.
    pub fn add_rapp(
        &mut self,
        parent: GoalId,
        rule: impl Into<String>,
        success_probability: Percent,
        post_state: S,
        script: Option<ScriptBuilder>,
        children: Vec<NewGoal>,
    ) -> RappId {
        let id = RappId(self.rapps.len());
        let (depth, parent_probability) = {
            let g = &self.goals[parent.0];
            (g.depth, g.success_probability)
        };

        let groups = partition(&children);
        let first_cluster = self.clusters.len();
        let cluster_count = groups.iter().max().map_or(0, |m| m + 1);
        for k in 0..cluster_count {
            self.clusters.push(MVarCluster {
                id: ClusterId(first_cluster + k),
                parent: Some(id),
                goals: Vec::new(),
                status: NodeStatus::Pending,
            });
        }

        let mut goals = Vec::with_capacity(children.len());
        for (child, group) in children.into_iter().zip(groups) {
            let gid = GoalId(self.goals.len());
            let cluster = ClusterId(first_cluster + group);
            self.goals.push(Goal {
                id: gid,
                mvar: child.mvar,
                parent: Some(id),
                cluster,
                depth: depth + 1,
                status: GoalStatus::Active,
                last_expanded: None,
                origin: child.origin,
                children: Vec::new(),
                success_probability: parent_probability * success_probability,
                mvars: child.mvars,
                untried: None,
            });
            self.clusters[cluster.0].goals.push(gid);
            goals.push(gid);
        }

        let rule = rule.into();
        trace!("Rapp {} ({}) on {} with {} subgoals", id, rule, parent, goals.len());
        self.rapps.push(Rapp {
            id,
            parent,
            rule,
            success_probability,
            post_state,
            script,
            goals,
            clusters: (first_cluster..first_cluster + cluster_count).map(ClusterId).collect(),
            status: NodeStatus::Pending,
        });
        self.goals[parent.0].children.push(id);
        self.update_rapp(id);
        id
    }

    /// Marks an active goal unprovable and propagates.
    pub fn mark_unprovable(&mut self, goal: GoalId, reason: Unprovability) {
        if self.goals[goal.0].is_active() {
            self.set_goal_status(goal, GoalStatus::Unprovable(reason));
        }
    }

    /// Re-derives the status of `goal` from its rapps and remaining
    /// candidates.
    pub fn refresh(&mut self, goal: GoalId) {
        self.update_goal(goal);
    }

    fn set_goal_status(&mut self, id: GoalId, status: GoalStatus) {
        let goal = &mut self.goals[id.0];
        if goal.status == status {
            return;
        }
        debug!("Goal {} ({}) is now {:?}", id, goal.mvar, status);
        goal.status = status;
        let cluster = goal.cluster;
        if status.is_proven() {
            for k in 0..self.goals[id.0].children.len() {
                let r = self.goals[id.0].children[k];
                if self.rapps[r.0].status != NodeStatus::Proven {
                    self.mark_irrelevant_below(r);
                }
            }
        }
        self.update_cluster(cluster);
    }

    fn update_cluster(&mut self, id: ClusterId) {
        let mut status = NodeStatus::Pending;
        for g in &self.clusters[id.0].goals {
            match self.goals[g.0].status {
                GoalStatus::Unprovable(_) => {
                    status = NodeStatus::Unprovable;
                    break;
                }
                GoalStatus::Proven => status = NodeStatus::Proven,
                _ => {}
            }
        }
        let cluster = &mut self.clusters[id.0];
        if cluster.status == status {
            return;
        }
        trace!("Cluster {} is now {:?}", id, status);
        cluster.status = status;
        let parent = cluster.parent;
        if status == NodeStatus::Proven {
            // The proven member carries proofs of all the others.
            let members = self.clusters[id.0].goals.clone();
            self.mark_irrelevant(members);
        }
        if let Some(r) = parent {
            self.update_rapp(r);
        }
    }

    fn update_rapp(&mut self, id: RappId) {
        let status = aggregate(self.rapps[id.0].clusters.iter().map(|c| self.clusters[c.0].status));
        let rapp = &mut self.rapps[id.0];
        if rapp.status == status {
            return;
        }
        debug!("Rapp {} ({}) is now {:?}", id, rapp.rule, status);
        rapp.status = status;
        let parent = rapp.parent;
        if status == NodeStatus::Unprovable {
            self.mark_irrelevant_below(id);
        }
        self.update_goal(parent);
    }

    fn update_goal(&mut self, id: GoalId) {
        let goal = &self.goals[id.0];
        if !goal.is_active() {
            return;
        }
        let statuses: Vec<NodeStatus> = goal.children.iter().map(|r| self.rapps[r.0].status).collect();
        if statuses.contains(&NodeStatus::Proven) {
            self.set_goal_status(id, GoalStatus::Proven);
        } else if !goal.has_untried_rules() && statuses.iter().all(|s| *s == NodeStatus::Unprovable) {
            self.set_goal_status(id, GoalStatus::Unprovable(Unprovability::Derived));
        }
    }

    /// Marks every active goal below `rapp` irrelevant.
    fn mark_irrelevant_below(&mut self, rapp: RappId) {
        let goals = self.rapps[rapp.0].goals.clone();
        self.mark_irrelevant(goals);
    }

    /// Marks the active goals in `stack` and everything below them
    /// irrelevant. Statuses are not propagated: irrelevance is bookkeeping
    /// only.
    fn mark_irrelevant(&mut self, mut stack: Vec<GoalId>) {
        while let Some(g) = stack.pop() {
            let goal = &mut self.goals[g.0];
            if !goal.is_active() {
                continue;
            }
            trace!("Goal {} is irrelevant", g);
            goal.status = GoalStatus::Irrelevant;
            for k in 0..self.goals[g.0].children.len() {
                let r = self.goals[g.0].children[k];
                stack.extend(self.rapps[r.0].goals.iter().copied());
            }
        }
    }
}

/// AND over child statuses.
fn aggregate(statuses: impl Iterator<Item = NodeStatus>) -> NodeStatus {
    let mut all_proven = true;
    for s in statuses {
        match s {
            NodeStatus::Unprovable => return NodeStatus::Unprovable,
            NodeStatus::Pending => all_proven = false,
            NodeStatus::Proven => {}
        }
    }
    if all_proven {
        NodeStatus::Proven
    } else {
        NodeStatus::Pending
    }
}

/// Assigns each subgoal a cluster number. Subgoals sharing a metavariable
/// (their own or one reachable from them) get the same number; numbers
/// follow first appearance.
fn partition(children: &[NewGoal]) -> Vec<usize> {
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..children.len()).collect();
    let mut owner: HashMap<MVarId, usize> = HashMap::new();
    for (i, child) in children.iter().enumerate() {
        for m in std::iter::once(&child.mvar).chain(child.mvars.iter()) {
            match owner.get(m) {
                Some(&j) => {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    owner.insert(*m, i);
                }
            }
        }
    }

    let mut numbers: IndexMap<usize, usize> = IndexMap::new();
    (0..children.len())
        .map(|i| {
            let root = find(&mut parent, i);
            let next = numbers.len();
            *numbers.entry(root).or_insert(next)
        })
        .collect()
}
