//! Proof extraction.
//!
//! Once the root cluster is proven, the extractor walks the tree from the
//! root. For every goal it picks one proven rule application and first
//! computes the values of the application's subgoals. Each cluster of the
//! application is solved through one proven member, whose subtree also
//! proves the other members. Those values are then assigned in the engine
//! state the application left behind, and the goal's own value is read off
//! that state. The value of the root goal is the proof.
//!
//! Among several proven applications of a goal, the oldest one (lowest
//! [`RappId`]) is chosen, and among the proven members of a cluster the
//! oldest goal, so the same tree always yields the same proof.

use std::fmt;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::ProofEngine;
use crate::error::{Error, Result};
use crate::expr::{Expr, MVarId};
use crate::tree::{GoalId, NodeStatus, RappId, Tree};

/// One step of a replayable script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// The goal the step runs on.
    pub goal: MVarId,
    /// The rule that produced the step.
    pub rule: String,
    /// The tactic to replay.
    pub tactic: String,
}

/// A script replaying a proof, in pre-order over the chosen applications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Steps in the order they should be replayed.
    pub steps: Vec<ScriptStep>,
}

impl Script {
    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the script has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the rules used, in step order.
    pub fn rules_used(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.rule.as_str()).collect()
    }

    /// Serializes the script into a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserializes a script from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", step.tactic)?;
        }
        Ok(())
    }
}

/// The result of extracting a proof from a proven tree.
#[derive(Debug, Clone)]
pub struct ExtractedProof {
    /// The instantiated proof of the root goal.
    pub proof: Expr,
    /// The script, if requested and every chosen application had a step.
    pub script: Option<Script>,
    /// The chosen applications, in pre-order.
    pub rapps: Vec<RappId>,
}

/// Builds the proof of the root goal of a proven tree.
///
/// On success the engine is left in the initial state with the root goal
/// assigned to the proof.
///
/// # Errors
///
/// All errors are contract violations: the tree is not proven, a chosen
/// application did not assign its goal, two applications disagree on a
/// shared metavariable, or the final proof still mentions unassigned
/// metavariables.
pub fn extract_proof<E: ProofEngine>(
    engine: &mut E,
    tree: &Tree<E::Snapshot>,
    generate_script: bool,
) -> Result<ExtractedProof> {
    if !tree.is_proven() {
        return Err(Error::InvariantViolation("extracting from an unproven tree".into()));
    }

    let mut extractor = Extractor {
        engine: &mut *engine,
        tree,
        shared: IndexMap::new(),
        solved: IndexMap::new(),
        chosen: Vec::new(),
    };
    let proof = extractor.closed_value(tree.root())?;
    let chosen = extractor.chosen;

    let root = tree.goal(tree.root()).mvar;
    engine.restore_state(tree.root_state());
    if engine.has_unresolved_mvars(&proof) {
        return Err(Error::UnresolvedMetavariables(proof.mvars().into_iter().collect()));
    }
    engine.assign(root, proof.clone());
    debug!("Extracted proof of {} from {} rule applications", root, chosen.len());

    let script = if generate_script {
        chosen
            .iter()
            .map(|&r| {
                let rapp = tree.rapp(r);
                rapp.script.as_ref().map(|s| ScriptStep {
                    goal: tree.goal(rapp.parent).mvar,
                    rule: rapp.rule.clone(),
                    tactic: s.tactic().to_string(),
                })
            })
            .collect::<Option<Vec<_>>>()
            .map(|steps| Script { steps })
    } else {
        None
    };

    Ok(ExtractedProof {
        proof,
        script,
        rapps: chosen,
    })
}

struct Extractor<'a, E: ProofEngine> {
    engine: &'a mut E,
    tree: &'a Tree<E::Snapshot>,
    /// Values of metavariables shared between goals, as fixed by the
    /// subtrees computed so far.
    shared: IndexMap<MVarId, Expr>,
    /// Values of the goals extracted so far.
    solved: IndexMap<MVarId, Expr>,
    chosen: Vec<RappId>,
}

impl<E: ProofEngine> Extractor<'_, E> {
    /// Computes the value of goal `g` with every subgoal below it filled in.
    fn closed_value(&mut self, g: GoalId) -> Result<Expr> {
        let tree = self.tree;
        let goal = tree.goal(g);
        let rapp = goal
            .children
            .iter()
            .map(|r| tree.rapp(*r))
            .find(|r| r.status == NodeStatus::Proven)
            .ok_or_else(|| Error::InvariantViolation(format!("proven goal {} has no proven rule application", g)))?;
        self.chosen.push(rapp.id);

        for &c in &rapp.clusters {
            let member = tree
                .cluster(c)
                .goals
                .iter()
                .copied()
                .find(|m| tree.goal(*m).status.is_proven())
                .ok_or_else(|| Error::InvariantViolation(format!("cluster {} of {} has no proven goal", c, rapp.id)))?;
            self.closed_value(member)?;
        }

        self.engine.restore_state(&rapp.post_state);
        for &c in &rapp.goals {
            let m = tree.goal(c).mvar;
            if let Some(v) = self.solved.get(&m) {
                self.engine.assign(m, v.clone());
            }
        }
        for (m, v) in &self.shared {
            if !self.engine.is_assigned_or_delayed_assigned(*m) {
                self.engine.assign(*m, v.clone());
            }
        }

        let value = self
            .engine
            .extract_and_instantiate(goal.mvar)
            .ok_or(Error::MissingAssignment(goal.mvar))?;
        for &m in &goal.mvars {
            if let Some(v) = self.engine.extract_and_instantiate(m) {
                record(&mut self.shared, m, v)?;
            }
        }
        record(&mut self.solved, goal.mvar, value.clone())?;
        Ok(value)
    }
}

fn record(values: &mut IndexMap<MVarId, Expr>, mvar: MVarId, value: Expr) -> Result<()> {
    match values.get(&mvar) {
        Some(existing) if *existing != value => Err(Error::InvariantViolation(format!(
            "conflicting assignments for {}: {} and {}",
            mvar, existing, value
        ))),
        Some(_) => Ok(()),
        None => {
            values.insert(mvar, value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaContext;
    use crate::rule::{Percent, ScriptBuilder};
    use crate::tree::NewGoal;
    use std::collections::BTreeSet;

    fn leaf(m: MVarId) -> NewGoal {
        NewGoal {
            mvar: m,
            mvars: BTreeSet::new(),
            origin: None,
        }
    }

    /// root := And.intro ?a ?b, then ?a := a and ?b := b.
    fn proven_tree(ctx: &mut MetaContext, with_scripts: bool) -> Tree<MetaContext> {
        let root = ctx.mk_goal(vec![], Expr::const_app("And", vec![Expr::constant("A"), Expr::constant("B")]));
        let mut tree = Tree::new(root, BTreeSet::new(), ctx.save_state());
        let script = |t: &str| with_scripts.then(|| ScriptBuilder::new(t));

        let a = ctx.mk_goal(vec![], Expr::constant("A"));
        let b = ctx.mk_goal(vec![], Expr::constant("B"));
        ctx.assign(root, Expr::const_app("And.intro", vec![Expr::mvar(a), Expr::mvar(b)]));
        let split = tree.add_rapp(
            tree.root(),
            "split",
            Percent::ONE,
            ctx.save_state(),
            script("constructor"),
            vec![leaf(a), leaf(b)],
        );
        let after_split = ctx.save_state();
        let goals = tree.rapp(split).goals.clone();

        ctx.assign(a, Expr::constant("a"));
        tree.add_rapp(goals[0], "exact_a", Percent::ONE, ctx.save_state(), script("exact a"), vec![]);

        ctx.restore_state(&after_split);
        ctx.assign(b, Expr::constant("b"));
        // The extractor must not depend on sibling assignments being visible.
        tree.add_rapp(goals[1], "exact_b", Percent::ONE, ctx.save_state(), None, vec![]);
        tree
    }

    #[test]
    fn test_extracts_instantiated_proof() {
        let mut ctx = MetaContext::new();
        let tree = proven_tree(&mut ctx, false);
        let extracted = extract_proof(&mut ctx, &tree, false).unwrap();
        assert_eq!(
            extracted.proof,
            Expr::const_app("And.intro", vec![Expr::constant("a"), Expr::constant("b")])
        );
        assert_eq!(extracted.rapps.len(), 3);
        assert!(extracted.script.is_none());

        let root = tree.goal(tree.root()).mvar;
        assert_eq!(ctx.extract_and_instantiate(root), Some(extracted.proof));
    }

    #[test]
    fn test_cluster_is_extracted_through_its_proven_member() {
        let mut ctx = MetaContext::new();
        let c = Expr::constant;
        let r = |x: Expr, y: Expr| Expr::const_app("R", vec![x, y]);
        let root = ctx.mk_goal(vec![], r(c("x"), c("z")));
        let mut tree = Tree::new(root, BTreeSet::new(), ctx.save_state());

        // root := trans x ?y z ?a ?b, with ?a : R x ?y and ?b : R ?y z.
        let y = ctx.mk_goal(vec![], c("T"));
        let a = ctx.mk_goal(vec![], r(c("x"), Expr::mvar(y)));
        let b = ctx.mk_goal(vec![], r(Expr::mvar(y), c("z")));
        ctx.assign(
            root,
            Expr::const_app("trans", vec![c("x"), Expr::mvar(y), c("z"), Expr::mvar(a), Expr::mvar(b)]),
        );
        let shares_y = |m| NewGoal {
            mvar: m,
            mvars: BTreeSet::from([y]),
            origin: None,
        };
        let split = tree.add_rapp(
            tree.root(),
            "apply_trans",
            Percent::ONE,
            ctx.save_state(),
            None,
            vec![shares_y(a), shares_y(b)],
        );
        let after_split = ctx.save_state();
        let goals = tree.rapp(split).goals.clone();

        // ?a := hxw fixes ?y := w, and ?b : R w z is a dead end.
        ctx.assign(y, c("w"));
        ctx.assign(a, c("hxw"));
        let wrong = tree.add_rapp(
            goals[0],
            "exact_hxw",
            Percent::ONE,
            ctx.save_state(),
            None,
            vec![NewGoal { origin: Some(goals[1]), ..leaf(b) }],
        );
        tree.mark_unprovable(tree.rapp(wrong).goals[0], crate::tree::Unprovability::Derived);

        // ?b := hyz fixes ?y := y, and ?a : R x y is closed by hxy.
        ctx.restore_state(&after_split);
        ctx.assign(y, c("y"));
        ctx.assign(b, c("hyz"));
        let right = tree.add_rapp(
            goals[1],
            "exact_hyz",
            Percent::ONE,
            ctx.save_state(),
            None,
            vec![NewGoal { origin: Some(goals[0]), ..leaf(a) }],
        );
        ctx.assign(a, c("hxy"));
        tree.add_rapp(tree.rapp(right).goals[0], "exact_hxy", Percent::ONE, ctx.save_state(), None, vec![]);
        assert!(tree.is_proven());

        let extracted = extract_proof(&mut ctx, &tree, false).unwrap();
        assert_eq!(
            extracted.proof,
            Expr::const_app("trans", vec![c("x"), c("y"), c("z"), c("hxy"), c("hyz")])
        );
        assert_eq!(extracted.rapps.len(), 3);
    }

    #[test]
    fn test_script_requires_every_step() {
        let mut ctx = MetaContext::new();
        let tree = proven_tree(&mut ctx, true);
        let extracted = extract_proof(&mut ctx, &tree, true).unwrap();
        // exact_b has no script step.
        assert!(extracted.script.is_none());
    }

    #[test]
    fn test_unproven_tree_is_rejected() {
        let mut ctx = MetaContext::new();
        let root = ctx.mk_goal(vec![], Expr::constant("A"));
        let tree = Tree::new(root, BTreeSet::new(), ctx.save_state());
        let err = extract_proof(&mut ctx, &tree, false).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_missing_assignment() {
        let mut ctx = MetaContext::new();
        let root = ctx.mk_goal(vec![], Expr::constant("A"));
        let mut tree = Tree::new(root, BTreeSet::new(), ctx.save_state());
        tree.add_rapp(tree.root(), "liar", Percent::ONE, ctx.save_state(), None, vec![]);
        assert!(matches!(
            extract_proof(&mut ctx, &tree, false),
            Err(Error::MissingAssignment(m)) if m == root
        ));
    }

    #[test]
    fn test_unresolved_metavariables() {
        let mut ctx = MetaContext::new();
        let root = ctx.mk_goal(vec![], Expr::constant("A"));
        let mut tree = Tree::new(root, BTreeSet::new(), ctx.save_state());
        let hole = ctx.mk_goal(vec![], Expr::constant("B"));
        ctx.assign(root, Expr::const_app("f", vec![Expr::mvar(hole)]));
        tree.add_rapp(tree.root(), "sloppy", Percent::ONE, ctx.save_state(), None, vec![]);
        assert!(matches!(
            extract_proof(&mut ctx, &tree, false),
            Err(Error::UnresolvedMetavariables(ms)) if ms == vec![hole]
        ));
    }

    #[test]
    fn test_script_display_and_json() {
        let script = Script {
            steps: vec![
                ScriptStep {
                    goal: MVarId(0),
                    rule: "intro".into(),
                    tactic: "intro".into(),
                },
                ScriptStep {
                    goal: MVarId(1),
                    rule: "assumption".into(),
                    tactic: "assumption".into(),
                },
            ],
        };
        assert_eq!(script.to_string(), "intro\nassumption");
        assert_eq!(script.rules_used(), vec!["intro", "assumption"]);
        assert_eq!(Script::from_json(&script.to_json().unwrap()).unwrap(), script);
    }
}
