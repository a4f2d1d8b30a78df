//! A small reference engine.
//!
//! `MetaContext` keeps goals as metavariables with a list of hypotheses and a
//! target, plus the assignments made so far. It is enough to drive the search
//! end to end with the built-in rules, and snapshots are plain clones.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use log::trace;

use crate::engine::{GoalView, LocalDecl, ProofEngine};
use crate::error::{Error, Result};
use crate::expr::{Expr, FVarId, MVarId, Name};

/// The declaration of a goal metavariable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalDecl {
    /// Hypotheses in scope.
    pub hyps: Vec<LocalDecl>,
    /// The statement to prove.
    pub target: Expr,
}

/// `goal := fun (fvar : domain) => body`, where `body` is a goal whose
/// context contains `fvar`. The hypothesis is only abstracted once `body`
/// is fully solved.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DelayedAssignment {
    fvar: FVarId,
    domain: Expr,
    body: MVarId,
}

/// A metavariable context: goal declarations and their assignments.
#[derive(Debug, Clone, Default)]
pub struct MetaContext {
    goals: IndexMap<MVarId, GoalDecl>,
    assignments: HashMap<MVarId, Expr>,
    delayed: HashMap<MVarId, DelayedAssignment>,
    next_id: u64,
}

impl MetaContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Declares a new goal and returns its metavariable.
    pub fn mk_goal(&mut self, hyps: Vec<LocalDecl>, target: Expr) -> MVarId {
        let id = MVarId(self.fresh_id());
        self.goals.insert(id, GoalDecl { hyps, target });
        id
    }

    /// Creates a hypothesis with a fresh identity.
    pub fn mk_local(&mut self, user_name: impl Into<Name>, ty: Expr) -> LocalDecl {
        LocalDecl {
            fvar: FVarId(self.fresh_id()),
            user_name: user_name.into(),
            ty,
        }
    }

    /// Returns the declaration of `goal`.
    pub fn goal_decl(&self, goal: MVarId) -> Option<&GoalDecl> {
        self.goals.get(&goal)
    }

    /// Returns `true` if `mvar` has a value.
    pub fn is_assigned(&self, mvar: MVarId) -> bool {
        self.assignments.contains_key(&mvar)
    }

    /// Assigns `goal := fun local => body` once `body` is solved. The goal
    /// counts as solved for the search right away.
    pub fn delay_assign(&mut self, goal: MVarId, local: &LocalDecl, body: MVarId) {
        self.delayed.insert(
            goal,
            DelayedAssignment {
                fvar: local.fvar,
                domain: local.ty.clone(),
                body,
            },
        );
    }

    /// Fully instantiated value of `mvar`, if it has one. A delayed
    /// assignment has a value only once its body is closed.
    fn instantiate_mvar(&self, mvar: MVarId) -> Option<Expr> {
        if let Some(v) = self.assignments.get(&mvar) {
            return Some(self.instantiate_mvars(v));
        }
        let delayed = self.delayed.get(&mvar)?;
        let body = self.instantiate_mvars(&Expr::mvar(delayed.body));
        if body.has_mvar() {
            return None;
        }
        Some(Expr::lam(
            self.instantiate_mvars(&delayed.domain),
            body.abstract_fvar(delayed.fvar),
        ))
    }

    /// Number of declared goals.
    pub fn goal_count(&self) -> usize {
        self.goals.len()
    }

    /// First-order unification of `a` and `b`. Only metavariables in
    /// `assignable` may be assigned. On failure some assignments may already
    /// have been made; callers restore a snapshot.
    pub fn unify(&mut self, a: &Expr, b: &Expr, assignable: &BTreeSet<MVarId>) -> bool {
        let a = self.instantiate_mvars(a);
        let b = self.instantiate_mvars(b);
        self.unify_core(&a, &b, assignable)
    }

    fn unify_core(&mut self, a: &Expr, b: &Expr, assignable: &BTreeSet<MVarId>) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (Expr::MVar(m), other) | (other, Expr::MVar(m))
                if assignable.contains(m) && !self.is_assigned_or_delayed_assigned(*m) =>
            {
                if other.mvars().contains(m) {
                    return false;
                }
                trace!("unify: {} := {}", m, other);
                self.assignments.insert(*m, other.clone());
                true
            }
            (Expr::App(f, xs), Expr::App(g, ys)) => {
                if xs.len() != ys.len() || !self.unify(f, g, assignable) {
                    return false;
                }
                xs.iter().zip(ys.iter()).all(|(x, y)| self.unify(x, y, assignable))
            }
            (Expr::Pi(d1, b1), Expr::Pi(d2, b2)) | (Expr::Lam(d1, b1), Expr::Lam(d2, b2)) => {
                self.unify(d1, d2, assignable) && self.unify(b1, b2, assignable)
            }
            _ => false,
        }
    }
}

impl ProofEngine for MetaContext {
    type Snapshot = MetaContext;

    fn save_state(&self) -> MetaContext {
        self.clone()
    }

    fn restore_state(&mut self, snapshot: &MetaContext) {
        // Identifiers keep increasing across restores so that goals created on
        // different branches never share an id.
        let next_id = self.next_id.max(snapshot.next_id);
        *self = snapshot.clone();
        self.next_id = next_id;
    }

    fn goal_view(&self, goal: MVarId) -> Result<GoalView> {
        let decl = self.goals.get(&goal).ok_or(Error::UnknownGoal(goal))?;
        Ok(GoalView {
            goal,
            hyps: decl
                .hyps
                .iter()
                .map(|h| LocalDecl {
                    ty: self.instantiate_mvars(&h.ty),
                    ..h.clone()
                })
                .collect(),
            target: self.instantiate_mvars(&decl.target),
        })
    }

    fn is_assigned_or_delayed_assigned(&self, goal: MVarId) -> bool {
        self.assignments.contains_key(&goal) || self.delayed.contains_key(&goal)
    }

    fn assignment(&self, mvar: MVarId) -> Option<Expr> {
        self.assignments.get(&mvar).cloned()
    }

    fn assign(&mut self, mvar: MVarId, value: Expr) {
        self.assignments.insert(mvar, value);
    }

    fn instantiate_mvars(&self, expr: &Expr) -> Expr {
        if !expr.has_mvar() {
            return expr.clone();
        }
        expr.replace_mvars(&|m| self.instantiate_mvar(m))
    }

    fn extract_and_instantiate(&self, goal: MVarId) -> Option<Expr> {
        self.instantiate_mvar(goal)
    }
}
