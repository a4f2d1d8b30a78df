//! The boundary between the search and the logical engine.
//!
//! The search owns the proof tree and decides what to try next. Everything
//! that needs to understand goals (creating them, assigning them, copying
//! the engine state) is delegated to a [`ProofEngine`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::expr::{Expr, FVarId, MVarId, Name};

/// A local hypothesis of a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDecl {
    /// Stable identity of the hypothesis.
    pub fvar: FVarId,
    /// The name shown to users. Not unique.
    pub user_name: Name,
    /// The type of the hypothesis.
    pub ty: Expr,
}

/// A goal with its metavariables instantiated, as handed to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalView {
    /// The goal this view was taken from.
    pub goal: MVarId,
    /// The hypotheses in scope.
    pub hyps: Vec<LocalDecl>,
    /// The statement to prove.
    pub target: Expr,
}

/// The operations the search needs from the logical engine.
///
/// Engine states are plain values: [`save_state`](Self::save_state) returns a
/// copy and [`restore_state`](Self::restore_state) puts it back. Rule
/// applications keep the state they produced so that the search can resume
/// along any branch.
pub trait ProofEngine {
    /// A saved engine state.
    type Snapshot: Clone;

    /// Captures the current state.
    fn save_state(&self) -> Self::Snapshot;

    /// Replaces the current state with `snapshot`.
    fn restore_state(&mut self, snapshot: &Self::Snapshot);

    /// Returns the instantiated hypotheses and target of `goal`.
    fn goal_view(&self, goal: MVarId) -> Result<GoalView>;

    /// Returns `true` if `goal` is assigned or has a delayed assignment.
    fn is_assigned_or_delayed_assigned(&self, goal: MVarId) -> bool;

    /// Returns the value assigned to `mvar`, if any. Not instantiated.
    fn assignment(&self, mvar: MVarId) -> Option<Expr>;

    /// Assigns `value` to `mvar`.
    fn assign(&mut self, mvar: MVarId, value: Expr);

    /// Replaces every assigned metavariable in `expr` by its value.
    fn instantiate_mvars(&self, expr: &Expr) -> Expr;

    /// Returns the unassigned metavariables reachable from `goal` through its
    /// target and hypotheses.
    fn reachable_mvars(&self, goal: MVarId) -> Result<BTreeSet<MVarId>> {
        let view = self.goal_view(goal)?;
        let mut mvars = view.target.mvars();
        for hyp in &view.hyps {
            hyp.ty.collect_mvars(&mut mvars);
        }
        mvars.retain(|m| !self.is_assigned_or_delayed_assigned(*m));
        Ok(mvars)
    }

    /// Returns the fully instantiated value of `goal`, or `None` if the goal
    /// is unassigned.
    fn extract_and_instantiate(&self, goal: MVarId) -> Option<Expr> {
        self.assignment(goal).map(|value| self.instantiate_mvars(&value))
    }

    /// Returns `true` if `expr` still mentions unassigned metavariables.
    fn has_unresolved_mvars(&self, expr: &Expr) -> bool {
        self.instantiate_mvars(expr).has_mvar()
    }
}
