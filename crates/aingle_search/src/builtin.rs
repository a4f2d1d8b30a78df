//! Built-in rules for the reference engine.
//!
//! These rules cover the usual backward-reasoning steps:
//! - `assumption`: close a goal with a hypothesis
//! - `intro`: move the premise of an implication into the context
//! - `exact`: close a goal with a declaration of the same type
//! - `apply`: reduce a goal to the premises of a declaration
//! - `tac_gen`: run textual tactic suggestions

use std::collections::BTreeSet;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::engine::{GoalView, ProofEngine};
use crate::error::{Error, Result};
use crate::expr::{Expr, FVarId, MVarId, Name};
use crate::index::IndexMatchLocation;
use crate::meta::MetaContext;
use crate::rule::{Rule, RuleApplication, RuleSet, RuleTacticInput, ScriptBuilder, TacGen};

type Apps = Result<Vec<RuleApplication<MetaContext>>>;

/// A global constant with its type, usable by `exact` and `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// The constant's name.
    pub name: Name,
    /// The constant's type. Universally quantified premises are `Pi`
    /// binders.
    pub ty: Expr,
}

impl Declaration {
    /// Creates a declaration.
    pub fn new(name: impl Into<Name>, ty: Expr) -> Self {
        Self { name: name.into(), ty }
    }

    /// The declaration's conclusion with its premises stripped. Premises
    /// occur as loose bound variables.
    pub fn conclusion(&self) -> &Expr {
        self.ty.pi_telescope().1
    }
}

/// Pre-defined rules over [`MetaContext`].
pub struct BuiltinRules;

impl BuiltinRules {
    /// A rule set with `assumption`, `intro`, and `exact` and `apply` rules
    /// for every declaration. `apply` rules are only added for declarations
    /// with premises and share `apply_probability`.
    pub fn basic(
        name: impl Into<String>,
        declarations: &[Declaration],
        apply_probability: f64,
    ) -> Result<RuleSet<MetaContext>> {
        let mut rules = RuleSet::new(name)
            .with(Self::assumption()?)?
            .with(Self::intro()?)?;
        for decl in declarations {
            rules.add(Self::exact(decl)?)?;
            if !decl.ty.pi_telescope().0.is_empty() {
                rules.add(Self::apply(decl, apply_probability)?)?;
            }
        }
        Ok(rules)
    }

    /// Closes a goal whose target unifies with one of its hypotheses. When
    /// the rule is indexed by hypotheses, only the matching ones are tried.
    pub fn assumption() -> Result<Rule<MetaContext>> {
        Rule::safe("assumption", assumption_tactic).build()
    }

    /// Introduces the premise of a goal `A -> B` as a hypothesis `h : A`
    /// and leaves the goal `B`.
    pub fn intro() -> Result<Rule<MetaContext>> {
        Rule::safe("intro", intro_tactic).build()
    }

    /// Closes a goal whose target unifies with the type of `decl`.
    pub fn exact(decl: &Declaration) -> Result<Rule<MetaContext>> {
        let index = decl.ty.clone();
        let decl = decl.clone();
        Rule::safe(format!("exact_{}", decl.name), move |ctx: &mut MetaContext, input: &RuleTacticInput<'_>| -> Apps {
            exact(ctx, input.goal, &decl)?;
            Ok(vec![RuleApplication::new(vec![], ctx.save_state())
                .with_script(ScriptBuilder::new(format!("exact {}", decl.name)))])
        })
        .index_target(index)
        .build()
    }

    /// Unifies the conclusion of `decl` with the target and leaves its
    /// premises as subgoals.
    ///
    /// Only premises that no other premise depends on become subgoals. The
    /// others stay metavariables shared by the subgoals that mention them.
    pub fn apply(decl: &Declaration, probability: f64) -> Result<Rule<MetaContext>> {
        let index = decl.conclusion().clone();
        let decl = decl.clone();
        Rule::unsafe_rule(
            format!("apply_{}", decl.name),
            probability,
            move |ctx: &mut MetaContext, input: &RuleTacticInput<'_>| -> Apps {
                let goals = apply(ctx, input.goal, &decl)?;
                Ok(vec![RuleApplication::new(goals, ctx.save_state())
                    .with_script(ScriptBuilder::new(format!("apply {}", decl.name)))])
            },
        )
        .index_target(index)
        .build()
    }

    /// A rule whose applications come from `generator`'s suggestions.
    ///
    /// Suggestions are tactic strings run by a small interpreter:
    /// `assumption`, `intro`, `exact <name>` and `apply <name>`, where names
    /// refer to `declarations`.
    pub fn tac_gen<G>(
        name: impl Into<String>,
        probability: f64,
        declarations: Vec<Declaration>,
        generator: G,
    ) -> Result<Rule<MetaContext>>
    where
        G: Fn(&MetaContext, &GoalView) -> Vec<(String, f64)> + 'static,
    {
        let tactic = TacGen::<MetaContext>::new(generator, move |ctx, goal, text| {
            run_tactic(ctx, goal, text, &declarations)
        });
        Rule::unsafe_rule(name, probability, tactic).build()
    }
}

fn assumption_tactic(ctx: &mut MetaContext, input: &RuleTacticInput<'_>) -> Apps {
    let only: Vec<FVarId> = input
        .locations
        .iter()
        .filter_map(|l| match l {
            IndexMatchLocation::Hyp(h) => Some(*h),
            _ => None,
        })
        .collect();
    let h = assumption(ctx, input.goal, &only)?;
    let view = ctx.goal_view(input.goal)?;
    let name = view
        .hyps
        .iter()
        .find(|d| d.fvar == h)
        .map_or_else(|| h.to_string(), |d| d.user_name.clone());
    Ok(vec![RuleApplication::new(vec![], ctx.save_state())
        .with_script(ScriptBuilder::new(format!("exact {}", name)))])
}

fn intro_tactic(ctx: &mut MetaContext, input: &RuleTacticInput<'_>) -> Apps {
    let body = intro(ctx, input.goal)?;
    Ok(vec![RuleApplication::new(vec![body], ctx.save_state()).with_script(ScriptBuilder::new("intro"))])
}

/// Closes `goal` with a hypothesis and returns the one used. With a
/// non-empty `only`, other hypotheses are not considered.
pub fn assumption(ctx: &mut MetaContext, goal: MVarId, only: &[FVarId]) -> Result<FVarId> {
    let view = ctx.goal_view(goal)?;
    let assignable = ctx.reachable_mvars(goal)?;
    let saved = ctx.save_state();
    // Most recent hypotheses first.
    for hyp in view.hyps.iter().rev() {
        if !only.is_empty() && !only.contains(&hyp.fvar) {
            continue;
        }
        if ctx.unify(&hyp.ty, &view.target, &assignable) {
            trace!("assumption: {} closed by {}", goal, hyp.user_name);
            ctx.assign(goal, Expr::fvar(hyp.fvar));
            return Ok(hyp.fvar);
        }
        ctx.restore_state(&saved);
    }
    Err(Error::RuleFailed(format!("no hypothesis matches the target of {}", goal)))
}

/// Introduces one premise of `goal` and returns the new goal.
pub fn intro(ctx: &mut MetaContext, goal: MVarId) -> Result<MVarId> {
    let decl = ctx.goal_decl(goal).ok_or(Error::UnknownGoal(goal))?.clone();
    let Expr::Pi(domain, body) = ctx.instantiate_mvars(&decl.target) else {
        return Err(Error::RuleFailed(format!("target of {} is not a function type", goal)));
    };
    let local = ctx.mk_local(format!("h{}", decl.hyps.len()), *domain);
    let target = body.instantiate1(&Expr::fvar(local.fvar));
    let mut hyps = decl.hyps;
    hyps.push(local.clone());
    let sub = ctx.mk_goal(hyps, target);
    ctx.delay_assign(goal, &local, sub);
    Ok(sub)
}

/// Closes `goal` with `decl`.
pub fn exact(ctx: &mut MetaContext, goal: MVarId, decl: &Declaration) -> Result<()> {
    let view = ctx.goal_view(goal)?;
    let assignable = ctx.reachable_mvars(goal)?;
    if !ctx.unify(&decl.ty, &view.target, &assignable) {
        return Err(Error::RuleFailed(format!("{} does not prove the target of {}", decl.name, goal)));
    }
    ctx.assign(goal, Expr::constant(decl.name.clone()));
    Ok(())
}

/// Applies `decl` to `goal` and returns the premises left to prove.
pub fn apply(ctx: &mut MetaContext, goal: MVarId, decl: &Declaration) -> Result<Vec<MVarId>> {
    let view = ctx.goal_view(goal)?;
    let mut assignable = ctx.reachable_mvars(goal)?;

    let (binders, conclusion) = decl.ty.pi_telescope();
    let mut premises = Vec::with_capacity(binders.len());
    let mut args = Vec::with_capacity(binders.len());
    for domain in binders {
        let m = ctx.mk_goal(view.hyps.clone(), domain.instantiate_rev(&args));
        assignable.insert(m);
        premises.push(m);
        args.push(Expr::mvar(m));
    }

    if !ctx.unify(&conclusion.instantiate_rev(&args), &view.target, &assignable) {
        return Err(Error::RuleFailed(format!("{} does not apply to {}", decl.name, goal)));
    }
    ctx.assign(goal, Expr::const_app(decl.name.clone(), args));

    let open: Vec<MVarId> = premises.into_iter().filter(|m| !ctx.is_assigned(*m)).collect();
    let mut dependent = BTreeSet::new();
    for m in &open {
        if let Some(d) = ctx.goal_decl(*m) {
            ctx.instantiate_mvars(&d.target).collect_mvars(&mut dependent);
        }
    }
    Ok(open.into_iter().filter(|m| !dependent.contains(m)).collect())
}

/// Runs one textual tactic on `goal` and returns the goals it leaves.
pub fn run_tactic(ctx: &mut MetaContext, goal: MVarId, text: &str, declarations: &[Declaration]) -> Result<Vec<MVarId>> {
    let lookup = |name: &str| {
        declarations
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::RuleFailed(format!("unknown declaration '{}'", name)))
    };
    let words: Vec<&str> = text.split_whitespace().collect();
    match words.as_slice() {
        ["assumption"] => assumption(ctx, goal, &[]).map(|_| Vec::new()),
        ["intro"] => Ok(vec![intro(ctx, goal)?]),
        ["exact", name] => exact(ctx, goal, lookup(*name)?).map(|_| Vec::new()),
        ["apply", name] => apply(ctx, goal, lookup(*name)?),
        _ => Err(Error::RuleFailed(format!("cannot run tactic '{}'", text))),
    }
}
