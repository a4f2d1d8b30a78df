//! The best-first search loop.
//!
//! A [`Search`] owns a proof tree for the duration of one run. Each iteration
//! pops the most promising active goal, applies the next rule that succeeds on
//! it and attaches the resulting rule application. The run ends when the root
//! is proven, when it becomes unprovable, or when a limit is exceeded.
//!
//! A goal that shares metavariables with its siblings is expanded in its
//! parent's state, so each of its rule applications also takes the siblings
//! over as subgoals, instantiated with whatever the rule assigned. A safe
//! rule that assigns such a metavariable does not discard the goal's other
//! rules.

use chrono::{DateTime, Utc};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::config::SearchOptions;
use crate::engine::ProofEngine;
use crate::error::{Error, Limit, Result};
use crate::expr::{Expr, MVarId};
use crate::proof::{extract_proof, Script};
use crate::queue::{BestFirst, GoalPriority, GoalQueue};
use crate::rule::{RuleSet, RuleTacticInput};
use crate::tree::{GoalId, NewGoal, Tree, Unprovability};
use crate::validator::validate_application;

/// Counters collected during one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Goals popped and handled, stale entries excluded.
    pub iterations: u64,
    /// Goals in the tree, the root included.
    pub goals: usize,
    /// Rule applications attached to the tree.
    pub rule_applications: usize,
    /// Rule runs that failed or returned nothing.
    pub failed_rule_attempts: usize,
    /// Goals that hit the depth limit.
    pub forced_unprovable: usize,
    /// Index lookups, at most one per goal.
    pub index_queries: usize,
    /// Queue entries skipped because their goal was no longer active.
    pub stale_entries: usize,
    /// When the search started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the search finished, successfully or not.
    pub finished_at: Option<DateTime<Utc>>,
}

impl SearchStats {
    fn start() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Wall-clock duration of the search in milliseconds, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// The result of a successful search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The instantiated proof of the root goal.
    pub proof: Expr,
    /// A replayable script, when requested and available.
    pub script: Option<Script>,
    /// Counters of the run.
    pub stats: SearchStats,
}

/// A best-first proof search over a [`RuleSet`].
///
/// # Examples
///
/// ```
/// use aingle_search::{BuiltinRules, Expr, MetaContext, RuleSet, Search, SearchOptions};
///
/// let mut ctx = MetaContext::new();
/// let goal = ctx.mk_goal(vec![], Expr::arrow(Expr::constant("A"), Expr::constant("A")));
///
/// let rules = RuleSet::new("basic")
///     .with(BuiltinRules::intro().unwrap())
///     .unwrap()
///     .with(BuiltinRules::assumption().unwrap())
///     .unwrap();
///
/// let outcome = Search::new(&rules, SearchOptions::default()).run(&mut ctx, goal).unwrap();
/// assert!(!outcome.proof.has_mvar());
/// ```
pub struct Search<'a, E: ProofEngine, P = BestFirst> {
    rules: &'a RuleSet<E>,
    options: SearchOptions,
    priority: P,
    stats: SearchStats,
}

impl<'a, E: ProofEngine> Search<'a, E> {
    /// Creates a best-first search.
    pub fn new(rules: &'a RuleSet<E>, options: SearchOptions) -> Self {
        Self {
            rules,
            options,
            priority: BestFirst,
            stats: SearchStats::default(),
        }
    }
}

impl<'a, E: ProofEngine, P: GoalPriority> Search<'a, E, P> {
    /// Replaces the scheduling strategy.
    pub fn with_priority<Q: GoalPriority>(self, priority: Q) -> Search<'a, E, Q> {
        Search {
            rules: self.rules,
            options: self.options,
            priority,
            stats: self.stats,
        }
    }

    /// Options of this search.
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Counters of the last run.
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Searches for a proof of `goal`.
    ///
    /// # Arguments
    ///
    /// * `engine` - The engine holding `goal`.
    /// * `goal` - The goal to prove. Must be known and unassigned.
    ///
    /// # Returns
    ///
    /// The proof, with the engine left in its initial state plus the
    /// assignment of `goal`. On error the engine is restored to its initial
    /// state.
    pub fn run(&mut self, engine: &mut E, goal: MVarId) -> Result<SearchOutcome> {
        self.stats = SearchStats::start();
        let initial = engine.save_state();
        let result = self.search(engine, goal);
        self.stats.finished_at = Some(Utc::now());

        match result {
            Ok((proof, script)) => {
                info!(
                    "Proved {} in {} iterations ({} goals, {} rule applications)",
                    goal, self.stats.iterations, self.stats.goals, self.stats.rule_applications
                );
                Ok(SearchOutcome {
                    proof,
                    script,
                    stats: self.stats.clone(),
                })
            }
            Err(e) => {
                info!("Search for {} failed after {} iterations: {}", goal, self.stats.iterations, e);
                engine.restore_state(&initial);
                Err(e)
            }
        }
    }

    fn search(&mut self, engine: &mut E, goal: MVarId) -> Result<(Expr, Option<Script>)> {
        let strength = self.rules.reductions().strength();
        if strength != self.options.reduction_strength {
            return Err(Error::ReductionMismatch {
                rules: strength,
                options: self.options.reduction_strength,
            });
        }
        if engine.is_assigned_or_delayed_assigned(goal) {
            return Err(Error::GoalAlreadyAssigned(goal));
        }
        let mvars = engine.reachable_mvars(goal)?;

        let mut tree = Tree::new(goal, mvars, engine.save_state());
        let mut queue = GoalQueue::new();
        queue.push(self.priority.key(tree.goal(tree.root())), tree.root());
        self.stats.goals = tree.num_goals();

        loop {
            if tree.is_proven() {
                break;
            }
            if tree.is_unprovable() {
                return Err(Error::NoProofFound {
                    iterations: self.stats.iterations,
                });
            }
            self.check_limits(&tree)?;

            let Some(g) = queue.pop() else {
                return Err(Error::InvariantViolation(
                    "goal queue is empty but the root goal is undecided".into(),
                ));
            };
            if !tree.goal(g).is_active() {
                self.stats.stale_entries += 1;
                continue;
            }

            self.stats.iterations += 1;
            let iteration = self.stats.iterations;
            trace!("Iteration {}: goal {} ({})", iteration, g, tree.goal(g).mvar);

            let max_depth = self.options.max_rule_application_depth;
            if max_depth != 0 && tree.goal(g).depth >= max_depth {
                debug!("Goal {} reached the depth limit {}", g, max_depth);
                tree.mark_unprovable(g, Unprovability::Forced);
                self.stats.forced_unprovable += 1;
                continue;
            }

            for child in self.expand(engine, &mut tree, g, iteration)? {
                if tree.goal(child).is_active() {
                    queue.push(self.priority.key(tree.goal(child)), child);
                }
            }
            let node = tree.goal(g);
            if node.is_active() && node.has_untried_rules() {
                queue.push(self.priority.key(node), g);
            }
            self.stats.goals = tree.num_goals();
            self.stats.rule_applications = tree.num_rapps();
        }

        let extracted = extract_proof(engine, &tree, self.options.generate_script)?;
        Ok((extracted.proof, extracted.script))
    }

    fn check_limits(&self, tree: &Tree<E::Snapshot>) -> Result<()> {
        let max = self.options.max_goals;
        if SearchOptions::exceeds(max, tree.num_goals()) {
            return Err(Error::ResourceExhausted {
                limit: Limit::Goals,
                max,
                count: tree.num_goals(),
            });
        }
        let max = self.options.max_rule_applications;
        if SearchOptions::exceeds(max, tree.num_rapps()) {
            return Err(Error::ResourceExhausted {
                limit: Limit::RuleApplications,
                max,
                count: tree.num_rapps(),
            });
        }
        Ok(())
    }

    /// Applies the next candidate rule that succeeds on `g` and returns the
    /// goals it created.
    fn expand(
        &mut self,
        engine: &mut E,
        tree: &mut Tree<E::Snapshot>,
        g: GoalId,
        iteration: u64,
    ) -> Result<Vec<GoalId>> {
        let rules = self.rules;
        let mvar = tree.goal(g).mvar;

        if !tree.goal(g).is_indexed() {
            engine.restore_state(tree.goal_state(g));
            let view = engine.goal_view(mvar)?;
            let candidates = rules.applicable_rules(&view);
            self.stats.index_queries += 1;
            debug!("Goal {} matches {} rules", g, candidates.len());
            tree.set_candidates(g, candidates);
        }
        tree.set_last_expanded(g, iteration);

        let mvars = tree.goal(g).mvars.clone();
        let mates = tree.cluster_mates(g);
        let mut added = Vec::new();
        while let Some(candidate) = tree.next_candidate(g) {
            let rule = rules
                .rule(candidate.rule)
                .ok_or_else(|| Error::InvariantViolation(format!("index returned unknown rule {}", candidate.rule)))?;
            engine.restore_state(tree.goal_state(g));
            let input = RuleTacticInput {
                goal: mvar,
                mvars: &mvars,
                locations: &candidate.locations,
                options: &self.options,
            };

            let apps = match rule.apply(engine, &input) {
                Ok(apps) if !apps.is_empty() => apps,
                Ok(_) => {
                    debug!("Rule {} produced nothing on {}", rule.name, g);
                    self.stats.failed_rule_attempts += 1;
                    continue;
                }
                Err(e) if e.is_internal() => return Err(e),
                Err(e) => {
                    debug!("Rule {} failed on {}: {}", rule.name, g, e);
                    self.stats.failed_rule_attempts += 1;
                    continue;
                }
            };

            for app in &apps {
                validate_application(engine, &rule.name, app)?;
            }
            let mut assigns_shared = false;
            for app in apps {
                engine.restore_state(&app.post_state);
                assigns_shared |= mvars.iter().any(|m| engine.is_assigned_or_delayed_assigned(*m));
                let mut children = app
                    .goals
                    .iter()
                    .map(|&m| {
                        Ok(NewGoal {
                            mvar: m,
                            mvars: engine.reachable_mvars(m)?,
                            origin: None,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                // Cluster-mates are proven again under this application's
                // assignments. Mates it already solved are dropped.
                for &mate in &mates {
                    let m = tree.goal(mate).mvar;
                    if app.goals.contains(&m) || engine.is_assigned_or_delayed_assigned(m) {
                        continue;
                    }
                    children.push(NewGoal {
                        mvar: m,
                        mvars: engine.reachable_mvars(m)?,
                        origin: Some(mate),
                    });
                }
                let probability = app.success_probability.unwrap_or(rule.success_probability);
                let script = if self.options.generate_script { app.script } else { None };
                let r = tree.add_rapp(g, rule.name.as_str(), probability, app.post_state, script, children);
                added.extend(tree.rapp(r).goals.iter().copied());
            }
            if rule.is_safe() && !assigns_shared {
                tree.drop_candidates(g);
            } else if rule.is_safe() {
                debug!("Safe rule {} assigned metavariables of {}, keeping its other rules", rule.name, g);
            }
            break;
        }

        tree.refresh(g);
        Ok(added)
    }
}

/// Runs a best-first search for `goal`.
pub fn search<E: ProofEngine>(
    engine: &mut E,
    rules: &RuleSet<E>,
    goal: MVarId,
    options: SearchOptions,
) -> Result<SearchOutcome> {
    Search::new(rules, options).run(engine, goal)
}
