//! Rules and the contract between the search and rule tactics.
//!
//! A rule is a named tactic together with the metadata the search uses to
//! pick it: a phase, a success probability, a priority and an index spec.
//! When a goal is expanded, the search restores the goal's engine state,
//! hands the tactic a [`RuleTacticInput`] and receives zero or more
//! [`RuleApplication`]s, each with the subgoals it left open and the engine
//! state right after it fired.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Mul;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::SearchOptions;
use crate::engine::{GoalView, ProofEngine};
use crate::error::{Error, Result};
use crate::expr::{Expr, MVarId};
use crate::index::{IndexMatchLocation, IndexMatchResult, IndexSpec, IndexingMode, Reductions, RuleIndex};

/// A probability in `[0, 1]`, totally ordered.
#[derive(Debug, Clone, Copy)]
pub struct Percent(f64);

impl Percent {
    /// Certainty.
    pub const ONE: Percent = Percent(1.0);
    /// Impossibility.
    pub const ZERO: Percent = Percent(0.0);

    /// Creates a probability, rejecting values outside `[0, 1]` and NaN.
    pub fn new(p: f64) -> Result<Self> {
        if (0.0..=1.0).contains(&p) {
            Ok(Percent(p))
        } else {
            Err(Error::InvalidProbability(p))
        }
    }

    /// The probability as a float.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Mul for Percent {
    type Output = Percent;

    fn mul(self, rhs: Percent) -> Percent {
        Percent(self.0 * rhs.0)
    }
}

impl PartialEq for Percent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Percent {}

impl PartialOrd for Percent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Percent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

/// When a rule is tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RulePhase {
    /// Tried first. A successful safe rule is never backtracked over.
    Safe,
    /// Tried after safe rules, in order of success probability.
    Unsafe,
}

/// What a rule application contributes to a replayable script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptBuilder {
    tactic: String,
}

impl ScriptBuilder {
    /// A step that replays `tactic`.
    pub fn new(tactic: impl Into<String>) -> Self {
        Self { tactic: tactic.into() }
    }

    /// The tactic text.
    pub fn tactic(&self) -> &str {
        &self.tactic
    }
}

/// Everything a rule tactic is told about the goal it runs on.
#[derive(Debug, Clone, Copy)]
pub struct RuleTacticInput<'a> {
    /// The goal to work on. The engine is in the goal's state.
    pub goal: MVarId,
    /// Unassigned metavariables reachable from the goal.
    pub mvars: &'a BTreeSet<MVarId>,
    /// Where the index matched. Holds only `None` for unindexed rules.
    pub locations: &'a BTreeSet<IndexMatchLocation>,
    /// Options of the running search.
    pub options: &'a SearchOptions,
}

/// One successful application of a rule.
#[derive(Debug, Clone)]
pub struct RuleApplication<S> {
    /// Subgoals left open, all unassigned in `post_state`.
    pub goals: Vec<MVarId>,
    /// Engine state right after the rule fired.
    pub post_state: S,
    /// Script step, if the rule can produce one.
    pub script: Option<ScriptBuilder>,
    /// Overrides the rule's success probability.
    pub success_probability: Option<Percent>,
}

impl<S> RuleApplication<S> {
    /// Creates an application without script or probability override.
    pub fn new(goals: Vec<MVarId>, post_state: S) -> Self {
        Self {
            goals,
            post_state,
            script: None,
            success_probability: None,
        }
    }

    /// Attaches a script step.
    pub fn with_script(mut self, script: ScriptBuilder) -> Self {
        self.script = Some(script);
        self
    }

    /// Sets the success probability of this application.
    pub fn with_probability(mut self, p: Percent) -> Self {
        self.success_probability = Some(p);
        self
    }
}

/// The procedure behind a rule.
///
/// Tactics may freely change the engine: the search restores the state it
/// needs afterwards. Returning an error or no applications means the rule
/// does not apply.
pub trait RuleTactic<E: ProofEngine> {
    /// Runs the tactic on `input.goal`.
    fn run(&self, engine: &mut E, input: &RuleTacticInput<'_>) -> Result<Vec<RuleApplication<E::Snapshot>>>;
}

impl<E, F> RuleTactic<E> for F
where
    E: ProofEngine,
    F: Fn(&mut E, &RuleTacticInput<'_>) -> Result<Vec<RuleApplication<E::Snapshot>>>,
{
    fn run(&self, engine: &mut E, input: &RuleTacticInput<'_>) -> Result<Vec<RuleApplication<E::Snapshot>>> {
        self(engine, input)
    }
}

type Generator<E> = Box<dyn Fn(&E, &GoalView) -> Vec<(String, f64)>>;
type Runner<E> = Box<dyn Fn(&mut E, MVarId, &str) -> Result<Vec<MVarId>>>;

/// A tactic built from textual suggestions.
///
/// The generator proposes `(tactic, probability)` pairs for a goal. Each
/// suggestion is run from the goal's state; every one that succeeds becomes
/// an application with the suggested probability. Suggestions with a
/// probability outside `[0, 1]` are skipped.
pub struct TacGen<E: ProofEngine> {
    generator: Generator<E>,
    runner: Runner<E>,
}

impl<E: ProofEngine> TacGen<E> {
    /// Creates a generator-driven tactic.
    pub fn new<G, R>(generator: G, runner: R) -> Self
    where
        G: Fn(&E, &GoalView) -> Vec<(String, f64)> + 'static,
        R: Fn(&mut E, MVarId, &str) -> Result<Vec<MVarId>> + 'static,
    {
        Self {
            generator: Box::new(generator),
            runner: Box::new(runner),
        }
    }
}

impl<E: ProofEngine> RuleTactic<E> for TacGen<E> {
    fn run(&self, engine: &mut E, input: &RuleTacticInput<'_>) -> Result<Vec<RuleApplication<E::Snapshot>>> {
        let view = engine.goal_view(input.goal)?;
        let pre = engine.save_state();
        let mut apps = Vec::new();
        for (text, p) in (self.generator)(engine, &view) {
            let Ok(probability) = Percent::new(p) else {
                warn!("Skipping suggestion '{}': invalid probability {}", text, p);
                continue;
            };
            engine.restore_state(&pre);
            match (self.runner)(engine, input.goal, &text) {
                Ok(goals) => apps.push(
                    RuleApplication::new(goals, engine.save_state())
                        .with_script(ScriptBuilder::new(text))
                        .with_probability(probability),
                ),
                Err(e) => debug!("Suggestion '{}' failed on {}: {}", text, input.goal, e),
            }
        }
        engine.restore_state(&pre);
        if apps.is_empty() {
            return Err(Error::RuleFailed(format!("no suggestion applied to {}", input.goal)));
        }
        Ok(apps)
    }
}

/// A rule of a [`RuleSet`].
pub struct Rule<E: ProofEngine> {
    /// Unique name within the rule set.
    pub name: String,
    /// Phase the rule runs in.
    pub phase: RulePhase,
    /// Estimated chance that an application leads to a proof.
    pub success_probability: Percent,
    /// Tie-break among rules of equal probability (higher first).
    pub priority: i32,
    /// How the rule is indexed.
    pub index: IndexSpec,
    tactic: Box<dyn RuleTactic<E>>,
}

impl<E: ProofEngine> fmt::Debug for Rule<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("success_probability", &self.success_probability)
            .field("priority", &self.priority)
            .field("index", &self.index)
            .field("tactic", &"<tactic>")
            .finish()
    }
}

impl<E: ProofEngine> Rule<E> {
    /// Starts a safe rule.
    pub fn safe(name: impl Into<String>, tactic: impl RuleTactic<E> + 'static) -> RuleBuilder<E> {
        RuleBuilder::new(name, RulePhase::Safe, 1.0, tactic)
    }

    /// Starts an unsafe rule with the given success probability.
    pub fn unsafe_rule(
        name: impl Into<String>,
        probability: f64,
        tactic: impl RuleTactic<E> + 'static,
    ) -> RuleBuilder<E> {
        RuleBuilder::new(name, RulePhase::Unsafe, probability, tactic)
    }

    /// Runs the rule's tactic.
    pub fn apply(&self, engine: &mut E, input: &RuleTacticInput<'_>) -> Result<Vec<RuleApplication<E::Snapshot>>> {
        self.tactic.run(engine, input)
    }

    /// Returns `true` for safe rules.
    pub fn is_safe(&self) -> bool {
        self.phase == RulePhase::Safe
    }

    /// Order in which candidates are tried: safe first, then more likely,
    /// then higher priority, then by name.
    pub fn try_order(&self, other: &Self) -> Ordering {
        self.phase
            .cmp(&other.phase)
            .then_with(|| other.success_probability.cmp(&self.success_probability))
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// A builder for creating [`Rule`]s using a fluent API.
pub struct RuleBuilder<E: ProofEngine> {
    name: String,
    phase: RulePhase,
    probability: f64,
    priority: i32,
    index: IndexSpec,
    tactic: Box<dyn RuleTactic<E>>,
}

impl<E: ProofEngine> RuleBuilder<E> {
    fn new(name: impl Into<String>, phase: RulePhase, probability: f64, tactic: impl RuleTactic<E> + 'static) -> Self {
        Self {
            name: name.into(),
            phase,
            probability,
            priority: 0,
            index: IndexSpec::Unindexed,
            tactic: Box::new(tactic),
        }
    }

    /// Sets the priority.
    pub fn priority(mut self, p: i32) -> Self {
        self.priority = p;
        self
    }

    /// Also match goals whose target fits `pattern`.
    pub fn index_target(self, pattern: Expr) -> Self {
        self.index(IndexSpec::Target(pattern))
    }

    /// Also match goals with a hypothesis fitting `pattern`.
    pub fn index_hyps(self, pattern: Expr) -> Self {
        self.index(IndexSpec::Hyps(pattern))
    }

    /// Adds an index spec. Several specs are combined with `Or`.
    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.index = match std::mem::take(&mut self.index) {
            IndexSpec::Unindexed => spec,
            IndexSpec::Or(mut specs) => {
                specs.push(spec);
                IndexSpec::Or(specs)
            }
            current => IndexSpec::Or(vec![current, spec]),
        };
        self
    }

    /// Builds the rule.
    pub fn build(self) -> Result<Rule<E>> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRule("rule name must not be empty".into()));
        }
        Ok(Rule {
            name: self.name,
            phase: self.phase,
            success_probability: Percent::new(self.probability)?,
            priority: self.priority,
            index: self.index,
            tactic: self.tactic,
        })
    }
}

/// A collection of rules indexed with one set of reductions.
pub struct RuleSet<E: ProofEngine> {
    /// Name of this rule set.
    pub name: String,
    reductions: Reductions,
    rules: Vec<Rule<E>>,
    modes: Vec<IndexingMode>,
    by_name: HashMap<String, usize>,
    index: RuleIndex<usize>,
}

impl<E: ProofEngine> fmt::Debug for RuleSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field("reductions", &self.reductions)
            .field("rules", &self.rules)
            .finish()
    }
}

impl<E: ProofEngine> RuleSet<E> {
    /// Creates an empty rule set with simple reductions.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_reductions(name, Reductions::simple())
    }

    /// Creates an empty rule set keyed with `reductions`.
    pub fn with_reductions(name: impl Into<String>, reductions: Reductions) -> Self {
        Self {
            name: name.into(),
            reductions,
            rules: Vec::new(),
            modes: Vec::new(),
            by_name: HashMap::new(),
            index: RuleIndex::new(),
        }
    }

    /// Adds a rule. Names must be unique.
    pub fn add(&mut self, rule: Rule<E>) -> Result<()> {
        if self.by_name.contains_key(&rule.name) {
            return Err(Error::InvalidRule(format!("duplicate rule name '{}'", rule.name)));
        }
        let id = self.rules.len();
        let mode = rule.index.build(&self.reductions);
        debug!("Indexing rule '{}' as {:?}", rule.name, mode);
        self.index.insert(&mode, id);
        self.by_name.insert(rule.name.clone(), id);
        self.modes.push(mode);
        self.rules.push(rule);
        Ok(())
    }

    /// Adds a rule, builder style.
    pub fn with(mut self, rule: Rule<E>) -> Result<Self> {
        self.add(rule)?;
        Ok(self)
    }

    /// The reductions used for every key of this set.
    pub fn reductions(&self) -> &Reductions {
        &self.reductions
    }

    /// Returns the rule with id `id`.
    pub fn rule(&self, id: usize) -> Option<&Rule<E>> {
        self.rules.get(id)
    }

    /// Finds a rule by name.
    pub fn get(&self, name: &str) -> Option<&Rule<E>> {
        self.by_name.get(name).and_then(|&id| self.rules.get(id))
    }

    /// Returns the built indexing mode of rule `id`.
    pub fn mode(&self, id: usize) -> Option<&IndexingMode> {
        self.modes.get(id)
    }

    /// Rules matching `goal`, in the order they should be tried.
    pub fn applicable_rules(&self, goal: &GoalView) -> Vec<IndexMatchResult<usize>> {
        let mut found = self.index.applicable(goal, &self.reductions);
        found.sort_by(|a, b| self.rules[a.rule].try_order(&self.rules[b.rule]));
        found
    }

    /// Iterates over the rules in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule<E>> {
        self.rules.iter()
    }

    /// Count of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
