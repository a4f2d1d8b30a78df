//! Integration tests for the proof search
//!
//! Runs complete searches over the reference engine: success and failure
//! outcomes, limits, contract violations, shared metavariables, indexing
//! and the pluggable strategies.

use aingle_search::{
    BestFirst, BreadthFirst, BuiltinRules, Declaration, DepthFirst, Error, ErrorKind, Expr, GoalPriority,
    IndexMatchLocation, Limit, MetaContext, MVarId, Percent, ProofEngine, Result, Rule, RuleApplication, RuleSet,
    RuleTacticInput, Search, SearchOptions, Tree,
};
use std::collections::BTreeSet;

type Apps = Result<Vec<RuleApplication<MetaContext>>>;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn goal_target() -> Expr {
    Expr::constant("Goal")
}

/// Closes any goal with `done`.
fn close(ctx: &mut MetaContext, input: &RuleTacticInput<'_>) -> Apps {
    ctx.assign(input.goal, Expr::constant("done"));
    Ok(vec![RuleApplication::new(vec![], ctx.save_state())])
}

/// Reduces the goal to `Dead`, which no rule proves.
fn dead_end(ctx: &mut MetaContext, input: &RuleTacticInput<'_>) -> Apps {
    let sub = ctx.mk_goal(vec![], Expr::constant("Dead"));
    ctx.assign(input.goal, Expr::const_app("via", vec![Expr::mvar(sub)]));
    Ok(vec![RuleApplication::new(vec![sub], ctx.save_state())])
}

/// Reduces the goal to a copy of itself.
fn step(ctx: &mut MetaContext, input: &RuleTacticInput<'_>) -> Apps {
    let target = ctx.goal_view(input.goal)?.target;
    let sub = ctx.mk_goal(vec![], target);
    ctx.assign(input.goal, Expr::const_app("step", vec![Expr::mvar(sub)]));
    Ok(vec![RuleApplication::new(vec![sub], ctx.save_state())])
}

/// Reports a subgoal it has already solved.
fn cheat(ctx: &mut MetaContext, input: &RuleTacticInput<'_>) -> Apps {
    let sub = ctx.mk_goal(vec![], Expr::constant("Sub"));
    ctx.assign(sub, Expr::constant("sub"));
    ctx.assign(input.goal, Expr::const_app("via", vec![Expr::mvar(sub)]));
    Ok(vec![RuleApplication::new(vec![sub], ctx.save_state())])
}

fn run_with<P: GoalPriority>(rules: &RuleSet<MetaContext>, options: SearchOptions, priority: P) -> Result<Expr> {
    let mut ctx = MetaContext::new();
    let goal = ctx.mk_goal(vec![], goal_target());
    Search::new(rules, options)
        .with_priority(priority)
        .run(&mut ctx, goal)
        .map(|outcome| outcome.proof)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_single_rule_closes_root() {
    init();
    let rules = RuleSet::new("a")
        .with(Rule::safe("close", close).build().unwrap())
        .unwrap();

    let mut ctx = MetaContext::new();
    let goal = ctx.mk_goal(vec![], goal_target());
    let outcome = Search::new(&rules, SearchOptions::default())
        .run(&mut ctx, goal)
        .unwrap();

    assert_eq!(outcome.proof, Expr::constant("done"));
    assert_eq!(outcome.stats.iterations, 1);
    assert_eq!(ctx.extract_and_instantiate(goal), Some(Expr::constant("done")));
}

#[test]
fn test_failing_branch_is_recovered() {
    init();
    for (detour, direct) in [(0.9, 0.1), (0.1, 0.9)] {
        let rules = RuleSet::new("b")
            .with(
                Rule::unsafe_rule("detour", detour, dead_end)
                    .index_target(goal_target())
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .with(
                Rule::unsafe_rule("direct", direct, close)
                    .index_target(goal_target())
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let options = SearchOptions::default();
        assert_eq!(run_with(&rules, options.clone(), BestFirst).unwrap(), Expr::constant("done"));
        assert_eq!(run_with(&rules, options.clone(), DepthFirst).unwrap(), Expr::constant("done"));
        assert_eq!(run_with(&rules, options, BreadthFirst).unwrap(), Expr::constant("done"));
    }
}

#[test]
fn test_depth_limit_forces_unprovable() {
    init();
    let rules = RuleSet::new("c")
        .with(Rule::unsafe_rule("step", 0.5, step).build().unwrap())
        .unwrap();

    let mut ctx = MetaContext::new();
    let goal = ctx.mk_goal(vec![], goal_target());
    let mut search = Search::new(&rules, SearchOptions::default().with_max_depth(1));
    let err = search.run(&mut ctx, goal).unwrap_err();

    assert!(matches!(err, Error::NoProofFound { .. }));
    assert_eq!(err.kind(), ErrorKind::ExhaustiveFailure);
    assert_eq!(search.stats().forced_unprovable, 1);
    assert_eq!(search.stats().rule_applications, 1);
}

#[test]
fn test_assigned_subgoal_is_contract_violation() {
    init();
    let rules = RuleSet::new("d")
        .with(Rule::safe("cheat", cheat).build().unwrap())
        .unwrap();

    let mut ctx = MetaContext::new();
    let goal = ctx.mk_goal(vec![], goal_target());
    let mut search = Search::new(&rules, SearchOptions::default());
    let err = search.run(&mut ctx, goal).unwrap_err();

    assert!(matches!(err, Error::AssignedSubgoal { ref rule, .. } if rule == "cheat"));
    assert!(err.is_internal());
    assert_eq!(search.stats().rule_applications, 0);
    assert!(!ctx.is_assigned(goal));
    assert_eq!(ctx.goal_count(), 1);
}

// ============================================================================
// Limits
// ============================================================================

#[test]
fn test_rule_application_limit() {
    init();
    let rules = RuleSet::new("limits")
        .with(Rule::unsafe_rule("step", 0.5, step).build().unwrap())
        .unwrap();

    let options = SearchOptions::default().with_max_rule_applications(2);
    let err = run_with(&rules, options, BestFirst).unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceExhausted {
            limit: Limit::RuleApplications,
            max: 2,
            count: 3
        }
    ));
    assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
}

#[test]
fn test_goal_limit() {
    init();
    let rules = RuleSet::new("limits")
        .with(Rule::unsafe_rule("step", 0.5, step).build().unwrap())
        .unwrap();

    let options = SearchOptions::default().with_max_goals(3);
    assert!(matches!(
        run_with(&rules, options, BestFirst),
        Err(Error::ResourceExhausted {
            limit: Limit::Goals,
            max: 3,
            count: 4
        })
    ));
}

#[test]
fn test_exhaustion_and_failure_are_exclusive() {
    init();
    let rules = RuleSet::new("limits")
        .with(Rule::unsafe_rule("step", 0.5, step).build().unwrap())
        .unwrap();

    // The depth limit is hit long before the rule application limit.
    let shallow = SearchOptions::unlimited().with_max_depth(3);
    let err = run_with(&rules, shallow, BestFirst).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExhaustiveFailure);

    // The rule application limit is hit long before the depth limit.
    let narrow = SearchOptions::unlimited().with_max_rule_applications(3);
    let err = run_with(&rules, narrow, BestFirst).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
}

// ============================================================================
// Built-in rules
// ============================================================================

fn r(x: &str, y: &str) -> Expr {
    Expr::const_app("R", vec![Expr::constant(x), Expr::constant(y)])
}

/// trans : forall a b c, R a b -> R b c -> R a c
fn trans() -> Declaration {
    let rel = |x: u32, y: u32| Expr::const_app("R", vec![Expr::BVar(x), Expr::BVar(y)]);
    let t = || Expr::constant("T");
    Declaration::new(
        "trans",
        Expr::pi(
            t(),
            Expr::pi(t(), Expr::pi(t(), Expr::arrow(rel(2, 1), Expr::arrow(rel(1, 0), rel(2, 0))))),
        ),
    )
}

#[test]
fn test_shared_metavariables_are_solved_consistently() {
    init();
    let declarations = vec![trans(), Declaration::new("hxy", r("x", "y")), Declaration::new("hyz", r("y", "z"))];
    let rules = BuiltinRules::basic("trans", &declarations, 0.5).unwrap();

    let mut ctx = MetaContext::new();
    let goal = ctx.mk_goal(vec![], r("x", "z"));
    let outcome = Search::new(&rules, SearchOptions::default())
        .run(&mut ctx, goal)
        .unwrap();

    let c = Expr::constant;
    assert_eq!(
        outcome.proof,
        Expr::const_app("trans", vec![c("x"), c("y"), c("z"), c("hxy"), c("hyz")])
    );
    // Root, both premises, and one copy of each premise proven again after
    // the other one fixed the middle point.
    assert_eq!(outcome.stats.goals, 5);
}

#[test]
fn test_wrong_shared_assignment_is_recovered() {
    init();
    // `hxw` fits the first premise but leaves `R w z`, which nothing proves.
    let declarations = vec![
        trans(),
        Declaration::new("hxw", r("x", "w")),
        Declaration::new("hxy", r("x", "y")),
        Declaration::new("hyz", r("y", "z")),
    ];
    let rules = BuiltinRules::basic("trans", &declarations, 0.5).unwrap();

    let mut ctx = MetaContext::new();
    let goal = ctx.mk_goal(vec![], r("x", "z"));
    let outcome = Search::new(&rules, SearchOptions::default().with_script(true))
        .run(&mut ctx, goal)
        .unwrap();

    let c = Expr::constant;
    let proof = Expr::const_app("trans", vec![c("x"), c("y"), c("z"), c("hxy"), c("hyz")]);
    assert_eq!(outcome.proof, proof);
    assert_eq!(ctx.extract_and_instantiate(goal), Some(proof));
    let script = outcome.script.unwrap();
    assert_eq!(script.rules_used(), vec!["apply_trans", "exact_hyz", "exact_hxy"]);
}

#[test]
fn test_intro_and_assumption_build_lambda() {
    init();
    let rules = BuiltinRules::basic("logic", &[], 0.5).unwrap();
    let a = Expr::constant("A");
    let b = Expr::constant("B");

    let mut ctx = MetaContext::new();
    // A -> B -> A
    let goal = ctx.mk_goal(vec![], Expr::arrow(a.clone(), Expr::arrow(b.clone(), a.clone())));
    let outcome = Search::new(&rules, SearchOptions::default().with_script(true))
        .run(&mut ctx, goal)
        .unwrap();

    assert_eq!(outcome.proof, Expr::lam(a, Expr::lam(b, Expr::BVar(1))));
    let script = outcome.script.unwrap();
    assert_eq!(script.to_string(), "intro\nintro\nexact h0");
    assert_eq!(script.rules_used(), vec!["intro", "intro", "assumption"]);
}

#[test]
fn test_script_only_when_requested() {
    init();
    let rules = BuiltinRules::basic("logic", &[], 0.5).unwrap();
    let mut ctx = MetaContext::new();
    let goal = ctx.mk_goal(vec![], Expr::arrow(Expr::constant("A"), Expr::constant("A")));
    let outcome = Search::new(&rules, SearchOptions::default())
        .run(&mut ctx, goal)
        .unwrap();
    assert!(outcome.script.is_none());
}

#[test]
fn test_strategies_find_modus_ponens() {
    init();
    let declarations = vec![
        Declaration::new("f", Expr::arrow(Expr::constant("A"), Expr::constant("B"))),
        Declaration::new("a", Expr::constant("A")),
    ];
    let rules = BuiltinRules::basic("mp", &declarations, 0.5).unwrap();
    let expected = Expr::const_app("f", vec![Expr::constant("a")]);

    fn prove<P: GoalPriority>(rules: &RuleSet<MetaContext>, priority: P) -> Expr {
        let mut ctx = MetaContext::new();
        let goal = ctx.mk_goal(vec![], Expr::constant("B"));
        Search::new(rules, SearchOptions::default())
            .with_priority(priority)
            .run(&mut ctx, goal)
            .unwrap()
            .proof
    }

    assert_eq!(prove(&rules, BestFirst), expected);
    assert_eq!(prove(&rules, DepthFirst), expected);
    assert_eq!(prove(&rules, BreadthFirst), expected);
}

// ============================================================================
// Indexing
// ============================================================================

/// Proves `B` from a hypothesis `And A B` found by the index.
fn and_right(ctx: &mut MetaContext, input: &RuleTacticInput<'_>) -> Apps {
    let view = ctx.goal_view(input.goal)?;
    for location in input.locations {
        let IndexMatchLocation::Hyp(h) = location else {
            continue;
        };
        let Some(hyp) = view.hyps.iter().find(|d| d.fvar == *h) else {
            continue;
        };
        if hyp.ty.get_app_args().get(1) == Some(&view.target) {
            ctx.assign(input.goal, Expr::const_app("And.right", vec![Expr::fvar(*h)]));
            return Ok(vec![RuleApplication::new(vec![], ctx.save_state())]);
        }
    }
    Err(Error::RuleFailed("no conjunction ends in the target".into()))
}

#[test]
fn test_hypothesis_index_reports_locations() {
    init();
    let and = |x: Expr, y: Expr| Expr::const_app("And", vec![x, y]);
    let rules = RuleSet::new("hyps")
        .with(
            Rule::safe("and_right", and_right)
                .index_hyps(and(Expr::BVar(0), Expr::BVar(1)))
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut ctx = MetaContext::new();
    let h0 = ctx.mk_local("h0", Expr::constant("A"));
    let h1 = ctx.mk_local("h1", and(Expr::constant("A"), Expr::constant("B")));
    let goal = ctx.mk_goal(vec![h0, h1.clone()], Expr::constant("B"));

    let view = ctx.goal_view(goal).unwrap();
    let matches = rules.applicable_rules(&view);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].hyps().collect::<Vec<_>>(), vec![h1.fvar]);
    assert_eq!(rules.applicable_rules(&view), matches);

    let outcome = Search::new(&rules, SearchOptions::default())
        .run(&mut ctx, goal)
        .unwrap();
    assert_eq!(outcome.proof, Expr::const_app("And.right", vec![Expr::fvar(h1.fvar)]));
}

#[test]
fn test_unmatched_goal_has_no_proof() {
    init();
    let rules = RuleSet::new("indexed")
        .with(
            Rule::safe("close", close)
                .index_target(Expr::constant("Other"))
                .build()
                .unwrap(),
        )
        .unwrap();
    let err = run_with(&rules, SearchOptions::default(), BestFirst).unwrap_err();
    assert!(matches!(err, Error::NoProofFound { iterations: 1 }));
}

// ============================================================================
// Generated suggestions
// ============================================================================

#[test]
fn test_tac_gen_rule() {
    init();
    let declarations = vec![
        Declaration::new("f", Expr::arrow(Expr::constant("A"), Expr::constant("B"))),
        Declaration::new("a", Expr::constant("A")),
    ];
    let suggestions = |_: &MetaContext, _: &aingle_search::GoalView| {
        vec![
            ("exact missing".to_string(), 0.9),
            ("apply f".to_string(), 1.5),
            ("apply f".to_string(), 0.6),
            ("exact a".to_string(), 0.8),
        ]
    };
    let rules = RuleSet::new("gen")
        .with(BuiltinRules::tac_gen("suggest", 0.5, declarations, suggestions).unwrap())
        .unwrap();

    let mut ctx = MetaContext::new();
    let goal = ctx.mk_goal(vec![], Expr::constant("B"));
    let outcome = Search::new(&rules, SearchOptions::default().with_script(true))
        .run(&mut ctx, goal)
        .unwrap();

    assert_eq!(outcome.proof, Expr::const_app("f", vec![Expr::constant("a")]));
    assert_eq!(outcome.script.unwrap().to_string(), "apply f\nexact a");
    assert_eq!(outcome.stats.rule_applications, 2);
}

// ============================================================================
// Tree invariants
// ============================================================================

#[test]
fn test_depth_grows_by_one() {
    let mut tree = Tree::new(MVarId(0), BTreeSet::new(), ());
    let child = |m| aingle_search::tree::NewGoal {
        mvar: MVarId(m),
        mvars: BTreeSet::new(),
        origin: None,
    };
    let half = Percent::new(0.5).unwrap();
    let r1 = tree.add_rapp(tree.root(), "split", half, (), None, vec![child(1), child(2)]);
    let g1 = tree.rapp(r1).goals[0];
    let r2 = tree.add_rapp(g1, "split", half, (), None, vec![child(3)]);

    for rapp in [r1, r2] {
        let parent = tree.goal(tree.rapp(rapp).parent).depth;
        for g in &tree.rapp(rapp).goals {
            assert_eq!(tree.goal(*g).depth, parent + 1);
        }
    }
    assert_eq!(tree.goal(tree.rapp(r2).goals[0]).success_probability, half * half);
}
