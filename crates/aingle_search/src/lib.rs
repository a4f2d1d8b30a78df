//! AIngle Search - Best-First Proof Search
//!
//! This crate searches for proofs of goals by applying rules backwards.
//! Every rule application splits a goal into subgoals; the search keeps all
//! attempts in an AND-OR tree and always expands the goal that looks most
//! likely to lead to a proof.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Proof Search                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Scheduler                           │   │
//! │  │  Goal Queue │ Best/Depth/Breadth First │ Limits      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Rules                               │   │
//! │  │  Discrimination Tree │ Rule Tactics │ TacGen         │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Proof Tree                          │   │
//! │  │  Goals │ Rule Applications │ Clusters │ Extraction   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Proof Engine                        │   │
//! │  │  Snapshots │ Assignments │ Unification              │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use aingle_search::{BuiltinRules, Declaration, Expr, MetaContext, Search, SearchOptions};
//!
//! // modus ponens: from `f : A -> B` and `a : A`, prove `B`
//! let declarations = vec![
//!     Declaration::new("f", Expr::arrow(Expr::constant("A"), Expr::constant("B"))),
//!     Declaration::new("a", Expr::constant("A")),
//! ];
//! let rules = BuiltinRules::basic("example", &declarations, 0.5).unwrap();
//!
//! let mut ctx = MetaContext::new();
//! let goal = ctx.mk_goal(vec![], Expr::constant("B"));
//!
//! let outcome = Search::new(&rules, SearchOptions::default())
//!     .run(&mut ctx, goal)
//!     .unwrap();
//! assert_eq!(outcome.proof, Expr::const_app("f", vec![Expr::constant("a")]));
//! ```

pub mod builtin;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod index;
pub mod meta;
pub mod proof;
pub mod queue;
pub mod rule;
pub mod search;
pub mod tree;
pub mod validator;

// Re-exports
pub use builtin::{BuiltinRules, Declaration};
pub use config::{ReductionStrength, SearchOptions};
pub use engine::{GoalView, LocalDecl, ProofEngine};
pub use error::{Error, ErrorKind, Limit, Result};
pub use expr::{Expr, FVarId, Literal, MVarId, Name};
pub use index::{IndexMatchLocation, IndexMatchResult, IndexSpec, IndexingMode, Reductions};
pub use meta::MetaContext;
pub use proof::{extract_proof, ExtractedProof, Script, ScriptStep};
pub use queue::{BestFirst, BreadthFirst, DepthFirst, GoalPriority};
pub use rule::{
    Percent, Rule, RuleApplication, RulePhase, RuleSet, RuleTactic, RuleTacticInput, ScriptBuilder, TacGen,
};
pub use search::{search, Search, SearchOutcome, SearchStats};
pub use tree::{GoalId, GoalStatus, NodeStatus, RappId, Tree, Unprovability};
pub use validator::validate_application;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
