//! Rule indexing.
//!
//! Each rule is keyed by the shape of the goals it can apply to. Before a
//! goal is expanded, the index narrows the rule set down to the rules whose
//! keys are compatible with the goal's target or one of its hypotheses,
//! and reports where each rule matched.
//!
//! Keys are read off terms after head reduction with a fixed
//! [`Reductions`]. Rules and goals must be keyed with the same reductions,
//! otherwise matching rules are missed.

mod discr_tree;
mod keys;
mod mode;

pub use discr_tree::{DiscrTree, RuleIndex};
pub use keys::{keys_compatible, Definition, Key, Reductions};
pub use mode::{IndexMatchLocation, IndexMatchResult, IndexSpec, IndexingMode};
