//! Error types for the AIngle proof search engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ReductionStrength;
use crate::expr::MVarId;

/// A specialized `Result` type for proof search operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The resource limit that stopped a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Limit {
    /// `max_goals` was exceeded.
    Goals,
    /// `max_rule_applications` was exceeded.
    RuleApplications,
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::Goals => write!(f, "maximum number of goals"),
            Limit::RuleApplications => write!(f, "maximum number of rule applications"),
        }
    }
}

/// Coarse classification of an [`Error`], used by callers to tell apart
/// outcomes that are a normal part of searching from broken invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A goal or rule-application limit was reached.
    ResourceExhaustion,
    /// The root goal became unprovable: every avenue was tried.
    ExhaustiveFailure,
    /// A rule or the tree broke an invariant. Always a bug somewhere.
    ContractViolation,
    /// The search was started on input it cannot accept.
    PreconditionViolation,
    /// A single rule did not apply to a goal.
    RuleFailure,
    /// Options could not be read, written or validated.
    Configuration,
}

/// Defines the errors that can occur while searching for a proof.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The search accumulated more goals or rule applications than allowed.
    #[error("Search limit reached: {limit} is {max}, but {count} were created")]
    ResourceExhausted {
        limit: Limit,
        max: usize,
        count: usize,
    },

    /// The root goal is unprovable with the given rules.
    #[error("No proof found: root goal is unprovable after {iterations} iterations")]
    NoProofFound { iterations: u64 },

    /// A rule returned a subgoal that is already assigned.
    #[error("Rule {rule} produced subgoal {goal} which is already assigned")]
    AssignedSubgoal { rule: String, goal: MVarId },

    /// The chosen rule application did not assign the goal it was applied to.
    #[error("Missing assignment for goal {0} during proof extraction")]
    MissingAssignment(MVarId),

    /// The extracted proof still mentions unassigned metavariables.
    #[error("Extracted proof contains unresolved metavariables: {0:?}")]
    UnresolvedMetavariables(Vec<MVarId>),

    /// The proof tree reached a state that should be impossible.
    #[error("Internal error: {0}")]
    InvariantViolation(String),

    /// The goal handed to the search is already solved.
    #[error("Goal {0} is already assigned")]
    GoalAlreadyAssigned(MVarId),

    /// The engine does not know the goal.
    #[error("Unknown goal {0}")]
    UnknownGoal(MVarId),

    /// The rule set was indexed with a different reduction strength than the
    /// search options ask for.
    #[error("Rule set was indexed with {rules:?} reduction but options request {options:?}")]
    ReductionMismatch {
        rules: ReductionStrength,
        options: ReductionStrength,
    },

    /// A rule tactic did not apply to a goal.
    #[error("Rule failed: {0}")]
    RuleFailed(String),

    /// A rule was defined incorrectly.
    #[error("Invalid rule definition: {0}")]
    InvalidRule(String),

    /// A success probability outside `[0, 1]`.
    #[error("Invalid success probability: {0}")]
    InvalidProbability(f64),

    /// Reading or writing options failed.
    #[error("IO error: {0}")]
    Io(String),

    /// An error occurred during data serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ResourceExhausted { .. } => ErrorKind::ResourceExhaustion,
            Error::NoProofFound { .. } => ErrorKind::ExhaustiveFailure,
            Error::AssignedSubgoal { .. }
            | Error::MissingAssignment(_)
            | Error::UnresolvedMetavariables(_)
            | Error::InvariantViolation(_) => ErrorKind::ContractViolation,
            Error::GoalAlreadyAssigned(_)
            | Error::UnknownGoal(_)
            | Error::ReductionMismatch { .. } => ErrorKind::PreconditionViolation,
            Error::RuleFailed(_) => ErrorKind::RuleFailure,
            Error::InvalidRule(_)
            | Error::InvalidProbability(_)
            | Error::Io(_)
            | Error::SerializationError(_) => ErrorKind::Configuration,
        }
    }

    /// Returns `true` for errors that indicate a broken invariant rather than
    /// a normal search outcome.
    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::ContractViolation
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ResourceExhausted {
            limit: Limit::Goals,
            max: 10,
            count: 11,
        };
        let msg = err.to_string();
        assert!(msg.contains("maximum number of goals"));
        assert!(msg.contains("11"));
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let exhausted = Error::ResourceExhausted {
            limit: Limit::RuleApplications,
            max: 1,
            count: 2,
        };
        let failed = Error::NoProofFound { iterations: 3 };
        assert_eq!(exhausted.kind(), ErrorKind::ResourceExhaustion);
        assert_eq!(failed.kind(), ErrorKind::ExhaustiveFailure);
        assert_ne!(exhausted.kind(), failed.kind());
    }

    #[test]
    fn test_contract_violations_are_internal() {
        let err = Error::AssignedSubgoal {
            rule: "bad".into(),
            goal: MVarId(4),
        };
        assert!(err.is_internal());
        assert!(Error::UnresolvedMetavariables(vec![MVarId(1)]).is_internal());
        assert!(!Error::GoalAlreadyAssigned(MVarId(0)).is_internal());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json: std::result::Result<serde_json::Value, _> = serde_json::from_str("{invalid}");
        let err: Error = json.unwrap_err().into();
        assert!(matches!(err, Error::SerializationError(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
