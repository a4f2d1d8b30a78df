//! Validation of rule applications before they enter the proof tree.
//!
//! A rule application is only attached when every subgoal it reports is
//! known to the engine, listed once and still unassigned in the state the
//! rule produced. Anything else means the rule broke its contract.

use std::collections::BTreeSet;

use crate::engine::ProofEngine;
use crate::error::{Error, Result};
use crate::rule::RuleApplication;

/// Checks a rule application against the engine state it produced.
///
/// # Arguments
///
/// * `engine` - The engine. Left in the application's post state.
/// * `rule` - Name of the rule that produced `app`, for error reports.
/// * `app` - The application to check.
///
/// # Returns
///
/// `Ok(())` if the application may be attached, or a contract-violation
/// error naming the offending subgoal.
pub fn validate_application<E: ProofEngine>(
    engine: &mut E,
    rule: &str,
    app: &RuleApplication<E::Snapshot>,
) -> Result<()> {
    engine.restore_state(&app.post_state);
    let mut seen = BTreeSet::new();
    for &goal in &app.goals {
        if !seen.insert(goal) {
            return Err(Error::InvariantViolation(format!(
                "rule {} reported subgoal {} twice",
                rule, goal
            )));
        }
        if engine.is_assigned_or_delayed_assigned(goal) {
            return Err(Error::AssignedSubgoal {
                rule: rule.to_string(),
                goal,
            });
        }
        if engine.goal_view(goal).is_err() {
            return Err(Error::InvariantViolation(format!(
                "rule {} reported subgoal {} unknown to the engine",
                rule, goal
            )));
        }
    }
    Ok(())
}
