//! Configuration for proof searches.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How hard the index works to expose a term's head symbol before computing
/// its keys.
///
/// The same strength must be used when rules are indexed and when goals are
/// queried, otherwise matching rules are missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReductionStrength {
    /// Beta-reduction only.
    #[default]
    Simple,
    /// Beta-reduction plus unfolding of reducible definitions, including
    /// definitions registered for recursor computation rules.
    Powerful,
}

/// Defines the configuration for a proof search.
///
/// A limit of `0` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// The maximum number of goals the search tree may hold.
    pub max_goals: usize,
    /// The maximum number of rule applications the search tree may hold.
    pub max_rule_applications: usize,
    /// Goals at this depth or deeper are not expanded and become unprovable.
    pub max_rule_application_depth: usize,
    /// Reduction strength used for index key extraction.
    pub reduction_strength: ReductionStrength,
    /// Whether rule applications keep their script builders so that a
    /// replayable script can be assembled for the final proof.
    pub generate_script: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_goals: 0,
            max_rule_applications: 200,
            max_rule_application_depth: 30,
            reduction_strength: ReductionStrength::Simple,
            generate_script: false,
        }
    }
}

impl SearchOptions {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a configuration without any resource limit. Only useful for
    /// rule sets that are known to terminate.
    pub fn unlimited() -> Self {
        Self {
            max_goals: 0,
            max_rule_applications: 0,
            max_rule_application_depth: 0,
            ..Default::default()
        }
    }

    /// Returns a configuration with tight limits, for interactive use.
    pub fn quick() -> Self {
        Self {
            max_goals: 64,
            max_rule_applications: 32,
            max_rule_application_depth: 8,
            ..Default::default()
        }
    }

    /// Sets the maximum number of goals.
    pub fn with_max_goals(mut self, max: usize) -> Self {
        self.max_goals = max;
        self
    }

    /// Sets the maximum number of rule applications.
    pub fn with_max_rule_applications(mut self, max: usize) -> Self {
        self.max_rule_applications = max;
        self
    }

    /// Sets the maximum rule application depth.
    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_rule_application_depth = max;
        self
    }

    /// Sets the reduction strength used for index keys.
    pub fn with_reduction_strength(mut self, strength: ReductionStrength) -> Self {
        self.reduction_strength = strength;
        self
    }

    /// Enables or disables script generation.
    pub fn with_script(mut self, enabled: bool) -> Self {
        self.generate_script = enabled;
        self
    }

    /// Returns `true` if `count` is above a limit `max` (`0` = unlimited).
    pub(crate) fn exceeds(max: usize, count: usize) -> bool {
        max != 0 && count > max
    }

    /// Serializes the options into a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserializes options from a JSON string. Missing fields take their
    /// default values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the options to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SearchOptions::default();
        assert_eq!(options.max_goals, 0);
        assert_eq!(options.max_rule_applications, 200);
        assert_eq!(options.max_rule_application_depth, 30);
        assert_eq!(options.reduction_strength, ReductionStrength::Simple);
        assert!(!options.generate_script);
    }

    #[test]
    fn test_zero_means_unlimited() {
        assert!(!SearchOptions::exceeds(0, 1_000_000));
        assert!(!SearchOptions::exceeds(5, 5));
        assert!(SearchOptions::exceeds(5, 6));
    }

    #[test]
    fn test_builders() {
        let options = SearchOptions::quick()
            .with_max_goals(3)
            .with_max_depth(1)
            .with_reduction_strength(ReductionStrength::Powerful)
            .with_script(true);
        assert_eq!(options.max_goals, 3);
        assert_eq!(options.max_rule_application_depth, 1);
        assert_eq!(options.max_rule_applications, 32);
        assert_eq!(options.reduction_strength, ReductionStrength::Powerful);
        assert!(options.generate_script);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options = SearchOptions::from_json(r#"{ "max_goals": 7 }"#).unwrap();
        assert_eq!(options.max_goals, 7);
        assert_eq!(options.max_rule_applications, 200);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.json");
        let options = SearchOptions::unlimited().with_script(true);
        options.save(&path).unwrap();
        assert_eq!(SearchOptions::load(&path).unwrap(), options);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SearchOptions::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
