//! Classified intents and the goal predicates they resolve to.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{Condition, Parameters, State};

/// A classified user goal: label, classifier confidence, extracted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub label: String,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub parameters: Parameters,
}

impl Intent {
    /// Create an intent; confidence is clamped into `[0, 1]`.
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            parameters: Parameters::new(),
        }
    }

    /// Add an extracted parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// A conjunction of conditions the planner must make true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPredicate {
    pub conditions: Vec<Condition>,
    /// Labels of the intents this goal serves.
    pub intents: Vec<String>,
    /// Parameter context available to actions planned for this goal.
    #[serde(default)]
    pub parameters: Parameters,
}

impl GoalPredicate {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            intents: Vec::new(),
            parameters: Parameters::new(),
        }
    }

    pub fn for_intent(mut self, label: impl Into<String>) -> Self {
        self.intents.push(label.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn is_satisfied_by(&self, state: &State) -> bool {
        state.satisfies_all(&self.conditions)
    }

    /// The state variables this goal constrains.
    pub fn variables(&self) -> BTreeSet<&str> {
        self.conditions.iter().map(|c| c.var.as_str()).collect()
    }

    pub fn shares_variables_with(&self, other: &GoalPredicate) -> bool {
        let mine = self.variables();
        other.conditions.iter().any(|c| mine.contains(c.var.as_str()))
    }

    /// Conjoin `other` into `self`.
    ///
    /// Duplicate conditions collapse; parameters already present in `self`
    /// win over those of `other`. Returns the first pair of conditions that
    /// can never hold together, if any.
    pub fn conjoin(&mut self, other: GoalPredicate) -> Result<(), (Condition, Condition)> {
        for cond in other.conditions {
            if let Some(clash) = self.conditions.iter().find(|c| c.conflicts_with(&cond)) {
                return Err((clash.clone(), cond));
            }
            if !self.conditions.contains(&cond) {
                self.conditions.push(cond);
            }
        }
        for label in other.intents {
            if !self.intents.contains(&label) {
                self.intents.push(label);
            }
        }
        for (k, v) in other.parameters {
            self.parameters.entry(k).or_insert(v);
        }
        Ok(())
    }
}
