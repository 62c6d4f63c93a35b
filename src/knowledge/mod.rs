//! Knowledge base: the static registry of action schemas and intent goals.
//!
//! Actions describe what the assistant can do (preconditions, effects, cost,
//! parameter contract, data slots they consume and produce). Goal templates map
//! an intent label to the conjunction of state conditions that fulfils it, with
//! intent parameters substituted into the condition values. Adding an intent or
//! an action is a data change: the planner never branches on labels.
//!
//! The knowledge base is immutable once built and is shared across concurrent
//! requests behind an `Arc`.

pub mod catalog;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::intent::{GoalPredicate, Intent};
use crate::state::{Condition, Effect, EffectValue, Fact, State};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from knowledge-base construction and lookup.
#[derive(Debug, Error, Diagnostic)]
pub enum KnowledgeError {
    #[error("unknown intent: \"{label}\"")]
    #[diagnostic(
        code(talky::knowledge::unknown_intent),
        help(
            "No goal template is registered for this intent label. Register one with \
             `KnowledgeBaseBuilder::goal(...)`, or add a `[[goals]]` entry to the catalog."
        )
    )]
    UnknownIntent { label: String },

    #[error("action not found: \"{id}\"")]
    #[diagnostic(
        code(talky::knowledge::action_not_found),
        help("List registered actions with `talky actions`.")
    )]
    ActionNotFound { id: String },

    #[error("duplicate action id: \"{id}\"")]
    #[diagnostic(
        code(talky::knowledge::duplicate_action),
        help("Action ids must be unique within one knowledge base.")
    )]
    DuplicateAction { id: String },

    #[error("duplicate goal template for intent \"{intent}\"")]
    #[diagnostic(
        code(talky::knowledge::duplicate_goal),
        help("Each intent label maps to exactly one goal template.")
    )]
    DuplicateGoal { intent: String },

    #[error("action \"{id}\" has invalid cost {cost}")]
    #[diagnostic(
        code(talky::knowledge::invalid_cost),
        help("Action costs must be finite and non-negative.")
    )]
    InvalidCost { id: String, cost: f64 },

    #[error("action \"{action}\" references undeclared parameter \"{param}\"")]
    #[diagnostic(
        code(talky::knowledge::undeclared_param),
        help("Declare the parameter in the action's `params` list before using it in an effect.")
    )]
    UndeclaredParam { action: String, param: String },

    #[error("action \"{action}\" consumes slot \"{slot}\" that nothing can supply")]
    #[diagnostic(
        code(talky::knowledge::unsatisfiable_input),
        help(
            "A consumed slot must be produced by some registered action or be one of the \
             action's own parameters."
        )
    )]
    UnsatisfiableInput { action: String, slot: String },

    #[error("ordering constraint references unknown action \"{referenced}\" (from \"{action}\")")]
    #[diagnostic(
        code(talky::knowledge::unknown_ordering_action),
        help("Both sides of an ordering constraint must be registered actions.")
    )]
    UnknownOrderingAction { action: String, referenced: String },

    #[error("intent \"{intent}\" is missing parameter \"{param}\" required by its goal")]
    #[diagnostic(
        code(talky::knowledge::missing_goal_parameter),
        help("The classifier did not extract this parameter. Ask the user for it, or mark the binding optional.")
    )]
    MissingGoalParameter { intent: String, param: String },

    #[error("failed to read catalog: {path}")]
    #[diagnostic(
        code(talky::knowledge::catalog_read),
        help("Ensure the catalog file exists and is readable.")
    )]
    CatalogRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {message}")]
    #[diagnostic(
        code(talky::knowledge::catalog_parse),
        help("Check the TOML syntax of the catalog (`[[actions]]`, `[[goals]]`, `[[ordering]]`).")
    )]
    CatalogParse { message: String },
}

/// Convenience alias.
pub type KnowledgeResult<T> = std::result::Result<T, KnowledgeError>;

// ---------------------------------------------------------------------------
// Action schemas
// ---------------------------------------------------------------------------

/// Declared type of an action parameter, checked when a plan-time value is
/// bound to it. Values taken from earlier steps are only known at run time
/// and pass unchecked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// A string, or a number used as text (room numbers, course codes).
    #[default]
    Text,
    Integer,
    Boolean,
    /// A date or datetime as the classifier extracted it, always a string.
    Date,
    Any,
}

impl ParamKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Text => value.is_string() || value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Date => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// A single parameter in an action's contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub kind: ParamKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

fn default_cost() -> f64 {
    1.0
}

/// Description of one action the assistant can invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSchema {
    /// Unique identifier, also the name passed to the invoker.
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Ordered parameter contract.
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Conditions that must hold for the action to be applicable.
    #[serde(default)]
    pub preconditions: Vec<Condition>,
    /// State mutations applied on success.
    #[serde(default)]
    pub effects: Vec<Effect>,
    /// Search edge cost (non-negative).
    #[serde(default = "default_cost")]
    pub cost: f64,
    /// Data slots this action reads from earlier steps.
    #[serde(default)]
    pub consumes: Vec<String>,
    /// Data slots this action's result supplies to later steps.
    #[serde(default)]
    pub produces: Vec<String>,
    /// Actions that, when both appear in a plan, must finish before this one.
    #[serde(default)]
    pub after: Vec<String>,
}

impl ActionSchema {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            params: Vec::new(),
            preconditions: Vec::new(),
            effects: Vec::new(),
            cost: default_cost(),
            consumes: Vec::new(),
            produces: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional_param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn requires(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn consumes(mut self, slot: impl Into<String>) -> Self {
        self.consumes.push(slot.into());
        self
    }

    pub fn produces(mut self, slot: impl Into<String>) -> Self {
        self.produces.push(slot.into());
        self
    }

    pub fn after(mut self, action: impl Into<String>) -> Self {
        self.after.push(action.into());
        self
    }

    /// Whether all preconditions hold in `state`.
    pub fn is_applicable(&self, state: &State) -> bool {
        state.satisfies_all(&self.preconditions)
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

// ---------------------------------------------------------------------------
// Goal templates
// ---------------------------------------------------------------------------

/// Binds a goal variable to the value of an intent parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamBinding {
    pub var: String,
    pub param: String,
    /// Skip the condition instead of failing when the parameter is absent.
    #[serde(default)]
    pub optional: bool,
}

/// Maps one intent label to its goal conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalTemplate {
    pub intent: String,
    /// Fixed conditions.
    #[serde(default)]
    pub require: Vec<Condition>,
    /// Conditions whose expected value comes from the intent's parameters.
    #[serde(default)]
    pub bind: Vec<ParamBinding>,
}

impl GoalTemplate {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            require: Vec::new(),
            bind: Vec::new(),
        }
    }

    pub fn require(mut self, condition: Condition) -> Self {
        self.require.push(condition);
        self
    }

    pub fn bind(mut self, var: impl Into<String>, param: impl Into<String>) -> Self {
        self.bind.push(ParamBinding {
            var: var.into(),
            param: param.into(),
            optional: false,
        });
        self
    }

    /// Substitute `intent`'s parameters into this template.
    pub fn instantiate(&self, intent: &Intent) -> KnowledgeResult<GoalPredicate> {
        let mut conditions = self.require.clone();
        for binding in &self.bind {
            match intent.parameters.get(&binding.param).filter(|v| !v.is_null()) {
                Some(value) => {
                    conditions.push(Condition::equals(&binding.var, Fact::from_json(value)))
                }
                None if binding.optional => {}
                None => {
                    return Err(KnowledgeError::MissingGoalParameter {
                        intent: intent.label.clone(),
                        param: binding.param.clone(),
                    });
                }
            }
        }
        Ok(GoalPredicate::new(conditions)
            .for_intent(&intent.label)
            .with_parameters(intent.parameters.clone()))
    }
}

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

/// An explicit "must finish `before` prior to starting `after`" pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingConstraint {
    pub before: String,
    pub after: String,
}

/// Immutable registry of actions, goal templates and ordering constraints.
pub struct KnowledgeBase {
    actions: Vec<ActionSchema>,
    index: HashMap<String, usize>,
    goals: HashMap<String, GoalTemplate>,
    /// `(before, after)` pairs of action indices.
    ordering: HashSet<(usize, usize)>,
    min_cost: f64,
    max_effects: usize,
}

impl KnowledgeBase {
    pub fn builder() -> KnowledgeBaseBuilder {
        KnowledgeBaseBuilder::default()
    }

    /// Resolve an intent to its goal predicate.
    pub fn resolve_goal(&self, intent: &Intent) -> KnowledgeResult<GoalPredicate> {
        let template =
            self.goals
                .get(&intent.label)
                .ok_or_else(|| KnowledgeError::UnknownIntent {
                    label: intent.label.clone(),
                })?;
        template.instantiate(intent)
    }

    /// Look up an action by id.
    pub fn action(&self, id: &str) -> KnowledgeResult<&ActionSchema> {
        self.index
            .get(id)
            .map(|&i| &self.actions[i])
            .ok_or_else(|| KnowledgeError::ActionNotFound { id: id.into() })
    }

    /// Declaration index of an action.
    pub fn action_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All actions in declaration order.
    pub fn actions(&self) -> &[ActionSchema] {
        &self.actions
    }

    /// Registered goal templates (arbitrary order).
    pub fn goal_templates(&self) -> impl Iterator<Item = &GoalTemplate> {
        self.goals.values()
    }

    /// Whether `before` must finish before `after` starts whenever both run.
    pub fn ordering_constrained(&self, before: &str, after: &str) -> bool {
        match (self.action_index(before), self.action_index(after)) {
            (Some(b), Some(a)) => self.ordering.contains(&(b, a)),
            _ => false,
        }
    }

    /// The action to run directly for an intent that has no goal template.
    ///
    /// Only intents whose label names an action qualify.
    pub fn direct_action(&self, intent: &Intent) -> Option<&ActionSchema> {
        self.action(&intent.label).ok()
    }

    /// Cheapest action cost (0 for an empty knowledge base).
    pub fn min_action_cost(&self) -> f64 {
        self.min_cost
    }

    /// Largest number of effects any single action has (at least 1).
    pub fn max_effects(&self) -> usize {
        self.max_effects
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Parse a TOML catalog.
    pub fn from_toml_str(toml_str: &str) -> KnowledgeResult<Self> {
        let file: CatalogFile =
            toml::from_str(toml_str).map_err(|e| KnowledgeError::CatalogParse {
                message: e.to_string(),
            })?;
        let mut builder = Self::builder();
        for action in file.actions {
            builder = builder.action(action);
        }
        for goal in file.goals {
            builder = builder.goal(goal);
        }
        for pair in file.ordering {
            builder = builder.order(pair.before, pair.after);
        }
        builder.build()
    }

    /// Read and parse a TOML catalog file.
    pub fn from_toml_file(path: &Path) -> KnowledgeResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| KnowledgeError::CatalogRead {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&content)
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field(
                "actions",
                &self.actions.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            )
            .field("goals", &self.goals.len())
            .field("ordering", &self.ordering.len())
            .finish()
    }
}

/// On-disk catalog layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    actions: Vec<ActionSchema>,
    #[serde(default)]
    goals: Vec<GoalTemplate>,
    #[serde(default)]
    ordering: Vec<OrderingConstraint>,
}

/// Collects registrations and validates them into a [`KnowledgeBase`].
#[derive(Debug, Default)]
pub struct KnowledgeBaseBuilder {
    actions: Vec<ActionSchema>,
    goals: Vec<GoalTemplate>,
    ordering: Vec<OrderingConstraint>,
}

impl KnowledgeBaseBuilder {
    pub fn action(mut self, action: ActionSchema) -> Self {
        self.actions.push(action);
        self
    }

    pub fn goal(mut self, template: GoalTemplate) -> Self {
        self.goals.push(template);
        self
    }

    /// Declare that `before` must finish before `after` starts.
    pub fn order(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.ordering.push(OrderingConstraint {
            before: before.into(),
            after: after.into(),
        });
        self
    }

    pub fn build(self) -> KnowledgeResult<KnowledgeBase> {
        let mut index = HashMap::with_capacity(self.actions.len());
        for (i, action) in self.actions.iter().enumerate() {
            if index.insert(action.id.clone(), i).is_some() {
                return Err(KnowledgeError::DuplicateAction {
                    id: action.id.clone(),
                });
            }
            if !action.cost.is_finite() || action.cost < 0.0 {
                return Err(KnowledgeError::InvalidCost {
                    id: action.id.clone(),
                    cost: action.cost,
                });
            }
            for effect in &action.effects {
                if let Effect::Set {
                    value: EffectValue::Param(param),
                    ..
                } = effect
                {
                    if action.param_spec(param).is_none() {
                        return Err(KnowledgeError::UndeclaredParam {
                            action: action.id.clone(),
                            param: param.clone(),
                        });
                    }
                }
            }
        }

        let produced: HashSet<&str> = self
            .actions
            .iter()
            .flat_map(|a| a.produces.iter().map(String::as_str))
            .collect();
        for action in &self.actions {
            for slot in &action.consumes {
                if !produced.contains(slot.as_str()) && action.param_spec(slot).is_none() {
                    return Err(KnowledgeError::UnsatisfiableInput {
                        action: action.id.clone(),
                        slot: slot.clone(),
                    });
                }
            }
        }

        let mut ordering = HashSet::new();
        let declared = self.ordering.iter().map(|c| (c.before.as_str(), c.after.as_str()));
        let inline = self
            .actions
            .iter()
            .flat_map(|a| a.after.iter().map(move |b| (b.as_str(), a.id.as_str())));
        for (before, after) in declared.chain(inline) {
            let lookup = |id: &str| {
                index
                    .get(id)
                    .copied()
                    .ok_or_else(|| KnowledgeError::UnknownOrderingAction {
                        action: after.to_string(),
                        referenced: id.to_string(),
                    })
            };
            ordering.insert((lookup(before)?, lookup(after)?));
        }

        let mut goals = HashMap::with_capacity(self.goals.len());
        for template in self.goals {
            let intent = template.intent.clone();
            if goals.insert(intent.clone(), template).is_some() {
                return Err(KnowledgeError::DuplicateGoal { intent });
            }
        }

        let min_cost = self
            .actions
            .iter()
            .map(|a| a.cost)
            .fold(f64::INFINITY, f64::min);
        let max_effects = self
            .actions
            .iter()
            .map(|a| a.effects.len())
            .max()
            .unwrap_or(1)
            .max(1);

        tracing::debug!(
            actions = self.actions.len(),
            goals = goals.len(),
            ordering = ordering.len(),
            "knowledge base built"
        );

        Ok(KnowledgeBase {
            actions: self.actions,
            index,
            goals,
            ordering,
            min_cost: if min_cost.is_finite() { min_cost } else { 0.0 },
            max_effects,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn param_kinds_accept_matching_values() {
        assert!(ParamKind::Text.accepts(&json!("B-204")));
        assert!(ParamKind::Text.accepts(&json!(204)));
        assert!(!ParamKind::Text.accepts(&json!(["a"])));
        assert!(ParamKind::Integer.accepts(&json!(2)));
        assert!(!ParamKind::Integer.accepts(&json!(2.5)));
        assert!(!ParamKind::Integer.accepts(&json!("two")));
        assert!(ParamKind::Boolean.accepts(&json!(false)));
        assert!(ParamKind::Date.accepts(&json!("2024-05-01")));
        assert!(!ParamKind::Date.accepts(&json!("  ")));
        assert!(!ParamKind::Date.accepts(&json!(20240501)));
        assert!(ParamKind::Any.accepts(&json!({"k": 1})));
    }

    fn report_kb() -> KnowledgeBase {
        KnowledgeBase::builder()
            .action(
                ActionSchema::new("GenerateReport")
                    .cost(2.0)
                    .effect(Effect::set("attendanceReport", "present"))
                    .produces("reportFile"),
            )
            .action(
                ActionSchema::new("SendEmail")
                    .requires(Condition::equals("attendanceReport", "present"))
                    .effect(Effect::set("emailSent", true))
                    .consumes("reportFile"),
            )
            .goal(GoalTemplate::new("EmailReport").require(Condition::equals("emailSent", true)))
            .build()
            .unwrap()
    }

    #[test]
    fn resolve_known_and_unknown() {
        let kb = report_kb();
        let goal = kb.resolve_goal(&Intent::new("EmailReport", 0.9)).unwrap();
        assert_eq!(goal.conditions, vec![Condition::equals("emailSent", true)]);
        assert_eq!(goal.intents, vec!["EmailReport"]);

        let err = kb.resolve_goal(&Intent::new("Dance", 0.9)).unwrap_err();
        assert!(matches!(err, KnowledgeError::UnknownIntent { .. }));
    }

    #[test]
    fn goal_parameters_are_substituted() {
        let kb = KnowledgeBase::builder()
            .action(
                ActionSchema::new("CheckWeather")
                    .param("location", ParamKind::Text)
                    .effect(Effect::set_param("weather_location", "location")),
            )
            .goal(GoalTemplate::new("CheckWeather").bind("weather_location", "location"))
            .build()
            .unwrap();

        let intent = Intent::new("CheckWeather", 0.8).with_param("location", "Mumbai");
        let goal = kb.resolve_goal(&intent).unwrap();
        assert_eq!(
            goal.conditions,
            vec![Condition::equals("weather_location", "Mumbai")]
        );
        assert_eq!(goal.parameters.get("location"), Some(&json!("Mumbai")));

        let err = kb
            .resolve_goal(&Intent::new("CheckWeather", 0.8))
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::MissingGoalParameter { .. }));
    }

    #[test]
    fn lookup_and_ordering() {
        let kb = KnowledgeBase::builder()
            .action(ActionSchema::new("Send"))
            .action(ActionSchema::new("MarkSent").after("Send"))
            .build()
            .unwrap();
        assert!(kb.ordering_constrained("Send", "MarkSent"));
        assert!(!kb.ordering_constrained("MarkSent", "Send"));
        assert!(kb.action("Send").is_ok());
        assert!(matches!(
            kb.action("Nope"),
            Err(KnowledgeError::ActionNotFound { .. })
        ));
        assert_eq!(kb.actions()[1].id, "MarkSent");
    }

    #[test]
    fn build_rejects_bad_registrations() {
        let dup = KnowledgeBase::builder()
            .action(ActionSchema::new("A"))
            .action(ActionSchema::new("A"))
            .build();
        assert!(matches!(dup, Err(KnowledgeError::DuplicateAction { .. })));

        let cost = KnowledgeBase::builder()
            .action(ActionSchema::new("A").cost(-1.0))
            .build();
        assert!(matches!(cost, Err(KnowledgeError::InvalidCost { .. })));

        let slot = KnowledgeBase::builder()
            .action(ActionSchema::new("A").consumes("nothing"))
            .build();
        assert!(matches!(slot, Err(KnowledgeError::UnsatisfiableInput { .. })));

        let order = KnowledgeBase::builder()
            .action(ActionSchema::new("A"))
            .order("A", "Ghost")
            .build();
        assert!(matches!(
            order,
            Err(KnowledgeError::UnknownOrderingAction { .. })
        ));

        let param = KnowledgeBase::builder()
            .action(ActionSchema::new("A").effect(Effect::set_param("x", "undeclared")))
            .build();
        assert!(matches!(param, Err(KnowledgeError::UndeclaredParam { .. })));
    }

    #[test]
    fn search_constants() {
        let kb = report_kb();
        assert_eq!(kb.min_action_cost(), 1.0);
        assert_eq!(kb.max_effects(), 1);
    }

    #[test]
    fn parse_toml_catalog() {
        let kb = KnowledgeBase::from_toml_str(
            r#"
            [[actions]]
            id = "GenerateReport"
            cost = 2.0
            produces = ["reportFile"]
            effects = [{ op = "set", var = "attendanceReport", value = { literal = "present" } }]

            [[actions]]
            id = "SendEmail"
            consumes = ["reportFile"]
            params = [{ name = "recipient" }]
            preconditions = [{ var = "attendanceReport", expect = { equals = "present" } }]
            effects = [{ op = "set", var = "emailSent", value = { literal = true } }]

            [[goals]]
            intent = "EmailReport"
            require = [{ var = "emailSent", expect = { equals = true } }]

            [[ordering]]
            before = "GenerateReport"
            after = "SendEmail"
            "#,
        )
        .unwrap();
        assert_eq!(kb.len(), 2);
        assert_eq!(kb.action("SendEmail").unwrap().cost, 1.0);
        assert!(kb.action("SendEmail").unwrap().params[0].required);
        assert!(kb.ordering_constrained("GenerateReport", "SendEmail"));
        assert!(kb.resolve_goal(&Intent::new("EmailReport", 1.0)).is_ok());
    }

    #[test]
    fn malformed_catalog_is_a_parse_error() {
        let err = KnowledgeBase::from_toml_str("[[actions]]\ncost = \"cheap\"").unwrap_err();
        assert!(matches!(err, KnowledgeError::CatalogParse { .. }));
    }
}
