//! World state model: facts, conditions over facts, and effects that rewrite them.
//!
//! A [`State`] is an immutable, ordered mapping from variable name to [`Fact`].
//! Applying effects never mutates a state in place; it produces a new one.
//! Equality and hashing are structural, so two states holding the same facts
//! are the same search node.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named parameter values extracted from intents (and bound to actions).
pub type Parameters = serde_json::Map<String, Value>;

/// Suffix of the validity flag seeded for every supplied intent parameter.
pub const VALID_SUFFIX: &str = "_valid";

// ---------------------------------------------------------------------------
// Fact
// ---------------------------------------------------------------------------

/// A scalar or small structured state value.
///
/// Floats are deliberately absent so facts stay `Eq + Hash + Ord`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fact {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Fact>),
}

impl Fact {
    /// Convert an external JSON parameter value into a fact.
    ///
    /// Non-integral numbers, objects and `null` are kept as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .unwrap_or_else(|| Self::Text(n.to_string())),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Render the fact back into JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<bool> for Fact {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Fact {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Fact {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Fact {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// What a [`Condition`] expects of its variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    /// The variable holds exactly this value.
    Equals(Fact),
    /// The variable is set (to anything).
    Present,
    /// The variable is not set.
    Absent,
}

/// A single predicate over one state variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub var: String,
    pub expect: Expect,
}

impl Condition {
    pub fn equals(var: impl Into<String>, value: impl Into<Fact>) -> Self {
        Self {
            var: var.into(),
            expect: Expect::Equals(value.into()),
        }
    }

    pub fn present(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            expect: Expect::Present,
        }
    }

    pub fn absent(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            expect: Expect::Absent,
        }
    }

    /// Whether this condition holds in `state`.
    pub fn holds_in(&self, state: &State) -> bool {
        match &self.expect {
            Expect::Equals(v) => state.get(&self.var) == Some(v),
            Expect::Present => state.contains(&self.var),
            Expect::Absent => !state.contains(&self.var),
        }
    }

    /// Whether two conditions on the same variable can never both hold.
    pub fn conflicts_with(&self, other: &Condition) -> bool {
        if self.var != other.var {
            return false;
        }
        match (&self.expect, &other.expect) {
            (Expect::Equals(a), Expect::Equals(b)) => a != b,
            (Expect::Absent, Expect::Equals(_) | Expect::Present)
            | (Expect::Equals(_) | Expect::Present, Expect::Absent) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expect {
            Expect::Equals(v) => write!(f, "{} = {v}", self.var),
            Expect::Present => write!(f, "{} is set", self.var),
            Expect::Absent => write!(f, "{} is unset", self.var),
        }
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Value written by a `Set` effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectValue {
    /// A fixed value.
    Literal(Fact),
    /// The value of one of the action's bound parameters.
    ///
    /// Resolves to `true` when the parameter is not known at plan time; the
    /// concrete value is filled in by execution.
    Param(String),
}

/// A state mutation applied when an action succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Effect {
    Set { var: String, value: EffectValue },
    Delete { var: String },
}

impl Effect {
    pub fn set(var: impl Into<String>, value: impl Into<Fact>) -> Self {
        Self::Set {
            var: var.into(),
            value: EffectValue::Literal(value.into()),
        }
    }

    pub fn set_param(var: impl Into<String>, param: impl Into<String>) -> Self {
        Self::Set {
            var: var.into(),
            value: EffectValue::Param(param.into()),
        }
    }

    pub fn delete(var: impl Into<String>) -> Self {
        Self::Delete { var: var.into() }
    }

    /// The variable this effect touches.
    pub fn var(&self) -> &str {
        match self {
            Self::Set { var, .. } | Self::Delete { var } => var,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// An immutable snapshot of the world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    facts: BTreeMap<String, Fact>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from `(variable, value)` pairs.
    pub fn from_facts<K, V>(facts: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Fact>,
    {
        Self {
            facts: facts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return a copy of this state with one more fact.
    pub fn with_fact(mut self, var: impl Into<String>, value: impl Into<Fact>) -> Self {
        self.facts.insert(var.into(), value.into());
        self
    }

    pub fn get(&self, var: &str) -> Option<&Fact> {
        self.facts.get(var)
    }

    pub fn contains(&self, var: &str) -> bool {
        self.facts.contains_key(var)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Fact)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether every condition holds.
    pub fn satisfies_all(&self, conditions: &[Condition]) -> bool {
        conditions.iter().all(|c| c.holds_in(self))
    }

    /// How many distinct variables carry at least one condition that does
    /// not hold. One effect can settle every condition on its variable, so
    /// this, not the condition count, bounds the effects still needed.
    pub fn unsatisfied_vars(&self, conditions: &[Condition]) -> usize {
        conditions
            .iter()
            .filter(|c| !c.holds_in(self))
            .map(|c| c.var.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Apply effects, producing a new state. `self` is left untouched.
    pub fn apply(&self, effects: &[Effect], params: &Parameters) -> State {
        let mut facts = self.facts.clone();
        for effect in effects {
            match effect {
                Effect::Set { var, value } => {
                    let fact = match value {
                        EffectValue::Literal(f) => f.clone(),
                        EffectValue::Param(name) => params
                            .get(name)
                            .filter(|v| !v.is_null())
                            .map(Fact::from_json)
                            .unwrap_or(Fact::Bool(true)),
                    };
                    facts.insert(var.clone(), fact);
                }
                Effect::Delete { var } => {
                    facts.remove(var);
                }
            }
        }
        State { facts }
    }

    /// Overlay intent parameters: each supplied parameter `p` sets `p` to its
    /// value and `p_valid` to `true`. Null and empty-string values are skipped.
    pub fn seeded_with(&self, params: &Parameters) -> State {
        let mut facts = self.facts.clone();
        for (name, value) in params {
            let usable = match value {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            };
            if !usable {
                continue;
            }
            facts.insert(name.clone(), Fact::from_json(value));
            facts.insert(format!("{name}{VALID_SUFFIX}"), Fact::Bool(true));
        }
        State { facts }
    }

    /// Render as a JSON object (for audit payloads).
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.facts
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.facts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}
