//! Goal-directed planning.
//!
//! The planner turns goal predicates into a minimum-cost sequence of actions
//! with A* ([`search`]), groups goals that constrain the same state variables
//! into one joint search, and binds each step's parameters either to intent
//! parameters or to the output of an earlier step.

pub mod search;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::intent::GoalPredicate;
use crate::knowledge::{ActionSchema, KnowledgeBase, KnowledgeError, ParamKind};
use crate::state::{Parameters, State};

pub use search::SearchLimits;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while planning. All of them abort the request before any
/// action runs.
#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    #[error("no plan reaches goal: {goal} ({expanded} nodes expanded)")]
    #[diagnostic(
        code(talky::planner::no_plan),
        help(
            "No sequence of registered actions makes the goal true from the current state. \
             Check that required parameters were supplied (their `<name>_valid` facts gate \
             most actions)."
        )
    )]
    NoPlanFound { goal: String, expanded: usize },

    #[error("search budget exceeded after {expanded} expansions: {reason}")]
    #[diagnostic(
        code(talky::planner::budget_exceeded),
        help("Raise `search_max_expansions` or `search_timeout_ms` in the configuration.")
    )]
    SearchBudgetExceeded { expanded: usize, reason: String },

    #[error("conflicting goals: {first} contradicts {second}")]
    #[diagnostic(
        code(talky::planner::conflicting_goals),
        help("Two intents require different values of the same state variable.")
    )]
    ConflictingGoals { first: String, second: String },

    #[error("action \"{action}\" has no value for required parameter \"{param}\"")]
    #[diagnostic(
        code(talky::planner::unbound_parameter),
        help("Supply the parameter with the intent, or produce it from an earlier action.")
    )]
    UnboundParameter { action: String, param: String },

    #[error("action \"{action}\" expects {expected} for parameter \"{param}\", got {found}")]
    #[diagnostic(
        code(talky::planner::parameter_kind),
        help("The classifier extracted a value of the wrong type. Re-prompt for the parameter.")
    )]
    ParameterKindMismatch {
        action: String,
        param: String,
        expected: ParamKind,
        found: Value,
    },

    #[error("intent \"{label}\" confidence {confidence:.2} is below threshold {threshold:.2}")]
    #[diagnostic(
        code(talky::planner::low_confidence),
        help("Ask the user to rephrase, or lower `min_confidence`.")
    )]
    LowConfidenceRejection {
        label: String,
        confidence: f64,
        threshold: f64,
    },

    #[error("plan step {step} (\"{action}\") is invalid: {reason}")]
    #[diagnostic(code(talky::planner::invalid_plan))]
    InvalidPlan {
        step: usize,
        action: String,
        reason: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Knowledge(#[from] KnowledgeError),
}

/// Convenience alias.
pub type PlanResult<T> = std::result::Result<T, PlanError>;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Where a step's parameter value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// A value known at plan time (from the intent parameters).
    Literal(Value),
    /// The named output slot of an earlier step.
    FromStep { step: usize, slot: String },
}

/// One action in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action_id: String,
    pub bindings: BTreeMap<String, Binding>,
    pub cost: f64,
    /// Index into [`Plan::goals`] of the goal group this step serves.
    pub group: usize,
}

impl PlanStep {
    /// Steps this one takes data from.
    pub fn data_sources(&self) -> impl Iterator<Item = (usize, &str)> {
        self.bindings.values().filter_map(|b| match b {
            Binding::FromStep { step, slot } => Some((*step, slot.as_str())),
            Binding::Literal(_) => None,
        })
    }

    /// Parameters known at plan time.
    pub fn literal_params(&self) -> Parameters {
        self.bindings
            .iter()
            .filter_map(|(name, b)| match b {
                Binding::Literal(v) => Some((name.clone(), v.clone())),
                Binding::FromStep { .. } => None,
            })
            .collect()
    }
}

/// Search statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub expanded: usize,
    pub generated: usize,
    /// At least one goal group was answered without search.
    pub fast_path: bool,
}

impl std::ops::AddAssign for SearchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.expanded += rhs.expanded;
        self.generated += rhs.generated;
        self.fast_path |= rhs.fast_path;
    }
}

/// An ordered, fully bound sequence of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub cost: f64,
    /// Goal groups, each the conjunction of one or more intents' goals.
    pub goals: Vec<GoalPredicate>,
    pub stats: SearchStats,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn action_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.action_id.as_str()).collect()
    }

    /// Intent labels served by goal group `group`.
    pub fn group_intents(&self, group: usize) -> &[String] {
        self.goals
            .get(group)
            .map(|g| g.intents.as_slice())
            .unwrap_or(&[])
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "(no actions needed)");
        }
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{}. {} (cost {:.2})", i + 1, step.action_id, step.cost)?;
        }
        write!(f, "total cost {:.2}", self.cost)
    }
}

/// An intent with no goal template, routed straight to the action of the same
/// name. `goal` carries the intent label and parameters but no conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectAction {
    pub action_id: String,
    pub goal: GoalPredicate,
}

impl DirectAction {
    pub fn for_intent(intent: &crate::intent::Intent) -> Self {
        Self {
            action_id: intent.label.clone(),
            goal: GoalPredicate::new(Vec::new())
                .for_intent(&intent.label)
                .with_parameters(intent.parameters.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// A node expansion, reported to a [`SearchObserver`].
#[derive(Debug)]
pub struct Expansion<'a> {
    pub group: usize,
    pub depth: usize,
    /// Action that produced this node (`None` for the start node).
    pub action: Option<&'a str>,
    pub g: f64,
    pub h: f64,
    pub state: &'a State,
}

impl Expansion<'_> {
    pub fn f(&self) -> f64 {
        self.g + self.h
    }
}

/// Receives every node expansion.
pub trait SearchObserver: Send + Sync {
    fn expanded(&self, expansion: &Expansion<'_>);
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// A* planner over a shared knowledge base.
#[derive(Clone)]
pub struct Planner {
    kb: Arc<KnowledgeBase>,
    limits: SearchLimits,
    observer: Option<Arc<dyn SearchObserver>>,
}

impl Planner {
    pub fn new(kb: Arc<KnowledgeBase>, limits: SearchLimits) -> Self {
        Self {
            kb,
            limits,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SearchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    /// Plan for a single goal, taking the single-action fast path when it
    /// provably yields the optimal plan.
    pub fn plan(&self, start: &State, goal: &GoalPredicate, ctx: &Parameters) -> PlanResult<Plan> {
        self.plan_groups(start, std::slice::from_ref(goal), &[], ctx, true)
    }

    /// Plan for a single goal, always running the full search.
    pub fn search(
        &self,
        start: &State,
        goal: &GoalPredicate,
        ctx: &Parameters,
    ) -> PlanResult<Plan> {
        self.plan_groups(start, std::slice::from_ref(goal), &[], ctx, false)
    }

    /// Plan for several goals at once.
    ///
    /// Goals that share state variables are conjoined and searched jointly;
    /// independent groups are searched separately from `start` and their steps
    /// concatenated in group order.
    pub fn plan_request(
        &self,
        start: &State,
        goals: &[GoalPredicate],
        ctx: &Parameters,
    ) -> PlanResult<Plan> {
        self.plan_groups(start, goals, &[], ctx, true)
    }

    /// Like [`plan_request`](Self::plan_request), with some intents routed
    /// straight to a single action. Each direct action forms its own group,
    /// placed after the searched groups.
    pub fn plan_with_direct(
        &self,
        start: &State,
        goals: &[GoalPredicate],
        direct: &[DirectAction],
        ctx: &Parameters,
    ) -> PlanResult<Plan> {
        self.plan_groups(start, goals, direct, ctx, true)
    }

    fn plan_groups(
        &self,
        start: &State,
        goals: &[GoalPredicate],
        direct: &[DirectAction],
        ctx: &Parameters,
        fast_path: bool,
    ) -> PlanResult<Plan> {
        let mut groups = group_goals(goals)?;
        let mut sequence: Vec<(usize, usize)> = Vec::new();
        let mut contexts = Vec::with_capacity(groups.len() + direct.len());
        let mut cost = 0.0;
        let mut stats = SearchStats::default();

        for (group, goal) in groups.iter().enumerate() {
            let params = merged_params(&goal.parameters, ctx);
            let found = self.plan_group(start, goal, &params, group, fast_path)?;
            cost += found.cost;
            stats += found.stats;
            sequence.extend(found.actions.into_iter().map(|a| (a, group)));
            contexts.push(params);
        }

        for route in direct {
            let index = self.kb.action_index(&route.action_id).ok_or_else(|| {
                KnowledgeError::ActionNotFound {
                    id: route.action_id.clone(),
                }
            })?;
            let action = &self.kb.actions()[index];
            if let Some(unmet) = action.preconditions.iter().find(|c| !c.holds_in(start)) {
                return Err(PlanError::InvalidPlan {
                    step: sequence.len(),
                    action: action.id.clone(),
                    reason: format!("precondition {unmet} does not hold"),
                });
            }
            cost += action.cost;
            sequence.push((index, groups.len()));
            contexts.push(merged_params(&route.goal.parameters, ctx));
            groups.push(route.goal.clone());
        }

        let steps = bind_steps(&self.kb, &sequence, &contexts)?;
        tracing::debug!(
            groups = groups.len(),
            steps = steps.len(),
            cost,
            expanded = stats.expanded,
            "plan built"
        );
        Ok(Plan {
            steps,
            cost,
            goals: groups,
            stats,
        })
    }

    fn plan_group(
        &self,
        start: &State,
        goal: &GoalPredicate,
        params: &Parameters,
        group: usize,
        fast_path: bool,
    ) -> PlanResult<search::SearchOutcome> {
        if goal.is_satisfied_by(start) {
            return Ok(search::SearchOutcome {
                actions: Vec::new(),
                cost: 0.0,
                stats: SearchStats::default(),
            });
        }
        if fast_path {
            if let Some(outcome) = self.single_action(start, goal, params) {
                return Ok(outcome);
            }
        }
        search::astar(
            &self.kb,
            start,
            &goal.conditions,
            params,
            &self.limits,
            group,
            self.observer.as_deref(),
        )
    }

    /// The unique one-step solution, when every alternative is provably dearer.
    ///
    /// Any other plan needs two or more actions, each costing at least the
    /// cheapest action, so a single candidate under twice that bound is optimal.
    fn single_action(
        &self,
        start: &State,
        goal: &GoalPredicate,
        params: &Parameters,
    ) -> Option<search::SearchOutcome> {
        let mut candidates = self.kb.actions().iter().enumerate().filter(|(_, a)| {
            a.is_applicable(start) && goal.is_satisfied_by(&start.apply(&a.effects, params))
        });
        let (index, action) = candidates.next()?;
        if candidates.next().is_some() || action.cost >= 2.0 * self.kb.min_action_cost() {
            return None;
        }
        Some(search::SearchOutcome {
            actions: vec![index],
            cost: action.cost,
            stats: SearchStats {
                fast_path: true,
                ..SearchStats::default()
            },
        })
    }

    /// Replay a plan from `start`: every action must exist and be applicable
    /// in turn, and the final state must satisfy every goal group.
    pub fn validate_plan(&self, plan: &Plan, start: &State) -> PlanResult<State> {
        let mut state = start.clone();
        for (i, step) in plan.steps.iter().enumerate() {
            let action = self.kb.action(&step.action_id)?;
            if let Some(unmet) = action.preconditions.iter().find(|c| !c.holds_in(&state)) {
                return Err(PlanError::InvalidPlan {
                    step: i,
                    action: step.action_id.clone(),
                    reason: format!("precondition {unmet} does not hold"),
                });
            }
            state = state.apply(&action.effects, &step.literal_params());
        }
        if let Some(goal) = plan.goals.iter().find(|g| !g.is_satisfied_by(&state)) {
            return Err(PlanError::InvalidPlan {
                step: plan.steps.len(),
                action: String::new(),
                reason: format!("goal for {:?} is not reached", goal.intents),
            });
        }
        Ok(state)
    }
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("kb", &self.kb)
            .field("limits", &self.limits)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Goal grouping
// ---------------------------------------------------------------------------

/// Partition goals into groups connected by shared variables (union-find),
/// conjoining each group. Group order follows the first member's position.
fn group_goals(goals: &[GoalPredicate]) -> PlanResult<Vec<GoalPredicate>> {
    let mut parent: Vec<usize> = (0..goals.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..goals.len() {
        for j in (i + 1)..goals.len() {
            if goals[i].shares_variables_with(&goals[j]) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    let mut groups: Vec<GoalPredicate> = Vec::new();
    let mut slot_of_root: BTreeMap<usize, usize> = BTreeMap::new();
    for (i, goal) in goals.iter().enumerate() {
        let root = find(&mut parent, i);
        match slot_of_root.get(&root) {
            Some(&slot) => groups[slot].conjoin(goal.clone()).map_err(|(first, second)| {
                PlanError::ConflictingGoals {
                    first: first.to_string(),
                    second: second.to_string(),
                }
            })?,
            None => {
                slot_of_root.insert(root, groups.len());
                groups.push(goal.clone());
            }
        }
    }
    Ok(groups)
}

/// Goal parameters take precedence over the request-wide context.
fn merged_params(goal: &Parameters, ctx: &Parameters) -> Parameters {
    let mut merged = ctx.clone();
    for (k, v) in goal {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

// ---------------------------------------------------------------------------
// Parameter binding
// ---------------------------------------------------------------------------

fn usable(value: &Value) -> bool {
    !value.is_null()
}

/// A plan-time value, checked against the parameter's declared kind.
fn literal(action: &ActionSchema, name: &str, value: &Value) -> PlanResult<Binding> {
    match action.param_spec(name) {
        Some(spec) if !spec.kind.accepts(value) => Err(PlanError::ParameterKindMismatch {
            action: action.id.clone(),
            param: name.to_string(),
            expected: spec.kind,
            found: value.clone(),
        }),
        _ => Ok(Binding::Literal(value.clone())),
    }
}

/// Bind each step's consumed slots and declared parameters.
///
/// A consumed slot takes the nearest earlier step that produces it, falling
/// back to the intent parameter of the same name. Remaining declared
/// parameters come from the step's goal-group context.
fn bind_steps(
    kb: &KnowledgeBase,
    sequence: &[(usize, usize)],
    contexts: &[Parameters],
) -> PlanResult<Vec<PlanStep>> {
    let mut steps = Vec::with_capacity(sequence.len());
    for (position, &(index, group)) in sequence.iter().enumerate() {
        let action = &kb.actions()[index];
        let ctx = &contexts[group];
        let mut bindings = BTreeMap::new();

        for slot in &action.consumes {
            let producer = sequence[..position]
                .iter()
                .rposition(|&(earlier, _)| kb.actions()[earlier].produces.contains(slot));
            let binding = match producer {
                Some(step) => Binding::FromStep {
                    step,
                    slot: slot.clone(),
                },
                None => match ctx.get(slot).filter(|v| usable(v)) {
                    Some(value) => literal(action, slot, value)?,
                    None => continue,
                },
            };
            bindings.insert(slot.clone(), binding);
        }

        for spec in &action.params {
            if bindings.contains_key(&spec.name) {
                continue;
            }
            match ctx.get(&spec.name).filter(|v| usable(v)) {
                Some(value) => {
                    bindings.insert(spec.name.clone(), literal(action, &spec.name, value)?);
                }
                None if spec.required => {
                    return Err(PlanError::UnboundParameter {
                        action: action.id.clone(),
                        param: spec.name.clone(),
                    });
                }
                None => {}
            }
        }

        steps.push(PlanStep {
            action_id: action.id.clone(),
            bindings,
            cost: action.cost,
            group,
        });
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::intent::Intent;
    use crate::knowledge::{ActionSchema, GoalTemplate, ParamKind};
    use crate::state::{Condition, Effect};

    fn report_kb() -> Arc<KnowledgeBase> {
        Arc::new(
            KnowledgeBase::builder()
                .action(
                    ActionSchema::new("GenerateReport")
                        .effect(Effect::set("attendanceReport", "present"))
                        .produces("reportFile")
                        .cost(2.0),
                )
                .action(
                    ActionSchema::new("SendEmail")
                        .param("recipient", ParamKind::Text)
                        .optional_param("reportFile", ParamKind::Any)
                        .requires(Condition::equals("attendanceReport", "present"))
                        .consumes("reportFile")
                        .effect(Effect::set("emailSent", true))
                        .cost(1.0),
                )
                .action(
                    ActionSchema::new("CheckWeather")
                        .effect(Effect::set("weather_known", true))
                        .cost(1.0),
                )
                .goal(
                    GoalTemplate::new("EmailReport").require(Condition::equals("emailSent", true)),
                )
                .goal(
                    GoalTemplate::new("CheckWeather")
                        .require(Condition::equals("weather_known", true)),
                )
                .build()
                .unwrap(),
        )
    }

    fn planner(kb: Arc<KnowledgeBase>) -> Planner {
        Planner::new(kb, SearchLimits::default())
    }

    fn ctx() -> Parameters {
        let mut p = Parameters::new();
        p.insert("recipient".into(), json!("dean@college.edu"));
        p
    }

    #[test]
    fn report_then_email() {
        let kb = report_kb();
        let goal = kb.resolve_goal(&Intent::new("EmailReport", 0.9)).unwrap();
        let plan = planner(kb).plan(&State::new(), &goal, &ctx()).unwrap();
        assert_eq!(plan.action_ids(), vec!["GenerateReport", "SendEmail"]);
        assert_eq!(plan.cost, 3.0);
        assert_eq!(
            plan.steps[1].bindings.get("reportFile"),
            Some(&Binding::FromStep {
                step: 0,
                slot: "reportFile".into()
            })
        );
        assert_eq!(
            plan.steps[1].bindings.get("recipient"),
            Some(&Binding::Literal(json!("dean@college.edu")))
        );
    }

    #[test]
    fn satisfied_goal_is_empty_plan() {
        let kb = report_kb();
        let goal = GoalPredicate::new(vec![Condition::equals("emailSent", true)]);
        let plan = planner(kb)
            .plan(&State::new().with_fact("emailSent", true), &goal, &ctx())
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.cost, 0.0);
    }

    #[test]
    fn fast_path_matches_search() {
        let kb = report_kb();
        let goal = kb.resolve_goal(&Intent::new("CheckWeather", 0.9)).unwrap();
        let p = planner(kb);
        let fast = p.plan(&State::new(), &goal, &ctx()).unwrap();
        let full = p.search(&State::new(), &goal, &ctx()).unwrap();
        assert!(fast.stats.fast_path);
        assert!(!full.stats.fast_path);
        assert_eq!(fast.steps, full.steps);
        assert_eq!(fast.cost, full.cost);
    }

    #[test]
    fn missing_required_parameter() {
        let kb = report_kb();
        let goal = kb.resolve_goal(&Intent::new("EmailReport", 0.9)).unwrap();
        let err = planner(kb)
            .plan(&State::new(), &goal, &Parameters::new())
            .unwrap_err();
        assert!(matches!(err, PlanError::UnboundParameter { ref param, .. } if param == "recipient"));
    }

    #[test]
    fn independent_goals_are_planned_separately() {
        let kb = report_kb();
        let goals = vec![
            kb.resolve_goal(&Intent::new("CheckWeather", 0.9)).unwrap(),
            kb.resolve_goal(&Intent::new("EmailReport", 0.9)).unwrap(),
        ];
        let plan = planner(kb)
            .plan_request(&State::new(), &goals, &ctx())
            .unwrap();
        assert_eq!(plan.goals.len(), 2);
        assert_eq!(
            plan.action_ids(),
            vec!["CheckWeather", "GenerateReport", "SendEmail"]
        );
        assert_eq!(plan.steps[0].group, 0);
        assert_eq!(plan.steps[2].group, 1);
        assert_eq!(plan.cost, 4.0);
        assert_eq!(plan.group_intents(1), ["EmailReport".to_string()]);
    }

    #[test]
    fn shared_variables_are_conjoined_or_conflict() {
        let a = GoalPredicate::new(vec![Condition::equals("x", true)]).for_intent("A");
        let b = GoalPredicate::new(vec![
            Condition::equals("x", true),
            Condition::equals("y", true),
        ])
        .for_intent("B");
        let c = GoalPredicate::new(vec![Condition::equals("z", true)]).for_intent("C");
        let groups = group_goals(&[a.clone(), c, b]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].intents, vec!["A", "B"]);
        assert_eq!(groups[1].intents, vec!["C"]);

        let d = GoalPredicate::new(vec![Condition::equals("x", false)]).for_intent("D");
        assert!(matches!(
            group_goals(&[a, d]),
            Err(PlanError::ConflictingGoals { .. })
        ));
    }

    #[test]
    fn joint_goals_on_one_variable_stay_optimal() {
        let kb = Arc::new(
            KnowledgeBase::builder()
                .action(ActionSchema::new("Prep").effect(Effect::set("prepared", true)))
                .action(
                    ActionSchema::new("Cheap")
                        .requires(Condition::equals("prepared", true))
                        .effect(Effect::set("x", true)),
                )
                .action(
                    ActionSchema::new("Direct")
                        .effect(Effect::set("x", true))
                        .cost(2.5),
                )
                .build()
                .unwrap(),
        );
        let goals = vec![
            GoalPredicate::new(vec![Condition::present("x")]).for_intent("NeedX"),
            GoalPredicate::new(vec![Condition::equals("x", true)]).for_intent("XTrue"),
        ];
        let plan = planner(kb)
            .plan_request(&State::new(), &goals, &Parameters::new())
            .unwrap();
        assert_eq!(plan.goals.len(), 1);
        assert_eq!(plan.action_ids(), vec!["Prep", "Cheap"]);
        assert_eq!(plan.cost, 2.0);
    }

    #[test]
    fn parameter_kinds_are_checked_at_binding() {
        let kb = Arc::new(
            KnowledgeBase::builder()
                .action(
                    ActionSchema::new("BookHotel")
                        .param("location", ParamKind::Text)
                        .optional_param("guests", ParamKind::Integer)
                        .effect(Effect::set("hotel_booked", true)),
                )
                .build()
                .unwrap(),
        );
        let goal = GoalPredicate::new(vec![Condition::equals("hotel_booked", true)]);
        let mut params = Parameters::new();
        params.insert("location".into(), json!("Pune"));
        params.insert("guests".into(), json!(2));
        let plan = planner(Arc::clone(&kb))
            .plan(&State::new(), &goal, &params)
            .unwrap();
        assert_eq!(
            plan.steps[0].bindings.get("guests"),
            Some(&Binding::Literal(json!(2)))
        );

        params.insert("guests".into(), json!("a few"));
        let err = planner(kb).plan(&State::new(), &goal, &params).unwrap_err();
        assert!(matches!(
            err,
            PlanError::ParameterKindMismatch { ref param, expected: ParamKind::Integer, .. }
                if param == "guests"
        ));
    }

    #[test]
    fn validate_replays_plan() {
        let kb = report_kb();
        let goal = kb.resolve_goal(&Intent::new("EmailReport", 0.9)).unwrap();
        let p = planner(kb);
        let mut plan = p.plan(&State::new(), &goal, &ctx()).unwrap();
        let end = p.validate_plan(&plan, &State::new()).unwrap();
        assert!(goal.is_satisfied_by(&end));

        plan.steps.swap(0, 1);
        let err = p.validate_plan(&plan, &State::new()).unwrap_err();
        assert!(matches!(err, PlanError::InvalidPlan { step: 0, .. }));
    }

    #[test]
    fn direct_actions_form_their_own_group() {
        let kb = report_kb();
        let goals = vec![kb.resolve_goal(&Intent::new("EmailReport", 0.9)).unwrap()];
        let direct = [DirectAction::for_intent(&Intent::new("CheckWeather", 0.9))];
        let plan = planner(kb)
            .plan_with_direct(&State::new(), &goals, &direct, &ctx())
            .unwrap();
        assert_eq!(
            plan.action_ids(),
            vec!["GenerateReport", "SendEmail", "CheckWeather"]
        );
        assert_eq!(plan.steps[2].group, 1);
        assert_eq!(plan.group_intents(1), ["CheckWeather".to_string()]);
        assert_eq!(plan.cost, 4.0);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Option<String>>>);

    impl SearchObserver for Recorder {
        fn expanded(&self, expansion: &Expansion<'_>) {
            self.0
                .lock()
                .unwrap()
                .push(expansion.action.map(str::to_string));
        }
    }

    #[test]
    fn observer_sees_expansions() {
        let kb = report_kb();
        let goal = kb.resolve_goal(&Intent::new("EmailReport", 0.9)).unwrap();
        let recorder = Arc::new(Recorder::default());
        let plan = planner(kb)
            .with_observer(recorder.clone())
            .plan(&State::new(), &goal, &ctx())
            .unwrap();
        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), plan.stats.expanded);
        assert_eq!(seen[0], None);
    }
}
