//! The request pipeline: intents in, execution report out.
//!
//! Each request is handled independently. The assistant itself only holds
//! shared, read-only collaborators (knowledge base, configuration, invoker,
//! audit recorder), so concurrent `handle` calls never contend on state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::audit::{AuditEntry, AuditRecorder, DecisionKind, RequestId};
use crate::config::TalkyConfig;
use crate::error::{TalkyError, TalkyResult};
use crate::execute::{ActionInvoker, ExecutionEngine, ExecutionReport, NodeReport, SkipReason};
use crate::intent::{GoalPredicate, Intent};
use crate::knowledge::{KnowledgeBase, KnowledgeError};
use crate::planner::{DirectAction, Plan, PlanError, Planner};
use crate::schedule::build_graph;
use crate::state::{Parameters, State};

/// One user turn: classified intents plus the caller's view of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub state: State,
}

impl Request {
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Request-wide parameter context; earlier intents win on name clashes.
    pub fn parameters(&self) -> Parameters {
        let mut ctx = Parameters::new();
        for intent in &self.intents {
            for (k, v) in &intent.parameters {
                ctx.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        ctx
    }
}

/// A handled request.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub request: RequestId,
    pub plan: Plan,
    pub report: ExecutionReport,
}

/// Plans and executes requests, recording every decision.
pub struct Assistant {
    kb: Arc<KnowledgeBase>,
    config: TalkyConfig,
    invoker: Arc<dyn ActionInvoker>,
    audit: AuditRecorder,
    engine: ExecutionEngine,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("kb", &self.kb)
            .field("config", &self.config)
            .field("audit", &self.audit)
            .finish()
    }
}

impl Assistant {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        config: TalkyConfig,
        invoker: Arc<dyn ActionInvoker>,
        audit: AuditRecorder,
    ) -> Self {
        let engine = ExecutionEngine::new(config.execution_limits());
        Self {
            kb,
            config,
            invoker,
            audit,
            engine,
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a request with a fresh id and an empty caller state.
    pub fn request(&self, intents: Vec<Intent>) -> Request {
        Request {
            id: RequestId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            intents,
            state: State::new(),
        }
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn config(&self) -> &TalkyConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// The recorded decisions for `request`.
    pub async fn explain(&self, request: RequestId) -> Vec<AuditEntry> {
        self.audit.explain(request).await
    }

    /// Resolve, gate and plan a request without executing it.
    pub fn plan(&self, request: &Request) -> TalkyResult<Plan> {
        self.try_plan(request)
            .inspect_err(|e| self.reject(request.id, e))
    }

    /// Plan, schedule and execute a request.
    ///
    /// Planning and scheduling failures return before any action runs.
    /// Action failures are contained per node and show up in the report; only
    /// an engine fault aborts execution. Every returned error is also recorded
    /// as a rejection.
    pub async fn handle(&self, request: Request) -> TalkyResult<Outcome> {
        let plan = self.plan(&request)?;
        self.run(request.id, plan).await
    }

    /// Schedule and execute an accepted plan.
    async fn run(&self, request: RequestId, plan: Plan) -> TalkyResult<Outcome> {
        self.try_run(request, plan)
            .await
            .inspect_err(|e| self.reject(request, e))
    }

    async fn try_run(&self, request: RequestId, plan: Plan) -> TalkyResult<Outcome> {
        let graph = build_graph(&plan, &self.kb)?;
        let report = self
            .engine
            .execute(graph, Arc::clone(&self.invoker))
            .await?;

        for node in &report.nodes {
            self.audit.record(
                request,
                DecisionKind::ActionOutcome,
                outcome_payload(node),
            );
        }
        self.audit.record(
            request,
            DecisionKind::ExecutionSummary,
            json!({
                "status": report.status.to_string(),
                "unmet_goals": report.unmet_goals,
                "timed_out": report.timed_out,
                "elapsed_ms": report.elapsed_ms,
            }),
        );
        tracing::info!(
            request = %request,
            status = %report.status,
            unmet = report.unmet_goals.len(),
            "request handled"
        );

        Ok(Outcome {
            request,
            plan,
            report,
        })
    }

    fn try_plan(&self, request: &Request) -> TalkyResult<Plan> {
        let threshold = self.config.min_confidence;
        if let Some(low) = request
            .intents
            .iter()
            .find(|i| !(i.confidence >= threshold))
        {
            return Err(PlanError::LowConfidenceRejection {
                label: low.label.clone(),
                confidence: low.confidence,
                threshold,
            }
            .into());
        }

        let ctx = request.parameters();
        let start = request.state.seeded_with(&ctx);
        let mut goals: Vec<GoalPredicate> = Vec::new();
        let mut direct: Vec<DirectAction> = Vec::new();

        for intent in &request.intents {
            match self.kb.resolve_goal(intent) {
                Ok(goal) => {
                    self.audit.record(
                        request.id,
                        DecisionKind::IntentResolution,
                        json!({
                            "intent": intent.label,
                            "confidence": intent.confidence,
                            "route": "planned",
                            "goal": goal.conditions.iter().map(ToString::to_string).collect::<Vec<_>>(),
                            "parameters": Value::Object(intent.parameters.clone()),
                        }),
                    );
                    goals.push(goal);
                }
                Err(KnowledgeError::UnknownIntent { label }) => {
                    let Some(action) = self
                        .kb
                        .direct_action(intent)
                        .filter(|a| a.is_applicable(&start))
                    else {
                        return Err(KnowledgeError::UnknownIntent { label }.into());
                    };
                    self.audit.record(
                        request.id,
                        DecisionKind::IntentResolution,
                        json!({
                            "intent": intent.label,
                            "confidence": intent.confidence,
                            "route": "direct",
                            "action": action.id,
                            "parameters": Value::Object(intent.parameters.clone()),
                        }),
                    );
                    direct.push(DirectAction::for_intent(intent));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let planner = Planner::new(Arc::clone(&self.kb), self.config.search_limits())
            .with_observer(self.audit.observer(request.id));
        let plan = planner.plan_with_direct(&start, &goals, &direct, &ctx)?;

        self.audit.record(
            request.id,
            DecisionKind::PlanSelection,
            json!({
                "steps": plan.steps.iter().map(|s| json!({
                    "action": s.action_id,
                    "cost": s.cost,
                    "group": s.group,
                    "bindings": s.bindings,
                })).collect::<Vec<_>>(),
                "cost": plan.cost,
                "expanded": plan.stats.expanded,
                "generated": plan.stats.generated,
                "fast_path": plan.stats.fast_path,
            }),
        );
        tracing::info!(
            request = %request.id,
            steps = plan.len(),
            cost = plan.cost,
            expanded = plan.stats.expanded,
            "plan selected"
        );
        Ok(plan)
    }

    fn reject(&self, request: RequestId, error: &TalkyError) {
        tracing::warn!(request = %request, error = %error, "request rejected");
        self.audit.record(
            request,
            DecisionKind::RequestRejected,
            json!({
                "error": error.to_string(),
                "code": error.code_str(),
            }),
        );
    }
}

fn outcome_payload(node: &NodeReport) -> Value {
    let skipped = node.skipped.as_ref().map(|reason| match reason {
        SkipReason::DependencyFailure { upstream } => {
            format!("step {} did not succeed", upstream + 1)
        }
        SkipReason::ExecutionTimeout => "plan deadline passed".to_string(),
    });
    json!({
        "step": node.step,
        "action": node.action_id,
        "status": node.status.to_string(),
        "attempts": node.attempts,
        "error": node.error.as_ref().map(|e| e.message.clone()),
        "skipped": skipped,
    })
}
