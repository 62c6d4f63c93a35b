//! End-to-end tests for the request pipeline.
//!
//! These exercise intents through planning, scheduling, concurrent execution
//! and the audit trail, against small hand-built knowledge bases and the
//! built-in catalog.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Barrier;

use talky::assistant::Assistant;
use talky::audit::{AuditRecorder, DecisionKind, MemorySink, render_explanation};
use talky::config::TalkyConfig;
use talky::execute::{
    ActionInvoker, ExecutionEngine, FnInvoker, InvocationError, NodeStatus, OverallStatus,
    SkipReason,
};
use talky::intent::Intent;
use talky::knowledge::{ActionSchema, GoalTemplate, KnowledgeBase, catalog};
use talky::planner::{Binding, Planner, SearchLimits};
use talky::schedule::{DependencyKind, build_graph};
use talky::state::{Condition, Effect, Parameters, State};

type CallLog = Arc<Mutex<Vec<(String, Parameters)>>>;

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
                    .requires(Condition::equals("attendanceReport", "present"))
                    .consumes("reportFile")
                    .effect(Effect::set("emailSent", true))
                    .cost(1.0),
            )
            .goal(GoalTemplate::new("EmailReport").require(Condition::equals("emailSent", true)))
            .build()
            .unwrap(),
    )
}

/// Two unrelated single-action intents plus a dependent pair.
fn branch_kb() -> Arc<KnowledgeBase> {
    Arc::new(
        KnowledgeBase::builder()
            .action(
                ActionSchema::new("FetchA")
                    .effect(Effect::set("a_fetched", true))
                    .produces("a"),
            )
            .action(
                ActionSchema::new("UseA")
                    .requires(Condition::equals("a_fetched", true))
                    .consumes("a")
                    .effect(Effect::set("a_used", true)),
            )
            .action(ActionSchema::new("FetchB").effect(Effect::set("b_fetched", true)))
            .goal(GoalTemplate::new("UseA").require(Condition::equals("a_used", true)))
            .goal(GoalTemplate::new("FetchB").require(Condition::equals("b_fetched", true)))
            .build()
            .unwrap(),
    )
}

fn test_config() -> TalkyConfig {
    TalkyConfig {
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..TalkyConfig::default()
    }
}

fn assistant(
    kb: Arc<KnowledgeBase>,
    config: TalkyConfig,
    invoker: Arc<dyn ActionInvoker>,
) -> Assistant {
    Assistant::new(
        kb,
        config,
        invoker,
        AuditRecorder::new(Arc::new(MemorySink::new())),
    )
}

/// Succeeds with `{"<slot>": "<action>-out"}` for every action, except those
/// listed in `fail`, which fail permanently. Every call is logged.
fn scripted(fail: &'static [&'static str], log: CallLog) -> Arc<dyn ActionInvoker> {
    Arc::new(FnInvoker::new(move |id: String, params: Parameters| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push((id.clone(), params));
            if fail.contains(&id.as_str()) {
                return Err(InvocationError::permanent(format!("{id} is down")));
            }
            Ok(json!({ "reportFile": format!("{id}-out"), "a": format!("{id}-out") }))
        }
    }))
}

// ── Report-then-email scenario ─────────────────────────────────────────

#[test]
fn report_then_email_plan_and_graph() {
    let kb = report_kb();
    let planner = Planner::new(Arc::clone(&kb), SearchLimits::default());
    let start = State::new().with_fact("attendanceReport", "absent");
    let goal = kb.resolve_goal(&Intent::new("EmailReport", 0.9)).unwrap();

    let plan = planner.plan(&start, &goal, &Parameters::new()).unwrap();
    assert_eq!(plan.action_ids(), vec!["GenerateReport", "SendEmail"]);
    assert_eq!(plan.cost, 3.0);

    let graph = build_graph(&plan, &kb).unwrap();
    assert_eq!(graph.roots(), vec![0]);
    assert_eq!(
        graph.dependencies(1),
        vec![(
            0,
            &DependencyKind::Data {
                slot: "reportFile".into()
            }
        )]
    );
    assert!(graph.dependencies(0).is_empty());
}

#[tokio::test]
async fn report_then_email_success_passes_data() {
    let log: CallLog = Arc::default();
    let a = assistant(report_kb(), test_config(), scripted(&[], Arc::clone(&log)));
    let request = a
        .request(vec![Intent::new("EmailReport", 0.9)])
        .with_state(State::new().with_fact("attendanceReport", "absent"));

    let outcome = a.handle(request).await.unwrap();
    assert_eq!(outcome.report.status, OverallStatus::Succeeded);
    assert!(outcome.report.unmet_goals.is_empty());

    let calls = log.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "GenerateReport");
    assert_eq!(calls[1].0, "SendEmail");
    assert_eq!(calls[1].1["reportFile"], json!("GenerateReport-out"));
}

#[tokio::test]
async fn report_then_email_partial_failure() {
    let log: CallLog = Arc::default();
    let a = assistant(report_kb(), test_config(), scripted(&["SendEmail"], log));
    let request = a
        .request(vec![Intent::new("EmailReport", 0.9)])
        .with_state(State::new().with_fact("attendanceReport", "absent"));

    let report = a.handle(request).await.unwrap().report;
    assert_eq!(report.status, OverallStatus::PartialFailure);
    assert_eq!(report.nodes[0].status, NodeStatus::Succeeded);
    assert_eq!(report.nodes[1].status, NodeStatus::Failed);
    assert_eq!(
        report.nodes[1].error.as_ref().map(|e| e.message.as_str()),
        Some("SendEmail is down")
    );
    assert_eq!(report.unmet_goals, vec!["EmailReport"]);
}

// ── Concurrency ────────────────────────────────────────────────────────

#[tokio::test]
async fn independent_intents_run_concurrently() {
    let kb = Arc::new(
        KnowledgeBase::builder()
            .action(ActionSchema::new("CheckWeather").effect(Effect::set("weather_known", true)))
            .action(ActionSchema::new("CheckLunchMenu").effect(Effect::set("lunch_menu_known", true)))
            .goal(GoalTemplate::new("CheckWeather").require(Condition::equals("weather_known", true)))
            .goal(
                GoalTemplate::new("CheckLunchMenu")
                    .require(Condition::equals("lunch_menu_known", true)),
            )
            .build()
            .unwrap(),
    );

    // Each call waits until both are in flight: only concurrent dispatch
    // lets either finish.
    let barrier = Arc::new(Barrier::new(2));
    let invoker = Arc::new(FnInvoker::new(move |id: String, _params: Parameters| {
        let barrier = Arc::clone(&barrier);
        async move {
            barrier.wait().await;
            Ok::<_, InvocationError>(json!({ "done": id }))
        }
    }));
    let a = assistant(kb.clone(), test_config(), invoker);
    let request = a.request(vec![
        Intent::new("CheckWeather", 0.9),
        Intent::new("CheckLunchMenu", 0.8),
    ]);

    let plan = a.plan(&request).unwrap();
    let graph = build_graph(&plan, &kb).unwrap();
    assert_eq!(graph.roots(), vec![0, 1]);
    assert!(graph.independent(0, 1));

    let outcome = tokio::time::timeout(Duration::from_secs(5), a.handle(request))
        .await
        .expect("both actions must be dispatched together")
        .unwrap();
    assert_eq!(outcome.report.status, OverallStatus::Succeeded);
}

#[tokio::test]
async fn in_flight_limit_is_respected() {
    let mut builder = KnowledgeBase::builder();
    let mut intents = Vec::new();
    for i in 0..6 {
        let fact = format!("done_{i}");
        builder = builder
            .action(ActionSchema::new(format!("Task{i}")).effect(Effect::set(fact.as_str(), true)))
            .goal(GoalTemplate::new(format!("Task{i}")).require(Condition::equals(fact.as_str(), true)));
        intents.push(Intent::new(format!("Task{i}"), 0.9));
    }
    let kb = Arc::new(builder.build().unwrap());

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (c, p) = (Arc::clone(&current), Arc::clone(&peak));
    let invoker = Arc::new(FnInvoker::new(move |_id: String, _params: Parameters| {
        let (current, peak) = (Arc::clone(&c), Arc::clone(&p));
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, InvocationError>(Value::Null)
        }
    }));

    let config = TalkyConfig {
        max_concurrent_actions: 2,
        ..test_config()
    };
    let a = assistant(kb, config, invoker);
    let report = a.handle(a.request(intents)).await.unwrap().report;

    assert_eq!(report.status, OverallStatus::Succeeded);
    assert_eq!(report.count(NodeStatus::Succeeded), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

// ── Failure handling ───────────────────────────────────────────────────

#[tokio::test]
async fn failure_is_isolated_to_its_branch() {
    let log: CallLog = Arc::default();
    let a = assistant(branch_kb(), test_config(), scripted(&["FetchA"], Arc::clone(&log)));
    let request = a.request(vec![Intent::new("UseA", 0.9), Intent::new("FetchB", 0.9)]);

    let report = a.handle(request).await.unwrap().report;
    let status: HashMap<&str, NodeStatus> = report
        .nodes
        .iter()
        .map(|n| (n.action_id.as_str(), n.status))
        .collect();
    assert_eq!(status["FetchA"], NodeStatus::Failed);
    assert_eq!(status["UseA"], NodeStatus::Skipped);
    assert_eq!(status["FetchB"], NodeStatus::Succeeded);
    assert_eq!(report.status, OverallStatus::PartialFailure);
    assert_eq!(report.unmet_goals, vec!["UseA"]);

    let use_a = report.nodes.iter().find(|n| n.action_id == "UseA").unwrap();
    assert_eq!(
        use_a.skipped,
        Some(SkipReason::DependencyFailure { upstream: 0 })
    );
    assert_eq!(use_a.attempts, 0);
    assert!(log.lock().unwrap().iter().all(|(id, _)| id != "UseA"));
}

#[tokio::test]
async fn everything_failing_is_failed() {
    let a = assistant(
        branch_kb(),
        test_config(),
        scripted(&["FetchA", "FetchB"], Arc::default()),
    );
    let request = a.request(vec![Intent::new("UseA", 0.9), Intent::new("FetchB", 0.9)]);
    let report = a.handle(request).await.unwrap().report;
    assert_eq!(report.status, OverallStatus::Failed);
    assert_eq!(report.unmet_goals, vec!["UseA", "FetchB"]);
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let flaky = move || {
        let counter = Arc::clone(&counter);
        Arc::new(FnInvoker::new(move |_id: String, _params: Parameters| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(InvocationError::transient("timeout"))
                } else {
                    Ok(Value::Null)
                }
            }
        }))
    };

    let a = assistant(branch_kb(), test_config(), flaky());
    let report = a
        .handle(a.request(vec![Intent::new("FetchB", 0.9)]))
        .await
        .unwrap()
        .report;
    assert_eq!(report.nodes[0].status, NodeStatus::Succeeded);
    assert_eq!(report.nodes[0].attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    calls.store(0, Ordering::SeqCst);
    let config = TalkyConfig {
        node_retries: 1,
        ..test_config()
    };
    let a = assistant(branch_kb(), config, flaky());
    let report = a
        .handle(a.request(vec![Intent::new("FetchB", 0.9)]))
        .await
        .unwrap()
        .report;
    assert_eq!(report.nodes[0].status, NodeStatus::Failed);
    assert_eq!(report.nodes[0].attempts, 2);
    assert_eq!(report.status, OverallStatus::Failed);
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let log: CallLog = Arc::default();
    let a = assistant(branch_kb(), test_config(), scripted(&["FetchB"], Arc::clone(&log)));
    let report = a
        .handle(a.request(vec![Intent::new("FetchB", 0.9)]))
        .await
        .unwrap()
        .report;
    assert_eq!(report.nodes[0].attempts, 1);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deadline_skips_waiting_nodes_and_lets_running_finish() {
    let kb = branch_kb();
    let planner = Planner::new(Arc::clone(&kb), SearchLimits::default());
    let goal = kb.resolve_goal(&Intent::new("UseA", 0.9)).unwrap();
    let plan = planner.plan(&State::new(), &goal, &Parameters::new()).unwrap();
    let graph = build_graph(&plan, &kb).unwrap();

    let invoker = Arc::new(FnInvoker::new(|_id: String, _params: Parameters| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, InvocationError>(json!({ "a": 1 }))
    }));
    let limits = TalkyConfig {
        plan_timeout_ms: 50,
        ..test_config()
    }
    .execution_limits();

    let report = ExecutionEngine::new(limits)
        .execute(graph, invoker)
        .await
        .unwrap();
    assert!(report.timed_out);
    assert_eq!(report.nodes[0].status, NodeStatus::Succeeded);
    assert_eq!(report.nodes[1].status, NodeStatus::Skipped);
    assert_eq!(report.nodes[1].skipped, Some(SkipReason::ExecutionTimeout));
    assert_eq!(report.status, OverallStatus::PartialFailure);
}

#[tokio::test]
async fn empty_plan_succeeds() {
    let a = assistant(report_kb(), test_config(), scripted(&[], Arc::default()));
    let request = a
        .request(vec![Intent::new("EmailReport", 0.9)])
        .with_state(State::new().with_fact("emailSent", true));
    let outcome = a.handle(request).await.unwrap();
    assert!(outcome.plan.is_empty());
    assert_eq!(outcome.report.status, OverallStatus::Succeeded);
}

// ── Dependency soundness ───────────────────────────────────────────────

#[tokio::test]
async fn data_references_resolve_to_one_producing_ancestor() {
    let kb = Arc::new(catalog::builtin().unwrap());
    let a = assistant(Arc::clone(&kb), test_config(), scripted(&[], Arc::default()));
    let request = a.request(vec![
        Intent::new("GenerateAttendancePDF", 0.9),
        Intent::new("SendEmail", 0.9).with_param("recipient", "hod@college.edu"),
        Intent::new("CheckWeather", 0.7).with_param("location", "Pune"),
    ]);
    let plan = a.plan(&request).unwrap();
    let graph = build_graph(&plan, &kb).unwrap();
    assert!(graph.topological_order().is_ok());

    for (j, step) in plan.steps.iter().enumerate() {
        assert!(!graph.descendants(j).contains(&j));
        for binding in step.bindings.values() {
            if let Binding::FromStep { step: i, slot } = binding {
                assert!(*i < j);
                assert!(graph.predecessors(j).contains(i));
                let producer = kb.action(&plan.steps[*i].action_id).unwrap();
                assert!(producer.produces.contains(slot));
                let producers_between = plan.steps[*i + 1..j]
                    .iter()
                    .filter(|s| kb.action(&s.action_id).unwrap().produces.contains(slot))
                    .count();
                assert_eq!(producers_between, 0);
            }
        }
    }

    let send = plan
        .steps
        .iter()
        .position(|s| s.action_id == "SendEmail")
        .unwrap();
    let pdf = plan
        .steps
        .iter()
        .position(|s| s.action_id == "GenerateAttendancePDF")
        .unwrap();
    assert_eq!(
        plan.steps[send].bindings.get("attachment"),
        Some(&Binding::FromStep {
            step: pdf,
            slot: "attachment".into()
        })
    );
}

#[tokio::test]
async fn enabling_steps_are_graph_ancestors() {
    let kb = Arc::new(catalog::builtin().unwrap());
    let a = assistant(Arc::clone(&kb), test_config(), scripted(&[], Arc::default()));
    let requests = [
        vec![
            Intent::new("GenerateAttendancePDF", 0.9),
            Intent::new("SendEmail", 0.9).with_param("recipient", "hod@college.edu"),
        ],
        vec![
            Intent::new("GenerateTimetablePDF", 0.9),
            Intent::new("GenerateCafeteriaPDF", 0.8),
        ],
        vec![Intent::new("SendEmail", 0.9).with_param("recipient", "hod@college.edu")],
    ];

    for intents in requests {
        let plan = a.plan(&a.request(intents)).unwrap();
        let graph = build_graph(&plan, &kb).unwrap();
        for (j, step) in plan.steps.iter().enumerate() {
            let action = kb.action(&step.action_id).unwrap();
            for condition in &action.preconditions {
                let enabler = plan.steps[..j].iter().rposition(|earlier| {
                    kb.action(&earlier.action_id)
                        .unwrap()
                        .effects
                        .iter()
                        .any(|e| e.var() == condition.var)
                });
                if let Some(i) = enabler {
                    assert!(
                        graph.descendants(i).contains(&j),
                        "{} runs without waiting for {}",
                        step.action_id,
                        plan.steps[i].action_id
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn email_waits_for_its_draft() {
    let kb = Arc::new(catalog::builtin().unwrap());
    let events = Arc::new(Mutex::new(Vec::<String>::new()));
    let sent_body = Arc::new(Mutex::new(None::<Value>));
    let (log, body) = (Arc::clone(&events), Arc::clone(&sent_body));
    let invoker = Arc::new(FnInvoker::new(move |id: String, params: Parameters| {
        let (log, body) = (Arc::clone(&log), Arc::clone(&body));
        async move {
            log.lock().unwrap().push(format!("start {id}"));
            if id == "DraftEmail" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            } else {
                *body.lock().unwrap() = params.get("body").cloned();
            }
            log.lock().unwrap().push(format!("end {id}"));
            Ok::<_, InvocationError>(json!({ "body": "Please find attached." }))
        }
    }));
    let a = assistant(kb, test_config(), invoker);
    let request = a.request(vec![
        Intent::new("SendEmail", 0.9).with_param("recipient", "hod@college.edu"),
    ]);

    let outcome = a.handle(request).await.unwrap();
    assert_eq!(outcome.plan.action_ids(), vec!["DraftEmail", "SendEmail"]);
    assert_eq!(outcome.report.status, OverallStatus::Succeeded);
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "start DraftEmail",
            "end DraftEmail",
            "start SendEmail",
            "end SendEmail"
        ]
    );
    assert_eq!(
        *sent_body.lock().unwrap(),
        Some(json!("Please find attached."))
    );
}

// ── Audit ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn explain_is_idempotent_and_complete() {
    let a = assistant(report_kb(), test_config(), scripted(&["SendEmail"], Arc::default()));
    let request = a
        .request(vec![Intent::new("EmailReport", 0.9)])
        .with_state(State::new().with_fact("attendanceReport", "absent"));
    let id = request.id;
    a.handle(request).await.unwrap();

    let first = a.explain(id).await;
    let second = a.explain(id).await;
    assert_eq!(first, second);

    let kinds: Vec<DecisionKind> = first.iter().map(|e| e.kind).collect();
    assert_eq!(kinds.first(), Some(&DecisionKind::IntentResolution));
    assert_eq!(kinds.last(), Some(&DecisionKind::ExecutionSummary));
    assert!(kinds.contains(&DecisionKind::NodeExpansion));
    assert!(kinds.contains(&DecisionKind::PlanSelection));
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == DecisionKind::ActionOutcome)
            .count(),
        2
    );
    assert!(first.windows(2).all(|w| w[0].seq < w[1].seq));

    let prose = render_explanation(&first);
    assert!(prose.contains("Chose a 2-step plan costing 3.00"));
    assert!(prose.contains("Step 2 SendEmail: failed (SendEmail is down)."));
    assert!(prose.contains("not achieved: EmailReport"));
}

#[tokio::test]
async fn rejected_requests_are_explained() {
    let a = assistant(report_kb(), test_config(), scripted(&[], Arc::default()));
    let request = a.request(vec![Intent::new("Teleport", 0.95)]);
    let id = request.id;
    assert!(a.handle(request).await.is_err());

    let trail = a.explain(id).await;
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].kind, DecisionKind::RequestRejected);
    assert_eq!(
        trail[0].payload["code"],
        json!("talky::knowledge::unknown_intent")
    );
}

// ── Configuration and catalogs on disk ─────────────────────────────────

#[tokio::test]
async fn config_and_catalog_from_files() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config_path = tmp.path().join("talky.toml");
    let catalog_path = tmp.path().join("catalog.toml");
    std::fs::write(&config_path, "max_concurrent_actions = 1\nnode_retries = 0\n").unwrap();
    std::fs::write(
        &catalog_path,
        r#"
        [[actions]]
        id = "Greeting"
        cost = 0.6
        effects = [{ op = "set", var = "greeting_responded", value = { literal = true } }]

        [[goals]]
        intent = "Greeting"
        require = [{ var = "greeting_responded", expect = { equals = true } }]
        "#,
    )
    .unwrap();

    let config = TalkyConfig::load(&config_path).unwrap();
    assert_eq!(config.max_concurrent_actions, 1);
    let kb = Arc::new(KnowledgeBase::from_toml_file(&catalog_path).unwrap());

    let a = assistant(kb, config, scripted(&[], Arc::default()));
    let outcome = a
        .handle(a.request(vec![Intent::new("Greeting", 0.99)]))
        .await
        .unwrap();
    assert_eq!(outcome.plan.action_ids(), vec!["Greeting"]);
    assert!(outcome.plan.stats.fast_path);
    assert_eq!(outcome.report.status, OverallStatus::Succeeded);
}
