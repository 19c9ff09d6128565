//! Workspace-level invariants over the event log:
//! - every run has one `RunStarted` first and exactly one terminal event
//! - per-run seqs are dense from 0
//! - task and tool-call events pair up in order
//! - canonical hashing is insertion-order independent
//! - `BudgetExceeded` appears iff the terminal outcome is BUDGET_EXCEEDED

use axon_governance::budget::{BudgetManager, BudgetSpec};
use axon_log::SqliteEventLog;
use axon_provider::test_utils::ScriptedProvider;
use axon_rlm::{RecursiveExecutor, RlmConfig, RlmOutcome};
use axon_workflow::linear::{Workflow, WorkflowExecutor};
use axon_workflow::task::{TaskNode, task_fn};
use axon0::event::EventKind;
use axon0::hash::hash_value;
use axon0::id::RunId;
use axon0::log::{EventLog, EventWriter};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn fresh_log() -> Arc<dyn EventLog> {
    Arc::new(SqliteEventLog::open_in_memory().unwrap())
}

#[tokio::test]
async fn linear_workflow_emits_the_exact_canonical_sequence() {
    let log = fresh_log();
    let mut wf = Workflow::new("wf");
    wf.add_task(TaskNode::new("t1", task_fn(|| async { Ok(json!({"a": 1})) })));
    wf.add_task(TaskNode::new("t2", task_fn(|| async { Ok(json!({"b": 2})) })));

    let rid = WorkflowExecutor::new(log.clone())
        .run(&mut wf, None)
        .await
        .unwrap();

    let events = log.query_by_run(&rid).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "RunStarted",
            "TaskStarted",
            "TaskFinished",
            "TaskStarted",
            "TaskFinished",
            "RunFinished"
        ]
    );
    assert_eq!(
        events.iter().map(|e| e.seq).collect::<Vec<u64>>(),
        vec![0, 1, 2, 3, 4, 5]
    );
    assert_eq!(events[5].payload["outcome"], "SUCCEEDED");
}

#[tokio::test]
async fn every_run_has_one_start_and_one_terminal_event() {
    let log = fresh_log();

    // A successful run and a failed run in the same log.
    let mut ok = Workflow::new("ok");
    ok.add_task(TaskNode::new("t", task_fn(|| async { Ok(Value::Null) })));
    let ok_rid = WorkflowExecutor::new(log.clone())
        .run(&mut ok, None)
        .await
        .unwrap();

    let mut bad = Workflow::new("bad");
    bad.add_task(TaskNode::new("t", task_fn(|| async { Err("nope".into()) })));
    let bad_rid = RunId::new("bad-run");
    WorkflowExecutor::new(log.clone())
        .run(&mut bad, Some(bad_rid.clone()))
        .await
        .unwrap_err();

    for rid in [&ok_rid, &bad_rid] {
        let events = log.query_by_run(rid).unwrap();
        assert_eq!(events[0].kind, EventKind::RunStarted);
        let terminals = events
            .iter()
            .filter(|e| e.kind == EventKind::RunFinished)
            .count();
        assert_eq!(terminals, 1);
        assert_eq!(events.last().unwrap().kind, EventKind::RunFinished);

        // Dense seqs.
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (0..events.len() as u64).collect::<Vec<u64>>());

        // Task pairing: one Finished per Started, strictly later.
        let started: Vec<&axon0::event::Event> = events
            .iter()
            .filter(|e| e.kind == EventKind::TaskStarted)
            .collect();
        for start in started {
            let matching: Vec<u64> = events
                .iter()
                .filter(|e| {
                    e.kind == EventKind::TaskFinished
                        && e.payload["task_id"] == start.payload["task_id"]
                })
                .map(|e| e.seq)
                .collect();
            assert_eq!(matching.len(), 1);
            assert!(matching[0] > start.seq);
        }
    }
}

#[test]
fn canonical_hashing_ignores_insertion_order_and_detects_changes() {
    let a: Value = serde_json::from_str(r#"{"tool": "add", "args": {"x": 1, "y": 2}}"#).unwrap();
    let b: Value = serde_json::from_str(r#"{"args": {"y": 2, "x": 1}, "tool": "add"}"#).unwrap();
    assert_eq!(hash_value(&a), hash_value(&b));

    let c: Value = serde_json::from_str(r#"{"args": {"y": 2, "x": 9}, "tool": "add"}"#).unwrap();
    assert_ne!(hash_value(&a), hash_value(&c));
}

#[tokio::test]
async fn budget_exceeded_event_appears_iff_outcome_is_budget_exceeded() {
    // Exceeding run.
    let log = fresh_log();
    let run_id = RunId::new("over");
    let writer = EventWriter::new(log.clone(), run_id.clone());
    let long = "x".repeat(60);
    let provider = Arc::new(ScriptedProvider::from_texts(&[long.as_str()]));
    let budget = Arc::new(Mutex::new(BudgetManager::new(
        BudgetSpec {
            max_tokens: 50,
            ..BudgetSpec::default()
        },
        writer.clone(),
    )));
    let report = RecursiveExecutor::new(writer, provider)
        .with_budget(budget)
        .run("never ends", RlmConfig::default())
        .await
        .unwrap();
    assert_eq!(report.outcome, RlmOutcome::BudgetExceeded);

    let exceeded = log.query_by_kind(&run_id, EventKind::BudgetExceeded).unwrap();
    assert_eq!(exceeded.len(), 1);
    assert_eq!(exceeded[0].payload["limit"], "max_tokens");
    let terminal = log.query_by_kind(&run_id, EventKind::RunFinished).unwrap();
    assert_eq!(terminal[0].payload["outcome"], "BUDGET_EXCEEDED");

    // Non-exceeding run: no BudgetExceeded event, different outcome.
    let run_id = RunId::new("within");
    let writer = EventWriter::new(log.clone(), run_id.clone());
    let provider = Arc::new(ScriptedProvider::from_texts(&["FINAL = \"done\""]));
    let budget = Arc::new(Mutex::new(BudgetManager::new(
        BudgetSpec::default(),
        writer.clone(),
    )));
    let report = RecursiveExecutor::new(writer, provider)
        .with_budget(budget)
        .run("finishes", RlmConfig::default())
        .await
        .unwrap();
    assert_eq!(report.outcome, RlmOutcome::Succeeded);
    assert!(
        log.query_by_kind(&run_id, EventKind::BudgetExceeded)
            .unwrap()
            .is_empty()
    );
    let terminal = log.query_by_kind(&run_id, EventKind::RunFinished).unwrap();
    assert_eq!(terminal[0].payload["outcome"], "SUCCEEDED");
}
