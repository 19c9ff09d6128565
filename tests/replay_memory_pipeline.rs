//! End-to-end pipeline: run a governed agent, then replay its log and
//! derive memory from the same stream.

use axon_agent::{AgentConfig, AgentRunner};
use axon_log::SqliteEventLog;
use axon_memory::episodic::EpisodicStore;
use axon_memory::pack::ContextPackBuilder;
use axon_memory::semantic::{Fact, Provenance, SemanticStore};
use axon_provider::test_utils::ScriptedProvider;
use axon_replay::{ReplayEngine, ReplayMode, tool_executor};
use axon_tool::{Tool, ToolError};
use axon0::id::RunId;
use axon0::log::{EventLog, EventWriter};
use axon0::side_effect::SideEffect;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

struct SquareTool;

impl Tool for SquareTool {
    fn name(&self) -> &str {
        "square"
    }
    fn description(&self) -> &str {
        "Squares an integer"
    }
    fn side_effect(&self) -> SideEffect {
        SideEffect::Pure
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["n"],
            "properties": {"n": {"type": "integer"}}
        })
    }
    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["squared"],
            "properties": {"squared": {"type": "integer"}}
        })
    }
    fn call(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let n = input.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!({"squared": n * n}))
        })
    }
}

async fn run_agent(log: &Arc<dyn EventLog>, run_id: &str) -> RunId {
    let run_id = RunId::new(run_id);
    let writer = EventWriter::new(log.clone(), run_id.clone());
    let provider = Arc::new(ScriptedProvider::from_texts(&[
        r#"{"action":"tool_call","tool":"square","input":{"n":6},"reasoning":"compute"}"#,
        r#"{"action":"finish","result":"36","reasoning":"done"}"#,
    ]));
    let mut tools = axon_tool::ToolRegistry::new();
    tools.register(Arc::new(SquareTool));
    AgentRunner::new(writer, provider, Arc::new(tools))
        .run("square six", AgentConfig::default())
        .await
        .unwrap();
    run_id
}

#[tokio::test]
async fn strict_replay_equals_the_raw_stream() {
    let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::open_in_memory().unwrap());
    let run_id = run_agent(&log, "agent-run").await;

    let engine = ReplayEngine::new(log.clone());
    let result = engine
        .replay(&run_id, ReplayMode::Strict, None)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.events, log.query_by_run(&run_id).unwrap());
    // Exactly the recorded ToolCallFinished payloads.
    assert_eq!(result.tool_outputs.len(), 1);
    let (_seq, payload) = result.tool_outputs.iter().next().unwrap();
    assert_eq!(payload["output"], json!({"squared": 36}));
    assert!(payload.get("reexecuted").is_none());
}

#[tokio::test]
async fn reexecute_overlays_only_pure_tool_calls() {
    let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::open_in_memory().unwrap());
    let run_id = run_agent(&log, "agent-run").await;

    let engine = ReplayEngine::new(log.clone());
    let executor = tool_executor(|name: &str, input: &Value| {
        assert_eq!(name, "square");
        let n = input["n"].as_i64().unwrap_or(0);
        async move { Ok(json!({"squared": n * n})) }
    });
    let result = engine
        .replay(&run_id, ReplayMode::Reexecute, Some(&executor))
        .await
        .unwrap();

    assert!(result.success);
    // Kinds and seqs are identical to the recorded stream.
    let recorded = log.query_by_run(&run_id).unwrap();
    assert_eq!(
        result.events.iter().map(|e| e.kind).collect::<Vec<_>>(),
        recorded.iter().map(|e| e.kind).collect::<Vec<_>>()
    );
    let (_seq, payload) = result.tool_outputs.iter().next().unwrap();
    assert_eq!(payload["reexecuted"], true);
    assert_eq!(payload["output"], json!({"squared": 36}));
}

#[tokio::test]
async fn two_identical_agent_runs_share_structure() {
    let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::open_in_memory().unwrap());
    let a = run_agent(&log, "run-a").await;
    let b = run_agent(&log, "run-b").await;

    let comparison = ReplayEngine::new(log).compare_runs(&a, &b).unwrap();
    assert!(comparison.same_structure);
    assert_eq!(comparison.events_a_count, comparison.events_b_count);
}

#[tokio::test]
async fn episodic_summary_reflects_the_run() {
    let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::open_in_memory().unwrap());
    let run_id = run_agent(&log, "agent-run").await;

    let mut store = EpisodicStore::new(log);
    let summary = store.summarize(&run_id).unwrap();
    assert_eq!(summary.outcome, "SUCCEEDED");
    assert_eq!(summary.tool_calls, 1);
    assert!(summary.total_events >= 6);
}

#[tokio::test]
async fn facts_from_runs_conflict_and_pack_into_claims() {
    let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::open_in_memory().unwrap());
    let run_a = run_agent(&log, "run-a").await;
    let run_b = run_agent(&log, "run-b").await;

    let mut store = SemanticStore::new();
    store.add(Fact::new(
        "square.result",
        json!(36),
        Provenance::from_run(run_a),
    ));
    store.add(Fact::new(
        "square.result",
        json!(35),
        Provenance::from_run(run_b.clone()),
    ));

    assert_eq!(store.get("square.result").unwrap().value, json!(35));
    let conflicts = store.get_conflicts(false);
    assert_eq!(conflicts.len(), 1);
    let (fact_a, fact_b) = store.conflict_facts(conflicts[0]).unwrap();
    assert_eq!(fact_a.value, json!(36));
    assert_eq!(fact_b.value, json!(35));
    assert_eq!(store.query_by_run(&run_b).len(), 1);

    let pack = ContextPackBuilder::default().build(&store, None);
    let claim = &pack.claims[0];
    assert!(claim.has_conflicts());
    // Mean of (1.0*0.5 + 1.0*1.0)/2 minus one unresolved-conflict penalty.
    assert!((claim.confidence() - 0.65).abs() < 1e-9);
}
