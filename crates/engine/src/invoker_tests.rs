//! `WorkflowInvoker` tests.
//!
//! These use `MockNode` so every node's behaviour and call count can be
//! asserted without real node implementations.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use nodes::mock::MockNode;
use nodes::ExecutableNode;

use crate::invoker::{backoff_delay, Invoker, InvokerConfig, NodeRegistry, WorkflowInvoker};
use crate::models::{Definition, Edge, NodeDefinition};
use crate::ExecutionError;

/// Build a definition whose nodes are connected linearly:
/// ids[0] → ids[1] → … → ids[n-1]. Each node's type is its own id.
fn linear_definition(ids: &[&str]) -> Arc<Definition> {
    let nodes: Vec<NodeDefinition> = ids
        .iter()
        .map(|id| NodeDefinition {
            id: id.to_string(),
            node_type: id.to_string(),
            config: Value::Null,
        })
        .collect();

    let edges: Vec<Edge> = ids
        .windows(2)
        .map(|w| Edge { from: w[0].into(), to: w[1].into() })
        .collect();

    Arc::new(Definition::new("test-linear", 1, "test-linear").with_graph(nodes, edges))
}

fn registry_of(nodes: Vec<(&str, Arc<MockNode>)>) -> NodeRegistry {
    nodes
        .into_iter()
        .map(|(k, v)| (k.to_string(), v as Arc<dyn ExecutableNode>))
        .collect()
}

fn fast_retries(max_retries: u32) -> InvokerConfig {
    InvokerConfig {
        max_retries,
        retry_base_delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn three_node_pipeline_output_propagation() {
    let a = Arc::new(MockNode::returning("node_a", json!({ "step": 1 })));
    let b = Arc::new(MockNode::returning("node_b", json!({ "step": 2 })));
    let c = Arc::new(MockNode::returning("node_c", json!({ "step": 3 })));
    let invoker = WorkflowInvoker::new(
        registry_of(vec![("node_a", a.clone()), ("node_b", b.clone()), ("node_c", c.clone())]),
        InvokerConfig::default(),
    );

    let definition = linear_definition(&["node_a", "node_b", "node_c"]);
    let result = invoker
        .invoke(definition, json!({ "origin": "trigger" }), &CancellationToken::new())
        .await
        .expect("run should succeed");

    let order: Vec<&str> = result.steps.iter().map(|s| s.node_id.as_str()).collect();
    assert_eq!(order, vec!["node_a", "node_b", "node_c"]);

    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
    assert_eq!(c.call_count(), 1);

    // Each node received the previous node's output.
    assert_eq!(a.calls.lock().unwrap()[0], json!({ "origin": "trigger" }));
    assert_eq!(b.calls.lock().unwrap()[0]["node"], "node_a");
    assert_eq!(result.steps[1].input["node"], "node_a");

    // Final output comes from node_c.
    assert_eq!(result.output["node"], "node_c");
    assert_eq!(result.output["step"], 3);
    assert_eq!(result.input, json!({ "origin": "trigger" }));
    assert_eq!(result.definition_id, "test-linear");
    assert_eq!(result.definition_version, 1);
}

#[tokio::test]
async fn fatal_node_error_stops_pipeline() {
    let ok = Arc::new(MockNode::returning("ok", json!({ "ok": true })));
    let boom = Arc::new(MockNode::failing_fatal("boom", "something broke irreparably"));
    let never = Arc::new(MockNode::returning("never", json!({ "should": "not run" })));
    let invoker = WorkflowInvoker::new(
        registry_of(vec![("ok", ok.clone()), ("boom", boom.clone()), ("never", never.clone())]),
        fast_retries(3),
    );

    let err = invoker
        .invoke(linear_definition(&["ok", "boom", "never"]), json!({}), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::NodeFatal { ref node_id, .. } if node_id == "boom"));
    // Fatal errors are never retried.
    assert_eq!(boom.call_count(), 1);
    assert_eq!(never.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn retryable_node_is_retried_until_exhausted() {
    let flaky = Arc::new(MockNode::failing_retryable("flaky", "transient failure"));
    let invoker = WorkflowInvoker::new(registry_of(vec![("flaky", flaky.clone())]), fast_retries(2));

    let err = invoker
        .invoke(linear_definition(&["flaky"]), json!({}), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::NodeRetryExhausted { .. }));
    // One attempt plus two retries.
    assert_eq!(flaky.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn retryable_node_recovers_and_records_attempts() {
    let flaky = Arc::new(MockNode::flaky("flaky", 2, json!({ "done": true })));
    let invoker = WorkflowInvoker::new(registry_of(vec![("flaky", flaky.clone())]), fast_retries(3));

    let result = invoker
        .invoke(linear_definition(&["flaky"]), json!({}), &CancellationToken::new())
        .await
        .expect("third attempt succeeds");

    assert_eq!(result.steps[0].attempts, 3);
    assert_eq!(result.output["done"], true);
}

#[tokio::test]
async fn unknown_node_type_fails_before_anything_runs() {
    let first = Arc::new(MockNode::returning("first", json!({})));
    let invoker = WorkflowInvoker::new(registry_of(vec![("first", first.clone())]), fast_retries(0));

    let err = invoker
        .invoke(linear_definition(&["first", "unregistered"]), json!({}), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::UnknownNodeType { ref node_type, .. } if node_type == "unregistered"
    ));
    assert_eq!(first.call_count(), 0);
}

#[tokio::test]
async fn invalid_graph_is_rejected() {
    let invoker = WorkflowInvoker::new(NodeRegistry::new(), InvokerConfig::default());
    let mut definition = (*linear_definition(&["x", "y", "z"])).clone();
    definition.edges.push(Edge { from: "z".into(), to: "x".into() });

    let err = invoker
        .invoke(Arc::new(definition), json!({}), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::CycleDetected));
}

#[tokio::test]
async fn cancelled_token_stops_before_the_first_node() {
    let node = Arc::new(MockNode::returning("only", json!({})));
    let invoker = WorkflowInvoker::new(registry_of(vec![("only", node.clone())]), InvokerConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = invoker
        .invoke(linear_definition(&["only"]), json!({}), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Cancelled));
    assert_eq!(node.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_retry_backoff() {
    let flaky = Arc::new(MockNode::failing_retryable("flaky", "down"));
    let invoker = WorkflowInvoker::new(
        registry_of(vec![("flaky", flaky.clone())]),
        InvokerConfig {
            max_retries: 10,
            retry_base_delay: Duration::from_secs(60),
        },
    );
    let cancel = CancellationToken::new();

    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            invoker
                .invoke(linear_definition(&["flaky"]), json!({}), &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    assert!(matches!(run.await.unwrap(), Err(ExecutionError::Cancelled)));
    assert_eq!(flaky.call_count(), 1);
}

#[tokio::test]
async fn same_definition_can_be_invoked_concurrently() {
    let node = Arc::new(MockNode::returning("n", json!({ "ok": true })));
    let invoker = Arc::new(WorkflowInvoker::new(
        registry_of(vec![("n", node.clone())]),
        InvokerConfig::default(),
    ));
    let definition = linear_definition(&["n"]);

    let runs: Vec<_> = (0..8)
        .map(|i| {
            let invoker = Arc::clone(&invoker);
            let definition = Arc::clone(&definition);
            tokio::spawn(async move {
                invoker
                    .invoke(definition, json!({ "run": i }), &CancellationToken::new())
                    .await
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for run in runs {
        ids.insert(run.await.unwrap().unwrap().execution_id);
    }
    assert_eq!(ids.len(), 8);
    assert_eq!(node.call_count(), 8);
}

#[test]
fn backoff_doubles_and_saturates_instead_of_overflowing() {
    let base = Duration::from_millis(100);
    assert_eq!(backoff_delay(base, 0), base);
    assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));

    // The multiplier saturates at u32::MAX...
    assert_eq!(backoff_delay(base, 40), base * u32::MAX);
    // ...and a product past Duration::MAX saturates too.
    assert_eq!(backoff_delay(Duration::from_secs(1_000_000_000_000), 31), Duration::MAX);
    assert_eq!(backoff_delay(Duration::MAX, 1), Duration::MAX);
}
