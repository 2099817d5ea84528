mod common;

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use common::*;
use stepper_core::config::StepperConfig;
use stepper_core::constants::{attachments, variables};
use stepper_core::execution::{
    DataSetSink, ExecutionCallbacks, ExecutionContext, InMemoryDataSet, VariableValue,
};
use stepper_core::models::{
    Attachment, DynamicValue, ErrorKind, ExecutionParameters, ForLoopSpec, Function, NodeFilter,
    NodeKind, NodeType, Output, PlanNode, ReportNode, ReportNodeStatus,
};
use stepper_core::services::{ReportNodeStore, RunLifecycle};

fn for_loop(name: &str, end: i64, counter: &str, children: Vec<PlanNode>) -> PlanNode {
    PlanNode::new(
        name,
        NodeKind::ForLoop(ForLoopSpec {
            start: DynamicValue::Value(1),
            end: DynamicValue::Value(end),
            increment: DynamicValue::Value(1),
            counter_variable: counter.to_string(),
            max_failed_loops: None,
        }),
    )
    .with_children(children)
}

#[tokio::test]
async fn test_execution_reuses_persisted_skeleton_nodes() {
    let harness = Harness::new();
    let leaf = echo("Leaf", "hello").with_create_skeleton(true);
    let leaf_id = leaf.id.clone();
    let root = PlanNode::sequence("Main")
        .with_create_skeleton(true)
        .with_child(leaf);
    let root_id = root.id.clone();

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
    let skeleton = harness.callbacks.skeleton_node(&leaf_id);
    let executed = harness.callbacks.executed_node(&leaf_id);
    assert_eq!(skeleton.len(), 1);
    assert_eq!(executed.len(), 1);
    assert_eq!(skeleton[0].id, executed[0].id);
    assert_eq!(
        harness.callbacks.skeleton_node(&root_id)[0].id,
        harness.callbacks.executed_node(&root_id)[0].id
    );

    let stored = harness.reports.find_by_node_id(&leaf_id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, ReportNodeStatus::Passed);
}

#[tokio::test]
async fn test_suppressed_skeleton_creates_exactly_one_node() {
    let harness = Harness::new();
    let leaf = echo("Leaf", "hello").with_create_skeleton(true);
    let leaf_id = leaf.id.clone();
    // The parent does not build a skeleton, so the leaf's skeleton is orphaned
    let root = PlanNode::sequence("Main").with_child(leaf);

    harness.run(root).await;

    let skeleton = harness.callbacks.skeleton_node(&leaf_id);
    let executed = harness.callbacks.executed_node(&leaf_id);
    assert_eq!(skeleton.len(), 1);
    assert!(skeleton[0].orphan);
    assert_ne!(skeleton[0].id, executed[0].id);
    assert_eq!(harness.reports.find_by_node_id(&leaf_id).len(), 1);
}

#[tokio::test]
async fn test_default_policy_writes_before_and_after() {
    let harness = Harness::new();
    let leaf = echo("Leaf", "hello");
    let leaf_id = leaf.id.clone();

    let run = harness.run(leaf).await;

    let report = &harness.callbacks.executed_node(&leaf_id)[0];
    assert_eq!(harness.reports.saves_of(&report.id), 2);
    assert_eq!(harness.node_writes(&run), 2);
}

#[tokio::test]
async fn test_only_non_passed_policy_skips_passed_nodes() {
    let mut config = StepperConfig::default();
    config.execution.persist_only_non_passed = true;
    let harness = Harness::with_config(config);

    let passing = echo("Passing", "ok");
    let failing = check("Failing", "false");
    let passing_id = passing.id.clone();
    let failing_id = failing.id.clone();
    let root = PlanNode::sequence("Main").with_children([passing, failing]);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Failed);
    let passed = &harness.callbacks.executed_node(&passing_id)[0];
    let failed = &harness.callbacks.executed_node(&failing_id)[0];
    assert_eq!(harness.reports.saves_of(&passed.id), 0);
    assert_eq!(harness.reports.saves_of(&failed.id), 1);
    // the failing check and its container
    assert_eq!(harness.node_writes(&run), 2);
}

#[tokio::test]
async fn test_persistence_policy_can_be_overridden_per_run() {
    let harness = Harness::new();
    let leaf = echo("Leaf", "hello");

    let run = harness
        .run_with(leaf, |parameters| {
            parameters.with_variable(variables::PERSIST_BEFORE, "false")
        })
        .await;

    assert_eq!(harness.node_writes(&run), 1);
}

#[tokio::test]
async fn test_nested_loops_without_writes_for_passing_nodes() {
    let mut config = StepperConfig::default();
    config.execution.persist_only_non_passed = true;
    let harness = Harness::with_config(config);

    let leaf = echo("Leaf", "pass");
    let leaf_id = leaf.id.clone();
    let inner = for_loop("Inner", 5, "inner", vec![leaf]);
    let outer = for_loop("Outer", 10, "outer", vec![inner]);
    let outer_id = outer.id.clone();

    let run = harness.run(outer).await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
    let leaves = harness.callbacks.executed_node(&leaf_id);
    assert_eq!(leaves.len(), 50);
    assert!(leaves.iter().all(|r| r.status == ReportNodeStatus::Passed));
    assert_eq!(harness.node_writes(&run), 0);

    let outer_report = &harness.callbacks.executed_node(&outer_id)[0];
    assert_eq!(outer_report.custom_attributes["iterations"], "10");
    assert_eq!(outer_report.custom_attributes["failed_iterations"], "0");
}

#[tokio::test]
async fn test_loop_iterations_are_named_and_bind_the_counter() {
    let harness = Harness::new();
    let leaf = PlanNode::new(
        "Leaf",
        NodeKind::Echo {
            text: DynamicValue::expression("i"),
        },
    );
    let leaf_id = leaf.id.clone();
    let root = for_loop("Loop", 3, "i", vec![leaf]);

    harness.run(root).await;

    let echoed: Vec<String> = harness
        .callbacks
        .executed_node(&leaf_id)
        .iter()
        .map(|r| r.custom_attributes["echo"].clone())
        .collect();
    assert_eq!(echoed, vec!["1", "2", "3"]);

    let iterations: Vec<String> = harness
        .callbacks
        .executed()
        .into_iter()
        .filter(|r| r.node_type == Some(NodeType::Sequence))
        .map(|r| r.name)
        .collect();
    assert_eq!(iterations, vec!["Iteration1", "Iteration2", "Iteration3"]);
}

#[tokio::test]
async fn test_loop_stops_after_max_failed_iterations() {
    let harness = Harness::new();
    let failing = check("Failing", "false");
    let failing_id = failing.id.clone();
    let root = PlanNode::new(
        "Loop",
        NodeKind::ForLoop(ForLoopSpec {
            start: DynamicValue::Value(1),
            end: DynamicValue::Value(10),
            increment: DynamicValue::Value(1),
            counter_variable: "i".to_string(),
            max_failed_loops: Some(DynamicValue::Value(2)),
        }),
    )
    .with_child(failing);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Failed);
    assert_eq!(harness.callbacks.executed_node(&failing_id).len(), 2);
}

#[tokio::test]
async fn test_loop_break_variable_ends_the_loop() {
    let harness = Harness::new();
    let leaf = echo("Leaf", "once");
    let leaf_id = leaf.id.clone();
    let root = for_loop(
        "Loop",
        10,
        "i",
        vec![leaf, set("Break", "break", json!(true))],
    );

    harness.run(root).await;

    assert_eq!(harness.callbacks.executed_node(&leaf_id).len(), 1);
}

#[tokio::test]
async fn test_zero_increment_is_a_validation_failure_without_attachment() {
    let harness = Harness::new();
    let root = PlanNode::new(
        "Loop",
        NodeKind::ForLoop(ForLoopSpec {
            start: DynamicValue::Value(1),
            end: DynamicValue::Value(10),
            increment: DynamicValue::Value(0),
            counter_variable: "i".to_string(),
            max_failed_loops: None,
        }),
    );
    let root_id = root.id.clone();

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::TechnicalError);
    let report = &harness.callbacks.executed_node(&root_id)[0];
    assert!(report.attachments.is_empty());
    assert_eq!(report.error.as_ref().map(|e| e.kind), Some(ErrorKind::Technical));
}

#[tokio::test]
async fn test_business_error_stops_the_remaining_siblings() {
    let harness = Harness::new();
    harness.register_function(Function::new("Fail"));
    harness
        .dispatcher
        .respond("Fail", Output::business_error("order rejected"));

    let failing = call("Call", "Fail");
    let after = echo("After", "never");
    let failing_id = failing.id.clone();
    let after_id = after.id.clone();
    let root = PlanNode::sequence("Main").with_children([failing, after]);
    let root_id = root.id.clone();

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Failed);
    let call_report = &harness.callbacks.executed_node(&failing_id)[0];
    assert_eq!(call_report.status, ReportNodeStatus::Failed);
    assert_eq!(
        call_report.error.as_ref().map(|e| e.message.as_str()),
        Some("order rejected")
    );
    assert!(harness.callbacks.executed_node(&after_id).is_empty());
    assert_eq!(
        harness.callbacks.executed_node(&root_id)[0].status,
        ReportNodeStatus::Failed
    );
}

#[tokio::test]
async fn test_continue_on_error_runs_every_child() {
    let harness = Harness::new();
    let after = echo("After", "still runs");
    let after_id = after.id.clone();
    let root = PlanNode::new(
        "Main",
        NodeKind::Sequence {
            continue_on_error: Some(DynamicValue::Value(true)),
        },
    )
    .with_children([check("Failing", "false"), after]);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Failed);
    assert_eq!(harness.callbacks.executed_node(&after_id).len(), 1);
}

#[tokio::test]
async fn test_child_override_lets_the_parent_continue() {
    let harness = Harness::new();
    let after = echo("After", "still runs");
    let after_id = after.id.clone();
    let root = PlanNode::sequence("Main").with_children([
        check("Failing", "false").with_continue_parent_on_error(true),
        after,
    ]);

    harness.run(root).await;

    assert_eq!(harness.callbacks.executed_node(&after_id).len(), 1);
}

/// Leaves the one-shot continue flag in the parent's scope when the named node ends
struct ContinueOnceAfter(&'static str);

#[async_trait]
impl ExecutionCallbacks for ContinueOnceAfter {
    async fn after_report_node_execution(&self, ctx: &ExecutionContext, node: &ReportNode) {
        if node.name == self.0 {
            if let Some(parent_id) = &node.parent_id {
                ctx.variables()
                    .put(parent_id, variables::CONTINUE_ON_ERROR_ONCE, json!(true));
            }
        }
    }
}

#[tokio::test]
async fn test_continue_once_applies_to_a_single_child() {
    let harness = Harness::with_callback(Arc::new(ContinueOnceAfter("FailingOnce")));
    let second = echo("Second", "runs");
    let third = echo("Third", "never");
    let second_id = second.id.clone();
    let third_id = third.id.clone();
    let root = PlanNode::sequence("Main").with_children([
        check("FailingOnce", "false"),
        second,
        check("FailingAgain", "false"),
        third,
    ]);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Failed);
    assert_eq!(harness.callbacks.executed_node(&second_id).len(), 1);
    assert!(harness.callbacks.executed_node(&third_id).is_empty());
}

#[tokio::test]
async fn test_continue_once_set_by_a_sibling_is_consumed_immediately() {
    let harness = Harness::new();
    let after = echo("After", "never");
    let after_id = after.id.clone();
    let root = PlanNode::sequence("Main").with_children([
        set("Tolerate", variables::CONTINUE_ON_ERROR_ONCE, json!(true)),
        check("Failing", "false"),
        after,
    ]);

    harness.run(root).await;

    assert!(harness.callbacks.executed_node(&after_id).is_empty());
}

#[tokio::test]
async fn test_forced_parent_status_overrides_composition() {
    let harness = Harness::new();
    let root = PlanNode::sequence("Main").with_children([
        check("Failing", "false").with_continue_parent_on_error(true),
        set("Force", variables::FORCE_PARENT_STATUS, json!("PASSED")),
    ]);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
}

#[tokio::test]
async fn test_skip_node_short_circuits_execution() {
    let harness = Harness::new();
    let skipped = echo("Skipped", "never").with_skip_node(DynamicValue::Value(true));
    let broken = echo("Broken", "never").with_skip_node(DynamicValue::expression("missing.flag"));
    let skipped_id = skipped.id.clone();
    let broken_id = broken.id.clone();
    let root = PlanNode::new(
        "Main",
        NodeKind::Sequence {
            continue_on_error: Some(DynamicValue::Value(true)),
        },
    )
    .with_children([skipped, broken]);

    let run = harness.run(root).await;

    let skipped_report = &harness.callbacks.executed_node(&skipped_id)[0];
    assert_eq!(skipped_report.status, ReportNodeStatus::Skipped);
    assert!(!skipped_report.custom_attributes.contains_key("echo"));

    let broken_report = &harness.callbacks.executed_node(&broken_id)[0];
    assert_eq!(broken_report.status, ReportNodeStatus::TechnicalError);
    assert_eq!(run.status, ReportNodeStatus::TechnicalError);
}

#[tokio::test]
async fn test_filtered_nodes_are_skipped() {
    let harness = Harness::new();
    let kept = echo("Kept", "yes");
    let filtered = echo("Filtered", "no");
    let kept_id = kept.id.clone();
    let filtered_id = filtered.id.clone();
    let root = PlanNode::sequence("Main").with_children([kept, filtered]);

    let run = harness
        .run_with(root, |mut parameters| {
            parameters.filter = Some(NodeFilter::ExcludeIds(
                [filtered_id.clone()].into_iter().collect(),
            ));
            parameters
        })
        .await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
    assert!(harness.callbacks.executed_node(&kept_id)[0]
        .custom_attributes
        .contains_key("echo"));
    assert_eq!(
        harness.callbacks.executed_node(&filtered_id)[0].status,
        ReportNodeStatus::Skipped
    );
}

#[tokio::test]
async fn test_property_children_initialize_before_the_body() {
    let harness = Harness::new();
    let leaf = PlanNode::new(
        "Leaf",
        NodeKind::Echo {
            text: DynamicValue::expression("greeting"),
        },
    );
    let leaf_id = leaf.id.clone();
    let root = PlanNode::sequence("Main")
        .with_child(set("Greeting", "greeting", json!("hello")).as_property())
        .with_child(leaf);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
    assert_eq!(
        harness.callbacks.executed_node(&leaf_id)[0].custom_attributes["echo"],
        "hello"
    );
}

#[tokio::test]
async fn test_set_variables_are_visible_to_later_siblings() {
    let harness = Harness::new();
    let verify = check("Verify", "answer == 42");
    let verify_id = verify.id.clone();
    let root = PlanNode::sequence("Main")
        .with_children([set("Answer", "answer", json!(42)), verify]);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
    assert_eq!(
        harness.callbacks.executed_node(&verify_id)[0].status,
        ReportNodeStatus::Passed
    );
}

#[tokio::test]
async fn test_missing_function_attaches_the_exception() {
    let harness = Harness::new();
    let missing = call("Call", "DoesNotExist");
    let missing_id = missing.id.clone();

    let run = harness.run(missing).await;

    assert_eq!(run.status, ReportNodeStatus::TechnicalError);
    let report = &harness.callbacks.executed_node(&missing_id)[0];
    assert_eq!(report.attachments.len(), 1);
    assert_eq!(report.attachments[0].name, attachments::EXCEPTION_ATTACHMENT_NAME);
    assert_eq!(harness.attachments.len(), 1);
}

#[tokio::test]
async fn test_call_output_is_bound_and_children_run_with_the_call_report() {
    let harness = Harness::new();
    harness.register_function(Function::new("Lookup"));
    harness
        .dispatcher
        .respond("Lookup", Output::passed(json!({"customer": "acme"})));

    let verify = check("Verify", "output.customer == 'acme'");
    let verify_id = verify.id.clone();
    let after = check("Previous", "previous.customer == 'acme'");
    let after_id = after.id.clone();
    let lookup = call("Call", "Lookup").with_child(verify);
    let root = PlanNode::sequence("Main").with_children([lookup, after]);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
    assert_eq!(
        harness.callbacks.executed_node(&verify_id)[0].status,
        ReportNodeStatus::Passed
    );
    assert_eq!(
        harness.callbacks.executed_node(&after_id)[0].status,
        ReportNodeStatus::Passed
    );
}

#[tokio::test]
async fn test_call_children_run_even_after_a_failed_call() {
    let harness = Harness::new();
    harness.register_function(Function::new("Fail"));
    harness
        .dispatcher
        .respond("Fail", Output::technical_error("agent crashed"));

    let cleanup = echo("Cleanup", "always");
    let cleanup_id = cleanup.id.clone();
    let root = call("Call", "Fail").with_child(cleanup);

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::TechnicalError);
    assert_eq!(harness.callbacks.executed_node(&cleanup_id).len(), 1);
}

#[tokio::test]
async fn test_attachment_quota_drops_extra_attachments() {
    let harness = Harness::new();
    harness.register_function(Function::new("Screenshots"));
    let attachment = |name: &str| Attachment {
        name: name.to_string(),
        mime_type: "image/png".to_string(),
        content: vec![1, 2, 3],
    };
    harness.dispatcher.respond(
        "Screenshots",
        Output {
            payload: Some(json!({})),
            error: None,
            attachments: vec![attachment("a.png"), attachment("b.png")],
            measures: Vec::new(),
        },
    );
    let node = call("Call", "Screenshots");
    let node_id = node.id.clone();

    let run = harness
        .run_with(node, |parameters| {
            parameters.with_variable(variables::ATTACHMENT_QUOTA, "1")
        })
        .await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
    let report = &harness.callbacks.executed_node(&node_id)[0];
    assert_eq!(report.attachments.len(), 1);
    assert_eq!(report.attachments[0].name, "a.png");
}

#[tokio::test]
async fn test_simulation_passes_calls_without_tokens() {
    let harness = Harness::new();
    harness.register_function(Function::new("Fail"));
    harness
        .dispatcher
        .respond("Fail", Output::business_error("would fail"));
    let node = call("Call", "Fail");
    let node_id = node.id.clone();

    let run = harness
        .run_with(node, |mut parameters| {
            parameters.simulate = true;
            parameters
        })
        .await;

    assert_eq!(run.status, ReportNodeStatus::Passed);
    assert_eq!(harness.broker.remote_acquisitions(), 0);
    assert!(harness.dispatcher.calls().is_empty());
    assert_eq!(
        harness.callbacks.executed_node(&node_id)[0].output,
        Some(json!({}))
    );
}

#[tokio::test]
async fn test_schema_enforcement_rejects_invalid_input() {
    let mut config = StepperConfig::default();
    config.execution.enforce_schemas = true;
    let harness = Harness::with_config(config);
    harness.register_function(Function::new("Typed").with_schema(json!({
        "type": "object",
        "required": ["quantity"]
    })));
    let node = call("Call", "Typed");
    let node_id = node.id.clone();

    let run = harness.run(node).await;

    assert_eq!(run.status, ReportNodeStatus::TechnicalError);
    let report = &harness.callbacks.executed_node(&node_id)[0];
    assert!(report.attachments.is_empty());
    assert!(harness.dispatcher.calls().is_empty());
}

/// Provides result sinks to the plan, as an embedding application would
struct SinkProvider {
    map: VariableValue,
    rows: Arc<InMemoryDataSet>,
}

#[async_trait]
impl ExecutionCallbacks for SinkProvider {
    async fn before_report_node_execution(&self, ctx: &ExecutionContext, node: &ReportNode) {
        if node.name == "Main" {
            ctx.variables().put(&node.id, "results", self.map.clone());
            ctx.variables().put(
                &node.id,
                "rows",
                VariableValue::DataSink(Arc::clone(&self.rows) as Arc<dyn DataSetSink>),
            );
            ctx.variables().put(&node.id, "plain", json!("text"));
        }
    }
}

#[tokio::test]
async fn test_output_is_drained_into_maps_and_data_sets() {
    let map = VariableValue::new_map();
    let rows = Arc::new(InMemoryDataSet::new());
    let harness = Harness::with_callback(Arc::new(SinkProvider {
        map: map.clone(),
        rows: Arc::clone(&rows),
    }));
    harness.register_function(Function::new("Orders"));
    harness.dispatcher.respond(
        "Orders",
        Output::passed(json!({
            "total": 2,
            "lines": [{"sku": "A", "qty": 1}, {"sku": "B", "qty": 3}]
        })),
    );

    let mut into_map = call_spec("Orders");
    into_map.result_variable = Some("results".to_string());
    let mut into_rows = call_spec("Orders");
    into_rows.result_variable = Some("rows".to_string());
    let mut into_plain = call_spec("Orders");
    into_plain.result_variable = Some("plain".to_string());
    let plain = PlanNode::new("Plain", NodeKind::CallFunction(into_plain));
    let plain_id = plain.id.clone();

    let root = PlanNode::new(
        "Main",
        NodeKind::Sequence {
            continue_on_error: Some(DynamicValue::Value(true)),
        },
    )
    .with_children([
        PlanNode::new("ToMap", NodeKind::CallFunction(into_map)),
        PlanNode::new("ToRows", NodeKind::CallFunction(into_rows)),
        plain,
    ]);

    harness.run(root).await;

    let VariableValue::Map(values) = map else {
        panic!("expected a map");
    };
    let expected: HashMap<String, String> = [("total".to_string(), "2".to_string())].into();
    assert_eq!(*values.lock(), expected);

    let rows = rows.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["sku"], "A");
    assert_eq!(rows[1]["qty"], "3");
    assert_eq!(rows[2]["total"], "2");

    let plain_report = &harness.callbacks.executed_node(&plain_id)[0];
    assert_eq!(plain_report.status, ReportNodeStatus::TechnicalError);
}

/// Interrupts the run once the named node completed
struct InterruptAfter(&'static str);

#[async_trait]
impl ExecutionCallbacks for InterruptAfter {
    async fn after_report_node_execution(&self, ctx: &ExecutionContext, node: &ReportNode) {
        if node.name == self.0 {
            ctx.interrupt();
        }
    }
}

#[tokio::test]
async fn test_interrupt_stops_between_children() {
    let harness = Harness::with_callback(Arc::new(InterruptAfter("First")));
    let second = echo("Second", "never");
    let second_id = second.id.clone();
    let root = PlanNode::sequence("Main").with_children([echo("First", "runs"), second]);
    let root_id = root.id.clone();

    let run = harness.run(root).await;

    assert_eq!(run.status, ReportNodeStatus::Interrupted);
    assert!(harness.callbacks.executed_node(&second_id).is_empty());
    assert_eq!(
        harness.callbacks.executed_node(&root_id)[0].status,
        ReportNodeStatus::Interrupted
    );
}

#[tokio::test]
async fn test_aborted_run_ends_interrupted() {
    let harness = Harness::new();
    let leaf = echo("Leaf", "never");
    let leaf_id = leaf.id.clone();
    let plan_id = harness
        .store_plan(PlanNode::sequence("Main").with_child(leaf))
        .await;

    let run_id = harness
        .engine
        .initialize_run(ExecutionParameters::for_plan(plan_id))
        .await
        .unwrap();
    assert_eq!(harness.engine.active_runs().len(), 1);

    harness.engine.abort(&run_id).await.unwrap();
    let result = harness.engine.execute_run(&run_id).await.unwrap();

    assert_eq!(result.status, ReportNodeStatus::Interrupted);
    assert!(harness.callbacks.executed_node(&leaf_id).is_empty());
    assert!(harness.engine.active_runs().is_empty());

    let root = harness
        .reports
        .get(&result.root_report_node_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(root.status, ReportNodeStatus::Interrupted);
}

#[tokio::test]
async fn test_unknown_plan_is_reported() {
    let harness = Harness::new();
    let run_id = harness
        .engine
        .initialize_run(ExecutionParameters::for_plan("missing"))
        .await
        .unwrap();

    let error = harness.engine.execute_run(&run_id).await.unwrap_err();
    assert_eq!(
        error,
        stepper_core::StepperError::PlanNotFound("missing".to_string())
    );
}

#[tokio::test]
async fn test_removing_a_report_node_removes_its_subtree() {
    let harness = Harness::new();
    let leaf = echo("Leaf", "x");
    let leaf_id = leaf.id.clone();
    let root = PlanNode::sequence("Main").with_child(leaf);
    let root_id = root.id.clone();
    let plan_id = harness.store_plan(root).await;
    harness
        .engine
        .run(ExecutionParameters::for_plan(plan_id))
        .await
        .unwrap();

    let main = harness.reports.find_by_node_id(&root_id).remove(0);
    let ctx = ExecutionContext::new(
        main.run_id.clone(),
        ExecutionParameters::for_plan("p"),
        Arc::new(StepperConfig::default()),
        harness.engine.services().clone(),
    )
    .unwrap();

    stepper_core::orchestration::remove_report_node(&ctx, &main)
        .await
        .unwrap();

    assert!(harness.reports.find_by_node_id(&root_id).is_empty());
    assert!(harness.reports.find_by_node_id(&leaf_id).is_empty());
    assert!(harness.reports.get(&main.id).await.unwrap().is_none());
}
